use fenris_thermal::material::{
    compute_constants, BatchProperties, BatchQuery, MaterialModel, MaterialProperties, MaterialPropertySource,
    MaterialTable, PointwiseMaterial, PropertyCurve, UniformMaterial,
};
use fenris_thermal::mesh::MaterialId;
use fenris_thermal::nalgebra::{point, Point2, U2};
use matrixcompare::assert_scalar_eq;

/// Two quadrature points of a batch with four lanes, of which three are active.
/// Coordinates are stored `[q][axis][lane]`.
const POINTS: [f64; 16] = [
    0.0, 1.0, 2.0, 0.0, // q = 0, x
    0.5, 0.5, 0.5, 0.0, // q = 0, y
    0.25, 1.25, 2.25, 0.0, // q = 1, x
    0.75, 0.75, 0.75, 0.0, // q = 1, y
];

fn query<'a>(material_ids: &'a [MaterialId]) -> BatchQuery<'a, f64, U2> {
    BatchQuery::new(&[10, 11, 12], material_ids, &POINTS, 2, 4)
}

#[test]
fn constants_are_inverse_heat_capacity_and_diffusivity() {
    let (alpha, beta) = compute_constants(&MaterialProperties::new(2.0, 4.0, 3.0));
    assert_eq!(alpha, 0.125);
    assert_eq!(beta, 0.375);

    let (alpha, beta) = compute_constants(&MaterialProperties::new(1.0, 1.0, 5.0));
    assert_eq!((alpha, beta), (1.0, 5.0));

    // Degenerate input propagates
    let (alpha, _) = compute_constants(&MaterialProperties::<f64>::new(0.0, 1.0, 1.0));
    assert!(alpha.is_infinite());
}

#[test]
fn batch_query_exposes_points_by_lane() {
    let ids = [0, 0, 1];
    let query = query(&ids);
    assert_eq!(query.n_active_lanes(), 3);
    assert_eq!(query.n_lanes(), 4);
    assert_eq!(query.n_q_points(), 2);
    assert_eq!(query.cells(), &[10, 11, 12]);
    assert_eq!(query.point(1, 2), point![2.25, 0.75]);
}

#[test]
fn batch_properties_are_stored_per_point_and_lane() {
    let mut properties = BatchProperties::new(2, 4);
    properties.set(1, 3, &MaterialProperties::new(1.0, 2.0, 3.0));
    assert_eq!(properties.get(1, 3), MaterialProperties::new(1.0, 2.0, 3.0));
    assert_eq!(properties.thermal_conductivity(1), &[0.0, 0.0, 0.0, 3.0]);
    assert_eq!(properties.density(0), &[0.0; 4]);
    properties.reset();
    assert_eq!(properties.specific_heat(1), &[0.0; 4]);
}

#[test]
fn uniform_material_fills_active_lanes_only() {
    let source = UniformMaterial(MaterialProperties::new(2.0, 3.0, 4.0));
    let ids = [0, 0, 0];
    let mut output = BatchProperties::new(2, 4);
    source.evaluate_batch(&query(&ids), None, &mut output);
    for q in 0..2 {
        assert_eq!(output.thermal_conductivity(q), &[4.0, 4.0, 4.0, 0.0]);
        assert_eq!(output.density(q), &[2.0, 2.0, 2.0, 0.0]);
    }
}

#[test]
fn pointwise_material_sees_position_material_and_temperature() {
    let source = PointwiseMaterial(|x: &Point2<f64>, id: MaterialId, temperature: Option<f64>| {
        MaterialProperties::new(1.0 + id as f64, temperature.unwrap_or(-1.0), x[0] + x[1])
    });
    let ids = [0, 2, 1];
    let mut output = BatchProperties::new(2, 4);

    source.evaluate_batch(&query(&ids), None, &mut output);
    assert_eq!(output.thermal_conductivity(0), &[0.5, 1.5, 2.5, 0.0]);
    assert_eq!(output.density(1), &[1.0, 3.0, 2.0, 0.0]);
    assert_eq!(output.specific_heat(1), &[-1.0, -1.0, -1.0, 0.0]);

    let temperature = [10.0, 11.0, 12.0, 99.0, 20.0, 21.0, 22.0, 99.0];
    source.evaluate_batch(&query(&ids), Some(&temperature), &mut output);
    assert_eq!(output.specific_heat(1), &[20.0, 21.0, 22.0, 0.0]);
}

#[test]
fn piecewise_linear_curve_interpolates_and_clamps() {
    let curve = PropertyCurve::piecewise_linear(vec![(300.0, 10.0), (500.0, 20.0), (600.0, 40.0)]).unwrap();
    assert_eq!(curve.evaluate(100.0), 10.0);
    assert_eq!(curve.evaluate(300.0), 10.0);
    assert_scalar_eq!(curve.evaluate(400.0), 15.0, comp = abs, tol = 1e-12);
    assert_eq!(curve.evaluate(500.0), 20.0);
    assert_scalar_eq!(curve.evaluate(575.0), 35.0, comp = abs, tol = 1e-12);
    assert_eq!(curve.evaluate(1000.0), 40.0);

    assert_eq!(PropertyCurve::Constant(7.0).evaluate(123.0), 7.0);
    assert!(PropertyCurve::<f64>::piecewise_linear(vec![]).is_err());
    assert!(PropertyCurve::piecewise_linear(vec![(1.0, 0.0), (1.0, 1.0)]).is_err());
}

fn steel_and_copper() -> MaterialTable<f64> {
    let steel = MaterialModel {
        density: PropertyCurve::Constant(7800.0),
        specific_heat: PropertyCurve::Constant(500.0),
        thermal_conductivity: PropertyCurve::piecewise_linear(vec![(300.0, 15.0), (1300.0, 30.0)]).unwrap(),
        reference_temperature: 300.0,
    };
    let copper = MaterialModel::constant(MaterialProperties::new(8900.0, 385.0, 400.0));
    MaterialTable::new().with_model(0, steel).with_model(1, copper)
}

#[test]
fn material_table_dispatches_on_material_id() {
    let table = steel_and_copper();
    assert!(table.model(1).is_some());
    assert!(table.model(2).is_none());

    let ids = [0, 1, 0];
    let mut output = BatchProperties::new(2, 4);
    table.evaluate_batch(&query(&ids), None, &mut output);
    assert_eq!(output.thermal_conductivity(0), &[15.0, 400.0, 15.0, 0.0]);
    assert_eq!(output.density(1), &[7800.0, 8900.0, 7800.0, 0.0]);

    let temperature = [800.0, 800.0, 1300.0, 0.0, 300.0, 300.0, 2000.0, 0.0];
    table.evaluate_batch(&query(&ids), Some(&temperature), &mut output);
    assert_eq!(output.thermal_conductivity(0), &[22.5, 400.0, 30.0, 0.0]);
    assert_eq!(output.thermal_conductivity(1), &[15.0, 400.0, 30.0, 0.0]);
}

#[test]
fn material_table_panics_on_unknown_material() {
    let table = steel_and_copper();
    let ids = [0, 5, 0];
    let mut output = BatchProperties::new(2, 4);
    util::assert_panics!(table.evaluate_batch(&query(&ids), None, &mut output));
}

#[test]
fn material_table_serde_roundtrip() {
    let table = steel_and_copper();
    let json = serde_json::to_string(&table).unwrap();
    let deserialized: MaterialTable<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, table);
}
