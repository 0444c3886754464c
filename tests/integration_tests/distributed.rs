use super::run_on_ranks;
use fenris_thermal::constraints::AffineConstraints;
use fenris_thermal::dofs::DofHandler;
use fenris_thermal::material::{MaterialModel, MaterialTable, PropertyCurve};
use fenris_thermal::matrix_free::MatrixFreeConfig;
use fenris_thermal::mesh::procedural::create_unit_square_uniform_quad_mesh_2d;
use fenris_thermal::mesh::QuadMesh2d;
use fenris_thermal::nalgebra::{Point2, U2};
use fenris_thermal::operator::Operator;
use fenris_thermal::parallel::{DistributedVector, Partitioner};
use fenris_thermal::quadrature::univariate::gauss;
use fenris_thermal::thermal::ThermalOperator;
use matrixcompare::assert_scalar_eq;
use std::ops::Range;
use std::sync::Arc;

const CELLS_PER_DIM: usize = 4;

/// Results of one rank, restricted to its owned degrees of freedom.
#[derive(Debug)]
struct RankResult {
    owned: Range<usize>,
    reference_apply: Vec<f64>,
    inverse_mass: Vec<f64>,
    heated_apply: Vec<f64>,
    energy: f64,
}

fn cell_owners(n_ranks: usize) -> Vec<usize> {
    // Vertical strips of cells
    (0..CELLS_PER_DIM * CELLS_PER_DIM)
        .map(|cell| (cell % CELLS_PER_DIM) * n_ranks / CELLS_PER_DIM)
        .collect()
}

fn material() -> MaterialTable<f64> {
    let model = MaterialModel {
        density: PropertyCurve::Constant(2.0),
        specific_heat: PropertyCurve::Constant(0.5),
        thermal_conductivity: PropertyCurve::piecewise_linear(vec![(300.0, 1.0), (700.0, 2.0)]).unwrap(),
        reference_temperature: 300.0,
    };
    MaterialTable::new().with_model(0, model)
}

fn find_dof(dofs: &DofHandler<'_, f64, U2>, x: f64, y: f64) -> usize {
    let target = Point2::new(x, y);
    dofs.support_points()
        .iter()
        .position(|p| (p - target).norm() < 1e-12)
        .expect("No dof at the requested point")
}

/// Homogeneous Dirichlet conditions on the boundary and a constraint tying a node on the rank
/// interface to its neighbors above and below.
fn constraints(dofs: &DofHandler<'_, f64, U2>) -> AffineConstraints<f64> {
    let mut constraints = AffineConstraints::new();
    constraints.constrain_homogeneous(dofs.boundary_dofs());
    let center = find_dof(dofs, 0.5, 0.5);
    constraints.add_entry(center, find_dof(dofs, 0.5, 0.375), 0.5);
    constraints.add_entry(center, find_dof(dofs, 0.5, 0.625), 0.5);
    constraints.close().unwrap();
    constraints
}

fn source(x: &Point2<f64>) -> f64 {
    (3.0 * x[0]).sin() + x[1] * x[1] - x[0] * x[1]
}

fn temperature(x: &Point2<f64>) -> f64 {
    300.0 + 400.0 * x[0] * x[1]
}

fn evaluate(dofs: &DofHandler<'_, f64, U2>, config: MatrixFreeConfig) -> RankResult {
    let material = material();
    let constraints = constraints(dofs);
    let mut operator = ThermalOperator::<_, U2, 2, _>::with_config(&material, config);
    operator.setup_dofs(dofs, &constraints, &gauss(3)).unwrap();
    operator.reinit(dofs, &constraints).unwrap();

    let partitioner = operator.evaluation_engine().partitioner().clone();
    let u = DistributedVector::from_fn(partitioner.clone(), |i| source(dofs.support_point(i)));
    let mut result = operator.evaluation_engine().initialize_dof_vector();
    operator.apply(&mut result, &u);
    let reference_apply = result.owned_values().to_vec();
    let energy = u.dot(&result);

    let heat = DistributedVector::from_fn(partitioner, |i| temperature(dofs.support_point(i)));
    operator.evaluate_material_properties(&heat);
    operator.apply(&mut result, &u);

    RankResult {
        owned: result.owned_range(),
        reference_apply,
        inverse_mass: operator.inverse_mass_matrix().owned_values().to_vec(),
        heated_apply: result.owned_values().to_vec(),
        energy,
    }
}

fn assert_distributed_matches_serial(mesh: &QuadMesh2d<f64>, n_ranks: usize, config: MatrixFreeConfig) {
    let owners = cell_owners(n_ranks);

    let mut serial_dofs = DofHandler::new(mesh, 2).unwrap();
    serial_dofs.renumber_by_cell_owner(&owners).unwrap();
    let serial = evaluate(&serial_dofs, config.clone());

    let ranks = run_on_ranks(n_ranks, |communicator| {
        let dofs = DofHandler::new(mesh, 2)
            .unwrap()
            .distribute(communicator, owners.clone())
            .unwrap();
        evaluate(&dofs, config.clone())
    });

    let mut next = 0;
    for rank in &ranks {
        assert_eq!(rank.owned.start, next);
        assert!(!rank.owned.is_empty());
        next = rank.owned.end;

        let owned = rank.owned.clone();
        util::assert_slices_approx_eq!(rank.reference_apply, serial.reference_apply[owned.clone()], abstol = 1e-12);
        util::assert_slices_approx_eq!(rank.inverse_mass, serial.inverse_mass[owned.clone()], abstol = 1e-12);
        util::assert_slices_approx_eq!(rank.heated_apply, serial.heated_apply[owned], abstol = 1e-12);
        assert_scalar_eq!(rank.energy, serial.energy, comp = abs, tol = 1e-11);
    }
    assert_eq!(next, serial_dofs.n_dofs());
}

#[test]
fn distributed_operator_matches_serial_operator() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(CELLS_PER_DIM);
    for n_ranks in [2, 3] {
        assert_distributed_matches_serial(&mesh, n_ranks, MatrixFreeConfig::default());
    }
}

#[test]
fn distributed_operator_with_rank_owning_no_cells() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(CELLS_PER_DIM);
    let owners: Vec<usize> = cell_owners(2);
    let ranks = run_on_ranks(3, |communicator| {
        let dofs = DofHandler::new(&mesh, 2)
            .unwrap()
            .distribute(communicator, owners.clone())
            .unwrap();
        let material = material();
        let constraints = constraints(&dofs);
        let mut operator = ThermalOperator::<_, U2, 2, _>::new(&material);
        operator.setup_dofs(&dofs, &constraints, &gauss(3)).unwrap();
        operator.reinit(&dofs, &constraints).unwrap();

        let u = DistributedVector::from_fn(operator.evaluation_engine().partitioner().clone(), |i| {
            source(dofs.support_point(i))
        });
        let mut result = operator.evaluation_engine().initialize_dof_vector();
        operator.apply(&mut result, &u);
        (operator.evaluation_engine().n_cells(), result.owned_values().len(), result.dot(&u))
    });

    assert_eq!(ranks[2].0, 0);
    assert_eq!(ranks[2].1, 0);
    assert!(ranks.iter().all(|rank| rank.2 == ranks[0].2));
}

#[test]
fn apply_into_vector_without_ghosts_matches_engine_layout() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(CELLS_PER_DIM);
    let owners = cell_owners(2);
    let ranks = run_on_ranks(2, |communicator| {
        let dofs = DofHandler::new(&mesh, 2)
            .unwrap()
            .distribute(communicator, owners.clone())
            .unwrap();
        let material = material();
        let constraints = constraints(&dofs);
        let mut operator = ThermalOperator::<_, U2, 2, _>::new(&material);
        operator.setup_dofs(&dofs, &constraints, &gauss(3)).unwrap();
        operator.reinit(&dofs, &constraints).unwrap();

        let engine_partitioner = operator.evaluation_engine().partitioner().clone();
        let u = DistributedVector::from_fn(engine_partitioner, |i| source(dofs.support_point(i)));
        let mut expected = operator.evaluation_engine().initialize_dof_vector();
        operator.apply(&mut expected, &u);

        let plain = Partitioner::new(dofs.communicator().clone(), dofs.owned_ranges().to_vec(), vec![]).unwrap();
        let mut result = DistributedVector::zeros(Arc::new(plain));
        operator.apply(&mut result, &u);
        operator.apply_add(&mut result, &u);

        let n_ghosts = operator.evaluation_engine().partitioner().n_ghosts();
        (n_ghosts, expected.owned_values().to_vec(), result.owned_values().to_vec())
    });

    // Interface dofs are owned by rank 0, so only rank 1 has ghosts
    assert!(ranks[1].0 > 0);
    for (_, expected, result) in &ranks {
        let doubled: Vec<f64> = expected.iter().map(|x| 2.0 * x).collect();
        util::assert_slices_approx_eq!(result[..], doubled[..], abstol = 1e-12);
    }
}
