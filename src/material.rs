//! Material property sources consumed by thermal operators.
//!
//! A source fills per-quadrature-point density, specific heat and thermal conductivity for one
//! cell batch at a time, optionally as a function of the local temperature.
use crate::mesh::MaterialId;
use crate::Real;
use eyre::eyre;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, OVector, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialProperties<T> {
    pub density: T,
    pub specific_heat: T,
    pub thermal_conductivity: T,
}

impl<T: Real> MaterialProperties<T> {
    pub fn new(density: T, specific_heat: T, thermal_conductivity: T) -> Self {
        Self {
            density,
            specific_heat,
            thermal_conductivity,
        }
    }
}

/// Computes the coefficients `(alpha, beta)` of the heat equation from material properties.
///
/// `alpha = 1 / (density * specific_heat)` is the inverse volumetric heat capacity and
/// `beta = thermal_conductivity * alpha` the thermal diffusivity. Degenerate inputs are not
/// validated and propagate as infinite or NaN coefficients.
pub fn compute_constants<T: Real>(properties: &MaterialProperties<T>) -> (T, T) {
    let alpha = T::one() / (properties.density * properties.specific_heat);
    let beta = properties.thermal_conductivity * alpha;
    (alpha, beta)
}

/// Cells and quadrature points of a cell batch, as seen by a [`MaterialPropertySource`].
#[derive(Debug, Clone, Copy)]
pub struct BatchQuery<'a, T, D> {
    cells: &'a [usize],
    material_ids: &'a [MaterialId],
    // [q][axis][lane]
    points: &'a [T],
    n_q_points: usize,
    n_lanes: usize,
    marker: PhantomData<D>,
}

impl<'a, T, D> BatchQuery<'a, T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Creates a query from batch data. `points` holds the physical quadrature point coordinates
    /// stored `[q][axis][lane]`.
    pub fn new(
        cells: &'a [usize],
        material_ids: &'a [MaterialId],
        points: &'a [T],
        n_q_points: usize,
        n_lanes: usize,
    ) -> Self {
        assert_eq!(cells.len(), material_ids.len());
        assert!(cells.len() <= n_lanes, "A batch cannot hold more cells than lanes");
        assert_eq!(points.len(), n_q_points * D::dim() * n_lanes);
        Self {
            cells,
            material_ids,
            points,
            n_q_points,
            n_lanes,
            marker: PhantomData,
        }
    }

    /// Mesh indices of the cells of the batch, one per active lane.
    pub fn cells(&self) -> &'a [usize] {
        self.cells
    }

    pub fn material_ids(&self) -> &'a [MaterialId] {
        self.material_ids
    }

    pub fn n_active_lanes(&self) -> usize {
        self.cells.len()
    }

    pub fn n_lanes(&self) -> usize {
        self.n_lanes
    }

    pub fn n_q_points(&self) -> usize {
        self.n_q_points
    }

    /// Physical coordinates of quadrature point `q` of the cell in `lane`.
    pub fn point(&self, q: usize, lane: usize) -> OPoint<T, D> {
        let dim = D::dim();
        let lanes = self.n_lanes;
        OPoint::from(OVector::<T, D>::from_fn(|d, _| {
            self.points[(q * dim + d) * lanes + lane].clone()
        }))
    }
}

/// Per-quadrature-point material properties of a cell batch, stored `[q][lane]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProperties<T> {
    n_q_points: usize,
    n_lanes: usize,
    density: Vec<T>,
    specific_heat: Vec<T>,
    thermal_conductivity: Vec<T>,
}

impl<T: Real> BatchProperties<T> {
    pub fn new(n_q_points: usize, n_lanes: usize) -> Self {
        let len = n_q_points * n_lanes;
        Self {
            n_q_points,
            n_lanes,
            density: vec![T::zero(); len],
            specific_heat: vec![T::zero(); len],
            thermal_conductivity: vec![T::zero(); len],
        }
    }

    pub fn n_q_points(&self) -> usize {
        self.n_q_points
    }

    pub fn n_lanes(&self) -> usize {
        self.n_lanes
    }

    /// Zeros all entries.
    pub fn reset(&mut self) {
        self.density.fill(T::zero());
        self.specific_heat.fill(T::zero());
        self.thermal_conductivity.fill(T::zero());
    }

    pub fn set(&mut self, q: usize, lane: usize, properties: &MaterialProperties<T>) {
        let index = self.index(q, lane);
        self.density[index] = properties.density;
        self.specific_heat[index] = properties.specific_heat;
        self.thermal_conductivity[index] = properties.thermal_conductivity;
    }

    pub fn get(&self, q: usize, lane: usize) -> MaterialProperties<T> {
        let index = self.index(q, lane);
        MaterialProperties {
            density: self.density[index],
            specific_heat: self.specific_heat[index],
            thermal_conductivity: self.thermal_conductivity[index],
        }
    }

    pub fn density(&self, q: usize) -> &[T] {
        &self.density[q * self.n_lanes..(q + 1) * self.n_lanes]
    }

    pub fn specific_heat(&self, q: usize) -> &[T] {
        &self.specific_heat[q * self.n_lanes..(q + 1) * self.n_lanes]
    }

    pub fn thermal_conductivity(&self, q: usize) -> &[T] {
        &self.thermal_conductivity[q * self.n_lanes..(q + 1) * self.n_lanes]
    }

    fn index(&self, q: usize, lane: usize) -> usize {
        assert!(q < self.n_q_points && lane < self.n_lanes, "Batch property index out of bounds");
        q * self.n_lanes + lane
    }
}

/// A provider of material properties at the quadrature points of cell batches.
pub trait MaterialPropertySource<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Fills `output` for the active lanes of the batch described by `query`.
    ///
    /// If given, `temperature` holds the temperature at every quadrature point, stored
    /// `[q][lane]`. Without it, the source evaluates its reference state.
    fn evaluate_batch(
        &self,
        query: &BatchQuery<'_, T, D>,
        temperature: Option<&[T]>,
        output: &mut BatchProperties<T>,
    );
}

/// Helper for sources that evaluate each quadrature point independently.
fn evaluate_pointwise<T, D, F>(
    query: &BatchQuery<'_, T, D>,
    temperature: Option<&[T]>,
    output: &mut BatchProperties<T>,
    mut f: F,
) where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
    F: FnMut(&BatchQuery<'_, T, D>, usize, usize, Option<T>) -> MaterialProperties<T>,
{
    let lanes = query.n_lanes();
    if let Some(temperature) = temperature {
        assert_eq!(temperature.len(), query.n_q_points() * lanes, "Temperature samples do not match the batch");
    }
    for q in 0..query.n_q_points() {
        for lane in 0..query.n_active_lanes() {
            let t = temperature.map(|temperature| temperature[q * lanes + lane]);
            let properties = f(query, q, lane, t);
            output.set(q, lane, &properties);
        }
    }
}

/// The same properties everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformMaterial<T>(pub MaterialProperties<T>);

impl<T, D> MaterialPropertySource<T, D> for UniformMaterial<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn evaluate_batch(
        &self,
        query: &BatchQuery<'_, T, D>,
        temperature: Option<&[T]>,
        output: &mut BatchProperties<T>,
    ) {
        evaluate_pointwise(query, temperature, output, |_, _, _, _| self.0);
    }
}

/// Properties given by a function of position, material and (optional) temperature.
#[derive(Debug, Clone, Copy)]
pub struct PointwiseMaterial<F>(pub F);

impl<T, D, F> MaterialPropertySource<T, D> for PointwiseMaterial<F>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
    F: Fn(&OPoint<T, D>, MaterialId, Option<T>) -> MaterialProperties<T>,
{
    fn evaluate_batch(
        &self,
        query: &BatchQuery<'_, T, D>,
        temperature: Option<&[T]>,
        output: &mut BatchProperties<T>,
    ) {
        evaluate_pointwise(query, temperature, output, |query, q, lane, t| {
            (self.0)(&query.point(q, lane), query.material_ids()[lane], t)
        });
    }
}

/// A scalar property as a function of temperature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyCurve<T> {
    Constant(T),
    /// Linear interpolation between `(temperature, value)` samples with strictly increasing
    /// temperatures, held constant outside the sampled range.
    PiecewiseLinear(Vec<(T, T)>),
}

impl<T: Real> PropertyCurve<T> {
    pub fn piecewise_linear(samples: Vec<(T, T)>) -> eyre::Result<Self> {
        if samples.is_empty() {
            return Err(eyre!("A piecewise linear property curve needs at least one sample"));
        }
        if samples.windows(2).any(|pair| pair[1].0 <= pair[0].0) {
            return Err(eyre!("Temperatures of a property curve must be strictly increasing"));
        }
        Ok(Self::PiecewiseLinear(samples))
    }

    pub fn evaluate(&self, temperature: T) -> T {
        match self {
            Self::Constant(value) => *value,
            Self::PiecewiseLinear(samples) => {
                let next = samples.partition_point(|&(t, _)| t <= temperature);
                if next == 0 {
                    samples[0].1
                } else if next == samples.len() {
                    samples[samples.len() - 1].1
                } else {
                    let (t0, v0) = samples[next - 1];
                    let (t1, v1) = samples[next];
                    let theta = (temperature - t0) / (t1 - t0);
                    v0 + (v1 - v0) * theta
                }
            }
        }
    }
}

/// Temperature-dependent properties of a single material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialModel<T> {
    pub density: PropertyCurve<T>,
    pub specific_heat: PropertyCurve<T>,
    pub thermal_conductivity: PropertyCurve<T>,
    /// Temperature at which the reference state is evaluated.
    pub reference_temperature: T,
}

impl<T: Real> MaterialModel<T> {
    pub fn constant(properties: MaterialProperties<T>) -> Self {
        Self {
            density: PropertyCurve::Constant(properties.density),
            specific_heat: PropertyCurve::Constant(properties.specific_heat),
            thermal_conductivity: PropertyCurve::Constant(properties.thermal_conductivity),
            reference_temperature: T::zero(),
        }
    }

    pub fn properties_at(&self, temperature: T) -> MaterialProperties<T> {
        MaterialProperties {
            density: self.density.evaluate(temperature),
            specific_heat: self.specific_heat.evaluate(temperature),
            thermal_conductivity: self.thermal_conductivity.evaluate(temperature),
        }
    }
}

/// Material models indexed by the material id of each cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialTable<T> {
    models: BTreeMap<MaterialId, MaterialModel<T>>,
}

impl<T: Real> Default for MaterialTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> MaterialTable<T> {
    pub fn new() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, id: MaterialId, model: MaterialModel<T>) -> Self {
        self.insert(id, model);
        self
    }

    pub fn insert(&mut self, id: MaterialId, model: MaterialModel<T>) {
        self.models.insert(id, model);
    }

    pub fn model(&self, id: MaterialId) -> Option<&MaterialModel<T>> {
        self.models.get(&id)
    }
}

impl<T, D> MaterialPropertySource<T, D> for MaterialTable<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// # Panics
    ///
    /// Panics if a cell has a material id without a model.
    fn evaluate_batch(
        &self,
        query: &BatchQuery<'_, T, D>,
        temperature: Option<&[T]>,
        output: &mut BatchProperties<T>,
    ) {
        evaluate_pointwise(query, temperature, output, |query, _, lane, t| {
            let id = query.material_ids()[lane];
            let model = self
                .models
                .get(&id)
                .unwrap_or_else(|| panic!("No material model for material id {}", id));
            model.properties_at(t.unwrap_or(model.reference_temperature))
        });
    }
}
