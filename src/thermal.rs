//! The matrix-free heat diffusion operator.
use crate::allocators::DimAllocator;
use crate::constraints::AffineConstraints;
use crate::dofs::DofHandler;
use crate::material::{compute_constants, BatchProperties, MaterialPropertySource};
use crate::matrix_free::{DstMode, EvaluationFlags, LaneTable, MatrixFree, MatrixFreeConfig};
use crate::operator::Operator;
use crate::parallel::DistributedVector;
use crate::quadrature::univariate::gauss_lobatto;
use crate::quadrature::Rule;
use crate::{Real, SmallDim, VectorizedReal};
use eyre::eyre;
use itertools::izip;
use log::{debug, warn};
use nalgebra::DefaultAllocator;

/// Matrix-free discretization of heat diffusion with `Q_P` elements in `D` dimensions.
///
/// Applying the operator computes `dst = A src` with
/// `A_ij = integral of beta grad(phi_j) . grad(phi_i)`, the symmetric positive semi-definite weak
/// form of `-div(beta grad u)`. The diffusivity `beta = k / (rho c_p)` and the inverse heat
/// capacity `alpha = 1 / (rho c_p)` are cached per cell batch and quadrature point.
///
/// The lifecycle is [`setup_dofs`](Self::setup_dofs), then [`reinit`](Self::reinit), then any
/// number of applications interleaved with
/// [`evaluate_material_properties`](Self::evaluate_material_properties). The material property
/// source is borrowed and must outlive the operator.
///
/// The inverse of the lumped mass matrix is computed once by `reinit` and is not refreshed when
/// material properties are re-evaluated.
#[derive(Debug)]
pub struct ThermalOperator<'s, T, D, const P: usize, M: ?Sized>
where
    T: VectorizedReal,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    material_properties: &'s M,
    config: MatrixFreeConfig,
    engine: MatrixFree<T, D, P>,
    alpha: LaneTable<T>,
    beta: LaneTable<T>,
    thermal_conductivity: LaneTable<T>,
    inverse_mass_matrix: DistributedVector<T>,
}

impl<'s, T, D, const P: usize, M: ?Sized> ThermalOperator<'s, T, D, P, M>
where
    T: VectorizedReal,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new(material_properties: &'s M) -> Self {
        Self::with_config(material_properties, MatrixFreeConfig::default())
    }

    pub fn with_config(material_properties: &'s M, config: MatrixFreeConfig) -> Self {
        Self {
            material_properties,
            engine: MatrixFree::empty(config.clone()),
            config,
            alpha: LaneTable::default(),
            beta: LaneTable::default(),
            thermal_conductivity: LaneTable::default(),
            inverse_mass_matrix: DistributedVector::empty(),
        }
    }

    /// Binds the operator to a dof numbering, its constraints and a one-dimensional quadrature
    /// rule, whose tensor product is used on every cell.
    ///
    /// Replaces any previous binding and discards cached coefficients and the inverse mass
    /// matrix, so [`reinit`](Self::reinit) must be called before the operator is applied again.
    ///
    /// This is a collective operation.
    pub fn setup_dofs(
        &mut self,
        dof_handler: &DofHandler<'_, T, D>,
        constraints: &AffineConstraints<T>,
        quadrature: &Rule<1>,
    ) -> eyre::Result<()> {
        self.engine = MatrixFree::new(dof_handler, constraints, quadrature, self.config.clone())?;
        self.alpha.clear();
        self.beta.clear();
        self.thermal_conductivity.clear();
        self.inverse_mass_matrix = DistributedVector::empty();
        Ok(())
    }

    /// Releases the evaluation engine, the coefficient tables and the inverse mass matrix.
    pub fn clear(&mut self) {
        self.engine.clear();
        self.alpha.clear();
        self.beta.clear();
        self.thermal_conductivity.clear();
        self.inverse_mass_matrix = DistributedVector::empty();
    }

    pub fn material_properties(&self) -> &'s M {
        self.material_properties
    }

    /// The inverse of the diagonal mass matrix. Entries of constrained degrees of freedom are zero.
    pub fn inverse_mass_matrix(&self) -> &DistributedVector<T> {
        &self.inverse_mass_matrix
    }

    pub fn evaluation_engine(&self) -> &MatrixFree<T, D, P> {
        &self.engine
    }

    pub fn alpha(&self) -> &LaneTable<T> {
        &self.alpha
    }

    pub fn beta(&self) -> &LaneTable<T> {
        &self.beta
    }

    pub fn thermal_conductivity(&self) -> &LaneTable<T> {
        &self.thermal_conductivity
    }

    fn assert_coefficients_match_engine(&self) {
        let engine = &self.engine;
        let expected = (engine.n_batches(), engine.n_q_points());
        assert!(
            self.beta.extents() == expected && self.beta.n_lanes() == engine.n_lanes(),
            "Coefficient tables {:?} do not match the evaluation engine layout {:?}; \
             reinit must follow setup_dofs",
            self.beta.extents(),
            expected
        );
    }

    fn apply_impl(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>, mode: DstMode) {
        self.assert_coefficients_match_engine();
        let beta = &self.beta;
        self.engine
            .cell_loop(dst, src, mode, |evaluator, src_local, dst_local| {
                evaluator.gather(src_local);
                evaluator.evaluate(EvaluationFlags::GRADIENTS);
                let lanes = evaluator.n_lanes();
                let batch = evaluator.batch();
                for q in 0..evaluator.n_q_points() {
                    let coefficient = beta.lanes(batch, q);
                    for component in evaluator.gradient_mut(q).chunks_exact_mut(lanes) {
                        for (g, &c) in izip!(component, coefficient) {
                            *g *= c;
                        }
                    }
                }
                evaluator.integrate(EvaluationFlags::GRADIENTS);
                evaluator.scatter_add(dst_local);
            });
    }
}

impl<'s, T, D, const P: usize, M> ThermalOperator<'s, T, D, P, M>
where
    T: VectorizedReal,
    D: SmallDim,
    M: ?Sized + MaterialPropertySource<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Computes the coefficient tables from the reference state of the material property source
    /// and the inverse mass matrix.
    ///
    /// `dof_handler` and `constraints` must be the ones passed to
    /// [`setup_dofs`](Self::setup_dofs).
    ///
    /// This is a collective operation.
    pub fn reinit(&mut self, dof_handler: &DofHandler<'_, T, D>, constraints: &AffineConstraints<T>) -> eyre::Result<()> {
        if self.engine.n_dofs() != dof_handler.n_dofs() {
            return Err(eyre!(
                "The evaluation engine knows {} dofs but the dof handler has {}; setup_dofs must precede reinit",
                self.engine.n_dofs(),
                dof_handler.n_dofs()
            ));
        }

        let engine = &self.engine;
        let (n_batches, n_q_points, n_lanes) = (engine.n_batches(), engine.n_q_points(), engine.n_lanes());
        self.alpha.reinit(n_batches, n_q_points, n_lanes);
        self.beta.reinit(n_batches, n_q_points, n_lanes);
        self.thermal_conductivity
            .reinit(n_batches, n_q_points, n_lanes);

        let mut properties = BatchProperties::new(n_q_points, n_lanes);
        for batch in 0..n_batches {
            properties.reset();
            self.material_properties
                .evaluate_batch(&engine.batch_query(batch), None, &mut properties);
            store_coefficients(
                [&mut self.alpha, &mut self.beta, &mut self.thermal_conductivity],
                batch,
                &properties,
                engine.n_active_lanes(batch),
            );
        }

        self.inverse_mass_matrix = self.compute_inverse_mass_matrix(dof_handler, constraints)?;
        debug!(
            "Reinitialized thermal operator: {} dofs, {} batches, {} quadrature points per cell",
            self.engine.n_dofs(),
            n_batches,
            n_q_points
        );
        Ok(())
    }

    /// Re-evaluates the coefficient tables with the temperature sampled at every quadrature
    /// point. The inverse mass matrix is left unchanged.
    ///
    /// The temperature is interpolated from its stored nodal values, including those of
    /// constrained degrees of freedom.
    ///
    /// This is a collective operation.
    pub fn evaluate_material_properties(&mut self, temperature: &DistributedVector<T>) {
        self.assert_coefficients_match_engine();
        let engine = &self.engine;
        let (n_q_points, n_lanes) = (engine.n_q_points(), engine.n_lanes());
        let material_properties = self.material_properties;
        let tables = [&mut self.alpha, &mut self.beta, &mut self.thermal_conductivity];

        let mut properties = BatchProperties::new(n_q_points, n_lanes);
        let mut samples = vec![T::zero(); n_q_points * n_lanes];
        let [alpha, beta, conductivity] = tables;
        engine.for_each_batch(temperature, |evaluator, src_local| {
            evaluator.gather_plain(src_local);
            evaluator.evaluate(EvaluationFlags::VALUES);
            for (q, sample) in samples.chunks_exact_mut(n_lanes).enumerate() {
                sample.copy_from_slice(evaluator.value(q));
            }
            properties.reset();
            material_properties.evaluate_batch(&evaluator.batch_query(), Some(samples.as_slice()), &mut properties);
            store_coefficients(
                [&mut *alpha, &mut *beta, &mut *conductivity],
                evaluator.batch(),
                &properties,
                evaluator.n_active_lanes(),
            );
        });
    }

    fn compute_inverse_mass_matrix(
        &self,
        dof_handler: &DofHandler<'_, T, D>,
        constraints: &AffineConstraints<T>,
    ) -> eyre::Result<DistributedVector<T>> {
        // Collocating quadrature and element nodes makes the mass matrix diagonal
        let rule = gauss_lobatto(P + 1)?;
        let mass_engine = MatrixFree::<T, D, P>::new(dof_handler, constraints, &rule, self.config.clone())?;

        let mut ones = mass_engine.initialize_dof_vector();
        ones.fill(T::one());
        let mut inverse_mass = mass_engine.initialize_dof_vector();
        mass_engine.cell_loop(&mut inverse_mass, &ones, DstMode::Overwrite, |evaluator, src_local, dst_local| {
            evaluator.gather(src_local);
            evaluator.evaluate(EvaluationFlags::VALUES);
            evaluator.integrate(EvaluationFlags::VALUES);
            evaluator.scatter_add(dst_local);
        });

        let start = inverse_mass.owned_range().start;
        let mut non_positive = 0;
        for (offset, entry) in inverse_mass.owned_values_mut().iter_mut().enumerate() {
            if *entry > T::zero() {
                *entry = T::one() / *entry;
            } else {
                if !constraints.is_constrained(start + offset) {
                    non_positive += 1;
                }
                *entry = T::zero();
            }
        }
        constraints.set_zero(&mut inverse_mass);
        if non_positive > 0 {
            warn!(
                "{} unconstrained dofs have a non-positive lumped mass; their inverse mass is set to zero",
                non_positive
            );
        }
        Ok(inverse_mass)
    }
}

fn store_coefficients<T: Real>(
    [alpha, beta, conductivity]: [&mut LaneTable<T>; 3],
    batch: usize,
    properties: &BatchProperties<T>,
    n_active_lanes: usize,
) {
    for q in 0..properties.n_q_points() {
        let lanes = izip!(
            alpha.lanes_mut(batch, q),
            beta.lanes_mut(batch, q),
            conductivity.lanes_mut(batch, q)
        );
        for (lane, (a, b, k)) in lanes.enumerate() {
            if lane < n_active_lanes {
                let point_properties = properties.get(q, lane);
                let (alpha, beta) = compute_constants(&point_properties);
                *a = alpha;
                *b = beta;
                *k = point_properties.thermal_conductivity;
            } else {
                *a = T::zero();
                *b = T::zero();
                *k = T::zero();
            }
        }
    }
}

impl<'s, T, D, const P: usize, M: ?Sized> Operator<T> for ThermalOperator<'s, T, D, P, M>
where
    T: VectorizedReal,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn row_count(&self) -> usize {
        self.engine.n_dofs()
    }

    fn column_count(&self) -> usize {
        self.engine.n_dofs()
    }

    fn apply(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>) {
        self.apply_impl(dst, src, DstMode::Overwrite);
    }

    fn apply_add(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>) {
        self.apply_impl(dst, src, DstMode::Accumulate);
    }

    /// The operator is symmetric, so this is the same as [`apply`](Self::apply).
    fn apply_transpose(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>) {
        self.apply(dst, src);
    }

    /// The operator is symmetric, so this is the same as [`apply_add`](Self::apply_add).
    fn apply_transpose_add(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>) {
        self.apply_add(dst, src);
    }

    /// Coefficients are frozen between calls to `evaluate_material_properties`, so the operator is
    /// its own Jacobian.
    fn apply_linearized(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>) {
        self.apply(dst, src);
    }
}
