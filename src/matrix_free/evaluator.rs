use crate::allocators::DimAllocator;
use crate::material::BatchQuery;
use crate::matrix_free::MatrixFree;
use crate::mesh::MaterialId;
use crate::{SmallDim, VectorizedReal};
use nalgebra::{DefaultAllocator, OPoint, OVector};
use std::ops::BitOr;

/// Selects which quantities [`CellBatchEvaluator::evaluate`] computes and which
/// [`CellBatchEvaluator::integrate`] tests against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationFlags {
    pub values: bool,
    pub gradients: bool,
}

impl EvaluationFlags {
    pub const NOTHING: Self = Self {
        values: false,
        gradients: false,
    };
    pub const VALUES: Self = Self {
        values: true,
        gradients: false,
    };
    pub const GRADIENTS: Self = Self {
        values: false,
        gradients: true,
    };
}

impl BitOr for EvaluationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            values: self.values || rhs.values,
            gradients: self.gradients || rhs.gradients,
        }
    }
}

/// Evaluates finite element functions on one cell batch at a time.
///
/// All per-cell data is stored with the lane index running fastest: cell-local degrees of freedom
/// as `[node][lane]`, values as `[q][lane]` and gradients as `[q][axis][lane]`. Lanes past
/// [`n_active_lanes`](Self::n_active_lanes) hold zeros.
#[derive(Debug)]
pub struct CellBatchEvaluator<'a, T, D, const P: usize>
where
    T: VectorizedReal,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    engine: &'a MatrixFree<T, D, P>,
    batch: usize,
    dof_values: Vec<T>,
    values: Vec<T>,
    gradients: Vec<T>,
    // [axis][lane]
    scratch: Vec<T>,
}

impl<'a, T, D, const P: usize> CellBatchEvaluator<'a, T, D, P>
where
    T: VectorizedReal,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new(engine: &'a MatrixFree<T, D, P>) -> Self {
        let lanes = engine.n_lanes;
        let dim = D::dim();
        Self {
            engine,
            batch: 0,
            dof_values: vec![T::zero(); engine.dofs_per_cell * lanes],
            values: vec![T::zero(); engine.n_q_points * lanes],
            gradients: vec![T::zero(); engine.n_q_points * dim * lanes],
            scratch: vec![T::zero(); dim * lanes],
        }
    }

    /// Positions the evaluator at the given batch.
    pub fn reinit(&mut self, batch: usize) {
        assert!(batch < self.engine.n_batches, "Batch index out of bounds");
        self.batch = batch;
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn n_lanes(&self) -> usize {
        self.engine.n_lanes
    }

    pub fn n_active_lanes(&self) -> usize {
        self.engine.n_active_lanes(self.batch)
    }

    pub fn n_q_points(&self) -> usize {
        self.engine.n_q_points
    }

    pub fn dofs_per_cell(&self) -> usize {
        self.engine.dofs_per_cell
    }

    pub fn cells(&self) -> &[usize] {
        self.engine.batch_cells(self.batch)
    }

    pub fn material_ids(&self) -> &[MaterialId] {
        self.engine.batch_material_ids(self.batch)
    }

    pub fn batch_query(&self) -> BatchQuery<'a, T, D> {
        self.engine.batch_query(self.batch)
    }

    /// Reads the cell-local degrees of freedom from local vector storage, resolving constrained
    /// degrees of freedom through their homogeneous constraints.
    pub fn gather(&mut self, src_local: &[T]) {
        self.gather_impl(src_local, true);
    }

    /// Reads the cell-local degrees of freedom from local vector storage as stored, ignoring
    /// constraints.
    pub fn gather_plain(&mut self, src_local: &[T]) {
        self.gather_impl(src_local, false);
    }

    fn gather_impl(&mut self, src_local: &[T], resolve_constraints: bool) {
        let engine = self.engine;
        let lanes = engine.n_lanes;
        let n_dofs = engine.dofs_per_cell;
        self.dof_values.fill(T::zero());
        for lane in 0..self.n_active_lanes() {
            let position = self.batch * lanes + lane;
            let targets = &engine.dof_targets[position * n_dofs..(position + 1) * n_dofs];
            for (node, target) in targets.iter().enumerate() {
                self.dof_values[node * lanes + lane] = match target.constraint {
                    Some((start, end)) if resolve_constraints => engine.constraint_entries[start..end]
                        .iter()
                        .fold(T::zero(), |acc, &(index, weight)| acc + weight * src_local[index]),
                    _ => src_local[target.local],
                };
            }
        }
    }

    /// Interpolates values and/or physical gradients at the quadrature points.
    pub fn evaluate(&mut self, flags: EvaluationFlags) {
        let engine = self.engine;
        let lanes = engine.n_lanes;
        let n_dofs = engine.dofs_per_cell;
        let dim = D::dim();

        if flags.values {
            for q in 0..engine.n_q_points {
                let phi = &engine.shape_values[q * n_dofs..(q + 1) * n_dofs];
                let out = &mut self.values[q * lanes..(q + 1) * lanes];
                out.fill(T::zero());
                for (&phi_i, u_i) in phi.iter().zip(self.dof_values.chunks_exact(lanes)) {
                    for (o, &u) in out.iter_mut().zip(u_i) {
                        *o += phi_i * u;
                    }
                }
            }
        }

        if flags.gradients {
            for q in 0..engine.n_q_points {
                // Reference gradient
                self.scratch.fill(T::zero());
                let dphi = &engine.shape_gradients[q * n_dofs * dim..(q + 1) * n_dofs * dim];
                for (dphi_i, u_i) in dphi.chunks_exact(dim).zip(self.dof_values.chunks_exact(lanes)) {
                    for (&g, scratch_b) in dphi_i.iter().zip(self.scratch.chunks_exact_mut(lanes)) {
                        for (s, &u) in scratch_b.iter_mut().zip(u_i) {
                            *s += g * u;
                        }
                    }
                }

                // Physical gradient: grad_a = sum_b (J^{-1})_{ba} ref_grad_b
                let point = self.batch * engine.n_q_points + q;
                let inverse = &engine.inverse_jacobians[point * dim * dim * lanes..(point + 1) * dim * dim * lanes];
                let out = &mut self.gradients[q * dim * lanes..(q + 1) * dim * lanes];
                out.fill(T::zero());
                for b in 0..dim {
                    let reference = &self.scratch[b * lanes..(b + 1) * lanes];
                    for a in 0..dim {
                        let inverse_ba = &inverse[(b * dim + a) * lanes..(b * dim + a + 1) * lanes];
                        let out_a = &mut out[a * lanes..(a + 1) * lanes];
                        for ((o, &j), &r) in out_a.iter_mut().zip(inverse_ba).zip(reference) {
                            *o += j * r;
                        }
                    }
                }
            }
        }
    }

    /// Lanes of the value at quadrature point `q`.
    pub fn value(&self, q: usize) -> &[T] {
        let lanes = self.engine.n_lanes;
        &self.values[q * lanes..(q + 1) * lanes]
    }

    pub fn value_mut(&mut self, q: usize) -> &mut [T] {
        let lanes = self.engine.n_lanes;
        &mut self.values[q * lanes..(q + 1) * lanes]
    }

    /// Sets the lanes of the value at quadrature point `q` that [`integrate`](Self::integrate)
    /// tests against.
    pub fn submit_value(&mut self, q: usize, value: &[T]) {
        self.value_mut(q).copy_from_slice(value);
    }

    /// Lanes of the physical gradient at quadrature point `q`, stored `[axis][lane]`.
    pub fn gradient(&self, q: usize) -> &[T] {
        let stride = D::dim() * self.engine.n_lanes;
        &self.gradients[q * stride..(q + 1) * stride]
    }

    pub fn gradient_mut(&mut self, q: usize) -> &mut [T] {
        let stride = D::dim() * self.engine.n_lanes;
        &mut self.gradients[q * stride..(q + 1) * stride]
    }

    /// Sets the lanes of the gradient at quadrature point `q` that
    /// [`integrate`](Self::integrate) tests against, stored `[axis][lane]`.
    pub fn submit_gradient(&mut self, q: usize, gradient: &[T]) {
        self.gradient_mut(q).copy_from_slice(gradient);
    }

    /// Tests the submitted values and/or gradients against all basis functions, weighted with
    /// `JxW`, overwriting the cell-local degrees of freedom with the result.
    pub fn integrate(&mut self, flags: EvaluationFlags) {
        let engine = self.engine;
        let lanes = engine.n_lanes;
        let n_dofs = engine.dofs_per_cell;
        let dim = D::dim();
        self.dof_values.fill(T::zero());

        for q in 0..engine.n_q_points {
            let point = self.batch * engine.n_q_points + q;
            let jxw = &engine.jxw[point * lanes..(point + 1) * lanes];

            if flags.values {
                let scaled = &mut self.scratch[..lanes];
                for ((s, &v), &w) in scaled.iter_mut().zip(&self.values[q * lanes..(q + 1) * lanes]).zip(jxw) {
                    *s = v * w;
                }
                let phi = &engine.shape_values[q * n_dofs..(q + 1) * n_dofs];
                for (&phi_i, out_i) in phi.iter().zip(self.dof_values.chunks_exact_mut(lanes)) {
                    for (o, &s) in out_i.iter_mut().zip(&self.scratch[..lanes]) {
                        *o += phi_i * s;
                    }
                }
            }

            if flags.gradients {
                // Pull the flux back to the reference cell: t_b = JxW sum_a (J^{-1})_{ba} f_a
                let inverse = &engine.inverse_jacobians[point * dim * dim * lanes..(point + 1) * dim * dim * lanes];
                let flux = &self.gradients[q * dim * lanes..(q + 1) * dim * lanes];
                self.scratch.fill(T::zero());
                for b in 0..dim {
                    let t_b = &mut self.scratch[b * lanes..(b + 1) * lanes];
                    for a in 0..dim {
                        let inverse_ba = &inverse[(b * dim + a) * lanes..(b * dim + a + 1) * lanes];
                        let flux_a = &flux[a * lanes..(a + 1) * lanes];
                        for ((t, &j), &f) in t_b.iter_mut().zip(inverse_ba).zip(flux_a) {
                            *t += j * f;
                        }
                    }
                    for (t, &w) in t_b.iter_mut().zip(jxw) {
                        *t *= w;
                    }
                }

                let dphi = &engine.shape_gradients[q * n_dofs * dim..(q + 1) * n_dofs * dim];
                for (dphi_i, out_i) in dphi.chunks_exact(dim).zip(self.dof_values.chunks_exact_mut(lanes)) {
                    for (&g, t_b) in dphi_i.iter().zip(self.scratch.chunks_exact(lanes)) {
                        for (o, &t) in out_i.iter_mut().zip(t_b) {
                            *o += g * t;
                        }
                    }
                }
            }
        }
    }

    /// Adds the cell-local degrees of freedom to local vector storage, distributing constrained
    /// degrees of freedom to their targets.
    pub fn scatter_add(&self, dst_local: &mut [T]) {
        let engine = self.engine;
        let lanes = engine.n_lanes;
        let n_dofs = engine.dofs_per_cell;
        for lane in 0..self.n_active_lanes() {
            let position = self.batch * lanes + lane;
            let targets = &engine.dof_targets[position * n_dofs..(position + 1) * n_dofs];
            for (node, target) in targets.iter().enumerate() {
                let value = self.dof_values[node * lanes + lane];
                match target.constraint {
                    Some((start, end)) => {
                        for &(index, weight) in &engine.constraint_entries[start..end] {
                            dst_local[index] += weight * value;
                        }
                    }
                    None => dst_local[target.local] += value,
                }
            }
        }
    }

    /// Lanes of the cell-local degree of freedom `node`.
    pub fn dof_values(&self, node: usize) -> &[T] {
        let lanes = self.engine.n_lanes;
        &self.dof_values[node * lanes..(node + 1) * lanes]
    }

    /// Physical coordinates of quadrature point `q` of the cell in `lane`.
    pub fn quadrature_point(&self, q: usize, lane: usize) -> OPoint<T, D> {
        let engine = self.engine;
        let dim = D::dim();
        let lanes = engine.n_lanes;
        let point = self.batch * engine.n_q_points + q;
        OPoint::from(OVector::<T, D>::from_fn(|d, _| {
            engine.quadrature_points[(point * dim + d) * lanes + lane]
        }))
    }
}
