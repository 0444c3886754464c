//! Cell-batched matrix-free evaluation.
//!
//! [`MatrixFree`] groups the locally owned cells of a [`DofHandler`] into batches of
//! [`VectorizedReal::LANES`] cells and precomputes everything a cell kernel needs per batch,
//! quadrature point and lane: the inverse Jacobian of the cell map, the quadrature weight times
//! the Jacobian determinant (`JxW`) and the physical quadrature point. Operators are expressed as
//! kernels over a [`CellBatchEvaluator`], which provides the gather, evaluate, integrate and
//! scatter primitives. Ghost communication and constraint resolution are handled by the engine.
use crate::allocators::DimAllocator;
use crate::constraints::AffineConstraints;
use crate::dofs::DofHandler;
use crate::element::{map_reference_coords, reference_jacobian, TensorLagrangeElement};
use crate::material::BatchQuery;
use crate::mesh::MaterialId;
use crate::parallel::{DistributedVector, Partitioner};
use crate::quadrature::tensor::tensor_product;
use crate::quadrature::{Point, Rule};
use crate::{SmallDim, VectorizedReal};
use eyre::eyre;
use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{convert, DefaultAllocator, DimName, OPoint, OVector};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

mod evaluator;
mod table;

pub use evaluator::*;
pub use table::*;

/// How cell batches are distributed over the threads of a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskScheduling {
    Serial,
    /// Batches are processed by the rayon thread pool. Every task accumulates into its own
    /// buffer, and the buffers are summed afterwards.
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixFreeConfig {
    pub scheduling: TaskScheduling,
    /// Smallest number of consecutive batches handed to a single parallel task.
    pub min_batches_per_task: usize,
}

impl Default for MatrixFreeConfig {
    fn default() -> Self {
        Self {
            scheduling: TaskScheduling::Parallel,
            min_batches_per_task: 16,
        }
    }
}

/// Whether a cell loop overwrites or accumulates into its destination vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstMode {
    Overwrite,
    Accumulate,
}

/// Where a cell-local degree of freedom reads from and writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DofTarget {
    /// Position in the local (owned followed by ghost) storage.
    local: usize,
    /// Range into the resolved constraint entries, if the degree of freedom is constrained.
    constraint: Option<(usize, usize)>,
}

/// The cell-batched evaluation engine for `Q_P` elements in `D` dimensions.
#[derive(Debug)]
pub struct MatrixFree<T, D, const P: usize>
where
    T: VectorizedReal,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    config: MatrixFreeConfig,
    n_lanes: usize,
    n_batches: usize,
    dofs_per_cell: usize,
    n_q_points: usize,
    // [q][node]
    shape_values: Vec<T>,
    // [q][node][axis]
    shape_gradients: Vec<T>,
    // Cell at position `batch * n_lanes + lane`
    cells: Vec<usize>,
    material_ids: Vec<MaterialId>,
    // [cell position][node]
    dof_targets: Vec<DofTarget>,
    // (local index, weight)
    constraint_entries: Vec<(usize, T)>,
    // [batch][q][lane]
    jxw: Vec<T>,
    // [batch][q][b][a][lane] holds entry (b, a) of the inverse Jacobian
    inverse_jacobians: Vec<T>,
    // [batch][q][axis][lane]
    quadrature_points: Vec<T>,
    partitioner: Arc<Partitioner>,
    marker: PhantomData<D>,
}

impl<T, D, const P: usize> Default for MatrixFree<T, D, P>
where
    T: VectorizedReal,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn default() -> Self {
        Self::empty(MatrixFreeConfig::default())
    }
}

impl<T, D, const P: usize> MatrixFree<T, D, P>
where
    T: VectorizedReal,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// An engine without cells or degrees of freedom.
    pub fn empty(config: MatrixFreeConfig) -> Self {
        Self {
            config,
            n_lanes: T::LANES,
            n_batches: 0,
            dofs_per_cell: (P + 1).pow(D::dim() as u32),
            n_q_points: 0,
            shape_values: Vec::new(),
            shape_gradients: Vec::new(),
            cells: Vec::new(),
            material_ids: Vec::new(),
            dof_targets: Vec::new(),
            constraint_entries: Vec::new(),
            jxw: Vec::new(),
            inverse_jacobians: Vec::new(),
            quadrature_points: Vec::new(),
            partitioner: Arc::new(Partitioner::serial(0)),
            marker: PhantomData,
        }
    }

    /// Builds the engine for the locally owned cells of `dof_handler`, integrating with the
    /// tensor product of the given one-dimensional rule.
    ///
    /// Constraints must be closed. Their inhomogeneities are ignored: gather and scatter apply the
    /// homogeneous part only.
    ///
    /// This is a collective operation.
    pub fn new(
        dof_handler: &DofHandler<'_, T, D>,
        constraints: &AffineConstraints<T>,
        quadrature: &Rule<1>,
        config: MatrixFreeConfig,
    ) -> eyre::Result<Self> {
        if dof_handler.degree() != P {
            return Err(eyre!(
                "Degree of the dof handler ({}) does not match the element degree ({})",
                dof_handler.degree(),
                P
            ));
        }
        if !constraints.is_closed() {
            return Err(eyre!("Constraints must be closed before building a matrix-free engine"));
        }

        let dim = D::dim();
        let element = TensorLagrangeElement::<D, P>::new();
        let dofs_per_cell = element.num_nodes();
        let (weights, points) = tensor_rule::<D>(quadrature)?;
        let n_q_points = weights.len();

        let mut basis = vec![0.0; dofs_per_cell];
        let mut gradients = vec![0.0; dofs_per_cell * dim];
        let mut shape_values = Vec::with_capacity(n_q_points * dofs_per_cell);
        let mut shape_gradients = Vec::with_capacity(n_q_points * dofs_per_cell * dim);
        for xi in &points {
            element.populate_basis(xi, &mut basis);
            element.populate_reference_gradients(xi, &mut gradients);
            shape_values.extend(basis.iter().map(|&v| convert::<_, T>(v)));
            shape_gradients.extend(gradients.iter().map(|&v| convert::<_, T>(v)));
        }

        let mesh = dof_handler.mesh();
        let cells: Vec<usize> = dof_handler.locally_owned_cells().collect();
        let material_ids = cells.iter().map(|&cell| mesh.material_id(cell)).collect();

        let owned = dof_handler.locally_owned_dofs();
        let mut ghosts = Vec::new();
        for &cell in &cells {
            for &dof in dof_handler.cell_dofs(cell) {
                if !owned.contains(&dof) {
                    ghosts.push(dof);
                }
                if let Some(entries) = constraints.entries(dof) {
                    ghosts.extend(
                        entries
                            .iter()
                            .map(|&(target, _)| target)
                            .filter(|target| !owned.contains(target)),
                    );
                }
            }
        }
        let partitioner = Arc::new(Partitioner::new(
            dof_handler.communicator().clone(),
            dof_handler.owned_ranges().to_vec(),
            ghosts,
        )?);

        let to_local = |dof: usize| {
            partitioner
                .global_to_local(dof)
                .ok_or_else(|| eyre!("Degree of freedom {} is neither owned nor a ghost", dof))
        };
        let mut dof_targets = Vec::with_capacity(cells.len() * dofs_per_cell);
        let mut constraint_entries = Vec::new();
        for &cell in &cells {
            for &dof in dof_handler.cell_dofs(cell) {
                let constraint = match constraints.entries(dof) {
                    Some(entries) => {
                        let start = constraint_entries.len();
                        for &(target, weight) in entries {
                            constraint_entries.push((to_local(target)?, weight));
                        }
                        Some((start, constraint_entries.len()))
                    }
                    None => None,
                };
                dof_targets.push(DofTarget {
                    local: to_local(dof)?,
                    constraint,
                });
            }
        }

        let n_lanes = T::LANES;
        let n_batches = (cells.len() + n_lanes - 1) / n_lanes;
        let mut jxw = vec![T::zero(); n_batches * n_q_points * n_lanes];
        let mut inverse_jacobians = vec![T::zero(); n_batches * n_q_points * dim * dim * n_lanes];
        let mut quadrature_points = vec![T::zero(); n_batches * n_q_points * dim * n_lanes];
        for (position, &cell) in cells.iter().enumerate() {
            let batch = position / n_lanes;
            let lane = position % n_lanes;
            let vertices = mesh.cell_vertex_coordinates(cell);
            for (q, (xi, &w)) in points.iter().zip(&weights).enumerate() {
                let jacobian = reference_jacobian(&vertices, xi);
                let det = jacobian.determinant();
                if det <= T::zero() {
                    return Err(eyre!(
                        "Cell {} has non-positive Jacobian determinant {} at quadrature point {}",
                        cell,
                        det,
                        q
                    ));
                }
                let inverse = jacobian
                    .try_inverse()
                    .ok_or_else(|| eyre!("Jacobian of cell {} is singular at quadrature point {}", cell, q))?;
                let x = map_reference_coords(&vertices, xi);

                let point = batch * n_q_points + q;
                jxw[point * n_lanes + lane] = det * convert::<_, T>(w);
                for b in 0..dim {
                    for a in 0..dim {
                        inverse_jacobians[((point * dim + b) * dim + a) * n_lanes + lane] = inverse[(b, a)];
                    }
                    quadrature_points[(point * dim + b) * n_lanes + lane] = x[b];
                }
            }
        }

        debug!(
            "Matrix-free engine on rank {}: {} cells in {} batches of {} lanes, {} quadrature points per cell, \
             {} owned and {} ghost dofs",
            partitioner.rank(),
            cells.len(),
            n_batches,
            n_lanes,
            n_q_points,
            partitioner.n_owned(),
            partitioner.n_ghosts()
        );

        Ok(Self {
            config,
            n_lanes,
            n_batches,
            dofs_per_cell,
            n_q_points,
            shape_values,
            shape_gradients,
            cells,
            material_ids,
            dof_targets,
            constraint_entries,
            jxw,
            inverse_jacobians,
            quadrature_points,
            partitioner,
            marker: PhantomData,
        })
    }

    /// Releases all cell data, leaving an empty engine with the same configuration.
    pub fn clear(&mut self) {
        *self = Self::empty(self.config.clone());
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.n_dofs() == 0
    }

    pub fn config(&self) -> &MatrixFreeConfig {
        &self.config
    }

    pub fn n_batches(&self) -> usize {
        self.n_batches
    }

    pub fn n_q_points(&self) -> usize {
        self.n_q_points
    }

    pub fn n_lanes(&self) -> usize {
        self.n_lanes
    }

    pub fn dofs_per_cell(&self) -> usize {
        self.dofs_per_cell
    }

    /// Total number of degrees of freedom across all ranks.
    pub fn n_dofs(&self) -> usize {
        self.partitioner.global_size()
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of lanes of the batch that hold a cell. Only the last batch may be partially filled.
    pub fn n_active_lanes(&self, batch: usize) -> usize {
        self.batch_cells(batch).len()
    }

    pub fn batch_cells(&self, batch: usize) -> &[usize] {
        let range = self.batch_range(batch);
        &self.cells[range]
    }

    pub fn batch_material_ids(&self, batch: usize) -> &[MaterialId] {
        let range = self.batch_range(batch);
        &self.material_ids[range]
    }

    /// Describes the cells and quadrature points of a batch to a material property source.
    pub fn batch_query(&self, batch: usize) -> BatchQuery<'_, T, D> {
        let stride = self.n_q_points * D::dim() * self.n_lanes;
        BatchQuery::new(
            self.batch_cells(batch),
            self.batch_material_ids(batch),
            &self.quadrature_points[batch * stride..(batch + 1) * stride],
            self.n_q_points,
            self.n_lanes,
        )
    }

    pub fn partitioner(&self) -> &Arc<Partitioner> {
        &self.partitioner
    }

    /// A zero vector laid out for use with this engine.
    pub fn initialize_dof_vector(&self) -> DistributedVector<T> {
        DistributedVector::zeros(self.partitioner.clone())
    }

    /// Runs `kernel` on every batch and adds the resulting local contributions to `dst`.
    ///
    /// The kernel receives an evaluator positioned at the batch, the local (owned followed by
    /// ghost) values of `src` and a local buffer to scatter into. Ghost contributions are sent to
    /// their owners. In [`DstMode::Overwrite`], `dst` is zeroed first, so entries the kernel never
    /// scatters to, such as constrained rows, end up zero.
    ///
    /// This is a collective operation.
    pub fn cell_loop<F>(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>, mode: DstMode, kernel: F)
    where
        F: Fn(&mut CellBatchEvaluator<'_, T, D, P>, &[T], &mut [T]) + Sync,
    {
        self.assert_compatible(src);
        self.assert_compatible(dst);
        let src_local = self.import_local(src);
        let n_local = self.partitioner.n_local();
        let n_owned = self.partitioner.n_owned();

        let dst_local = match self.config.scheduling {
            TaskScheduling::Serial => {
                let mut dst_local = vec![T::zero(); n_local];
                let mut evaluator = CellBatchEvaluator::new(self);
                for batch in 0..self.n_batches {
                    evaluator.reinit(batch);
                    kernel(&mut evaluator, &src_local, &mut dst_local);
                }
                dst_local
            }
            TaskScheduling::Parallel => (0..self.n_batches)
                .into_par_iter()
                .with_min_len(self.config.min_batches_per_task.max(1))
                .fold(
                    || (vec![T::zero(); n_local], CellBatchEvaluator::new(self)),
                    |(mut dst_local, mut evaluator), batch| {
                        evaluator.reinit(batch);
                        kernel(&mut evaluator, &src_local, &mut dst_local);
                        (dst_local, evaluator)
                    },
                )
                .map(|(dst_local, _)| dst_local)
                .reduce(
                    || vec![T::zero(); n_local],
                    |mut a, b| {
                        for (a_i, b_i) in a.iter_mut().zip(&b) {
                            *a_i += *b_i;
                        }
                        a
                    },
                ),
        };

        if mode == DstMode::Overwrite {
            dst.fill(T::zero());
        }
        for (d, &contribution) in dst.owned_values_mut().iter_mut().zip(&dst_local[..n_owned]) {
            *d += contribution;
        }
        self.partitioner
            .export_add(&dst_local[n_owned..], dst.owned_values_mut());
    }

    /// Runs `kernel` on every batch in order, with the local values of `src`.
    ///
    /// This is a collective operation.
    pub fn for_each_batch<F>(&self, src: &DistributedVector<T>, mut kernel: F)
    where
        F: FnMut(&mut CellBatchEvaluator<'_, T, D, P>, &[T]),
    {
        self.assert_compatible(src);
        let src_local = self.import_local(src);
        let mut evaluator = CellBatchEvaluator::new(self);
        for batch in 0..self.n_batches {
            evaluator.reinit(batch);
            kernel(&mut evaluator, &src_local);
        }
    }

    fn import_local(&self, src: &DistributedVector<T>) -> Vec<T> {
        let n_owned = self.partitioner.n_owned();
        let mut local = vec![T::zero(); self.partitioner.n_local()];
        local[..n_owned].copy_from_slice(src.owned_values());
        self.partitioner
            .import_ghosts(src.owned_values(), &mut local[n_owned..]);
        local
    }

    fn assert_compatible(&self, vector: &DistributedVector<T>) {
        assert!(
            self.partitioner.is_compatible_with(vector.partitioner()),
            "Vector layout does not match the matrix-free engine"
        );
    }

    fn batch_range(&self, batch: usize) -> std::ops::Range<usize> {
        assert!(batch < self.n_batches, "Batch index out of bounds");
        let start = batch * self.n_lanes;
        start..(start + self.n_lanes).min(self.cells.len())
    }
}

fn tensor_rule<D>(rule: &Rule<1>) -> eyre::Result<(Vec<f64>, Vec<OPoint<f64, D>>)>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D>,
{
    if rule.0.is_empty() || rule.0.len() != rule.1.len() {
        return Err(eyre!("Quadrature rule must have matching, non-empty weights and points"));
    }
    fn to_points<const N: usize, D>((weights, points): Rule<N>) -> (Vec<f64>, Vec<OPoint<f64, D>>)
    where
        D: DimName,
        DefaultAllocator: Allocator<f64, D>,
    {
        let points = points
            .iter()
            .map(|x: &Point<N>| OPoint::from(OVector::<f64, D>::from_fn(|d, _| x[d])))
            .collect();
        (weights, points)
    }
    match D::dim() {
        1 => Ok(to_points(tensor_product::<1>(rule))),
        2 => Ok(to_points(tensor_product::<2>(rule))),
        3 => Ok(to_points(tensor_product::<3>(rule))),
        dim => Err(eyre!("Unsupported dimension {}", dim)),
    }
}
