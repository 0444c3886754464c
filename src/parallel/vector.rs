use crate::parallel::Partitioner;
use crate::VectorizedReal;
use nalgebra::DVector;
use std::ops::Range;
use std::sync::Arc;

/// A vector whose entries are distributed over the ranks of a communicator.
///
/// Each rank stores the entries of its owned range. Ghost values are never stored persistently;
/// they are imported on demand by the cell loops that need them.
#[derive(Debug, Clone)]
pub struct DistributedVector<T: VectorizedReal> {
    partitioner: Arc<Partitioner>,
    values: DVector<T>,
}

impl<T: VectorizedReal> DistributedVector<T> {
    pub fn zeros(partitioner: Arc<Partitioner>) -> Self {
        let values = DVector::zeros(partitioner.n_owned());
        Self { partitioner, values }
    }

    /// Creates a vector whose owned entry with global index `i` is `f(i)`.
    pub fn from_fn(partitioner: Arc<Partitioner>, mut f: impl FnMut(usize) -> T) -> Self {
        let start = partitioner.owned_range().start;
        let values = DVector::from_fn(partitioner.n_owned(), |i, _| f(start + i));
        Self { partitioner, values }
    }

    /// A serial vector holding the given values.
    pub fn from_serial(values: DVector<T>) -> Self {
        Self {
            partitioner: Arc::new(Partitioner::serial(values.len())),
            values,
        }
    }

    /// The empty vector of a serial rank.
    pub fn empty() -> Self {
        Self::from_serial(DVector::zeros(0))
    }

    pub fn partitioner(&self) -> &Arc<Partitioner> {
        &self.partitioner
    }

    pub fn global_size(&self) -> usize {
        self.partitioner.global_size()
    }

    pub fn owned_range(&self) -> Range<usize> {
        self.partitioner.owned_range()
    }

    pub fn local_size(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global_size() == 0
    }

    pub fn is_compatible_with(&self, other: &DistributedVector<T>) -> bool {
        self.partitioner.is_compatible_with(&other.partitioner)
    }

    pub fn owned_values(&self) -> &[T] {
        self.values.as_slice()
    }

    pub fn owned_values_mut(&mut self) -> &mut [T] {
        self.values.as_mut_slice()
    }

    pub fn as_dvector(&self) -> &DVector<T> {
        &self.values
    }

    pub fn into_dvector(self) -> DVector<T> {
        self.values
    }

    /// Returns the value of an owned entry, or `None` if the index is not owned by this rank.
    pub fn get(&self, global: usize) -> Option<T> {
        let range = self.owned_range();
        range
            .contains(&global)
            .then(|| self.values[global - range.start])
    }

    /// Imports the current values of this rank's ghost indices from their owners.
    ///
    /// This is a collective operation.
    pub fn import_ghost_values(&self) -> Vec<T> {
        let mut ghosts = vec![T::zero(); self.partitioner.n_ghosts()];
        self.partitioner
            .import_ghosts(self.values.as_slice(), &mut ghosts);
        ghosts
    }

    /// Adds ghost contributions to the owned entries of their owners.
    ///
    /// This is a collective operation.
    pub fn compress_add(&mut self, ghost_contributions: &[T]) {
        self.partitioner
            .export_add(ghost_contributions, self.values.as_mut_slice());
    }

    pub fn fill(&mut self, value: T) {
        self.values.fill(value);
    }

    pub fn scale(&mut self, factor: T) {
        self.values *= factor;
    }

    /// Computes `self = a * x + self`.
    pub fn axpy(&mut self, a: T, x: &DistributedVector<T>) {
        self.assert_compatible(x);
        self.values.axpy(a, &x.values, T::one());
    }

    /// Computes `self = x + b * self`.
    pub fn xpby(&mut self, x: &DistributedVector<T>, b: T) {
        self.assert_compatible(x);
        self.values.axpy(T::one(), &x.values, b);
    }

    pub fn add_assign(&mut self, x: &DistributedVector<T>) {
        self.assert_compatible(x);
        self.values += &x.values;
    }

    pub fn copy_from(&mut self, x: &DistributedVector<T>) {
        self.assert_compatible(x);
        self.values.copy_from(&x.values);
    }

    pub fn component_mul_assign(&mut self, x: &DistributedVector<T>) {
        self.assert_compatible(x);
        self.values.component_mul_assign(&x.values);
    }

    /// Global inner product.
    ///
    /// This is a collective operation.
    pub fn dot(&self, other: &DistributedVector<T>) -> T {
        self.assert_compatible(other);
        let local = self.values.dot(&other.values);
        T::from_f64_lossy(
            self.partitioner
                .communicator()
                .all_reduce_sum(local.to_f64_lossy()),
        )
    }

    /// Global Euclidean norm.
    ///
    /// This is a collective operation.
    pub fn norm_l2(&self) -> T {
        self.dot(self).sqrt()
    }

    /// Global maximum norm.
    ///
    /// This is a collective operation.
    pub fn norm_linf(&self) -> T {
        let local = self
            .values
            .iter()
            .fold(T::zero(), |max, v| max.max(v.abs()));
        T::from_f64_lossy(
            self.partitioner
                .communicator()
                .all_reduce_max(local.to_f64_lossy()),
        )
    }

    fn assert_compatible(&self, other: &DistributedVector<T>) {
        assert!(
            self.is_compatible_with(other),
            "Vectors must share the same parallel layout"
        );
    }
}
