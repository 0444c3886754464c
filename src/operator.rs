//! Linear operators acting on distributed vectors.
use crate::parallel::DistributedVector;
use crate::VectorizedReal;

/// A square or rectangular linear operator `A` that is applied without being stored as a matrix.
///
/// Applications are collective: all ranks sharing the vectors' communicator must call them
/// together.
pub trait Operator<T: VectorizedReal> {
    fn row_count(&self) -> usize;

    fn column_count(&self) -> usize;

    /// Computes `dst = A src`.
    fn apply(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>);

    /// Computes `dst += A src`.
    fn apply_add(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>);

    /// Computes `dst = A^T src`.
    fn apply_transpose(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>);

    /// Computes `dst += A^T src`.
    fn apply_transpose_add(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>);

    /// Computes `dst = J src`, where `J` is the Jacobian of the operator at its current state.
    fn apply_linearized(&self, dst: &mut DistributedVector<T>, src: &DistributedVector<T>);
}
