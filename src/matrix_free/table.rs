use crate::Real;

/// Dense per-quadrature-point table with one lane group per `(batch, point)` pair.
///
/// Entries are stored `[batch][point][lane]`, so the lanes of one point are contiguous and line up
/// with the lanes of the cell batch evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneTable<T> {
    n_batches: usize,
    n_points: usize,
    n_lanes: usize,
    data: Vec<T>,
}

impl<T: Real> Default for LaneTable<T> {
    fn default() -> Self {
        Self {
            n_batches: 0,
            n_points: 0,
            n_lanes: 0,
            data: Vec::new(),
        }
    }
}

impl<T: Real> LaneTable<T> {
    pub fn new(n_batches: usize, n_points: usize, n_lanes: usize) -> Self {
        let mut table = Self::default();
        table.reinit(n_batches, n_points, n_lanes);
        table
    }

    /// Resizes the table and zeros every entry.
    pub fn reinit(&mut self, n_batches: usize, n_points: usize, n_lanes: usize) {
        self.n_batches = n_batches;
        self.n_points = n_points;
        self.n_lanes = n_lanes;
        self.data.clear();
        self.data
            .resize(n_batches * n_points * n_lanes, T::zero());
    }

    /// Resizes the table to be empty.
    pub fn clear(&mut self) {
        self.reinit(0, 0, 0);
        self.data.shrink_to_fit();
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of batches and number of points per batch.
    pub fn extents(&self) -> (usize, usize) {
        (self.n_batches, self.n_points)
    }

    pub fn n_lanes(&self) -> usize {
        self.n_lanes
    }

    pub fn lanes(&self, batch: usize, point: usize) -> &[T] {
        let offset = self.offset(batch, point);
        &self.data[offset..offset + self.n_lanes]
    }

    pub fn lanes_mut(&mut self, batch: usize, point: usize) -> &mut [T] {
        let offset = self.offset(batch, point);
        &mut self.data[offset..offset + self.n_lanes]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    fn offset(&self, batch: usize, point: usize) -> usize {
        assert!(batch < self.n_batches && point < self.n_points, "Lane table index out of bounds");
        (batch * self.n_points + point) * self.n_lanes
    }
}
