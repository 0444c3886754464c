use nalgebra::RealField;

pub use nalgebra;

pub mod allocators;

pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// A real scalar type that is processed in groups of SIMD lanes.
///
/// Matrix-free kernels process `LANES` cells at a time, so that every scalar operation in a
/// cell kernel turns into one operation over a lane group. The width corresponds to a 256-bit
/// vector register.
pub trait VectorizedReal: Real + Send + Sync {
    /// Number of scalars in one lane group.
    const LANES: usize;

    fn from_f64_lossy(value: f64) -> Self;

    fn to_f64_lossy(self) -> f64;
}

impl VectorizedReal for f64 {
    const LANES: usize = 4;

    fn from_f64_lossy(value: f64) -> Self {
        value
    }

    fn to_f64_lossy(self) -> f64 {
        self
    }
}

impl VectorizedReal for f32 {
    const LANES: usize = 8;

    fn from_f64_lossy(value: f64) -> Self {
        value as f32
    }

    fn to_f64_lossy(self) -> f64 {
        self as f64
    }
}
