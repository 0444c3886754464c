//! Matrix-free finite element operators for heterogeneous, temperature-dependent heat diffusion.
//!
//! The central type is [`ThermalOperator`](thermal::ThermalOperator), which applies the weak
//! form of $-\nabla \cdot (k \nabla u)$ to nodal vectors without ever forming a global matrix.
//! It is built from a handful of smaller components:
//!
//! - [`mesh`]: unstructured meshes of tensor-product cells (segments, quadrilaterals, hexahedra).
//! - [`element`]: Lagrange elements on Gauss-Lobatto nodes and the multilinear cell geometry.
//! - [`dofs`] and [`constraints`]: degree-of-freedom numbering and affine constraints.
//! - [`parallel`]: communicators, ghost exchange and distributed vectors.
//! - [`matrix_free`]: the cell-batched evaluation engine.
//! - [`material`]: material property sources consumed by the operator.
use nalgebra::{DimMin, DimName};

pub mod constraints;
pub mod dofs;
pub mod element;
pub mod material;
pub mod matrix_free;
pub mod mesh;
pub mod operator;
pub mod parallel;
pub mod thermal;

pub mod allocators {
    pub use fenris_traits::allocators::*;
}

pub mod quadrature {
    pub use fenris_quadrature::*;
}

pub use fenris_traits::{Real, VectorizedReal};

pub extern crate nalgebra;

/// A small, fixed-size dimension.
///
/// Used as a trait alias for various traits frequently needed by generic `fenris-thermal` routines.
pub trait SmallDim: DimName + DimMin<Self, Output = Self> {}

impl<D> SmallDim for D where D: DimName + DimMin<Self, Output = Self> {}
