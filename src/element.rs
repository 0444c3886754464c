//! Tensor-product Lagrange elements and the multilinear cell geometry.
//!
//! Reference data is tabulated in `f64` and converted to the working scalar type by the
//! consumers. The reference cell is `[-1, 1]^D`.
use crate::allocators::DimAllocator;
use crate::quadrature::univariate::try_gauss_lobatto;
use crate::{Real, SmallDim};
use nalgebra::allocator::Allocator;
use nalgebra::{convert, DefaultAllocator, DimName, OMatrix, OPoint, OVector};
use std::marker::PhantomData;

/// Splits a lexicographic tensor index into its per-axis components, first axis fastest.
///
/// Components beyond `dim` are zero.
pub fn multi_index(flat: usize, nodes_per_dim: usize, dim: usize) -> [usize; 3] {
    assert!(dim <= 3, "Only dimensions up to 3 are supported");
    let mut index = [0; 3];
    let mut remainder = flat;
    for component in index.iter_mut().take(dim) {
        *component = remainder % nodes_per_dim;
        remainder /= nodes_per_dim;
    }
    index
}

/// One-dimensional Lagrange polynomials interpolating a set of distinct nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct LagrangeBasis1d {
    nodes: Vec<f64>,
}

impl LagrangeBasis1d {
    /// The Lagrange basis of the given degree on the Gauss-Lobatto nodes of `[-1, 1]`.
    ///
    /// # Panics
    ///
    /// Panics if `degree` is zero.
    pub fn gauss_lobatto(degree: usize) -> Self {
        assert!(degree >= 1, "Gauss-Lobatto Lagrange basis requires degree >= 1");
        let (_, points) = try_gauss_lobatto(degree + 1).expect("Gauss-Lobatto rules exist for at least two points");
        Self::from_nodes(points.into_iter().map(|[x]| x).collect())
    }

    pub fn from_nodes(nodes: Vec<f64>) -> Self {
        assert!(!nodes.is_empty(), "Need at least one node");
        Self { nodes }
    }

    pub fn degree(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn value(&self, i: usize, x: f64) -> f64 {
        let xi = self.nodes[i];
        self.nodes
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, &xj)| (x - xj) / (xi - xj))
            .product()
    }

    pub fn derivative(&self, i: usize, x: f64) -> f64 {
        let xi = self.nodes[i];
        let mut sum = 0.0;
        for (k, &xk) in self.nodes.iter().enumerate() {
            if k == i {
                continue;
            }
            let product: f64 = self
                .nodes
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i && j != k)
                .map(|(_, &xj)| (x - xj) / (xi - xj))
                .product();
            sum += product / (xi - xk);
        }
        sum
    }
}

/// The `Q_P` Lagrange element on `[-1, 1]^D` with nodes at tensor-product Gauss-Lobatto points.
///
/// Nodes are numbered lexicographically, first axis fastest.
#[derive(Debug, Clone)]
pub struct TensorLagrangeElement<D, const P: usize> {
    basis: LagrangeBasis1d,
    marker: PhantomData<D>,
}

impl<D: SmallDim, const P: usize> Default for TensorLagrangeElement<D, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: SmallDim, const P: usize> TensorLagrangeElement<D, P> {
    pub fn new() -> Self {
        Self {
            basis: LagrangeBasis1d::gauss_lobatto(P),
            marker: PhantomData,
        }
    }

    pub fn num_nodes(&self) -> usize {
        (P + 1).pow(D::dim() as u32)
    }

    pub fn basis_1d(&self) -> &LagrangeBasis1d {
        &self.basis
    }

    pub fn reference_node(&self, node: usize) -> OPoint<f64, D>
    where
        DefaultAllocator: Allocator<f64, D>,
    {
        let index = multi_index(node, P + 1, D::dim());
        OPoint::from(OVector::<f64, D>::from_fn(|d, _| self.basis.nodes()[index[d]]))
    }

    /// Evaluates all basis functions at the reference point `xi`.
    pub fn populate_basis(&self, xi: &OPoint<f64, D>, values: &mut [f64])
    where
        DefaultAllocator: Allocator<f64, D>,
    {
        let dim = D::dim();
        assert_eq!(values.len(), self.num_nodes());
        for (node, value) in values.iter_mut().enumerate() {
            let index = multi_index(node, P + 1, dim);
            *value = (0..dim)
                .map(|d| self.basis.value(index[d], xi[d]))
                .product();
        }
    }

    /// Evaluates the reference gradients of all basis functions at `xi`, stored `[node][axis]`.
    pub fn populate_reference_gradients(&self, xi: &OPoint<f64, D>, gradients: &mut [f64])
    where
        DefaultAllocator: Allocator<f64, D>,
    {
        let dim = D::dim();
        assert_eq!(gradients.len(), self.num_nodes() * dim);
        for (node, gradient) in gradients.chunks_exact_mut(dim).enumerate() {
            let index = multi_index(node, P + 1, dim);
            for (axis, component) in gradient.iter_mut().enumerate() {
                *component = (0..dim)
                    .map(|d| {
                        if d == axis {
                            self.basis.derivative(index[d], xi[d])
                        } else {
                            self.basis.value(index[d], xi[d])
                        }
                    })
                    .product();
            }
        }
    }
}

/// Evaluates the multilinear vertex basis of a tensor-product cell and its reference gradients.
///
/// `values` holds `2^D` entries and `gradients` holds `2^D * D` entries stored `[corner][axis]`.
pub fn multilinear_basis<D>(xi: &OPoint<f64, D>, values: &mut [f64], gradients: &mut [f64])
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D>,
{
    let dim = D::dim();
    let corners = 1 << dim;
    assert_eq!(values.len(), corners);
    assert_eq!(gradients.len(), corners * dim);
    let factor = |corner: usize, d: usize| {
        let sign = if (corner >> d) & 1 == 1 { 1.0 } else { -1.0 };
        (0.5 * (1.0 + sign * xi[d]), 0.5 * sign)
    };
    for corner in 0..corners {
        values[corner] = (0..dim).map(|d| factor(corner, d).0).product();
        for axis in 0..dim {
            gradients[corner * dim + axis] = (0..dim)
                .map(|d| {
                    let (value, derivative) = factor(corner, d);
                    if d == axis {
                        derivative
                    } else {
                        value
                    }
                })
                .product();
        }
    }
}

/// Maps a reference point to physical coordinates through the multilinear cell map.
pub fn map_reference_coords<T, D>(cell_vertices: &[OPoint<T, D>], xi: &OPoint<f64, D>) -> OPoint<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    let dim = D::dim();
    let mut values = vec![0.0; 1 << dim];
    let mut gradients = vec![0.0; (1 << dim) * dim];
    multilinear_basis(xi, &mut values, &mut gradients);
    let mut x = OPoint::<T, D>::origin();
    for (vertex, &phi) in cell_vertices.iter().zip(&values) {
        x.coords += &vertex.coords * convert::<_, T>(phi);
    }
    x
}

/// Jacobian `J_ab = dx_a / dxi_b` of the multilinear cell map at the reference point `xi`.
pub fn reference_jacobian<T, D>(cell_vertices: &[OPoint<T, D>], xi: &OPoint<f64, D>) -> OMatrix<T, D, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    let dim = D::dim();
    let mut values = vec![0.0; 1 << dim];
    let mut gradients = vec![0.0; (1 << dim) * dim];
    multilinear_basis(xi, &mut values, &mut gradients);
    OMatrix::<T, D, D>::from_fn(|a, b| {
        cell_vertices
            .iter()
            .zip(gradients.chunks_exact(dim))
            .fold(T::zero(), |acc, (vertex, gradient)| {
                acc + vertex[a] * convert::<_, T>(gradient[b])
            })
    })
}
