//! Multi-dimensional quadrature rules formed by tensor product formulations.
//!
//! For quadrilaterals and hexahedra, quadrature rules can be constructed as tensor products
//! of 1D rules. This module provides rules constructed in this fashion.

use crate::univariate::{gauss, gauss_lobatto};
use crate::{Error, Rule};

/// Forms the `D`-dimensional tensor product of a one-dimensional rule.
///
/// Points are enumerated lexicographically with the first coordinate running fastest, i.e.
/// the point with per-dimension indices `(i_0, ..., i_{D-1})` is stored at
/// `i_0 + n i_1 + n^2 i_2 + ...`.
pub fn tensor_product<const D: usize>(rule_1d: &Rule<1>) -> Rule<D> {
    let (weights1d, points1d) = rule_1d;
    let n = weights1d.len();
    let num_points = n.pow(D as u32);

    let mut weights = Vec::with_capacity(num_points);
    let mut points = Vec::with_capacity(num_points);
    for flat_index in 0..num_points {
        let mut remainder = flat_index;
        let mut weight = 1.0;
        let mut point = [0.0; D];
        for coord in &mut point {
            let i = remainder % n;
            remainder /= n;
            weight *= weights1d[i];
            *coord = points1d[i][0];
        }
        weights.push(weight);
        points.push(point);
    }

    (weights, points)
}

/// A Gauss quadrature rule for the reference quadrilateral.
///
/// The rule is constructed as a tensor product from 1D rules, with the provided number of
/// points per dimension.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    tensor_product(&gauss(num_points_per_dim))
}

/// A Gauss quadrature rule for the reference hexahedron.
///
/// The rule is constructed as a tensor product from 1D rules, with the provided number of
/// points per dimension.
pub fn hexahedron_gauss(num_points_per_dim: usize) -> Rule<3> {
    tensor_product(&gauss(num_points_per_dim))
}

/// A Gauss-Lobatto quadrature rule for the reference quadrilateral.
pub fn quadrilateral_gauss_lobatto(num_points_per_dim: usize) -> Result<Rule<2>, Error> {
    gauss_lobatto(num_points_per_dim).map(|rule| tensor_product(&rule))
}

/// A Gauss-Lobatto quadrature rule for the reference hexahedron.
pub fn hexahedron_gauss_lobatto(num_points_per_dim: usize) -> Result<Rule<3>, Error> {
    gauss_lobatto(num_points_per_dim).map(|rule| tensor_product(&rule))
}
