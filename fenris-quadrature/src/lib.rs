//! Quadrature rules for tensor-product reference domains.
//!
//! All rules are defined on the reference interval `[-1, 1]` and its tensor products
//! `[-1, 1]^D`. A rule is stored as a pair `(weights, points)`. Multi-dimensional rules enumerate
//! their points lexicographically, with the first coordinate running fastest.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod tensor;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that a rule satisfying the given requirements is not available.
    NoRuleAvailable,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable => {
                write!(f, "There is no quadrature rule satisfying the requirements available")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional rule.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional quadrature rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// A three-dimensional rule.
pub type Rule3d = Rule<3>;

/// Approximates the integral of `f` over the reference domain with the given rule.
pub fn integrate<const D: usize, F>(rule: &Rule<D>, f: F) -> f64
where
    F: Fn(&Point<D>) -> f64,
{
    let (weights, points) = rule;
    assert_eq!(weights.len(), points.len(), "Rule must have as many weights as points");
    weights
        .iter()
        .zip(points)
        .map(|(w, x)| w * f(x))
        .sum()
}
