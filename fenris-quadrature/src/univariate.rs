//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::{Error, Rule};
use std::f64::consts::PI;

/// Upper bound on Newton iterations when locating roots. Convergence is quadratic from the
/// initial guesses used here, so this is never reached in practice.
const MAX_NEWTON_ITERATIONS: usize = 100;

/// Recurrence relation for Legendre polynomials.
///
/// Note: we use a formula for which derivatives are *not* defined at |x| == 1, so it is only
/// suitable for evaluation in the open interval (-1, 1).
#[derive(Debug, Default)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    // The current value, i.e. p_n(x)
    p1: f64,
    // The previous value in the recurrence, i.e. p_{n - 1}(x)
    p2: f64,
}

impl LegendreRecurrence {
    pub fn evaluate(n: usize, x: f64) -> Self {
        // Use recurrence relation
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        let mut p3;
        for m in 1..=n {
            let m = m as f64;
            p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }

        Self { n, x, p1, p2 }
    }

    fn value(&self) -> f64 {
        self.p1
    }

    fn derivative(&self) -> f64 {
        let Self { n, x, p1, p2 } = &self;
        let n = *n as f64;
        // dp_n/dx (x) = n * (x * p_n(x) - p_{n - 1}(x)) / (x^2 - 1)
        n * (x * p1 - p2) / (x * x - 1.0)
    }

    fn second_derivative(&self) -> f64 {
        let Self { n, x, p1, .. } = &self;
        let n = *n as f64;
        // Legendre's differential equation
        //  (1 - x^2) p_n'' = 2 x p_n' - n (n + 1) p_n
        (2.0 * x * self.derivative() - n * (n + 1.0) * p1) / (1.0 - x * x)
    }

    fn value_and_derivative(&self) -> (f64, f64) {
        (self.value(), self.derivative())
    }
}

/// Gauss quadrature for the reference interval [-1, 1].
///
/// Returns the [Gauss quadrature rule] with the given number of points. Given `n` points,
/// the rule integrates polynomials of order up to `2 n - 1` exactly.
///
/// # Panics
///
/// Panics if zero points are requested.
///
/// [Gauss quadrature rule]: https://en.wikipedia.org/wiki/Gaussian_quadrature
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    // Loosely based on the procedure used in
    // Numerical Recipes, The art of Scientific Computing, Third Edition (2007)
    let m = (n + 1) / 2;

    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);

    // Only find the first m roots. The remaining roots can be found by symmetry
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let (mut p, mut dp) = LegendreRecurrence::evaluate(n, x).value_and_derivative();

        for _ in 0..MAX_NEWTON_ITERATIONS {
            let dx = -p / dp;
            x += dx;
            let (p_new, dp_new) = LegendreRecurrence::evaluate(n, x).value_and_derivative();
            p = p_new;
            dp = dp_new;
            if dx.abs() <= 1e-15 {
                break;
            }
        }

        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        points.push([x]);
        weights.push(w);
    }

    // Recover the remaining points and weights by symmetry
    for i in m..n {
        let mirror_idx = n - i - 1;
        points.push([-points[mirror_idx][0]]);
        weights.push(weights[mirror_idx]);
    }

    assert_eq!(points.len(), n, "Internal error: incorrect number of points produced");

    (weights, points)
}

/// Gauss-Lobatto quadrature for the reference interval [-1, 1].
///
/// The rule contains both end points of the interval and the `n - 2` roots of $P'_{n-1}$ in
/// between, sorted in ascending order. Given `n` points, the rule integrates polynomials of
/// order up to `2 n - 3` exactly.
///
/// Since the points of the rule coincide with the nodes of Lagrange elements built on
/// Gauss-Lobatto nodes, using it for integration makes the corresponding mass matrix diagonal.
///
/// Returns `None` if fewer than two points are requested.
pub fn try_gauss_lobatto(num_points: usize) -> Option<Rule<1>> {
    let n = num_points;
    if n < 2 {
        return None;
    }

    // The interior points are the roots of the derivative of p_{n - 1}
    let m = n - 1;
    let m_f64 = m as f64;
    let endpoint_weight = 2.0 / (n as f64 * m_f64);

    let mut points = vec![[0.0]; n];
    let mut weights = vec![0.0; n];
    points[0] = [-1.0];
    points[n - 1] = [1.0];
    weights[0] = endpoint_weight;
    weights[n - 1] = endpoint_weight;

    // Find the roots in the left half, the right half follows by symmetry
    for i in 1..=(n - 1) / 2 {
        let mirror_idx = n - 1 - i;
        if i == mirror_idx {
            break;
        }

        // Chebyshev-Gauss-Lobatto points are good initial guesses
        let mut x = -(PI * i as f64 / m_f64).cos();
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let recurrence = LegendreRecurrence::evaluate(m, x);
            let dx = -recurrence.derivative() / recurrence.second_derivative();
            x += dx;
            if dx.abs() <= 1e-15 {
                break;
            }
        }

        let p = LegendreRecurrence::evaluate(m, x).value();
        let w = 2.0 / (n as f64 * m_f64 * p * p);

        points[i] = [x];
        points[mirror_idx] = [-x];
        weights[i] = w;
        weights[mirror_idx] = w;
    }

    if n % 2 == 1 {
        // For odd n the midpoint is a root of p'_{n - 1}
        let mid = n / 2;
        let p = LegendreRecurrence::evaluate(m, 0.0).value();
        points[mid] = [0.0];
        weights[mid] = 2.0 / (n as f64 * m_f64 * p * p);
    }

    Some((weights, points))
}

/// Gauss-Lobatto quadrature for the reference interval [-1, 1].
///
/// See [`try_gauss_lobatto`] for details.
pub fn gauss_lobatto(num_points: usize) -> Result<Rule<1>, Error> {
    try_gauss_lobatto(num_points).ok_or(Error::NoRuleAvailable)
}
