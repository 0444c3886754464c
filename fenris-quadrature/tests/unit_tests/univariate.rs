use super::monomial_integral_1d;
use fenris_quadrature::integrate;
use fenris_quadrature::univariate::{gauss, gauss_lobatto, try_gauss_lobatto};
use fenris_quadrature::Error;

use matrixcompare::assert_scalar_eq;

#[test]
fn gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=40 {
        let expected_polynomial_degree = 2 * n - 1;
        let rule = gauss(n);

        // Also test that weights are positive
        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=expected_polynomial_degree as i32 {
            let estimated_integral = integrate(&rule, |x| x[0].powi(alpha));
            assert_scalar_eq!(estimated_integral, monomial_integral_1d(alpha), comp = abs, tol = 1e-13);
        }
    }
}

#[test]
fn gauss_lobatto_rules_satisfy_expected_accuracy() {
    assert!(try_gauss_lobatto(0).is_none());
    assert!(try_gauss_lobatto(1).is_none());
    assert_eq!(gauss_lobatto(1), Err(Error::NoRuleAvailable));

    for n in 2..=24 {
        let expected_polynomial_degree = 2 * n - 3;
        let rule = try_gauss_lobatto(n).unwrap();

        // Check that rule contains endpoints, like Gauss-Lobatto should
        assert_eq!(rule.1.first().unwrap(), &[-1.0]);
        assert_eq!(rule.1.last().unwrap(), &[1.0]);

        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=expected_polynomial_degree as i32 {
            let estimated_integral = integrate(&rule, |x| x[0].powi(alpha));
            assert_scalar_eq!(estimated_integral, monomial_integral_1d(alpha), comp = abs, tol = 1e-13);
        }
    }
}

#[test]
fn gauss_lobatto_points_are_sorted_and_symmetric() {
    for n in 2..=16 {
        let (weights, points) = gauss_lobatto(n).unwrap();
        assert_eq!(weights.len(), n);
        for i in 0..n - 1 {
            assert!(points[i][0] < points[i + 1][0]);
        }
        for i in 0..n {
            let mirror = n - 1 - i;
            assert_scalar_eq!(points[i][0], -points[mirror][0], comp = abs, tol = 1e-14);
            assert_scalar_eq!(weights[i], weights[mirror], comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn gauss_lobatto_low_order_rules_match_closed_forms() {
    let (weights, points) = gauss_lobatto(2).unwrap();
    assert_eq!(points, vec![[-1.0], [1.0]]);
    assert_eq!(weights, vec![1.0, 1.0]);

    let (weights, points) = gauss_lobatto(3).unwrap();
    assert_eq!(points, vec![[-1.0], [0.0], [1.0]]);
    assert_scalar_eq!(weights[0], 1.0 / 3.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(weights[1], 4.0 / 3.0, comp = abs, tol = 1e-14);

    let (weights, points) = gauss_lobatto(4).unwrap();
    let x = (1.0f64 / 5.0).sqrt();
    assert_scalar_eq!(points[1][0], -x, comp = abs, tol = 1e-14);
    assert_scalar_eq!(points[2][0], x, comp = abs, tol = 1e-14);
    assert_scalar_eq!(weights[0], 1.0 / 6.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(weights[1], 5.0 / 6.0, comp = abs, tol = 1e-14);
}
