use fenris_thermal::element::{map_reference_coords, reference_jacobian, LagrangeBasis1d, TensorLagrangeElement};
use fenris_thermal::nalgebra::{matrix, point, Point2, U2, U3};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use proptest::prelude::*;

#[test]
fn gauss_lobatto_basis_is_nodal() {
    for degree in 1..=5 {
        let basis = LagrangeBasis1d::gauss_lobatto(degree);
        assert_eq!(basis.degree(), degree);
        assert_scalar_eq!(basis.nodes()[0], -1.0, comp = abs, tol = 1e-14);
        assert_scalar_eq!(basis.nodes()[degree], 1.0, comp = abs, tol = 1e-14);
        for (j, &x) in basis.nodes().iter().enumerate() {
            for i in 0..=degree {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_scalar_eq!(basis.value(i, x), expected, comp = abs, tol = 1e-12);
            }
        }
    }
}

#[test]
fn lagrange_derivative_matches_finite_differences() {
    let basis = LagrangeBasis1d::gauss_lobatto(4);
    let h = 1e-6;
    for &x in &[-0.9, -0.3, 0.1, 0.75] {
        for i in 0..=4 {
            let fd = (basis.value(i, x + h) - basis.value(i, x - h)) / (2.0 * h);
            assert_scalar_eq!(basis.derivative(i, x), fd, comp = abs, tol = 1e-7);
        }
    }
}

#[test]
fn tensor_nodes_are_lexicographic() {
    let element = TensorLagrangeElement::<U2, 2>::new();
    assert_eq!(element.num_nodes(), 9);
    assert_eq!(element.reference_node(0), point![-1.0, -1.0]);
    assert_eq!(element.reference_node(1), point![0.0, -1.0]);
    assert_eq!(element.reference_node(3), point![-1.0, 0.0]);
    assert_eq!(element.reference_node(8), point![1.0, 1.0]);

    let mut values = vec![0.0; 9];
    for node in 0..9 {
        element.populate_basis(&element.reference_node(node), &mut values);
        for (i, &v) in values.iter().enumerate() {
            let expected = if i == node { 1.0 } else { 0.0 };
            assert_scalar_eq!(v, expected, comp = abs, tol = 1e-12);
        }
    }
}

proptest! {
    #[test]
    fn tensor_basis_is_partition_of_unity(x in -1.0..=1.0, y in -1.0..=1.0, z in -1.0..=1.0) {
        let element = TensorLagrangeElement::<U3, 3>::new();
        let xi = point![x, y, z];
        let mut values = vec![0.0; element.num_nodes()];
        let mut gradients = vec![0.0; 3 * element.num_nodes()];
        element.populate_basis(&xi, &mut values);
        element.populate_reference_gradients(&xi, &mut gradients);

        let sum: f64 = values.iter().sum();
        prop_assert!((sum - 1.0).abs() < 1e-12);
        for axis in 0..3 {
            let gradient_sum: f64 = gradients.chunks_exact(3).map(|g| g[axis]).sum();
            prop_assert!(gradient_sum.abs() < 1e-10);
        }
    }

    #[test]
    fn tensor_gradients_match_finite_differences(x in -0.9..0.9, y in -0.9..0.9) {
        let element = TensorLagrangeElement::<U2, 2>::new();
        let h = 1e-6;
        let mut gradients = vec![0.0; 2 * 9];
        element.populate_reference_gradients(&point![x, y], &mut gradients);

        let mut plus = vec![0.0; 9];
        let mut minus = vec![0.0; 9];
        for (axis, offset) in [(0, [h, 0.0]), (1, [0.0, h])] {
            element.populate_basis(&point![x + offset[0], y + offset[1]], &mut plus);
            element.populate_basis(&point![x - offset[0], y - offset[1]], &mut minus);
            for node in 0..9 {
                let fd = (plus[node] - minus[node]) / (2.0 * h);
                prop_assert!((gradients[2 * node + axis] - fd).abs() < 1e-7);
            }
        }
    }

    #[test]
    fn affine_cell_map_has_constant_jacobian(x in -1.0..=1.0, y in -1.0..=1.0) {
        // Parallelogram spanned by (2, 0) and (1, 1), translated to (1, 1)
        let vertices = [point![1.0, 1.0], point![3.0, 1.0], point![2.0, 2.0], point![4.0, 2.0]];
        let xi = point![x, y];
        let jacobian = reference_jacobian(&vertices, &xi);
        assert_matrix_eq!(jacobian, matrix![1.0, 0.5; 0.0, 0.5], comp = abs, tol = 1e-14);

        let mapped: Point2<f64> = map_reference_coords(&vertices, &xi);
        let expected = point![2.5, 1.5] + jacobian * xi.coords;
        prop_assert!((mapped - expected).norm() < 1e-14);
    }
}
