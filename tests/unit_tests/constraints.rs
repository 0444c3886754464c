use fenris_thermal::constraints::AffineConstraints;
use fenris_thermal::parallel::DistributedVector;
use fenris_thermal::nalgebra::DVector;

#[test]
fn new_constraints_are_closed_until_modified() {
    let mut constraints = AffineConstraints::<f64>::new();
    assert!(constraints.is_closed());
    assert!(constraints.is_empty());

    constraints.constrain_homogeneous([3, 1]);
    assert!(!constraints.is_closed());
    assert_eq!(constraints.n_constraints(), 2);
    assert!(constraints.is_constrained(1));
    assert!(!constraints.is_constrained(2));
    assert_eq!(constraints.iter().map(|(dof, _)| dof).collect::<Vec<_>>(), vec![1, 3]);
}

#[test]
fn close_resolves_chains_and_inhomogeneities() {
    let mut constraints = AffineConstraints::<f64>::new();
    constraints.add_entry(0, 1, 0.5);
    constraints.add_entry(0, 2, 0.5);
    constraints.add_entry(1, 3, 1.0);
    constraints.set_inhomogeneity(2, 1.0);
    constraints.close().unwrap();

    assert!(constraints.is_closed());
    let line = constraints.line(0).unwrap();
    assert_eq!(line.entries, vec![(3, 0.5)]);
    assert_eq!(line.inhomogeneity, 0.5);
    assert_eq!(constraints.entries(1).unwrap(), &[(3, 1.0)]);
    assert!(constraints.entries(2).unwrap().is_empty());
}

#[test]
fn close_merges_duplicate_targets_and_drops_zero_weights() {
    let mut constraints = AffineConstraints::<f64>::new();
    constraints.add_entry(0, 1, 0.25);
    constraints.add_entry(0, 2, 0.5);
    constraints.add_entry(2, 1, 0.5);
    constraints.add_entry(4, 5, 0.5);
    constraints.add_entry(4, 5, -0.5);
    constraints.close().unwrap();

    assert_eq!(constraints.entries(0).unwrap(), &[(1, 0.5)]);
    assert!(constraints.entries(4).unwrap().is_empty());
}

#[test]
fn cyclic_constraints_are_rejected() {
    let mut cycle = AffineConstraints::<f64>::new();
    cycle.add_entry(0, 1, 1.0);
    cycle.add_entry(1, 2, 1.0);
    cycle.add_entry(2, 0, 1.0);
    assert!(cycle.close().is_err());

    let mut self_reference = AffineConstraints::<f64>::new();
    self_reference.add_entry(3, 3, 0.5);
    assert!(self_reference.close().is_err());
}

#[test]
fn distribute_and_set_zero_on_serial_vector() {
    let mut constraints = AffineConstraints::<f64>::new();
    constraints.add_entry(0, 3, 0.5);
    constraints.add_entry(0, 4, 0.5);
    constraints.set_inhomogeneity(0, 1.0);
    constraints.constrain_homogeneous([2]);
    constraints.close().unwrap();

    let mut vector = DistributedVector::from_serial(DVector::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0]));
    constraints.distribute(&mut vector);
    assert_eq!(vector.owned_values(), &[4.5, 1.0, 0.0, 3.0, 4.0]);

    constraints.set_zero(&mut vector);
    assert_eq!(vector.owned_values(), &[0.0, 1.0, 0.0, 3.0, 4.0]);
}

#[test]
fn distribute_requires_closed_constraints() {
    let mut constraints = AffineConstraints::<f64>::new();
    constraints.add_entry(0, 1, 1.0);
    let mut vector = DistributedVector::from_serial(DVector::zeros(2));
    util::assert_panics!(constraints.distribute(&mut vector));
}
