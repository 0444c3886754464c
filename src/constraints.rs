//! Affine constraints on degrees of freedom.
//!
//! A constrained degree of freedom `i` is eliminated from the system and expressed as
//! `u_i = sum_j w_ij u_j + b_i`, where every target `j` is unconstrained once the constraints
//! are closed. Homogeneous Dirichlet conditions are lines without entries, hanging nodes are
//! lines with entries.
use crate::parallel::DistributedVector;
use crate::{Real, VectorizedReal};
use eyre::eyre;
use log::debug;
use std::collections::BTreeMap;

/// The constraint of a single degree of freedom.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintLine<T> {
    pub entries: Vec<(usize, T)>,
    pub inhomogeneity: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AffineConstraints<T> {
    lines: BTreeMap<usize, ConstraintLine<T>>,
    closed: bool,
}

impl<T: Real> Default for AffineConstraints<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> AffineConstraints<T> {
    pub fn new() -> Self {
        Self {
            lines: BTreeMap::new(),
            closed: true,
        }
    }

    /// Constrains `dof` to zero, unless it is already constrained.
    pub fn add_line(&mut self, dof: usize) {
        self.closed = false;
        self.lines.entry(dof).or_insert_with(|| ConstraintLine {
            entries: Vec::new(),
            inhomogeneity: T::zero(),
        });
    }

    /// Adds `weight * u_target` to the constraint of `dof`, creating the line if necessary.
    pub fn add_entry(&mut self, dof: usize, target: usize, weight: T) {
        self.add_line(dof);
        if let Some(line) = self.lines.get_mut(&dof) {
            line.entries.push((target, weight));
        }
    }

    pub fn set_inhomogeneity(&mut self, dof: usize, value: T) {
        self.add_line(dof);
        if let Some(line) = self.lines.get_mut(&dof) {
            line.inhomogeneity = value;
        }
    }

    /// Constrains all given degrees of freedom to zero.
    pub fn constrain_homogeneous(&mut self, dofs: impl IntoIterator<Item = usize>) {
        for dof in dofs {
            self.add_line(dof);
        }
    }

    pub fn is_constrained(&self, dof: usize) -> bool {
        self.lines.contains_key(&dof)
    }

    pub fn line(&self, dof: usize) -> Option<&ConstraintLine<T>> {
        self.lines.get(&dof)
    }

    /// The `(target, weight)` entries of a constrained degree of freedom.
    pub fn entries(&self, dof: usize) -> Option<&[(usize, T)]> {
        self.lines.get(&dof).map(|line| line.entries.as_slice())
    }

    pub fn n_constraints(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Iterates over constrained degrees of freedom and their lines, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ConstraintLine<T>)> {
        self.lines.iter().map(|(&dof, line)| (dof, line))
    }

    /// Resolves chains of constraints so that every entry refers to an unconstrained target.
    ///
    /// Entries with the same target are merged and entries with zero weight are removed.
    /// Returns an error if the constraints are cyclic.
    pub fn close(&mut self) -> eyre::Result<()> {
        if self.closed {
            return Ok(());
        }

        let dofs: Vec<usize> = self.lines.keys().copied().collect();
        let mut resolved: BTreeMap<usize, ConstraintLine<T>> = BTreeMap::new();
        for &dof in &dofs {
            let mut line = self.lines[&dof].clone();
            // A chain can visit every constrained dof at most once
            let mut remaining_substitutions = dofs.len();
            while line
                .entries
                .iter()
                .any(|(target, _)| self.lines.contains_key(target))
            {
                if remaining_substitutions == 0 {
                    return Err(eyre!("Constraint of dof {} is cyclic", dof));
                }
                remaining_substitutions -= 1;

                let mut substituted = Vec::with_capacity(line.entries.len());
                for (target, weight) in line.entries {
                    if target == dof {
                        return Err(eyre!("Dof {} is constrained to itself", dof));
                    }
                    match self.lines.get(&target) {
                        Some(target_line) => {
                            line.inhomogeneity += weight * target_line.inhomogeneity;
                            substituted.extend(
                                target_line
                                    .entries
                                    .iter()
                                    .map(|&(j, w)| (j, weight * w)),
                            );
                        }
                        None => substituted.push((target, weight)),
                    }
                }
                line.entries = substituted;
            }

            line.entries.sort_by_key(|&(target, _)| target);
            let mut merged: Vec<(usize, T)> = Vec::with_capacity(line.entries.len());
            for (target, weight) in line.entries {
                match merged.last_mut() {
                    Some((last, w)) if *last == target => *w += weight,
                    _ => merged.push((target, weight)),
                }
            }
            merged.retain(|(_, w)| *w != T::zero());
            line.entries = merged;
            resolved.insert(dof, line);
        }

        debug!("Closed {} affine constraints", resolved.len());
        self.lines = resolved;
        self.closed = true;
        Ok(())
    }
}

impl<T: VectorizedReal> AffineConstraints<T> {
    /// Sets every locally owned constrained entry to the value its constraint prescribes.
    ///
    /// This is a collective operation.
    ///
    /// # Panics
    ///
    /// Panics if the constraints are not closed, or if a target is neither owned nor a ghost of
    /// the vector's partitioner.
    pub fn distribute(&self, vector: &mut DistributedVector<T>) {
        assert!(self.closed, "Constraints must be closed before they are distributed");
        let ghosts = vector.import_ghost_values();
        let partitioner = vector.partitioner().clone();
        let owned = partitioner.owned_range();
        let n_owned = owned.len();

        let updates: Vec<(usize, T)> = self
            .lines
            .range(owned.clone())
            .map(|(&dof, line)| {
                let value = line
                    .entries
                    .iter()
                    .fold(line.inhomogeneity, |acc, &(target, weight)| {
                        let local = partitioner
                            .global_to_local(target)
                            .unwrap_or_else(|| panic!("Constraint target {} of dof {} is not available locally", target, dof));
                        let target_value = if local < n_owned {
                            vector.owned_values()[local]
                        } else {
                            ghosts[local - n_owned]
                        };
                        acc + weight * target_value
                    });
                (dof - owned.start, value)
            })
            .collect();

        let values = vector.owned_values_mut();
        for (offset, value) in updates {
            values[offset] = value;
        }
    }

    /// Sets every locally owned constrained entry to zero.
    pub fn set_zero(&self, vector: &mut DistributedVector<T>) {
        let owned = vector.owned_range();
        let start = owned.start;
        let values = vector.owned_values_mut();
        for &dof in self.lines.range(owned).map(|(dof, _)| dof) {
            values[dof - start] = T::zero();
        }
    }
}
