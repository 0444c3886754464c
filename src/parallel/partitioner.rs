use crate::parallel::{Communicator, Message, SelfCommunicator};
use crate::VectorizedReal;
use eyre::eyre;
use std::ops::Range;
use std::sync::Arc;

/// Ownership layout of a distributed index space, seen from one rank.
///
/// Holds the owned range of every rank, the sorted ghost indices of this rank and the
/// communication pattern needed to import ghost values from their owners (and to export ghost
/// contributions back to them).
#[derive(Debug)]
pub struct Partitioner {
    communicator: Arc<dyn Communicator>,
    owned_ranges: Vec<Range<usize>>,
    ghost_indices: Vec<usize>,
    /// Source rank and the range of ghost positions it provides, for every rank we import from.
    imports: Vec<(usize, Range<usize>)>,
    /// Destination rank and the owned offsets it requests, for every rank we export to.
    exports: Vec<(usize, Vec<usize>)>,
}

impl Partitioner {
    /// Builds the partitioner of the calling rank.
    ///
    /// `owned_ranges` must hold one range per rank, and together the ranges must tile
    /// `0..global_size` in rank order. Ghost indices may be unsorted and contain duplicates or
    /// locally owned indices, which are discarded.
    ///
    /// This is a collective operation.
    pub fn new(
        communicator: Arc<dyn Communicator>,
        owned_ranges: Vec<Range<usize>>,
        mut ghost_indices: Vec<usize>,
    ) -> eyre::Result<Self> {
        let size = communicator.size();
        let rank = communicator.rank();
        if owned_ranges.len() != size {
            return Err(eyre!(
                "Expected one owned range per rank ({}), got {}",
                size,
                owned_ranges.len()
            ));
        }
        let mut expected_start = 0;
        for (r, range) in owned_ranges.iter().enumerate() {
            if range.start != expected_start || range.end < range.start {
                return Err(eyre!("Owned range {:?} of rank {} is not contiguous with its predecessor", range, r));
            }
            expected_start = range.end;
        }
        let global_size = expected_start;

        let owned = owned_ranges[rank].clone();
        ghost_indices.sort_unstable();
        ghost_indices.dedup();
        ghost_indices.retain(|index| !owned.contains(index));
        if let Some(&index) = ghost_indices.last().filter(|&&index| index >= global_size) {
            return Err(eyre!(
                "Ghost index {} is out of bounds for global size {}",
                index,
                global_size
            ));
        }

        // Ghosts are sorted and owned ranges ascend with rank, so each owner provides a
        // contiguous range of ghost positions
        let mut imports = Vec::new();
        let mut start = 0;
        while start < ghost_indices.len() {
            let owner = owner_of(&owned_ranges, ghost_indices[start]);
            let end = start
                + ghost_indices[start..]
                    .iter()
                    .take_while(|&&index| owned_ranges[owner].contains(&index))
                    .count();
            imports.push((owner, start..end));
            start = end;
        }

        let mut exports = Vec::new();
        if size > 1 {
            let others: Vec<usize> = (0..size).filter(|&r| r != rank).collect();
            let outgoing = others
                .iter()
                .map(|&r| {
                    let requested = imports
                        .iter()
                        .find(|(owner, _)| *owner == r)
                        .map(|(_, positions)| ghost_indices[positions.clone()].to_vec())
                        .unwrap_or_default();
                    (r, Message::Indices(requested))
                })
                .collect();
            let requests = communicator.exchange(outgoing, &others);
            for (&r, message) in others.iter().zip(requests) {
                let indices = message.into_indices();
                if indices.is_empty() {
                    continue;
                }
                let offsets = indices
                    .into_iter()
                    .map(|index| {
                        if owned.contains(&index) {
                            Ok(index - owned.start)
                        } else {
                            Err(eyre!("Rank {} requested index {} which rank {} does not own", r, index, rank))
                        }
                    })
                    .collect::<eyre::Result<Vec<_>>>()?;
                exports.push((r, offsets));
            }
        }

        Ok(Self {
            communicator,
            owned_ranges,
            ghost_indices,
            imports,
            exports,
        })
    }

    /// A serial partitioner that owns all indices `0..global_size`.
    pub fn serial(global_size: usize) -> Self {
        Self {
            communicator: SelfCommunicator::shared(),
            owned_ranges: vec![0..global_size],
            ghost_indices: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    pub fn communicator(&self) -> &Arc<dyn Communicator> {
        &self.communicator
    }

    pub fn rank(&self) -> usize {
        self.communicator.rank()
    }

    pub fn global_size(&self) -> usize {
        self.owned_ranges.last().map(|range| range.end).unwrap_or(0)
    }

    pub fn owned_range(&self) -> Range<usize> {
        self.owned_ranges[self.rank()].clone()
    }

    pub fn owned_ranges(&self) -> &[Range<usize>] {
        &self.owned_ranges
    }

    pub fn n_owned(&self) -> usize {
        self.owned_range().len()
    }

    pub fn ghost_indices(&self) -> &[usize] {
        &self.ghost_indices
    }

    pub fn n_ghosts(&self) -> usize {
        self.ghost_indices.len()
    }

    /// Number of locally stored entries: owned entries followed by ghost entries.
    pub fn n_local(&self) -> usize {
        self.n_owned() + self.n_ghosts()
    }

    /// Position of a global index in the local (owned followed by ghost) storage.
    pub fn global_to_local(&self, global: usize) -> Option<usize> {
        let owned = self.owned_range();
        if owned.contains(&global) {
            Some(global - owned.start)
        } else {
            self.ghost_indices
                .binary_search(&global)
                .ok()
                .map(|position| owned.len() + position)
        }
    }

    /// Global index of a position in the local storage.
    pub fn local_to_global(&self, local: usize) -> usize {
        let owned = self.owned_range();
        if local < owned.len() {
            owned.start + local
        } else {
            self.ghost_indices[local - owned.len()]
        }
    }

    /// Whether vectors laid out by the two partitioners can be combined entry by entry.
    pub fn is_compatible_with(&self, other: &Partitioner) -> bool {
        self.owned_ranges == other.owned_ranges
    }

    /// Fills `ghosts` with the current owner values of the ghost indices.
    ///
    /// This is a collective operation.
    pub fn import_ghosts<T: VectorizedReal>(&self, owned: &[T], ghosts: &mut [T]) {
        assert_eq!(owned.len(), self.n_owned(), "Owned storage does not match the partitioner");
        assert_eq!(ghosts.len(), self.n_ghosts(), "Ghost storage does not match the partitioner");
        if self.communicator.size() == 1 {
            return;
        }
        let outgoing = self
            .exports
            .iter()
            .map(|(rank, offsets)| {
                let values = offsets.iter().map(|&o| owned[o].to_f64_lossy()).collect();
                (*rank, Message::Values(values))
            })
            .collect();
        let sources: Vec<usize> = self.imports.iter().map(|(rank, _)| *rank).collect();
        let received = self.communicator.exchange(outgoing, &sources);
        for ((_, positions), message) in self.imports.iter().zip(received) {
            let values = message.into_values();
            assert_eq!(values.len(), positions.len(), "Received ghost values of unexpected length");
            for (ghost, value) in ghosts[positions.clone()].iter_mut().zip(values) {
                *ghost = T::from_f64_lossy(value);
            }
        }
    }

    /// Sends ghost contributions to their owners, which add them to their owned entries.
    ///
    /// This is a collective operation.
    pub fn export_add<T: VectorizedReal>(&self, ghosts: &[T], owned: &mut [T]) {
        assert_eq!(owned.len(), self.n_owned(), "Owned storage does not match the partitioner");
        assert_eq!(ghosts.len(), self.n_ghosts(), "Ghost storage does not match the partitioner");
        if self.communicator.size() == 1 {
            return;
        }
        let outgoing = self
            .imports
            .iter()
            .map(|(rank, positions)| {
                let values = ghosts[positions.clone()]
                    .iter()
                    .map(|v| v.to_f64_lossy())
                    .collect();
                (*rank, Message::Values(values))
            })
            .collect();
        let sources: Vec<usize> = self.exports.iter().map(|(rank, _)| *rank).collect();
        let received = self.communicator.exchange(outgoing, &sources);
        // Contributions are added in rank order, which keeps the result deterministic
        for ((_, offsets), message) in self.exports.iter().zip(received) {
            let values = message.into_values();
            assert_eq!(values.len(), offsets.len(), "Received ghost contributions of unexpected length");
            for (&offset, value) in offsets.iter().zip(values) {
                owned[offset] += T::from_f64_lossy(value);
            }
        }
    }
}

fn owner_of(owned_ranges: &[Range<usize>], index: usize) -> usize {
    // Ranges are sorted and contiguous; empty ranges never contain anything
    owned_ranges.partition_point(|range| range.end <= index)
}
