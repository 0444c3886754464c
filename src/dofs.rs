//! Numbering of the degrees of freedom of continuous Lagrange elements.
use crate::allocators::DimAllocator;
use crate::element::{map_reference_coords, multi_index, LagrangeBasis1d};
use crate::mesh::TensorMesh;
use crate::parallel::{Communicator, SelfCommunicator};
use crate::{Real, SmallDim};
use eyre::eyre;
use log::debug;
use nalgebra::{DefaultAllocator, OPoint, OVector};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

/// Degree-of-freedom numbering of a continuous `Q_P` Lagrange space on a [`TensorMesh`].
///
/// Nodes shared by neighboring cells are identified topologically: every node is keyed by the
/// global vertices of its cell and its integer multilinear weights with respect to them, which
/// coincide for all cells containing the node regardless of their local orientation.
///
/// After [`distribute`](Self::distribute), every cell has an owning rank and every degree of
/// freedom is owned by the lowest rank among the owners of its adjacent cells. Degrees of
/// freedom are numbered contiguously by owning rank.
#[derive(Debug, Clone)]
pub struct DofHandler<'m, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    mesh: &'m TensorMesh<T, D>,
    degree: usize,
    dofs_per_cell: usize,
    cell_dofs: Vec<usize>,
    support_points: Vec<OPoint<T, D>>,
    communicator: Arc<dyn Communicator>,
    cell_owners: Vec<usize>,
    owned_ranges: Vec<Range<usize>>,
}

impl<'m, T, D> DofHandler<'m, T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Numbers the degrees of freedom of the given mesh for elements of the given degree.
    ///
    /// All cells and degrees of freedom are owned by a single serial rank.
    pub fn new(mesh: &'m TensorMesh<T, D>, degree: usize) -> eyre::Result<Self> {
        if degree == 0 {
            return Err(eyre!("Continuous Lagrange elements require degree >= 1"));
        }
        let dim = D::dim();
        let nodes_per_dim = degree + 1;
        let dofs_per_cell = nodes_per_dim.pow(dim as u32);
        let basis = LagrangeBasis1d::gauss_lobatto(degree);

        let mut node_keys: FxHashMap<Vec<(usize, usize)>, usize> = FxHashMap::default();
        let mut cell_dofs = Vec::with_capacity(mesh.num_cells() * dofs_per_cell);
        let mut support_points = Vec::new();
        let mut key = Vec::new();

        for cell in 0..mesh.num_cells() {
            let cell_vertices = mesh.cell_vertices(cell);
            let vertex_coords = mesh.cell_vertex_coordinates(cell);
            for node in 0..dofs_per_cell {
                let index = multi_index(node, nodes_per_dim, dim);
                key.clear();
                for (corner, &vertex) in cell_vertices.iter().enumerate() {
                    let weight: usize = (0..dim)
                        .map(|d| {
                            if (corner >> d) & 1 == 1 {
                                index[d]
                            } else {
                                degree - index[d]
                            }
                        })
                        .product();
                    if weight > 0 {
                        key.push((vertex, weight));
                    }
                }
                key.sort_unstable();

                let dof = match node_keys.get(&key) {
                    Some(&dof) => dof,
                    None => {
                        let dof = support_points.len();
                        let xi = OPoint::from(OVector::<f64, D>::from_fn(|d, _| basis.nodes()[index[d]]));
                        support_points.push(map_reference_coords(&vertex_coords, &xi));
                        node_keys.insert(key.clone(), dof);
                        dof
                    }
                };
                cell_dofs.push(dof);
            }
        }

        let n_dofs = support_points.len();
        debug!(
            "Numbered {} degrees of freedom of degree {} on {} cells",
            n_dofs,
            degree,
            mesh.num_cells()
        );

        Ok(Self {
            mesh,
            degree,
            dofs_per_cell,
            cell_dofs,
            support_points,
            communicator: SelfCommunicator::shared(),
            cell_owners: vec![0; mesh.num_cells()],
            owned_ranges: vec![0..n_dofs],
        })
    }

    /// Renumbers degrees of freedom so that they are sorted by owning rank, given the owner of
    /// every cell. Ties keep their previous relative order.
    ///
    /// Ownership itself is unchanged; use this on a serial handler to obtain the numbering a
    /// distributed handler with the same cell owners would use.
    pub fn renumber_by_cell_owner(&mut self, cell_owners: &[usize]) -> eyre::Result<()> {
        let dof_owners = self.compute_dof_owners(cell_owners)?;
        let mut order: Vec<usize> = (0..self.n_dofs()).collect();
        order.sort_by_key(|&dof| (dof_owners[dof], dof));

        let mut new_index = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            new_index[old] = new;
        }
        for dof in &mut self.cell_dofs {
            *dof = new_index[*dof];
        }
        self.support_points = order
            .iter()
            .map(|&old| self.support_points[old].clone())
            .collect();
        Ok(())
    }

    /// Distributes cells and degrees of freedom over the ranks of the given communicator.
    ///
    /// Every rank must pass the same cell owners. Degrees of freedom are renumbered so that each
    /// rank owns a contiguous range.
    pub fn distribute(mut self, communicator: Arc<dyn Communicator>, cell_owners: Vec<usize>) -> eyre::Result<Self> {
        let size = communicator.size();
        if let Some(&owner) = cell_owners.iter().find(|&&owner| owner >= size) {
            return Err(eyre!(
                "Cell owner {} is not a rank of a communicator of size {}",
                owner,
                size
            ));
        }
        self.renumber_by_cell_owner(&cell_owners)?;
        let dof_owners = self.compute_dof_owners(&cell_owners)?;

        let mut counts = vec![0; size];
        for &owner in &dof_owners {
            counts[owner] += 1;
        }
        let mut start = 0;
        self.owned_ranges = counts
            .into_iter()
            .map(|count| {
                let range = start..start + count;
                start += count;
                range
            })
            .collect();
        self.communicator = communicator;
        self.cell_owners = cell_owners;

        debug!(
            "Rank {} owns {} of {} cells and degrees of freedom {:?}",
            self.communicator.rank(),
            self.locally_owned_cells().count(),
            self.mesh.num_cells(),
            self.locally_owned_dofs()
        );
        Ok(self)
    }

    fn compute_dof_owners(&self, cell_owners: &[usize]) -> eyre::Result<Vec<usize>> {
        if cell_owners.len() != self.mesh.num_cells() {
            return Err(eyre!(
                "Expected an owner for each of the {} cells, got {}",
                self.mesh.num_cells(),
                cell_owners.len()
            ));
        }
        let mut dof_owners = vec![usize::MAX; self.n_dofs()];
        for (cell, &owner) in cell_owners.iter().enumerate() {
            for &dof in self.cell_dofs(cell) {
                dof_owners[dof] = dof_owners[dof].min(owner);
            }
        }
        Ok(dof_owners)
    }

    pub fn mesh(&self) -> &'m TensorMesh<T, D> {
        self.mesh
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn dofs_per_cell(&self) -> usize {
        self.dofs_per_cell
    }

    pub fn n_dofs(&self) -> usize {
        self.support_points.len()
    }

    /// Global degrees of freedom of the given cell, in lexicographic node order.
    pub fn cell_dofs(&self, cell: usize) -> &[usize] {
        &self.cell_dofs[self.dofs_per_cell * cell..self.dofs_per_cell * (cell + 1)]
    }

    pub fn support_point(&self, dof: usize) -> &OPoint<T, D> {
        &self.support_points[dof]
    }

    /// Physical coordinates of the node of every degree of freedom.
    pub fn support_points(&self) -> &[OPoint<T, D>] {
        &self.support_points
    }

    pub fn communicator(&self) -> &Arc<dyn Communicator> {
        &self.communicator
    }

    pub fn owned_ranges(&self) -> &[Range<usize>] {
        &self.owned_ranges
    }

    pub fn locally_owned_dofs(&self) -> Range<usize> {
        self.owned_ranges[self.communicator.rank()].clone()
    }

    pub fn cell_owner(&self, cell: usize) -> usize {
        self.cell_owners[cell]
    }

    pub fn locally_owned_cells(&self) -> impl Iterator<Item = usize> + '_ {
        let rank = self.communicator.rank();
        (0..self.mesh.num_cells()).filter(move |&cell| self.cell_owners[cell] == rank)
    }

    /// Returns the sorted degrees of freedom located on the boundary of the mesh.
    pub fn boundary_dofs(&self) -> Vec<usize> {
        let dim = D::dim();
        let mut dofs = BTreeSet::new();
        for (cell, local_face) in self.mesh.find_boundary_faces() {
            let axis = local_face / 2;
            let fixed = if local_face % 2 == 0 { 0 } else { self.degree };
            let cell_dofs = self.cell_dofs(cell);
            for node in 0..self.dofs_per_cell {
                if multi_index(node, self.degree + 1, dim)[axis] == fixed {
                    dofs.insert(cell_dofs[node]);
                }
            }
        }
        dofs.into_iter().collect()
    }
}
