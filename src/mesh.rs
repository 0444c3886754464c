use eyre::eyre;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, OVector, RealField, Scalar, U1, U2, U3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod procedural;

/// Identifier of the material assigned to a cell.
pub type MaterialId = u32;

/// Index-based mesh of tensor-product cells: segments, quadrilaterals or hexahedra.
///
/// Every cell references `2^D` vertices in lexicographic order, i.e. local vertex `c`
/// corresponds to the reference corner whose coordinate along axis `d` is `-1` if bit `d` of `c`
/// is unset and `+1` otherwise. The physical cell is the image of `[-1, 1]^D` under the
/// multilinear map interpolating its vertices.
///
/// Local face `2 * d + s` of a cell is the face orthogonal to axis `d`, on the negative side
/// for `s == 0` and on the positive side for `s == 1`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct TensorMesh<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    #[serde(bound(
        serialize = "<DefaultAllocator as Allocator<T, D>>::Buffer: Serialize",
        deserialize = "<DefaultAllocator as Allocator<T, D>>::Buffer: Deserialize<'de>"
    ))]
    vertices: Vec<OPoint<T, D>>,
    cell_vertices: Vec<usize>,
    material_ids: Vec<MaterialId>,
}

pub type SegmentMesh1d<T> = TensorMesh<T, U1>;
pub type QuadMesh2d<T> = TensorMesh<T, U2>;
pub type HexMesh3d<T> = TensorMesh<T, U3>;

/// Number of vertices of a `dim`-dimensional tensor-product cell.
pub fn vertices_per_cell(dim: usize) -> usize {
    1 << dim
}

/// Number of faces of a `dim`-dimensional tensor-product cell.
pub fn faces_per_cell(dim: usize) -> usize {
    2 * dim
}

/// Returns the local vertex indices that make up the given local face of a `dim`-dimensional
/// tensor-product cell, in lexicographic order.
pub fn local_face_vertices(dim: usize, local_face: usize) -> Vec<usize> {
    assert!(local_face < faces_per_cell(dim), "Local face index out of bounds");
    let axis = local_face / 2;
    let side = local_face % 2;
    (0..vertices_per_cell(dim))
        .filter(|corner| (corner >> axis) & 1 == side)
        .collect()
}

impl<T, D> TensorMesh<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Construct a mesh from vertices and a flat cell-to-vertex connectivity array.
    ///
    /// The connectivity holds `2^D` vertex indices per cell. All cells are assigned material `0`.
    /// Returns an error if the connectivity length is not a multiple of `2^D` or if it
    /// references vertices out of bounds.
    pub fn from_vertices_and_connectivity(vertices: Vec<OPoint<T, D>>, cell_vertices: Vec<usize>) -> eyre::Result<Self> {
        let per_cell = vertices_per_cell(D::dim());
        if cell_vertices.len() % per_cell != 0 {
            return Err(eyre!(
                "Connectivity length {} is not a multiple of the number of vertices per cell ({})",
                cell_vertices.len(),
                per_cell
            ));
        }
        if let Some(&index) = cell_vertices.iter().find(|&&v| v >= vertices.len()) {
            return Err(eyre!(
                "Connectivity references vertex {} but the mesh only has {} vertices",
                index,
                vertices.len()
            ));
        }
        let num_cells = cell_vertices.len() / per_cell;
        Ok(Self {
            vertices,
            cell_vertices,
            material_ids: vec![0; num_cells],
        })
    }

    /// Replaces the material identifiers of all cells.
    pub fn with_material_ids(mut self, material_ids: Vec<MaterialId>) -> eyre::Result<Self> {
        if material_ids.len() != self.num_cells() {
            return Err(eyre!(
                "Expected {} material ids, got {}",
                self.num_cells(),
                material_ids.len()
            ));
        }
        self.material_ids = material_ids;
        Ok(self)
    }

    pub fn set_material_id(&mut self, cell: usize, material_id: MaterialId) {
        self.material_ids[cell] = material_id;
    }

    pub fn vertices(&self) -> &[OPoint<T, D>] {
        &self.vertices
    }

    pub fn vertices_mut(&mut self) -> &mut [OPoint<T, D>] {
        &mut self.vertices
    }

    pub fn num_cells(&self) -> usize {
        self.material_ids.len()
    }

    pub fn vertices_per_cell(&self) -> usize {
        vertices_per_cell(D::dim())
    }

    /// Global vertex indices of the given cell, in lexicographic order.
    pub fn cell_vertices(&self, cell: usize) -> &[usize] {
        let per_cell = self.vertices_per_cell();
        &self.cell_vertices[per_cell * cell..per_cell * (cell + 1)]
    }

    /// Coordinates of the vertices of the given cell, in lexicographic order.
    pub fn cell_vertex_coordinates(&self, cell: usize) -> Vec<OPoint<T, D>> {
        self.cell_vertices(cell)
            .iter()
            .map(|&v| self.vertices[v].clone())
            .collect()
    }

    pub fn material_id(&self, cell: usize) -> MaterialId {
        self.material_ids[cell]
    }

    pub fn material_ids(&self) -> &[MaterialId] {
        &self.material_ids
    }

    /// Finds faces which are only connected to exactly one cell.
    ///
    /// Returns pairs `(cell, local_face)`, sorted by cell and then by local face.
    pub fn find_boundary_faces(&self) -> Vec<(usize, usize)> {
        let dim = D::dim();
        let face_vertex_sets: Vec<Vec<usize>> = (0..faces_per_cell(dim))
            .map(|face| local_face_vertices(dim, face))
            .collect();

        // BTreeMap avoids the non-determinism of HashMap's internal randomization
        let mut face_counts: BTreeMap<Vec<usize>, (usize, usize, usize)> = BTreeMap::new();
        for cell in 0..self.num_cells() {
            let cell_vertices = self.cell_vertices(cell);
            for (local_face, local_vertices) in face_vertex_sets.iter().enumerate() {
                let mut key: Vec<usize> = local_vertices.iter().map(|&c| cell_vertices[c]).collect();
                key.sort_unstable();
                face_counts
                    .entry(key)
                    .and_modify(|(_, _, count)| *count += 1)
                    .or_insert((cell, local_face, 1));
            }
        }

        let mut faces: Vec<_> = face_counts
            .into_values()
            .filter(|&(_, _, count)| count == 1)
            .map(|(cell, local_face, _)| (cell, local_face))
            .collect();
        faces.sort_unstable();
        faces
    }

    /// Returns a sorted list of vertices that belong to a boundary face.
    pub fn find_boundary_vertices(&self) -> Vec<usize> {
        let dim = D::dim();
        let mut indices = Vec::new();
        for (cell, local_face) in self.find_boundary_faces() {
            let cell_vertices = self.cell_vertices(cell);
            indices.extend(local_face_vertices(dim, local_face).into_iter().map(|c| cell_vertices[c]));
        }
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl<T, D> TensorMesh<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Translates all vertices of the mesh by the given translation vector.
    pub fn translate(&mut self, translation: &OVector<T, D>) {
        self.transform_vertices(|p| *p += translation);
    }

    /// Transform all vertices of the mesh by the given transformation function.
    pub fn transform_vertices<F>(&mut self, mut transformation: F)
    where
        F: FnMut(&mut OPoint<T, D>),
    {
        for p in &mut self.vertices {
            transformation(p);
        }
    }
}
