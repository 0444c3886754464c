//! Basic procedural mesh generation routines.
use crate::mesh::{vertices_per_cell, HexMesh3d, QuadMesh2d, SegmentMesh1d, TensorMesh};
use nalgebra::allocator::Allocator;
use nalgebra::{convert, DefaultAllocator, DimName, OPoint, OVector, RealField, Vector1, Vector2, Vector3};

pub fn create_unit_interval_uniform_mesh_1d<T>(cells: usize) -> SegmentMesh1d<T>
where
    T: RealField,
{
    create_rectangular_uniform_mesh(&OPoint::origin(), &Vector1::new(T::one()), &[cells])
}

pub fn create_unit_square_uniform_quad_mesh_2d<T>(cells_per_dim: usize) -> QuadMesh2d<T>
where
    T: RealField,
{
    create_rectangular_uniform_mesh(
        &OPoint::origin(),
        &Vector2::repeat(T::one()),
        &[cells_per_dim, cells_per_dim],
    )
}

pub fn create_unit_box_uniform_hex_mesh_3d<T>(cells_per_dim: usize) -> HexMesh3d<T>
where
    T: RealField,
{
    create_rectangular_uniform_mesh(
        &OPoint::origin(),
        &Vector3::repeat(T::one()),
        &[cells_per_dim, cells_per_dim, cells_per_dim],
    )
}

/// Generates an axis-aligned box mesh with the given lower corner, extents and number of
/// cells along each axis.
///
/// Vertices and cells are both numbered lexicographically with the first axis running fastest.
/// If any axis has zero cells, the mesh is empty.
///
/// # Panics
///
/// Panics if `cells_per_dim` does not have exactly `D` entries.
pub fn create_rectangular_uniform_mesh<T, D>(
    origin: &OPoint<T, D>,
    extents: &OVector<T, D>,
    cells_per_dim: &[usize],
) -> TensorMesh<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let dim = D::dim();
    assert_eq!(cells_per_dim.len(), dim, "Need one cell count per dimension");

    if cells_per_dim.iter().any(|&n| n == 0) {
        return TensorMesh::from_vertices_and_connectivity(Vec::new(), Vec::new())
            .expect("An empty mesh is always valid");
    }

    let vertices_per_dim: Vec<usize> = cells_per_dim.iter().map(|n| n + 1).collect();
    let vertex_strides = strides(&vertices_per_dim);
    let num_vertices: usize = vertices_per_dim.iter().product();
    let num_cells: usize = cells_per_dim.iter().product();

    let vertices = (0..num_vertices)
        .map(|v| {
            let coords = OVector::<T, D>::from_fn(|d, _| {
                let i = (v / vertex_strides[d]) % vertices_per_dim[d];
                let fraction: T = convert(i as f64 / cells_per_dim[d] as f64);
                origin[d].clone() + extents[d].clone() * fraction
            });
            OPoint::from(coords)
        })
        .collect();

    let cell_strides = strides(cells_per_dim);
    let mut connectivity = Vec::with_capacity(num_cells * vertices_per_cell(dim));
    for cell in 0..num_cells {
        let base: usize = (0..dim)
            .map(|d| ((cell / cell_strides[d]) % cells_per_dim[d]) * vertex_strides[d])
            .sum();
        for corner in 0..vertices_per_cell(dim) {
            let offset: usize = (0..dim)
                .filter(|d| (corner >> d) & 1 == 1)
                .map(|d| vertex_strides[d])
                .sum();
            connectivity.push(base + offset);
        }
    }

    TensorMesh::from_vertices_and_connectivity(vertices, connectivity)
        .expect("Procedurally generated connectivity is always in bounds")
}

fn strides(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(1, |stride, &n| {
            let current = *stride;
            *stride *= n;
            Some(current)
        })
        .collect()
}
