use fenris_thermal::mesh::procedural::{
    create_rectangular_uniform_mesh, create_unit_box_uniform_hex_mesh_3d, create_unit_interval_uniform_mesh_1d,
    create_unit_square_uniform_quad_mesh_2d,
};
use fenris_thermal::mesh::{local_face_vertices, QuadMesh2d};
use nalgebra::{point, vector, Point2};

#[test]
fn unit_square_mesh_has_lexicographic_vertices_and_cells() {
    let mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(2);
    assert_eq!(mesh.vertices().len(), 9);
    assert_eq!(mesh.num_cells(), 4);
    assert_eq!(mesh.cell_vertices(0), &[0, 1, 3, 4]);
    assert_eq!(mesh.cell_vertices(3), &[4, 5, 7, 8]);
    assert_eq!(mesh.vertices()[4], point![0.5, 0.5]);
    assert_eq!(mesh.vertices()[8], point![1.0, 1.0]);
    assert!(mesh.material_ids().iter().all(|&id| id == 0));
}

#[test]
fn rectangular_mesh_respects_origin_and_extents() {
    let mesh = create_rectangular_uniform_mesh(&point![-1.0, 2.0], &vector![4.0, 1.0], &[2, 1]);
    assert_eq!(mesh.num_cells(), 2);
    assert_eq!(
        mesh.cell_vertex_coordinates(1),
        vec![point![1.0, 2.0], point![3.0, 2.0], point![1.0, 3.0], point![3.0, 3.0]]
    );
}

#[test]
fn rectangular_mesh_with_zero_cells_is_empty() {
    let mesh = create_rectangular_uniform_mesh(&Point2::origin(), &vector![1.0, 1.0], &[3, 0]);
    assert_eq!(mesh.num_cells(), 0);
    assert!(mesh.vertices().is_empty());
    assert!(mesh.find_boundary_faces().is_empty());
}

#[test]
fn local_faces_of_quadrilateral() {
    assert_eq!(local_face_vertices(2, 0), vec![0, 2]);
    assert_eq!(local_face_vertices(2, 1), vec![1, 3]);
    assert_eq!(local_face_vertices(2, 2), vec![0, 1]);
    assert_eq!(local_face_vertices(2, 3), vec![2, 3]);
    assert_eq!(local_face_vertices(3, 5), vec![4, 5, 6, 7]);
}

#[test]
fn boundary_faces_of_single_quad() {
    let mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(1);
    assert_eq!(mesh.find_boundary_faces(), vec![(0, 0), (0, 1), (0, 2), (0, 3)]);
}

#[test]
fn boundary_faces_of_interval_mesh() {
    let mesh = create_unit_interval_uniform_mesh_1d::<f64>(3);
    assert_eq!(mesh.find_boundary_faces(), vec![(0, 0), (2, 1)]);
    assert_eq!(mesh.find_boundary_vertices(), vec![0, 3]);
}

#[test]
fn boundary_of_structured_meshes() {
    let quads = create_unit_square_uniform_quad_mesh_2d::<f64>(2);
    assert_eq!(quads.find_boundary_faces().len(), 8);
    assert_eq!(quads.find_boundary_vertices(), vec![0, 1, 2, 3, 5, 6, 7, 8]);

    let hexes = create_unit_box_uniform_hex_mesh_3d::<f64>(2);
    assert_eq!(hexes.find_boundary_faces().len(), 24);
    // Only the center vertex is interior
    assert_eq!(hexes.find_boundary_vertices().len(), 26);
}

#[test]
fn invalid_connectivity_is_rejected() {
    let vertices = vec![point![0.0, 0.0], point![1.0, 0.0], point![0.0, 1.0], point![1.0, 1.0]];
    assert!(QuadMesh2d::from_vertices_and_connectivity(vertices.clone(), vec![0, 1, 2]).is_err());
    assert!(QuadMesh2d::from_vertices_and_connectivity(vertices.clone(), vec![0, 1, 2, 4]).is_err());
    assert!(QuadMesh2d::from_vertices_and_connectivity(vertices, vec![0, 1, 2, 3]).is_ok());
}

#[test]
fn material_ids_must_match_cell_count() {
    let mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(2);
    assert!(mesh.clone().with_material_ids(vec![1, 2]).is_err());

    let mut mesh = mesh.with_material_ids(vec![1, 2, 3, 4]).unwrap();
    mesh.set_material_id(0, 7);
    assert_eq!(mesh.material_ids(), &[7, 2, 3, 4]);
}

#[test]
fn translate_moves_all_vertices() {
    let mut mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(1);
    mesh.translate(&vector![1.0, -2.0]);
    assert_eq!(mesh.vertices()[0], point![1.0, -2.0]);
    assert_eq!(mesh.vertices()[3], point![2.0, -1.0]);
}
