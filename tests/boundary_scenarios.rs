//! End-to-end boundary scenarios for the navmesh pipeline, plus the
//! determinism and rotational-stability laws.

use glam::{UVec3, Vec3A};
use navmesh_gen::{
    config::NavMeshConfig,
    heightfield::HeightfieldBuilder,
    math::Aabb3d,
    pipeline::build_navmesh,
    span::SpanFlags,
    trimesh::NavMeshInput,
};

fn flat_floor(size: u16, height: u16) -> navmesh_gen::heightfield::SolidHeightfield {
    let mut hf = HeightfieldBuilder {
        aabb: Aabb3d::new(Vec3A::ZERO, Vec3A::new(size as f32, 10.0, size as f32)),
        cell_size: 1.0,
        cell_height: 1.0,
    }
    .build()
    .unwrap();
    for z in 0..size {
        for x in 0..size {
            hf.add_span(x, z, 0, height, SpanFlags::WALKABLE).unwrap();
        }
    }
    hf
}

#[test]
fn flat_square_merges_into_one_quad_with_one_region() {
    let hf = flat_floor(4, 2);
    let mut open = navmesh_gen::open_heightfield::OpenHeightfield::from_solid_heightfield(&hf, 2, 1).unwrap();
    open.build_distance_field();
    open.build_regions(0, 0, true);
    open.filter_and_merge_regions(0, 0);

    let region_ids: std::collections::HashSet<_> =
        open.spans.iter().map(|s| s.region.without_border().id()).filter(|&id| id != 0).collect();
    assert_eq!(region_ids.len(), 1, "a single flat floor should settle into one region");

    let contours = open.build_contours(1.3, 12);
    let poly_mesh = navmesh_gen::poly_mesh::build_poly_mesh(&contours, 6).unwrap();
    assert_eq!(poly_mesh.polygons.len(), 1, "the merge pass should fuse the two triangles into one polygon");
    assert_eq!(poly_mesh.polygons[0].vertices.len(), 4, "a square floor merges back into a 4-vertex quad");

    let mesh = navmesh_gen::detail_mesh::build_detail_mesh(&open, &poly_mesh, 0.0, 1.0);
    assert!(!mesh.indices.is_empty());
}

#[test]
fn a_one_voxel_step_is_traversable_as_a_single_region() {
    let mut wide = HeightfieldBuilder {
        aabb: Aabb3d::new(Vec3A::ZERO, Vec3A::new(8.0, 10.0, 4.0)),
        cell_size: 1.0,
        cell_height: 1.0,
    }
    .build()
    .unwrap();
    for z in 0..4u16 {
        for x in 0..4u16 {
            wide.add_span(x, z, 0, 2, SpanFlags::WALKABLE).unwrap();
        }
        for x in 4..8u16 {
            wide.add_span(x, z, 1, 3, SpanFlags::WALKABLE).unwrap();
        }
    }

    let mut open = navmesh_gen::open_heightfield::OpenHeightfield::from_solid_heightfield(&wide, 2, 1).unwrap();
    open.build_distance_field();
    open.build_regions(0, 0, true);

    let region_ids: std::collections::HashSet<_> =
        open.spans.iter().map(|s| s.region.without_border().id()).filter(|&id| id != 0).collect();
    assert_eq!(region_ids.len(), 1, "a one-voxel step should stay within max_traversable_step and form one region");
}

#[test]
fn a_ledge_taller_than_max_step_splits_into_two_regions() {
    let mut wide = HeightfieldBuilder {
        aabb: Aabb3d::new(Vec3A::ZERO, Vec3A::new(8.0, 10.0, 4.0)),
        cell_size: 1.0,
        cell_height: 1.0,
    }
    .build()
    .unwrap();
    for z in 0..4u16 {
        for x in 0..4u16 {
            wide.add_span(x, z, 0, 2, SpanFlags::WALKABLE).unwrap();
        }
        for x in 4..8u16 {
            wide.add_span(x, z, 1, 3, SpanFlags::WALKABLE).unwrap();
        }
    }

    // max_traversable_step = 0: the one-voxel step is now a ledge.
    let mut open = navmesh_gen::open_heightfield::OpenHeightfield::from_solid_heightfield(&wide, 2, 0).unwrap();
    open.build_distance_field();
    open.build_regions(0, 0, true);

    let region_ids: std::collections::HashSet<_> =
        open.spans.iter().map(|s| s.region.without_border().id()).filter(|&id| id != 0).collect();
    assert_eq!(region_ids.len(), 2, "with max_step=0 the ledge should separate the floors into two regions");
}

#[test]
fn an_encompassed_null_hole_keeps_one_region_with_two_contours() {
    let mut hf = HeightfieldBuilder {
        aabb: Aabb3d::new(Vec3A::ZERO, Vec3A::new(6.0, 10.0, 6.0)),
        cell_size: 1.0,
        cell_height: 1.0,
    }
    .build()
    .unwrap();
    for z in 0..6u16 {
        for x in 0..6u16 {
            let in_pit = (2..4).contains(&x) && (2..4).contains(&z);
            if !in_pit {
                hf.add_span(x, z, 0, 2, SpanFlags::WALKABLE).unwrap();
            }
        }
    }
    let mut open = navmesh_gen::open_heightfield::OpenHeightfield::from_solid_heightfield(&hf, 2, 1).unwrap();
    open.build_distance_field();
    open.build_regions(0, 0, true);
    let mut next_region_id = open.spans.iter().map(|s| s.region.id()).max().unwrap_or(0) + 1;
    open.clean_null_region_borders(&mut next_region_id);
    open.filter_and_merge_regions(0, 0);

    let region_ids: std::collections::HashSet<_> =
        open.spans.iter().map(|s| s.region.without_border().id()).filter(|&id| id != 0).collect();
    assert_eq!(region_ids.len(), 1, "the ring around the pit should stay one region");

    let contours = open.build_contours(1.3, 12);
    assert_eq!(contours.contours.len(), 2, "an encompassing region produces an outer and an inner contour");
}

#[test]
fn a_slope_of_exactly_forty_five_degrees_is_walkable() {
    let max_slope_cos = 45f32.to_radians().cos();
    let v0 = Vec3A::new(0.0, 0.0, 0.0);
    let v1 = Vec3A::new(1.0, 1.0, 0.0);
    let v2 = Vec3A::new(0.0, 1.0, 1.0);
    assert!(navmesh_gen::rasterize::triangle_is_walkable(v0, v1, v2, max_slope_cos - 1e-4));
}

#[test]
fn a_narrow_corridor_wider_than_twice_the_border_size_forms_one_region() {
    let border_size = 2u16;
    let length = 20u16;
    let mut hf = HeightfieldBuilder {
        aabb: Aabb3d::new(Vec3A::ZERO, Vec3A::new(1.0, 10.0, length as f32)),
        cell_size: 1.0,
        cell_height: 1.0,
    }
    .build()
    .unwrap();
    for z in 0..length {
        hf.add_span(0, z, 0, 2, SpanFlags::WALKABLE).unwrap();
    }
    let mut open = navmesh_gen::open_heightfield::OpenHeightfield::from_solid_heightfield(&hf, 2, 1).unwrap();
    open.build_distance_field();
    open.build_regions(border_size, border_size, true);

    let region_ids: std::collections::HashSet<_> =
        open.spans.iter().map(|s| s.region.without_border().id()).filter(|&id| id != 0).collect();
    assert_eq!(region_ids.len(), 1, "a corridor well past the border margin should form one region");
}

fn plane_input(size: f32) -> NavMeshInput {
    NavMeshInput {
        vertices: vec![
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(size, 0.0, 0.0),
            Vec3A::new(size, 0.0, size),
            Vec3A::new(0.0, 0.0, size),
        ],
        indices: vec![UVec3::new(0, 1, 2), UVec3::new(0, 2, 3)],
        area_types: Vec::new(),
    }
}

#[test]
fn identical_inputs_produce_bit_identical_outputs() {
    let input = plane_input(12.0);
    let config = NavMeshConfig { cell_size: 0.5, cell_height: 0.2, ..Default::default() };
    let a = build_navmesh(&input, &config).unwrap();
    let b = build_navmesh(&input, &config).unwrap();
    assert_eq!(a.mesh.vertices.len(), b.mesh.vertices.len());
    for (va, vb) in a.mesh.vertices.iter().zip(&b.mesh.vertices) {
        assert_eq!(va.to_array(), vb.to_array());
    }
    assert_eq!(
        a.mesh.indices.iter().map(|i| i.to_array()).collect::<Vec<_>>(),
        b.mesh.indices.iter().map(|i| i.to_array()).collect::<Vec<_>>()
    );
}

#[test]
fn rotating_the_input_plane_ninety_degrees_yields_the_same_vertex_count() {
    let input = plane_input(12.0);
    let config = NavMeshConfig { cell_size: 0.5, cell_height: 0.2, ..Default::default() };
    let straight = build_navmesh(&input, &config).unwrap();

    let rotated_vertices: Vec<Vec3A> = input.vertices.iter().map(|v| Vec3A::new(-v.z, v.y, v.x)).collect();
    let rotated_input = NavMeshInput { vertices: rotated_vertices, indices: input.indices.clone(), area_types: Vec::new() };
    let rotated = build_navmesh(&rotated_input, &config).unwrap();

    assert_eq!(
        straight.mesh.vertices.len(),
        rotated.mesh.vertices.len(),
        "a 90-degree rotation of a symmetric square plane should sample the same number of detail vertices"
    );
}
