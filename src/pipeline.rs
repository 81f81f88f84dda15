//! Top-level pipeline orchestration: wires the voxelization, filtering,
//! region-growing, contour, polygon-mesh, and detail-mesh stages together
//! into a single entry point.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::{
    config::NavMeshConfig,
    contours::ContourSet,
    detail_mesh::build_detail_mesh,
    filter::{filter_ledge_spans, filter_low_height_spans},
    heightfield::{HeightfieldBuilder, HeightfieldBuilderError, SolidHeightfield, SpanInsertionError},
    math::Aabb3d,
    open_heightfield::{OpenHeightfield, OpenHeightfieldError},
    poly_mesh::{build_poly_mesh, PolyMeshError, PolyMeshField},
    rasterize::rasterize_triangle,
    trimesh::{NavMeshInput, NavMeshInputError, TriangleMesh},
};

/// Intermediate stage snapshots and per-stage timings, populated when
/// [`NavMeshConfig::collect_diagnostics`] is set.
#[derive(Debug, Clone)]
pub struct NavMeshDiagnostics {
    /// The voxelized solid heightfield after rasterization and filtering.
    pub solid_heightfield: SolidHeightfield,
    /// The inverted, region-grown open heightfield.
    pub open_heightfield: OpenHeightfield,
    /// The traced and simplified region contours.
    pub contour_set: ContourSet,
    /// The convex polygon mesh recovered from the contours.
    pub poly_mesh_field: PolyMeshField,
    /// Wall-clock duration of each named stage, in pipeline order.
    pub stage_timings: Vec<(&'static str, Duration)>,
}

/// The result of a successful [`build_navmesh`] call.
#[derive(Debug, Clone)]
pub struct NavMeshBuildOutput {
    /// The final detail triangle mesh.
    pub mesh: TriangleMesh,
    /// Present only when the config requested diagnostics.
    pub diagnostics: Option<NavMeshDiagnostics>,
}

/// Fatal build errors. Per-polygon and per-contour failures are recoverable
/// and only ever reach a `tracing::warn!` call, never this type.
#[derive(Error, Debug)]
pub enum NavMeshBuildError {
    /// The input's vertex/index arrays were malformed.
    #[error("invalid input geometry: {0}")]
    InvalidInput(#[from] NavMeshInputError),
    /// The input had no vertices to compute a bounding box from.
    #[error("input geometry is empty")]
    EmptyInput,
    /// The voxel grid implied by the input AABB and `cell_size` overflowed.
    #[error(transparent)]
    HeightfieldBuilder(#[from] HeightfieldBuilderError),
    /// A rasterized span fell outside the computed grid bounds.
    #[error(transparent)]
    SpanInsertion(#[from] SpanInsertionError),
    /// A column exceeded the axis-neighbor layer-offset encoding's range.
    #[error(transparent)]
    OpenHeightfield(#[from] OpenHeightfieldError),
    /// Aggregate source-vertex count exceeded the polygon mesh's capacity.
    #[error(transparent)]
    PolyMesh(#[from] PolyMeshError),
}

/// Runs the full navmesh generation pipeline: voxelize, filter, invert,
/// grow watershed regions, clean and merge them, trace contours, build a
/// convex polygon mesh, then sample a detail mesh over it.
///
/// # Errors
/// See [`NavMeshBuildError`] for the fatal cases; recoverable per-polygon
/// and per-contour failures are logged and skipped in place.
pub fn build_navmesh(input: &NavMeshInput, config: &NavMeshConfig) -> Result<NavMeshBuildOutput, NavMeshBuildError> {
    input.validate()?;
    let config = config.validated();
    let mut timings: Vec<(&'static str, Duration)> = Vec::new();

    let input_aabb = input.compute_aabb().ok_or(NavMeshBuildError::EmptyInput)?;
    let border = config.traversable_area_border_size as f32 * config.cell_size;
    let border = glam::Vec3A::new(border, 0.0, border);
    let aabb = Aabb3d::new(input_aabb.min - border, input_aabb.max + border);

    let t0 = Instant::now();
    let mut solid = HeightfieldBuilder { aabb, cell_size: config.cell_size, cell_height: config.cell_height }.build()?;
    let max_slope_cos = config.max_traversable_slope.to_radians().cos();
    for (i, triangle) in input.indices.iter().enumerate() {
        let v0 = input.vertices[triangle.x as usize];
        let v1 = input.vertices[triangle.y as usize];
        let v2 = input.vertices[triangle.z as usize];
        rasterize_triangle(&mut solid, v0, v1, v2, input.area_type(i), max_slope_cos)?;
    }
    timings.push(("rasterize", t0.elapsed()));

    let t0 = Instant::now();
    filter_low_height_spans(&mut solid, config.min_traversable_height);
    if config.clip_ledges {
        filter_ledge_spans(&mut solid, config.min_traversable_height, config.max_traversable_step);
    }
    timings.push(("filter", t0.elapsed()));

    let t0 = Instant::now();
    let mut open =
        OpenHeightfield::from_solid_heightfield(&solid, config.min_traversable_height, config.max_traversable_step)?;
    timings.push(("open_heightfield", t0.elapsed()));

    let t0 = Instant::now();
    open.build_distance_field();
    open.smooth_distance_field(config.smoothing_threshold);
    timings.push(("distance_field", t0.elapsed()));

    let t0 = Instant::now();
    open.build_regions(
        config.traversable_area_border_size,
        config.traversable_area_border_size,
        config.use_conservative_expansion,
    );
    timings.push(("watershed", t0.elapsed()));

    let t0 = Instant::now();
    let mut next_region_id = open.spans.iter().map(|s| s.region.id()).max().unwrap_or(0).saturating_add(1);
    open.clean_null_region_borders(&mut next_region_id);
    timings.push(("null_border", t0.elapsed()));

    let t0 = Instant::now();
    open.filter_and_merge_regions(config.min_unconnected_region_size, config.merge_region_size);
    timings.push(("region_filter", t0.elapsed()));

    let t0 = Instant::now();
    let contours = open.build_contours(config.edge_max_deviation / config.cell_size, config.max_edge_length);
    timings.push(("contours", t0.elapsed()));

    let t0 = Instant::now();
    let poly_mesh = build_poly_mesh(&contours, config.max_verts_per_poly)?;
    timings.push(("poly_mesh", t0.elapsed()));

    let t0 = Instant::now();
    let mesh = build_detail_mesh(&open, &poly_mesh, config.contour_sample_distance, config.contour_max_deviation);
    timings.push(("detail_mesh", t0.elapsed()));

    let diagnostics = config.collect_diagnostics.then(|| NavMeshDiagnostics {
        solid_heightfield: solid,
        open_heightfield: open,
        contour_set: contours,
        poly_mesh_field: poly_mesh,
        stage_timings: timings,
    });

    Ok(NavMeshBuildOutput { mesh, diagnostics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{UVec3, Vec3A};

    fn flat_plane_input(size: f32) -> NavMeshInput {
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
    fn a_flat_square_plane_builds_a_nonempty_navmesh() {
        let input = flat_plane_input(10.0);
        let config = NavMeshConfig { cell_size: 0.5, cell_height: 0.2, ..Default::default() };
        let output = build_navmesh(&input, &config).expect("build should succeed");
        assert!(!output.mesh.vertices.is_empty());
        assert!(!output.mesh.indices.is_empty());
        assert!(output.diagnostics.is_none());
    }

    #[test]
    fn diagnostics_are_populated_when_requested() {
        let input = flat_plane_input(10.0);
        let config =
            NavMeshConfig { cell_size: 0.5, cell_height: 0.2, collect_diagnostics: true, ..Default::default() };
        let output = build_navmesh(&input, &config).expect("build should succeed");
        let diagnostics = output.diagnostics.expect("diagnostics were requested");
        assert_eq!(diagnostics.stage_timings.len(), 10);
    }

    #[test]
    fn out_of_bounds_index_is_rejected() {
        let mut input = flat_plane_input(10.0);
        input.indices.push(UVec3::new(0, 1, 99));
        let config = NavMeshConfig::default();
        assert!(matches!(build_navmesh(&input, &config), Err(NavMeshBuildError::InvalidInput(_))));
    }
}
