//! Build configuration.

use tracing::warn;

/// Every tunable knob of [`build_navmesh`](crate::pipeline::build_navmesh),
/// immutable for the duration of one build.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavMeshConfig {
    /// xz sampling resolution, world units.
    pub cell_size: f32,
    /// y sampling resolution, world units.
    pub cell_height: f32,
    /// Minimum vertical clearance for a floor to be walkable, voxels (≥ 1).
    pub min_traversable_height: u16,
    /// Maximum legal step up/down between neighbor floors, voxels.
    pub max_traversable_step: u16,
    /// Maximum floor slope, degrees (0..85).
    pub max_traversable_slope: f32,
    /// Whether to remove the walkable flag from ledge spans.
    pub clip_ledges: bool,
    /// Minimum distance from any obstruction, voxels.
    pub traversable_area_border_size: u16,
    /// Distance-field smoothing pass cap (0..4).
    pub smoothing_threshold: u16,
    /// Whether to enable narrow-neck prevention during watershed expansion.
    pub use_conservative_expansion: bool,
    /// Islands below this span count are culled.
    pub min_unconnected_region_size: u32,
    /// Regions at or below this span count are merged into a neighbor.
    pub merge_region_size: u32,
    /// Null-region edges longer than this are subdivided, voxels (`0` disables it).
    pub max_edge_length: u16,
    /// Max deviation for the null-region edge fit, world units.
    pub edge_max_deviation: f32,
    /// Cap on convex polygon vertex count (≥ 3).
    pub max_verts_per_poly: usize,
    /// Detail sampling step, world units (`0.0` disables detail sampling).
    pub contour_sample_distance: f32,
    /// Detail surface deviation bound, world units.
    pub contour_max_deviation: f32,
    /// Whether [`build_navmesh`](crate::pipeline::build_navmesh) should
    /// return the intermediate stage snapshots and timings alongside the
    /// final mesh.
    pub collect_diagnostics: bool,
}

impl Default for NavMeshConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            min_traversable_height: 10,
            max_traversable_step: 4,
            max_traversable_slope: 45.0,
            clip_ledges: true,
            traversable_area_border_size: 2,
            smoothing_threshold: 2,
            use_conservative_expansion: true,
            min_unconnected_region_size: 8,
            merge_region_size: 20,
            max_edge_length: 12,
            edge_max_deviation: 1.3,
            max_verts_per_poly: 6,
            contour_sample_distance: 6.0,
            contour_max_deviation: 1.0,
            collect_diagnostics: false,
        }
    }
}

impl NavMeshConfig {
    /// Clamps every field to its valid range, logging a warning for each
    /// field that needed clamping.
    pub fn validated(mut self) -> Self {
        if self.cell_size <= 0.0 {
            warn!(value = self.cell_size, "cell_size must be positive, clamping to 0.01");
            self.cell_size = 0.01;
        }
        if self.cell_height <= 0.0 {
            warn!(value = self.cell_height, "cell_height must be positive, clamping to 0.01");
            self.cell_height = 0.01;
        }
        if self.min_traversable_height < 1 {
            warn!("min_traversable_height must be at least 1, clamping");
            self.min_traversable_height = 1;
        }
        let clamped_slope = self.max_traversable_slope.clamp(0.0, 85.0);
        if clamped_slope != self.max_traversable_slope {
            warn!(value = self.max_traversable_slope, "max_traversable_slope out of 0..85 range, clamping");
            self.max_traversable_slope = clamped_slope;
        }
        let clamped_smoothing = self.smoothing_threshold.min(4);
        if clamped_smoothing != self.smoothing_threshold {
            warn!(value = self.smoothing_threshold, "smoothing_threshold out of 0..4 range, clamping");
            self.smoothing_threshold = clamped_smoothing;
        }
        if self.max_verts_per_poly < 3 {
            warn!(value = self.max_verts_per_poly, "max_verts_per_poly must be at least 3, clamping");
            self.max_verts_per_poly = 3;
        }
        if self.contour_sample_distance < 0.0 {
            warn!(value = self.contour_sample_distance, "contour_sample_distance cannot be negative, clamping to 0");
            self.contour_sample_distance = 0.0;
        }
        if self.contour_max_deviation < 0.0 {
            warn!(value = self.contour_max_deviation, "contour_max_deviation cannot be negative, clamping to 0");
            self.contour_max_deviation = 0.0;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_survives_validation_unchanged() {
        let config = NavMeshConfig::default();
        assert_eq!(config.validated(), config);
    }

    #[test]
    fn out_of_range_slope_is_clamped() {
        let config = NavMeshConfig { max_traversable_slope: 200.0, ..Default::default() }.validated();
        assert_eq!(config.max_traversable_slope, 85.0);
    }

    #[test]
    fn zero_cell_size_is_clamped_to_a_positive_minimum() {
        let config = NavMeshConfig { cell_size: 0.0, ..Default::default() }.validated();
        assert!(config.cell_size > 0.0);
    }
}
