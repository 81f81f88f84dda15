//! Input and output triangle-mesh types.

use glam::{UVec3, Vec3A};
use thiserror::Error;

use crate::{math::Aabb3d, region::RegionId, span::AreaType};

/// Input geometry for [`build_navmesh`](crate::pipeline::build_navmesh).
///
/// Vertices are world-space; `indices[i]` is one clockwise-wound triangle
/// (viewed from the walkable side) and `area_types[i]` is that triangle's
/// area classification, defaulting to [`AreaType::WALKABLE`] when omitted.
#[derive(Debug, Clone, Default)]
pub struct NavMeshInput {
    /// World-space triangle vertices.
    pub vertices: Vec<Vec3A>,
    /// One clockwise-wound triangle per entry, indexing into `vertices`.
    pub indices: Vec<UVec3>,
    /// Per-triangle area classification. If empty, every triangle is
    /// treated as [`AreaType::WALKABLE`] pending the slope test.
    pub area_types: Vec<AreaType>,
}

impl NavMeshInput {
    /// Validates that `indices` reference only vertices that exist and
    /// that `area_types` is either empty or parallel to `indices`.
    ///
    /// # Errors
    /// See [`NavMeshInputError`].
    pub fn validate(&self) -> Result<(), NavMeshInputError> {
        if !self.area_types.is_empty() && self.area_types.len() != self.indices.len() {
            return Err(NavMeshInputError::AreaTypeLengthMismatch {
                indices: self.indices.len(),
                area_types: self.area_types.len(),
            });
        }
        let vertex_count = self.vertices.len() as u32;
        for (i, triangle) in self.indices.iter().enumerate() {
            if triangle.x >= vertex_count || triangle.y >= vertex_count || triangle.z >= vertex_count
            {
                return Err(NavMeshInputError::VertexIndexOutOfBounds { triangle: i });
            }
        }
        Ok(())
    }

    /// The area type for triangle `i`, defaulting to [`AreaType::WALKABLE`].
    pub(crate) fn area_type(&self, i: usize) -> AreaType {
        self.area_types.get(i).copied().unwrap_or(AreaType::WALKABLE)
    }

    /// The world-space AABB of the input geometry.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        Aabb3d::from_verts(&self.vertices)
    }
}

/// Errors describing malformed [`NavMeshInput`].
#[derive(Error, Debug)]
pub enum NavMeshInputError {
    /// `area_types` was non-empty but not parallel to `indices`.
    #[error("area_types has {area_types} entries but indices has {indices}")]
    AreaTypeLengthMismatch {
        /// The number of triangles.
        indices: usize,
        /// The number of area type entries.
        area_types: usize,
    },
    /// A triangle referenced a vertex index past the end of `vertices`.
    #[error("triangle {triangle} references an out-of-bounds vertex index")]
    VertexIndexOutOfBounds {
        /// The offending triangle's index.
        triangle: usize,
    },
}

/// The final output of the pipeline: a triangle mesh in world space with a
/// per-triangle source region id.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    /// World-space vertices.
    pub vertices: Vec<Vec3A>,
    /// Clockwise-wound triangles, indexing into `vertices`.
    pub indices: Vec<UVec3>,
    /// The region id each triangle was sampled from.
    pub region_ids: Vec<RegionId>,
}
