#![doc = include_str!("../readme.md")]

pub mod compact_cell;
pub mod config;
pub mod contours;
pub mod detail_mesh;
pub mod distance_field;
pub mod filter;
pub mod heightfield;
pub mod math;
pub mod null_border;
pub mod open_heightfield;
pub mod open_span;
pub mod pipeline;
pub mod poly_mesh;
pub mod rasterize;
pub mod region;
pub mod region_filter;
pub mod span;
pub mod trimesh;
pub mod watershed;

pub use config::NavMeshConfig;
pub use pipeline::{build_navmesh, NavMeshBuildError, NavMeshBuildOutput, NavMeshDiagnostics};
pub use region::RegionId;
pub use trimesh::{NavMeshInput, NavMeshInputError, TriangleMesh};
