//! Turns multi-timestep CFD fields into renderable geometry: isosurface
//! meshes, coloured streamline tubes, vortex-core surfaces and fog voxels,
//! written as ASCII PLY and `.bvox` frame sequences.

pub mod body_surface;
pub mod codec;
pub mod colorize;
pub mod colormap;
pub mod config;
pub mod error;
pub mod field;
pub mod fog;
pub mod lambda2;
pub mod marching_cubes;
mod mc_tables;
pub mod mesh;
pub mod parallel_iter;
pub mod percentile;
pub mod pipeline;
pub mod render;
pub mod streamline;
pub mod tube;

pub use colormap::{ColorRamp, Rgb};
pub use config::PipelineConfig;
pub use error::{DegenerateRangeError, EmptyPopulationError, FieldError, MeshError};
pub use field::{Axis, FieldAccessor, ScalarField3, VectorField3};
pub use mesh::Mesh;
pub use percentile::PercentileTable;
pub use streamline::{trace, Bounds, Polyline, StopReason, Trace};
