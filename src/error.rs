use std::path::PathBuf;

/// Errors raised while reading a structured-grid dataset.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("Malformed dataset {path}: {reason}")]
    DatasetFormat { path: String, reason: String },
    #[error("Timestep {timestep} out of range (dataset has {count} timesteps)")]
    TimestepOutOfRange { timestep: usize, count: usize },
    #[error("Channel data has {actual} values, grid expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("Slice level {level} out of range for axis {axis} (size {size})")]
    SliceOutOfRange { axis: usize, level: usize, size: usize },
    #[error("Dataset accessor is closed")]
    Closed,
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FieldError {
    pub fn format(path: impl Into<String>, reason: impl Into<String>) -> Self {
        FieldError::DatasetFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A zero-width (or otherwise unusable) normalization range.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Degenerate range: lower bound {lower} and upper bound {upper} do not span a usable interval")]
pub struct DegenerateRangeError {
    pub lower: f64,
    pub upper: f64,
}

/// A mesh whose triangles or colours are inconsistent with its vertex list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    #[error("Triangle {triangle} references vertex {index}, mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("Mesh has {colors} colours for {vertices} vertices")]
    ColorCountMismatch { colors: usize, vertices: usize },
}

/// Every candidate value was filtered out before percentiles could be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("No values left to estimate percentiles from")]
pub struct EmptyPopulationError;
