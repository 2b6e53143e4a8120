//! Pipeline settings, loadable from JSON. Every field has a default, so a
//! config file only needs the values it changes.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::colormap::ColorRamp;
use crate::fog::FogConfig;
use crate::percentile::InterfaceMask;
use crate::render::CameraConfig;
use crate::streamline::{Interpolation, SeedFace};
use crate::tube::TubeConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsosurfaceConfig {
    pub channel: String,
    /// Contour level; 0.8 sits on the liquid side of a VOF interface.
    pub level: f64,
    /// Merge vertices closer than this before smoothing.
    pub weld_tolerance: Option<f32>,
    pub smooth_iterations: usize,
    pub smooth_factor: f32,
}

impl Default for IsosurfaceConfig {
    fn default() -> Self {
        Self {
            channel: "VOF".to_string(),
            level: 0.8,
            weld_tolerance: None,
            smooth_iterations: 2,
            smooth_factor: 0.5,
        }
    }
}

/// Vertex colouring of isosurfaces by a second channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub channel: String,
    pub percentile_low: f64,
    pub percentile_high: f64,
    pub ramp: ColorRamp,
    /// Restrict the percentile population to the interface region.
    pub mask: Option<InterfaceMask>,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            channel: "T".to_string(),
            percentile_low: 1.0,
            percentile_high: 99.0,
            ramp: ColorRamp::Inferno,
            mask: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lambda2Config {
    /// Vector group holding the velocity components.
    pub velocity: String,
    /// Negative contour level marking vortex cores.
    pub level: f64,
}

impl Default for Lambda2Config {
    fn default() -> Self {
        Self {
            velocity: "velocity".to_string(),
            level: -0.5,
        }
    }
}

/// Where streamlines start.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Seeding {
    /// Brick pattern on one face of the grid box, in grid-index units.
    Face { face: SeedFace, spacing: f64 },
    /// Random nodes from the k-layers just off the body wall.
    Surface { count: usize, seed: u64, layers: usize },
}

impl Default for Seeding {
    fn default() -> Self {
        Seeding::Face {
            face: SeedFace::YzMin,
            spacing: 4.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamlineConfig {
    pub velocity: String,
    /// Trilinear traces in grid-index units, nearest in physical coordinates.
    pub interpolation: Interpolation,
    pub seeding: Seeding,
    pub step: f64,
    pub max_steps: usize,
    /// Only trace this timestep; all timesteps when unset.
    pub timestep: Option<usize>,
    pub percentile_low: f64,
    pub percentile_high: f64,
    /// Sample every n-th node when building the magnitude percentile table.
    pub magnitude_stride: usize,
}

impl Default for StreamlineConfig {
    fn default() -> Self {
        Self {
            velocity: "velocity".to_string(),
            interpolation: Interpolation::Trilinear,
            seeding: Seeding::default(),
            step: 0.5,
            max_steps: 1000,
            timestep: None,
            percentile_low: 1.0,
            percentile_high: 99.0,
            magnitude_stride: 1,
        }
    }
}

/// Plane `dot(normal, p) = offset`; geometry in front of it is removed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CutPlane {
    pub normal: [f32; 3],
    pub offset: f32,
}

/// Moving grid-index meshes into render space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Rendered y extent of the domain.
    pub scale: f32,
    pub cut: Option<CutPlane>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            scale: 10.0,
            cut: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub isosurface: IsosurfaceConfig,
    pub color: ColorConfig,
    pub fog: FogConfig,
    pub lambda2: Lambda2Config,
    pub streamline: StreamlineConfig,
    pub tube: TubeConfig,
    pub placement: PlacementConfig,
    pub camera: CameraConfig,
    /// Worker threads for per-timestep stages (0 = all cores).
    pub num_threads: usize,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}
