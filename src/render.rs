//! Driving an external renderer over a sequence of converted frames.
//!
//! The renderer itself lives outside this crate; anything that can import
//! a PLY, bind a voxel texture, place a camera and write an image can
//! implement [`RenderHost`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::layout::{is_valid_output, OutputLayout};

/// Opaque id of an object the host has imported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub u64);

pub trait RenderHost {
    fn import_mesh(&mut self, path: &Path, name: &str) -> Result<ObjectHandle>;
    fn set_voxel_texture(&mut self, path: &Path) -> Result<()>;
    fn set_camera(&mut self, camera: &CameraSetup) -> Result<()>;
    fn render_frame(&mut self, output: &Path) -> Result<()>;
    fn delete_object(&mut self, handle: ObjectHandle) -> Result<()>;
}

/// Camera orbiting the domain centre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSetup {
    pub distance: f64,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub fov_rad: f64,
}

impl CameraSetup {
    /// Field of view that fits `view_fraction` times the domain width
    /// (`render_scale`) at `distance`. A fraction of 1 frames the whole
    /// domain, 2 zooms out by a factor of two.
    pub fn from_view_fraction(
        render_scale: f64,
        view_fraction: f64,
        distance: f64,
        azimuth_deg: f64,
        elevation_deg: f64,
    ) -> Self {
        Self {
            distance,
            azimuth_deg,
            elevation_deg,
            fov_rad: 2.0 * (render_scale * view_fraction / (2.0 * distance)).atan(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Rendered width of the domain in scene units.
    pub render_scale: f64,
    pub view_fraction: f64,
    pub distance: f64,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            render_scale: 10.0,
            view_fraction: 1.0,
            distance: 15.0,
            azimuth_deg: 0.0,
            elevation_deg: 0.0,
        }
    }
}

impl CameraConfig {
    pub fn setup(&self) -> CameraSetup {
        CameraSetup::from_view_fraction(
            self.render_scale,
            self.view_fraction,
            self.distance,
            self.azimuth_deg,
            self.elevation_deg,
        )
    }
}

/// One animation: meshes (and optionally voxels) in, images out.
#[derive(Clone, Debug)]
pub struct RenderJob {
    pub mesh_dir: PathBuf,
    pub voxel_dir: Option<PathBuf>,
    pub image_dir: PathBuf,
    pub frame_count: usize,
    pub camera: CameraSetup,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub rendered: usize,
    pub skipped: usize,
}

/// Render every frame of `job` whose image is not already on disk.
///
/// The first failing host call aborts the sequence; it is not retried.
pub fn render_sequence<H>(host: &mut H, job: &RenderJob) -> Result<RenderSummary>
where
    H: RenderHost + ?Sized,
{
    host.set_camera(&job.camera).context("Failed to place camera")?;
    let meshes = OutputLayout::new(&job.mesh_dir, "ply");
    let voxels = job.voxel_dir.as_ref().map(|d| OutputLayout::new(d, "bvox"));
    let images = OutputLayout::new(&job.image_dir, "png");

    let mut summary = RenderSummary::default();
    for t in 0..job.frame_count {
        let image = images.path(t);
        if is_valid_output(&image) {
            log::debug!("Frame {t} already rendered: {}", image.display());
            summary.skipped += 1;
            continue;
        }
        let mesh = meshes.path(t);
        let handle = host
            .import_mesh(&mesh, &format!("ply_frame_{t}"))
            .with_context(|| format!("Failed to import {}", mesh.display()))?;
        let drawn = match &voxels {
            Some(voxels) => {
                let texture = voxels.path(t);
                host.set_voxel_texture(&texture)
                    .with_context(|| format!("Failed to load voxel texture {}", texture.display()))
            }
            None => Ok(()),
        }
        .and_then(|_| {
            host.render_frame(&image)
                .with_context(|| format!("Failed to render frame {t} to {}", image.display()))
        });
        if let Err(err) = drawn {
            if let Err(cleanup) = host.delete_object(handle) {
                log::warn!("Failed to delete frame {t} object after error: {cleanup:#}");
            }
            return Err(err);
        }
        host.delete_object(handle)
            .with_context(|| format!("Failed to delete frame {t} object"))?;
        log::info!("Rendered frame {t} to {}", image.display());
        summary.rendered += 1;
    }
    Ok(summary)
}
