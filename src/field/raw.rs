//! Directory-of-raw-arrays dataset layout.
//!
//! ```text
//! <root>/dataset.json          manifest (DatasetInfo + optional coordinate file)
//! <root>/t000000/VOF.f32       little-endian f32, storage axis order
//! <root>/t000000/YV.f32
//! <root>/coordinates.f64       little-endian f64 xyz triplets (curvilinear grids)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::backend::{DatasetBackend, DatasetInfo, GridKind};
use super::ScalarField3;
use crate::error::FieldError;

pub const MANIFEST_FILE: &str = "dataset.json";
pub const COORDINATES_FILE: &str = "coordinates.f64";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawManifest {
    #[serde(flatten)]
    info: DatasetInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coordinates: Option<String>,
}

fn channel_path(root: &Path, timestep: usize, channel: &str) -> PathBuf {
    root.join(format!("t{timestep:06}")).join(format!("{channel}.f32"))
}

fn io_error(path: &Path, source: std::io::Error) -> FieldError {
    FieldError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub struct RawDirectoryDataset {
    root: PathBuf,
    source: String,
    manifest: RawManifest,
}

impl RawDirectoryDataset {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, FieldError> {
        let root = root.as_ref().to_path_buf();
        let source = root.display().to_string();
        let manifest_path = root.join(MANIFEST_FILE);
        let text = fs::read_to_string(&manifest_path).map_err(|e| io_error(&manifest_path, e))?;
        let manifest: RawManifest = serde_json::from_str(&text)
            .map_err(|e| FieldError::format(&source, format!("invalid {MANIFEST_FILE}: {e}")))?;
        manifest.info.validate(&source)?;
        if manifest.info.grid == GridKind::Curvilinear && manifest.coordinates.is_none() {
            return Err(FieldError::format(
                &source,
                "curvilinear grid without a coordinate file",
            ));
        }
        log::debug!(
            "Opened raw dataset {} ({} timesteps, resolution {:?})",
            source,
            manifest.info.timestep_count,
            manifest.info.resolution
        );
        Ok(Self {
            root,
            source,
            manifest,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DatasetBackend for RawDirectoryDataset {
    fn source(&self) -> &str {
        &self.source
    }

    fn info(&self) -> &DatasetInfo {
        &self.manifest.info
    }

    fn read_scalar(&self, timestep: usize, channel: &str) -> Result<Vec<f32>, FieldError> {
        let path = channel_path(&self.root, timestep, channel);
        let bytes = fs::read(&path).map_err(|e| io_error(&path, e))?;
        if bytes.len() % 4 != 0 {
            return Err(FieldError::format(
                path.display().to_string(),
                format!("{} bytes is not a whole number of f32 values", bytes.len()),
            ));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn read_coordinates(&self) -> Result<Option<Vec<[f64; 3]>>, FieldError> {
        let Some(name) = &self.manifest.coordinates else {
            return Ok(None);
        };
        let path = self.root.join(name);
        let bytes = fs::read(&path).map_err(|e| io_error(&path, e))?;
        if bytes.len() % 24 != 0 {
            return Err(FieldError::format(
                path.display().to_string(),
                format!("{} bytes is not a whole number of xyz triplets", bytes.len()),
            ));
        }
        let read = |c: &[u8]| {
            f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
        };
        Ok(Some(
            bytes
                .chunks_exact(24)
                .map(|c| [read(&c[0..8]), read(&c[8..16]), read(&c[16..24])])
                .collect(),
        ))
    }
}

/// Writes the raw directory layout. Fields are given in canonical order and
/// stored in the manifest's axis order.
pub struct RawDatasetWriter {
    root: PathBuf,
    manifest: RawManifest,
}

impl RawDatasetWriter {
    pub fn create(root: impl AsRef<Path>, info: DatasetInfo) -> anyhow::Result<Self> {
        use anyhow::Context;

        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create dataset directory {}", root.display()))?;
        let writer = Self {
            root,
            manifest: RawManifest {
                info,
                coordinates: None,
            },
        };
        writer.write_manifest()?;
        Ok(writer)
    }

    fn write_manifest(&self) -> anyhow::Result<()> {
        use anyhow::Context;

        let path = self.root.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write manifest {}", path.display()))
    }

    pub fn write_field(
        &mut self,
        timestep: usize,
        channel: &str,
        field: &ScalarField3,
    ) -> anyhow::Result<()> {
        use anyhow::Context;

        anyhow::ensure!(
            field.shape() == self.manifest.info.resolution,
            "field shape {:?} does not match dataset resolution {:?}",
            field.shape(),
            self.manifest.info.resolution
        );
        let path = channel_path(&self.root, timestep, channel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let stored = self
            .manifest
            .info
            .axis_order
            .from_canonical(field.as_slice(), field.shape());
        let bytes: Vec<u8> = stored.iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write channel {}", path.display()))?;

        let mut changed = false;
        if !self.manifest.info.has_scalar(channel) {
            self.manifest.info.scalars.push(channel.to_string());
            changed = true;
        }
        if timestep >= self.manifest.info.timestep_count {
            self.manifest.info.timestep_count = timestep + 1;
            changed = true;
        }
        if changed {
            self.write_manifest()?;
        }
        Ok(())
    }

    /// Store per-node coordinates given in canonical node order.
    pub fn write_coordinates(&mut self, coordinates: &[[f64; 3]]) -> anyhow::Result<()> {
        use anyhow::Context;

        let info = &self.manifest.info;
        anyhow::ensure!(
            coordinates.len() == info.node_count(),
            "{} coordinates for {} grid nodes",
            coordinates.len(),
            info.node_count()
        );
        let stored = info.axis_order.from_canonical(coordinates, info.resolution);
        let bytes: Vec<u8> = stored
            .iter()
            .flat_map(|p| p.iter().flat_map(|c| c.to_le_bytes()))
            .collect();
        let path = self.root.join(COORDINATES_FILE);
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write coordinates {}", path.display()))?;

        self.manifest.coordinates = Some(COORDINATES_FILE.to_string());
        self.manifest.info.grid = GridKind::Curvilinear;
        self.write_manifest()
    }
}
