use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::AxisOrder;
use crate::error::FieldError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridKind {
    /// Uniform spacing derived from `extents`.
    #[default]
    Cartesian,
    /// Explicit per-node coordinates.
    Curvilinear,
}

/// Global description of a multi-timestep structured-grid dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub timestep_count: usize,
    /// Nodes per axis, canonical `(i, j, k)` order.
    pub resolution: [usize; 3],
    /// Physical domain length per axis.
    #[serde(default = "unit_extents")]
    pub extents: [f64; 3],
    #[serde(default)]
    pub dt: f64,
    #[serde(default)]
    pub axis_order: AxisOrder,
    #[serde(default)]
    pub grid: GridKind,
    #[serde(default)]
    pub scalars: Vec<String>,
    /// Vector group name to its three component channels.
    #[serde(default)]
    pub vectors: BTreeMap<String, [String; 3]>,
    /// Free-form numeric attributes such as droplet diameter or gas temperature.
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

fn unit_extents() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

impl DatasetInfo {
    pub fn node_count(&self) -> usize {
        self.resolution.iter().product()
    }

    pub fn has_scalar(&self, channel: &str) -> bool {
        self.scalars.iter().any(|s| s == channel)
    }

    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }

    /// Distance between neighbouring nodes along each axis of a cartesian grid.
    pub fn spacing(&self) -> [f64; 3] {
        let mut out = [1.0; 3];
        for axis in 0..3 {
            let n = self.resolution[axis];
            out[axis] = if n > 1 {
                self.extents[axis] / (n - 1) as f64
            } else {
                self.extents[axis]
            };
        }
        out
    }

    /// Structural checks run once when a dataset is opened.
    pub fn validate(&self, source: &str) -> Result<(), FieldError> {
        if self.resolution.iter().any(|&n| n == 0) {
            return Err(FieldError::format(
                source,
                format!("resolution {:?} has an empty axis", self.resolution),
            ));
        }
        for (group, components) in &self.vectors {
            for c in components {
                if !self.has_scalar(c) {
                    return Err(FieldError::format(
                        source,
                        format!("vector group '{group}' references unknown channel '{c}'"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Storage behind a [`FieldAccessor`](super::FieldAccessor).
///
/// Channel data is returned in the backend's declared `axis_order`; the
/// accessor performs the transposition into canonical order.
pub trait DatasetBackend: Send + Sync {
    /// Human-readable origin for diagnostics (usually a path).
    fn source(&self) -> &str;

    fn info(&self) -> &DatasetInfo;

    fn read_scalar(&self, timestep: usize, channel: &str) -> Result<Vec<f32>, FieldError>;

    /// Per-node coordinates in storage order, if the dataset carries them.
    fn read_coordinates(&self) -> Result<Option<Vec<[f64; 3]>>, FieldError>;

    fn close(&mut self) {}
}

/// Backend holding every channel in memory.
pub struct MemoryDataset {
    info: DatasetInfo,
    channels: HashMap<(usize, String), Vec<f32>>,
    coordinates: Option<Vec<[f64; 3]>>,
}

impl MemoryDataset {
    pub fn new(info: DatasetInfo) -> Self {
        Self {
            info,
            channels: HashMap::new(),
            coordinates: None,
        }
    }

    /// Store a channel given in storage order. Registers the channel name in the catalogue.
    pub fn insert(&mut self, timestep: usize, channel: &str, data: Vec<f32>) {
        if !self.info.has_scalar(channel) {
            self.info.scalars.push(channel.to_string());
        }
        if timestep >= self.info.timestep_count {
            self.info.timestep_count = timestep + 1;
        }
        self.channels.insert((timestep, channel.to_string()), data);
    }

    pub fn with_scalar(mut self, timestep: usize, channel: &str, data: Vec<f32>) -> Self {
        self.insert(timestep, channel, data);
        self
    }

    pub fn with_vector_group(mut self, group: &str, components: [&str; 3]) -> Self {
        self.info
            .vectors
            .insert(group.to_string(), components.map(str::to_string));
        self
    }

    pub fn with_coordinates(mut self, coordinates: Vec<[f64; 3]>) -> Self {
        self.info.grid = GridKind::Curvilinear;
        self.coordinates = Some(coordinates);
        self
    }
}

impl DatasetBackend for MemoryDataset {
    fn source(&self) -> &str {
        "<memory>"
    }

    fn info(&self) -> &DatasetInfo {
        &self.info
    }

    fn read_scalar(&self, timestep: usize, channel: &str) -> Result<Vec<f32>, FieldError> {
        self.channels
            .get(&(timestep, channel.to_string()))
            .cloned()
            .ok_or_else(|| {
                FieldError::format(
                    self.source(),
                    format!("channel '{channel}' missing at timestep {timestep}"),
                )
            })
    }

    fn read_coordinates(&self) -> Result<Option<Vec<[f64; 3]>>, FieldError> {
        Ok(self.coordinates.clone())
    }

    fn close(&mut self) {
        self.channels.clear();
        self.coordinates = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DatasetInfo {
        DatasetInfo {
            timestep_count: 1,
            resolution: [3, 2, 2],
            extents: [2.0, 1.0, 4.0],
            dt: 0.1,
            axis_order: AxisOrder::Kji,
            grid: GridKind::Cartesian,
            scalars: vec!["VOF".into()],
            vectors: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn spacing_divides_extent_by_cell_count() {
        assert_eq!(info().spacing(), [1.0, 1.0, 4.0]);
    }

    #[test]
    fn validate_rejects_unknown_vector_component() {
        let mut i = info();
        i.vectors
            .insert("velocity".into(), ["U".into(), "V".into(), "W".into()]);
        let err = i.validate("test").unwrap_err();
        assert!(matches!(err, FieldError::DatasetFormat { .. }));
    }

    #[test]
    fn manifest_defaults_fill_missing_fields() {
        let json = r#"{ "timestep_count": 2, "resolution": [4, 4, 4], "scalars": ["YV"] }"#;
        let parsed: DatasetInfo = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.extents, [1.0, 1.0, 1.0]);
        assert_eq!(parsed.axis_order, AxisOrder::Kji);
        assert_eq!(parsed.grid, GridKind::Cartesian);
        assert!(parsed.vectors.is_empty());
    }

    #[test]
    fn memory_dataset_reports_missing_channel() {
        let ds = MemoryDataset::new(info()).with_scalar(0, "VOF", vec![0.0; 12]);
        assert_eq!(ds.read_scalar(0, "VOF").unwrap().len(), 12);
        assert!(ds.read_scalar(0, "YV").is_err());
    }
}
