use std::path::Path;

use super::backend::{DatasetBackend, DatasetInfo, GridKind};
use super::raw::RawDirectoryDataset;
use super::{Axis, ScalarField3, Slice2, VectorField3};
use crate::error::FieldError;

/// Owns an open dataset and serves canonical-order fields from it.
///
/// The backend is released by [`close`](FieldAccessor::close) or on drop;
/// every call after `close` fails with [`FieldError::Closed`].
pub struct FieldAccessor {
    backend: Option<Box<dyn DatasetBackend>>,
}

impl FieldAccessor {
    pub fn new(backend: impl DatasetBackend + 'static) -> Result<Self, FieldError> {
        backend.info().validate(backend.source())?;
        Ok(Self {
            backend: Some(Box::new(backend)),
        })
    }

    /// Open a raw directory dataset (see [`RawDirectoryDataset`]).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FieldError> {
        Self::new(RawDirectoryDataset::open(path)?)
    }

    fn backend(&self) -> Result<&dyn DatasetBackend, FieldError> {
        self.backend.as_deref().ok_or(FieldError::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn info(&self) -> Result<&DatasetInfo, FieldError> {
        Ok(self.backend()?.info())
    }

    pub fn timestep_count(&self) -> Result<usize, FieldError> {
        Ok(self.info()?.timestep_count)
    }

    pub fn resolution(&self) -> Result<[usize; 3], FieldError> {
        Ok(self.info()?.resolution)
    }

    pub fn field_at(&self, timestep: usize, channel: &str) -> Result<ScalarField3, FieldError> {
        let backend = self.backend()?;
        let info = backend.info();
        if timestep >= info.timestep_count {
            return Err(FieldError::TimestepOutOfRange {
                timestep,
                count: info.timestep_count,
            });
        }
        if !info.has_scalar(channel) {
            return Err(FieldError::format(
                backend.source(),
                format!("no channel named '{channel}'"),
            ));
        }
        let stored = backend.read_scalar(timestep, channel)?;
        let expected = info.node_count();
        if stored.len() != expected {
            return Err(FieldError::format(
                backend.source(),
                format!(
                    "channel '{channel}' at timestep {timestep} has {} values, grid has {expected} nodes",
                    stored.len()
                ),
            ));
        }
        let data = info.axis_order.to_canonical(stored, info.resolution);
        ScalarField3::new(info.resolution, data)
    }

    pub fn vector_at(&self, timestep: usize, group: &str) -> Result<VectorField3, FieldError> {
        let backend = self.backend()?;
        let Some([x, y, z]) = backend.info().vectors.get(group).cloned() else {
            return Err(FieldError::format(
                backend.source(),
                format!("no vector group named '{group}'"),
            ));
        };
        VectorField3::new(
            self.field_at(timestep, &x)?,
            self.field_at(timestep, &y)?,
            self.field_at(timestep, &z)?,
        )
    }

    pub fn slice_at(
        &self,
        timestep: usize,
        channel: &str,
        axis: Axis,
        level: usize,
    ) -> Result<Slice2, FieldError> {
        let resolution = self.resolution()?;
        let size = resolution[axis.index()];
        if level >= size {
            return Err(FieldError::SliceOutOfRange {
                axis: axis.index(),
                level,
                size,
            });
        }
        self.field_at(timestep, channel)?.slice(axis, level)
    }

    /// Cartesian position of every node in canonical order.
    pub fn point_coordinates(&self) -> Result<Vec<[f64; 3]>, FieldError> {
        let backend = self.backend()?;
        let info = backend.info();
        match backend.read_coordinates()? {
            Some(stored) => {
                if stored.len() != info.node_count() {
                    return Err(FieldError::format(
                        backend.source(),
                        format!(
                            "{} coordinates for {} grid nodes",
                            stored.len(),
                            info.node_count()
                        ),
                    ));
                }
                Ok(info.axis_order.to_canonical(stored, info.resolution))
            }
            None if info.grid == GridKind::Cartesian => {
                let [nx, ny, nz] = info.resolution;
                let [dx, dy, dz] = info.spacing();
                let mut out = Vec::with_capacity(info.node_count());
                for k in 0..nz {
                    for j in 0..ny {
                        for i in 0..nx {
                            out.push([i as f64 * dx, j as f64 * dy, k as f64 * dz]);
                        }
                    }
                }
                Ok(out)
            }
            None => Err(FieldError::format(
                backend.source(),
                "curvilinear grid has no coordinates",
            )),
        }
    }

    /// Node coordinates on k-layers `1..layers`, the band just off the body wall.
    pub fn near_surface_points(&self, layers: usize) -> Result<Vec<[f64; 3]>, FieldError> {
        let [nx, ny, nz] = self.resolution()?;
        let coords = self.point_coordinates()?;
        let upper = layers.min(nz);
        let mut out = Vec::new();
        for k in 1..upper {
            let start = nx * ny * k;
            out.extend_from_slice(&coords[start..start + nx * ny]);
        }
        Ok(out)
    }

    pub fn close(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            log::debug!("Closing dataset {}", backend.source());
            backend.close();
        }
    }
}

impl Drop for FieldAccessor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::field::{AxisOrder, MemoryDataset};

    fn info(order: AxisOrder) -> DatasetInfo {
        DatasetInfo {
            timestep_count: 2,
            resolution: [2, 3, 4],
            extents: [1.0, 2.0, 3.0],
            dt: 1.0,
            axis_order: order,
            grid: GridKind::Cartesian,
            scalars: vec![],
            vectors: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    fn ramp() -> ScalarField3 {
        ScalarField3::from_fn([2, 3, 4], |i, j, k| (i + 10 * j + 100 * k) as f32)
    }

    fn accessor(order: AxisOrder) -> FieldAccessor {
        let f = ramp();
        let stored = order.from_canonical(f.as_slice(), f.shape());
        let ds = MemoryDataset::new(info(order))
            .with_scalar(0, "U", stored.clone())
            .with_scalar(0, "V", stored.clone())
            .with_scalar(0, "W", stored.clone())
            .with_scalar(1, "U", stored)
            .with_vector_group("velocity", ["U", "V", "W"]);
        FieldAccessor::new(ds).unwrap()
    }

    #[test]
    fn field_at_returns_canonical_order_for_both_storage_orders() {
        for order in [AxisOrder::Kji, AxisOrder::Ijk] {
            let acc = accessor(order);
            let f = acc.field_at(0, "U").unwrap();
            assert_eq!(f.shape(), [2, 3, 4]);
            assert_eq!(f.get(1, 2, 3), 321.0);
        }
    }

    #[test]
    fn timestep_out_of_range() {
        let acc = accessor(AxisOrder::Kji);
        assert!(matches!(
            acc.field_at(2, "U"),
            Err(FieldError::TimestepOutOfRange { timestep: 2, count: 2 })
        ));
    }

    #[test]
    fn unknown_channel_and_group_are_format_errors() {
        let acc = accessor(AxisOrder::Kji);
        assert!(matches!(acc.field_at(0, "P"), Err(FieldError::DatasetFormat { .. })));
        assert!(matches!(
            acc.vector_at(0, "vorticity"),
            Err(FieldError::DatasetFormat { .. })
        ));
    }

    #[test]
    fn vector_at_stacks_components() {
        let acc = accessor(AxisOrder::Ijk);
        let v = acc.vector_at(0, "velocity").unwrap();
        assert_eq!(v.get(1, 1, 1).x, 111.0);
    }

    #[test]
    fn slice_at_checks_level() {
        let acc = accessor(AxisOrder::Kji);
        let s = acc.slice_at(0, "U", Axis::Z, 2).unwrap();
        assert_eq!(s.shape, [2, 3]);
        assert_eq!(s.get(1, 2), 221.0);
        assert!(matches!(
            acc.slice_at(0, "U", Axis::X, 2),
            Err(FieldError::SliceOutOfRange { .. })
        ));
    }

    #[test]
    fn cartesian_coordinates_span_extents() {
        let acc = accessor(AxisOrder::Kji);
        let pts = acc.point_coordinates().unwrap();
        assert_eq!(pts.len(), 24);
        assert_eq!(pts[0], [0.0, 0.0, 0.0]);
        assert_eq!(pts[23], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn near_surface_points_skip_the_wall_layer() {
        let acc = accessor(AxisOrder::Kji);
        let pts = acc.near_surface_points(3).unwrap();
        assert_eq!(pts.len(), 2 * 3 * 2);
        assert!(pts.iter().all(|p| p[2] > 0.0 && p[2] < 3.0));
    }

    #[test]
    fn closed_accessor_rejects_calls() {
        let mut acc = accessor(AxisOrder::Kji);
        acc.close();
        assert!(!acc.is_open());
        assert!(matches!(acc.field_at(0, "U"), Err(FieldError::Closed)));
        assert!(matches!(acc.point_coordinates(), Err(FieldError::Closed)));
    }

    #[test]
    fn curvilinear_coordinates_are_transposed() {
        let coords: Vec<[f64; 3]> = (0..24).map(|n| [n as f64, 0.0, 0.0]).collect();
        let mut i = info(AxisOrder::Ijk);
        i.grid = GridKind::Curvilinear;
        let ds = MemoryDataset::new(i).with_coordinates(coords.clone());
        let acc = FieldAccessor::new(ds).unwrap();
        let canonical = acc.point_coordinates().unwrap();
        assert_eq!(canonical, AxisOrder::Ijk.to_canonical(coords, [2, 3, 4]));
    }
}
