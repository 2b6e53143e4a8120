//! Structured-grid field storage and dataset access.
//!
//! All in-memory fields use the canonical index order `(i, j, k)` with axis 0
//! varying fastest: `index = i + nx * (j + ny * k)`. This is also the
//! column-major layout expected by the voxel writer, so volumes can be
//! written without reordering.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

pub mod accessor;
pub mod backend;
pub mod raw;

pub use accessor::FieldAccessor;
pub use backend::{DatasetBackend, DatasetInfo, GridKind, MemoryDataset};
pub use raw::{RawDatasetWriter, RawDirectoryDataset};

/// Spatial axis of the canonical `(i, j, k)` ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Axis::X),
            1 => Some(Axis::Y),
            2 => Some(Axis::Z),
            _ => None,
        }
    }
}

/// Axis order of channel data as stored by a dataset backend, slowest axis first.
///
/// `Kji` means the stored array is `[k][j][i]` (i varies fastest), which is
/// byte-identical to the canonical layout. `Ijk` stores `[i][j][k]` and must be
/// transposed on read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisOrder {
    #[default]
    Kji,
    Ijk,
}

impl AxisOrder {
    /// Reorder stored values into the canonical layout.
    pub fn to_canonical<T: Copy>(self, stored: Vec<T>, shape: [usize; 3]) -> Vec<T> {
        match self {
            AxisOrder::Kji => stored,
            AxisOrder::Ijk => {
                let [ni, nj, nk] = shape;
                let mut out = Vec::with_capacity(stored.len());
                for k in 0..nk {
                    for j in 0..nj {
                        for i in 0..ni {
                            out.push(stored[(i * nj + j) * nk + k]);
                        }
                    }
                }
                out
            }
        }
    }

    /// Reorder canonical values into this storage order.
    pub fn from_canonical<T: Copy>(self, canonical: &[T], shape: [usize; 3]) -> Vec<T> {
        match self {
            AxisOrder::Kji => canonical.to_vec(),
            AxisOrder::Ijk => {
                let [ni, nj, nk] = shape;
                let mut out = Vec::with_capacity(canonical.len());
                for i in 0..ni {
                    for j in 0..nj {
                        for k in 0..nk {
                            out.push(canonical[i + ni * (j + nj * k)]);
                        }
                    }
                }
                out
            }
        }
    }
}

/// A 3D scalar field on the implicit unit-spaced index grid.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField3 {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl ScalarField3 {
    pub fn new(shape: [usize; 3], data: Vec<f32>) -> Result<Self, FieldError> {
        let expected = shape[0] * shape[1] * shape[2];
        if data.len() != expected {
            return Err(FieldError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape[0] * shape[1] * shape[2]],
        }
    }

    pub fn from_fn<F>(shape: [usize; 3], mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize) -> f32,
    {
        let mut data = Vec::with_capacity(shape[0] * shape[1] * shape[2]);
        for k in 0..shape[2] {
            for j in 0..shape[1] {
                for i in 0..shape[0] {
                    data.push(f(i, j, k));
                }
            }
        }
        Self { shape, data }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.shape[0] * (j + self.shape[1] * k)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> f32 {
        self.data[self.index(i, j, k)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f32) {
        let idx = self.index(i, j, k);
        self.data[idx] = value;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Minimum and maximum value, ignoring NaN. `None` for an empty field.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn map<F>(&self, f: F) -> ScalarField3
    where
        F: Fn(f32) -> f32,
    {
        ScalarField3 {
            shape: self.shape,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Trilinear interpolation at a continuous index-space position.
    ///
    /// Positions outside the grid are clamped onto its boundary.
    pub fn sample_trilinear(&self, p: [f64; 3]) -> f64 {
        let mut base = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            let n = self.shape[axis];
            if n < 2 {
                continue;
            }
            let max = (n - 1) as f64;
            let x = if p[axis].is_nan() { 0.0 } else { p[axis].clamp(0.0, max) };
            let cell = (x.floor() as usize).min(n - 2);
            base[axis] = cell;
            frac[axis] = x - cell as f64;
        }

        let step = |axis: usize| usize::from(self.shape[axis] >= 2);
        let (i0, j0, k0) = (base[0], base[1], base[2]);
        let (i1, j1, k1) = (i0 + step(0), j0 + step(1), k0 + step(2));
        let (fx, fy, fz) = (frac[0], frac[1], frac[2]);

        let v = |i, j, k| self.get(i, j, k) as f64;
        let c00 = v(i0, j0, k0) * (1.0 - fx) + v(i1, j0, k0) * fx;
        let c10 = v(i0, j1, k0) * (1.0 - fx) + v(i1, j1, k0) * fx;
        let c01 = v(i0, j0, k1) * (1.0 - fx) + v(i1, j0, k1) * fx;
        let c11 = v(i0, j1, k1) * (1.0 - fx) + v(i1, j1, k1) * fx;
        let c0 = c00 * (1.0 - fy) + c10 * fy;
        let c1 = c01 * (1.0 - fy) + c11 * fy;
        c0 * (1.0 - fz) + c1 * fz
    }

    /// Extract the plane perpendicular to `axis` at index `level`.
    pub fn slice(&self, axis: Axis, level: usize) -> Result<Slice2, FieldError> {
        let a = axis.index();
        if level >= self.shape[a] {
            return Err(FieldError::SliceOutOfRange {
                axis: a,
                level,
                size: self.shape[a],
            });
        }
        let [nx, ny, nz] = self.shape;
        let (shape, data) = match axis {
            Axis::X => {
                let mut data = Vec::with_capacity(ny * nz);
                for k in 0..nz {
                    for j in 0..ny {
                        data.push(self.get(level, j, k));
                    }
                }
                ([ny, nz], data)
            }
            Axis::Y => {
                let mut data = Vec::with_capacity(nx * nz);
                for k in 0..nz {
                    for i in 0..nx {
                        data.push(self.get(i, level, k));
                    }
                }
                ([nx, nz], data)
            }
            Axis::Z => {
                let mut data = Vec::with_capacity(nx * ny);
                for j in 0..ny {
                    for i in 0..nx {
                        data.push(self.get(i, j, level));
                    }
                }
                ([nx, ny], data)
            }
        };
        Ok(Slice2 { shape, data })
    }
}

/// Three stacked scalar channels sharing one grid.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorField3 {
    components: [ScalarField3; 3],
}

impl VectorField3 {
    pub fn new(x: ScalarField3, y: ScalarField3, z: ScalarField3) -> Result<Self, FieldError> {
        if x.shape() != y.shape() || x.shape() != z.shape() {
            return Err(FieldError::ShapeMismatch {
                expected: x.len(),
                actual: if y.shape() != x.shape() { y.len() } else { z.len() },
            });
        }
        Ok(Self { components: [x, y, z] })
    }

    /// A field with the same vector at every node.
    pub fn constant(shape: [usize; 3], value: DVec3) -> Self {
        let c = |v: f64| ScalarField3::from_fn(shape, |_, _, _| v as f32);
        Self {
            components: [c(value.x), c(value.y), c(value.z)],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.components[0].shape()
    }

    pub fn component(&self, axis: Axis) -> &ScalarField3 {
        &self.components[axis.index()]
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> DVec3 {
        DVec3::new(
            self.components[0].get(i, j, k) as f64,
            self.components[1].get(i, j, k) as f64,
            self.components[2].get(i, j, k) as f64,
        )
    }

    pub fn get_flat(&self, index: usize) -> DVec3 {
        DVec3::new(
            self.components[0].as_slice()[index] as f64,
            self.components[1].as_slice()[index] as f64,
            self.components[2].as_slice()[index] as f64,
        )
    }

    pub fn sample_trilinear(&self, p: [f64; 3]) -> DVec3 {
        DVec3::new(
            self.components[0].sample_trilinear(p),
            self.components[1].sample_trilinear(p),
            self.components[2].sample_trilinear(p),
        )
    }

    /// Euclidean norm at every node.
    pub fn magnitude(&self) -> ScalarField3 {
        let [x, y, z] = &self.components;
        let data = x
            .as_slice()
            .iter()
            .zip(y.as_slice())
            .zip(z.as_slice())
            .map(|((&a, &b), &c)| (a * a + b * b + c * c).sqrt())
            .collect();
        ScalarField3 {
            shape: x.shape(),
            data,
        }
    }
}

/// A 2D plane cut from a 3D field.
///
/// The two remaining axes keep canonical order; the lower-numbered one varies
/// fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct Slice2 {
    pub shape: [usize; 2],
    pub data: Vec<f32>,
}

impl Slice2 {
    pub fn get(&self, a: usize, b: usize) -> f32 {
        self.data[a + self.shape[0] * b]
    }
}
