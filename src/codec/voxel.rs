//! `.bvox` volumes: a little-endian i32 header `(xres, yres, zres, channels)`
//! followed by `xres * yres * zres` little-endian f32 values, x fastest.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use super::write_atomic;
use crate::field::ScalarField3;

const HEADER_LEN: usize = 16;

#[derive(Clone, Debug, PartialEq)]
pub struct VoxelVolume {
    pub resolution: [usize; 3],
    pub data: Vec<f32>,
}

impl VoxelVolume {
    pub fn get(&self, i: usize, j: usize, k: usize) -> f32 {
        let [nx, ny, _] = self.resolution;
        self.data[i + nx * (j + ny * k)]
    }
}

impl From<ScalarField3> for VoxelVolume {
    fn from(field: ScalarField3) -> Self {
        Self {
            resolution: field.shape(),
            data: field.into_vec(),
        }
    }
}

impl From<&ScalarField3> for VoxelVolume {
    fn from(field: &ScalarField3) -> Self {
        Self {
            resolution: field.shape(),
            data: field.as_slice().to_vec(),
        }
    }
}

pub fn voxels_to_bytes(field: &ScalarField3) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + field.len() * 4);
    for n in field.shape() {
        out.extend_from_slice(&(n as i32).to_le_bytes());
    }
    out.extend_from_slice(&1i32.to_le_bytes());
    for v in field.as_slice() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn write_voxels(path: &Path, field: &ScalarField3) -> Result<()> {
    write_atomic(path, &voxels_to_bytes(field))
        .with_context(|| format!("Failed to write voxel file: {}", path.display()))
}

pub fn parse_voxels(bytes: &[u8]) -> Result<VoxelVolume> {
    if bytes.len() < HEADER_LEN {
        bail!("voxel file shorter than its {HEADER_LEN}-byte header");
    }
    let header: Vec<i32> = bytes[..HEADER_LEN]
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if header[..3].iter().any(|&n| n < 0) {
        bail!("negative resolution in header {:?}", &header[..3]);
    }
    if header[3] != 1 {
        bail!("expected 1 channel, header says {}", header[3]);
    }
    let resolution = [header[0] as usize, header[1] as usize, header[2] as usize];
    let Some(needed) = resolution
        .iter()
        .try_fold(4usize, |acc, &n| acc.checked_mul(n))
    else {
        bail!("resolution {:?} overflows the addressable size", resolution);
    };
    let body = &bytes[HEADER_LEN..];
    if body.len() != needed {
        bail!(
            "resolution {:?} needs {} data bytes, file has {}",
            resolution,
            needed,
            body.len()
        );
    }
    let data = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(VoxelVolume { resolution, data })
}

pub fn read_voxels(path: &Path) -> Result<VoxelVolume> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read voxel file: {}", path.display()))?;
    parse_voxels(&bytes).with_context(|| format!("Malformed voxel file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_column_major_order() {
        let field = ScalarField3::from_fn([3, 2, 2], |i, j, k| (i + 10 * j + 100 * k) as f32);
        let bytes = voxels_to_bytes(&field);
        assert_eq!(bytes.len(), 16 + 12 * 4);
        assert_eq!(&bytes[..16], &[3, 0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0]);
        // Second value is x = 1, third is x = 2, fourth wraps to y = 1.
        let at = |n: usize| f32::from_le_bytes(bytes[16 + 4 * n..20 + 4 * n].try_into().unwrap());
        assert_eq!(at(1), 1.0);
        assert_eq!(at(3), 10.0);
        assert_eq!(at(6), 100.0);
    }

    #[test]
    fn file_round_trip_preserves_dimensions_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame_3.bvox");
        let field = ScalarField3::from_fn([4, 3, 5], |i, j, k| (i * j) as f32 - k as f32 * 0.5);
        write_voxels(&path, &field).unwrap();
        let back = read_voxels(&path).unwrap();
        assert_eq!(back.resolution, [4, 3, 5]);
        assert_eq!(back.get(3, 2, 4), field.get(3, 2, 4));
        assert_eq!(back, VoxelVolume::from(field));
    }

    #[test]
    fn truncated_or_multichannel_files_are_rejected() {
        let field = ScalarField3::zeros([2, 2, 2]);
        let mut bytes = voxels_to_bytes(&field);
        bytes.pop();
        assert!(parse_voxels(&bytes).is_err());

        let mut bytes = voxels_to_bytes(&field);
        bytes[12] = 3;
        assert!(parse_voxels(&bytes).is_err());
        assert!(parse_voxels(&[0u8; 8]).is_err());
    }

    #[test]
    fn oversized_header_is_an_error_not_a_panic() {
        let mut bytes = Vec::new();
        for n in [i32::MAX, i32::MAX, i32::MAX, 1] {
            bytes.extend_from_slice(&n.to_le_bytes());
        }
        bytes.extend_from_slice(&[0u8; 16]);
        let err = parse_voxels(&bytes).unwrap_err();
        assert!(err.to_string().contains("overflows"), "{err}");
    }
}
