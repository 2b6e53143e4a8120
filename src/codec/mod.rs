//! On-disk formats: ASCII PLY meshes and `.bvox` voxel volumes.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

pub mod ply;
pub mod voxel;

pub use ply::{mesh_to_ply_string, parse_ply, read_mesh, write_mesh};
pub use voxel::{parse_voxels, read_voxels, voxels_to_bytes, write_voxels, VoxelVolume};

/// Write to a uniquely named temp file beside `path` and rename it into
/// place, so `path` is either absent, the old contents, or complete.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            parent
        }
        None => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move temp file into place at {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn replaces_existing_file_and_leaves_no_temp_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame_0.ply");
        fs::write(&path, b"stale partial contents").unwrap();
        write_atomic(&path, b"fresh").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"fresh");
        assert_eq!(entries(dir.path()), vec!["frame_0.ply".to_string()]);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("vapor_max.txt");
        write_atomic(&path, b"1.0\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1.0\n");
    }

    #[test]
    fn concurrent_writers_of_one_path_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("T_percentiles.txt");
        std::thread::scope(|s| {
            for n in 0..8u8 {
                let path = &path;
                s.spawn(move || write_atomic(path, &[n; 64]).unwrap());
            }
        });
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 64);
        assert!(bytes.iter().all(|&b| b == bytes[0]));
        assert_eq!(entries(dir.path()), vec!["T_percentiles.txt".to_string()]);
    }
}
