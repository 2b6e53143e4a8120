//! Where per-timestep outputs live and how to tell whether they are done.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Outputs at or below this size are treated as missing.
pub const MIN_VALID_BYTES: u64 = 10;

/// What a stage did for one timestep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Written,
    /// A previous run already left a usable file; nothing was recomputed.
    AlreadyValid,
}

/// True when `path` exists and is larger than [`MIN_VALID_BYTES`].
pub fn is_valid_output(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > MIN_VALID_BYTES)
        .unwrap_or(false)
}

/// Create `dir` and its parents if needed. Returns whether it already existed.
pub fn ensure_dir(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        return Ok(true);
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    Ok(false)
}

/// A directory of numbered frames sharing one extension, `frame_<t>.<ext>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    dir: PathBuf,
    ext: String,
}

impl OutputLayout {
    pub fn new(dir: impl Into<PathBuf>, ext: &str) -> Self {
        Self {
            dir: dir.into(),
            ext: ext.trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, timestep: usize) -> PathBuf {
        Self::frame_path(&self.dir, timestep, &self.ext)
    }

    pub fn first_missing(&self) -> usize {
        first_missing_frame(&self.dir, &self.ext)
    }

    pub fn frame_path(dir: &Path, timestep: usize, ext: &str) -> PathBuf {
        dir.join(format!("frame_{timestep}.{}", ext.trim_start_matches('.')))
    }
}

/// First timestep whose frame file does not exist, counting up from 0.
pub fn first_missing_frame(dir: &Path, ext: &str) -> usize {
    let mut t = 0;
    while OutputLayout::frame_path(dir, t, ext).exists() {
        t += 1;
    }
    t
}

/// Hands out numbered run directories `base/0`, `base/1`, ... so repeated
/// renders never overwrite each other.
#[derive(Clone, Debug)]
pub struct RunCounter {
    base: PathBuf,
    next: usize,
}

impl RunCounter {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            next: 0,
        }
    }

    /// Create and return the first numbered directory that does not exist yet.
    pub fn next_run_dir(&mut self) -> Result<PathBuf> {
        loop {
            let candidate = self.base.join(self.next.to_string());
            self.next += 1;
            if !candidate.exists() {
                ensure_dir(&candidate)?;
                log::info!("Using run directory {}", candidate.display());
                return Ok(candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_paths_use_frame_prefix() {
        let p = OutputLayout::frame_path(Path::new("/out/ply"), 12, ".ply");
        assert_eq!(p, PathBuf::from("/out/ply/frame_12.ply"));
        let layout = OutputLayout::new("/out/bvox", "bvox");
        assert_eq!(layout.path(0), PathBuf::from("/out/bvox/frame_0.bvox"));
    }

    #[test]
    fn tiny_or_missing_files_are_not_valid() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("frame_0.ply");
        fs::write(&small, b"ply\n").unwrap();
        assert!(!is_valid_output(&small));
        assert!(!is_valid_output(&dir.path().join("frame_1.ply")));

        let ok = dir.path().join("frame_2.ply");
        fs::write(&ok, b"ply\nformat ascii 1.0\n").unwrap();
        assert!(is_valid_output(&ok));
        assert!(!is_valid_output(dir.path()));
    }

    #[test]
    fn first_missing_frame_stops_at_gap() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path(), "png");
        assert_eq!(layout.first_missing(), 0);
        for t in [0, 1, 2, 4] {
            fs::write(layout.path(t), b"x").unwrap();
        }
        assert_eq!(layout.first_missing(), 3);
    }

    #[test]
    fn run_counter_skips_existing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("0")).unwrap();
        fs::create_dir(dir.path().join("2")).unwrap();
        let mut runs = RunCounter::new(dir.path());
        assert_eq!(runs.next_run_dir().unwrap(), dir.path().join("1"));
        assert_eq!(runs.next_run_dir().unwrap(), dir.path().join("3"));
        assert!(dir.path().join("3").is_dir());
    }

    #[test]
    fn ensure_dir_reports_prior_existence() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        assert!(!ensure_dir(&nested).unwrap());
        assert!(ensure_dir(&nested).unwrap());
    }
}
