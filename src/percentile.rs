//! Percentile tables over whole datasets, used to pick colour-ramp bounds
//! that stay fixed across an animation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::codec::write_atomic;
use crate::error::EmptyPopulationError;
use crate::field::FieldAccessor;

/// Number of rows in a table: percentiles 0.0, 0.1, ... 99.9.
pub const BUCKETS: usize = 1000;

/// Percentile to value mapping. Percentiles strictly increase, values never decrease.
#[derive(Clone, Debug, PartialEq)]
pub struct PercentileTable {
    percentiles: Vec<f64>,
    values: Vec<f64>,
}

/// Keeps a value only where `channel > 0` and the value itself exceeds `threshold`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterfaceMask {
    pub channel: String,
    pub threshold: f64,
}

impl InterfaceMask {
    pub fn new(channel: impl Into<String>, threshold: f64) -> Self {
        Self {
            channel: channel.into(),
            threshold,
        }
    }
}

/// Linear interpolation between closest ranks of a sorted slice.
fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

impl PercentileTable {
    /// Exact percentiles of every non-NaN value for which `exclude` is false.
    pub fn estimate<F>(values: &[f64], exclude: F) -> Result<Self, EmptyPopulationError>
    where
        F: Fn(f64) -> bool,
    {
        let mut population: Vec<f64> = values
            .iter()
            .copied()
            .filter(|v| !v.is_nan() && !exclude(*v))
            .collect();
        if population.is_empty() {
            return Err(EmptyPopulationError);
        }
        population.sort_unstable_by(f64::total_cmp);

        let percentiles: Vec<f64> = (0..BUCKETS).map(|i| i as f64 / 10.0).collect();
        let values = percentiles
            .iter()
            .map(|&p| percentile_of_sorted(&population, p))
            .collect();
        log::debug!("percentile table from {} samples", population.len());
        Ok(Self {
            percentiles,
            values,
        })
    }

    pub fn from_columns(percentiles: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        anyhow::ensure!(!percentiles.is_empty(), "percentile table is empty");
        anyhow::ensure!(
            percentiles.len() == values.len(),
            "{} percentiles but {} values",
            percentiles.len(),
            values.len()
        );
        anyhow::ensure!(
            percentiles.windows(2).all(|w| w[0] < w[1]),
            "percentile column is not strictly increasing"
        );
        anyhow::ensure!(
            values.windows(2).all(|w| w[0] <= w[1]),
            "value column decreases"
        );
        Ok(Self {
            percentiles,
            values,
        })
    }

    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value at percentile `p`, interpolated between rows. `p` outside the
    /// table is clamped to the first or last row.
    pub fn value_for_percentile(&self, p: f64) -> f64 {
        let ps = &self.percentiles;
        let last = ps.len() - 1;
        if p.is_nan() || p <= ps[0] {
            return self.values[0];
        }
        if p >= ps[last] {
            return self.values[last];
        }
        let hi = ps.partition_point(|&x| x <= p);
        let lo = hi - 1;
        let f = (p - ps[lo]) / (ps[hi] - ps[lo]);
        self.values[lo] + (self.values[hi] - self.values[lo]) * f
    }

    /// `(lower, upper)` colour bounds at two percentiles.
    pub fn bounds(&self, p_lo: f64, p_hi: f64) -> (f64, f64) {
        (self.value_for_percentile(p_lo), self.value_for_percentile(p_hi))
    }

    /// Two whitespace-separated columns, one row per bucket.
    pub fn to_text(&self) -> String {
        self.percentiles
            .iter()
            .zip(&self.values)
            .map(|(p, v)| format!("{:.18e} {:.18e}\n", p, v))
            .collect()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut percentiles = Vec::new();
        let mut values = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<&str> = line.split_whitespace().collect();
            anyhow::ensure!(cols.len() == 2, "line {}: expected 2 columns", n + 1);
            percentiles.push(
                cols[0]
                    .parse::<f64>()
                    .with_context(|| format!("line {}: bad percentile", n + 1))?,
            );
            values.push(
                cols[1]
                    .parse::<f64>()
                    .with_context(|| format!("line {}: bad value", n + 1))?,
            );
        }
        Self::from_columns(percentiles, values)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_text().as_bytes())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read percentile table {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("Failed to parse percentile table {}", path.display()))
    }
}

/// Percentile tables cached as text files under one directory, one per key.
#[derive(Clone, Debug)]
pub struct PercentileCache {
    dir: PathBuf,
}

impl PercentileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}_percentiles.txt"))
    }

    /// Load the table for `key`, computing and storing it on a miss.
    ///
    /// Concurrent misses may compute twice; the last rename wins.
    pub fn load_or_compute<F>(&self, key: &str, compute: F) -> Result<PercentileTable>
    where
        F: FnOnce() -> Result<PercentileTable>,
    {
        let path = self.path_for(key);
        if path.exists() {
            log::info!("Percentile cache hit: {}", path.display());
            return PercentileTable::load(&path);
        }
        log::info!("Percentile cache miss, computing {}", path.display());
        let table = compute()?;
        table.save(&path)?;
        Ok(table)
    }
}

/// A single cached scalar, such as a channel's global maximum.
#[derive(Clone, Debug)]
pub struct MaxValueCache {
    path: PathBuf,
}

impl MaxValueCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load_or_compute<F>(&self, compute: F) -> Result<f64>
    where
        F: FnOnce() -> Result<f64>,
    {
        if self.path.exists() {
            let text = fs::read_to_string(&self.path)
                .with_context(|| format!("Failed to read {}", self.path.display()))?;
            let value = text
                .trim()
                .parse::<f64>()
                .with_context(|| format!("Failed to parse cached value in {}", self.path.display()))?;
            log::debug!("Cached maximum {} from {}", value, self.path.display());
            return Ok(value);
        }
        let value = compute()?;
        write_atomic(&self.path, format!("{value:.18e}\n").as_bytes())?;
        Ok(value)
    }
}

/// Percentile table of `channel` over every timestep, optionally restricted
/// to an interface mask.
pub fn estimate_over_timesteps(
    accessor: &FieldAccessor,
    channel: &str,
    mask: Option<&InterfaceMask>,
) -> Result<PercentileTable> {
    let timesteps = accessor.timestep_count()?;
    let mut population = Vec::new();
    for t in 0..timesteps {
        log::debug!("percentiles: reading {channel} at timestep {t}");
        let field = accessor
            .field_at(t, channel)
            .with_context(|| format!("Failed to read {channel} at timestep {t}"))?;
        match mask {
            None => population.extend(field.as_slice().iter().map(|&v| v as f64)),
            Some(mask) => {
                let m = accessor
                    .field_at(t, &mask.channel)
                    .with_context(|| format!("Failed to read mask {} at timestep {t}", mask.channel))?;
                population.extend(
                    field
                        .as_slice()
                        .iter()
                        .zip(m.as_slice())
                        .filter(|&(_, &m)| m > 0.0)
                        .map(|(&v, _)| v as f64)
                        .filter(|&v| v > mask.threshold),
                );
            }
        }
    }
    Ok(PercentileTable::estimate(&population, |_| false)?)
}

/// Vector magnitudes of `group` at every `stride`-th node of every timestep.
pub fn magnitude_population(
    accessor: &FieldAccessor,
    group: &str,
    stride: usize,
) -> Result<Vec<f64>> {
    let stride = stride.max(1);
    let mut out = Vec::new();
    for t in 0..accessor.timestep_count()? {
        let v = accessor
            .vector_at(t, group)
            .with_context(|| format!("Failed to read {group} at timestep {t}"))?;
        let n = v.shape().iter().product::<usize>();
        out.extend((0..n).step_by(stride).map(|i| v.get_flat(i).length()));
    }
    Ok(out)
}

/// Largest value of `channel` over every timestep.
pub fn max_over_timesteps(accessor: &FieldAccessor, channel: &str) -> Result<f64> {
    let mut max = f64::NEG_INFINITY;
    for t in 0..accessor.timestep_count()? {
        let field = accessor.field_at(t, channel)?;
        if let Some((_, hi)) = field.min_max() {
            max = max.max(hi as f64);
        }
    }
    anyhow::ensure!(max.is_finite(), "channel {channel} has no finite values");
    Ok(max)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::field::{AxisOrder, DatasetInfo, GridKind, MemoryDataset};

    fn uniform(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn table_has_expected_rows_and_is_monotonic() {
        let table = PercentileTable::estimate(&uniform(1001), |_| false).unwrap();
        assert_eq!(table.percentiles().len(), BUCKETS);
        assert_eq!(table.percentiles()[0], 0.0);
        assert!((table.percentiles()[BUCKETS - 1] - 99.9).abs() < 1e-12);
        assert!(table.percentiles().windows(2).all(|w| w[0] < w[1]));
        assert!(table.values().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn extremes_track_min_and_max() {
        let table = PercentileTable::estimate(&uniform(10_001), |_| false).unwrap();
        assert_eq!(table.value_for_percentile(0.0), 0.0);
        assert!((table.value_for_percentile(100.0) - 10_000.0).abs() <= 10.0 + 1e-9);
        assert!((table.value_for_percentile(50.0) - 5000.0).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_queries_clamp() {
        let table = PercentileTable::estimate(&uniform(101), |_| false).unwrap();
        assert_eq!(table.value_for_percentile(-5.0), table.values()[0]);
        assert_eq!(table.value_for_percentile(250.0), table.values()[BUCKETS - 1]);
    }

    #[test]
    fn interpolates_between_rows() {
        let table = PercentileTable::from_columns(vec![0.0, 10.0], vec![1.0, 3.0]).unwrap();
        assert!((table.value_for_percentile(2.5) - 1.5).abs() < 1e-12);
        assert_eq!(table.bounds(0.0, 10.0), (1.0, 3.0));
    }

    #[test]
    fn exclusion_and_empty_population() {
        let table = PercentileTable::estimate(&[0.0, 0.0, 5.0, 7.0], |v| v <= 0.01).unwrap();
        assert_eq!(table.values()[0], 5.0);
        assert_eq!(
            PercentileTable::estimate(&[0.0, f64::NAN], |v| v == 0.0),
            Err(EmptyPopulationError)
        );
    }

    #[test]
    fn text_round_trip() {
        let table = PercentileTable::estimate(&[0.25, 3.5, 9.0, 1e-7], |_| false).unwrap();
        let back = PercentileTable::parse(&table.to_text()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn cache_computes_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PercentileCache::new(dir.path());
        let first = cache
            .load_or_compute("temp", || Ok(PercentileTable::estimate(&uniform(50), |_| false)?))
            .unwrap();
        let second = cache
            .load_or_compute("temp", || anyhow::bail!("should have hit the cache"))
            .unwrap();
        assert_eq!(first, second);
        assert!(cache.path_for("temp").exists());
    }

    #[test]
    fn max_value_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MaxValueCache::new(dir.path().join("vapor_max.txt"));
        assert_eq!(cache.load_or_compute(|| Ok(0.0375)).unwrap(), 0.0375);
        assert_eq!(cache.load_or_compute(|| anyhow::bail!("miss")).unwrap(), 0.0375);
    }

    fn two_step_accessor() -> FieldAccessor {
        let info = DatasetInfo {
            timestep_count: 2,
            resolution: [2, 2, 1],
            extents: [1.0, 1.0, 1.0],
            dt: 1.0,
            axis_order: AxisOrder::Kji,
            grid: GridKind::Cartesian,
            scalars: vec![],
            vectors: BTreeMap::new(),
            attributes: BTreeMap::new(),
        };
        let ds = MemoryDataset::new(info)
            .with_scalar(0, "T", vec![300.0, 310.0, 320.0, 330.0])
            .with_scalar(1, "T", vec![340.0, 350.0, 360.0, 370.0])
            .with_scalar(0, "VOF", vec![1.0, 0.0, 0.5, 0.0])
            .with_scalar(1, "VOF", vec![0.0, 0.2, 0.0, 0.0]);
        FieldAccessor::new(ds).unwrap()
    }

    #[test]
    fn interface_mask_limits_population() {
        let acc = two_step_accessor();
        let mask = InterfaceMask::new("VOF", 0.01);
        let table = estimate_over_timesteps(&acc, "T", Some(&mask)).unwrap();
        // Interface samples: 300, 320, 350.
        assert_eq!(table.value_for_percentile(0.0), 300.0);
        assert!((table.value_for_percentile(50.0) - 320.0).abs() < 1e-9);

        let all = estimate_over_timesteps(&acc, "T", None).unwrap();
        assert_eq!(all.value_for_percentile(0.0), 300.0);
        assert_eq!(max_over_timesteps(&acc, "T").unwrap(), 370.0);
    }
}
