//! Streamline seed placement.

use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One of the six faces of the grid box. `Yz` faces are perpendicular to x, and so on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedFace {
    #[serde(rename = "YZ-")]
    YzMin,
    #[serde(rename = "YZ+")]
    YzMax,
    #[serde(rename = "XZ-")]
    XzMin,
    #[serde(rename = "XZ+")]
    XzMax,
    #[serde(rename = "XY-")]
    XyMin,
    #[serde(rename = "XY+")]
    XyMax,
}

impl SeedFace {
    /// `(normal axis, first in-plane axis, second in-plane axis, on upper face)`
    fn layout(self) -> (usize, usize, usize, bool) {
        match self {
            SeedFace::YzMin => (0, 1, 2, false),
            SeedFace::YzMax => (0, 1, 2, true),
            SeedFace::XzMin => (1, 0, 2, false),
            SeedFace::XzMax => (1, 0, 2, true),
            SeedFace::XyMin => (2, 0, 1, false),
            SeedFace::XyMax => (2, 0, 1, true),
        }
    }
}

impl std::str::FromStr for SeedFace {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "YZ-" => SeedFace::YzMin,
            "YZ+" => SeedFace::YzMax,
            "XZ-" => SeedFace::XzMin,
            "XZ+" => SeedFace::XzMax,
            "XY-" => SeedFace::XyMin,
            "XY+" => SeedFace::XyMax,
            other => anyhow::bail!("unknown seed face '{other}' (expected YZ-, YZ+, XZ-, XZ+, XY- or XY+)"),
        })
    }
}

/// `count` evenly spaced values from `a` to `b` inclusive.
fn linspace(a: f64, b: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![a],
        n => (0..n)
            .map(|i| a + (b - a) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// Brick-pattern seeds on one face of the index-space box.
///
/// Rows alternate between a short row inset by `spacing` and a long row
/// inset by `spacing / 2`, so neighbouring rows are offset by half a
/// spacing. Points on an upper face sit at `resolution - 1` along the normal.
pub fn generate_starting_points(spacing: f64, resolution: [usize; 3], face: SeedFace) -> Vec<DVec3> {
    if !(spacing > 0.0) {
        return Vec::new();
    }
    let (normal, u_axis, v_axis, upper) = face.layout();
    let u_end = resolution[u_axis].saturating_sub(1) as f64;
    let v_end = resolution[v_axis].saturating_sub(1) as f64;

    let n_u = (u_end / spacing).floor() as usize;
    let n_v = (v_end / spacing).floor() as usize;
    let row_short = linspace(spacing, u_end - spacing, n_u);
    let row_long = linspace(spacing / 2.0, u_end - spacing / 2.0, n_u + 1);
    let rows = linspace(spacing / 2.0, v_end - spacing / 2.0, n_v);

    let fixed = if upper {
        resolution[normal].saturating_sub(1) as f64
    } else {
        0.0
    };

    let mut out = Vec::new();
    for (r, &v) in rows.iter().enumerate() {
        let row = if r % 2 == 0 { &row_short } else { &row_long };
        for &u in row {
            let mut p = [0.0; 3];
            p[normal] = fixed;
            p[u_axis] = u;
            p[v_axis] = v;
            out.push(DVec3::from_array(p));
        }
    }
    out
}

/// `count` points drawn uniformly (with replacement) from `population`,
/// reproducible for a given `seed`.
pub fn generate_surface_seeds(population: &[[f64; 3]], count: usize, seed: u64) -> Vec<DVec3> {
    if population.is_empty() {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| DVec3::from_array(population[rng.gen_range(0..population.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brick_rows_alternate_short_and_long() {
        let pts = generate_starting_points(2.0, [9, 9, 9], SeedFace::XyMin);
        // u_end = 8: short rows have 4 points, long rows 5, four rows total.
        assert_eq!(pts.len(), 4 + 5 + 4 + 5);
        assert!(pts.iter().all(|p| p.z == 0.0));
        assert_eq!(pts[0], DVec3::new(2.0, 1.0, 0.0));
        assert_eq!(pts[4], DVec3::new(1.0, 1.0 + 2.0, 0.0));
        assert!((pts[3].x - 6.0).abs() < 1e-12);
        assert!((pts[8].x - 7.0).abs() < 1e-12);
    }

    #[test]
    fn upper_face_sits_on_last_node() {
        let pts = generate_starting_points(2.0, [9, 5, 7], SeedFace::XzMax);
        assert!(!pts.is_empty());
        assert!(pts.iter().all(|p| p.y == 4.0));
        assert!(pts.iter().all(|p| p.x > 0.0 && p.x < 8.0 && p.z > 0.0 && p.z < 6.0));
    }

    #[test]
    fn face_names_parse() {
        assert_eq!("yz+".parse::<SeedFace>().unwrap(), SeedFace::YzMax);
        assert!("ZZ-".parse::<SeedFace>().is_err());
    }

    #[test]
    fn surface_seeds_are_reproducible() {
        let population: Vec<[f64; 3]> = (0..50).map(|i| [i as f64, 0.0, 1.0]).collect();
        let a = generate_surface_seeds(&population, 20, 777);
        let b = generate_surface_seeds(&population, 20, 777);
        let c = generate_surface_seeds(&population, 20, 778);
        assert_eq!(a.len(), 20);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|p| p.z == 1.0 && p.x < 50.0));
        assert!(generate_surface_seeds(&[], 5, 1).is_empty());
    }
}
