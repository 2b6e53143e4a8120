//! Streamline polylines to closed, coloured tube meshes.
//!
//! Rings sit on the interior polyline points, oriented by a rotation
//! minimizing frame: each ring's frame is the previous one turned by the
//! smallest rotation between consecutive tangents, so the tube does not
//! twist. The two end rings are closed by flat fans around their centres.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::colorize::{check_range, normalize};
use crate::colormap::ColorRamp;
use crate::error::DegenerateRangeError;
use crate::mesh::Mesh;
use crate::streamline::Polyline;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TubeConfig {
    pub radius: f64,
    /// Vertices per ring (clamped to at least 3).
    pub sides: usize,
    pub ramp: ColorRamp,
}

impl Default for TubeConfig {
    fn default() -> Self {
        Self {
            radius: 0.02,
            sides: 8,
            ramp: ColorRamp::Inferno,
        }
    }
}

/// Tangent at each interior point: the normalized sum of the incoming and
/// outgoing segment directions.
fn interior_tangents(points: &[DVec3]) -> Vec<DVec3> {
    let mut last = DVec3::X;
    let mut dir = |a: DVec3, b: DVec3| {
        let d = (b - a).normalize_or_zero();
        if d != DVec3::ZERO {
            last = d;
        }
        last
    };
    let segments: Vec<DVec3> = points.windows(2).map(|w| dir(w[0], w[1])).collect();
    segments
        .windows(2)
        .map(|s| {
            let t = (s[0] + s[1]).normalize_or_zero();
            if t == DVec3::ZERO {
                s[1]
            } else {
                t
            }
        })
        .collect()
}

/// Build a tube around `polyline`. Ring colour comes from that point's
/// magnitude normalized by `color_bounds`. Fewer than three points yield an
/// empty mesh.
pub fn build_tube(
    polyline: &Polyline,
    radius: f64,
    sides: usize,
    color_bounds: (f64, f64),
) -> Result<Mesh, DegenerateRangeError> {
    build_tube_with(
        polyline,
        &TubeConfig {
            radius,
            sides,
            ..TubeConfig::default()
        },
        color_bounds,
    )
}

pub fn build_tube_with(
    polyline: &Polyline,
    config: &TubeConfig,
    color_bounds: (f64, f64),
) -> Result<Mesh, DegenerateRangeError> {
    let points = &polyline.points;
    if points.len() < 3 || polyline.magnitudes.len() != points.len() {
        return Ok(Mesh::default());
    }
    let (lower, upper) = color_bounds;
    check_range(lower, upper)?;
    let sides = config.sides.max(3);
    let tangents = interior_tangents(points);
    let rings = tangents.len();

    // Canonical cross-section frame (u, v) with normal u x v = +x.
    let mut u = DVec3::new(0.0, 0.0, -1.0);
    let mut v = DVec3::Y;
    let mut prev_t = DVec3::X;

    let mut vertices = Vec::with_capacity(rings * sides + 2);
    let mut colors = Vec::with_capacity(rings * sides + 2);
    for (r, &t) in tangents.iter().enumerate() {
        let turn = DQuat::from_rotation_arc(prev_t, t);
        u = (turn * u).normalize();
        v = (turn * v).normalize();
        prev_t = t;

        let centre = points[r + 1];
        let color = config
            .ramp
            .map(normalize(polyline.magnitudes[r + 1], lower, upper)?);
        for k in 0..sides {
            let theta = std::f64::consts::TAU * k as f64 / sides as f64;
            let p = centre + config.radius * (theta.cos() * u + theta.sin() * v);
            vertices.push((p.x as f32, p.y as f32, p.z as f32));
            colors.push(color);
        }
    }

    let n = sides as u32;
    let mut triangles = Vec::with_capacity(2 * sides * rings);
    for r in 0..rings.saturating_sub(1) as u32 {
        let base = r * n;
        for k in 0..n {
            let a0 = base + k;
            let a1 = base + (k + 1) % n;
            triangles.push([a0, a1, a1 + n]);
            triangles.push([a0 + n, a0, a1 + n]);
        }
    }

    let last_ring = (rings as u32 - 1) * n;
    for (ring_start, faces_forward) in [(0u32, false), (last_ring, true)] {
        let centre = vertices[ring_start as usize..(ring_start + n) as usize]
            .iter()
            .fold(DVec3::ZERO, |acc, p| {
                acc + DVec3::new(p.0 as f64, p.1 as f64, p.2 as f64)
            })
            / sides as f64;
        let c = vertices.len() as u32;
        vertices.push((centre.x as f32, centre.y as f32, centre.z as f32));
        colors.push(colors[ring_start as usize]);
        for k in 0..n {
            let a0 = ring_start + k;
            let a1 = ring_start + (k + 1) % n;
            if faces_forward {
                triangles.push([c, a0, a1]);
            } else {
                triangles.push([c, a1, a0]);
            }
        }
    }

    Ok(Mesh {
        vertices,
        triangles,
        colors: Some(colors),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn polyline(points: &[[f64; 3]], mags: &[f64]) -> Polyline {
        Polyline {
            points: points.iter().map(|&p| DVec3::from_array(p)).collect(),
            magnitudes: mags.to_vec(),
        }
    }

    fn to_dvec(p: (f32, f32, f32)) -> DVec3 {
        DVec3::new(p.0 as f64, p.1 as f64, p.2 as f64)
    }

    fn assert_closed(mesh: &Mesh) {
        let mut directed: HashMap<(u32, u32), usize> = HashMap::new();
        for t in &mesh.triangles {
            for e in 0..3 {
                *directed.entry((t[e], t[(e + 1) % 3])).or_default() += 1;
            }
        }
        for (&(a, b), &count) in &directed {
            assert_eq!(count, 1);
            assert_eq!(directed.get(&(b, a)), Some(&1), "open edge {a}-{b}");
        }
    }

    #[test]
    fn short_polylines_give_empty_mesh() {
        let p = polyline(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]], &[1.0, 1.0]);
        assert!(build_tube(&p, 0.1, 6, (0.0, 1.0)).unwrap().is_empty());
        // Length is checked before the colour range.
        assert!(build_tube(&p, 0.1, 6, (1.0, 1.0)).unwrap().is_empty());
    }

    #[test]
    fn equal_color_bounds_are_rejected() {
        let p = polyline(&[[0.0; 3], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]], &[1.0; 3]);
        assert!(build_tube(&p, 0.1, 6, (2.0, 2.0)).is_err());
    }

    #[test]
    fn straight_three_point_line_has_one_uniform_ring() {
        let p = polyline(
            &[[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 2.0, 0.0]],
            &[0.5, 0.5, 0.5],
        );
        let mesh = build_tube(&p, 0.25, 8, (0.0, 1.0)).unwrap();
        assert_eq!(mesh.vertex_count(), 8 + 2);
        assert_eq!(mesh.triangle_count(), 2 * 8);
        assert!(mesh.validate().is_ok());

        let colors = mesh.colors.as_ref().unwrap();
        assert!(colors.iter().all(|&c| c == ColorRamp::Inferno.map(0.5)));

        let centre = DVec3::new(0.0, 1.0, 0.0);
        for &v in &mesh.vertices[..8] {
            let d = to_dvec(v) - centre;
            assert!((d.length() - 0.25).abs() < 1e-6);
            // Ring lies in the plane perpendicular to the line.
            assert!(d.y.abs() < 1e-6);
        }
        assert_closed(&mesh);
    }

    #[test]
    fn curved_line_stays_closed_and_round() {
        let pts: Vec<[f64; 3]> = (0..20)
            .map(|i| {
                let a = i as f64 * 0.3;
                [a.cos() * 3.0, a.sin() * 3.0, i as f64 * 0.2]
            })
            .collect();
        let mags: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let p = polyline(&pts, &mags);
        let mesh = build_tube(&p, 0.1, 6, (0.0, 19.0)).unwrap();
        assert_eq!(mesh.vertex_count(), 18 * 6 + 2);
        assert_eq!(mesh.triangle_count(), 17 * 12 + 12);
        assert_closed(&mesh);
        for (r, ring) in mesh.vertices[..18 * 6].chunks(6).enumerate() {
            let centre = p.points[r + 1];
            for &v in ring {
                assert!(((to_dvec(v) - centre).length() - 0.1).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn side_faces_point_outwards() {
        let p = polyline(
            &[[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 2.0], [0.0, 0.0, 3.0]],
            &[1.0; 4],
        );
        let mesh = build_tube(&p, 0.5, 8, (0.0, 2.0)).unwrap();
        for t in &mesh.triangles[..16] {
            let [a, b, c] = t.map(|i| to_dvec(mesh.vertices[i as usize]));
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            let radial = DVec3::new(centroid.x, centroid.y, 0.0);
            assert!(normal.dot(radial) > 0.0);
        }
    }

    #[test]
    fn frame_does_not_twist_on_a_straight_run() {
        let p = polyline(
            &[[0.0; 3], [1.0, 1.0, 0.0], [2.0, 2.0, 0.0], [3.0, 3.0, 0.0], [4.0, 4.0, 0.0]],
            &[1.0; 5],
        );
        let mesh = build_tube(&p, 0.2, 5, (0.0, 2.0)).unwrap();
        let first = to_dvec(mesh.vertices[0]) - p.points[1];
        let last = to_dvec(mesh.vertices[10]) - p.points[3];
        assert!((first - last).length() < 1e-6);
    }
}
