//! Indexed triangle mesh shared by every geometry stage, plus the light
//! post-processing steps applied before export.

use std::collections::HashMap;

use crate::colormap::Rgb;
use crate::error::MeshError;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<(f32, f32, f32)>,
    pub triangles: Vec<[u32; 3]>,
    /// Per-vertex colour, same length as `vertices` when present.
    pub colors: Option<Vec<Rgb>>,
}

impl Mesh {
    pub fn new(vertices: Vec<(f32, f32, f32)>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
            colors: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn with_colors(mut self, colors: Vec<Rgb>) -> Result<Self, MeshError> {
        if colors.len() != self.vertices.len() {
            return Err(MeshError::ColorCountMismatch {
                colors: colors.len(),
                vertices: self.vertices.len(),
            });
        }
        self.colors = Some(colors);
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        let n = self.vertices.len();
        for (t, tri) in self.triangles.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= n) {
                return Err(MeshError::IndexOutOfRange {
                    triangle: t,
                    index,
                    vertex_count: n,
                });
            }
        }
        if let Some(colors) = &self.colors {
            if colors.len() != n {
                return Err(MeshError::ColorCountMismatch {
                    colors: colors.len(),
                    vertices: n,
                });
            }
        }
        Ok(())
    }

    /// Append another mesh, offsetting its indices. Colours are kept only if
    /// both meshes carry them. Appending an empty mesh changes nothing.
    pub fn append(&mut self, other: &Mesh) {
        if other.vertices.is_empty() {
            return;
        }
        let offset = self.vertices.len() as u32;
        self.colors = match (self.colors.take(), &other.colors) {
            (Some(mut a), Some(b)) => {
                a.extend_from_slice(b);
                Some(a)
            }
            (None, Some(b)) if self.vertices.is_empty() => Some(b.clone()),
            _ => None,
        };
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );
    }

    /// Merge vertices closer than `tolerance` (grid-snapped) and drop triangles
    /// that collapse as a result. The first vertex of each cluster is kept.
    pub fn weld(&mut self, tolerance: f32) {
        let key = |p: (f32, f32, f32)| -> (i64, i64, i64) {
            if tolerance > 0.0 {
                (
                    (p.0 / tolerance).round() as i64,
                    (p.1 / tolerance).round() as i64,
                    (p.2 / tolerance).round() as i64,
                )
            } else {
                (p.0.to_bits() as i64, p.1.to_bits() as i64, p.2.to_bits() as i64)
            }
        };

        let mut seen: HashMap<(i64, i64, i64), u32> = HashMap::new();
        let mut remap = Vec::with_capacity(self.vertices.len());
        let mut vertices = Vec::new();
        let mut colors = self.colors.as_ref().map(|_| Vec::new());
        for (i, &p) in self.vertices.iter().enumerate() {
            let next = vertices.len() as u32;
            let id = *seen.entry(key(p)).or_insert_with(|| {
                vertices.push(p);
                if let (Some(out), Some(src)) = (colors.as_mut(), self.colors.as_ref()) {
                    out.push(src[i]);
                }
                next
            });
            remap.push(id);
        }

        let before = self.vertices.len();
        self.triangles = self
            .triangles
            .iter()
            .map(|t| [remap[t[0] as usize], remap[t[1] as usize], remap[t[2] as usize]])
            .filter(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
            .collect();
        self.vertices = vertices;
        self.colors = colors;
        log::debug!("weld: {} -> {} vertices", before, self.vertices.len());
    }

    /// Laplacian smoothing: each pass moves every vertex `factor` of the way
    /// towards the mean of its edge neighbours.
    pub fn smooth(&mut self, iterations: usize, factor: f32) {
        if iterations == 0 || self.triangles.is_empty() {
            return;
        }
        let mut neighbours: Vec<Vec<u32>> = vec![Vec::new(); self.vertices.len()];
        for t in &self.triangles {
            for e in 0..3 {
                let a = t[e];
                let b = t[(e + 1) % 3];
                neighbours[a as usize].push(b);
                neighbours[b as usize].push(a);
            }
        }
        for n in &mut neighbours {
            n.sort_unstable();
            n.dedup();
        }

        for _ in 0..iterations {
            let current = self.vertices.clone();
            for (v, adj) in self.vertices.iter_mut().zip(&neighbours) {
                if adj.is_empty() {
                    continue;
                }
                let inv = 1.0 / adj.len() as f32;
                let (mut sx, mut sy, mut sz) = (0.0f32, 0.0f32, 0.0f32);
                for &n in adj {
                    let p = current[n as usize];
                    sx += p.0;
                    sy += p.1;
                    sz += p.2;
                }
                v.0 += factor * (sx * inv - v.0);
                v.1 += factor * (sy * inv - v.1);
                v.2 += factor * (sz * inv - v.2);
            }
        }
    }

    /// Drop triangles whose centroid lies in front of the plane
    /// `dot(normal, p) > offset`, then remove vertices nothing references.
    pub fn cut_half(&mut self, normal: [f32; 3], offset: f32) {
        let v = &self.vertices;
        self.triangles.retain(|t| {
            let c = t.iter().fold((0.0f32, 0.0f32, 0.0f32), |acc, &i| {
                let p = v[i as usize];
                (acc.0 + p.0, acc.1 + p.1, acc.2 + p.2)
            });
            let d = (normal[0] * c.0 + normal[1] * c.1 + normal[2] * c.2) / 3.0;
            d <= offset
        });
        self.compact();
    }

    /// Remove unreferenced vertices and renumber triangles.
    pub fn compact(&mut self) {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut vertices = Vec::new();
        let mut colors = self.colors.as_ref().map(|_| Vec::new());
        for t in &mut self.triangles {
            for idx in t.iter_mut() {
                let old = *idx as usize;
                if remap[old] == u32::MAX {
                    remap[old] = vertices.len() as u32;
                    vertices.push(self.vertices[old]);
                    if let (Some(out), Some(src)) = (colors.as_mut(), self.colors.as_ref()) {
                        out.push(src[old]);
                    }
                }
                *idx = remap[old];
            }
        }
        self.vertices = vertices;
        self.colors = colors;
    }

    /// Move grid-index geometry so the domain box is centred on the origin and
    /// its y extent spans `scale` units.
    pub fn center_in_domain(&mut self, resolution: [usize; 3], scale: f32) {
        let res = resolution.map(|n| n.max(1) as f32);
        let factor = scale / res[1];
        // Half a cell per axis, so cell-centred samples land symmetric about 0.
        let shift = res.map(|n| scale / (2.0 * n));
        for v in &mut self.vertices {
            v.0 = (v.0 - res[0] / 2.0) * factor + shift[0];
            v.1 = (v.1 - res[1] / 2.0) * factor + shift[1];
            v.2 = (v.2 - res[2] / 2.0) * factor + shift[2];
        }
    }

    pub fn bounds(&self) -> Option<((f32, f32, f32), (f32, f32, f32))> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), &p| {
            (
                (lo.0.min(p.0), lo.1.min(p.1), lo.2.min(p.2)),
                (hi.0.max(p.0), hi.1.max(p.1), hi.2.max(p.2)),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Mesh {
        // Two triangles that do not share vertices.
        Mesh::new(
            vec![
                (0.0, 0.0, 0.0),
                (1.0, 0.0, 0.0),
                (1.0, 1.0, 0.0),
                (0.0, 0.0, 0.0),
                (1.0, 1.0, 0.0),
                (0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        )
    }

    #[test]
    fn validate_catches_bad_index_and_colour_count() {
        let mut m = quad();
        assert!(m.validate().is_ok());
        m.triangles.push([0, 1, 6]);
        assert_eq!(
            m.validate(),
            Err(MeshError::IndexOutOfRange {
                triangle: 2,
                index: 6,
                vertex_count: 6
            })
        );
        assert!(quad().with_colors(vec![[0, 0, 0]; 5]).is_err());
    }

    #[test]
    fn weld_merges_coincident_vertices() {
        let mut m = quad().with_colors(vec![[1, 2, 3]; 6]).unwrap();
        m.weld(1e-5);
        assert_eq!(m.vertex_count(), 4);
        assert_eq!(m.triangle_count(), 2);
        assert_eq!(m.colors.as_ref().map(Vec::len), Some(4));
        assert!(m.validate().is_ok());
    }

    #[test]
    fn weld_drops_collapsed_triangles() {
        let mut m = Mesh::new(
            vec![(0.0, 0.0, 0.0), (1e-7, 0.0, 0.0), (1.0, 0.0, 0.0)],
            vec![[0, 1, 2]],
        );
        m.weld(1e-4);
        assert!(m.is_empty());
    }

    #[test]
    fn smooth_pulls_spike_towards_neighbours() {
        let mut m = Mesh::new(
            vec![(0.0, 0.0, 0.0), (2.0, 0.0, 0.0), (1.0, 2.0, 0.0), (1.0, 0.5, 3.0)],
            vec![[0, 1, 3], [1, 2, 3], [2, 0, 3]],
        );
        m.smooth(1, 1.0);
        assert!(m.vertices[3].2 < 3.0);
        assert!((m.vertices[3].0 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cut_half_keeps_back_triangles_and_compacts() {
        let mut m = quad();
        m.append(&Mesh::new(
            vec![(5.0, 0.0, 0.0), (6.0, 0.0, 0.0), (6.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        ));
        m.cut_half([1.0, 0.0, 0.0], 2.0);
        assert_eq!(m.triangle_count(), 2);
        assert_eq!(m.vertex_count(), 6);
        assert!(m.vertices.iter().all(|v| v.0 <= 1.0));
    }

    #[test]
    fn center_in_domain_scales_by_y_resolution() {
        let mut m = Mesh::new(vec![(5.0, 5.0, 5.0)], vec![]);
        m.center_in_domain([10, 10, 10], 2.0);
        let v = m.vertices[0];
        assert!((v.0 - 0.1).abs() < 1e-6);
        assert!((v.1 - 0.1).abs() < 1e-6);
    }

    #[test]
    fn append_offsets_indices() {
        let mut a = quad();
        a.append(&quad());
        assert_eq!(a.triangles[2], [6, 7, 8]);
        assert!(a.validate().is_ok());
    }
}
