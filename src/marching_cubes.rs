//! Marching cubes isosurface extraction on a structured scalar grid.
//!
//! Cells are processed in independent z-slabs; each slab emits triangles as
//! triples of grid-edge keys. The merge walks slabs in order and assigns one
//! vertex per grid edge on first use, so neighbouring cells share vertices
//! and the output is identical whether or not slabs ran in parallel.

use std::collections::HashMap;

use crate::field::ScalarField3;
use crate::mc_tables::{CORNER_OFFSETS, EDGE_AXIS, EDGE_CORNERS, EDGE_FLAGS, TRI_TABLE};
use crate::mesh::Mesh;
use crate::parallel_iter;

/// Identifies a grid edge by its lower node's flat index and its axis.
type EdgeKey = u64;

#[inline]
fn edge_key(node: usize, axis: usize) -> EdgeKey {
    (node as u64) * 3 + axis as u64
}

/// Extract the `level` isosurface. Vertices are in grid-index coordinates.
///
/// Face normals point towards decreasing field values. A field entirely on
/// one side of `level` yields an empty mesh.
pub fn extract(field: &ScalarField3, level: f64) -> Mesh {
    let [nx, ny, nz] = field.shape();
    if nx < 2 || ny < 2 || nz < 2 {
        return Mesh::default();
    }

    let slabs: Vec<Vec<[EdgeKey; 3]>> =
        parallel_iter::map_range(0..nz - 1, |k| slab_triangles(field, level, k));

    let mut edge_to_vertex: HashMap<EdgeKey, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut triangles = Vec::with_capacity(slabs.iter().map(Vec::len).sum());
    for tri in slabs.into_iter().flatten() {
        let mut out = [0u32; 3];
        for (slot, key) in out.iter_mut().zip(tri) {
            *slot = *edge_to_vertex.entry(key).or_insert_with(|| {
                vertices.push(edge_vertex(field, level, key));
                (vertices.len() - 1) as u32
            });
        }
        triangles.push(out);
    }

    log::debug!(
        "marching cubes: level {} -> {} vertices, {} triangles",
        level,
        vertices.len(),
        triangles.len()
    );
    Mesh::new(vertices, triangles)
}

fn slab_triangles(field: &ScalarField3, level: f64, k: usize) -> Vec<[EdgeKey; 3]> {
    let [nx, ny, _] = field.shape();
    let mut out = Vec::new();
    for j in 0..ny - 1 {
        for i in 0..nx - 1 {
            let mut case = 0usize;
            for (c, &(dx, dy, dz)) in CORNER_OFFSETS.iter().enumerate() {
                if (field.get(i + dx, j + dy, k + dz) as f64) < level {
                    case |= 1 << c;
                }
            }
            if EDGE_FLAGS[case] == 0 {
                continue;
            }

            let mut keys = [0 as EdgeKey; 12];
            for (e, key) in keys.iter_mut().enumerate() {
                if EDGE_FLAGS[case] & (1 << e) != 0 {
                    let (dx, dy, dz) = CORNER_OFFSETS[EDGE_CORNERS[e].0];
                    *key = edge_key(field.index(i + dx, j + dy, k + dz), EDGE_AXIS[e]);
                }
            }

            for tri in TRI_TABLE[case].chunks_exact(3) {
                if tri[0] < 0 {
                    break;
                }
                out.push([
                    keys[tri[0] as usize],
                    keys[tri[1] as usize],
                    keys[tri[2] as usize],
                ]);
            }
        }
    }
    out
}

/// Linear interpolation of the crossing point along a grid edge.
fn edge_vertex(field: &ScalarField3, level: f64, key: EdgeKey) -> (f32, f32, f32) {
    let [nx, ny, _] = field.shape();
    let node = (key / 3) as usize;
    let axis = (key % 3) as usize;
    let i = node % nx;
    let j = (node / nx) % ny;
    let k = node / (nx * ny);

    let mut b = [i, j, k];
    b[axis] += 1;
    let va = field.get(i, j, k) as f64;
    let vb = field.get(b[0], b[1], b[2]) as f64;
    let mut t = (level - va) / (vb - va);
    if !t.is_finite() {
        t = 0.5;
    }
    let t = t.clamp(0.0, 1.0);

    let mut p = [i as f64, j as f64, k as f64];
    p[axis] += t;
    (p[0] as f32, p[1] as f32, p[2] as f32)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn sphere_sdf(n: usize, center: f32, radius: f32) -> ScalarField3 {
        ScalarField3::from_fn([n, n, n], |i, j, k| {
            let (x, y, z) = (i as f32 - center, j as f32 - center, k as f32 - center);
            (x * x + y * y + z * z).sqrt() - radius
        })
    }

    #[test]
    fn field_on_one_side_gives_empty_mesh() {
        let field = ScalarField3::from_fn([4, 4, 4], |i, j, k| (i + j + k) as f32 + 1.0);
        assert!(extract(&field, 0.0).is_empty());
        assert!(extract(&field, 100.0).is_empty());
    }

    #[test]
    fn degenerate_grid_gives_empty_mesh() {
        let field = ScalarField3::zeros([1, 5, 5]);
        assert!(extract(&field, 0.5).is_empty());
    }

    #[test]
    fn sphere_vertices_lie_near_radius() {
        let field = sphere_sdf(16, 7.5, 5.0);
        let mesh = extract(&field, 0.0);
        assert!(!mesh.is_empty());
        assert!(mesh.validate().is_ok());
        for &(x, y, z) in &mesh.vertices {
            let r = ((x - 7.5).powi(2) + (y - 7.5).powi(2) + (z - 7.5).powi(2)).sqrt();
            assert!((r - 5.0).abs() < 0.1, "vertex radius {r}");
        }
    }

    #[test]
    fn closed_surface_is_watertight_and_consistently_wound() {
        let mesh = extract(&sphere_sdf(12, 5.5, 4.0), 0.0);
        let mut directed: HashMap<(u32, u32), usize> = HashMap::new();
        for t in &mesh.triangles {
            for e in 0..3 {
                *directed.entry((t[e], t[(e + 1) % 3])).or_default() += 1;
            }
        }
        for (&(a, b), &count) in &directed {
            assert_eq!(count, 1, "edge {a}-{b} used twice in the same direction");
            assert_eq!(directed.get(&(b, a)), Some(&1), "edge {a}-{b} has no twin");
        }
    }

    #[test]
    fn normals_point_towards_lower_values() {
        let mesh = extract(&sphere_sdf(12, 5.5, 4.0), 0.0);
        let c = 5.5f32;
        for t in &mesh.triangles {
            let [a, b, d] = t.map(|i| mesh.vertices[i as usize]);
            let u = (b.0 - a.0, b.1 - a.1, b.2 - a.2);
            let v = (d.0 - a.0, d.1 - a.1, d.2 - a.2);
            let n = (u.1 * v.2 - u.2 * v.1, u.2 * v.0 - u.0 * v.2, u.0 * v.1 - u.1 * v.0);
            let centroid = ((a.0 + b.0 + d.0) / 3.0 - c, (a.1 + b.1 + d.1) / 3.0 - c, (a.2 + b.2 + d.2) / 3.0 - c);
            // The SDF decreases towards the centre.
            assert!(n.0 * centroid.0 + n.1 * centroid.1 + n.2 * centroid.2 < 0.0);
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let field = ScalarField3::from_fn([9, 7, 8], |i, j, k| {
            ((i * 7 + j * 13 + k * 5) % 11) as f32 / 10.0
        });
        let a = extract(&field, 0.45);
        let b = extract(&field, 0.45);
        assert_eq!(a, b);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn vertices_stay_inside_grid() {
        let field = ScalarField3::from_fn([6, 6, 6], |i, _, _| i as f32);
        let mesh = extract(&field, 2.25);
        assert!(!mesh.is_empty());
        assert!(mesh.vertices.iter().all(|v| (v.0 - 2.25).abs() < 1e-6));
    }
}
