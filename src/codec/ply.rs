use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::write_atomic;
use crate::mesh::Mesh;

fn write_header(out: &mut impl std::fmt::Write, mesh: &Mesh) -> std::fmt::Result {
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "element vertex {}", mesh.vertices.len())?;
    writeln!(out, "property float x")?;
    writeln!(out, "property float y")?;
    writeln!(out, "property float z")?;
    if mesh.colors.is_some() {
        writeln!(out, "property uchar red")?;
        writeln!(out, "property uchar green")?;
        writeln!(out, "property uchar blue")?;
    }
    writeln!(out, "element face {}", mesh.triangles.len())?;
    writeln!(out, "property list uchar uint vertex_indices")?;
    writeln!(out, "end_header")
}

/// Serialize to ASCII PLY. Floats use the shortest representation that
/// parses back to the same value.
pub fn mesh_to_ply_string(mesh: &Mesh) -> String {
    let mut out = String::with_capacity(64 + mesh.vertices.len() * 32 + mesh.triangles.len() * 20);
    // Writing into a String cannot fail.
    let _ = write_header(&mut out, mesh);
    for (i, (x, y, z)) in mesh.vertices.iter().enumerate() {
        match mesh.colors.as_ref().and_then(|c| c.get(i)) {
            Some([r, g, b]) => {
                let _ = writeln!(out, "{x} {y} {z} {r} {g} {b}");
            }
            None => {
                let _ = writeln!(out, "{x} {y} {z}");
            }
        }
    }
    for [a, b, c] in &mesh.triangles {
        let _ = writeln!(out, "3 {a} {b} {c}");
    }
    out
}

pub fn write_mesh(path: &Path, mesh: &Mesh) -> Result<()> {
    mesh.validate()
        .with_context(|| format!("Refusing to write invalid mesh to {}", path.display()))?;
    write_atomic(path, mesh_to_ply_string(mesh).as_bytes())
        .with_context(|| format!("Failed to write PLY file: {}", path.display()))
}

pub fn read_mesh(path: &Path) -> Result<Mesh> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read PLY file: {}", path.display()))?;
    parse_ply(&text).with_context(|| format!("Failed to parse PLY file: {}", path.display()))
}

#[derive(Debug)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<String>,
}

/// Parse an ASCII PLY with a `vertex` element (x, y, z and optional
/// red/green/blue) and a `face` element of index lists. Polygons with more
/// than three corners are fan-triangulated; unknown elements and properties
/// are skipped.
pub fn parse_ply(text: &str) -> Result<Mesh> {
    // Header counts are untrusted; never reserve more rows than the text has.
    let line_count = text.lines().count();
    let mut lines = text.lines().map(str::trim).enumerate();

    match lines.next() {
        Some((_, "ply")) => {}
        _ => bail!("missing 'ply' magic line"),
    }

    let mut elements: Vec<Element> = Vec::new();
    let mut saw_format = false;
    loop {
        let Some((n, line)) = lines.next() else {
            bail!("header ended without end_header");
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["end_header"] => break,
            ["format", "ascii", _] => saw_format = true,
            ["format", other, ..] => bail!("unsupported PLY format '{other}' (only ascii is supported)"),
            ["comment", ..] | ["obj_info", ..] | [] => {}
            ["element", name, count] => elements.push(Element {
                name: name.to_string(),
                count: count
                    .parse()
                    .with_context(|| format!("line {}: bad element count", n + 1))?,
                properties: Vec::new(),
            }),
            ["property", "list", _, _, name] | ["property", _, name] => match elements.last_mut() {
                Some(e) => e.properties.push(name.to_string()),
                None => bail!("line {}: property before any element", n + 1),
            },
            _ => bail!("line {}: unrecognized header line '{line}'", n + 1),
        }
    }
    if !saw_format {
        bail!("header has no format line");
    }

    let mut mesh = Mesh::default();
    for element in &elements {
        match element.name.as_str() {
            "vertex" => {
                let col = |name: &str| element.properties.iter().position(|p| p == name);
                let (Some(ix), Some(iy), Some(iz)) = (col("x"), col("y"), col("z")) else {
                    bail!("vertex element lacks x/y/z properties");
                };
                let rgb = match (col("red"), col("green"), col("blue")) {
                    (Some(r), Some(g), Some(b)) => Some([r, g, b]),
                    _ => None,
                };
                let rows = element.count.min(line_count);
                let mut colors = rgb.map(|_| Vec::with_capacity(rows));
                mesh.vertices.reserve(rows);
                for _ in 0..element.count {
                    let (n, line) = lines.next().context("file ends inside vertex list")?;
                    let values: Vec<&str> = line.split_whitespace().collect();
                    if values.len() < element.properties.len() {
                        bail!("line {}: expected {} vertex values", n + 1, element.properties.len());
                    }
                    let f = |i: usize| -> Result<f32> {
                        values[i]
                            .parse()
                            .with_context(|| format!("line {}: bad coordinate '{}'", n + 1, values[i]))
                    };
                    mesh.vertices.push((f(ix)?, f(iy)?, f(iz)?));
                    if let (Some(out), Some(idx)) = (colors.as_mut(), rgb) {
                        let mut c = [0u8; 3];
                        for (slot, i) in c.iter_mut().zip(idx) {
                            *slot = values[i]
                                .parse()
                                .with_context(|| format!("line {}: bad colour '{}'", n + 1, values[i]))?;
                        }
                        out.push(c);
                    }
                }
                mesh.colors = colors;
            }
            "face" => {
                mesh.triangles.reserve(element.count.min(line_count));
                for _ in 0..element.count {
                    let (n, line) = lines.next().context("file ends inside face list")?;
                    let values = line
                        .split_whitespace()
                        .map(str::parse::<u32>)
                        .collect::<Result<Vec<u32>, _>>()
                        .with_context(|| format!("line {}: bad face", n + 1))?;
                    let Some((&count, rest)) = values.split_first() else {
                        bail!("line {}: empty face", n + 1);
                    };
                    let count = count as usize;
                    if count < 3 || rest.len() < count {
                        bail!("line {}: face needs at least 3 indices", n + 1);
                    }
                    for k in 1..count - 1 {
                        mesh.triangles.push([rest[0], rest[k], rest[k + 1]]);
                    }
                }
            }
            _ => {
                for _ in 0..element.count {
                    lines.next();
                }
            }
        }
    }

    mesh.validate()?;
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mesh() -> Mesh {
        Mesh::new(
            vec![(0.0, 0.0, 0.0), (1.5, -0.25, 3.0e-7), (0.1, 0.2, 0.3), (12345.678, 1.0, -2.0)],
            vec![[0, 1, 2], [2, 1, 3]],
        )
    }

    #[test]
    fn header_lists_colour_properties_only_when_present() {
        let plain = mesh_to_ply_string(&sample_mesh());
        assert!(plain.starts_with("ply\nformat ascii 1.0\nelement vertex 4\n"));
        assert!(!plain.contains("red"));
        assert!(plain.contains("element face 2\nproperty list uchar uint vertex_indices\nend_header\n"));
        assert!(plain.ends_with("3 2 1 3\n"));

        let colored = sample_mesh().with_colors(vec![[255, 0, 7]; 4]).unwrap();
        let text = mesh_to_ply_string(&colored);
        assert!(text.contains("property uchar red\nproperty uchar green\nproperty uchar blue\n"));
        assert!(text.contains("0 0 0 255 0 7\n"));
    }

    #[test]
    fn file_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame_0.ply");
        let mesh = sample_mesh().with_colors(vec![[1, 2, 3], [4, 5, 6], [7, 8, 9], [250, 251, 252]]).unwrap();
        write_mesh(&path, &mesh).unwrap();
        assert_eq!(read_mesh(&path).unwrap(), mesh);
    }

    #[test]
    fn round_trip_of_a_large_mesh() {
        let n = 10_000u32;
        let vertices: Vec<(f32, f32, f32)> = (0..n)
            .map(|i| (i as f32 * 0.001, (i as f32).sin(), 1.0 / (i as f32 + 1.0)))
            .collect();
        let triangles: Vec<[u32; 3]> = (0..n - 2).map(|i| [i, i + 1, i + 2]).collect();
        let mesh = Mesh::new(vertices, triangles);
        assert_eq!(parse_ply(&mesh_to_ply_string(&mesh)).unwrap(), mesh);
    }

    #[test]
    fn quads_are_fan_triangulated_and_extra_properties_skipped() {
        let text = "ply\nformat ascii 1.0\ncomment made elsewhere\nelement vertex 4\n\
                    property float x\nproperty float y\nproperty float z\nproperty float nx\n\
                    element face 1\nproperty list uchar int vertex_indices\nend_header\n\
                    0 0 0 1\n1 0 0 1\n1 1 0 1\n0 1 0 1\n4 0 1 2 3\n";
        let mesh = parse_ply(text).unwrap();
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
        assert!(mesh.colors.is_none());
    }

    #[test]
    fn rejects_binary_and_bad_indices() {
        assert!(parse_ply("ply\nformat binary_little_endian 1.0\nend_header\n").is_err());
        let text = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\n\
                    property float z\nelement face 1\nproperty list uchar uint vertex_indices\n\
                    end_header\n0 0 0\n3 0 0 5\n";
        assert!(parse_ply(text).is_err());
    }

    #[test]
    fn huge_element_counts_fail_cleanly() {
        let text = "ply\nformat ascii 1.0\nelement vertex 99999999999999\nproperty float x\n\
                    property float y\nproperty float z\nproperty uchar red\nproperty uchar green\n\
                    property uchar blue\nend_header\n0 0 0 1 2 3\n";
        let err = parse_ply(text).unwrap_err();
        assert!(err.to_string().contains("vertex list"), "{err:#}");

        let text = "ply\nformat ascii 1.0\nelement vertex 0\nproperty float x\nproperty float y\n\
                    property float z\nelement face 18446744073709551615\n\
                    property list uchar uint vertex_indices\nend_header\n";
        assert!(parse_ply(text).is_err());
    }

    #[test]
    fn empty_mesh_round_trips() {
        let mesh = Mesh::default();
        assert_eq!(parse_ply(&mesh_to_ply_string(&mesh)).unwrap(), mesh);
    }
}
