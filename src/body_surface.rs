//! Triangulated surfaces from a single ijk layer of a curvilinear grid.

use crate::error::FieldError;
use crate::field::Axis;
use crate::mesh::Mesh;

/// Mesh the layer perpendicular to `axis` at index `level`, keeping every
/// `stride`-th node along the two in-layer axes.
///
/// `coordinates` holds one position per grid node in canonical order
/// (`i + nx * (j + ny * k)`). Each quad of adjacent kept nodes becomes two
/// triangles; no faces join the last column back to the first.
pub fn surface_mesh(
    coordinates: &[[f64; 3]],
    resolution: [usize; 3],
    axis: Axis,
    level: usize,
    stride: usize,
) -> Result<Mesh, FieldError> {
    let expected = resolution.iter().product::<usize>();
    if coordinates.len() != expected {
        return Err(FieldError::ShapeMismatch {
            expected,
            actual: coordinates.len(),
        });
    }
    let fixed = axis.index();
    if level >= resolution[fixed] {
        return Err(FieldError::SliceOutOfRange {
            axis: fixed,
            level,
            size: resolution[fixed],
        });
    }
    let stride = stride.max(1);
    // In-layer axes, fastest first.
    let (a_axis, b_axis) = match axis {
        Axis::X => (1, 2),
        Axis::Y => (0, 2),
        Axis::Z => (0, 1),
    };
    let a_kept: Vec<usize> = (0..resolution[a_axis]).step_by(stride).collect();
    let b_kept: Vec<usize> = (0..resolution[b_axis]).step_by(stride).collect();
    let (na, nb) = (a_kept.len(), b_kept.len());

    let [nx, ny, _] = resolution;
    let mut vertices = Vec::with_capacity(na * nb);
    for &b in &b_kept {
        for &a in &a_kept {
            let mut ijk = [0usize; 3];
            ijk[fixed] = level;
            ijk[a_axis] = a;
            ijk[b_axis] = b;
            let [x, y, z] = coordinates[ijk[0] + nx * (ijk[1] + ny * ijk[2])];
            vertices.push((x as f32, y as f32, z as f32));
        }
    }

    let mut triangles = Vec::with_capacity(2 * na.saturating_sub(1) * nb.saturating_sub(1));
    for b in 0..nb.saturating_sub(1) {
        for a in 0..na.saturating_sub(1) {
            let v = (a + na * b) as u32;
            let row = na as u32;
            triangles.push([v, v + 1, v + row]);
            triangles.push([v + row, v + 1, v + row + 1]);
        }
    }

    log::debug!(
        "Body surface on axis {:?} level {}: {} vertices, {} triangles",
        axis,
        level,
        vertices.len(),
        triangles.len()
    );
    Ok(Mesh::new(vertices, triangles))
}
