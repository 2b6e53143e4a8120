use crate::colormap::{ColorRamp, Rgb};
use crate::error::DegenerateRangeError;
use crate::field::ScalarField3;
use crate::mesh::Mesh;

/// Map `value` onto `[0, 1]` relative to `lower..upper`, clamped.
pub fn normalize(value: f64, lower: f64, upper: f64) -> Result<f64, DegenerateRangeError> {
    check_range(lower, upper)?;
    Ok(((value - lower) / (upper - lower)).clamp(0.0, 1.0))
}

/// Rejects a zero-width or non-finite normalization range.
pub fn check_range(lower: f64, upper: f64) -> Result<(), DegenerateRangeError> {
    if upper == lower || !(upper - lower).is_finite() {
        return Err(DegenerateRangeError { lower, upper });
    }
    Ok(())
}

/// Colour each vertex (grid-index coordinates) by the field value sampled there.
pub fn colorize(
    vertices: &[(f32, f32, f32)],
    field: &ScalarField3,
    lower: f64,
    upper: f64,
) -> Result<Vec<Rgb>, DegenerateRangeError> {
    colorize_with(ColorRamp::Inferno, vertices, field, lower, upper)
}

pub fn colorize_with(
    ramp: ColorRamp,
    vertices: &[(f32, f32, f32)],
    field: &ScalarField3,
    lower: f64,
    upper: f64,
) -> Result<Vec<Rgb>, DegenerateRangeError> {
    check_range(lower, upper)?;
    let span = upper - lower;
    Ok(vertices
        .iter()
        .map(|&(x, y, z)| {
            let v = field.sample_trilinear([x as f64, y as f64, z as f64]);
            ramp.map((v - lower) / span)
        })
        .collect())
}

/// Attach vertex colours to `mesh` in place.
pub fn colorize_mesh(
    mesh: &mut Mesh,
    ramp: ColorRamp,
    field: &ScalarField3,
    lower: f64,
    upper: f64,
) -> Result<(), DegenerateRangeError> {
    mesh.colors = Some(colorize_with(ramp, &mesh.vertices, field, lower, upper)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_bounds_are_degenerate() {
        let field = ScalarField3::zeros([2, 2, 2]);
        let err = colorize(&[(0.0, 0.0, 0.0)], &field, 1.0, 1.0).unwrap_err();
        assert_eq!(err, DegenerateRangeError { lower: 1.0, upper: 1.0 });
    }

    #[test]
    fn colours_follow_field_gradient() {
        let field = ScalarField3::from_fn([3, 2, 2], |i, _, _| i as f32);
        let colors = colorize(
            &[(0.0, 0.0, 0.0), (1.0, 0.5, 0.5), (2.0, 1.0, 1.0)],
            &field,
            0.0,
            2.0,
        )
        .unwrap();
        assert_eq!(colors[0], ColorRamp::Inferno.map(0.0));
        assert_eq!(colors[1], ColorRamp::Inferno.map(0.5));
        assert_eq!(colors[2], ColorRamp::Inferno.map(1.0));
    }

    #[test]
    fn values_beyond_bounds_clamp_to_ramp_ends() {
        let field = ScalarField3::from_fn([2, 2, 2], |_, _, _| 50.0);
        let colors = colorize(&[(0.5, 0.5, 0.5)], &field, 0.0, 1.0).unwrap();
        assert_eq!(colors[0], ColorRamp::Inferno.map(1.0));
        assert_eq!(normalize(-5.0, 0.0, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn colorize_mesh_matches_vertex_count() {
        let field = ScalarField3::from_fn([2, 2, 2], |i, j, k| (i + j + k) as f32);
        let mut mesh = Mesh::new(
            vec![(0.0, 0.0, 0.0), (1.0, 0.0, 0.0), (0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        );
        colorize_mesh(&mut mesh, ColorRamp::Viridis, &field, 0.0, 3.0).unwrap();
        assert!(mesh.validate().is_ok());
    }
}
