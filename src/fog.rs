//! Vapour mass fraction to log-scaled fog density for volumetric rendering.

use serde::{Deserialize, Serialize};

use crate::error::DegenerateRangeError;
use crate::field::ScalarField3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    /// Channel holding the vapour fraction.
    pub channel: String,
    /// Smallest vapour fraction that still shows as fog.
    pub vapor_min: f64,
    /// Zero the upper half of the x range.
    pub halved: bool,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            channel: "YV".to_string(),
            vapor_min: 1e-4,
            halved: false,
        }
    }
}

/// Log-scale `field` so `vapor_min` maps to 0 and `vapor_max` to 1.
///
/// Negative samples are clamped to 0 before the logarithm, and anything the
/// transform sends below 0 (including `-inf` from zero samples) is clamped
/// to 0 afterwards. Values above `vapor_max` exceed 1 and are kept.
pub fn fog_intensity(
    field: &ScalarField3,
    vapor_min: f64,
    vapor_max: f64,
) -> Result<ScalarField3, DegenerateRangeError> {
    if !(vapor_min > 0.0) || !(vapor_max > 0.0) || vapor_min == vapor_max {
        return Err(DegenerateRangeError {
            lower: vapor_min,
            upper: vapor_max,
        });
    }
    let log_span = (vapor_min / vapor_max).log10();
    Ok(field.map(|v| {
        let u = (v as f64 / vapor_max).max(0.0);
        let fog = 1.0 - u.log10() / log_span;
        if fog.is_nan() || fog < 0.0 {
            0.0
        } else {
            fog as f32
        }
    }))
}

/// Zero every node with `i >= nx / 2`.
pub fn halve(field: &mut ScalarField3) {
    let [nx, ny, nz] = field.shape();
    for k in 0..nz {
        for j in 0..ny {
            for i in nx / 2..nx {
                field.set(i, j, k, 0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(values: &[f32]) -> ScalarField3 {
        ScalarField3::new([values.len(), 1, 1], values.to_vec()).unwrap()
    }

    #[test]
    fn maps_min_to_zero_and_max_to_one() {
        let fog = fog_intensity(&line(&[1e-4, 1e-2, 1e-3]), 1e-4, 1e-2).unwrap();
        assert!(fog.get(0, 0, 0).abs() < 1e-6);
        assert!((fog.get(1, 0, 0) - 1.0).abs() < 1e-6);
        assert!((fog.get(2, 0, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_negative_and_faint_values_clamp_to_zero() {
        let fog = fog_intensity(&line(&[0.0, -0.5, 1e-6, f32::NAN]), 1e-4, 1e-2).unwrap();
        assert!(fog.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn values_above_max_are_not_clipped() {
        let fog = fog_intensity(&line(&[0.1]), 1e-4, 1e-2).unwrap();
        assert!(fog.get(0, 0, 0) > 1.0);
    }

    #[test]
    fn degenerate_ranges_are_rejected() {
        let f = line(&[1.0]);
        assert!(fog_intensity(&f, 0.0, 1.0).is_err());
        assert!(fog_intensity(&f, 1e-3, -1.0).is_err());
        assert!(fog_intensity(&f, 0.5, 0.5).is_err());
    }

    #[test]
    fn halving_zeros_upper_x() {
        let mut f = ScalarField3::from_fn([5, 2, 2], |_, _, _| 1.0);
        halve(&mut f);
        assert_eq!(f.get(1, 1, 1), 1.0);
        assert_eq!(f.get(2, 0, 0), 0.0);
        assert_eq!(f.get(4, 1, 1), 0.0);
    }
}
