//! Perceptual colour ramps sampled from ten evenly spaced stops.

use serde::{Deserialize, Serialize};

pub type Rgb = [u8; 3];

const INFERNO: [Rgb; 10] = [
    [0x00, 0x00, 0x04],
    [0x1b, 0x0c, 0x41],
    [0x4a, 0x0c, 0x6b],
    [0x78, 0x1c, 0x6d],
    [0xa5, 0x2c, 0x60],
    [0xcf, 0x44, 0x46],
    [0xed, 0x69, 0x25],
    [0xfb, 0x9b, 0x06],
    [0xf7, 0xd1, 0x3d],
    [0xfc, 0xff, 0xa4],
];

const VIRIDIS: [Rgb; 10] = [
    [0x44, 0x01, 0x54],
    [0x48, 0x28, 0x78],
    [0x3e, 0x49, 0x89],
    [0x31, 0x68, 0x8e],
    [0x26, 0x82, 0x8e],
    [0x1f, 0x9e, 0x89],
    [0x35, 0xb7, 0x79],
    [0x6e, 0xce, 0x58],
    [0xb5, 0xde, 0x2b],
    [0xfd, 0xe7, 0x25],
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRamp {
    #[default]
    Inferno,
    Viridis,
}

impl ColorRamp {
    fn stops(self) -> &'static [Rgb; 10] {
        match self {
            ColorRamp::Inferno => &INFERNO,
            ColorRamp::Viridis => &VIRIDIS,
        }
    }

    /// Colour at `t` in `[0, 1]`. Values outside are clamped; NaN maps to the low end.
    pub fn map(self, t: f64) -> Rgb {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let x = t * (stops.len() - 1) as f64;
        let lo = (x.floor() as usize).min(stops.len() - 2);
        let f = x - lo as f64;
        let (a, b) = (stops[lo], stops[lo + 1]);
        let mix = |c: usize| (a[c] as f64 * (1.0 - f) + b[c] as f64 * f).round() as u8;
        [mix(0), mix(1), mix(2)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_hit_first_and_last_stop() {
        assert_eq!(ColorRamp::Inferno.map(0.0), [0, 0, 4]);
        assert_eq!(ColorRamp::Inferno.map(1.0), [252, 255, 164]);
        assert_eq!(ColorRamp::Viridis.map(1.0), [253, 231, 37]);
    }

    #[test]
    fn out_of_range_is_clamped() {
        assert_eq!(ColorRamp::Inferno.map(-3.0), ColorRamp::Inferno.map(0.0));
        assert_eq!(ColorRamp::Inferno.map(7.0), ColorRamp::Inferno.map(1.0));
        assert_eq!(ColorRamp::Inferno.map(f64::NAN), ColorRamp::Inferno.map(0.0));
    }

    #[test]
    fn interior_stop_is_exact() {
        // t = 5/9 lands on the sixth stop.
        assert_eq!(ColorRamp::Inferno.map(5.0 / 9.0), [0xcf, 0x44, 0x46]);
    }

    #[test]
    fn brightness_increases_along_inferno() {
        let lum = |c: Rgb| c.iter().map(|&v| v as u32).sum::<u32>();
        let mut prev = 0;
        for i in 0..=20 {
            let l = lum(ColorRamp::Inferno.map(i as f64 / 20.0));
            assert!(l >= prev);
            prev = l;
        }
    }
}
