//! Forward-Euler streamline tracing.

use glam::DVec3;

use crate::parallel_iter;

pub mod sampler;
pub mod seeds;

pub use sampler::{FieldSampler, Interpolation, NearestSampler, TrilinearSampler, VectorSampler};
pub use seeds::{generate_starting_points, generate_surface_seeds, SeedFace};

/// Traced points with the field magnitude sampled at each, in step order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Polyline {
    pub points: Vec<DVec3>,
    pub magnitudes: Vec<f64>,
}

impl Polyline {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push(&mut self, point: DVec3, magnitude: f64) {
        self.points.push(point);
        self.magnitudes.push(magnitude);
    }
}

/// Why a trace stopped. Every variant is a normal end of integration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    MaxSteps,
    LeftDomain,
    /// Zero or non-finite sample; there is no direction to follow.
    Stagnant,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    pub polyline: Polyline,
    pub stop: StopReason,
}

/// Axis-aligned integration domain. The lower faces are always inside; the
/// upper faces are inside only for closed bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
    pub include_max: bool,
}

impl Bounds {
    pub fn half_open(min: DVec3, max: DVec3) -> Self {
        Self {
            min,
            max,
            include_max: false,
        }
    }

    pub fn closed(min: DVec3, max: DVec3) -> Self {
        Self {
            min,
            max,
            include_max: true,
        }
    }

    /// Index-space box of a grid: `[0, n - 1]` on every axis.
    pub fn of_grid(shape: [usize; 3]) -> Self {
        let max = DVec3::new(
            shape[0].saturating_sub(1) as f64,
            shape[1].saturating_sub(1) as f64,
            shape[2].saturating_sub(1) as f64,
        );
        Self::closed(DVec3::ZERO, max)
    }

    pub fn contains(&self, p: DVec3) -> bool {
        let above_min = p.cmpge(self.min).all();
        let below_max = if self.include_max {
            p.cmple(self.max).all()
        } else {
            p.cmplt(self.max).all()
        };
        above_min && below_max
    }
}

/// Trace one streamline from `start`.
///
/// Each step checks the bounds, samples the field, records the point with
/// the raw magnitude, then advances `step` along the unit direction. The
/// position is accumulated with compensated summation so a run of equal
/// steps lands on exact multiples of `step`.
pub fn trace<S>(sampler: &S, start: DVec3, step: f64, max_steps: usize, bounds: &Bounds) -> Trace
where
    S: VectorSampler + ?Sized,
{
    let mut polyline = Polyline::default();
    let mut pos = start;
    let mut carry = DVec3::ZERO;

    let stop = loop {
        if polyline.len() >= max_steps {
            break StopReason::MaxSteps;
        }
        if !bounds.contains(pos) {
            break StopReason::LeftDomain;
        }
        let v = sampler.sample(pos);
        let magnitude = v.length();
        if magnitude == 0.0 || !magnitude.is_finite() {
            break StopReason::Stagnant;
        }
        polyline.push(pos, magnitude);

        let delta = v / magnitude * step - carry;
        let next = pos + delta;
        carry = (next - pos) - delta;
        pos = next;
    };

    log::trace!("streamline from {start} stopped after {} steps: {stop:?}", polyline.len());
    Trace { polyline, stop }
}

/// Trace every seed independently, in parallel when enabled. Output order matches `seeds`.
pub fn trace_all<S>(
    sampler: &S,
    seeds: &[DVec3],
    step: f64,
    max_steps: usize,
    bounds: &Bounds,
) -> Vec<Trace>
where
    S: VectorSampler,
{
    parallel_iter::map_vec(seeds.to_vec(), |seed| {
        trace(sampler, seed, step, max_steps, bounds)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VectorField3;

    struct Constant(DVec3);

    impl VectorSampler for Constant {
        fn sample(&self, _p: DVec3) -> DVec3 {
            self.0
        }
    }

    #[test]
    fn constant_unit_field_takes_exactly_ten_steps() {
        let field = VectorField3::constant([2, 2, 2], DVec3::X);
        let sampler = TrilinearSampler::new(&field);
        let bounds = Bounds::half_open(DVec3::ZERO, DVec3::ONE);
        let t = trace(&sampler, DVec3::ZERO, 0.1, 1000, &bounds);
        assert_eq!(t.stop, StopReason::LeftDomain);
        assert_eq!(t.polyline.len(), 10);
        assert_eq!(t.polyline.magnitudes.len(), 10);
        assert!(t.polyline.magnitudes.iter().all(|&m| (m - 1.0).abs() < 1e-12));
        assert!((t.polyline.points[9].x - 0.9).abs() < 1e-12);
    }

    #[test]
    fn magnitudes_are_pre_normalization() {
        let sampler = Constant(DVec3::new(0.0, 3.0, 4.0));
        let bounds = Bounds::half_open(DVec3::ZERO, DVec3::splat(10.0));
        let t = trace(&sampler, DVec3::splat(1.0), 0.5, 3, &bounds);
        assert_eq!(t.stop, StopReason::MaxSteps);
        assert_eq!(t.polyline.magnitudes, vec![5.0, 5.0, 5.0]);
        let p = t.polyline.points[2];
        assert!((p.y - (1.0 + 2.0 * 0.5 * 0.6)).abs() < 1e-12);
        assert!((p.z - (1.0 + 2.0 * 0.5 * 0.8)).abs() < 1e-12);
    }

    #[test]
    fn start_outside_bounds_is_never_sampled() {
        struct Panics;
        impl VectorSampler for Panics {
            fn sample(&self, _p: DVec3) -> DVec3 {
                panic!("sampled outside the domain")
            }
        }
        let bounds = Bounds::half_open(DVec3::ZERO, DVec3::ONE);
        let t = trace(&Panics, DVec3::new(1.5, 0.5, 0.5), 0.1, 10, &bounds);
        assert!(t.polyline.is_empty());
        assert_eq!(t.stop, StopReason::LeftDomain);
    }

    #[test]
    fn zero_vector_stops_cleanly() {
        let bounds = Bounds::half_open(DVec3::ZERO, DVec3::ONE);
        let t = trace(&Constant(DVec3::ZERO), DVec3::splat(0.5), 0.1, 10, &bounds);
        assert_eq!(t.stop, StopReason::Stagnant);
        assert!(t.polyline.is_empty());
    }

    #[test]
    fn closed_bounds_include_upper_face() {
        let b = Bounds::of_grid([4, 4, 4]);
        assert!(b.contains(DVec3::splat(3.0)));
        assert!(!b.contains(DVec3::new(3.0, 3.0, 3.0001)));
        assert!(!Bounds::half_open(DVec3::ZERO, DVec3::ONE).contains(DVec3::ONE));
    }

    #[test]
    fn trace_all_keeps_seed_order() {
        let sampler = Constant(DVec3::X);
        let bounds = Bounds::half_open(DVec3::ZERO, DVec3::ONE);
        let seeds = [DVec3::new(0.5, 0.5, 0.5), DVec3::new(0.0, 0.1, 0.1)];
        let traces = trace_all(&sampler, &seeds, 0.1, 100, &bounds);
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].polyline.points[0], seeds[0]);
        assert_eq!(traces[1].polyline.len(), 10);
    }
}
