use glam::DVec3;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::field::VectorField3;

/// Anything that can report a flow vector at an arbitrary point.
pub trait VectorSampler: Send + Sync {
    fn sample(&self, p: DVec3) -> DVec3;
}

/// How vectors are looked up between grid nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Trilinear blend on a cartesian grid, positions in grid-index units.
    #[default]
    Trilinear,
    /// Value of the closest node, positions in physical coordinates.
    Nearest,
}

pub struct TrilinearSampler<'a> {
    field: &'a VectorField3,
}

impl<'a> TrilinearSampler<'a> {
    pub fn new(field: &'a VectorField3) -> Self {
        Self { field }
    }
}

impl VectorSampler for TrilinearSampler<'_> {
    fn sample(&self, p: DVec3) -> DVec3 {
        self.field.sample_trilinear(p.to_array())
    }
}

type IndexedPoint = GeomWithData<[f64; 3], usize>;

/// Nearest-node lookup over scattered (curvilinear) node positions.
pub struct NearestSampler {
    tree: RTree<IndexedPoint>,
    vectors: Vec<DVec3>,
}

impl NearestSampler {
    /// `points[n]` carries `vectors[n]`; extra entries of the longer slice are ignored.
    pub fn new(points: &[[f64; 3]], vectors: Vec<DVec3>) -> Self {
        let n = points.len().min(vectors.len());
        let items = points[..n]
            .iter()
            .enumerate()
            .map(|(i, &p)| IndexedPoint::new(p, i))
            .collect();
        Self {
            tree: RTree::bulk_load(items),
            vectors,
        }
    }

    /// Pair canonical-order node coordinates with a vector field on the same grid.
    pub fn from_field(points: &[[f64; 3]], field: &VectorField3) -> Self {
        let vectors = (0..points.len()).map(|i| field.get_flat(i)).collect();
        Self::new(points, vectors)
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl VectorSampler for NearestSampler {
    fn sample(&self, p: DVec3) -> DVec3 {
        self.tree
            .nearest_neighbor(&p.to_array())
            .map(|hit| self.vectors[hit.data])
            .unwrap_or(DVec3::ZERO)
    }
}

/// Either sampler, chosen at runtime from [`Interpolation`].
pub enum FieldSampler<'a> {
    Trilinear(TrilinearSampler<'a>),
    Nearest(NearestSampler),
}

impl<'a> FieldSampler<'a> {
    /// `coordinates` is only consulted for [`Interpolation::Nearest`].
    pub fn new(
        interpolation: Interpolation,
        field: &'a VectorField3,
        coordinates: &[[f64; 3]],
    ) -> Self {
        match interpolation {
            Interpolation::Trilinear => FieldSampler::Trilinear(TrilinearSampler::new(field)),
            Interpolation::Nearest => {
                FieldSampler::Nearest(NearestSampler::from_field(coordinates, field))
            }
        }
    }
}

impl VectorSampler for FieldSampler<'_> {
    fn sample(&self, p: DVec3) -> DVec3 {
        match self {
            FieldSampler::Trilinear(s) => s.sample(p),
            FieldSampler::Nearest(s) => s.sample(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ScalarField3;

    #[test]
    fn trilinear_blends_between_nodes() {
        let x = ScalarField3::from_fn([2, 2, 2], |i, _, _| i as f32 * 2.0);
        let zero = ScalarField3::zeros([2, 2, 2]);
        let v = VectorField3::new(x, zero.clone(), zero).unwrap();
        let s = TrilinearSampler::new(&v);
        assert!((s.sample(DVec3::new(0.25, 0.5, 0.5)).x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn nearest_returns_closest_node_vector() {
        let points = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 5.0, 0.0]];
        let vectors = vec![DVec3::X, DVec3::Y, DVec3::Z];
        let s = NearestSampler::new(&points, vectors);
        assert_eq!(s.len(), 3);
        assert_eq!(s.sample(DVec3::new(7.0, 1.0, 0.0)), DVec3::Y);
        assert_eq!(s.sample(DVec3::new(0.5, 3.0, 0.2)), DVec3::Z);
    }

    #[test]
    fn empty_nearest_sampler_yields_zero() {
        let s = NearestSampler::new(&[], vec![]);
        assert!(s.is_empty());
        assert_eq!(s.sample(DVec3::ONE), DVec3::ZERO);
    }
}
