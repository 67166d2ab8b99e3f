//! Planar vector operations used for the coverage decision.

use geo::{Area, BooleanOps, Contains, Intersects, MultiPolygon};
use serde::{Deserialize, Serialize};

/// Geometry intersection and area over polygon datasets.
pub trait VectorEngine {
    /// Total planar area, summed feature by feature.
    fn area(&self, geom: &MultiPolygon<f64>) -> f64;

    /// Intersection of every feature of `a` with `b`.
    fn intersection(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64>;
}

/// [`VectorEngine`] backed by the `geo` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarEngine;

impl VectorEngine for PlanarEngine {
    fn area(&self, geom: &MultiPolygon<f64>) -> f64 {
        geom.0.iter().map(|p| p.unsigned_area()).sum()
    }

    /// Features inside `b` are kept as-is and features disjoint from `b`
    /// are dropped, so only straddling features go through the boolean
    /// overlay and pick up its rounding.
    fn intersection(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        // Per feature, so overlapping AOI features are each clipped on their own.
        let parts = a
            .0
            .iter()
            .flat_map(|feature| {
                if b.contains(feature) {
                    vec![feature.clone()]
                } else if !b.intersects(feature) {
                    Vec::new()
                } else {
                    MultiPolygon::new(vec![feature.clone()]).intersection(b).0
                }
            })
            .collect();
        MultiPolygon::new(parts)
    }
}

/// Distance (in percentage points) within which a ratio is taken to sit on
/// a whole percentage before truncation.
const SNAP_TOLERANCE: f64 = 1e-6;

/// Share of the AOI covered by the high-resolution footprint, as a truncated
/// integer percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoveragePercent(u8);

impl CoveragePercent {
    pub const NONE: CoveragePercent = CoveragePercent(0);
    pub const FULL: CoveragePercent = CoveragePercent(100);

    /// `floor(covered / total * 100)`, clamped to `0..=100`.
    ///
    /// A ratio of 0.999 is 99, not 100. Ratios within [`SNAP_TOLERANCE`] of a
    /// whole percentage are snapped to it first, so overlay noise on either
    /// side of 50 % or 100 % does not move the result by one.
    pub fn from_areas(covered: f64, total: f64) -> Self {
        let raw = covered / total * 100.0;
        let nearest = raw.round();
        let pct = if (raw - nearest).abs() <= SNAP_TOLERANCE { nearest } else { raw.floor() };
        if pct.is_nan() || pct <= 0.0 {
            Self::NONE
        } else if pct >= 100.0 {
            Self::FULL
        } else {
            CoveragePercent(pct as u8)
        }
    }

    /// Clamp an arbitrary integer into range.
    pub fn new(pct: u8) -> Self {
        CoveragePercent(pct.min(100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for CoveragePercent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{LineString, Polygon, Rect};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Rect::new((x0, y0), (x1, y1)).to_polygon()])
    }

    #[test]
    fn area_sums_features() {
        let mut mp = square(0.0, 0.0, 10.0, 10.0);
        mp.0.extend(square(20.0, 0.0, 25.0, 4.0).0);
        assert_relative_eq!(PlanarEngine.area(&mp), 120.0);
    }

    #[test]
    fn intersection_of_overlapping_squares() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        let b = square(5.0, 0.0, 20.0, 10.0);
        let i = PlanarEngine.intersection(&a, &b);
        assert_relative_eq!(PlanarEngine.area(&i), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn intersection_of_disjoint_squares_is_empty() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        let b = square(50.0, 50.0, 60.0, 60.0);
        let i = PlanarEngine.intersection(&a, &b);
        assert_eq!(PlanarEngine.area(&i), 0.0);
    }

    #[test]
    fn coverage_truncates() {
        assert_eq!(CoveragePercent::from_areas(999.0, 1000.0).value(), 99);
        assert_eq!(CoveragePercent::from_areas(9.99, 1000.0).value(), 0);
        assert_eq!(CoveragePercent::from_areas(1000.0, 1000.0).value(), 100);
        assert_eq!(CoveragePercent::from_areas(0.0, 1000.0).value(), 0);
    }

    /// Heptagon with uneven radii, rotated by `turn` radians about `(cx, cy)`.
    fn heptagon(cx: f64, cy: f64, radius: f64, turn: f64) -> MultiPolygon<f64> {
        let ring: Vec<(f64, f64)> = (0..=7)
            .map(|k| {
                let k = k % 7;
                let a = turn + k as f64 * std::f64::consts::TAU / 7.0;
                let r = radius * (0.7 + 0.05 * k as f64);
                (cx + r * a.cos(), cy + r * a.sin())
            })
            .collect();
        MultiPolygon::new(vec![Polygon::new(LineString::from(ring), vec![])])
    }

    #[test]
    fn irregular_aoi_inside_footprint_is_fully_covered() {
        let footprint = square(0.0, 0.0, 10_000.0, 10_000.0);
        for i in 0..200 {
            let turn = i as f64 * 0.0731;
            let cx = 2_000.0 + (i as f64 * 37.3) % 6_000.0;
            let cy = 2_500.0 + (i as f64 * 53.9) % 5_000.0;
            let aoi = heptagon(cx, cy, 1_000.0 + i as f64 * 1.7, turn);
            let covered = PlanarEngine.area(&PlanarEngine.intersection(&aoi, &footprint));
            let total = PlanarEngine.area(&aoi);
            assert_eq!(covered, total, "aoi #{i}");
            assert_eq!(CoveragePercent::from_areas(covered, total), CoveragePercent::FULL, "aoi #{i}");
        }
    }

    #[test]
    fn overlay_noise_snaps_to_whole_percent() {
        assert_eq!(CoveragePercent::from_areas(3_336_573.437_351_339_5, 3_336_573.451_273_896_7).value(), 100);
        assert_eq!(CoveragePercent::from_areas(49.999_999_99, 100.0).value(), 50);
        assert_eq!(CoveragePercent::from_areas(999.000_000_953_674_3, 1000.0).value(), 99);
        assert_eq!(CoveragePercent::from_areas(99.99, 100.0).value(), 99);
    }

    #[test]
    fn straddling_feature_is_overlaid() {
        let mut aoi = square(0.0, 0.0, 10.0, 10.0);
        aoi.0.extend(square(100.0, 100.0, 110.0, 110.0).0);
        let fp = square(5.0, -5.0, 50.0, 50.0);
        let i = PlanarEngine.intersection(&aoi, &fp);
        assert_eq!(i.0.len(), 1);
        assert_relative_eq!(PlanarEngine.area(&i), 50.0, epsilon = 1e-6);
    }

    #[test]
    fn coverage_clamps_to_range() {
        assert_eq!(CoveragePercent::from_areas(1000.5, 1000.0), CoveragePercent::FULL);
        assert_eq!(CoveragePercent::from_areas(-1.0, 1000.0), CoveragePercent::NONE);
        assert_eq!(CoveragePercent::new(250).value(), 100);
        assert_eq!(CoveragePercent::new(42).to_string(), "42%");
    }
}
