//! Topographic Wetness Index.
//!
//! `TWI = ln(((a + 1) · A) / tan(s))` with `a` the upslope cell count from
//! D8 flow accumulation, `A` the pixel area and `s` the slope in radians.
//! Flat cells (`s ≤ 0`) use `ln(((a + 1) · A) / c + tan(s))` with a small
//! regularisation constant `c` in place of the vanishing tangent.
//!
//! Fine DEMs (either cell size at or below the smoothing threshold) are
//! passed through a focal mean before the result is persisted.

use tracing::debug;

use crate::context::RunContext;
use crate::error::Result;
use crate::events::{PipelineEvent, Stage};
use crate::raster::Raster;
use crate::terrain::{slope::degrees_to_radians, SlopeUnit};
use crate::workspace::OutputHandle;

pub use crate::config::{DEFAULT_REGULARIZATION as REGULARIZATION, DEFAULT_SMOOTHING_THRESHOLD as SMOOTHING_THRESHOLD};

/// Artifact name of a smoothed TWI.
pub const FILTERED_OUTPUT: &str = "p_TWI_filtered";
/// Artifact name of an unsmoothed TWI.
pub const UNFILTERED_OUTPUT: &str = "p_TWI";

/// Result of one TWI computation.
#[derive(Debug, Clone)]
pub struct TwiOutput {
    /// The persisted raster (smoothed if `smoothed`).
    pub raster: Raster,
    pub handle: OutputHandle,
    pub smoothed: bool,
    pub pixel_area: f64,
    pub cell_size_x: f64,
    pub cell_size_y: f64,
    /// Cells with a valid elevation but a NaN or infinite TWI.
    pub non_finite_cells: usize,
}

/// Wetness index of a single cell. Exactly one branch is evaluated: a NaN
/// slope is not `> 0` and takes the flat branch, where it propagates.
#[inline]
pub fn wetness_index(flow_acc: f64, pixel_area: f64, slope_rad: f64, regularization: f64) -> f64 {
    let contributing = (flow_acc + 1.0) * pixel_area;
    if slope_rad > 0.0 {
        (contributing / slope_rad.tan()).ln()
    } else {
        (contributing / regularization + slope_rad.tan()).ln()
    }
}

/// `true` when either cell dimension is at or below `threshold`.
pub fn needs_smoothing(cell_size_x: f64, cell_size_y: f64, threshold: f64) -> bool {
    cell_size_x <= threshold || cell_size_y <= threshold
}

/// Per-cell [`wetness_index`] over co-registered accumulation and slope rasters.
pub fn wetness_raster(flow_acc: &Raster, slope_rad: &Raster, pixel_area: f64, regularization: f64) -> Result<Raster> {
    flow_acc.zip_map(slope_rad, |a, s| wetness_index(a, pixel_area, s, regularization))
}

/// Derive the TWI of `dem` and persist it in the run's workspace.
///
/// The focal mean skips NaN but does not re-apply the DEM mask, so in a
/// filtered output every NoData cell that touches a valid cell takes the mean
/// of its valid neighbours. The result carries a one-cell finite halo around
/// the analysis mask; cells farther out stay NaN.
pub fn compute_twi(ctx: &RunContext<'_>, dem: &Raster) -> Result<TwiOutput> {
    let cfg = ctx.config;

    ctx.events.emit(&PipelineEvent::StageStarted(Stage::FlowRouting));
    let flow_dir = ctx.raster.flow_direction(dem)?;
    let flow_acc = ctx.raster.flow_accumulation(&flow_dir)?;

    ctx.events.emit(&PipelineEvent::StageStarted(Stage::Slope));
    let slope_deg = ctx.raster.slope(dem, SlopeUnit::Degree)?;
    let slope_rad = degrees_to_radians(&slope_deg);

    // Cell sizes are taken in the DEM's own linear unit.
    let cell_size_x = dem.grid.cell_size_x;
    let cell_size_y = dem.grid.cell_size_y;
    let pixel_area = dem.grid.pixel_area();
    debug!(cell_size_x, cell_size_y, pixel_area, "pixel geometry");

    ctx.events.emit(&PipelineEvent::StageStarted(Stage::Wetness));
    let twi = wetness_raster(&flow_acc, &slope_rad, pixel_area, cfg.regularization)?;

    let smoothed = needs_smoothing(cell_size_x, cell_size_y, cfg.smoothing_threshold);
    ctx.events.emit(&PipelineEvent::Smoothing {
        applied: smoothed,
        cell_size_x,
        cell_size_y,
    });
    let (raster, name) = if smoothed {
        (ctx.raster.focal_mean(&twi, cfg.focal_window)?, FILTERED_OUTPUT)
    } else {
        (twi, UNFILTERED_OUTPUT)
    };

    let non_finite_cells = dem
        .data
        .iter()
        .zip(&raster.data)
        .filter(|(z, t)| z.is_finite() && !t.is_finite())
        .count();
    if non_finite_cells > 0 {
        ctx.events.emit(&PipelineEvent::ArithmeticAnomaly {
            non_finite_cells,
            total_cells: dem.valid_count(),
        });
    }
    if let Some((lo, hi)) = raster.finite_range() {
        debug!(min = lo, max = hi, "TWI range");
    }

    let handle = ctx.workspace.persist(name, &raster, cfg.overwrite)?;
    ctx.events.emit(&PipelineEvent::OutputPersisted {
        name: handle.name.clone(),
        path: handle.path.clone(),
    });

    Ok(TwiOutput {
        raster,
        handle,
        smoothed,
        pixel_area,
        cell_size_x,
        cell_size_y,
        non_finite_cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::MultiPolygon;
    use std::fs;

    use crate::config::TwiConfig;
    use crate::engine::{NativeEngine, RasterEngine};
    use crate::error::TwiError;
    use crate::events::RecordingSink;
    use crate::hydrology::FlowDirection;
    use crate::raster::GridGeometry;
    use crate::workspace::Workspace;

    /// V-shaped valley draining south: the channel runs down the middle column.
    fn valley(n: usize, cell: f64) -> Raster {
        let grid = GridGeometry::new(n, n, 0.0, 0.0, cell, cell);
        let mid = (n / 2) as f64;
        let mut dem = Raster::new(grid, 0.0);
        for r in 0..n {
            for c in 0..n {
                let z = 100.0 + (c as f64 - mid).abs() * 0.2 * cell + r as f64 * 0.05 * cell;
                dem.set(r, c, z);
            }
        }
        dem
    }

    fn config(dir: &std::path::Path) -> TwiConfig {
        TwiConfig::new("aoi", "lidar", "trim", "footprint", dir)
    }

    #[test]
    fn sloped_branch() {
        let s = 30f64.to_radians();
        let expected = ((4.0 + 1.0) * 625.0 / s.tan()).ln();
        assert_relative_eq!(wetness_index(4.0, 625.0, s, REGULARIZATION), expected);
    }

    #[test]
    fn flat_branch_on_25m_cell() {
        // ln(625 / 0.0001) = ln(6_250_000)
        let twi = wetness_index(0.0, 625.0, 0.0, REGULARIZATION);
        assert_relative_eq!(twi, 6_250_000f64.ln());
        assert_relative_eq!(twi, 15.648, epsilon = 1e-3);
    }

    #[test]
    fn nan_inputs_propagate() {
        assert!(wetness_index(0.0, 1.0, f64::NAN, REGULARIZATION).is_nan());
        assert!(wetness_index(f64::NAN, 1.0, 0.1, REGULARIZATION).is_nan());
    }

    #[test]
    fn smoothing_threshold_is_inclusive() {
        assert!(needs_smoothing(2.0, 2.0, SMOOTHING_THRESHOLD));
        assert!(!needs_smoothing(2.0001, 2.0001, SMOOTHING_THRESHOLD));
        assert!(needs_smoothing(25.0, 1.0, SMOOTHING_THRESHOLD));
        assert!(!needs_smoothing(25.0, 25.0, SMOOTHING_THRESHOLD));
    }

    #[test]
    fn fine_dem_is_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ws = Workspace::open(dir.path()).unwrap();
        let sink = RecordingSink::new();
        let ctx = RunContext::new(&cfg, &ws, &sink);

        let out = compute_twi(&ctx, &valley(15, 1.0)).unwrap();
        assert!(out.smoothed);
        assert_eq!(out.handle.name, FILTERED_OUTPUT);
        assert_eq!(out.handle.path, dir.path().join("p_TWI_filtered.json"));
        assert_relative_eq!(out.pixel_area, 1.0);
        assert_eq!(out.non_finite_cells, 0);
        assert!(ws.exists(FILTERED_OUTPUT));
        assert!(!ws.exists(UNFILTERED_OUTPUT));
    }

    #[test]
    fn coarse_dem_matches_formula_per_cell() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ws = Workspace::open(dir.path()).unwrap();
        let sink = RecordingSink::new();
        let ctx = RunContext::new(&cfg, &ws, &sink);
        let dem = valley(11, 25.0);

        let out = compute_twi(&ctx, &dem).unwrap();
        assert!(!out.smoothed);
        assert_eq!(out.handle.name, UNFILTERED_OUTPUT);
        assert_relative_eq!(out.pixel_area, 625.0);

        let acc = NativeEngine.flow_accumulation(&NativeEngine.flow_direction(&dem).unwrap()).unwrap();
        let slope = degrees_to_radians(&NativeEngine.slope(&dem, SlopeUnit::Degree).unwrap());
        for r in 0..dem.height() {
            for c in 0..dem.width() {
                let expected = wetness_index(acc.get(r, c), 625.0, slope.get(r, c), REGULARIZATION);
                assert_relative_eq!(out.raster.get(r, c), expected);
            }
        }
        // Channel cells gather more water than ridge cells.
        assert!(out.raster.get(0, 5) > out.raster.get(0, 0));
    }

    #[test]
    fn events_in_stage_order() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ws = Workspace::open(dir.path()).unwrap();
        let sink = RecordingSink::new();
        let ctx = RunContext::new(&cfg, &ws, &sink);
        compute_twi(&ctx, &valley(9, 25.0)).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], PipelineEvent::StageStarted(Stage::FlowRouting));
        assert_eq!(events[1], PipelineEvent::StageStarted(Stage::Slope));
        assert_eq!(events[2], PipelineEvent::StageStarted(Stage::Wetness));
        assert_eq!(
            events[3],
            PipelineEvent::Smoothing {
                applied: false,
                cell_size_x: 25.0,
                cell_size_y: 25.0
            }
        );
        assert!(matches!(&events[4], PipelineEvent::OutputPersisted { name, .. } if name == UNFILTERED_OUTPUT));
    }

    #[test]
    fn rerun_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ws = Workspace::open(dir.path()).unwrap();
        let sink = RecordingSink::new();
        let ctx = RunContext::new(&cfg, &ws, &sink);
        let dem = valley(13, 1.0);

        let first = compute_twi(&ctx, &dem).unwrap();
        let bytes_first = fs::read(&first.handle.path).unwrap();
        let second = compute_twi(&ctx, &dem).unwrap();
        let bytes_second = fs::read(&second.handle.path).unwrap();
        assert_eq!(bytes_first, bytes_second);
    }

    #[test]
    fn existing_output_without_overwrite_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.overwrite = false;
        let ws = Workspace::open(dir.path()).unwrap();
        let sink = RecordingSink::new();
        let ctx = RunContext::new(&cfg, &ws, &sink);
        let dem = valley(9, 25.0);

        compute_twi(&ctx, &dem).unwrap();
        assert!(matches!(compute_twi(&ctx, &dem), Err(TwiError::OutputExists(_))));
    }

    #[test]
    fn flat_dem_is_a_terrain_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ws = Workspace::open(dir.path()).unwrap();
        let sink = RecordingSink::new();
        let ctx = RunContext::new(&cfg, &ws, &sink);
        let flat = Raster::new(GridGeometry::new(5, 5, 0.0, 0.0, 25.0, 25.0), 10.0);
        assert!(matches!(compute_twi(&ctx, &flat), Err(TwiError::TerrainDerivation(_))));
        assert!(!ws.exists(UNFILTERED_OUTPUT));
    }

    /// Native engine whose slope is NoData at one valid cell.
    struct HoleySlope;

    impl RasterEngine for HoleySlope {
        fn clip(&self, raster: &Raster, mask: &MultiPolygon<f64>) -> Result<Raster> {
            NativeEngine.clip(raster, mask)
        }
        fn flow_direction(&self, dem: &Raster) -> Result<FlowDirection> {
            NativeEngine.flow_direction(dem)
        }
        fn flow_accumulation(&self, flow_dir: &FlowDirection) -> Result<Raster> {
            NativeEngine.flow_accumulation(flow_dir)
        }
        fn slope(&self, dem: &Raster, unit: SlopeUnit) -> Result<Raster> {
            let mut s = NativeEngine.slope(dem, unit)?;
            s.set(2, 2, f64::NAN);
            Ok(s)
        }
        fn focal_mean(&self, raster: &Raster, window: usize) -> Result<Raster> {
            NativeEngine.focal_mean(raster, window)
        }
    }

    #[test]
    fn non_finite_cells_are_kept_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ws = Workspace::open(dir.path()).unwrap();
        let sink = RecordingSink::new();
        let ctx = RunContext::new(&cfg, &ws, &sink).with_raster_engine(&HoleySlope);

        let out = compute_twi(&ctx, &valley(7, 25.0)).unwrap();
        assert_eq!(out.non_finite_cells, 1);
        assert!(out.raster.get(2, 2).is_nan());
        assert!(sink.events().contains(&PipelineEvent::ArithmeticAnomaly {
            non_finite_cells: 1,
            total_cells: 49
        }));
        assert!(ws.load(UNFILTERED_OUTPUT).unwrap().get(2, 2).is_nan());
    }

    #[test]
    fn filtered_output_grows_a_one_cell_halo() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let ws = Workspace::open(dir.path()).unwrap();
        let sink = RecordingSink::new();
        let ctx = RunContext::new(&cfg, &ws, &sink);
        let mut dem = valley(15, 1.0);
        for r in 0..15 {
            for c in 0..3 {
                dem.set(r, c, f64::NAN);
            }
        }

        let out = compute_twi(&ctx, &dem).unwrap();
        assert!(out.smoothed);
        assert_eq!(out.non_finite_cells, 0);
        for r in 0..15 {
            assert!(out.raster.get(r, 2).is_finite(), "halo cell ({r}, 2)");
            assert!(out.raster.get(r, 1).is_nan(), "outer cell ({r}, 1)");
            assert!(out.raster.get(r, 0).is_nan(), "outer cell ({r}, 0)");
        }
    }
}
