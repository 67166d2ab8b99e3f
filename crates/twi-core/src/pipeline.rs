//! Pipeline orchestrator: DEM selection, then TWI, over one configuration.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::config::TwiConfig;
use crate::context::RunContext;
use crate::error::{Result, TwiError};
use crate::events::{EventSink, PipelineEvent};
use crate::io::{DataSource, FileSource};
use crate::selector::{select_dem, Coverage, DemSource};
use crate::twi::compute_twi;
use crate::workspace::Workspace;

/// Scratch name of the DEM clipped to the analysis mask.
pub const DEM_ROI: &str = "dem_roi";

// ── Report ────────────────────────────────────────────────────────────────────

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct TwiReport {
    pub source: DemSource,
    pub coverage: Coverage,
    pub coverage_percent: u8,
    /// Artifact name (`p_TWI` or `p_TWI_filtered`).
    pub output_name: String,
    pub output_path: PathBuf,
    pub smoothed: bool,
    pub cell_size_x: f64,
    pub cell_size_y: f64,
    pub pixel_area: f64,
    /// Cells inside the analysis mask.
    pub valid_cells: usize,
    /// Valid cells whose TWI is NaN or infinite.
    pub non_finite_cells: usize,
    /// Finite TWI range, if any cell is finite.
    pub twi_range: Option<(f64, f64)>,
    pub elapsed_ms: u64,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Run the full pipeline against the local filesystem.
pub fn run_pipeline(config: &TwiConfig, events: &dyn EventSink) -> Result<TwiReport> {
    run_pipeline_with(config, events, &FileSource)
}

/// Run the full pipeline, reading datasets through `source`.
///
/// Pipeline order:
///   1. Workspace and scratch space
///   2. AOI
///   3. DEM selection and clip; a copy is staged in scratch as `dem_roi`
///   4. TWI
///   5. Scratch release
///
/// The scratch directory is removed on every path; on an early error it goes
/// when the [`crate::workspace::ScratchSpace`] is dropped.
pub fn run_pipeline_with(config: &TwiConfig, events: &dyn EventSink, source: &dyn DataSource) -> Result<TwiReport> {
    let started = Instant::now();
    config.validate()?;

    // ── 1. Workspace ────────────────────────────────────────────────────────
    let workspace = Workspace::open(&config.workspace)?;
    let scratch = workspace.scratch()?;
    debug!(workspace = %workspace.root().display(), scratch = %scratch.path().display(), "workspace ready");
    let ctx = RunContext::new(config, &workspace, events).with_source(source);

    // ── 2. AOI ──────────────────────────────────────────────────────────────
    let aoi = source.read_vector(&config.aoi).map_err(|e| match e {
        TwiError::DataSourceUnavailable { path, reason } => {
            TwiError::InvalidInput(format!("AOI {} cannot be read: {reason}", path.display()))
        }
        other => other,
    })?;

    // ── 3. DEM selection ────────────────────────────────────────────────────
    let selected = select_dem(&ctx, &aoi)?;
    scratch.put(DEM_ROI, &selected.dem)?;

    // ── 4. TWI ──────────────────────────────────────────────────────────────
    let output = compute_twi(&ctx, &selected.dem)?;

    // ── 5. Cleanup ──────────────────────────────────────────────────────────
    scratch.close()?;
    events.emit(&PipelineEvent::ScratchReleased);
    events.emit(&PipelineEvent::Completed);

    Ok(TwiReport {
        source: selected.source,
        coverage: selected.coverage,
        coverage_percent: selected.coverage.percent(),
        output_name: output.handle.name,
        output_path: output.handle.path,
        smoothed: output.smoothed,
        cell_size_x: output.cell_size_x,
        cell_size_y: output.cell_size_y,
        pixel_area: output.pixel_area,
        valid_cells: selected.dem.valid_count(),
        non_finite_cells: output.non_finite_cells,
        twi_range: output.raster.finite_range(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RecordingSink, Stage};
    use crate::raster::{GridGeometry, Raster};
    use crate::selector::tests::{rect, MemorySource};
    use std::fs;

    fn valley(n: usize, cell: f64) -> Raster {
        let grid = GridGeometry::new(n, n, 0.0, 0.0, cell, cell);
        let mid = (n / 2) as f64;
        let mut dem = Raster::new(grid, 0.0);
        for r in 0..n {
            for c in 0..n {
                dem.set(r, c, 50.0 + (c as f64 - mid).abs() * 0.3 * cell + r as f64 * 0.1 * cell);
            }
        }
        dem
    }

    fn setup(dir: &std::path::Path) -> (TwiConfig, MemorySource) {
        let cfg = TwiConfig::new("aoi", "lidar", "trim", "footprint", dir.join("out"));
        let mut src = MemorySource::default();
        src.rasters.insert("lidar".into(), valley(40, 1.0));
        src.rasters.insert("trim".into(), valley(40, 25.0));
        src.vectors.insert("footprint".into(), rect(0.0, 0.0, 40.0, 40.0));
        (cfg, src)
    }

    fn scratch_dirs(root: &std::path::Path) -> usize {
        fs::read_dir(root)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with(".twi-scratch-"))
            .count()
    }

    #[test]
    fn covered_aoi_runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut src) = setup(dir.path());
        src.vectors.insert("aoi".into(), rect(5.0, 5.0, 35.0, 35.0));
        let sink = RecordingSink::new();

        let report = run_pipeline_with(&cfg, &sink, &src).unwrap();
        assert_eq!(report.source, DemSource::HighResolution);
        assert_eq!(report.coverage_percent, 100);
        assert_eq!(report.output_name, "p_TWI_filtered");
        assert!(report.smoothed);
        assert_eq!(report.valid_cells, 900);
        assert!(report.twi_range.is_some());

        let events = sink.events();
        assert_eq!(events.first(), Some(&PipelineEvent::StageStarted(Stage::DemSelection)));
        assert_eq!(events[events.len() - 2], PipelineEvent::ScratchReleased);
        assert_eq!(events.last(), Some(&PipelineEvent::Completed));
        assert_eq!(scratch_dirs(&cfg.workspace), 0);
    }

    #[test]
    fn missing_aoi_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, src) = setup(dir.path());
        let res = run_pipeline_with(&cfg, &RecordingSink::new(), &src);
        assert!(matches!(res, Err(TwiError::InvalidInput(_))));
        assert_eq!(scratch_dirs(&cfg.workspace), 0);
    }

    #[test]
    fn failure_still_removes_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut src) = setup(dir.path());
        src.vectors.insert("aoi".into(), rect(100.0, 100.0, 200.0, 200.0));
        src.rasters.clear();

        let res = run_pipeline_with(&cfg, &RecordingSink::new(), &src);
        assert!(matches!(res, Err(TwiError::DataSourceUnavailable { .. })));
        assert_eq!(scratch_dirs(&cfg.workspace), 0);
    }

    #[test]
    fn invalid_config_is_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let (mut cfg, src) = setup(dir.path());
        cfg.focal_window = 2;
        let res = run_pipeline_with(&cfg, &RecordingSink::new(), &src);
        assert!(matches!(res, Err(TwiError::Config(_))));
        assert!(!cfg.workspace.exists());
    }

    #[test]
    fn twi_runs_on_the_selected_dem_itself() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut src) = setup(dir.path());
        let lidar = src.rasters[std::path::Path::new("lidar")].map(|v| v + 0.123_456_789_012_345_6);
        src.rasters.insert("lidar".into(), lidar);
        src.vectors.insert("aoi".into(), rect(5.0, 5.0, 35.0, 35.0));

        let report = run_pipeline_with(&cfg, &RecordingSink::new(), &src).unwrap();
        let piped = fs::read(&report.output_path).unwrap();

        let direct_cfg = TwiConfig { workspace: dir.path().join("direct"), ..cfg.clone() };
        let ws = Workspace::open(&direct_cfg.workspace).unwrap();
        let sink = RecordingSink::new();
        let ctx = RunContext::new(&direct_cfg, &ws, &sink).with_source(&src);
        let aoi = src.read_vector(&cfg.aoi).unwrap();
        let selected = select_dem(&ctx, &aoi).unwrap();
        let direct = compute_twi(&ctx, &selected.dem).unwrap();

        assert_eq!(fs::read(&direct.handle.path).unwrap(), piped);
        assert_eq!(report.valid_cells, selected.dem.valid_count());
    }
}
