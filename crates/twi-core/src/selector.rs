//! DEM selection by high-resolution coverage of the AOI.
//!
//! The AOI's coverage by the high-resolution footprint is truncated to an
//! integer percentage. At 0 % the baseline DEM is clipped by the AOI; at any
//! positive coverage the high-resolution DEM is clipped by the AOI ∩ footprint
//! intersection, so uncovered parts of a partially covered AOI are left out.

use std::fmt;

use geo::MultiPolygon;
use serde::Serialize;
use tracing::debug;

use crate::context::RunContext;
use crate::error::{Result, TwiError};
use crate::events::{PipelineEvent, Stage};
use crate::geometry::{CoveragePercent, VectorEngine};
use crate::raster::Raster;

/// Which elevation dataset a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DemSource {
    /// LIDAR-derived DEM, valid only inside the footprint.
    HighResolution,
    /// Province-wide coarse DEM (TRIM).
    Baseline,
}

impl fmt::Display for DemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemSource::HighResolution => f.write_str("high-resolution"),
            DemSource::Baseline => f.write_str("baseline"),
        }
    }
}

/// Coverage class of the AOI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    None,
    /// Strictly between 0 and 100 %.
    Partial(CoveragePercent),
    Full,
}

impl Coverage {
    pub fn from_percent(pct: CoveragePercent) -> Self {
        match pct.value() {
            0 => Coverage::None,
            100 => Coverage::Full,
            _ => Coverage::Partial(pct),
        }
    }

    pub fn percent(self) -> u8 {
        match self {
            Coverage::None => 0,
            Coverage::Partial(p) => p.value(),
            Coverage::Full => 100,
        }
    }

    /// The DEM this coverage class selects.
    pub fn source(self) -> DemSource {
        match self {
            Coverage::None => DemSource::Baseline,
            Coverage::Partial(_) | Coverage::Full => DemSource::HighResolution,
        }
    }
}

/// DEM clipped to the analysis mask, with the decision that produced it.
#[derive(Debug, Clone)]
pub struct SelectedDem {
    pub source: DemSource,
    pub coverage: Coverage,
    pub dem: Raster,
}

/// Areas behind a coverage decision.
#[derive(Debug, Clone)]
pub struct CoverageAssessment {
    pub aoi_area: f64,
    pub covered_area: f64,
    pub percent: CoveragePercent,
    /// AOI ∩ footprint, feature by feature.
    pub intersection: MultiPolygon<f64>,
}

/// Measure how much of `aoi` the `footprint` covers.
///
/// Fails with [`TwiError::InvalidInput`] when the AOI has no features or its
/// area is not a positive finite number.
pub fn assess_coverage(
    vector: &dyn VectorEngine,
    aoi: &MultiPolygon<f64>,
    footprint: &MultiPolygon<f64>,
) -> Result<CoverageAssessment> {
    let aoi_area = check_aoi(vector, aoi)?;

    let intersection = vector.intersection(aoi, footprint);
    let covered_area = vector.area(&intersection);
    let percent = CoveragePercent::from_areas(covered_area, aoi_area);
    debug!(aoi_area, covered_area, percent = percent.value(), "coverage assessed");

    Ok(CoverageAssessment {
        aoi_area,
        covered_area,
        percent,
        intersection,
    })
}

/// Area of a usable AOI: at least one feature and a positive finite area.
fn check_aoi(vector: &dyn VectorEngine, aoi: &MultiPolygon<f64>) -> Result<f64> {
    if aoi.0.is_empty() {
        return Err(TwiError::InvalidInput("AOI has no features".into()));
    }
    let aoi_area = vector.area(aoi);
    if !(aoi_area.is_finite() && aoi_area > 0.0) {
        return Err(TwiError::InvalidInput(format!(
            "AOI area must be positive, got {aoi_area}"
        )));
    }
    Ok(aoi_area)
}

/// Pick and clip the DEM for `aoi`.
///
/// Reads the footprint and the chosen DEM through `ctx.source`, clips through
/// `ctx.raster` and emits [`PipelineEvent::DemSelected`]. The AOI is
/// checked before any dataset is opened.
pub fn select_dem(ctx: &RunContext<'_>, aoi: &MultiPolygon<f64>) -> Result<SelectedDem> {
    ctx.events.emit(&PipelineEvent::StageStarted(Stage::DemSelection));
    check_aoi(ctx.vector, aoi)?;

    let footprint = ctx.source.read_vector(&ctx.config.footprint)?;
    let assessment = assess_coverage(ctx.vector, aoi, &footprint)?;
    let coverage = Coverage::from_percent(assessment.percent);
    let source = coverage.source();

    let (path, mask) = match source {
        DemSource::Baseline => (&ctx.config.baseline_dem, aoi),
        DemSource::HighResolution => (&ctx.config.high_res_dem, &assessment.intersection),
    };
    let dem = ctx.source.read_raster(path)?;
    let clipped = ctx.raster.clip(&dem, mask)?;
    debug!(
        %source,
        path = %path.display(),
        width = clipped.width(),
        height = clipped.height(),
        valid_cells = clipped.valid_count(),
        "DEM clipped to analysis mask"
    );

    ctx.events.emit(&PipelineEvent::DemSelected { source, coverage });
    Ok(SelectedDem {
        source,
        coverage,
        dem: clipped,
    })
}
