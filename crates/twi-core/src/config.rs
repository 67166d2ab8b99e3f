//! Run configuration: every dataset location and tuning constant, passed in
//! explicitly rather than read from process-wide state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TwiError};

/// Default cell-size threshold (inclusive) at or below which the TWI is smoothed.
pub const DEFAULT_SMOOTHING_THRESHOLD: f64 = 2.0;
/// Default denominator used instead of `tan(slope)` on flat cells.
pub const DEFAULT_REGULARIZATION: f64 = 0.0001;
/// Default focal mean window (3×3).
pub const DEFAULT_FOCAL_WINDOW: usize = 3;

/// Configuration of one TWI run.
///
/// JSON example:
/// ```json
/// {
///   "aoi": "data/roi_demo.geojson",
///   "high_res_dem": "data/lidar/dem_mosaic.tif",
///   "baseline_dem": "data/trim/bc_elevation_25m.tif",
///   "footprint": "data/lidar/lidar_outline.geojson",
///   "workspace": "out/twi"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwiConfig {
    /// Area of interest (GeoJSON polygons).
    pub aoi: PathBuf,
    /// High-resolution (LIDAR) DEM.
    pub high_res_dem: PathBuf,
    /// Baseline (TRIM) DEM used where the footprint does not reach.
    pub baseline_dem: PathBuf,
    /// Where the high-resolution DEM is valid (GeoJSON polygons).
    pub footprint: PathBuf,
    /// Output workspace directory.
    pub workspace: PathBuf,
    /// Replace an existing output of the same name.
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
    #[serde(default = "default_smoothing_threshold")]
    pub smoothing_threshold: f64,
    #[serde(default = "default_regularization")]
    pub regularization: f64,
    #[serde(default = "default_focal_window")]
    pub focal_window: usize,
}

fn default_overwrite() -> bool {
    true
}

fn default_smoothing_threshold() -> f64 {
    DEFAULT_SMOOTHING_THRESHOLD
}

fn default_regularization() -> f64 {
    DEFAULT_REGULARIZATION
}

fn default_focal_window() -> usize {
    DEFAULT_FOCAL_WINDOW
}

impl TwiConfig {
    /// Configuration with the given datasets and default constants.
    pub fn new(
        aoi: impl Into<PathBuf>,
        high_res_dem: impl Into<PathBuf>,
        baseline_dem: impl Into<PathBuf>,
        footprint: impl Into<PathBuf>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            aoi: aoi.into(),
            high_res_dem: high_res_dem.into(),
            baseline_dem: baseline_dem.into(),
            footprint: footprint.into(),
            workspace: workspace.into(),
            overwrite: default_overwrite(),
            smoothing_threshold: DEFAULT_SMOOTHING_THRESHOLD,
            regularization: DEFAULT_REGULARIZATION,
            focal_window: DEFAULT_FOCAL_WINDOW,
        }
    }

    /// Load and validate a JSON configuration file.
    ///
    /// Relative dataset paths are resolved against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config: TwiConfig = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for p in [
            &mut self.aoi,
            &mut self.high_res_dem,
            &mut self.baseline_dem,
            &mut self.footprint,
            &mut self.workspace,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing_threshold.is_finite() && self.smoothing_threshold > 0.0) {
            return Err(TwiError::Config(format!(
                "smoothing_threshold must be positive, got {}",
                self.smoothing_threshold
            )));
        }
        if !(self.regularization.is_finite() && self.regularization > 0.0) {
            return Err(TwiError::Config(format!(
                "regularization must be positive, got {}",
                self.regularization
            )));
        }
        if self.focal_window == 0 || self.focal_window % 2 == 0 {
            return Err(TwiError::Config(format!(
                "focal_window must be odd, got {}",
                self.focal_window
            )));
        }
        Ok(())
    }
}
