//! Slope raster (Horn method).
//!
//! Computes slope angle at every valid cell using Horn's (1981) 3×3
//! weighted finite-difference gradient:
//!   slope = atan(√(dz_dx² + dz_dy²))
//! reported in degrees or radians. NoData cells stay NaN.
use std::f64::consts::PI;

use crate::error::{Result, TwiError};
use crate::raster::Raster;
use super::gradient::horn_gradient;

/// Angular unit of a slope raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeUnit {
    Degree,
    Radian,
}

/// Derive the slope of `dem` in the requested unit.
///
/// Fails with [`TwiError::TerrainDerivation`] when the DEM has no valid cells.
pub fn compute_slope(dem: &Raster, unit: SlopeUnit) -> Result<Raster> {
    if dem.valid_count() == 0 {
        return Err(TwiError::TerrainDerivation(
            "cannot derive slope: DEM contains no valid elevation cells".into(),
        ));
    }

    let mut out = Raster::new(dem.grid, f64::NAN);
    for r in 0..dem.height() {
        for c in 0..dem.width() {
            let Some((dz_dx, dz_dy)) = horn_gradient(dem, r, c) else {
                continue;
            };
            let slope_rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();
            let value = match unit {
                SlopeUnit::Degree => slope_rad * 180.0 / PI,
                SlopeUnit::Radian => slope_rad,
            };
            out.set(r, c, value);
        }
    }
    Ok(out)
}

/// Convert a slope raster from degrees to radians (`× π/180`).
pub fn degrees_to_radians(slope_deg: &Raster) -> Raster {
    slope_deg.scale(PI / 180.0)
}
