//! Focal (moving window) mean: the low-pass filter applied to fine-resolution TWI.

use crate::error::{Result, TwiError};
use crate::raster::Raster;

/// Mean over a square `window`×`window` neighbourhood centred on each cell.
///
/// NaN cells and cells outside the grid are left out of the window; a cell
/// whose window holds no values at all is NaN. Infinite values are averaged
/// like any other value and therefore propagate.
///
/// `window` must be odd and at least 1.
pub fn focal_mean(raster: &Raster, window: usize) -> Result<Raster> {
    if window == 0 || window % 2 == 0 {
        return Err(TwiError::InvalidInput(format!(
            "focal window must be an odd positive size, got {window}"
        )));
    }
    let radius = (window / 2) as isize;
    let (rows, cols) = (raster.height() as isize, raster.width() as isize);
    let mut out = Raster::new(raster.grid, f64::NAN);

    for r in 0..rows {
        for c in 0..cols {
            let mut sum = 0.0;
            let mut count = 0usize;
            for dr in -radius..=radius {
                for dc in -radius..=radius {
                    let nr = r + dr;
                    let nc = c + dc;
                    if nr < 0 || nc < 0 || nr >= rows || nc >= cols {
                        continue;
                    }
                    let v = raster.get(nr as usize, nc as usize);
                    if v.is_nan() {
                        continue;
                    }
                    sum += v;
                    count += 1;
                }
            }
            if count > 0 {
                out.set(r as usize, c as usize, sum / count as f64);
            }
        }
    }
    Ok(out)
}
