//! Extract-by-mask: crop a raster to a polygon mask.

use geo::{BoundingRect, Intersects, MultiPolygon, Point};

use crate::error::{Result, TwiError};
use crate::raster::{GridGeometry, Raster};

/// Crop `raster` to the bounding box of `mask`, snapped outward to the
/// source grid, and set every cell whose centre lies outside `mask` to NaN.
///
/// Cell size and grid alignment are preserved. Fails with
/// [`TwiError::InvalidInput`] when the mask is empty or does not overlap the
/// raster extent.
pub fn clip(raster: &Raster, mask: &MultiPolygon<f64>) -> Result<Raster> {
    let bbox = mask
        .bounding_rect()
        .ok_or_else(|| TwiError::InvalidInput("clip mask has no geometry".into()))?;
    let g = &raster.grid;

    let col_of = |x: f64| (x - g.min_x) / g.cell_size_x;
    let row_of = |y: f64| (y - g.min_y) / g.cell_size_y;
    let c0 = col_of(bbox.min().x).floor().max(0.0) as usize;
    let c1 = (col_of(bbox.max().x).ceil().max(0.0) as usize).min(g.width);
    let r0 = row_of(bbox.min().y).floor().max(0.0) as usize;
    let r1 = (row_of(bbox.max().y).ceil().max(0.0) as usize).min(g.height);

    if c0 >= c1 || r0 >= r1 {
        return Err(TwiError::InvalidInput(format!(
            "mask extent ({:.3}, {:.3})-({:.3}, {:.3}) does not overlap the raster",
            bbox.min().x,
            bbox.min().y,
            bbox.max().x,
            bbox.max().y
        )));
    }

    let out_grid = GridGeometry::new(
        c1 - c0,
        r1 - r0,
        g.min_x + c0 as f64 * g.cell_size_x,
        g.min_y + r0 as f64 * g.cell_size_y,
        g.cell_size_x,
        g.cell_size_y,
    );
    let mut out = Raster::new(out_grid, f64::NAN);

    for r in 0..out_grid.height {
        for c in 0..out_grid.width {
            let (x, y) = out_grid.cell_center(r, c);
            if mask.intersects(&Point::new(x, y)) {
                out.set(r, c, raster.get(r0 + r, c0 + c));
            }
        }
    }

    Ok(out)
}
