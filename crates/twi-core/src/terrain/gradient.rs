//! Horn (1981) 3×3 gradient shared by the slope derivation.

use crate::raster::Raster;

/// Horn (1981) weighted 3×3 gradient at cell `(r, c)`.
///
/// Returns `(dz_dx, dz_dy)` as dimensionless rise/run, or `None` when the
/// centre cell is NoData.
///
/// 3×3 neighbourhood layout (row 0 is south, so north is `r + 1`):
/// ```text
///   NW(+1,-1)  N(+1, 0)  NE(+1,+1)
///   W ( 0,-1)  *         E ( 0,+1)
///   SW(-1,-1)  S(-1, 0)  SE(-1,+1)
/// ```
///
/// `dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · cell_size_x)`
/// `dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · cell_size_y)`
///
/// Neighbours that are NoData or fall outside the grid take the centre
/// value, so edge cells get a one-sided estimate.
pub(crate) fn horn_gradient(dem: &Raster, r: usize, c: usize) -> Option<(f64, f64)> {
    let z = dem.get(r, c);
    if !z.is_finite() {
        return None;
    }

    let at = |dr: isize, dc: isize| -> f64 {
        let nr = r as isize + dr;
        let nc = c as isize + dc;
        if nr < 0 || nc < 0 || nr >= dem.height() as isize || nc >= dem.width() as isize {
            return z;
        }
        let v = dem.get(nr as usize, nc as usize);
        if v.is_finite() { v } else { z }
    };

    let nw = at(1, -1);
    let n  = at(1, 0);
    let ne = at(1, 1);
    let w  = at(0, -1);
    let e  = at(0, 1);
    let sw = at(-1, -1);
    let s  = at(-1, 0);
    let se = at(-1, 1);

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * dem.grid.cell_size_x);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * dem.grid.cell_size_y);
    Some((dz_dx, dz_dy))
}
