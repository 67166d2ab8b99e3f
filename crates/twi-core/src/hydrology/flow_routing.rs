//! D8 flow direction and accumulation.
//!
//! Direction codes:
//! ```text
//!   4  3  2        (north is up; row 0 is the south edge)
//!   5  0  1
//!   6  7  8
//! ```
//! `0` = sink or flat, `1..=8` = steepest downslope neighbour,
//! [`FlowDirection::NODATA`] = NoData elevation.
use crate::error::{Result, TwiError};
use crate::raster::{GridGeometry, Raster};

/// `(row, col)` offsets for codes 1..=8: E, NE, N, NW, W, SW, S, SE.
/// Rows grow northward.
const D8_OFFSETS: [(isize, isize); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

/// D8 flow direction grid, co-registered with its DEM.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowDirection {
    pub grid: GridGeometry,
    /// Row-major direction codes.
    pub codes: Vec<u8>,
}

impl FlowDirection {
    pub const SINK: u8 = 0;
    pub const NODATA: u8 = 255;

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.codes[row * self.grid.width + col]
    }

    /// Cell receiving the flow of `(row, col)`, if it drains inside the grid.
    pub fn downstream(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        let code = self.get(row, col);
        if code == Self::SINK || code == Self::NODATA {
            return None;
        }
        let (dr, dc) = D8_OFFSETS[(code - 1) as usize];
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= self.grid.height as isize || nc >= self.grid.width as isize {
            return None;
        }
        Some((nr as usize, nc as usize))
    }
}

/// Steepest-descent (D8) direction for every valid cell of `dem`.
///
/// Drop is measured per unit distance, with diagonal distance
/// `√(cell_size_x² + cell_size_y²)`. Ties go to the first code in E, NE, N, …
/// order. Fails with [`TwiError::TerrainDerivation`] when the DEM has no
/// valid cells or no cell drains anywhere.
pub fn flow_direction(dem: &Raster) -> Result<FlowDirection> {
    if dem.valid_count() == 0 {
        return Err(TwiError::TerrainDerivation(
            "cannot route flow: DEM contains no valid elevation cells".into(),
        ));
    }

    let g = dem.grid;
    let diag = g.cell_size_x.hypot(g.cell_size_y);
    let distance = |dr: isize, dc: isize| match (dr, dc) {
        (0, _) => g.cell_size_x,
        (_, 0) => g.cell_size_y,
        _ => diag,
    };

    let (rows, cols) = (g.height as isize, g.width as isize);
    let mut codes = vec![FlowDirection::NODATA; g.len()];
    let mut draining = 0usize;

    for r in 0..rows {
        for c in 0..cols {
            let z = dem.get(r as usize, c as usize);
            if !z.is_finite() {
                continue;
            }

            let mut best_drop = 0.0_f64;
            let mut best = FlowDirection::SINK;
            for (k, &(dr, dc)) in D8_OFFSETS.iter().enumerate() {
                let nr = r + dr;
                let nc = c + dc;
                if nr < 0 || nc < 0 || nr >= rows || nc >= cols {
                    continue;
                }
                let zn = dem.get(nr as usize, nc as usize);
                if !zn.is_finite() {
                    continue;
                }
                let drop = (z - zn) / distance(dr, dc);
                if drop > best_drop {
                    best_drop = drop;
                    best = (k + 1) as u8;
                }
            }

            if best != FlowDirection::SINK {
                draining += 1;
            }
            codes[(r * cols + c) as usize] = best;
        }
    }

    if draining == 0 {
        return Err(TwiError::TerrainDerivation(
            "DEM has no valid drainage: every cell is flat or a sink".into(),
        ));
    }

    Ok(FlowDirection { grid: g, codes })
}

/// Number of upstream cells draining through each cell.
///
/// Topological propagation from headwaters (in-degree 0) downstream: each
/// cell passes its own accumulation plus one to its receiver.
pub fn flow_accumulation(dir: &FlowDirection) -> Result<Raster> {
    let g = dir.grid;
    let mut in_degree = vec![0u32; g.len()];
    for r in 0..g.height {
        for c in 0..g.width {
            if let Some((nr, nc)) = dir.downstream(r, c) {
                in_degree[nr * g.width + nc] += 1;
            }
        }
    }

    let mut acc = vec![0.0_f64; g.len()];
    let mut queue: Vec<(usize, usize)> = (0..g.height)
        .flat_map(|r| (0..g.width).map(move |c| (r, c)))
        .filter(|&(r, c)| in_degree[r * g.width + c] == 0)
        .collect();

    while let Some((r, c)) = queue.pop() {
        let Some((nr, nc)) = dir.downstream(r, c) else {
            continue;
        };
        let i = nr * g.width + nc;
        acc[i] += acc[r * g.width + c] + 1.0;
        in_degree[i] -= 1;
        if in_degree[i] == 0 {
            queue.push((nr, nc));
        }
    }

    for (a, &code) in acc.iter_mut().zip(&dir.codes) {
        if code == FlowDirection::NODATA {
            *a = f64::NAN;
        }
    }

    Raster::from_vec(g, acc)
}
