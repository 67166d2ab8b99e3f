use serde::{Deserialize, Serialize};

use crate::error::{Result, TwiError};

/// Placement of a regular grid in the DEM's planar coordinate system.
/// Row 0 is the southern-most row; column 0 the western-most column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub width: usize,
    pub height: usize,
    /// West edge of column 0.
    pub min_x: f64,
    /// South edge of row 0.
    pub min_y: f64,
    /// Cell size along X, in the DEM's native linear unit.
    pub cell_size_x: f64,
    /// Cell size along Y, in the DEM's native linear unit.
    pub cell_size_y: f64,
}

impl GridGeometry {
    pub fn new(width: usize, height: usize, min_x: f64, min_y: f64, cell_size_x: f64, cell_size_y: f64) -> Self {
        Self {
            width,
            height,
            min_x,
            min_y,
            cell_size_x,
            cell_size_y,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_x(&self) -> f64 {
        self.min_x + self.width as f64 * self.cell_size_x
    }

    pub fn max_y(&self) -> f64 {
        self.min_y + self.height as f64 * self.cell_size_y
    }

    /// Unit area of one cell: `cell_size_x * cell_size_y`.
    pub fn pixel_area(&self) -> f64 {
        self.cell_size_x * self.cell_size_y
    }

    /// Planar coordinates of the centre of cell `(row, col)`.
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.min_x + (col as f64 + 0.5) * self.cell_size_x,
            self.min_y + (row as f64 + 0.5) * self.cell_size_y,
        )
    }

    fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.cell_size_x) || !positive(self.cell_size_y) {
            return Err(TwiError::InvalidInput(format!(
                "cell size must be positive and finite, got {} x {}",
                self.cell_size_x, self.cell_size_y
            )));
        }
        if !self.min_x.is_finite() || !self.min_y.is_finite() {
            return Err(TwiError::InvalidInput("grid origin must be finite".into()));
        }
        Ok(())
    }
}

/// A single-band raster of f64 values, row-major.
/// NaN marks NoData; other non-finite values are kept as computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    pub grid: GridGeometry,
    /// Row-major cell values. Persisted with non-finite values as `null`.
    #[serde(with = "nodata_values")]
    pub data: Vec<f64>,
}

impl Raster {
    /// Create a raster filled with the given value.
    pub fn new(grid: GridGeometry, fill: f64) -> Self {
        Self {
            data: vec![fill; grid.len()],
            grid,
        }
    }

    /// Wrap existing row-major values. The length must match the grid.
    pub fn from_vec(grid: GridGeometry, data: Vec<f64>) -> Result<Self> {
        grid.validate()?;
        if data.len() != grid.len() {
            return Err(TwiError::InvalidInput(format!(
                "raster of {}x{} cells needs {} values, got {}",
                grid.width,
                grid.height,
                grid.len(),
                data.len()
            )));
        }
        Ok(Self { grid, data })
    }

    /// Check the grid invariants of a raster that came from outside the crate.
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        if self.data.len() != self.grid.len() {
            return Err(TwiError::InvalidInput(format!(
                "raster of {}x{} cells holds {} values",
                self.grid.width,
                self.grid.height,
                self.data.len()
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.grid.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.grid.height
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.grid.width, self.grid.height)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.grid.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[row * self.grid.width + col] = val;
    }

    /// Apply `f` to every cell.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Raster {
        Raster {
            grid: self.grid,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Multiply every cell by `factor`.
    pub fn scale(&self, factor: f64) -> Raster {
        self.map(|v| v * factor)
    }

    /// Combine two co-registered rasters cell by cell.
    pub fn zip_map(&self, other: &Raster, f: impl Fn(f64, f64) -> f64) -> Result<Raster> {
        if self.shape() != other.shape() {
            return Err(TwiError::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        Ok(Raster {
            grid: self.grid,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    /// Number of finite cells.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }

    /// Number of NaN or infinite cells.
    pub fn non_finite_count(&self) -> usize {
        self.data.len() - self.valid_count()
    }

    /// `(min, max)` over finite cells, or `None` when there are none.
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// JSON has no NaN or infinity: NaN (NoData) is written as `null`, and
/// `+∞`/`-∞` as the strings `"inf"`/`"-inf"`, so every value reads back
/// bit for bit.
mod nodata_values {
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    const POS_INF: &str = "inf";
    const NEG_INF: &str = "-inf";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Cell {
        Number(f64),
        Symbol(String),
    }

    pub fn serialize<S: Serializer>(data: &[f64], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(data.len()))?;
        for v in data {
            if v.is_finite() {
                seq.serialize_element(v)?;
            } else if *v == f64::INFINITY {
                seq.serialize_element(POS_INF)?;
            } else if *v == f64::NEG_INFINITY {
                seq.serialize_element(NEG_INF)?;
            } else {
                seq.serialize_element(&None::<f64>)?;
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<f64>, D::Error> {
        let cells: Vec<Option<Cell>> = Vec::deserialize(deserializer)?;
        cells
            .into_iter()
            .map(|cell| match cell {
                None => Ok(f64::NAN),
                Some(Cell::Number(v)) => Ok(v),
                Some(Cell::Symbol(s)) if s == POS_INF => Ok(f64::INFINITY),
                Some(Cell::Symbol(s)) if s == NEG_INF => Ok(f64::NEG_INFINITY),
                Some(Cell::Symbol(s)) => Err(D::Error::custom(format!("unexpected cell value {s:?}"))),
            })
            .collect()
    }
}
