//! Raster engine seam: the primitives the TWI engine and DEM selector need.
//!
//! [`NativeEngine`] implements them in-crate; any geospatial backend that can
//! clip, route flow, derive slope and run a focal mean can stand in.

use geo::MultiPolygon;

use crate::clip;
use crate::error::Result;
use crate::hydrology::{self, FlowDirection};
use crate::raster::Raster;
use crate::terrain::{self, SlopeUnit};

pub trait RasterEngine {
    /// Extract `raster` by `mask` (cells outside become NaN).
    fn clip(&self, raster: &Raster, mask: &MultiPolygon<f64>) -> Result<Raster>;

    fn flow_direction(&self, dem: &Raster) -> Result<FlowDirection>;

    fn flow_accumulation(&self, flow_dir: &FlowDirection) -> Result<Raster>;

    fn slope(&self, dem: &Raster, unit: SlopeUnit) -> Result<Raster>;

    /// Square `window`×`window` neighbourhood mean.
    fn focal_mean(&self, raster: &Raster, window: usize) -> Result<Raster>;
}

/// In-crate [`RasterEngine`]: D8 routing, Horn slope, NaN-aware focal mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl RasterEngine for NativeEngine {
    fn clip(&self, raster: &Raster, mask: &MultiPolygon<f64>) -> Result<Raster> {
        clip::clip(raster, mask)
    }

    fn flow_direction(&self, dem: &Raster) -> Result<FlowDirection> {
        hydrology::flow_direction(dem)
    }

    fn flow_accumulation(&self, flow_dir: &FlowDirection) -> Result<Raster> {
        hydrology::flow_accumulation(flow_dir)
    }

    fn slope(&self, dem: &Raster, unit: SlopeUnit) -> Result<Raster> {
        terrain::compute_slope(dem, unit)
    }

    fn focal_mean(&self, raster: &Raster, window: usize) -> Result<Raster> {
        terrain::focal_mean(raster, window)
    }
}
