//! Dataset access: DEM rasters and polygon layers by path.
//!
//! Rasters are read from the crate's JSON encoding (`.json`) or from
//! single-band GeoTIFF (`.tif`, `.tiff`). Polygon layers are GeoJSON.
//! Any failure to open or decode surfaces as
//! [`TwiError::DataSourceUnavailable`].

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{GeoJson, Geometry, PolygonType, Value};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{Result, TwiError};
use crate::raster::{GridGeometry, Raster};

// GeoTIFF and GDAL tags are decoded into their named variants, never `Tag::Unknown`.
const TAG_MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const TAG_MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const TAG_GDAL_NODATA: Tag = Tag::GdalNodata;

/// Where DEMs and polygon layers come from.
pub trait DataSource {
    fn read_raster(&self, path: &Path) -> Result<Raster>;

    /// All polygons of the layer, merged into one multipolygon.
    fn read_vector(&self, path: &Path) -> Result<MultiPolygon<f64>>;
}

/// [`DataSource`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl DataSource for FileSource {
    fn read_raster(&self, path: &Path) -> Result<Raster> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let raster = match ext.as_str() {
            "json" => read_json_raster(path)?,
            "tif" | "tiff" => read_geotiff(path)?,
            other => {
                return Err(TwiError::unavailable(
                    path,
                    format!("unsupported raster format {other:?}"),
                ))
            }
        };
        debug!(
            path = %path.display(),
            width = raster.width(),
            height = raster.height(),
            cell_size_x = raster.grid.cell_size_x,
            cell_size_y = raster.grid.cell_size_y,
            "raster loaded"
        );
        Ok(raster)
    }

    fn read_vector(&self, path: &Path) -> Result<MultiPolygon<f64>> {
        let text = fs::read_to_string(path).map_err(|e| TwiError::unavailable(path, e))?;
        let polygons = parse_polygons(&text).map_err(|reason| TwiError::unavailable(path, reason))?;
        debug!(path = %path.display(), features = polygons.0.len(), "polygon layer loaded");
        Ok(polygons)
    }
}

// ── Rasters ──────────────────────────────────────────────────────────────────

fn read_json_raster(path: &Path) -> Result<Raster> {
    let text = fs::read_to_string(path).map_err(|e| TwiError::unavailable(path, e))?;
    let raster: Raster = serde_json::from_str(&text).map_err(|e| TwiError::unavailable(path, e))?;
    raster.validate().map_err(|e| TwiError::unavailable(path, e))?;
    Ok(raster)
}

/// Decode a north-up, single-band GeoTIFF.
///
/// The grid origin comes from ModelTiepoint and the cell size from
/// ModelPixelScale. Cells equal to GDAL_NODATA become NaN. TIFF rows run
/// north to south; they are flipped so row 0 is the southern-most row.
fn read_geotiff(path: &Path) -> Result<Raster> {
    let file = File::open(path).map_err(|e| TwiError::unavailable(path, e))?;
    let fail = |e: tiff::TiffError| TwiError::unavailable(path, e);

    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(fail)?.with_limits(limits);

    let (width, height) = decoder.dimensions().map_err(fail)?;
    let (width, height) = (width as usize, height as usize);

    let tiepoint = decoder.get_tag_f64_vec(TAG_MODEL_TIEPOINT).ok();
    let scale = decoder.get_tag_f64_vec(TAG_MODEL_PIXEL_SCALE).ok();
    let (tiepoint, scale) = match (tiepoint, scale) {
        (Some(t), Some(s)) if t.len() >= 6 && s.len() >= 2 => (t, s),
        _ => {
            return Err(TwiError::unavailable(
                path,
                "missing ModelTiepoint/ModelPixelScale georeferencing tags",
            ))
        }
    };
    // Tiepoint is [i, j, k, x, y, z]: raster (i, j) sits at model (x, y).
    let (cell_size_x, cell_size_y) = (scale[0], scale[1]);
    let min_x = tiepoint[3] - tiepoint[0] * cell_size_x;
    let max_y = tiepoint[4] + tiepoint[1] * cell_size_y;
    let min_y = max_y - height as f64 * cell_size_y;

    let nodata = decoder
        .get_tag_ascii_string(TAG_GDAL_NODATA)
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());

    let values = decode_band(decoder.read_image().map_err(fail)?);
    if values.len() != width * height {
        return Err(TwiError::unavailable(
            path,
            format!(
                "expected one band of {} samples, decoded {}",
                width * height,
                values.len()
            ),
        ));
    }

    let is_nodata = |v: f64| match nodata {
        Some(nd) => v == nd || (v as f32) == (nd as f32),
        None => false,
    };
    let mut data = Vec::with_capacity(values.len());
    for row in values.chunks_exact(width).rev() {
        data.extend(row.iter().map(|&v| if is_nodata(v) { f64::NAN } else { v }));
    }

    let grid = GridGeometry::new(width, height, min_x, min_y, cell_size_x, cell_size_y);
    Raster::from_vec(grid, data).map_err(|e| TwiError::unavailable(path, e))
}

fn decode_band(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::F64(data) => data,
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
    }
}

// ── Polygon layers ───────────────────────────────────────────────────────────

/// Collect every polygon in a GeoJSON document: bare geometries, features
/// and feature collections. Non-polygonal geometries are skipped.
fn parse_polygons(text: &str) -> std::result::Result<MultiPolygon<f64>, String> {
    let gj: GeoJson = text.parse().map_err(|e: geojson::Error| e.to_string())?;
    let mut out = Vec::new();
    match gj {
        GeoJson::Geometry(g) => collect_geometry(&g, &mut out)?,
        GeoJson::Feature(f) => {
            if let Some(g) = &f.geometry {
                collect_geometry(g, &mut out)?;
            }
        }
        GeoJson::FeatureCollection(fc) => {
            for f in &fc.features {
                if let Some(g) = &f.geometry {
                    collect_geometry(g, &mut out)?;
                }
            }
        }
    }
    Ok(MultiPolygon::new(out))
}

fn collect_geometry(geometry: &Geometry, out: &mut Vec<Polygon<f64>>) -> std::result::Result<(), String> {
    match &geometry.value {
        Value::Polygon(rings) => out.push(to_polygon(rings)?),
        Value::MultiPolygon(polys) => {
            for rings in polys {
                out.push(to_polygon(rings)?);
            }
        }
        Value::GeometryCollection(members) => {
            for g in members {
                collect_geometry(g, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn to_polygon(rings: &PolygonType) -> std::result::Result<Polygon<f64>, String> {
    let mut rings = rings.iter().map(|ring| {
        ring.iter()
            .map(|pos| match pos.as_slice() {
                [x, y, ..] => Ok(Coord { x: *x, y: *y }),
                _ => Err(format!("position with {} ordinates", pos.len())),
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(LineString::new)
    });
    let exterior = rings
        .next()
        .ok_or_else(|| "polygon without an exterior ring".to_string())??;
    let interiors = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}
