//! Error types for the TWI pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a pipeline run.
///
/// Non-finite cells in the TWI output are not an error: they are reported
/// through [`crate::events::PipelineEvent::ArithmeticAnomaly`] and persisted
/// as-is.
#[derive(Debug, Error)]
pub enum TwiError {
    /// AOI missing, empty, without positive area, or outside the DEM.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A DEM or vector dataset could not be opened or decoded.
    #[error("Data source unavailable: {path}: {reason}")]
    DataSourceUnavailable {
        /// Path of the dataset.
        path: PathBuf,
        /// Why it could not be read.
        reason: String,
    },

    /// Flow routing or slope produced no usable result.
    #[error("Terrain derivation failed: {0}")]
    TerrainDerivation(String),

    /// Two rasters that must be co-registered have different shapes.
    #[error("Raster shape mismatch: expected {expected:?} (width, height), got {actual:?}")]
    ShapeMismatch {
        /// Shape of the reference raster.
        expected: (usize, usize),
        /// Shape of the offending raster.
        actual: (usize, usize),
    },

    /// The output artifact exists and overwriting was not requested.
    #[error("Output {0} already exists and overwrite is disabled")]
    OutputExists(PathBuf),

    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error on the workspace.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TwiError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TwiError::DataSourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for TWI operations.
pub type Result<T> = std::result::Result<T, TwiError>;
