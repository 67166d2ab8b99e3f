//! Topographic Wetness Index (TWI) from a best-available DEM.
//!
//! The pipeline runs in one direction:
//!
//! ```text
//! AOI ─► select_dem ─► clipped DEM ─► flow routing + slope ─► wetness ─► (focal mean) ─► workspace
//! ```
//!
//! [`selector::select_dem`] picks the high-resolution or baseline elevation
//! source from the AOI's coverage by the high-resolution footprint, and
//! [`twi::compute_twi`] derives and persists the index. [`pipeline::run_pipeline`]
//! strings the two together over an explicit [`config::TwiConfig`].
pub mod clip;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod geometry;
pub mod hydrology;
pub mod io;
pub mod pipeline;
pub mod raster;
pub mod selector;
pub mod terrain;
pub mod twi;
pub mod workspace;

pub use config::TwiConfig;
pub use context::RunContext;
pub use engine::{NativeEngine, RasterEngine};
pub use error::{Result, TwiError};
pub use events::{EventSink, NullSink, PipelineEvent, RecordingSink, Stage, TracingSink};
pub use geometry::{CoveragePercent, PlanarEngine, VectorEngine};
pub use io::{DataSource, FileSource};
pub use pipeline::{run_pipeline, run_pipeline_with, TwiReport};
pub use raster::{GridGeometry, Raster};
pub use selector::{select_dem, Coverage, DemSource, SelectedDem};
pub use twi::{compute_twi, TwiOutput};
pub use workspace::{OutputHandle, ScratchSpace, Workspace};
