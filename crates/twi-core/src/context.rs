//! Everything a run needs, passed explicitly to each stage.

use crate::config::TwiConfig;
use crate::engine::{NativeEngine, RasterEngine};
use crate::events::EventSink;
use crate::geometry::{PlanarEngine, VectorEngine};
use crate::io::{DataSource, FileSource};
use crate::workspace::Workspace;

/// Borrowed run context: configuration, output workspace, event sink and the
/// engines behind the raster, vector and dataset seams.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub config: &'a TwiConfig,
    pub workspace: &'a Workspace,
    pub events: &'a dyn EventSink,
    pub raster: &'a dyn RasterEngine,
    pub vector: &'a dyn VectorEngine,
    pub source: &'a dyn DataSource,
}

impl<'a> RunContext<'a> {
    /// Context over the in-crate engines and the local filesystem.
    pub fn new(config: &'a TwiConfig, workspace: &'a Workspace, events: &'a dyn EventSink) -> Self {
        Self {
            config,
            workspace,
            events,
            raster: &NativeEngine,
            vector: &PlanarEngine,
            source: &FileSource,
        }
    }

    pub fn with_source(self, source: &'a dyn DataSource) -> Self {
        Self { source, ..self }
    }

    pub fn with_raster_engine(self, raster: &'a dyn RasterEngine) -> Self {
        Self { raster, ..self }
    }
}
