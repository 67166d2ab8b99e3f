//! Structured progress events emitted by the pipeline.
//!
//! Library code never prints: it hands [`PipelineEvent`]s to an
//! [`EventSink`]. [`TracingSink`] renders them as `tracing` records.

use std::cell::RefCell;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::selector::{Coverage, DemSource};

/// Pipeline stage markers, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DemSelection,
    FlowRouting,
    Slope,
    Wetness,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A stage is starting.
    StageStarted(Stage),
    /// The selector settled on a source.
    DemSelected {
        source: DemSource,
        coverage: Coverage,
    },
    /// Whether the low-pass filter is applied, with the cell size that decided it.
    Smoothing {
        applied: bool,
        cell_size_x: f64,
        cell_size_y: f64,
    },
    /// Valid DEM cells whose TWI came out NaN or infinite. Not fatal.
    ArithmeticAnomaly {
        non_finite_cells: usize,
        total_cells: usize,
    },
    OutputPersisted {
        name: String,
        path: PathBuf,
    },
    ScratchReleased,
    Completed,
}

/// Receiver of pipeline progress.
pub trait EventSink {
    fn emit(&self, event: &PipelineEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// Renders events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageStarted(Stage::DemSelection) => info!("Clipping DEM to AOI extent"),
            PipelineEvent::StageStarted(Stage::FlowRouting) => {
                info!("Calculating flow direction and accumulation...")
            }
            PipelineEvent::StageStarted(Stage::Slope) => info!("Calculating slope in radians..."),
            PipelineEvent::StageStarted(Stage::Wetness) => info!("Calculating TWI..."),
            PipelineEvent::DemSelected { source, coverage } => match coverage {
                Coverage::None => info!("AOI is not covered by the high-resolution footprint; {source} DEM is used instead"),
                Coverage::Full => info!("AOI is fully covered by the high-resolution footprint; {source} DEM is used"),
                Coverage::Partial(pct) => info!(
                    "AOI is partially ({pct}) covered by the high-resolution footprint; {source} DEM is used anyway"
                ),
            },
            PipelineEvent::Smoothing {
                applied: true,
                cell_size_x,
                cell_size_y,
            } => info!("DEM cell size is {cell_size_x} x {cell_size_y}; a low-pass filter is applied"),
            PipelineEvent::Smoothing {
                applied: false,
                cell_size_x,
                cell_size_y,
            } => info!("DEM cell size is {cell_size_x} x {cell_size_y}; no filter applied"),
            PipelineEvent::ArithmeticAnomaly {
                non_finite_cells,
                total_cells,
            } => warn!(
                non_finite_cells,
                total_cells, "TWI output contains non-finite values; they are kept in the artifact"
            ),
            PipelineEvent::OutputPersisted { name, path } => {
                info!(path = %path.display(), "TWI saved as {name}")
            }
            PipelineEvent::ScratchReleased => info!("Deleting temporary files..."),
            PipelineEvent::Completed => info!("Processing completed"),
        }
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RefCell<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.borrow().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
