//! Flow routing over a DEM.
pub mod flow_routing;

pub use flow_routing::{flow_accumulation, flow_direction, FlowDirection};
