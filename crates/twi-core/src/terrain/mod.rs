//! Local terrain derivatives: Horn gradient, slope, focal statistics.
mod gradient;
pub mod focal;
pub mod slope;

pub use focal::focal_mean;
pub use slope::{compute_slope, SlopeUnit};
