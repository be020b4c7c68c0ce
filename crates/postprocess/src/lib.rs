//! Geometry and dedup math used by the fan-in aggregator: coordinate
//! flattening between buffer spaces, tile-seam pruning, and class-aware NMS.

mod flatten;
mod nms;

pub use flatten::{flatten, is_border_artifact, to_local};
pub use nms::classwise_nms;
