//! Travel-mode inference: speed classification and stop detection.

pub mod detector;
pub mod mode;

pub use detector::{Evaluation, TransitionDetector};
pub use mode::{ModeThresholds, TravelMode, classify, speed_to_kmh};
