//! Library exports for reuse in the binary, benchmarks and tests.
/// Application directory helpers.
pub mod app_dirs;
/// Persistent configuration.
pub mod config;
/// Recorded parking snapshots and their stores.
pub mod history;
/// Position fixes and authorization state.
pub mod location;
/// Logging setup.
pub mod logging;
/// Automatic and manual recording, retention and scheduling.
pub mod recorder;
/// Travel-mode classification and stop detection.
pub mod travel;
