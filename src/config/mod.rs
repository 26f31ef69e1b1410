//! Recorder configuration stored as TOML in the app root.

mod defaults;
mod io;
mod types;

pub use io::{CONFIG_FILE_NAME, config_path, load_from, load_or_default, save, save_to_path};
pub use types::{AppConfig, ConfigError, RecorderSettings};
