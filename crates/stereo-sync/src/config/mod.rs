//! Configuration for stereo-sync
//!
//! - [`SyncConfig`]: timing bounds used by every blocking wait
//! - Generic YAML config loading/saving
//! - Default config location
//!
//! # Usage
//!
//! ```ignore
//! use stereo_sync::config::{load_config, default_config_path, SyncConfig};
//!
//! let config: SyncConfig = load_config(&default_config_path());
//! let registry = stereo_sync::PairRegistry::new(config);
//! ```

mod io;
mod paths;
mod timing;

pub use io::{load_config, save_config};
pub use paths::default_config_path;
pub use timing::SyncConfig;
