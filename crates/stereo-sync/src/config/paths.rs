//! Path utilities for stereo-sync configuration files

use std::path::PathBuf;

/// Get the default config file path
///
/// Returns: `{config dir}/stereo-sync/config.yaml`, falling back to the
/// working directory when the platform has no config dir.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stereo-sync")
        .join("config.yaml")
}
