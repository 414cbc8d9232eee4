//! Configuration discovery and loading

use std::path::{Path, PathBuf};

use crate::controller::Courier;

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "COURIER_CONFIG";

/// Locations searched, in order, when `COURIER_CONFIG` is unset
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = [
    "./courier.config.ron",
    "/etc/courier/courier.config.ron",
];

/// Find the configuration file using the following precedence:
/// 1. `COURIER_CONFIG` environment variable
/// 2. ./courier.config.ron (current working directory)
/// 3. /etc/courier/courier.config.ron (system-wide config)
///
/// # Errors
///
/// If `COURIER_CONFIG` names a missing file, or no candidate exists
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    let defaults: Vec<_> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
    resolve_config_file(std::env::var(CONFIG_ENV).ok(), &defaults)
}

pub(crate) fn resolve_config_file(
    explicit: Option<String>,
    default_paths: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(env_path) = explicit {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

/// Read and parse a RON configuration file.
///
/// # Errors
///
/// If the file cannot be read or is not a valid configuration
pub fn load(path: &Path) -> anyhow::Result<Courier> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
    })?;

    ron::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid config in {}: {}", path.display(), e))
}
