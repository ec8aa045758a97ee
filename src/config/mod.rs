//! Configuration module for Diligence-RS
//!
//! Handles loading settings from YAML files and environment variables.

mod settings;

pub use settings::*;

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Load settings from the first file found, or use defaults.
///
/// `DILIGENCE_SETTINGS_PATH` is checked first, then `settings.yml`,
/// `config/settings.yml` and the user config directory. Environment
/// overrides are applied in every case.
pub fn load() -> Result<Settings> {
    load_from(None)
}

/// Like [`load`], trying `explicit` before the default locations
pub fn load_from(explicit: Option<&Path>) -> Result<Settings> {
    let mut paths: Vec<PathBuf> = Vec::new();
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("settings file not found: {}", path.display());
        }
        paths.push(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("DILIGENCE_SETTINGS_PATH") {
        paths.push(PathBuf::from(path));
    }
    paths.push(PathBuf::from("settings.yml"));
    paths.push(PathBuf::from("config/settings.yml"));
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("diligence-rs/settings.yml"));
    }

    let mut settings = match paths.iter().find(|p| p.exists()) {
        Some(path) => {
            info!("Loading settings from: {}", path.display());
            Settings::from_file(path)?
        }
        None => {
            info!("No settings file found, using defaults");
            Settings::default()
        }
    };
    settings.merge_env();
    Ok(settings)
}
