//! YAML configuration I/O
//!
//! Generic loading and saving for any serializable settings type, plus the
//! region list loader.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::region::{parse_regions, Region};

/// Load configuration from a YAML file, falling back to defaults
///
/// A missing or unparsable file logs and yields `T::default()`. Use
/// [`load_config_strict`] when the user named the file explicitly.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return T::default();
    }

    match load_config_strict(path) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("load_config: {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Load configuration from a YAML file, failing on any read or parse error
pub fn load_config_strict<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config = serde_yaml::from_str::<T>(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    log::info!("load_config: Successfully loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Config saved successfully");
    Ok(())
}

/// Load a region list (see [`parse_regions`] for the format)
pub fn load_regions(path: &Path) -> Result<Vec<Region>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read region list: {:?}", path))?;
    let regions = parse_regions(&contents)
        .with_context(|| format!("Failed to parse region list: {:?}", path))?;
    log::info!("Loaded {} regions from {:?}", regions.len(), path);
    Ok(regions)
}
