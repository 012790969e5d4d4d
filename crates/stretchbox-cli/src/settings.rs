//! Effective settings: YAML file first, command-line flags on top
//!
//! A file named with `--config` must load. Without it, `stretchbox.yaml` in
//! the working directory is used when present, and defaults otherwise.

use std::path::Path;

use anyhow::Result;
use stretchbox_core::config::{load_config, load_config_strict, ProcessingConfig};
use stretchbox_core::engine::Quality;

use crate::EngineArgs;

/// Settings picked up without `--config`
pub const DEFAULT_SETTINGS_FILE: &str = "stretchbox.yaml";

/// Load the settings file the user named, else `fallback` leniently
pub fn load(path: Option<&Path>, fallback: &Path) -> Result<ProcessingConfig> {
    match path {
        Some(path) => load_config_strict(path),
        None => Ok(load_config(fallback)),
    }
}

/// Overlay the engine flags that were given
pub fn apply_engine_args(mut config: ProcessingConfig, args: &EngineArgs) -> ProcessingConfig {
    if let Some(engine) = args.engine {
        config.engine = engine;
    }
    if let Some(quality) = args.quality.and_then(Quality::from_level) {
        config.quality = quality;
    }
    if let Some(block) = args.block {
        config.block_frames = block;
    }
    if let Some(bits) = args.bit_depth {
        config.output_bit_depth = Some(bits);
    }
    config
}
