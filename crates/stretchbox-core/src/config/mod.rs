//! Processing configuration
//!
//! Everything a run needs besides its inputs: engine choice, quality,
//! factors, block size, fade margin, pre-roll handling and output format.
//! Stored as YAML; absent fields take their defaults.
//!
//! ```yaml
//! engine: signalsmith
//! quality: better
//! time_factor: 1.25
//! pitch_factor: 1.0
//! block_frames: 8192
//! crossfade_margin: 1024
//! preroll: discard
//! output_bit_depth: 24
//! ```

mod io;

pub use io::{load_config, load_config_strict, load_regions, save_config};

use serde::{Deserialize, Serialize};

use crate::engine::{EngineKind, Quality};
use crate::error::{Error, Result};
use crate::latency::PrerollMode;
use crate::orchestrator::RegionOptions;
use crate::postprocess::DEFAULT_CROSSFADE_MARGIN;
use crate::run::RunOptions;
use crate::types::{SampleEncoding, DEFAULT_BLOCK_FRAMES};

/// Settings for one processing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub engine: EngineKind,
    pub quality: Quality,
    pub time_factor: f64,
    pub pitch_factor: f64,
    /// Defaults to 1 / pitch when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formant_factor: Option<f64>,
    pub block_frames: usize,
    pub crossfade_margin: usize,
    pub preroll: PrerollMode,
    /// 8, 16, 24 or 32 (32 writes float); absent keeps each input's encoding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_bit_depth: Option<u16>,
    /// Loop the input instead of ending at its last frame
    pub looping: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            quality: Quality::default(),
            time_factor: 1.0,
            pitch_factor: 1.0,
            formant_factor: None,
            block_frames: DEFAULT_BLOCK_FRAMES,
            crossfade_margin: DEFAULT_CROSSFADE_MARGIN,
            preroll: PrerollMode::Discard,
            output_bit_depth: None,
            looping: false,
        }
    }
}

impl ProcessingConfig {
    pub fn formant(&self) -> f64 {
        self.formant_factor.unwrap_or(1.0 / self.pitch_factor)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("time_factor", self.time_factor),
            ("pitch_factor", self.pitch_factor),
            ("formant_factor", self.formant()),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Configuration(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        if self.block_frames == 0 {
            return Err(Error::Configuration("block_frames must be at least 1".into()));
        }
        self.output_encoding(SampleEncoding::Int16)?;
        Ok(())
    }

    /// Encoding a file sink writes for an input in `input` encoding
    pub fn output_encoding(&self, input: SampleEncoding) -> Result<SampleEncoding> {
        match self.output_bit_depth {
            None => Ok(input),
            Some(32) => Ok(SampleEncoding::Float32),
            Some(bits) => SampleEncoding::from_bit_depth(bits).ok_or_else(|| {
                Error::Configuration(format!("unsupported output bit depth {}", bits))
            }),
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            block_frames: self.block_frames,
            preroll: self.preroll,
            target_frames: None,
        }
    }

    pub fn region_options(&self) -> RegionOptions {
        RegionOptions {
            block_frames: self.block_frames,
            crossfade_margin: self.crossfade_margin,
        }
    }
}
