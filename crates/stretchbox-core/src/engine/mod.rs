//! Time-stretch engine abstraction
//!
//! Engines are opaque pull-model processors: the caller asks for N output
//! frames and the engine calls back into a [`PullCallback`] for however many
//! input frames it needs, in strictly sequential order and synchronously on
//! the calling thread. Internally the engine may have any latency; a fresh or
//! reset engine produces that many frames of startup output before aligned
//! audio appears.
//!
//! Backends are chosen through [`EngineBackend`] so the offline runner, the
//! region orchestrator and the realtime driver are independent of the DSP.

#[cfg(test)]
pub(crate) mod delay;
mod handle;
#[cfg(feature = "signalsmith")]
mod signalsmith;
mod varispeed;

pub use handle::EngineHandle;
#[cfg(feature = "signalsmith")]
pub use signalsmith::{SignalsmithBackend, SignalsmithEngine};
pub use varispeed::{VarispeedBackend, VarispeedEngine};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::AudioBuffer;

/// Processing quality, traded against CPU cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Preview,
    #[default]
    Good,
    Better,
    Best,
}

impl Quality {
    pub const ALL: [Quality; 4] = [Quality::Preview, Quality::Good, Quality::Better, Quality::Best];

    /// Quality from a numeric level 0 (preview) to 3 (best)
    pub fn from_level(level: u8) -> Option<Self> {
        Self::ALL.get(level as usize).copied()
    }

    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Quality::Preview => "preview",
            Quality::Good => "good",
            Quality::Better => "better",
            Quality::Best => "best",
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime-settable engine parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineProperty {
    /// Output duration / input duration (2.0 = twice as long)
    TimeFactor,
    /// Frequency multiplier (2.0 = one octave up)
    PitchFactor,
    /// Spectral envelope multiplier, conventionally 1 / pitch
    FormantFactor,
}

impl EngineProperty {
    pub fn name(&self) -> &'static str {
        match self {
            EngineProperty::TimeFactor => "time factor",
            EngineProperty::PitchFactor => "pitch factor",
            EngineProperty::FormantFactor => "formant factor",
        }
    }
}

/// Supplies input frames to an engine on demand
///
/// `pull` must write up to `frames` frames into `dest` starting at frame 0
/// and return how many were written. Zero means end of input; `Err` is a
/// fatal I/O failure. Implementors see requests in strictly sequential order.
pub trait PullCallback: Send {
    fn pull(&mut self, dest: &mut AudioBuffer, frames: usize) -> Result<usize>;
}

impl<F> PullCallback for F
where
    F: FnMut(&mut AudioBuffer, usize) -> Result<usize> + Send,
{
    fn pull(&mut self, dest: &mut AudioBuffer, frames: usize) -> Result<usize> {
        self(dest, frames)
    }
}

/// A live engine instance
pub trait StretchEngine: Send {
    fn channels(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Set a property; values take effect on the next `process` call
    fn set_property(&mut self, property: EngineProperty, value: f64);

    fn property(&self, property: EngineProperty) -> f64;

    /// Produce `frames` output frames into `output[0..frames]`
    ///
    /// Returns the number of frames produced. A count below `frames` (down to
    /// zero) means the input has ended and the internal pipeline is drained.
    fn process(
        &mut self,
        output: &mut AudioBuffer,
        frames: usize,
        pull: &mut dyn PullCallback,
    ) -> Result<usize>;

    /// Clear internal state
    ///
    /// With `flush_only` the parameter set survives; otherwise the engine
    /// also returns to unit factors.
    fn reset(&mut self, flush_only: bool);

    /// Frames of startup output before aligned audio appears
    fn latency_frames(&self) -> usize;
}

/// Factory for engines of one kind
pub trait EngineBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create an engine; unsupported channel counts or rates are a
    /// [`Error::Configuration`]
    fn create(&self, quality: Quality, channels: usize, sample_rate: u32) -> Result<Box<dyn StretchEngine>>;

    /// Latency an engine created with these settings would report
    fn latency_frames(&self, quality: Quality, sample_rate: u32) -> usize;
}

/// Engine implementations selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Phase-vocoder stretcher (signalsmith-stretch)
    Signalsmith,
    /// Resampling playback: time and pitch change together
    Varispeed,
}

impl Default for EngineKind {
    fn default() -> Self {
        if cfg!(feature = "signalsmith") {
            EngineKind::Signalsmith
        } else {
            EngineKind::Varispeed
        }
    }
}

impl EngineKind {
    pub fn backend(&self) -> Result<Box<dyn EngineBackend>> {
        match self {
            #[cfg(feature = "signalsmith")]
            EngineKind::Signalsmith => Ok(Box::new(SignalsmithBackend)),
            #[cfg(not(feature = "signalsmith"))]
            EngineKind::Signalsmith => Err(Error::Configuration(
                "built without the signalsmith engine".into(),
            )),
            EngineKind::Varispeed => Ok(Box::new(VarispeedBackend)),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "signalsmith" => Ok(EngineKind::Signalsmith),
            "varispeed" => Ok(EngineKind::Varispeed),
            other => Err(Error::Configuration(format!("unknown engine '{}'", other))),
        }
    }
}

/// Reject non-finite or non-positive factors
pub(crate) fn check_factor(property: EngineProperty, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::Configuration(format!(
            "{} must be positive and finite, got {}",
            property.name(),
            value
        )))
    }
}

/// Reject channel counts and rates no engine can run with
pub(crate) fn check_layout(channels: usize, sample_rate: u32) -> Result<()> {
    if channels == 0 {
        return Err(Error::Configuration("engine needs at least one channel".into()));
    }
    if !(8_000..=384_000).contains(&sample_rate) {
        return Err(Error::Configuration(format!(
            "sample rate {} Hz is outside 8000..=384000",
            sample_rate
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_levels() {
        assert_eq!(Quality::from_level(0), Some(Quality::Preview));
        assert_eq!(Quality::from_level(3), Some(Quality::Best));
        assert_eq!(Quality::from_level(4), None);
        assert!(Quality::Best > Quality::Good);
        assert_eq!(Quality::Better.level(), 2);
    }

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!("Varispeed".parse::<EngineKind>().unwrap(), EngineKind::Varispeed);
        assert!("rubberband".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_factor_validation() {
        assert!(check_factor(EngineProperty::TimeFactor, 1.5).is_ok());
        assert!(check_factor(EngineProperty::TimeFactor, 0.0).is_err());
        assert!(check_factor(EngineProperty::PitchFactor, f64::NAN).is_err());
    }

    #[test]
    fn test_layout_validation() {
        assert!(check_layout(2, 44100).is_ok());
        assert!(matches!(check_layout(0, 44100), Err(Error::Configuration(_))));
        assert!(check_layout(2, 1000).is_err());
    }

    #[test]
    fn test_closure_pull() {
        let mut calls = 0;
        let mut pull = |dest: &mut AudioBuffer, frames: usize| -> Result<usize> {
            calls += 1;
            dest.silence_range(0, frames);
            Ok(frames)
        };
        let mut dest = AudioBuffer::silence(1, 4);
        assert_eq!(PullCallback::pull(&mut pull, &mut dest, 4).unwrap(), 4);
        assert_eq!(calls, 1);
    }
}
