//! Signalsmith engine
//!
//! Wraps signalsmith-stretch, which is push-based (the caller hands it an
//! input block and an output block and the size ratio sets the stretch), in
//! the pull model: each `process` call works out how many input frames the
//! requested output corresponds to and pulls exactly that many.

use signalsmith_stretch::Stretch;

use super::{check_layout, EngineBackend, EngineProperty, PullCallback, Quality, StretchEngine};
use crate::error::Result;
use crate::types::AudioBuffer;

/// Backend for [`SignalsmithEngine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalsmithBackend;

impl EngineBackend for SignalsmithBackend {
    fn name(&self) -> &'static str {
        "signalsmith"
    }

    fn create(&self, quality: Quality, channels: usize, sample_rate: u32) -> Result<Box<dyn StretchEngine>> {
        check_layout(channels, sample_rate)?;
        Ok(Box::new(SignalsmithEngine::new(quality, channels, sample_rate)))
    }

    fn latency_frames(&self, quality: Quality, sample_rate: u32) -> usize {
        let stretcher = preset(quality, 1, sample_rate);
        stretcher.input_latency() + stretcher.output_latency()
    }
}

/// Preview and Good use the cheaper preset (30-50% faster)
fn preset(quality: Quality, channels: usize, sample_rate: u32) -> Stretch {
    match quality {
        Quality::Preview | Quality::Good => Stretch::preset_cheaper(channels as u32, sample_rate),
        Quality::Better | Quality::Best => Stretch::preset_default(channels as u32, sample_rate),
    }
}

/// Phase-vocoder time stretcher with independent pitch
pub struct SignalsmithEngine {
    stretcher: Stretch,
    quality: Quality,
    channels: usize,
    sample_rate: u32,
    time_factor: f64,
    pitch_factor: f64,
    formant_factor: f64,
    /// Fractional input frames carried between calls
    input_carry: f64,
    /// Silence still to feed after input ends, to drain the pipeline
    drain_remaining: Option<usize>,
    input: AudioBuffer,
    input_interleaved: Vec<f32>,
    output_interleaved: Vec<f32>,
    warned_formant: bool,
}

impl SignalsmithEngine {
    pub fn new(quality: Quality, channels: usize, sample_rate: u32) -> Self {
        Self {
            stretcher: preset(quality, channels, sample_rate),
            quality,
            channels,
            sample_rate,
            time_factor: 1.0,
            pitch_factor: 1.0,
            formant_factor: 1.0,
            input_carry: 0.0,
            drain_remaining: None,
            input: AudioBuffer::silence(channels, 0),
            input_interleaved: Vec::new(),
            output_interleaved: Vec::new(),
            warned_formant: false,
        }
    }

    /// Input frames corresponding to `frames` output frames at the current factor
    fn input_frames_for(&mut self, frames: usize) -> usize {
        let exact = frames as f64 / self.time_factor + self.input_carry;
        let whole = exact.floor();
        self.input_carry = exact - whole;
        whole as usize
    }

    fn apply_pitch(&mut self) {
        let semitones = 12.0 * self.pitch_factor.log2();
        self.stretcher
            .set_transpose_factor_semitones(semitones as f32, None);
    }
}

impl StretchEngine for SignalsmithEngine {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_property(&mut self, property: EngineProperty, value: f64) {
        match property {
            EngineProperty::TimeFactor => self.time_factor = value,
            EngineProperty::PitchFactor => {
                self.pitch_factor = value;
                self.apply_pitch();
            }
            EngineProperty::FormantFactor => {
                if (value - 1.0 / self.pitch_factor).abs() > 1e-9 && !self.warned_formant {
                    log::warn!(
                        "Signalsmith engine keeps formants tied to pitch; formant factor {} ignored",
                        value
                    );
                    self.warned_formant = true;
                }
                self.formant_factor = value;
            }
        }
    }

    fn property(&self, property: EngineProperty) -> f64 {
        match property {
            EngineProperty::TimeFactor => self.time_factor,
            EngineProperty::PitchFactor => self.pitch_factor,
            EngineProperty::FormantFactor => self.formant_factor,
        }
    }

    fn process(
        &mut self,
        output: &mut AudioBuffer,
        frames: usize,
        pull: &mut dyn PullCallback,
    ) -> Result<usize> {
        if frames == 0 || self.drain_remaining == Some(0) {
            return Ok(0);
        }

        let wanted = self.input_frames_for(frames);
        if self.input.len() < wanted {
            self.input.resize(wanted);
        }

        let got = if self.drain_remaining.is_some() {
            0
        } else {
            pull.pull(&mut self.input, wanted)?.min(wanted)
        };
        if got < wanted {
            self.input.silence_range(got, wanted - got);
            if self.drain_remaining.is_none() {
                log::debug!("Signalsmith input ended, draining {} frames", self.latency_frames());
                self.drain_remaining = Some(self.latency_frames());
            }
        }

        // Frames of real input or pending tail this call carries
        let mut produced = frames;
        if let Some(remaining) = self.drain_remaining.as_mut() {
            let tail = ((*remaining + got) as f64 * self.time_factor).ceil() as usize;
            produced = tail.min(frames);
            *remaining = remaining.saturating_sub(wanted - got);
        }

        let channels = self.channels;
        self.input_interleaved.resize(wanted * channels, 0.0);
        self.output_interleaved.resize(frames * channels, 0.0);
        self.input.write_interleaved(wanted, &mut self.input_interleaved);
        self.output_interleaved.fill(0.0);

        self.stretcher
            .process(&self.input_interleaved[..], &mut self.output_interleaved[..]);

        output.read_interleaved(0, frames, &self.output_interleaved);
        Ok(produced)
    }

    fn reset(&mut self, flush_only: bool) {
        self.stretcher.reset();
        self.input_carry = 0.0;
        self.drain_remaining = None;
        if !flush_only {
            self.time_factor = 1.0;
            self.pitch_factor = 1.0;
            self.formant_factor = 1.0;
            self.apply_pitch();
        }
    }

    fn latency_frames(&self) -> usize {
        self.stretcher.input_latency() + self.stretcher.output_latency()
    }
}

impl std::fmt::Debug for SignalsmithEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalsmithEngine")
            .field("quality", &self.quality)
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("time_factor", &self.time_factor)
            .field("pitch_factor", &self.pitch_factor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_pull(channels: usize) -> impl FnMut(&mut AudioBuffer, usize) -> Result<usize> + Send {
        let mut phase = 0.0f32;
        move |dest: &mut AudioBuffer, frames: usize| {
            for i in 0..frames {
                let value = (phase * std::f32::consts::TAU).sin() * 0.5;
                for ch in 0..channels {
                    dest[ch][i] = value;
                }
                phase = (phase + 440.0 / 44100.0).fract();
            }
            Ok(frames)
        }
    }

    #[test]
    fn test_engine_reports_latency() {
        let engine = SignalsmithEngine::new(Quality::Best, 2, 44100);
        assert!(engine.latency_frames() > 0);
        assert_eq!(
            SignalsmithBackend.latency_frames(Quality::Best, 44100),
            engine.latency_frames()
        );
    }

    #[test]
    fn test_pulls_input_scaled_by_time_factor() {
        let mut engine = SignalsmithEngine::new(Quality::Good, 2, 44100);
        engine.set_property(EngineProperty::TimeFactor, 2.0);

        let mut pulled = 0usize;
        let mut inner = sine_pull(2);
        let mut pull = |dest: &mut AudioBuffer, frames: usize| {
            pulled += frames;
            inner(dest, frames)
        };
        let mut output = AudioBuffer::silence(2, 1024);
        for _ in 0..4 {
            assert_eq!(engine.process(&mut output, 1024, &mut pull).unwrap(), 1024);
        }
        assert_eq!(pulled, 2048);
        assert!(output.is_finite());
    }

    #[test]
    fn test_drains_after_input_ends() {
        let mut engine = SignalsmithEngine::new(Quality::Preview, 1, 44100);
        let mut remaining = 2048usize;
        let mut pull = |dest: &mut AudioBuffer, frames: usize| -> Result<usize> {
            let count = frames.min(remaining);
            dest.silence_range(0, count);
            remaining -= count;
            Ok(count)
        };
        let mut output = AudioBuffer::silence(1, 1024);

        let mut total = 0;
        for _ in 0..64 {
            let produced = engine.process(&mut output, 1024, &mut pull).unwrap();
            if produced == 0 {
                break;
            }
            total += produced;
        }
        assert!(total >= 2048);
        assert!(total <= 2048 + engine.latency_frames() + 1024);
        assert_eq!(engine.process(&mut output, 1024, &mut pull).unwrap(), 0);
    }

    #[test]
    fn test_reset_restores_unit_factors() {
        let mut engine = SignalsmithEngine::new(Quality::Good, 2, 48000);
        engine.set_property(EngineProperty::PitchFactor, 2.0);
        engine.reset(true);
        assert_eq!(engine.property(EngineProperty::PitchFactor), 2.0);
        engine.reset(false);
        assert_eq!(engine.property(EngineProperty::PitchFactor), 1.0);
    }
}
