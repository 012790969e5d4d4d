//! Varispeed engine
//!
//! Tape-style playback rate change by linear interpolation. Time and pitch
//! are coupled: stretching by 2 also drops the pitch an octave. Zero latency
//! and fully deterministic, which makes it the reference engine for tests and
//! a cheap preview backend.

use super::{check_layout, EngineBackend, EngineProperty, PullCallback, Quality, StretchEngine};
use crate::error::Result;
use crate::types::{AudioBuffer, Sample};

/// Backend for [`VarispeedEngine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct VarispeedBackend;

impl EngineBackend for VarispeedBackend {
    fn name(&self) -> &'static str {
        "varispeed"
    }

    fn create(&self, _quality: Quality, channels: usize, sample_rate: u32) -> Result<Box<dyn StretchEngine>> {
        check_layout(channels, sample_rate)?;
        Ok(Box::new(VarispeedEngine::new(channels, sample_rate)))
    }

    fn latency_frames(&self, _quality: Quality, _sample_rate: u32) -> usize {
        0
    }
}

pub struct VarispeedEngine {
    channels: usize,
    sample_rate: u32,
    time_factor: f64,
    pitch_factor: f64,
    formant_factor: f64,
    /// Pulled input not yet fully consumed, one Vec per channel
    history: Vec<Vec<Sample>>,
    /// Absolute input frame held in `history[..][0]`
    origin: u64,
    /// Input position at the last time factor change
    anchor: f64,
    /// Output frames produced since `anchor`
    emitted: u64,
    /// Absolute input length once the input has ended
    input_end: Option<u64>,
    scratch: AudioBuffer,
    warned_pitch: bool,
}

impl VarispeedEngine {
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            time_factor: 1.0,
            pitch_factor: 1.0,
            formant_factor: 1.0,
            history: vec![Vec::with_capacity(8192); channels],
            origin: 0,
            anchor: 0.0,
            emitted: 0,
            input_end: None,
            scratch: AudioBuffer::silence(channels, 0),
            warned_pitch: false,
        }
    }

    fn history_len(&self) -> usize {
        self.history.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Absolute input position of output frame `emitted + ahead`
    fn position(&self, ahead: usize) -> f64 {
        self.anchor + (self.emitted + ahead as u64) as f64 / self.time_factor
    }

    /// Pull until input up to absolute frame `needed` is buffered or the input ends
    fn fill_history(&mut self, needed: u64, pull: &mut dyn PullCallback) -> Result<()> {
        while self.input_end.is_none() && self.origin + (self.history_len() as u64) < needed {
            let want = (needed - self.origin) as usize - self.history_len();
            if self.scratch.len() < want {
                self.scratch.resize(want);
            }
            let got = pull.pull(&mut self.scratch, want)?.min(want);
            for (history, pulled) in self.history.iter_mut().zip(self.scratch.channels()) {
                history.extend_from_slice(&pulled[..got]);
            }
            if got < want {
                let end = self.origin + self.history_len() as u64;
                log::debug!("Varispeed input ended at frame {}", end);
                self.input_end = Some(end);
            }
        }
        Ok(())
    }

    /// Drop frames that no future output can reference
    fn discard_consumed(&mut self) {
        let next = self.position(0).floor() as u64;
        let consumed = (next.saturating_sub(self.origin) as usize).min(self.history_len());
        if consumed == 0 {
            return;
        }
        for history in &mut self.history {
            history.drain(..consumed);
        }
        self.origin += consumed as u64;
    }
}

impl StretchEngine for VarispeedEngine {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_property(&mut self, property: EngineProperty, value: f64) {
        match property {
            EngineProperty::TimeFactor => {
                self.anchor = self.position(0);
                self.emitted = 0;
                self.time_factor = value;
            }
            EngineProperty::PitchFactor => {
                if value != 1.0 && !self.warned_pitch {
                    log::warn!("Varispeed couples pitch to time; pitch factor {} ignored", value);
                    self.warned_pitch = true;
                }
                self.pitch_factor = value;
            }
            EngineProperty::FormantFactor => self.formant_factor = value,
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
        if frames == 0 {
            return Ok(0);
        }
        // Interpolation reads one frame past the last position
        let last = self.position(frames - 1).floor() as u64;
        self.fill_history(last + 2, pull)?;

        let available = self
            .input_end
            .unwrap_or(self.origin + self.history_len() as u64);
        let mut produced = 0;
        while produced < frames {
            let position = self.position(produced);
            let frame = position.floor() as u64;
            if frame >= available {
                break;
            }
            let index = (frame - self.origin) as usize;
            let frac = (position - frame as f64) as Sample;
            let has_next = frame + 1 < available;
            for (ch, history) in self.history.iter().enumerate() {
                let a = history[index];
                let b = if has_next { history[index + 1] } else { 0.0 };
                output[ch][produced] = a + (b - a) * frac;
            }
            produced += 1;
        }

        self.emitted += produced as u64;
        self.discard_consumed();
        Ok(produced)
    }

    fn reset(&mut self, flush_only: bool) {
        for history in &mut self.history {
            history.clear();
        }
        self.origin = 0;
        self.anchor = 0.0;
        self.emitted = 0;
        self.input_end = None;
        if !flush_only {
            self.time_factor = 1.0;
            self.pitch_factor = 1.0;
            self.formant_factor = 1.0;
        }
    }

    fn latency_frames(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_pull(limit: usize) -> impl FnMut(&mut AudioBuffer, usize) -> Result<usize> + Send {
        let mut next = 0usize;
        move |dest: &mut AudioBuffer, frames: usize| {
            let count = frames.min(limit - next);
            for i in 0..count {
                dest[0][i] = (next + i) as f32;
            }
            next += count;
            Ok(count)
        }
    }

    #[test]
    fn test_unit_factor_is_passthrough() {
        let mut engine = VarispeedEngine::new(1, 44100);
        let mut pull = ramp_pull(100);
        let mut output = AudioBuffer::silence(1, 10);

        assert_eq!(engine.process(&mut output, 10, &mut pull).unwrap(), 10);
        let expected: Vec<f32> = (0..10).map(|i| i as f32).collect();
        assert_eq!(output.channel(0), expected.as_slice());

        assert_eq!(engine.process(&mut output, 10, &mut pull).unwrap(), 10);
        assert_eq!(output[0][0], 10.0);
    }

    #[test]
    fn test_double_time_interpolates() {
        let mut engine = VarispeedEngine::new(1, 44100);
        engine.set_property(EngineProperty::TimeFactor, 2.0);
        let mut pull = ramp_pull(100);
        let mut output = AudioBuffer::silence(1, 6);

        engine.process(&mut output, 6, &mut pull).unwrap();
        assert_eq!(output.channel(0), &[0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
    }

    #[test]
    fn test_output_length_scales_with_time() {
        let mut engine = VarispeedEngine::new(1, 44100);
        engine.set_property(EngineProperty::TimeFactor, 1.25);
        let mut pull = ramp_pull(8000);
        let mut output = AudioBuffer::silence(1, 4096);

        let mut total = 0;
        loop {
            let produced = engine.process(&mut output, 4096, &mut pull).unwrap();
            total += produced;
            if produced < 4096 {
                break;
            }
        }
        assert_eq!(total, 10000);
    }

    #[test]
    fn test_reset_clears_buffered_input() {
        let mut engine = VarispeedEngine::new(1, 44100);
        engine.set_property(EngineProperty::TimeFactor, 0.5);
        let mut pull = ramp_pull(10);
        let mut output = AudioBuffer::silence(1, 4);
        engine.process(&mut output, 4, &mut pull).unwrap();

        engine.reset(true);
        assert_eq!(engine.property(EngineProperty::TimeFactor), 0.5);
        let mut fresh = ramp_pull(10);
        engine.process(&mut output, 1, &mut fresh).unwrap();
        assert_eq!(output[0][0], 0.0);

        engine.reset(false);
        assert_eq!(engine.property(EngineProperty::TimeFactor), 1.0);
    }
}
