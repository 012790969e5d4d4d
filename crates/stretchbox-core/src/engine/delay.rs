//! Fixed-delay engine for tests
//!
//! Passes input through at unit rate behind a delay line of `delay` frames
//! of silence. Like a real engine, a fresh or reset instance emits exactly
//! `latency_frames()` frames of lead-in before aligned audio. Factors are
//! accepted and ignored.

use super::{EngineBackend, EngineProperty, PullCallback, Quality, StretchEngine};
use crate::error::Result;
use crate::types::AudioBuffer;

pub(crate) struct DelayEngine {
    delay: usize,
    sample_rate: u32,
    line: Vec<Vec<f32>>,
    input: AudioBuffer,
}

impl DelayEngine {
    pub(crate) fn new(delay: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            delay,
            sample_rate,
            line: vec![vec![0.0; delay]; channels],
            input: AudioBuffer::silence(channels, 0),
        }
    }
}

impl StretchEngine for DelayEngine {
    fn channels(&self) -> usize {
        self.line.len()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_property(&mut self, _: EngineProperty, _: f64) {}

    fn property(&self, _: EngineProperty) -> f64 {
        1.0
    }

    fn process(&mut self, output: &mut AudioBuffer, frames: usize, pull: &mut dyn PullCallback) -> Result<usize> {
        if self.input.len() < frames {
            self.input.resize(frames);
        }
        let got = pull.pull(&mut self.input, frames)?;
        for (ch, line) in self.line.iter_mut().enumerate() {
            line.extend_from_slice(&self.input[ch][..got]);
        }

        let available = self.line.first().map_or(0, |l| l.len()).min(frames);
        for (ch, line) in self.line.iter_mut().enumerate() {
            output[ch][..available].copy_from_slice(&line[..available]);
            line.drain(..available);
        }
        Ok(available)
    }

    fn reset(&mut self, _: bool) {
        for line in &mut self.line {
            line.clear();
            line.resize(self.delay, 0.0);
        }
    }

    fn latency_frames(&self) -> usize {
        self.delay
    }
}

pub(crate) struct DelayBackend(pub usize);

impl EngineBackend for DelayBackend {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn create(&self, _: Quality, channels: usize, sample_rate: u32) -> Result<Box<dyn StretchEngine>> {
        Ok(Box::new(DelayEngine::new(self.0, channels, sample_rate)))
    }

    fn latency_frames(&self, _: Quality, _: u32) -> usize {
        self.0
    }
}
