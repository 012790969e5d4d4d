//! Engine handle
//!
//! Owns one engine instance together with the pull callback bound to it, so
//! the engine can only ever pull from the source it was created for. Dropping
//! the handle destroys the engine.

use std::time::Instant;

use super::{check_factor, check_layout, EngineBackend, EngineProperty, PullCallback, Quality, StretchEngine};
use crate::error::Result;
use crate::types::AudioBuffer;

/// An engine bound to its frame supply
pub struct EngineHandle<P: PullCallback> {
    engine: Box<dyn StretchEngine>,
    pull: P,
    backend: &'static str,
    quality: Quality,
    peak_load: f32,
}

impl<P: PullCallback> EngineHandle<P> {
    /// Create an engine and bind `pull` as its input
    pub fn create(
        backend: &dyn EngineBackend,
        quality: Quality,
        channels: usize,
        sample_rate: u32,
        pull: P,
    ) -> Result<Self> {
        check_layout(channels, sample_rate)?;
        let engine = backend.create(quality, channels, sample_rate)?;

        log::info!(
            "Created {} engine: {} ch @ {} Hz, quality {}, latency {} frames",
            backend.name(),
            channels,
            sample_rate,
            quality,
            engine.latency_frames()
        );

        Ok(Self {
            engine,
            pull,
            backend: backend.name(),
            quality,
            peak_load: 0.0,
        })
    }

    /// Set a factor; rejects non-positive or non-finite values
    pub fn set_property(&mut self, property: EngineProperty, value: f64) -> Result<()> {
        let value = check_factor(property, value)?;
        self.engine.set_property(property, value);
        Ok(())
    }

    pub fn property(&self, property: EngineProperty) -> f64 {
        self.engine.property(property)
    }

    /// Produce up to `frames` frames, pulling input from the bound callback
    pub fn process(&mut self, output: &mut AudioBuffer, frames: usize) -> Result<usize> {
        let started = Instant::now();
        let produced = self.engine.process(output, frames, &mut self.pull)?;
        self.record_load(started, produced);
        Ok(produced)
    }

    /// Produce frames, feeding `prefed[0..prefed_frames]` before the bound callback
    ///
    /// The engine sees one continuous input stream: the prefed block first,
    /// then whatever the bound callback supplies.
    pub fn process_prefed(
        &mut self,
        output: &mut AudioBuffer,
        frames: usize,
        prefed: &AudioBuffer,
        prefed_frames: usize,
    ) -> Result<usize> {
        let mut chained = PrefedPull {
            block: prefed,
            remaining: prefed_frames.min(prefed.len()),
            position: 0,
            inner: &mut self.pull,
        };
        let started = Instant::now();
        let produced = self.engine.process(output, frames, &mut chained)?;
        self.record_load(started, produced);
        Ok(produced)
    }

    /// Clear engine state; `flush_only` keeps the current factors
    pub fn reset(&mut self, flush_only: bool) {
        log::debug!("Resetting {} engine (flush only: {})", self.backend, flush_only);
        self.engine.reset(flush_only);
    }

    pub fn latency_frames(&self) -> usize {
        self.engine.latency_frames()
    }

    pub fn channels(&self) -> usize {
        self.engine.channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Highest processing load seen so far, in percent of realtime
    pub fn peak_load_percent(&self) -> f32 {
        self.peak_load
    }

    pub fn pull(&self) -> &P {
        &self.pull
    }

    /// Access the bound callback, e.g. to reposition its source
    pub fn pull_mut(&mut self) -> &mut P {
        &mut self.pull
    }

    fn record_load(&mut self, started: Instant, produced: usize) {
        if produced == 0 {
            return;
        }
        let elapsed = started.elapsed().as_secs_f64();
        let audio = produced as f64 / self.engine.sample_rate() as f64;
        let load = (elapsed / audio * 100.0) as f32;
        if load > self.peak_load {
            self.peak_load = load;
        }
    }
}

impl<P: PullCallback> Drop for EngineHandle<P> {
    fn drop(&mut self) {
        log::debug!(
            "Destroying {} engine (peak load {:.1}%)",
            self.backend,
            self.peak_load
        );
    }
}

/// Supplies a pre-read block, then continues from the bound callback
struct PrefedPull<'a, P: PullCallback> {
    block: &'a AudioBuffer,
    remaining: usize,
    position: usize,
    inner: &'a mut P,
}

impl<P: PullCallback> PullCallback for PrefedPull<'_, P> {
    fn pull(&mut self, dest: &mut AudioBuffer, frames: usize) -> Result<usize> {
        if self.remaining == 0 {
            return self.inner.pull(dest, frames);
        }

        let from_block = frames.min(self.remaining);
        dest.copy_channels_from(0, 0, self.block, self.position, from_block);
        self.position += from_block;
        self.remaining -= from_block;

        if from_block == frames {
            return Ok(frames);
        }

        // Top up the rest of this request from the live callback
        let rest = frames - from_block;
        let mut tail = AudioBuffer::silence(dest.channel_count(), rest);
        let got = self.inner.pull(&mut tail, rest)?;
        dest.copy_channels_from(0, from_block, &tail, 0, got);
        Ok(from_block + got)
    }
}
