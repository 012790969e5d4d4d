//! Source-bound pull callback

use std::time::{Duration, Instant};

use super::FrameSource;
use crate::engine::PullCallback;
use crate::error::Result;
use crate::types::AudioBuffer;

/// Feeds an engine from a frame source, reading sequentially from its cursor
///
/// Time spent inside the source is accumulated separately so DSP speed can
/// be reported without disk time.
pub struct FrameFeed<S> {
    source: S,
    read_time: Duration,
    frames_supplied: u64,
}

impl<S: FrameSource> FrameFeed<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            read_time: Duration::ZERO,
            frames_supplied: 0,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Reposition the read cursor
    pub fn seek(&mut self, frame: u64) {
        self.source.seek(frame);
    }

    pub fn position(&self) -> u64 {
        self.source.cursor()
    }

    /// Total time spent reading from the source
    pub fn read_time(&self) -> Duration {
        self.read_time
    }

    pub fn frames_supplied(&self) -> u64 {
        self.frames_supplied
    }
}

impl<S: FrameSource> PullCallback for FrameFeed<S> {
    fn pull(&mut self, dest: &mut AudioBuffer, frames: usize) -> Result<usize> {
        let started = Instant::now();
        let result = self.source.read_next(dest, 0, frames);
        self.read_time += started.elapsed();

        let got = result?;
        self.frames_supplied += got as u64;
        Ok(got)
    }
}
