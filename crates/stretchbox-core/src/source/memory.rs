//! In-memory frame source

use std::sync::Arc;

use super::{normalize_position, read_with_wrap, FrameSource};
use crate::error::Result;
use crate::types::{AudioBuffer, SampleEncoding, StreamInfo};

/// Frame source over a fully decoded, shared buffer
///
/// Cloning is cheap: the samples live behind an `Arc`, each clone carries its
/// own cursor. Used for resident loops in realtime playback and in tests.
#[derive(Debug, Clone)]
pub struct MemorySource {
    buffer: Arc<AudioBuffer>,
    sample_rate: u32,
    cursor: u64,
    looping: bool,
}

impl MemorySource {
    pub fn new(buffer: AudioBuffer, sample_rate: u32) -> Self {
        Self::shared(Arc::new(buffer), sample_rate)
    }

    pub fn shared(buffer: Arc<AudioBuffer>, sample_rate: u32) -> Self {
        Self {
            buffer,
            sample_rate,
            cursor: 0,
            looping: false,
        }
    }

    /// Builder-style looping toggle
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> StreamInfo {
        StreamInfo::new(
            self.sample_rate,
            self.buffer.channel_count(),
            Some(self.buffer.len() as u64),
            SampleEncoding::Float32,
        )
    }

    fn cursor(&self) -> u64 {
        self.cursor
    }

    fn seek(&mut self, frame: u64) {
        self.cursor = normalize_position(frame, Some(self.buffer.len() as u64), self.looping);
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn read_frames(
        &mut self,
        start: u64,
        dest: &mut AudioBuffer,
        offset: usize,
        frames: usize,
    ) -> Result<usize> {
        let buffer = &self.buffer;
        let (written, next) = read_with_wrap(
            start,
            Some(buffer.len() as u64),
            self.looping,
            offset,
            frames,
            |position, dest_offset, count| {
                dest.copy_channels_from(0, dest_offset, buffer, position as usize, count);
                Ok(count)
            },
        )?;
        self.cursor = next;
        Ok(written)
    }
}
