//! Lockable raw PCM store
//!
//! Holds interleaved fixed-point bytes the way a sound library's sample
//! buffer does: readers lock a frame region, decode straight out of it, and
//! the lock is released when the guard drops, on every path.

use std::ops::{Deref, Range};
use std::sync::Arc;

use crossbeam::sync::{ShardedLock, ShardedLockReadGuard};

use super::{normalize_position, read_with_wrap, FrameSource};
use crate::decode::decode_interleaved;
use crate::error::{Error, Result};
use crate::types::{AudioBuffer, SampleEncoding, StreamInfo};

/// Shared store of interleaved raw sample bytes
#[derive(Debug)]
pub struct PcmStore {
    data: ShardedLock<Vec<u8>>,
    info: StreamInfo,
}

impl PcmStore {
    /// Wrap raw interleaved bytes; the length must be a whole number of frames
    pub fn new(bytes: Vec<u8>, sample_rate: u32, channels: usize, encoding: SampleEncoding) -> Result<Self> {
        if channels == 0 || sample_rate == 0 {
            return Err(Error::Format(format!(
                "PCM store needs channels and a sample rate (got {} ch @ {} Hz)",
                channels, sample_rate
            )));
        }
        let frame_width = channels * encoding.bytes_per_sample();
        if bytes.len() % frame_width != 0 {
            return Err(Error::Format(format!(
                "{} bytes is not a whole number of {}-byte frames",
                bytes.len(),
                frame_width
            )));
        }
        let frames = (bytes.len() / frame_width) as u64;
        Ok(Self {
            data: ShardedLock::new(bytes),
            info: StreamInfo::new(sample_rate, channels, Some(frames), encoding),
        })
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    pub fn frame_count(&self) -> u64 {
        self.info.total_frames.unwrap_or(0)
    }

    /// Lock `frames` frames starting at `start` for reading
    ///
    /// The region is clamped to the end of the store.
    pub fn lock_region(&self, start: u64, frames: usize) -> Result<PcmRegionLock<'_>> {
        let guard = self.data.read().map_err(|_| {
            Error::io(
                "locking pcm store",
                start,
                std::io::Error::new(std::io::ErrorKind::Other, "pcm store lock poisoned"),
            )
        })?;
        let frame_width = self.info.bytes_per_frame();
        let first = (start.min(self.frame_count()) as usize) * frame_width;
        let last = (first + frames * frame_width).min(guard.len());
        Ok(PcmRegionLock {
            guard,
            range: first..last,
        })
    }

    /// Overwrite frames in place starting at `start`
    pub fn write_frames(&self, start: u64, bytes: &[u8]) -> Result<()> {
        let frame_width = self.info.bytes_per_frame();
        if bytes.len() % frame_width != 0 {
            return Err(Error::Format(format!(
                "write of {} bytes is not frame aligned",
                bytes.len()
            )));
        }
        let mut data = self.data.write().map_err(|_| {
            Error::io(
                "locking pcm store",
                start,
                std::io::Error::new(std::io::ErrorKind::Other, "pcm store lock poisoned"),
            )
        })?;
        let first = start as usize * frame_width;
        if first + bytes.len() > data.len() {
            return Err(Error::Format(format!(
                "write of {} frames at {} runs past the end of the store",
                bytes.len() / frame_width,
                start
            )));
        }
        data[first..first + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Read access to a locked frame region; unlocks on drop
pub struct PcmRegionLock<'a> {
    guard: ShardedLockReadGuard<'a, Vec<u8>>,
    range: Range<usize>,
}

impl PcmRegionLock<'_> {
    pub fn byte_len(&self) -> usize {
        self.range.len()
    }
}

impl Deref for PcmRegionLock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.range.clone()]
    }
}

/// Frame source reading from a shared [`PcmStore`]
#[derive(Debug, Clone)]
pub struct PcmSource {
    store: Arc<PcmStore>,
    cursor: u64,
    looping: bool,
}

impl PcmSource {
    pub fn new(store: Arc<PcmStore>) -> Self {
        Self {
            store,
            cursor: 0,
            looping: false,
        }
    }

    pub fn store(&self) -> &Arc<PcmStore> {
        &self.store
    }
}

impl FrameSource for PcmSource {
    fn info(&self) -> StreamInfo {
        self.store.info()
    }

    fn cursor(&self) -> u64 {
        self.cursor
    }

    fn seek(&mut self, frame: u64) {
        self.cursor = normalize_position(frame, Some(self.store.frame_count()), self.looping);
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
        let store = &self.store;
        let encoding = store.info().encoding;
        let frame_width = store.info().bytes_per_frame();

        let (written, next) = read_with_wrap(
            start,
            Some(store.frame_count()),
            self.looping,
            offset,
            frames,
            |position, dest_offset, count| {
                let region = store.lock_region(position, count)?;
                let got = region.byte_len() / frame_width;
                if let Err(e) = decode_interleaved(&region, encoding, dest, dest_offset) {
                    log::warn!("Decode failed at frame {}: {}, substituting silence", position, e);
                    dest.silence_range(dest_offset, got);
                }
                Ok(got)
            },
        )?;
        self.cursor = next;
        Ok(written)
    }
}
