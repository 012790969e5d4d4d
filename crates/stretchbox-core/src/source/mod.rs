//! Frame sources
//!
//! A frame source supplies exactly N consecutive frames starting at an
//! arbitrary frame offset. When a source loops, a read that runs past the end
//! is split: the tail is supplied first, the cursor wraps to zero and the rest
//! comes from the head, all in one contiguous output. A non-looping source
//! returns a short count at end of stream and zero once exhausted.
//!
//! Engines always request frames sequentially, so file-backed sources only
//! seek when the requested start differs from where the last read ended.

mod feed;
mod memory;
mod multiplex;
mod pcm;
mod wav;

pub use feed::FrameFeed;
pub use memory::MemorySource;
pub use multiplex::{MultiplexSource, MAX_INPUT_FILES};
pub use pcm::{PcmRegionLock, PcmSource, PcmStore};
pub use wav::{WavFileSource, WavFormat};

use crate::error::Result;
use crate::types::{AudioBuffer, StreamInfo};

/// A backing audio store that can supply consecutive frames
pub trait FrameSource: Send {
    /// Stream description (rate, channels, length, encoding)
    fn info(&self) -> StreamInfo;

    /// Frame offset the next sequential read starts from
    fn cursor(&self) -> u64;

    /// Move the cursor; offsets past the end are clamped (or wrapped when looping)
    fn seek(&mut self, frame: u64);

    fn is_looping(&self) -> bool;

    fn set_looping(&mut self, looping: bool);

    /// Read `frames` frames starting at `start` into `dest` at frame `offset`
    ///
    /// Returns the number of frames written. Fewer than requested means end of
    /// stream (non-looping only); `Err` is a fatal I/O failure. The cursor is
    /// left on the frame following the last one supplied.
    fn read_frames(
        &mut self,
        start: u64,
        dest: &mut AudioBuffer,
        offset: usize,
        frames: usize,
    ) -> Result<usize>;

    /// Read the next `frames` frames from the cursor
    fn read_next(&mut self, dest: &mut AudioBuffer, offset: usize, frames: usize) -> Result<usize> {
        let start = self.cursor();
        self.read_frames(start, dest, offset, frames)
    }

    fn channels(&self) -> usize {
        self.info().channels
    }

    fn sample_rate(&self) -> u32 {
        self.info().sample_rate
    }

    fn total_frames(&self) -> Option<u64> {
        self.info().total_frames
    }
}

impl FrameSource for Box<dyn FrameSource> {
    fn info(&self) -> StreamInfo {
        (**self).info()
    }

    fn cursor(&self) -> u64 {
        (**self).cursor()
    }

    fn seek(&mut self, frame: u64) {
        (**self).seek(frame)
    }

    fn is_looping(&self) -> bool {
        (**self).is_looping()
    }

    fn set_looping(&mut self, looping: bool) {
        (**self).set_looping(looping)
    }

    fn read_frames(
        &mut self,
        start: u64,
        dest: &mut AudioBuffer,
        offset: usize,
        frames: usize,
    ) -> Result<usize> {
        (**self).read_frames(start, dest, offset, frames)
    }
}

/// Clamp or wrap a seek target against the stream length
pub(crate) fn normalize_position(frame: u64, total: Option<u64>, looping: bool) -> u64 {
    match total {
        Some(0) => 0,
        Some(total) if frame >= total => {
            if looping {
                frame % total
            } else {
                total
            }
        }
        _ => frame,
    }
}

/// Split a read at the stream end, wrapping when looping
///
/// `read_span(start, dest_offset, frames)` must read a contiguous run that
/// never crosses the end of the store; it may return fewer frames if the
/// store turns out shorter than advertised. Returns `(frames written,
/// next cursor)`.
pub(crate) fn read_with_wrap(
    start: u64,
    total: Option<u64>,
    looping: bool,
    dest_offset: usize,
    frames: usize,
    mut read_span: impl FnMut(u64, usize, usize) -> Result<usize>,
) -> Result<(usize, u64)> {
    let Some(total) = total else {
        let got = read_span(start, dest_offset, frames)?;
        return Ok((got, start + got as u64));
    };
    if total == 0 || frames == 0 {
        return Ok((0, normalize_position(start, Some(total), looping)));
    }

    let mut position = normalize_position(start, Some(total), looping);
    let mut written = 0usize;

    while written < frames {
        let available = (total - position) as usize;
        if available == 0 {
            break;
        }
        let wanted = available.min(frames - written);
        let got = read_span(position, dest_offset + written, wanted)?;
        written += got;
        position += got as u64;

        if got < wanted {
            log::warn!(
                "Store ended at frame {} before its advertised length {}",
                position,
                total
            );
            break;
        }
        if position == total {
            if !looping {
                break;
            }
            log::trace!("Loop wrap after {} of {} frames", written, frames);
            position = 0;
        }
    }

    Ok((written, position))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes the source frame index as the sample value
    fn ramp_span(dest: &mut AudioBuffer) -> impl FnMut(u64, usize, usize) -> Result<usize> + '_ {
        move |start, offset, frames| {
            for i in 0..frames {
                dest[0][offset + i] = (start + i as u64) as f32;
            }
            Ok(frames)
        }
    }

    #[test]
    fn test_wrap_is_contiguous() {
        let mut dest = AudioBuffer::silence(1, 10);
        let (got, next) =
            read_with_wrap(45, Some(50), true, 0, 10, ramp_span(&mut dest)).unwrap();

        assert_eq!(got, 10);
        assert_eq!(next, 5);
        let expected: Vec<f32> = [45.0, 46.0, 47.0, 48.0, 49.0, 0.0, 1.0, 2.0, 3.0, 4.0].to_vec();
        assert_eq!(dest.channel(0), expected.as_slice());
    }

    #[test]
    fn test_non_looping_stops_at_end() {
        let mut dest = AudioBuffer::silence(1, 10);
        let (got, next) =
            read_with_wrap(45, Some(50), false, 0, 10, ramp_span(&mut dest)).unwrap();
        assert_eq!(got, 5);
        assert_eq!(next, 50);

        let (got, next) =
            read_with_wrap(50, Some(50), false, 0, 10, ramp_span(&mut dest)).unwrap();
        assert_eq!(got, 0);
        assert_eq!(next, 50);
    }

    #[test]
    fn test_request_longer_than_stream_wraps_repeatedly() {
        let mut dest = AudioBuffer::silence(1, 7);
        let (got, next) =
            read_with_wrap(1, Some(3), true, 0, 7, ramp_span(&mut dest)).unwrap();

        assert_eq!(got, 7);
        assert_eq!(next, 2);
        assert_eq!(dest.channel(0), &[1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_normalize_position() {
        assert_eq!(normalize_position(12, Some(10), true), 2);
        assert_eq!(normalize_position(12, Some(10), false), 10);
        assert_eq!(normalize_position(12, None, false), 12);
    }
}
