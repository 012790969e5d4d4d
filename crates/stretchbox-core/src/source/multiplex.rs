//! Multi-file frame source
//!
//! Several sources sharing one sample rate are presented as a single
//! wide-channel stream: each constituent owns a disjoint, contiguous slice of
//! the output channels, in input order, and all share one cursor. The stream
//! is as long as its longest constituent; shorter ones are padded with
//! silence up to that length, and looping wraps the combined stream, never a
//! single constituent.

use super::{normalize_position, read_with_wrap, FrameSource};
use crate::error::{Error, Result};
use crate::types::{AudioBuffer, SampleEncoding, StreamInfo};

/// Upper bound on constituents of one multiplexed stream
pub const MAX_INPUT_FILES: usize = 64;

/// Combines N sources into one stream of summed channel count
pub struct MultiplexSource {
    sources: Vec<Box<dyn FrameSource>>,
    /// First output channel of each constituent
    channel_offsets: Vec<usize>,
    channels: usize,
    sample_rate: u32,
    cursor: u64,
    looping: bool,
    scratch: Vec<AudioBuffer>,
}

impl MultiplexSource {
    /// Combine sources in order
    ///
    /// Fails if the list is empty, exceeds [`MAX_INPUT_FILES`], or mixes
    /// sample rates.
    pub fn new(mut sources: Vec<Box<dyn FrameSource>>) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::Configuration("multiplex needs at least one source".into()));
        }
        if sources.len() > MAX_INPUT_FILES {
            return Err(Error::Configuration(format!(
                "{} sources exceeds the limit of {}",
                sources.len(),
                MAX_INPUT_FILES
            )));
        }

        let sample_rate = sources[0].sample_rate();
        let mut channel_offsets = Vec::with_capacity(sources.len());
        let mut channels = 0;
        for (index, source) in sources.iter().enumerate() {
            if source.sample_rate() != sample_rate {
                return Err(Error::Configuration(format!(
                    "source #{} runs at {} Hz, expected {} Hz",
                    index,
                    source.sample_rate(),
                    sample_rate
                )));
            }
            channel_offsets.push(channels);
            channels += source.channels();
        }

        let lengths: Vec<Option<u64>> = sources.iter().map(|s| s.total_frames()).collect();
        if lengths.iter().any(|l| *l != lengths[0]) {
            log::warn!(
                "Multiplexing sources of unequal length {:?}; shorter ones pad with silence",
                lengths
            );
        }

        for source in &mut sources {
            source.set_looping(false);
        }
        let scratch = sources
            .iter()
            .map(|s| AudioBuffer::silence(s.channels(), 0))
            .collect();

        log::debug!(
            "Multiplexing {} sources into {} channels at {} Hz",
            sources.len(),
            channels,
            sample_rate
        );

        Ok(Self {
            sources,
            channel_offsets,
            channels,
            sample_rate,
            cursor: 0,
            looping: false,
            scratch,
        })
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Output channel range owned by constituent `index`
    pub fn channel_range(&self, index: usize) -> std::ops::Range<usize> {
        let start = self.channel_offsets[index];
        start..start + self.sources[index].channels()
    }

    /// Length of the combined stream: the longest constituent
    fn longest(&self) -> Option<u64> {
        let mut longest = 0;
        for source in &self.sources {
            longest = longest.max(source.total_frames()?);
        }
        Some(longest)
    }
}

impl FrameSource for MultiplexSource {
    fn info(&self) -> StreamInfo {
        StreamInfo::new(
            self.sample_rate,
            self.channels,
            self.longest(),
            SampleEncoding::Float32,
        )
    }

    fn cursor(&self) -> u64 {
        self.cursor
    }

    fn seek(&mut self, frame: u64) {
        self.cursor = normalize_position(frame, self.longest(), self.looping);
        for source in &mut self.sources {
            source.seek(self.cursor);
        }
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
        let total = self.longest();
        let looping = self.looping;
        let sources = &mut self.sources;
        let scratch = &mut self.scratch;
        let channel_offsets = &self.channel_offsets;

        let read_span = |position: u64, dest_offset: usize, count: usize| -> Result<usize> {
            let mut produced = 0;
            for (index, source) in sources.iter_mut().enumerate() {
                let buffer = &mut scratch[index];
                if buffer.len() < count {
                    buffer.resize(count);
                }

                let exhausted = source.total_frames().is_some_and(|len| position >= len);
                let got = if exhausted {
                    0
                } else {
                    source
                        .read_frames(position, buffer, 0, count)
                        .map_err(|e| Error::AggregateSource {
                            index,
                            source: Box::new(e),
                        })?
                };

                let base = channel_offsets[index];
                dest.copy_channels_from(base, dest_offset, buffer, 0, got);
                for ch in base..base + buffer.channel_count() {
                    dest[ch][dest_offset + got..dest_offset + count].fill(0.0);
                }
                produced = produced.max(got);
            }
            Ok(produced)
        };

        let (written, next) = read_with_wrap(start, total, looping, offset, frames, read_span)?;
        self.cursor = next;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn mono(values: Vec<f32>) -> Box<dyn FrameSource> {
        Box::new(MemorySource::new(AudioBuffer::from_channels(vec![values]), 44100))
    }

    /// Source that fails every read
    struct BrokenSource;

    impl FrameSource for BrokenSource {
        fn info(&self) -> StreamInfo {
            StreamInfo::new(44100, 1, Some(100), SampleEncoding::Int16)
        }
        fn cursor(&self) -> u64 {
            0
        }
        fn seek(&mut self, _frame: u64) {}
        fn is_looping(&self) -> bool {
            false
        }
        fn set_looping(&mut self, _looping: bool) {}
        fn read_frames(&mut self, start: u64, _: &mut AudioBuffer, _: usize, _: usize) -> Result<usize> {
            Err(Error::io(
                "reading test data",
                start,
                std::io::Error::new(std::io::ErrorKind::Other, "disk gone"),
            ))
        }
    }

    #[test]
    fn test_two_mono_sources_become_stereo() {
        let mut mux = MultiplexSource::new(vec![
            mono(vec![1.0, 2.0, 3.0, 4.0]),
            mono(vec![-1.0, -2.0, -3.0, -4.0]),
        ])
        .unwrap();
        assert_eq!(mux.channels(), 2);

        let mut dest = AudioBuffer::silence(2, 3);
        assert_eq!(mux.read_frames(1, &mut dest, 0, 3).unwrap(), 3);
        assert_eq!(dest.channel(0), &[2.0, 3.0, 4.0]);
        assert_eq!(dest.channel(1), &[-2.0, -3.0, -4.0]);
        assert_eq!(mux.cursor(), 4);
    }

    #[test]
    fn test_channel_slices_follow_input_order() {
        let stereo = Box::new(MemorySource::new(
            AudioBuffer::from_channels(vec![vec![0.1; 4], vec![0.2; 4]]),
            44100,
        ));
        let mux = MultiplexSource::new(vec![mono(vec![0.0; 4]), stereo, mono(vec![0.0; 4])]).unwrap();

        assert_eq!(mux.channels(), 4);
        assert_eq!(mux.channel_range(0), 0..1);
        assert_eq!(mux.channel_range(1), 1..3);
        assert_eq!(mux.channel_range(2), 3..4);
    }

    #[test]
    fn test_shorter_source_pads_with_silence() {
        let mut mux = MultiplexSource::new(vec![mono(vec![1.0; 6]), mono(vec![2.0; 3])]).unwrap();
        let mut dest = AudioBuffer::silence(2, 6);
        dest.channel_mut(1).fill(9.0);

        assert_eq!(mux.read_next(&mut dest, 0, 6).unwrap(), 6);
        assert_eq!(dest.channel(1), &[2.0, 2.0, 2.0, 0.0, 0.0, 0.0]);
        assert_eq!(mux.total_frames(), Some(6));
    }

    #[test]
    fn test_constituent_failure_names_index() {
        let mut mux =
            MultiplexSource::new(vec![mono(vec![1.0; 8]), Box::new(BrokenSource)]).unwrap();
        let mut dest = AudioBuffer::silence(2, 4);

        let err = mux.read_next(&mut dest, 0, 4).unwrap_err();
        assert!(matches!(err, Error::AggregateSource { index: 1, .. }));
    }

    #[test]
    fn test_rejects_mixed_rates_and_empty() {
        let other_rate = Box::new(MemorySource::new(AudioBuffer::silence(1, 4), 48000));
        assert!(MultiplexSource::new(vec![mono(vec![0.0; 4]), other_rate]).is_err());
        assert!(MultiplexSource::new(Vec::new()).is_err());
    }

    #[test]
    fn test_looping_pads_shorter_source_until_combined_wrap() {
        let mut mux = MultiplexSource::new(vec![
            mono(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            mono(vec![10.0, 11.0, 12.0]),
        ])
        .unwrap();
        mux.set_looping(true);

        let mut dest = AudioBuffer::silence(2, 6);
        assert_eq!(mux.read_frames(0, &mut dest, 0, 6).unwrap(), 6);
        assert_eq!(dest.channel(1), &[10.0, 11.0, 12.0, 0.0, 0.0, 0.0]);
        assert_eq!(mux.cursor(), 0);

        assert_eq!(mux.read_frames(3, &mut dest, 0, 6).unwrap(), 6);
        assert_eq!(dest.channel(0), &[4.0, 5.0, 6.0, 1.0, 2.0, 3.0]);
        assert_eq!(dest.channel(1), &[0.0, 0.0, 0.0, 10.0, 11.0, 12.0]);
        assert_eq!(mux.cursor(), 3);
    }
}
