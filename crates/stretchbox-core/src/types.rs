//! Common types for Stretchbox
//!
//! This module contains the fundamental audio types shared by sources,
//! engines and sinks: the planar frame buffer, stream descriptions and
//! raw sample encodings.

use std::ops::{Index, IndexMut};

/// Audio sample type (32-bit float, the canonical processing format)
pub type Sample = f32;

/// Default number of frames requested from the engine per process call
pub const DEFAULT_BLOCK_FRAMES: usize = 8192;

/// Raw sample encoding of a backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    /// Signed 8-bit fixed point
    Int8,
    /// Unsigned 8-bit offset binary (the WAV convention)
    UInt8,
    /// Signed 16-bit fixed point, little endian
    Int16,
    /// Signed 24-bit fixed point, three packed little-endian bytes
    Int24,
    /// Signed 32-bit fixed point, little endian
    Int32,
    /// IEEE 754 single precision, little endian
    Float32,
}

impl SampleEncoding {
    /// Fixed-point encoding for a bit depth (8, 16, 24 or 32)
    pub fn from_bit_depth(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(Self::Int8),
            16 => Some(Self::Int16),
            24 => Some(Self::Int24),
            32 => Some(Self::Int32),
            _ => None,
        }
    }

    /// Bits per sample
    pub fn bit_depth(&self) -> u16 {
        match self {
            Self::Int8 | Self::UInt8 => 8,
            Self::Int16 => 16,
            Self::Int24 => 24,
            Self::Int32 | Self::Float32 => 32,
        }
    }

    /// Bytes per sample
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bit_depth() as usize / 8
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float32)
    }
}

/// Description of an audio stream
///
/// Channel count and encoding are fixed for the lifetime of a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: usize,
    /// Total frame count, `None` for unbounded/streaming sources
    pub total_frames: Option<u64>,
    /// Encoding of the backing store
    pub encoding: SampleEncoding,
}

impl StreamInfo {
    pub fn new(sample_rate: u32, channels: usize, total_frames: Option<u64>, encoding: SampleEncoding) -> Self {
        Self {
            sample_rate,
            channels,
            total_frames,
            encoding,
        }
    }

    /// Bytes per interleaved frame in the backing store
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.channels * self.encoding.bytes_per_sample()
    }

    /// Duration in seconds, if the length is known
    pub fn duration_seconds(&self) -> Option<f64> {
        self.total_frames
            .map(|frames| frames as f64 / self.sample_rate as f64)
    }
}

/// A planar buffer of audio frames
///
/// One `Vec` per channel, all of the same length. This is the frame
/// container handed to pull callbacks, engines and sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<Sample>>,
    frames: usize,
}

impl AudioBuffer {
    /// Create a buffer filled with silence
    pub fn silence(channels: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channels],
            frames,
        }
    }

    /// Create a buffer from per-channel sample vectors
    pub fn from_channels(channels: Vec<Vec<Sample>>) -> Self {
        let frames = channels.first().map(|c| c.len()).unwrap_or(0);
        assert!(
            channels.iter().all(|c| c.len() == frames),
            "Channel lengths must match"
        );
        Self { channels, frames }
    }

    /// Create a buffer from interleaved samples [c0, c1, .., c0, c1, ..]
    pub fn from_interleaved(interleaved: &[Sample], channel_count: usize) -> Self {
        assert!(channel_count > 0, "Channel count must be positive");
        assert!(
            interleaved.len() % channel_count == 0,
            "Interleaved length must be a multiple of the channel count"
        );
        let frames = interleaved.len() / channel_count;
        let mut buffer = Self::silence(channel_count, frames);
        for (frame, chunk) in interleaved.chunks_exact(channel_count).enumerate() {
            for (ch, &sample) in chunk.iter().enumerate() {
                buffer.channels[ch][frame] = sample;
            }
        }
        buffer
    }

    /// Number of channels
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames
    #[inline]
    pub fn len(&self) -> usize {
        self.frames
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Resize every channel, filling with silence if growing
    pub fn resize(&mut self, frames: usize) {
        for channel in &mut self.channels {
            channel.resize(frames, 0.0);
        }
        self.frames = frames;
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Silence the frame range `[start, start + frames)`, clamped to the buffer
    pub fn silence_range(&mut self, start: usize, frames: usize) {
        let end = (start + frames).min(self.frames);
        if start >= end {
            return;
        }
        for channel in &mut self.channels {
            channel[start..end].fill(0.0);
        }
    }

    /// Get one channel
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index]
    }

    /// Get one channel mutably
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        &mut self.channels[index]
    }

    /// Iterate over channels
    pub fn channels(&self) -> impl Iterator<Item = &[Sample]> {
        self.channels.iter().map(|c| c.as_slice())
    }

    /// Iterate over channels mutably
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [Sample]> {
        self.channels.iter_mut().map(|c| c.as_mut_slice())
    }

    /// Copy `frames` frames of every channel of `src` (starting at `src_offset`)
    /// into this buffer at `dst_offset`, onto the channels starting at `dst_channel`.
    pub fn copy_channels_from(
        &mut self,
        dst_channel: usize,
        dst_offset: usize,
        src: &AudioBuffer,
        src_offset: usize,
        frames: usize,
    ) {
        for ch in 0..src.channel_count() {
            let dst = &mut self.channels[dst_channel + ch][dst_offset..dst_offset + frames];
            dst.copy_from_slice(&src.channels[ch][src_offset..src_offset + frames]);
        }
    }

    /// Copy `frames` frames into an interleaved output buffer
    pub fn write_interleaved(&self, frames: usize, output: &mut [Sample]) {
        let channel_count = self.channel_count();
        assert!(output.len() >= frames * channel_count);
        for frame in 0..frames {
            for (ch, channel) in self.channels.iter().enumerate() {
                output[frame * channel_count + ch] = channel[frame];
            }
        }
    }

    /// Read `frames` interleaved frames into this buffer starting at `offset`
    pub fn read_interleaved(&mut self, offset: usize, frames: usize, input: &[Sample]) {
        let channel_count = self.channel_count();
        assert!(input.len() >= frames * channel_count);
        for frame in 0..frames {
            for (ch, channel) in self.channels.iter_mut().enumerate() {
                channel[offset + frame] = input[frame * channel_count + ch];
            }
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample *= factor;
            }
        }
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .map(|s| s.abs())
            .fold(0.0, Sample::max)
    }

    /// Root mean square over all channels and frames
    pub fn rms(&self) -> Sample {
        let count = self.frames * self.channel_count();
        if count == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .channels
            .iter()
            .flat_map(|c| c.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum / count as f64).sqrt() as Sample
    }

    /// True if every sample is finite (no NaN or infinity)
    pub fn is_finite(&self) -> bool {
        self.channels.iter().flat_map(|c| c.iter()).all(|s| s.is_finite())
    }
}

impl Index<usize> for AudioBuffer {
    type Output = [Sample];

    #[inline]
    fn index(&self, channel: usize) -> &Self::Output {
        &self.channels[channel]
    }
}

impl IndexMut<usize> for AudioBuffer {
    #[inline]
    fn index_mut(&mut self, channel: usize) -> &mut Self::Output {
        &mut self.channels[channel]
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            frames: 0,
        }
    }
}
