//! Output sinks
//!
//! Rendered frames are written through [`OutputSink`]. The WAV sink writes
//! through hound and flushes after every block, so a run that fails halfway
//! leaves a valid file holding everything produced so far.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{AudioBuffer, SampleEncoding};

/// Destination for rendered frames
pub trait OutputSink {
    fn channels(&self) -> usize;

    /// Append `buffer[0..frames]`
    fn write(&mut self, buffer: &AudioBuffer, frames: usize) -> Result<()>;

    /// Complete the output; further writes are an error
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    fn frames_written(&self) -> u64;
}

/// Collects output in memory
#[derive(Debug, Clone)]
pub struct MemorySink {
    channels: Vec<Vec<f32>>,
}

impl MemorySink {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: vec![Vec::new(); channels],
        }
    }

    pub fn into_buffer(self) -> AudioBuffer {
        AudioBuffer::from_channels(self.channels)
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }
}

impl OutputSink for MemorySink {
    fn channels(&self) -> usize {
        self.channels.len()
    }

    fn write(&mut self, buffer: &AudioBuffer, frames: usize) -> Result<()> {
        for (ch, out) in self.channels.iter_mut().enumerate() {
            out.extend_from_slice(&buffer.channel(ch)[..frames]);
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.channels.first().map(|c| c.len() as u64).unwrap_or(0)
    }
}

/// Writes a WAV file
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    channels: usize,
    encoding: SampleEncoding,
    frames_written: u64,
}

impl WavSink {
    /// Create `path` for `channels` channels in the given encoding
    ///
    /// Supported encodings are 8/16/24/32-bit integer and 32-bit float.
    pub fn create<P: AsRef<Path>>(
        path: P,
        sample_rate: u32,
        channels: usize,
        encoding: SampleEncoding,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = hound::WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: encoding.bit_depth(),
            sample_format: if encoding.is_float() {
                hound::SampleFormat::Float
            } else {
                hound::SampleFormat::Int
            },
        };
        let writer = hound::WavWriter::create(&path, spec)?;
        log::info!(
            "Writing {:?}: {} Hz, {} ch, {}-bit{}",
            path,
            sample_rate,
            channels,
            encoding.bit_depth(),
            if encoding.is_float() { " float" } else { "" }
        );

        Ok(Self {
            writer: Some(writer),
            path,
            channels,
            encoding,
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Inverse of the decoder's scaling: full scale is 2^(bits-1), clipped to the integer range
fn quantize(sample: f32, bits: u32) -> i32 {
    let scale = (1i64 << (bits - 1)) as f64;
    (sample as f64 * scale).round().clamp(-scale, scale - 1.0) as i32
}

impl OutputSink for WavSink {
    fn channels(&self) -> usize {
        self.channels
    }

    fn write(&mut self, buffer: &AudioBuffer, frames: usize) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::Format(format!("{:?} already finalized", self.path)))?;

        for frame in 0..frames {
            for ch in 0..self.channels {
                let sample = buffer[ch][frame];
                match self.encoding {
                    SampleEncoding::Float32 => writer.write_sample(sample)?,
                    SampleEncoding::Int8 | SampleEncoding::UInt8 => {
                        writer.write_sample(quantize(sample, 8) as i8)?
                    }
                    SampleEncoding::Int16 => writer.write_sample(quantize(sample, 16) as i16)?,
                    SampleEncoding::Int24 => writer.write_sample(quantize(sample, 24))?,
                    SampleEncoding::Int32 => writer.write_sample(quantize(sample, 32))?,
                }
            }
        }
        // Keep the header consistent with what is on disk
        writer.flush()?;
        self.frames_written += frames as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            log::info!("Finalized {:?} ({} frames)", self.path, self.frames_written);
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            log::warn!("Failed to finalize {:?}: {}", self.path, e);
        }
    }
}

/// Routes consecutive channel slices of the output to separate sinks
///
/// The inverse of multiplexing: with one sink per input file, each file's
/// processed channels land in their own output.
pub struct ChannelSplitSink {
    sinks: Vec<Box<dyn OutputSink>>,
    scratch: Vec<AudioBuffer>,
}

impl ChannelSplitSink {
    pub fn new(sinks: Vec<Box<dyn OutputSink>>) -> Self {
        let scratch = sinks.iter().map(|s| AudioBuffer::silence(s.channels(), 0)).collect();
        Self { sinks, scratch }
    }

    pub fn into_sinks(self) -> Vec<Box<dyn OutputSink>> {
        self.sinks
    }
}

impl OutputSink for ChannelSplitSink {
    fn channels(&self) -> usize {
        self.sinks.iter().map(|s| s.channels()).sum()
    }

    fn write(&mut self, buffer: &AudioBuffer, frames: usize) -> Result<()> {
        let mut first = 0;
        for (sink, scratch) in self.sinks.iter_mut().zip(self.scratch.iter_mut()) {
            let count = sink.channels();
            if scratch.len() < frames {
                scratch.resize(frames);
            }
            for ch in 0..count {
                scratch[ch][..frames].copy_from_slice(&buffer[first + ch][..frames]);
            }
            sink.write(scratch, frames)?;
            first += count;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            sink.finalize()?;
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.sinks.iter().map(|s| s.frames_written()).min().unwrap_or(0)
    }
}
