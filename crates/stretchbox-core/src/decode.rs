//! Raw PCM to float conversion
//!
//! Converts fixed-point (and little-endian float) sample bytes into the
//! canonical `f32` representation in [-1, 1). The encoding is matched once per
//! call and the per-sample conversion is monomorphized into the loop.

use crate::error::DecodeError;
use crate::types::{AudioBuffer, Sample, SampleEncoding};

const SCALE_8: f32 = 1.0 / 128.0;
const SCALE_16: f32 = 1.0 / 32768.0;
const SCALE_32: f64 = 1.0 / 2147483648.0; // 2^31

#[inline(always)]
fn int8(b: &[u8]) -> Sample {
    (b[0] as i8) as f32 * SCALE_8
}

#[inline(always)]
fn uint8(b: &[u8]) -> Sample {
    (b[0] as i16 - 128) as f32 * SCALE_8
}

#[inline(always)]
fn int16(b: &[u8]) -> Sample {
    i16::from_le_bytes([b[0], b[1]]) as f32 * SCALE_16
}

/// The three packed bytes occupy the upper 24 bits of the i32, so the sign
/// bit of the most significant byte becomes the i32 sign bit.
#[inline(always)]
fn int24(b: &[u8]) -> Sample {
    let value = i32::from_le_bytes([0, b[0], b[1], b[2]]);
    (value as f64 * SCALE_32) as f32
}

#[inline(always)]
fn int32(b: &[u8]) -> Sample {
    let value = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    (value as f64 * SCALE_32) as f32
}

#[inline(always)]
fn float32(b: &[u8]) -> Sample {
    f32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn check_aligned(raw: &[u8], width: usize) -> Result<usize, DecodeError> {
    if raw.len() % width != 0 {
        return Err(DecodeError::Misaligned {
            len: raw.len(),
            width,
        });
    }
    Ok(raw.len() / width)
}

/// Decode raw fixed-point samples of the given bit depth
///
/// Supported depths are 8, 16, 24 and 32 (signed, little endian). Writes one
/// float per raw sample into `dest` and returns the number written. An
/// unsupported depth, a byte length that is not a whole number of samples or
/// a `dest` too short for them writes nothing.
pub fn decode(raw: &[u8], bit_depth: u16, dest: &mut [Sample]) -> Result<usize, DecodeError> {
    let encoding =
        SampleEncoding::from_bit_depth(bit_depth).ok_or(DecodeError::UnsupportedEncoding(bit_depth))?;
    decode_encoding(raw, encoding, dest)
}

/// Decode raw samples of an explicit encoding into `dest`
pub fn decode_encoding(
    raw: &[u8],
    encoding: SampleEncoding,
    dest: &mut [Sample],
) -> Result<usize, DecodeError> {
    let width = encoding.bytes_per_sample();
    let count = check_aligned(raw, width)?;
    if dest.len() < count {
        return Err(DecodeError::DestinationTooSmall {
            required: count,
            available: dest.len(),
        });
    }

    fn run(raw: &[u8], width: usize, dest: &mut [Sample], convert: impl Fn(&[u8]) -> Sample) {
        for (d, bytes) in dest.iter_mut().zip(raw.chunks_exact(width)) {
            *d = convert(bytes);
        }
    }

    match encoding {
        SampleEncoding::Int8 => run(raw, width, dest, int8),
        SampleEncoding::UInt8 => run(raw, width, dest, uint8),
        SampleEncoding::Int16 => run(raw, width, dest, int16),
        SampleEncoding::Int24 => run(raw, width, dest, int24),
        SampleEncoding::Int32 => run(raw, width, dest, int32),
        SampleEncoding::Float32 => run(raw, width, dest, float32),
    }

    Ok(count)
}

/// Decode interleaved raw frames straight into a planar buffer
///
/// `raw` holds whole frames of `dest.channel_count()` samples. Frames land in
/// `dest` starting at frame `offset`. Returns the number of frames written.
pub fn decode_interleaved(
    raw: &[u8],
    encoding: SampleEncoding,
    dest: &mut AudioBuffer,
    offset: usize,
) -> Result<usize, DecodeError> {
    let channels = dest.channel_count();
    let width = encoding.bytes_per_sample();
    let frame_width = width * channels;
    let frames = check_aligned(raw, frame_width)?;
    if offset + frames > dest.len() {
        return Err(DecodeError::DestinationTooSmall {
            required: offset + frames,
            available: dest.len(),
        });
    }

    fn run(
        raw: &[u8],
        width: usize,
        frame_width: usize,
        dest: &mut AudioBuffer,
        offset: usize,
        convert: impl Fn(&[u8]) -> Sample,
    ) {
        for (frame, bytes) in raw.chunks_exact(frame_width).enumerate() {
            for (ch, sample) in bytes.chunks_exact(width).enumerate() {
                dest[ch][offset + frame] = convert(sample);
            }
        }
    }

    match encoding {
        SampleEncoding::Int8 => run(raw, width, frame_width, dest, offset, int8),
        SampleEncoding::UInt8 => run(raw, width, frame_width, dest, offset, uint8),
        SampleEncoding::Int16 => run(raw, width, frame_width, dest, offset, int16),
        SampleEncoding::Int24 => run(raw, width, frame_width, dest, offset, int24),
        SampleEncoding::Int32 => run(raw, width, frame_width, dest, offset, int32),
        SampleEncoding::Float32 => run(raw, width, frame_width, dest, offset, float32),
    }

    Ok(frames)
}
