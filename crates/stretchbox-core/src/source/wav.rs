//! WAV file frame source
//!
//! Parses RIFF/RF64 chunk headers directly and reads the `data` chunk in
//! place, so arbitrarily long files stream without being loaded. Reads are
//! blocking; the file is only repositioned when a request does not continue
//! where the previous one ended.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::{normalize_position, read_with_wrap, FrameSource, MemorySource};
use crate::decode::decode_interleaved;
use crate::error::{Error, Result};
use crate::types::{AudioBuffer, SampleEncoding, StreamInfo};

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Audio format from the fmt chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WavFormat {
    fn parse(fmt_data: &[u8]) -> Result<Self> {
        if fmt_data.len() < 16 {
            return Err(Error::Format("fmt chunk too small".into()));
        }
        let mut format_tag = u16::from_le_bytes([fmt_data[0], fmt_data[1]]);
        // Extensible headers carry the real format in the sub-format GUID
        if format_tag == WAVE_FORMAT_EXTENSIBLE && fmt_data.len() >= 26 {
            format_tag = u16::from_le_bytes([fmt_data[24], fmt_data[25]]);
        }
        Ok(Self {
            format_tag,
            channels: u16::from_le_bytes([fmt_data[2], fmt_data[3]]),
            sample_rate: u32::from_le_bytes([fmt_data[4], fmt_data[5], fmt_data[6], fmt_data[7]]),
            block_align: u16::from_le_bytes([fmt_data[12], fmt_data[13]]),
            bits_per_sample: u16::from_le_bytes([fmt_data[14], fmt_data[15]]),
        })
    }

    /// Sample encoding, or an error for layouts the decoder cannot handle
    pub fn encoding(&self) -> Result<SampleEncoding> {
        match (self.format_tag, self.bits_per_sample) {
            (WAVE_FORMAT_PCM, 8) => Ok(SampleEncoding::UInt8),
            (WAVE_FORMAT_PCM, 16) => Ok(SampleEncoding::Int16),
            (WAVE_FORMAT_PCM, 24) => Ok(SampleEncoding::Int24),
            (WAVE_FORMAT_PCM, 32) => Ok(SampleEncoding::Int32),
            (WAVE_FORMAT_IEEE_FLOAT, 32) => Ok(SampleEncoding::Float32),
            (tag, bits) => Err(Error::Format(format!(
                "unsupported sample format (tag {}, {}-bit)",
                tag, bits
            ))),
        }
    }

    fn validate(&self) -> Result<SampleEncoding> {
        let encoding = self.encoding()?;
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(Error::Format(format!(
                "{} channels at {} Hz",
                self.channels, self.sample_rate
            )));
        }
        let expected = self.channels as usize * encoding.bytes_per_sample();
        if self.block_align as usize != expected {
            return Err(Error::Format(format!(
                "block align {} does not match {} channels of {}-bit",
                self.block_align, self.channels, self.bits_per_sample
            )));
        }
        Ok(encoding)
    }
}

/// Streaming frame source over a WAV file
#[derive(Debug)]
pub struct WavFileSource {
    reader: BufReader<File>,
    path: PathBuf,
    format: WavFormat,
    info: StreamInfo,
    data_offset: u64,
    /// Frame the file handle is positioned at
    file_frame: u64,
    cursor: u64,
    looping: bool,
    scratch: Vec<u8>,
}

impl WavFileSource {
    /// Open a WAV file and locate its fmt and data chunks
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::io("opening wav file", 0, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| Error::io("opening wav file", 0, e))?
            .len();
        let mut reader = BufReader::new(file);
        let header_err = |e| Error::io("reading wav header", 0, e);

        let mut riff_id = [0u8; 4];
        reader.read_exact(&mut riff_id).map_err(header_err)?;
        let is_rf64 = match &riff_id {
            b"RIFF" => false,
            b"RF64" => true,
            _ => return Err(Error::Format("not a RIFF/RF64 file".into())),
        };

        let mut size_bytes = [0u8; 4];
        reader.read_exact(&mut size_bytes).map_err(header_err)?;
        let mut wave_id = [0u8; 4];
        reader.read_exact(&mut wave_id).map_err(header_err)?;
        if &wave_id != b"WAVE" {
            return Err(Error::Format("not a WAVE file".into()));
        }

        let mut format: Option<WavFormat> = None;
        let mut data_offset: Option<u64> = None;
        let mut data_size: Option<u64> = None;
        let mut rf64_data_size: Option<u64> = None;

        loop {
            let mut chunk_id = [0u8; 4];
            if reader.read_exact(&mut chunk_id).is_err() {
                break;
            }
            let mut chunk_size = [0u8; 4];
            reader.read_exact(&mut chunk_size).map_err(header_err)?;
            let chunk_size = u32::from_le_bytes(chunk_size) as u64;

            match &chunk_id {
                b"ds64" if is_rf64 => {
                    let mut ds64 = vec![0u8; chunk_size as usize];
                    reader.read_exact(&mut ds64).map_err(header_err)?;
                    if ds64.len() >= 16 {
                        let mut size = [0u8; 8];
                        size.copy_from_slice(&ds64[8..16]);
                        rf64_data_size = Some(u64::from_le_bytes(size));
                    }
                }
                b"fmt " => {
                    let mut fmt_data = vec![0u8; chunk_size as usize];
                    reader.read_exact(&mut fmt_data).map_err(header_err)?;
                    format = Some(WavFormat::parse(&fmt_data)?);
                }
                b"data" => {
                    let offset = reader.stream_position().map_err(header_err)?;
                    let size = rf64_data_size.unwrap_or(chunk_size);
                    data_offset = Some(offset);
                    data_size = Some(size);
                    // Streamed files may leave a placeholder size; trust the file length
                    if offset + size >= file_len {
                        break;
                    }
                    reader
                        .seek(SeekFrom::Current(size as i64))
                        .map_err(header_err)?;
                }
                _ => {
                    reader
                        .seek(SeekFrom::Current(chunk_size as i64))
                        .map_err(header_err)?;
                }
            }

            // Chunks are word aligned
            if chunk_size % 2 != 0 {
                reader.seek(SeekFrom::Current(1)).map_err(header_err)?;
            }
        }

        let format = format.ok_or_else(|| Error::Format("missing fmt chunk".into()))?;
        let data_offset = data_offset.ok_or_else(|| Error::Format("missing data chunk".into()))?;
        let data_size = data_size
            .unwrap_or(0)
            .min(file_len.saturating_sub(data_offset));
        let encoding = format.validate()?;

        let frames = data_size / format.block_align as u64;
        let info = StreamInfo::new(
            format.sample_rate,
            format.channels as usize,
            Some(frames),
            encoding,
        );

        log::info!(
            "Opened {:?}: {} Hz, {} ch, {}-bit, {} frames",
            path,
            format.sample_rate,
            format.channels,
            format.bits_per_sample,
            frames
        );

        reader
            .seek(SeekFrom::Start(data_offset))
            .map_err(|e| Error::io("seeking to wav data", 0, e))?;

        Ok(Self {
            reader,
            path,
            format,
            info,
            data_offset,
            file_frame: 0,
            cursor: 0,
            looping: false,
            scratch: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &WavFormat {
        &self.format
    }

    /// Decode the whole file into a resident [`MemorySource`]
    pub fn into_memory(mut self) -> Result<MemorySource> {
        let frames = self.info.total_frames.unwrap_or(0) as usize;
        let mut buffer = AudioBuffer::silence(self.info.channels, frames);
        let got = self.read_frames(0, &mut buffer, 0, frames)?;
        buffer.resize(got);
        Ok(MemorySource::new(buffer, self.info.sample_rate).looping(self.looping))
    }

    /// Read one contiguous span that does not cross the end of the data chunk
    fn read_span(&mut self, start: u64, dest: &mut AudioBuffer, offset: usize, frames: usize) -> Result<usize> {
        let block_align = self.format.block_align as usize;
        if start != self.file_frame {
            let position = self.data_offset + start * block_align as u64;
            self.reader
                .seek(SeekFrom::Start(position))
                .map_err(|e| Error::io("seeking wav data", start, e))?;
            self.file_frame = start;
        }

        self.scratch.resize(frames * block_align, 0);
        let bytes = read_fully(&mut self.reader, &mut self.scratch)
            .map_err(|e| Error::io("reading wav data", start, e))?;
        let got = bytes / block_align;
        self.file_frame = start + got as u64;

        if let Err(e) = decode_interleaved(
            &self.scratch[..got * block_align],
            self.info.encoding,
            dest,
            offset,
        ) {
            log::warn!("Decode failed at frame {}: {}, substituting silence", start, e);
            dest.silence_range(offset, got);
        }
        Ok(got)
    }
}

/// Fill `buf` as far as the reader allows, returning the bytes read
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl FrameSource for WavFileSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn cursor(&self) -> u64 {
        self.cursor
    }

    fn seek(&mut self, frame: u64) {
        self.cursor = normalize_position(frame, self.info.total_frames, self.looping);
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
        let total = self.info.total_frames;
        let looping = self.looping;
        let (written, next) = read_with_wrap(start, total, looping, offset, frames, |position, dest_offset, count| {
            self.read_span(position, dest, dest_offset, count)
        })?;
        self.cursor = next;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_wav_bytes(path: &Path, format_tag: u16, channels: u16, bits: u16, data: &[u8], extra_chunk: bool) {
        let block_align = channels * bits / 8;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&format_tag.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&44100u32.to_le_bytes());
        out.extend_from_slice(&(44100 * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        if extra_chunk {
            out.extend_from_slice(b"LIST");
            out.extend_from_slice(&3u32.to_le_bytes());
            out.extend_from_slice(&[1, 2, 3, 0]);
        }
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        let mut file = File::create(path).unwrap();
        file.write_all(&out).unwrap();
    }

    fn int16_ramp(frames: i16) -> Vec<u8> {
        (0..frames).flat_map(|i| (i * 10).to_le_bytes()).collect()
    }

    #[test]
    fn test_open_reads_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_wav_bytes(&path, WAVE_FORMAT_PCM, 1, 16, &int16_ramp(100), true);

        let source = WavFileSource::open(&path).unwrap();
        let info = source.info();
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 1);
        assert_eq!(info.total_frames, Some(100));
        assert_eq!(info.encoding, SampleEncoding::Int16);
    }

    #[test]
    fn test_sequential_and_random_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_wav_bytes(&path, WAVE_FORMAT_PCM, 1, 16, &int16_ramp(100), false);

        let mut source = WavFileSource::open(&path).unwrap();
        let mut dest = AudioBuffer::silence(1, 10);
        assert_eq!(source.read_next(&mut dest, 0, 10).unwrap(), 10);
        assert_eq!(source.read_next(&mut dest, 0, 10).unwrap(), 10);
        assert_eq!(dest[0][0], 100.0 / 32768.0);

        assert_eq!(source.read_frames(50, &mut dest, 0, 10).unwrap(), 10);
        assert_eq!(dest[0][0], 500.0 / 32768.0);
        assert_eq!(source.cursor(), 60);
    }

    #[test]
    fn test_looping_file_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_wav_bytes(&path, WAVE_FORMAT_PCM, 1, 16, &int16_ramp(50), false);

        let mut source = WavFileSource::open(&path).unwrap();
        source.set_looping(true);
        let mut dest = AudioBuffer::silence(1, 10);

        assert_eq!(source.read_frames(45, &mut dest, 0, 10).unwrap(), 10);
        assert_eq!(dest[0][4], 490.0 / 32768.0);
        assert_eq!(dest[0][5], 0.0);
        assert_eq!(dest[0][9], 40.0 / 32768.0);
        assert_eq!(source.cursor(), 5);
    }

    #[test]
    fn test_float_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let data: Vec<u8> = [0.5f32, -0.5, 0.25, -0.25]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        write_wav_bytes(&path, WAVE_FORMAT_IEEE_FLOAT, 2, 32, &data, false);

        let source = WavFileSource::open(&path).unwrap();
        let memory = source.into_memory().unwrap();
        assert_eq!(memory.buffer().channel(0), &[0.5, 0.25]);
        assert_eq!(memory.buffer().channel(1), &[-0.5, -0.25]);
    }

    #[test]
    fn test_truncated_data_chunk_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav_bytes(&path, WAVE_FORMAT_PCM, 1, 16, &int16_ramp(20), false);
        // Chop the last 5 frames off without fixing the header
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        let mut source = WavFileSource::open(&path).unwrap();
        assert_eq!(source.info().total_frames, Some(15));
        let mut dest = AudioBuffer::silence(1, 20);
        assert_eq!(source.read_next(&mut dest, 0, 20).unwrap(), 15);
    }

    #[test]
    fn test_rejects_non_wave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.wav");
        std::fs::write(&path, b"OggS not a wav file").unwrap();
        assert!(matches!(WavFileSource::open(&path), Err(Error::Format(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = WavFileSource::open("/nonexistent/stretchbox/input.wav").unwrap_err();
        assert!(matches!(err, Error::Io { stage: "opening wav file", .. }));
    }
}
