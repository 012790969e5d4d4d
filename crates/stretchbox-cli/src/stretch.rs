//! Whole-file stretching, multiplexed or one engine per file

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use stretchbox_core::config::ProcessingConfig;
use stretchbox_core::progress::ProgressTracker;
use stretchbox_core::run::{render, RunReport};
use stretchbox_core::sink::{ChannelSplitSink, OutputSink, WavSink};
use stretchbox_core::source::{MultiplexSource, WavFileSource};
use stretchbox_core::{EngineHandle, EngineProperty, FrameFeed, FrameSource};

/// Run one engine over all inputs as a single multi-channel stream
///
/// Each input's channels are written back out to its own file, in that
/// input's encoding unless one is configured, so the outputs stay
/// phase-aligned with each other.
pub fn run_multiplexed(inputs: &[PathBuf], outputs: &[PathBuf], config: &ProcessingConfig) -> Result<()> {
    let mut sources: Vec<Box<dyn FrameSource>> = Vec::with_capacity(inputs.len());
    for input in inputs {
        sources.push(Box::new(open_input(input, config)?));
    }

    let layouts: Vec<_> = sources.iter().map(|s| s.info()).collect();
    let source = MultiplexSource::new(sources).context("Inputs cannot be processed together")?;

    let mut sinks: Vec<Box<dyn OutputSink>> = Vec::with_capacity(outputs.len());
    for (info, output) in layouts.into_iter().zip(outputs) {
        let encoding = config.output_encoding(info.encoding)?;
        let sink = WavSink::create(output, info.sample_rate, info.channels, encoding)
            .with_context(|| format!("Failed to create {:?}", output))?;
        sinks.push(Box::new(sink));
    }

    let mut sink = ChannelSplitSink::new(sinks);
    let report = stretch_source(source, &mut sink, config)?;
    sink.finalize()?;

    log::info!(
        "Done: {} file(s), {} frames each, {:.1}x realtime",
        inputs.len(),
        report.output_frames,
        report.metrics.speed_vs_realtime()
    );
    Ok(())
}

/// Run an independent engine per input, in parallel
///
/// Every file is attempted; failures are logged and reported together.
pub fn run_separate(inputs: &[PathBuf], outputs: &[PathBuf], config: &ProcessingConfig) -> Result<()> {
    let failures: Vec<(usize, anyhow::Error)> = inputs
        .par_iter()
        .zip(outputs.par_iter())
        .enumerate()
        .filter_map(|(index, (input, output))| {
            stretch_file(input, output, config)
                .map_err(|e| {
                    log::error!("{:?}: {:#}", input, e);
                    (index, e)
                })
                .err()
        })
        .collect();

    if !failures.is_empty() {
        bail!("{} of {} files failed", failures.len(), inputs.len());
    }
    log::info!("Done: {} file(s)", inputs.len());
    Ok(())
}

fn stretch_file(input: &Path, output: &Path, config: &ProcessingConfig) -> Result<RunReport> {
    let source = open_input(input, config)?;
    let info = source.info();
    let encoding = config.output_encoding(info.encoding)?;
    let mut sink = WavSink::create(output, info.sample_rate, info.channels, encoding)
        .with_context(|| format!("Failed to create {:?}", output))?;
    let report = stretch_source(source, &mut sink, config)?;
    sink.finalize()?;
    Ok(report)
}

fn open_input(path: &Path, config: &ProcessingConfig) -> Result<WavFileSource> {
    let mut source = WavFileSource::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    source.set_looping(config.looping);
    Ok(source)
}

/// Create the configured engine over `source` and render all of it into `sink`
pub fn stretch_source<S: FrameSource>(
    source: S,
    sink: &mut dyn OutputSink,
    config: &ProcessingConfig,
) -> Result<RunReport> {
    let backend = config.engine.backend()?;
    let mut handle = EngineHandle::create(
        backend.as_ref(),
        config.quality,
        source.channels(),
        source.sample_rate(),
        FrameFeed::new(source),
    )?;
    handle.set_property(EngineProperty::TimeFactor, config.time_factor)?;
    handle.set_property(EngineProperty::PitchFactor, config.pitch_factor)?;
    handle.set_property(EngineProperty::FormantFactor, config.formant())?;

    let report = render(&mut handle, sink, &config.run_options(), &mut ProgressTracker::new())?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stretchbox_core::EngineKind;

    fn write_wav(path: &Path, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            writer.write_sample(((i % 200) as i16 - 100) * 50).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn varispeed(time_factor: f64) -> ProcessingConfig {
        ProcessingConfig {
            engine: EngineKind::Varispeed,
            time_factor,
            block_frames: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_multiplexed_outputs_keep_channel_layout() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![dir.path().join("mono.wav"), dir.path().join("stereo.wav")];
        write_wav(&inputs[0], 1, 3000);
        write_wav(&inputs[1], 2, 3000);
        let outputs = crate::paths::output_paths(&inputs, None, "processed-").unwrap();

        run_multiplexed(&inputs, &outputs, &varispeed(2.0)).unwrap();

        let mono = hound::WavReader::open(&outputs[0]).unwrap();
        let stereo = hound::WavReader::open(&outputs[1]).unwrap();
        assert_eq!(mono.spec().channels, 1);
        assert_eq!(stereo.spec().channels, 2);
        assert_eq!(mono.duration(), 6000);
        assert_eq!(stereo.duration(), 6000);
    }

    #[test]
    fn test_separate_reports_every_failure() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![dir.path().join("good.wav"), dir.path().join("missing.wav")];
        write_wav(&inputs[0], 1, 1000);
        let outputs = crate::paths::output_paths(&inputs, None, "processed-").unwrap();

        assert!(run_separate(&inputs, &outputs, &varispeed(0.5)).is_err());
        let good = hound::WavReader::open(&outputs[0]).unwrap();
        assert_eq!(good.duration(), 500);
    }

    #[test]
    fn test_outputs_keep_input_encoding_unless_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![dir.path().join("wide.wav"), dir.path().join("float.wav")];
        let widths = [
            (24, hound::SampleFormat::Int),
            (32, hound::SampleFormat::Float),
        ];
        for (path, (bits, format)) in inputs.iter().zip(widths) {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: 22050,
                bits_per_sample: bits,
                sample_format: format,
            };
            let mut writer = hound::WavWriter::create(path, spec).unwrap();
            for i in 0..500 {
                match format {
                    hound::SampleFormat::Int => writer.write_sample(i * 1000).unwrap(),
                    hound::SampleFormat::Float => writer.write_sample(i as f32 / 1000.0).unwrap(),
                }
            }
            writer.finalize().unwrap();
        }
        let outputs = crate::paths::output_paths(&inputs, None, "processed-").unwrap();

        run_separate(&inputs, &outputs, &varispeed(1.0)).unwrap();
        let wide = hound::WavReader::open(&outputs[0]).unwrap().spec();
        let float = hound::WavReader::open(&outputs[1]).unwrap().spec();
        assert_eq!((wide.bits_per_sample, wide.sample_format), (24, hound::SampleFormat::Int));
        assert_eq!((float.bits_per_sample, float.sample_format), (32, hound::SampleFormat::Float));

        let config = ProcessingConfig {
            output_bit_depth: Some(16),
            ..varispeed(1.0)
        };
        run_multiplexed(&inputs, &outputs, &config).unwrap();
        for output in &outputs {
            assert_eq!(hound::WavReader::open(output).unwrap().spec().bits_per_sample, 16);
        }
    }
}
