//! Region list rendering

use std::path::Path;

use anyhow::{Context, Result};
use stretchbox_core::config::{load_regions, ProcessingConfig};
use stretchbox_core::progress::ProgressTracker;
use stretchbox_core::sink::{OutputSink, WavSink};
use stretchbox_core::source::WavFileSource;
use stretchbox_core::{EngineHandle, FrameFeed, FrameSource, RegionProcessor};

/// Render every region of `regions_path` from `input` into one `output` file
///
/// Time, pitch and formant come from each region; the global factors in
/// `config` are not used here.
pub fn run(input: &Path, regions_path: &Path, output: &Path, config: &ProcessingConfig) -> Result<()> {
    let regions = load_regions(regions_path)?;
    let source = WavFileSource::open(input).with_context(|| format!("Failed to open {:?}", input))?;
    let info = source.info();
    let (channels, sample_rate) = (info.channels, info.sample_rate);
    let encoding = config.output_encoding(info.encoding)?;

    let backend = config.engine.backend()?;
    let handle = EngineHandle::create(
        backend.as_ref(),
        config.quality,
        channels,
        sample_rate,
        FrameFeed::new(source),
    )?;
    let mut processor = RegionProcessor::new(handle, config.region_options());

    let mut sink = WavSink::create(output, sample_rate, channels, encoding)
        .with_context(|| format!("Failed to create {:?}", output))?;
    let mut progress = ProgressTracker::new();
    let report = processor
        .process(&regions, &mut sink, Some(&mut progress))
        .with_context(|| format!("Rendering regions of {:?}", input))?;
    sink.finalize()?;

    log::info!(
        "Done: {} regions, {} frames, peak load {:.1}%",
        report.regions.len(),
        report.total_frames,
        report.peak_load_percent
    );
    Ok(())
}
