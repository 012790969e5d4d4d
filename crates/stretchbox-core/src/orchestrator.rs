//! Region orchestrator
//!
//! Renders a list of regions, in order, through one engine bound to one
//! source. Each region is configured, rendered to exactly
//! `round(time × |length|)` frames, post-processed (reversal, then edge
//! fades) and written out; the engine is reset between regions so no state
//! leaks across a region boundary. Every region starts with a discarded
//! pre-roll of the engine's latency, so its first frame is the frame at
//! `start`.
//!
//! ```text
//! Idle -> Configuring(i) -> Processing(i) -> PostProcessing(i) -> Configuring(i+1) ... -> Finished
//! ```

use crate::engine::{EngineHandle, EngineProperty};
use crate::error::{Error, Result};
use crate::latency::{LatencyCompensator, PrerollMode};
use crate::postprocess::{fade_block, reverse_block, DEFAULT_CROSSFADE_MARGIN};
use crate::progress::ProgressTracker;
use crate::region::Region;
use crate::sink::OutputSink;
use crate::source::{FrameFeed, FrameSource};
use crate::types::{AudioBuffer, DEFAULT_BLOCK_FRAMES};

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Idle,
    Configuring(usize),
    Processing(usize),
    PostProcessing(usize),
    Finished,
}

/// Rendering options shared by all regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOptions {
    /// Frames requested from the engine per process call
    pub block_frames: usize,
    /// Fade length at both edges of each rendered region
    pub crossfade_margin: usize,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            block_frames: DEFAULT_BLOCK_FRAMES,
            crossfade_margin: DEFAULT_CROSSFADE_MARGIN,
        }
    }
}

/// Per-region outcome
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedRegion {
    pub index: usize,
    pub output_frames: usize,
    /// Frames padded with silence because the engine ran dry
    pub padded_frames: usize,
    pub reversed: bool,
}

/// Summary of a completed region run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionReport {
    pub regions: Vec<RenderedRegion>,
    pub total_frames: u64,
    pub peak_load_percent: f32,
}

/// Drives an engine through a list of regions
pub struct RegionProcessor<S: FrameSource> {
    handle: Option<EngineHandle<FrameFeed<S>>>,
    state: RegionState,
    options: RegionOptions,
    compensator: LatencyCompensator,
    block: AudioBuffer,
    scratch: AudioBuffer,
}

impl<S: FrameSource> RegionProcessor<S> {
    pub fn new(handle: EngineHandle<FrameFeed<S>>, options: RegionOptions) -> Self {
        let channels = handle.channels();
        let compensator = LatencyCompensator::for_handle(&handle);
        Self {
            handle: Some(handle),
            state: RegionState::Idle,
            options,
            compensator,
            block: AudioBuffer::silence(channels, 0),
            scratch: AudioBuffer::silence(channels, options.block_frames.max(1)),
        }
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    /// Render all regions into `sink`, in order
    ///
    /// Regions are validated up front. On any error the engine is destroyed,
    /// the state becomes `Finished` and the error is returned; frames already
    /// written to the sink stay there.
    pub fn process(
        &mut self,
        regions: &[Region],
        sink: &mut dyn OutputSink,
        mut progress: Option<&mut ProgressTracker>,
    ) -> Result<RegionReport> {
        let result = self.process_all(regions, sink, &mut progress);
        if result.is_err() {
            self.finish();
        }
        result
    }

    fn process_all(
        &mut self,
        regions: &[Region],
        sink: &mut dyn OutputSink,
        progress: &mut Option<&mut ProgressTracker>,
    ) -> Result<RegionReport> {
        let source_frames = match self.handle.as_ref() {
            Some(handle) => handle.pull().source().total_frames(),
            None => {
                return Err(Error::Configuration(
                    "region processor already finished".into(),
                ))
            }
        };
        for (index, region) in regions.iter().enumerate() {
            region.validate(index, source_frames)?;
        }

        let total: u64 = regions.iter().map(|r| r.output_frames() as u64).sum();
        let mut report = RegionReport::default();

        for (index, region) in regions.iter().enumerate() {
            let rendered = self.render_region(index, region, sink)?;
            report.total_frames += rendered.output_frames as u64;
            report.regions.push(rendered);

            if let Some(tracker) = progress.as_deref_mut() {
                if let Some(percent) = tracker.update(report.total_frames, total) {
                    log::info!("Regions: {}% ({} of {})", percent, index + 1, regions.len());
                }
            }
        }

        if let Some(handle) = self.handle.as_ref() {
            report.peak_load_percent = handle.peak_load_percent();
        }
        self.finish();
        Ok(report)
    }

    fn render_region(&mut self, index: usize, region: &Region, sink: &mut dyn OutputSink) -> Result<RenderedRegion> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::Configuration(
                "region processor already finished".into(),
            ));
        };

        self.state = RegionState::Configuring(index);
        if index > 0 {
            handle.reset(false);
        }
        handle.set_property(EngineProperty::TimeFactor, region.time_factor)?;
        handle.set_property(EngineProperty::PitchFactor, region.pitch_factor)?;
        handle.set_property(EngineProperty::FormantFactor, region.formant())?;
        handle.pull_mut().seek(region.start);

        log::debug!(
            "Region #{}: start {}, length {}, time {}, pitch {}",
            index,
            region.start,
            region.length,
            region.time_factor,
            region.pitch_factor
        );

        self.state = RegionState::Processing(index);
        self.compensator.rearm();
        self.compensator.preroll(handle, PrerollMode::Discard)?;

        let out_frames = region.output_frames();
        if self.block.len() < out_frames {
            self.block.resize(out_frames);
        }

        let block_frames = self.options.block_frames.max(1);
        let mut written = 0;
        let mut padded = 0;
        while written < out_frames {
            let want = block_frames.min(out_frames - written);
            let produced = handle.process(&mut self.scratch, want)?.min(want);
            self.block.copy_channels_from(0, written, &self.scratch, 0, produced);
            if produced < want {
                // The engine ran dry; the region still renders to its full length
                self.block.silence_range(written + produced, want - produced);
                padded += want - produced;
            }
            written += want;
        }
        if padded > 0 {
            log::warn!("Region #{}: padded {} frames of silence", index, padded);
        }

        self.state = RegionState::PostProcessing(index);
        if region.is_reversed() {
            reverse_block(&mut self.block, out_frames);
        }
        fade_block(&mut self.block, out_frames, self.options.crossfade_margin);
        sink.write(&self.block, out_frames)?;

        Ok(RenderedRegion {
            index,
            output_frames: out_frames,
            padded_frames: padded,
            reversed: region.is_reversed(),
        })
    }

    /// Destroy the engine and enter the terminal state
    fn finish(&mut self) {
        if self.handle.take().is_some() {
            log::debug!("Region run finished, engine released");
        }
        self.state = RegionState::Finished;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::delay::DelayBackend;
    use crate::engine::{Quality, VarispeedBackend};
    use crate::sink::MemorySink;
    use crate::source::MemorySource;
    use crate::types::StreamInfo;

    /// Memory source whose reads fail from `fail_from` onwards
    struct FailingSource {
        inner: MemorySource,
        fail_from: u64,
    }

    impl FrameSource for FailingSource {
        fn info(&self) -> StreamInfo {
            self.inner.info()
        }
        fn cursor(&self) -> u64 {
            self.inner.cursor()
        }
        fn seek(&mut self, frame: u64) {
            self.inner.seek(frame)
        }
        fn is_looping(&self) -> bool {
            false
        }
        fn set_looping(&mut self, _: bool) {}
        fn read_frames(&mut self, start: u64, dest: &mut AudioBuffer, offset: usize, frames: usize) -> Result<usize> {
            if start + frames as u64 > self.fail_from {
                return Err(Error::io(
                    "reading test data",
                    start,
                    std::io::Error::new(std::io::ErrorKind::Other, "disk gone"),
                ));
            }
            self.inner.read_frames(start, dest, offset, frames)
        }
    }

    fn processor(samples: Vec<f32>, margin: usize) -> RegionProcessor<MemorySource> {
        let source = MemorySource::new(AudioBuffer::from_channels(vec![samples]), 44100);
        let handle =
            EngineHandle::create(&VarispeedBackend, Quality::Good, 1, 44100, FrameFeed::new(source)).unwrap();
        RegionProcessor::new(
            handle,
            RegionOptions {
                block_frames: 32,
                crossfade_margin: margin,
            },
        )
    }

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| i as f32).collect()
    }

    #[test]
    fn test_forward_then_reversed_region() {
        let mut processor = processor(ramp(200), 0);
        let mut sink = MemorySink::new(1);
        let regions = [Region::new(0, 100, 1.0, 1.0), Region::new(100, -100, 1.0, 1.0)];

        let report = processor.process(&regions, &mut sink, None).unwrap();
        assert_eq!(report.total_frames, 200);
        assert!(report.regions[1].reversed);

        let output = sink.channel(0);
        let expected: Vec<f32> = (0..100).chain((100..200).rev()).map(|i| i as f32).collect();
        assert_eq!(output, expected.as_slice());
    }

    #[test]
    fn test_state_is_finished_after_run() {
        let mut processor = processor(ramp(100), 0);
        assert_eq!(processor.state(), RegionState::Idle);
        let mut sink = MemorySink::new(1);
        processor
            .process(&[Region::new(0, 50, 1.0, 1.0)], &mut sink, None)
            .unwrap();

        assert_eq!(processor.state(), RegionState::Finished);
        assert!(matches!(
            processor.process(&[Region::new(0, 50, 1.0, 1.0)], &mut sink, None),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_region_rejected_before_rendering() {
        let mut processor = processor(ramp(100), 0);
        let mut sink = MemorySink::new(1);
        let regions = [Region::new(0, 50, 1.0, 1.0), Region::new(0, 50, -2.0, 1.0)];

        let err = processor.process(&regions, &mut sink, None).unwrap_err();
        assert!(matches!(err, Error::InvalidRegion { index: 1, .. }));
        assert_eq!(sink.frames_written(), 0);
        assert_eq!(processor.state(), RegionState::Finished);
    }

    #[test]
    fn test_region_edges_are_faded() {
        let mut processor = processor(vec![1.0; 4000], 1024);
        let mut sink = MemorySink::new(1);
        processor
            .process(&[Region::new(0, 3000, 1.0, 1.0)], &mut sink, None)
            .unwrap();

        let output = sink.channel(0);
        assert_eq!(output.len(), 3000);
        assert_eq!(output[0], 0.0);
        assert_eq!(output[1500], 1.0);
        assert!(output[2999] < 0.01);
    }

    #[test]
    fn test_region_past_source_end_is_padded() {
        let mut processor = processor(vec![1.0; 100], 0);
        let mut sink = MemorySink::new(1);
        let report = processor
            .process(&[Region::new(50, 100, 1.0, 1.0)], &mut sink, None)
            .unwrap();

        assert_eq!(report.regions[0].output_frames, 100);
        assert_eq!(report.regions[0].padded_frames, 50);
        let output = sink.channel(0);
        assert_eq!(output[49], 1.0);
        assert_eq!(output[50], 0.0);
    }

    #[test]
    fn test_stretched_region_length() {
        let mut processor = processor(ramp(1000), 0);
        let mut sink = MemorySink::new(1);
        let mut progress = ProgressTracker::new();
        let report = processor
            .process(
                &[Region::new(0, 300, 1.5, 1.0), Region::new(300, -200, 0.5, 1.0)],
                &mut sink,
                Some(&mut progress),
            )
            .unwrap();

        assert_eq!(report.regions[0].output_frames, 450);
        assert_eq!(report.regions[1].output_frames, 100);
        assert_eq!(sink.frames_written(), 550);
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_regions_align_despite_engine_latency() {
        let source = MemorySource::new(AudioBuffer::from_channels(vec![ramp(200)]), 44100);
        let handle =
            EngineHandle::create(&DelayBackend(16), Quality::Good, 1, 44100, FrameFeed::new(source)).unwrap();
        let mut processor = RegionProcessor::new(
            handle,
            RegionOptions {
                block_frames: 32,
                crossfade_margin: 0,
            },
        );
        let mut sink = MemorySink::new(1);
        let regions = [Region::new(0, 100, 1.0, 1.0), Region::new(100, -100, 1.0, 1.0)];

        let report = processor.process(&regions, &mut sink, None).unwrap();
        assert_eq!(report.regions[0].padded_frames, 0);
        assert_eq!(report.regions[1].padded_frames, 0);

        let expected: Vec<f32> = (0..100).chain((100..200).rev()).map(|i| i as f32).collect();
        assert_eq!(sink.channel(0), expected.as_slice());
    }

    #[test]
    fn test_read_failure_mid_run_keeps_completed_regions() {
        let source = FailingSource {
            inner: MemorySource::new(AudioBuffer::from_channels(vec![ramp(400)]), 44100),
            fail_from: 250,
        };
        let handle =
            EngineHandle::create(&VarispeedBackend, Quality::Good, 1, 44100, FrameFeed::new(source)).unwrap();
        let mut processor = RegionProcessor::new(
            handle,
            RegionOptions {
                block_frames: 32,
                crossfade_margin: 0,
            },
        );
        let mut sink = MemorySink::new(1);
        let regions = [Region::new(0, 50, 1.0, 1.0), Region::new(200, 100, 1.0, 1.0)];

        let err = processor.process(&regions, &mut sink, None).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(processor.state(), RegionState::Finished);
        assert_eq!(sink.frames_written(), 50);
        assert_eq!(sink.channel(0)[49], 49.0);
    }
}
