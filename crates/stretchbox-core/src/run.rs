//! Offline whole-stream rendering
//!
//! Drives one engine over its entire source: pre-roll the startup latency,
//! then request blocks until `round(time × input length)` frames have been
//! written or the engine runs dry.

use std::time::Instant;

use crate::engine::{EngineHandle, EngineProperty};
use crate::error::Result;
use crate::latency::{LatencyCompensator, PrerollMode};
use crate::progress::{ProgressTracker, RunMetrics};
use crate::sink::OutputSink;
use crate::source::{FrameFeed, FrameSource};
use crate::types::{AudioBuffer, DEFAULT_BLOCK_FRAMES};

/// Offline run settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub block_frames: usize,
    pub preroll: PrerollMode,
    /// Output length override; defaults to round(time × input length)
    pub target_frames: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            block_frames: DEFAULT_BLOCK_FRAMES,
            preroll: PrerollMode::Discard,
            target_frames: None,
        }
    }
}

/// Outcome of an offline run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub input_frames: Option<u64>,
    pub output_frames: u64,
    /// Lead-in frames written ahead of the aligned output (retain mode)
    pub lead_in_frames: u64,
    pub latency_frames: usize,
    pub peak_load_percent: f32,
    pub metrics: RunMetrics,
}

/// Render the handle's whole source into `sink`
///
/// A source of unknown length runs until the engine returns zero. The sink
/// is not finalized; that is left to the caller.
pub fn render<S: FrameSource>(
    handle: &mut EngineHandle<FrameFeed<S>>,
    sink: &mut dyn OutputSink,
    options: &RunOptions,
    progress: &mut ProgressTracker,
) -> Result<RunReport> {
    let input_frames = handle.pull().source().total_frames();
    let time_factor = handle.property(EngineProperty::TimeFactor);
    let target = options
        .target_frames
        .or_else(|| input_frames.map(|frames| (frames as f64 * time_factor).round() as u64));

    let mut metrics = RunMetrics::new(handle.sample_rate());
    let mut compensator = LatencyCompensator::for_handle(handle);
    let mut lead_in_frames = 0;
    if let Some(lead_in) = compensator.preroll(handle, options.preroll)? {
        sink.write(&lead_in, lead_in.len())?;
        lead_in_frames = lead_in.len() as u64;
    }

    let block_frames = options.block_frames.max(1);
    let mut block = AudioBuffer::silence(handle.channels(), block_frames);
    let mut produced_total = 0u64;

    loop {
        let want = match target {
            Some(target) if produced_total >= target => break,
            Some(target) => block_frames.min((target - produced_total) as usize),
            None => block_frames,
        };

        let read_before = handle.pull().read_time();
        let started = Instant::now();
        let produced = handle.process(&mut block, want)?;
        let engine_time = started.elapsed();
        let read_time = handle.pull().read_time().saturating_sub(read_before);
        metrics.record(produced, engine_time, read_time);

        if produced == 0 {
            log::debug!("Engine ran dry after {} frames", produced_total);
            break;
        }
        sink.write(&block, produced)?;
        produced_total += produced as u64;

        if let Some(target) = target {
            if let Some(percent) = progress.update(produced_total, target) {
                log::info!("Processing: {}%", percent);
            }
        }
    }

    if let Some(target) = target {
        if produced_total < target {
            log::warn!(
                "Output ended {} frames short of {}",
                target - produced_total,
                target
            );
        }
    }

    log::info!(
        "Rendered {} frames ({:.2}s audio) in {:.2}s DSP, {:.1}x realtime, peak load {:.1}%",
        produced_total,
        metrics.audio_seconds(),
        metrics.dsp_time().as_secs_f64(),
        metrics.speed_vs_realtime(),
        handle.peak_load_percent()
    );

    Ok(RunReport {
        input_frames,
        output_frames: produced_total,
        lead_in_frames,
        latency_frames: compensator.latency_frames(),
        peak_load_percent: handle.peak_load_percent(),
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Quality, VarispeedBackend};
    use crate::sink::MemorySink;
    use crate::source::MemorySource;

    fn handle_for(frames: usize, time: f64) -> EngineHandle<FrameFeed<MemorySource>> {
        let samples: Vec<f32> = (0..frames).map(|i| (i as f32 * 0.01).sin()).collect();
        let source = MemorySource::new(AudioBuffer::from_channels(vec![samples.clone(), samples]), 44100);
        let mut handle =
            EngineHandle::create(&VarispeedBackend, Quality::Good, 2, 44100, FrameFeed::new(source)).unwrap();
        handle.set_property(EngineProperty::TimeFactor, time).unwrap();
        handle
    }

    #[test]
    fn test_render_hits_target_length() {
        let mut handle = handle_for(8000, 1.25);
        let mut sink = MemorySink::new(2);
        let options = RunOptions {
            block_frames: 4096,
            ..Default::default()
        };
        let report = render(&mut handle, &mut sink, &options, &mut ProgressTracker::new()).unwrap();

        assert_eq!(report.output_frames, 10000);
        assert_eq!(sink.frames_written(), 10000);
        assert_eq!(report.input_frames, Some(8000));
        assert_eq!(report.lead_in_frames, 0);
    }

    #[test]
    fn test_render_reports_progress_to_completion() {
        let mut handle = handle_for(1000, 0.5);
        let mut sink = MemorySink::new(2);
        let mut progress = ProgressTracker::new();
        let options = RunOptions {
            block_frames: 64,
            ..Default::default()
        };
        render(&mut handle, &mut sink, &options, &mut progress).unwrap();
        assert_eq!(progress.percent(), 100);
        assert_eq!(sink.frames_written(), 500);
    }

    #[test]
    fn test_explicit_target_overrides_length() {
        let mut handle = handle_for(1000, 1.0);
        let mut sink = MemorySink::new(2);
        let options = RunOptions {
            block_frames: 100,
            target_frames: Some(250),
            ..Default::default()
        };
        let report = render(&mut handle, &mut sink, &options, &mut ProgressTracker::new()).unwrap();
        assert_eq!(report.output_frames, 250);
    }
}
