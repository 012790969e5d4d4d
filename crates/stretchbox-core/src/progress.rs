//! Progress and timing for offline runs

use std::time::{Duration, Instant};

/// Whole-percent progress that only ever moves forward
///
/// `update` returns the new percentage once per change, so callers can log
/// or print without spamming.
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `done` of `total`; returns the percentage if it advanced
    pub fn update(&mut self, done: u64, total: u64) -> Option<u8> {
        let percent = if total == 0 {
            100
        } else {
            (done.min(total).saturating_mul(100) / total) as u8
        };
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }

    pub fn percent(&self) -> u8 {
        self.last.unwrap_or(0)
    }
}

/// Processing speed bookkeeping for one run
///
/// DSP time is the time spent in engine calls minus the time the engine's
/// callback spent reading input, so disk speed does not skew the figure.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    sample_rate: u32,
    output_frames: u64,
    engine_time: Duration,
    read_time: Duration,
    started: Instant,
}

impl RunMetrics {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            output_frames: 0,
            engine_time: Duration::ZERO,
            read_time: Duration::ZERO,
            started: Instant::now(),
        }
    }

    /// Account one engine call
    pub fn record(&mut self, frames: usize, engine_time: Duration, read_time: Duration) {
        self.output_frames += frames as u64;
        self.engine_time += engine_time;
        self.read_time += read_time;
    }

    pub fn output_frames(&self) -> u64 {
        self.output_frames
    }

    /// Seconds of audio produced
    pub fn audio_seconds(&self) -> f64 {
        self.output_frames as f64 / self.sample_rate as f64
    }

    /// Engine time excluding input reads
    pub fn dsp_time(&self) -> Duration {
        self.engine_time.saturating_sub(self.read_time)
    }

    pub fn read_time(&self) -> Duration {
        self.read_time
    }

    pub fn wall_time(&self) -> Duration {
        self.started.elapsed()
    }

    /// How many times faster than realtime the DSP ran
    pub fn speed_vs_realtime(&self) -> f64 {
        let dsp = self.dsp_time().as_secs_f64();
        if dsp <= 0.0 {
            return f64::INFINITY;
        }
        self.audio_seconds() / dsp
    }
}
