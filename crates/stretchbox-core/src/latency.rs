//! Startup latency compensation
//!
//! A fresh engine emits `latency` frames of lead-in before output lines up
//! with the input. Offline runs pre-roll exactly that much input once, before
//! the first real process call, so the first kept output frame corresponds to
//! input frame 0. The realtime driver instead renders the lead-in into its own
//! block and drops it, which needs no allocation.

use serde::{Deserialize, Serialize};

use crate::engine::{EngineHandle, EngineProperty, PullCallback};
use crate::error::Result;
use crate::types::AudioBuffer;

/// What happens to the output produced while pre-rolling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrerollMode {
    /// Drop the lead-in (offline rendering)
    #[default]
    Discard,
    /// Hand the lead-in back to the caller
    Retain,
}

/// One-shot pre-roll for a single engine run
#[derive(Debug)]
pub struct LatencyCompensator {
    latency: usize,
    consumed: bool,
}

impl LatencyCompensator {
    pub fn new(latency: usize) -> Self {
        Self {
            latency,
            consumed: false,
        }
    }

    /// Compensator sized to a handle's reported latency
    pub fn for_handle<P: PullCallback>(handle: &EngineHandle<P>) -> Self {
        Self::new(handle.latency_frames())
    }

    pub fn latency_frames(&self) -> usize {
        self.latency
    }

    /// Whether the pre-roll has already run
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Allow another pre-roll, e.g. after the engine was reset
    pub fn rearm(&mut self) {
        self.consumed = false;
    }

    /// Read `latency` input frames through the handle's callback and push them
    /// through one process call
    ///
    /// The callback's cursor ends up `latency` frames further on. Returns the
    /// lead-in output for [`PrerollMode::Retain`], `None` otherwise. Calling it
    /// again is a no-op.
    pub fn preroll<P: PullCallback>(
        &mut self,
        handle: &mut EngineHandle<P>,
        mode: PrerollMode,
    ) -> Result<Option<AudioBuffer>> {
        if self.consumed {
            log::debug!("Pre-roll already consumed, skipping");
            return Ok(None);
        }
        self.consumed = true;
        if self.latency == 0 {
            return Ok(None);
        }

        let mut block = AudioBuffer::silence(handle.channels(), self.latency);
        let read = handle.pull_mut().pull(&mut block, self.latency)?;
        if read < self.latency {
            log::warn!(
                "Input shorter than engine latency ({} < {} frames)",
                read,
                self.latency
            );
            block.silence_range(read, self.latency - read);
        }

        let time_factor = handle.property(EngineProperty::TimeFactor);
        let out_frames = ((self.latency as f64) * time_factor).round().max(1.0) as usize;
        let mut lead_in = AudioBuffer::silence(handle.channels(), out_frames);
        let produced = handle.process_prefed(&mut lead_in, out_frames, &block, read)?;

        log::debug!(
            "Pre-rolled {} input frames, {} lead-in frames {}",
            read,
            produced,
            match mode {
                PrerollMode::Discard => "discarded",
                PrerollMode::Retain => "retained",
            }
        );

        match mode {
            PrerollMode::Discard => Ok(None),
            PrerollMode::Retain => {
                lead_in.resize(produced);
                Ok(Some(lead_in))
            }
        }
    }

    /// Render and drop the lead-in through `scratch`, without pre-reading
    ///
    /// The engine pulls its input from the bound callback as usual. Used after
    /// a reset on the render thread, where [`preroll`](Self::preroll) would
    /// allocate. Returns the frames dropped. Calling it again is a no-op.
    pub fn discard_lead_in<P: PullCallback>(
        &mut self,
        handle: &mut EngineHandle<P>,
        scratch: &mut AudioBuffer,
    ) -> Result<usize> {
        if self.consumed {
            return Ok(0);
        }
        self.consumed = true;

        let time_factor = handle.property(EngineProperty::TimeFactor);
        let mut remaining = ((self.latency as f64) * time_factor).round() as usize;
        let chunk = scratch.len().max(1);
        if scratch.is_empty() {
            scratch.resize(chunk);
        }
        let mut dropped = 0;
        while remaining > 0 {
            let got = handle.process(scratch, remaining.min(chunk))?;
            if got == 0 {
                break;
            }
            dropped += got;
            remaining -= got.min(remaining);
        }
        Ok(dropped)
    }
}
