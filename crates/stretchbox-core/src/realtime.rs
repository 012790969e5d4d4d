//! Realtime stretch driver
//!
//! Renders a looping, memory-resident source through an engine inside a
//! device callback. Control threads change parameters through a lock-free
//! `rtrb` queue; the render thread applies pending commands at the start of
//! each callback, so it never blocks or allocates once warmed up. After the
//! engine starts, seeks or leaves bypass, its latency lead-in is rendered and
//! dropped before any output, so audio resumes exactly at the source position.
//!
//! ```ignore
//! let (mut stretcher, mut controller) = RealtimeStretcher::new(handle, 1024);
//!
//! // control thread
//! controller.send(StretchCommand::SetTimeFactor(1.5));
//!
//! // device callback
//! stretcher.render_interleaved(output)?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::{EngineHandle, EngineProperty, PullCallback};
use crate::error::Result;
use crate::latency::LatencyCompensator;
use crate::source::{FrameFeed, FrameSource};
use crate::types::AudioBuffer;

/// Queue depth between control and render threads
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Commands applied at the next render call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StretchCommand {
    SetTimeFactor(f64),
    SetPitchFactor(f64),
    SetFormantFactor(f64),
    /// Pass the source through unprocessed
    SetBypass(bool),
    /// Jump to a source frame and flush the engine
    Seek(u64),
}

pub fn command_channel() -> (rtrb::Producer<StretchCommand>, rtrb::Consumer<StretchCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Render-side state readable from any thread
#[derive(Debug, Default)]
pub struct RealtimeAtomics {
    /// Source frame the next render call reads from
    pub position: AtomicU64,
    pub bypassed: AtomicBool,
    /// Render calls that failed and output silence
    pub failures: AtomicU64,
    /// Commands dropped because a value was rejected
    pub rejected_commands: AtomicU64,
}

/// Control-thread end of the command queue
pub struct StretchController {
    producer: rtrb::Producer<StretchCommand>,
    atomics: Arc<RealtimeAtomics>,
}

impl StretchController {
    /// Queue a command; returns it back if the queue is full
    pub fn send(&mut self, command: StretchCommand) -> std::result::Result<(), StretchCommand> {
        self.producer.push(command).map_err(|rtrb::PushError::Full(command)| {
            log::warn!("Stretch command queue full, dropping {:?}", command);
            command
        })
    }

    pub fn atomics(&self) -> &Arc<RealtimeAtomics> {
        &self.atomics
    }
}

/// Render-thread driver
pub struct RealtimeStretcher<S: FrameSource> {
    handle: EngineHandle<FrameFeed<S>>,
    commands: rtrb::Consumer<StretchCommand>,
    atomics: Arc<RealtimeAtomics>,
    compensator: LatencyCompensator,
    block: AudioBuffer,
    max_block: usize,
    bypass: bool,
}

impl<S: FrameSource> RealtimeStretcher<S> {
    /// Wrap a handle; the source is switched to looping
    ///
    /// `max_block` bounds the frames handed to the engine per call; device
    /// buffers larger than that are rendered in several passes.
    pub fn new(mut handle: EngineHandle<FrameFeed<S>>, max_block: usize) -> (Self, StretchController) {
        handle.pull_mut().source_mut().set_looping(true);
        let (producer, consumer) = command_channel();
        let atomics = Arc::new(RealtimeAtomics::default());
        let max_block = max_block.max(1);
        let block = AudioBuffer::silence(handle.channels(), max_block);
        let compensator = LatencyCompensator::for_handle(&handle);

        let stretcher = Self {
            handle,
            commands: consumer,
            atomics: atomics.clone(),
            compensator,
            block,
            max_block,
            bypass: false,
        };
        let controller = StretchController { producer, atomics };
        (stretcher, controller)
    }

    pub fn atomics(&self) -> &Arc<RealtimeAtomics> {
        &self.atomics
    }

    pub fn handle(&self) -> &EngineHandle<FrameFeed<S>> {
        &self.handle
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            let applied = match command {
                StretchCommand::SetTimeFactor(value) => {
                    self.handle.set_property(EngineProperty::TimeFactor, value)
                }
                StretchCommand::SetPitchFactor(value) => {
                    self.handle.set_property(EngineProperty::PitchFactor, value)
                }
                StretchCommand::SetFormantFactor(value) => {
                    self.handle.set_property(EngineProperty::FormantFactor, value)
                }
                StretchCommand::SetBypass(bypass) => {
                    if self.bypass && !bypass {
                        // The engine's history is stale after a bypassed stretch
                        self.handle.reset(true);
                        self.compensator.rearm();
                    }
                    self.bypass = bypass;
                    self.atomics.bypassed.store(bypass, Ordering::Relaxed);
                    Ok(())
                }
                StretchCommand::Seek(frame) => {
                    self.handle.pull_mut().seek(frame);
                    self.handle.reset(true);
                    self.compensator.rearm();
                    Ok(())
                }
            };
            if applied.is_err() {
                self.atomics.rejected_commands.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Fill an interleaved device buffer
    ///
    /// On failure the buffer is silenced, the failure counted and the error
    /// returned; the stretcher stays usable for the next callback.
    pub fn render_interleaved(&mut self, output: &mut [f32]) -> Result<()> {
        self.apply_commands();

        let channels = self.handle.channels();
        let total = output.len() / channels;
        // A trailing partial frame is never rendered
        output[total * channels..].fill(0.0);
        let result = self.render_frames(output, channels, total);
        if result.is_err() {
            output.fill(0.0);
            self.atomics.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.atomics
            .position
            .store(self.handle.pull().position(), Ordering::Relaxed);
        result
    }

    fn render_frames(&mut self, output: &mut [f32], channels: usize, total: usize) -> Result<()> {
        if !self.bypass && !self.compensator.is_consumed() {
            self.compensator.discard_lead_in(&mut self.handle, &mut self.block)?;
        }
        let mut done = 0;
        while done < total {
            let frames = self.max_block.min(total - done);
            let produced = if self.bypass {
                self.handle.pull_mut().pull(&mut self.block, frames)?
            } else {
                self.handle.process(&mut self.block, frames)?
            };
            self.block.silence_range(produced, frames - produced.min(frames));
            self.block
                .write_interleaved(frames, &mut output[done * channels..(done + frames) * channels]);
            done += frames;
        }
        Ok(())
    }
}
