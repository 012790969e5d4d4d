//! Stretchbox Core - frame supply and region orchestration for time stretching
//!
//! This crate feeds audio into pull-model time-stretch engines and drives
//! them over whole files, multi-file groups, or lists of regions.
//!
//! # Modules
//!
//! - [`decode`]: raw fixed-point PCM to float conversion
//! - [`source`]: frame sources (memory, locked PCM store, WAV file, multiplexed)
//! - [`engine`]: engine abstraction, handle and backends
//! - [`latency`]: one-shot startup latency pre-roll
//! - [`orchestrator`]: per-region rendering state machine
//! - [`run`]: offline whole-stream rendering
//! - [`realtime`]: lock-free controlled rendering inside a device callback
//! - [`sink`]: WAV and in-memory outputs
//! - [`config`]: YAML processing settings

pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod latency;
pub mod orchestrator;
pub mod postprocess;
pub mod progress;
pub mod realtime;
pub mod region;
pub mod run;
pub mod sink;
pub mod source;
pub mod types;

pub use engine::{EngineBackend, EngineHandle, EngineKind, EngineProperty, PullCallback, Quality, StretchEngine};
pub use error::{DecodeError, Error, Result};
pub use latency::{LatencyCompensator, PrerollMode};
pub use orchestrator::{RegionOptions, RegionProcessor, RegionReport, RegionState};
pub use region::Region;
pub use source::{FrameFeed, FrameSource};
pub use types::*;
