//! Deep Note synthesis engine: a multi-voice chord that evolves from
//! randomized chaos onto a fixed D-major target, emitting immutable state
//! snapshots for an external renderer along the way.

pub mod audio_io;
pub mod command;
pub mod config;
pub mod device;
pub mod engine;
pub mod loudness;
pub mod phase;
pub mod scheduler;
pub mod snapshot;
pub mod voices;

pub use config::{ConfigError, EngineConfig};
pub use device::{AudioOutput, DeviceError, NodeId, Waveform};
pub use engine::SynthesisEngine;
pub use phase::{Phase, PhaseClock};
pub use snapshot::{FrequencyHistoryPoint, Snapshot};
pub use voices::{Voice, VoiceSet, TARGET_LADDER};
