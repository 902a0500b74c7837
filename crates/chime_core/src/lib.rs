//! Chime Core - Low-Latency Sound Playback Engine
//!
//! Keeps a shared-mode output device fed one period at a time from a
//! single pending sound buffer.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────── control thread ─────────────────────────────┐
//! │  load_sound(path) ──► WAVE parse ──► 16-bit check ──► native conversion   │
//! │        │                                                                  │
//! │        ▼                                                                  │
//! │  queue_audio / clear_queued_audio ──► SampleQueue (Arc snapshot + cursor) │
//! │  start / stop / destroy ──► Command channel                               │
//! └──────────────────────────────────────┬────────────────────────────────────┘
//!                                        │
//! ┌──────────────────────────────── feed thread ──────────────────────────────┐
//! │  open session ─► prime whole buffer ─► start clock                        │
//! │      loop: wait_ready ─► check commands ─► acquire free frames            │
//! │            ─► SampleQueue::fill (zero-pad) ─► commit                      │
//! │  Event channel ◄── Started / Stopped / Error / Closed                     │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod queue;

pub use config::EngineConfig;
pub use engine::{EngineState, FeedEngine};
pub use error::{EngineError, EngineResult};
pub use message::{Command, Event};
pub use queue::SampleQueue;

// Re-export the types callers need alongside the engine
pub use chime_codec::{CodecError, DeviceFormat, WaveAsset};
pub use chime_platform::{DeviceSession, PeriodInfo, PeriodPreference, PlatformError, SessionConfig};
