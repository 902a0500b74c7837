//! Message Types for Thread Communication
//!
//! Commands flow from control thread -> feed thread
//! Events flow from feed thread -> control thread

use serde::{Deserialize, Serialize};

/// Commands sent from the control thread to the feed thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Prime the device buffer and start feeding
    Start { generation: u64 },

    /// Stop feeding after the current period
    Stop,

    /// Stop, release the device and exit the feed thread
    Shutdown,
}

/// Events sent from the feed thread to the control thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Buffer primed and device clock running
    Started,

    /// Feeding stopped; the session is kept open
    Stopped,

    /// Fatal device error, the engine is now failed
    Error { message: String },

    /// Session released and feed thread exited
    Closed,
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}
