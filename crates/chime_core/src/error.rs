//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the playback engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Engine configuration error: {0}")]
    ConfigError(String),

    #[error("Engine already running")]
    AlreadyRunning,

    #[error("Engine not running")]
    NotRunning,

    #[error("Engine has been destroyed")]
    Closed,

    #[error("Failed to spawn feed thread: {0}")]
    ThreadSpawn(String),

    #[error("Codec error: {0}")]
    CodecError(#[from] chime_codec::CodecError),

    #[error("Platform error: {0}")]
    PlatformError(#[from] chime_platform::PlatformError),

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,

    #[error("Channel receive error - sender dropped")]
    ChannelRecvError,
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
