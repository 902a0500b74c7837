//! Platform Error Types

use thiserror::Error;

/// Errors from opening or driving an output session
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Platform not supported: shared-mode engine periods are unavailable")]
    UnsupportedPlatform,

    #[error("No default output device: {0}")]
    DeviceUnavailable(String),

    #[error("Shared-mode negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("Device I/O error: {0}")]
    Device(String),

    #[error("Backend initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
