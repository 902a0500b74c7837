//! Chime Platform - Output Sessions
//!
//! This crate negotiates a shared output stream with the default render
//! device and exposes it through the [`DeviceSession`] trait.
//!
//! # Platform Support
//!
//! | Platform      | Backend | Ready signal            | Period source               |
//! |---------------|---------|-------------------------|-----------------------------|
//! | Windows       | WASAPI  | auto-reset event        | `GetSharedModeEnginePeriod` |
//! | Linux / macOS | cpal    | callback → bounded(1)   | device buffer-size range    |

mod error;
mod traits;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(target_os = "windows"))]
pub mod portable;

pub use error::PlatformError;
pub use traits::{DeviceSession, PeriodInfo, PeriodPreference, SessionConfig};

/// Open a shared-mode session on the default output device
///
/// Returns a boxed session that must stay on the calling thread.
pub fn open_default_session(config: &SessionConfig) -> Result<Box<dyn DeviceSession>, PlatformError> {
    config.validate()?;

    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::WasapiSession::open(config)?))
    }

    #[cfg(not(target_os = "windows"))]
    {
        Ok(Box::new(portable::CpalSession::open(config)?))
    }
}

/// Name of the backend [`open_default_session`] uses on this platform
pub fn backend_name() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "WASAPI"
    }
    #[cfg(not(target_os = "windows"))]
    {
        "cpal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name() {
        assert!(!backend_name().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected_before_open() {
        let config = SessionConfig {
            buffer_periods: 0,
            ..Default::default()
        };
        assert!(matches!(
            open_default_session(&config),
            Err(PlatformError::InvalidConfiguration(_))
        ));
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_default_session() {
        if let Ok(session) = open_default_session(&SessionConfig::default()) {
            assert_eq!(session.backend(), backend_name());
            assert!(session.period().buffer_frames > 0);
        }
    }
}
