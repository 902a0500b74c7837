//! Output Session Traits
//!
//! Defines the interface every platform output backend provides to the
//! feed engine: a negotiated format, period sizing, write-region
//! acquire/commit, a drain-level query and a periodic ready signal.

use serde::{Deserialize, Serialize};

use chime_codec::DeviceFormat;

use crate::error::PlatformError;

/// Period sizing reported by the device, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodInfo {
    /// Period the engine uses when no preference is given
    pub default_period: u32,

    /// Granularity all supported periods are multiples of
    pub fundamental_period: u32,

    /// Shortest period the device accepts in shared mode
    pub min_period: u32,

    /// Longest period the device accepts in shared mode
    pub max_period: u32,

    /// Total frames the device buffer holds
    pub buffer_frames: u32,
}

impl PeriodInfo {
    /// Period length in milliseconds at the given sample rate
    pub fn period_ms(&self, period: u32, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        period as f32 / sample_rate as f32 * 1000.0
    }

    /// Buffer latency in milliseconds at the given sample rate
    pub fn buffer_ms(&self, sample_rate: u32) -> f32 {
        self.period_ms(self.buffer_frames, sample_rate)
    }
}

/// Which engine period to request when the stream is initialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodPreference {
    /// Shortest period the device allows (lowest latency)
    #[default]
    Minimum,
    /// The device's default period
    Default,
}

/// Parameters for opening a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Period to request at initialization
    pub period: PeriodPreference,

    /// Portable backend: periods held by the emulated device buffer
    pub buffer_periods: u32,

    /// Portable backend: period in frames (None = 10 ms at the device rate)
    pub period_frames: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            period: PeriodPreference::Minimum,
            buffer_periods: 2,
            period_frames: None,
        }
    }
}

impl SessionConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), PlatformError> {
        if self.buffer_periods < 2 || self.buffer_periods > 16 {
            return Err(PlatformError::InvalidConfiguration(format!(
                "buffer_periods must be 2-16, got {}",
                self.buffer_periods
            )));
        }
        if let Some(frames) = self.period_frames {
            if !(16..=16384).contains(&frames) {
                return Err(PlatformError::InvalidConfiguration(format!(
                    "period_frames must be 16-16384, got {}",
                    frames
                )));
            }
        }
        Ok(())
    }
}

/// A negotiated shared-mode output stream
///
/// Sessions are not required to be `Send`: the engine opens, drives and
/// drops a session on its own worker thread.
pub trait DeviceSession {
    /// Backend name (e.g. "WASAPI", "cpal")
    fn backend(&self) -> &'static str;

    /// Native format negotiated at open
    fn format(&self) -> &DeviceFormat;

    /// Period sizing and buffer capacity
    fn period(&self) -> &PeriodInfo;

    /// Borrow a writable region of `frames * frame_size` bytes
    ///
    /// The region's previous contents are unspecified; the caller must write
    /// every byte before committing.
    fn acquire(&mut self, frames: u32) -> Result<&mut [u8], PlatformError>;

    /// Submit `frames` frames of the last acquired region to the device
    fn commit(&mut self, frames: u32) -> Result<(), PlatformError>;

    /// Frames submitted to the device and not yet played
    fn frames_pending(&self) -> Result<u32, PlatformError>;

    /// Start the device clock
    fn start(&mut self) -> Result<(), PlatformError>;

    /// Stop the device clock
    fn stop(&mut self) -> Result<(), PlatformError>;

    /// Block until the device signals free capacity
    ///
    /// There is no timeout. The signal auto-resets: any number of raises
    /// between two waits wake exactly one wait.
    fn wait_ready(&mut self) -> Result<(), PlatformError>;
}

impl<S: DeviceSession + ?Sized> DeviceSession for Box<S> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn format(&self) -> &DeviceFormat {
        (**self).format()
    }

    fn period(&self) -> &PeriodInfo {
        (**self).period()
    }

    fn acquire(&mut self, frames: u32) -> Result<&mut [u8], PlatformError> {
        (**self).acquire(frames)
    }

    fn commit(&mut self, frames: u32) -> Result<(), PlatformError> {
        (**self).commit(frames)
    }

    fn frames_pending(&self) -> Result<u32, PlatformError> {
        (**self).frames_pending()
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        (**self).stop()
    }

    fn wait_ready(&mut self) -> Result<(), PlatformError> {
        (**self).wait_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.period, PeriodPreference::Minimum);
        assert_eq!(config.buffer_periods, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_config_validation() {
        let too_few = SessionConfig {
            buffer_periods: 1,
            ..Default::default()
        };
        assert!(too_few.validate().is_err());

        let tiny_period = SessionConfig {
            period_frames: Some(4),
            ..Default::default()
        };
        assert!(tiny_period.validate().is_err());
    }

    #[test]
    fn test_period_preference_serialization() {
        let json = serde_json::to_string(&PeriodPreference::Default).unwrap();
        assert_eq!(json, "\"default\"");
        let parsed: PeriodPreference = serde_json::from_str("\"minimum\"").unwrap();
        assert_eq!(parsed, PeriodPreference::Minimum);
    }

    #[test]
    fn test_latency_helpers() {
        let info = PeriodInfo {
            default_period: 480,
            fundamental_period: 48,
            min_period: 144,
            max_period: 480,
            buffer_frames: 960,
        };
        assert!((info.period_ms(480, 48000) - 10.0).abs() < 0.01);
        assert!((info.buffer_ms(48000) - 20.0).abs() < 0.01);
        assert_eq!(info.period_ms(480, 0), 0.0);
    }
}
