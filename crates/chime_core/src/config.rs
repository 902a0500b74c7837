//! Engine Configuration
//!
//! # Storage Location
//! - Linux: `~/.config/chime/engine.json`
//! - Windows: `%APPDATA%\chime\config\engine.json`
//! - macOS: `~/Library/Application Support/com.chime.chime/engine.json`

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chime_platform::{PeriodPreference, SessionConfig};

use crate::error::{EngineError, EngineResult};

/// Feed engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name given to the feed thread
    pub thread_name: String,

    /// Engine period to request from the device
    pub period: PeriodPreference,

    /// Capacity of the control → feed thread command channel
    pub command_capacity: usize,

    /// Portable backend: periods held by the emulated device buffer
    pub buffer_periods: u32,

    /// Portable backend: period in frames (None = 10 ms)
    pub period_frames: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_name: "chime-feed".to_string(),
            period: PeriodPreference::Minimum,
            command_capacity: 16,
            buffer_periods: 2,
            period_frames: None,
        }
    }
}

impl EngineConfig {
    /// Shortest period, smallest buffer
    pub fn low_latency() -> Self {
        Self {
            period: PeriodPreference::Minimum,
            buffer_periods: 2,
            period_frames: Some(128),
            ..Self::default()
        }
    }

    /// Default period, deeper buffer for loaded systems
    pub fn conservative() -> Self {
        Self {
            period: PeriodPreference::Default,
            buffer_periods: 4,
            period_frames: None,
            ..Self::default()
        }
    }

    /// Session parameters handed to the platform backend
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            period: self.period,
            buffer_periods: self.buffer_periods,
            period_frames: self.period_frames,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if self.thread_name.trim().is_empty() {
            return Err(EngineError::ConfigError("thread_name is empty".into()));
        }
        if self.command_capacity == 0 {
            return Err(EngineError::ConfigError(
                "command_capacity must be at least 1".into(),
            ));
        }
        self.session_config()
            .validate()
            .map_err(|e| EngineError::ConfigError(e.to_string()))
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let file = fs::File::open(path)
            .map_err(|e| EngineError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_reader(file)
            .map_err(|e| EngineError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!("Engine config loaded from {:?}", path);
        Ok(config)
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => match Self::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring engine config: {}", e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// Save configuration as pretty JSON
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        }
        let file = fs::File::create(path).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        serde_json::to_writer_pretty(file, self).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        info!("Engine config saved to {:?}", path);
        Ok(())
    }

    /// Platform-specific configuration file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "chime", "chime").map(|proj| proj.config_dir().join("engine.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.thread_name, "chime-feed");
        assert_eq!(config.period, PeriodPreference::Minimum);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let unnamed = EngineConfig {
            thread_name: "  ".into(),
            ..Default::default()
        };
        assert!(unnamed.validate().is_err());

        let no_commands = EngineConfig {
            command_capacity: 0,
            ..Default::default()
        };
        assert!(no_commands.validate().is_err());

        let shallow = EngineConfig {
            buffer_periods: 1,
            ..Default::default()
        };
        assert!(matches!(shallow.validate(), Err(EngineError::ConfigError(_))));
    }

    #[test]
    fn test_preset_configs() {
        let low = EngineConfig::low_latency();
        let safe = EngineConfig::conservative();
        assert!(low.validate().is_ok());
        assert!(safe.validate().is_ok());
        assert!(low.buffer_periods < safe.buffer_periods);
        assert_eq!(safe.session_config().period, PeriodPreference::Default);
    }

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig::conservative();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: EngineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.period, deserialized.period);
        assert_eq!(config.buffer_periods, deserialized.buffer_periods);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{ "period": "default" }"#).unwrap();
        assert_eq!(config.period, PeriodPreference::Default);
        assert_eq!(config.thread_name, "chime-feed");
        assert_eq!(config.buffer_periods, 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chime").join("engine.json");

        let config = EngineConfig::low_latency();
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.period_frames, Some(128));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "command_capacity": 0 }"#).unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
