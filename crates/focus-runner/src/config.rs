//! Runner configuration: JSON file plus environment overrides

use focus_acquisition::SessionConfig;
use focus_core::{config_error, FocusError, FocusResult};
use focus_processing::ProcessingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// JSON file with a full or partial [`RunnerConfig`]
pub const CONFIG_ENV: &str = "FOCUS_CONFIG";
/// `1`/`0` (or `true`/`false`) to force the synthetic board on or off
pub const SIMULATION_ENV: &str = "FOCUS_SIMULATION";
pub const SERIAL_PORT_ENV: &str = "FOCUS_SERIAL_PORT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub session: SessionConfig,
    pub processing: ProcessingConfig,
    /// Length of the analysed window
    pub window_seconds: f64,
    /// Host ticks per second
    pub tick_hz: f64,
    /// Diagnostics log, in addition to stdout
    pub log_file: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            processing: ProcessingConfig::default(),
            window_seconds: 4.0,
            tick_hz: 60.0,
            log_file: Some(PathBuf::from("brainflow_log.txt")),
        }
    }
}

impl RunnerConfig {
    /// Load from the process environment
    pub fn load() -> FocusResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `env` to look up variables
    pub fn load_with<F>(env: F) -> FocusResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match env(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(&env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> FocusResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| config_error!("Failed to read {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }

    fn apply_overrides<F>(&mut self, env: &F) -> FocusResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env(SIMULATION_ENV) {
            self.session.simulation = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => return Err(config_error!("{} must be 1 or 0, got '{}'", SIMULATION_ENV, other)),
            };
        }
        if let Some(port) = env(SERIAL_PORT_ENV) {
            self.session.serial_port = port;
        }
        Ok(())
    }

    pub fn validate(&self) -> FocusResult<()> {
        if !(self.window_seconds.is_finite() && self.window_seconds > 0.0) {
            return Err(config_error!("window_seconds must be positive, got {}", self.window_seconds));
        }
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            return Err(config_error!("tick_hz must be positive, got {}", self.tick_hz));
        }
        self.session.validate()?;
        self.processing.validate()?;

        let window = self.session.effective_board().descriptor().samples_for(self.window_seconds)?;
        if window > self.session.buffer_size {
            return Err(config_error!(
                "window of {} samples does not fit the {} sample buffer",
                window,
                self.session.buffer_size
            ));
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz)
    }

    /// Export configuration as JSON
    pub fn to_json(&self) -> FocusResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| FocusError::ConfigurationError {
            message: format!("Failed to serialize configuration: {}", e),
        })
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> FocusResult<Self> {
        serde_json::from_str(json).map_err(|e| FocusError::ConfigurationError {
            message: format!("Failed to deserialize configuration: {}", e),
        })
    }
}
