//! Processing configuration

use crate::model::ModelParams;
use crate::wavelet::WaveletFamily;
use focus_core::{config_error, FocusError, FocusResult};
use serde::{Deserialize, Serialize};

/// Settings for the denoise, band power and scoring stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub wavelet: WaveletFamily,
    pub decomposition_level: usize,
    /// Detrend, notch and band-pass channels before the PSD
    pub apply_filter: bool,
    /// Compute band powers from the denoised channels instead of the raw window
    pub denoise_feeds_features: bool,
    pub model: ModelParams,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            wavelet: WaveletFamily::Db4,
            decomposition_level: 3,
            apply_filter: true,
            denoise_feeds_features: false,
            model: ModelParams::default(),
        }
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> FocusResult<()> {
        if self.decomposition_level == 0 || self.decomposition_level > 10 {
            return Err(config_error!(
                "decomposition level must be between 1 and 10, got {}",
                self.decomposition_level
            ));
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metric;

    #[test]
    fn test_defaults() {
        let config = ProcessingConfig::default();
        assert_eq!(config.wavelet, WaveletFamily::Db4);
        assert_eq!(config.decomposition_level, 3);
        assert!(!config.denoise_feeds_features);
        assert_eq!(config.model.metric, Metric::Concentration);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ProcessingConfig {
            wavelet: WaveletFamily::Db2,
            denoise_feeds_features: true,
            ..ProcessingConfig::default()
        };
        let json = config.to_json().unwrap();
        assert!(json.contains("\"db2\""));
        assert_eq!(ProcessingConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ProcessingConfig::from_json(r#"{"apply_filter": false}"#).unwrap();
        assert!(!config.apply_filter);
        assert_eq!(config.decomposition_level, 3);

        assert!(ProcessingConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_validation() {
        let config = ProcessingConfig {
            decomposition_level: 0,
            ..ProcessingConfig::default()
        };
        assert!(matches!(config.validate(), Err(FocusError::ConfigurationError { .. })));
    }
}
