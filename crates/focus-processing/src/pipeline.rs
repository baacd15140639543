//! Per-window inference: denoise, band powers, feature vector, predict

use crate::bands::{get_avg_band_powers, BandPowers};
use crate::config::ProcessingConfig;
use crate::model::{Classifier, Metric, MlModel, ModelParams};
use crate::wavelet::denoise;
use focus_core::{invalid_arguments, DataWindow, FocusError, FocusResult};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Model input: band power means followed by their deviations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<f64>,
    band_count: usize,
}

impl FeatureVector {
    pub fn build(means: &[f64], deviations: &[f64]) -> FocusResult<Self> {
        if means.len() != deviations.len() {
            return Err(invalid_arguments!(
                "{} band means but {} deviations",
                means.len(),
                deviations.len()
            ));
        }
        let mut values = Vec::with_capacity(means.len() * 2);
        values.extend_from_slice(means);
        values.extend_from_slice(deviations);

        Ok(Self {
            values,
            band_count: means.len(),
        })
    }

    pub fn from_band_powers(powers: &BandPowers) -> FocusResult<Self> {
        Self::build(&powers.avg, &powers.std)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn means(&self) -> &[f64] {
        &self.values[..self.band_count]
    }

    pub fn deviations(&self) -> &[f64] {
        &self.values[self.band_count..]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub score: f64,
    pub features: FeatureVector,
    pub band_powers: BandPowers,
    /// Input window with the EEG rows denoised
    pub denoised: DataWindow,
    pub latency_us: u64,
}

/// Running totals over pipeline runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub runs: u64,
    pub failures: u64,
    pub total_latency_us: u64,
    pub last_latency_us: u64,
}

impl PipelineStats {
    pub fn avg_latency_us(&self) -> u64 {
        if self.runs == 0 {
            0
        } else {
            self.total_latency_us / self.runs
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.runs == 0 {
            1.0
        } else {
            (self.runs - self.failures) as f64 / self.runs as f64
        }
    }
}

/// Owns the model and runs the feature chain over full windows
pub struct FocusPipeline {
    config: ProcessingConfig,
    model: Option<MlModel>,
    stats: PipelineStats,
}

impl FocusPipeline {
    pub fn new(config: ProcessingConfig) -> FocusResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model: None,
            stats: PipelineStats::default(),
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Create and prepare a model for `metric` with built-in coefficients
    pub fn prepare_model(&mut self, metric: Metric, classifier: Classifier) -> FocusResult<()> {
        self.prepare_with(ModelParams::new(metric, classifier))
    }

    /// Create and prepare the model named in the configuration
    pub fn prepare_configured_model(&mut self) -> FocusResult<()> {
        self.prepare_with(self.config.model.clone())
    }

    fn prepare_with(&mut self, params: ModelParams) -> FocusResult<()> {
        if let Some(existing) = self.model.as_ref() {
            if existing.is_prepared() && existing.params() == &params {
                return Ok(());
            }
        }
        self.release_model()?;

        let mut model = MlModel::new(params);
        model.prepare()?;
        self.model = Some(model);
        Ok(())
    }

    pub fn is_model_ready(&self) -> bool {
        self.model.as_ref().is_some_and(MlModel::is_prepared)
    }

    /// Copy of `window` with every channel in `channels` denoised
    pub fn denoise(&self, window: &DataWindow, channels: &[usize]) -> FocusResult<DataWindow> {
        let mut denoised = window.clone();
        for &channel in channels {
            let cleaned = denoise(
                window.row(channel)?,
                self.config.wavelet,
                self.config.decomposition_level,
            )?;
            denoised.replace_row(channel, cleaned)?;
        }
        Ok(denoised)
    }

    pub fn extract_band_powers(
        &self,
        window: &DataWindow,
        channels: &[usize],
        sampling_rate: usize,
    ) -> FocusResult<BandPowers> {
        get_avg_band_powers(window, channels, sampling_rate, self.config.apply_filter)
    }

    /// Score a feature vector with the prepared model
    pub fn predict(&self, features: &FeatureVector) -> FocusResult<f64> {
        self.model
            .as_ref()
            .ok_or(FocusError::ModelNotPrepared)?
            .predict(features.as_slice())
    }

    /// Run the whole chain once over a full window
    pub fn run(
        &mut self,
        window: &DataWindow,
        eeg_channels: &[usize],
        sampling_rate: usize,
    ) -> FocusResult<PipelineOutput> {
        if !self.is_model_ready() {
            return Err(FocusError::ModelNotPrepared);
        }

        let started = Instant::now();
        let result = self.execute(window, eeg_channels, sampling_rate);
        let latency_us = started.elapsed().as_micros() as u64;

        self.stats.runs += 1;
        self.stats.total_latency_us += latency_us;
        self.stats.last_latency_us = latency_us;

        match result {
            Ok((score, features, band_powers, denoised)) => {
                tracing::debug!(score, latency_us, samples = window.num_samples(), "Pipeline run complete");
                Ok(PipelineOutput {
                    score,
                    features,
                    band_powers,
                    denoised,
                    latency_us,
                })
            }
            Err(e) => {
                self.stats.failures += 1;
                tracing::warn!(error = %e, "Pipeline run failed");
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        window: &DataWindow,
        eeg_channels: &[usize],
        sampling_rate: usize,
    ) -> FocusResult<(f64, FeatureVector, BandPowers, DataWindow)> {
        let denoised = self.denoise(window, eeg_channels)?;

        let source = if self.config.denoise_feeds_features {
            &denoised
        } else {
            window
        };
        let band_powers = self.extract_band_powers(source, eeg_channels, sampling_rate)?;
        let features = FeatureVector::from_band_powers(&band_powers)?;
        let score = self.predict(&features)?;

        Ok((score, features, band_powers, denoised))
    }

    /// Release the model; no-op when none is loaded
    pub fn release_model(&mut self) -> FocusResult<()> {
        match self.model.take() {
            Some(mut model) => model.release(),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}
