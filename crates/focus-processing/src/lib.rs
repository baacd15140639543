//! Focus-Processing: EEG feature extraction and concentration inference
//!
//! Wavelet denoising, Welch band powers, feature vectors and regression
//! models, tied together by [`FocusPipeline`].

pub mod wavelet;
pub mod filters;
pub mod bands;
pub mod model;
pub mod pipeline;
pub mod config;

pub use wavelet::{perform_wavelet_denoising, wavedec, waverec, WaveletFamily};
pub use filters::{Biquad, FilterChain, butterworth_bandpass, butterworth_bandstop, detrend_constant};
pub use bands::{get_avg_band_powers, get_custom_band_powers, BandPowers, FrequencyBand, Psd};
pub use model::{Classifier, Metric, MlModel, ModelParams, RegressionCoefficients};
pub use pipeline::{FeatureVector, FocusPipeline, PipelineOutput, PipelineStats};
pub use config::ProcessingConfig;
