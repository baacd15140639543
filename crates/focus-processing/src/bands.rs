//! Welch power spectral density and EEG band powers

use crate::filters::{butterworth_bandpass, butterworth_bandstop, detrend_constant};
use focus_core::{invalid_arguments, DataWindow, FocusResult};
use num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Power-line bands removed before spectral analysis
const LINE_NOISE_BANDS: [(f64, f64); 2] = [(48.0, 52.0), (58.0, 62.0)];
const BANDPASS_LOW_HZ: f64 = 2.0;
const BANDPASS_HIGH_HZ: f64 = 45.0;
const BANDPASS_ORDER: usize = 4;

/// Frequency band definition for spectral analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub name: String,
    pub low_freq: f64,
    pub high_freq: f64,
}

impl FrequencyBand {
    pub fn new(name: &str, low_freq: f64, high_freq: f64) -> Self {
        Self {
            name: name.to_string(),
            low_freq,
            high_freq,
        }
    }

    /// Canonical EEG bands: delta, theta, alpha, beta, gamma
    pub fn eeg_bands() -> Vec<FrequencyBand> {
        vec![
            FrequencyBand::new("delta", 1.0, 4.0),
            FrequencyBand::new("theta", 4.0, 8.0),
            FrequencyBand::new("alpha", 8.0, 13.0),
            FrequencyBand::new("beta", 13.0, 30.0),
            FrequencyBand::new("gamma", 30.0, 45.0),
        ]
    }
}

/// One-sided power spectral density
#[derive(Debug, Clone, PartialEq)]
pub struct Psd {
    pub frequencies: Vec<f64>,
    /// Power per Hz at each frequency
    pub power: Vec<f64>,
}

impl Psd {
    /// Trapezoidal integral over the bins within `[low, high]`
    pub fn band_power(&self, low: f64, high: f64) -> f64 {
        let selected: Vec<(f64, f64)> = self
            .frequencies
            .iter()
            .zip(&self.power)
            .filter(|&(&f, _)| f >= low && f <= high)
            .map(|(&f, &p)| (f, p))
            .collect();

        selected
            .windows(2)
            .map(|pair| (pair[1].0 - pair[0].0) * (pair[0].1 + pair[1].1) / 2.0)
            .sum()
    }

    /// Frequency with the highest power
    pub fn peak_frequency(&self) -> Option<f64> {
        self.power
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(idx, _)| self.frequencies[idx])
    }
}

/// Averaged band powers across channels, in band order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPowers {
    pub bands: Vec<FrequencyBand>,
    /// Mean relative power per band
    pub avg: Vec<f64>,
    /// Population standard deviation per band
    pub std: Vec<f64>,
}

impl BandPowers {
    /// Mean power of the named band
    pub fn avg_of(&self, name: &str) -> Option<f64> {
        self.bands.iter().position(|b| b.name == name).map(|idx| self.avg[idx])
    }
}

/// Power of two closest to `value` (ties go up)
pub fn nearest_power_of_two(value: usize) -> usize {
    if value <= 1 {
        return 1;
    }
    let upper = value.next_power_of_two();
    let lower = upper / 2;
    if value - lower < upper - value {
        lower
    } else {
        upper
    }
}

fn hann_window(len: usize) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (len - 1) as f64).cos())
        .collect()
}

/// Welch PSD with a Hann window and 50% overlap
pub fn welch_psd(data: &[f64], sampling_rate: f64, nfft: usize) -> FocusResult<Psd> {
    if nfft < 2 || !nfft.is_power_of_two() {
        return Err(invalid_arguments!("nfft must be a power of two >= 2, got {}", nfft));
    }
    if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
        return Err(invalid_arguments!("sampling rate must be positive, got {}", sampling_rate));
    }
    if data.len() < nfft {
        return Err(invalid_arguments!(
            "{} samples are not enough for one {}-point segment",
            data.len(),
            nfft
        ));
    }

    let window = hann_window(nfft);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sampling_rate * window_power);

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nfft);
    let mut input = fft.make_input_vec();
    let mut spectrum: Vec<Complex<f64>> = fft.make_output_vec();

    let bins = nfft / 2 + 1;
    let mut power = vec![0.0; bins];
    let step = nfft / 2;
    let mut segments = 0usize;

    let mut start = 0;
    while start + nfft <= data.len() {
        let segment = &data[start..start + nfft];
        let mean = segment.iter().sum::<f64>() / nfft as f64;
        for ((slot, &x), &w) in input.iter_mut().zip(segment).zip(&window) {
            *slot = (x - mean) * w;
        }

        fft.process(&mut input, &mut spectrum)
            .map_err(|e| invalid_arguments!("FFT failed: {}", e))?;

        for (k, (acc, value)) in power.iter_mut().zip(&spectrum).enumerate() {
            let one_sided = if k == 0 || k == bins - 1 { 1.0 } else { 2.0 };
            *acc += value.norm_sqr() * scale * one_sided;
        }

        segments += 1;
        start += step;
    }

    power.iter_mut().for_each(|p| *p /= segments as f64);
    let resolution = sampling_rate / nfft as f64;
    let frequencies = (0..bins).map(|k| k as f64 * resolution).collect();

    Ok(Psd { frequencies, power })
}

/// Detrend, remove power-line noise and band-pass one channel in place
pub fn preprocess_channel(data: &mut [f64], sampling_rate: f64) -> FocusResult<()> {
    detrend_constant(data);

    for (low, high) in LINE_NOISE_BANDS {
        if (low * high).sqrt() >= sampling_rate / 2.0 {
            tracing::debug!(low, high, sampling_rate, "Line-noise band above Nyquist, skipped");
            continue;
        }
        butterworth_bandstop(low, high, sampling_rate)?.process(data);
    }

    let high = BANDPASS_HIGH_HZ.min(sampling_rate * 0.45);
    butterworth_bandpass(BANDPASS_LOW_HZ, high, BANDPASS_ORDER, sampling_rate)?.process(data);
    Ok(())
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Relative power of each band for one channel
fn channel_band_powers(
    data: &[f64],
    bands: &[FrequencyBand],
    sampling_rate: usize,
    apply_filter: bool,
) -> FocusResult<Vec<f64>> {
    let fs = sampling_rate as f64;
    let mut signal = data.to_vec();
    if apply_filter {
        preprocess_channel(&mut signal, fs)?;
    }

    let psd = welch_psd(&signal, fs, nearest_power_of_two(sampling_rate))?;
    let powers: Vec<f64> = bands.iter().map(|b| psd.band_power(b.low_freq, b.high_freq)).collect();
    let total: f64 = powers.iter().sum();

    if total > 0.0 && total.is_finite() {
        Ok(powers.iter().map(|p| p / total).collect())
    } else {
        Ok(vec![0.0; bands.len()])
    }
}

/// Band powers for arbitrary bands, averaged across `channels`
pub fn get_custom_band_powers(
    window: &DataWindow,
    channels: &[usize],
    bands: &[FrequencyBand],
    sampling_rate: usize,
    apply_filter: bool,
) -> FocusResult<BandPowers> {
    if channels.is_empty() {
        return Err(invalid_arguments!("no channels selected for band powers"));
    }
    if bands.is_empty() {
        return Err(invalid_arguments!("no frequency bands given"));
    }
    if sampling_rate == 0 {
        return Err(invalid_arguments!("sampling rate must be positive"));
    }
    if let Some(band) = bands.iter().find(|b| !(b.low_freq >= 0.0 && b.low_freq < b.high_freq)) {
        return Err(invalid_arguments!(
            "band '{}' has invalid edges {}..{} Hz",
            band.name,
            band.low_freq,
            band.high_freq
        ));
    }

    let per_channel = channels
        .iter()
        .map(|&channel| channel_band_powers(window.row(channel)?, bands, sampling_rate, apply_filter))
        .collect::<FocusResult<Vec<_>>>()?;

    let (avg, std): (Vec<f64>, Vec<f64>) = (0..bands.len())
        .map(|band| {
            let values: Vec<f64> = per_channel.iter().map(|powers| powers[band]).collect();
            mean_and_std(&values)
        })
        .unzip();

    Ok(BandPowers {
        bands: bands.to_vec(),
        avg,
        std,
    })
}

/// Delta..gamma band powers averaged across `channels`
pub fn get_avg_band_powers(
    window: &DataWindow,
    channels: &[usize],
    sampling_rate: usize,
    apply_filter: bool,
) -> FocusResult<BandPowers> {
    get_custom_band_powers(window, channels, &FrequencyBand::eeg_bands(), sampling_rate, apply_filter)
}
