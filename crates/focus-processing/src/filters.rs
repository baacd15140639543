//! IIR filters for EEG preprocessing
//!
//! Everything is built from second-order sections using the RBJ audio
//! cookbook formulas; higher-order Butterworth responses are cascades of
//! sections with the matching pole Q values.

use focus_core::{invalid_arguments, FocusResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Second-order section response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiquadKind {
    Lowpass,
    Highpass,
    Notch,
}

/// Direct form I biquad with its own state
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: BiquadKind,
    b0: f64, b1: f64, b2: f64,
    a1: f64, a2: f64,
    x1: f64, x2: f64,
    y1: f64, y2: f64,
}

fn check_frequency(freq: f64, sampling_rate: f64) -> FocusResult<()> {
    if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
        return Err(invalid_arguments!("sampling rate must be positive, got {}", sampling_rate));
    }
    if !(freq > 0.0 && freq < sampling_rate / 2.0) {
        return Err(invalid_arguments!(
            "frequency {} Hz must lie between 0 and Nyquist ({} Hz)",
            freq,
            sampling_rate / 2.0
        ));
    }
    Ok(())
}

impl Biquad {
    pub fn new(kind: BiquadKind, freq: f64, q: f64, sampling_rate: f64) -> FocusResult<Self> {
        check_frequency(freq, sampling_rate)?;
        if !(q.is_finite() && q > 0.0) {
            return Err(invalid_arguments!("quality factor must be positive, got {}", q));
        }

        let omega = 2.0 * PI * freq / sampling_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);

        let (b0, b1, b2) = match kind {
            BiquadKind::Lowpass => ((1.0 - cos_omega) / 2.0, 1.0 - cos_omega, (1.0 - cos_omega) / 2.0),
            BiquadKind::Highpass => ((1.0 + cos_omega) / 2.0, -(1.0 + cos_omega), (1.0 + cos_omega) / 2.0),
            BiquadKind::Notch => (1.0, -2.0 * cos_omega, 1.0),
        };
        let a0 = 1.0 + alpha;

        Ok(Biquad {
            kind,
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0, x2: 0.0,
            y1: 0.0, y2: 0.0,
        })
    }

    pub fn lowpass(cutoff: f64, q: f64, sampling_rate: f64) -> FocusResult<Self> {
        Self::new(BiquadKind::Lowpass, cutoff, q, sampling_rate)
    }

    pub fn highpass(cutoff: f64, q: f64, sampling_rate: f64) -> FocusResult<Self> {
        Self::new(BiquadKind::Highpass, cutoff, q, sampling_rate)
    }

    pub fn notch(center: f64, q: f64, sampling_rate: f64) -> FocusResult<Self> {
        Self::new(BiquadKind::Notch, center, q, sampling_rate)
    }

    pub fn kind(&self) -> BiquadKind {
        self.kind
    }

    /// Apply the filter to a single sample
    pub fn filter_sample(&mut self, sample: f64) -> f64 {
        let output = self.b0 * sample + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1 - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = sample;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Cascade of biquad sections applied in order
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    sections: Vec<Biquad>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, section: Biquad) {
        self.sections.push(section);
    }

    /// Append every section of `other`
    pub fn extend(&mut self, other: FilterChain) {
        self.sections.extend(other.sections);
    }

    /// Filter `data` in place
    pub fn process(&mut self, data: &mut [f64]) {
        for value in data.iter_mut() {
            *value = self
                .sections
                .iter_mut()
                .fold(*value, |sample, section| section.filter_sample(sample));
        }
    }

    pub fn reset(&mut self) {
        self.sections.iter_mut().for_each(Biquad::reset);
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Pole Q values of an even-order Butterworth prototype
fn butterworth_qs(order: usize) -> FocusResult<Vec<f64>> {
    if order == 0 || order % 2 != 0 || order > 8 {
        return Err(invalid_arguments!("Butterworth order must be 2, 4, 6 or 8, got {}", order));
    }
    Ok((0..order / 2)
        .map(|k| 1.0 / (2.0 * ((2 * k + 1) as f64 * PI / (2 * order) as f64).cos()))
        .collect())
}

pub fn butterworth_lowpass(cutoff: f64, order: usize, sampling_rate: f64) -> FocusResult<FilterChain> {
    let mut chain = FilterChain::new();
    for q in butterworth_qs(order)? {
        chain.push(Biquad::lowpass(cutoff, q, sampling_rate)?);
    }
    Ok(chain)
}

pub fn butterworth_highpass(cutoff: f64, order: usize, sampling_rate: f64) -> FocusResult<FilterChain> {
    let mut chain = FilterChain::new();
    for q in butterworth_qs(order)? {
        chain.push(Biquad::highpass(cutoff, q, sampling_rate)?);
    }
    Ok(chain)
}

/// High-pass at `low` cascaded with low-pass at `high`
pub fn butterworth_bandpass(low: f64, high: f64, order: usize, sampling_rate: f64) -> FocusResult<FilterChain> {
    if low >= high {
        return Err(invalid_arguments!("band-pass edges {}..{} Hz are inverted", low, high));
    }
    let mut chain = butterworth_highpass(low, order, sampling_rate)?;
    chain.extend(butterworth_lowpass(high, order, sampling_rate)?);
    Ok(chain)
}

/// Two notch sections at the geometric band center
pub fn butterworth_bandstop(low: f64, high: f64, sampling_rate: f64) -> FocusResult<FilterChain> {
    if !(low > 0.0 && low < high) {
        return Err(invalid_arguments!("band-stop edges {}..{} Hz are invalid", low, high));
    }
    let center = (low * high).sqrt();
    let q = center / (high - low);

    let mut chain = FilterChain::new();
    chain.push(Biquad::notch(center, q, sampling_rate)?);
    chain.push(Biquad::notch(center, q, sampling_rate)?);
    Ok(chain)
}

/// Subtract the mean
pub fn detrend_constant(data: &mut [f64]) {
    if data.is_empty() {
        return;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    data.iter_mut().for_each(|v| *v -= mean);
}
