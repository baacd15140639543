//! Discrete wavelet transform and threshold denoising
//!
//! Periodized orthogonal DWT with Daubechies filters. Denoising uses the
//! universal (VisuShrink) threshold estimated from the finest detail level
//! and soft-thresholds every detail level before reconstruction.

use focus_core::{invalid_arguments, FocusError, FocusResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const HAAR: [f64; 2] = [0.7071067811865476, 0.7071067811865476];

const DB2: [f64; 4] = [
    0.48296291314469025,
    0.836516303737469,
    0.22414386804185735,
    -0.12940952255092145,
];

const DB3: [f64; 6] = [
    0.3326705529509569,
    0.8068915093133388,
    0.4598775021193313,
    -0.13501102001039084,
    -0.08544127388224149,
    0.035226291882100656,
];

const DB4: [f64; 8] = [
    0.23037781330885523,
    0.7148465705525415,
    0.6308807679295904,
    -0.02798376941698385,
    -0.18703481171888114,
    0.030841381835986965,
    0.032883011666982945,
    -0.010597401784997278,
];

const DB5: [f64; 10] = [
    0.160102397974125,
    0.6038292697974729,
    0.7243085284385744,
    0.13842814590110342,
    -0.24229488706619015,
    -0.03224486958502952,
    0.07757149384006515,
    -0.006241490213011705,
    -0.012580751999015526,
    0.0033357252850015492,
];

/// Median absolute deviation to standard deviation for Gaussian noise
const MAD_TO_SIGMA: f64 = 0.6745;

/// Supported wavelet families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveletFamily {
    Haar,
    Db2,
    Db3,
    Db4,
    Db5,
}

impl WaveletFamily {
    pub fn name(&self) -> &'static str {
        match self {
            WaveletFamily::Haar => "haar",
            WaveletFamily::Db2 => "db2",
            WaveletFamily::Db3 => "db3",
            WaveletFamily::Db4 => "db4",
            WaveletFamily::Db5 => "db5",
        }
    }

    /// Low-pass reconstruction filter
    pub fn scaling_filter(&self) -> &'static [f64] {
        match self {
            WaveletFamily::Haar => &HAAR,
            WaveletFamily::Db2 => &DB2,
            WaveletFamily::Db3 => &DB3,
            WaveletFamily::Db4 => &DB4,
            WaveletFamily::Db5 => &DB5,
        }
    }

    /// High-pass filter as the quadrature mirror of the scaling filter
    pub fn wavelet_filter(&self) -> Vec<f64> {
        let h = self.scaling_filter();
        let len = h.len();
        (0..len)
            .map(|k| if k % 2 == 0 { h[len - 1 - k] } else { -h[len - 1 - k] })
            .collect()
    }
}

impl FromStr for WaveletFamily {
    type Err = FocusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "haar" | "db1" => Ok(WaveletFamily::Haar),
            "db2" => Ok(WaveletFamily::Db2),
            "db3" => Ok(WaveletFamily::Db3),
            "db4" => Ok(WaveletFamily::Db4),
            "db5" => Ok(WaveletFamily::Db5),
            other => Err(invalid_arguments!("unsupported wavelet '{}'", other)),
        }
    }
}

impl fmt::Display for WaveletFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Multi-level decomposition result
#[derive(Debug, Clone, PartialEq)]
pub struct WaveletCoefficients {
    /// Coarsest approximation
    pub approximation: Vec<f64>,
    /// Detail coefficients, finest level first
    pub details: Vec<Vec<f64>>,
}

impl WaveletCoefficients {
    pub fn levels(&self) -> usize {
        self.details.len()
    }
}

fn analysis_step(signal: &[f64], h: &[f64], g: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = signal.len();
    let half = n / 2;
    let mut approx = vec![0.0; half];
    let mut detail = vec![0.0; half];

    for i in 0..half {
        for (k, (&hk, &gk)) in h.iter().zip(g).enumerate() {
            let x = signal[(2 * i + k) % n];
            approx[i] += hk * x;
            detail[i] += gk * x;
        }
    }
    (approx, detail)
}

fn synthesis_step(approx: &[f64], detail: &[f64], h: &[f64], g: &[f64]) -> Vec<f64> {
    let n = approx.len() * 2;
    let mut signal = vec![0.0; n];

    for (i, (&a, &d)) in approx.iter().zip(detail).enumerate() {
        for (k, (&hk, &gk)) in h.iter().zip(g).enumerate() {
            signal[(2 * i + k) % n] += hk * a + gk * d;
        }
    }
    signal
}

/// Decompose `data` over `level` levels
///
/// The length must be a positive multiple of `2^level`.
pub fn wavedec(data: &[f64], family: WaveletFamily, level: usize) -> FocusResult<WaveletCoefficients> {
    if level == 0 {
        return Err(invalid_arguments!("decomposition level must be at least 1"));
    }
    let block = 1usize.checked_shl(level as u32).ok_or_else(|| {
        invalid_arguments!("decomposition level {} is too large", level)
    })?;
    if data.is_empty() || data.len() % block != 0 {
        return Err(invalid_arguments!(
            "signal length {} is not a multiple of 2^{}",
            data.len(),
            level
        ));
    }

    let h = family.scaling_filter();
    let g = family.wavelet_filter();
    let mut approximation = data.to_vec();
    let mut details = Vec::with_capacity(level);

    for _ in 0..level {
        let (a, d) = analysis_step(&approximation, h, &g);
        approximation = a;
        details.push(d);
    }

    Ok(WaveletCoefficients { approximation, details })
}

/// Reconstruct a signal from [`wavedec`] output
pub fn waverec(coeffs: &WaveletCoefficients, family: WaveletFamily) -> FocusResult<Vec<f64>> {
    let h = family.scaling_filter();
    let g = family.wavelet_filter();
    let mut signal = coeffs.approximation.clone();

    for detail in coeffs.details.iter().rev() {
        if detail.len() != signal.len() {
            return Err(invalid_arguments!(
                "detail level has {} coefficients, expected {}",
                detail.len(),
                signal.len()
            ));
        }
        signal = synthesis_step(&signal, detail, h, &g);
    }
    Ok(signal)
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    let magnitude = value.abs() - threshold;
    if magnitude > 0.0 {
        magnitude.copysign(value)
    } else {
        0.0
    }
}

/// Denoise one channel; the output has the same length as `data`
///
/// `wavelet` accepts `haar`/`db1` through `db5`.
pub fn perform_wavelet_denoising(data: &[f64], wavelet: &str, level: usize) -> FocusResult<Vec<f64>> {
    let family: WaveletFamily = wavelet.parse()?;
    denoise(data, family, level)
}

/// Typed variant of [`perform_wavelet_denoising`]
pub fn denoise(data: &[f64], family: WaveletFamily, level: usize) -> FocusResult<Vec<f64>> {
    if level == 0 {
        return Err(invalid_arguments!("decomposition level must be at least 1"));
    }
    let block = 1usize.checked_shl(level as u32).unwrap_or(usize::MAX);
    if data.len() < block {
        return Err(invalid_arguments!(
            "signal of {} samples is too short for {} levels",
            data.len(),
            level
        ));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(invalid_arguments!("signal contains non-finite values"));
    }

    // Edge-pad to a whole number of blocks
    let padded_len = data.len().div_ceil(block) * block;
    let mut padded = data.to_vec();
    if let Some(&last) = data.last() {
        padded.resize(padded_len, last);
    }

    let mut coeffs = wavedec(&padded, family, level)?;

    let mut finest: Vec<f64> = coeffs.details[0].iter().map(|d| d.abs()).collect();
    let sigma = median(&mut finest) / MAD_TO_SIGMA;
    let threshold = sigma * (2.0 * (data.len() as f64).ln()).sqrt();

    for detail in coeffs.details.iter_mut() {
        for value in detail.iter_mut() {
            *value = soft_threshold(*value, threshold);
        }
    }

    let mut restored = waverec(&coeffs, family)?;
    restored.truncate(data.len());
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn test_signal(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / 250.0;
                (2.0 * PI * 10.0 * t).sin() + 0.4 * (2.0 * PI * 23.0 * t).cos() + 0.1 * t
            })
            .collect()
    }

    /// Deterministic uniform noise in [-amplitude, amplitude]
    fn lcg_noise(len: usize, amplitude: f64) -> Vec<f64> {
        let mut state: u64 = 0x2545F4914F6CDD1D;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
                (unit * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    #[test]
    fn test_filters_are_normalised() {
        for family in [
            WaveletFamily::Haar,
            WaveletFamily::Db2,
            WaveletFamily::Db3,
            WaveletFamily::Db4,
            WaveletFamily::Db5,
        ] {
            let h = family.scaling_filter();
            let sum: f64 = h.iter().sum();
            let energy: f64 = h.iter().map(|v| v * v).sum();
            assert!((sum - 2f64.sqrt()).abs() < 1e-10, "{} sum", family);
            assert!((energy - 1.0).abs() < 1e-10, "{} energy", family);

            let g_sum: f64 = family.wavelet_filter().iter().sum();
            assert!(g_sum.abs() < 1e-10);
        }
    }

    #[test]
    fn test_perfect_reconstruction() {
        let signal = test_signal(256);
        for family in [WaveletFamily::Haar, WaveletFamily::Db2, WaveletFamily::Db4, WaveletFamily::Db5] {
            let coeffs = wavedec(&signal, family, 3).unwrap();
            assert_eq!(coeffs.levels(), 3);
            assert_eq!(coeffs.approximation.len(), 32);
            assert_eq!(coeffs.details[0].len(), 128);

            let restored = waverec(&coeffs, family).unwrap();
            for (a, b) in signal.iter().zip(&restored) {
                assert!((a - b).abs() < 1e-8, "{} reconstruction", family);
            }
        }
    }

    #[test]
    fn test_wavedec_rejects_bad_lengths() {
        assert!(wavedec(&[1.0; 12], WaveletFamily::Db4, 3).is_err());
        assert!(wavedec(&[1.0; 16], WaveletFamily::Db4, 0).is_err());
        assert!(wavedec(&[], WaveletFamily::Haar, 1).is_err());
    }

    #[test]
    fn test_family_parsing() {
        assert_eq!("db4".parse::<WaveletFamily>().unwrap(), WaveletFamily::Db4);
        assert_eq!("DB1".parse::<WaveletFamily>().unwrap(), WaveletFamily::Haar);
        assert!(matches!(
            "sym8".parse::<WaveletFamily>(),
            Err(FocusError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_denoise_preserves_length() {
        let signal = test_signal(1001);
        let denoised = perform_wavelet_denoising(&signal, "db4", 3).unwrap();
        assert_eq!(denoised.len(), 1001);
        assert!(denoised.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_denoise_constant_signal() {
        let signal = vec![4.2; 500];
        let denoised = perform_wavelet_denoising(&signal, "db4", 3).unwrap();
        for value in denoised {
            assert!((value - 4.2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_denoise_reduces_noise() {
        let clean: Vec<f64> = (0..1000)
            .map(|i| (2.0 * PI * 6.0 * i as f64 / 250.0).sin())
            .collect();
        let noise = lcg_noise(1000, 0.5);
        let noisy: Vec<f64> = clean.iter().zip(&noise).map(|(c, n)| c + n).collect();

        let denoised = perform_wavelet_denoising(&noisy, "db4", 3).unwrap();

        let mse = |x: &[f64]| -> f64 {
            x.iter().zip(&clean).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / clean.len() as f64
        };
        assert!(mse(&denoised) < 0.5 * mse(&noisy));
    }

    #[test]
    fn test_denoise_is_deterministic() {
        let signal: Vec<f64> = test_signal(400).iter().zip(lcg_noise(400, 0.2)).map(|(a, b)| a + b).collect();
        let first = perform_wavelet_denoising(&signal, "db4", 3).unwrap();
        let second = perform_wavelet_denoising(&signal, "db4", 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_denoise_errors() {
        assert!(perform_wavelet_denoising(&[1.0; 100], "coif3", 3).is_err());
        assert!(perform_wavelet_denoising(&[1.0; 100], "db4", 0).is_err());
        assert!(perform_wavelet_denoising(&[1.0; 7], "db4", 3).is_err());
        assert!(perform_wavelet_denoising(&[1.0, f64::NAN, 1.0, 1.0], "haar", 1).is_err());
    }
}
