//! Signal smoothing for derived quantities.
//!
//! The joint-center estimator differentiates gyroscope data, which
//! amplifies noise; the resulting angular acceleration can be smoothed
//! with a zero-phase band-pass before entering the optimizer. Filters are
//! applied forward and backward so no phase lag leaks into the residuals.

use serde::{Deserialize, Serialize};

use crate::Vec3;

/// Frequency band for signal smoothing [Hz].
///
/// `low_hz <= 0` degenerates to a plain low-pass at `high_hz`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl BandSpec {
    /// Typical smoothing band for angular acceleration of human movement.
    pub fn angular_acceleration() -> Self {
        Self {
            low_hz: 0.0,
            high_hz: 12.0,
        }
    }
}

/// Centered moving average with the given window length (clamped to odd).
pub fn moving_average(series: &[Vec3], window: usize) -> Vec<Vec3> {
    let n = series.len();
    if n == 0 || window <= 1 {
        return series.to_vec();
    }
    let half = window / 2;

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            let sum: Vec3 = series[lo..hi].iter().sum();
            sum / (hi - lo) as f64
        })
        .collect()
}

/// Second-order section (biquad) coefficients, normalized so a0 = 1.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// Butterworth-style low-pass at `cutoff_hz`.
    fn low_pass(cutoff_hz: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * cutoff_hz / sample_rate;
        let q = std::f64::consts::FRAC_1_SQRT_2;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Constant-peak-gain band-pass over [low_hz, high_hz].
    fn band_pass(low_hz: f64, high_hz: f64, sample_rate: f64) -> Self {
        let f0 = (low_hz * high_hz).sqrt();
        let q = f0 / (high_hz - low_hz);
        let w0 = 2.0 * std::f64::consts::PI * f0 / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let a0 = 1.0 + alpha;
        Self {
            b0: alpha / a0,
            b1: 0.0,
            b2: -alpha / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Direct form I over one scalar channel.
    fn run(&self, input: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(input.len());
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        // Prime the delay line with the first sample to soften the edge
        if let Some(&first) = input.first() {
            x1 = first;
            x2 = first;
            y1 = first * (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2).max(1e-12);
            y2 = y1;
        }
        for &x in input {
            let y = self.b0 * x + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            x2 = x1;
            x1 = x;
            y2 = y1;
            y1 = y;
            out.push(y);
        }
        out
    }

    /// Zero-phase application: forward pass, then backward pass.
    fn filtfilt(&self, input: &[f64]) -> Vec<f64> {
        let forward = self.run(input);
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        reversed = self.run(&reversed);
        reversed.into_iter().rev().collect()
    }
}

/// Zero-phase smoothing of a vector sequence over the given band.
///
/// The cutoff is clamped below the Nyquist frequency; a band with
/// `low_hz <= 0` is treated as a low-pass.
pub fn band_filter(series: &[Vec3], sample_rate: f64, band: &BandSpec) -> Vec<Vec3> {
    if series.len() < 8 {
        return series.to_vec();
    }
    let nyquist = sample_rate / 2.0;
    let high = band.high_hz.min(0.98 * nyquist);

    let biquad = if band.low_hz > 0.0 {
        Biquad::band_pass(band.low_hz.min(high * 0.99), high, sample_rate)
    } else {
        Biquad::low_pass(high, sample_rate)
    };

    let mut channels = [
        Vec::with_capacity(series.len()),
        Vec::with_capacity(series.len()),
        Vec::with_capacity(series.len()),
    ];
    for v in series {
        channels[0].push(v.x);
        channels[1].push(v.y);
        channels[2].push(v.z);
    }

    let filtered: Vec<Vec<f64>> = channels.iter().map(|c| biquad.filtfilt(c)).collect();

    (0..series.len())
        .map(|i| Vec3::new(filtered[0][i], filtered[1][i], filtered[2][i]))
        .collect()
}
