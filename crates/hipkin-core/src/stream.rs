//! Sensor data containers.
//!
//! A [`SensorStream`] is the read-only input to every estimator: equal-length
//! gyroscope and accelerometer sequences (plus an optional magnetometer
//! sequence) sampled at a constant rate in one fixed sensor-local frame.

use crate::error::{KinematicsError, Result};
use crate::Vec3;

/// One sensor's recorded data for a trial.
///
/// Invariants (checked at construction): gyro/accel (and mag, if present)
/// have equal lengths and the sample rate is positive and finite. Streams
/// are never mutated by the estimators.
#[derive(Debug, Clone)]
pub struct SensorStream {
    gyro: Vec<Vec3>,
    accel: Vec<Vec3>,
    mag: Option<Vec<Vec3>>,
    sample_rate: f64,
}

impl SensorStream {
    /// Create a stream from gyroscope [rad/s] and accelerometer [m/s²] data.
    pub fn new(gyro: Vec<Vec3>, accel: Vec<Vec3>, sample_rate: f64) -> Result<Self> {
        Self::build(gyro, accel, None, sample_rate)
    }

    /// Create a stream that also carries magnetometer data (any consistent unit).
    pub fn with_mag(
        gyro: Vec<Vec3>,
        accel: Vec<Vec3>,
        mag: Vec<Vec3>,
        sample_rate: f64,
    ) -> Result<Self> {
        Self::build(gyro, accel, Some(mag), sample_rate)
    }

    fn build(
        gyro: Vec<Vec3>,
        accel: Vec<Vec3>,
        mag: Option<Vec<Vec3>>,
        sample_rate: f64,
    ) -> Result<Self> {
        if gyro.len() != accel.len() {
            return Err(KinematicsError::length_mismatch(
                "sensor stream",
                gyro.len(),
                accel.len(),
            ));
        }
        if let Some(m) = &mag {
            if m.len() != gyro.len() {
                return Err(KinematicsError::length_mismatch(
                    "sensor stream (mag)",
                    gyro.len(),
                    m.len(),
                ));
            }
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(KinematicsError::InputShape {
                context: "sensor stream",
                detail: format!("invalid sample rate {sample_rate} Hz"),
            });
        }
        Ok(Self {
            gyro,
            accel,
            mag,
            sample_rate,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.gyro.len()
    }

    /// True when the stream holds no samples.
    pub fn is_empty(&self) -> bool {
        self.gyro.is_empty()
    }

    /// Sampling interval [s].
    pub fn dt(&self) -> f64 {
        1.0 / self.sample_rate
    }

    /// Sample rate [Hz].
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Angular velocity samples [rad/s], sensor frame.
    pub fn gyro(&self) -> &[Vec3] {
        &self.gyro
    }

    /// Specific force samples [m/s²], sensor frame.
    pub fn accel(&self) -> &[Vec3] {
        &self.accel
    }

    /// Magnetic field samples, sensor frame, if recorded.
    pub fn mag(&self) -> Option<&[Vec3]> {
        self.mag.as_deref()
    }

    /// Validate that two streams form a usable pair: equal lengths and
    /// matching sample rates.
    pub fn check_paired(a: &Self, b: &Self, context: &'static str) -> Result<()> {
        if a.len() != b.len() {
            return Err(KinematicsError::length_mismatch(context, a.len(), b.len()));
        }
        if (a.sample_rate - b.sample_rate).abs() > 1e-9 * a.sample_rate.max(1.0) {
            return Err(KinematicsError::InputShape {
                context,
                detail: format!(
                    "sample rate mismatch ({} Hz vs {} Hz)",
                    a.sample_rate, b.sample_rate
                ),
            });
        }
        Ok(())
    }
}
