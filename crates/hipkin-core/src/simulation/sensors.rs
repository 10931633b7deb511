//! MIMU noise and bias models.

use serde::{Deserialize, Serialize};

use crate::math::SimpleRng;
use crate::stream::SensorStream;
use crate::{Result, Vec3};

/// Noise/bias parameters of a simulated MIMU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MimuNoiseConfig {
    /// Gyroscope noise std dev [rad/s].
    pub gyro_noise_std: f64,
    /// Accelerometer noise std dev [m/s²].
    pub accel_noise_std: f64,
    /// Magnetometer noise std dev (field units).
    pub mag_noise_std: f64,
    /// Constant gyroscope bias [rad/s].
    pub gyro_bias: Vec3,
    /// Constant accelerometer bias [m/s²].
    pub accel_bias: Vec3,
}

impl Default for MimuNoiseConfig {
    fn default() -> Self {
        Self {
            gyro_noise_std: 0.01,
            accel_noise_std: 0.1,
            mag_noise_std: 0.3,
            gyro_bias: Vec3::zeros(),
            accel_bias: Vec3::zeros(),
        }
    }
}

/// Applies noise and bias to clean sensor streams, deterministically per
/// seed.
#[derive(Debug, Clone)]
pub struct MimuNoise {
    config: MimuNoiseConfig,
    rng: SimpleRng,
}

impl MimuNoise {
    pub fn new(config: MimuNoiseConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SimpleRng::new(seed),
        }
    }

    /// Produce a corrupted copy of a clean stream.
    pub fn apply(&mut self, clean: &SensorStream) -> Result<SensorStream> {
        let gyro: Vec<Vec3> = clean
            .gyro()
            .iter()
            .map(|w| {
                w + self.config.gyro_bias
                    + self.rng.next_gaussian_vec3(self.config.gyro_noise_std)
            })
            .collect();
        let accel: Vec<Vec3> = clean
            .accel()
            .iter()
            .map(|a| {
                a + self.config.accel_bias
                    + self.rng.next_gaussian_vec3(self.config.accel_noise_std)
            })
            .collect();

        match clean.mag() {
            Some(mag) => {
                let mag: Vec<Vec3> = mag
                    .iter()
                    .map(|m| m + self.rng.next_gaussian_vec3(self.config.mag_noise_std))
                    .collect();
                SensorStream::with_mag(gyro, accel, mag, clean.sample_rate())
            }
            None => SensorStream::new(gyro, accel, clean.sample_rate()),
        }
    }
}
