//! Per-sensor orientation estimation.
//!
//! A complementary filter over one MIMU stream: gyroscope integration
//! propagates the orientation, gravity observations from the accelerometer
//! pull the tilt back when the sensor is quasi-static, and magnetometer
//! observations (when present) do the same for heading. Samples where the
//! acceleration magnitude strays from gravity are rejected and the filter
//! degrades to pure integration — never to an error.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{KinematicsError, Result};
use crate::math::{align_sign, integrate_angular_velocity};
use crate::stream::SensorStream;
use crate::{Quat, Vec3, GRAVITY};

/// Orientation filter tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrientationFilterParams {
    /// Gyroscope noise standard deviation [rad/s].
    pub sigma_g: f64,
    /// Accelerometer noise standard deviation [m/s²].
    pub sigma_a: f64,
    /// Accepted deviation of the acceleration magnitude from gravity,
    /// as a fraction of g. Samples outside the window are not used for
    /// tilt correction.
    pub error_factor: f64,
    /// Drift-correction gain (step size of the complementary blend).
    pub c: f64,
    /// Number of leading samples used to initialize orientation and the
    /// gyroscope bias estimate. The stream is assumed to start near rest.
    pub n_init: usize,
}

impl Default for OrientationFilterParams {
    fn default() -> Self {
        Self {
            sigma_g: 0.01,
            sigma_a: 0.1,
            error_factor: 0.1,
            c: 2.0,
            n_init: 64,
        }
    }
}

/// Orientation estimates, one unit quaternion (sensor→global) per sample.
pub type OrientationSeries = Vec<Quat>;

/// Gyro magnitude below which the initialization window counts as rest.
const REST_GYRO_THRESHOLD: f64 = 0.1;

/// Upper bound on a single tilt-correction step. Long gyro-only stretches
/// recover over several accepted samples instead of one hard yank toward a
/// possibly still-disturbed accel direction.
const MAX_CORRECTION_GAIN: f64 = 0.05;

/// Estimate the orientation time series for one sensor stream.
///
/// The output has the same length as the input, unit norm at every sample,
/// and no representation sign flips between consecutive samples.
pub fn estimate_orientation(
    stream: &SensorStream,
    params: &OrientationFilterParams,
) -> Result<OrientationSeries> {
    if stream.is_empty() {
        return Err(KinematicsError::InputShape {
            context: "orientation",
            detail: "empty sensor stream".to_string(),
        });
    }

    let dt = stream.dt();
    let n = stream.len();
    let window = params.n_init.max(1).min(n);

    let accel_mean = mean(&stream.accel()[..window]);
    if accel_mean.norm() < 1e-6 {
        return Err(KinematicsError::DegenerateGeometry {
            estimator: "orientation",
            reason: "no usable gravity direction in initialization window".to_string(),
        });
    }

    // Tilt initialization: rotate the mean specific force onto global up.
    let mut q = Quat::rotation_between(&accel_mean, &Vec3::z()).unwrap_or_else(|| {
        // Antiparallel: any 180° rotation about a horizontal axis works
        Quat::from_axis_angle(&nalgebra::Unit::new_normalize(Vec3::x()), std::f64::consts::PI)
    });

    // Heading initialization and reference field from the magnetometer.
    let mag_reference = stream.mag().map(|mag| {
        let m_mean = mean(&mag[..window]);
        let m_world = q * m_mean;
        let yaw = m_world.y.atan2(m_world.x);
        q = Quat::from_axis_angle(&nalgebra::Unit::new_normalize(Vec3::z()), -yaw) * q;
        (q * m_mean, m_mean.norm())
    });

    // Bias seed: mean gyro over the window, if the window is actually at rest.
    let gyro_mean = mean(&stream.gyro()[..window]);
    let mut bias = if gyro_mean.norm() < REST_GYRO_THRESHOLD {
        gyro_mean
    } else {
        Vec3::zeros()
    };

    let accept_band = params.error_factor * GRAVITY;
    let gain_rate = params.c * params.sigma_g / params.sigma_a.max(1e-12);
    let mut series = Vec::with_capacity(n);
    let mut time_since_correction = dt;
    let mut rejected = 0usize;

    for i in 0..n {
        if i > 0 {
            let omega = stream.gyro()[i] - bias;
            q = integrate_angular_velocity(&q, &omega, dt);
        }

        let accel = stream.accel()[i];
        let accel_norm = accel.norm();
        if (accel_norm - GRAVITY).abs() <= accept_band && accel_norm > 1e-9 {
            // The longer the filter ran on gyro alone, the harder the pull
            // back toward the gravity observation.
            let gamma = (gain_rate * time_since_correction).min(MAX_CORRECTION_GAIN);
            let measured_up = q * (accel / accel_norm);
            if let Some(err_rot) = Quat::rotation_between(&measured_up, &Vec3::z()) {
                let correction = Quat::from_scaled_axis(err_rot.scaled_axis() * gamma);
                q = correction * q;

                // Integral term tracks the gyro bias
                let predicted_down = q.inverse_transform_vector(&Vec3::z());
                let error_body = (accel / accel_norm).cross(&predicted_down);
                bias -= (gamma / 10.0) * error_body;
            }
            time_since_correction = dt;
        } else {
            rejected += 1;
            time_since_correction += dt;
        }

        if let (Some((m_ref, m_norm)), Some(mag)) = (&mag_reference, stream.mag()) {
            let m = mag[i];
            if (m.norm() - m_norm).abs() <= params.error_factor * m_norm {
                q = heading_correction(&q, &m, m_ref, gain_rate * dt);
            }
        }

        // Renormalize and keep the representation continuous
        q = Quat::from_quaternion(q.into_inner());
        let aligned = match series.last() {
            Some(prev) => align_sign(prev, &q),
            None => q,
        };
        q = aligned;
        series.push(q);
    }

    if rejected > 0 {
        debug!(
            "orientation: {rejected}/{n} accel samples rejected for tilt correction \
             (|a| outside {:.2} m/s² of g)",
            accept_band
        );
    }

    Ok(series)
}

/// Rotate `q` about the global vertical so the horizontal component of the
/// measured field lines up with the reference field.
fn heading_correction(q: &Quat, measured: &Vec3, reference: &Vec3, gamma: f64) -> Quat {
    let m_world = q * measured;
    let m_h = Vec3::new(m_world.x, m_world.y, 0.0);
    let r_h = Vec3::new(reference.x, reference.y, 0.0);
    if m_h.norm() < 1e-9 || r_h.norm() < 1e-9 {
        return *q;
    }
    let cross = m_h.x * r_h.y - m_h.y * r_h.x;
    let angle = cross.atan2(m_h.dot(&r_h));
    Quat::from_axis_angle(
        &nalgebra::Unit::new_normalize(Vec3::z()),
        angle * gamma.min(1.0),
    ) * *q
}

fn mean(samples: &[Vec3]) -> Vec3 {
    if samples.is_empty() {
        return Vec3::zeros();
    }
    samples.iter().sum::<Vec3>() / samples.len() as f64
}
