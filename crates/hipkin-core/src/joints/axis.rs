//! Hinge axis estimation.
//!
//! During a hinge-dominant motion (knee flexion/extension) the angular
//! velocities of the two adjacent-segment sensors stay aligned with one
//! fixed axis in each sensor's frame. Solving for those axes disambiguates
//! the coronal-plane alignment of the thigh during calibration.
//!
//! The axes are parameterized by spherical angles, which keeps them on the
//! unit sphere without a constrained solver; the residual compares the
//! magnitudes of `ω × j` across the two sensors and therefore needs no
//! inter-sensor rotation.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::calibration::dominant_rotation_axis;
use crate::error::{KinematicsError, Result};
use crate::math::fix_axis_sign;
use crate::optimize::{solve_least_squares, LeastSquaresConfig, RobustLoss};
use crate::stream::SensorStream;
use crate::Vec3;

/// Configuration for hinge axis estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KneeAxisConfig {
    /// Solver settings for the nonlinear fit.
    pub opt: LeastSquaresConfig,
    /// Mean gyro magnitude below which the axis is unobservable [rad/s].
    pub motion_threshold: f64,
}

impl Default for KneeAxisConfig {
    fn default() -> Self {
        Self {
            opt: LeastSquaresConfig {
                loss: RobustLoss::arctan(),
                ..Default::default()
            },
            motion_threshold: 0.15,
        }
    }
}

/// Estimated hinge axes with fit diagnostics.
///
/// The axes are unit vectors in each sensor's local frame, sign-normalized
/// deterministically; the anatomical sign convention is applied downstream.
#[derive(Debug, Clone)]
pub struct AxisEstimate {
    /// Hinge axis in the proximal sensor frame.
    pub prox: Vec3,
    /// Hinge axis in the distal sensor frame.
    pub dist: Vec3,
    /// RMS of the cross-product magnitude mismatch at the solution [rad/s].
    pub residual: f64,
}

/// Estimate the hinge axis from paired sensor streams recorded during a
/// flexion/extension task.
pub fn estimate_knee_axis(
    prox: &SensorStream,
    dist: &SensorStream,
    config: &KneeAxisConfig,
) -> Result<AxisEstimate> {
    SensorStream::check_paired(prox, dist, "knee axis")?;

    for (stream, name) in [(prox, "proximal"), (dist, "distal")] {
        let mean_gyro =
            stream.gyro().iter().map(|w| w.norm()).sum::<f64>() / stream.len().max(1) as f64;
        if mean_gyro < config.motion_threshold {
            return Err(KinematicsError::DegenerateGeometry {
                estimator: "knee axis",
                reason: format!(
                    "{name} sensor mean angular velocity {mean_gyro:.3} rad/s is below \
                     the motion threshold"
                ),
            });
        }
    }

    // Initialize from the dominant rotation axis of each stream
    let init_prox = dominant_rotation_axis(prox, config.motion_threshold, 16)?;
    let init_dist = dominant_rotation_axis(dist, config.motion_threshold, 16)?;
    let x0 = DVector::from_vec(vec![
        init_prox.z.clamp(-1.0, 1.0).acos(),
        init_prox.y.atan2(init_prox.x),
        init_dist.z.clamp(-1.0, 1.0).acos(),
        init_dist.y.atan2(init_dist.x),
    ]);

    let residuals = |x: &DVector<f64>| -> DVector<f64> {
        let j1 = spherical_axis(x[0], x[1]);
        let j2 = spherical_axis(x[2], x[3]);
        DVector::from_iterator(
            prox.len(),
            prox.gyro()
                .iter()
                .zip(dist.gyro().iter())
                .map(|(w1, w2)| w1.cross(&j1).norm() - w2.cross(&j2).norm()),
        )
    };

    let sol = solve_least_squares(residuals, x0, &config.opt, "knee axis")?;

    Ok(AxisEstimate {
        prox: fix_axis_sign(spherical_axis(sol.x[0], sol.x[1])),
        dist: fix_axis_sign(spherical_axis(sol.x[2], sol.x[3])),
        residual: sol.residual_rms,
    })
}

/// Unit vector from inclination `theta` and azimuth `phi`.
fn spherical_axis(theta: f64, phi: f64) -> Vec3 {
    Vec3::new(
        theta.sin() * phi.cos(),
        theta.sin() * phi.sin(),
        theta.cos(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::SimpleRng;
    use crate::rest_specific_force;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    /// Hinge motion: both sensors rotate about fixed (different) local axes
    /// with different rate profiles.
    fn hinge_streams(j1: Vec3, j2: Vec3, n: usize, noise: f64) -> (SensorStream, SensorStream) {
        let dt = 0.01;
        let mut rng = SimpleRng::new(3);
        let mut gyro1 = Vec::with_capacity(n);
        let mut gyro2 = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f64 * dt;
            let rate1 = 1.2 * (2.0 * PI * 0.6 * t).sin();
            let rate2 = rate1 + 2.0 * (2.0 * PI * 0.6 * t + 0.3).sin();
            gyro1.push(rate1 * j1 + rng.next_gaussian_vec3(noise));
            gyro2.push(rate2 * j2 + rng.next_gaussian_vec3(noise));
        }
        let accel = vec![rest_specific_force(); n];
        (
            SensorStream::new(gyro1, accel.clone(), 100.0).unwrap(),
            SensorStream::new(gyro2, accel, 100.0).unwrap(),
        )
    }

    #[test]
    fn test_recovers_known_hinge_axis() {
        let j1 = Vec3::new(0.0, 1.0, 0.0);
        let j2 = Vec3::new(0.1, 0.95, -0.05).normalize();
        let (prox, dist) = hinge_streams(j1, j2, 2000, 0.0);

        let est = estimate_knee_axis(&prox, &dist, &KneeAxisConfig::default()).unwrap();

        assert!(est.prox.dot(&j1).abs() > (2.0_f64.to_radians()).cos());
        assert!(est.dist.dot(&j2).abs() > (2.0_f64.to_radians()).cos());
        assert!(est.residual < 1e-3);
    }

    #[test]
    fn test_axes_are_unit_and_sign_normalized() {
        let j1 = Vec3::new(0.2, -0.9, 0.1).normalize();
        let j2 = Vec3::new(0.0, 1.0, 0.0);
        let (prox, dist) = hinge_streams(j1, j2, 1500, 0.0);

        let est = estimate_knee_axis(&prox, &dist, &KneeAxisConfig::default()).unwrap();

        assert_relative_eq!(est.prox.norm(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(est.dist.norm(), 1.0, epsilon = 1e-9);
        // Largest component positive by convention; j1 points mostly -y, the
        // reported axis flips it
        assert!(est.prox.y > 0.0);
    }

    #[test]
    fn test_tolerates_gyro_noise() {
        let j1 = Vec3::new(0.0, 1.0, 0.0);
        let j2 = Vec3::new(0.0, 0.98, 0.2).normalize();
        let (prox, dist) = hinge_streams(j1, j2, 3000, 0.03);

        let est = estimate_knee_axis(&prox, &dist, &KneeAxisConfig::default()).unwrap();

        assert!(est.prox.dot(&j1).abs() > (5.0_f64.to_radians()).cos());
        assert!(est.dist.dot(&j2).abs() > (5.0_f64.to_radians()).cos());
    }

    #[test]
    fn test_degenerate_without_motion() {
        let n = 500;
        let gyro = vec![Vec3::new(0.01, 0.0, 0.0); n];
        let accel = vec![rest_specific_force(); n];
        let prox = SensorStream::new(gyro.clone(), accel.clone(), 100.0).unwrap();
        let dist = SensorStream::new(gyro, accel, 100.0).unwrap();

        assert!(matches!(
            estimate_knee_axis(&prox, &dist, &KneeAxisConfig::default()),
            Err(KinematicsError::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn test_length_mismatch() {
        let (prox, _) = hinge_streams(Vec3::y(), Vec3::y(), 100, 0.0);
        let (_, dist) = hinge_streams(Vec3::y(), Vec3::y(), 99, 0.0);
        assert!(matches!(
            estimate_knee_axis(&prox, &dist, &KneeAxisConfig::default()),
            Err(KinematicsError::InputShape { .. })
        ));
    }
}
