//! Functional joint center estimation.
//!
//! For a ball-and-socket joint, the specific force measured by a sensor at
//! constant offset `r` from the joint center satisfies
//!
//! ```text
//! a = a_center + ω×(ω×r) + ω̇×r + gravity terms
//! ```
//!
//! Subtracting the rigid-body terms from both sensors' accelerations must
//! leave vectors of equal magnitude (the shared center acceleration plus
//! gravity), which gives a scalar residual per sample over the six unknown
//! offset components. An optional sample-consensus wrapper rejects samples
//! corrupted by soft-tissue artifact or sensor slippage.

use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{KinematicsError, Result};
use crate::math::{band_filter, derivative, rigid_acceleration, BandSpec, DerivativeOrder, SimpleRng};
use crate::optimize::{solve_least_squares, LeastSquaresConfig};
use crate::stream::SensorStream;
use crate::{Vec3, GRAVITY};

/// Which signal drives the high-motion sample mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskData {
    /// Keep samples where both angular velocity magnitudes exceed the
    /// threshold [rad/s].
    Gyro,
    /// Keep samples where both acceleration magnitudes deviate from
    /// gravity by more than the threshold [m/s²].
    Accel,
    /// No masking.
    None,
}

/// Sample-consensus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SacConfig {
    /// Number of random subsets to try.
    pub trials: usize,
    /// Samples per subset.
    pub subset_size: usize,
    /// Absolute residual below which a sample counts as an inlier [m/s²].
    pub inlier_threshold: f64,
}

impl Default for SacConfig {
    fn default() -> Self {
        Self {
            trials: 64,
            subset_size: 16,
            inlier_threshold: 0.35,
        }
    }
}

/// Joint center solving strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CenterMethod {
    /// One robust fit over all (masked) samples.
    Direct,
    /// Random-subset consensus: fit candidates on minimal subsets, keep
    /// the one with the largest inlier set, refit on the inliers.
    SampleConsensus(SacConfig),
}

/// Configuration for joint center estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointCenterConfig {
    /// Local gravitational acceleration [m/s²].
    pub gravity: f64,
    pub method: CenterMethod,
    /// Restrict the fit to high-motion samples.
    pub mask_input: bool,
    pub mask_data: MaskData,
    /// Minimum usable samples after masking, and minimum inlier count in
    /// consensus mode.
    pub min_samples: usize,
    /// Optional zero-phase smoothing band for the differentiated angular
    /// acceleration.
    pub accel_band: Option<BandSpec>,
    /// Solver settings for the nonlinear fit.
    pub opt: LeastSquaresConfig,
    /// Seed for the consensus subset draws.
    pub seed: u64,
}

impl Default for JointCenterConfig {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            method: CenterMethod::SampleConsensus(SacConfig::default()),
            mask_input: true,
            mask_data: MaskData::Gyro,
            min_samples: 1000,
            accel_band: Some(BandSpec::angular_acceleration()),
            opt: LeastSquaresConfig::default(),
            seed: 0x5eed,
        }
    }
}

/// Estimated joint-center offsets with fit diagnostics.
#[derive(Debug, Clone)]
pub struct JointCenterEstimate {
    /// Joint center → proximal sensor vector, proximal sensor frame [m].
    pub prox: Vec3,
    /// Joint center → distal sensor vector, distal sensor frame [m].
    pub dist: Vec3,
    /// RMS residual over the samples used in the final fit [m/s²].
    pub residual: f64,
    /// Number of samples in the final fit.
    pub inlier_count: usize,
    /// Full-length inlier mask (consensus mode only).
    pub inliers: Option<Vec<bool>>,
}

/// Mean masked angular velocity below which the problem is unobservable.
const MIN_MEAN_GYRO: f64 = 0.2;

/// Threshold-relaxation constants, shared by both mask signals.
const MASK_THRESHOLD_START: f64 = 0.8;
const MASK_THRESHOLD_STEP: f64 = 0.05;
const MASK_THRESHOLD_FLOOR: f64 = 0.09;

/// Estimate the joint center offsets from paired sensor streams recorded
/// during a motion task.
pub fn estimate_joint_center(
    prox: &SensorStream,
    dist: &SensorStream,
    config: &JointCenterConfig,
) -> Result<JointCenterEstimate> {
    SensorStream::check_paired(prox, dist, "joint center")?;
    let n = prox.len();
    if n < 3 {
        return Err(KinematicsError::InsufficientMotion {
            estimator: "joint center",
            samples: n,
            required: config.min_samples,
        });
    }

    let dt = prox.dt();
    let mut prox_wd = derivative(prox.gyro(), dt, DerivativeOrder::Fourth);
    let mut dist_wd = derivative(dist.gyro(), dt, DerivativeOrder::Fourth);
    if let Some(band) = &config.accel_band {
        prox_wd = band_filter(&prox_wd, prox.sample_rate(), band);
        dist_wd = band_filter(&dist_wd, dist.sample_rate(), band);
    }

    let masked = select_samples(prox, dist, config)?;

    let mean_gyro = masked
        .iter()
        .map(|&i| prox.gyro()[i].norm().min(dist.gyro()[i].norm()))
        .sum::<f64>()
        / masked.len() as f64;
    if mean_gyro < MIN_MEAN_GYRO {
        return Err(KinematicsError::DegenerateGeometry {
            estimator: "joint center",
            reason: format!(
                "mean angular velocity {mean_gyro:.3} rad/s is too low to observe the center"
            ),
        });
    }

    let residuals_at = |x: &DVector<f64>, indices: &[usize]| -> DVector<f64> {
        let r1 = Vec3::new(x[0], x[1], x[2]);
        let r2 = Vec3::new(x[3], x[4], x[5]);
        DVector::from_iterator(
            indices.len(),
            indices.iter().map(|&i| {
                let lhs =
                    prox.accel()[i] - rigid_acceleration(&prox.gyro()[i], &prox_wd[i], &r1);
                let rhs =
                    dist.accel()[i] - rigid_acceleration(&dist.gyro()[i], &dist_wd[i], &r2);
                lhs.norm() - rhs.norm()
            }),
        )
    };

    match &config.method {
        CenterMethod::Direct => {
            let sol = solve_least_squares(
                |x| residuals_at(x, &masked),
                DVector::zeros(6),
                &config.opt,
                "joint center",
            )?;
            Ok(JointCenterEstimate {
                prox: Vec3::new(sol.x[0], sol.x[1], sol.x[2]),
                dist: Vec3::new(sol.x[3], sol.x[4], sol.x[5]),
                residual: sol.residual_rms,
                inlier_count: masked.len(),
                inliers: None,
            })
        }
        CenterMethod::SampleConsensus(sac) => {
            let subset_size = sac.subset_size.max(8).min(masked.len());
            let mut rng = SimpleRng::new(config.seed);
            let mut best: Option<(Vec<usize>, DVector<f64>)> = None;

            for trial in 0..sac.trials {
                let subset: Vec<usize> = rng
                    .sample_indices(masked.len(), subset_size)
                    .into_iter()
                    .map(|p| masked[p])
                    .collect();

                let candidate = match solve_least_squares(
                    |x| residuals_at(x, &subset),
                    DVector::zeros(6),
                    &config.opt,
                    "joint center",
                ) {
                    Ok(sol) => sol.x,
                    Err(err) => {
                        debug!("joint center: consensus trial {trial} failed: {err}");
                        continue;
                    }
                };

                let scores = residuals_at(&candidate, &masked);
                let inliers: Vec<usize> = masked
                    .iter()
                    .enumerate()
                    .filter(|&(p, _)| scores[p].abs() < sac.inlier_threshold)
                    .map(|(_, &i)| i)
                    .collect();

                let is_better = best
                    .as_ref()
                    .map(|(b, _)| inliers.len() > b.len())
                    .unwrap_or(true);
                if is_better {
                    best = Some((inliers, candidate));
                }
            }

            let (inliers, candidate) = best.ok_or(KinematicsError::InsufficientMotion {
                estimator: "joint center",
                samples: 0,
                required: config.min_samples,
            })?;
            if inliers.len() < config.min_samples {
                return Err(KinematicsError::InsufficientMotion {
                    estimator: "joint center",
                    samples: inliers.len(),
                    required: config.min_samples,
                });
            }
            debug!(
                "joint center: consensus kept {}/{} masked samples",
                inliers.len(),
                masked.len()
            );

            let sol = solve_least_squares(
                |x| residuals_at(x, &inliers),
                candidate,
                &config.opt,
                "joint center",
            )?;

            let mut mask = vec![false; n];
            for &i in &inliers {
                mask[i] = true;
            }
            Ok(JointCenterEstimate {
                prox: Vec3::new(sol.x[0], sol.x[1], sol.x[2]),
                dist: Vec3::new(sol.x[3], sol.x[4], sol.x[5]),
                residual: sol.residual_rms,
                inlier_count: inliers.len(),
                inliers: Some(mask),
            })
        }
    }
}

/// High-motion sample selection with threshold relaxation.
///
/// Starting strict, the threshold is relaxed until enough samples survive;
/// hitting the floor first means the trial simply does not contain enough
/// motion.
fn select_samples(
    prox: &SensorStream,
    dist: &SensorStream,
    config: &JointCenterConfig,
) -> Result<Vec<usize>> {
    let n = prox.len();
    if !config.mask_input || config.mask_data == MaskData::None {
        return Ok((0..n).collect());
    }

    let keep = |i: usize, threshold: f64| -> bool {
        match config.mask_data {
            MaskData::Gyro => {
                prox.gyro()[i].norm() > threshold && dist.gyro()[i].norm() > threshold
            }
            MaskData::Accel => {
                (prox.accel()[i].norm() - config.gravity).abs() > threshold
                    && (dist.accel()[i].norm() - config.gravity).abs() > threshold
            }
            MaskData::None => true,
        }
    };

    let mut threshold = MASK_THRESHOLD_START;
    loop {
        let selected: Vec<usize> = (0..n).filter(|&i| keep(i, threshold)).collect();
        if selected.len() >= config.min_samples.min(n) {
            if threshold < MASK_THRESHOLD_START {
                debug!(
                    "joint center: mask threshold relaxed to {threshold:.2} \
                     ({} samples)",
                    selected.len()
                );
            }
            return Ok(selected);
        }
        threshold -= MASK_THRESHOLD_STEP;
        if threshold < MASK_THRESHOLD_FLOOR {
            return Err(KinematicsError::InsufficientMotion {
                estimator: "joint center",
                samples: selected.len(),
                required: config.min_samples,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::integrate_angular_velocity;
    use crate::optimize::RobustLoss;
    use crate::rest_specific_force;
    use crate::Quat;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    /// Multi-axis rotation about a fixed center, sensor mounted at `r`.
    fn orbit_stream(r: Vec3, phase: f64, n: usize) -> SensorStream {
        let dt = 0.01;
        let omega_at = |t: f64| {
            Vec3::new(
                1.6 * (2.0 * PI * 0.45 * t + phase).sin(),
                1.2 * (2.0 * PI * 0.30 * t + 0.4 + phase).sin(),
                1.9 * (2.0 * PI * 0.55 * t + 1.1 + phase).sin(),
            )
        };
        let mut q = Quat::identity();
        let mut gyro = Vec::with_capacity(n);
        let mut accel = Vec::with_capacity(n);
        let mut omegas = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f64 * dt;
            omegas.push(omega_at(t));
            gyro.push(omega_at(t));
        }
        // Exact angular acceleration by central differences of the analytic rate
        let omega_dot = derivative(&omegas, dt, DerivativeOrder::Fourth);
        for i in 0..n {
            let a = rigid_acceleration(&omegas[i], &omega_dot[i], &r)
                + q.inverse_transform_vector(&rest_specific_force());
            accel.push(a);
            q = integrate_angular_velocity(&q, &omegas[i], dt);
        }
        SensorStream::new(gyro, accel, 100.0).unwrap()
    }

    fn test_config(method: CenterMethod) -> JointCenterConfig {
        JointCenterConfig {
            method,
            min_samples: 400,
            accel_band: None,
            opt: LeastSquaresConfig {
                loss: RobustLoss::Linear,
                max_iterations: 200,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_direct_recovers_known_offsets() {
        let r_prox = Vec3::new(0.05, -0.02, 0.01);
        let r_dist = Vec3::new(-0.03, 0.18, 0.04);
        let prox = orbit_stream(r_prox, 0.0, 3000);
        let dist = orbit_stream(r_dist, 0.9, 3000);

        let est =
            estimate_joint_center(&prox, &dist, &test_config(CenterMethod::Direct)).unwrap();

        assert_relative_eq!(est.prox, r_prox, epsilon = 5e-3);
        assert_relative_eq!(est.dist, r_dist, epsilon = 5e-3);
        assert!(est.residual < 0.05);
        assert!(est.inliers.is_none());
    }

    #[test]
    fn test_consensus_recovers_despite_corruption() {
        let r_prox = Vec3::new(0.05, -0.02, 0.01);
        let r_dist = Vec3::new(-0.03, 0.18, 0.04);
        let prox = orbit_stream(r_prox, 0.0, 3000);
        let mut dist = orbit_stream(r_dist, 0.9, 3000);

        // Corrupt 20% of the distal accelerations (soft-tissue artifact)
        let mut rng = SimpleRng::new(99);
        let n = dist.len();
        let corrupted: Vec<usize> = rng.sample_indices(n, n / 5);
        {
            let accel: Vec<Vec3> = dist
                .accel()
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    if corrupted.contains(&i) {
                        a + Vec3::new(6.0, -4.0, 8.0)
                    } else {
                        *a
                    }
                })
                .collect();
            dist = SensorStream::new(dist.gyro().to_vec(), accel, 100.0).unwrap();
        }

        // Robust inner loss: candidate fits shrug off the odd corrupted
        // sample inside a subset
        let mut config = test_config(CenterMethod::SampleConsensus(SacConfig::default()));
        config.opt.loss = RobustLoss::Arctan { scale: 0.5 };
        let est = estimate_joint_center(&prox, &dist, &config).unwrap();

        assert_relative_eq!(est.prox, r_prox, epsilon = 1e-2);
        assert_relative_eq!(est.dist, r_dist, epsilon = 1e-2);

        // The inlier mask excludes most corrupted samples
        let mask = est.inliers.as_ref().unwrap();
        let kept_corrupted = corrupted.iter().filter(|&&i| mask[i]).count();
        assert!(kept_corrupted < corrupted.len() / 5);
        assert!(est.inlier_count >= 1000);
    }

    #[test]
    fn test_consensus_determinism() {
        let r_prox = Vec3::new(0.04, 0.0, -0.02);
        let r_dist = Vec3::new(0.0, 0.15, 0.03);
        let prox = orbit_stream(r_prox, 0.2, 2000);
        let dist = orbit_stream(r_dist, 1.3, 2000);

        let config = test_config(CenterMethod::SampleConsensus(SacConfig::default()));
        let a = estimate_joint_center(&prox, &dist, &config).unwrap();
        let b = estimate_joint_center(&prox, &dist, &config).unwrap();

        assert_eq!(a.prox, b.prox);
        assert_eq!(a.dist, b.dist);
        assert_eq!(a.inlier_count, b.inlier_count);
    }

    #[test]
    fn test_insufficient_motion_error() {
        // Nearly still streams: masking relaxes to the floor and fails
        let n = 2000;
        let gyro = vec![Vec3::new(0.01, 0.0, 0.0); n];
        let accel = vec![rest_specific_force(); n];
        let prox = SensorStream::new(gyro.clone(), accel.clone(), 100.0).unwrap();
        let dist = SensorStream::new(gyro, accel, 100.0).unwrap();

        let err =
            estimate_joint_center(&prox, &dist, &test_config(CenterMethod::Direct)).unwrap_err();
        assert!(matches!(err, KinematicsError::InsufficientMotion { .. }));
    }

    #[test]
    fn test_degenerate_geometry_error() {
        // Enough "motion" to pass the relaxed mask but far too slow to
        // condition the fit
        let n = 2000;
        let gyro = vec![Vec3::new(0.12, 0.0, 0.0); n];
        let accel = vec![rest_specific_force(); n];
        let prox = SensorStream::new(gyro.clone(), accel.clone(), 100.0).unwrap();
        let dist = SensorStream::new(gyro, accel, 100.0).unwrap();

        let err =
            estimate_joint_center(&prox, &dist, &test_config(CenterMethod::Direct)).unwrap_err();
        assert!(matches!(err, KinematicsError::DegenerateGeometry { .. }));
    }

    #[test]
    fn test_length_mismatch_error() {
        let prox = orbit_stream(Vec3::zeros(), 0.0, 100);
        let dist = orbit_stream(Vec3::zeros(), 0.0, 99);
        let err =
            estimate_joint_center(&prox, &dist, &test_config(CenterMethod::Direct)).unwrap_err();
        assert!(matches!(err, KinematicsError::InputShape { .. }));
    }
}
