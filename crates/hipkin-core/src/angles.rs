//! Hip joint angle computation.
//!
//! Combines calibrated per-sample segment orientations into the relative
//! pelvis→thigh rotation and decomposes it with the clinical Cardan
//! sequence Z–X–Y:
//!
//! 1. flexion(+)/extension(−) about the pelvis medial-lateral axis (Z),
//! 2. adduction(+)/abduction(−) about the floating X axis,
//! 3. internal(+)/external(−) rotation about the thigh long axis (Y).
//!
//! Segment frames are X anterior, Y superior, Z lateral-right for both
//! sides; the left side mirrors the adduction and rotation signs so both
//! hips report in the same clinical convention. The sequence and sign
//! choices are fixed here and documented rather than configurable.

use serde::{Deserialize, Serialize};

use crate::calibration::SegmentCalibration;
use crate::error::{KinematicsError, Result};
use crate::orientation::OrientationSeries;

/// Body side of a joint, for the mirrored sign convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Joint angle time series [rad], one entry per input sample.
///
/// Channels are continuous: consecutive samples never jump by more than π.
#[derive(Debug, Clone, PartialEq)]
pub struct JointAngleSeries {
    pub flexion: Vec<f64>,
    pub adduction: Vec<f64>,
    pub rotation: Vec<f64>,
}

impl JointAngleSeries {
    pub fn len(&self) -> usize {
        self.flexion.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flexion.is_empty()
    }
}

/// Compute hip joint angles from calibrated orientation series.
///
/// `prox` and `dist` are the pelvis and thigh sensor orientation series;
/// the calibration's fixed sensor-to-segment rotations turn them into
/// segment orientations before the relative rotation is decomposed.
pub fn compute_joint_angles(
    prox: &OrientationSeries,
    dist: &OrientationSeries,
    calibration: &SegmentCalibration,
    side: Side,
) -> Result<JointAngleSeries> {
    if prox.len() != dist.len() {
        return Err(KinematicsError::length_mismatch(
            "joint angles",
            prox.len(),
            dist.len(),
        ));
    }

    let n = prox.len();
    let mut flexion = Vec::with_capacity(n);
    let mut adduction = Vec::with_capacity(n);
    let mut rotation = Vec::with_capacity(n);

    let r_prox_inv = calibration.r_prox.inverse();
    let r_dist_inv = calibration.r_dist.inverse();

    for (qp, qd) in prox.iter().zip(dist.iter()) {
        let seg_prox = qp * r_prox_inv;
        let seg_dist = qd * r_dist_inv;
        let relative = seg_prox.inverse() * seg_dist;
        let m = relative.to_rotation_matrix().into_inner();

        // Z-X-Y extraction: R = Rz(α)·Rx(β)·Ry(γ)
        //   m(2,1) = sin β
        //   m(0,1) = -sin α · cos β     m(1,1) = cos α · cos β
        //   m(2,0) = -cos β · sin γ     m(2,2) = cos β · cos γ
        let beta = m[(2, 1)].clamp(-1.0, 1.0).asin();
        let alpha = (-m[(0, 1)]).atan2(m[(1, 1)]);
        let gamma = (-m[(2, 0)]).atan2(m[(2, 2)]);

        flexion.push(alpha);
        adduction.push(beta);
        rotation.push(gamma);
    }

    unwrap_channel(&mut flexion);
    unwrap_channel(&mut adduction);
    unwrap_channel(&mut rotation);

    if side == Side::Left {
        for v in adduction.iter_mut().chain(rotation.iter_mut()) {
            *v = -*v;
        }
    }

    Ok(JointAngleSeries {
        flexion,
        adduction,
        rotation,
    })
}

/// Remove 2π discontinuities between consecutive samples.
fn unwrap_channel(channel: &mut [f64]) {
    let mut offset = 0.0;
    for i in 1..channel.len() {
        let raw = channel[i] + offset;
        let diff = raw - channel[i - 1];
        if diff > std::f64::consts::PI {
            offset -= 2.0 * std::f64::consts::PI;
        } else if diff < -std::f64::consts::PI {
            offset += 2.0 * std::f64::consts::PI;
        }
        channel[i] += offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Quat, Vec3};
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn identity_calibration() -> SegmentCalibration {
        SegmentCalibration {
            r_prox: Quat::identity(),
            r_dist: Quat::identity(),
            residual: 0.0,
        }
    }

    fn axis(v: Vec3) -> nalgebra::Unit<Vec3> {
        nalgebra::Unit::new_normalize(v)
    }

    #[test]
    fn test_pure_flexion() {
        let n = 50;
        let prox = vec![Quat::identity(); n];
        let dist: Vec<Quat> = (0..n)
            .map(|i| Quat::from_axis_angle(&axis(Vec3::z()), 0.01 * i as f64))
            .collect();

        let angles =
            compute_joint_angles(&prox, &dist, &identity_calibration(), Side::Right).unwrap();

        for i in 0..n {
            assert_relative_eq!(angles.flexion[i], 0.01 * i as f64, epsilon = 1e-9);
            assert_relative_eq!(angles.adduction[i], 0.0, epsilon = 1e-9);
            assert_relative_eq!(angles.rotation[i], 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_cardan_sequence_round_trip() {
        // Compose a known Z-X-Y rotation and read the angles back
        let (alpha, beta, gamma) = (0.4, -0.2, 0.3);
        let q = Quat::from_axis_angle(&axis(Vec3::z()), alpha)
            * Quat::from_axis_angle(&axis(Vec3::x()), beta)
            * Quat::from_axis_angle(&axis(Vec3::y()), gamma);

        let angles = compute_joint_angles(
            &vec![Quat::identity()],
            &vec![q],
            &identity_calibration(),
            Side::Right,
        )
        .unwrap();

        assert_relative_eq!(angles.flexion[0], alpha, epsilon = 1e-9);
        assert_relative_eq!(angles.adduction[0], beta, epsilon = 1e-9);
        assert_relative_eq!(angles.rotation[0], gamma, epsilon = 1e-9);
    }

    #[test]
    fn test_calibration_rotations_are_applied() {
        // Sensors mounted rotated; segment motion is pure flexion
        let r_prox = Quat::from_scaled_axis(Vec3::new(0.2, -0.3, 0.1));
        let r_dist = Quat::from_scaled_axis(Vec3::new(-0.1, 0.25, 0.2));
        let cal = SegmentCalibration {
            r_prox,
            r_dist,
            residual: 0.0,
        };

        let n = 30;
        let theta = |i: usize| 0.02 * i as f64;
        // q_sensor = q_segment ∘ r, with pelvis fixed at identity
        let prox: Vec<Quat> = (0..n).map(|_| r_prox).collect();
        let dist: Vec<Quat> = (0..n)
            .map(|i| Quat::from_axis_angle(&axis(Vec3::z()), theta(i)) * r_dist)
            .collect();

        let angles = compute_joint_angles(&prox, &dist, &cal, Side::Right).unwrap();
        for i in 0..n {
            assert_relative_eq!(angles.flexion[i], theta(i), epsilon = 1e-9);
            assert_relative_eq!(angles.adduction[i], 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_left_side_mirrors_adduction_and_rotation() {
        let q = Quat::from_axis_angle(&axis(Vec3::z()), 0.3)
            * Quat::from_axis_angle(&axis(Vec3::x()), 0.1)
            * Quat::from_axis_angle(&axis(Vec3::y()), -0.2);
        let prox = vec![Quat::identity()];
        let dist = vec![q];

        let right =
            compute_joint_angles(&prox, &dist, &identity_calibration(), Side::Right).unwrap();
        let left =
            compute_joint_angles(&prox, &dist, &identity_calibration(), Side::Left).unwrap();

        assert_relative_eq!(left.flexion[0], right.flexion[0], epsilon = 1e-12);
        assert_relative_eq!(left.adduction[0], -right.adduction[0], epsilon = 1e-12);
        assert_relative_eq!(left.rotation[0], -right.rotation[0], epsilon = 1e-12);
    }

    #[test]
    fn test_continuity_through_large_flexion_sweep() {
        // Sweep flexion through ±π: the unwrapped channel must be smooth
        let n = 700;
        let prox = vec![Quat::identity(); n];
        let dist: Vec<Quat> = (0..n)
            .map(|i| Quat::from_axis_angle(&axis(Vec3::z()), 0.01 * i as f64))
            .collect();

        let angles =
            compute_joint_angles(&prox, &dist, &identity_calibration(), Side::Right).unwrap();

        for pair in angles.flexion.windows(2) {
            assert!((pair[1] - pair[0]).abs() < 0.02);
        }
        // And it actually reaches beyond π
        assert!(angles.flexion[n - 1] > PI);
    }

    #[test]
    fn test_idempotence() {
        let n = 100;
        let prox: Vec<Quat> = (0..n)
            .map(|i| Quat::from_scaled_axis(Vec3::new(0.001 * i as f64, 0.0, 0.002 * i as f64)))
            .collect();
        let dist: Vec<Quat> = (0..n)
            .map(|i| Quat::from_scaled_axis(Vec3::new(0.0, 0.003 * i as f64, 0.001 * i as f64)))
            .collect();
        let cal = SegmentCalibration {
            r_prox: Quat::from_scaled_axis(Vec3::new(0.1, 0.0, -0.1)),
            r_dist: Quat::from_scaled_axis(Vec3::new(0.0, 0.2, 0.05)),
            residual: 0.0,
        };

        let a = compute_joint_angles(&prox, &dist, &cal, Side::Right).unwrap();
        let b = compute_joint_angles(&prox, &dist, &cal, Side::Right).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_length_mismatch() {
        let prox = vec![Quat::identity(); 5];
        let dist = vec![Quat::identity(); 4];
        assert!(matches!(
            compute_joint_angles(&prox, &dist, &identity_calibration(), Side::Right),
            Err(KinematicsError::InputShape { .. })
        ));
    }
}
