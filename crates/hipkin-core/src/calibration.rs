//! Sensor-to-segment alignment.
//!
//! Two calibration tasks fix the rotation between each sensor's mounting
//! frame and its anatomical segment frame:
//!
//! - a **static pose** (quiet standing) aligns the segment long axis with
//!   gravity, and
//! - a **star movement** (multi-directional leg motion) exposes the
//!   medial-lateral axis as the dominant rotation axis of the flexion
//!   component.
//!
//! Segment frames follow the clinical convention X anterior, Y superior,
//! Z lateral (to the subject's right).

use log::debug;
use nalgebra::Quaternion;
use serde::{Deserialize, Serialize};

use crate::error::{KinematicsError, Result};
use crate::math::{fix_axis_sign, frame_from_axes, nearest_rotation, twist_about};
use crate::orientation::{estimate_orientation, OrientationFilterParams};
use crate::stream::SensorStream;
use crate::{Quat, Vec3};

/// Parameters for the relative orientation calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelativeOrientationParams {
    /// Orientation filter settings used on the static task when heading
    /// alignment is enabled.
    pub orientation: OrientationFilterParams,
    /// Mean gyro magnitude above which the static task is rejected [rad/s].
    pub rest_gyro_threshold: f64,
    /// Gyro magnitude a star sample needs to enter the axis statistics [rad/s].
    pub motion_gyro_threshold: f64,
    /// Minimum number of star samples above the motion threshold.
    pub min_motion_samples: usize,
    /// Remove the relative heading offset observed during the static pose
    /// (the pose is taken as anatomical neutral). Keeps the two sensors'
    /// unobservable yaw from leaking into the joint angles when no
    /// magnetometer is available.
    pub heading_align: bool,
}

impl Default for RelativeOrientationParams {
    fn default() -> Self {
        Self {
            orientation: OrientationFilterParams::default(),
            rest_gyro_threshold: 0.2,
            motion_gyro_threshold: 0.5,
            min_motion_samples: 32,
            heading_align: true,
        }
    }
}

/// Externally supplied medial-lateral axis candidates (sensor frame).
///
/// When a hinge-axis estimate is available it overrides the star-motion
/// principal axis for that sensor; see
/// [`crate::joints::estimate_knee_axis`].
#[derive(Debug, Clone, Default)]
pub struct AxisHints {
    pub prox_ml: Option<Vec3>,
    pub dist_ml: Option<Vec3>,
}

/// Fixed sensor-to-segment rotations for one joint.
///
/// Immutable once computed; owned by the pipeline and passed by reference
/// into the angle computation.
#[derive(Debug, Clone)]
pub struct SegmentCalibration {
    /// Proximal sensor frame → proximal segment frame.
    pub r_prox: Quat,
    /// Distal sensor frame → distal segment frame.
    pub r_dist: Quat,
    /// RMS angle between the chosen medial-lateral axes and their
    /// orthogonalized in-frame versions [rad]; large values mean the
    /// static and star tasks disagree.
    pub residual: f64,
}

/// Segment long axis (superior, sensor frame) from a static pose.
///
/// The mean accelerometer direction under the standing-pose assumption.
/// Fails when the task is not actually static.
pub fn static_long_axis(stream: &SensorStream, rest_gyro_threshold: f64) -> Result<Vec3> {
    if stream.is_empty() {
        return Err(KinematicsError::InputShape {
            context: "static calibration",
            detail: "empty sensor stream".to_string(),
        });
    }
    let mean_gyro = stream.gyro().iter().map(|w| w.norm()).sum::<f64>() / stream.len() as f64;
    if mean_gyro > rest_gyro_threshold {
        return Err(KinematicsError::DegenerateGeometry {
            estimator: "static calibration",
            reason: format!(
                "static task is not at rest (mean |ω| = {mean_gyro:.3} rad/s)"
            ),
        });
    }
    let mean_accel: Vec3 = stream.accel().iter().sum::<Vec3>() / stream.len() as f64;
    if mean_accel.norm() < 1e-6 {
        return Err(KinematicsError::DegenerateGeometry {
            estimator: "static calibration",
            reason: "no usable gravity direction".to_string(),
        });
    }
    Ok(mean_accel.normalize())
}

/// Dominant rotation axis over a motion task (sensor frame).
///
/// Principal eigenvector of the angular-velocity covariance, restricted to
/// samples with enough rotation. The sign is fixed so the largest-magnitude
/// component is positive.
pub fn dominant_rotation_axis(
    stream: &SensorStream,
    motion_threshold: f64,
    min_samples: usize,
) -> Result<Vec3> {
    let moving: Vec<&Vec3> = stream
        .gyro()
        .iter()
        .filter(|w| w.norm() > motion_threshold)
        .collect();
    if moving.len() < min_samples {
        return Err(KinematicsError::InsufficientMotion {
            estimator: "dominant rotation axis",
            samples: moving.len(),
            required: min_samples,
        });
    }

    let mut cov = crate::Mat3::zeros();
    for w in &moving {
        cov += **w * (**w).transpose();
    }
    cov /= moving.len() as f64;

    let eigen = nalgebra::SymmetricEigen::new(cov);
    let mut max_idx = 0;
    for i in 1..3 {
        if eigen.eigenvalues[i] > eigen.eigenvalues[max_idx] {
            max_idx = i;
        }
    }
    // A clear dominant axis needs the leading eigenvalue to stand out
    let sorted_ratio = {
        let mut vals: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
        vals.sort_by(|a, b| b.total_cmp(a));
        vals[0] / vals[1].max(1e-12)
    };
    if sorted_ratio < 1.5 {
        debug!(
            "dominant rotation axis: weak separation (eigenvalue ratio {sorted_ratio:.2})"
        );
    }

    let col = eigen.eigenvectors.column(max_idx);
    let axis = Vec3::new(col[0], col[1], col[2]);
    Ok(fix_axis_sign(axis.normalize()))
}

/// Assemble a sensor→segment rotation from the segment's long (superior)
/// and medial-lateral axes expressed in the sensor frame.
pub fn segment_frame(long_axis: &Vec3, ml_axis: &Vec3) -> Result<Quat> {
    let y = long_axis.normalize();
    let z_raw = ml_axis - ml_axis.dot(&y) * y;
    if z_raw.norm() < 1e-6 {
        return Err(KinematicsError::DegenerateGeometry {
            estimator: "segment frame",
            reason: "medial-lateral axis is parallel to the long axis".to_string(),
        });
    }
    let z = z_raw.normalize();
    let x = y.cross(&z);

    // Columns are the segment axes in sensor coordinates: maps segment →
    // sensor. The calibration rotation is its inverse.
    let seg_in_sensor = frame_from_axes(&x, &y, &z);
    Ok(nearest_rotation(&seg_in_sensor)?.inverse())
}

/// Compute the fixed sensor-to-segment rotations for a joint from a static
/// pose and a star movement.
pub fn calibrate_relative_orientation(
    static_prox: &SensorStream,
    static_dist: &SensorStream,
    star_prox: &SensorStream,
    star_dist: &SensorStream,
    params: &RelativeOrientationParams,
    hints: &AxisHints,
) -> Result<SegmentCalibration> {
    SensorStream::check_paired(static_prox, static_dist, "relative orientation (static)")?;
    SensorStream::check_paired(star_prox, star_dist, "relative orientation (star)")?;

    let y_prox = static_long_axis(static_prox, params.rest_gyro_threshold)?;
    let y_dist = static_long_axis(static_dist, params.rest_gyro_threshold)?;

    let z_prox = match hints.prox_ml {
        Some(axis) => axis.normalize(),
        None => dominant_rotation_axis(
            star_prox,
            params.motion_gyro_threshold,
            params.min_motion_samples,
        )?,
    };
    let mut z_dist = match hints.dist_ml {
        Some(axis) => axis.normalize(),
        None => dominant_rotation_axis(
            star_dist,
            params.motion_gyro_threshold,
            params.min_motion_samples,
        )?,
    };

    // The principal-axis sign is arbitrary per sensor; when both axes come
    // from the star statistics, make the distal one co-rotate with the
    // proximal one.
    if hints.dist_ml.is_none() {
        let correlation: f64 = star_prox
            .gyro()
            .iter()
            .zip(star_dist.gyro().iter())
            .map(|(wp, wd)| wp.dot(&z_prox) * wd.dot(&z_dist))
            .sum();
        if correlation < 0.0 {
            z_dist = -z_dist;
        }
    }

    let r_prox = segment_frame(&y_prox, &z_prox)?;
    let mut r_dist = segment_frame(&y_dist, &z_dist)?;

    // Residual: how far orthogonalization moved each medial-lateral axis,
    // i.e. the disagreement between the static and star tasks. Computed
    // before any heading re-anchoring, which deliberately rotates the
    // distal frame about its long axis.
    let residual = {
        let e_prox = (r_prox * z_prox).angle(&Vec3::z());
        let e_dist = (r_dist * z_dist).angle(&Vec3::z());
        ((e_prox * e_prox + e_dist * e_dist) / 2.0).sqrt()
    };

    if params.heading_align {
        let offset = static_heading_offset(
            static_prox,
            static_dist,
            &r_prox,
            &r_dist,
            &params.orientation,
        )?;
        debug!("relative orientation: static heading offset {:.2}°", offset.to_degrees());
        r_dist = Quat::from_axis_angle(&nalgebra::Unit::new_normalize(Vec3::y()), offset) * r_dist;
    }

    Ok(SegmentCalibration {
        r_prox,
        r_dist,
        residual,
    })
}

/// Twist about the vertical of the mean relative segment orientation over
/// the static pose.
fn static_heading_offset(
    static_prox: &SensorStream,
    static_dist: &SensorStream,
    r_prox: &Quat,
    r_dist: &Quat,
    orientation: &OrientationFilterParams,
) -> Result<f64> {
    let q_prox = estimate_orientation(static_prox, orientation)?;
    let q_dist = estimate_orientation(static_dist, orientation)?;

    let relative: Vec<Quat> = q_prox
        .iter()
        .zip(q_dist.iter())
        .map(|(qp, qd)| (qp * r_prox.inverse()).inverse() * (qd * r_dist.inverse()))
        .collect();
    let mean = mean_orientation(&relative);

    Ok(twist_about(&mean, &Vec3::y()))
}

/// Average of a set of nearby orientations (sign-aligned coordinate mean).
fn mean_orientation(series: &[Quat]) -> Quat {
    if series.is_empty() {
        return Quat::identity();
    }
    let first = series[0];
    let mut acc = nalgebra::Vector4::zeros();
    for q in series {
        let coords = if first.coords.dot(&q.coords) < 0.0 {
            -q.coords
        } else {
            q.coords
        };
        acc += coords;
    }
    Quat::from_quaternion(Quaternion::from_vector(acc / series.len() as f64))
}
