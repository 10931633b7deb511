//! Calibrate/estimate orchestration.
//!
//! The pipeline owns the fitted calibration parameters and sequences the
//! estimators: orientation filtering for every sensor, joint-center and
//! hinge-axis estimation from the star task, sensor-to-segment alignment,
//! and finally per-trial angle computation.
//!
//! Sensor placement assumptions: one sensor on the sacrum/pelvis and one
//! on the lateral aspect of each thigh. The lateral mounting is what lets
//! the joint-center estimate disambiguate the medial-lateral axis sign.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::angles::{compute_joint_angles, JointAngleSeries, Side};
use crate::calibration::{
    calibrate_relative_orientation, dominant_rotation_axis, AxisHints, RelativeOrientationParams,
    SegmentCalibration,
};
use crate::error::{KinematicsError, Result};
use crate::joints::{
    estimate_joint_center, estimate_knee_axis, AxisEstimate, JointCenterConfig,
    JointCenterEstimate, KneeAxisConfig,
};
use crate::orientation::{estimate_orientation, OrientationFilterParams, OrientationSeries};
use crate::stream::SensorStream;
use crate::Vec3;

/// One recorded trial: the three sensors of the hip setup.
#[derive(Debug, Clone)]
pub struct TrialData {
    pub pelvis: SensorStream,
    pub left_thigh: SensorStream,
    pub right_thigh: SensorStream,
}

impl TrialData {
    /// Bundle three sensor streams, validating that they are usable
    /// together (equal lengths and sample rates).
    pub fn new(
        pelvis: SensorStream,
        left_thigh: SensorStream,
        right_thigh: SensorStream,
    ) -> Result<Self> {
        SensorStream::check_paired(&pelvis, &left_thigh, "trial (pelvis/left thigh)")?;
        SensorStream::check_paired(&pelvis, &right_thigh, "trial (pelvis/right thigh)")?;
        Ok(Self {
            pelvis,
            left_thigh,
            right_thigh,
        })
    }
}

/// Pipeline configuration: one block per estimator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub orientation: OrientationFilterParams,
    pub relative: RelativeOrientationParams,
    pub joint_center: JointCenterConfig,
    pub knee_axis: KneeAxisConfig,
}

/// Calibration state fitted by [`HipPipeline::calibrate`].
///
/// Immutable once computed; estimate calls borrow it.
#[derive(Debug, Clone)]
pub struct FittedParameters {
    pub left: SegmentCalibration,
    pub right: SegmentCalibration,
    pub left_center: JointCenterEstimate,
    pub right_center: JointCenterEstimate,
    /// Hinge-axis estimates, when the star task supported them.
    pub left_axis: Option<AxisEstimate>,
    pub right_axis: Option<AxisEstimate>,
}

/// Per-sensor orientation series of one trial.
#[derive(Debug, Clone)]
pub struct TrialOrientations {
    pub pelvis: OrientationSeries,
    pub left_thigh: OrientationSeries,
    pub right_thigh: OrientationSeries,
}

/// Output of [`HipPipeline::estimate`].
#[derive(Debug, Clone)]
pub struct HipJointAngles {
    pub left: JointAngleSeries,
    pub right: JointAngleSeries,
    /// Intermediate orientation series, when requested.
    pub orientation: Option<TrialOrientations>,
}

/// Hip kinematics pipeline: calibrate once, estimate per trial.
#[derive(Debug, Clone)]
pub struct HipPipeline {
    config: PipelineConfig,
    fitted: Option<FittedParameters>,
}

impl HipPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    /// Fitted calibration parameters, if `calibrate` has run.
    pub fn fitted(&self) -> Option<&FittedParameters> {
        self.fitted.as_ref()
    }

    /// Fit the calibration parameters from a static pose trial and a star
    /// movement trial.
    pub fn calibrate(&mut self, static_trial: &TrialData, star_trial: &TrialData) -> Result<()> {
        let left_center = estimate_joint_center(
            &star_trial.pelvis,
            &star_trial.left_thigh,
            &self.config.joint_center,
        )?;
        let right_center = estimate_joint_center(
            &star_trial.pelvis,
            &star_trial.right_thigh,
            &self.config.joint_center,
        )?;
        debug!(
            "calibrate: joint centers left {:?} right {:?}",
            left_center.prox, right_center.prox
        );

        // Pelvis medial-lateral axis: the line through the two hip joint
        // centers, expressed in the pelvis sensor frame. The center
        // estimates are joint-center→sensor vectors, so the center
        // positions are their negations.
        let pelvis_ml_raw = left_center.prox - right_center.prox;
        if pelvis_ml_raw.norm() < 1e-3 {
            return Err(KinematicsError::DegenerateGeometry {
                estimator: "pipeline calibration",
                reason: "left and right hip center estimates coincide".to_string(),
            });
        }
        let pelvis_ml = pelvis_ml_raw.normalize();

        let (left_axis, left_ml) = self.thigh_ml_axis(
            &star_trial.pelvis,
            &star_trial.left_thigh,
            &left_center,
            Side::Left,
        )?;
        let (right_axis, right_ml) = self.thigh_ml_axis(
            &star_trial.pelvis,
            &star_trial.right_thigh,
            &right_center,
            Side::Right,
        )?;

        let left = calibrate_relative_orientation(
            &static_trial.pelvis,
            &static_trial.left_thigh,
            &star_trial.pelvis,
            &star_trial.left_thigh,
            &self.config.relative,
            &AxisHints {
                prox_ml: Some(pelvis_ml),
                dist_ml: Some(left_ml),
            },
        )?;
        let right = calibrate_relative_orientation(
            &static_trial.pelvis,
            &static_trial.right_thigh,
            &star_trial.pelvis,
            &star_trial.right_thigh,
            &self.config.relative,
            &AxisHints {
                prox_ml: Some(pelvis_ml),
                dist_ml: Some(right_ml),
            },
        )?;

        self.fitted = Some(FittedParameters {
            left,
            right,
            left_center,
            right_center,
            left_axis,
            right_axis,
        });
        Ok(())
    }

    /// Estimate hip joint angles for a motion trial.
    pub fn estimate(&self, trial: &TrialData, return_orientation: bool) -> Result<HipJointAngles> {
        let fitted = self.fitted.as_ref().ok_or(KinematicsError::NotCalibrated)?;

        let pelvis = estimate_orientation(&trial.pelvis, &self.config.orientation)?;
        let left_thigh = estimate_orientation(&trial.left_thigh, &self.config.orientation)?;
        let right_thigh = estimate_orientation(&trial.right_thigh, &self.config.orientation)?;

        let left = compute_joint_angles(&pelvis, &left_thigh, &fitted.left, Side::Left)?;
        let right = compute_joint_angles(&pelvis, &right_thigh, &fitted.right, Side::Right)?;

        let orientation = return_orientation.then(|| TrialOrientations {
            pelvis,
            left_thigh,
            right_thigh,
        });

        Ok(HipJointAngles {
            left,
            right,
            orientation,
        })
    }

    /// Thigh medial-lateral axis from the star task.
    ///
    /// Prefers the hinge-axis estimate between pelvis and thigh (the
    /// flexion-dominant component of the star movement); falls back to the
    /// thigh's dominant rotation axis when the hinge fit is not supported
    /// by the data. Either way, the sign is disambiguated medially using
    /// the joint-center estimate.
    fn thigh_ml_axis(
        &self,
        star_pelvis: &SensorStream,
        star_thigh: &SensorStream,
        center: &JointCenterEstimate,
        side: Side,
    ) -> Result<(Option<AxisEstimate>, Vec3)> {
        let (axis_estimate, axis) =
            match estimate_knee_axis(star_pelvis, star_thigh, &self.config.knee_axis) {
                Ok(est) => {
                    let axis = est.dist;
                    (Some(est), axis)
                }
                Err(
                    err @ (KinematicsError::DegenerateGeometry { .. }
                    | KinematicsError::InsufficientMotion { .. }
                    | KinematicsError::OptimizationDivergence { .. }),
                ) => {
                    warn!("calibrate: hinge axis unavailable ({err}); using dominant rotation axis");
                    let axis = dominant_rotation_axis(
                        star_thigh,
                        self.config.relative.motion_gyro_threshold,
                        self.config.relative.min_motion_samples,
                    )?;
                    (None, axis)
                }
                Err(err) => return Err(err),
            };

        Ok((axis_estimate, lateral_sign(axis, &center.dist, side)))
    }
}

/// Orient a thigh medial-lateral axis laterally.
///
/// Segment Z points to the subject's right on both sides. A laterally
/// mounted thigh sensor has a lateral joint-center→sensor component, which
/// fixes the sign: positive dot product on the right side, negative on the
/// left. A near-zero dot product leaves the estimator's sign untouched.
fn lateral_sign(axis: Vec3, center_to_sensor: &Vec3, side: Side) -> Vec3 {
    let lateral = match side {
        Side::Right => 1.0,
        Side::Left => -1.0,
    };
    let d = axis.dot(center_to_sensor) * lateral;
    if d < -1e-6 {
        -axis
    } else {
        axis
    }
}
