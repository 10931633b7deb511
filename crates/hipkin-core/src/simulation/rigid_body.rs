//! Clean MIMU streams from scripted rigid-body motion.
//!
//! A sensor at a constant offset from a fixed rotation center measures
//! angular velocity equal to the body rate and specific force equal to the
//! rigid-body terms plus rotated gravity. Both are derived here directly
//! from an orientation trajectory, so generated streams are exactly
//! consistent with the estimators' kinematic model.

use crate::math::{
    angular_velocity_between, derivative, rigid_acceleration, DerivativeOrder,
};
use crate::stream::SensorStream;
use crate::{rest_specific_force, Quat, Result, Vec3};

/// Orientation from a base pose and Cardan angles applied in Z-X-Y order.
///
/// Convenient for scripting joint-like motion profiles.
pub fn cardan_orientation(base: &Quat, z: f64, x: f64, y: f64) -> Quat {
    base * Quat::from_axis_angle(&nalgebra::Unit::new_normalize(Vec3::z()), z)
        * Quat::from_axis_angle(&nalgebra::Unit::new_normalize(Vec3::x()), x)
        * Quat::from_axis_angle(&nalgebra::Unit::new_normalize(Vec3::y()), y)
}

/// Sample an orientation trajectory at a fixed rate.
pub fn orientation_trajectory(
    sample_rate: f64,
    n: usize,
    orientation_at: impl Fn(f64) -> Quat,
) -> Vec<Quat> {
    let dt = 1.0 / sample_rate;
    (0..n).map(|i| orientation_at(i as f64 * dt)).collect()
}

/// Generate the MIMU stream a sensor would record while following the
/// given orientation trajectory at a constant offset from a fixed
/// rotation center.
///
/// * `orientations` — sensor→global orientation per sample
/// * `offset` — rotation-center→sensor vector in the sensor frame [m]
/// * `field` — global magnetic field; `Some` adds a magnetometer channel
pub fn imu_from_orientation(
    orientations: &[Quat],
    offset: &Vec3,
    sample_rate: f64,
    field: Option<&Vec3>,
) -> Result<SensorStream> {
    imu_with_center_motion(orientations, None, offset, sample_rate, field)
}

/// Like [`imu_from_orientation`], but the rotation center itself may
/// accelerate (`center_accel` is its world-frame acceleration per sample).
///
/// This is the general ball-joint case: a thigh sensor rotates about a hip
/// center that is being carried around by the pelvis.
pub fn imu_with_center_motion(
    orientations: &[Quat],
    center_accel: Option<&[Vec3]>,
    offset: &Vec3,
    sample_rate: f64,
    field: Option<&Vec3>,
) -> Result<SensorStream> {
    let n = orientations.len();
    let dt = 1.0 / sample_rate;

    if let Some(c) = center_accel {
        if c.len() != n {
            return Err(crate::KinematicsError::length_mismatch(
                "simulated stream",
                n,
                c.len(),
            ));
        }
    }

    // Body rates by central differences of the trajectory
    let mut gyro = Vec::with_capacity(n);
    for i in 0..n {
        let omega = if n < 2 {
            Vec3::zeros()
        } else if i == 0 {
            angular_velocity_between(&orientations[0], &orientations[1], dt)
        } else if i == n - 1 {
            angular_velocity_between(&orientations[n - 2], &orientations[n - 1], dt)
        } else {
            angular_velocity_between(&orientations[i - 1], &orientations[i + 1], 2.0 * dt)
        };
        gyro.push(omega);
    }

    let gyro_dot = derivative(&gyro, dt, DerivativeOrder::Fourth);

    let accel: Vec<Vec3> = (0..n)
        .map(|i| {
            let center_term = match center_accel {
                Some(c) => c[i] + rest_specific_force(),
                None => rest_specific_force(),
            };
            rigid_acceleration(&gyro[i], &gyro_dot[i], offset)
                + orientations[i].inverse_transform_vector(&center_term)
        })
        .collect();

    match field {
        Some(f) => {
            let mag: Vec<Vec3> = orientations
                .iter()
                .map(|q| q.inverse_transform_vector(f))
                .collect();
            SensorStream::with_mag(gyro, accel, mag, sample_rate)
        }
        None => SensorStream::new(gyro, accel, sample_rate),
    }
}
