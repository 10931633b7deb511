//! # hipkin-core
//!
//! Hip joint kinematics estimation from body-worn Magnetic and Inertial
//! Measurement Units (MIMUs).
//!
//! The crate covers the sensor-fusion and geometric-calibration pipeline
//! that turns raw gyroscope/accelerometer/magnetometer streams into hip
//! joint angle time series: orientation filtering, sensor-to-segment
//! alignment from a static pose and a "star" calibration motion,
//! functional joint-center and hinge-axis estimation, and the clinical
//! Cardan angle decomposition.
//!
//! ## Modules
//!
//! - [`math`]: quaternion/rotation utilities, finite differences, signal
//!   filtering, seedable RNG
//! - [`optimize`]: robust nonlinear least squares (Gauss-Newton /
//!   Levenberg-Marquardt)
//! - [`orientation`]: per-sensor orientation estimation
//! - [`calibration`]: sensor-to-segment alignment
//! - [`joints`]: functional joint center and hinge axis estimation
//! - [`angles`]: hip joint angle decomposition
//! - [`pipeline`]: calibrate/estimate orchestration
//! - [`simulation`]: synthetic MIMU data generation for tests and examples

pub mod angles;
pub mod calibration;
pub mod error;
pub mod joints;
pub mod math;
pub mod optimize;
pub mod orientation;
pub mod pipeline;
pub mod simulation;
pub mod stream;

pub use error::{KinematicsError, Result};

// Common type aliases
use nalgebra::{Matrix3, UnitQuaternion, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f64>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f64>;

/// Unit quaternion type for rotations
pub type Quat = UnitQuaternion<f64>;

/// Gravity constant [m/s²]
pub const GRAVITY: f64 = 9.81;

/// Gravity vector in the global frame (Z-up convention: gravity points down)
pub fn gravity_world() -> Vec3 {
    Vec3::new(0.0, 0.0, -GRAVITY)
}

/// Specific force measured by an accelerometer at rest, in the global frame.
///
/// An accelerometer measures the reaction to gravity, so a resting sensor
/// reads `+g` along the global up axis (rotated into its own frame).
pub fn rest_specific_force() -> Vec3 {
    Vec3::new(0.0, 0.0, GRAVITY)
}
