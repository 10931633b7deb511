//! Functional joint parameter estimation.
//!
//! Joint centers and hinge axes are estimated from paired sensor streams
//! recorded during calibration movements, using rigid-body kinematic
//! constraints and robust nonlinear least squares.

pub mod axis;
pub mod center;

pub use axis::*;
pub use center::*;
