//! Nonlinear least squares with robust losses.
//!
//! The joint-center and hinge-axis estimators share this small solver:
//! a numeric-Jacobian Gauss-Newton / Levenberg-Marquardt iteration over
//! dense residual vectors, with iteratively reweighted robust losses.

pub mod least_squares;
pub mod loss;

pub use least_squares::*;
pub use loss::*;
