//! Synthetic MIMU data generation.
//!
//! Provides clean rigid-body sensor streams from scripted orientation
//! trajectories, plus noise/bias models, for testing and validation of the
//! estimation pipeline.

pub mod rigid_body;
pub mod sensors;

pub use rigid_body::*;
pub use sensors::*;
