//! Error types for the estimation pipeline.

use thiserror::Error;

/// Errors reported by the estimators and the pipeline.
///
/// Every variant carries enough context (which estimator, which counts or
/// residuals) for the caller to retry with adjusted configuration.
#[derive(Debug, Error)]
pub enum KinematicsError {
    /// Mismatched sequence lengths or sample rates between paired inputs.
    #[error("{context}: {detail}")]
    InputShape {
        context: &'static str,
        detail: String,
    },

    /// Too few usable samples (after masking or consensus) for a fit.
    #[error("{estimator}: insufficient motion ({samples} usable samples, {required} required)")]
    InsufficientMotion {
        estimator: &'static str,
        samples: usize,
        required: usize,
    },

    /// The nonlinear solver exhausted its iteration budget.
    #[error("{estimator}: no convergence after {iterations} iterations (residual {residual:.4e})")]
    OptimizationDivergence {
        estimator: &'static str,
        iterations: usize,
        residual: f64,
    },

    /// Near-singular configuration, e.g. negligible angular velocity
    /// throughout a trial that requires rotational motion.
    #[error("{estimator}: degenerate geometry: {reason}")]
    DegenerateGeometry {
        estimator: &'static str,
        reason: String,
    },

    /// `estimate` was called on a pipeline that has not been calibrated.
    #[error("pipeline: estimate called before a successful calibrate")]
    NotCalibrated,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, KinematicsError>;

impl KinematicsError {
    /// Helper for length-mismatch errors on paired sequences.
    pub(crate) fn length_mismatch(context: &'static str, left: usize, right: usize) -> Self {
        KinematicsError::InputShape {
            context,
            detail: format!("sequence length mismatch ({left} vs {right} samples)"),
        }
    }
}
