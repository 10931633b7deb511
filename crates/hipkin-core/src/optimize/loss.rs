//! Robust loss functions.

use serde::{Deserialize, Serialize};

/// Loss applied to residuals during optimization.
///
/// Realized as iteratively-reweighted least squares: each iteration
/// scales residual `r` and its Jacobian row by `weight(r)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RobustLoss {
    /// Ordinary least squares.
    Linear,
    /// Arctan loss: ρ(z) = s²·atan(z/s²) with z = r². Heavily
    /// down-weights outliers beyond the scale `s`.
    Arctan { scale: f64 },
}

impl RobustLoss {
    /// Arctan loss with unit scale.
    pub fn arctan() -> Self {
        RobustLoss::Arctan { scale: 1.0 }
    }

    /// IRLS weight for a residual value: sqrt(ρ'(r²)).
    pub fn weight(&self, residual: f64) -> f64 {
        match *self {
            RobustLoss::Linear => 1.0,
            RobustLoss::Arctan { scale } => {
                let z = (residual / scale).powi(2);
                (1.0 / (1.0 + z * z)).sqrt()
            }
        }
    }

    /// Loss value for a residual, for cost reporting.
    pub fn cost(&self, residual: f64) -> f64 {
        match *self {
            RobustLoss::Linear => residual * residual,
            RobustLoss::Arctan { scale } => {
                let s2 = scale * scale;
                s2 * ((residual * residual) / s2).atan()
            }
        }
    }
}

impl Default for RobustLoss {
    fn default() -> Self {
        RobustLoss::Linear
    }
}
