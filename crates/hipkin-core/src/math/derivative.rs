//! Finite-difference derivatives of sampled vector signals.
//!
//! Used to obtain angular acceleration from gyroscope data. Central
//! stencils inside the sequence, second-order one-sided stencils at the
//! edges.

use serde::{Deserialize, Serialize};

use crate::Vec3;

/// Finite-difference stencil order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerivativeOrder {
    /// Three-point central differences.
    Second,
    /// Five-point central differences.
    Fourth,
}

/// Differentiate a uniformly sampled vector sequence.
///
/// Returns a sequence of the same length. Sequences shorter than three
/// samples come back as zeros (no derivative is defined).
pub fn derivative(series: &[Vec3], dt: f64, order: DerivativeOrder) -> Vec<Vec3> {
    let n = series.len();
    if n < 3 {
        return vec![Vec3::zeros(); n];
    }

    let mut out = vec![Vec3::zeros(); n];

    // Second-order one-sided stencils at the boundaries
    out[0] = (-3.0 * series[0] + 4.0 * series[1] - series[2]) / (2.0 * dt);
    out[n - 1] = (3.0 * series[n - 1] - 4.0 * series[n - 2] + series[n - 3]) / (2.0 * dt);

    let central2 = |i: usize| (series[i + 1] - series[i - 1]) / (2.0 * dt);

    match order {
        DerivativeOrder::Second => {
            for i in 1..n - 1 {
                out[i] = central2(i);
            }
        }
        DerivativeOrder::Fourth if n >= 5 => {
            out[1] = central2(1);
            out[n - 2] = central2(n - 2);
            for i in 2..n - 2 {
                out[i] = (-series[i + 2] + 8.0 * series[i + 1] - 8.0 * series[i - 1]
                    + series[i - 2])
                    / (12.0 * dt);
            }
        }
        DerivativeOrder::Fourth => {
            for i in 1..n - 1 {
                out[i] = central2(i);
            }
        }
    }

    out
}
