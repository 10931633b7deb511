//! Dense nonlinear least-squares solver.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{KinematicsError, Result};
use crate::optimize::RobustLoss;

/// Solver strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    /// Plain Gauss-Newton steps. Fast near the solution, can overshoot far
    /// from it.
    GaussNewton,
    /// Gauss-Newton with adaptive diagonal damping.
    LevenbergMarquardt,
}

/// Configuration for a least-squares solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeastSquaresConfig {
    pub method: SolverMethod,
    pub loss: RobustLoss,
    /// Iteration budget; exceeding it is a convergence failure.
    pub max_iterations: usize,
    /// Convergence threshold on the step norm relative to the parameter norm.
    pub step_tolerance: f64,
    /// Convergence threshold on the gradient infinity norm.
    pub gradient_tolerance: f64,
    /// Initial damping factor (Levenberg-Marquardt only).
    pub initial_damping: f64,
}

impl Default for LeastSquaresConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::LevenbergMarquardt,
            loss: RobustLoss::Linear,
            max_iterations: 100,
            step_tolerance: 1e-10,
            gradient_tolerance: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

/// Fitted parameters and diagnostics.
#[derive(Debug, Clone)]
pub struct LeastSquaresSolution {
    /// Fitted parameter vector.
    pub x: DVector<f64>,
    /// Root-mean-square of the raw (unweighted) residuals at the solution.
    pub residual_rms: f64,
    /// Iterations consumed.
    pub iterations: usize,
}

/// Minimize `Σ ρ(e_i(x)²)` over `x` for a dense residual function.
///
/// The Jacobian is evaluated by forward differences; the robust loss is
/// applied as iterative reweighting. Returns
/// [`KinematicsError::OptimizationDivergence`] when the iteration budget
/// runs out before the step or gradient tolerance is met.
pub fn solve_least_squares<F>(
    residuals: F,
    x0: DVector<f64>,
    config: &LeastSquaresConfig,
    estimator: &'static str,
) -> Result<LeastSquaresSolution>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let n = x0.len();
    let mut x = x0;
    let mut damping = config.initial_damping;

    let robust_cost = |r: &DVector<f64>| -> f64 { r.iter().map(|&e| config.loss.cost(e)).sum() };

    let mut r = residuals(&x);
    let mut cost = robust_cost(&r);

    for iteration in 0..config.max_iterations {
        let m = r.len();
        // Forward-difference Jacobian
        let mut jacobian = DMatrix::zeros(m, n);
        for j in 0..n {
            let h = 1e-7 * x[j].abs().max(1.0);
            let mut x_step = x.clone();
            x_step[j] += h;
            let r_step = residuals(&x_step);
            for i in 0..m {
                jacobian[(i, j)] = (r_step[i] - r[i]) / h;
            }
        }

        // Robust reweighting of residuals and Jacobian rows
        let mut r_w = r.clone();
        let mut j_w = jacobian;
        for i in 0..m {
            let w = config.loss.weight(r[i]);
            r_w[i] *= w;
            for j in 0..n {
                j_w[(i, j)] *= w;
            }
        }

        let jt = j_w.transpose();
        let gradient = &jt * &r_w;
        if gradient.amax() <= config.gradient_tolerance {
            return Ok(LeastSquaresSolution {
                residual_rms: rms(&r),
                x,
                iterations: iteration,
            });
        }

        let jtj = &jt * &j_w;

        let step = match config.method {
            SolverMethod::GaussNewton => solve_normal_equations(&jtj, &gradient, 0.0)?,
            SolverMethod::LevenbergMarquardt => {
                // Try increasing damping until the step reduces the cost
                let mut step = None;
                for _ in 0..16 {
                    let candidate = solve_normal_equations(&jtj, &gradient, damping)?;
                    let x_new = &x + &candidate;
                    let r_new = residuals(&x_new);
                    let cost_new = robust_cost(&r_new);
                    if cost_new < cost {
                        damping = (damping / 3.0).max(1e-12);
                        step = Some((candidate, x_new, r_new, cost_new));
                        break;
                    }
                    damping *= 4.0;
                }
                match step {
                    Some((candidate, x_new, r_new, cost_new)) => {
                        x = x_new;
                        r = r_new;
                        cost = cost_new;
                        let step_norm = candidate.norm();
                        if step_norm <= config.step_tolerance * (x.norm() + config.step_tolerance)
                        {
                            return Ok(LeastSquaresSolution {
                                residual_rms: rms(&r),
                                x,
                                iterations: iteration + 1,
                            });
                        }
                        continue;
                    }
                    None => {
                        // No damping level produces a cost-reducing step:
                        // the iterate is at a minimum within numerical
                        // precision.
                        debug!("{estimator}: LM damping saturated at iteration {iteration}");
                        return Ok(LeastSquaresSolution {
                            residual_rms: rms(&r),
                            x,
                            iterations: iteration + 1,
                        });
                    }
                }
            }
        };

        // Gauss-Newton path: take the full step
        let x_new = &x + &step;
        let r_new = residuals(&x_new);
        let cost_new = robust_cost(&r_new);
        let step_norm = step.norm();
        x = x_new;
        r = r_new;
        cost = cost_new;

        if step_norm <= config.step_tolerance * (x.norm() + config.step_tolerance) {
            return Ok(LeastSquaresSolution {
                residual_rms: rms(&r),
                x,
                iterations: iteration + 1,
            });
        }
    }

    Err(KinematicsError::OptimizationDivergence {
        estimator,
        iterations: config.max_iterations,
        residual: rms(&r),
    })
}

fn rms(r: &DVector<f64>) -> f64 {
    if r.is_empty() {
        return 0.0;
    }
    (r.iter().map(|&e| e * e).sum::<f64>() / r.len() as f64).sqrt()
}

/// Solve (JᵀJ + λ·diag(JᵀJ))·δ = -g.
fn solve_normal_equations(
    jtj: &DMatrix<f64>,
    gradient: &DVector<f64>,
    damping: f64,
) -> Result<DVector<f64>> {
    let n = jtj.nrows();
    let mut a = jtj.clone();
    for i in 0..n {
        // Damp relative to the diagonal, with a floor for flat directions
        a[(i, i)] += damping * jtj[(i, i)].max(1e-12);
    }

    match a.clone().cholesky() {
        Some(chol) => Ok(chol.solve(&(-gradient))),
        None => {
            // Singular normal equations: regularize absolutely
            for i in 0..n {
                a[(i, i)] += 1e-9;
            }
            a.cholesky()
                .map(|chol| chol.solve(&(-gradient)))
                .ok_or_else(|| KinematicsError::DegenerateGeometry {
                    estimator: "least squares",
                    reason: "normal equations are singular".to_string(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Residuals for fitting y = a·exp(b·t) to samples.
    fn exponential_residuals<'a>(
        ts: &'a [f64],
        ys: &'a [f64],
    ) -> impl Fn(&DVector<f64>) -> DVector<f64> + 'a {
        move |x: &DVector<f64>| {
            DVector::from_iterator(
                ts.len(),
                ts.iter()
                    .zip(ys.iter())
                    .map(|(&t, &y)| x[0] * (x[1] * t).exp() - y),
            )
        }
    }

    #[test]
    fn test_fits_exponential_curve() {
        let ts: Vec<f64> = (0..50).map(|i| i as f64 * 0.05).collect();
        let ys: Vec<f64> = ts.iter().map(|&t| 2.0 * (-0.7 * t).exp()).collect();

        let config = LeastSquaresConfig::default();
        let sol = solve_least_squares(
            exponential_residuals(&ts, &ys),
            DVector::from_vec(vec![1.0, 0.0]),
            &config,
            "test",
        )
        .unwrap();

        assert_relative_eq!(sol.x[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(sol.x[1], -0.7, epsilon = 1e-6);
        assert!(sol.residual_rms < 1e-8);
    }

    #[test]
    fn test_gauss_newton_on_mild_problem() {
        let ts: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let ys: Vec<f64> = ts.iter().map(|&t| 1.5 * (0.3 * t).exp()).collect();

        let config = LeastSquaresConfig {
            method: SolverMethod::GaussNewton,
            ..Default::default()
        };
        let sol = solve_least_squares(
            exponential_residuals(&ts, &ys),
            DVector::from_vec(vec![1.0, 0.1]),
            &config,
            "test",
        )
        .unwrap();

        assert_relative_eq!(sol.x[0], 1.5, epsilon = 1e-6);
        assert_relative_eq!(sol.x[1], 0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_arctan_loss_resists_outliers() {
        let ts: Vec<f64> = (0..60).map(|i| i as f64 * 0.05).collect();
        let mut ys: Vec<f64> = ts.iter().map(|&t| 2.0 * (-0.5 * t).exp()).collect();
        // Corrupt a fifth of the samples
        for i in (0..60).step_by(5) {
            ys[i] += 10.0;
        }

        let config = LeastSquaresConfig {
            loss: RobustLoss::Arctan { scale: 0.5 },
            ..Default::default()
        };
        let sol = solve_least_squares(
            exponential_residuals(&ts, &ys),
            DVector::from_vec(vec![1.0, 0.0]),
            &config,
            "test",
        )
        .unwrap();

        assert_relative_eq!(sol.x[0], 2.0, epsilon = 0.05);
        assert_relative_eq!(sol.x[1], -0.5, epsilon = 0.05);
    }

    #[test]
    fn test_budget_exhaustion_is_divergence_error() {
        let ts: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let ys: Vec<f64> = ts.iter().map(|&t| 3.0 * (1.2 * t).exp()).collect();

        let config = LeastSquaresConfig {
            max_iterations: 1,
            step_tolerance: 1e-16,
            gradient_tolerance: 1e-16,
            ..Default::default()
        };
        let err = solve_least_squares(
            exponential_residuals(&ts, &ys),
            DVector::from_vec(vec![0.1, 0.0]),
            &config,
            "test",
        )
        .unwrap_err();

        assert!(matches!(
            err,
            KinematicsError::OptimizationDivergence { estimator: "test", .. }
        ));
    }

    #[test]
    fn test_already_converged_input() {
        let ts: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let ys: Vec<f64> = ts.iter().map(|&t| 2.0 * (-0.7 * t).exp()).collect();

        let config = LeastSquaresConfig::default();
        let sol = solve_least_squares(
            exponential_residuals(&ts, &ys),
            DVector::from_vec(vec![2.0, -0.7]),
            &config,
            "test",
        )
        .unwrap();

        assert!(sol.iterations <= 2);
        assert!(sol.residual_rms < 1e-9);
    }
}
