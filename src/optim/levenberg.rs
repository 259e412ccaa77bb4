//! Levenberg-Marquardt weighted nonlinear least squares.
//!
//! Minimizes `χ² = Σ ((observed_i − model_i(x)) / error_i)²` given an analytic
//! Jacobian of the model. Each iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr
//! ```
//!
//! by Cholesky, falling back to QR when the damped matrix is not positive
//! definite. The covariance of the fitted parameters is `(JᵀJ)⁻¹` at the
//! solution.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{self, VolFitError};
use crate::validate::{validate_positive, validate_same_len};

/// Solver settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevenbergMarquardtConfig {
    /// Maximum number of Jacobian evaluations.
    pub max_iterations: usize,
    /// Starting damping factor.
    pub initial_lambda: f64,
    /// Converged when an accepted step satisfies `‖δ‖∞ < step_tolerance·(1 + ‖x‖∞)`.
    pub step_tolerance: f64,
    /// Converged when χ² drops below this value.
    pub chi_sq_tolerance: f64,
    /// Damping beyond which no further progress is possible.
    pub max_lambda: f64,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            initial_lambda: 1e-3,
            step_tolerance: 1e-12,
            chi_sq_tolerance: 1e-30,
            max_lambda: 1e12,
        }
    }
}

/// Output of [`solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresResult {
    /// Fitted parameters.
    pub parameters: DVector<f64>,
    /// Parameter covariance `(JᵀJ)⁻¹` at the solution.
    pub covariance: DMatrix<f64>,
    /// Weighted sum of squared residuals.
    pub chi_sq: f64,
    /// Number of iterations performed.
    pub iterations: usize,
}

/// Fit `model` to `observed` starting from `start`.
///
/// `model` returns one value per observation and `jacobian` the matrix
/// `∂model_i/∂x_j` (rows = observations).
///
/// # Errors
/// - [`VolFitError::InvalidInput`] for empty or mismatched inputs or
///   non-positive errors.
/// - [`VolFitError::CalibrationError`] when the iteration budget runs out or
///   the starting point produces non-finite residuals.
/// - Errors returned by `model` or `jacobian` at accepted points propagate.
pub fn solve<M, J>(
    observed: &[f64],
    errors: &[f64],
    start: DVector<f64>,
    model: M,
    jacobian: J,
    config: &LevenbergMarquardtConfig,
) -> error::Result<LeastSquaresResult>
where
    M: Fn(&DVector<f64>) -> error::Result<DVector<f64>>,
    J: Fn(&DVector<f64>) -> error::Result<DMatrix<f64>>,
{
    if observed.is_empty() || start.is_empty() {
        return Err(VolFitError::InvalidInput {
            message: "least squares needs at least one observation and one parameter".into(),
        });
    }
    validate_same_len(observed.len(), errors.len(), "observations", "errors")?;
    for e in errors {
        validate_positive(*e, "error")?;
    }

    let n_obs = observed.len();
    let weights = DVector::from_iterator(n_obs, errors.iter().map(|e| 1.0 / e));
    let target = DVector::from_column_slice(observed);

    let residuals = |x: &DVector<f64>| -> error::Result<DVector<f64>> {
        let values = model(x)?;
        if values.len() != n_obs {
            return Err(VolFitError::InvalidInput {
                message: format!(
                    "model returned {} values for {n_obs} observations",
                    values.len()
                ),
            });
        }
        Ok((&target - values).component_mul(&weights))
    };

    let mut x = start;
    let mut r = residuals(&x)?;
    let mut chi_sq = r.norm_squared();
    if !chi_sq.is_finite() {
        return Err(VolFitError::CalibrationError {
            message: "non-finite residuals at the starting point".into(),
            model: "least squares",
            rms_error: None,
        });
    }

    let mut lambda = config.initial_lambda;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        iterations += 1;
        if chi_sq < config.chi_sq_tolerance {
            converged = true;
            break;
        }

        let jac = weighted_jacobian(&jacobian(&x)?, &weights, n_obs, x.len())?;
        let jt = jac.transpose();
        let alpha = &jt * &jac;
        let beta = &jt * &r;

        let mut accepted = false;
        let mut stalled = false;
        while !accepted {
            let mut damped = alpha.clone();
            for i in 0..damped.nrows() {
                let d = alpha[(i, i)];
                damped[(i, i)] = d + lambda * if d > 0.0 { d } else { 1.0 };
            }
            let step = solve_normal_equations(damped, &beta);
            if let Some(step) = step {
                let trial = &x + &step;
                if let Ok(r_trial) = residuals(&trial) {
                    let chi_trial = r_trial.norm_squared();
                    if chi_trial.is_finite() && chi_trial < chi_sq {
                        let step_size = step.amax();
                        let scale = 1.0 + trial.amax();
                        x = trial;
                        r = r_trial;
                        chi_sq = chi_trial;
                        lambda = (lambda / 10.0).max(1e-15);
                        accepted = true;
                        if step_size < config.step_tolerance * scale {
                            stalled = true;
                        }
                        continue;
                    }
                }
            }
            lambda *= 10.0;
            if lambda > config.max_lambda {
                stalled = true;
                break;
            }
        }
        if stalled {
            converged = true;
            break;
        }
    }

    if !converged && chi_sq >= config.chi_sq_tolerance {
        return Err(VolFitError::CalibrationError {
            message: format!("no convergence after {iterations} iterations, chi2 = {chi_sq}"),
            model: "least squares",
            rms_error: Some((chi_sq / n_obs as f64).sqrt()),
        });
    }

    let jac = weighted_jacobian(&jacobian(&x)?, &weights, n_obs, x.len())?;
    let alpha = jac.transpose() * &jac;
    let covariance = invert(alpha)?;

    #[cfg(feature = "logging")]
    tracing::debug!(
        chi_sq,
        iterations,
        n_obs,
        n_params = x.len(),
        "least squares converged"
    );

    Ok(LeastSquaresResult {
        parameters: x,
        covariance,
        chi_sq,
        iterations,
    })
}

fn weighted_jacobian(
    jac: &DMatrix<f64>,
    weights: &DVector<f64>,
    rows: usize,
    cols: usize,
) -> error::Result<DMatrix<f64>> {
    if jac.shape() != (rows, cols) {
        return Err(VolFitError::InvalidInput {
            message: format!(
                "jacobian has shape {:?}, expected ({rows}, {cols})",
                jac.shape()
            ),
        });
    }
    if jac.iter().any(|v| !v.is_finite()) {
        return Err(VolFitError::NumericalError {
            message: "non-finite jacobian entry".into(),
        });
    }
    let mut weighted = jac.clone();
    for (i, mut row) in weighted.row_iter_mut().enumerate() {
        row *= weights[i];
    }
    Ok(weighted)
}

fn solve_normal_equations(a: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let fallback = a.clone();
    if let Some(chol) = a.cholesky() {
        return Some(chol.solve(b));
    }
    fallback.qr().solve(b)
}

fn invert(a: DMatrix<f64>) -> error::Result<DMatrix<f64>> {
    let fallback = a.clone();
    if let Some(inv) = a.try_inverse() {
        return Ok(inv);
    }
    fallback
        .pseudo_inverse(1e-14)
        .map_err(|e| VolFitError::NumericalError {
            message: format!("covariance inversion failed: {e}"),
        })
}
