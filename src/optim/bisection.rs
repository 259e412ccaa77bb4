//! Bisection root finding with bracket expansion.

use crate::error::{self, VolFitError};
use crate::validate::validate_positive;

/// Default iteration budget for [`BisectionRootFinder`].
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

const BRACKET_GROWTH: f64 = 1.6;
const BRACKET_STEPS: usize = 50;

/// Bisection solver terminating on `|f(x)| < tolerance`.
///
/// The search steps from whichever endpoint has `f < 0`, so it is insensitive
/// to the orientation of the bracket.
///
/// # Examples
/// ```
/// use volfit::optim::BisectionRootFinder;
///
/// let solver = BisectionRootFinder::new(1e-12)?;
/// let root = solver.get_root(|x| Ok(x * x - 2.0), 0.0, 2.0)?;
/// assert!((root - 2.0_f64.sqrt()).abs() < 1e-10);
/// # Ok::<(), volfit::VolFitError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BisectionRootFinder {
    tolerance: f64,
    max_iterations: usize,
}

impl BisectionRootFinder {
    /// Create a solver with the given function-value tolerance.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if `tolerance` is not positive.
    pub fn new(tolerance: f64) -> error::Result<Self> {
        validate_positive(tolerance, "tolerance")?;
        Ok(Self {
            tolerance,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        })
    }

    /// Override the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Function-value tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Locate a root of `f` inside `[lower, upper]`.
    ///
    /// # Errors
    /// Returns [`VolFitError::RootNotFound`] if `f` has no sign change on the
    /// bracket or the iteration budget runs out. Errors from `f` propagate.
    pub fn get_root<F>(&self, f: F, lower: f64, upper: f64) -> error::Result<f64>
    where
        F: Fn(f64) -> error::Result<f64>,
    {
        let f_lower = f(lower)?;
        if f_lower.abs() < self.tolerance {
            return Ok(lower);
        }
        let f_upper = f(upper)?;
        if f_upper.abs() < self.tolerance {
            return Ok(upper);
        }
        if !(f_lower * f_upper < 0.0) {
            return Err(VolFitError::RootNotFound {
                message: format!(
                    "no sign change on [{lower}, {upper}]: f = {f_lower} and {f_upper}"
                ),
                iterations: 0,
            });
        }

        // Step away from the endpoint where f < 0.
        let (mut x, mut dx) = if f_lower < 0.0 {
            (lower, upper - lower)
        } else {
            (upper, lower - upper)
        };

        for _ in 0..self.max_iterations {
            dx *= 0.5;
            let mid = x + dx;
            let f_mid = f(mid)?;
            if !f_mid.is_finite() {
                return Err(VolFitError::NumericalError {
                    message: format!("non-finite function value at {mid}"),
                });
            }
            if f_mid <= 0.0 {
                x = mid;
            }
            if f_mid.abs() < self.tolerance {
                return Ok(mid);
            }
        }

        Err(VolFitError::RootNotFound {
            message: format!(
                "bisection did not reach |f| < {} on [{lower}, {upper}]",
                self.tolerance
            ),
            iterations: self.max_iterations,
        })
    }
}

/// Expand `[lower, upper]` geometrically until `f` changes sign.
///
/// The endpoint with the smaller `|f|` moves outward by a factor 1.6 of the
/// bracket width per step, clamped to `[min, max]`.
///
/// # Errors
/// Returns [`VolFitError::RootNotFound`] if no sign change appears after 50
/// steps or both ends hit the limits. Errors from `f` propagate.
pub fn bracket_root<F>(
    f: F,
    lower: f64,
    upper: f64,
    min: f64,
    max: f64,
) -> error::Result<(f64, f64)>
where
    F: Fn(f64) -> error::Result<f64>,
{
    if !(lower < upper) {
        return Err(VolFitError::InvalidInput {
            message: format!("bracket lower {lower} must be below upper {upper}"),
        });
    }
    let (mut a, mut b) = (lower.max(min), upper.min(max));
    let mut fa = f(a)?;
    let mut fb = f(b)?;

    for step in 0..BRACKET_STEPS {
        if fa * fb <= 0.0 {
            return Ok((a, b));
        }
        let at_min = a <= min;
        let at_max = b >= max;
        if at_min && at_max {
            return Err(VolFitError::RootNotFound {
                message: format!("no sign change within limits [{min}, {max}]"),
                iterations: step,
            });
        }
        let width = b - a;
        if (fa.abs() < fb.abs() && !at_min) || at_max {
            a = (a - BRACKET_GROWTH * width).max(min);
            fa = f(a)?;
        } else {
            b = (b + BRACKET_GROWTH * width).min(max);
            fb = f(b)?;
        }
    }

    if fa * fb <= 0.0 {
        return Ok((a, b));
    }
    Err(VolFitError::RootNotFound {
        message: format!("bracket expansion from [{lower}, {upper}] found no sign change"),
        iterations: BRACKET_STEPS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn finds_sqrt_two() {
        let solver = BisectionRootFinder::new(1e-12).unwrap();
        let root = solver.get_root(|x| Ok(x * x - 2.0), 0.0, 2.0).unwrap();
        assert_abs_diff_eq!(root, 2.0_f64.sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn decreasing_function_and_reversed_bracket() {
        let solver = BisectionRootFinder::new(1e-12).unwrap();
        let root = solver.get_root(|x| Ok(1.0 - x), 3.0, -1.0).unwrap();
        assert_abs_diff_eq!(root, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn endpoint_root_returned_directly() {
        let solver = BisectionRootFinder::new(1e-9).unwrap();
        assert_eq!(solver.get_root(|x| Ok(x - 1.0), 1.0, 5.0).unwrap(), 1.0);
    }

    #[test]
    fn no_sign_change_is_root_not_found() {
        let solver = BisectionRootFinder::new(1e-9).unwrap();
        let err = solver.get_root(|x| Ok(x * x + 1.0), -1.0, 1.0).unwrap_err();
        assert!(matches!(err, VolFitError::RootNotFound { .. }));
    }

    #[test]
    fn budget_exhaustion_is_root_not_found() {
        // A step function never gets |f| below the tolerance.
        let solver = BisectionRootFinder::new(1e-9)
            .unwrap()
            .with_max_iterations(20);
        let err = solver
            .get_root(|x| Ok(if x < 0.3 { -1.0 } else { 1.0 }), 0.0, 1.0)
            .unwrap_err();
        match err {
            VolFitError::RootNotFound { iterations, .. } => assert_eq!(iterations, 20),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn function_errors_propagate() {
        let solver = BisectionRootFinder::new(1e-9).unwrap();
        let err = solver
            .get_root(
                |_| {
                    Err(VolFitError::NumericalError {
                        message: "boom".into(),
                    })
                },
                0.0,
                1.0,
            )
            .unwrap_err();
        assert!(matches!(err, VolFitError::NumericalError { .. }));
    }

    #[test]
    fn rejects_non_positive_tolerance() {
        assert!(BisectionRootFinder::new(0.0).is_err());
        assert!(BisectionRootFinder::new(-1.0).is_err());
    }

    #[test]
    fn bracket_expands_toward_root() {
        let (a, b) = bracket_root(|x| Ok(x - 10.0), 0.0, 1.0, -50.0, 50.0).unwrap();
        assert!(a <= 10.0 && b >= 10.0);
    }

    #[test]
    fn bracket_respects_limits() {
        let err = bracket_root(|x| Ok(x - 100.0), 0.0, 1.0, -50.0, 50.0).unwrap_err();
        assert!(matches!(err, VolFitError::RootNotFound { .. }));
    }
}
