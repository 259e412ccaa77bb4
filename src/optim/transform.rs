//! Maps between bounded model parameters and unbounded fitting space.
//!
//! A least-squares solver works on `y ∈ ℝⁿ`; model parameters live in
//! constrained domains (`α > 0`, `ρ ∈ (−1, 1)`, ...). Each
//! [`ParameterTransform`] is a smooth bijection between the two:
//!
//! | transform | model `x` | fitting `y` | inverse |
//! |---|---|---|---|
//! | `Identity` | ℝ | `x` | `y` |
//! | `GreaterThan(a)` | `x > a` | `ln(e^(x−a) − 1)` | `a + ln(1 + e^y)` |
//! | `LessThan(a)` | `x < a` | `ln(e^(a−x) − 1)` | `a − ln(1 + e^y)` |
//! | `Range(a, b)` | `a < x < b` | `atanh((2x − a − b)/(b − a))` | `(a+b)/2 + (b−a)/2·tanh(y)` |

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{self, VolFitError};
use crate::validate::validate_same_len;

// Beyond this softplus is the identity to double precision.
const SOFTPLUS_LINEAR: f64 = 50.0;

/// Smooth bijection between a constrained parameter and ℝ.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterTransform {
    /// No constraint.
    Identity,
    /// `x > bound`.
    GreaterThan(f64),
    /// `x < bound`.
    LessThan(f64),
    /// `lower < x < upper`.
    Range(f64, f64),
}

impl ParameterTransform {
    /// Map a model parameter to fitting space.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if `x` is outside the domain.
    pub fn transform(&self, x: f64) -> error::Result<f64> {
        let y = match *self {
            Self::Identity => x,
            Self::GreaterThan(a) => inverse_softplus(x - a),
            Self::LessThan(a) => inverse_softplus(a - x),
            Self::Range(lo, hi) => {
                let z = (2.0 * x - lo - hi) / (hi - lo);
                if !(z.abs() < 1.0) {
                    f64::NAN
                } else {
                    z.atanh()
                }
            }
        };
        if !y.is_finite() {
            return Err(VolFitError::InvalidInput {
                message: format!("parameter {x} lies outside the domain of {self:?}"),
            });
        }
        Ok(y)
    }

    /// Map a fitting-space value back to the model domain.
    pub fn inverse_transform(&self, y: f64) -> f64 {
        match *self {
            Self::Identity => y,
            Self::GreaterThan(a) => a + softplus(y),
            Self::LessThan(a) => a - softplus(y),
            Self::Range(lo, hi) => 0.5 * (lo + hi) + 0.5 * (hi - lo) * y.tanh(),
        }
    }

    /// Derivative `dx/dy` of [`inverse_transform`](Self::inverse_transform).
    pub fn inverse_gradient(&self, y: f64) -> f64 {
        match *self {
            Self::Identity => 1.0,
            Self::GreaterThan(_) => logistic(y),
            Self::LessThan(_) => -logistic(y),
            Self::Range(lo, hi) => {
                let t = y.tanh();
                0.5 * (hi - lo) * (1.0 - t * t)
            }
        }
    }
}

fn softplus(y: f64) -> f64 {
    if y > SOFTPLUS_LINEAR {
        y
    } else {
        y.exp().ln_1p()
    }
}

fn inverse_softplus(d: f64) -> f64 {
    if d <= 0.0 {
        f64::NAN
    } else if d > SOFTPLUS_LINEAR {
        d
    } else {
        d.exp_m1().ln()
    }
}

fn logistic(y: f64) -> f64 {
    1.0 / (1.0 + (-y).exp())
}

/// Per-parameter transforms with some parameters held fixed.
///
/// Fixed parameters are dropped from fitting space and restored from their
/// starting values on the way back.
#[derive(Debug, Clone, PartialEq)]
pub struct UncoupledTransforms {
    start: Vec<f64>,
    fixed: Vec<bool>,
    transforms: Vec<ParameterTransform>,
}

impl UncoupledTransforms {
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] on mismatched lengths.
    pub fn new(
        start: Vec<f64>,
        fixed: Vec<bool>,
        transforms: Vec<ParameterTransform>,
    ) -> error::Result<Self> {
        validate_same_len(start.len(), fixed.len(), "start", "fixed")?;
        validate_same_len(start.len(), transforms.len(), "start", "transforms")?;
        Ok(Self {
            start,
            fixed,
            transforms,
        })
    }

    /// Number of model parameters.
    pub fn model_dimension(&self) -> usize {
        self.start.len()
    }

    /// Number of free parameters.
    pub fn fitting_dimension(&self) -> usize {
        self.fixed.iter().filter(|f| !**f).count()
    }

    /// Model parameters to fitting space (free parameters only).
    ///
    /// # Errors
    /// Propagates domain errors from the individual transforms.
    pub fn transform(&self, model: &[f64]) -> error::Result<DVector<f64>> {
        validate_same_len(model.len(), self.start.len(), "parameters", "transforms")?;
        let values = model
            .iter()
            .zip(&self.transforms)
            .zip(&self.fixed)
            .filter(|(_, fixed)| !**fixed)
            .map(|((x, t), _)| t.transform(*x))
            .collect::<error::Result<Vec<f64>>>()?;
        Ok(DVector::from_vec(values))
    }

    /// Fitting space back to the full model parameter vector.
    pub fn inverse_transform(&self, fitting: &DVector<f64>) -> Vec<f64> {
        let mut free = fitting.iter();
        self.start
            .iter()
            .zip(&self.fixed)
            .zip(&self.transforms)
            .map(|((x0, fixed), t)| {
                if *fixed {
                    *x0
                } else {
                    free.next().map_or(*x0, |y| t.inverse_transform(*y))
                }
            })
            .collect()
    }

    /// Jacobian `∂x_model/∂y_fit`, shape `model_dimension × fitting_dimension`.
    pub fn inverse_jacobian(&self, fitting: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.model_dimension(), self.fitting_dimension());
        let mut col = 0;
        for (row, (fixed, t)) in self.fixed.iter().zip(&self.transforms).enumerate() {
            if *fixed {
                continue;
            }
            jac[(row, col)] = t.inverse_gradient(fitting[col]);
            col += 1;
        }
        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const ALL: [ParameterTransform; 4] = [
        ParameterTransform::Identity,
        ParameterTransform::GreaterThan(0.0),
        ParameterTransform::LessThan(1.0),
        ParameterTransform::Range(-1.0, 1.0),
    ];

    #[test]
    fn round_trip_inside_domain() {
        for t in ALL {
            for &x in &[-0.7_f64, 0.05, 0.3, 0.95] {
                let x = match t {
                    ParameterTransform::GreaterThan(a) => a + x.abs(),
                    _ => x,
                };
                let y = t.transform(x).unwrap();
                assert_abs_diff_eq!(t.inverse_transform(y), x, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let h = 1e-6;
        for t in ALL {
            for &y in &[-3.0, -0.2, 0.0, 1.5] {
                let fd = (t.inverse_transform(y + h) - t.inverse_transform(y - h)) / (2.0 * h);
                assert_abs_diff_eq!(t.inverse_gradient(y), fd, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn out_of_domain_rejected() {
        assert!(ParameterTransform::GreaterThan(0.0).transform(0.0).is_err());
        assert!(ParameterTransform::LessThan(1.0).transform(2.0).is_err());
        assert!(ParameterTransform::Range(-1.0, 1.0).transform(1.0).is_err());
        assert!(ParameterTransform::Range(-1.0, 1.0).transform(f64::NAN).is_err());
    }

    #[test]
    fn softplus_large_argument_is_linear() {
        let t = ParameterTransform::GreaterThan(2.0);
        assert_abs_diff_eq!(t.inverse_transform(100.0), 102.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t.transform(102.0).unwrap(), 100.0, epsilon = 1e-12);
    }

    #[test]
    fn fixed_parameters_restored() {
        let tr = UncoupledTransforms::new(
            vec![0.2, 0.5, -0.3, 0.4],
            vec![false, true, false, false],
            vec![
                ParameterTransform::GreaterThan(0.0),
                ParameterTransform::Range(0.0, 2.0),
                ParameterTransform::Range(-1.0, 1.0),
                ParameterTransform::GreaterThan(0.0),
            ],
        )
        .unwrap();
        assert_eq!(tr.fitting_dimension(), 3);

        let y = tr.transform(&[0.25, 0.9, 0.1, 0.6]).unwrap();
        assert_eq!(y.len(), 3);
        let x = tr.inverse_transform(&y);
        assert_abs_diff_eq!(x[0], 0.25, epsilon = 1e-12);
        assert_eq!(x[1], 0.5);
        assert_abs_diff_eq!(x[2], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(x[3], 0.6, epsilon = 1e-12);

        let jac = tr.inverse_jacobian(&y);
        assert_eq!(jac.shape(), (4, 3));
        assert_eq!(jac.row(1).iter().copied().sum::<f64>(), 0.0);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        assert!(UncoupledTransforms::new(vec![1.0], vec![], vec![]).is_err());
    }
}
