//! Model-parameter term structures.
//!
//! A [`ParameterCurve`] interpolates knot values in fitting space and maps
//! the result through a [`ParameterTransform`], so every expiry yields a
//! parameter inside the model domain, including under extrapolation.

use serde::{Deserialize, Serialize};

use crate::curve::interpolator::InterpolatedCurve;
use crate::optim::ParameterTransform;

/// A model parameter as a function of expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterCurve {
    name: String,
    curve: InterpolatedCurve,
    transform: ParameterTransform,
}

impl ParameterCurve {
    /// Wrap a fitting-space curve.
    pub fn new(
        name: impl Into<String>,
        curve: InterpolatedCurve,
        transform: ParameterTransform,
    ) -> Self {
        Self {
            name: name.into(),
            curve,
            transform,
        }
    }

    /// Parameter name (e.g. `"alpha"`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Knot expiries.
    pub fn knots(&self) -> &[f64] {
        self.curve.xs()
    }

    /// Knot values in model units.
    pub fn knot_values(&self) -> Vec<f64> {
        self.curve
            .ys()
            .iter()
            .map(|y| self.transform.inverse_transform(*y))
            .collect()
    }

    /// Parameter value at `expiry`.
    pub fn value(&self, expiry: f64) -> f64 {
        self.transform.inverse_transform(self.curve.value(expiry))
    }

    /// `∂value(expiry)/∂knot_i` with respect to the fitting-space knots.
    pub fn knot_sensitivities(&self, expiry: f64) -> Vec<f64> {
        let g = self.transform.inverse_gradient(self.curve.value(expiry));
        self.curve
            .node_sensitivities(expiry)
            .into_iter()
            .map(|s| g * s)
            .collect()
    }
}
