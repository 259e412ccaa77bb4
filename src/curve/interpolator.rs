//! One-dimensional interpolated curves with node sensitivities.
//!
//! Both interpolators are linear in the node values, so the sensitivity of
//! `value(x)` to node `i` is the value at `x` of the curve through the unit
//! vector `eᵢ`. These basis curves depend only on the node abscissae and are
//! built once at construction.
//!
//! The natural spline is solved via the Thomas algorithm (O(n) tridiagonal
//! solver) with natural boundary conditions (S''(x₀) = S''(xₙ₋₁) = 0).

use serde::{Deserialize, Serialize};

use crate::error::{self, VolFitError};
use crate::validate::{validate_finite, validate_increasing, validate_same_len};

/// Interpolation scheme between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolator1D {
    /// Piecewise linear.
    Linear,
    /// Natural cubic spline.
    #[default]
    NaturalCubicSpline,
}

/// Behaviour outside the node range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Extrapolation {
    /// Hold the end value.
    #[default]
    Flat,
    /// Continue with the slope at the end node.
    Linear,
}

/// Coefficients for one cubic polynomial interval.
///
/// On interval \[xᵢ, xᵢ₊₁\], the curve is:
/// `S(x) = a + b·(x - xᵢ) + c·(x - xᵢ)² + d·(x - xᵢ)³`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct SegmentCoeff {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

/// Interpolated curve through `(x, y)` nodes.
///
/// # Examples
/// ```
/// use volfit::curve::{Extrapolation, InterpolatedCurve, Interpolator1D};
///
/// let curve = InterpolatedCurve::new(
///     vec![0.0, 1.0, 2.0],
///     vec![1.0, 3.0, 2.0],
///     Interpolator1D::Linear,
///     Extrapolation::Flat,
/// )?;
/// assert_eq!(curve.value(0.5), 2.0);
/// assert_eq!(curve.node_sensitivities(0.5), vec![0.5, 0.5, 0.0]);
/// # Ok::<(), volfit::VolFitError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedCurve {
    xs: Vec<f64>,
    ys: Vec<f64>,
    interpolator: Interpolator1D,
    extrapolation: Extrapolation,
    coeffs: Vec<SegmentCoeff>,
    basis: Vec<Vec<SegmentCoeff>>,
}

impl InterpolatedCurve {
    /// Build a curve from strictly increasing abscissae.
    ///
    /// A single node gives a constant curve.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] for empty, mismatched,
    /// non-increasing or non-finite inputs.
    pub fn new(
        xs: Vec<f64>,
        ys: Vec<f64>,
        interpolator: Interpolator1D,
        extrapolation: Extrapolation,
    ) -> error::Result<Self> {
        if xs.is_empty() {
            return Err(VolFitError::InvalidInput {
                message: "interpolated curve needs at least one node".into(),
            });
        }
        validate_same_len(xs.len(), ys.len(), "xs", "ys")?;
        validate_increasing(&xs, "xs")?;
        for y in &ys {
            validate_finite(*y, "ys")?;
        }

        let coeffs = segment_coefficients(&xs, &ys, interpolator);
        let n = xs.len();
        let basis = (0..n)
            .map(|i| {
                let mut unit = vec![0.0; n];
                unit[i] = 1.0;
                segment_coefficients(&xs, &unit, interpolator)
            })
            .collect();

        Ok(Self {
            xs,
            ys,
            interpolator,
            extrapolation,
            coeffs,
            basis,
        })
    }

    /// Node abscissae.
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// Node values.
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Interpolation scheme.
    pub fn interpolator(&self) -> Interpolator1D {
        self.interpolator
    }

    /// Extrapolation scheme.
    pub fn extrapolation(&self) -> Extrapolation {
        self.extrapolation
    }

    /// Curve value at `x`.
    pub fn value(&self, x: f64) -> f64 {
        self.evaluate(&self.coeffs, &self.ys, x)
    }

    /// `∂value(x)/∂yᵢ` for every node `i`.
    pub fn node_sensitivities(&self, x: f64) -> Vec<f64> {
        let n = self.xs.len();
        let mut unit = vec![0.0; n];
        (0..n)
            .map(|i| {
                unit[i] = 1.0;
                let s = self.evaluate(&self.basis[i], &unit, x);
                unit[i] = 0.0;
                s
            })
            .collect()
    }

    fn evaluate(&self, coeffs: &[SegmentCoeff], ys: &[f64], x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let n = self.xs.len();
        if n == 1 {
            return ys[0];
        }
        let (x0, xn) = (self.xs[0], self.xs[n - 1]);
        if x <= x0 {
            return match self.extrapolation {
                Extrapolation::Flat => ys[0],
                Extrapolation::Linear => ys[0] + coeffs[0].b * (x - x0),
            };
        }
        if x >= xn {
            return match self.extrapolation {
                Extrapolation::Flat => ys[n - 1],
                Extrapolation::Linear => {
                    let s = &coeffs[n - 2];
                    let h = xn - self.xs[n - 2];
                    let slope = s.b + h * (2.0 * s.c + 3.0 * h * s.d);
                    ys[n - 1] + slope * (x - xn)
                }
            };
        }
        let i = self.xs.partition_point(|&xi| xi <= x) - 1;
        let dx = x - self.xs[i];
        let c = &coeffs[i];
        // Horner form: a + dx*(b + dx*(c + dx*d))
        c.a + dx * (c.b + dx * (c.c + dx * c.d))
    }
}

fn segment_coefficients(x: &[f64], y: &[f64], interpolator: Interpolator1D) -> Vec<SegmentCoeff> {
    match interpolator {
        Interpolator1D::Linear => x
            .windows(2)
            .zip(y.windows(2))
            .map(|(xw, yw)| SegmentCoeff {
                a: yw[0],
                b: (yw[1] - yw[0]) / (xw[1] - xw[0]),
                c: 0.0,
                d: 0.0,
            })
            .collect(),
        Interpolator1D::NaturalCubicSpline => natural_spline_coefficients(x, y),
    }
}

/// Solve the natural cubic spline tridiagonal system and return
/// per-interval coefficients.
fn natural_spline_coefficients(x: &[f64], y: &[f64]) -> Vec<SegmentCoeff> {
    let n = x.len();
    if n < 2 {
        return Vec::new();
    }
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

    // Second-derivative coefficients with c[0] = c[n-1] = 0.
    let mut c = vec![0.0; n];

    if n > 2 {
        let m = n - 2;
        let mut diag = vec![0.0; m];
        let mut rhs = vec![0.0; m];

        for j in 0..m {
            let i = j + 1;
            diag[j] = 2.0 * (h[i - 1] + h[i]);
            rhs[j] = 3.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
        }

        // Forward sweep
        for j in 1..m {
            let w = h[j] / diag[j - 1];
            diag[j] -= w * h[j];
            rhs[j] -= w * rhs[j - 1];
        }

        // Back substitution
        c[m] = rhs[m - 1] / diag[m - 1];
        for j in (0..m - 1).rev() {
            let i = j + 1;
            c[i] = (rhs[j] - h[j + 1] * c[i + 1]) / diag[j];
        }
    }

    (0..n - 1)
        .map(|i| SegmentCoeff {
            a: y[i],
            b: (y[i + 1] - y[i]) / h[i] - h[i] * (2.0 * c[i] + c[i + 1]) / 3.0,
            c: c[i],
            d: (c[i + 1] - c[i]) / (3.0 * h[i]),
        })
        .collect()
}
