//! Functional two-dimensional surfaces `(t, x) ↦ value`.
//!
//! A [`Surface2D`] is an immutable closure behind an `Arc`, so cloning is
//! cheap and converted or shifted surfaces wrap their source lazily instead
//! of materializing a grid.

use std::fmt;
use std::sync::Arc;

use crate::error::{self, VolFitError};
use crate::validate::validate_same_len;

/// Point shifts apply where both coordinates match to this tolerance.
const POINT_TOLERANCE: f64 = 1e-12;

type SurfaceFn = dyn Fn(f64, f64) -> error::Result<f64> + Send + Sync;

/// A function of expiry and a second coordinate.
#[derive(Clone)]
pub struct Surface2D {
    f: Arc<SurfaceFn>,
}

impl fmt::Debug for Surface2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface2D").finish_non_exhaustive()
    }
}

impl Surface2D {
    /// The same value everywhere.
    pub fn constant(value: f64) -> Self {
        Self::from_infallible(move |_, _| value)
    }

    /// Wrap a fallible function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(f64, f64) -> error::Result<f64> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Wrap a function that cannot fail.
    pub fn from_infallible<F>(f: F) -> Self
    where
        F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
    {
        Self::from_fn(move |t, x| Ok(f(t, x)))
    }

    /// Evaluate at `(t, x)`.
    ///
    /// # Errors
    /// Propagates errors from the wrapped function.
    pub fn value(&self, t: f64, x: f64) -> error::Result<f64> {
        (self.f)(t, x)
    }

    /// `value + shift` everywhere.
    pub fn with_parallel_shift(&self, shift: f64) -> Self {
        let inner = self.clone();
        Self::from_fn(move |t, x| Ok(inner.value(t, x)? + shift))
    }

    /// `value · factor` everywhere.
    pub fn with_constant_multiplicative_shift(&self, factor: f64) -> Self {
        let inner = self.clone();
        Self::from_fn(move |t, x| Ok(inner.value(t, x)? * factor))
    }

    /// Add `shifts[i]` at the point `(ts[i], xs[i])`.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the vectors differ in length.
    pub fn with_additive_point_shifts(
        &self,
        ts: &[f64],
        xs: &[f64],
        shifts: &[f64],
    ) -> error::Result<Self> {
        self.with_point_shifts(ts, xs, shifts, |v, s| v + s)
    }

    /// Multiply by `factors[i]` at the point `(ts[i], xs[i])`.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the vectors differ in length.
    pub fn with_multiplicative_point_shifts(
        &self,
        ts: &[f64],
        xs: &[f64],
        factors: &[f64],
    ) -> error::Result<Self> {
        self.with_point_shifts(ts, xs, factors, |v, f| v * f)
    }

    fn with_point_shifts(
        &self,
        ts: &[f64],
        xs: &[f64],
        amounts: &[f64],
        apply: fn(f64, f64) -> f64,
    ) -> error::Result<Self> {
        validate_same_len(ts.len(), xs.len(), "expiries", "coordinates")?;
        validate_same_len(ts.len(), amounts.len(), "expiries", "shifts")?;
        let points: Vec<(f64, f64, f64)> = ts
            .iter()
            .zip(xs)
            .zip(amounts)
            .map(|((t, x), a)| (*t, *x, *a))
            .collect();
        let inner = self.clone();
        Ok(Self::from_fn(move |t, x| {
            let base = inner.value(t, x)?;
            Ok(points
                .iter()
                .filter(|(pt, px, _)| {
                    (pt - t).abs() < POINT_TOLERANCE && (px - x).abs() < POINT_TOLERANCE
                })
                .fold(base, |v, (_, _, a)| apply(v, *a)))
        }))
    }
}

/// Reject a non-positive expiry for coordinates defined through `√t`.
pub(crate) fn require_positive_expiry(t: f64) -> error::Result<()> {
    if !(t > 0.0) || !t.is_finite() {
        return Err(VolFitError::InvalidInput {
            message: format!("expiry must be positive and finite, got {t}"),
        });
    }
    Ok(())
}
