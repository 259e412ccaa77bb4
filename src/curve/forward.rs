//! Forward curves `t ↦ F(t)`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::conventions::forward_price;
use crate::error::{self, VolFitError};
use crate::validate::{validate_finite, validate_increasing, validate_positive, validate_same_len};

/// Forward price as a function of time to expiry.
///
/// Non-strike volatility surfaces and the delta conversions evaluate the
/// forward at every query, so implementations should be cheap.
pub trait ForwardCurve: Send + Sync + fmt::Debug {
    /// Forward price `F(t)` for expiry `t` (years).
    fn forward(&self, expiry: f64) -> f64;
}

/// The same forward at every expiry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatForwardCurve {
    forward: f64,
}

impl FlatForwardCurve {
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if `forward` is not positive.
    pub fn new(forward: f64) -> error::Result<Self> {
        validate_positive(forward, "forward")?;
        Ok(Self { forward })
    }
}

impl ForwardCurve for FlatForwardCurve {
    fn forward(&self, _expiry: f64) -> f64 {
        self.forward
    }
}

/// Spot grown at a constant carry: `F(t) = S·exp((r − q)·t)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthForwardCurve {
    spot: f64,
    rate: f64,
    dividend_yield: f64,
}

impl GrowthForwardCurve {
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] for a non-positive spot or
    /// non-finite rates.
    pub fn new(spot: f64, rate: f64, dividend_yield: f64) -> error::Result<Self> {
        validate_positive(spot, "spot")?;
        validate_finite(rate, "rate")?;
        validate_finite(dividend_yield, "dividend_yield")?;
        Ok(Self {
            spot,
            rate,
            dividend_yield,
        })
    }

    /// Spot price.
    pub fn spot(&self) -> f64 {
        self.spot
    }

    /// Continuously compounded rate.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Continuous dividend yield.
    pub fn dividend_yield(&self) -> f64 {
        self.dividend_yield
    }
}

impl ForwardCurve for GrowthForwardCurve {
    fn forward(&self, expiry: f64) -> f64 {
        forward_price(self.spot, self.rate, self.dividend_yield, expiry)
    }
}

/// Forwards quoted at discrete expiries.
///
/// Log-linear between nodes, flat outside. Exact node matches (within 1e-10)
/// return the stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedForwardCurve {
    expiries: Vec<f64>,
    forwards: Vec<f64>,
}

impl InterpolatedForwardCurve {
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the inputs are empty, of
    /// different lengths, not strictly increasing, or contain non-positive
    /// forwards.
    pub fn new(expiries: Vec<f64>, forwards: Vec<f64>) -> error::Result<Self> {
        if expiries.is_empty() {
            return Err(VolFitError::InvalidInput {
                message: "forward curve needs at least one node".into(),
            });
        }
        validate_same_len(expiries.len(), forwards.len(), "expiries", "forwards")?;
        validate_increasing(&expiries, "expiries")?;
        for f in &forwards {
            validate_positive(*f, "forward")?;
        }
        Ok(Self { expiries, forwards })
    }

    /// Node expiries.
    pub fn expiries(&self) -> &[f64] {
        &self.expiries
    }

    /// Node forwards.
    pub fn forwards(&self) -> &[f64] {
        &self.forwards
    }
}

impl ForwardCurve for InterpolatedForwardCurve {
    fn forward(&self, expiry: f64) -> f64 {
        if expiry.is_nan() {
            return f64::NAN;
        }
        let n = self.expiries.len();

        for (i, &t) in self.expiries.iter().enumerate() {
            if (expiry - t).abs() < 1e-10 {
                return self.forwards[i];
            }
        }
        if expiry < self.expiries[0] {
            return self.forwards[0];
        }
        if expiry > self.expiries[n - 1] {
            return self.forwards[n - 1];
        }

        let right = self.expiries.partition_point(|&t| t < expiry);
        let left = right - 1;
        let w = (expiry - self.expiries[left]) / (self.expiries[right] - self.expiries[left]);
        (self.forwards[left].ln() * (1.0 - w) + self.forwards[right].ln() * w).exp()
    }
}
