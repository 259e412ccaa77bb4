//! Strike parameterizations.
//!
//! A volatility surface's second axis can be expressed in any of four
//! equivalent coordinates. [`StrikeCoordinate`] is a closed sum type over
//! them, so consumers branch with an exhaustive `match` rather than runtime
//! type checks.
//!
//! | coordinate | value | domain |
//! |---|---|---|
//! | `Strike` | `K` | `K > 0` |
//! | `Moneyness` | `K / F(t)` | `> 0` |
//! | `LogMoneyness` | `ln(K / F(t))` | finite |
//! | `Delta` | Black forward call delta | `(0, 1)` |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{self, VolFitError};
use crate::validate::{validate_finite, validate_open_unit, validate_positive};

/// Tag identifying which strike parameterization a value or surface uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrikeKind {
    /// Absolute strike `K`.
    Strike,
    /// Simple moneyness `K / F`.
    Moneyness,
    /// Log-moneyness `ln(K / F)`.
    LogMoneyness,
    /// Black-Scholes forward call delta.
    Delta,
}

impl fmt::Display for StrikeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrikeKind::Strike => "strike",
            StrikeKind::Moneyness => "moneyness",
            StrikeKind::LogMoneyness => "log-moneyness",
            StrikeKind::Delta => "delta",
        };
        f.write_str(name)
    }
}

/// A strike-like query point, tagged with its parameterization.
///
/// # Examples
/// ```
/// use volfit::coordinate::{StrikeCoordinate, StrikeKind};
///
/// let a = StrikeCoordinate::new(StrikeKind::Delta, 0.25)?;
/// let b = StrikeCoordinate::new(StrikeKind::Delta, 0.10)?;
/// let sum = a.add(&b)?;
/// assert_eq!(sum.kind(), StrikeKind::Delta);
/// assert!((sum.value() - 0.35).abs() < 1e-15);
/// # Ok::<(), volfit::VolFitError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StrikeCoordinate {
    /// Absolute strike.
    Strike(f64),
    /// Simple moneyness.
    Moneyness(f64),
    /// Log-moneyness.
    LogMoneyness(f64),
    /// Forward call delta.
    Delta(f64),
}

impl StrikeCoordinate {
    /// Create a coordinate, validating the value against its domain.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] for a non-positive strike or
    /// moneyness, a delta outside (0, 1), or a non-finite log-moneyness.
    pub fn new(kind: StrikeKind, value: f64) -> error::Result<Self> {
        match kind {
            StrikeKind::Strike => Ok(Self::Strike(validate_positive(value, "strike")?)),
            StrikeKind::Moneyness => Ok(Self::Moneyness(validate_positive(value, "moneyness")?)),
            StrikeKind::LogMoneyness => Ok(Self::LogMoneyness(validate_finite(
                value,
                "log-moneyness",
            )?)),
            StrikeKind::Delta => Ok(Self::Delta(validate_open_unit(value, "delta")?)),
        }
    }

    /// The parameterization tag.
    pub fn kind(&self) -> StrikeKind {
        match self {
            Self::Strike(_) => StrikeKind::Strike,
            Self::Moneyness(_) => StrikeKind::Moneyness,
            Self::LogMoneyness(_) => StrikeKind::LogMoneyness,
            Self::Delta(_) => StrikeKind::Delta,
        }
    }

    /// The raw coordinate value.
    pub fn value(&self) -> f64 {
        match *self {
            Self::Strike(v) | Self::Moneyness(v) | Self::LogMoneyness(v) | Self::Delta(v) => v,
        }
    }

    /// A coordinate of the same kind with a different value (unvalidated).
    pub fn with_value(&self, value: f64) -> Self {
        match self {
            Self::Strike(_) => Self::Strike(value),
            Self::Moneyness(_) => Self::Moneyness(value),
            Self::LogMoneyness(_) => Self::LogMoneyness(value),
            Self::Delta(_) => Self::Delta(value),
        }
    }

    /// Sum of two coordinates of the same kind.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the kinds differ.
    pub fn add(&self, other: &StrikeCoordinate) -> error::Result<Self> {
        self.check_same_kind(other)?;
        Ok(self.with_value(self.value() + other.value()))
    }

    /// Difference of two coordinates of the same kind.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the kinds differ.
    pub fn subtract(&self, other: &StrikeCoordinate) -> error::Result<Self> {
        self.check_same_kind(other)?;
        Ok(self.with_value(self.value() - other.value()))
    }

    fn check_same_kind(&self, other: &StrikeCoordinate) -> error::Result<()> {
        if self.kind() != other.kind() {
            return Err(VolFitError::InvalidInput {
                message: format!(
                    "cannot combine a {} coordinate with a {} coordinate",
                    self.kind(),
                    other.kind()
                ),
            });
        }
        Ok(())
    }
}
