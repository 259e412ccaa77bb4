//! Core value types.
//!
//! **Outputs use newtypes**: [`Vol`] and [`Variance`] wrap values returned by
//! smiles and local-volatility surfaces so callers can't accidentally mix a
//! volatility with a variance.
//!
//! **Inputs use bare `f64`**: `vol(strike: f64)` accepts raw floats. Strike-like
//! query points that can be expressed in several parameterizations use
//! [`StrikeCoordinate`](crate::coordinate::StrikeCoordinate) instead.
//!
//! These types wrap `f64`, so only `PartialEq` and `PartialOrd` are derived.

use serde::{Deserialize, Serialize};

/// Implied or local volatility `σ`, measured as annualized standard deviation.
///
/// # Examples
/// ```
/// use volfit::types::Vol;
/// let vol = Vol(0.20);
/// assert_eq!(vol.0, 0.20);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Vol(pub f64);

/// Total variance `σ²T`.
///
/// Cross-expiry interpolation is performed in variance space because total
/// variance must be non-decreasing in time for an arbitrage-free surface.
///
/// # Examples
/// ```
/// use volfit::types::Variance;
/// let var = Variance(0.04);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Variance(pub f64);

/// Option type: call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    /// Right to buy at strike price.
    Call,
    /// Right to sell at strike price.
    Put,
}

impl OptionType {
    /// `true` for [`OptionType::Call`].
    pub fn is_call(self) -> bool {
        matches!(self, OptionType::Call)
    }
}
