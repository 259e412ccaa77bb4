//! Single-expiry volatility smiles.
//!
//! A smile represents how implied volatility varies with strike at a fixed
//! expiry. Fitted smiles implement [`SmileSection`]; parametric formulas used
//! by the joint term-structure fitter implement [`SmileModel`].
//!
//! ## Models
//!
//! - [`SabrSmile`]: SABR stochastic vol model (Hagan et al.), 4 parameters
//! - [`SmileDeltaParameters`]: market quotes as ATM, risk reversals and strangles

pub mod delta;
pub mod sabr;

pub use delta::{SmileDeltaParameters, strike_for_delta};
pub use sabr::{
    SabrFitConfig, SabrHaganModel, SabrParameters, SabrSlice, SabrSmile, hagan_volatility,
    hagan_volatility_adjoint,
};

use std::fmt;

use crate::error;
use crate::types::{Variance, Vol};

/// A single-tenor volatility smile.
///
/// Represents the relationship between strike and implied volatility at a
/// fixed expiry.
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use in concurrent pricing.
///
/// # Error Handling
/// Methods return `Result` so implementations can report numerical failures
/// (e.g., negative variance, NaN) rather than panicking.
pub trait SmileSection: Send + Sync {
    /// Implied Black volatility σ at the given strike.
    fn vol(&self, strike: f64) -> error::Result<Vol>;

    /// Total Black variance σ²T at the given strike.
    ///
    /// Default implementation derives from [`vol`](SmileSection::vol):
    /// `variance(K) = vol(K)² × expiry`.
    fn variance(&self, strike: f64) -> error::Result<Variance> {
        let v = self.vol(strike)?;
        Ok(Variance(v.0 * v.0 * self.expiry()))
    }

    /// Forward price F at this tenor.
    fn forward(&self) -> f64;

    /// Time to expiry T in years.
    fn expiry(&self) -> f64;
}

/// A parametric implied-volatility formula `σ(F, K, t; θ)` with an analytic
/// parameter gradient.
///
/// Parameters are passed as a slice in [`parameter_names`](SmileModel::parameter_names)
/// order, in model units.
pub trait SmileModel: Send + Sync + fmt::Debug {
    /// Short model name used in error reports.
    fn name(&self) -> &'static str;

    /// Parameter names in slice order.
    fn parameter_names(&self) -> &'static [&'static str];

    /// Implied volatility at `strike`.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`](crate::VolFitError::InvalidInput)
    /// if `parameters` has the wrong length.
    fn volatility(&self, forward: f64, strike: f64, expiry: f64, parameters: &[f64])
    -> error::Result<f64>;

    /// `∂σ/∂θᵢ` for each parameter, same order as `parameters`.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`](crate::VolFitError::InvalidInput)
    /// if `parameters` has the wrong length.
    fn volatility_adjoint(
        &self,
        forward: f64,
        strike: f64,
        expiry: f64,
        parameters: &[f64],
    ) -> error::Result<Vec<f64>>;
}
