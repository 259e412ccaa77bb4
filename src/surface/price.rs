//! Call-price surfaces `C(t, k)`.

use std::sync::Arc;

use crate::black;
use crate::conventions::forward_price;
use crate::error;
use crate::surface::function::Surface2D;
use crate::surface::volatility::BlackVolatilitySurface;
use crate::types::OptionType;
use crate::validate::{validate_finite, validate_positive};

/// European call prices by expiry and absolute strike.
#[derive(Debug, Clone)]
pub struct PriceSurface {
    surface: Surface2D,
}

impl PriceSurface {
    /// Wrap a `(t, k)` call-price function.
    pub fn new(surface: Surface2D) -> Self {
        Self { surface }
    }

    /// Discounted Black-Scholes call prices implied by a vol surface with
    /// constant carry: `C = e^{−rt}·Black(S·e^{(r−q)t}, k, σ(t, k), t)`.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`](crate::VolFitError::InvalidInput)
    /// for a non-positive spot or non-finite rates.
    pub fn from_black_scholes(
        implied: Arc<dyn BlackVolatilitySurface>,
        spot: f64,
        rate: f64,
        dividend_yield: f64,
    ) -> error::Result<Self> {
        validate_positive(spot, "spot")?;
        validate_finite(rate, "rate")?;
        validate_finite(dividend_yield, "dividend_yield")?;
        Ok(Self::new(Surface2D::from_fn(move |t, k| {
            let forward = forward_price(spot, rate, dividend_yield, t);
            let vol = if t > 0.0 { implied.volatility(t, k)?.0 } else { 0.0 };
            Ok((-rate * t).exp() * black::black_price(forward, k, vol, t, OptionType::Call))
        })))
    }

    /// The underlying `(t, k)` function.
    pub fn surface(&self) -> &Surface2D {
        &self.surface
    }

    /// Call price at `(expiry, strike)`.
    ///
    /// # Errors
    /// Propagates surface errors.
    pub fn price(&self, expiry: f64, strike: f64) -> error::Result<f64> {
        self.surface.value(expiry, strike)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{StrikeSurface, Surface2D};
    use approx::assert_abs_diff_eq;

    #[test]
    fn black_scholes_prices() {
        let implied: Arc<dyn BlackVolatilitySurface> =
            Arc::new(StrikeSurface::new(Surface2D::constant(0.2)));
        let p = PriceSurface::from_black_scholes(implied, 100.0, 0.05, 0.0).unwrap();
        // Textbook value for S = K = 100, r = 5%, σ = 20%, T = 1.
        assert_abs_diff_eq!(p.price(1.0, 100.0).unwrap(), 10.450_583_572_185_565, epsilon = 1e-6);
        assert_abs_diff_eq!(p.price(0.0, 90.0).unwrap(), 10.0, epsilon = 1e-15);
    }

    #[test]
    fn rejects_bad_market_inputs() {
        let implied: Arc<dyn BlackVolatilitySurface> =
            Arc::new(StrikeSurface::new(Surface2D::constant(0.2)));
        assert!(PriceSurface::from_black_scholes(implied, 0.0, 0.05, 0.0).is_err());
    }
}
