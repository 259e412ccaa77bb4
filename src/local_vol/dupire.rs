//! Dupire local volatility extraction.
//!
//! From an implied vol surface σ(t, k) with constant carry `r − q`:
//!
//! ```text
//! σ²_loc = (σ² + 2σt(∂σ/∂t + (r − q)k·∂σ/∂k))
//!        / (1 + 2h₁k·∂σ/∂k + k²(h₁h₂(∂σ/∂k)² + tσ·∂²σ/∂k²))
//! h₁ = (ln(S/k) + (r − q + σ²/2)t) / σ,   h₂ = h₁ − σt
//! ```
//!
//! From total variance w(t, y) in log-moneyness y = ln(K/F):
//!
//! ```text
//! σ²_loc = ∂w/∂t / [1 − (y/w)·∂w/∂y + ¼(−¼ − 1/w + y²/w²)·(∂w/∂y)² + ½·∂²w/∂y²]
//! ```
//!
//! From call prices:
//!
//! ```text
//! σ²_loc = (∂C/∂T + (r − q)K·∂C/∂K + qC) / (½K²·∂²C/∂K²)
//! ```
//!
//! Negative local variance from finite-difference noise or an arbitrageable
//! input is clamped to zero.
//!
//! # References
//! - Dupire, B. "Pricing with a Smile" (1994)
//! - Gatheral, J. "The Volatility Surface: A Practitioner's Guide" (2006), Ch. 2

use std::sync::Arc;

use crate::error;
use crate::local_vol::{LocalVolKind, LocalVolatilitySurface};
use crate::surface::{
    BlackVolatilitySurface, LogMoneynessSurface, MoneynessSurface, PriceSurface, StrikeSurface,
    Surface2D,
};
use crate::validate::{validate_finite, validate_positive};

const DEFAULT_TOLERANCE: f64 = 1e-5;

/// Finite-difference Dupire calculator.
///
/// The time step is `tolerance` (forward difference below it, central
/// otherwise). The strike step is `tolerance · spot` (a one-sided stencil
/// within one step of zero, central otherwise).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DupireLocalVolatilityCalculator {
    tolerance: f64,
}

impl Default for DupireLocalVolatilityCalculator {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// First and second derivatives in the level coordinate.
struct LevelDerivatives {
    first: f64,
    second: f64,
}

fn time_derivative<F>(f: &F, t: f64, x: f64, eps: f64) -> error::Result<f64>
where
    F: Fn(f64, f64) -> error::Result<f64>,
{
    if t < eps {
        Ok((f(t + eps, x)? - f(t, x)?) / eps)
    } else {
        Ok((f(t + eps, x)? - f(t - eps, x)?) / (2.0 * eps))
    }
}

/// Derivatives in `x` with step `eps`. When `x − eps` would leave the
/// positive half-line and `positive_only` is set, a forward stencil is used.
fn level_derivatives<F>(
    f: &F,
    t: f64,
    x: f64,
    center: f64,
    eps: f64,
    positive_only: bool,
) -> error::Result<LevelDerivatives>
where
    F: Fn(f64, f64) -> error::Result<f64>,
{
    if positive_only && x < eps {
        let up = f(t, x + eps)?;
        let up2 = f(t, x + 2.0 * eps)?;
        Ok(LevelDerivatives {
            first: (-3.0 * center + 4.0 * up - up2) / (2.0 * eps),
            second: (center - 2.0 * up + up2) / (eps * eps),
        })
    } else {
        let up = f(t, x + eps)?;
        let dn = f(t, x - eps)?;
        Ok(LevelDerivatives {
            first: (up - dn) / (2.0 * eps),
            second: (up - 2.0 * center + dn) / (eps * eps),
        })
    }
}

fn clamped_vol(variance: f64) -> f64 {
    if variance > 0.0 { variance.sqrt() } else { 0.0 }
}

/// Local vol from an implied vol function of an absolute or relative level.
fn implied_to_local<F>(
    implied: &F,
    t: f64,
    k: f64,
    spot: f64,
    carry: f64,
    tolerance: f64,
) -> error::Result<f64>
where
    F: Fn(f64, f64) -> error::Result<f64>,
{
    let vol = implied(t, k)?;
    if t == 0.0 && k == spot {
        return Ok(vol);
    }
    let d_t = time_derivative(implied, t, k, tolerance)?;
    let d_k = level_derivatives(implied, t, k, vol, tolerance * spot, true)?;

    let h1 = ((spot / k).ln() + (carry + 0.5 * vol * vol) * t) / vol;
    let h2 = h1 - vol * t;
    let numerator = vol * vol + 2.0 * vol * t * (d_t + carry * k * d_k.first);
    let denominator = 1.0
        + 2.0 * h1 * k * d_k.first
        + k * k * (h1 * h2 * d_k.first * d_k.first + t * vol * d_k.second);
    Ok(clamped_vol(numerator / denominator))
}

impl DupireLocalVolatilityCalculator {
    /// Calculator with the default tolerance `1e-5`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the finite-difference tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`VolFitError::InvalidInput`](crate::VolFitError::InvalidInput)
    /// if `tolerance` is zero, negative, NaN, or infinite.
    pub fn with_tolerance(mut self, tolerance: f64) -> error::Result<Self> {
        validate_positive(tolerance, "tolerance")?;
        self.tolerance = tolerance;
        Ok(self)
    }

    /// Finite-difference tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Local vol by underlying level from a strike-indexed implied surface.
    ///
    /// At `(0, spot)` the implied vol is returned unchanged.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`](crate::VolFitError::InvalidInput)
    /// for a non-positive spot or non-finite rates. Errors from the source
    /// surface appear when the result is evaluated.
    pub fn local_volatility_from_strike(
        &self,
        implied: &StrikeSurface,
        spot: f64,
        rate: f64,
        dividend_yield: f64,
    ) -> error::Result<LocalVolatilitySurface> {
        validate_positive(spot, "spot")?;
        validate_finite(rate, "rate")?;
        validate_finite(dividend_yield, "dividend_yield")?;
        let src = implied.surface().clone();
        let tolerance = self.tolerance;
        let carry = rate - dividend_yield;
        let surface = Surface2D::from_fn(move |t, k| {
            validate_positive(k, "strike")?;
            implied_to_local(&|t, k| src.value(t, k), t, k, spot, carry, tolerance)
        });
        Ok(LocalVolatilitySurface::new(surface, LocalVolKind::Strike))
    }

    /// Local vol by forward moneyness. The forward carries the drift, so the
    /// strike formula applies with unit spot and zero carry; `(0, 1)` returns
    /// the implied vol unchanged.
    pub fn local_volatility_from_moneyness(
        &self,
        implied: &MoneynessSurface,
    ) -> LocalVolatilitySurface {
        let src = implied.surface().clone();
        let tolerance = self.tolerance;
        let surface = Surface2D::from_fn(move |t, m| {
            validate_positive(m, "moneyness")?;
            implied_to_local(&|t, m| src.value(t, m), t, m, 1.0, 0.0, tolerance)
        });
        LocalVolatilitySurface::new(
            surface,
            LocalVolKind::Moneyness(Arc::clone(implied.forward_curve())),
        )
    }

    /// Local vol by log-moneyness, using Gatheral's total-variance form.
    ///
    /// `(0, 0)` returns the implied vol unchanged. Where total variance is
    /// zero (at `t = 0`) the form degenerates, so the moneyness formula is
    /// evaluated at `e^y` instead. A non-positive denominator or negative
    /// variance yields zero.
    pub fn local_volatility_from_log_moneyness(
        &self,
        implied: &LogMoneynessSurface,
    ) -> LocalVolatilitySurface {
        let src = implied.surface().clone();
        let tolerance = self.tolerance;
        let surface = Surface2D::from_fn(move |t, y| {
            let vol = src.value(t, y)?;
            let w = vol * vol * t;
            if w <= 0.0 {
                let by_moneyness = |t: f64, m: f64| src.value(t, m.ln());
                return implied_to_local(&by_moneyness, t, y.exp(), 1.0, 0.0, tolerance);
            }
            let w_fn = |t: f64, y: f64| -> error::Result<f64> {
                let v = src.value(t, y)?;
                Ok(v * v * t)
            };
            let dw_dt = time_derivative(&w_fn, t, y, tolerance)?;
            let d_y = level_derivatives(&w_fn, t, y, w, tolerance, false)?;

            let denominator = 1.0 - (y / w) * d_y.first
                + 0.25 * (-0.25 - 1.0 / w + y * y / (w * w)) * d_y.first * d_y.first
                + 0.5 * d_y.second;
            if !(denominator > 0.0) {
                return Ok(0.0);
            }
            Ok(clamped_vol(dw_dt / denominator))
        });
        LocalVolatilitySurface::new(
            surface,
            LocalVolKind::LogMoneyness(Arc::clone(implied.forward_curve())),
        )
    }

    /// Local vol by underlying level directly from discounted call prices.
    ///
    /// Negative variance is clamped to zero; a zero denominator gives NaN.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`](crate::VolFitError::InvalidInput)
    /// for a non-positive spot or non-finite rates.
    pub fn local_volatility_from_price(
        &self,
        prices: &PriceSurface,
        spot: f64,
        rate: f64,
        dividend_yield: f64,
    ) -> error::Result<LocalVolatilitySurface> {
        validate_positive(spot, "spot")?;
        validate_finite(rate, "rate")?;
        validate_finite(dividend_yield, "dividend_yield")?;
        let src = prices.surface().clone();
        let tolerance = self.tolerance;
        let surface = Surface2D::from_fn(move |t, k| {
            validate_positive(k, "strike")?;
            let f = |t: f64, k: f64| src.value(t, k);
            let c = f(t, k)?;
            let d_t = time_derivative(&f, t, k, tolerance)?;
            let d_k = level_derivatives(&f, t, k, c, tolerance * spot, true)?;
            let numerator = d_t + (rate - dividend_yield) * k * d_k.first + dividend_yield * c;
            let denominator = 0.5 * k * k * d_k.second;
            let variance = if denominator == 0.0 {
                f64::NAN
            } else {
                numerator / denominator
            };
            Ok(if variance < 0.0 { 0.0 } else { variance.sqrt() })
        });
        Ok(LocalVolatilitySurface::new(surface, LocalVolKind::Strike))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{FlatForwardCurve, ForwardCurve};
    use crate::local_vol::LocalVol;
    use approx::assert_abs_diff_eq;

    fn skewed_strike_surface() -> StrikeSurface {
        StrikeSurface::new(Surface2D::from_infallible(|t, k| {
            let x = (k / 100.0_f64).ln();
            0.2 - 0.05 * x + 0.1 * x * x + 0.005 * t
        }))
    }

    #[test]
    fn flat_implied_gives_flat_local() {
        let calc = DupireLocalVolatilityCalculator::new();
        let implied = StrikeSurface::new(Surface2D::constant(0.2));
        let lv = calc
            .local_volatility_from_strike(&implied, 100.0, 0.03, 0.01)
            .unwrap();
        for (t, k) in [(0.5, 80.0), (1.0, 100.0), (2.0, 140.0)] {
            assert_abs_diff_eq!(lv.local_vol(t, k).unwrap().0, 0.2, epsilon = 1e-8);
        }
    }

    #[test]
    fn identity_at_origin() {
        let calc = DupireLocalVolatilityCalculator::new();
        let implied = skewed_strike_surface();
        let lv = calc
            .local_volatility_from_strike(&implied, 100.0, 0.02, 0.0)
            .unwrap();
        assert_eq!(
            lv.local_vol(0.0, 100.0).unwrap().0,
            implied.volatility(0.0, 100.0).unwrap().0
        );

        let fwd: Arc<dyn ForwardCurve> = Arc::new(FlatForwardCurve::new(100.0).unwrap());
        let m = MoneynessSurface::new(
            Surface2D::from_infallible(|_, m: f64| 0.25 - 0.1 * m.ln()),
            Arc::clone(&fwd),
        );
        let lv_m = calc.local_volatility_from_moneyness(&m);
        assert_eq!(lv_m.local_vol_at(0.0, 1.0).unwrap().0, 0.25);

        let y = LogMoneynessSurface::new(Surface2D::from_infallible(|_, y| 0.3 + 0.1 * y), fwd);
        let lv_y = calc.local_volatility_from_log_moneyness(&y);
        assert_eq!(lv_y.local_vol_at(0.0, 0.0).unwrap().0, 0.3);
    }

    #[test]
    fn skew_raises_downside_local_vol() {
        let calc = DupireLocalVolatilityCalculator::new();
        let lv = calc
            .local_volatility_from_strike(&skewed_strike_surface(), 100.0, 0.0, 0.0)
            .unwrap();
        let low = lv.local_vol(1.0, 90.0).unwrap().0;
        let high = lv.local_vol(1.0, 110.0).unwrap().0;
        assert!(low > high, "low {low} high {high}");
    }

    #[test]
    fn negative_variance_is_clamped() {
        let calc = DupireLocalVolatilityCalculator::new();
        // Implied vol falling fast in time: σ² + 2σtσ_t < 0 at t = 1.
        let implied = StrikeSurface::new(Surface2D::from_infallible(|t, _| 0.3 - 0.2 * t));
        let lv = calc
            .local_volatility_from_strike(&implied, 100.0, 0.0, 0.0)
            .unwrap();
        assert_eq!(lv.local_vol(1.0, 100.0).unwrap().0, 0.0);
    }

    #[test]
    fn log_moneyness_form_matches_strike_form() {
        let calc = DupireLocalVolatilityCalculator::new().with_tolerance(1e-4).unwrap();
        let fwd: Arc<dyn ForwardCurve> = Arc::new(FlatForwardCurve::new(100.0).unwrap());
        let smile = |t: f64, y: f64| 0.2 - 0.05 * y + 0.1 * y * y + 0.005 * t;
        let y_surface =
            LogMoneynessSurface::new(Surface2D::from_infallible(smile), Arc::clone(&fwd));
        let lv_y = calc.local_volatility_from_log_moneyness(&y_surface);
        let lv_k = calc
            .local_volatility_from_strike(&skewed_strike_surface(), 100.0, 0.0, 0.0)
            .unwrap();
        for k in [85.0, 100.0, 120.0] {
            let a = lv_y.local_vol(1.0, k).unwrap().0;
            let b = lv_k.local_vol(1.0, k).unwrap().0;
            assert_abs_diff_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn log_moneyness_form_at_zero_expiry_matches_strike_form() {
        let calc = DupireLocalVolatilityCalculator::new();
        let fwd: Arc<dyn ForwardCurve> = Arc::new(FlatForwardCurve::new(100.0).unwrap());
        let flat_y = LogMoneynessSurface::new(Surface2D::constant(0.2), Arc::clone(&fwd));
        let flat_k = StrikeSurface::new(Surface2D::constant(0.2));
        let skew_y = LogMoneynessSurface::new(
            Surface2D::from_infallible(|t, y| 0.2 - 0.05 * y + 0.1 * y * y + 0.005 * t),
            fwd,
        );
        let cases = [(flat_y, flat_k), (skew_y, skewed_strike_surface())];
        for (y_surface, k_surface) in &cases {
            let lv_y = calc.local_volatility_from_log_moneyness(y_surface);
            let lv_k = calc
                .local_volatility_from_strike(k_surface, 100.0, 0.0, 0.0)
                .unwrap();
            for y in [-0.2, 0.1] {
                let k = 100.0 * f64::exp(y);
                let expected = lv_k.local_vol(0.0, k).unwrap().0;
                assert!(expected > 0.1);
                assert_abs_diff_eq!(lv_y.local_vol_at(0.0, y).unwrap().0, expected, epsilon = 1e-6);
            }
        }
        let flat = calc.local_volatility_from_log_moneyness(&cases[0].0);
        assert_abs_diff_eq!(flat.local_vol_at(0.0, 0.1).unwrap().0, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn price_form_recovers_flat_vol() {
        let calc = DupireLocalVolatilityCalculator::new();
        let implied: Arc<dyn BlackVolatilitySurface> =
            Arc::new(StrikeSurface::new(Surface2D::constant(0.2)));
        let prices = PriceSurface::from_black_scholes(implied, 100.0, 0.03, 0.01).unwrap();
        let lv = calc
            .local_volatility_from_price(&prices, 100.0, 0.03, 0.01)
            .unwrap();
        for (t, k) in [(0.5, 90.0), (1.0, 100.0), (2.0, 115.0)] {
            assert_abs_diff_eq!(lv.local_vol(t, k).unwrap().0, 0.2, epsilon = 1e-4);
        }
    }

    #[test]
    fn price_form_zero_curvature_is_nan() {
        let calc = DupireLocalVolatilityCalculator::new();
        let prices = PriceSurface::new(Surface2D::from_infallible(|t, _| 10.0 + t));
        let lv = calc.local_volatility_from_price(&prices, 100.0, 0.0, 0.0).unwrap();
        assert!(lv.local_vol(1.0, 100.0).unwrap().0.is_nan());
    }

    #[test]
    fn never_negative() {
        let calc = DupireLocalVolatilityCalculator::new();
        let implied = StrikeSurface::new(Surface2D::from_infallible(|t, k| {
            0.4 - 0.3 * (k / 100.0_f64).ln() - 0.1 * t
        }));
        let lv = calc.local_volatility_from_strike(&implied, 100.0, 0.01, 0.0).unwrap();
        for t in [0.0, 0.1, 1.0, 3.0] {
            for k in [0.0005, 50.0, 100.0, 200.0] {
                let v = lv.local_vol(t, k).unwrap().0;
                assert!(!(v < 0.0), "t {t} k {k}: {v}");
            }
        }
    }

    #[test]
    fn tolerance_must_be_positive() {
        assert!(DupireLocalVolatilityCalculator::new().with_tolerance(0.0).is_err());
        assert_eq!(DupireLocalVolatilityCalculator::default().tolerance(), 1e-5);
    }
}
