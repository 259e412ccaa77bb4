//! Moneyness transformations and forward conventions.
//!
//! Every non-strike coordinate is defined relative to the forward `F(t)`:
//! moneyness `m = K/F`, log-moneyness `x = ln(K/F)`.

/// Convert a strike to log-moneyness: x = ln(K / F).
pub fn log_moneyness(strike: f64, forward: f64) -> f64 {
    (strike / forward).ln()
}

/// Convert a strike to simple moneyness: m = K / F.
pub fn moneyness(strike: f64, forward: f64) -> f64 {
    strike / forward
}

/// Compute forward price from spot: F = S · exp((r − q) · T).
pub fn forward_price(spot: f64, rate: f64, dividend_yield: f64, expiry: f64) -> f64 {
    spot * ((rate - dividend_yield) * expiry).exp()
}

/// Standardized log-moneyness `d = ln(K/F) / t^(λ/2)`.
///
/// `lambda = 0` gives plain log-moneyness, `lambda = 1` scales by `√t`.
pub fn standardized_log_moneyness(strike: f64, forward: f64, expiry: f64, lambda: f64) -> f64 {
    log_moneyness(strike, forward) / expiry.powf(0.5 * lambda)
}

/// Inverse of [`standardized_log_moneyness`]: the strike at distance `d`.
pub fn strike_from_standardized(d: f64, forward: f64, expiry: f64, lambda: f64) -> f64 {
    forward * (d * expiry.powf(0.5 * lambda)).exp()
}
