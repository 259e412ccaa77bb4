//! Black (lognormal) formulas on the forward.
//!
//! All prices are undiscounted and all deltas are forward deltas:
//!
//! ```text
//! d1 = (ln(F/K) + σ²t/2) / (σ√t)
//! C  = F·N(d1) − K·N(d1 − σ√t)
//! Δc = N(d1),  Δp = N(d1) − 1
//! ```

use statrs::function::erf::{erfc, erfc_inv};

use crate::types::OptionType;

/// Standard normal cumulative distribution function.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal density.
pub fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Inverse of [`norm_cdf`] for `p` in (0, 1).
///
/// Returns ±∞ at the boundaries and NaN outside [0, 1].
pub fn norm_inv(p: f64) -> f64 {
    -std::f64::consts::SQRT_2 * erfc_inv(2.0 * p)
}

/// Black `d1` at log-moneyness `x = ln(K/F)`.
pub fn d1(log_moneyness: f64, vol: f64, expiry: f64) -> f64 {
    let sd = vol * expiry.sqrt();
    (-log_moneyness + 0.5 * sd * sd) / sd
}

/// Undiscounted Black price of a European option.
///
/// With zero standard deviation the intrinsic value is returned.
pub fn black_price(
    forward: f64,
    strike: f64,
    vol: f64,
    expiry: f64,
    option_type: OptionType,
) -> f64 {
    let sd = vol * expiry.sqrt();
    if sd <= 0.0 {
        return match option_type {
            OptionType::Call => (forward - strike).max(0.0),
            OptionType::Put => (strike - forward).max(0.0),
        };
    }
    let d1 = ((forward / strike).ln() + 0.5 * sd * sd) / sd;
    let d2 = d1 - sd;
    match option_type {
        OptionType::Call => forward * norm_cdf(d1) - strike * norm_cdf(d2),
        OptionType::Put => strike * norm_cdf(-d2) - forward * norm_cdf(-d1),
    }
}

/// Black forward delta `N(d1)` for a call, `N(d1) − 1` for a put.
pub fn forward_delta(
    forward: f64,
    strike: f64,
    vol: f64,
    expiry: f64,
    option_type: OptionType,
) -> f64 {
    let call = norm_cdf(d1((strike / forward).ln(), vol, expiry));
    match option_type {
        OptionType::Call => call,
        OptionType::Put => call - 1.0,
    }
}

/// Strike with forward call delta `delta` at a fixed volatility.
///
/// Closed form `K = F·exp(−σ√t·N⁻¹(Δ) + σ²t/2)`. Pass a call delta in (0, 1);
/// a put delta `Δp` corresponds to the call delta `1 + Δp`.
pub fn strike_for_delta(forward: f64, delta: f64, vol: f64, expiry: f64) -> f64 {
    let sd = vol * expiry.sqrt();
    forward * (-sd * norm_inv(delta) + 0.5 * sd * sd).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cdf_reference_values() {
        assert_abs_diff_eq!(norm_cdf(0.0), 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(norm_cdf(1.0), 0.841_344_746_068_542_9, epsilon = 1e-12);
        assert_abs_diff_eq!(norm_cdf(-1.96), 0.024_997_895_148_220_4, epsilon = 1e-12);
    }

    #[test]
    fn inverse_round_trip() {
        for &p in &[1e-6, 0.01, 0.25, 0.5, 0.75, 0.99] {
            assert_abs_diff_eq!(norm_cdf(norm_inv(p)), p, epsilon = 1e-12);
        }
    }

    #[test]
    fn put_call_parity() {
        let (f, k, v, t) = (100.0, 95.0, 0.25, 0.75);
        let c = black_price(f, k, v, t, OptionType::Call);
        let p = black_price(f, k, v, t, OptionType::Put);
        assert_abs_diff_eq!(c - p, f - k, epsilon = 1e-10);
    }

    #[test]
    fn zero_vol_is_intrinsic() {
        assert_eq!(black_price(100.0, 90.0, 0.0, 1.0, OptionType::Call), 10.0);
        assert_eq!(black_price(100.0, 90.0, 0.0, 1.0, OptionType::Put), 0.0);
    }

    #[test]
    fn strike_for_delta_inverts_forward_delta() {
        let (f, v, t) = (100.0, 0.2, 1.0);
        for &delta in &[0.1, 0.25, 0.5, 0.75, 0.9] {
            let k = strike_for_delta(f, delta, v, t);
            let back = forward_delta(f, k, v, t, OptionType::Call);
            assert_abs_diff_eq!(back, delta, epsilon = 1e-12);
        }
    }

    #[test]
    fn put_delta_is_call_minus_one() {
        let c = forward_delta(100.0, 110.0, 0.3, 0.5, OptionType::Call);
        let p = forward_delta(100.0, 110.0, 0.3, 0.5, OptionType::Put);
        assert_abs_diff_eq!(c - p, 1.0, epsilon = 1e-15);
    }

    #[test]
    fn pdf_is_cdf_slope() {
        let h = 1e-6;
        for &x in &[-2.0, -0.5, 0.0, 1.3] {
            let fd = (norm_cdf(x + h) - norm_cdf(x - h)) / (2.0 * h);
            assert_abs_diff_eq!(norm_pdf(x), fd, epsilon = 1e-8);
        }
    }
}
