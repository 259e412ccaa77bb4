//! Property-based tests using proptest.
//!
//! These tests verify invariant properties across random inputs rather than
//! testing fixed examples. They help catch edge cases and ensure robustness.

use std::sync::Arc;

use proptest::prelude::*;
use volfit::coordinate::{StrikeCoordinate, StrikeKind};
use volfit::curve::{FlatForwardCurve, ForwardCurve};
use volfit::local_vol::{DupireLocalVolatilityCalculator, LocalVol};
use volfit::optim::{BisectionRootFinder, bracket_root};
use volfit::smile::{
    SabrParameters, SabrSmile, SmileSection, hagan_volatility, hagan_volatility_adjoint,
};
use volfit::surface::{
    BlackVolatilitySurface, LogMoneynessSurface, StrikeSurface, Surface2D, SurfaceConverter,
};
use volfit::{VolFitError, conventions};

fn flat_forward() -> Arc<dyn ForwardCurve> {
    Arc::new(FlatForwardCurve::new(100.0).unwrap())
}

// --- Property Test 1: coordinate algebra ---

proptest! {
    /// `(a + b) − b == a` for coordinates of the same kind.
    #[test]
    fn coordinate_add_then_subtract(
        a in 0.5_f64..2.0,
        b in 0.01_f64..1.0,
    ) {
        let x = StrikeCoordinate::new(StrikeKind::Moneyness, a).unwrap();
        let y = StrikeCoordinate::new(StrikeKind::Moneyness, b).unwrap();
        let back = x.add(&y).unwrap().subtract(&y).unwrap();
        prop_assert_eq!(back.kind(), StrikeKind::Moneyness);
        prop_assert!((back.value() - a).abs() < 1e-14);
    }

    /// Mixed kinds are rejected.
    #[test]
    fn coordinate_kinds_must_match(
        k in 50.0_f64..150.0,
        d in 0.05_f64..0.95,
    ) {
        let strike = StrikeCoordinate::new(StrikeKind::Strike, k).unwrap();
        let delta = StrikeCoordinate::new(StrikeKind::Delta, d).unwrap();
        let is_invalid = matches!(strike.add(&delta), Err(VolFitError::InvalidInput { .. }));
        prop_assert!(is_invalid);
    }
}

// --- Property Test 2: closed-form conversions are exact ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Strike → moneyness → log-moneyness → strike leaves vols unchanged.
    #[test]
    fn closed_form_chain_is_exact(
        level in 0.1_f64..0.4,
        skew in -0.3_f64..0.1,
        t in 0.05_f64..5.0,
        k in 60.0_f64..160.0,
    ) {
        let source = StrikeSurface::new(Surface2D::from_infallible(move |_, k| {
            level + skew * (k / 100.0_f64).ln()
        }));
        let m = SurfaceConverter::strike_to_moneyness(&source, flat_forward());
        let y = SurfaceConverter::moneyness_to_log_moneyness(&m);
        let back = SurfaceConverter::log_moneyness_to_strike(&y);
        let expected = source.volatility(t, k).unwrap().0;
        prop_assert!((back.volatility(t, k).unwrap().0 - expected).abs() < 1e-12);
    }
}

// --- Property Test 3: delta round trip ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Log-moneyness → delta → log-moneyness within root-finding tolerance.
    #[test]
    fn delta_round_trip(
        level in 0.15_f64..0.35,
        skew in -0.15_f64..0.0,
        t in 0.25_f64..3.0,
        x in -0.3_f64..0.3,
    ) {
        let source = LogMoneynessSurface::new(
            Surface2D::from_infallible(move |_, x| level + skew * x),
            flat_forward(),
        );
        let delta = SurfaceConverter::log_moneyness_to_delta(&source);
        let back = SurfaceConverter::delta_to_log_moneyness(&delta);
        let expected = source.volatility_at(t, x).unwrap().0;
        prop_assert!((back.volatility_at(t, x).unwrap().0 - expected).abs() < 1e-5);
    }
}

// --- Property Test 4: SABR vol positivity and gradient consistency ---

proptest! {
    /// Hagan vol is positive and finite for reasonable parameters near the money.
    #[test]
    fn sabr_vol_positive(
        atm_vol in 0.05_f64..0.4,
        beta in 0.0_f64..1.0,
        rho in -0.9_f64..0.9,
        nu in 0.05_f64..1.0,
        k in 70.0_f64..140.0,
    ) {
        let alpha = atm_vol * 100.0_f64.powf(1.0 - beta);
        let smile = SabrSmile::new(100.0, 1.0, alpha, beta, rho, nu).unwrap();
        let v = smile.vol(k).unwrap().0;
        prop_assert!(v > 0.0 && v.is_finite(), "vol {} at strike {}", v, k);
    }

    /// The adjoint returns the same vol as the plain formula.
    #[test]
    fn sabr_adjoint_value_matches(
        beta in 0.1_f64..0.9,
        rho in -0.8_f64..0.8,
        nu in 0.1_f64..0.8,
        k in 60.0_f64..160.0,
    ) {
        let p = SabrParameters::new(2.0, beta, rho, nu).unwrap();
        let (v, grad) = hagan_volatility_adjoint(100.0, k, 0.75, &p);
        prop_assert!((v - hagan_volatility(100.0, k, 0.75, &p)).abs() < 1e-14);
        prop_assert!(grad.iter().all(|g| g.is_finite()), "gradient {:?}", grad);
    }
}

// --- Property Test 5: local vol never negative ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Clamping keeps local vol non-negative even for arbitrageable inputs.
    #[test]
    fn local_vol_never_negative(
        level in 0.05_f64..0.5,
        skew in -0.5_f64..0.5,
        decay in -0.3_f64..0.3,
        t in 0.01_f64..3.0,
        k in 30.0_f64..200.0,
    ) {
        let implied = StrikeSurface::new(Surface2D::from_infallible(move |t, k| {
            (level + skew * (k / 100.0_f64).ln() + decay * t).max(0.01)
        }));
        let lv = DupireLocalVolatilityCalculator::new()
            .local_volatility_from_strike(&implied, 100.0, 0.02, 0.0)
            .unwrap();
        let v = lv.local_vol(t, k).unwrap().0;
        prop_assert!(!(v < 0.0), "local vol {} at ({}, {})", v, t, k);
    }
}

// --- Property Test 6: bisection ---

proptest! {
    /// Strictly monotone functions with a sign change are solved to tolerance.
    #[test]
    fn bisection_finds_linear_roots(
        slope in prop_oneof![-10.0_f64..-0.1, 0.1_f64..10.0],
        root in -5.0_f64..5.0,
    ) {
        let f = |x: f64| slope * (x - root);
        let solver = BisectionRootFinder::new(1e-10).unwrap();
        let x = solver.get_root(|x| Ok(f(x)), -10.0, 10.0).unwrap();
        prop_assert!(f(x).abs() < 1e-10);
    }

    /// Auto-bracketing from a shifted guess still contains the root.
    #[test]
    fn bracket_contains_root(
        root in -20.0_f64..20.0,
        guess in -1.0_f64..1.0,
    ) {
        let f = |x: f64| (x - root).powi(3) + (x - root);
        let (lo, hi) = bracket_root(|x| Ok(f(x)), guess, guess + 0.5, -100.0, 100.0).unwrap();
        prop_assert!(f(lo) * f(hi) <= 0.0);
    }

    /// No sign change means no root.
    #[test]
    fn bisection_rejects_bracket_without_sign_change(
        offset in 0.1_f64..10.0,
    ) {
        let solver = BisectionRootFinder::new(1e-8).unwrap();
        let result = solver.get_root(|x: f64| Ok(x * x + offset), -1.0, 1.0);
        prop_assert!(result.is_err());
    }
}

// --- Property Test 7: standardized log-moneyness round trip ---

proptest! {
    #[test]
    fn standardized_log_moneyness_round_trip(
        k in 10.0_f64..500.0,
        f in 50.0_f64..200.0,
        t in 0.01_f64..10.0,
        lambda in 0.0_f64..2.0,
    ) {
        let d = conventions::standardized_log_moneyness(k, f, t, lambda);
        let back = conventions::strike_from_standardized(d, f, t, lambda);
        prop_assert!((back - k).abs() < 1e-9 * k);
    }
}
