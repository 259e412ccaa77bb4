//! Integration tests for Dupire local volatility extraction.
//!
//! Tests the full pipeline: quotes → SABR surface → DupireLocalVolatilityCalculator
//! → local_vol(), plus agreement between the strike, moneyness,
//! log-moneyness and price forms.
//!
//! Reference: Gatheral (2006), "The Volatility Surface", Ch. 1-2, Eq (1.10).

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use volfit::coordinate::StrikeKind;
use volfit::curve::{FlatForwardCurve, ForwardCurve, GrowthForwardCurve};
use volfit::local_vol::{DupireLocalVolatilityCalculator, LocalVol};
use volfit::smile::{SabrFitConfig, SabrParameters, hagan_volatility};
use volfit::surface::{
    BlackVolatilitySurface, MoneynessSurface, PiecewiseSabrConfig, PiecewiseSabrSurfaceFitter,
    PriceSurface, StrikeSurface, Surface2D, SurfaceConverter, SurfaceMarketData, VolatilitySurface,
};

fn sabr_fitter() -> PiecewiseSabrSurfaceFitter {
    let expiries = vec![0.25, 0.5, 1.0, 2.0];
    let alphas = [2.0, 2.0, 2.05, 2.1];
    let strikes: Vec<Vec<f64>> = vec![vec![75.0, 85.0, 95.0, 100.0, 105.0, 115.0, 130.0]; 4];
    let vols = expiries
        .iter()
        .zip(alphas)
        .zip(&strikes)
        .map(|((t, alpha), ks)| {
            let p = SabrParameters::new(alpha, 0.5, -0.3, 0.4).unwrap();
            ks.iter().map(|k| hagan_volatility(100.0, *k, *t, &p)).collect()
        })
        .collect();
    let data = SurfaceMarketData::new(expiries, vec![100.0; 4], strikes, vols).unwrap();
    let config =
        PiecewiseSabrConfig::default().with_fit(SabrFitConfig::default().with_fixed_beta(0.5));
    PiecewiseSabrSurfaceFitter::new(data, config).unwrap()
}

// Fitted SABR surface: local vol should be positive and finite across a grid.
#[test]
fn sabr_local_vol_grid_positive() {
    let surface = sabr_fitter().linear_variance_surface();
    let lv = DupireLocalVolatilityCalculator::new()
        .local_volatility_from_strike(&surface, 100.0, 0.0, 0.0)
        .unwrap();

    let expiries = [0.3, 0.75, 1.2, 1.5];
    let strikes = [85.0, 90.0, 95.0, 100.0, 105.0, 110.0, 115.0];

    let mut vals = Vec::new();
    for &t in &expiries {
        for &k in &strikes {
            let v = lv
                .local_vol(t, k)
                .unwrap_or_else(|e| panic!("failed at T={t}, K={k}: {e}"));
            assert!(v.0 > 0.0, "non-positive at T={t}, K={k}: {}", v.0);
            assert!(v.0.is_finite(), "non-finite at T={t}, K={k}: {}", v.0);
            assert!(v.0 < 1.0, "unreasonably large at T={t}, K={k}: {}", v.0);
            vals.push(v.0);
        }
    }

    let mean = vals.iter().sum::<f64>() / vals.len() as f64;
    let variance = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / vals.len() as f64;
    assert!(variance.sqrt() < 0.1, "local vol grid too noisy: mean={mean:.4}");
}

// Negative skew: local vol falls faster across strike than implied vol.
#[test]
fn local_skew_steeper_than_implied() {
    let surface = sabr_fitter().linear_variance_surface();
    let lv = DupireLocalVolatilityCalculator::new()
        .local_volatility_from_strike(&surface, 100.0, 0.0, 0.0)
        .unwrap();
    let t = 0.75;
    let implied_skew =
        surface.volatility(t, 90.0).unwrap().0 - surface.volatility(t, 110.0).unwrap().0;
    let local_skew = lv.local_vol(t, 90.0).unwrap().0 - lv.local_vol(t, 110.0).unwrap().0;
    assert!(implied_skew > 0.0);
    assert!(local_skew > implied_skew, "local {local_skew} vs implied {implied_skew}");
}

#[test]
fn boundary_identity_holds_exactly() {
    let surface = sabr_fitter().linear_variance_surface();
    let lv = DupireLocalVolatilityCalculator::new()
        .local_volatility_from_strike(&surface, 100.0, 0.02, 0.0)
        .unwrap();
    assert_eq!(
        lv.local_vol(0.0, 100.0).unwrap().0,
        surface.volatility(0.0, 100.0).unwrap().0
    );
}

// The same skewed smile expressed in three coordinates gives the same local vol.
#[test]
fn coordinate_forms_agree() {
    let fwd: Arc<dyn ForwardCurve> = Arc::new(FlatForwardCurve::new(100.0).unwrap());
    let strike = StrikeSurface::new(Surface2D::from_infallible(|t, k| {
        let x = (k / 100.0_f64).ln();
        0.2 - 0.05 * x + 0.1 * x * x + 0.005 * t
    }));
    let calc = DupireLocalVolatilityCalculator::new().with_tolerance(1e-4).unwrap();
    let from_strike = calc.local_volatility_from_strike(&strike, 100.0, 0.0, 0.0).unwrap();

    let source = VolatilitySurface::from(strike);
    let VolatilitySurface::Moneyness(m) =
        SurfaceConverter::convert(&source, StrikeKind::Moneyness, Some(Arc::clone(&fwd))).unwrap()
    else {
        panic!("expected a moneyness surface");
    };
    let VolatilitySurface::LogMoneyness(y) =
        SurfaceConverter::convert(&source, StrikeKind::LogMoneyness, Some(fwd)).unwrap()
    else {
        panic!("expected a log-moneyness surface");
    };
    let from_moneyness = calc.local_volatility_from_moneyness(&m);
    let from_log = calc.local_volatility_from_log_moneyness(&y);

    for k in [85.0, 100.0, 120.0] {
        let a = from_strike.local_vol(1.0, k).unwrap().0;
        assert_abs_diff_eq!(from_moneyness.local_vol(1.0, k).unwrap().0, a, epsilon = 1e-4);
        assert_abs_diff_eq!(from_log.local_vol(1.0, k).unwrap().0, a, epsilon = 1e-4);
    }
}

// Flat implied vol with carry: every form returns the flat vol.
#[test]
fn flat_vol_with_carry() {
    let calc = DupireLocalVolatilityCalculator::new();
    let fwd: Arc<dyn ForwardCurve> = Arc::new(GrowthForwardCurve::new(100.0, 0.04, 0.01).unwrap());
    let implied = StrikeSurface::new(Surface2D::constant(0.25));

    let lv = calc.local_volatility_from_strike(&implied, 100.0, 0.04, 0.01).unwrap();
    let moneyness = MoneynessSurface::new(Surface2D::constant(0.25), fwd);
    let lv_m = calc.local_volatility_from_moneyness(&moneyness);
    let prices = PriceSurface::from_black_scholes(Arc::new(implied), 100.0, 0.04, 0.01).unwrap();
    let lv_p = calc.local_volatility_from_price(&prices, 100.0, 0.04, 0.01).unwrap();

    for (t, k) in [(0.5, 90.0), (1.0, 103.0), (2.0, 120.0)] {
        assert_abs_diff_eq!(lv.local_vol(t, k).unwrap().0, 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(lv_m.local_vol(t, k).unwrap().0, 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(lv_p.local_vol(t, k).unwrap().0, 0.25, epsilon = 1e-4);
    }
}

// Total variance flat in time: local variance is zero up to differencing
// noise and is clamped rather than returned negative.
#[test]
fn flat_variance_gives_zero_local_vol() {
    let implied = StrikeSurface::new(Surface2D::from_infallible(|t, _| {
        0.35 * (0.25_f64 / t).sqrt().clamp(0.5, 1.0)
    }));
    let lv = DupireLocalVolatilityCalculator::new()
        .local_volatility_from_strike(&implied, 100.0, 0.0, 0.0)
        .unwrap();
    // Between t = 0.25 and t = 1 total variance stays at 0.35²·0.25.
    let v = lv.local_vol(0.5, 100.0).unwrap().0;
    assert!(v >= 0.0 && v < 1e-3, "local vol {v}");
}
