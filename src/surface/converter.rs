//! Conversions between strike coordinates.
//!
//! Strike, moneyness and log-moneyness are related in closed form through
//! the forward. Delta is implicit: the delta of a strike depends on the vol
//! at that strike, so every converted delta query runs a bisection. The
//! converted surfaces are lazy closures over the source surface.
//!
//! ```text
//! m = k / F(t)
//! x = ln(k / F(t))
//! Δ = N(d1),  d1 = (−x + σ(x)²t/2) / (σ(x)√t)
//! ```

use std::sync::Arc;

use crate::black::{d1, norm_cdf, norm_inv};
use crate::coordinate::StrikeKind;
use crate::curve::ForwardCurve;
use crate::error::{self, VolFitError};
use crate::optim::{BisectionRootFinder, bracket_root};
use crate::surface::function::{Surface2D, require_positive_expiry};
use crate::surface::volatility::{
    BlackVolatilitySurface, DeltaSurface, LogMoneynessSurface, MoneynessSurface, StrikeSurface,
    VolatilitySurface,
};
use crate::validate::{validate_finite, validate_open_unit, validate_positive};

/// Bisection tolerance in delta units.
const ROOT_TOLERANCE: f64 = 1e-6;
/// Innermost delta sampled when bracketing.
const DELTA_EPS: f64 = 1e-9;
const LOG_MONEYNESS_LIMIT: f64 = 50.0;

/// Delta at log-moneyness `x` on a delta-indexed vol surface.
///
/// Solves `Δ − N(d1(x, σ(t, Δ))) = 0`. The starting window comes from the
/// flat-vol delta at the 50-delta vol; if it holds no root the search
/// widens to the whole of (0, 1).
pub(crate) fn delta_at_log_moneyness(surface: &Surface2D, t: f64, x: f64) -> error::Result<f64> {
    require_positive_expiry(t)?;
    validate_finite(x, "log-moneyness")?;

    let objective = |delta: f64| -> error::Result<f64> {
        let vol = surface.value(t, delta)?;
        Ok(delta - norm_cdf(d1(x, vol, t)))
    };

    let delta0 = norm_cdf(d1(x, surface.value(t, 0.5)?, t));
    let (mut lo, mut hi) = if delta0 < 0.1 {
        (DELTA_EPS, 0.1)
    } else if delta0 > 0.9 {
        (0.9, 1.0 - DELTA_EPS)
    } else {
        ((delta0 - 0.1).max(DELTA_EPS), (delta0 + 0.1).min(1.0 - DELTA_EPS))
    };
    if objective(lo)? * objective(hi)? > 0.0 {
        lo = DELTA_EPS;
        hi = 1.0 - DELTA_EPS;
    }

    BisectionRootFinder::new(ROOT_TOLERANCE)?.get_root(objective, lo, hi)
}

/// Log-moneyness with call delta `delta` on a log-moneyness vol surface.
///
/// Solves `N(d1(x, σ(t, x))) − Δ = 0`. The starting bracket is the flat-vol
/// answer at the ATM vol, plus or minus `max(0.1, σ√t)`, and widens until
/// it holds a root.
pub(crate) fn log_moneyness_at_delta(
    surface: &Surface2D,
    t: f64,
    delta: f64,
) -> error::Result<f64> {
    require_positive_expiry(t)?;
    validate_open_unit(delta, "delta")?;

    let objective = |x: f64| -> error::Result<f64> {
        let vol = surface.value(t, x)?;
        Ok(norm_cdf(d1(x, vol, t)) - delta)
    };

    let sd = surface.value(t, 0.0)? * t.sqrt();
    let x0 = -sd * norm_inv(delta) + 0.5 * sd * sd;
    let width = sd.max(0.1);
    let (lo, hi) = bracket_root(
        objective,
        x0 - width,
        x0 + width,
        -LOG_MONEYNESS_LIMIT,
        LOG_MONEYNESS_LIMIT,
    )?;
    BisectionRootFinder::new(ROOT_TOLERANCE)?.get_root(objective, lo, hi)
}

/// Stateless converter between the four surface coordinates.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use volfit::curve::FlatForwardCurve;
/// use volfit::surface::{BlackVolatilitySurface, StrikeSurface, Surface2D, SurfaceConverter};
///
/// let strike = StrikeSurface::new(Surface2D::constant(0.2));
/// let forward = Arc::new(FlatForwardCurve::new(100.0)?);
/// let moneyness = SurfaceConverter::strike_to_moneyness(&strike, forward);
/// assert!((moneyness.volatility_at(1.0, 1.0)?.0 - 0.2).abs() < 1e-15);
/// # Ok::<(), volfit::VolFitError>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceConverter;

impl SurfaceConverter {
    /// Re-index a strike surface by `k / F(t)`.
    pub fn strike_to_moneyness(
        source: &StrikeSurface,
        forward: Arc<dyn ForwardCurve>,
    ) -> MoneynessSurface {
        let src = source.surface().clone();
        let fwd = Arc::clone(&forward);
        let surface = Surface2D::from_fn(move |t, m| {
            validate_positive(m, "moneyness")?;
            src.value(t, m * fwd.forward(t))
        });
        MoneynessSurface::new(surface, forward)
    }

    /// Re-index by absolute strike through the source's forward curve.
    pub fn moneyness_to_strike(source: &MoneynessSurface) -> StrikeSurface {
        let src = source.surface().clone();
        let fwd = Arc::clone(source.forward_curve());
        StrikeSurface::new(Surface2D::from_fn(move |t, k| {
            validate_positive(k, "strike")?;
            src.value(t, k / fwd.forward(t))
        }))
    }

    /// Re-index by `ln(m)`.
    pub fn moneyness_to_log_moneyness(source: &MoneynessSurface) -> LogMoneynessSurface {
        let src = source.surface().clone();
        let surface = Surface2D::from_fn(move |t, x| src.value(t, x.exp()));
        LogMoneynessSurface::new(surface, Arc::clone(source.forward_curve()))
    }

    /// Re-index by `e^x`.
    pub fn log_moneyness_to_moneyness(source: &LogMoneynessSurface) -> MoneynessSurface {
        let src = source.surface().clone();
        let surface = Surface2D::from_fn(move |t, m| {
            validate_positive(m, "moneyness")?;
            src.value(t, m.ln())
        });
        MoneynessSurface::new(surface, Arc::clone(source.forward_curve()))
    }

    /// Re-index a strike surface by `ln(k / F(t))`.
    pub fn strike_to_log_moneyness(
        source: &StrikeSurface,
        forward: Arc<dyn ForwardCurve>,
    ) -> LogMoneynessSurface {
        let src = source.surface().clone();
        let fwd = Arc::clone(&forward);
        let surface = Surface2D::from_fn(move |t, x| src.value(t, fwd.forward(t) * x.exp()));
        LogMoneynessSurface::new(surface, forward)
    }

    /// Re-index by absolute strike through the source's forward curve.
    pub fn log_moneyness_to_strike(source: &LogMoneynessSurface) -> StrikeSurface {
        let src = source.surface().clone();
        let fwd = Arc::clone(source.forward_curve());
        StrikeSurface::new(Surface2D::from_fn(move |t, k| {
            validate_positive(k, "strike")?;
            src.value(t, (k / fwd.forward(t)).ln())
        }))
    }

    /// Re-index by delta. Each query solves for the log-moneyness with that
    /// delta, then reads the source there.
    pub fn log_moneyness_to_delta(source: &LogMoneynessSurface) -> DeltaSurface {
        let src = source.surface().clone();
        let surface = Surface2D::from_fn(move |t, delta| {
            let x = log_moneyness_at_delta(&src, t, delta)?;
            src.value(t, x)
        });
        DeltaSurface::new(surface, Arc::clone(source.forward_curve()))
    }

    /// Re-index by log-moneyness. Each query solves for the delta of that
    /// log-moneyness under the source smile.
    pub fn delta_to_log_moneyness(source: &DeltaSurface) -> LogMoneynessSurface {
        let src = source.surface().clone();
        let surface = Surface2D::from_fn(move |t, x| {
            let delta = delta_at_log_moneyness(&src, t, x)?;
            src.value(t, delta)
        });
        LogMoneynessSurface::new(surface, Arc::clone(source.forward_curve()))
    }

    /// Strike to delta through log-moneyness.
    pub fn strike_to_delta(source: &StrikeSurface, forward: Arc<dyn ForwardCurve>) -> DeltaSurface {
        Self::log_moneyness_to_delta(&Self::strike_to_log_moneyness(source, forward))
    }

    /// Delta to strike through log-moneyness.
    pub fn delta_to_strike(source: &DeltaSurface) -> StrikeSurface {
        Self::log_moneyness_to_strike(&Self::delta_to_log_moneyness(source))
    }

    /// Moneyness to delta through log-moneyness.
    pub fn moneyness_to_delta(source: &MoneynessSurface) -> DeltaSurface {
        Self::log_moneyness_to_delta(&Self::moneyness_to_log_moneyness(source))
    }

    /// Delta to moneyness through log-moneyness.
    pub fn delta_to_moneyness(source: &DeltaSurface) -> MoneynessSurface {
        Self::log_moneyness_to_moneyness(&Self::delta_to_log_moneyness(source))
    }

    /// Convert any surface to the `target` coordinate.
    ///
    /// `forward` is only read when the source is a strike surface; other
    /// sources carry their own forward curve.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] when converting a strike surface
    /// to another coordinate without a forward curve.
    pub fn convert(
        source: &VolatilitySurface,
        target: StrikeKind,
        forward: Option<Arc<dyn ForwardCurve>>,
    ) -> error::Result<VolatilitySurface> {
        let converted: VolatilitySurface = match (source, target) {
            (s, t) if s.kind() == t => s.clone(),
            (VolatilitySurface::Strike(s), target) => {
                let forward = forward.ok_or_else(|| VolFitError::InvalidInput {
                    message: format!(
                        "converting a strike surface to {target} needs a forward curve"
                    ),
                })?;
                match target {
                    StrikeKind::Moneyness => Self::strike_to_moneyness(s, forward).into(),
                    StrikeKind::LogMoneyness => Self::strike_to_log_moneyness(s, forward).into(),
                    StrikeKind::Delta => Self::strike_to_delta(s, forward).into(),
                    StrikeKind::Strike => s.clone().into(),
                }
            }
            (VolatilitySurface::Moneyness(s), target) => match target {
                StrikeKind::Strike => Self::moneyness_to_strike(s).into(),
                StrikeKind::LogMoneyness => Self::moneyness_to_log_moneyness(s).into(),
                StrikeKind::Delta => Self::moneyness_to_delta(s).into(),
                StrikeKind::Moneyness => s.clone().into(),
            },
            (VolatilitySurface::LogMoneyness(s), target) => match target {
                StrikeKind::Strike => Self::log_moneyness_to_strike(s).into(),
                StrikeKind::Moneyness => Self::log_moneyness_to_moneyness(s).into(),
                StrikeKind::Delta => Self::log_moneyness_to_delta(s).into(),
                StrikeKind::LogMoneyness => s.clone().into(),
            },
            (VolatilitySurface::Delta(s), target) => match target {
                StrikeKind::Strike => Self::delta_to_strike(s).into(),
                StrikeKind::Moneyness => Self::delta_to_moneyness(s).into(),
                StrikeKind::LogMoneyness => Self::delta_to_log_moneyness(s).into(),
                StrikeKind::Delta => s.clone().into(),
            },
        };
        Ok(converted)
    }
}
