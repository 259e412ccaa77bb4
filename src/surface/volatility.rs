//! Implied-volatility surfaces in four strike coordinates.
//!
//! Each surface stores a [`Surface2D`] over `(t, x)` where `x` is the
//! surface's own coordinate (strike, moneyness, log-moneyness or call
//! delta). Non-strike surfaces carry the [`ForwardCurve`] that defines their
//! coordinate. All four answer absolute-strike queries through
//! [`BlackVolatilitySurface::volatility`].

use std::fmt;
use std::sync::Arc;

use crate::black;
use crate::coordinate::{StrikeCoordinate, StrikeKind};
use crate::curve::ForwardCurve;
use crate::error::{self, VolFitError};
use crate::surface::converter;
use crate::surface::function::{Surface2D, require_positive_expiry};
use crate::types::{Variance, Vol};
use crate::validate::{validate_open_unit, validate_positive};

/// A Black implied-volatility surface over one strike coordinate.
///
/// Surfaces are immutable; every shift returns a new surface and leaves
/// the receiver untouched.
pub trait BlackVolatilitySurface: Send + Sync + fmt::Debug {
    /// Coordinate the underlying function is expressed in.
    fn kind(&self) -> StrikeKind;

    /// The underlying `(t, x)` function.
    fn surface(&self) -> &Surface2D;

    /// Same coordinate and forward, different function.
    fn with_surface(&self, surface: Surface2D) -> Self
    where
        Self: Sized;

    /// Implied vol at an absolute strike.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] for a non-positive strike and
    /// propagates surface and root-finding errors.
    fn volatility(&self, expiry: f64, strike: f64) -> error::Result<Vol>;

    /// Absolute strike for a value of this surface's coordinate.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] for an out-of-domain value.
    fn absolute_strike(&self, expiry: f64, coordinate: f64) -> error::Result<f64>;

    /// Implied vol at a value of this surface's own coordinate.
    ///
    /// # Errors
    /// Propagates surface errors.
    fn volatility_at(&self, expiry: f64, coordinate: f64) -> error::Result<Vol> {
        Ok(Vol(self.surface().value(expiry, coordinate)?))
    }

    /// Implied vol at a tagged coordinate of the matching kind.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the tag differs from
    /// [`kind`](BlackVolatilitySurface::kind).
    fn volatility_for(&self, expiry: f64, coordinate: &StrikeCoordinate) -> error::Result<Vol> {
        if coordinate.kind() != self.kind() {
            return Err(VolFitError::InvalidInput {
                message: format!(
                    "{} coordinate passed to a {} surface",
                    coordinate.kind(),
                    self.kind()
                ),
            });
        }
        self.volatility_at(expiry, coordinate.value())
    }

    /// Total variance `σ²t` at an absolute strike.
    ///
    /// # Errors
    /// Same as [`volatility`](BlackVolatilitySurface::volatility).
    fn black_variance(&self, expiry: f64, strike: f64) -> error::Result<Variance> {
        let v = self.volatility(expiry, strike)?.0;
        Ok(Variance(v * v * expiry))
    }

    /// Add `shift` everywhere.
    fn with_parallel_shift(&self, shift: f64) -> Self
    where
        Self: Sized,
    {
        self.with_surface(self.surface().with_parallel_shift(shift))
    }

    /// Add `shift` at one `(t, x)` point.
    fn with_single_additive_shift(&self, expiry: f64, coordinate: f64, shift: f64) -> Self
    where
        Self: Sized,
    {
        let surface = self
            .surface()
            .with_additive_point_shifts(&[expiry], &[coordinate], &[shift]);
        // Single-point vectors always have equal lengths.
        self.with_surface(surface.unwrap_or_else(|_| self.surface().clone()))
    }

    /// Add `shifts[i]` at each `(ts[i], xs[i])`.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the vectors differ in length.
    fn with_multiple_additive_shifts(
        &self,
        expiries: &[f64],
        coordinates: &[f64],
        shifts: &[f64],
    ) -> error::Result<Self>
    where
        Self: Sized,
    {
        Ok(self.with_surface(self.surface().with_additive_point_shifts(
            expiries,
            coordinates,
            shifts,
        )?))
    }

    /// Multiply by `factor` everywhere.
    fn with_constant_multiplicative_shift(&self, factor: f64) -> Self
    where
        Self: Sized,
    {
        self.with_surface(self.surface().with_constant_multiplicative_shift(factor))
    }

    /// Multiply by `factor` at one `(t, x)` point.
    fn with_single_multiplicative_shift(&self, expiry: f64, coordinate: f64, factor: f64) -> Self
    where
        Self: Sized,
    {
        let surface = self
            .surface()
            .with_multiplicative_point_shifts(&[expiry], &[coordinate], &[factor]);
        self.with_surface(surface.unwrap_or_else(|_| self.surface().clone()))
    }

    /// Multiply by `factors[i]` at each `(ts[i], xs[i])`.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the vectors differ in length.
    fn with_multiple_multiplicative_shifts(
        &self,
        expiries: &[f64],
        coordinates: &[f64],
        factors: &[f64],
    ) -> error::Result<Self>
    where
        Self: Sized,
    {
        Ok(self.with_surface(self.surface().with_multiplicative_point_shifts(
            expiries,
            coordinates,
            factors,
        )?))
    }
}

/// Implied vol indexed by absolute strike.
///
/// # Examples
/// ```
/// use volfit::surface::{BlackVolatilitySurface, StrikeSurface, Surface2D};
///
/// let surface = StrikeSurface::new(Surface2D::constant(0.2));
/// assert_eq!(surface.volatility(1.0, 100.0)?.0, 0.2);
/// # Ok::<(), volfit::VolFitError>(())
/// ```
#[derive(Debug, Clone)]
pub struct StrikeSurface {
    surface: Surface2D,
}

impl StrikeSurface {
    /// Wrap a `(t, k)` function.
    pub fn new(surface: Surface2D) -> Self {
        Self { surface }
    }
}

impl BlackVolatilitySurface for StrikeSurface {
    fn kind(&self) -> StrikeKind {
        StrikeKind::Strike
    }

    fn surface(&self) -> &Surface2D {
        &self.surface
    }

    fn with_surface(&self, surface: Surface2D) -> Self {
        Self { surface }
    }

    fn volatility(&self, expiry: f64, strike: f64) -> error::Result<Vol> {
        validate_positive(strike, "strike")?;
        self.volatility_at(expiry, strike)
    }

    fn absolute_strike(&self, _expiry: f64, coordinate: f64) -> error::Result<f64> {
        validate_positive(coordinate, "strike")
    }
}

/// Implied vol indexed by moneyness `k / F(t)`.
#[derive(Debug, Clone)]
pub struct MoneynessSurface {
    surface: Surface2D,
    forward: Arc<dyn ForwardCurve>,
}

impl MoneynessSurface {
    /// Wrap a `(t, x)` function whose coordinate is defined by `forward`.
    pub fn new(surface: Surface2D, forward: Arc<dyn ForwardCurve>) -> Self {
        Self { surface, forward }
    }

    /// Forward curve defining the coordinate.
    pub fn forward_curve(&self) -> &Arc<dyn ForwardCurve> {
        &self.forward
    }
}

impl BlackVolatilitySurface for MoneynessSurface {
    fn kind(&self) -> StrikeKind {
        StrikeKind::Moneyness
    }

    fn surface(&self) -> &Surface2D {
        &self.surface
    }

    fn with_surface(&self, surface: Surface2D) -> Self {
        Self {
            surface,
            forward: Arc::clone(&self.forward),
        }
    }

    fn volatility(&self, expiry: f64, strike: f64) -> error::Result<Vol> {
        validate_positive(strike, "strike")?;
        self.volatility_at(expiry, strike / self.forward.forward(expiry))
    }

    fn absolute_strike(&self, expiry: f64, coordinate: f64) -> error::Result<f64> {
        validate_positive(coordinate, "moneyness")?;
        Ok(coordinate * self.forward.forward(expiry))
    }
}

/// Implied vol indexed by log-moneyness `ln(k / F(t))`.
#[derive(Debug, Clone)]
pub struct LogMoneynessSurface {
    surface: Surface2D,
    forward: Arc<dyn ForwardCurve>,
}

impl LogMoneynessSurface {
    /// Wrap a `(t, x)` function whose coordinate is defined by `forward`.
    pub fn new(surface: Surface2D, forward: Arc<dyn ForwardCurve>) -> Self {
        Self { surface, forward }
    }

    /// Forward curve defining the coordinate.
    pub fn forward_curve(&self) -> &Arc<dyn ForwardCurve> {
        &self.forward
    }
}

impl BlackVolatilitySurface for LogMoneynessSurface {
    fn kind(&self) -> StrikeKind {
        StrikeKind::LogMoneyness
    }

    fn surface(&self) -> &Surface2D {
        &self.surface
    }

    fn with_surface(&self, surface: Surface2D) -> Self {
        Self {
            surface,
            forward: Arc::clone(&self.forward),
        }
    }

    fn volatility(&self, expiry: f64, strike: f64) -> error::Result<Vol> {
        validate_positive(strike, "strike")?;
        self.volatility_at(expiry, (strike / self.forward.forward(expiry)).ln())
    }

    fn absolute_strike(&self, expiry: f64, coordinate: f64) -> error::Result<f64> {
        if !coordinate.is_finite() {
            return Err(VolFitError::InvalidInput {
                message: format!("log-moneyness must be finite, got {coordinate}"),
            });
        }
        Ok(self.forward.forward(expiry) * coordinate.exp())
    }
}

/// Implied vol indexed by forward call delta `N(d1)`.
///
/// Strike queries solve for the delta of the strike under the surface's own
/// smile, so every call to [`volatility`](BlackVolatilitySurface::volatility)
/// runs a bisection.
#[derive(Debug, Clone)]
pub struct DeltaSurface {
    surface: Surface2D,
    forward: Arc<dyn ForwardCurve>,
}

impl DeltaSurface {
    /// Wrap a `(t, x)` function whose coordinate is defined by `forward`.
    pub fn new(surface: Surface2D, forward: Arc<dyn ForwardCurve>) -> Self {
        Self { surface, forward }
    }

    /// Forward curve defining the coordinate.
    pub fn forward_curve(&self) -> &Arc<dyn ForwardCurve> {
        &self.forward
    }
}

impl BlackVolatilitySurface for DeltaSurface {
    fn kind(&self) -> StrikeKind {
        StrikeKind::Delta
    }

    fn surface(&self) -> &Surface2D {
        &self.surface
    }

    fn with_surface(&self, surface: Surface2D) -> Self {
        Self {
            surface,
            forward: Arc::clone(&self.forward),
        }
    }

    fn volatility(&self, expiry: f64, strike: f64) -> error::Result<Vol> {
        validate_positive(strike, "strike")?;
        let x = (strike / self.forward.forward(expiry)).ln();
        let delta = converter::delta_at_log_moneyness(&self.surface, expiry, x)?;
        self.volatility_at(expiry, delta)
    }

    fn absolute_strike(&self, expiry: f64, coordinate: f64) -> error::Result<f64> {
        validate_open_unit(coordinate, "delta")?;
        require_positive_expiry(expiry)?;
        let vol = self.surface.value(expiry, coordinate)?;
        Ok(black::strike_for_delta(
            self.forward.forward(expiry),
            coordinate,
            vol,
            expiry,
        ))
    }
}

/// Dispatch over the four coordinate surfaces.
pub trait VolatilitySurfaceVisitor {
    type Output;

    fn visit_strike(&mut self, surface: &StrikeSurface) -> Self::Output;
    fn visit_moneyness(&mut self, surface: &MoneynessSurface) -> Self::Output;
    fn visit_log_moneyness(&mut self, surface: &LogMoneynessSurface) -> Self::Output;
    fn visit_delta(&mut self, surface: &DeltaSurface) -> Self::Output;
}

/// Any of the four coordinate surfaces.
#[derive(Debug, Clone)]
pub enum VolatilitySurface {
    Strike(StrikeSurface),
    Moneyness(MoneynessSurface),
    LogMoneyness(LogMoneynessSurface),
    Delta(DeltaSurface),
}

impl VolatilitySurface {
    /// The wrapped surface as a trait object.
    pub fn as_black_surface(&self) -> &dyn BlackVolatilitySurface {
        match self {
            Self::Strike(s) => s,
            Self::Moneyness(s) => s,
            Self::LogMoneyness(s) => s,
            Self::Delta(s) => s,
        }
    }

    /// Coordinate of the wrapped surface.
    pub fn kind(&self) -> StrikeKind {
        self.as_black_surface().kind()
    }

    /// Implied vol at an absolute strike.
    ///
    /// # Errors
    /// See [`BlackVolatilitySurface::volatility`].
    pub fn volatility(&self, expiry: f64, strike: f64) -> error::Result<Vol> {
        self.as_black_surface().volatility(expiry, strike)
    }

    /// Implied vol at a tagged coordinate.
    ///
    /// # Errors
    /// See [`BlackVolatilitySurface::volatility_for`].
    pub fn volatility_for(&self, expiry: f64, coordinate: &StrikeCoordinate) -> error::Result<Vol> {
        self.as_black_surface().volatility_for(expiry, coordinate)
    }

    /// Forward curve of a non-strike surface.
    pub fn forward_curve(&self) -> Option<&Arc<dyn ForwardCurve>> {
        match self {
            Self::Strike(_) => None,
            Self::Moneyness(s) => Some(s.forward_curve()),
            Self::LogMoneyness(s) => Some(s.forward_curve()),
            Self::Delta(s) => Some(s.forward_curve()),
        }
    }

    /// Call the visitor method matching the wrapped surface.
    pub fn accept<V: VolatilitySurfaceVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Self::Strike(s) => visitor.visit_strike(s),
            Self::Moneyness(s) => visitor.visit_moneyness(s),
            Self::LogMoneyness(s) => visitor.visit_log_moneyness(s),
            Self::Delta(s) => visitor.visit_delta(s),
        }
    }
}

impl From<StrikeSurface> for VolatilitySurface {
    fn from(s: StrikeSurface) -> Self {
        Self::Strike(s)
    }
}

impl From<MoneynessSurface> for VolatilitySurface {
    fn from(s: MoneynessSurface) -> Self {
        Self::Moneyness(s)
    }
}

impl From<LogMoneynessSurface> for VolatilitySurface {
    fn from(s: LogMoneynessSurface) -> Self {
        Self::LogMoneyness(s)
    }
}

impl From<DeltaSurface> for VolatilitySurface {
    fn from(s: DeltaSurface) -> Self {
        Self::Delta(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::FlatForwardCurve;
    use approx::assert_abs_diff_eq;

    fn flat_forward() -> Arc<dyn ForwardCurve> {
        Arc::new(FlatForwardCurve::new(100.0).unwrap())
    }

    fn skewed() -> Surface2D {
        Surface2D::from_infallible(|_, x| 0.2 - 0.1 * x)
    }

    #[test]
    fn strike_queries_map_through_forward() {
        let m = MoneynessSurface::new(Surface2D::from_infallible(|_, m| m), flat_forward());
        assert_abs_diff_eq!(m.volatility(1.0, 110.0).unwrap().0, 1.1, epsilon = 1e-15);
        assert_abs_diff_eq!(m.absolute_strike(1.0, 1.1).unwrap(), 110.0, epsilon = 1e-12);

        let x = LogMoneynessSurface::new(skewed(), flat_forward());
        let k = 120.0;
        let expected = 0.2 - 0.1 * (1.2_f64).ln();
        assert_abs_diff_eq!(x.volatility(1.0, k).unwrap().0, expected, epsilon = 1e-15);
        assert_abs_diff_eq!(x.absolute_strike(1.0, 0.0).unwrap(), 100.0, epsilon = 1e-12);
    }

    #[test]
    fn strike_must_be_positive() {
        let s = StrikeSurface::new(Surface2D::constant(0.2));
        assert!(s.volatility(1.0, 0.0).is_err());
        assert!(s.absolute_strike(1.0, -1.0).is_err());
    }

    #[test]
    fn delta_surface_flat_vol() {
        let d = DeltaSurface::new(Surface2D::constant(0.25), flat_forward());
        let k = d.absolute_strike(0.5, 0.25).unwrap();
        let delta = black::forward_delta(100.0, k, 0.25, 0.5, crate::types::OptionType::Call);
        assert_abs_diff_eq!(delta, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(d.volatility(0.5, 105.0).unwrap().0, 0.25, epsilon = 1e-15);
        assert!(d.absolute_strike(0.5, 1.0).is_err());
        assert!(d.absolute_strike(0.0, 0.5).is_err());
    }

    #[test]
    fn delta_surface_skewed_strike_query() {
        // Vol depends on delta; the strike query must land on the consistent delta.
        let d = DeltaSurface::new(
            Surface2D::from_infallible(|_, delta| 0.2 + 0.1 * (delta - 0.5)),
            flat_forward(),
        );
        let t = 1.0;
        let k = d.absolute_strike(t, 0.3).unwrap();
        assert_abs_diff_eq!(d.volatility(t, k).unwrap().0, 0.18, epsilon = 1e-6);
    }

    #[test]
    fn tagged_lookup_checks_kind() {
        let s = StrikeSurface::new(Surface2D::constant(0.2));
        let ok = StrikeCoordinate::new(StrikeKind::Strike, 90.0).unwrap();
        let bad = StrikeCoordinate::new(StrikeKind::Delta, 0.5).unwrap();
        assert_eq!(s.volatility_for(1.0, &ok).unwrap().0, 0.2);
        assert!(s.volatility_for(1.0, &bad).is_err());
    }

    #[test]
    fn shifts_return_new_surfaces() {
        let s = StrikeSurface::new(Surface2D::constant(0.2));
        let up = s.with_parallel_shift(0.01);
        let point = s.with_single_additive_shift(1.0, 100.0, 0.05);
        let scaled = s.with_constant_multiplicative_shift(1.5);
        let point_scaled = s.with_single_multiplicative_shift(1.0, 100.0, 2.0);
        assert_eq!(s.volatility(1.0, 100.0).unwrap().0, 0.2);
        assert_abs_diff_eq!(up.volatility(1.0, 100.0).unwrap().0, 0.21, epsilon = 1e-15);
        assert_abs_diff_eq!(point.volatility(1.0, 100.0).unwrap().0, 0.25, epsilon = 1e-15);
        assert_eq!(point.volatility(1.0, 101.0).unwrap().0, 0.2);
        assert_abs_diff_eq!(scaled.volatility(2.0, 50.0).unwrap().0, 0.3, epsilon = 1e-15);
        assert_abs_diff_eq!(point_scaled.volatility(1.0, 100.0).unwrap().0, 0.4, epsilon = 1e-15);

        let multi = s
            .with_multiple_additive_shifts(&[1.0, 2.0], &[100.0, 100.0], &[0.01, 0.02])
            .unwrap();
        assert_abs_diff_eq!(multi.volatility(2.0, 100.0).unwrap().0, 0.22, epsilon = 1e-15);
        assert!(s.with_multiple_multiplicative_shifts(&[1.0], &[], &[2.0]).is_err());
    }

    #[test]
    fn shifted_surface_keeps_forward() {
        let m = MoneynessSurface::new(Surface2D::constant(0.2), flat_forward());
        let up = m.with_parallel_shift(0.1);
        assert_eq!(up.forward_curve().forward(1.0), 100.0);
        assert_eq!(up.kind(), StrikeKind::Moneyness);
    }

    struct KindName;

    impl VolatilitySurfaceVisitor for KindName {
        type Output = &'static str;
        fn visit_strike(&mut self, _: &StrikeSurface) -> &'static str {
            "strike"
        }
        fn visit_moneyness(&mut self, _: &MoneynessSurface) -> &'static str {
            "moneyness"
        }
        fn visit_log_moneyness(&mut self, _: &LogMoneynessSurface) -> &'static str {
            "log-moneyness"
        }
        fn visit_delta(&mut self, _: &DeltaSurface) -> &'static str {
            "delta"
        }
    }

    #[test]
    fn visitor_dispatch() {
        let surfaces: Vec<VolatilitySurface> = vec![
            StrikeSurface::new(Surface2D::constant(0.2)).into(),
            MoneynessSurface::new(Surface2D::constant(0.2), flat_forward()).into(),
            LogMoneynessSurface::new(Surface2D::constant(0.2), flat_forward()).into(),
            DeltaSurface::new(Surface2D::constant(0.2), flat_forward()).into(),
        ];
        for s in &surfaces {
            assert_eq!(s.accept(&mut KindName), s.kind().to_string());
        }
        assert!(surfaces[0].forward_curve().is_none());
        assert!(surfaces[3].forward_curve().is_some());
    }
}
