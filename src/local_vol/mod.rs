//! Local volatility extraction from implied volatility and price surfaces.
//!
//! Local volatility σ_loc(T, K) is the instantaneous volatility in the
//! Dupire framework. [`DupireLocalVolatilityCalculator`] derives it from an
//! implied-vol surface in strike, moneyness or log-moneyness, or directly
//! from call prices, and returns a [`LocalVolatilitySurface`] in the
//! matching coordinate.
//!
//! # References
//! - Dupire, B. "Pricing with a Smile" (1994)

pub mod dupire;

pub use dupire::DupireLocalVolatilityCalculator;

use std::sync::Arc;

use crate::curve::ForwardCurve;
use crate::error;
use crate::surface::Surface2D;
use crate::types::Vol;
use crate::validate::validate_positive;

/// Local volatility surface.
///
/// Provides σ_loc(T, S) at any expiry and underlying level.
pub trait LocalVol: Send + Sync {
    /// Local volatility at the given expiry and underlying level.
    fn local_vol(&self, expiry: f64, level: f64) -> error::Result<Vol>;
}

/// Coordinate a [`LocalVolatilitySurface`] is indexed by.
#[derive(Debug, Clone)]
pub enum LocalVolKind {
    /// Absolute underlying level.
    Strike,
    /// Level over the forward.
    Moneyness(Arc<dyn ForwardCurve>),
    /// Log of level over the forward.
    LogMoneyness(Arc<dyn ForwardCurve>),
}

/// Local vol as a function of expiry and one level coordinate.
#[derive(Debug, Clone)]
pub struct LocalVolatilitySurface {
    surface: Surface2D,
    kind: LocalVolKind,
}

impl LocalVolatilitySurface {
    /// Wrap a local-vol function in the coordinate given by `kind`.
    pub fn new(surface: Surface2D, kind: LocalVolKind) -> Self {
        Self { surface, kind }
    }

    /// The underlying `(t, x)` function.
    pub fn surface(&self) -> &Surface2D {
        &self.surface
    }

    /// Coordinate of the underlying function.
    pub fn kind(&self) -> &LocalVolKind {
        &self.kind
    }

    /// Local vol at a value of the surface's own coordinate.
    ///
    /// # Errors
    /// Propagates errors from the source surface.
    pub fn local_vol_at(&self, expiry: f64, coordinate: f64) -> error::Result<Vol> {
        Ok(Vol(self.surface.value(expiry, coordinate)?))
    }
}

impl LocalVol for LocalVolatilitySurface {
    fn local_vol(&self, expiry: f64, level: f64) -> error::Result<Vol> {
        validate_positive(level, "level")?;
        let coordinate = match &self.kind {
            LocalVolKind::Strike => level,
            LocalVolKind::Moneyness(fwd) => level / fwd.forward(expiry),
            LocalVolKind::LogMoneyness(fwd) => (level / fwd.forward(expiry)).ln(),
        };
        self.local_vol_at(expiry, coordinate)
    }
}
