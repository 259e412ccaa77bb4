//! Multi-tenor volatility surfaces.
//!
//! A surface maps (expiry, coordinate) → implied vol, where the coordinate is
//! one of the four [`StrikeKind`](crate::coordinate::StrikeKind)s. This module
//! provides:
//!
//! - [`Surface2D`]: the lazily evaluated `(t, x) → value` function every
//!   surface wraps
//! - [`StrikeSurface`], [`MoneynessSurface`], [`LogMoneynessSurface`],
//!   [`DeltaSurface`]: implied vol in each coordinate, closed under the
//!   [`VolatilitySurface`] sum type
//! - [`SurfaceConverter`]: re-expresses a surface in another coordinate
//! - [`PriceSurface`]: call prices, for the price form of Dupire
//! - [`PiecewiseSabrSurfaceFitter`]: per-expiry SABR smiles joined across
//!   expiries
//! - [`VolatilitySurfaceFitter`] and [`SabrSurfaceFitter`]: one joint fit of
//!   a parameter term structure to every quote

pub mod arbitrage;
pub mod converter;
pub mod fitter;
pub mod function;
pub mod market;
pub mod piecewise;
pub mod price;
pub mod volatility;

pub use arbitrage::{CalendarViolation, first_calendar_violation};
pub use converter::SurfaceConverter;
pub use fitter::{
    ParameterCurveSpec, SabrKnots, SabrSurfaceFitter, SurfaceFitResult, VolatilitySurfaceFitter,
};
pub use function::Surface2D;
pub use market::SurfaceMarketData;
pub use piecewise::{PiecewiseSabrConfig, PiecewiseSabrSurfaceFitter};
pub use price::PriceSurface;
pub use volatility::{
    BlackVolatilitySurface, DeltaSurface, LogMoneynessSurface, MoneynessSurface, StrikeSurface,
    VolatilitySurface, VolatilitySurfaceVisitor,
};
