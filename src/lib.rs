//! # volfit
//!
//! Volatility surfaces in several strike coordinates, Dupire local
//! volatility, and SABR surface calibration.
//!
//! Provides the pipeline: option quotes → per-expiry or joint SABR fit →
//! implied-vol surface in strike, moneyness, log-moneyness or delta →
//! local-vol surface.
//!
//! ## Architecture
//!
//! - **`coordinate`** — Tagged strike coordinates ([`StrikeCoordinate`])
//! - **`black`** — Black formulas and delta inversion
//! - **`curve`** — Forward curves and interpolated parameter curves
//! - **`optim`** — Bisection, Levenberg-Marquardt and parameter transforms
//! - **`smile`** — Single-expiry SABR smiles and delta-quoted smiles
//! - **`surface`** — Surfaces per coordinate, conversion between them, and
//!   the two SABR surface fitters
//! - **`local_vol`** — Dupire local volatility
//!
//! ## Design
//!
//! - **Newtypes for outputs, bare `f64` for inputs.** [`Vol`] and
//!   [`Variance`] wrap return values to prevent accidental mixing.
//! - **No panics.** Every fallible operation returns [`Result`]. Library code
//!   never calls `unwrap()` or `expect()`.
//! - **Immutable, lazily evaluated surfaces.** A converted or shifted surface
//!   is a new closure over its source; nothing is gridded or mutated.
//! - **Thread-safe.** All surfaces and fitters are `Send + Sync`; per-expiry
//!   fits and bump grids run on rayon with the `parallel` feature.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use volfit::coordinate::StrikeKind;
//! use volfit::curve::{FlatForwardCurve, ForwardCurve};
//! use volfit::surface::{StrikeSurface, Surface2D, SurfaceConverter, VolatilitySurface};
//!
//! let flat = VolatilitySurface::from(StrikeSurface::new(Surface2D::constant(0.2)));
//! let forward: Arc<dyn ForwardCurve> = Arc::new(FlatForwardCurve::new(100.0)?);
//! let moneyness = SurfaceConverter::convert(&flat, StrikeKind::Moneyness, Some(forward))?;
//! assert!((moneyness.volatility(1.0, 100.0)?.0 - 0.2).abs() < 1e-15);
//! # Ok::<(), volfit::VolFitError>(())
//! ```

pub mod black;
pub mod conventions;
pub mod coordinate;
pub mod curve;
pub mod error;
pub mod local_vol;
pub mod optim;
pub mod smile;
pub mod surface;
pub mod types;
mod validate;

#[doc(inline)]
pub use coordinate::{StrikeCoordinate, StrikeKind};
#[doc(inline)]
pub use error::{Result, VolFitError};
#[doc(inline)]
pub use local_vol::LocalVol;
#[doc(inline)]
pub use smile::SmileSection;
#[doc(inline)]
pub use surface::{BlackVolatilitySurface, VolatilitySurface};
#[doc(inline)]
pub use types::{OptionType, Variance, Vol};
