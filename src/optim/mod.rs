//! Numerical solvers used by conversion and calibration.
//!
//! - [`BisectionRootFinder`] and [`bracket_root`]: one-dimensional roots for
//!   the delta inversions
//! - [`levenberg::solve`]: weighted nonlinear least squares with an analytic
//!   Jacobian
//! - [`ParameterTransform`]: bounded ↔ unbounded parameter maps

pub mod bisection;
pub mod levenberg;
pub mod transform;

pub use bisection::{bracket_root, BisectionRootFinder};
pub use levenberg::{LeastSquaresResult, LevenbergMarquardtConfig};
pub use transform::{ParameterTransform, UncoupledTransforms};
