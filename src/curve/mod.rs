//! Term structures: forward curves and interpolated parameter curves.

pub mod forward;
pub mod interpolator;
pub mod parameter;

pub use forward::{FlatForwardCurve, ForwardCurve, GrowthForwardCurve, InterpolatedForwardCurve};
pub use interpolator::{Extrapolation, InterpolatedCurve, Interpolator1D};
pub use parameter::ParameterCurve;
