//! Calendar-spread arbitrage checks.
//!
//! Total variance must be non-decreasing in time at every fixed point of
//! the smile coordinate (delta bucket or standardized log-moneyness).

use serde::{Deserialize, Serialize};

use crate::error::VolFitError;

/// Allowed decrease before a drop in variance counts as arbitrage.
const CALENDAR_TOLERANCE: f64 = 1e-10;

/// A calendar spread arbitrage violation between two adjacent expiries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarViolation {
    /// Index of the shorter expiry.
    pub short_index: usize,
    /// Index of the longer expiry.
    pub long_index: usize,
    /// Smile coordinate where the violation occurs.
    pub coordinate: f64,
    /// Variance at shorter expiry (should be smaller).
    pub variance_short: f64,
    /// Variance at longer expiry (should be larger).
    pub variance_long: f64,
}

impl CalendarViolation {
    /// The matching [`VolFitError::ArbitrageViolation`].
    pub fn into_error(self, coordinate_name: &str) -> VolFitError {
        VolFitError::ArbitrageViolation {
            message: format!(
                "total variance falls from {} to {} at {coordinate_name} {}",
                self.variance_short, self.variance_long, self.coordinate
            ),
            short_index: self.short_index,
            long_index: self.long_index,
        }
    }
}

/// First point where variance decreases between adjacent expiries.
///
/// `variances[i][j]` is the total variance of expiry `i` at `coordinates[j]`.
pub fn first_calendar_violation(
    variances: &[Vec<f64>],
    coordinates: &[f64],
) -> Option<CalendarViolation> {
    variances.windows(2).enumerate().find_map(|(i, pair)| {
        pair[0]
            .iter()
            .zip(&pair[1])
            .zip(coordinates)
            .find(|((w_short, w_long), _)| **w_long < **w_short - CALENDAR_TOLERANCE)
            .map(|((w_short, w_long), c)| CalendarViolation {
                short_index: i,
                long_index: i + 1,
                coordinate: *c,
                variance_short: *w_short,
                variance_long: *w_long,
            })
    })
}

/// `true` if `values` never decreases by more than the calendar tolerance.
pub(crate) fn is_non_decreasing(values: &[f64]) -> bool {
    values
        .windows(2)
        .all(|w| w[1] >= w[0] - CALENDAR_TOLERANCE)
}
