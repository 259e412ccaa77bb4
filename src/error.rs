//! Error types for the volfit library.
//!
//! All fallible operations return `Result<T, VolFitError>` rather than panicking.
//! Negative local variance produced by finite differencing is not an error:
//! it is clamped to zero where it occurs.

use thiserror::Error;

/// Convenience type alias for results in this crate.
pub type Result<T> = std::result::Result<T, VolFitError>;

/// Errors that can occur during surface construction, conversion and calibration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VolFitError {
    /// The least-squares solver failed to converge.
    #[error("calibration failed: {message}")]
    CalibrationError {
        message: String,
        /// Model that failed (e.g., "SABR").
        model: &'static str,
        /// Final RMS error when the solver gave up, if available.
        rms_error: Option<f64>,
    },

    /// Input data is invalid (e.g., mismatched lengths, delta outside (0, 1)).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Numerical computation failed (e.g., NaN, singular matrix).
    #[error("numerical error: {message}")]
    NumericalError { message: String },

    /// Integrated variance decreases between two expiries.
    #[error("arbitrage detected between expiries {short_index} and {long_index}: {message}")]
    ArbitrageViolation {
        message: String,
        /// Index of the shorter expiry.
        short_index: usize,
        /// Index of the longer expiry.
        long_index: usize,
    },

    /// A root could not be bracketed or located within the iteration budget.
    #[error("root not found after {iterations} iterations: {message}")]
    RootNotFound { message: String, iterations: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_error_fields_accessible() {
        let err = VolFitError::CalibrationError {
            message: "convergence failed".into(),
            model: "SABR",
            rms_error: Some(0.05),
        };
        match &err {
            VolFitError::CalibrationError {
                message,
                model,
                rms_error,
            } => {
                assert_eq!(message, "convergence failed");
                assert_eq!(*model, "SABR");
                assert_eq!(*rms_error, Some(0.05));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn arbitrage_violation_carries_indices() {
        let err = VolFitError::ArbitrageViolation {
            message: "variance decreased".into(),
            short_index: 2,
            long_index: 3,
        };
        let display = format!("{err}");
        assert!(display.contains("2"));
        assert!(display.contains("3"));
        assert!(display.contains("variance decreased"));
    }

    #[test]
    fn root_not_found_reports_iterations() {
        let err = VolFitError::RootNotFound {
            message: "no sign change".into(),
            iterations: 10_000,
        };
        assert!(format!("{err}").contains("10000"));
    }

    #[test]
    fn error_display_includes_message() {
        let err = VolFitError::InvalidInput {
            message: "bad input".into(),
        };
        assert!(format!("{err}").contains("bad input"));

        let err = VolFitError::NumericalError {
            message: "NaN detected".into(),
        };
        assert!(format!("{err}").contains("NaN detected"));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VolFitError>();
    }
}
