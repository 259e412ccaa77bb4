//! Input validation helpers.
//!
//! Standardizes validation across the crate using `!is_finite()` to reject
//! NaN, +Inf, and -Inf uniformly.

use crate::error::VolFitError;

/// Validate that a value is strictly positive and finite (rejects NaN, Inf, zero, negatives).
pub(crate) fn validate_positive(value: f64, name: &str) -> crate::error::Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(VolFitError::InvalidInput {
            message: format!("{name} must be positive and finite, got {value}"),
        });
    }
    Ok(value)
}

/// Validate that a value is non-negative and finite (rejects NaN, Inf, negatives).
pub(crate) fn validate_non_negative(value: f64, name: &str) -> crate::error::Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(VolFitError::InvalidInput {
            message: format!("{name} must be non-negative and finite, got {value}"),
        });
    }
    Ok(value)
}

/// Validate that a value is finite (rejects NaN and Inf; allows zero and negatives).
pub(crate) fn validate_finite(value: f64, name: &str) -> crate::error::Result<f64> {
    if !value.is_finite() {
        return Err(VolFitError::InvalidInput {
            message: format!("{name} must be finite, got {value}"),
        });
    }
    Ok(value)
}

/// Validate that a value lies strictly inside (0, 1), as a delta must.
pub(crate) fn validate_open_unit(value: f64, name: &str) -> crate::error::Result<f64> {
    if !(value > 0.0 && value < 1.0) {
        return Err(VolFitError::InvalidInput {
            message: format!("{name} must lie in (0, 1), got {value}"),
        });
    }
    Ok(value)
}

/// Validate that two slices have the same length.
pub(crate) fn validate_same_len(
    left: usize,
    right: usize,
    left_name: &str,
    right_name: &str,
) -> crate::error::Result<()> {
    if left != right {
        return Err(VolFitError::InvalidInput {
            message: format!(
                "{left_name} ({left}) and {right_name} ({right}) must have the same length"
            ),
        });
    }
    Ok(())
}

/// Validate that a sequence is strictly increasing and finite.
pub(crate) fn validate_increasing(values: &[f64], name: &str) -> crate::error::Result<()> {
    for v in values {
        validate_finite(*v, name)?;
    }
    for (i, w) in values.windows(2).enumerate() {
        if w[1] <= w[0] {
            return Err(VolFitError::InvalidInput {
                message: format!(
                    "{name} must be strictly increasing, but {name}[{}]={} >= {name}[{}]={}",
                    i,
                    w[0],
                    i + 1,
                    w[1]
                ),
            });
        }
    }
    Ok(())
}
