//! Option quotes across expiries, as consumed by the surface fitters.

use serde::{Deserialize, Serialize};

use crate::curve::InterpolatedForwardCurve;
use crate::error::{self, VolFitError};
use crate::validate::{validate_increasing, validate_positive, validate_same_len};

/// Implied-vol quotes by expiry: one forward and a ragged strike grid per
/// expiry, with per-quote errors used as least-squares weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMarketData {
    expiries: Vec<f64>,
    forwards: Vec<f64>,
    strikes: Vec<Vec<f64>>,
    vols: Vec<Vec<f64>>,
    errors: Vec<Vec<f64>>,
}

impl SurfaceMarketData {
    /// Quotes with unit errors.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if there are no expiries, the
    /// outer lengths differ, expiries are not strictly increasing and
    /// positive, or any expiry has no quotes, mismatched strike/vol lengths,
    /// or non-positive values.
    pub fn new(
        expiries: Vec<f64>,
        forwards: Vec<f64>,
        strikes: Vec<Vec<f64>>,
        vols: Vec<Vec<f64>>,
    ) -> error::Result<Self> {
        if expiries.is_empty() {
            return Err(VolFitError::InvalidInput {
                message: "at least one expiry is required".into(),
            });
        }
        validate_same_len(expiries.len(), forwards.len(), "expiries", "forwards")?;
        validate_same_len(expiries.len(), strikes.len(), "expiries", "strikes")?;
        validate_same_len(expiries.len(), vols.len(), "expiries", "vols")?;
        validate_increasing(&expiries, "expiries")?;
        validate_positive(expiries[0], "expiry")?;

        for (i, (ks, vs)) in strikes.iter().zip(&vols).enumerate() {
            validate_positive(forwards[i], "forward")?;
            if ks.is_empty() {
                return Err(VolFitError::InvalidInput {
                    message: format!("expiry {} has no quotes", expiries[i]),
                });
            }
            validate_same_len(ks.len(), vs.len(), "strikes", "vols")?;
            for (k, v) in ks.iter().zip(vs) {
                validate_positive(*k, "strike")?;
                validate_positive(*v, "vol")?;
            }
        }

        let errors = strikes.iter().map(|ks| vec![1.0; ks.len()]).collect();
        Ok(Self {
            expiries,
            forwards,
            strikes,
            vols,
            errors,
        })
    }

    /// Replace the unit errors.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the shape differs from the
    /// quotes or any error is non-positive.
    pub fn with_errors(mut self, errors: Vec<Vec<f64>>) -> error::Result<Self> {
        validate_same_len(self.expiries.len(), errors.len(), "expiries", "errors")?;
        for (ks, es) in self.strikes.iter().zip(&errors) {
            validate_same_len(ks.len(), es.len(), "strikes", "errors")?;
            for e in es {
                validate_positive(*e, "error")?;
            }
        }
        self.errors = errors;
        Ok(self)
    }

    /// Expiries in increasing order.
    pub fn expiries(&self) -> &[f64] {
        &self.expiries
    }

    /// Forward at each expiry.
    pub fn forwards(&self) -> &[f64] {
        &self.forwards
    }

    /// Quoted strikes, one row per expiry.
    pub fn strikes(&self) -> &[Vec<f64>] {
        &self.strikes
    }

    /// Quoted implied vols, same layout as [`strikes`](Self::strikes).
    pub fn vols(&self) -> &[Vec<f64>] {
        &self.vols
    }

    /// Quote errors used as least-squares weights.
    pub fn errors(&self) -> &[Vec<f64>] {
        &self.errors
    }

    /// Number of expiries.
    pub fn n_expiries(&self) -> usize {
        self.expiries.len()
    }

    /// Total number of quotes across expiries.
    pub fn n_quotes(&self) -> usize {
        self.strikes.iter().map(Vec::len).sum()
    }

    /// All vols in expiry-major order.
    pub fn flattened_vols(&self) -> Vec<f64> {
        self.vols.iter().flatten().copied().collect()
    }

    /// All errors in expiry-major order.
    pub fn flattened_errors(&self) -> Vec<f64> {
        self.errors.iter().flatten().copied().collect()
    }

    /// Forward curve through the quoted forwards.
    ///
    /// # Errors
    /// Never fails for validated data; the constructor's checks are re-run.
    pub fn forward_curve(&self) -> error::Result<InterpolatedForwardCurve> {
        InterpolatedForwardCurve::new(self.expiries.clone(), self.forwards.clone())
    }

    /// Copy with `shift` added to one vol.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] for out-of-range indices or a
    /// shift that makes the vol non-positive.
    pub fn with_shifted_vol(
        &self,
        expiry_index: usize,
        strike_index: usize,
        shift: f64,
    ) -> error::Result<Self> {
        let vol = self
            .vols
            .get(expiry_index)
            .and_then(|vs| vs.get(strike_index))
            .ok_or_else(|| VolFitError::InvalidInput {
                message: format!("no quote at expiry {expiry_index}, strike {strike_index}"),
            })?;
        validate_positive(vol + shift, "shifted vol")?;
        let mut out = self.clone();
        out.vols[expiry_index][strike_index] += shift;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SurfaceMarketData {
        SurfaceMarketData::new(
            vec![0.5, 1.0],
            vec![100.0, 101.0],
            vec![vec![90.0, 100.0, 110.0], vec![85.0, 100.0]],
            vec![vec![0.22, 0.2, 0.21], vec![0.23, 0.2]],
        )
        .unwrap()
    }

    #[test]
    fn shape_and_flattening() {
        let d = sample();
        assert_eq!(d.n_expiries(), 2);
        assert_eq!(d.n_quotes(), 5);
        assert_eq!(d.flattened_vols(), vec![0.22, 0.2, 0.21, 0.23, 0.2]);
        assert_eq!(d.flattened_errors(), vec![1.0; 5]);
    }

    #[test]
    fn validation() {
        assert!(SurfaceMarketData::new(vec![], vec![], vec![], vec![]).is_err());
        assert!(
            SurfaceMarketData::new(
                vec![1.0, 0.5],
                vec![1.0; 2],
                vec![vec![1.0]; 2],
                vec![vec![0.2]; 2]
            )
            .is_err()
        );
        assert!(
            SurfaceMarketData::new(vec![0.5], vec![100.0], vec![vec![90.0, 100.0]], vec![vec![0.2]])
                .is_err()
        );
        assert!(
            SurfaceMarketData::new(vec![0.5], vec![100.0], vec![vec![]], vec![vec![]]).is_err()
        );
        assert!(sample().with_errors(vec![vec![0.01; 3]]).is_err());
        assert!(sample().with_errors(vec![vec![0.01; 3], vec![0.0; 2]]).is_err());
        assert!(sample().with_errors(vec![vec![0.01; 3], vec![0.02; 2]]).is_ok());
    }

    #[test]
    fn shifted_copy() {
        let d = sample();
        let s = d.with_shifted_vol(1, 0, 0.01).unwrap();
        assert!((s.vols()[1][0] - 0.24).abs() < 1e-15);
        assert_eq!(d.vols()[1][0], 0.23);
        assert!(d.with_shifted_vol(2, 0, 0.01).is_err());
        assert!(d.with_shifted_vol(0, 0, -1.0).is_err());
    }
}
