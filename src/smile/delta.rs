//! Delta-quoted smiles.
//!
//! FX-style markets quote a smile as an at-the-money vol plus, for each
//! delta bucket `Δᵢ < 0.5`, a risk reversal and a strangle:
//!
//! ```text
//! σ_call(Δᵢ) = σ_atm + BFᵢ + RRᵢ/2
//! σ_put(Δᵢ)  = σ_atm + BFᵢ − RRᵢ/2
//! ```
//!
//! Volatilities are laid out in increasing strike order: puts from the
//! smallest delta, the ATM delta-neutral point, calls back to the smallest
//! delta.

use serde::{Deserialize, Serialize};

use crate::black;
use crate::error::{self, VolFitError};
use crate::optim::{BisectionRootFinder, bracket_root};
use crate::smile::SmileSection;
use crate::validate::{validate_open_unit, validate_positive, validate_same_len};

const DELTA_TOLERANCE: f64 = 1e-8;
const LOG_MONEYNESS_LIMIT: f64 = 50.0;

/// One expiry's delta-quoted smile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmileDeltaParameters {
    expiry: f64,
    deltas: Vec<f64>,
    atm: f64,
    risk_reversals: Vec<f64>,
    strangles: Vec<f64>,
}

impl SmileDeltaParameters {
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the expiry is not positive,
    /// the deltas are not strictly increasing inside (0, 0.5), the quote
    /// vectors differ in length, or any implied vol is non-positive.
    pub fn new(
        expiry: f64,
        deltas: Vec<f64>,
        atm: f64,
        risk_reversals: Vec<f64>,
        strangles: Vec<f64>,
    ) -> error::Result<Self> {
        validate_positive(expiry, "expiry")?;
        validate_positive(atm, "atm vol")?;
        validate_same_len(deltas.len(), risk_reversals.len(), "deltas", "risk_reversals")?;
        validate_same_len(deltas.len(), strangles.len(), "deltas", "strangles")?;
        for (i, d) in deltas.iter().enumerate() {
            if !(*d > 0.0 && *d < 0.5) {
                return Err(VolFitError::InvalidInput {
                    message: format!("bucket delta must be in (0, 0.5), got {d}"),
                });
            }
            if i > 0 && *d <= deltas[i - 1] {
                return Err(VolFitError::InvalidInput {
                    message: "bucket deltas must be strictly increasing".into(),
                });
            }
        }
        let smile = Self {
            expiry,
            deltas,
            atm,
            risk_reversals,
            strangles,
        };
        for v in smile.volatilities() {
            validate_positive(v, "quoted vol")?;
        }
        Ok(smile)
    }

    /// Time to expiry.
    pub fn expiry(&self) -> f64 {
        self.expiry
    }

    /// Bucket deltas.
    pub fn deltas(&self) -> &[f64] {
        &self.deltas
    }

    /// At-the-money vol.
    pub fn atm(&self) -> f64 {
        self.atm
    }

    /// Number of quoted points, `2n + 1`.
    pub fn len(&self) -> usize {
        2 * self.deltas.len() + 1
    }

    /// Always false: the ATM point is always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Vols in increasing strike order.
    pub fn volatilities(&self) -> Vec<f64> {
        let n = self.deltas.len();
        let mut vols = vec![self.atm; 2 * n + 1];
        for i in 0..n {
            let wing = self.atm + self.strangles[i];
            let half_rr = 0.5 * self.risk_reversals[i];
            vols[i] = wing - half_rr;
            vols[2 * n - i] = wing + half_rr;
        }
        vols
    }

    /// Call deltas matching [`volatilities`](Self::volatilities): put deltas
    /// `Δ` map to call deltas `1 − Δ`, the ATM point to 0.5.
    pub fn call_deltas(&self) -> Vec<f64> {
        let n = self.deltas.len();
        let mut out = vec![0.5; 2 * n + 1];
        for (i, d) in self.deltas.iter().enumerate() {
            out[i] = 1.0 - d;
            out[2 * n - i] = *d;
        }
        out
    }

    /// Strikes matching [`volatilities`](Self::volatilities) for the given
    /// forward. The ATM strike is delta-neutral, `F·exp(σ²t/2)`.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if `forward` is not positive.
    pub fn strikes(&self, forward: f64) -> error::Result<Vec<f64>> {
        validate_positive(forward, "forward")?;
        Ok(self
            .call_deltas()
            .into_iter()
            .zip(self.volatilities())
            .map(|(d, v)| black::strike_for_delta(forward, d, v, self.expiry))
            .collect())
    }
}

/// Strike at which `smile` has forward delta `delta`.
///
/// Pass a call delta in (0, 1) with `is_call`, or a put delta in (−1, 0)
/// otherwise. Solves `N(d1(x, σ(F·eˣ))) = Δc` for the log-moneyness `x` by
/// bisection; the starting bracket comes from the ATM vol and widens until
/// it holds a root.
///
/// # Errors
/// - [`VolFitError::InvalidInput`] for a delta outside its range.
/// - [`VolFitError::RootNotFound`] if no strike within `F·e^{±50}` matches.
/// - Errors from the smile propagate.
pub fn strike_for_delta<S: SmileSection + ?Sized>(
    smile: &S,
    delta: f64,
    is_call: bool,
) -> error::Result<f64> {
    let call_delta = if is_call { delta } else { 1.0 + delta };
    validate_open_unit(call_delta, "call delta")?;

    let forward = smile.forward();
    let expiry = smile.expiry();
    let sd = smile.vol(forward)?.0 * expiry.sqrt();
    let x0 = -sd * black::norm_inv(call_delta) + 0.5 * sd * sd;
    let width = sd.max(0.1);

    let objective = |x: f64| -> error::Result<f64> {
        let vol = smile.vol(forward * x.exp())?.0;
        Ok(black::norm_cdf(black::d1(x, vol, expiry)) - call_delta)
    };
    let (lo, hi) = bracket_root(
        objective,
        x0 - width,
        x0 + width,
        -LOG_MONEYNESS_LIMIT,
        LOG_MONEYNESS_LIMIT,
    )?;
    let x = BisectionRootFinder::new(DELTA_TOLERANCE)?.get_root(objective, lo, hi)?;
    Ok(forward * x.exp())
}
