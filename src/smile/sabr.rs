//! SABR (Stochastic Alpha Beta Rho) smile model.
//!
//! SABR models the forward price as a CEV process with stochastic volatility:
//!
//! ```text
//! dF = σ · F^β · dW₁
//! dσ = ν · σ · dW₂
//! dW₁·dW₂ = ρ dt
//! ```
//!
//! The Hagan formula provides a closed-form approximation for Black implied
//! volatility as a function of strike:
//!
//! ```text
//! σ_B(K) = α / S₁ · z/χ(z) · S₂
//! S_K = (F·K)^((1−β)/2)
//! z   = ν/α · S_K · ln(F/K)
//! S₁  = S_K · (1 + (1−β)²/24 · ln²(F/K) + (1−β)⁴/1920 · ln⁴(F/K))
//! S₂  = 1 + t · ((1−β)²α²/(24 S_K²) + ρβνα/(4 S_K) + (2 − 3ρ²)ν²/24)
//! χ(z) = ln((√(1 − 2ρz + z²) + z − ρ) / (1 − ρ))
//! ```
//!
//! [`hagan_volatility_adjoint`] differentiates the same expression by a
//! backward sweep, giving exact parameter sensitivities for calibration.
//!
//! # References
//! - Hagan, P. et al. "Managing Smile Risk" (2002)

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{self, VolFitError};
use crate::optim::levenberg::{self, LevenbergMarquardtConfig};
use crate::optim::{ParameterTransform, UncoupledTransforms};
use crate::smile::{SmileModel, SmileSection};
use crate::types::Vol;
use crate::validate::{validate_non_negative, validate_positive, validate_same_len};

/// Strikes below `forward · CUTOFF_MONEYNESS` are floored to that level.
const CUTOFF_MONEYNESS: f64 = 1e-12;
/// Below this `|z|` the ratio `z/χ(z)` uses its second-order expansion.
const SMALL_Z: f64 = 1e-6;
/// Below this `z` the square-root argument is evaluated asymptotically.
const LARGE_NEG_Z: f64 = -1e6;
/// `ρ` is kept this far inside `[−1, 1]`.
const RHO_EPS: f64 = 1e-12;
const ATM_EPS: f64 = 1e-7;

/// Parameter names in vector order.
pub const SABR_PARAMETER_NAMES: [&str; 4] = ["alpha", "beta", "rho", "nu"];

/// The four SABR parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SabrParameters {
    /// Vol level α > 0.
    pub alpha: f64,
    /// CEV exponent β ∈ \[0, 2\].
    pub beta: f64,
    /// Spot-vol correlation ρ ∈ \[−1, 1\].
    pub rho: f64,
    /// Vol-of-vol ν ≥ 0.
    pub nu: f64,
}

impl SabrParameters {
    /// Create a validated parameter set.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if any parameter is out of range.
    pub fn new(alpha: f64, beta: f64, rho: f64, nu: f64) -> error::Result<Self> {
        validate_positive(alpha, "alpha")?;
        if !(0.0..=2.0).contains(&beta) {
            return Err(VolFitError::InvalidInput {
                message: format!("beta must be in [0, 2], got {beta}"),
            });
        }
        if !(-1.0..=1.0).contains(&rho) {
            return Err(VolFitError::InvalidInput {
                message: format!("rho must be in [-1, 1], got {rho}"),
            });
        }
        validate_non_negative(nu, "nu")?;
        Ok(Self {
            alpha,
            beta,
            rho,
            nu,
        })
    }

    /// Parameters as `[alpha, beta, rho, nu]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.alpha, self.beta, self.rho, self.nu]
    }

    /// Build from a `[alpha, beta, rho, nu]` slice (unvalidated).
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] unless the slice has length 4.
    pub fn from_slice(values: &[f64]) -> error::Result<Self> {
        match *values {
            [alpha, beta, rho, nu] => Ok(Self {
                alpha,
                beta,
                rho,
                nu,
            }),
            _ => Err(VolFitError::InvalidInput {
                message: format!("SABR needs 4 parameters, got {}", values.len()),
            }),
        }
    }
}

/// Intermediate quantities of the Hagan expression.
struct ForwardSweep {
    strike: f64,
    sf_k: f64,
    ln_fk: f64,
    z: f64,
    sf1: f64,
    sf2: f64,
}

fn forward_sweep(forward: f64, strike: f64, expiry: f64, p: &SabrParameters) -> ForwardSweep {
    let strike = strike.max(forward * CUTOFF_MONEYNESS);
    let beta_star = 1.0 - p.beta;
    let sf_k = (forward * strike).powf(0.5 * beta_star);
    let ln_fk = (forward / strike).ln();
    let z = p.nu / p.alpha * sf_k * ln_fk;
    let bl2 = (beta_star * ln_fk).powi(2);
    let sf1 = sf_k * (1.0 + bl2 / 24.0 + bl2 * bl2 / 1920.0);
    let sf2 = 1.0
        + expiry
            * ((beta_star * p.alpha / sf_k).powi(2) / 24.0
                + p.rho * p.beta * p.nu * p.alpha / (4.0 * sf_k)
                + (2.0 - 3.0 * p.rho * p.rho) * p.nu * p.nu / 24.0);
    ForwardSweep {
        strike,
        sf_k,
        ln_fk,
        z,
        sf1,
        sf2,
    }
}

/// `z/χ(z)` with its derivatives `[value, ∂/∂ρ, ∂/∂z]`.
fn z_over_chi(rho: f64, z: f64) -> [f64; 3] {
    let rho = rho.clamp(-1.0 + RHO_EPS, 1.0 - RHO_EPS);
    if z.abs() < SMALL_Z {
        let k = (2.0 - 3.0 * rho * rho) / 12.0;
        return [
            1.0 - 0.5 * rho * z + k * z * z,
            -0.5 * z - 0.5 * rho * z * z,
            -0.5 * rho + 2.0 * k * z,
        ];
    }

    let rho_star = 1.0 - rho;
    let root = (1.0 - 2.0 * rho * z + z * z).sqrt();
    let (arg, arg_rho, arg_z) = if z < LARGE_NEG_Z {
        // √(1 − 2ρz + z²) + z cancels for very negative z.
        let arg = (rho * rho - 1.0) / (2.0 * z);
        (arg, rho / z, -arg / z)
    } else {
        (root + z - rho, -z / root - 1.0, (z - rho) / root + 1.0)
    };
    if !(arg > 0.0) {
        return [0.0, 0.0, 0.0];
    }

    let chi = arg.ln() - rho_star.ln();
    let chi_rho = arg_rho / arg + 1.0 / rho_star;
    let chi_z = arg_z / arg;
    let chi2 = chi * chi;
    [z / chi, -z * chi_rho / chi2, 1.0 / chi - z * chi_z / chi2]
}

/// Hagan lognormal implied volatility.
///
/// Returns 0 when `alpha == 0`. Strikes below `forward · 1e-12` are floored.
pub fn hagan_volatility(forward: f64, strike: f64, expiry: f64, p: &SabrParameters) -> f64 {
    if p.alpha == 0.0 {
        return 0.0;
    }
    let s = forward_sweep(forward, strike, expiry, p);
    let [r, _, _] = z_over_chi(p.rho, s.z);
    p.alpha / s.sf1 * r * s.sf2
}

/// Hagan volatility and its gradient `[∂σ/∂α, ∂σ/∂β, ∂σ/∂ρ, ∂σ/∂ν]`.
pub fn hagan_volatility_adjoint(
    forward: f64,
    strike: f64,
    expiry: f64,
    p: &SabrParameters,
) -> (f64, [f64; 4]) {
    let SabrParameters {
        alpha,
        beta,
        rho,
        nu,
    } = *p;
    let beta_star = 1.0 - beta;

    if alpha == 0.0 {
        // ∂σ/∂α is unbounded away from the money; report a large finite value.
        let strike = strike.max(forward * CUTOFF_MONEYNESS);
        let d_alpha = if (forward - strike).abs() < ATM_EPS {
            (1.0 + (2.0 - 3.0 * rho * rho) * nu * nu / 24.0 * expiry) / forward.powf(beta_star)
        } else {
            1e7
        };
        return (0.0, [d_alpha, 0.0, 0.0, 0.0]);
    }

    let s = forward_sweep(forward, strike, expiry, p);
    let [r, r_rho, r_z] = z_over_chi(rho, s.z);
    let vol = alpha / s.sf1 * r * s.sf2;

    let l2 = s.ln_fk * s.ln_fk;
    let sf2_bar = alpha / s.sf1 * r;
    let sf1_bar = -alpha / (s.sf1 * s.sf1) * r * s.sf2;
    let r_bar = alpha / s.sf1 * s.sf2;
    let z_bar = r_z * r_bar;

    let sf_k_bar = nu / alpha * s.ln_fk * z_bar + s.sf1 / s.sf_k * sf1_bar
        - ((beta_star * alpha).powi(2) / s.sf_k.powi(3) / 12.0
            + rho * beta * nu * alpha / (4.0 * s.sf_k * s.sf_k))
            * expiry
            * sf2_bar;

    let alpha_bar = -nu / (alpha * alpha) * s.sf_k * s.ln_fk * z_bar
        + (beta_star * beta_star * alpha / (12.0 * s.sf_k * s.sf_k)
            + rho * beta * nu / (4.0 * s.sf_k))
            * expiry
            * sf2_bar
        + r * s.sf2 / s.sf1;
    let beta_bar = -0.5 * (forward * s.strike).ln() * s.sf_k * sf_k_bar
        - s.sf_k * (beta_star / 12.0 * l2 + beta_star.powi(3) / 480.0 * l2 * l2) * sf1_bar
        + (-beta_star * alpha * alpha / (12.0 * s.sf_k * s.sf_k)
            + rho * nu * alpha / (4.0 * s.sf_k))
            * expiry
            * sf2_bar;
    let rho_bar = r_rho * r_bar
        + (beta * nu * alpha / (4.0 * s.sf_k) - rho * nu * nu / 4.0) * expiry * sf2_bar;
    let nu_bar = s.sf_k * s.ln_fk / alpha * z_bar
        + (rho * beta * alpha / (4.0 * s.sf_k) + (2.0 - 3.0 * rho * rho) * nu / 12.0)
            * expiry
            * sf2_bar;

    (vol, [alpha_bar, beta_bar, rho_bar, nu_bar])
}

/// SABR volatility smile with 4 parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SabrSmile {
    forward: f64,
    expiry: f64,
    parameters: SabrParameters,
}

impl SabrSmile {
    /// Create a SABR smile from calibrated parameters.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if parameters are out of range.
    pub fn new(
        forward: f64,
        expiry: f64,
        alpha: f64,
        beta: f64,
        rho: f64,
        nu: f64,
    ) -> error::Result<Self> {
        Self::from_parameters(forward, expiry, SabrParameters::new(alpha, beta, rho, nu)?)
    }

    /// Create a smile from a parameter set, re-validating it.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] for a non-positive forward or
    /// expiry, or out-of-range parameters.
    pub fn from_parameters(
        forward: f64,
        expiry: f64,
        parameters: SabrParameters,
    ) -> error::Result<Self> {
        validate_positive(forward, "forward")?;
        validate_positive(expiry, "expiry")?;
        let p = parameters;
        let parameters = SabrParameters::new(p.alpha, p.beta, p.rho, p.nu)?;
        Ok(Self {
            forward,
            expiry,
            parameters,
        })
    }

    /// All four parameters.
    pub fn parameters(&self) -> &SabrParameters {
        &self.parameters
    }

    /// Returns the alpha (vol level) parameter.
    pub fn alpha(&self) -> f64 {
        self.parameters.alpha
    }

    /// Returns the beta (CEV exponent) parameter.
    pub fn beta(&self) -> f64 {
        self.parameters.beta
    }

    /// Returns the rho (spot-vol correlation) parameter.
    pub fn rho(&self) -> f64 {
        self.parameters.rho
    }

    /// Returns the nu (vol-of-vol) parameter.
    pub fn nu(&self) -> f64 {
        self.parameters.nu
    }

    /// Calibrate SABR parameters from market (strike, vol) observations.
    ///
    /// Equal weights on every quote. See [`SabrSlice::fit`] for the full
    /// calibration result.
    ///
    /// # Errors
    /// Returns [`VolFitError::CalibrationError`] if the optimizer fails to
    /// converge and [`VolFitError::InvalidInput`] for unusable quotes.
    pub fn calibrate(
        forward: f64,
        expiry: f64,
        market_vols: &[(f64, f64)],
        config: &SabrFitConfig,
    ) -> error::Result<Self> {
        let (strikes, vols): (Vec<f64>, Vec<f64>) = market_vols.iter().copied().unzip();
        let errors = vec![1.0; strikes.len()];
        Ok(SabrSlice::fit(forward, expiry, strikes, vols, &errors, config)?.smile)
    }
}

impl SmileSection for SabrSmile {
    fn vol(&self, strike: f64) -> error::Result<Vol> {
        validate_positive(strike, "strike")?;
        let v = hagan_volatility(self.forward, strike, self.expiry, &self.parameters);
        if !v.is_finite() || v < 0.0 {
            return Err(VolFitError::NumericalError {
                message: format!("SABR volatility {v} at strike {strike}"),
            });
        }
        Ok(Vol(v))
    }

    fn forward(&self) -> f64 {
        self.forward
    }

    fn expiry(&self) -> f64 {
        self.expiry
    }
}

/// Settings for a single-expiry SABR fit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SabrFitConfig {
    /// Starting parameters. When absent, α is set from the quote nearest the
    /// forward, β = 0.5 (or the fixed value), ρ = 0, ν = 0.3.
    pub initial_guess: Option<SabrParameters>,
    /// Hold β at this value instead of fitting it.
    pub fixed_beta: Option<f64>,
    /// Least-squares settings.
    pub lm: LevenbergMarquardtConfig,
}

impl SabrFitConfig {
    /// Fit with β held fixed.
    pub fn with_fixed_beta(mut self, beta: f64) -> Self {
        self.fixed_beta = Some(beta);
        self
    }

    /// Start the fit from `guess`.
    pub fn with_initial_guess(mut self, guess: SabrParameters) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    /// Number of parameters the fit solves for.
    pub fn free_parameters(&self) -> usize {
        if self.fixed_beta.is_some() { 3 } else { 4 }
    }
}

/// Bounds used to map SABR parameters into unconstrained fitting space.
pub fn sabr_transforms() -> [ParameterTransform; 4] {
    [
        ParameterTransform::GreaterThan(0.0),
        ParameterTransform::Range(0.0, 2.0),
        ParameterTransform::Range(-1.0, 1.0),
        ParameterTransform::GreaterThan(0.0),
    ]
}

/// One calibrated expiry: the fitted smile and the quotes it was fitted to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SabrSlice {
    /// Fitted smile.
    pub smile: SabrSmile,
    /// Quoted strikes.
    pub strikes: Vec<f64>,
    /// Quoted implied vols.
    pub vols: Vec<f64>,
    /// Quote errors used as least-squares weights.
    pub errors: Vec<f64>,
    /// Weighted sum of squared residuals at the solution.
    pub chi_sq: f64,
}

impl SabrSlice {
    /// Fit SABR to one expiry's quotes by Levenberg-Marquardt.
    ///
    /// Residuals are `(market − model) / error` at each strike; the solver
    /// works on transformed parameters so every trial point respects
    /// `α > 0`, `β ∈ (0, 2)`, `ρ ∈ (−1, 1)`, `ν > 0`.
    ///
    /// # Errors
    /// - [`VolFitError::InvalidInput`] for mismatched lengths, fewer quotes
    ///   than free parameters, or a starting point outside the domain.
    /// - [`VolFitError::CalibrationError`] if the solver does not converge.
    pub fn fit(
        forward: f64,
        expiry: f64,
        strikes: Vec<f64>,
        vols: Vec<f64>,
        errors: &[f64],
        config: &SabrFitConfig,
    ) -> error::Result<Self> {
        validate_positive(forward, "forward")?;
        validate_positive(expiry, "expiry")?;
        validate_same_len(strikes.len(), vols.len(), "strikes", "vols")?;
        validate_same_len(strikes.len(), errors.len(), "strikes", "errors")?;
        if strikes.len() < config.free_parameters() {
            return Err(VolFitError::InvalidInput {
                message: format!(
                    "SABR fit needs at least {} quotes, got {}",
                    config.free_parameters(),
                    strikes.len()
                ),
            });
        }
        for (k, v) in strikes.iter().zip(&vols) {
            validate_positive(*k, "strike")?;
            validate_positive(*v, "vol")?;
        }

        let start = match config.initial_guess {
            Some(mut guess) => {
                if let Some(beta) = config.fixed_beta {
                    guess.beta = beta;
                }
                guess
            }
            None => default_guess(forward, &strikes, &vols, config.fixed_beta.unwrap_or(0.5)),
        };
        let fixed = [false, config.fixed_beta.is_some(), false, false];
        let transforms = UncoupledTransforms::new(
            start.to_array().to_vec(),
            fixed.to_vec(),
            sabr_transforms().to_vec(),
        )?;
        let y0 = transforms.transform(&start.to_array())?;

        let n = strikes.len();
        let model = |y: &DVector<f64>| -> error::Result<DVector<f64>> {
            let p = SabrParameters::from_slice(&transforms.inverse_transform(y))?;
            Ok(DVector::from_iterator(
                n,
                strikes.iter().map(|k| hagan_volatility(forward, *k, expiry, &p)),
            ))
        };
        let jacobian = |y: &DVector<f64>| -> error::Result<DMatrix<f64>> {
            let p = SabrParameters::from_slice(&transforms.inverse_transform(y))?;
            let mut d_vol = DMatrix::zeros(n, 4);
            for (i, k) in strikes.iter().enumerate() {
                let (_, grad) = hagan_volatility_adjoint(forward, *k, expiry, &p);
                for (j, g) in grad.iter().enumerate() {
                    d_vol[(i, j)] = *g;
                }
            }
            Ok(d_vol * transforms.inverse_jacobian(y))
        };

        let result = levenberg::solve(&vols, errors, y0, model, jacobian, &config.lm).map_err(
            |e| match e {
                VolFitError::CalibrationError {
                    message, rms_error, ..
                } => VolFitError::CalibrationError {
                    message: format!("SABR fit at expiry {expiry}: {message}"),
                    model: "SABR",
                    rms_error,
                },
                other => other,
            },
        )?;

        let fitted = SabrParameters::from_slice(&transforms.inverse_transform(&result.parameters))?;
        let smile = SabrSmile::from_parameters(forward, expiry, fitted).map_err(|e| {
            VolFitError::CalibrationError {
                message: format!("SABR fit at expiry {expiry} left the parameter domain: {e}"),
                model: "SABR",
                rms_error: Some((result.chi_sq / n as f64).sqrt()),
            }
        })?;

        #[cfg(feature = "logging")]
        tracing::debug!(
            expiry,
            n_quotes = n,
            chi_sq = result.chi_sq,
            iterations = result.iterations,
            "SABR slice calibrated"
        );

        Ok(Self {
            smile,
            strikes,
            vols,
            errors: errors.to_vec(),
            chi_sq: result.chi_sq,
        })
    }

    /// Refit this slice with `shift` added to the vol at `strike_index`,
    /// starting from the current parameters.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] for an out-of-range index and
    /// propagates fit failures.
    pub fn bumped(
        &self,
        strike_index: usize,
        shift: f64,
        config: &SabrFitConfig,
    ) -> error::Result<Self> {
        if strike_index >= self.vols.len() {
            return Err(VolFitError::InvalidInput {
                message: format!(
                    "strike index {strike_index} out of range for {} quotes",
                    self.vols.len()
                ),
            });
        }
        let mut vols = self.vols.clone();
        vols[strike_index] += shift;
        let config = config.with_initial_guess(*self.smile.parameters());
        Self::fit(
            self.smile.forward(),
            self.smile.expiry(),
            self.strikes.clone(),
            vols,
            &self.errors,
            &config,
        )
    }
}

fn default_guess(forward: f64, strikes: &[f64], vols: &[f64], beta: f64) -> SabrParameters {
    let atm_vol = strikes
        .iter()
        .zip(vols)
        .min_by(|a, b| (a.0 - forward).abs().total_cmp(&(b.0 - forward).abs()))
        .map_or(0.2, |(_, v)| *v);
    SabrParameters {
        alpha: atm_vol * forward.powf(1.0 - beta),
        beta,
        rho: 0.0,
        nu: 0.3,
    }
}

/// The Hagan lognormal SABR formula as a [`SmileModel`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SabrHaganModel;

impl SmileModel for SabrHaganModel {
    fn name(&self) -> &'static str {
        "SABR"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &SABR_PARAMETER_NAMES
    }

    fn volatility(
        &self,
        forward: f64,
        strike: f64,
        expiry: f64,
        parameters: &[f64],
    ) -> error::Result<f64> {
        let p = SabrParameters::from_slice(parameters)?;
        Ok(hagan_volatility(forward, strike, expiry, &p))
    }

    fn volatility_adjoint(
        &self,
        forward: f64,
        strike: f64,
        expiry: f64,
        parameters: &[f64],
    ) -> error::Result<Vec<f64>> {
        let p = SabrParameters::from_slice(parameters)?;
        Ok(hagan_volatility_adjoint(forward, strike, expiry, &p).1.to_vec())
    }
}
