//! Joint calibration of a smile model's parameter term structure.
//!
//! Each model parameter is a [`ParameterCurve`] over expiry knots. The
//! unknowns are the fitting-space knot values of every curve, concatenated
//! in parameter order. One least-squares problem covers every quote at
//! every expiry, with the Jacobian assembled by the chain rule
//!
//! ```text
//! ∂σ(F_i, K_ij, t_i)/∂y_pk = ∂σ/∂θ_p · ∂θ_p(t_i)/∂y_pk
//! ```
//!
//! where `θ_p(t)` is parameter `p`'s curve and `y_pk` its `k`-th knot.
//! Knot interpolation couples the expiries, so the fit runs sequentially.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::curve::{Extrapolation, ForwardCurve, InterpolatedCurve, Interpolator1D, ParameterCurve};
use crate::error::{self, VolFitError};
use crate::optim::{LevenbergMarquardtConfig, ParameterTransform, levenberg};
use crate::smile::sabr::sabr_transforms;
use crate::smile::{SabrHaganModel, SabrParameters, SmileModel};
use crate::surface::function::Surface2D;
use crate::surface::market::SurfaceMarketData;
use crate::surface::volatility::StrikeSurface;
use crate::validate::{
    validate_increasing, validate_non_negative, validate_positive, validate_same_len,
};

/// Knots, interpolation and domain of one model parameter's curve.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterCurveSpec {
    /// Model parameter this curve drives.
    pub name: String,
    /// Knot expiries, strictly increasing.
    pub knots: Vec<f64>,
    /// Interpolation between knots, in fitting space.
    pub interpolator: Interpolator1D,
    /// Behaviour outside the knots.
    pub extrapolation: Extrapolation,
    /// Map between the parameter domain and fitting space.
    pub transform: ParameterTransform,
}

impl ParameterCurveSpec {
    /// Spec with flat extrapolation beyond the knots.
    pub fn new(
        name: impl Into<String>,
        knots: Vec<f64>,
        interpolator: Interpolator1D,
        transform: ParameterTransform,
    ) -> Self {
        Self {
            name: name.into(),
            knots,
            interpolator,
            extrapolation: Extrapolation::Flat,
            transform,
        }
    }

    /// Replace the extrapolation.
    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }
}

/// Least-squares fit of parameter curves to a whole surface of quotes.
#[derive(Debug, Clone)]
pub struct VolatilitySurfaceFitter<M: SmileModel + 'static> {
    model: Arc<M>,
    data: SurfaceMarketData,
    specs: Vec<ParameterCurveSpec>,
    offsets: Vec<usize>,
    config: LevenbergMarquardtConfig,
}

impl<M: SmileModel + 'static> VolatilitySurfaceFitter<M> {
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if the specs do not name the
    /// model's parameters in order, any knot set is empty or not strictly
    /// increasing, or there are more knots than quotes.
    pub fn new(
        model: M,
        data: SurfaceMarketData,
        specs: Vec<ParameterCurveSpec>,
    ) -> error::Result<Self> {
        let names = model.parameter_names();
        validate_same_len(names.len(), specs.len(), "model parameters", "curve specs")?;
        for (name, spec) in names.iter().zip(&specs) {
            if *name != spec.name {
                return Err(VolFitError::InvalidInput {
                    message: format!(
                        "curve spec '{}' given where '{name}' was expected",
                        spec.name
                    ),
                });
            }
            if spec.knots.is_empty() {
                return Err(VolFitError::InvalidInput {
                    message: format!("curve '{name}' has no knots"),
                });
            }
            validate_increasing(&spec.knots, "knots")?;
        }

        let mut offsets = Vec::with_capacity(specs.len());
        let mut n_unknowns = 0;
        for spec in &specs {
            offsets.push(n_unknowns);
            n_unknowns += spec.knots.len();
        }
        if n_unknowns > data.n_quotes() {
            return Err(VolFitError::InvalidInput {
                message: format!(
                    "{n_unknowns} knots cannot be fitted to {} quotes",
                    data.n_quotes()
                ),
            });
        }

        Ok(Self {
            model: Arc::new(model),
            data,
            specs,
            offsets,
            config: LevenbergMarquardtConfig::default(),
        })
    }

    /// Replace the least-squares settings.
    pub fn with_config(mut self, config: LevenbergMarquardtConfig) -> Self {
        self.config = config;
        self
    }

    /// The smile model being fitted.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The quotes being fitted.
    pub fn market_data(&self) -> &SurfaceMarketData {
        &self.data
    }

    /// Curve specs in parameter order.
    pub fn specs(&self) -> &[ParameterCurveSpec] {
        &self.specs
    }

    /// Length of the unknown vector.
    pub fn n_unknowns(&self) -> usize {
        self.specs.iter().map(|s| s.knots.len()).sum()
    }

    /// Parameter curves through the fitting-space `unknowns`.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] if `unknowns` has the wrong
    /// length or non-finite entries.
    pub fn curves(&self, unknowns: &DVector<f64>) -> error::Result<Vec<ParameterCurve>> {
        validate_same_len(self.n_unknowns(), unknowns.len(), "knots", "unknowns")?;
        self.specs
            .iter()
            .zip(&self.offsets)
            .map(|(spec, &offset)| {
                let ys = unknowns.rows(offset, spec.knots.len()).iter().copied().collect();
                let curve = InterpolatedCurve::new(
                    spec.knots.clone(),
                    ys,
                    spec.interpolator,
                    spec.extrapolation,
                )?;
                Ok(ParameterCurve::new(spec.name.clone(), curve, spec.transform))
            })
            .collect()
    }

    /// Model vols for every quote, expiry-major.
    ///
    /// # Errors
    /// As [`curves`](Self::curves), plus model failures.
    pub fn model_volatilities(&self, unknowns: &DVector<f64>) -> error::Result<DVector<f64>> {
        let curves = self.curves(unknowns)?;
        let mut out = Vec::with_capacity(self.data.n_quotes());
        for ((t, f), ks) in self.quotes_by_expiry() {
            let params = parameters_at(&curves, *t);
            for k in ks {
                out.push(self.model.volatility(*f, *k, *t, &params)?);
            }
        }
        Ok(DVector::from_vec(out))
    }

    /// `∂vol/∂unknown`, one row per quote and one column per knot.
    ///
    /// # Errors
    /// As [`model_volatilities`](Self::model_volatilities).
    pub fn jacobian(&self, unknowns: &DVector<f64>) -> error::Result<DMatrix<f64>> {
        let curves = self.curves(unknowns)?;
        let mut jac = DMatrix::zeros(self.data.n_quotes(), unknowns.len());
        let mut row = 0;
        for ((t, f), ks) in self.quotes_by_expiry() {
            let params = parameters_at(&curves, *t);
            let knot_sens: Vec<Vec<f64>> =
                curves.iter().map(|c| c.knot_sensitivities(*t)).collect();
            for k in ks {
                let grad = self.model.volatility_adjoint(*f, *k, *t, &params)?;
                for ((g, sens), &col) in grad.iter().zip(&knot_sens).zip(&self.offsets) {
                    for (j, s) in sens.iter().enumerate() {
                        jac[(row, col + j)] += g * s;
                    }
                }
                row += 1;
            }
        }
        Ok(jac)
    }

    /// Fit from a flat starting term structure.
    ///
    /// `initial_guess` holds one model-unit value per parameter, used at
    /// every knot of that parameter's curve.
    ///
    /// # Errors
    /// - [`VolFitError::InvalidInput`] if the guess has the wrong length or
    ///   lies outside a parameter's domain.
    /// - [`VolFitError::CalibrationError`] if the solver does not converge.
    pub fn solve(&self, initial_guess: &[f64]) -> error::Result<SurfaceFitResult> {
        validate_same_len(self.specs.len(), initial_guess.len(), "parameters", "initial guess")?;
        let mut start = Vec::with_capacity(self.n_unknowns());
        for (spec, x) in self.specs.iter().zip(initial_guess) {
            let y = spec.transform.transform(*x)?;
            start.extend(std::iter::repeat_n(y, spec.knots.len()));
        }

        #[cfg(feature = "logging")]
        tracing::debug!(
            model = self.model.name(),
            n_unknowns = start.len(),
            n_quotes = self.data.n_quotes(),
            "surface fit started"
        );

        let result = levenberg::solve(
            &self.data.flattened_vols(),
            &self.data.flattened_errors(),
            DVector::from_vec(start),
            |y| self.model_volatilities(y),
            |y| self.jacobian(y),
            &self.config,
        )
        .map_err(|e| match e {
            VolFitError::CalibrationError {
                message, rms_error, ..
            } => VolFitError::CalibrationError {
                message: format!("surface fit: {message}"),
                model: self.model.name(),
                rms_error,
            },
            other => other,
        })?;

        let curves = self.curves(&result.parameters)?;

        #[cfg(feature = "logging")]
        tracing::debug!(
            model = self.model.name(),
            chi_sq = result.chi_sq,
            iterations = result.iterations,
            "surface fit complete"
        );

        Ok(SurfaceFitResult {
            knot_values: curves.iter().map(ParameterCurve::knot_values).collect(),
            fitted: result.parameters,
            covariance: result.covariance,
            chi_sq: result.chi_sq,
            iterations: result.iterations,
            curves,
            model: self.model.clone(),
        })
    }

    fn quotes_by_expiry(&self) -> impl Iterator<Item = ((&f64, &f64), &Vec<f64>)> {
        self.data
            .expiries()
            .iter()
            .zip(self.data.forwards())
            .zip(self.data.strikes())
    }
}

fn parameters_at(curves: &[ParameterCurve], expiry: f64) -> Vec<f64> {
    curves.iter().map(|c| c.value(expiry)).collect()
}

/// Fitted parameter term structure.
#[derive(Debug, Clone)]
pub struct SurfaceFitResult {
    /// Knot values in fitting space.
    pub fitted: DVector<f64>,
    /// Knot values in model units, one vector per parameter.
    pub knot_values: Vec<Vec<f64>>,
    /// Covariance of the fitting-space knots.
    pub covariance: DMatrix<f64>,
    /// Weighted sum of squared residuals at the solution.
    pub chi_sq: f64,
    /// Solver iterations used.
    pub iterations: usize,
    /// Fitted curves in parameter order.
    pub curves: Vec<ParameterCurve>,
    model: Arc<dyn SmileModel>,
}

impl SurfaceFitResult {
    /// Model parameters at `expiry`, in parameter order.
    pub fn parameters_at(&self, expiry: f64) -> Vec<f64> {
        parameters_at(&self.curves, expiry)
    }

    /// The curve for parameter `name`.
    pub fn curve(&self, name: &str) -> Option<&ParameterCurve> {
        self.curves.iter().find(|c| c.name() == name)
    }

    /// Implied vol surface in absolute strike from the fitted curves.
    pub fn volatility_surface(&self, forward_curve: Arc<dyn ForwardCurve>) -> StrikeSurface {
        let curves = self.curves.clone();
        let model = Arc::clone(&self.model);
        StrikeSurface::new(Surface2D::from_fn(move |t, k| {
            validate_non_negative(t, "expiry")?;
            validate_positive(k, "strike")?;
            let params = parameters_at(&curves, t);
            model.volatility(forward_curve.forward(t), k, t, &params)
        }))
    }
}

/// Knot expiries per SABR parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SabrKnots {
    /// Knots of the α curve.
    pub alpha: Vec<f64>,
    /// Knots of the β curve.
    pub beta: Vec<f64>,
    /// Knots of the ρ curve.
    pub rho: Vec<f64>,
    /// Knots of the ν curve.
    pub nu: Vec<f64>,
}

impl SabrKnots {
    /// The same knots for all four parameters.
    pub fn uniform(knots: Vec<f64>) -> Self {
        Self {
            alpha: knots.clone(),
            beta: knots.clone(),
            rho: knots.clone(),
            nu: knots,
        }
    }
}

/// [`VolatilitySurfaceFitter`] for Hagan SABR with `α > 0`, `β ∈ (0, 2)`,
/// `ρ ∈ (−1, 1)` and `ν > 0`.
///
/// # Examples
///
/// ```
/// use volfit::curve::Interpolator1D;
/// use volfit::smile::{SabrParameters, hagan_volatility};
/// use volfit::surface::{SabrKnots, SabrSurfaceFitter, SurfaceMarketData};
///
/// let truth = SabrParameters::new(2.0, 0.5, -0.3, 0.4)?;
/// let expiries = vec![0.5, 1.0, 2.0];
/// let strikes = vec![vec![80.0, 90.0, 100.0, 110.0, 120.0]; 3];
/// let vols = expiries
///     .iter()
///     .zip(&strikes)
///     .map(|(t, ks)| ks.iter().map(|k| hagan_volatility(100.0, *k, *t, &truth)).collect())
///     .collect();
/// let data = SurfaceMarketData::new(expiries, vec![100.0; 3], strikes, vols)?;
///
/// let knots = SabrKnots { alpha: vec![1.0], beta: vec![1.0], rho: vec![1.0], nu: vec![1.0] };
/// let fitter = SabrSurfaceFitter::new(data, knots, Interpolator1D::Linear)?;
/// let fit = fitter.solve(&SabrParameters::new(1.8, 0.5, -0.2, 0.3)?)?;
/// assert!(fit.chi_sq < 1e-10);
/// # Ok::<(), volfit::VolFitError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SabrSurfaceFitter {
    inner: VolatilitySurfaceFitter<SabrHaganModel>,
}

impl SabrSurfaceFitter {
    /// # Errors
    /// As [`VolatilitySurfaceFitter::new`].
    pub fn new(
        data: SurfaceMarketData,
        knots: SabrKnots,
        interpolator: Interpolator1D,
    ) -> error::Result<Self> {
        let [ta, tb, tr, tn] = sabr_transforms();
        let specs = vec![
            ParameterCurveSpec::new("alpha", knots.alpha, interpolator, ta),
            ParameterCurveSpec::new("beta", knots.beta, interpolator, tb),
            ParameterCurveSpec::new("rho", knots.rho, interpolator, tr),
            ParameterCurveSpec::new("nu", knots.nu, interpolator, tn),
        ];
        Ok(Self {
            inner: VolatilitySurfaceFitter::new(SabrHaganModel, data, specs)?,
        })
    }

    /// Replace the least-squares settings.
    pub fn with_config(self, config: LevenbergMarquardtConfig) -> Self {
        Self {
            inner: self.inner.with_config(config),
        }
    }

    /// The generic fitter underneath.
    pub fn fitter(&self) -> &VolatilitySurfaceFitter<SabrHaganModel> {
        &self.inner
    }

    /// Fit starting from `initial_guess` at every knot.
    ///
    /// # Errors
    /// As [`VolatilitySurfaceFitter::solve`].
    pub fn solve(&self, initial_guess: &SabrParameters) -> error::Result<SurfaceFitResult> {
        self.inner.solve(&initial_guess.to_array())
    }
}
