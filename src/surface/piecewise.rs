//! Piecewise SABR surface: one independently calibrated SABR smile per
//! expiry, joined across expiries by interpolation.
//!
//! Two joins are offered:
//!
//! - [`linear_variance_surface`](PiecewiseSabrSurfaceFitter::linear_variance_surface)
//!   interpolates total variance linearly in time at fixed strike. Variance
//!   stays monotonic between nodes; local vol jumps at the nodes.
//! - [`interpolated_surface`](PiecewiseSabrSurfaceFitter::interpolated_surface)
//!   maps the query to each neighbouring slice at equal standardized
//!   log-moneyness `ln(K/F)/t^(λ/2)` and runs a natural cubic spline through
//!   a four-expiry stencil, optionally in total-variance space.

use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::conventions::{standardized_log_moneyness, strike_from_standardized};
use crate::curve::{
    Extrapolation, ForwardCurve, InterpolatedCurve, InterpolatedForwardCurve, Interpolator1D,
};
use crate::error::{self, VolFitError};
use crate::smile::{SabrFitConfig, SabrSlice, SmileDeltaParameters, SmileSection};
use crate::surface::arbitrage::{first_calendar_violation, is_non_decreasing};
use crate::surface::function::Surface2D;
use crate::surface::market::SurfaceMarketData;
use crate::surface::volatility::StrikeSurface;
use crate::validate::{validate_non_negative, validate_positive, validate_same_len};

/// Sample points for the post-fit calendar check.
const CHECK_POINTS: usize = 101;
const STENCIL: usize = 4;

/// Settings for [`PiecewiseSabrSurfaceFitter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseSabrConfig {
    /// Time scaling of the standardized log-moneyness `ln(K/F)/t^(λ/2)`.
    pub lambda: f64,
    /// Spline total variance rather than vol in the interpolated surface.
    pub interpolate_variance: bool,
    /// Per-expiry fit settings.
    pub fit: SabrFitConfig,
}

impl Default for PiecewiseSabrConfig {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            interpolate_variance: true,
            fit: SabrFitConfig::default(),
        }
    }
}

impl PiecewiseSabrConfig {
    /// Set the time scaling `λ`.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    /// Choose between variance and vol interpolation.
    pub fn with_interpolate_variance(mut self, interpolate_variance: bool) -> Self {
        self.interpolate_variance = interpolate_variance;
        self
    }

    /// Replace the per-expiry fit settings.
    pub fn with_fit(mut self, fit: SabrFitConfig) -> Self {
        self.fit = fit;
        self
    }
}

/// Per-expiry SABR calibration with cross-expiry interpolation.
///
/// Slices are held behind `Arc` so [`bumped`](Self::bumped) copies share
/// every slice they do not refit.
///
/// # Examples
///
/// ```
/// use volfit::smile::{SabrFitConfig, SabrParameters, hagan_volatility};
/// use volfit::surface::{
///     BlackVolatilitySurface, PiecewiseSabrConfig, PiecewiseSabrSurfaceFitter, SurfaceMarketData,
/// };
///
/// let truth = SabrParameters::new(2.0, 0.5, -0.3, 0.4)?;
/// let expiries = vec![0.5, 1.0];
/// let strikes = vec![vec![80.0, 90.0, 100.0, 110.0, 120.0]; 2];
/// let vols = expiries
///     .iter()
///     .zip(&strikes)
///     .map(|(t, ks)| ks.iter().map(|k| hagan_volatility(100.0, *k, *t, &truth)).collect())
///     .collect();
/// let data = SurfaceMarketData::new(expiries, vec![100.0; 2], strikes, vols)?;
/// let fit = SabrFitConfig::default().with_fixed_beta(0.5);
/// let config = PiecewiseSabrConfig::default().with_fit(fit);
/// let fitter = PiecewiseSabrSurfaceFitter::new(data, config)?;
///
/// let surface = fitter.linear_variance_surface();
/// assert!(surface.volatility(0.75, 100.0)?.0 > 0.0);
/// # Ok::<(), volfit::VolFitError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PiecewiseSabrSurfaceFitter {
    data: SurfaceMarketData,
    config: PiecewiseSabrConfig,
    forward_curve: Arc<InterpolatedForwardCurve>,
    slices: Vec<Arc<SabrSlice>>,
}

impl PiecewiseSabrSurfaceFitter {
    /// Fit one SABR smile per expiry of `data`.
    ///
    /// # Errors
    /// - [`VolFitError::InvalidInput`] if an expiry has fewer quotes than
    ///   free SABR parameters or `lambda` is negative.
    /// - [`VolFitError::CalibrationError`] if any slice fails to fit.
    /// - [`VolFitError::ArbitrageViolation`] if total variance decreases
    ///   between adjacent fitted expiries anywhere on the check grid.
    pub fn new(data: SurfaceMarketData, config: PiecewiseSabrConfig) -> error::Result<Self> {
        validate_non_negative(config.lambda, "lambda")?;
        let min_quotes = config.fit.free_parameters();
        for (t, ks) in data.expiries().iter().zip(data.strikes()) {
            if ks.len() < min_quotes {
                return Err(VolFitError::InvalidInput {
                    message: format!(
                        "at least {min_quotes} quotes required per expiry, got {} for expiry {t}",
                        ks.len()
                    ),
                });
            }
        }

        #[cfg(feature = "logging")]
        tracing::debug!(
            n_expiries = data.n_expiries(),
            n_quotes = data.n_quotes(),
            "piecewise SABR fit started"
        );

        let forward_curve = Arc::new(data.forward_curve()?);
        let slices = fit_slices(&data, &config.fit)?;
        let fitter = Self {
            data,
            config,
            forward_curve,
            slices,
        };
        fitter.check_calendar()?;

        #[cfg(feature = "logging")]
        tracing::debug!(
            n_expiries = fitter.slices.len(),
            total_chi_sq = fitter.slices.iter().map(|s| s.chi_sq).sum::<f64>(),
            "piecewise SABR fit complete"
        );

        Ok(fitter)
    }

    /// Fit from delta-quoted smiles, one per expiry.
    ///
    /// Every smile must quote the same number of delta buckets. Total
    /// variance is checked bucket by bucket before any fitting.
    ///
    /// # Errors
    /// As [`new`](Self::new), plus [`VolFitError::InvalidInput`] for
    /// mismatched lengths or bucket counts and
    /// [`VolFitError::ArbitrageViolation`] if a bucket's variance decreases.
    pub fn from_delta_smiles(
        forwards: Vec<f64>,
        smiles: &[SmileDeltaParameters],
        config: PiecewiseSabrConfig,
    ) -> error::Result<Self> {
        validate_same_len(forwards.len(), smiles.len(), "forwards", "smiles")?;
        let Some(first) = smiles.first() else {
            return Err(VolFitError::InvalidInput {
                message: "at least one smile is required".into(),
            });
        };
        for s in smiles {
            validate_same_len(first.len(), s.len(), "first smile quotes", "smile quotes")?;
        }

        let variances: Vec<Vec<f64>> = smiles
            .iter()
            .map(|s| s.volatilities().iter().map(|v| v * v * s.expiry()).collect())
            .collect();
        if let Some(violation) = first_calendar_violation(&variances, &first.call_deltas()) {
            return Err(violation.into_error("call delta"));
        }

        let expiries = smiles.iter().map(SmileDeltaParameters::expiry).collect();
        let strikes = smiles
            .iter()
            .zip(&forwards)
            .map(|(s, f)| s.strikes(*f))
            .collect::<error::Result<Vec<_>>>()?;
        let vols = smiles.iter().map(SmileDeltaParameters::volatilities).collect();
        Self::new(SurfaceMarketData::new(expiries, forwards, strikes, vols)?, config)
    }

    /// Fitted slices in expiry order.
    pub fn slices(&self) -> &[Arc<SabrSlice>] {
        &self.slices
    }

    /// Quoted expiries.
    pub fn expiries(&self) -> &[f64] {
        self.data.expiries()
    }

    /// Quoted forwards, one per expiry.
    pub fn forwards(&self) -> &[f64] {
        self.data.forwards()
    }

    /// Log-linear forward curve through the quoted forwards.
    pub fn forward_curve(&self) -> &Arc<InterpolatedForwardCurve> {
        &self.forward_curve
    }

    /// The quotes the slices were fitted to.
    pub fn market_data(&self) -> &SurfaceMarketData {
        &self.data
    }

    /// Settings the fitter was built with.
    pub fn config(&self) -> &PiecewiseSabrConfig {
        &self.config
    }

    /// Total variance must not fall between adjacent expiries at any of the
    /// check points, spaced evenly in standardized log-moneyness across the
    /// union of the quoted ranges.
    fn check_calendar(&self) -> error::Result<()> {
        if self.slices.len() < 2 {
            return Ok(());
        }
        let lambda = self.config.lambda;
        let (d_min, d_max) = self
            .slices
            .iter()
            .flat_map(|s| {
                let (f, t) = (s.smile.forward(), s.smile.expiry());
                s.strikes
                    .iter()
                    .map(move |k| standardized_log_moneyness(*k, f, t, lambda))
            })
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| (lo.min(d), hi.max(d)));

        let grid: Vec<f64> = (0..CHECK_POINTS)
            .map(|j| d_min + (d_max - d_min) * j as f64 / (CHECK_POINTS - 1) as f64)
            .collect();
        let variances = self
            .slices
            .iter()
            .map(|s| {
                let (f, t) = (s.smile.forward(), s.smile.expiry());
                grid
                    .iter()
                    .map(|d| Ok(s.smile.variance(strike_from_standardized(*d, f, t, lambda))?.0))
                    .collect::<error::Result<Vec<f64>>>()
            })
            .collect::<error::Result<Vec<_>>>()?;

        match first_calendar_violation(&variances, &grid) {
            Some(violation) => Err(violation.into_error("standardized log-moneyness")),
            None => Ok(()),
        }
    }

    /// Strike surface from linear total-variance interpolation in time.
    ///
    /// Before the first expiry, vol is extrapolated linearly through the
    /// first two slices (floored at zero); after the last it is flat.
    pub fn linear_variance_surface(&self) -> StrikeSurface {
        let slices = self.slices.clone();
        let expiries = self.data.expiries().to_vec();
        StrikeSurface::new(Surface2D::from_fn(move |t, k| {
            validate_non_negative(t, "expiry")?;
            validate_positive(k, "strike")?;
            let n = slices.len();
            let vol_at = |i: usize| -> error::Result<f64> { Ok(slices[i].smile.vol(k)?.0) };

            if n == 1 || t >= expiries[n - 1] {
                return vol_at(n - 1);
            }
            if t <= expiries[0] {
                let (v0, v1) = (vol_at(0)?, vol_at(1)?);
                let slope = (v1 - v0) / (expiries[1] - expiries[0]);
                return Ok((v0 + slope * (t - expiries[0])).max(0.0));
            }

            let right = expiries.partition_point(|&e| e < t);
            let left = right - 1;
            let (t0, t1) = (expiries[left], expiries[right]);
            let (v0, v1) = (vol_at(left)?, vol_at(right)?);
            let w = ((t1 - t) * v0 * v0 * t0 + (t - t0) * v1 * v1 * t1) / (t1 - t0);
            Ok((w / t).sqrt())
        }))
    }

    /// Strike surface from a cubic spline across a four-expiry stencil at
    /// fixed standardized log-moneyness.
    ///
    /// Queries fail with [`VolFitError::ArbitrageViolation`] if total
    /// variance decreases across the stencil.
    pub fn interpolated_surface(&self) -> StrikeSurface {
        let slices = self.slices.clone();
        let expiries = self.data.expiries().to_vec();
        let forward_curve = Arc::clone(&self.forward_curve);
        let lambda = self.config.lambda;
        let in_variance = self.config.interpolate_variance;

        StrikeSurface::new(Surface2D::from_fn(move |t, k| {
            validate_positive(t, "expiry")?;
            validate_positive(k, "strike")?;
            let n = slices.len();
            let d = standardized_log_moneyness(k, forward_curve.forward(t), t, lambda);

            let start = if n <= STENCIL {
                0
            } else {
                expiries
                    .partition_point(|&e| e < t)
                    .saturating_sub(STENCIL / 2)
                    .min(n - STENCIL)
            };
            let stencil = start..(start + STENCIL).min(n);

            let mut ts = Vec::with_capacity(STENCIL);
            let mut vols = Vec::with_capacity(STENCIL);
            let mut variances = Vec::with_capacity(STENCIL);
            for i in stencil.clone() {
                let (f_i, t_i) = (slices[i].smile.forward(), expiries[i]);
                let v = slices[i].smile.vol(strike_from_standardized(d, f_i, t_i, lambda))?.0;
                ts.push(t_i);
                vols.push(v);
                variances.push(v * v * t_i);
            }
            if !is_non_decreasing(&variances) {
                let offset = variances
                    .windows(2)
                    .position(|w| w[1] < w[0])
                    .unwrap_or_default();
                return Err(VolFitError::ArbitrageViolation {
                    message: format!(
                        "total variance decreases across the interpolation stencil \
                         at standardized log-moneyness {d}"
                    ),
                    short_index: stencil.start + offset,
                    long_index: stencil.start + offset + 1,
                });
            }
            if ts.len() == 1 {
                return Ok(vols[0]);
            }

            let ys = if in_variance { variances } else { vols };
            let curve = InterpolatedCurve::new(
                ts,
                ys,
                Interpolator1D::NaturalCubicSpline,
                Extrapolation::Linear,
            )?;
            let y = curve.value(t);
            Ok(if in_variance { (y.max(0.0) / t).sqrt() } else { y })
        }))
    }

    /// Copy with one quote shifted by `shift` and its slice refitted.
    ///
    /// Every other slice is shared with `self`.
    ///
    /// # Errors
    /// Returns [`VolFitError::InvalidInput`] for out-of-range indices and
    /// propagates refit failures.
    pub fn bumped(
        &self,
        expiry_index: usize,
        strike_index: usize,
        shift: f64,
    ) -> error::Result<Self> {
        let data = self.data.with_shifted_vol(expiry_index, strike_index, shift)?;
        let refit = self.slices[expiry_index].bumped(strike_index, shift, &self.config.fit)?;
        let mut slices = self.slices.clone();
        slices[expiry_index] = Arc::new(refit);
        Ok(Self {
            data,
            config: self.config,
            forward_curve: Arc::clone(&self.forward_curve),
            slices,
        })
    }

    /// [`bumped`](Self::bumped) for every quote, grouped by expiry.
    ///
    /// # Errors
    /// Propagates the first refit failure.
    pub fn all_bumped(&self, shift: f64) -> error::Result<Vec<Vec<Self>>> {
        let points: Vec<(usize, usize)> = self
            .data
            .strikes()
            .iter()
            .enumerate()
            .flat_map(|(i, ks)| (0..ks.len()).map(move |j| (i, j)))
            .collect();

        #[cfg(feature = "parallel")]
        let bumped = points
            .par_iter()
            .map(|&(i, j)| self.bumped(i, j, shift))
            .collect::<error::Result<Vec<_>>>()?;
        #[cfg(not(feature = "parallel"))]
        let bumped = points
            .iter()
            .map(|&(i, j)| self.bumped(i, j, shift))
            .collect::<error::Result<Vec<_>>>()?;

        let mut grouped: Vec<Vec<Self>> = self
            .data
            .strikes()
            .iter()
            .map(|ks| Vec::with_capacity(ks.len()))
            .collect();
        for ((i, _), fitter) in points.into_iter().zip(bumped) {
            grouped[i].push(fitter);
        }
        Ok(grouped)
    }
}

fn fit_slices(
    data: &SurfaceMarketData,
    config: &SabrFitConfig,
) -> error::Result<Vec<Arc<SabrSlice>>> {
    let fit_one = |i: usize| -> error::Result<Arc<SabrSlice>> {
        SabrSlice::fit(
            data.forwards()[i],
            data.expiries()[i],
            data.strikes()[i].clone(),
            data.vols()[i].clone(),
            &data.errors()[i],
            config,
        )
        .map(Arc::new)
    };

    #[cfg(feature = "parallel")]
    let slices = (0..data.n_expiries())
        .into_par_iter()
        .map(fit_one)
        .collect::<error::Result<Vec<_>>>()?;
    #[cfg(not(feature = "parallel"))]
    let slices = (0..data.n_expiries())
        .map(fit_one)
        .collect::<error::Result<Vec<_>>>()?;

    Ok(slices)
}
