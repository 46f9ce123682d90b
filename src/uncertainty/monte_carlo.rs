//! # Monte Carlo Asymmetric Errors
//!
//! Draws parameter vectors from the multivariate normal `N(best, covar)` and
//! reads asymmetric 1σ errors off the 15.87 / 84.13 percentiles of each
//! parameter's sampled distribution. Sampled values are clamped to the
//! parameter bounds, so a parameter pressed against a physical limit ends up
//! with a shorter error on that side.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{LcFitError, Result};
use crate::parameters::ParameterBounds;
use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};

/// Lower one-sigma percentile of a normal distribution.
pub const LOWER_SIGMA_PERCENTILE: f64 = 15.865_525_393_145_7;

/// Upper one-sigma percentile of a normal distribution.
pub const UPPER_SIGMA_PERCENTILE: f64 = 84.134_474_606_854_3;

/// Settings for Monte Carlo error estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloSettings {
    /// Draw Monte Carlo errors instead of symmetric covariance errors.
    pub enabled: bool,

    /// Number of parameter vectors to draw.
    pub samples: usize,

    /// Seed for reproducible draws; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for MonteCarloSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            samples: 2000,
            seed: None,
        }
    }
}

/// Asymmetric errors drawn from the covariance matrix.
#[derive(Debug, Clone)]
pub struct MonteCarloResult {
    /// Distance from the best fit down to the lower percentile (non-negative).
    pub err_neg: Array1<f64>,

    /// Distance from the best fit up to the upper percentile (non-negative).
    pub err_pos: Array1<f64>,

    /// Median of each parameter's samples.
    pub medians: Array1<f64>,
}

/// Linear-interpolated percentile of sorted samples, `p` in [0, 100].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Lower-triangular Cholesky factor of the covariance matrix.
fn cholesky_factor(covar: &Array2<f64>) -> Result<Array2<f64>> {
    ndarray_to_nalgebra(covar)
        .cholesky()
        .map(|chol| nalgebra_to_ndarray(&chol.l()))
        .ok_or_else(|| {
            LcFitError::LinearAlgebraError("Covariance matrix is not positive definite".to_string())
        })
}

/// Perform Monte Carlo error estimation around the best-fit parameters.
///
/// # Arguments
///
/// * `best` - The best-fit parameters
/// * `covar` - The covariance matrix for the parameters
/// * `bounds` - Parameter bounds applied to every draw
/// * `n_samples` - Number of Monte Carlo samples to generate
/// * `rng` - Random number generator
pub fn monte_carlo_errors(
    best: &Array1<f64>,
    covar: &Array2<f64>,
    bounds: &ParameterBounds,
    n_samples: usize,
    rng: &mut impl Rng,
) -> Result<MonteCarloResult> {
    let n_params = best.len();

    if covar.shape() != [n_params, n_params] {
        return Err(LcFitError::DimensionMismatch(format!(
            "Covariance matrix shape {:?} doesn't match number of parameters {}",
            covar.shape(),
            n_params
        )));
    }
    if n_samples < 2 {
        return Err(LcFitError::InvalidInput(
            "Monte Carlo error estimation needs at least two samples".to_string(),
        ));
    }

    let l = cholesky_factor(covar)?;
    let mut samples: Vec<Vec<f64>> = vec![Vec::with_capacity(n_samples); n_params];

    for _ in 0..n_samples {
        let z: Array1<f64> = (0..n_params).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
        let draw = best + &l.dot(&z);

        for (j, value) in draw.iter().enumerate() {
            let value = bounds.get(j).map_or(*value, |b| b.clamp(*value));
            samples[j].push(value);
        }
    }

    let mut err_neg = Array1::zeros(n_params);
    let mut err_pos = Array1::zeros(n_params);
    let mut medians = Array1::zeros(n_params);

    for (j, column) in samples.iter_mut().enumerate() {
        column.sort_by(|a, b| a.total_cmp(b));
        err_neg[j] = (best[j] - percentile(column, LOWER_SIGMA_PERCENTILE)).max(0.0);
        err_pos[j] = (percentile(column, UPPER_SIGMA_PERCENTILE) - best[j]).max(0.0);
        medians[j] = percentile(column, 50.0);
    }

    Ok(MonteCarloResult {
        err_neg,
        err_pos,
        medians,
    })
}
