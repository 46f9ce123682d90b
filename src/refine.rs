//! Bounded, weighted non-linear refinement of a light-curve model.
//!
//! The residual of every fittable sample is
//! `(rate − mean_model(bin)) / rate_pos`, using the model averaged over the
//! exposure bin. Physical parameters are kept inside their bounds through the
//! Minuit transforms of [`BoundedProblem`], and errors come from the
//! covariance at the solution or, optionally, from Monte Carlo draws.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::FitConfig;
use crate::error::{LcFitError, Result};
use crate::lightcurve::LightCurve;
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::models::ModelSpec;
use crate::parameters::{Bounds, ParameterBounds};
use crate::problem::{BoundedProblem, Problem};
use crate::report::{chi_square, DofConvention, FitResult};
use crate::uncertainty::{
    calculate_correlation, calculate_covariance, monte_carlo_errors, standard_errors_from_covariance,
    MonteCarloSettings,
};
use crate::utils::jacobian_central;

/// Weighted residuals of a model against the fittable part of a light curve.
#[derive(Debug, Clone)]
pub struct LightCurveProblem {
    model: ModelSpec,
    time: Array1<f64>,
    t_start: Array1<f64>,
    t_end: Array1<f64>,
    rate: Array1<f64>,
    rate_err: Array1<f64>,
}

impl LightCurveProblem {
    /// Build the problem from the samples of `lc` that can enter a fit.
    pub fn new(model: ModelSpec, lc: &LightCurve) -> Result<Self> {
        let data = lc.fit_samples();
        if data.is_empty() {
            return Err(LcFitError::InvalidInput(
                "light curve has no fittable samples".to_string(),
            ));
        }
        Ok(Self {
            model,
            time: data.times(),
            t_start: data.bin_starts(),
            t_end: data.bin_ends(),
            rate: data.rates(),
            rate_err: data.rate_pos(),
        })
    }

    pub fn model(&self) -> ModelSpec {
        self.model
    }

    pub fn time(&self) -> &Array1<f64> {
        &self.time
    }

    pub fn rate(&self) -> &Array1<f64> {
        &self.rate
    }

    pub fn rate_err(&self) -> &Array1<f64> {
        &self.rate_err
    }

    /// Earliest and latest sample time.
    pub fn time_span(&self) -> (f64, f64) {
        let lo = self.time.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.time.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lo, hi)
    }

    /// Chi-square of `params` with the instantaneous model.
    pub fn chi_square(&self, params: &[f64]) -> Result<f64> {
        chi_square(&self.model, params, &self.time, &self.rate, &self.rate_err)
    }
}

impl Problem for LightCurveProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let params = params.as_slice().ok_or_else(|| {
            LcFitError::InvalidInput("parameter vector is not contiguous".to_string())
        })?;
        let predicted = self.model.eval_integrated(&self.t_start, &self.t_end, params)?;
        Ok((&self.rate - &predicted) / &self.rate_err)
    }

    fn parameter_count(&self) -> usize {
        self.model.param_count()
    }

    fn residual_count(&self) -> usize {
        self.rate.len()
    }
}

/// Physical bounds of every parameter of `model` for data spanning `span`.
///
/// `norm` and flare amplitudes are non-negative, flare centres and breaks stay
/// inside the data span, flare widths lie in `[1e-3·t_min, t_max − t_min]`
/// and decay indices are free.
pub fn parameter_bounds(model: &ModelSpec, span: (f64, f64)) -> Result<ParameterBounds> {
    let (t_min, t_max) = span;
    let mut bounds = Vec::with_capacity(model.param_count());
    bounds.push(Bounds::min_only(0.0));
    for _ in 0..model.num_flares() {
        bounds.push(Bounds::min_only(0.0));
        bounds.push(Bounds::new(t_min, t_max)?);
        bounds.push(Bounds::new(1e-3 * t_min, t_max - t_min)?);
    }
    for k in 0..=model.num_breaks() {
        bounds.push(Bounds::unbounded());
        if k < model.num_breaks() {
            bounds.push(Bounds::new(t_min, t_max)?);
        }
    }
    Ok(ParameterBounds::new(bounds))
}

/// Non-linear refinement stage.
#[derive(Debug, Clone, Default)]
pub struct Refiner {
    solver: LmConfig,
    dof_convention: DofConvention,
    absolute_sigma: bool,
    monte_carlo: MonteCarloSettings,
}

impl Refiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &FitConfig) -> Self {
        Self {
            solver: config.solver.clone(),
            dof_convention: config.dof_convention,
            absolute_sigma: config.absolute_sigma,
            monte_carlo: config.monte_carlo.clone(),
        }
    }

    pub fn with_solver(mut self, solver: LmConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_dof_convention(mut self, dof_convention: DofConvention) -> Self {
        self.dof_convention = dof_convention;
        self
    }

    /// Take rate errors as absolute instead of rescaling by the reduced chi-square.
    pub fn with_absolute_sigma(mut self, absolute_sigma: bool) -> Self {
        self.absolute_sigma = absolute_sigma;
        self
    }

    pub fn with_monte_carlo(mut self, monte_carlo: MonteCarloSettings) -> Self {
        self.monte_carlo = monte_carlo;
        self
    }

    pub fn dof_convention(&self) -> DofConvention {
        self.dof_convention
    }

    /// Refine `initial` for `model` against `lc`.
    ///
    /// Solver failures return the best parameters found inside the error.
    pub fn refine(&self, lc: &LightCurve, model: ModelSpec, initial: &[f64]) -> Result<FitResult> {
        let problem = LightCurveProblem::new(model, lc)?;
        let nump = model.param_count();
        if initial.len() != nump {
            return Err(LcFitError::DimensionMismatch(format!(
                "Model {} takes {} parameters, got {}",
                model,
                nump,
                initial.len()
            )));
        }

        let names = model.param_names();
        let bounds = parameter_bounds(&model, problem.time_span())?;
        let initial = Array1::from_vec(initial.to_vec());
        let (start, moved) = bounds.clamp_inside(&initial)?;
        for i in moved {
            warn!(
                "{} = {:.6e} is outside its bounds, starting from {:.6e}",
                names[i], initial[i], start[i]
            );
        }

        let bounded = BoundedProblem::new(&problem, &bounds)?;
        let solver = LevenbergMarquardt::with_config(self.solver.clone());
        let result = solver.minimize(&bounded, bounded.to_internal(&start)?)?;
        let best = bounded.to_external(&result.params);
        let best_values = best.to_vec();

        let n_data = problem.residual_count();
        let chi2 = problem.chi_square(&best_values)?;
        let dof = self.dof_convention.degrees_of_freedom(n_data, nump);
        if self.dof_convention == DofConvention::Legacy {
            warn!("degrees of freedom counted as n + p = {}", dof);
        }

        let undefined = || {
            FitResult::with_symmetric_errors(model, best_values.clone(), vec![f64::NAN; nump], chi2, dof)
        };

        if !result.success {
            return Err(LcFitError::ConvergenceFailure {
                message: format!("{} after {} iterations", result.message, result.iterations),
                partial: Box::new(undefined()?),
            });
        }
        debug!(
            "{}: converged in {} iterations, cost {:.6e}",
            model, result.iterations, result.cost
        );

        let scale = if self.absolute_sigma {
            1.0
        } else if n_data > nump {
            result.cost / (n_data - nump) as f64
        } else {
            return Err(LcFitError::DegenerateFit {
                message: format!("{} samples leave no freedom for {} parameters", n_data, nump),
                partial: Box::new(undefined()?),
            });
        };

        let covar = match jacobian_central(&problem, &best, None)
            .and_then(|jac| calculate_covariance(&jac, scale))
        {
            Ok(covar) => covar,
            Err(e) => {
                return Err(LcFitError::DegenerateFit {
                    message: e.to_string(),
                    partial: Box::new(undefined()?),
                })
            }
        };
        let std_errors = standard_errors_from_covariance(&covar);
        if std_errors.iter().any(|e| !e.is_finite()) {
            return Err(LcFitError::DegenerateFit {
                message: "covariance has a negative or non-finite diagonal".to_string(),
                partial: Box::new(undefined()?),
            });
        }
        debug!("parameter correlations:\n{:.3}", calculate_correlation(&covar));

        let (err_neg, err_pos) = if self.monte_carlo.enabled {
            let mut rng = match self.monte_carlo.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            match monte_carlo_errors(&best, &covar, &bounds, self.monte_carlo.samples, &mut rng) {
                Ok(mc) => (mc.err_neg.to_vec(), mc.err_pos.to_vec()),
                Err(e) => {
                    warn!("Monte Carlo errors unavailable ({}), using symmetric errors", e);
                    (std_errors.to_vec(), std_errors.to_vec())
                }
            }
        } else {
            (std_errors.to_vec(), std_errors.to_vec())
        };

        info!("{}: chi^2 = {:.4} for {} samples", model, chi2, n_data);
        FitResult::new(model, names, best_values, err_neg, err_pos, chi2, dof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lightcurve::SegmentType;
    use crate::models::select_model;
    use approx::assert_relative_eq;

    fn power_law_curve(norm: f64, slope: f64) -> LightCurve {
        let time: Vec<f64> = (0..15).map(|i| 10f64.powf(1.0 + 0.2 * i as f64)).collect();
        let half: Vec<f64> = time.iter().map(|t| 0.01 * t).collect();
        let neg: Vec<f64> = half.iter().map(|h| -h).collect();
        let rate: Vec<f64> = time.iter().map(|t| norm * t.powf(-slope)).collect();
        let err: Vec<f64> = rate.iter().map(|r| 0.1 * r).collect();
        LightCurve::from_arrays(&time, &half, &neg, &rate, &err, SegmentType::PC).unwrap()
    }

    #[test]
    fn test_bounds_layout() {
        let model = select_model(1, 1).unwrap();
        let bounds = parameter_bounds(&model, (10.0, 1e4)).unwrap();
        assert_eq!(bounds.len(), model.param_count());

        let norm = bounds.get(0).unwrap();
        assert_eq!(norm.min, 0.0);
        assert!(!norm.has_upper_bound());
        let width = bounds.get(3).unwrap();
        assert_relative_eq!(width.min, 1e-2);
        assert_relative_eq!(width.max, 9990.0);
        assert!(!bounds.get(4).unwrap().has_lower_bound());
        assert_eq!(bounds.get(5).unwrap().max, 1e4);
    }

    #[test]
    fn test_residuals_vanish_at_truth() {
        let model = select_model(0, 0).unwrap();
        let lc = power_law_curve(1e3, 1.0);
        let problem = LightCurveProblem::new(model, &lc).unwrap();

        // Bins are 2% wide, so bin averages sit slightly above the point values.
        let residuals = problem.eval(&Array1::from_vec(vec![1e3, 1.0])).unwrap();
        assert!(residuals.iter().all(|r| r.abs() < 1e-3));
    }

    #[test]
    fn test_refine_from_truth() {
        let model = select_model(0, 0).unwrap();
        let lc = power_law_curve(1e3, 1.3);
        let fit = Refiner::new()
            .with_dof_convention(DofConvention::Conventional)
            .refine(&lc, model, &[1e3, 1.3])
            .unwrap();

        assert_relative_eq!(fit.param_values()[0], 1e3, max_relative = 1e-3);
        assert_relative_eq!(fit.param_values()[1], 1.3, max_relative = 1e-4);
        assert!(fit.chi_square() < 1e-3);
        assert_eq!(fit.degrees_of_freedom(), 13.0);
        assert!(fit.param_err_pos().iter().all(|e| e.is_finite() && *e >= 0.0));
    }

    #[test]
    fn test_clamps_out_of_bounds_start() {
        let model = select_model(0, 0).unwrap();
        let lc = power_law_curve(50.0, 0.8);
        let fit = Refiner::new().refine(&lc, model, &[-5.0, 0.8]).unwrap();
        assert_relative_eq!(fit.param_values()[0], 50.0, max_relative = 1e-2);
        assert_relative_eq!(fit.param_values()[1], 0.8, max_relative = 1e-2);
    }

    #[test]
    fn test_wrong_initial_length() {
        let model = select_model(0, 1).unwrap();
        let lc = power_law_curve(50.0, 0.8);
        assert!(matches!(
            Refiner::new().refine(&lc, model, &[1.0, 1.0]),
            Err(LcFitError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_invisible_flare_is_degenerate() {
        // A zero-amplitude flare far narrower than its bin leaves its
        // Jacobian columns empty.
        let model = select_model(1, 0).unwrap();
        let lc = power_law_curve(1e3, 1.2);
        let err = Refiner::new()
            .refine(&lc, model, &[1e3, 0.0, 1234.5, 0.02, 1.2])
            .unwrap_err();

        match &err {
            LcFitError::DegenerateFit { partial, .. } => {
                assert_eq!(partial.param_values().len(), 5);
                assert!(partial.has_undefined_errors());
                assert!(partial.param_err_pos().iter().all(|e| e.is_nan()));
            }
            other => panic!("expected DegenerateFit, got {:?}", other),
        }
    }

    #[test]
    fn test_seeded_monte_carlo_errors() {
        let model = select_model(0, 0).unwrap();
        // Alternate points 5% high and low so the reduced chi-square is not zero.
        let time: Vec<f64> = (0..15).map(|i| 10f64.powf(1.0 + 0.2 * i as f64)).collect();
        let half: Vec<f64> = time.iter().map(|t| 0.01 * t).collect();
        let neg: Vec<f64> = half.iter().map(|h| -h).collect();
        let rate: Vec<f64> = time
            .iter()
            .enumerate()
            .map(|(i, t)| 1e3 * t.powf(-1.3) * if i % 2 == 0 { 1.05 } else { 0.95 })
            .collect();
        let err: Vec<f64> = rate.iter().map(|r| 0.1 * r).collect();
        let lc = LightCurve::from_arrays(&time, &half, &neg, &rate, &err, SegmentType::PC).unwrap();

        let settings = MonteCarloSettings {
            enabled: true,
            samples: 2000,
            seed: Some(42),
        };
        let refiner = Refiner::new().with_monte_carlo(settings);
        let fit = refiner.refine(&lc, model, &[1e3, 1.3]).unwrap();
        let again = refiner.refine(&lc, model, &[1e3, 1.3]).unwrap();
        let symmetric = Refiner::new().refine(&lc, model, &[1e3, 1.3]).unwrap();

        for i in 0..2 {
            let (neg, pos) = (fit.param_err_neg()[i], fit.param_err_pos()[i]);
            assert!(neg.is_finite() && neg >= 0.0);
            assert!(pos.is_finite() && pos >= 0.0);
            assert_relative_eq!(pos, symmetric.param_err_pos()[i], max_relative = 0.25);
        }
        assert_eq!(fit.param_err_neg(), again.param_err_neg());
        assert_eq!(fit.param_err_pos(), again.param_err_pos());
    }

    #[test]
    fn test_iteration_budget_returns_partial() {
        let model = select_model(0, 0).unwrap();
        let lc = power_law_curve(1e3, 1.3);
        let solver = LmConfig {
            max_iterations: 1,
            ..LmConfig::default()
        };
        let err = Refiner::new()
            .with_solver(solver)
            .refine(&lc, model, &[1.0, 0.2])
            .unwrap_err();

        match &err {
            LcFitError::ConvergenceFailure { partial, .. } => {
                assert_eq!(partial.param_values().len(), 2);
                assert!(partial.has_undefined_errors());
            }
            other => panic!("expected ConvergenceFailure, got {:?}", other),
        }
    }
}
