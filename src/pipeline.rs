//! End-to-end fitting of one light curve, and of many in parallel.
//!
//! Picks → model selection → segmented log-log guess → flare guesses →
//! bounded refinement. Each stage fails fast; nothing is retried.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::FitConfig;
use crate::error::{LcFitError, Result};
use crate::guess::{flare_initial_guess, place_flares, FixedGuesses, FlareGuess, GuessCollector, Guesses};
use crate::lightcurve::LightCurve;
use crate::models::{select_model, ModelSpec};
use crate::refine::Refiner;
use crate::report::FitResult;
use crate::segmented::segmented_fit;

/// Starting point handed to the refiner.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialGuess {
    pub model: ModelSpec,
    pub params: Vec<f64>,
}

/// Fits light curves from analyst picks.
#[derive(Debug, Clone, Default)]
pub struct LightCurveFitter {
    refiner: Refiner,
}

impl LightCurveFitter {
    pub fn new(refiner: Refiner) -> Self {
        Self { refiner }
    }

    pub fn from_config(config: &FitConfig) -> Self {
        Self::new(Refiner::from_config(config))
    }

    pub fn refiner(&self) -> &Refiner {
        &self.refiner
    }

    /// Collect picks and fit.
    ///
    /// A light curve without fittable samples is rejected before the
    /// collector is asked for anything.
    pub fn fit(&self, lc: &LightCurve, collector: &mut dyn GuessCollector) -> Result<FitResult> {
        if lc.fit_samples().is_empty() {
            return Err(LcFitError::InvalidInput("empty light curve".to_string()));
        }
        let guesses = collector.collect(lc)?;
        self.fit_with_guesses(lc, &guesses)
    }

    /// Fit with picks already in hand.
    pub fn fit_with_guesses(&self, lc: &LightCurve, guesses: &Guesses) -> Result<FitResult> {
        let initial = self.initial_guess(lc, guesses)?;
        info!("Refining {} over {} samples", initial.model, lc.fit_samples().len());
        self.refiner.refine(lc, initial.model, &initial.params)
    }

    /// Model and starting parameters for the given picks.
    pub fn initial_guess(&self, lc: &LightCurve, guesses: &Guesses) -> Result<InitialGuess> {
        let data = lc.fit_samples();
        let span = data
            .time_span()
            .ok_or_else(|| LcFitError::InvalidInput("empty light curve".to_string()))?;

        let breaks = guesses.break_times()?;
        let model = select_model(guesses.num_flares(), breaks.len())?;

        let (time, rate) = (data.times(), data.rates());
        let segmented = segmented_fit(&time, &rate, &breaks)?;
        let baseline = segmented.model().unpack(segmented.params())?.baseline;

        let mut picks = match &guesses.flares {
            FlareGuess::At(picks) => picks.clone(),
            FlareGuess::Count(n) => place_flares(&baseline, &time.to_vec(), &rate.to_vec(), *n)?,
        };
        picks.sort_by(|a, b| a.time.total_cmp(&b.time));
        let flares = flare_initial_guess(&baseline, &picks, &breaks, span);

        let mut params = Vec::with_capacity(model.param_count());
        params.push(segmented.params()[0]);
        for flare in &flares {
            params.extend([flare.amp, flare.center, flare.width]);
        }
        params.extend_from_slice(&segmented.params()[1..]);
        debug!("initial {} parameters: {:?}", model, params);

        Ok(InitialGuess { model, params })
    }

    /// Fit independent light curves in parallel; results keep input order.
    pub fn fit_batch(&self, jobs: &[(LightCurve, Guesses)]) -> Vec<Result<FitResult>> {
        jobs.par_iter()
            .map(|(lc, guesses)| self.fit(lc, &mut FixedGuesses::new(guesses.clone())))
            .collect()
    }
}
