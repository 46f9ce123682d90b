//! Initial conditions for a fit.
//!
//! The analyst marks approximate flare peaks and break times on the light
//! curve. [`GuessCollector`] abstracts where those picks come from: a fixed
//! set for tests and batch runs, or terminal prompts.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use tracing::debug;

use crate::error::{LcFitError, Result};
use crate::lightcurve::LightCurve;
use crate::models::{BrokenPowerLaw, GaussianFlare};
use crate::utils::parse::float;

/// Minimum separation, in dex of time, between automatically placed flares.
pub const MIN_FLARE_SEPARATION_DEX: f64 = 0.1;

/// A point marked on the light curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub time: f64,
    pub rate: f64,
}

impl Pick {
    pub fn new(time: f64, rate: f64) -> Self {
        Self { time, rate }
    }

    /// Pick at `time` with the rate of the sample nearest in log time.
    pub fn on_curve(lc: &LightCurve, time: f64) -> Self {
        let rate = lc
            .samples()
            .iter()
            .filter(|s| s.time > 0.0)
            .min_by(|a, b| {
                let da = (a.time.ln() - time.ln()).abs();
                let db = (b.time.ln() - time.ln()).abs();
                da.total_cmp(&db)
            })
            .map_or(f64::NAN, |s| s.rate);
        Self { time, rate }
    }
}

/// How flares were indicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlareGuess {
    /// Peaks marked by hand.
    At(Vec<Pick>),
    /// Only the number of flares; peaks are placed from the residuals.
    Count(usize),
}

/// Flare and break picks for one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guesses {
    pub flares: FlareGuess,
    pub breaks: Vec<Pick>,
}

impl Default for Guesses {
    fn default() -> Self {
        Self {
            flares: FlareGuess::At(Vec::new()),
            breaks: Vec::new(),
        }
    }
}

impl Guesses {
    pub fn new(flares: Vec<Pick>, breaks: Vec<Pick>) -> Self {
        Self {
            flares: FlareGuess::At(flares),
            breaks,
        }
    }

    pub fn with_flare_count(count: usize, breaks: Vec<Pick>) -> Self {
        Self {
            flares: FlareGuess::Count(count),
            breaks,
        }
    }

    pub fn num_flares(&self) -> usize {
        match &self.flares {
            FlareGuess::At(picks) => picks.len(),
            FlareGuess::Count(n) => *n,
        }
    }

    pub fn num_breaks(&self) -> usize {
        self.breaks.len()
    }

    /// Break times, which must be finite, positive and strictly increasing.
    ///
    /// Out-of-order or repeated breaks are rejected rather than reordered.
    pub fn break_times(&self) -> Result<Vec<f64>> {
        let times: Vec<f64> = self.breaks.iter().map(|p| p.time).collect();
        if let Some(bad) = times.iter().find(|t| !(t.is_finite() && **t > 0.0)) {
            return Err(LcFitError::InvalidInput(format!("invalid break time {}", bad)));
        }
        if let Some(w) = times.windows(2).find(|w| w[0] >= w[1]) {
            return Err(LcFitError::InvalidInput(format!(
                "break times must increase, got {} then {}",
                w[0], w[1]
            )));
        }
        Ok(times)
    }
}

/// Source of flare and break picks.
pub trait GuessCollector {
    fn collect(&mut self, lc: &LightCurve) -> Result<Guesses>;
}

/// Picks decided in advance.
#[derive(Debug, Clone, Default)]
pub struct FixedGuesses {
    guesses: Guesses,
}

impl FixedGuesses {
    pub fn new(guesses: Guesses) -> Self {
        Self { guesses }
    }
}

impl GuessCollector for FixedGuesses {
    fn collect(&mut self, _lc: &LightCurve) -> Result<Guesses> {
        Ok(self.guesses.clone())
    }
}

/// Picks given as bare times; rates are read off the light curve.
#[derive(Debug, Clone, Default)]
pub struct FixedTimes {
    flare_times: Vec<f64>,
    break_times: Vec<f64>,
}

impl FixedTimes {
    pub fn new(flare_times: Vec<f64>, break_times: Vec<f64>) -> Self {
        Self {
            flare_times,
            break_times,
        }
    }
}

impl GuessCollector for FixedTimes {
    fn collect(&mut self, lc: &LightCurve) -> Result<Guesses> {
        let pick = |t: &f64| Pick::on_curve(lc, *t);
        Ok(Guesses::new(
            self.flare_times.iter().map(pick).collect(),
            self.break_times.iter().map(pick).collect(),
        ))
    }
}

/// Reads picks from a terminal.
///
/// Each prompt takes one line of comma-separated times; a blank line means
/// none. After both prompts the picks are shown and can be redone.
pub struct PromptCollector<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptCollector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(LcFitError::InvalidInput("input closed while collecting picks".to_string()));
        }
        Ok(line.trim().to_string())
    }

    fn read_times(&mut self, prompt: &str) -> Result<Vec<f64>> {
        loop {
            let line = self.read_line(prompt)?;
            if line.is_empty() {
                return Ok(Vec::new());
            }
            let parsed: Option<Vec<f64>> = line
                .split(',')
                .map(|tok| float(tok.trim()).filter(|t| *t > 0.0))
                .collect();
            match parsed {
                Some(times) => return Ok(times),
                None => writeln!(self.output, "Could not read {:?}; enter positive times separated by commas", line)?,
            }
        }
    }
}

impl<R: BufRead, W: Write> GuessCollector for PromptCollector<R, W> {
    fn collect(&mut self, lc: &LightCurve) -> Result<Guesses> {
        loop {
            let flares = self.read_times("Flare peak times (s, comma-separated, blank for none): ")?;
            let mut breaks = self.read_times("Break times (s, comma-separated, blank for none): ")?;
            writeln!(self.output, "{} flare(s) at {:?}, {} break(s) at {:?}", flares.len(), flares, breaks.len(), breaks)?;

            let answer = self.read_line("Redo? [y/N] ")?;
            if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") {
                debug!("redoing picks");
                continue;
            }
            // Typed picks come in any order; explicit break lists do not.
            breaks.sort_by(f64::total_cmp);
            return FixedTimes::new(flares, breaks).collect(lc);
        }
    }
}

/// Initial Gaussians for the picked flare peaks.
///
/// Amplitude is the pick's excess over the baseline, or half the baseline when
/// the pick lies below it. Width is a quarter of the distance to the nearest
/// break, other flare or edge of `span`, and at least `1e-3` of the span start.
pub fn flare_initial_guess(
    baseline: &BrokenPowerLaw,
    picks: &[Pick],
    breaks: &[f64],
    span: (f64, f64),
) -> Vec<GaussianFlare> {
    let (t_min, t_max) = span;
    picks
        .iter()
        .enumerate()
        .map(|(i, pick)| {
            let base = baseline.value(pick.time);
            let excess = pick.rate - base;
            let amp = if excess > 0.0 { excess } else { 0.5 * base };

            let neighbours = picks
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, other)| other.time)
                .chain(breaks.iter().copied())
                .chain([t_min, t_max]);
            let gap = neighbours
                .map(|t| (t - pick.time).abs())
                .filter(|d| *d > 0.0)
                .fold(f64::INFINITY, f64::min);
            let width = if gap.is_finite() { gap / 4.0 } else { (t_max - t_min) / 4.0 };

            GaussianFlare {
                amp,
                center: pick.time,
                width: width.max(1e-3 * t_min),
            }
        })
        .collect()
}

/// Place `count` flare picks at the largest positive log residuals of the
/// baseline, at least [`MIN_FLARE_SEPARATION_DEX`] apart in time.
pub fn place_flares(baseline: &BrokenPowerLaw, time: &[f64], rate: &[f64], count: usize) -> Result<Vec<Pick>> {
    let mut candidates: Vec<(f64, usize)> = time
        .iter()
        .zip(rate)
        .enumerate()
        .filter(|(_, (t, r))| **t > 0.0 && **r > 0.0)
        .map(|(i, (t, r))| (r.log10() - baseline.value(*t).log10(), i))
        .filter(|(resid, _)| *resid > 0.0)
        .collect();
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut picks: Vec<Pick> = Vec::with_capacity(count);
    for (_, i) in candidates {
        if picks.len() == count {
            break;
        }
        let log_t = time[i].log10();
        if picks.iter().all(|p| (p.time.log10() - log_t).abs() >= MIN_FLARE_SEPARATION_DEX) {
            picks.push(Pick::new(time[i], rate[i]));
        }
    }

    if picks.len() < count {
        return Err(LcFitError::InvalidInput(format!(
            "found room for {} of {} flares above the baseline",
            picks.len(),
            count
        )));
    }
    picks.sort_by(|a, b| a.time.total_cmp(&b.time));
    Ok(picks)
}
