//! Fit results and the fit-report text format.
//!
//! A [`FitResult`] is produced once per fitting attempt, by the segmented
//! fitter (with zero errors) or by the refiner, and never changes afterwards.
//!
//! The text report is a whitespace-delimited file with one
//! `name value err_neg err_pos` row per parameter, followed by a `chisq` row
//! and a `dof` row. A row starting with `no` marks a burst without a fit.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{LcFitError, Result};
use crate::models::{model_from_names, ModelSpec};
use crate::utils::parse::{labelled_row, token};

/// Default report file name inside a GRB directory.
pub const DEFAULT_REPORT_FILE: &str = "lc_fit_out_idl_int9.dat";

/// How the degrees of freedom of a fit are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DofConvention {
    /// `n_data + n_params`, as written by the historical fitting tool.
    #[default]
    Legacy,
    /// `n_data − n_params`.
    Conventional,
}

impl DofConvention {
    pub fn degrees_of_freedom(&self, n_data: usize, n_params: usize) -> f64 {
        match self {
            DofConvention::Legacy => (n_data + n_params) as f64,
            DofConvention::Conventional => n_data as f64 - n_params as f64,
        }
    }
}

/// `Σ((rate − model(time)) / rate_err)²` with the instantaneous model.
pub fn chi_square(
    model: &ModelSpec,
    params: &[f64],
    time: &Array1<f64>,
    rate: &Array1<f64>,
    rate_err: &Array1<f64>,
) -> Result<f64> {
    if time.len() != rate.len() || time.len() != rate_err.len() {
        return Err(LcFitError::DimensionMismatch(format!(
            "time, rate and error lengths differ: {}, {}, {}",
            time.len(),
            rate.len(),
            rate_err.len()
        )));
    }
    let predicted = model.eval(time, params)?;
    Ok(rate
        .iter()
        .zip(predicted.iter())
        .zip(rate_err.iter())
        .map(|((r, m), e)| ((r - m) / e).powi(2))
        .sum())
}

/// Serialized form, validated on the way back in.
#[derive(Serialize, Deserialize)]
struct FitResultRepr {
    model: ModelSpec,
    param_names: Vec<String>,
    param_values: Vec<f64>,
    param_err_neg: Vec<f64>,
    param_err_pos: Vec<f64>,
    chi_square: f64,
    degrees_of_freedom: f64,
}

/// Best-fit parameters, errors and goodness of fit for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FitResultRepr", into = "FitResultRepr")]
pub struct FitResult {
    model: ModelSpec,
    param_names: Vec<String>,
    param_values: Vec<f64>,
    param_err_neg: Vec<f64>,
    param_err_pos: Vec<f64>,
    chi_square: f64,
    degrees_of_freedom: f64,
}

impl TryFrom<FitResultRepr> for FitResult {
    type Error = LcFitError;

    fn try_from(repr: FitResultRepr) -> Result<Self> {
        FitResult::new(
            repr.model,
            repr.param_names,
            repr.param_values,
            repr.param_err_neg,
            repr.param_err_pos,
            repr.chi_square,
            repr.degrees_of_freedom,
        )
    }
}

impl From<FitResult> for FitResultRepr {
    fn from(fit: FitResult) -> Self {
        Self {
            model: fit.model,
            param_names: fit.param_names,
            param_values: fit.param_values,
            param_err_neg: fit.param_err_neg,
            param_err_pos: fit.param_err_pos,
            chi_square: fit.chi_square,
            degrees_of_freedom: fit.degrees_of_freedom,
        }
    }
}

impl FitResult {
    /// Build a result, checking that every vector has one entry per model parameter.
    pub fn new(
        model: ModelSpec,
        param_names: Vec<String>,
        param_values: Vec<f64>,
        param_err_neg: Vec<f64>,
        param_err_pos: Vec<f64>,
        chi_square: f64,
        degrees_of_freedom: f64,
    ) -> Result<Self> {
        let nump = model.param_count();
        for (what, len) in [
            ("names", param_names.len()),
            ("values", param_values.len()),
            ("negative errors", param_err_neg.len()),
            ("positive errors", param_err_pos.len()),
        ] {
            if len != nump {
                return Err(LcFitError::DimensionMismatch(format!(
                    "Model {} has {} parameters but {} {} were given",
                    model, nump, len, what
                )));
            }
        }

        Ok(Self {
            model,
            param_names,
            param_values,
            param_err_neg,
            param_err_pos,
            chi_square,
            degrees_of_freedom,
        })
    }

    /// A result with canonical names and zero errors, as produced by the
    /// segmented initial guess.
    pub fn initial_guess(model: ModelSpec, values: Vec<f64>, chi_square: f64, degrees_of_freedom: f64) -> Result<Self> {
        let zeros = vec![0.0; values.len()];
        Self::new(
            model,
            model.param_names(),
            values,
            zeros.clone(),
            zeros,
            chi_square,
            degrees_of_freedom,
        )
    }

    /// A result with canonical names and the same error on both sides.
    pub fn with_symmetric_errors(
        model: ModelSpec,
        values: Vec<f64>,
        errors: Vec<f64>,
        chi_square: f64,
        degrees_of_freedom: f64,
    ) -> Result<Self> {
        Self::new(
            model,
            model.param_names(),
            values,
            errors.clone(),
            errors,
            chi_square,
            degrees_of_freedom,
        )
    }

    pub fn model(&self) -> ModelSpec {
        self.model
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn param_values(&self) -> &[f64] {
        &self.param_values
    }

    pub fn param_err_neg(&self) -> &[f64] {
        &self.param_err_neg
    }

    pub fn param_err_pos(&self) -> &[f64] {
        &self.param_err_pos
    }

    pub fn chi_square(&self) -> f64 {
        self.chi_square
    }

    pub fn degrees_of_freedom(&self) -> f64 {
        self.degrees_of_freedom
    }

    pub fn reduced_chi_square(&self) -> f64 {
        self.chi_square / self.degrees_of_freedom
    }

    /// `(value, err_neg, err_pos)` of the named parameter.
    pub fn param(&self, name: &str) -> Option<(f64, f64, f64)> {
        self.param_names
            .iter()
            .position(|n| n == name)
            .map(|i| (self.param_values[i], self.param_err_neg[i], self.param_err_pos[i]))
    }

    /// True when any error is NaN, i.e. the covariance could not be inverted.
    pub fn has_undefined_errors(&self) -> bool {
        self.param_err_neg
            .iter()
            .chain(self.param_err_pos.iter())
            .any(|e| e.is_nan())
    }

    /// The fitted model at the instants `t`.
    pub fn evaluate(&self, t: &Array1<f64>) -> Result<Array1<f64>> {
        self.model.eval(t, &self.param_values)
    }

    /// The fitted model averaged over the bins `[t_start[i], t_end[i]]`.
    pub fn evaluate_integrated(&self, t_start: &Array1<f64>, t_end: &Array1<f64>) -> Result<Array1<f64>> {
        self.model.eval_integrated(t_start, t_end, &self.param_values)
    }

    /// Write the fixed-width text report.
    pub fn write_report<W: Write>(&self, mut writer: W) -> Result<()> {
        for i in 0..self.param_values.len() {
            writeln!(
                writer,
                "{:<16}{:>22.12e}{:>22.12e}{:>22.12e}",
                self.param_names[i], self.param_values[i], self.param_err_neg[i], self.param_err_pos[i]
            )?;
        }
        writeln!(writer, "{:<16}{:>22.12e}", "chisq", self.chi_square)?;
        writeln!(writer, "{:<16}{:>22.12e}", "dof", self.degrees_of_freedom)?;
        Ok(())
    }

    pub fn to_report_string(&self) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_report(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Write the text report to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = std::io::BufWriter::new(fs::File::create(path)?);
        self.write_report(&mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), model = %self.model, "wrote fit report");
        Ok(())
    }

    /// Write the result as pretty-printed JSON to `path`.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a result previously written by [`FitResult::save_json`].
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Parse the text of a fit report.
///
/// Returns `Ok(None)` for a report that records no fit. The model is
/// recovered from the parameter count and the number of flare parameters.
pub fn parse_report(text: &str) -> Result<Option<FitResult>> {
    let mut names = Vec::new();
    let mut values = Vec::new();
    let mut err_neg = Vec::new();
    let mut err_pos = Vec::new();
    let mut chi_square = None;
    let mut dof = None;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        if matches!(token(line), Ok((_, "no"))) {
            debug!(line = line_no, "report marks no fit");
            break;
        }

        let (label, numbers) = labelled_row(line).ok_or_else(|| LcFitError::Parse {
            line: line_no,
            message: format!("expected a label followed by numbers, got {:?}", line.trim()),
        })?;

        match numbers.len() {
            n if n >= 3 => {
                names.push(label.to_string());
                values.push(numbers[0]);
                err_neg.push(numbers[1]);
                err_pos.push(numbers[2]);
            }
            1 if chi_square.is_none() => chi_square = Some(numbers[0]),
            1 if dof.is_none() => dof = Some(numbers[0]),
            1 => warn!(line = line_no, label, "ignoring extra statistic row"),
            n => {
                return Err(LcFitError::Parse {
                    line: line_no,
                    message: format!("row {:?} has {} value(s)", label, n),
                })
            }
        }
    }

    if names.is_empty() {
        return Ok(None);
    }

    let model = model_from_names(&names)?;
    let fit = FitResult::new(
        model,
        names,
        values,
        err_neg,
        err_pos,
        chi_square.unwrap_or(f64::NAN),
        dof.unwrap_or(f64::NAN),
    )?;
    Ok(Some(fit))
}

/// Read a fit report; a missing file reads as "no fit".
pub fn read_report(path: impl AsRef<Path>) -> Result<Option<FitResult>> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "no fit report");
        return Ok(None);
    }
    parse_report(&fs::read_to_string(path)?)
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model: {}", self.model)?;
        writeln!(f, "{:<16}{:>14}{:>14}{:>14}", "Parameter", "Value", "-Err", "+Err")?;
        for i in 0..self.param_values.len() {
            writeln!(
                f,
                "{:<16}{:>14.5e}{:>14.5e}{:>14.5e}",
                self.param_names[i], self.param_values[i], self.param_err_neg[i], self.param_err_pos[i]
            )?;
        }
        writeln!(
            f,
            "chi^2 = {:.4}  dof = {}  reduced chi^2 = {:.4}",
            self.chi_square,
            self.degrees_of_freedom,
            self.reduced_chi_square()
        )
    }
}
