//! Spectral-fit companion files.
//!
//! Each GRB directory may hold up to three absorbed power-law fits made by
//! the archive pipeline. The files are read positionally: the value on each
//! of the first nine lines has a fixed token index.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{LcFitError, Result};
use crate::utils::parse::float;

/// Which part of the light curve a spectrum was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpectralMode {
    WT,
    PC,
    /// PC data after the last flare or break.
    PCLATE,
}

impl fmt::Display for SpectralMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpectralMode::WT => "WT",
            SpectralMode::PC => "PC",
            SpectralMode::PCLATE => "PCLATE",
        };
        f.write_str(name)
    }
}

/// Spectral-fit files and the mode each one describes.
pub const SPECTRAL_FILES: [(&str, SpectralMode); 3] = [
    ("interval0wt_fit.fit", SpectralMode::WT),
    ("interval0pc_fit.fit", SpectralMode::PC),
    ("late_timepc_fit.fit", SpectralMode::PCLATE),
];

/// A fitted quantity with optional 90% bounds turned into error magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub err_neg: Option<f64>,
    pub err_pos: Option<f64>,
}

impl Measurement {
    /// Bounds equal to `sentinel` mean the error was not computed.
    fn from_bounds(value: f64, lower: f64, upper: f64, sentinel: f64) -> Self {
        Self {
            value,
            err_neg: (lower != sentinel).then(|| value - lower),
            err_pos: (upper != sentinel).then(|| upper - value),
        }
    }
}

/// One absorbed power-law spectral fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralFit {
    pub mode: SpectralMode,
    pub galactic_nh: f64,
    pub intrinsic_nh: Measurement,
    pub photon_index: Measurement,
    pub absorbed_flux: Measurement,
    pub unabsorbed_flux: Measurement,
    pub cstat: f64,
    pub dof: f64,
    pub count_rate: f64,
    /// Count-rate to flux conversion factor.
    pub correction_factor: f64,
    pub on_time: String,
}

const LINES: usize = 9;

fn split_tokens(line: &str) -> Vec<&str> {
    line.split(|c: char| c.is_whitespace() || matches!(c, ',' | '(' | ')' | '=' | ':'))
        .filter(|tok| !tok.is_empty())
        .collect()
}

struct Lines<'a> {
    rows: Vec<Vec<&'a str>>,
}

impl<'a> Lines<'a> {
    fn token(&self, line: usize, index: usize) -> Result<&'a str> {
        self.rows
            .get(line)
            .and_then(|row| row.get(index))
            .copied()
            .ok_or_else(|| LcFitError::Parse {
                line: line + 1,
                message: format!("expected at least {} fields", index + 1),
            })
    }

    fn number(&self, line: usize, index: usize) -> Result<f64> {
        let tok = self.token(line, index)?;
        float(tok).ok_or_else(|| LcFitError::Parse {
            line: line + 1,
            message: format!("field {} is not a number: {:?}", index + 1, tok),
        })
    }

    fn measurement(&self, line: usize, first: usize, sentinel: f64) -> Result<Measurement> {
        Ok(Measurement::from_bounds(
            self.number(line, first)?,
            self.number(line, first + 1)?,
            self.number(line, first + 2)?,
            sentinel,
        ))
    }
}

/// Parse the text of one spectral-fit file.
pub fn parse_spectral_fit(text: &str, mode: SpectralMode) -> Result<SpectralFit> {
    let lines = Lines {
        rows: text.lines().take(LINES).map(split_tokens).collect(),
    };
    if lines.rows.len() < LINES {
        return Err(LcFitError::Parse {
            line: lines.rows.len() + 1,
            message: format!("spectral fit needs {} lines", LINES),
        });
    }

    Ok(SpectralFit {
        mode,
        galactic_nh: lines.number(0, 1)?,
        intrinsic_nh: lines.measurement(1, 1, 0.0)?,
        photon_index: lines.measurement(2, 1, 0.0)?,
        absorbed_flux: lines.measurement(3, 2, 1.0)?,
        unabsorbed_flux: lines.measurement(4, 2, 1.0)?,
        cstat: lines.number(5, 1)?,
        dof: lines.number(5, 3)?,
        count_rate: lines.number(6, 3)?,
        correction_factor: lines.number(7, 2)?,
        on_time: lines.token(8, 1)?.to_string(),
    })
}

/// Read every spectral-fit file present in `dir`.
///
/// Each file keeps its own mode, so a missing WT fit does not shift the PC
/// fit into the WT slot.
pub fn read_spectral_fits(dir: impl AsRef<Path>) -> Result<Vec<SpectralFit>> {
    let dir = dir.as_ref();
    let mut fits = Vec::new();
    for (file, mode) in SPECTRAL_FILES {
        let path = dir.join(file);
        if !path.is_file() {
            continue;
        }
        debug!("Reading {} spectral fit from {}", mode, path.display());
        fits.push(parse_spectral_fit(&fs::read_to_string(&path)?, mode)?);
    }
    Ok(fits)
}
