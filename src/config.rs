//! Run configuration.
//!
//! Everything that used to be a hard-coded path or solver constant lives in
//! [`FitConfig`], which is read from and written to JSON. Missing keys take
//! their defaults, so a config file only needs the settings it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::lm::LmConfig;
use crate::report::{DofConvention, DEFAULT_REPORT_FILE};
use crate::uncertainty::MonteCarloSettings;

/// Settings for loading data and fitting light curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Directory holding one sub-directory per GRB. Default: `.`
    pub data_dir: PathBuf,

    /// Fit-report file name inside a GRB directory. Default: `lc_fit_out_idl_int9.dat`
    pub report_file_name: String,

    /// Levenberg-Marquardt settings.
    pub solver: LmConfig,

    /// How degrees of freedom are counted. Default: legacy `n + p`
    pub dof_convention: DofConvention,

    /// Treat rate errors as absolute instead of rescaling the covariance by
    /// the reduced chi-square. Default: false
    pub absolute_sigma: bool,

    /// Monte Carlo asymmetric errors. Default: disabled
    pub monte_carlo: MonteCarloSettings,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            report_file_name: DEFAULT_REPORT_FILE.to_string(),
            solver: LmConfig::default(),
            dof_convention: DofConvention::default(),
            absolute_sigma: false,
            monte_carlo: MonteCarloSettings::default(),
        }
    }
}

impl FitConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.solver.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Report path for the GRB directory `grb_dir`.
    pub fn report_path(&self, grb_dir: impl AsRef<Path>) -> PathBuf {
        grb_dir.as_ref().join(&self.report_file_name)
    }
}
