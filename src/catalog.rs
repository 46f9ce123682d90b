//! Per-GRB records and catalog loading.
//!
//! A data directory holds one sub-directory per burst, named after the burst,
//! containing the light-curve tables, an optional saved fit report and
//! optional spectral fits.

use nom::{
    bytes::complete::{tag, take_till1, take_until},
    character::complete::{alpha1, char, digit1, space0, space1},
    combinator::opt,
    number::complete::double,
    sequence::preceded,
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::FitConfig;
use crate::error::{LcFitError, Result};
use crate::lightcurve::qdp::COMBINED_FILE;
use crate::lightcurve::{read_light_curve_dir, LightCurve};
use crate::report::{read_report, FitResult};
use crate::spectrum::{read_spectral_fits, SpectralFit};

const TRIGGER_MARKER: &str = "T0 for this burst is Swift";

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Trigger time written in the header of `curve.qdp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    /// Swift mission elapsed time of the trigger, in seconds.
    pub met: f64,
    /// UTC trigger time as `YYYY-MM-DD hh:mm:ss`.
    pub utc: Option<String>,
}

fn utc_stamp(input: &str) -> IResult<&str, (&str, &str, &str, &str)> {
    (
        preceded((space0, char('('), space0), digit1),
        preceded(space1, alpha1),
        preceded(space1, digit1),
        preceded(
            (space1, tag("at"), space1),
            take_till1(|c: char| c.is_whitespace() || c == ')'),
        ),
    )
        .parse(input)
}

fn met_and_stamp(input: &str) -> IResult<&str, (f64, Option<(&str, &str, &str, &str)>)> {
    let (input, _) = take_until("MET=").parse(input)?;
    preceded(tag("MET="), (double, opt(utc_stamp))).parse(input)
}

/// Parse a `T0 for this burst is Swift MET=… (YYYY Mon DD at hh:mm:ss UT)` line.
pub fn parse_trigger_header(line: &str) -> Option<TriggerInfo> {
    if !line.contains(TRIGGER_MARKER) {
        return None;
    }
    let (_, (met, stamp)) = met_and_stamp(line).ok()?;
    let utc = stamp.and_then(|(year, month, day, clock)| {
        let month = MONTHS.iter().position(|m| m.eq_ignore_ascii_case(month))? + 1;
        let day: u32 = day.parse().ok()?;
        Some(format!("{}-{:02}-{:02} {}", year, month, day, clock))
    });
    Some(TriggerInfo { met, utc })
}

/// Everything known about one burst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrbRecord {
    pub name: String,
    pub trigger: Option<TriggerInfo>,
    pub light_curve: LightCurve,
    /// Saved fit, if the directory holds a report with one.
    pub fit: Option<FitResult>,
    pub spectra: Vec<SpectralFit>,
}

impl GrbRecord {
    /// Load a burst from its directory.
    pub fn load(dir: impl AsRef<Path>, config: &FitConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| LcFitError::InvalidInput(format!("{} has no burst name", dir.display())))?
            .to_string();

        let combined = dir.join(COMBINED_FILE);
        let trigger = if combined.is_file() {
            fs::read_to_string(&combined)?
                .lines()
                .take(5)
                .find_map(parse_trigger_header)
        } else {
            None
        };
        if trigger.is_none() {
            debug!("{}: no trigger header", name);
        }

        let record = Self {
            light_curve: read_light_curve_dir(dir)?,
            fit: read_report(config.report_path(dir))?,
            spectra: read_spectral_fits(dir)?,
            trigger,
            name,
        };
        debug!(
            "{}: {} samples, fit {}, {} spectra",
            record.name,
            record.light_curve.len(),
            record.fit.as_ref().map_or("none", |f| f.model().name()),
            record.spectra.len()
        );
        Ok(record)
    }

    /// Trigger time in Swift MET, if known.
    pub fn met(&self) -> Option<f64> {
        self.trigger.as_ref().map(|t| t.met)
    }
}

/// Load every burst directory under `base_dir`, sorted by name.
///
/// Directories that fail to load are skipped with a warning.
pub fn load_catalog(base_dir: impl AsRef<Path>, config: &FitConfig) -> Result<Vec<GrbRecord>> {
    let base_dir = base_dir.as_ref();
    let mut dirs: Vec<_> = fs::read_dir(base_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut records = Vec::with_capacity(dirs.len());
    for dir in dirs {
        match GrbRecord::load(&dir, config) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping {}: {}", dir.display(), e),
        }
    }
    info!("Loaded {} bursts from {}", records.len(), base_dir.display());
    Ok(records)
}
