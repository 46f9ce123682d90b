//! QDP light-curve tables.
//!
//! The archive ships one table per readout mode (`WTCURVE.qdp`, `WTUL.qdp`,
//! `PCCURVE.qdp`, `PCUL.qdp`) plus a combined `curve.qdp` whose `WTSLEW`
//! section holds the slew-time data. Columns are located by header name, so
//! extra columns such as `SYS_NEG`/`SYS_POS` are ignored.

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::{LightCurve, Sample, SegmentType};
use crate::error::{LcFitError, Result};
use crate::utils::parse::float;

/// Per-mode table files of a GRB directory.
pub const MODE_FILES: [(&str, SegmentType); 4] = [
    ("WTCURVE.qdp", SegmentType::WT),
    ("WTUL.qdp", SegmentType::WTUL),
    ("PCCURVE.qdp", SegmentType::PC),
    ("PCUL.qdp", SegmentType::PCUL),
];

/// Combined table holding the `WTSLEW` section.
pub const COMBINED_FILE: &str = "curve.qdp";

const REQUIRED_COLUMNS: [&str; 6] = ["Time", "T_+ve", "T_-ve", "Rate", "Ratepos", "Rateneg"];

/// Column positions resolved from a header line.
#[derive(Debug, Clone, Copy)]
struct Header {
    required: [usize; 6],
    type_column: Option<usize>,
}

impl Header {
    fn parse(line: &str) -> Option<Self> {
        let names: Vec<&str> = line
            .split_whitespace()
            .map(|name| name.trim_start_matches('!'))
            .collect();
        if !names.first()?.eq_ignore_ascii_case("Time") {
            return None;
        }

        let find = |wanted: &str| names.iter().position(|name| name.eq_ignore_ascii_case(wanted));
        let mut required = [0; 6];
        for (slot, wanted) in required.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = find(wanted)?;
        }
        Some(Self {
            required,
            type_column: find("Type"),
        })
    }

    fn row(&self, line: &str, default_type: SegmentType) -> Option<Sample> {
        let cells: Vec<&str> = line.split_whitespace().collect();
        let mut values = [0.0; 6];
        for (value, &col) in values.iter_mut().zip(self.required.iter()) {
            *value = float(cells.get(col)?)?;
        }
        let segment_type = match self.type_column {
            Some(col) => cells.get(col)?.parse().ok()?,
            None => default_type,
        };

        let [time, time_pos, time_neg, rate, rate_pos, rate_neg] = values;
        Some(Sample {
            time,
            time_pos,
            time_neg,
            rate,
            rate_pos,
            rate_neg,
            segment_type,
        })
    }
}

fn is_directive(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty()
        || trimmed.starts_with('!')
        || trimmed.starts_with('#')
        || trimmed
            .split_whitespace()
            .next()
            .is_some_and(|tok| tok.eq_ignore_ascii_case("READ") || tok.eq_ignore_ascii_case("NO"))
}

fn second_token(line: &str) -> Option<&str> {
    line.split_whitespace().nth(1)
}

fn parse_rows<'a>(
    header: &Header,
    lines: impl Iterator<Item = (usize, &'a str)>,
    default_type: SegmentType,
) -> Vec<Sample> {
    let mut samples = Vec::new();
    for (lineno, line) in lines {
        if is_directive(line) {
            continue;
        }
        match header.row(line, default_type) {
            Some(sample) => samples.push(sample),
            None => warn!("Skipping malformed QDP row {}: {:?}", lineno + 1, line.trim()),
        }
    }
    samples
}

/// Parse a whole QDP table.
///
/// Rows take their type from a `Type` column when one exists, otherwise
/// `default_type`.
pub fn parse_qdp_table(text: &str, default_type: SegmentType) -> Result<Vec<Sample>> {
    let mut lines = text.lines().enumerate();
    let header = lines
        .by_ref()
        .find_map(|(_, line)| Header::parse(line))
        .ok_or_else(|| LcFitError::InvalidInput("QDP table has no Time/Rate header".to_string()))?;

    let samples = parse_rows(&header, lines, default_type);
    debug!("Parsed {} QDP rows", samples.len());
    Ok(samples)
}

/// Extract the `WTSLEW` section of a combined `curve.qdp` table.
///
/// The section starts after a line whose second token is `WTSLEW`, its first
/// following line is the header and it ends at a line whose second token is
/// `NO`. A table without the section yields no samples.
pub fn parse_wtslew_section(text: &str) -> Result<Vec<Sample>> {
    let mut lines = text.lines().enumerate();
    if lines.by_ref().find(|(_, line)| second_token(line) == Some("WTSLEW")).is_none() {
        return Ok(Vec::new());
    }

    let header = lines
        .by_ref()
        .find(|(_, line)| !line.trim().is_empty())
        .and_then(|(_, line)| Header::parse(line))
        .ok_or_else(|| LcFitError::InvalidInput("WTSLEW section has no header".to_string()))?;

    let body = lines.take_while(|(_, line)| second_token(line) != Some("NO"));
    Ok(parse_rows(&header, body, SegmentType::WTSLEW))
}

/// Read every mode table of a GRB directory into one light curve.
pub fn read_light_curve_dir(dir: impl AsRef<Path>) -> Result<LightCurve> {
    let dir = dir.as_ref();
    let mut samples = Vec::new();
    let mut found = false;

    for (file, segment_type) in MODE_FILES {
        let path = dir.join(file);
        if !path.is_file() {
            continue;
        }
        found = true;
        let rows = parse_qdp_table(&fs::read_to_string(&path)?, segment_type)?;
        debug!("{}: {} {} rows", path.display(), rows.len(), segment_type);
        samples.extend(rows);
    }

    let combined = dir.join(COMBINED_FILE);
    if combined.is_file() {
        found = true;
        let rows = parse_wtslew_section(&fs::read_to_string(&combined)?)?;
        debug!("{}: {} WTSLEW rows", combined.display(), rows.len());
        samples.extend(rows);
    }

    if !found {
        return Err(LcFitError::InvalidInput(format!(
            "No light-curve files in {}",
            dir.display()
        )));
    }
    Ok(LightCurve::new(samples))
}

/// Read a light curve from a GRB directory or a single QDP table.
///
/// A single file is typed by its `Type` column, or else by its file name.
/// Unrecognised names default to PC. A lone `curve.qdp` contributes only its
/// `WTSLEW` section.
pub fn read_light_curve(path: impl AsRef<Path>) -> Result<LightCurve> {
    let path = path.as_ref();
    if path.is_dir() {
        return read_light_curve_dir(path);
    }

    let text = fs::read_to_string(path)?;
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if file_name == COMBINED_FILE {
        return Ok(LightCurve::new(parse_wtslew_section(&text)?));
    }

    let default_type = MODE_FILES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(file_name))
        .map(|(_, segment_type)| *segment_type)
        .unwrap_or_else(|| {
            warn!("{} is not a known mode table; untyped rows count as PC", path.display());
            SegmentType::PC
        });
    Ok(LightCurve::new(parse_qdp_table(&text, default_type)?))
}
