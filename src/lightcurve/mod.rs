//! Light-curve samples and readers.
//!
//! A [`LightCurve`] is a collection of count-rate samples with asymmetric
//! time bins and rate errors, each tagged with the XRT readout mode it came
//! from. Upper limits are kept for display but never enter a fit.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LcFitError, Result};

pub mod qdp;

pub use qdp::{parse_qdp_table, parse_wtslew_section, read_light_curve, read_light_curve_dir};

/// XRT readout mode of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegmentType {
    /// Windowed Timing mode detection.
    WT,
    /// Windowed Timing mode upper limit.
    WTUL,
    /// Photon Counting mode detection.
    PC,
    /// Photon Counting mode upper limit.
    PCUL,
    /// Windowed Timing data taken while the spacecraft was slewing.
    WTSLEW,
}

impl SegmentType {
    pub fn is_upper_limit(&self) -> bool {
        matches!(self, SegmentType::WTUL | SegmentType::PCUL)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentType::WT => "WT",
            SegmentType::WTUL => "WTUL",
            SegmentType::PC => "PC",
            SegmentType::PCUL => "PCUL",
            SegmentType::WTSLEW => "WTSLEW",
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentType {
    type Err = LcFitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "WT" => Ok(SegmentType::WT),
            "WTUL" => Ok(SegmentType::WTUL),
            "PC" => Ok(SegmentType::PC),
            "PCUL" => Ok(SegmentType::PCUL),
            "WTSLEW" => Ok(SegmentType::WTSLEW),
            other => Err(LcFitError::InvalidInput(format!("Unknown segment type {:?}", other))),
        }
    }
}

/// One light-curve bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the trigger.
    pub time: f64,
    /// Offset from `time` to the bin end (≥ 0).
    pub time_pos: f64,
    /// Offset from `time` to the bin start (≤ 0).
    pub time_neg: f64,
    /// Count rate.
    pub rate: f64,
    /// Upper 1σ rate error.
    pub rate_pos: f64,
    /// Lower 1σ rate error, as written in the source table.
    pub rate_neg: f64,
    pub segment_type: SegmentType,
}

impl Sample {
    pub fn bin_start(&self) -> f64 {
        self.time + self.time_neg
    }

    pub fn bin_end(&self) -> f64 {
        self.time + self.time_pos
    }

    /// Usable in a weighted fit.
    pub fn is_fittable(&self) -> bool {
        !self.segment_type.is_upper_limit()
            && self.rate > 0.0
            && self.rate_pos > 0.0
            && self.time > 0.0
            && self.bin_start() > 0.0
            && self.bin_end() >= self.bin_start()
            && [self.time, self.rate, self.rate_pos, self.time_neg, self.time_pos]
                .iter()
                .all(|v| v.is_finite())
    }
}

/// An afterglow light curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightCurve {
    samples: Vec<Sample>,
}

impl LightCurve {
    /// Build a light curve; samples are sorted by time.
    pub fn new(mut samples: Vec<Sample>) -> Self {
        samples.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { samples }
    }

    /// Detections of one mode from plain arrays, with symmetric rate errors.
    pub fn from_arrays(
        time: &[f64],
        time_pos: &[f64],
        time_neg: &[f64],
        rate: &[f64],
        rate_err: &[f64],
        segment_type: SegmentType,
    ) -> Result<Self> {
        let n = time.len();
        if [time_pos.len(), time_neg.len(), rate.len(), rate_err.len()]
            .iter()
            .any(|&len| len != n)
        {
            return Err(LcFitError::DimensionMismatch(
                "light-curve columns have different lengths".to_string(),
            ));
        }

        let samples = (0..n)
            .map(|i| Sample {
                time: time[i],
                time_pos: time_pos[i],
                time_neg: time_neg[i],
                rate: rate[i],
                rate_pos: rate_err[i],
                rate_neg: -rate_err[i],
                segment_type,
            })
            .collect();
        Ok(Self::new(samples))
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The subset that can enter a weighted fit.
    pub fn fit_samples(&self) -> LightCurve {
        LightCurve {
            samples: self.samples.iter().filter(|s| s.is_fittable()).copied().collect(),
        }
    }

    /// Samples of one readout mode.
    pub fn of_type(&self, segment_type: SegmentType) -> LightCurve {
        LightCurve {
            samples: self
                .samples
                .iter()
                .filter(|s| s.segment_type == segment_type)
                .copied()
                .collect(),
        }
    }

    fn column(&self, f: impl Fn(&Sample) -> f64) -> Array1<f64> {
        self.samples.iter().map(f).collect()
    }

    pub fn times(&self) -> Array1<f64> {
        self.column(|s| s.time)
    }

    pub fn rates(&self) -> Array1<f64> {
        self.column(|s| s.rate)
    }

    pub fn rate_pos(&self) -> Array1<f64> {
        self.column(|s| s.rate_pos)
    }

    pub fn bin_starts(&self) -> Array1<f64> {
        self.column(Sample::bin_start)
    }

    pub fn bin_ends(&self) -> Array1<f64> {
        self.column(Sample::bin_end)
    }

    /// Earliest and latest sample time.
    pub fn time_span(&self) -> Option<(f64, f64)> {
        let first = self.samples.first()?;
        let init = (first.time, first.time);
        Some(
            self.samples
                .iter()
                .fold(init, |(lo, hi), s| (lo.min(s.time), hi.max(s.time))),
        )
    }
}
