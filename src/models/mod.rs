//! Light-curve model family.
//!
//! Every model is a continuous broken power law with 0–4 breaks plus 0–7
//! additive Gaussian flares. A [`ModelSpec`] identifies one member of the
//! family and fixes the length and order of its parameter vector:
//!
//! ```text
//! [norm, gauss1_amp, gauss1_center, gauss1_width, …, pow1, break1, pow2, …, pow{B+1}]
//! ```
//!
//! Models are evaluated either at instants ([`ModelSpec::eval`]) or averaged
//! over exposure bins ([`ModelSpec::eval_integrated`]).

use ndarray::Array1;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{LcFitError, Result};

mod flare;
mod power_law;
pub mod table;

pub use flare::GaussianFlare;
pub use power_law::BrokenPowerLaw;
pub use table::{model_by_name, model_from_names, model_from_report, select_model, MODEL_TABLE};

/// Substring that marks flare parameters in a parameter name.
pub const FLARE_MARKER: &str = "gauss";

/// Parameters per Gaussian flare.
pub const PARAMS_PER_FLARE: usize = 3;

/// Largest supported number of flares.
pub const MAX_FLARES: usize = 7;

/// Largest supported number of breaks.
pub const MAX_BREAKS: usize = 4;

/// Parameter count of a model: `norm`, three per flare, one slope per
/// segment and one time per break.
pub const fn param_count(num_flares: usize, num_breaks: usize) -> usize {
    1 + PARAMS_PER_FLARE * num_flares + (num_breaks + 1) + num_breaks
}

/// One member of the closed model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelSpec {
    name: &'static str,
    num_flares: usize,
    num_breaks: usize,
}

/// A parameter vector split into its physical components.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelComponents {
    pub baseline: BrokenPowerLaw,
    pub flares: Vec<GaussianFlare>,
}

impl ModelComponents {
    /// Instantaneous model value.
    pub fn value(&self, t: f64) -> f64 {
        self.baseline.value(t) + self.flares.iter().map(|f| f.value(t)).sum::<f64>()
    }

    /// Model average over `[a, b]`.
    pub fn mean(&self, a: f64, b: f64) -> f64 {
        self.baseline.mean(a, b) + self.flares.iter().map(|f| f.mean(a, b)).sum::<f64>()
    }
}

impl ModelSpec {
    pub(crate) const fn new(name: &'static str, num_flares: usize, num_breaks: usize) -> Self {
        Self {
            name,
            num_flares,
            num_breaks,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn num_flares(&self) -> usize {
        self.num_flares
    }

    pub fn num_breaks(&self) -> usize {
        self.num_breaks
    }

    pub fn param_count(&self) -> usize {
        param_count(self.num_flares, self.num_breaks)
    }

    /// Parameter names in canonical order.
    pub fn param_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.param_count());
        names.push("norm".to_string());
        for i in 1..=self.num_flares {
            for field in ["amp", "center", "width"] {
                names.push(format!("{}{}_{}", FLARE_MARKER, i, field));
            }
        }
        for j in 1..=self.num_breaks + 1 {
            names.push(format!("pow{}", j));
            if j <= self.num_breaks {
                names.push(format!("break{}", j));
            }
        }
        names
    }

    /// Index of the first slope in the parameter vector.
    pub fn baseline_offset(&self) -> usize {
        1 + PARAMS_PER_FLARE * self.num_flares
    }

    /// Indices of the break times in the parameter vector.
    pub fn break_indices(&self) -> Vec<usize> {
        (0..self.num_breaks).map(|k| self.baseline_offset() + 2 * k + 1).collect()
    }

    /// Indices of the slopes in the parameter vector.
    pub fn slope_indices(&self) -> Vec<usize> {
        (0..=self.num_breaks).map(|k| self.baseline_offset() + 2 * k).collect()
    }

    fn check_len(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.param_count() {
            return Err(LcFitError::DimensionMismatch(format!(
                "Model {} takes {} parameters, got {}",
                self.name,
                self.param_count(),
                params.len()
            )));
        }
        Ok(())
    }

    /// Split a canonical parameter vector into baseline and flares.
    pub fn unpack(&self, params: &[f64]) -> Result<ModelComponents> {
        self.check_len(params)?;

        let flares = params[1..self.baseline_offset()]
            .chunks_exact(PARAMS_PER_FLARE)
            .map(|p| GaussianFlare::new(p[0], p[1], p[2]))
            .collect::<Result<Vec<_>>>()?;

        let tail = &params[self.baseline_offset()..];
        let slopes = tail.iter().step_by(2).copied().collect();
        let breaks = tail.iter().skip(1).step_by(2).copied().collect();
        let baseline = BrokenPowerLaw::new(params[0], slopes, breaks)?;

        Ok(ModelComponents { baseline, flares })
    }

    /// Model values at the instants `t`.
    pub fn eval(&self, t: &Array1<f64>, params: &[f64]) -> Result<Array1<f64>> {
        let components = self.unpack(params)?;
        Ok(t.mapv(|t| components.value(t)))
    }

    /// Model averages over the bins `[t_start[i], t_end[i]]`.
    ///
    /// Bin starts must be positive and bins must not be reversed.
    pub fn eval_integrated(&self, t_start: &Array1<f64>, t_end: &Array1<f64>, params: &[f64]) -> Result<Array1<f64>> {
        if t_start.len() != t_end.len() {
            return Err(LcFitError::DimensionMismatch(format!(
                "{} bin starts but {} bin ends",
                t_start.len(),
                t_end.len()
            )));
        }
        if let Some((a, b)) = t_start.iter().zip(t_end.iter()).find(|(a, b)| !(**a > 0.0 && b >= a)) {
            return Err(LcFitError::InvalidInput(format!("Invalid time bin [{}, {}]", a, b)));
        }

        let components = self.unpack(params)?;
        Ok(t_start
            .iter()
            .zip(t_end.iter())
            .map(|(&a, &b)| components.mean(a, b))
            .collect())
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl Serialize for ModelSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

impl<'de> Deserialize<'de> for ModelSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        model_by_name(&name).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_param_names_order() {
        let model = select_model(2, 2).unwrap();
        assert_eq!(
            model.param_names(),
            vec![
                "norm",
                "gauss1_amp",
                "gauss1_center",
                "gauss1_width",
                "gauss2_amp",
                "gauss2_center",
                "gauss2_width",
                "pow1",
                "break1",
                "pow2",
                "break2",
                "pow3",
            ]
        );
        assert_eq!(model.break_indices(), vec![8, 10]);
        assert_eq!(model.slope_indices(), vec![7, 9, 11]);
    }

    #[test]
    fn test_eval_power_law() {
        let model = select_model(0, 0).unwrap();
        let t = array![1.0, 10.0, 100.0];
        let values = model.eval(&t, &[100.0, 1.0]).unwrap();
        assert_relative_eq!(values[0], 100.0);
        assert_relative_eq!(values[1], 10.0, max_relative = 1e-14);
        assert_relative_eq!(values[2], 1.0, max_relative = 1e-14);
    }

    #[test]
    fn test_eval_flare_on_broken_power_law() {
        let model = select_model(1, 1).unwrap();
        let params = [1e3, 50.0, 300.0, 30.0, 0.8, 1000.0, 2.0];
        let t = array![300.0, 5000.0];

        let values = model.eval(&t, &params).unwrap();
        let baseline_at_300 = 1e3 * 300f64.powf(-0.8);
        assert_relative_eq!(values[0], baseline_at_300 + 50.0, max_relative = 1e-12);

        let at_break = 1e3 * 1000f64.powf(-0.8);
        assert_relative_eq!(values[1], at_break * 5f64.powf(-2.0), max_relative = 1e-9);
    }

    #[test]
    fn test_integrated_tends_to_instantaneous() {
        for model in MODEL_TABLE.iter().filter(|m| m.num_flares() <= 2) {
            let mut params = vec![1e4];
            for i in 0..model.num_flares() {
                params.extend([20.0, 150.0 + 400.0 * i as f64, 25.0]);
            }
            for k in 0..=model.num_breaks() {
                params.push(0.7 + 0.3 * k as f64);
                if k < model.num_breaks() {
                    params.push(80.0 * 4f64.powi(k as i32));
                }
            }

            let t = array![30.0, 175.0, 612.0, 2.0e4];
            let eps = 1e-7;
            let start = t.mapv(|t: f64| t * (1.0 - eps));
            let end = t.mapv(|t: f64| t * (1.0 + eps));

            let inst = model.eval(&t, &params).unwrap();
            let avg = model.eval_integrated(&start, &end, &params).unwrap();
            for i in 0..t.len() {
                assert_relative_eq!(avg[i], inst[i], max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn test_wrong_parameter_count() {
        let model = select_model(0, 1).unwrap();
        let t = array![1.0];
        assert!(matches!(
            model.eval(&t, &[1.0, 1.0]),
            Err(LcFitError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_integrated_rejects_bad_bins() {
        let model = select_model(0, 0).unwrap();
        let params = [1.0, 1.0];
        assert!(model
            .eval_integrated(&array![0.0], &array![1.0], &params)
            .is_err());
        assert!(model
            .eval_integrated(&array![2.0], &array![1.0], &params)
            .is_err());
        assert!(model
            .eval_integrated(&array![1.0, 2.0], &array![1.5], &params)
            .is_err());
    }

    #[test]
    fn test_serde_by_name() {
        let model = select_model(3, 2).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, "\"gauss3_bkn2pow\"");
        let back: ModelSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
        assert!(serde_json::from_str::<ModelSpec>("\"bkn9pow\"").is_err());
    }
}
