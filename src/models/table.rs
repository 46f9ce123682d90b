//! The static model table.
//!
//! One entry per supported `(num_flares, num_breaks)` pair. Forward selection
//! from user picks and reverse lookup from a saved report both resolve
//! through [`MODEL_TABLE`], so they can never disagree.

use super::{param_count, ModelSpec, FLARE_MARKER, MAX_BREAKS, MAX_FLARES, PARAMS_PER_FLARE};
use crate::error::{LcFitError, Result};

/// Every supported model, ordered by flare count then break count.
pub static MODEL_TABLE: [ModelSpec; 40] = [
    ModelSpec::new("pow", 0, 0),
    ModelSpec::new("bknpow", 0, 1),
    ModelSpec::new("bkn2pow", 0, 2),
    ModelSpec::new("bkn3pow", 0, 3),
    ModelSpec::new("bkn4pow", 0, 4),
    ModelSpec::new("gauss1_pow", 1, 0),
    ModelSpec::new("gauss1_bknpow", 1, 1),
    ModelSpec::new("gauss1_bkn2pow", 1, 2),
    ModelSpec::new("gauss1_bkn3pow", 1, 3),
    ModelSpec::new("gauss1_bkn4pow", 1, 4),
    ModelSpec::new("gauss2_pow", 2, 0),
    ModelSpec::new("gauss2_bknpow", 2, 1),
    ModelSpec::new("gauss2_bkn2pow", 2, 2),
    ModelSpec::new("gauss2_bkn3pow", 2, 3),
    ModelSpec::new("gauss2_bkn4pow", 2, 4),
    ModelSpec::new("gauss3_pow", 3, 0),
    ModelSpec::new("gauss3_bknpow", 3, 1),
    ModelSpec::new("gauss3_bkn2pow", 3, 2),
    ModelSpec::new("gauss3_bkn3pow", 3, 3),
    ModelSpec::new("gauss3_bkn4pow", 3, 4),
    ModelSpec::new("gauss4_pow", 4, 0),
    ModelSpec::new("gauss4_bknpow", 4, 1),
    ModelSpec::new("gauss4_bkn2pow", 4, 2),
    ModelSpec::new("gauss4_bkn3pow", 4, 3),
    ModelSpec::new("gauss4_bkn4pow", 4, 4),
    ModelSpec::new("gauss5_pow", 5, 0),
    ModelSpec::new("gauss5_bknpow", 5, 1),
    ModelSpec::new("gauss5_bkn2pow", 5, 2),
    ModelSpec::new("gauss5_bkn3pow", 5, 3),
    ModelSpec::new("gauss5_bkn4pow", 5, 4),
    ModelSpec::new("gauss6_pow", 6, 0),
    ModelSpec::new("gauss6_bknpow", 6, 1),
    ModelSpec::new("gauss6_bkn2pow", 6, 2),
    ModelSpec::new("gauss6_bkn3pow", 6, 3),
    ModelSpec::new("gauss6_bkn4pow", 6, 4),
    ModelSpec::new("gauss7_pow", 7, 0),
    ModelSpec::new("gauss7_bknpow", 7, 1),
    ModelSpec::new("gauss7_bkn2pow", 7, 2),
    ModelSpec::new("gauss7_bkn3pow", 7, 3),
    ModelSpec::new("gauss7_bkn4pow", 7, 4),
];

/// Look up the table entry with `nump` parameters, using the flare count to
/// separate models that share a parameter count (e.g. `bkn3pow` and
/// `gauss2_pow`).
fn lookup(nump: usize, num_flares: usize) -> Option<ModelSpec> {
    MODEL_TABLE
        .iter()
        .find(|m| m.param_count() == nump && m.num_flares() == num_flares)
        .copied()
}

/// Select the model for a number of flare and break picks.
pub fn select_model(num_flares: usize, num_breaks: usize) -> Result<ModelSpec> {
    let unsupported = LcFitError::UnsupportedModel {
        num_flares,
        num_breaks,
    };
    if num_flares > MAX_FLARES || num_breaks > MAX_BREAKS {
        return Err(unsupported);
    }
    lookup(param_count(num_flares, num_breaks), num_flares).ok_or(unsupported)
}

/// Recover the model of a saved fit from its parameter count and the number
/// of parameter names carrying the flare marker.
pub fn model_from_report(nump: usize, flare_param_count: usize) -> Result<ModelSpec> {
    if flare_param_count % PARAMS_PER_FLARE != 0 {
        return Err(LcFitError::UnknownModel(format!(
            "{} flare parameters is not a whole number of flares",
            flare_param_count
        )));
    }
    lookup(nump, flare_param_count / PARAMS_PER_FLARE).ok_or_else(|| {
        LcFitError::UnknownModel(format!(
            "no model with {} parameters and {} flare(s)",
            nump,
            flare_param_count / PARAMS_PER_FLARE
        ))
    })
}

/// Recover the model of a saved fit from its parameter names.
pub fn model_from_names<S: AsRef<str>>(names: &[S]) -> Result<ModelSpec> {
    let flare_params = names.iter().filter(|n| n.as_ref().contains(FLARE_MARKER)).count();
    model_from_report(names.len(), flare_params)
}

/// Resolve a model by its name.
pub fn model_by_name(name: &str) -> Result<ModelSpec> {
    MODEL_TABLE
        .iter()
        .find(|m| m.name() == name)
        .copied()
        .ok_or_else(|| LcFitError::UnknownModel(name.to_string()))
}
