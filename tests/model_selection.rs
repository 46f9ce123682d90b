//! Model selection and reverse lookup through the model table.

use approx::assert_relative_eq;
use grb_lcfit::models::{
    model_by_name, model_from_names, model_from_report, param_count, select_model, MODEL_TABLE,
};
use grb_lcfit::LcFitError;
use ndarray::Array1;

#[test]
fn test_every_pick_combination_selects_matching_model() {
    for num_flares in 0..=7 {
        for num_breaks in 0..=4 {
            let model = select_model(num_flares, num_breaks).unwrap();
            assert_eq!(model.param_count(), param_count(num_flares, num_breaks));
            assert_eq!(model.param_count(), 3 * num_flares + 2 * num_breaks + 2);
            assert_eq!(model.num_flares(), num_flares);
            assert_eq!(model.num_breaks(), num_breaks);
        }
    }
}

#[test]
fn test_forward_and_reverse_lookup_agree() {
    for model in MODEL_TABLE.iter() {
        let flare_params = model
            .param_names()
            .iter()
            .filter(|name| name.contains("gauss"))
            .count();
        assert_eq!(model_from_report(model.param_count(), flare_params).unwrap(), *model);
        assert_eq!(model_from_names(&model.param_names()).unwrap(), *model);
        assert_eq!(model_by_name(model.name()).unwrap(), *model);
    }
}

#[test]
fn test_shared_parameter_counts_are_separated_by_flares() {
    let bkn3 = select_model(0, 3).unwrap();
    let gauss2 = select_model(2, 0).unwrap();
    assert_eq!(bkn3.param_count(), 8);
    assert_eq!(gauss2.param_count(), 8);
    assert_eq!(bkn3.name(), "bkn3pow");
    assert_eq!(gauss2.name(), "gauss2_pow");
}

#[test]
fn test_unsupported_combinations() {
    assert!(matches!(
        select_model(8, 0),
        Err(LcFitError::UnsupportedModel { num_flares: 8, num_breaks: 0 })
    ));
    assert!(matches!(select_model(0, 5), Err(LcFitError::UnsupportedModel { .. })));
    assert!(model_from_report(3, 0).is_err());
    assert!(model_from_report(5, 2).is_err());
    assert!(matches!(model_by_name("gauss8_pow"), Err(LcFitError::UnknownModel(_))));
}

#[test]
fn test_selected_model_evaluates() {
    let model = select_model(1, 2).unwrap();
    let params = [2e4, 40.0, 200.0, 30.0, 0.6, 500.0, 1.5, 5e3, 2.2];
    let t = Array1::logspace(10.0, 1.0, 5.0, 50);

    let values = model.eval(&t, &params).unwrap();
    assert_eq!(values.len(), t.len());
    assert!(values.iter().all(|v| v.is_finite() && *v > 0.0));

    // Continuity across both breaks.
    for &b in &[500.0, 5e3] {
        let below = model.eval(&Array1::from(vec![b * (1.0 - 1e-9)]), &params).unwrap()[0];
        let above = model.eval(&Array1::from(vec![b * (1.0 + 1e-9)]), &params).unwrap()[0];
        assert_relative_eq!(below, above, max_relative = 1e-7);
    }
}
