use approx::assert_relative_eq;
use commloss::{LossError, LossModel, ModelParams, QuantitySet, SolverConfig, joint_loss};

#[test]
fn every_quantity_needs_both_parameters() {
    let mut model = LossModel::new();
    assert_eq!(model.info_total(), Err(LossError::Unconfigured("probability")));
    assert_eq!(model.single_frame_loss(), Err(LossError::Unconfigured("probability")));

    model.set_correlation(0.3).unwrap();
    assert_eq!(
        model.destructive_interference(),
        Err(LossError::Unconfigured("probability"))
    );
    model.set_probability(0.1).unwrap();
    assert_eq!(model.single_letter_loss(), Ok(0.0));
}

#[test]
fn evaluate_all_agrees_with_the_free_functions() {
    let cfg = SolverConfig::default();
    let mut model = LossModel::with_config(cfg.clone()).unwrap();
    model.set_probability(0.1).unwrap();
    model.set_correlation(0.3).unwrap();

    let cached = model.evaluate_all().unwrap();
    let params = ModelParams::symmetric(0.1, 0.3).unwrap();
    let fresh = QuantitySet::evaluate(&params, &cfg).unwrap();
    assert_eq!(cached, fresh);
    assert_eq!(cached.joint_loss, joint_loss(&params, &cfg).unwrap());
    assert_eq!(cached.destructive_interference, cached.joint_loss);
    assert_relative_eq!(cached.joint_loss, 0.002_928_3, max_relative = 1e-2);
    assert_eq!(model.cached_settings(), 1);
}

#[test]
fn changing_a_parameter_selects_a_new_cache_entry() {
    let mut model = LossModel::new();
    model.set_probability(0.5).unwrap();
    model.set_correlation(0.3).unwrap();
    let first = model.joint_loss().unwrap();

    model.set_correlation(0.6).unwrap();
    let second = model.joint_loss().unwrap();
    assert!(second > first);
    assert_eq!(model.cached_settings(), 2);

    model.set_correlation(0.3).unwrap();
    assert_eq!(model.joint_loss().unwrap(), first);
    assert_eq!(model.cached_settings(), 2);

    // A rejected value leaves the previous setting, and its cache entry, in force.
    assert!(model.set_correlation(1.0).is_err());
    assert_eq!(model.correlation(), Some(0.3));
    assert_eq!(model.joint_loss().unwrap(), first);
}

#[test]
fn model_is_shareable_across_threads() {
    let mut model = LossModel::new();
    model.set_probability(0.4).unwrap();
    model.set_correlation(-0.2).unwrap();
    let model = &model;
    let (a, b) = std::thread::scope(|scope| {
        let a = scope.spawn(move || model.descriptive_loss().unwrap());
        let b = scope.spawn(move || model.descriptive_loss().unwrap());
        (a.join().unwrap(), b.join().unwrap())
    });
    assert_eq!(a, b);
    assert_eq!(model.cached_settings(), 1);
}
