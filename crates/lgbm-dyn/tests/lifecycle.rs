//! Handle lifecycle tests against the in-process mock library.
//!
//! Each test runs on its own thread, and the mock keeps its state per
//! thread, so every test starts from an empty native library.

use approx::assert_relative_eq;
use rstest::rstest;

use lgbm_dyn::testing;
use lgbm_dyn::{
    Api, Booster, Dataset, Error, FeatureImportance, Parameters, PredictType, PredictorConfig,
    FIRST_VALIDATION_DATA_INDEX, TRAINING_DATA_INDEX,
};

// =============================================================================
// Helpers
// =============================================================================

fn dataset(rows: usize, cols: usize) -> Dataset {
    let mut ds = Dataset::with_api(testing::api(), Parameters::new());
    for r in 0..rows {
        let row: Vec<f64> = (0..cols).map(|c| (r * cols + c) as f64).collect();
        ds.append_row(&row).unwrap();
        ds.set_label((r % 2) as f64).unwrap();
    }
    ds
}

fn trained_booster(rounds: usize) -> Booster {
    let train = dataset(8, 3);
    let mut booster = Booster::create(&train, &Parameters::new(), &[]).unwrap();
    for _ in 0..rounds {
        booster.update_one_iter().unwrap();
    }
    booster
}

// =============================================================================
// Dataset
// =============================================================================

#[test]
fn dataset_freezes_exactly_once() {
    testing::reset();
    let ds = dataset(4, 2);

    let first = ds.handle().unwrap().as_raw();
    let second = ds.handle().unwrap().as_raw();

    assert_eq!(first, second);
    assert!(ds.is_frozen());
    assert_eq!(testing::calls("LGBM_DatasetCreateFromMat"), 1);
    assert_eq!(testing::dataset_shape(first), Some((4, 2)));
}

#[test]
fn frozen_dataset_rejects_mutation() {
    testing::reset();
    let mut ds = dataset(2, 2);
    ds.handle().unwrap();

    assert_eq!(ds.append_row(&[1.0, 2.0]), Err(Error::DatasetImmutable));
    assert_eq!(ds.set_feature_names(&["a", "b"]), Err(Error::DatasetImmutable));
    assert_eq!(ds.set_labels(&[1.0]), Err(Error::DatasetImmutable));
    assert_eq!(ds.set_weight(1.0), Err(Error::DatasetImmutable));
    assert_eq!(ds.set_init_score(0.5), Err(Error::DatasetImmutable));
    assert_eq!(ds.set_group(1), Err(Error::DatasetImmutable));
    assert_eq!(ds.num_rows(), 2);
}

#[test]
fn columns_reach_the_native_dataset() {
    testing::reset();
    let mut ds = Dataset::with_api(testing::api(), Parameters::new());
    for (i, query) in [10, 10, 10, 20, 20].into_iter().enumerate() {
        ds.append_row(&[i as f64, 1.0]).unwrap();
        ds.set_label(0.1 * i as f64).unwrap();
        ds.set_weight(2.0).unwrap();
        ds.set_init_score(-1.0).unwrap();
        ds.set_group(query).unwrap();
    }
    ds.set_feature_names(&["x", "bias"]).unwrap();

    let raw = ds.handle().unwrap().as_raw();

    let labels = testing::dataset_field(raw, "label").unwrap();
    assert_eq!(labels.len(), 5);
    for (i, &label) in labels.iter().enumerate() {
        assert_relative_eq!(label, 0.1 * i as f64, max_relative = 1e-6);
    }
    assert_eq!(testing::dataset_field(raw, "weight"), Some(vec![2.0; 5]));
    assert_eq!(testing::dataset_field(raw, "init_score"), Some(vec![-1.0; 5]));
    assert_eq!(testing::dataset_field(raw, "group"), Some(vec![3.0, 2.0]));
    assert_eq!(testing::dataset_feature_names(raw), vec!["x", "bias"]);
}

#[test]
fn name_count_mismatch_frees_the_new_handle() {
    testing::reset();
    let mut ds = dataset(3, 2);
    ds.set_feature_names(&["only_one"]).unwrap();

    assert_eq!(
        ds.handle().unwrap_err(),
        Error::NameCountMismatch { names: 1, columns: 2 }
    );
    assert!(!ds.is_frozen());
    assert_eq!(testing::calls("LGBM_DatasetCreateFromMat"), 1);
    assert_eq!(testing::calls("LGBM_DatasetFree"), 1);
    assert_eq!(testing::live_handles(), 0);
}

#[test]
fn failed_field_rolls_back_and_allows_retry() {
    testing::reset();
    let mut ds = dataset(3, 2);
    ds.set_weights(&[1.0]).unwrap();
    testing::fail_on("LGBM_DatasetSetField", "bad field");

    assert_eq!(
        ds.handle().unwrap_err(),
        Error::Native("bad field".to_string())
    );
    assert_eq!(testing::calls("LGBM_DatasetFree"), 1);
    assert_eq!(testing::live_handles(), 0);

    // Still building: more rows can be added.
    ds.append_row(&[9.0, 9.0]).unwrap();
    assert_eq!(ds.num_rows(), 4);
}

#[rstest]
#[case::labels("label", 2)]
#[case::weights("weight", 1)]
fn short_optional_column_is_rejected(#[case] field: &'static str, #[case] got: usize) {
    testing::reset();
    let mut ds = Dataset::with_api(testing::api(), Parameters::new());
    for i in 0..3 {
        ds.append_row(&[i as f64]).unwrap();
    }
    match field {
        "label" => ds.set_labels(&[1.0, 0.0]).unwrap(),
        _ => ds.set_weight(1.0).unwrap(),
    }
    let err = ds.handle().unwrap_err();

    assert_eq!(err, Error::FieldLengthMismatch { field, expected: 3, got });
    assert_eq!(testing::live_handles(), 0);
}

#[test]
fn empty_dataset_never_reaches_native() {
    testing::reset();
    let ds = Dataset::with_api(testing::api(), Parameters::new());

    assert_eq!(ds.handle().unwrap_err(), Error::NoFeatures);
    assert_eq!(testing::calls("LGBM_DatasetCreateFromMat"), 0);
}

#[test]
fn validation_data_shares_the_reference() {
    testing::reset();
    let train = dataset(6, 3);
    let mut valid = Dataset::with_reference(Parameters::new(), &train).unwrap();
    valid.append_row(&[1.0, 2.0, 3.0]).unwrap();
    valid.set_label(1.0).unwrap();

    let train_raw = train.handle().unwrap().as_raw();
    let valid_raw = valid.handle().unwrap().as_raw();

    assert!(train.is_frozen());
    assert_eq!(testing::dataset_reference(valid_raw), Some(train_raw));
}

#[test]
fn closed_dataset_stays_alive_through_its_dependents() {
    testing::reset();
    let mut train = dataset(6, 3);
    let raw = train.handle().unwrap().as_raw();
    let valid = Dataset::with_reference(Parameters::new(), &train).unwrap();

    train.close();
    train.close();
    assert_eq!(train.handle().unwrap_err(), Error::InvalidHandle);
    assert!(testing::is_live(raw));

    drop(valid);
    assert!(!testing::is_live(raw));
    assert_eq!(testing::calls("LGBM_DatasetFree"), 1);
}

// =============================================================================
// Booster
// =============================================================================

#[test]
fn booster_keeps_its_datasets_alive() {
    testing::reset();
    let train = dataset(8, 3);
    let mut valid = Dataset::with_reference(Parameters::new(), &train).unwrap();
    valid.append_row(&[0.0, 1.0, 2.0]).unwrap();

    let booster = Booster::create(&train, &Parameters::new(), &[&valid]).unwrap();
    drop(train);
    drop(valid);
    assert_eq!(testing::calls("LGBM_DatasetFree"), 0);
    assert_eq!(testing::live_handles(), 3);

    drop(booster);
    assert_eq!(testing::calls("LGBM_BoosterFree"), 1);
    assert_eq!(testing::calls("LGBM_DatasetFree"), 2);
    assert_eq!(testing::live_handles(), 0);
}

#[test]
fn failed_validator_registration_frees_the_booster() {
    testing::reset();
    let train = dataset(8, 3);
    let mut valid = Dataset::with_reference(Parameters::new(), &train).unwrap();
    valid.append_row(&[0.0, 1.0, 2.0]).unwrap();
    testing::fail_on("LGBM_BoosterAddValidData", "cannot add validation data");

    let err = Booster::create(&train, &Parameters::new(), &[&valid]).unwrap_err();

    assert_eq!(err, Error::Native("cannot add validation data".to_string()));
    assert_eq!(testing::calls("LGBM_BoosterCreate"), 1);
    assert_eq!(testing::calls("LGBM_BoosterFree"), 1);
    // Both datasets remain owned by their wrappers.
    assert_eq!(testing::live_handles(), 2);
}

#[test]
fn unfreezable_validator_frees_the_booster() {
    testing::reset();
    let train = dataset(8, 3);
    let empty = Dataset::with_api(testing::api(), Parameters::new());

    let err = Booster::create(&train, &Parameters::new(), &[&empty]).unwrap_err();

    assert_eq!(err, Error::NoFeatures);
    assert_eq!(testing::calls("LGBM_BoosterFree"), 1);
    assert_eq!(testing::live_handles(), 1);
}

#[test]
fn validator_from_another_library_is_rejected() {
    testing::reset();
    // SAFETY: the mock entry points honor the C API contract.
    let other: &'static Api =
        Box::leak(Box::new(unsafe { Api::from_symbols(testing::symbols()) }));
    let train = dataset(8, 3);
    let mut foreign = Dataset::with_api(other, Parameters::new());
    foreign.append_row(&[0.0, 1.0, 2.0]).unwrap();

    let err = Booster::create(&train, &Parameters::new(), &[&foreign]).unwrap_err();

    assert_eq!(err, Error::InvalidHandle);
    assert_eq!(testing::calls("LGBM_BoosterAddValidData"), 0);
    assert_eq!(testing::calls("LGBM_BoosterFree"), 1);
    assert_eq!(testing::live_handles(), 2);
}

#[test]
fn every_native_object_is_freed_once() {
    testing::reset();
    let mut train = dataset(8, 3);
    let mut valid = Dataset::with_reference(Parameters::new(), &train).unwrap();
    valid.append_row(&[0.0, 1.0, 2.0]).unwrap();
    let mut booster = Booster::create(&train, &Parameters::new(), &[&valid]).unwrap();
    booster.update_one_iter().unwrap();
    let mut predictor = booster.predictor(false, Parameters::new()).unwrap();

    for _ in 0..2 {
        predictor.close();
        booster.close();
        valid.close();
        train.close();
    }
    drop((predictor, booster, valid, train));

    assert_eq!(testing::calls("LGBM_FastConfigFree"), 1);
    assert_eq!(testing::calls("LGBM_BoosterFree"), 1);
    assert_eq!(testing::calls("LGBM_DatasetFree"), 2);
    assert_eq!(testing::live_handles(), 0);
}

#[test]
fn update_loop_stops_when_finished() {
    testing::reset();
    testing::finish_after(3);
    let train = dataset(8, 3);
    let mut booster = Booster::create(&train, &Parameters::new(), &[]).unwrap();

    let mut rounds = 0;
    for _ in 0..10 {
        if booster.update_one_iter().unwrap() {
            break;
        }
        rounds += 1;
    }

    assert_eq!(rounds, 3);
    assert_eq!(booster.num_iterations(), 3);
    assert_eq!(testing::calls("LGBM_BoosterUpdateOneIter"), 4);
}

#[test]
fn eval_without_metrics_is_empty() {
    testing::reset();
    let booster = trained_booster(1);

    assert_eq!(booster.eval_counts().unwrap(), 0);
    assert!(booster.get_eval(TRAINING_DATA_INDEX).unwrap().is_empty());
    assert_eq!(testing::calls("LGBM_BoosterGetEval"), 0);
}

#[test]
fn eval_returns_every_metric() {
    testing::reset();
    testing::set_eval(vec![0.25, 0.5]);
    let train = dataset(8, 3);
    let mut valid = Dataset::with_reference(Parameters::new(), &train).unwrap();
    valid.append_row(&[0.0, 1.0, 2.0]).unwrap();
    let booster = Booster::create(&train, &Parameters::new(), &[&valid]).unwrap();

    assert_eq!(booster.eval_counts().unwrap(), 2);
    assert_eq!(booster.get_eval(TRAINING_DATA_INDEX).unwrap(), vec![0.25, 0.5]);
    assert_eq!(
        booster.get_eval(FIRST_VALIDATION_DATA_INDEX).unwrap(),
        vec![0.25, 0.5]
    );
    assert!(matches!(booster.get_eval(5), Err(Error::Native(_))));
}

#[test]
fn introspection_reads_the_model() {
    testing::reset();
    testing::set_num_classes(3);
    let booster = trained_booster(2);

    assert_eq!(booster.num_features().unwrap(), 3);
    assert_eq!(booster.num_classes().unwrap(), 3);
    assert_eq!(booster.num_predict(TRAINING_DATA_INDEX).unwrap(), 8 * 3);
    assert_eq!(booster.num_iterations(), 2);
}

#[test]
fn model_string_round_trips_through_the_library() {
    testing::reset();
    let booster = trained_booster(5);

    let text = booster.to_string(FeatureImportance::Gain).unwrap();
    let restored = Booster::from_string_with(testing::api(), &text).unwrap();

    assert_eq!(restored.num_iterations(), 5);
    assert_eq!(restored.num_features().unwrap(), 3);
    assert_eq!(restored.to_string(FeatureImportance::Split).unwrap(), text);
    assert!(!text.ends_with('\0'));
}

#[test]
fn small_models_serialize_in_one_pass() {
    testing::reset();
    let booster = trained_booster(1);
    booster.to_string(FeatureImportance::Split).unwrap();

    assert_eq!(testing::calls("LGBM_BoosterSaveModelToString"), 1);
}

#[test]
fn large_models_take_a_second_exactly_sized_pass() {
    testing::reset();
    let big = "tree\n".repeat(20_000);
    testing::set_model_string(big.clone());
    let booster = trained_booster(1);

    let text = booster.to_string_range(0, -1, FeatureImportance::Split).unwrap();

    assert_eq!(text, big);
    assert_eq!(testing::calls("LGBM_BoosterSaveModelToString"), 2);
}

#[test]
fn garbage_model_string_is_a_native_error() {
    testing::reset();
    let err = Booster::from_string_with(testing::api(), "definitely not a model").unwrap_err();

    assert_eq!(err, Error::Native("unknown model format".to_string()));
    assert_eq!(testing::live_handles(), 0);
}

#[test]
fn model_string_with_nul_is_rejected_before_native() {
    testing::reset();
    let err = Booster::from_string_with(testing::api(), "a\0b").unwrap_err();

    assert!(matches!(err, Error::InteriorNul { .. }));
    assert_eq!(testing::calls("LGBM_BoosterLoadModelFromString"), 0);
}

#[test]
fn closed_booster_is_invalid() {
    testing::reset();
    let mut booster = trained_booster(1);
    booster.close();
    booster.close();

    assert_eq!(booster.update_one_iter(), Err(Error::InvalidHandle));
    assert_eq!(booster.get_eval(0), Err(Error::InvalidHandle));
    assert_eq!(
        booster.to_string(FeatureImportance::Split),
        Err(Error::InvalidHandle)
    );
    assert!(booster.predictor(false, Parameters::new()).is_err());
    assert_eq!(testing::live_handles(), 0);
}

// =============================================================================
// Predictor
// =============================================================================

#[test]
fn wrong_width_never_reaches_native() {
    testing::reset();
    let booster = trained_booster(1);
    let mut predictor = booster.predictor(false, Parameters::new()).unwrap();

    assert_eq!(
        predictor.predict(&[1.0, 2.0]),
        Err(Error::FeatureCountMismatch { expected: 3, got: 2 })
    );
    assert_eq!(
        predictor.predict(&[1.0, 2.0, 3.0, 4.0]),
        Err(Error::FeatureCountMismatch { expected: 3, got: 4 })
    );
    assert_eq!(testing::calls("LGBM_BoosterPredictForMatSingleRowFast"), 0);
}

#[test]
fn predictions_have_one_value_per_class() {
    testing::reset();
    testing::set_num_classes(3);
    let booster = trained_booster(2);
    let mut predictor = booster
        .predictor_with(
            PredictorConfig::builder()
                .predict_type(PredictType::RawScore)
                .build(),
        )
        .unwrap();

    let out = predictor.predict(&[1.0, 2.0, 3.0]).unwrap();

    assert_eq!(predictor.num_classes(), 3);
    assert_eq!(out, vec![12.0, 13.0, 14.0]);
}

#[test]
fn repeated_predictions_are_identical() {
    testing::reset();
    let booster = trained_booster(3);
    let mut predictor = booster.predictor(false, Parameters::new()).unwrap();

    let row = [0.1, -0.2, 0.3];
    let first = predictor.predict(&row).unwrap();
    for _ in 0..10 {
        let again = predictor.predict(&row).unwrap();
        assert_eq!(
            first.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            again.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }
    assert!(first[0] > 0.0 && first[0] < 1.0);
}

#[test]
fn predictor_outlives_its_booster() {
    testing::reset();
    let mut booster = trained_booster(1);
    let mut predictor = booster.predictor(true, Parameters::new()).unwrap();

    booster.close();
    drop(booster);
    assert_eq!(testing::calls("LGBM_BoosterFree"), 0);
    assert!(predictor.predict(&[1.0, 1.0, 1.0]).is_ok());

    drop(predictor);
    assert_eq!(testing::calls("LGBM_FastConfigFree"), 1);
    assert_eq!(testing::calls("LGBM_BoosterFree"), 1);
    assert_eq!(testing::live_handles(), 0);
}

#[test]
fn closed_predictor_is_invalid() {
    testing::reset();
    let booster = trained_booster(1);
    let mut predictor = booster.predictor(false, Parameters::new()).unwrap();

    predictor.close();
    predictor.close();

    assert_eq!(predictor.predict(&[1.0, 2.0, 3.0]), Err(Error::InvalidHandle));
    assert_eq!(testing::calls("LGBM_FastConfigFree"), 1);
}

#[test]
fn failed_fast_init_leaves_nothing_behind() {
    testing::reset();
    let booster = trained_booster(1);
    let live = testing::live_handles();
    testing::fail_on("LGBM_BoosterPredictForMatSingleRowFastInit", "no fast path");

    let err = booster.predictor(false, Parameters::new()).unwrap_err();

    assert_eq!(err, Error::Native("no fast path".to_string()));
    assert_eq!(testing::live_handles(), live);
}
