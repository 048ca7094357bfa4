//! Training and scoring against the real LightGBM library.
//!
//! Skipped (with a note on stderr) when `lib_lightgbm` cannot be loaded.

use approx::assert_relative_eq;
use ndarray::Array2;
use rstest::rstest;

use lgbm_dyn::{
    library, Booster, Dataset, FeatureImportance, Parameters, FIRST_VALIDATION_DATA_INDEX,
    TRAINING_DATA_INDEX,
};

const SAMPLES: usize = 2000;
const FEATURES: usize = 4;
const MAX_ROUNDS: usize = 100;

fn lightgbm_available() -> bool {
    match library() {
        Ok(_) => true,
        Err(err) => {
            eprintln!("skipping: LightGBM not available ({err})");
            false
        }
    }
}

/// Deterministic pseudo-random features in `[0, 1)`.
fn features(n: usize, seed: u64) -> Array2<f64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    Array2::from_shape_fn((n, FEATURES), |_| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    })
}

fn target(row: &[f64], binary: bool) -> f64 {
    let score = 2.0 * row[0] - row[1] + 0.5 * row[2];
    if binary {
        f64::from(u8::from(score > 0.75))
    } else {
        score
    }
}

fn build(x: &Array2<f64>, binary: bool, reference: Option<&Dataset>) -> Dataset {
    let params = Parameters::new().with("max_bin", 63);
    let mut ds = match reference {
        Some(reference) => Dataset::with_reference(params, reference).unwrap(),
        None => Dataset::new(params),
    };
    ds.append_rows(x.view()).unwrap();
    for row in x.rows() {
        ds.set_label(target(row.as_slice().unwrap(), binary)).unwrap();
    }
    ds.set_feature_names(&["f0", "f1", "f2", "f3"]).unwrap();
    ds
}

#[rstest]
#[case::regression("objective=regression metric=l2", false)]
#[case::binary("objective=binary metric=binary_logloss", true)]
fn train_predict_and_restore(#[case] objective: &str, #[case] binary: bool) {
    if !lightgbm_available() {
        return;
    }

    let params: Parameters = format!(
        "{objective} num_leaves=15 learning_rate=0.1 min_data_in_leaf=10 \
         num_threads=1 deterministic=true verbosity=-1"
    )
    .parse()
    .unwrap();

    let train_x = features(SAMPLES, 1);
    let valid_x = features(SAMPLES / 4, 2);
    let train = build(&train_x, binary, None);
    let valid = build(&valid_x, binary, Some(&train));

    let mut booster = Booster::create(&train, &params, &[&valid]).unwrap();
    for _ in 0..MAX_ROUNDS {
        if booster.update_one_iter().unwrap() {
            break;
        }
    }
    assert!(booster.num_iterations() > 0);
    assert_eq!(booster.num_features().unwrap(), FEATURES);
    assert_eq!(booster.num_predict(TRAINING_DATA_INDEX).unwrap(), SAMPLES);

    let train_metric = booster.get_eval(TRAINING_DATA_INDEX).unwrap();
    let valid_metric = booster.get_eval(FIRST_VALIDATION_DATA_INDEX).unwrap();
    assert_eq!(train_metric.len(), 1);
    assert_eq!(valid_metric.len(), 1);
    assert!(train_metric[0].is_finite() && valid_metric[0].is_finite());

    let classes = booster.num_classes().unwrap();
    let mut predictor = booster.predictor(false, Parameters::new()).unwrap();
    let held_out = features(1, 99);
    let row = held_out.row(0).to_vec();
    let first = predictor.predict(&row).unwrap();
    assert_eq!(first.len(), classes);
    for _ in 0..20 {
        let again = predictor.predict(&row).unwrap();
        assert_eq!(first[0].to_bits(), again[0].to_bits());
    }
    if binary {
        assert!((0.0..=1.0).contains(&first[0]));
    }

    let model = booster.to_string(FeatureImportance::Gain).unwrap();
    assert!(model.contains("feature_names=f0 f1 f2 f3"));
    let restored = Booster::from_string(&model).unwrap();
    assert_eq!(restored.num_iterations(), booster.num_iterations());

    let mut restored_predictor = restored.predictor(false, Parameters::new()).unwrap();
    let batch = restored_predictor.predict_rows(valid_x.view()).unwrap();
    assert_eq!(batch.dim(), (SAMPLES / 4, classes));
    assert_relative_eq!(
        restored_predictor.predict(&row).unwrap()[0],
        first[0],
        max_relative = 1e-12
    );
}
