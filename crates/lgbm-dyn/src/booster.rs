//! Gradient-boosted model handle.
//!
//! A [`Booster`] is either trained from a [`Dataset`] one round at a time or
//! restored from a model string produced by [`Booster::to_string`].
//!
//! # Example
//!
//! ```no_run
//! use lgbm_dyn::{Booster, Dataset, FeatureImportance, Parameters, TRAINING_DATA_INDEX};
//!
//! # fn train(ds: &Dataset) -> lgbm_dyn::Result<()> {
//! let params: Parameters = "objective=regression metric=l2 verbosity=-1".parse()?;
//! let mut booster = Booster::create(ds, &params, &[])?;
//! for _ in 0..100 {
//!     if booster.update_one_iter()? {
//!         break;
//!     }
//! }
//! println!("l2 = {:?}", booster.get_eval(TRAINING_DATA_INDEX)?);
//!
//! let text = booster.to_string(FeatureImportance::Split)?;
//! let restored = Booster::from_string(&text)?;
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::ffi::{
    library, Api, BoosterKind, DatasetKind, NativeHandle, C_API_FEATURE_IMPORTANCE_GAIN,
    C_API_FEATURE_IMPORTANCE_SPLIT,
};
use crate::params::Parameters;
use crate::predictor::{PredictType, Predictor, PredictorConfig};

/// Data index of the training set in [`Booster::get_eval`].
pub const TRAINING_DATA_INDEX: usize = 0;
/// Data index of the first validation set.
pub const FIRST_VALIDATION_DATA_INDEX: usize = 1;
/// Data index of the second validation set.
pub const SECOND_VALIDATION_DATA_INDEX: usize = 2;

/// How feature importance is recorded in a serialized model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FeatureImportance {
    /// Number of times a feature is used to split.
    #[default]
    Split = C_API_FEATURE_IMPORTANCE_SPLIT,
    /// Total gain of the splits that use a feature.
    Gain = C_API_FEATURE_IMPORTANCE_GAIN,
}

// =============================================================================
// Shared model state
// =============================================================================

/// The native model plus the datasets it was built over.
///
/// Shared between a [`Booster`] and the [`Predictor`]s derived from it.
/// Fields drop in order: the model is freed before the datasets it refers to.
pub(crate) struct Model {
    pub(crate) handle: NativeHandle<BoosterKind>,
    _datasets: Vec<Arc<NativeHandle<DatasetKind>>>,
}

impl Model {
    #[inline]
    pub(crate) fn api(&self) -> &'static Api {
        self.handle.api()
    }
}

// =============================================================================
// Booster
// =============================================================================

/// A trainable, serializable model.
pub struct Booster {
    model: Option<Arc<Model>>,
    iterations: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl std::fmt::Debug for Booster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Booster")
            .field("handle", &self.model.as_ref().map(|m| &m.handle))
            .field("iterations", &self.iterations)
            .finish()
    }
}

impl Booster {
    fn from_model(model: Model, iterations: usize) -> Self {
        Self {
            model: Some(Arc::new(model)),
            iterations,
            _not_sync: PhantomData,
        }
    }

    /// Create a booster over `train`, registering each of `validators` as
    /// validation data in order (data index 1, 2, ...).
    ///
    /// Datasets that are still building are materialized first. A validator
    /// bound to a different library than `train` is rejected with
    /// [`Error::InvalidHandle`]. If any step fails the new native booster is
    /// freed before the error is returned.
    pub fn create(train: &Dataset, params: &Parameters, validators: &[&Dataset]) -> Result<Self> {
        let train = train.handle()?;
        let api = train.api();
        let handle = api.booster_create(train.as_raw(), params)?;

        let mut datasets = Vec::with_capacity(validators.len() + 1);
        datasets.push(Arc::clone(train));
        for validator in validators {
            let valid = validator.handle()?;
            if !std::ptr::eq(valid.api(), api) {
                return Err(Error::InvalidHandle);
            }
            api.booster_add_valid_data(handle.as_raw(), valid.as_raw())?;
            datasets.push(Arc::clone(valid));
        }

        log::debug!(
            "created booster with {} validation set(s)",
            validators.len()
        );
        Ok(Self::from_model(
            Model {
                handle,
                _datasets: datasets,
            },
            0,
        ))
    }

    /// Restore a booster from a serialized model, using the process-wide
    /// library.
    pub fn from_string(model: &str) -> Result<Self> {
        Self::from_string_with(library()?, model)
    }

    /// Restore a booster from a serialized model using a specific library.
    pub fn from_string_with(api: &'static Api, model: &str) -> Result<Self> {
        let (handle, iterations) = api.booster_load_model_from_string(model)?;
        log::debug!("loaded model with {iterations} iteration(s)");
        Ok(Self::from_model(
            Model {
                handle,
                _datasets: Vec::new(),
            },
            iterations,
        ))
    }

    fn model(&self) -> Result<&Arc<Model>> {
        self.model.as_ref().ok_or(Error::InvalidHandle)
    }

    /// The native booster.
    pub fn handle(&self) -> Result<&NativeHandle<BoosterKind>> {
        Ok(&self.model()?.handle)
    }

    // =========================================================================
    // Training
    // =========================================================================

    /// Run exactly one boosting round.
    ///
    /// Returns `true` when the native side reports training is finished
    /// (no further splits possible); callers use it to leave a fixed
    /// iteration loop early.
    pub fn update_one_iter(&mut self) -> Result<bool> {
        let model = self.model()?;
        let finished = model.api().booster_update_one_iter(model.handle.as_raw())?;
        if !finished {
            self.iterations += 1;
        }
        Ok(finished)
    }

    /// Current metric values for `data_index`
    /// ([`TRAINING_DATA_INDEX`], [`FIRST_VALIDATION_DATA_INDEX`], ...).
    ///
    /// Empty when no metric is configured.
    pub fn get_eval(&self, data_index: usize) -> Result<Vec<f64>> {
        let model = self.model()?;
        model.api().booster_get_eval(model.handle.as_raw(), data_index)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn num_features(&self) -> Result<usize> {
        let model = self.model()?;
        model.api().booster_num_features(model.handle.as_raw())
    }

    pub fn num_classes(&self) -> Result<usize> {
        let model = self.model()?;
        model.api().booster_num_classes(model.handle.as_raw())
    }

    /// Number of metrics evaluated per data set.
    pub fn eval_counts(&self) -> Result<usize> {
        let model = self.model()?;
        model.api().booster_eval_counts(model.handle.as_raw())
    }

    /// Length of the native prediction buffer for `data_index`.
    pub fn num_predict(&self, data_index: usize) -> Result<usize> {
        let model = self.model()?;
        model.api().booster_num_predict(model.handle.as_raw(), data_index)
    }

    /// Boosting rounds completed since creation, or the count stored in the
    /// model string for restored boosters.
    pub fn num_iterations(&self) -> usize {
        self.iterations
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize every iteration of the model.
    pub fn to_string(&self, importance: FeatureImportance) -> Result<String> {
        self.to_string_range(0, -1, importance)
    }

    /// Serialize `num_iteration` iterations starting at `start_iteration`.
    /// A non-positive `num_iteration` means all remaining iterations.
    pub fn to_string_range(
        &self,
        start_iteration: i32,
        num_iteration: i32,
        importance: FeatureImportance,
    ) -> Result<String> {
        let model = self.model()?;
        model.api().booster_save_model_to_string(
            model.handle.as_raw(),
            start_iteration,
            num_iteration,
            importance as i32,
        )
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// A single-row predictor over all iterations.
    pub fn predictor(&self, raw_score: bool, params: Parameters) -> Result<Predictor> {
        let predict_type = if raw_score {
            PredictType::RawScore
        } else {
            PredictType::Normal
        };
        self.predictor_with(
            PredictorConfig::builder()
                .predict_type(predict_type)
                .params(params)
                .build(),
        )
    }

    /// A single-row predictor with full control over the iteration range.
    ///
    /// The predictor keeps the model alive on its own; closing or dropping
    /// this booster does not invalidate it.
    pub fn predictor_with(&self, config: PredictorConfig) -> Result<Predictor> {
        Predictor::new(Arc::clone(self.model()?), &config)
    }

    /// Release this booster's reference to the native model.
    ///
    /// Predictors derived from it keep working. Every later call on this
    /// booster fails with [`Error::InvalidHandle`].
    pub fn close(&mut self) {
        self.model = None;
    }
}
