//! Low-latency single-row scoring.
//!
//! A [`Predictor`] prepares a native fast-prediction context once and then
//! scores one row per call without any per-call setup. Feature and class
//! counts are read from the model at construction, so a row of the wrong
//! width is rejected before anything crosses into native code.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use bon::Builder;

use crate::booster::Model;
use crate::error::{Error, Result};
use crate::ffi::{FastConfigKind, NativeHandle, C_API_PREDICT_NORMAL, C_API_PREDICT_RAW_SCORE};
use crate::params::Parameters;

/// What a prediction returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PredictType {
    /// Transformed output (probabilities for classification).
    #[default]
    Normal = C_API_PREDICT_NORMAL,
    /// Untransformed margin.
    RawScore = C_API_PREDICT_RAW_SCORE,
}

/// Settings for [`Booster::predictor_with`](crate::Booster::predictor_with).
#[derive(Debug, Clone, Builder)]
pub struct PredictorConfig {
    #[builder(default)]
    pub predict_type: PredictType,

    /// First iteration used. Default: 0.
    #[builder(default = 0)]
    pub start_iteration: i32,

    /// Number of iterations used; -1 for all. Default: -1.
    #[builder(default = -1)]
    pub num_iteration: i32,

    /// Extra prediction parameters.
    #[builder(default)]
    pub params: Parameters,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Reusable single-row prediction context.
pub struct Predictor {
    fast: Option<NativeHandle<FastConfigKind>>,
    _model: Option<Arc<Model>>,
    num_features: usize,
    num_classes: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("fast", &self.fast)
            .field("num_features", &self.num_features)
            .field("num_classes", &self.num_classes)
            .finish()
    }
}

impl Predictor {
    pub(crate) fn new(model: Arc<Model>, config: &PredictorConfig) -> Result<Self> {
        let api = model.api();
        let booster = model.handle.as_raw();
        let num_features = api.booster_num_features(booster)?;
        let num_classes = api.booster_num_classes(booster)?;
        let fast = api.fast_init(
            booster,
            config.predict_type as i32,
            config.start_iteration,
            config.num_iteration,
            num_features,
            &config.params,
        )?;
        log::debug!("prepared predictor: {num_features} features, {num_classes} class(es)");
        Ok(Self {
            fast: Some(fast),
            _model: Some(model),
            num_features,
            num_classes,
            _not_sync: PhantomData,
        })
    }

    /// Features a row must have.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Values returned per row.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Score one row.
    ///
    /// Fails with [`Error::FeatureCountMismatch`] when `row` does not have
    /// exactly [`num_features`](Self::num_features) values.
    pub fn predict(&mut self, row: &[f64]) -> Result<Vec<f64>> {
        let mut out = vec![0.0; self.num_classes.max(1)];
        let written = self.predict_into(row, &mut out)?;
        out.truncate(written);
        Ok(out)
    }

    /// Score one row into `out`, returning the number of values written.
    pub(crate) fn predict_into(&mut self, row: &[f64], out: &mut [f64]) -> Result<usize> {
        let fast = self.fast.as_ref().ok_or(Error::InvalidHandle)?;
        if row.len() != self.num_features {
            return Err(Error::FeatureCountMismatch {
                expected: self.num_features,
                got: row.len(),
            });
        }
        fast.api().fast_predict(fast.as_raw(), row, out)
    }

    /// Free the fast-prediction context and drop the model reference.
    ///
    /// Every later prediction fails with [`Error::InvalidHandle`].
    pub fn close(&mut self) {
        self.fast = None;
        self._model = None;
    }
}
