//! Safe bindings to a LightGBM shared library loaded at runtime.
//!
//! Nothing is linked at build time: the first use of the process-wide
//! [`library`] locates `lib_lightgbm` next to the executable (or on the
//! system search path), resolves every entry point the crate needs and
//! routes the library's log output to an observer of your choice.
//!
//! # Overview
//!
//! - [`Dataset`]: rows are appended one at a time and handed to the native
//!   side in one bulk call, the first time the data is needed
//! - [`Booster`]: trains one round per [`update_one_iter`](Booster::update_one_iter),
//!   evaluates, serializes to and from strings
//! - [`Predictor`]: low-latency single-row scoring
//! - [`set_log_observer`]: receives the native log stream as [`LogRecord`]s
//!
//! Every native object is owned by exactly one wrapper and freed exactly once
//! when it is dropped (or closed). Objects another object depends on are
//! kept alive by that object, so drop order never matters.
//!
//! # Example
//!
//! ```no_run
//! use lgbm_dyn::{Booster, Dataset, Parameters};
//!
//! lgbm_dyn::set_log_observer(lgbm_dyn::forward_to_log());
//!
//! let mut data = Dataset::new(Parameters::new());
//! for i in 0..1000 {
//!     let x = i as f64 / 1000.0;
//!     data.append_row(&[x, 1.0 - x])?;
//!     data.set_label(2.0 * x)?;
//! }
//!
//! let params: Parameters = "objective=regression num_leaves=15 verbosity=-1".parse()?;
//! let mut booster = Booster::create(&data, &params, &[])?;
//! for _ in 0..50 {
//!     if booster.update_one_iter()? {
//!         break;
//!     }
//! }
//!
//! let mut predictor = booster.predictor(false, Parameters::new())?;
//! let y = predictor.predict(&[0.25, 0.75])?;
//! # Ok::<(), lgbm_dyn::Error>(())
//! ```
//!
//! # Threading
//!
//! Wrappers are `Send` but not `Sync`: move them between threads freely, but
//! mutate each from one thread at a time. Calls are synchronous, which keeps
//! LightGBM's per-thread error state consistent.

mod array;
pub mod booster;
pub mod buffer;
pub mod dataset;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod params;
pub mod predictor;
pub mod testing;

pub use booster::{
    Booster, FeatureImportance, FIRST_VALIDATION_DATA_INDEX, SECOND_VALIDATION_DATA_INDEX,
    TRAINING_DATA_INDEX,
};
pub use buffer::{GrowableBuffer, EXPANSION_FACTOR};
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use ffi::{library, Api, LoaderConfig, NativeHandle, REQUIRED_SYMBOLS};
pub use logging::{
    clear_log_observer, forward_to_log, log_pipeline, set_log_observer, LogObserver, LogPipeline,
    LogReassembler, LogRecord,
};
pub use params::Parameters;
pub use predictor::{PredictType, Predictor, PredictorConfig};
