//! In-process stand-in for the LightGBM shared library.
//!
//! [`api`] returns an [`Api`] whose symbol table points at `extern "C"`
//! functions defined here. They keep their state per thread, so every test
//! thread sees its own fresh library. The mock records how often each entry
//! point was called, hands out fake handles, and tracks which are still live,
//! which makes leaks and double frees directly observable.
//!
//! The behavior is a small functional model of the real library:
//!
//! - datasets remember their shape, fields and feature names and validate
//!   them the way LightGBM does (per-row fields need one value per row,
//!   group sizes must sum to the row count);
//! - boosters count iterations and can be told to report completion;
//! - a fast prediction returns `sum(row) * max(iterations, 1) + class`,
//!   passed through a sigmoid unless raw scores were requested.
//!
//! # Example
//!
//! ```
//! use lgbm_dyn::{testing, Dataset, Parameters};
//!
//! testing::reset();
//! let mut ds = Dataset::with_api(testing::api(), Parameters::new());
//! ds.append_row(&[1.0, 2.0])?;
//! ds.handle()?;
//! assert_eq!(testing::calls("LGBM_DatasetCreateFromMat"), 1);
//! assert_eq!(testing::live_handles(), 1);
//! # Ok::<(), lgbm_dyn::Error>(())
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::sync::OnceLock;

use crate::ffi::{
    Api, LogCallback, RawHandle, Symbols, C_API_DTYPE_FLOAT32, C_API_DTYPE_FLOAT64,
    C_API_DTYPE_INT32, C_API_PREDICT_RAW_SCORE,
};

const OK: c_int = 0;
const FAIL: c_int = -1;
const FIRST_HANDLE: usize = 0x1000;

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone)]
struct MockDataset {
    rows: usize,
    cols: usize,
    reference: Option<usize>,
    fields: HashMap<String, Vec<f64>>,
    feature_names: Vec<String>,
}

#[derive(Debug, Clone)]
struct MockBooster {
    num_features: usize,
    iterations: usize,
    datasets: Vec<usize>,
}

#[derive(Debug, Clone)]
struct MockFastConfig {
    booster: usize,
    ncol: usize,
    raw_score: bool,
}

#[derive(Debug, Clone)]
enum Object {
    Dataset(MockDataset),
    Booster(MockBooster),
    FastConfig(MockFastConfig),
}

#[derive(Debug)]
struct State {
    calls: HashMap<&'static str, usize>,
    failures: HashMap<String, String>,
    last_error: CString,
    next_handle: usize,
    objects: HashMap<usize, Object>,
    num_classes: usize,
    finish_after: Option<usize>,
    eval: Vec<f64>,
    model_string: Option<String>,
    log_callback: Option<LogCallback>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            calls: HashMap::new(),
            failures: HashMap::new(),
            last_error: CString::default(),
            next_handle: FIRST_HANDLE,
            objects: HashMap::new(),
            num_classes: 1,
            finish_after: None,
            eval: Vec::new(),
            model_string: None,
            log_callback: None,
        }
    }
}

impl State {
    fn fail(&mut self, message: impl Into<String>) -> c_int {
        self.last_error = CString::new(message.into()).unwrap_or_default();
        FAIL
    }

    fn insert(&mut self, object: Object) -> RawHandle {
        let handle = self.next_handle;
        self.next_handle += 0x10;
        self.objects.insert(handle, object);
        handle as RawHandle
    }

    fn dataset(&self, handle: RawHandle) -> Option<&MockDataset> {
        match self.objects.get(&(handle as usize)) {
            Some(Object::Dataset(ds)) => Some(ds),
            _ => None,
        }
    }

    fn dataset_mut(&mut self, handle: RawHandle) -> Option<&mut MockDataset> {
        match self.objects.get_mut(&(handle as usize)) {
            Some(Object::Dataset(ds)) => Some(ds),
            _ => None,
        }
    }

    fn booster(&self, handle: RawHandle) -> Option<&MockBooster> {
        match self.objects.get(&(handle as usize)) {
            Some(Object::Booster(b)) => Some(b),
            _ => None,
        }
    }

    fn booster_mut(&mut self, handle: RawHandle) -> Option<&mut MockBooster> {
        match self.objects.get_mut(&(handle as usize)) {
            Some(Object::Booster(b)) => Some(b),
            _ => None,
        }
    }

    fn remove(&mut self, handle: RawHandle, kind: &str) -> c_int {
        let key = handle as usize;
        let matches = match (self.objects.get(&key), kind) {
            (Some(Object::Dataset(_)), "dataset")
            | (Some(Object::Booster(_)), "booster")
            | (Some(Object::FastConfig(_)), "fast config") => true,
            _ => false,
        };
        if !matches {
            return self.fail(format!("unknown {kind} handle {key:#x}"));
        }
        self.objects.remove(&key);
        OK
    }

    fn model_text(booster: &MockBooster) -> String {
        format!(
            "mock_model\nnum_features={}\nnum_iterations={}\n",
            booster.num_features, booster.iterations
        )
    }
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State::default());
}

fn with_state<R>(f: impl FnOnce(&mut State) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// Count the call, apply any configured failure, then run the body.
fn call(symbol: &'static str, body: impl FnOnce(&mut State) -> c_int) -> c_int {
    with_state(|state| {
        *state.calls.entry(symbol).or_default() += 1;
        if let Some(message) = state.failures.get(symbol).cloned() {
            return state.fail(message);
        }
        body(state)
    })
}

unsafe fn read_values(data: *const c_void, len: usize, dtype: c_int) -> Option<Vec<f64>> {
    if data.is_null() {
        return None;
    }
    let values = match dtype {
        C_API_DTYPE_FLOAT32 => std::slice::from_raw_parts(data.cast::<f32>(), len)
            .iter()
            .map(|&v| f64::from(v))
            .collect(),
        C_API_DTYPE_FLOAT64 => std::slice::from_raw_parts(data.cast::<f64>(), len).to_vec(),
        C_API_DTYPE_INT32 => std::slice::from_raw_parts(data.cast::<i32>(), len)
            .iter()
            .map(|&v| f64::from(v))
            .collect(),
        _ => return None,
    };
    Some(values)
}

unsafe fn read_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        None
    } else {
        CStr::from_ptr(ptr).to_str().ok()
    }
}

// =============================================================================
// Entry points
// =============================================================================

unsafe extern "C" fn get_last_error() -> *const c_char {
    with_state(|state| state.last_error.as_ptr())
}

unsafe extern "C" fn register_log_callback(callback: Option<LogCallback>) -> c_int {
    call("LGBM_RegisterLogCallback", |state| {
        state.log_callback = callback;
        OK
    })
}

unsafe extern "C" fn dataset_create_from_mat(
    data: *const c_void,
    data_type: c_int,
    nrow: i32,
    ncol: i32,
    is_row_major: c_int,
    _parameters: *const c_char,
    reference: RawHandle,
    out: *mut RawHandle,
) -> c_int {
    call("LGBM_DatasetCreateFromMat", |state| {
        if data.is_null() || out.is_null() || data_type != C_API_DTYPE_FLOAT64 || is_row_major != 1 {
            return state.fail("unsupported matrix layout");
        }
        if nrow <= 0 || ncol <= 0 {
            return state.fail("empty matrix");
        }
        let reference = if reference.is_null() {
            None
        } else {
            match state.dataset(reference).map(|r| r.cols) {
                Some(cols) if cols == ncol as usize => Some(reference as usize),
                Some(_) => return state.fail("reference dataset has a different feature count"),
                None => return state.fail("unknown reference dataset"),
            }
        };
        let handle = state.insert(Object::Dataset(MockDataset {
            rows: nrow as usize,
            cols: ncol as usize,
            reference,
            fields: HashMap::new(),
            feature_names: Vec::new(),
        }));
        unsafe { *out = handle };
        OK
    })
}

unsafe extern "C" fn dataset_free(handle: RawHandle) -> c_int {
    call("LGBM_DatasetFree", |state| state.remove(handle, "dataset"))
}

unsafe extern "C" fn dataset_set_field(
    handle: RawHandle,
    field_name: *const c_char,
    field_data: *const c_void,
    num_element: c_int,
    data_type: c_int,
) -> c_int {
    let name = unsafe { read_str(field_name) }.map(str::to_string);
    let values = usize::try_from(num_element)
        .ok()
        .and_then(|len| unsafe { read_values(field_data, len, data_type) });
    call("LGBM_DatasetSetField", |state| {
        let (Some(name), Some(values)) = (name, values) else {
            return state.fail("invalid field arguments");
        };
        let Some(rows) = state.dataset(handle).map(|ds| ds.rows) else {
            return state.fail("unknown dataset handle");
        };
        let valid = match name.as_str() {
            "label" | "weight" => data_type == C_API_DTYPE_FLOAT32 && values.len() == rows,
            "init_score" => data_type == C_API_DTYPE_FLOAT64 && values.len() % rows == 0,
            "group" => {
                data_type == C_API_DTYPE_INT32 && values.iter().sum::<f64>() as usize == rows
            }
            _ => return state.fail(format!("unknown field {name}")),
        };
        if !valid {
            return state.fail(format!("length of {name} does not match the data"));
        }
        if let Some(ds) = state.dataset_mut(handle) {
            ds.fields.insert(name, values);
        }
        OK
    })
}

unsafe extern "C" fn dataset_set_feature_names(
    handle: RawHandle,
    feature_names: *const *const c_char,
    num_feature_names: c_int,
) -> c_int {
    let names: Option<Vec<String>> = if feature_names.is_null() {
        None
    } else {
        let count = usize::try_from(num_feature_names).unwrap_or(0);
        unsafe { std::slice::from_raw_parts(feature_names, count) }
            .iter()
            .map(|&ptr| unsafe { read_str(ptr) }.map(str::to_string))
            .collect()
    };
    call("LGBM_DatasetSetFeatureNames", |state| {
        let Some(names) = names else {
            return state.fail("invalid feature names");
        };
        match state.dataset(handle).map(|ds| ds.cols) {
            Some(cols) if cols == names.len() => {
                if let Some(ds) = state.dataset_mut(handle) {
                    ds.feature_names = names;
                }
                OK
            }
            Some(_) => state.fail("feature name count does not match"),
            None => state.fail("unknown dataset handle"),
        }
    })
}

unsafe extern "C" fn booster_create(
    train_data: RawHandle,
    _parameters: *const c_char,
    out: *mut RawHandle,
) -> c_int {
    call("LGBM_BoosterCreate", |state| {
        let Some(num_features) = state.dataset(train_data).map(|ds| ds.cols) else {
            return state.fail("unknown training dataset");
        };
        let handle = state.insert(Object::Booster(MockBooster {
            num_features,
            iterations: 0,
            datasets: vec![train_data as usize],
        }));
        unsafe { *out = handle };
        OK
    })
}

unsafe extern "C" fn booster_free(handle: RawHandle) -> c_int {
    call("LGBM_BoosterFree", |state| state.remove(handle, "booster"))
}

unsafe extern "C" fn booster_add_valid_data(handle: RawHandle, valid_data: RawHandle) -> c_int {
    call("LGBM_BoosterAddValidData", |state| {
        if state.dataset(valid_data).is_none() {
            return state.fail("unknown validation dataset");
        }
        match state.booster_mut(handle) {
            Some(booster) => {
                booster.datasets.push(valid_data as usize);
                OK
            }
            None => state.fail("unknown booster handle"),
        }
    })
}

unsafe extern "C" fn booster_update_one_iter(handle: RawHandle, is_finished: *mut c_int) -> c_int {
    call("LGBM_BoosterUpdateOneIter", |state| {
        let finish_after = state.finish_after;
        let Some(booster) = state.booster_mut(handle) else {
            return state.fail("unknown booster handle");
        };
        let finished = finish_after.is_some_and(|limit| booster.iterations >= limit);
        if !finished {
            booster.iterations += 1;
        }
        unsafe { *is_finished = c_int::from(finished) };
        OK
    })
}

unsafe extern "C" fn booster_get_eval(
    handle: RawHandle,
    data_idx: c_int,
    out_len: *mut c_int,
    out_results: *mut f64,
) -> c_int {
    call("LGBM_BoosterGetEval", |state| {
        let Some(booster) = state.booster(handle) else {
            return state.fail("unknown booster handle");
        };
        if usize::try_from(data_idx).map_or(true, |idx| idx >= booster.datasets.len()) {
            return state.fail("data index out of range");
        }
        unsafe {
            std::ptr::copy_nonoverlapping(state.eval.as_ptr(), out_results, state.eval.len());
            *out_len = state.eval.len() as c_int;
        }
        OK
    })
}

unsafe extern "C" fn booster_get_eval_counts(handle: RawHandle, out_len: *mut c_int) -> c_int {
    call("LGBM_BoosterGetEvalCounts", |state| {
        if state.booster(handle).is_none() {
            return state.fail("unknown booster handle");
        }
        unsafe { *out_len = state.eval.len() as c_int };
        OK
    })
}

unsafe extern "C" fn booster_get_num_feature(handle: RawHandle, out_len: *mut c_int) -> c_int {
    call("LGBM_BoosterGetNumFeature", |state| {
        match state.booster(handle).map(|b| b.num_features) {
            Some(n) => {
                unsafe { *out_len = n as c_int };
                OK
            }
            None => state.fail("unknown booster handle"),
        }
    })
}

unsafe extern "C" fn booster_get_num_classes(handle: RawHandle, out_len: *mut c_int) -> c_int {
    call("LGBM_BoosterGetNumClasses", |state| {
        if state.booster(handle).is_none() {
            return state.fail("unknown booster handle");
        }
        unsafe { *out_len = state.num_classes as c_int };
        OK
    })
}

unsafe extern "C" fn booster_get_num_predict(
    handle: RawHandle,
    data_idx: c_int,
    out_len: *mut i64,
) -> c_int {
    call("LGBM_BoosterGetNumPredict", |state| {
        let dataset = state.booster(handle).and_then(|b| {
            usize::try_from(data_idx)
                .ok()
                .and_then(|idx| b.datasets.get(idx).copied())
        });
        let rows = dataset.and_then(|key| state.dataset(key as RawHandle).map(|ds| ds.rows));
        match rows {
            Some(rows) => {
                unsafe { *out_len = (rows * state.num_classes) as i64 };
                OK
            }
            None => state.fail("data index out of range"),
        }
    })
}

unsafe extern "C" fn booster_save_model_to_string(
    handle: RawHandle,
    _start_iteration: c_int,
    _num_iteration: c_int,
    _feature_importance_type: c_int,
    buffer_len: i64,
    out_len: *mut i64,
    out_str: *mut c_char,
) -> c_int {
    call("LGBM_BoosterSaveModelToString", |state| {
        let Some(booster) = state.booster(handle) else {
            return state.fail("unknown booster handle");
        };
        let text = state
            .model_string
            .clone()
            .unwrap_or_else(|| State::model_text(booster));
        let needed = text.len() + 1;
        unsafe { *out_len = needed as i64 };
        if usize::try_from(buffer_len).is_ok_and(|len| len >= needed) {
            unsafe {
                std::ptr::copy_nonoverlapping(text.as_ptr(), out_str.cast::<u8>(), text.len());
                *out_str.add(text.len()) = 0;
            }
        }
        OK
    })
}

unsafe extern "C" fn booster_load_model_from_string(
    model_str: *const c_char,
    out_num_iterations: *mut c_int,
    out: *mut RawHandle,
) -> c_int {
    let text = unsafe { read_str(model_str) }.map(str::to_string);
    call("LGBM_BoosterLoadModelFromString", |state| {
        let Some(text) = text else {
            return state.fail("model string is not valid UTF-8");
        };
        let field = |key: &str| {
            text.lines()
                .find_map(|line| line.strip_prefix(key))
                .and_then(|v| v.trim().parse::<usize>().ok())
        };
        let (Some(num_features), Some(iterations)) = (field("num_features="), field("num_iterations="))
        else {
            return state.fail("unknown model format");
        };
        let handle = state.insert(Object::Booster(MockBooster {
            num_features,
            iterations,
            datasets: Vec::new(),
        }));
        unsafe {
            *out_num_iterations = iterations as c_int;
            *out = handle;
        }
        OK
    })
}

unsafe extern "C" fn fast_init(
    handle: RawHandle,
    predict_type: c_int,
    _start_iteration: c_int,
    _num_iteration: c_int,
    data_type: c_int,
    ncol: i32,
    _parameters: *const c_char,
    out_fast_config: *mut RawHandle,
) -> c_int {
    call("LGBM_BoosterPredictForMatSingleRowFastInit", |state| {
        let Some(num_features) = state.booster(handle).map(|b| b.num_features) else {
            return state.fail("unknown booster handle");
        };
        if data_type != C_API_DTYPE_FLOAT64 || usize::try_from(ncol) != Ok(num_features) {
            return state.fail("row layout does not match the model");
        }
        let config = state.insert(Object::FastConfig(MockFastConfig {
            booster: handle as usize,
            ncol: num_features,
            raw_score: predict_type == C_API_PREDICT_RAW_SCORE,
        }));
        unsafe { *out_fast_config = config };
        OK
    })
}

unsafe extern "C" fn fast_predict(
    fast_config: RawHandle,
    data: *const c_void,
    out_len: *mut i64,
    out_result: *mut f64,
) -> c_int {
    call("LGBM_BoosterPredictForMatSingleRowFast", |state| {
        let Some(Object::FastConfig(config)) = state.objects.get(&(fast_config as usize)).cloned()
        else {
            return state.fail("unknown fast config handle");
        };
        let Some(iterations) = state
            .booster(config.booster as RawHandle)
            .map(|b| b.iterations)
        else {
            return state.fail("booster was freed before its fast config");
        };
        let row = unsafe { std::slice::from_raw_parts(data.cast::<f64>(), config.ncol) };
        let base = row.iter().sum::<f64>() * iterations.max(1) as f64;
        for class in 0..state.num_classes {
            let raw = base + class as f64;
            let value = if config.raw_score {
                raw
            } else {
                1.0 / (1.0 + (-raw).exp())
            };
            unsafe { *out_result.add(class) = value };
        }
        unsafe { *out_len = state.num_classes as i64 };
        OK
    })
}

unsafe extern "C" fn fast_config_free(handle: RawHandle) -> c_int {
    call("LGBM_FastConfigFree", |state| state.remove(handle, "fast config"))
}

// =============================================================================
// Public handle
// =============================================================================

/// Symbol table of the mock library.
pub fn symbols() -> Symbols {
    Symbols {
        get_last_error,
        register_log_callback,
        dataset_create_from_mat,
        dataset_free,
        dataset_set_field,
        dataset_set_feature_names,
        booster_create,
        booster_free,
        booster_add_valid_data,
        booster_update_one_iter,
        booster_get_eval,
        booster_get_eval_counts,
        booster_get_num_feature,
        booster_get_num_classes,
        booster_get_num_predict,
        booster_save_model_to_string,
        booster_load_model_from_string,
        fast_init,
        fast_predict,
        fast_config_free,
    }
}

/// The mock library, shared by every thread.
pub fn api() -> &'static Api {
    static MOCK: OnceLock<Api> = OnceLock::new();
    // SAFETY: every entry point above only writes through the out-pointers
    // it is given and sizes its output from the inputs it was handed.
    MOCK.get_or_init(|| unsafe { Api::from_symbols(symbols()) })
}

// =============================================================================
// Test controls (all per thread)
// =============================================================================

/// Forget every object, counter and setting on this thread.
pub fn reset() {
    with_state(|state| *state = State::default());
}

/// Make every call to `symbol` fail with `message` until [`reset`].
pub fn fail_on(symbol: &str, message: &str) {
    with_state(|state| {
        state.failures.insert(symbol.to_string(), message.to_string());
    });
}

/// How often `symbol` was called.
pub fn calls(symbol: &str) -> usize {
    with_state(|state| state.calls.get(symbol).copied().unwrap_or(0))
}

/// Native objects created and not yet freed.
pub fn live_handles() -> usize {
    with_state(|state| state.objects.len())
}

pub fn is_live(handle: RawHandle) -> bool {
    with_state(|state| state.objects.contains_key(&(handle as usize)))
}

/// Classes reported by every booster. Default: 1.
pub fn set_num_classes(num_classes: usize) {
    with_state(|state| state.num_classes = num_classes);
}

/// Report training finished once a booster has `iterations` rounds.
pub fn finish_after(iterations: usize) {
    with_state(|state| state.finish_after = Some(iterations));
}

/// Metric values returned by `LGBM_BoosterGetEval`.
pub fn set_eval(values: Vec<f64>) {
    with_state(|state| state.eval = values);
}

/// Text returned by `LGBM_BoosterSaveModelToString` instead of the
/// generated model.
pub fn set_model_string(model: impl Into<String>) {
    with_state(|state| state.model_string = Some(model.into()));
}

/// Values stored for `field` on a dataset, widened to `f64`.
pub fn dataset_field(handle: RawHandle, field: &str) -> Option<Vec<f64>> {
    with_state(|state| state.dataset(handle)?.fields.get(field).cloned())
}

pub fn dataset_feature_names(handle: RawHandle) -> Vec<String> {
    with_state(|state| {
        state
            .dataset(handle)
            .map(|ds| ds.feature_names.clone())
            .unwrap_or_default()
    })
}

/// `(rows, columns)` of a live dataset.
pub fn dataset_shape(handle: RawHandle) -> Option<(usize, usize)> {
    with_state(|state| state.dataset(handle).map(|ds| (ds.rows, ds.cols)))
}

/// The reference a dataset was created against.
pub fn dataset_reference(handle: RawHandle) -> Option<RawHandle> {
    with_state(|state| state.dataset(handle)?.reference.map(|r| r as RawHandle))
}

/// Whether a log callback has been registered on this thread.
pub fn has_log_callback() -> bool {
    with_state(|state| state.log_callback.is_some())
}
