//! Checked wrappers around the resolved entry points.
//!
//! Every wrapper:
//!
//! - rejects null handles with [`Error::InvalidHandle`] before the call,
//! - marshals strings into `CString`s that live until the call returns,
//! - turns a non-zero return code into [`Error::Native`] carrying the text
//!   of `LGBM_GetLastError`.
//!
//! Slices passed by address are borrowed for the whole call, so the native
//! side always sees live, unmoved memory.
//!
//! # Threading
//!
//! LightGBM keeps its last-error string and some call state per OS thread.
//! Calls here are synchronous, so the error fetch always runs on the thread
//! that made the failing call. Async callers must run these calls inside a
//! blocking section rather than across an await point.

use std::ffi::{c_int, CStr, CString};
use std::fmt;
use std::ptr;

use super::{
    BoosterKind, DatasetKind, FastConfigKind, LogCallback, NativeHandle, RawHandle, Symbols,
    C_API_DTYPE_FLOAT32, C_API_DTYPE_FLOAT64, C_API_DTYPE_INT32,
};
use crate::error::{Error, Result};
use crate::params::Parameters;

/// First-pass buffer size for model serialization.
const MODEL_STRING_BUFFER: usize = 32 * 1024;

/// Invoke a symbol and translate its return code.
macro_rules! lgbm_call {
    ($api:expr, $func:ident($($arg:expr),* $(,)?)) => {{
        let api: &Api = $api;
        let ret = unsafe { (api.symbols.$func)($($arg),*) };
        api.check(ret)
    }};
}

// =============================================================================
// Field Types
// =============================================================================

/// Element types accepted by `LGBM_DatasetSetField`.
pub trait FieldType: Copy {
    const DTYPE: c_int;
}

impl FieldType for f32 {
    const DTYPE: c_int = C_API_DTYPE_FLOAT32;
}

impl FieldType for f64 {
    const DTYPE: c_int = C_API_DTYPE_FLOAT64;
}

impl FieldType for i32 {
    const DTYPE: c_int = C_API_DTYPE_INT32;
}

// =============================================================================
// Api
// =============================================================================

/// A loaded native library: its symbol table plus the library mapping that
/// keeps those symbols valid.
///
/// Raw handles never cross this type's public surface. Native objects are
/// created, used and freed through [`Dataset`](crate::Dataset),
/// [`Booster`](crate::Booster) and [`Predictor`](crate::Predictor), which own
/// them:
///
/// ```compile_fail
/// # fn free_twice(booster: &lgbm_dyn::Booster) -> lgbm_dyn::Result<()> {
/// let raw = booster.handle()?.as_raw();
/// lgbm_dyn::testing::api().booster_free(raw);
/// # Ok(())
/// # }
/// ```
pub struct Api {
    symbols: Symbols,
    _library: Option<libloading::Library>,
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("symbols", &self.symbols)
            .field("owns_library", &self._library.is_some())
            .finish()
    }
}

#[inline]
fn non_null(raw: RawHandle) -> Result<RawHandle> {
    if raw.is_null() {
        Err(Error::InvalidHandle)
    } else {
        Ok(raw)
    }
}

#[inline]
fn native_int(what: &'static str, value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::DimensionOverflow { what, value })
}

#[inline]
fn c_string(what: &'static str, value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| Error::InteriorNul { what })
}

#[inline]
fn native_len(value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::Native(format!("native library reported a negative length ({value})")))
}

impl Api {
    /// Wrap a symbol table whose functions live in the current process.
    ///
    /// Used for in-process implementations such as [`crate::testing`].
    ///
    /// # Safety
    ///
    /// Every function in `symbols` must honor the LightGBM C API contract
    /// for its export: write only through the out-pointers it is given,
    /// never report more output than the buffer it was handed, and treat
    /// handles as opaque values it created itself.
    pub unsafe fn from_symbols(symbols: Symbols) -> Self {
        Self {
            symbols,
            _library: None,
        }
    }

    pub(crate) fn from_library(library: libloading::Library, symbols: Symbols) -> Self {
        Self {
            symbols,
            _library: Some(library),
        }
    }

    /// The raw symbol table.
    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    /// Fetch the native error message for the last failed call on this thread.
    fn last_error(&self) -> Error {
        let msg = unsafe { (self.symbols.get_last_error)() };
        if msg.is_null() {
            return Error::Native("unknown error".to_string());
        }
        let msg = unsafe { CStr::from_ptr(msg) };
        Error::Native(msg.to_string_lossy().into_owned())
    }

    #[inline]
    fn check(&self, ret: c_int) -> Result<()> {
        if ret == 0 {
            Ok(())
        } else {
            Err(self.last_error())
        }
    }

    pub(crate) fn register_log_callback(&self, callback: LogCallback) -> Result<()> {
        lgbm_call!(self, register_log_callback(Some(callback)))
    }

    // =========================================================================
    // Dataset
    // =========================================================================

    /// Build a dataset from a dense row-major `f64` matrix.
    pub(crate) fn dataset_create_from_mat(
        &'static self,
        data: &[f64],
        ncol: usize,
        params: &Parameters,
        reference: Option<RawHandle>,
    ) -> Result<NativeHandle<DatasetKind>> {
        if data.is_empty() || ncol == 0 {
            return Err(Error::NoFeatures);
        }
        if data.len() % ncol != 0 {
            return Err(Error::WidthMismatch {
                expected: ncol,
                got: data.len() % ncol,
            });
        }
        let nrow = native_int("row count", data.len() / ncol)?;
        let ncol = native_int("column count", ncol)?;
        let reference = match reference {
            Some(raw) => non_null(raw)?,
            None => ptr::null_mut(),
        };
        let params = params.to_cstring()?;

        let mut out: RawHandle = ptr::null_mut();
        lgbm_call!(
            self,
            dataset_create_from_mat(
                data.as_ptr().cast(),
                C_API_DTYPE_FLOAT64,
                nrow,
                ncol,
                1,
                params.as_ptr(),
                reference,
                &mut out,
            )
        )?;
        NativeHandle::new(self, out)
    }

    /// Best-effort free; a failure is logged and otherwise ignored.
    pub(crate) fn dataset_free(&self, handle: RawHandle) {
        if handle.is_null() {
            return;
        }
        if let Err(err) = lgbm_call!(self, dataset_free(handle)) {
            log::warn!("failed to free dataset handle {handle:p}: {err}");
        }
    }

    /// Attach a per-row column (`label`, `weight`, `init_score`, `group`).
    pub(crate) fn dataset_set_field<T: FieldType>(
        &self,
        handle: RawHandle,
        field: &str,
        values: &[T],
    ) -> Result<()> {
        let handle = non_null(handle)?;
        let name = c_string("field name", field)?;
        let len = native_int("field length", values.len())?;
        lgbm_call!(
            self,
            dataset_set_field(handle, name.as_ptr(), values.as_ptr().cast(), len, T::DTYPE)
        )
    }

    pub(crate) fn dataset_set_feature_names<S: AsRef<str>>(
        &self,
        handle: RawHandle,
        names: &[S],
    ) -> Result<()> {
        let handle = non_null(handle)?;
        let owned = names
            .iter()
            .map(|name| c_string("feature name", name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let ptrs: Vec<_> = owned.iter().map(|name| name.as_ptr()).collect();
        let len = native_int("feature name count", ptrs.len())?;
        lgbm_call!(self, dataset_set_feature_names(handle, ptrs.as_ptr(), len))
    }

    // =========================================================================
    // Booster
    // =========================================================================

    pub(crate) fn booster_create(
        &'static self,
        train_data: RawHandle,
        params: &Parameters,
    ) -> Result<NativeHandle<BoosterKind>> {
        let train_data = non_null(train_data)?;
        let params = params.to_cstring()?;
        let mut out: RawHandle = ptr::null_mut();
        lgbm_call!(self, booster_create(train_data, params.as_ptr(), &mut out))?;
        NativeHandle::new(self, out)
    }

    /// Best-effort free; a failure is logged and otherwise ignored.
    pub(crate) fn booster_free(&self, handle: RawHandle) {
        if handle.is_null() {
            return;
        }
        if let Err(err) = lgbm_call!(self, booster_free(handle)) {
            log::warn!("failed to free booster handle {handle:p}: {err}");
        }
    }

    pub(crate) fn booster_add_valid_data(&self, handle: RawHandle, valid_data: RawHandle) -> Result<()> {
        let handle = non_null(handle)?;
        let valid_data = non_null(valid_data)?;
        lgbm_call!(self, booster_add_valid_data(handle, valid_data))
    }

    /// Run one boosting round. Returns `true` when training cannot continue.
    pub(crate) fn booster_update_one_iter(&self, handle: RawHandle) -> Result<bool> {
        let handle = non_null(handle)?;
        let mut is_finished: c_int = 0;
        lgbm_call!(self, booster_update_one_iter(handle, &mut is_finished))?;
        Ok(is_finished != 0)
    }

    pub(crate) fn booster_eval_counts(&self, handle: RawHandle) -> Result<usize> {
        let handle = non_null(handle)?;
        let mut count: c_int = 0;
        lgbm_call!(self, booster_get_eval_counts(handle, &mut count))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Current metric values for `data_idx` (0 = training data).
    pub(crate) fn booster_get_eval(&self, handle: RawHandle, data_idx: usize) -> Result<Vec<f64>> {
        let count = self.booster_eval_counts(handle)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let data_idx = native_int("data index", data_idx)?;

        let mut results = vec![0.0f64; count];
        let mut out_len: c_int = 0;
        lgbm_call!(
            self,
            booster_get_eval(handle, data_idx, &mut out_len, results.as_mut_ptr())
        )?;
        results.truncate(usize::try_from(out_len).unwrap_or(0));
        Ok(results)
    }

    pub(crate) fn booster_num_features(&self, handle: RawHandle) -> Result<usize> {
        let handle = non_null(handle)?;
        let mut out: c_int = 0;
        lgbm_call!(self, booster_get_num_feature(handle, &mut out))?;
        native_len(out.into())
    }

    pub(crate) fn booster_num_classes(&self, handle: RawHandle) -> Result<usize> {
        let handle = non_null(handle)?;
        let mut out: c_int = 0;
        lgbm_call!(self, booster_get_num_classes(handle, &mut out))?;
        native_len(out.into())
    }

    /// Size of the prediction buffer the booster holds for `data_idx`.
    pub(crate) fn booster_num_predict(&self, handle: RawHandle, data_idx: usize) -> Result<usize> {
        let handle = non_null(handle)?;
        let data_idx = native_int("data index", data_idx)?;
        let mut out: i64 = 0;
        lgbm_call!(self, booster_get_num_predict(handle, data_idx, &mut out))?;
        native_len(out)
    }

    /// Serialize the model to its text form.
    ///
    /// The first attempt uses a fixed buffer. LightGBM reports the required
    /// length (including the terminating NUL) even when the buffer is too
    /// small, so a second attempt with an exactly-sized buffer always fits.
    pub(crate) fn booster_save_model_to_string(
        &self,
        handle: RawHandle,
        start_iteration: i32,
        num_iteration: i32,
        importance_type: c_int,
    ) -> Result<String> {
        let handle = non_null(handle)?;

        let mut buf = vec![0u8; MODEL_STRING_BUFFER];
        let mut needed = self.save_model_into(
            handle,
            start_iteration,
            num_iteration,
            importance_type,
            &mut buf,
        )?;
        if needed > buf.len() {
            buf = vec![0u8; needed];
            needed = self.save_model_into(
                handle,
                start_iteration,
                num_iteration,
                importance_type,
                &mut buf,
            )?;
            if needed > buf.len() {
                return Err(Error::Native(format!(
                    "model string grew between passes ({} > {} bytes)",
                    needed,
                    buf.len()
                )));
            }
        }

        let bytes = &buf[..needed];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    fn save_model_into(
        &self,
        handle: RawHandle,
        start_iteration: i32,
        num_iteration: i32,
        importance_type: c_int,
        buf: &mut [u8],
    ) -> Result<usize> {
        let buffer_len = i64::try_from(buf.len()).map_err(|_| Error::DimensionOverflow {
            what: "model buffer",
            value: buf.len(),
        })?;
        let mut out_len: i64 = 0;
        lgbm_call!(
            self,
            booster_save_model_to_string(
                handle,
                start_iteration,
                num_iteration,
                importance_type,
                buffer_len,
                &mut out_len,
                buf.as_mut_ptr().cast(),
            )
        )?;
        native_len(out_len)
    }

    /// Parse a serialized model. Returns the booster and its iteration count.
    pub(crate) fn booster_load_model_from_string(
        &'static self,
        model: &str,
    ) -> Result<(NativeHandle<BoosterKind>, usize)> {
        let model = c_string("model string", model)?;
        let mut num_iterations: c_int = 0;
        let mut out: RawHandle = ptr::null_mut();
        lgbm_call!(
            self,
            booster_load_model_from_string(model.as_ptr(), &mut num_iterations, &mut out)
        )?;
        let handle = NativeHandle::new(self, out)?;
        Ok((handle, usize::try_from(num_iterations).unwrap_or(0)))
    }

    // =========================================================================
    // Fast single-row prediction
    // =========================================================================

    pub(crate) fn fast_init(
        &'static self,
        booster: RawHandle,
        predict_type: c_int,
        start_iteration: i32,
        num_iteration: i32,
        ncol: usize,
        params: &Parameters,
    ) -> Result<NativeHandle<FastConfigKind>> {
        let booster = non_null(booster)?;
        let ncol = native_int("column count", ncol)?;
        let params = params.to_cstring()?;
        let mut out: RawHandle = ptr::null_mut();
        lgbm_call!(
            self,
            fast_init(
                booster,
                predict_type,
                start_iteration,
                num_iteration,
                C_API_DTYPE_FLOAT64,
                ncol,
                params.as_ptr(),
                &mut out,
            )
        )?;
        NativeHandle::new(self, out)
    }

    /// Score one row into `out`. Returns the number of values written.
    ///
    /// `row` must have the width the fast config was built for and `out`
    /// must hold at least one value per class.
    pub(crate) fn fast_predict(&self, fast_config: RawHandle, row: &[f64], out: &mut [f64]) -> Result<usize> {
        let fast_config = non_null(fast_config)?;
        if row.is_empty() || out.is_empty() {
            return Err(Error::EmptyInput);
        }
        let mut out_len: i64 = 0;
        lgbm_call!(
            self,
            fast_predict(fast_config, row.as_ptr().cast(), &mut out_len, out.as_mut_ptr())
        )?;
        Ok(native_len(out_len)?.min(out.len()))
    }

    /// Best-effort free; a failure is logged and otherwise ignored.
    pub(crate) fn fast_config_free(&self, handle: RawHandle) {
        if handle.is_null() {
            return;
        }
        if let Err(err) = lgbm_call!(self, fast_config_free(handle)) {
            log::warn!("failed to free fast config handle {handle:p}: {err}");
        }
    }
}
