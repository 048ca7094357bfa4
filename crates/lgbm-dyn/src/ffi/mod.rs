//! Raw LightGBM C API surface.
//!
//! The native library is never linked at build time. [`loader`] opens it at
//! runtime and resolves the exports listed in [`REQUIRED_SYMBOLS`] into a
//! [`Symbols`] table; [`Api`] wraps that table with checked calls.
//!
//! All raw pointers stay inside this module tree. Everything above it works
//! with [`NativeHandle`] owners.

use std::ffi::{c_char, c_int, c_void};

mod gateway;
mod handle;
pub mod loader;

pub use gateway::{Api, FieldType};
pub use handle::{BoosterKind, DatasetKind, FastConfigKind, HandleKind, NativeHandle};
pub use loader::{library, LoaderConfig};

// =============================================================================
// C API Constants
// =============================================================================

pub const C_API_DTYPE_FLOAT32: c_int = 0;
pub const C_API_DTYPE_FLOAT64: c_int = 1;
pub const C_API_DTYPE_INT32: c_int = 2;

pub const C_API_PREDICT_NORMAL: c_int = 0;
pub const C_API_PREDICT_RAW_SCORE: c_int = 1;

pub const C_API_FEATURE_IMPORTANCE_SPLIT: c_int = 0;
pub const C_API_FEATURE_IMPORTANCE_GAIN: c_int = 1;

/// Opaque native object pointer.
pub type RawHandle = *mut c_void;

/// Log sink signature accepted by `LGBM_RegisterLogCallback`.
pub type LogCallback = unsafe extern "C" fn(msg: *const c_char);

// =============================================================================
// Symbol Table
// =============================================================================

macro_rules! native_symbols {
    ($( $(#[$meta:meta])* $field:ident = $name:literal : $ty:ty ),* $(,)?) => {
        /// Resolved entry points of the native library.
        ///
        /// A table is only ever built complete: either every field was
        /// resolved or no table exists.
        #[derive(Clone, Copy)]
        pub struct Symbols {
            $( $(#[$meta])* pub $field: $ty, )*
        }

        /// Exported names that must all be present for the library to load.
        pub const REQUIRED_SYMBOLS: &[&str] = &[$($name),*];

        impl Symbols {
            /// Resolve every entry point from an opened library.
            pub(crate) fn resolve(lib: &libloading::Library) -> crate::Result<Self> {
                Ok(Self {
                    $( $field: unsafe { resolve_symbol::<$ty>(lib, $name)? }, )*
                })
            }
        }

        impl std::fmt::Debug for Symbols {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct("Symbols")
                    $( .field(stringify!($field), &(self.$field as *const c_void)) )*
                    .finish()
            }
        }
    };
}

/// Look up one export and copy the function pointer out of the library.
///
/// # Safety
///
/// `T` must be the exact function pointer type of the export.
unsafe fn resolve_symbol<T: Copy>(lib: &libloading::Library, name: &str) -> crate::Result<T> {
    lib.get::<T>(name.as_bytes())
        .map(|symbol| *symbol)
        .map_err(|_| crate::Error::MissingSymbol(name.to_string()))
}

native_symbols! {
    get_last_error = "LGBM_GetLastError":
        unsafe extern "C" fn() -> *const c_char,
    register_log_callback = "LGBM_RegisterLogCallback":
        unsafe extern "C" fn(callback: Option<LogCallback>) -> c_int,

    dataset_create_from_mat = "LGBM_DatasetCreateFromMat":
        unsafe extern "C" fn(
            data: *const c_void,
            data_type: c_int,
            nrow: i32,
            ncol: i32,
            is_row_major: c_int,
            parameters: *const c_char,
            reference: RawHandle,
            out: *mut RawHandle,
        ) -> c_int,
    dataset_free = "LGBM_DatasetFree":
        unsafe extern "C" fn(handle: RawHandle) -> c_int,
    dataset_set_field = "LGBM_DatasetSetField":
        unsafe extern "C" fn(
            handle: RawHandle,
            field_name: *const c_char,
            field_data: *const c_void,
            num_element: c_int,
            data_type: c_int,
        ) -> c_int,
    dataset_set_feature_names = "LGBM_DatasetSetFeatureNames":
        unsafe extern "C" fn(
            handle: RawHandle,
            feature_names: *const *const c_char,
            num_feature_names: c_int,
        ) -> c_int,

    booster_create = "LGBM_BoosterCreate":
        unsafe extern "C" fn(
            train_data: RawHandle,
            parameters: *const c_char,
            out: *mut RawHandle,
        ) -> c_int,
    booster_free = "LGBM_BoosterFree":
        unsafe extern "C" fn(handle: RawHandle) -> c_int,
    booster_add_valid_data = "LGBM_BoosterAddValidData":
        unsafe extern "C" fn(handle: RawHandle, valid_data: RawHandle) -> c_int,
    booster_update_one_iter = "LGBM_BoosterUpdateOneIter":
        unsafe extern "C" fn(handle: RawHandle, is_finished: *mut c_int) -> c_int,
    booster_get_eval = "LGBM_BoosterGetEval":
        unsafe extern "C" fn(
            handle: RawHandle,
            data_idx: c_int,
            out_len: *mut c_int,
            out_results: *mut f64,
        ) -> c_int,
    booster_get_eval_counts = "LGBM_BoosterGetEvalCounts":
        unsafe extern "C" fn(handle: RawHandle, out_len: *mut c_int) -> c_int,
    booster_get_num_feature = "LGBM_BoosterGetNumFeature":
        unsafe extern "C" fn(handle: RawHandle, out_len: *mut c_int) -> c_int,
    booster_get_num_classes = "LGBM_BoosterGetNumClasses":
        unsafe extern "C" fn(handle: RawHandle, out_len: *mut c_int) -> c_int,
    booster_get_num_predict = "LGBM_BoosterGetNumPredict":
        unsafe extern "C" fn(handle: RawHandle, data_idx: c_int, out_len: *mut i64) -> c_int,
    booster_save_model_to_string = "LGBM_BoosterSaveModelToString":
        unsafe extern "C" fn(
            handle: RawHandle,
            start_iteration: c_int,
            num_iteration: c_int,
            feature_importance_type: c_int,
            buffer_len: i64,
            out_len: *mut i64,
            out_str: *mut c_char,
        ) -> c_int,
    booster_load_model_from_string = "LGBM_BoosterLoadModelFromString":
        unsafe extern "C" fn(
            model_str: *const c_char,
            out_num_iterations: *mut c_int,
            out: *mut RawHandle,
        ) -> c_int,

    fast_init = "LGBM_BoosterPredictForMatSingleRowFastInit":
        unsafe extern "C" fn(
            handle: RawHandle,
            predict_type: c_int,
            start_iteration: c_int,
            num_iteration: c_int,
            data_type: c_int,
            ncol: i32,
            parameters: *const c_char,
            out_fast_config: *mut RawHandle,
        ) -> c_int,
    /// Exported as `...SingleRowFast`; the fast config carries the row layout.
    fast_predict = "LGBM_BoosterPredictForMatSingleRowFast":
        unsafe extern "C" fn(
            fast_config: RawHandle,
            data: *const c_void,
            out_len: *mut i64,
            out_result: *mut f64,
        ) -> c_int,
    fast_config_free = "LGBM_FastConfigFree":
        unsafe extern "C" fn(fast_config: RawHandle) -> c_int,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_list_matches_native_exports() {
        assert_eq!(REQUIRED_SYMBOLS.len(), 20);
        assert!(REQUIRED_SYMBOLS.iter().all(|name| name.starts_with("LGBM_")));
        assert!(REQUIRED_SYMBOLS.contains(&"LGBM_DatasetSetFeatureNames"));
        assert!(REQUIRED_SYMBOLS.contains(&"LGBM_BoosterPredictForMatSingleRowFast"));
    }
}
