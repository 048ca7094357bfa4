//! Error types for the LightGBM binding.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors raised by
//! the native library carry the message fetched through `LGBM_GetLastError`.

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the native library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A null or already released native handle was used.
    #[error("invalid handle")]
    InvalidHandle,

    /// The first row appended to a column was empty.
    #[error("empty data")]
    EmptyInput,

    /// A row does not have the width fixed by the first row of its column.
    #[error("rows of data must contain the same number of values: expected {expected}, got {got}")]
    WidthMismatch { expected: usize, got: usize },

    /// The dataset was already handed to the native library.
    #[error("dataset cannot be modified once it has been materialized")]
    DatasetImmutable,

    /// The dataset was materialized before any row was appended.
    #[error("dataset has no features")]
    NoFeatures,

    /// The number of feature names does not match the number of columns.
    #[error("the number of feature names ({names}) does not match the number of feature columns ({columns})")]
    NameCountMismatch { names: usize, columns: usize },

    /// An optional column does not have one entry per row.
    #[error("{field} has {got} entries but the dataset has {expected} rows")]
    FieldLengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    /// A prediction row does not match the model's feature count.
    #[error("feature count does not match number of features in model: expected {expected}, got {got}")]
    FeatureCountMismatch { expected: usize, got: usize },

    /// The shared library is missing a required export.
    #[error("missing symbol: {0}")]
    MissingSymbol(String),

    /// None of the candidate library paths could be opened.
    #[error("failed to load LightGBM from [{}]: {reason}", candidates.join(", "))]
    LibraryLoadFailed {
        candidates: Vec<String>,
        reason: String,
    },

    /// A string handed to the native library contains a NUL byte.
    #[error("{what} contains an interior NUL byte")]
    InteriorNul { what: &'static str },

    /// A size does not fit the native `int32` parameter it is passed as.
    #[error("{what} ({value}) exceeds the native size limit")]
    DimensionOverflow { what: &'static str, value: usize },

    /// A parameter token is not of the form `key=value`.
    #[error("invalid parameter token '{0}': expected key=value")]
    InvalidParameter(String),

    /// The native library reported a failure.
    #[error("LightGBM error: {0}")]
    Native(String),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Result type for binding operations.
pub type Result<T> = std::result::Result<T, Error>;
