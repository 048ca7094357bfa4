//! Row-by-row dataset construction.
//!
//! A [`Dataset`] collects feature rows and optional per-row columns in
//! [`GrowableBuffer`]s and hands them to the native library in one go the
//! first time its handle is needed. From then on the dataset is frozen:
//! every mutation fails with [`Error::DatasetImmutable`].
//!
//! # Example
//!
//! ```no_run
//! use lgbm_dyn::{Dataset, Parameters};
//!
//! let mut ds = Dataset::new(Parameters::new().with("max_bin", 63));
//! for (row, label) in [([1.0, 2.0], 0.0), ([3.0, 4.0], 1.0)] {
//!     ds.append_row(&row)?;
//!     ds.set_label(label)?;
//! }
//! ds.set_feature_names(&["a", "b"])?;
//! # Ok::<(), lgbm_dyn::Error>(())
//! ```

use std::cell::OnceCell;
use std::sync::Arc;

use crate::buffer::GrowableBuffer;
use crate::error::{Error, Result};
use crate::ffi::{library, Api, DatasetKind, FieldType, NativeHandle, RawHandle};
use crate::params::Parameters;

/// Tabular training or validation data.
///
/// Columns:
///
/// - features: `f64`, row-major, width fixed by the first row
/// - labels, weights: stored as `f32`
/// - init scores: `f64`
/// - groups: one `i32` query id per row; consecutive rows with the same id
///   form one query group
pub struct Dataset {
    api: Option<&'static Api>,
    params: Parameters,
    reference: Option<Arc<NativeHandle<DatasetKind>>>,
    features: GrowableBuffer<f64>,
    feature_names: Option<Vec<String>>,
    labels: GrowableBuffer<f32>,
    weights: GrowableBuffer<f32>,
    init_scores: GrowableBuffer<f64>,
    groups: GrowableBuffer<i32>,
    frozen: OnceCell<Arc<NativeHandle<DatasetKind>>>,
    closed: bool,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("rows", &self.num_rows())
            .field("features", &self.num_features())
            .field("params", &self.params.to_string())
            .field("frozen", &self.frozen.get())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Dataset {
    /// An empty dataset using the process-wide library.
    pub fn new(params: Parameters) -> Self {
        Self::build(None, params, None)
    }

    /// An empty dataset bound to a specific library instance.
    pub fn with_api(api: &'static Api, params: Parameters) -> Self {
        Self::build(Some(api), params, None)
    }

    /// An empty dataset that shares bin boundaries with `reference`.
    ///
    /// Validation data must be binned like the training data it is compared
    /// against. The reference is materialized now if it was not already, and
    /// its native object is kept alive for as long as this dataset needs it.
    pub fn with_reference(params: Parameters, reference: &Dataset) -> Result<Self> {
        let handle = Arc::clone(reference.handle()?);
        Ok(Self::build(Some(handle.api()), params, Some(handle)))
    }

    fn build(
        api: Option<&'static Api>,
        params: Parameters,
        reference: Option<Arc<NativeHandle<DatasetKind>>>,
    ) -> Self {
        Self {
            api,
            params,
            reference,
            features: GrowableBuffer::new(),
            feature_names: None,
            labels: GrowableBuffer::new(),
            weights: GrowableBuffer::new(),
            init_scores: GrowableBuffer::new(),
            groups: GrowableBuffer::new(),
            frozen: OnceCell::new(),
            closed: false,
        }
    }

    // =========================================================================
    // Building
    // =========================================================================

    fn ensure_building(&self) -> Result<()> {
        if self.closed || self.frozen.get().is_some() {
            Err(Error::DatasetImmutable)
        } else {
            Ok(())
        }
    }

    /// Append one feature row. The first row fixes the feature count.
    pub fn append_row(&mut self, row: &[f64]) -> Result<()> {
        self.ensure_building()?;
        self.features.append_row(row)
    }

    pub(crate) fn extend_row<I>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: ExactSizeIterator,
    {
        self.ensure_building()?;
        self.features.extend_row(row)
    }

    /// Name the feature columns. An empty slice clears the names.
    ///
    /// The count is checked against the feature count when the dataset is
    /// materialized.
    pub fn set_feature_names<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        self.ensure_building()?;
        self.feature_names = if names.is_empty() {
            None
        } else {
            Some(names.iter().map(|n| n.as_ref().to_string()).collect())
        };
        Ok(())
    }

    pub fn set_label(&mut self, label: f64) -> Result<()> {
        self.set_labels(&[label])
    }

    /// Append label values (narrowed to `f32`).
    pub fn set_labels(&mut self, labels: &[f64]) -> Result<()> {
        self.ensure_building()?;
        self.labels.extend_row(labels.iter().map(|&v| v as f32))
    }

    pub fn set_weight(&mut self, weight: f64) -> Result<()> {
        self.set_weights(&[weight])
    }

    /// Append sample weights (narrowed to `f32`).
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        self.ensure_building()?;
        self.weights.extend_row(weights.iter().map(|&v| v as f32))
    }

    pub fn set_init_score(&mut self, score: f64) -> Result<()> {
        self.set_init_scores(&[score])
    }

    pub fn set_init_scores(&mut self, scores: &[f64]) -> Result<()> {
        self.ensure_building()?;
        self.init_scores.append_row(scores)
    }

    pub fn set_group(&mut self, group: i32) -> Result<()> {
        self.set_groups(&[group])
    }

    /// Append per-row query ids.
    pub fn set_groups(&mut self, groups: &[i32]) -> Result<()> {
        self.ensure_building()?;
        self.groups.append_row(groups)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn num_rows(&self) -> usize {
        self.features.rows()
    }

    /// Feature count, 0 until the first row is appended.
    pub fn num_features(&self) -> usize {
        self.features.width().unwrap_or(0)
    }

    /// Row-major feature values.
    pub fn features(&self) -> &[f64] {
        self.features.as_slice()
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Whether the native dataset has been created.
    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    // =========================================================================
    // Materialization
    // =========================================================================

    /// The native dataset, created on first call.
    ///
    /// Creation is all-or-nothing: if any step fails, the partially built
    /// native object is freed, the error is returned and the dataset stays
    /// unfrozen. Once created, every later call returns the same handle.
    pub fn handle(&self) -> Result<&Arc<NativeHandle<DatasetKind>>> {
        if self.closed {
            return Err(Error::InvalidHandle);
        }
        if let Some(handle) = self.frozen.get() {
            return Ok(handle);
        }
        let handle = Arc::new(self.materialize()?);
        Ok(self.frozen.get_or_init(|| handle))
    }

    fn api(&self) -> Result<&'static Api> {
        match self.api {
            Some(api) => Ok(api),
            None => library(),
        }
    }

    fn materialize(&self) -> Result<NativeHandle<DatasetKind>> {
        let columns = self.features.width().ok_or(Error::NoFeatures)?;
        let rows = self.features.rows();
        let api = self.api()?;

        let handle = api.dataset_create_from_mat(
            self.features.as_slice(),
            columns,
            &self.params,
            self.reference.as_ref().map(|r| r.as_raw()),
        )?;
        let raw = handle.as_raw();

        // From here on, returning early drops `handle`, which frees it.
        if let Some(names) = &self.feature_names {
            if names.len() != columns {
                return Err(Error::NameCountMismatch {
                    names: names.len(),
                    columns,
                });
            }
            api.dataset_set_feature_names(raw, names)?;
        }

        set_column(api, raw, "label", &self.labels, rows)?;
        set_column(api, raw, "weight", &self.weights, rows)?;
        set_column(api, raw, "init_score", &self.init_scores, rows)?;
        if !self.groups.is_empty() {
            check_column_len("group", self.groups.len(), rows)?;
            let sizes = group_sizes(self.groups.as_slice());
            api.dataset_set_field(raw, "group", &sizes)?;
        }

        log::debug!("materialized dataset: {rows} rows x {columns} features");
        Ok(handle)
    }

    /// Release this dataset's reference to its native object.
    ///
    /// Boosters and datasets that still reference it keep the native object
    /// alive. Afterwards [`handle`](Self::handle) fails with
    /// [`Error::InvalidHandle`] and mutation with [`Error::DatasetImmutable`].
    pub fn close(&mut self) {
        self.frozen.take();
        self.reference = None;
        self.closed = true;
    }
}

fn check_column_len(field: &'static str, got: usize, expected: usize) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::FieldLengthMismatch {
            field,
            expected,
            got,
        })
    }
}

fn set_column<T: FieldType>(
    api: &Api,
    raw: RawHandle,
    field: &'static str,
    column: &GrowableBuffer<T>,
    rows: usize,
) -> Result<()> {
    if column.is_empty() {
        return Ok(());
    }
    check_column_len(field, column.len(), rows)?;
    api.dataset_set_field(raw, field, column.as_slice())
}

/// Collapse per-row query ids into the group sizes LightGBM expects.
fn group_sizes(query_ids: &[i32]) -> Vec<i32> {
    let mut sizes: Vec<i32> = Vec::new();
    let mut current: Option<i32> = None;
    for &id in query_ids {
        match (current, sizes.last_mut()) {
            (Some(prev), Some(size)) if prev == id => *size += 1,
            _ => {
                sizes.push(1);
                current = Some(id);
            }
        }
    }
    sizes
}
