//! Owned native handles.
//!
//! A [`NativeHandle`] owns exactly one native object and frees it exactly
//! once when dropped. Objects that must outlive their creator (a dataset a
//! booster validates against, a booster a predictor scores with) are shared
//! through `Arc<NativeHandle<_>>`; the native free happens when the last
//! holder lets go.

use std::fmt;
use std::marker::PhantomData;

use super::{Api, RawHandle};
use crate::error::{Error, Result};

mod sealed {
    use super::{Api, RawHandle};

    /// How a kind of native object is released. Not nameable outside the
    /// crate, so only owning handles can free.
    pub trait Release {
        /// Best-effort release of `raw`. Failures are logged, never surfaced.
        fn free(api: &Api, raw: RawHandle);
    }
}

/// Kind of native object behind a handle.
pub trait HandleKind: sealed::Release {
    /// Name used in diagnostics.
    const NAME: &'static str;
}

/// Marker for `DatasetHandle`.
#[derive(Debug)]
pub enum DatasetKind {}

/// Marker for `BoosterHandle`.
#[derive(Debug)]
pub enum BoosterKind {}

/// Marker for `FastConfigHandle`.
#[derive(Debug)]
pub enum FastConfigKind {}

impl HandleKind for DatasetKind {
    const NAME: &'static str = "dataset";
}

impl sealed::Release for DatasetKind {
    fn free(api: &Api, raw: RawHandle) {
        api.dataset_free(raw);
    }
}

impl HandleKind for BoosterKind {
    const NAME: &'static str = "booster";
}

impl sealed::Release for BoosterKind {
    fn free(api: &Api, raw: RawHandle) {
        api.booster_free(raw);
    }
}

impl HandleKind for FastConfigKind {
    const NAME: &'static str = "fast config";
}

impl sealed::Release for FastConfigKind {
    fn free(api: &Api, raw: RawHandle) {
        api.fast_config_free(raw);
    }
}

/// Exclusive owner of one non-null native object.
pub struct NativeHandle<K: HandleKind> {
    api: &'static Api,
    raw: RawHandle,
    _kind: PhantomData<fn() -> K>,
}

// The pointer is only dereferenced by the native library. Mutating calls go
// through `&mut` on the owning wrapper; shared holders only keep it alive.
unsafe impl<K: HandleKind> Send for NativeHandle<K> {}
unsafe impl<K: HandleKind> Sync for NativeHandle<K> {}

impl<K: HandleKind> NativeHandle<K> {
    /// Take ownership of a handle returned by `api`.
    pub(crate) fn new(api: &'static Api, raw: RawHandle) -> Result<Self> {
        if raw.is_null() {
            return Err(Error::InvalidHandle);
        }
        log::debug!("created {} handle {:p}", K::NAME, raw);
        Ok(Self {
            api,
            raw,
            _kind: PhantomData,
        })
    }

    #[inline]
    pub fn as_raw(&self) -> RawHandle {
        self.raw
    }

    /// The library this handle belongs to.
    #[inline]
    pub fn api(&self) -> &'static Api {
        self.api
    }
}

impl<K: HandleKind> Drop for NativeHandle<K> {
    fn drop(&mut self) {
        log::debug!("freeing {} handle {:p}", K::NAME, self.raw);
        <K as sealed::Release>::free(self.api, self.raw);
    }
}

impl<K: HandleKind> fmt::Debug for NativeHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle<{}>({:p})", K::NAME, self.raw)
    }
}
