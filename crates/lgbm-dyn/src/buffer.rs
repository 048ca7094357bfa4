//! Row-oriented growable column buffers.
//!
//! Datasets are filled one row at a time and handed to the native library in
//! a single bulk call. [`GrowableBuffer`] stores such a column row-major and
//! grows in large steps so that thousands of single-row appends cost only a
//! handful of reallocations.
//!
//! # Growth policy
//!
//! The first row fixes the column width `w` and reserves room for
//! `w * EXPANSION` values. Whenever an append would overflow the capacity the
//! buffer grows to `capacity + w * EXPANSION` instead of doubling.

use crate::error::{Error, Result};

/// Default number of rows reserved per growth step.
pub const EXPANSION_FACTOR: usize = 10240;

/// Append-only, row-major buffer with a width fixed by its first row.
#[derive(Debug, Clone)]
pub struct GrowableBuffer<T, const EXPANSION: usize = EXPANSION_FACTOR> {
    data: Vec<T>,
    /// Values per row; 0 until the first row is appended.
    width: usize,
}

impl<T, const EXPANSION: usize> Default for GrowableBuffer<T, EXPANSION> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const EXPANSION: usize> GrowableBuffer<T, EXPANSION> {
    /// Create an empty buffer. Nothing is allocated until the first row.
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            width: 0,
        }
    }

    /// Row width, or `None` if no row has been appended yet.
    #[inline]
    pub fn width(&self) -> Option<usize> {
        (self.width > 0).then_some(self.width)
    }

    /// Number of complete rows stored.
    #[inline]
    pub fn rows(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    /// Number of values stored (`rows * width`).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity in values.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// All stored values, row-major.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Append one row from an exact-size iterator.
    ///
    /// The first row fixes the width and fails with [`Error::EmptyInput`] if
    /// it is empty. Later rows must match that width or the call fails with
    /// [`Error::WidthMismatch`] and the buffer is left untouched.
    pub fn extend_row<I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let values = values.into_iter();
        let n = values.len();

        if self.width == 0 {
            if n == 0 {
                return Err(Error::EmptyInput);
            }
            self.width = n;
            self.data.reserve_exact(n * EXPANSION.max(1));
        } else if n != self.width {
            return Err(Error::WidthMismatch {
                expected: self.width,
                got: n,
            });
        } else if self.data.len() + n > self.data.capacity() {
            let headroom = self.data.capacity() - self.data.len();
            self.data.reserve_exact(headroom + self.width * EXPANSION.max(1));
        }

        self.data.extend(values);
        Ok(())
    }
}

impl<T: Copy, const EXPANSION: usize> GrowableBuffer<T, EXPANSION> {
    /// Append one row of values. See [`extend_row`](Self::extend_row).
    #[inline]
    pub fn append_row(&mut self, values: &[T]) -> Result<()> {
        self.extend_row(values.iter().copied())
    }
}
