//! [`ndarray`] interop for bulk ingestion and scoring.

use ndarray::{Array2, ArrayView2};

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::predictor::Predictor;

impl Dataset {
    /// Append every row of `rows`, in order.
    ///
    /// Rows go through the same width check as
    /// [`append_row`](Self::append_row); rows before a failing one stay
    /// appended.
    pub fn append_rows(&mut self, rows: ArrayView2<'_, f64>) -> Result<()> {
        for row in rows.rows() {
            self.extend_row(row.iter().copied())?;
        }
        Ok(())
    }
}

impl Predictor {
    /// Score every row of `rows`. The result has shape `(rows, num_classes)`.
    pub fn predict_rows(&mut self, rows: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if rows.ncols() != self.num_features() {
            return Err(Error::FeatureCountMismatch {
                expected: self.num_features(),
                got: rows.ncols(),
            });
        }

        let width = self.num_classes().max(1);
        let mut out = Array2::zeros((rows.nrows(), width));
        let mut row_buf = Vec::with_capacity(rows.ncols());
        let mut scores = vec![0.0; width];
        for (row, mut target) in rows.rows().into_iter().zip(out.rows_mut()) {
            row_buf.clear();
            row_buf.extend(row.iter().copied());
            let written = self.predict_into(&row_buf, &mut scores)?;
            for (dst, &src) in target.iter_mut().zip(&scores[..written]) {
                *dst = src;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameters;
    use ndarray::array;

    #[test]
    fn append_rows_appends_in_order() {
        let mut ds = Dataset::new(Parameters::new());
        ds.append_rows(array![[1.0, 2.0], [3.0, 4.0]].view()).unwrap();
        ds.append_rows(array![[5.0, 6.0]].view()).unwrap();

        assert_eq!(ds.num_rows(), 3);
        assert_eq!(ds.features(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn column_major_input_is_read_row_by_row() {
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        let transposed = data.t();
        let mut ds = Dataset::new(Parameters::new());
        ds.append_rows(transposed).unwrap();

        assert_eq!(ds.features(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn width_mismatch_stops_at_first_bad_row() {
        let mut ds = Dataset::new(Parameters::new());
        ds.append_row(&[0.0, 0.0, 0.0]).unwrap();
        let err = ds.append_rows(array![[1.0, 2.0]].view()).unwrap_err();

        assert_eq!(err, Error::WidthMismatch { expected: 3, got: 2 });
        assert_eq!(ds.num_rows(), 1);
    }
}
