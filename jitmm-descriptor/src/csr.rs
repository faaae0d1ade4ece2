//! Compressed-sparse-row compile-request payload.
//!
//! When a multiply kernel is specialized for a fixed sparsity pattern, the
//! constant operand is scanned once into this representation and handed to
//! the backend, which bakes the pattern and the captured values into the
//! generated code. The CSR triple never outlives the specialization
//! attempt.

use std::ops::Range;

use crate::{DescriptorError, Element, Result};

/// Compressed-sparse-row form of a dense row-major matrix.
///
/// Invariants, established by [`CsrMatrix::from_dense`]:
/// - `row_ptr` has length `rows + 1` and is non-decreasing;
/// - `row_ptr[rows]` equals the total nonzero count;
/// - `col_idx[row_ptr[i]..row_ptr[i + 1]]` holds row `i`'s nonzero columns
///   in strictly increasing order (row-then-column traversal).
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T> {
    rows: u32,
    cols: u32,
    values: Vec<T>,
    row_ptr: Vec<u32>,
    col_idx: Vec<u32>,
}

impl<T: Element> CsrMatrix<T> {
    /// Scan a dense `rows x cols` row-major operand with leading dimension
    /// `lda` and collect its nonzero entries.
    pub fn from_dense(dense: &[T], rows: u32, cols: u32, lda: u32) -> Result<Self> {
        if lda < cols {
            return Err(DescriptorError::LeadingDim { ld: lda, row: cols });
        }
        let needed = required_extent(rows, cols, lda);
        if dense.len() < needed {
            return Err(DescriptorError::ShortOperand {
                needed,
                len: dense.len(),
            });
        }

        let mut values = Vec::new();
        let mut col_idx = Vec::new();
        let mut row_ptr = Vec::with_capacity(rows as usize + 1);
        for i in 0..rows as usize {
            row_ptr.push(values.len() as u32);
            for j in 0..cols as usize {
                let v = dense[i * lda as usize + j];
                if !v.is_zero() {
                    values.push(v);
                    col_idx.push(j as u32);
                }
            }
        }
        row_ptr.push(values.len() as u32);

        Ok(CsrMatrix {
            rows,
            cols,
            values,
            row_ptr,
            col_idx,
        })
    }

    /// Reconstruct a dense row-major matrix with leading dimension `lda`.
    /// Entries outside the pattern (including any `lda` padding) are zero.
    pub fn to_dense(&self, lda: u32) -> Result<Vec<T>> {
        if lda < self.cols {
            return Err(DescriptorError::LeadingDim {
                ld: lda,
                row: self.cols,
            });
        }
        let mut dense = vec![T::zero(); self.rows as usize * lda as usize];
        for i in 0..self.rows as usize {
            for e in self.row_range(i) {
                dense[i * lda as usize + self.col_idx[e] as usize] = self.values[e];
            }
        }
        Ok(dense)
    }

    /// Index range of row `i`'s entries within `values`/`col_idx`.
    #[inline]
    pub fn row_range(&self, i: usize) -> Range<usize> {
        self.row_ptr[i] as usize..self.row_ptr[i + 1] as usize
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn row_ptr(&self) -> &[u32] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[u32] {
        &self.col_idx
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Fraction of cells that are nonzero; 0.0 for an empty shape.
    pub fn density(&self) -> f64 {
        let cells = self.rows as u64 * self.cols as u64;
        if cells == 0 {
            0.0
        } else {
            self.nnz() as f64 / cells as f64
        }
    }
}

/// Number of elements a `rows x cols` operand with leading dimension `lda`
/// must provide: full strides for all but the last row.
pub(crate) fn required_extent(rows: u32, cols: u32, lda: u32) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        (rows as usize - 1) * lda as usize + cols as usize
    }
}
