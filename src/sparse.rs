//! Sparse storage formats: CSR, CSC, COO and BSR.
//!
//! Every format can be built from `(row, col, value)` triplets and walked
//! entry by entry with [`SparseMatrix::for_each_entry`], which is what the
//! CPU kernels and the dense conversions are written against.

use crate::dense::DenseMatrix;
use crate::error::{Error, Result};
use crate::scalar::Scalar;
use itertools::Itertools;
use std::fmt;

/// Sparse matrix storage format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SparseFormat {
    /// Compressed Sparse Row: row pointers + column indices + values
    Csr,
    /// Compressed Sparse Column: column pointers + row indices + values
    Csc,
    /// Coordinate list, sorted row-major
    Coo,
    /// Block Sparse Row with square blocks of the given size
    Bsr(usize),
}

impl SparseFormat {
    pub fn name(&self) -> &'static str {
        match self {
            SparseFormat::Csr => "CSR",
            SparseFormat::Csc => "CSC",
            SparseFormat::Coo => "COO",
            SparseFormat::Bsr(_) => "BSR",
        }
    }

    /// Same format family, ignoring the BSR block size
    #[inline]
    pub fn same_kind(&self, other: &SparseFormat) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Whether a `nrows x ncols` matrix can be stored in this format
    pub fn admits(&self, nrows: usize, ncols: usize) -> bool {
        match self {
            SparseFormat::Bsr(b) => *b > 0 && nrows % b == 0 && ncols % b == 0,
            _ => true,
        }
    }
}

impl fmt::Display for SparseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SparseFormat::Bsr(b) => write!(f, "BSR({})", b),
            other => write!(f, "{}", other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Csr<T> {
    pub nrows: usize,
    pub ncols: usize,
    pub row_ptr: Vec<usize>,
    pub col_idx: Vec<usize>,
    pub values: Vec<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Csc<T> {
    pub nrows: usize,
    pub ncols: usize,
    pub col_ptr: Vec<usize>,
    pub row_idx: Vec<usize>,
    pub values: Vec<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coo<T> {
    pub nrows: usize,
    pub ncols: usize,
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub values: Vec<T>,
}

/// Block sparse row. Block `k` covers rows `block * r..` and columns
/// `block * col_idx[k]..`, its values stored row-major in
/// `values[k * block * block..]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bsr<T> {
    pub nrows: usize,
    pub ncols: usize,
    pub block: usize,
    pub row_ptr: Vec<usize>,
    pub col_idx: Vec<usize>,
    pub values: Vec<T>,
}

/// Sort triplets by `key`, summing entries that land on the same position
fn merge_sorted<T: Scalar>(
    mut triplets: Vec<(usize, usize, T)>,
    key: impl Fn(&(usize, usize, T)) -> (usize, usize),
) -> Vec<(usize, usize, T)> {
    triplets.sort_by_key(|t| key(t));
    triplets
        .into_iter()
        .coalesce(|a, b| {
            if a.0 == b.0 && a.1 == b.1 {
                Ok((a.0, a.1, a.2 + b.2))
            } else {
                Err((a, b))
            }
        })
        .collect()
}

/// Build a compressed pointer array from sorted major indices
fn compress(major: impl Iterator<Item = usize>, len: usize) -> Vec<usize> {
    let mut ptr = vec![0usize; len + 1];
    for m in major {
        ptr[m + 1] += 1;
    }
    for i in 0..len {
        ptr[i + 1] += ptr[i];
    }
    ptr
}

fn check_compressed(
    format: SparseFormat,
    ptr: &[usize],
    idx: &[usize],
    major: usize,
    minor: usize,
    nvalues: usize,
) -> Result<()> {
    let invalid = |reason: String| Error::InvalidStructure {
        format: format.to_string(),
        reason,
    };
    if ptr.len() != major + 1 || ptr.first() != Some(&0) {
        return Err(invalid(format!(
            "pointer array of length {} for {} major slots",
            ptr.len(),
            major
        )));
    }
    if ptr[major] != idx.len() || idx.len() != nvalues {
        return Err(invalid(format!(
            "pointer end {} vs {} indices and {} values",
            ptr[major],
            idx.len(),
            nvalues
        )));
    }
    for (m, w) in ptr.windows(2).enumerate() {
        if w[0] > w[1] {
            return Err(invalid(format!("pointers decrease at {}", m)));
        }
        let slot = &idx[w[0]..w[1]];
        if let Some(&bad) = slot.iter().find(|&&i| i >= minor) {
            return Err(invalid(format!("index {} out of range {} in slot {}", bad, minor, m)));
        }
        if slot.windows(2).any(|p| p[0] >= p[1]) {
            return Err(invalid(format!("indices unsorted or duplicated in slot {}", m)));
        }
    }
    Ok(())
}

impl<T: Scalar> Csr<T> {
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: Vec<(usize, usize, T)>) -> Self {
        let merged = merge_sorted(triplets, |t| (t.0, t.1));
        let row_ptr = compress(merged.iter().map(|t| t.0), nrows);
        let (col_idx, values) = merged.into_iter().map(|(_, j, v)| (j, v)).unzip();
        Self {
            nrows,
            ncols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Stored entries of row `i`
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }
}

impl<T: Scalar> Csc<T> {
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: Vec<(usize, usize, T)>) -> Self {
        let merged = merge_sorted(triplets, |t| (t.1, t.0));
        let col_ptr = compress(merged.iter().map(|t| t.1), ncols);
        let (row_idx, values) = merged.into_iter().map(|(i, _, v)| (i, v)).unzip();
        Self {
            nrows,
            ncols,
            col_ptr,
            row_idx,
            values,
        }
    }
}

impl<T: Scalar> Coo<T> {
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: Vec<(usize, usize, T)>) -> Self {
        let merged = merge_sorted(triplets, |t| (t.0, t.1));
        let mut rows = Vec::with_capacity(merged.len());
        let mut cols = Vec::with_capacity(merged.len());
        let mut values = Vec::with_capacity(merged.len());
        for (i, j, v) in merged {
            rows.push(i);
            cols.push(j);
            values.push(v);
        }
        Self {
            nrows,
            ncols,
            rows,
            cols,
            values,
        }
    }
}

impl<T: Scalar> Bsr<T> {
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        block: usize,
        triplets: Vec<(usize, usize, T)>,
    ) -> Result<Self> {
        if !SparseFormat::Bsr(block).admits(nrows, ncols) {
            return Err(Error::invalid_arg(
                "block",
                format!("block size {} does not divide {}x{}", block, nrows, ncols),
            ));
        }
        let merged = merge_sorted(triplets, |t| (t.0 / block, t.1 / block));
        let bs = block * block;
        let mut row_ptr = vec![0usize; nrows / block + 1];
        let mut col_idx = Vec::new();
        let mut values: Vec<T> = Vec::new();
        let mut current: Option<(usize, usize)> = None;
        for (i, j, v) in merged {
            let key = (i / block, j / block);
            if current != Some(key) {
                current = Some(key);
                row_ptr[key.0 + 1] += 1;
                col_idx.push(key.1);
                values.extend(std::iter::repeat(T::zero()).take(bs));
            }
            let base = values.len() - bs;
            values[base + (i % block) * block + (j % block)] += v;
        }
        for r in 0..nrows / block {
            row_ptr[r + 1] += row_ptr[r];
        }
        Ok(Self {
            nrows,
            ncols,
            block,
            row_ptr,
            col_idx,
            values,
        })
    }
}

/// Sparse matrix in one of the four storage formats
#[derive(Debug, Clone, PartialEq)]
pub enum SparseMatrix<T> {
    Csr(Csr<T>),
    Csc(Csc<T>),
    Coo(Coo<T>),
    Bsr(Bsr<T>),
}

impl<T: Scalar> SparseMatrix<T> {
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: Vec<(usize, usize, T)>,
        format: SparseFormat,
    ) -> Result<Self> {
        if let Some(&(i, j, _)) = triplets.iter().find(|t| t.0 >= nrows || t.1 >= ncols) {
            return Err(Error::invalid_arg(
                "triplets",
                format!("entry ({}, {}) outside {}x{}", i, j, nrows, ncols),
            ));
        }
        Ok(match format {
            SparseFormat::Csr => SparseMatrix::Csr(Csr::from_triplets(nrows, ncols, triplets)),
            SparseFormat::Csc => SparseMatrix::Csc(Csc::from_triplets(nrows, ncols, triplets)),
            SparseFormat::Coo => SparseMatrix::Coo(Coo::from_triplets(nrows, ncols, triplets)),
            SparseFormat::Bsr(b) => {
                SparseMatrix::Bsr(Bsr::from_triplets(nrows, ncols, b, triplets)?)
            }
        })
    }

    /// Store the nonzeros of a dense matrix
    pub fn from_dense(dense: &DenseMatrix<T>, format: SparseFormat) -> Result<Self> {
        let (nrows, ncols) = dense.shape();
        let mut triplets = Vec::with_capacity(dense.count_nonzero());
        for j in 0..ncols {
            for i in 0..nrows {
                let v = dense.get(i, j);
                if !v.is_zero() {
                    triplets.push((i, j, v));
                }
            }
        }
        Self::from_triplets(nrows, ncols, triplets, format)
    }

    pub fn format(&self) -> SparseFormat {
        match self {
            SparseMatrix::Csr(_) => SparseFormat::Csr,
            SparseMatrix::Csc(_) => SparseFormat::Csc,
            SparseMatrix::Coo(_) => SparseFormat::Coo,
            SparseMatrix::Bsr(m) => SparseFormat::Bsr(m.block),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        match self {
            SparseMatrix::Csr(m) => (m.nrows, m.ncols),
            SparseMatrix::Csc(m) => (m.nrows, m.ncols),
            SparseMatrix::Coo(m) => (m.nrows, m.ncols),
            SparseMatrix::Bsr(m) => (m.nrows, m.ncols),
        }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.shape().0
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.shape().1
    }

    /// Number of stored values (explicit zeros inside BSR blocks included)
    pub fn nnz(&self) -> usize {
        match self {
            SparseMatrix::Csr(m) => m.values.len(),
            SparseMatrix::Csc(m) => m.values.len(),
            SparseMatrix::Coo(m) => m.values.len(),
            SparseMatrix::Bsr(m) => m.values.len(),
        }
    }

    /// Visit every stored entry as `(row, col, value)`
    pub fn for_each_entry(&self, mut f: impl FnMut(usize, usize, T)) {
        match self {
            SparseMatrix::Csr(m) => {
                for i in 0..m.nrows {
                    for k in m.row_ptr[i]..m.row_ptr[i + 1] {
                        f(i, m.col_idx[k], m.values[k]);
                    }
                }
            }
            SparseMatrix::Csc(m) => {
                for j in 0..m.ncols {
                    for k in m.col_ptr[j]..m.col_ptr[j + 1] {
                        f(m.row_idx[k], j, m.values[k]);
                    }
                }
            }
            SparseMatrix::Coo(m) => {
                for k in 0..m.values.len() {
                    f(m.rows[k], m.cols[k], m.values[k]);
                }
            }
            SparseMatrix::Bsr(m) => {
                let b = m.block;
                for br in 0..m.row_ptr.len().saturating_sub(1) {
                    for k in m.row_ptr[br]..m.row_ptr[br + 1] {
                        let block = &m.values[k * b * b..(k + 1) * b * b];
                        for (off, &v) in block.iter().enumerate() {
                            f(br * b + off / b, m.col_idx[k] * b + off % b, v);
                        }
                    }
                }
            }
        }
    }

    pub fn triplets(&self) -> Vec<(usize, usize, T)> {
        let mut out = Vec::with_capacity(self.nnz());
        self.for_each_entry(|i, j, v| out.push((i, j, v)));
        out
    }

    pub fn to_dense(&self) -> DenseMatrix<T> {
        let (nrows, ncols) = self.shape();
        let mut dense = DenseMatrix::zeros(nrows, ncols);
        self.for_each_entry(|i, j, v| {
            let cur = dense.get(i, j);
            dense.set(i, j, cur + v);
        });
        dense
    }

    pub fn convert(&self, format: SparseFormat) -> Result<Self> {
        if self.format() == format {
            return Ok(self.clone());
        }
        let (nrows, ncols) = self.shape();
        Self::from_triplets(nrows, ncols, self.triplets(), format)
    }

    /// Check the storage invariants of the format
    pub fn validate(&self) -> Result<()> {
        let format = self.format();
        match self {
            SparseMatrix::Csr(m) => {
                check_compressed(format, &m.row_ptr, &m.col_idx, m.nrows, m.ncols, m.values.len())
            }
            SparseMatrix::Csc(m) => {
                check_compressed(format, &m.col_ptr, &m.row_idx, m.ncols, m.nrows, m.values.len())
            }
            SparseMatrix::Coo(m) => {
                let invalid = |reason: String| Error::InvalidStructure {
                    format: format.to_string(),
                    reason,
                };
                if m.rows.len() != m.values.len() || m.cols.len() != m.values.len() {
                    return Err(invalid("index and value arrays differ in length".into()));
                }
                let entries = m.rows.iter().zip(&m.cols);
                if let Some((i, j)) = entries.clone().find(|&(&i, &j)| i >= m.nrows || j >= m.ncols) {
                    return Err(invalid(format!("entry ({}, {}) out of range", i, j)));
                }
                if entries.tuple_windows().any(|(a, b)| a >= b) {
                    return Err(invalid("entries unsorted or duplicated".into()));
                }
                Ok(())
            }
            SparseMatrix::Bsr(m) => {
                if !format.admits(m.nrows, m.ncols) {
                    return Err(Error::InvalidStructure {
                        format: format.to_string(),
                        reason: format!("block size does not divide {}x{}", m.nrows, m.ncols),
                    });
                }
                let nblocks = m.col_idx.len();
                if m.values.len() != nblocks * m.block * m.block {
                    return Err(Error::InvalidStructure {
                        format: format.to_string(),
                        reason: format!("{} values for {} blocks", m.values.len(), nblocks),
                    });
                }
                check_compressed(
                    format,
                    &m.row_ptr,
                    &m.col_idx,
                    m.nrows / m.block,
                    m.ncols / m.block,
                    nblocks,
                )
            }
        }
    }
}

/// Sparse vector with sorted, duplicate-free indices
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector<T> {
    pub len: usize,
    pub indices: Vec<usize>,
    pub values: Vec<T>,
}

impl<T: Scalar> SparseVector<T> {
    pub fn from_dense(dense: &[T]) -> Self {
        let (indices, values) = dense
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_zero())
            .map(|(i, &v)| (i, v))
            .unzip();
        Self {
            len: dense.len(),
            indices,
            values,
        }
    }

    pub fn to_dense(&self) -> Vec<T> {
        let mut out = vec![T::zero(); self.len];
        for (&i, &v) in self.indices.iter().zip(&self.values) {
            out[i] = v;
        }
        out
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, T)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DenseMatrix<f64> {
        // [1, 0, 2, 0]
        // [0, 0, 3, 0]
        // [4, 5, 0, 0]
        // [0, 0, 0, 6]
        DenseMatrix::from_fn(4, 4, |i, j| match (i, j) {
            (0, 0) => 1.0,
            (0, 2) => 2.0,
            (1, 2) => 3.0,
            (2, 0) => 4.0,
            (2, 1) => 5.0,
            (3, 3) => 6.0,
            _ => 0.0,
        })
    }

    #[test]
    fn test_csr_layout() {
        let m = SparseMatrix::from_dense(&sample(), SparseFormat::Csr).unwrap();
        match &m {
            SparseMatrix::Csr(csr) => {
                assert_eq!(csr.row_ptr, vec![0, 2, 3, 5, 6]);
                assert_eq!(csr.col_idx, vec![0, 2, 2, 0, 1, 3]);
                assert_eq!(csr.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
            }
            other => panic!("Expected CSR, got {}", other.format()),
        }
        m.validate().unwrap();
    }

    #[test]
    fn test_csc_layout() {
        let m = SparseMatrix::from_dense(&sample(), SparseFormat::Csc).unwrap();
        let SparseMatrix::Csc(csc) = &m else {
            panic!("Expected CSC");
        };
        assert_eq!(csc.col_ptr, vec![0, 2, 3, 5, 6]);
        assert_eq!(csc.row_idx, vec![0, 2, 2, 0, 1, 3]);
        assert_eq!(csc.values, vec![1.0, 4.0, 5.0, 2.0, 3.0, 6.0]);
    }

    #[test]
    fn test_bsr_stores_whole_blocks() {
        let m = SparseMatrix::from_dense(&sample(), SparseFormat::Bsr(2)).unwrap();
        let SparseMatrix::Bsr(bsr) = &m else {
            panic!("Expected BSR");
        };
        // Blocks (0,0), (0,1), (1,0), (1,1)
        assert_eq!(bsr.row_ptr, vec![0, 2, 4]);
        assert_eq!(bsr.col_idx, vec![0, 1, 0, 1]);
        assert_eq!(&bsr.values[0..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(m.nnz(), 16);
        assert_eq!(m.to_dense(), sample());
        m.validate().unwrap();
    }

    #[test]
    fn test_bsr_rejects_indivisible_shape() {
        let dense = DenseMatrix::<f32>::zeros(3, 4);
        assert!(SparseMatrix::from_dense(&dense, SparseFormat::Bsr(2)).is_err());
    }

    #[test]
    fn test_triplets_duplicates_are_summed() {
        let m = SparseMatrix::from_triplets(
            2,
            2,
            vec![(1, 1, 1.0f32), (0, 1, 2.0), (1, 1, 3.0)],
            SparseFormat::Coo,
        )
        .unwrap();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.to_dense().get(1, 1), 4.0);
        m.validate().unwrap();
    }

    #[test]
    fn test_validate_catches_unsorted_csr() {
        let m = SparseMatrix::Csr(Csr {
            nrows: 1,
            ncols: 3,
            row_ptr: vec![0, 2],
            col_idx: vec![2, 0],
            values: vec![1.0f64, 1.0],
        });
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_empty_columns() {
        let dense = DenseMatrix::<f32>::zeros(10, 0);
        for format in [SparseFormat::Csr, SparseFormat::Csc, SparseFormat::Coo, SparseFormat::Bsr(2)] {
            let m = SparseMatrix::from_dense(&dense, format).unwrap();
            assert_eq!(m.shape(), (10, 0));
            assert_eq!(m.nnz(), 0);
            m.validate().unwrap();
        }
    }

    #[test]
    fn test_sparse_vector() {
        let x = SparseVector::from_dense(&[0.0f64, 1.5, 0.0, -2.0]);
        assert_eq!(x.indices, vec![1, 3]);
        assert_eq!(x.to_dense(), vec![0.0, 1.5, 0.0, -2.0]);
    }
}
