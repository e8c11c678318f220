//! CPU sparse kernels, the default subject under test

use crate::dense::{DenseMatrix, Structure, Transform, Uplo};
use crate::error::{Error, Result};
use crate::provider::{Capabilities, Subject, Triangle};
use crate::scalar::Scalar;
use crate::sparse::{Csr, SparseMatrix, SparseVector};

/// Sparse kernels walking stored entries directly, for all four formats.
///
/// Transforms are resolved per entry; nothing is densified.
#[derive(Debug, Clone)]
pub struct CpuSparse {
    capabilities: Capabilities,
}

impl Default for CpuSparse {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSparse {
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities::full(),
        }
    }

    /// Same kernels, advertising a narrower capability set
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }
}

/// Visit the entries of `op(A)` where A is read through `structure`
fn for_each_op_entry<T: Scalar>(
    a: &SparseMatrix<T>,
    ta: Transform,
    structure: Structure,
    mut f: impl FnMut(usize, usize, T),
) {
    a.for_each_entry(|i, j, v| match structure {
        Structure::General => {
            let (r, c, w) = ta.entry(i, j, v);
            f(r, c, w);
        }
        Structure::Symmetric(uplo) => {
            if !uplo.contains(i, j) {
                return;
            }
            let (r, c, w) = ta.entry(i, j, v);
            f(r, c, w);
            if i != j {
                let (r, c, w) = ta.entry(j, i, v);
                f(r, c, w);
            }
        }
    });
}

fn op_shape<T: Scalar>(a: &SparseMatrix<T>, ta: Transform) -> (usize, usize) {
    ta.dims(a.shape())
}

/// Rows of `op(tri(A))` with the diagonal split out
struct TriangularRows<T> {
    off_diagonal: Csr<T>,
    diagonal: Vec<Option<T>>,
    lower: bool,
}

impl<T: Scalar> TriangularRows<T> {
    fn build(a: &SparseMatrix<T>, ta: Transform, tri: Triangle) -> Result<Self> {
        let (n, ncols) = a.shape();
        if n != ncols {
            return Err(Error::ShapeMismatch {
                op: "triangular_solve",
                expected: (n, n),
                got: (n, ncols),
            });
        }
        let mut diagonal = vec![None; n];
        let mut triplets = Vec::with_capacity(a.nnz());
        a.for_each_entry(|i, j, v| {
            if !tri.uplo.contains(i, j) {
                return;
            }
            let (r, c, w) = ta.entry(i, j, v);
            if r == c {
                if !tri.is_unit() {
                    let d = diagonal[r].get_or_insert(T::zero());
                    *d += w;
                }
            } else {
                triplets.push((r, c, w));
            }
        });
        if tri.is_unit() {
            diagonal.iter_mut().for_each(|d| *d = Some(T::one()));
        }
        let lower = if ta.swaps() { tri.uplo.flip() } else { tri.uplo } == Uplo::Lower;
        Ok(Self {
            off_diagonal: Csr::from_triplets(n, n, triplets),
            diagonal,
            lower,
        })
    }

    /// Forward or backward substitution on one right-hand side
    fn solve(&self, x: &mut [T]) -> Result<()> {
        let n = self.diagonal.len();
        for step in 0..n {
            let i = if self.lower { step } else { n - 1 - step };
            let mut s = x[i];
            for (j, v) in self.off_diagonal.row(i) {
                s -= v * x[j];
            }
            match self.diagonal[i] {
                Some(d) if !d.is_zero() => x[i] = s / d,
                _ => return Err(Error::Singular { row: i }),
            }
        }
        Ok(())
    }
}

impl Subject for CpuSparse {
    fn name(&self) -> &'static str {
        "cpu-sparse"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn add_diagonal<T: Scalar>(&self, a: &SparseMatrix<T>, diag: &[T]) -> Result<SparseMatrix<T>> {
        let (nrows, ncols) = a.shape();
        if diag.len() != nrows.min(ncols) {
            return Err(Error::ShapeMismatch {
                op: "add_diagonal",
                expected: (nrows.min(ncols), 1),
                got: (diag.len(), 1),
            });
        }
        let mut triplets = a.triplets();
        triplets.extend(diag.iter().enumerate().map(|(i, &d)| (i, i, d)));
        SparseMatrix::from_triplets(nrows, ncols, triplets, a.format())
    }

    fn geam<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        beta: T,
        b: &SparseMatrix<T>,
        tb: Transform,
    ) -> Result<SparseMatrix<T>> {
        let b = b.convert(a.format())?;
        let (nrows, ncols) = op_shape(a, ta);
        if op_shape(&b, tb) != (nrows, ncols) {
            return Err(Error::ShapeMismatch {
                op: "geam",
                expected: (nrows, ncols),
                got: op_shape(&b, tb),
            });
        }
        let mut triplets = Vec::with_capacity(a.nnz() + b.nnz());
        for_each_op_entry(a, ta, Structure::General, |i, j, v| triplets.push((i, j, alpha * v)));
        for_each_op_entry(&b, tb, Structure::General, |i, j, v| triplets.push((i, j, beta * v)));
        SparseMatrix::from_triplets(nrows, ncols, triplets, a.format())
    }

    fn axpby<T: Scalar>(&self, alpha: T, x: &SparseVector<T>, beta: T, y: &mut [T]) -> Result<()> {
        if x.len != y.len() {
            return Err(Error::ShapeMismatch {
                op: "axpby",
                expected: (y.len(), 1),
                got: (x.len, 1),
            });
        }
        y.iter_mut().for_each(|yi| *yi *= beta);
        for (i, v) in x.iter() {
            y[i] += alpha * v;
        }
        Ok(())
    }

    fn dot<T: Scalar>(&self, x: &SparseVector<T>, y: &[T]) -> Result<T> {
        if x.len != y.len() {
            return Err(Error::ShapeMismatch {
                op: "dot",
                expected: (y.len(), 1),
                got: (x.len, 1),
            });
        }
        Ok(x.iter().fold(T::zero(), |acc, (i, v)| acc + v.conj() * y[i]))
    }

    fn dot_rev<T: Scalar>(&self, y: &[T], x: &SparseVector<T>) -> Result<T> {
        if x.len != y.len() {
            return Err(Error::ShapeMismatch {
                op: "dot",
                expected: (y.len(), 1),
                got: (x.len, 1),
            });
        }
        Ok(x.iter().fold(T::zero(), |acc, (i, v)| acc + y[i].conj() * v))
    }

    fn mv<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        structure: Structure,
        x: &[T],
        beta: T,
        y: &mut [T],
    ) -> Result<()> {
        let (nrows, ncols) = op_shape(a, ta);
        if x.len() != ncols || y.len() != nrows {
            return Err(Error::ShapeMismatch {
                op: "mv",
                expected: (nrows, ncols),
                got: (y.len(), x.len()),
            });
        }
        y.iter_mut().for_each(|yi| *yi *= beta);
        for_each_op_entry(a, ta, structure, |i, j, v| y[i] += alpha * v * x[j]);
        Ok(())
    }

    fn mm<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        structure: Structure,
        b: &DenseMatrix<T>,
        tb: Transform,
        beta: T,
        c: &mut DenseMatrix<T>,
    ) -> Result<()> {
        let (nrows, k) = op_shape(a, ta);
        let vb = b.view(tb);
        if vb.nrows() != k || c.shape() != (nrows, vb.ncols()) {
            return Err(Error::ShapeMismatch {
                op: "mm",
                expected: (nrows, vb.ncols()),
                got: c.shape(),
            });
        }
        c.scale(beta);
        let m = vb.ncols();
        for_each_op_entry(a, ta, structure, |i, p, v| {
            let av = alpha * v;
            for j in 0..m {
                let cij = c.get(i, j);
                c.set(i, j, cij + av * vb.get(p, j));
            }
        });
        Ok(())
    }

    fn sv<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        tri: Triangle,
        b: &mut [T],
    ) -> Result<()> {
        let rows = TriangularRows::build(a, ta, tri)?;
        if b.len() != a.nrows() {
            return Err(Error::ShapeMismatch {
                op: "sv",
                expected: (a.nrows(), 1),
                got: (b.len(), 1),
            });
        }
        b.iter_mut().for_each(|v| *v *= alpha);
        rows.solve(b)
    }

    fn sm<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        tri: Triangle,
        b: &mut DenseMatrix<T>,
    ) -> Result<()> {
        let rows = TriangularRows::build(a, ta, tri)?;
        if b.nrows() != a.nrows() {
            return Err(Error::ShapeMismatch {
                op: "sm",
                expected: (a.nrows(), b.ncols()),
                got: b.shape(),
            });
        }
        b.scale(alpha);
        for j in 0..b.ncols() {
            rows.solve(b.col_mut(j))?;
        }
        Ok(())
    }
}
