//! Dense reference implementation used as ground truth

use crate::dense::{DenseMatrix, Structure, Transform, Uplo};
use crate::error::{Error, Result};
use crate::provider::{Oracle, Triangle};
use crate::scalar::Scalar;

/// Textbook dense BLAS-style loops over lazily transformed views
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseOracle;

impl DenseOracle {
    pub fn new() -> Self {
        Self
    }
}

fn check_len(op: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::ShapeMismatch {
            op,
            expected: (expected, 1),
            got: (got, 1),
        });
    }
    Ok(())
}

impl Oracle for DenseOracle {
    fn name(&self) -> &'static str {
        "dense-oracle"
    }

    fn scale_add<T: Scalar>(
        &self,
        alpha: T,
        a: &DenseMatrix<T>,
        ta: Transform,
        beta: T,
        b: &DenseMatrix<T>,
        tb: Transform,
    ) -> Result<DenseMatrix<T>> {
        let (va, vb) = (a.view(ta), b.view(tb));
        if va.shape() != vb.shape() {
            return Err(Error::ShapeMismatch {
                op: "scale_add",
                expected: va.shape(),
                got: vb.shape(),
            });
        }
        Ok(DenseMatrix::from_fn(va.nrows(), va.ncols(), |i, j| {
            alpha * va.get(i, j) + beta * vb.get(i, j)
        }))
    }

    fn axpby<T: Scalar>(&self, alpha: T, x: &[T], beta: T, y: &mut [T]) -> Result<()> {
        check_len("axpby", y.len(), x.len())?;
        for (yi, &xi) in y.iter_mut().zip(x) {
            *yi = alpha * xi + beta * *yi;
        }
        Ok(())
    }

    fn gemm<T: Scalar>(
        &self,
        alpha: T,
        a: &DenseMatrix<T>,
        ta: Transform,
        structure: Structure,
        b: &DenseMatrix<T>,
        tb: Transform,
        beta: T,
        c: &mut DenseMatrix<T>,
    ) -> Result<()> {
        let va = a.view_as(ta, structure);
        let vb = b.view(tb);
        let (n, k) = va.shape();
        let m = vb.ncols();
        if vb.nrows() != k || c.shape() != (n, m) {
            return Err(Error::ShapeMismatch {
                op: "gemm",
                expected: (n, m),
                got: c.shape(),
            });
        }
        for j in 0..m {
            for i in 0..n {
                let mut acc = T::zero();
                for p in 0..k {
                    acc += va.get(i, p) * vb.get(p, j);
                }
                let cij = c.get(i, j);
                c.set(i, j, alpha * acc + beta * cij);
            }
        }
        Ok(())
    }

    fn dot<T: Scalar>(&self, x: &[T], y: &[T]) -> Result<T> {
        check_len("dot", x.len(), y.len())?;
        Ok(x.iter()
            .zip(y)
            .fold(T::zero(), |acc, (&xi, &yi)| acc + xi.conj() * yi))
    }

    fn trsm<T: Scalar>(
        &self,
        alpha: T,
        a: &DenseMatrix<T>,
        ta: Transform,
        tri: Triangle,
        b: &mut DenseMatrix<T>,
    ) -> Result<()> {
        let n = a.nrows();
        if a.ncols() != n || b.nrows() != n {
            return Err(Error::ShapeMismatch {
                op: "trsm",
                expected: (n, n),
                got: (a.ncols(), b.nrows()),
            });
        }
        let va = a.view(ta);
        // Element of op(tri(A)); positions outside the stored triangle read as zero
        let t = |i: usize, j: usize| -> T {
            let (r, c) = if ta.swaps() { (j, i) } else { (i, j) };
            if r == c && tri.is_unit() {
                T::one()
            } else if tri.uplo.contains(r, c) {
                va.get(i, j)
            } else {
                T::zero()
            }
        };
        let lower = if ta.swaps() { tri.uplo.flip() } else { tri.uplo } == Uplo::Lower;
        b.scale(alpha);
        for col in 0..b.ncols() {
            let x = b.col_mut(col);
            for step in 0..n {
                let i = if lower { step } else { n - 1 - step };
                let others = if lower { 0..i } else { i + 1..n };
                let mut s = x[i];
                for j in others {
                    s -= t(i, j) * x[j];
                }
                let d = t(i, i);
                if d.is_zero() {
                    return Err(Error::Singular { row: i });
                }
                x[i] = s / d;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Diag;
    use num_complex::Complex64;

    #[test]
    fn test_gemm_rectangular() {
        // A (2x3) = [1 2 3; 4 5 6], B = A^T via transform
        let a = DenseMatrix::from_col_major(2, 3, vec![1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0]).unwrap();
        let mut c = DenseMatrix::zeros(2, 2);
        DenseOracle
            .gemm(1.0, &a, Transform::Identity, Structure::General, &a, Transform::Transpose, 0.0, &mut c)
            .unwrap();
        assert_eq!(c.as_slice(), &[14.0, 32.0, 32.0, 77.0]);
    }

    #[test]
    fn test_gemm_zero_columns_keeps_shape() {
        let a = DenseMatrix::<f32>::from_fn(10, 10, |i, j| (i + j) as f32);
        let b = DenseMatrix::zeros(10, 0);
        let mut c = DenseMatrix::zeros(10, 0);
        DenseOracle
            .gemm(1.0, &a, Transform::Identity, Structure::General, &b, Transform::Identity, 0.0, &mut c)
            .unwrap();
        assert_eq!(c.shape(), (10, 0));
    }

    #[test]
    fn test_trsm_unit_ignores_stored_diagonal() {
        // L = [5 0; 2 7] with unit diagonal acts as [1 0; 2 1]
        let a = DenseMatrix::from_col_major(2, 2, vec![5.0f64, 2.0, 0.0, 7.0]).unwrap();
        let mut b = DenseMatrix::column(vec![1.0, 4.0]);
        let tri = Triangle { uplo: Uplo::Lower, diag: Diag::Unit };
        DenseOracle.trsm(1.0, &a, Transform::Identity, tri, &mut b).unwrap();
        assert_eq!(b.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_trsm_transposed_upper() {
        // U = [2 1; 0 4]; U^T x = [2, 9] -> x = [1, 2]
        let a = DenseMatrix::from_col_major(2, 2, vec![2.0f64, 0.0, 1.0, 4.0]).unwrap();
        let mut b = DenseMatrix::column(vec![2.0, 9.0]);
        let tri = Triangle { uplo: Uplo::Upper, diag: Diag::NonUnit };
        DenseOracle.trsm(1.0, &a, Transform::Transpose, tri, &mut b).unwrap();
        assert_eq!(b.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_dot_conjugates_first_operand() {
        let x = [Complex64::new(0.0, 1.0)];
        let y = [Complex64::new(0.0, 1.0)];
        assert_eq!(DenseOracle.dot(&x, &y).unwrap(), Complex64::new(1.0, 0.0));
    }
}
