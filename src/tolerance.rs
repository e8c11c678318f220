//! Elementwise approximate equality

use crate::dense::DenseMatrix;
use crate::scalar::{ElementType, Scalar};
use std::fmt;

/// `|actual - expected| <= atol + rtol * max(|actual|, |expected|)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Tolerance {
    /// Square root of the element precision, with a small absolute floor
    pub fn for_element(element: ElementType) -> Self {
        let atol = if element.is_double() { 1e-10 } else { 1e-4 };
        Self {
            rtol: element.epsilon().sqrt(),
            atol,
        }
    }

    /// Both bounds multiplied by `factor`
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            rtol: self.rtol * factor,
            atol: self.atol * factor,
        }
    }

    #[inline]
    pub fn accepts(&self, expected: f64, actual: f64, diff: f64) -> bool {
        diff <= self.atol + self.rtol * expected.max(actual)
    }
}

/// Worst disagreement between two results
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discrepancy {
    pub max_abs: f64,
    pub max_rel: f64,
    /// `(row, col)` of the first element outside tolerance
    pub first_index: (usize, usize),
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_abs={:.3e} max_rel={:.3e} first at ({}, {})",
            self.max_abs, self.max_rel, self.first_index.0, self.first_index.1
        )
    }
}

/// Compare equally shaped matrices; `None` when every element is within tolerance
pub fn compare<T: Scalar>(
    expected: &DenseMatrix<T>,
    actual: &DenseMatrix<T>,
    tol: Tolerance,
) -> Option<Discrepancy> {
    debug_assert_eq!(expected.shape(), actual.shape());
    let nrows = expected.nrows().max(1);
    compare_slices(expected.as_slice(), actual.as_slice())
        .fold(None, |worst: Option<(Discrepancy, bool)>, (k, e, a, diff)| {
            let rel = if e.max(a) > 0.0 { diff / e.max(a) } else { 0.0 };
            let bad = !tol.accepts(e, a, diff);
            match worst {
                None => Some((
                    Discrepancy {
                        max_abs: diff,
                        max_rel: rel,
                        first_index: (k % nrows, k / nrows),
                    },
                    bad,
                )),
                Some((mut d, seen_bad)) => {
                    d.max_abs = d.max_abs.max(diff);
                    d.max_rel = d.max_rel.max(rel);
                    if bad && !seen_bad {
                        d.first_index = (k % nrows, k / nrows);
                    }
                    Some((d, seen_bad || bad))
                }
            }
        })
        .and_then(|(d, any_bad)| any_bad.then_some(d))
}

/// Compare two scalars as 1x1 results
pub fn compare_scalar<T: Scalar>(expected: T, actual: T, tol: Tolerance) -> Option<Discrepancy> {
    compare(
        &DenseMatrix::column(vec![expected]),
        &DenseMatrix::column(vec![actual]),
        tol,
    )
}

fn compare_slices<'a, T: Scalar>(
    expected: &'a [T],
    actual: &'a [T],
) -> impl Iterator<Item = (usize, f64, f64, f64)> + 'a {
    expected
        .iter()
        .zip(actual)
        .enumerate()
        .map(|(k, (&e, &a))| (k, e.modulus(), a.modulus(), (a - e).modulus()))
}
