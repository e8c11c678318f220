//! Column-major dense matrices and lazily transformed views

use crate::error::{Error, Result};
use crate::scalar::Scalar;
use rand::Rng;
use std::fmt;

/// Operand transform applied at operation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    Identity,
    Transpose,
    /// Conjugate transpose; same as `Transpose` for real types
    Adjoint,
}

impl Transform {
    pub const ALL: [Transform; 3] = [Transform::Identity, Transform::Transpose, Transform::Adjoint];

    /// True for transpose and adjoint
    #[inline]
    pub fn swaps(&self) -> bool {
        !matches!(self, Transform::Identity)
    }

    /// Shape of `op(X)` given the shape of `X` (and vice versa)
    #[inline]
    pub fn dims(&self, (rows, cols): (usize, usize)) -> (usize, usize) {
        if self.swaps() {
            (cols, rows)
        } else {
            (rows, cols)
        }
    }

    /// Map a stored entry `(i, j, v)` of `X` to its position and value in `op(X)`
    #[inline]
    pub fn entry<T: Scalar>(&self, i: usize, j: usize, v: T) -> (usize, usize, T) {
        match self {
            Transform::Identity => (i, j, v),
            Transform::Transpose => (j, i, v),
            Transform::Adjoint => (j, i, v.conj()),
        }
    }

    pub fn code(&self) -> char {
        match self {
            Transform::Identity => 'N',
            Transform::Transpose => 'T',
            Transform::Adjoint => 'C',
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Which stored triangle a view reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uplo {
    Lower,
    Upper,
}

impl Uplo {
    /// Whether stored position `(i, j)` lies in this triangle (diagonal included)
    #[inline]
    pub fn contains(&self, i: usize, j: usize) -> bool {
        match self {
            Uplo::Lower => i >= j,
            Uplo::Upper => i <= j,
        }
    }

    #[inline]
    pub fn flip(&self) -> Uplo {
        match self {
            Uplo::Lower => Uplo::Upper,
            Uplo::Upper => Uplo::Lower,
        }
    }
}

/// "Treat as" structure of an operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Structure {
    General,
    /// Symmetric matrix stored through one triangle; the other is never read
    Symmetric(Uplo),
}

/// Dense matrix in column-major order
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<T> {
    nrows: usize,
    ncols: usize,
    data: Vec<T>,
}

impl<T: Scalar> DenseMatrix<T> {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![T::zero(); nrows * ncols],
        }
    }

    /// Wrap column-major data
    pub fn from_col_major(nrows: usize, ncols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != nrows * ncols {
            return Err(Error::invalid_arg(
                "data",
                format!("{} elements for a {}x{} matrix", data.len(), nrows, ncols),
            ));
        }
        Ok(Self { nrows, ncols, data })
    }

    /// Single-column matrix from a vector
    pub fn column(data: Vec<T>) -> Self {
        Self {
            nrows: data.len(),
            ncols: 1,
            data,
        }
    }

    pub fn from_fn(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
        }
        Self { nrows, ncols, data }
    }

    /// Random matrix whose entries are nonzero with probability `density`
    pub fn random<R: Rng + ?Sized>(rng: &mut R, nrows: usize, ncols: usize, density: f64) -> Self {
        Self::from_fn(nrows, ncols, |_, _| {
            if density >= 1.0 || rng.gen_bool(density.max(0.0)) {
                T::sample(&mut *rng)
            } else {
                T::zero()
            }
        })
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        self.data[i + j * self.nrows]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: T) {
        self.data[i + j * self.nrows] = v;
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn col_mut(&mut self, j: usize) -> &mut [T] {
        let n = self.nrows;
        &mut self.data[j * n..(j + 1) * n]
    }

    pub fn scale(&mut self, alpha: T) {
        for v in &mut self.data {
            *v *= alpha;
        }
    }

    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|v| !v.is_zero()).count()
    }

    /// View through `transform` without copying
    pub fn view(&self, transform: Transform) -> DenseView<'_, T> {
        DenseView {
            matrix: self,
            transform,
            structure: Structure::General,
        }
    }

    /// View through `transform` of the matrix treated as `structure`
    pub fn view_as(&self, transform: Transform, structure: Structure) -> DenseView<'_, T> {
        DenseView {
            matrix: self,
            transform,
            structure,
        }
    }
}

/// Lazily resolved `op(X)`, optionally read through a symmetric structure
#[derive(Debug, Clone, Copy)]
pub struct DenseView<'a, T> {
    matrix: &'a DenseMatrix<T>,
    transform: Transform,
    structure: Structure,
}

impl<'a, T: Scalar> DenseView<'a, T> {
    #[inline]
    pub fn nrows(&self) -> usize {
        self.shape().0
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.shape().1
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.transform.dims(self.matrix.shape())
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        let (mut r, mut c) = if self.transform.swaps() { (j, i) } else { (i, j) };
        if let Structure::Symmetric(uplo) = self.structure {
            if !uplo.contains(r, c) {
                std::mem::swap(&mut r, &mut c);
            }
        }
        let v = self.matrix.get(r, c);
        if self.transform == Transform::Adjoint {
            v.conj()
        } else {
            v
        }
    }
}
