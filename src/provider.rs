//! Provider seams: the dense reference ([`Oracle`]) and the implementation
//! under test ([`Subject`]), plus the capability query used to skip
//! combinations a subject declares unsupported.

use crate::dense::{DenseMatrix, Structure, Transform, Uplo};
use crate::error::Result;
use crate::scalar::{ElementType, Scalar};
use crate::sparse::{SparseFormat, SparseMatrix, SparseVector};
use crate::tolerance::{self, Discrepancy, Tolerance};
use std::fmt;

/// Operation exercised by a conformance case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `op(A) + op(B)`, result in A's format
    Add,
    /// `A + D` for a diagonal or uniform scaling D, result in A's format
    AddDiagonal,
    /// `alpha * op(A) + beta * op(B)` on sparse matrices
    Geam,
    /// `y := alpha * x + beta * y` with sparse x
    Axpby,
    /// `conj(x) . y` in both operand orders
    Dot,
    /// `y := alpha * op(A) * x + beta * y`
    MatVec,
    /// `C := alpha * op(A) * op(B) + beta * C`
    MatMat,
    /// `op(tri(A)) * x = alpha * b`
    TriSolveVec,
    /// `op(tri(A)) * X = alpha * B`
    TriSolveMat,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Add,
        Operation::AddDiagonal,
        Operation::Geam,
        Operation::Axpby,
        Operation::Dot,
        Operation::MatVec,
        Operation::MatMat,
        Operation::TriSolveVec,
        Operation::TriSolveMat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::AddDiagonal => "add_diagonal",
            Operation::Geam => "geam",
            Operation::Axpby => "axpby",
            Operation::Dot => "dot",
            Operation::MatVec => "mv",
            Operation::MatMat => "mm",
            Operation::TriSolveVec => "sv",
            Operation::TriSolveMat => "sm",
        }
    }

    /// Number of operands that carry a transform tag
    pub fn arity(&self) -> usize {
        match self {
            Operation::Add | Operation::Geam | Operation::MatMat => 2,
            Operation::MatVec | Operation::TriSolveVec | Operation::TriSolveMat => 1,
            Operation::AddDiagonal | Operation::Axpby | Operation::Dot => 0,
        }
    }

    /// False for the vector operations, which have no matrix format
    pub fn has_matrix_operand(&self) -> bool {
        !matches!(self, Operation::Axpby | Operation::Dot)
    }

    pub fn is_solve(&self) -> bool {
        matches!(self, Operation::TriSolveVec | Operation::TriSolveMat)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diag {
    /// Diagonal forced to one, never read from storage
    Unit,
    NonUnit,
}

/// Triangular view of a sparse matrix selecting a solve path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triangle {
    pub uplo: Uplo,
    pub diag: Diag,
}

impl Triangle {
    pub const ALL: [Triangle; 4] = [
        Triangle { uplo: Uplo::Lower, diag: Diag::NonUnit },
        Triangle { uplo: Uplo::Lower, diag: Diag::Unit },
        Triangle { uplo: Uplo::Upper, diag: Diag::NonUnit },
        Triangle { uplo: Uplo::Upper, diag: Diag::Unit },
    ];

    #[inline]
    pub fn is_unit(&self) -> bool {
        self.diag == Diag::Unit
    }
}

impl fmt::Display for Triangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uplo = match self.uplo {
            Uplo::Lower => "Lower",
            Uplo::Upper => "Upper",
        };
        let diag = if self.is_unit() { "Unit" } else { "" };
        write!(f, "{}{}Triangular", diag, uplo)
    }
}

/// What a subject declares it can run.
///
/// The flags mirror limitations of older native sparse libraries.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub operations: Vec<Operation>,
    pub elements: Vec<ElementType>,
    pub formats: Vec<SparseFormat>,
    pub transforms: Vec<Transform>,
    /// Multiply through a symmetric view
    pub symmetric_view: bool,
    /// Triangular solve on COO storage
    pub coo_triangular_solve: bool,
    /// Adjoint triangular solve on complex elements
    pub complex_adjoint_solve: bool,
    /// Non-identity transform on the dense operand of `mm`
    pub transposed_dense_operand: bool,
}

impl Capabilities {
    /// Everything, every format family
    pub fn full() -> Self {
        Self {
            operations: Operation::ALL.to_vec(),
            elements: ElementType::ALL.to_vec(),
            formats: vec![
                SparseFormat::Csr,
                SparseFormat::Csc,
                SparseFormat::Coo,
                SparseFormat::Bsr(1),
            ],
            transforms: Transform::ALL.to_vec(),
            symmetric_view: true,
            coo_triangular_solve: true,
            complex_adjoint_solve: true,
            transposed_dense_operand: true,
        }
    }

    /// Full operation set minus the gated combinations
    pub fn legacy() -> Self {
        Self {
            coo_triangular_solve: false,
            complex_adjoint_solve: false,
            transposed_dense_operand: false,
            ..Self::full()
        }
    }

    pub fn supports_format(&self, format: SparseFormat) -> bool {
        self.formats.iter().any(|f| f.same_kind(&format))
    }

    /// Reason a combination is gated off, or `None` when it may run
    pub fn check(
        &self,
        operation: Operation,
        element: ElementType,
        formats: &[SparseFormat],
        transforms: &[Transform],
        structure: Structure,
    ) -> Option<String> {
        if !self.operations.contains(&operation) {
            return Some(format!("operation {} not provided", operation));
        }
        if !self.elements.contains(&element) {
            return Some(format!("element type {} not provided", element));
        }
        if let Some(f) = formats.iter().find(|f| !self.supports_format(**f)) {
            return Some(format!("format {} not provided", f));
        }
        if let Some(t) = transforms.iter().find(|t| !self.transforms.contains(*t)) {
            return Some(format!("transform {} not provided", t));
        }
        if structure != Structure::General && !self.symmetric_view {
            return Some("symmetric view not provided".to_string());
        }
        if operation.is_solve() {
            if !self.coo_triangular_solve && formats.contains(&SparseFormat::Coo) {
                return Some("COO triangular solve gated".to_string());
            }
            if !self.complex_adjoint_solve
                && element.is_complex()
                && transforms.contains(&Transform::Adjoint)
            {
                return Some("complex adjoint solve gated".to_string());
            }
        }
        if operation == Operation::MatMat
            && !self.transposed_dense_operand
            && transforms.get(1).map_or(false, |t| t.swaps())
        {
            return Some("transformed dense operand gated".to_string());
        }
        None
    }
}

/// Trusted dense reference computation
pub trait Oracle: Sync {
    fn name(&self) -> &'static str;

    /// `op(A) + op(B)`
    fn add<T: Scalar>(
        &self,
        a: &DenseMatrix<T>,
        ta: Transform,
        b: &DenseMatrix<T>,
        tb: Transform,
    ) -> Result<DenseMatrix<T>> {
        self.scale_add(T::one(), a, ta, T::one(), b, tb)
    }

    /// `alpha * op(A) + beta * op(B)`
    fn scale_add<T: Scalar>(
        &self,
        alpha: T,
        a: &DenseMatrix<T>,
        ta: Transform,
        beta: T,
        b: &DenseMatrix<T>,
        tb: Transform,
    ) -> Result<DenseMatrix<T>>;

    /// `y := alpha * x + beta * y`
    fn axpby<T: Scalar>(&self, alpha: T, x: &[T], beta: T, y: &mut [T]) -> Result<()>;

    /// `C := alpha * op(A) * op(B) + beta * C`, A read through `structure`
    #[allow(clippy::too_many_arguments)]
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
    ) -> Result<()>;

    /// `conj(x) . y`
    fn dot<T: Scalar>(&self, x: &[T], y: &[T]) -> Result<T>;

    /// Solve `op(tri(A)) * X = alpha * B` in place of B
    fn trsm<T: Scalar>(
        &self,
        alpha: T,
        a: &DenseMatrix<T>,
        ta: Transform,
        tri: Triangle,
        b: &mut DenseMatrix<T>,
    ) -> Result<()>;

    /// Elementwise comparison of equally shaped matrices
    fn compare<T: Scalar>(
        &self,
        expected: &DenseMatrix<T>,
        actual: &DenseMatrix<T>,
        tol: Tolerance,
    ) -> Option<Discrepancy> {
        tolerance::compare(expected, actual, tol)
    }
}

/// Sparse linear algebra implementation under test
pub trait Subject: Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    fn from_dense<T: Scalar>(
        &self,
        dense: &DenseMatrix<T>,
        format: SparseFormat,
    ) -> Result<SparseMatrix<T>> {
        SparseMatrix::from_dense(dense, format)
    }

    fn to_dense<T: Scalar>(&self, a: &SparseMatrix<T>) -> Result<DenseMatrix<T>> {
        Ok(a.to_dense())
    }

    fn convert<T: Scalar>(&self, a: &SparseMatrix<T>, format: SparseFormat) -> Result<SparseMatrix<T>> {
        a.convert(format)
    }

    /// `op(A) + op(B)`; B is coerced to A's format and the result keeps it
    fn add<T: Scalar>(
        &self,
        a: &SparseMatrix<T>,
        ta: Transform,
        b: &SparseMatrix<T>,
        tb: Transform,
    ) -> Result<SparseMatrix<T>> {
        self.geam(T::one(), a, ta, T::one(), b, tb)
    }

    /// `A + diag(d)`; the result keeps A's format
    fn add_diagonal<T: Scalar>(&self, a: &SparseMatrix<T>, diag: &[T]) -> Result<SparseMatrix<T>>;

    /// `alpha * op(A) + beta * op(B)` in A's format
    fn geam<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        beta: T,
        b: &SparseMatrix<T>,
        tb: Transform,
    ) -> Result<SparseMatrix<T>>;

    /// `y := alpha * x + beta * y`
    fn axpby<T: Scalar>(&self, alpha: T, x: &SparseVector<T>, beta: T, y: &mut [T]) -> Result<()>;

    /// `conj(x) . y`
    fn dot<T: Scalar>(&self, x: &SparseVector<T>, y: &[T]) -> Result<T>;

    /// `conj(y) . x`
    fn dot_rev<T: Scalar>(&self, y: &[T], x: &SparseVector<T>) -> Result<T>;

    /// `y := alpha * op(A) * x + beta * y`
    #[allow(clippy::too_many_arguments)]
    fn mv<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        structure: Structure,
        x: &[T],
        beta: T,
        y: &mut [T],
    ) -> Result<()>;

    /// `C := alpha * op(A) * op(B) + beta * C`
    #[allow(clippy::too_many_arguments)]
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
    ) -> Result<()>;

    /// Solve `op(tri(A)) * x = alpha * b` in place of b
    fn sv<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        tri: Triangle,
        b: &mut [T],
    ) -> Result<()>;

    /// Solve `op(tri(A)) * X = alpha * B` in place of B
    fn sm<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        tri: Triangle,
        b: &mut DenseMatrix<T>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_gates() {
        let caps = Capabilities::legacy();
        let general = Structure::General;
        assert!(caps
            .check(Operation::TriSolveVec, ElementType::F64, &[SparseFormat::Coo], &[Transform::Identity], general)
            .is_some());
        assert!(caps
            .check(Operation::TriSolveVec, ElementType::C32, &[SparseFormat::Csr], &[Transform::Adjoint], general)
            .is_some());
        assert!(caps
            .check(Operation::TriSolveVec, ElementType::F32, &[SparseFormat::Csr], &[Transform::Adjoint], general)
            .is_none());
        assert!(caps
            .check(
                Operation::MatMat,
                ElementType::F32,
                &[SparseFormat::Csr],
                &[Transform::Identity, Transform::Transpose],
                general
            )
            .is_some());
    }

    #[test]
    fn test_full_admits_any_bsr_block() {
        let caps = Capabilities::full();
        assert!(caps
            .check(Operation::MatVec, ElementType::C64, &[SparseFormat::Bsr(4)], &[Transform::Adjoint], Structure::General)
            .is_none());
    }
}
