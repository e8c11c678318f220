//! The conformance harness.
//!
//! A [`Case`] names one point of the test matrix. [`Harness::run_case`]
//! builds seeded operands, hands the dense form to the oracle and the
//! sparse form to the subject, and compares what comes back.
//! [`Harness::sweep`] expands a [`SweepSpec`] and runs every case,
//! collecting all failures instead of stopping at the first.

use crate::config::HarnessConfig;
use crate::dense::{DenseMatrix, Structure, Transform, Uplo};
use crate::error::Error;
use crate::provider::{Operation, Oracle, Subject, Triangle};
use crate::scalar::{ElementType, Scalar};
use crate::sparse::{SparseFormat, SparseMatrix, SparseVector};
use crate::tolerance::{self, Discrepancy, Tolerance};
use itertools::iproduct;
use log::{debug, info, warn};
use num_complex::{Complex32, Complex64};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Problem sizes: op(A) is `n x m` for add and mv, `n x k` for mm with op(B) `k x m`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dims {
    pub n: usize,
    pub m: usize,
    pub k: usize,
}

impl Dims {
    pub fn new(n: usize, m: usize, k: usize) -> Self {
        Self { n, m, k }
    }
}

/// Operation-specific flavour of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Plain,
    /// Multiply through a "treat as symmetric" view of A
    Symmetric(Uplo),
    /// Triangular solve path
    Triangle(Triangle),
    /// Add a general diagonal matrix
    Diagonal,
    /// Add a multiple of the identity
    UniformScaling,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Plain => write!(f, "plain"),
            Variant::Symmetric(Uplo::Upper) => write!(f, "Symmetric(U)"),
            Variant::Symmetric(Uplo::Lower) => write!(f, "Symmetric(L)"),
            Variant::Triangle(tri) => write!(f, "{}", tri),
            Variant::Diagonal => write!(f, "Diagonal"),
            Variant::UniformScaling => write!(f, "UniformScaling"),
        }
    }
}

/// One point of the conformance matrix; cloneable so a failure can be replayed alone
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub operation: Operation,
    pub element: ElementType,
    /// Format of the sparse matrix operand; `None` for vector operations
    pub format: Option<SparseFormat>,
    /// Format B is built in for additions, coerced to `format` by the subject
    pub rhs_format: Option<SparseFormat>,
    /// One tag per transformable operand
    pub transforms: Vec<Transform>,
    pub dims: Dims,
    /// Nonzero fraction of generated sparse operands
    pub density: f64,
    /// Overrides the element type's default tolerance
    pub tolerance: Option<Tolerance>,
    pub variant: Variant,
    pub seed: u64,
}

impl Case {
    /// Identity transforms, CSR, 10x10x10 at density 0.3
    pub fn new(operation: Operation, element: ElementType) -> Self {
        Self {
            operation,
            element,
            format: operation.has_matrix_operand().then_some(SparseFormat::Csr),
            rhs_format: None,
            transforms: vec![Transform::Identity; operation.arity()],
            dims: Dims::new(10, 10, 10),
            density: 0.3,
            tolerance: None,
            variant: match operation {
                Operation::TriSolveVec | Operation::TriSolveMat => Variant::Triangle(Triangle::ALL[0]),
                Operation::AddDiagonal => Variant::Diagonal,
                _ => Variant::Plain,
            },
            seed: 0,
        }
    }

    pub fn format(mut self, format: SparseFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn rhs_format(mut self, format: SparseFormat) -> Self {
        self.rhs_format = Some(format);
        self
    }

    pub fn transforms(mut self, transforms: &[Transform]) -> Self {
        self.transforms = transforms.to_vec();
        self
    }

    pub fn dims(mut self, n: usize, m: usize, k: usize) -> Self {
        self.dims = Dims::new(n, m, k);
        self
    }

    pub fn density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    pub fn tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[inline]
    fn transform(&self, i: usize) -> Transform {
        self.transforms.get(i).copied().unwrap_or(Transform::Identity)
    }

    pub fn structure(&self) -> Structure {
        match self.variant {
            Variant::Symmetric(uplo) => Structure::Symmetric(uplo),
            _ => Structure::General,
        }
    }

    /// Every sparse format the case touches
    fn formats(&self) -> Vec<SparseFormat> {
        self.format.iter().chain(self.rhs_format.iter()).copied().collect()
    }

    /// Shapes of the stored sparse operands, paired with their formats
    fn sparse_operands(&self, format: SparseFormat) -> Vec<(SparseFormat, (usize, usize))> {
        let Dims { n, m, k } = self.dims;
        match self.operation {
            Operation::Add | Operation::Geam => vec![
                (format, self.transform(0).dims((n, m))),
                (self.rhs_format.unwrap_or(format), self.transform(1).dims((n, m))),
            ],
            Operation::AddDiagonal | Operation::TriSolveVec | Operation::TriSolveMat => {
                vec![(format, (n, n))]
            }
            Operation::MatVec => vec![(format, self.transform(0).dims((n, m)))],
            Operation::MatMat => vec![(format, self.transform(0).dims((n, k)))],
            Operation::Axpby | Operation::Dot => Vec::new(),
        }
    }

    /// Why the case cannot be built at all, independent of any subject
    fn inapplicable(&self) -> Option<String> {
        if self.transforms.len() != self.operation.arity() {
            return Some(format!(
                "{} takes {} transforms, got {}",
                self.operation,
                self.operation.arity(),
                self.transforms.len()
            ));
        }
        if !(self.density > 0.0 && self.density <= 1.0) {
            return Some(format!("density {} outside (0, 1]", self.density));
        }
        let format = match (self.operation.has_matrix_operand(), self.format) {
            (true, Some(format)) => format,
            (true, None) => return Some(format!("{} needs a sparse format", self.operation)),
            (false, _) => return None,
        };
        if let Variant::Symmetric(_) = self.variant {
            let square = match self.operation {
                Operation::MatVec => self.dims.n == self.dims.m,
                Operation::MatMat => self.dims.n == self.dims.k,
                _ => false,
            };
            if !square {
                return Some("symmetric view needs a square operand of mv or mm".to_string());
            }
        }
        if self.operation.is_solve() != matches!(self.variant, Variant::Triangle(_)) {
            return Some(format!("variant {} does not apply to {}", self.variant, self.operation));
        }
        self.sparse_operands(format)
            .into_iter()
            .find(|(f, (r, c))| !f.admits(*r, *c))
            .map(|(f, (r, c))| format!("{} cannot store a {}x{} operand", f, r, c))
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation, self.element)?;
        if let Some(format) = self.format {
            write!(f, " {}", format)?;
        }
        if let Some(rhs) = self.rhs_format {
            write!(f, "+{}", rhs)?;
        }
        if !self.transforms.is_empty() {
            let codes: String = self.transforms.iter().map(|t| t.code()).collect();
            write!(f, " op={}", codes)?;
        }
        if self.variant != Variant::Plain {
            write!(f, " {}", self.variant)?;
        }
        write!(
            f,
            " n={} m={} k={} density={} seed={:#x}",
            self.dims.n, self.dims.m, self.dims.k, self.density, self.seed
        )
    }
}

/// Outcome of a case that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Passed,
    /// Declared unsupported by the subject, or not constructible
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MismatchKind {
    /// Values differ beyond tolerance
    Numerical {
        check: &'static str,
        discrepancy: Discrepancy,
    },
    /// Wrong result format, type or shape
    Structural { expected: String, actual: String },
    /// A provider errored or panicked
    Provider(String),
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchKind::Numerical { check, discrepancy } => {
                write!(f, "numerical mismatch in {}: {}", check, discrepancy)
            }
            MismatchKind::Structural { expected, actual } => {
                write!(f, "structural mismatch: expected {}, got {}", expected, actual)
            }
            MismatchKind::Provider(msg) => write!(f, "provider error: {}", msg),
        }
    }
}

impl From<Error> for MismatchKind {
    fn from(err: Error) -> Self {
        if err.is_unsupported() {
            // Declared gaps never reach the subject
            return MismatchKind::Provider(format!("refused a declared capability: {}", err));
        }
        MismatchKind::Provider(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MismatchReport {
    pub case: Case,
    pub kind: MismatchKind,
}

impl MismatchReport {
    pub fn operation(&self) -> Operation {
        self.case.operation
    }
}

impl fmt::Display for MismatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.case, self.kind)
    }
}

impl std::error::Error for MismatchReport {}

type CaseResult = std::result::Result<(), MismatchKind>;

/// Cross-product the sweep expands into cases
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    pub operations: Vec<Operation>,
    pub elements: Vec<ElementType>,
    pub formats: Vec<SparseFormat>,
    pub transforms: Vec<Transform>,
    pub dims: Dims,
    pub densities: Vec<f64>,
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self::full()
    }
}

impl SweepSpec {
    /// Every operation, element type, format and transform pair
    pub fn full() -> Self {
        Self {
            operations: Operation::ALL.to_vec(),
            elements: ElementType::ALL.to_vec(),
            formats: vec![
                SparseFormat::Csc,
                SparseFormat::Csr,
                SparseFormat::Coo,
                SparseFormat::Bsr(2),
            ],
            transforms: Transform::ALL.to_vec(),
            dims: Dims::new(10, 8, 6),
            densities: vec![0.3, 0.7],
        }
    }

    pub fn operations(mut self, operations: &[Operation]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    pub fn elements(mut self, elements: &[ElementType]) -> Self {
        self.elements = elements.to_vec();
        self
    }

    pub fn formats(mut self, formats: &[SparseFormat]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    pub fn transforms(mut self, transforms: &[Transform]) -> Self {
        self.transforms = transforms.to_vec();
        self
    }

    /// Expand into cases, seeding each from `base_seed` and its index
    pub fn cases(&self, base_seed: u64) -> Vec<Case> {
        let mut cases = Vec::new();
        for &op in &self.operations {
            self.expand(op, &mut cases);
        }
        for (index, case) in cases.iter_mut().enumerate() {
            case.seed = base_seed ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        }
        cases
    }

    fn expand(&self, op: Operation, out: &mut Vec<Case>) {
        let Dims { n, m, k } = self.dims;
        let elements = self.elements.iter().copied();
        let formats = self.formats.iter().copied();
        let transforms = self.transforms.iter().copied();
        let densities = self.densities.iter().copied();
        let base = |element| Case::new(op, element).dims(n, m, k);
        match op {
            Operation::Add => {
                for (e, f, g, ta, tb, d) in iproduct!(
                    elements,
                    formats.clone(),
                    formats,
                    transforms.clone(),
                    transforms,
                    densities
                ) {
                    out.push(base(e).format(f).rhs_format(g).transforms(&[ta, tb]).density(d));
                }
            }
            Operation::Geam => {
                for (e, f, ta, tb, d) in
                    iproduct!(elements, formats, transforms.clone(), transforms, densities)
                {
                    out.push(base(e).format(f).transforms(&[ta, tb]).density(d));
                }
            }
            Operation::AddDiagonal => {
                let variants = [Variant::Diagonal, Variant::UniformScaling];
                for (e, f, v, d) in iproduct!(elements, formats, variants, densities) {
                    out.push(base(e).format(f).variant(v).density(d));
                }
            }
            Operation::Axpby | Operation::Dot => {
                for (e, d) in iproduct!(elements, densities) {
                    out.push(base(e).density(d));
                }
            }
            Operation::MatVec => {
                let variants = [Variant::Plain, Variant::Symmetric(Uplo::Upper)];
                for (e, f, ta, v, d) in iproduct!(elements, formats, transforms, variants, densities) {
                    let case = base(e).format(f).transforms(&[ta]).variant(v).density(d);
                    out.push(match v {
                        Variant::Symmetric(_) => case.dims(n, n, k),
                        _ => case,
                    });
                }
            }
            Operation::MatMat => {
                let variants = [Variant::Plain, Variant::Symmetric(Uplo::Upper)];
                // Rectangular product, then an empty right-hand side
                let widths = [m, 0];
                for (e, f, ta, tb, v, w, d) in iproduct!(
                    elements,
                    formats,
                    transforms.clone(),
                    transforms,
                    variants,
                    widths,
                    densities
                ) {
                    let inner = if v == Variant::Plain { k } else { n };
                    out.push(
                        base(e)
                            .format(f)
                            .transforms(&[ta, tb])
                            .variant(v)
                            .dims(n, w, inner)
                            .density(d),
                    );
                }
            }
            Operation::TriSolveVec | Operation::TriSolveMat => {
                for (e, f, ta, tri, d) in
                    iproduct!(elements, formats, transforms, Triangle::ALL, densities)
                {
                    out.push(
                        base(e)
                            .format(f)
                            .transforms(&[ta])
                            .variant(Variant::Triangle(tri))
                            .density(d),
                    );
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed,
    Skipped(String),
    Failed(MismatchKind),
    /// Not started because the failure limit was reached
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    pub case: Case,
    pub outcome: Outcome,
}

/// Every attempted case with its outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub outcomes: Vec<CaseOutcome>,
}

impl SweepReport {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Passed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Cancelled))
    }

    pub fn failures(&self) -> Vec<MismatchReport> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                Outcome::Failed(kind) => Some(MismatchReport {
                    case: o.case.clone(),
                    kind: kind.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn into_result(self) -> std::result::Result<(), Vec<MismatchReport>> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cases: {} passed, {} skipped, {} failed, {} cancelled",
            self.outcomes.len(),
            self.passed(),
            self.skipped(),
            self.failed(),
            self.cancelled()
        )
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn structural(expected: impl fmt::Display, actual: impl fmt::Display) -> MismatchKind {
    MismatchKind::Structural {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// Real-valued scale factor in [0.5, 2)
fn real_scalar<T: Scalar>(rng: &mut StdRng) -> T {
    T::from_real(rng.gen_range(0.5..2.0))
}

/// Runs cases against an oracle and a subject
pub struct Harness<O, S> {
    oracle: O,
    subject: S,
    config: HarnessConfig,
}

impl<O: Oracle, S: Subject> Harness<O, S> {
    pub fn new(oracle: O, subject: S) -> Self {
        Self::with_config(oracle, subject, HarnessConfig::default())
    }

    pub fn with_config(oracle: O, subject: S, config: HarnessConfig) -> Self {
        Self {
            oracle,
            subject,
            config,
        }
    }

    /// Run one case; provider errors and panics fail only this case
    pub fn run_case(&self, case: &Case) -> std::result::Result<Verdict, MismatchReport> {
        if let Some(reason) = case.inapplicable() {
            debug!("{}: skipped ({})", case, reason);
            return Ok(Verdict::Skipped(reason));
        }
        let gate = self.subject.capabilities().check(
            case.operation,
            case.element,
            &case.formats(),
            &case.transforms,
            case.structure(),
        );
        if let Some(reason) = gate {
            debug!("{}: skipped ({})", case, reason);
            return Ok(Verdict::Skipped(reason));
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| match case.element {
            ElementType::F32 => self.run_typed::<f32>(case),
            ElementType::F64 => self.run_typed::<f64>(case),
            ElementType::C32 => self.run_typed::<Complex32>(case),
            ElementType::C64 => self.run_typed::<Complex64>(case),
        }))
        .unwrap_or_else(|payload| {
            Err(MismatchKind::Provider(format!("panicked: {}", panic_message(payload))))
        });

        match result {
            Ok(()) => {
                debug!("{}: passed", case);
                Ok(Verdict::Passed)
            }
            Err(kind) => Err(MismatchReport {
                case: case.clone(),
                kind,
            }),
        }
    }

    /// Run every case of the cross-product and report all outcomes
    pub fn sweep(&self, spec: &SweepSpec) -> SweepReport {
        let cases = spec.cases(self.config.seed);
        info!(
            "sweeping {} cases against {} (oracle {})",
            cases.len(),
            self.subject.name(),
            self.oracle.name()
        );
        let failures = AtomicUsize::new(0);
        let run = |case: Case| -> CaseOutcome {
            if let Some(limit) = self.config.max_failures {
                if failures.load(Ordering::Relaxed) >= limit {
                    return CaseOutcome {
                        case,
                        outcome: Outcome::Cancelled,
                    };
                }
            }
            let outcome = match self.run_case(&case) {
                Ok(Verdict::Passed) => Outcome::Passed,
                Ok(Verdict::Skipped(reason)) => Outcome::Skipped(reason),
                Err(report) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!("{}", report);
                    Outcome::Failed(report.kind)
                }
            };
            CaseOutcome { case, outcome }
        };
        let outcomes: Vec<CaseOutcome> = if self.config.parallel {
            cases.into_par_iter().map(&run).collect()
        } else {
            cases.into_iter().map(&run).collect()
        };
        let report = SweepReport { outcomes };
        info!("{}: {}", self.subject.name(), report);
        report
    }

    fn run_typed<T: Scalar>(&self, case: &Case) -> CaseResult {
        let mut rng = StdRng::seed_from_u64(case.seed);
        let tol = case
            .tolerance
            .unwrap_or_else(|| Tolerance::for_element(case.element))
            .scaled(self.config.tolerance_scale);
        match case.operation {
            Operation::Add | Operation::Geam => self.check_add::<T>(case, &mut rng, tol),
            Operation::AddDiagonal => self.check_add_diagonal::<T>(case, &mut rng, tol),
            Operation::Axpby => self.check_axpby::<T>(case, &mut rng, tol),
            Operation::Dot => self.check_dot::<T>(case, &mut rng, tol),
            Operation::MatVec => self.check_mv::<T>(case, &mut rng, tol),
            Operation::MatMat => self.check_mm::<T>(case, &mut rng, tol),
            Operation::TriSolveVec | Operation::TriSolveMat => {
                self.check_solve::<T>(case, &mut rng, tol)
            }
        }
    }

    /// Hand a dense operand to the subject in `format`, checking the construction
    fn to_subject<T: Scalar>(
        &self,
        dense: &DenseMatrix<T>,
        format: SparseFormat,
    ) -> std::result::Result<SparseMatrix<T>, MismatchKind> {
        let sparse = self.subject.from_dense(dense, format)?;
        check_format(format, &sparse)?;
        let exact = Tolerance { rtol: 0.0, atol: 0.0 };
        let back = self.subject.to_dense(&sparse)?;
        check_close(&self.oracle, "from_dense/to_dense", dense, &back, exact)?;
        let csr = self.subject.convert(&sparse, SparseFormat::Csr)?;
        check_format(SparseFormat::Csr, &csr)?;
        check_close(&self.oracle, "convert", dense, &self.subject.to_dense(&csr)?, exact)?;
        Ok(sparse)
    }

    fn sparse_operand<T: Scalar>(
        &self,
        rng: &mut StdRng,
        (nrows, ncols): (usize, usize),
        density: f64,
        format: SparseFormat,
    ) -> std::result::Result<(DenseMatrix<T>, SparseMatrix<T>), MismatchKind> {
        let dense = DenseMatrix::random(rng, nrows, ncols, density);
        let sparse = self.to_subject(&dense, format)?;
        Ok((dense, sparse))
    }

    fn check_add<T: Scalar>(&self, case: &Case, rng: &mut StdRng, tol: Tolerance) -> CaseResult {
        let (ta, tb) = (case.transform(0), case.transform(1));
        let Dims { n, m, .. } = case.dims;
        let format = case.format.unwrap_or(SparseFormat::Csr);
        let rhs_format = case.rhs_format.unwrap_or(format);
        let (a_dense, a) = self.sparse_operand::<T>(rng, ta.dims((n, m)), case.density, format)?;
        let (b_dense, b) = self.sparse_operand::<T>(rng, tb.dims((n, m)), case.density, rhs_format)?;

        let (alpha, beta, sum) = if case.operation == Operation::Geam {
            let (alpha, beta) = (real_scalar::<T>(rng), real_scalar::<T>(rng));
            (alpha, beta, self.subject.geam(alpha, &a, ta, beta, &b, tb)?)
        } else {
            (T::one(), T::one(), self.subject.add(&a, ta, &b, tb)?)
        };
        check_format(format, &sum)?;
        check_shape((n, m), sum.shape())?;

        let expected = self.oracle.scale_add(alpha, &a_dense, ta, beta, &b_dense, tb)?;
        let actual = self.subject.to_dense(&sum)?;
        check_close(&self.oracle, case.operation.name(), &expected, &actual, tol)
    }

    fn check_add_diagonal<T: Scalar>(&self, case: &Case, rng: &mut StdRng, tol: Tolerance) -> CaseResult {
        let n = case.dims.n;
        let format = case.format.unwrap_or(SparseFormat::Csr);
        let (a_dense, a) = self.sparse_operand::<T>(rng, (n, n), case.density, format)?;
        let diag: Vec<T> = if case.variant == Variant::UniformScaling {
            vec![T::sample(&mut *rng); n]
        } else {
            (0..n).map(|_| T::sample(&mut *rng)).collect()
        };

        let sum = self.subject.add_diagonal(&a, &diag)?;
        check_format(format, &sum)?;
        check_shape((n, n), sum.shape())?;

        let d_dense = DenseMatrix::from_fn(n, n, |i, j| if i == j { diag[i] } else { T::zero() });
        let expected = self
            .oracle
            .add(&a_dense, Transform::Identity, &d_dense, Transform::Identity)?;
        let actual = self.subject.to_dense(&sum)?;
        check_close(&self.oracle, "add_diagonal", &expected, &actual, tol)
    }

    fn check_axpby<T: Scalar>(&self, case: &Case, rng: &mut StdRng, tol: Tolerance) -> CaseResult {
        let n = case.dims.n;
        let x_dense = DenseMatrix::<T>::random(rng, n, 1, case.density).into_vec();
        let x = SparseVector::from_dense(&x_dense);
        let y = DenseMatrix::<T>::random(rng, n, 1, 1.0);
        let (alpha, beta) = (real_scalar::<T>(rng), real_scalar::<T>(rng));

        let mut actual = y.clone();
        self.subject.axpby(alpha, &x, beta, actual.as_mut_slice())?;
        let mut expected = y;
        self.oracle.axpby(alpha, &x_dense, beta, expected.as_mut_slice())?;
        check_close(&self.oracle, "axpby", &expected, &actual, tol)
    }

    fn check_dot<T: Scalar>(&self, case: &Case, rng: &mut StdRng, tol: Tolerance) -> CaseResult {
        let n = case.dims.n;
        let x_dense = DenseMatrix::<T>::random(rng, n, 1, case.density).into_vec();
        let x = SparseVector::from_dense(&x_dense);
        let y = DenseMatrix::<T>::random(rng, n, 1, 1.0).into_vec();

        let xy = self.subject.dot(&x, &y)?;
        let yx = self.subject.dot_rev(&y, &x)?;
        check_scalar("dot(x, y)", self.oracle.dot(&x_dense, &y)?, xy, tol)?;
        check_scalar("dot(y, x)", self.oracle.dot(&y, &x_dense)?, yx, tol)?;
        check_scalar("dot symmetry", xy, yx.conj(), tol)
    }

    fn check_mv<T: Scalar>(&self, case: &Case, rng: &mut StdRng, tol: Tolerance) -> CaseResult {
        let ta = case.transform(0);
        let structure = case.structure();
        let Dims { n, m, .. } = case.dims;
        let format = case.format.unwrap_or(SparseFormat::Csr);
        let (a_dense, a) = self.sparse_operand::<T>(rng, ta.dims((n, m)), case.density, format)?;
        let x = DenseMatrix::<T>::random(rng, m, 1, 1.0);
        let y = DenseMatrix::<T>::random(rng, n, 1, 1.0);
        let (alpha, beta) = (real_scalar::<T>(rng), real_scalar::<T>(rng));

        let mut actual = y.clone();
        self.subject
            .mv(alpha, &a, ta, structure, x.as_slice(), beta, actual.as_mut_slice())?;
        let mut expected = y;
        self.oracle.gemm(
            alpha,
            &a_dense,
            ta,
            structure,
            &x,
            Transform::Identity,
            beta,
            &mut expected,
        )?;
        check_close(&self.oracle, "mv", &expected, &actual, tol)
    }

    fn check_mm<T: Scalar>(&self, case: &Case, rng: &mut StdRng, tol: Tolerance) -> CaseResult {
        let (ta, tb) = (case.transform(0), case.transform(1));
        let structure = case.structure();
        let Dims { n, m, k } = case.dims;
        let format = case.format.unwrap_or(SparseFormat::Csr);
        let (a_dense, a) = self.sparse_operand::<T>(rng, ta.dims((n, k)), case.density, format)?;
        let (b_rows, b_cols) = tb.dims((k, m));
        let b = DenseMatrix::<T>::random(rng, b_rows, b_cols, 1.0);
        let c = DenseMatrix::<T>::random(rng, n, m, 1.0);
        let (alpha, beta) = (real_scalar::<T>(rng), real_scalar::<T>(rng));

        let mut actual = c.clone();
        self.subject
            .mm(alpha, &a, ta, structure, &b, tb, beta, &mut actual)?;
        check_shape((n, m), actual.shape())?;
        let mut expected = c;
        self.oracle
            .gemm(alpha, &a_dense, ta, structure, &b, tb, beta, &mut expected)?;
        check_close(&self.oracle, "mm", &expected, &actual, tol)
    }

    fn check_solve<T: Scalar>(&self, case: &Case, rng: &mut StdRng, tol: Tolerance) -> CaseResult {
        let ta = case.transform(0);
        let tri = match case.variant {
            Variant::Triangle(tri) => tri,
            other => return Err(structural("a triangle variant", other)),
        };
        let Dims { n, m, .. } = case.dims;
        let format = case.format.unwrap_or(SparseFormat::Csr);

        // Small off-diagonal entries and a shifted diagonal keep the solve well conditioned
        let mut a_dense = DenseMatrix::<T>::random(rng, n, n, case.density);
        a_dense.scale(T::from_real(1.0 / n.max(1) as f64));
        for i in 0..n {
            let d = a_dense.get(i, i);
            a_dense.set(i, i, d + T::one());
        }
        let a = self.to_subject(&a_dense, format)?;
        let nrhs = if case.operation == Operation::TriSolveVec { 1 } else { m };
        let b = DenseMatrix::<T>::random(rng, n, nrhs, 1.0);
        let alpha = real_scalar::<T>(rng);

        let mut actual = b.clone();
        if case.operation == Operation::TriSolveVec {
            self.subject
                .sv(alpha, &a, ta, tri, actual.as_mut_slice())?;
        } else {
            self.subject.sm(alpha, &a, ta, tri, &mut actual)?;
        }
        let mut expected = b;
        self.oracle.trsm(alpha, &a_dense, ta, tri, &mut expected)?;
        check_close(&self.oracle, case.operation.name(), &expected, &actual, tol)
    }
}

fn check_format<T: Scalar>(expected: SparseFormat, actual: &SparseMatrix<T>) -> CaseResult {
    if actual.format() != expected {
        return Err(structural(expected, actual.format()));
    }
    Ok(())
}

fn check_shape(expected: (usize, usize), actual: (usize, usize)) -> CaseResult {
    if expected != actual {
        return Err(structural(
            format!("{}x{}", expected.0, expected.1),
            format!("{}x{}", actual.0, actual.1),
        ));
    }
    Ok(())
}

fn check_close<O: Oracle, T: Scalar>(
    oracle: &O,
    check: &'static str,
    expected: &DenseMatrix<T>,
    actual: &DenseMatrix<T>,
    tol: Tolerance,
) -> CaseResult {
    check_shape(expected.shape(), actual.shape())?;
    match oracle.compare(expected, actual, tol) {
        Some(discrepancy) => Err(MismatchKind::Numerical { check, discrepancy }),
        None => Ok(()),
    }
}

fn check_scalar<T: Scalar>(check: &'static str, expected: T, actual: T, tol: Tolerance) -> CaseResult {
    match tolerance::compare_scalar(expected, actual, tol) {
        Some(discrepancy) => Err(MismatchKind::Numerical { check, discrepancy }),
        None => Ok(()),
    }
}
