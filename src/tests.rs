use super::*;
use num_complex::Complex64;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cpu_harness() -> Harness<DenseOracle, CpuSparse> {
    init_logger();
    Harness::new(DenseOracle::new(), CpuSparse::new())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    /// Perturbs the first entry of every mv result
    SkewedMv,
    /// Returns additions in CSR regardless of the lhs format
    CsrAdd,
    PanickingDot,
    /// Every sv call errors
    FailingSv,
    /// Refuses mm at call time despite declaring it
    RefusingMm,
}

/// CPU subject with one deliberately broken operation
struct Faulty {
    inner: CpuSparse,
    fault: Fault,
}

impl Faulty {
    fn new(fault: Fault) -> Self {
        Self {
            inner: CpuSparse::new(),
            fault,
        }
    }
}

impl Subject for Faulty {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::full()
    }

    fn add_diagonal<T: Scalar>(&self, a: &SparseMatrix<T>, diag: &[T]) -> Result<SparseMatrix<T>> {
        self.inner.add_diagonal(a, diag)
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
        let sum = self.inner.geam(alpha, a, ta, beta, b, tb)?;
        match self.fault {
            Fault::CsrAdd => sum.convert(SparseFormat::Csr),
            _ => Ok(sum),
        }
    }

    fn axpby<T: Scalar>(&self, alpha: T, x: &SparseVector<T>, beta: T, y: &mut [T]) -> Result<()> {
        self.inner.axpby(alpha, x, beta, y)
    }

    fn dot<T: Scalar>(&self, x: &SparseVector<T>, y: &[T]) -> Result<T> {
        if self.fault == Fault::PanickingDot {
            panic!("dot kernel exploded");
        }
        self.inner.dot(x, y)
    }

    fn dot_rev<T: Scalar>(&self, y: &[T], x: &SparseVector<T>) -> Result<T> {
        self.inner.dot_rev(y, x)
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
        self.inner.mv(alpha, a, ta, structure, x, beta, y)?;
        if self.fault == Fault::SkewedMv {
            if let Some(first) = y.first_mut() {
                *first += T::one();
            }
        }
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
        if self.fault == Fault::RefusingMm {
            return Err(Error::Unsupported {
                provider: "faulty",
                operation: "mm",
                element: T::ELEMENT,
                reason: "not today".to_string(),
            });
        }
        self.inner.mm(alpha, a, ta, structure, b, tb, beta, c)
    }

    fn sv<T: Scalar>(&self, alpha: T, a: &SparseMatrix<T>, ta: Transform, tri: Triangle, b: &mut [T]) -> Result<()> {
        if self.fault == Fault::FailingSv {
            return Err(Error::Singular { row: 0 });
        }
        self.inner.sv(alpha, a, ta, tri, b)
    }

    fn sm<T: Scalar>(
        &self,
        alpha: T,
        a: &SparseMatrix<T>,
        ta: Transform,
        tri: Triangle,
        b: &mut DenseMatrix<T>,
    ) -> Result<()> {
        self.inner.sm(alpha, a, ta, tri, b)
    }
}

#[test]
fn test_full_sweep_cpu() {
    let harness = cpu_harness();
    let report = harness.sweep(&SweepSpec::full());
    dbg!(report.to_string());
    assert!(report.passed() > 0);
    assert_eq!(report.cancelled(), 0);
    if let Err(failures) = report.into_result() {
        for failure in &failures {
            eprintln!("{}", failure);
        }
        panic!("{} cases failed", failures.len());
    }
}

#[test]
fn test_sweep_serial_matches_parallel() {
    init_logger();
    let spec = SweepSpec::full().operations(&[Operation::MatVec, Operation::Dot]);
    let parallel = Harness::new(DenseOracle::new(), CpuSparse::new()).sweep(&spec);
    let serial = Harness::with_config(DenseOracle::new(), CpuSparse::new(), HarnessConfig::default().serial())
        .sweep(&spec);
    assert_eq!(parallel, serial);
}

#[test]
fn test_add_all_combinations() {
    let harness = cpu_harness();
    for element in ElementType::ALL {
        for (ta, tb) in itertools::iproduct!(Transform::ALL, Transform::ALL) {
            dbg!(element, ta, tb);
            let case = Case::new(Operation::Add, element)
                .format(SparseFormat::Csc)
                .rhs_format(SparseFormat::Coo)
                .transforms(&[ta, tb])
                .dims(6, 4, 1);
            assert_eq!(harness.run_case(&case), Ok(Verdict::Passed));
        }
    }
}

#[test]
fn test_geam_linearity() {
    let harness = cpu_harness();
    for element in ElementType::ALL {
        for seed in [1, 2, 3] {
            dbg!(element, seed);
            let case = Case::new(Operation::Geam, element)
                .format(SparseFormat::Csr)
                .density(0.5)
                .seed(seed);
            assert_eq!(harness.run_case(&case), Ok(Verdict::Passed));
        }
    }
}

#[test]
fn test_axpby_scenario() {
    let harness = cpu_harness();
    for density in [0.3, 0.7] {
        for seed in 0..8 {
            dbg!(density, seed);
            let case = Case::new(Operation::Axpby, ElementType::F64)
                .dims(10, 10, 10)
                .density(density)
                .seed(seed);
            assert_eq!(harness.run_case(&case), Ok(Verdict::Passed));
        }
    }
}

#[test]
fn test_mm_empty_rhs_scenario() {
    let harness = cpu_harness();
    let case = Case::new(Operation::MatMat, ElementType::F32)
        .format(SparseFormat::Csr)
        .dims(10, 0, 10);
    assert_eq!(harness.run_case(&case), Ok(Verdict::Passed));

    let mut rng = StdRng::seed_from_u64(3);
    let a = SparseMatrix::from_dense(&DenseMatrix::<f32>::random(&mut rng, 10, 10, 0.5), SparseFormat::Csr).unwrap();
    let b = DenseMatrix::<f32>::zeros(10, 0);
    let mut c = DenseMatrix::<f32>::zeros(10, 0);
    CpuSparse::new()
        .mm(1.0, &a, Transform::Identity, Structure::General, &b, Transform::Identity, 0.5, &mut c)
        .unwrap();
    assert_eq!(c.shape(), (10, 0));
    assert_eq!(c, DenseMatrix::zeros(10, 0));
}

#[test]
fn test_add_diagonal_keeps_format() {
    let cpu = CpuSparse::new();
    let mut rng = StdRng::seed_from_u64(11);
    for format in [SparseFormat::Csr, SparseFormat::Csc] {
        for n in [1, 10, 100] {
            dbg!(format, n);
            let dense = DenseMatrix::<Complex64>::random(&mut rng, n, n, 0.2);
            let a = cpu.from_dense(&dense, format).unwrap();
            let sum = cpu.add_diagonal(&a, &vec![Complex64::new(1.0, -1.0); n]).unwrap();
            assert_eq!(sum.format(), format);
        }
    }
}

#[test]
fn test_dot_symmetry() {
    let cpu = CpuSparse::new();
    let mut rng = StdRng::seed_from_u64(5);
    for n in [10, 100, 1000] {
        dbg!(n);
        let x = SparseVector::from_dense(&DenseMatrix::<Complex64>::random(&mut rng, n, 1, 0.3).into_vec());
        let y = DenseMatrix::<Complex64>::random(&mut rng, n, 1, 1.0).into_vec();
        let xy = cpu.dot(&x, &y).unwrap();
        let yx = cpu.dot_rev(&y, &x).unwrap();
        assert!((xy - yx.conj()).norm() <= 1e-10 * xy.norm().max(1.0));
    }
}

#[test]
fn test_triangular_solves() {
    let harness = cpu_harness();
    for op in [Operation::TriSolveVec, Operation::TriSolveMat] {
        for (element, tri, ta) in itertools::iproduct!(ElementType::ALL, Triangle::ALL, Transform::ALL) {
            dbg!(op, element, tri, ta);
            let case = Case::new(op, element)
                .format(SparseFormat::Csr)
                .transforms(&[ta])
                .variant(Variant::Triangle(tri))
                .dims(10, 3, 10);
            assert_eq!(harness.run_case(&case), Ok(Verdict::Passed));
        }
    }
}

#[test]
fn test_legacy_capabilities_skip() {
    init_logger();
    let harness = Harness::new(DenseOracle::new(), CpuSparse::with_capabilities(Capabilities::legacy()));
    let adjoint = Case::new(Operation::TriSolveVec, ElementType::C64)
        .format(SparseFormat::Csr)
        .transforms(&[Transform::Adjoint]);
    assert!(matches!(harness.run_case(&adjoint), Ok(Verdict::Skipped(_))));
    let coo = Case::new(Operation::TriSolveMat, ElementType::F64).format(SparseFormat::Coo);
    assert!(matches!(harness.run_case(&coo), Ok(Verdict::Skipped(_))));

    let report = harness.sweep(&SweepSpec::full().operations(&[Operation::TriSolveVec, Operation::MatMat]));
    assert!(report.skipped() > 0);
    assert!(report.passed() > 0);
    assert_eq!(report.failed(), 0);
}

#[test]
fn test_inapplicable_cases_skip() {
    let harness = cpu_harness();
    let odd = Case::new(Operation::MatVec, ElementType::F32)
        .format(SparseFormat::Bsr(2))
        .dims(9, 8, 8);
    assert!(matches!(harness.run_case(&odd), Ok(Verdict::Skipped(_))));
    let arity = Case::new(Operation::Add, ElementType::F32).transforms(&[Transform::Identity]);
    assert!(matches!(harness.run_case(&arity), Ok(Verdict::Skipped(_))));
    let rectangular = Case::new(Operation::MatVec, ElementType::F64)
        .variant(Variant::Symmetric(Uplo::Lower))
        .dims(10, 8, 8);
    assert!(matches!(harness.run_case(&rectangular), Ok(Verdict::Skipped(_))));
}

#[test]
fn test_faulty_subject_reported() {
    init_logger();
    let skewed = Harness::new(DenseOracle::new(), Faulty::new(Fault::SkewedMv));
    let case = Case::new(Operation::MatVec, ElementType::F64).format(SparseFormat::Coo);
    let report = skewed.run_case(&case).unwrap_err();
    assert!(matches!(report.kind, MismatchKind::Numerical { check: "mv", .. }));
    assert_eq!(report.operation(), Operation::MatVec);
    // Replaying the same case reproduces the same report
    assert_eq!(skewed.run_case(&report.case), Err(report.clone()));

    let csr_add = Harness::new(DenseOracle::new(), Faulty::new(Fault::CsrAdd));
    let case = Case::new(Operation::Add, ElementType::F32)
        .format(SparseFormat::Csc)
        .transforms(&[Transform::Identity, Transform::Identity]);
    let report = csr_add.run_case(&case).unwrap_err();
    assert_eq!(
        report.kind,
        MismatchKind::Structural {
            expected: "CSC".to_string(),
            actual: "CSR".to_string()
        }
    );

    let panicking = Harness::new(DenseOracle::new(), Faulty::new(Fault::PanickingDot));
    let report = panicking
        .run_case(&Case::new(Operation::Dot, ElementType::C32))
        .unwrap_err();
    assert!(matches!(report.kind, MismatchKind::Provider(ref msg) if msg.contains("exploded")));
}

#[test]
fn test_erroring_subject_reported() {
    init_logger();
    let failing = Harness::new(DenseOracle::new(), Faulty::new(Fault::FailingSv));
    for element in ElementType::ALL {
        dbg!(element);
        let case = Case::new(Operation::TriSolveVec, element).format(SparseFormat::Csc);
        let report = failing.run_case(&case).unwrap_err();
        assert_eq!(report.operation(), Operation::TriSolveVec);
        assert!(matches!(report.kind, MismatchKind::Provider(ref msg) if msg.contains("zero pivot")));
    }
    // The matrix variant goes through sm and is unaffected
    let sm = Case::new(Operation::TriSolveMat, ElementType::F64);
    assert_eq!(failing.run_case(&sm), Ok(Verdict::Passed));

    let refusing = Harness::new(DenseOracle::new(), Faulty::new(Fault::RefusingMm));
    let case = Case::new(Operation::MatMat, ElementType::C64).format(SparseFormat::Coo);
    let report = refusing.run_case(&case).unwrap_err();
    assert!(matches!(
        report.kind,
        MismatchKind::Provider(ref msg) if msg.contains("refused a declared capability")
    ));

    let report = refusing.sweep(&SweepSpec::full().operations(&[Operation::MatMat, Operation::Dot]));
    assert!(report.failed() > 0);
    assert_eq!(report.skipped() + report.failed() + report.passed(), report.outcomes.len());
    assert!(report
        .failures()
        .iter()
        .all(|f| matches!(f.kind, MismatchKind::Provider(_)) && f.operation() == Operation::MatMat));
}

#[test]
fn test_sweep_collects_all_failures() {
    init_logger();
    let harness = Harness::new(DenseOracle::new(), Faulty::new(Fault::SkewedMv));
    let spec = SweepSpec::full().operations(&[Operation::MatVec, Operation::Axpby]);
    let report = harness.sweep(&spec);
    let mv_cases = report
        .outcomes
        .iter()
        .filter(|o| o.case.operation == Operation::MatVec && !matches!(o.outcome, Outcome::Skipped(_)))
        .count();
    assert!(report.failed() > 1);
    assert!(report.failed() <= mv_cases);
    // Axpby is untouched by the fault
    assert!(report
        .outcomes
        .iter()
        .filter(|o| o.case.operation == Operation::Axpby)
        .all(|o| o.outcome == Outcome::Passed));
    let failures = report.into_result().unwrap_err();
    assert!(failures.iter().all(|f| f.operation() == Operation::MatVec));
}

#[test]
fn test_max_failures_cancels() {
    init_logger();
    let config = HarnessConfig::default().serial().with_max_failures(1);
    let harness = Harness::with_config(DenseOracle::new(), Faulty::new(Fault::SkewedMv), config);
    let report = harness.sweep(&SweepSpec::full().operations(&[Operation::MatVec]));
    assert_eq!(report.failed(), 1);
    assert!(report.cancelled() > 0);
}

#[test]
fn test_gpu() {
    init_logger();
    let gpu = match GpuSubject::new_blocking() {
        Ok(gpu) => gpu,
        Err(err) => {
            eprintln!("skipping device test: {}", err);
            return;
        }
    };
    let harness = Harness::with_config(DenseOracle::new(), gpu, HarnessConfig::default().serial());
    for n in [10, 100, 1000] {
        dbg!(n);
        let case = Case::new(Operation::MatVec, ElementType::F32)
            .format(SparseFormat::Csr)
            .dims(n, n, n)
            .density(0.1);
        assert_eq!(harness.run_case(&case), Ok(Verdict::Passed));
    }
    let report = harness.sweep(&SweepSpec::full());
    assert!(report.passed() > 0);
    assert_eq!(report.failed(), 0);
}

proptest! {
    #[test]
    fn prop_formats_preserve_values(
        nrows in 0usize..9,
        ncols in 0usize..9,
        density in 0.05f64..1.0,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let dense = DenseMatrix::<f64>::random(&mut rng, nrows, ncols, density);
        for format in [SparseFormat::Csr, SparseFormat::Csc, SparseFormat::Coo, SparseFormat::Bsr(1), SparseFormat::Bsr(2)] {
            if !format.admits(nrows, ncols) {
                prop_assert!(SparseMatrix::from_dense(&dense, format).is_err());
                continue;
            }
            let sparse = SparseMatrix::from_dense(&dense, format).unwrap();
            prop_assert!(sparse.validate().is_ok());
            prop_assert_eq!(sparse.format(), format);
            prop_assert_eq!(sparse.to_dense(), dense.clone());
            let csr = sparse.convert(SparseFormat::Csr).unwrap();
            prop_assert!(csr.validate().is_ok());
            prop_assert_eq!(csr.to_dense(), dense.clone());
        }
    }
}
