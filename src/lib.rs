//! Conformance harness for sparse linear algebra.
//!
//! A [`Subject`] is checked against a dense [`Oracle`] over the cross-product
//! of operations, element types, sparse formats and operand transforms.

pub mod config;
pub mod cpu;
pub mod dense;
pub mod error;
pub mod gpu;
pub mod harness;
pub mod oracle;
pub mod provider;
pub mod scalar;
pub mod sparse;
pub mod tolerance;

pub use config::HarnessConfig;
pub use cpu::CpuSparse;
pub use dense::{DenseMatrix, Structure, Transform, Uplo};
pub use error::{Error, Result};
pub use gpu::GpuSubject;
pub use harness::{
    Case, CaseOutcome, Dims, Harness, MismatchKind, MismatchReport, Outcome, SweepReport, SweepSpec,
    Variant, Verdict,
};
pub use oracle::DenseOracle;
pub use provider::{Capabilities, Diag, Operation, Oracle, Subject, Triangle};
pub use scalar::{ElementType, Scalar};
pub use sparse::{SparseFormat, SparseMatrix, SparseVector};
pub use tolerance::{Discrepancy, Tolerance};

#[cfg(test)]
mod tests;
