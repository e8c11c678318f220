//! Error types raised by providers and harness plumbing

use crate::scalar::ElementType;
use thiserror::Error;

/// Result type alias using the crate's [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors a provider (or the harness setup) can raise
#[derive(Error, Debug)]
pub enum Error {
    /// The provider does not implement this combination
    #[error("{provider} does not support {operation} for {element}: {reason}")]
    Unsupported {
        /// Provider name
        provider: &'static str,
        /// Operation being attempted
        operation: &'static str,
        /// Element type of the operands
        element: ElementType,
        /// Why it is unsupported
        reason: String,
    },

    /// Operand shapes are incompatible
    #[error("Shape mismatch in {op}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Operation name
        op: &'static str,
        /// Expected (rows, cols)
        expected: (usize, usize),
        /// Actual (rows, cols)
        got: (usize, usize),
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Sparse storage violates a format invariant
    #[error("Invalid {format} structure: {reason}")]
    InvalidStructure {
        /// Format name
        format: String,
        /// Violated invariant
        reason: String,
    },

    /// Triangular solve hit a zero pivot
    #[error("Singular triangular matrix: zero pivot in row {row}")]
    Singular {
        /// Row of the missing or zero diagonal entry
        row: usize,
    },

    /// No GPU adapter could be acquired
    #[error("No compatible GPU adapter found")]
    NoAdapter,

    /// GPU device error
    #[error("Device error: {0}")]
    Device(String),

    /// Malformed configuration value
    #[error("Invalid configuration {key}={value}: {reason}")]
    Config {
        /// Environment key
        key: &'static str,
        /// Raw value
        value: String,
        /// Parse failure
        reason: String,
    },
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_arg(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Returns true if this error is an up-front "not supported" answer
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }
}

impl From<wgpu::RequestDeviceError> for Error {
    fn from(err: wgpu::RequestDeviceError) -> Self {
        Error::Device(err.to_string())
    }
}
