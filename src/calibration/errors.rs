//! Errors for the calibration engine (input validation, solver convergence,
//! bound search, and linear-programming feasibility).
//!
//! This module defines the engine-wide error type, [`CalibError`], the
//! non-fatal warning type, [`CalibWarning`], and the crate-wide result alias
//! [`CalibResult`]. Both types implement `Display`/`Error` and convert to
//! `PyErr` for PyO3.
//!
//! ## Conventions
//! - **Indices are 0-based** (rows = sample units, columns = margins).
//! - Configuration errors are detectable before any iteration starts and are
//!   surfaced immediately; no partial computation is attempted.
//! - Convergence failures (`ConvergenceFailure`, `BoundSearchExhausted`) are
//!   reported distinctly from structural infeasibility (`LpInfeasible`) so
//!   that callers know whether retrying with a larger budget can help.
//! - Warnings never abort a computation; they are collected on the outcome.
#[cfg(feature = "python-bindings")]
use pyo3::exceptions::PyValueError;
#[cfg(feature = "python-bindings")]
use pyo3::prelude::*;

/// Crate-wide result alias for calibration operations that may produce
/// [`CalibError`].
pub type CalibResult<T> = Result<T, CalibError>;

/// Unified error type for the calibration engine.
///
/// Covers input/configuration validation, Newton-Raphson convergence,
/// bound-search exhaustion, and linear-program infeasibility. Implements
/// `Display`/`Error` and converts to a Python `ValueError` at PyO3
/// boundaries.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibError {
    // ---- Configuration: shapes ----
    /// Design matrix, weights, targets, or q-weights have incompatible
    /// lengths.
    DimensionMismatch { what: &'static str, expected: usize, actual: usize },

    /// The problem has zero rows or zero columns.
    EmptyProblem,

    // ---- Configuration: values ----
    /// An initial weight is not strictly positive and finite.
    NonPositiveWeight { index: usize, value: f64 },

    /// A q-weight is not strictly positive and finite.
    NonPositiveQWeight { index: usize, value: f64 },

    /// A design-matrix entry or target is NaN/±inf.
    NonFiniteEntry { what: &'static str, index: usize, value: f64 },

    /// A design-matrix column is entirely zero while its target is nonzero;
    /// the calibration equation for that margin is unsatisfiable.
    ZeroColumn { column: usize, target: f64 },

    /// Bounds must satisfy L < 1 < U with both finite (logit family).
    InvalidBounds { lower: f64, upper: f64 },

    /// Cost vector has the wrong length (must be one entry per column, or a
    /// single recycled scalar).
    InvalidCosts { expected: usize, actual: usize },

    /// A numeric option is out of its admissible range.
    InvalidOption { name: &'static str, value: f64, reason: &'static str },

    /// Mutually exclusive inputs were combined (e.g. q-weights with the
    /// penalized or min-bounds methods).
    UnsupportedCombination { reason: &'static str },

    /// Share-based margins require a population total to convert to
    /// absolute units.
    MissingPopulationTotal { margin: String },

    /// A categorical data column holds a code outside `0..modalities`.
    InvalidCategoryCode { margin: String, row: usize, code: f64 },

    // ---- Solver outcomes ----
    /// The Newton-Raphson loop exhausted its iteration budget without
    /// reaching tolerance.
    ConvergenceFailure { iterations: usize },

    /// The Newton system could not be solved and step-halving did not route
    /// around it.
    SingularSystem { iteration: usize },

    /// No symmetric bound below 1 admits a bounded solution.
    BoundSearchExhausted,

    /// The tight-bounds linear program has no feasible region; retrying with
    /// a larger iteration budget cannot help.
    LpInfeasible,

    /// The LP backend failed for a reason other than infeasibility.
    LpBackend { status: String },
}

impl std::error::Error for CalibError {}

impl std::fmt::Display for CalibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Configuration: shapes ----
            CalibError::DimensionMismatch { what, expected, actual } => {
                write!(f, "Dimension mismatch for {what}: expected {expected}, got {actual}")
            }
            CalibError::EmptyProblem => {
                write!(f, "Calibration problem has no rows or no columns.")
            }
            // ---- Configuration: values ----
            CalibError::NonPositiveWeight { index, value } => {
                write!(
                    f,
                    "Initial weight at index {index} must be strictly positive and finite; got {value}"
                )
            }
            CalibError::NonPositiveQWeight { index, value } => {
                write!(
                    f,
                    "q-weight at index {index} must be strictly positive and finite; got {value}"
                )
            }
            CalibError::NonFiniteEntry { what, index, value } => {
                write!(f, "Non-finite {what} at index {index}: {value}")
            }
            CalibError::ZeroColumn { column, target } => {
                write!(
                    f,
                    "Column {column} of the design matrix is entirely zero but its target is {target}; the margin is unsatisfiable"
                )
            }
            CalibError::InvalidBounds { lower, upper } => {
                write!(f, "Bounds must satisfy L < 1 < U with both finite; got ({lower}, {upper})")
            }
            CalibError::InvalidCosts { expected, actual } => {
                write!(
                    f,
                    "Cost vector must have one entry per margin column ({expected}) or a single scalar; got {actual}"
                )
            }
            CalibError::InvalidOption { name, value, reason } => {
                write!(f, "Invalid option {name} = {value}: {reason}")
            }
            CalibError::UnsupportedCombination { reason } => {
                write!(f, "Unsupported input combination: {reason}")
            }
            CalibError::MissingPopulationTotal { margin } => {
                write!(
                    f,
                    "Margin '{margin}' is expressed in population shares but no population total was supplied"
                )
            }
            CalibError::InvalidCategoryCode { margin, row, code } => {
                write!(
                    f,
                    "Margin '{margin}': row {row} holds code {code}, outside the declared modalities"
                )
            }
            // ---- Solver outcomes ----
            CalibError::ConvergenceFailure { iterations } => {
                write!(f, "Calibration did not converge within {iterations} iterations")
            }
            CalibError::SingularSystem { iteration } => {
                write!(f, "Newton system is singular at iteration {iteration}")
            }
            CalibError::BoundSearchExhausted => {
                write!(f, "No symmetric bound interval below (0, 2) admits a bounded solution")
            }
            CalibError::LpInfeasible => {
                write!(f, "Tight-bounds linear program is infeasible")
            }
            CalibError::LpBackend { status } => {
                write!(f, "LP backend failed: {status}")
            }
        }
    }
}

/// Convert a [`CalibError`] into a Python `ValueError` with the error
/// message.
///
/// This is used at the Rust↔Python boundary to surface domain errors
/// cleanly.
#[cfg(feature = "python-bindings")]
impl std::convert::From<CalibError> for PyErr {
    fn from(err: CalibError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// Non-fatal diagnostics about a risky but admissible configuration.
///
/// Warnings are collected on the calibration outcome; computation proceeds.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibWarning {
    /// The requested configuration may not converge or may not mean what the
    /// caller expects (e.g. a gap constraint without a population total, a
    /// user-supplied λ narrowing the search region, or a forced LP above the
    /// size cap falling back to bisection).
    RiskyConfiguration { reason: String },
}

impl std::fmt::Display for CalibWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibWarning::RiskyConfiguration { reason } => {
                write!(f, "Risky configuration: {reason}")
            }
        }
    }
}
