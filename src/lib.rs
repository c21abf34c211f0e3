//! rust_calibration — survey-weight calibration with Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that
//! exposes the calibration engine to Python via the `_rust_calibration`
//! extension module. When the `python-bindings` feature is enabled, this
//! module defines the Python-facing functions and result class used by the
//! `rust_calibration` package.
//!
//! Key behaviors
//! -------------
//! - Re-export the core Rust modules (`calibration`, `margins`, `report`)
//!   as the public crate surface.
//! - Define the `#[pyclass]` result wrapper and the `#[pymodule]`
//!   initializer for the `_rust_calibration` Python extension.
//! - Offer two Python entry points: `calibrate` on a pre-built design
//!   matrix, and `calibrate_table` on raw data columns plus a margin
//!   specification table.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work is implemented in the inner Rust modules; this
//!   file performs only FFI glue, input conversion, and error mapping.
//! - The Python-visible result mirrors [`calibration::CalibOutcome`] plus
//!   the descriptive summaries from [`report`].
//!
//! Conventions
//! -----------
//! - Errors from core Rust code are propagated as [`CalibError`] values
//!   internally and converted to Python `ValueError`s at the PyO3
//!   boundary.
//! - The ridge strength keyword is spelled `lambda_` on the Python side
//!   (`lambda` is reserved).
//!
//! Downstream usage
//! ----------------
//! - Native Rust code should depend directly on the inner modules and can
//!   ignore the PyO3 items guarded by the `python-bindings` feature.
//! - The Python packaging layer imports the `_rust_calibration` module
//!   defined here and wraps it in a user-facing API.
//!
//! Testing notes
//! -------------
//! - Core numerical behavior is covered by unit tests in the inner modules
//!   and by the Rust integration suite; binding smoke tests live on the
//!   Python side.

pub mod calibration;
pub mod margins;
pub mod report;
pub mod utils;

#[cfg(feature = "python-bindings")]
use pyo3::{prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    calibration::{calibrate as run_calibration, CalibOutcome, CalibProblem},
    margins::{build_problem, column_labels, MarginSpec},
    report::{margin_stats, weight_summary, MarginStat},
    utils::{extract_f64_matrix, extract_method, extract_options, owned_f64_vector},
};

/// CalibrationResult — Python-facing result of one calibration run.
///
/// Purpose
/// -------
/// Present the reweighting factors, the method-specific extras (bound
/// interval, ridge strength), and the descriptive before/after summaries
/// to Python code in a lightweight, read-only wrapper.
///
/// Fields
/// ------
/// - `outcome`: [`CalibOutcome`]
///   Factors, bounds, λ, iteration count, and warnings.
/// - `stats`: per-margin target/before/after rows from
///   [`report::margin_stats`].
/// - `summary`: factor distribution summary from
///   [`report::weight_summary`].
///
/// Notes
/// -----
/// - Instances are constructed internally by `calibrate` and
///   `calibrate_table`; native Rust callers should use
///   [`calibration::calibrate`] directly.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_calibration")]
pub struct CalibrationResult {
    outcome: CalibOutcome,
    stats: Vec<MarginStat>,
    summary: Option<report::WeightSummary>,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl CalibrationResult {
    /// Reweighting factors, one per sample unit.
    #[getter]
    pub fn g(&self) -> Vec<f64> {
        self.outcome.g.to_vec()
    }

    /// Bound interval in effect, if the method had one.
    #[getter]
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.outcome.bounds
    }

    /// Ridge strength actually used (penalized method only).
    #[getter]
    pub fn lambda_used(&self) -> Option<f64> {
        self.outcome.lambda
    }

    /// Newton iterations of the final solve.
    #[getter]
    pub fn iterations(&self) -> usize {
        self.outcome.iterations
    }

    /// Non-fatal warnings raised along the way, as strings.
    #[getter]
    pub fn warnings(&self) -> Vec<String> {
        self.outcome.warnings.iter().map(|w| w.to_string()).collect()
    }

    /// Per-margin rows `(label, target, before, after)`.
    #[getter]
    pub fn margin_report(&self) -> Vec<(String, f64, f64, f64)> {
        self.stats
            .iter()
            .map(|s| (s.label.clone(), s.target, s.before, s.after))
            .collect()
    }

    /// Factor distribution `(min, q1, median, q3, max, mean)`.
    #[getter]
    pub fn weight_summary(&self) -> Option<(f64, f64, f64, f64, f64, f64)> {
        self.summary.map(|s| (s.min, s.q1, s.median, s.q3, s.max, s.mean))
    }
}

#[cfg(feature = "python-bindings")]
fn wrap_result(
    problem: &CalibProblem, outcome: CalibOutcome, labels: Option<&[String]>,
) -> PyResult<CalibrationResult> {
    let stats = margin_stats(problem, &outcome.g, labels)?;
    let summary = weight_summary(&outcome.g);
    Ok(CalibrationResult { outcome, stats, summary })
}

/// Calibrate on a pre-built design matrix.
///
/// Parameters mirror the Rust API: `x` is the 2-D design matrix, `d` the
/// initial weights, `total` the target margins; `method` selects the
/// distance family or meta-method, with `lower`/`upper` for logit,
/// `costs`/`lambda_`/`gap` for penalized, and the `force_*` flags for the
/// bound search.
#[cfg(feature = "python-bindings")]
#[pyfunction]
#[pyo3(
    signature = (
        x,
        d,
        total,
        method = None,
        q = None,
        lower = None,
        upper = None,
        costs = None,
        lambda_ = None,
        gap = None,
        max_iter = None,
        tolerance = None,
        precision_bounds = None,
        u_cost_penalized = None,
        force_simplex = false,
        force_bisection = false,
        verbose = false,
    ),
    text_signature = "(x, d, total, /, method='linear', q=None, lower=None, upper=None, \
                      costs=None, lambda_=None, gap=None, max_iter=None, tolerance=None, \
                      precision_bounds=None, u_cost_penalized=None, force_simplex=False, \
                      force_bisection=False, verbose=False)"
)]
#[allow(clippy::too_many_arguments)]
pub fn calibrate<'py>(
    py: Python<'py>, x: &Bound<'py, PyAny>, d: &Bound<'py, PyAny>, total: &Bound<'py, PyAny>,
    method: Option<&str>, q: Option<&Bound<'py, PyAny>>, lower: Option<f64>, upper: Option<f64>,
    costs: Option<Vec<f64>>, lambda_: Option<f64>, gap: Option<f64>, max_iter: Option<usize>,
    tolerance: Option<f64>, precision_bounds: Option<f64>, u_cost_penalized: Option<f64>,
    force_simplex: bool, force_bisection: bool, verbose: bool,
) -> PyResult<CalibrationResult> {
    let x = extract_f64_matrix(py, x)?;
    let d = owned_f64_vector(py, d, "d")?;
    let total = owned_f64_vector(py, total, "total")?;
    let q = q.map(|q| owned_f64_vector(py, q, "q")).transpose()?;

    let problem = CalibProblem::new(x, d, total, q)?;
    let method = extract_method(method, lower, upper, costs, problem.n_margins())?;
    let options = extract_options(
        max_iter,
        tolerance,
        precision_bounds,
        u_cost_penalized,
        lambda_,
        gap,
        force_simplex,
        force_bisection,
        verbose,
    )?;

    let outcome = run_calibration(&problem, &method, &options)?;
    wrap_result(&problem, outcome, None)
}

/// Calibrate on raw data columns plus a margin specification table.
///
/// Each spec is a `(name, modalities, totals)` tuple: `modalities == 0`
/// marks a continuous variable with one absolute total, `modalities == m`
/// a coded categorical variable with m per-modality targets (absolute, or
/// shares converted with `pop_total`).
#[cfg(feature = "python-bindings")]
#[pyfunction]
#[pyo3(
    signature = (
        data,
        specs,
        d,
        pop_total = None,
        method = None,
        lower = None,
        upper = None,
        costs = None,
        lambda_ = None,
        gap = None,
        max_iter = None,
        tolerance = None,
        precision_bounds = None,
        u_cost_penalized = None,
        force_simplex = false,
        force_bisection = false,
        verbose = false,
    ),
    text_signature = "(data, specs, d, /, pop_total=None, method='linear', lower=None, \
                      upper=None, costs=None, lambda_=None, gap=None, max_iter=None, \
                      tolerance=None, precision_bounds=None, u_cost_penalized=None, \
                      force_simplex=False, force_bisection=False, verbose=False)"
)]
#[allow(clippy::too_many_arguments)]
pub fn calibrate_table<'py>(
    py: Python<'py>, data: &Bound<'py, PyAny>, specs: Vec<(String, usize, Vec<f64>)>,
    d: &Bound<'py, PyAny>, pop_total: Option<f64>, method: Option<&str>, lower: Option<f64>,
    upper: Option<f64>, costs: Option<Vec<f64>>, lambda_: Option<f64>, gap: Option<f64>,
    max_iter: Option<usize>, tolerance: Option<f64>, precision_bounds: Option<f64>,
    u_cost_penalized: Option<f64>, force_simplex: bool, force_bisection: bool, verbose: bool,
) -> PyResult<CalibrationResult> {
    let data = extract_f64_matrix(py, data)?;
    let d = owned_f64_vector(py, d, "d")?;
    let specs: Vec<MarginSpec> = specs
        .into_iter()
        .map(|(name, modalities, totals)| MarginSpec { name, modalities, totals })
        .collect();

    let options = extract_options(
        max_iter,
        tolerance,
        precision_bounds,
        u_cost_penalized,
        lambda_,
        gap,
        force_simplex,
        force_bisection,
        verbose,
    )?;
    let (problem, build_warnings) = build_problem(&data, &specs, d, pop_total, &options)?;
    let method = extract_method(method, lower, upper, costs, problem.n_margins())?;

    let mut outcome = run_calibration(&problem, &method, &options)?;
    outcome.warnings.splice(0..0, build_warnings);

    let labels = column_labels(&specs);
    wrap_result(&problem, outcome, Some(&labels))
}

/// _rust_calibration — PyO3 module initializer for the Python extension.
///
/// Registers the calibration entry points and the result class; invoked
/// automatically by Python when importing the compiled extension.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _rust_calibration<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    m.add_class::<CalibrationResult>()?;
    m.add_function(wrap_pyfunction!(calibrate, m)?)?;
    m.add_function(wrap_pyfunction!(calibrate_table, m)?)?;
    Ok(())
}
