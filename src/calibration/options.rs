//! calibration::options — numeric knobs for the calibration solvers.
//!
//! Purpose
//! -------
//! Collect the configuration of a calibration call in one validated
//! carrier, [`CalibOptions`]: iteration budget, convergence tolerance,
//! bound-search precision, penalized-calibration controls (cost scaling,
//! ridge strength, reweighting gap), bound-search strategy, and a verbosity
//! flag for stderr diagnostics.
//!
//! Key behaviors
//! -------------
//! - Provide the engine defaults (`max_iter = 2500`, `tolerance = 1e-6`,
//!   `precision_bounds = 1e-4`, `u_cost_penalized = 1.0`) via `Default`.
//! - Reject out-of-range knobs up front through [`CalibOptions::validate`],
//!   so the solvers never iterate on a malformed configuration.
//!
//! Invariants & assumptions
//! ------------------------
//! - After `validate` succeeds: `max_iter ≥ 1`, `tolerance > 0`,
//!   `precision_bounds > 0`, `u_cost_penalized > 0`, and any supplied
//!   `lambda`/`gap` is strictly positive and finite.
//! - Fields are plain data; cross-method checks (e.g. gap/λ requirements of
//!   the penalized solver) live with the solver that owns them.
//!
//! Downstream usage
//! ----------------
//! - Built once per call (typically from `CalibOptions::default()` with a
//!   few fields overridden) and passed by reference to
//!   `calibration::calibrate` and the individual solvers.
//!
//! Testing notes
//! -------------
//! - Unit tests cover the default values and every rejection branch of
//!   `validate`.
use crate::calibration::bounds::BoundsStrategy;
use crate::calibration::errors::{CalibError, CalibResult};

/// Default Newton/search iteration budget.
pub const DEFAULT_MAX_ITER: usize = 2500;
/// Default relative-residual convergence tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;
/// Default precision of the bound and λ searches.
pub const DEFAULT_PRECISION_BOUNDS: f64 = 1e-4;
/// Default uniform scaling of finite penalization costs.
pub const DEFAULT_U_COST_PENALIZED: f64 = 1.0;

/// CalibOptions — numeric knobs for one calibration call.
///
/// Fields
/// ------
/// - `max_iter`: Newton/search iteration budget (default 2500).
/// - `tolerance`: relative-residual convergence tolerance (default 1e-6).
/// - `precision_bounds`: width below which the bisection bracket (bound
///   search) or the log-λ bracket (penalized search) is considered
///   resolved (default 1e-4).
/// - `u_cost_penalized`: uniform multiplier applied to all finite
///   penalization costs before use (default 1.0).
/// - `lambda`: optional ridge strength; when set together with a `gap`, it
///   anchors and narrows the λ search region instead of replacing it.
/// - `gap`: optional maximum allowed `max|g − 1|` for the penalized solver.
/// - `bounds_strategy`: how the tight-bounds solver picks between bisection
///   and the LP reformulation (default [`BoundsStrategy::Auto`]).
/// - `verbose`: when true, per-iteration residual diagnostics are printed
///   to stderr.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibOptions {
    pub max_iter: usize,
    pub tolerance: f64,
    pub precision_bounds: f64,
    pub u_cost_penalized: f64,
    pub lambda: Option<f64>,
    pub gap: Option<f64>,
    pub bounds_strategy: BoundsStrategy,
    pub verbose: bool,
}

impl Default for CalibOptions {
    fn default() -> Self {
        CalibOptions {
            max_iter: DEFAULT_MAX_ITER,
            tolerance: DEFAULT_TOLERANCE,
            precision_bounds: DEFAULT_PRECISION_BOUNDS,
            u_cost_penalized: DEFAULT_U_COST_PENALIZED,
            lambda: None,
            gap: None,
            bounds_strategy: BoundsStrategy::Auto,
            verbose: false,
        }
    }
}

impl CalibOptions {
    /// Check every knob against its admissible range.
    ///
    /// Returns
    /// -------
    /// `CalibResult<()>`
    ///   `Ok(())` when all knobs are admissible, otherwise the first
    ///   `CalibError::InvalidOption` encountered.
    ///
    /// Errors
    /// ------
    /// - `InvalidOption` for `max_iter == 0`, non-positive or non-finite
    ///   `tolerance` / `precision_bounds` / `u_cost_penalized`, and any
    ///   supplied `lambda` or `gap` that is not strictly positive and
    ///   finite.
    pub fn validate(&self) -> CalibResult<()> {
        if self.max_iter == 0 {
            return Err(CalibError::InvalidOption {
                name: "max_iter",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        for (name, value) in [
            ("tolerance", self.tolerance),
            ("precision_bounds", self.precision_bounds),
            ("u_cost_penalized", self.u_cost_penalized),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(CalibError::InvalidOption {
                    name,
                    value,
                    reason: "must be strictly positive and finite",
                });
            }
        }
        if let Some(lambda) = self.lambda {
            if !lambda.is_finite() || lambda <= 0.0 {
                return Err(CalibError::InvalidOption {
                    name: "lambda",
                    value: lambda,
                    reason: "must be strictly positive and finite",
                });
            }
        }
        if let Some(gap) = self.gap {
            if !gap.is_finite() || gap <= 0.0 {
                return Err(CalibError::InvalidOption {
                    name: "gap",
                    value: gap,
                    reason: "must be strictly positive and finite",
                });
            }
        }
        Ok(())
    }
}
