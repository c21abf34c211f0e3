//! calibration::penalized — ridge-relaxed calibration with per-margin costs.
//!
//! Purpose
//! -------
//! Relax exact margin-matching by trading the distance between `g` and 1
//! against margin violations weighted by per-variable costs. The dual of
//! the relaxed problem is the ordinary Newton system augmented with a
//! ridge term: residual `Xᵀ(d ⊙ F(q ⊙ Xv)) + λ·c⁻¹ ⊙ v − total` and
//! Jacobian `Xᵀ diag(d ⊙ q ⊙ F′) X + λ·diag(c⁻¹)`, so the machinery in
//! `solver` is reused verbatim and the solver reduces to the unpenalized
//! one as λ → 0.
//!
//! Key behaviors
//! -------------
//! - **Cost semantics**: larger finite cost ⇒ stricter enforcement of that
//!   margin; infinite cost (and any negative or non-finite user entry) ⇒
//!   inverse cost 0 ⇒ the margin is *exactly* enforced regardless of λ;
//!   **zero cost ⇒ maximum relief**: the margin is dropped from the system
//!   entirely. All finite costs are first scaled by `u_cost_penalized`.
//! - **λ search**: when `gap` is set, find the smallest λ whose solution
//!   satisfies `max_k |g_k − 1| ≤ gap` (feasibility is monotone
//!   non-decreasing in λ) by log-scale bisection over a default range of
//!   [1e−8, 1e12]. A user-supplied λ does not bypass the search; it
//!   anchors and *narrows* the region to [λ/1e3, λ·1e3], which is why an
//!   off-target starting λ can prevent convergence — a
//!   `RiskyConfiguration` warning accompanies anchored searches.
//! - Without a `gap`, a supplied λ is used directly; supplying neither is
//!   a configuration error.
//!
//! Invariants & assumptions
//! ------------------------
//! - Feasibility of the gap constraint is monotone in λ: growing λ shrinks
//!   `max|g − 1|`, so the located λ is never below the minimal feasible one
//!   by more than the search precision (relative, on the log scale).
//! - q-weights are not supported in combination with penalized
//!   calibration.
//! - Margins with infinite cost keep residuals within the solver tolerance
//!   for every λ.
//!
//! Downstream usage
//! ----------------
//! - Invoked by `calibration::calibrate` for the penalized method; costs
//!   usually arrive through `margins::format_costs`.
//!
//! Testing notes
//! -------------
//! - Unit tests cover the λ → 0 limit (for the one-step linear family and
//!   the iterating raking family), gap monotonicity in λ, the
//!   infinite-cost (negative entry) exact-enforcement guarantee, zero-cost
//!   exclusion, the λ search under a gap, and the configuration
//!   rejections.
use ndarray::{Array1, Array2};

use crate::calibration::distance::DistanceFn;
use crate::calibration::errors::{CalibError, CalibResult, CalibWarning};
use crate::calibration::options::CalibOptions;
use crate::calibration::problem::CalibProblem;
use crate::calibration::search::{bisect_boundary, probe_options};
use crate::calibration::solver::{solve_with_ridge, RidgeTerm, SolverOutcome};

/// Default λ search range when no anchor is supplied.
const LAMBDA_RANGE: (f64, f64) = (1e-8, 1e12);

/// Half-width factor of the anchored search region around a user λ.
const LAMBDA_ANCHOR_FACTOR: f64 = 1e3;

/// How the ridge strength is determined: used as-is, or searched for under
/// a gap constraint (optionally anchored by a user λ).
enum Plan {
    Direct(f64),
    Search { gap: f64, anchor: Option<f64> },
}

/// Result of a penalized solve: the factors, the ridge strength actually
/// used, the final solve's iteration count, and non-fatal warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct PenalizedOutcome {
    pub g: Array1<f64>,
    pub lambda: f64,
    pub iterations: usize,
    pub warnings: Vec<CalibWarning>,
}

/// Solve the penalized calibration problem.
///
/// Parameters
/// ----------
/// - `problem`: validated inputs; must not carry custom q-weights.
/// - `distance`: distance family for the g-to-1 part of the objective
///   (linear solves in one step; raking/logit iterate).
/// - `costs`: one cost per margin column. Negative or non-finite entries
///   are treated as infinite cost (exact enforcement); zero entries drop
///   the margin.
/// - `options`: `u_cost_penalized` scales finite costs; `lambda`/`gap`
///   select direct solve vs search as described in the module docs.
///
/// Returns
/// -------
/// `CalibResult<PenalizedOutcome>`
///   Factors, effective λ, and warnings.
///
/// Errors
/// ------
/// - `CalibError::UnsupportedCombination` for custom q-weights, or when
///   neither `lambda` nor `gap` is supplied.
/// - `CalibError::InvalidCosts` when the cost vector length disagrees with
///   the margin count.
/// - `CalibError::ConvergenceFailure` when no λ in the searched region
///   meets the gap constraint, or an inner Newton solve exhausts its
///   budget.
pub fn solve_penalized(
    problem: &CalibProblem, distance: DistanceFn, costs: &Array1<f64>, options: &CalibOptions,
) -> CalibResult<PenalizedOutcome> {
    distance.validate()?;
    options.validate()?;
    if problem.has_custom_q() {
        return Err(CalibError::UnsupportedCombination {
            reason: "q-weights are not supported with penalized calibration",
        });
    }
    if costs.len() != problem.n_margins() {
        return Err(CalibError::InvalidCosts {
            expected: problem.n_margins(),
            actual: costs.len(),
        });
    }
    let plan = match (options.gap, options.lambda) {
        (None, None) => {
            return Err(CalibError::UnsupportedCombination {
                reason: "penalized calibration needs a lambda, a gap constraint, or both",
            });
        }
        (None, Some(lambda)) => Plan::Direct(lambda),
        (Some(gap), anchor) => Plan::Search { gap, anchor },
    };

    // Zero-cost margins get maximum relief: drop them from the system.
    let kept: Vec<usize> = (0..problem.n_margins()).filter(|&j| costs[j] != 0.0).collect();
    if kept.is_empty() {
        return Ok(PenalizedOutcome {
            g: Array1::ones(problem.n_units()),
            lambda: options.lambda.unwrap_or(0.0),
            iterations: 0,
            warnings: Vec::new(),
        });
    }
    let reduced;
    let active: &CalibProblem = if kept.len() == problem.n_margins() {
        problem
    } else {
        reduced = restrict_margins(problem, &kept)?;
        &reduced
    };

    let inv_cost = Array1::from_iter(kept.iter().map(|&j| {
        let cost = costs[j];
        if !cost.is_finite() || cost < 0.0 {
            0.0
        } else {
            1.0 / (options.u_cost_penalized * cost)
        }
    }));

    let probe = probe_options(options);
    let run = |lambda: f64| -> CalibResult<SolverOutcome> {
        solve_with_ridge(
            active,
            distance,
            &probe,
            Some(RidgeTerm { strength: lambda, inv_cost: &inv_cost }),
        )
    };

    let (gap, anchor) = match plan {
        // Direct solve at the supplied λ; no search.
        Plan::Direct(lambda) => {
            let outcome = run(lambda)?;
            return Ok(PenalizedOutcome {
                g: outcome.g,
                lambda,
                iterations: outcome.iterations,
                warnings: Vec::new(),
            });
        }
        Plan::Search { gap, anchor } => (gap, anchor),
    };

    let mut warnings = Vec::new();
    let (lambda_lo, lambda_hi) = match anchor {
        Some(anchor) => {
            warnings.push(CalibWarning::RiskyConfiguration {
                reason: format!(
                    "user-supplied lambda {anchor} narrows the search region to [{:e}, {:e}]; an off-target anchor can prevent convergence",
                    anchor / LAMBDA_ANCHOR_FACTOR,
                    anchor * LAMBDA_ANCHOR_FACTOR
                ),
            });
            (anchor / LAMBDA_ANCHOR_FACTOR, anchor * LAMBDA_ANCHOR_FACTOR)
        }
        None => LAMBDA_RANGE,
    };

    let feasible = |lambda: f64| -> Option<SolverOutcome> {
        run(lambda).ok().filter(|out| max_deviation(&out.g) <= gap)
    };

    // The smallest admissible λ may sit at the region's lower edge.
    if let Some(outcome) = feasible(lambda_lo) {
        return Ok(PenalizedOutcome {
            g: outcome.g,
            lambda: lambda_lo,
            iterations: outcome.iterations,
            warnings,
        });
    }
    let at_hi =
        feasible(lambda_hi).ok_or(CalibError::ConvergenceFailure { iterations: options.max_iter })?;

    // Bisect on ln λ so the precision is relative on the λ scale.
    let out = bisect_boundary(
        lambda_lo.ln(),
        lambda_hi.ln(),
        at_hi,
        options.precision_bounds,
        options.max_iter,
        |t| feasible(t.exp()),
    );
    if options.verbose {
        eprintln!(
            "penalized search: lambda = {:.6e} after {} probes",
            out.boundary.exp(),
            out.steps
        );
    }
    Ok(PenalizedOutcome {
        g: out.payload.g,
        lambda: out.boundary.exp(),
        iterations: out.payload.iterations,
        warnings,
    })
}

/// Largest absolute deviation of the factors from 1.
pub(crate) fn max_deviation(g: &Array1<f64>) -> f64 {
    g.iter().map(|&v| (v - 1.0).abs()).fold(0.0, f64::max)
}

/// Problem restricted to a subset of margin columns (zero-cost exclusion).
fn restrict_margins(problem: &CalibProblem, kept: &[usize]) -> CalibResult<CalibProblem> {
    let rows = problem.n_units();
    let mut x = Array2::zeros((rows, kept.len()));
    let mut total = Array1::zeros(kept.len());
    for (slot, &j) in kept.iter().enumerate() {
        x.column_mut(slot).assign(&problem.x().column(j));
        total[slot] = problem.total()[j];
    }
    CalibProblem::new(x, problem.d().clone(), total, None)
}
