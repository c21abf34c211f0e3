//! calibration::bounds — tightest symmetric bounds admitting a solution.
//!
//! Purpose
//! -------
//! Find the smallest symmetric interval `[1−ε, 1+ε]` for which the
//! logit-bounded calibration of a problem converges, either by bisection
//! over candidate half-widths ε (feasibility is monotone in ε) or by an
//! exact linear-program reformulation solved with a simplex backend.
//!
//! Key behaviors
//! -------------
//! - **Bisection**: probe candidate ε with the logit [`solve_distance`]
//!   call as the feasibility predicate; a success tightens the upper edge
//!   of the bracket, a failure raises the lower edge; stop when the bracket
//!   is narrower than `precision_bounds`.
//! - **Linear program**: minimize ε subject to `Xᵀ(d ⊙ g) = total`,
//!   `1−ε ≤ g_k ≤ 1+ε`, `g ≥ 0`, `ε ∈ [0, 1]`. The optimum is widened by
//!   `precision_bounds` (the logit family needs strict interior room) and
//!   the final factors come from the logit solve at the widened bounds.
//! - **Strategy selection** via [`BoundsStrategy`]: `Auto` picks the LP for
//!   problems small enough to benefit ([`LP_AUTO_ELEMS`] design-matrix
//!   elements) and bisection otherwise; a forced LP above the hard
//!   [`LP_MAX_ELEMS`] cap falls back to bisection with a warning.
//!
//! Invariants & assumptions
//! ------------------------
//! - Feasibility is monotone: if ε admits a solution, so does every larger
//!   ε. The returned half-width therefore exceeds the true minimum by at
//!   most `precision_bounds` and is never below it.
//! - An infeasible LP is a structural property of the problem and is
//!   reported as [`CalibError::LpInfeasible`], distinct from numeric
//!   non-convergence, so callers do not retry with larger budgets.
//! - q-weights are not supported in combination with the bound search.
//!
//! Downstream usage
//! ----------------
//! - Invoked by `calibration::calibrate` for the min-bounds method; the
//!   legacy two-boolean interface maps through
//!   [`BoundsStrategy::from_flags`].
//!
//! Testing notes
//! -------------
//! - Unit tests pin the flag-resolution precedence (both flags set ⇒
//!   bisection), locate a known minimal ε by both strategies, drive the
//!   size-cap fallbacks through lowered caps, and check the
//!   LpInfeasible / BoundSearchExhausted failure split.
use good_lp::{
    constraint, default_solver, variable, variables, Expression, ResolutionError, Solution,
    SolverModel, Variable,
};
use ndarray::Array1;

use crate::calibration::distance::DistanceFn;
use crate::calibration::errors::{CalibError, CalibResult, CalibWarning};
use crate::calibration::options::CalibOptions;
use crate::calibration::problem::CalibProblem;
use crate::calibration::search::{bisect_boundary, probe_options};
use crate::calibration::solver::{solve_distance, SolverOutcome};

/// Element-count threshold below which `Auto` prefers the exact LP.
pub const LP_AUTO_ELEMS: usize = 1_000_000;

/// Hard element-count cap on the LP reformulation; above it even a forced
/// LP falls back to bisection.
pub const LP_MAX_ELEMS: usize = 100_000_000;

/// Largest half-width probed by the search: ε just below 1 keeps the lower
/// bound strictly positive as the logit family requires.
const EPS_CEILING: f64 = 1.0 - 1e-9;

/// How the tight-bounds solver chooses between its two strategies.
///
/// Modeled as a single enum rather than two independent booleans so the
/// ambiguous both-flags-set configuration cannot be represented; the legacy
/// flag pair maps through [`BoundsStrategy::from_flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsStrategy {
    /// LP for small problems, bisection otherwise.
    Auto,
    /// Always bisection.
    Bisection,
    /// LP whenever the problem is under the hard size cap.
    LinearProgram,
}

impl BoundsStrategy {
    /// Resolve the legacy `(force_simplex, force_bisection)` flag pair.
    ///
    /// Notes
    /// -----
    /// - When both flags are set, bisection wins: an explicit user override
    ///   of the faster default takes precedence.
    pub fn from_flags(force_simplex: bool, force_bisection: bool) -> BoundsStrategy {
        match (force_simplex, force_bisection) {
            (_, true) => BoundsStrategy::Bisection,
            (true, false) => BoundsStrategy::LinearProgram,
            (false, false) => BoundsStrategy::Auto,
        }
    }
}

/// Result of the tight-bounds search: the bound interval actually used,
/// the factors produced at it, the final solve's iteration count, and any
/// non-fatal warnings raised along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsOutcome {
    pub lower: f64,
    pub upper: f64,
    pub g: Array1<f64>,
    pub iterations: usize,
    pub warnings: Vec<CalibWarning>,
}

/// Find the tightest symmetric bounds admitting a calibration solution.
///
/// Parameters
/// ----------
/// - `problem`: validated inputs; must not carry custom q-weights.
/// - `options`: `precision_bounds` controls both the bisection bracket and
///   the LP widening; `bounds_strategy` selects the search path;
///   `max_iter` caps both the inner Newton loops and the number of
///   bisection probes.
///
/// Returns
/// -------
/// `CalibResult<BoundsOutcome>`
///   The bound interval, the factors at it, and accumulated warnings.
///
/// Errors
/// ------
/// - `CalibError::UnsupportedCombination` when the problem carries custom
///   q-weights.
/// - `CalibError::BoundSearchExhausted` when no ε below 1 converges
///   (bisection path).
/// - `CalibError::LpInfeasible` when the LP has no feasible region.
/// - `CalibError::LpBackend` for non-structural LP failures on a forced LP
///   (under `Auto` these fall back to bisection with a warning).
/// - `CalibError::ConvergenceFailure` when the logit solve at the widened
///   LP optimum still fails.
pub fn solve_min_bounds(
    problem: &CalibProblem, options: &CalibOptions,
) -> CalibResult<BoundsOutcome> {
    solve_min_bounds_with_caps(problem, options, LP_AUTO_ELEMS, LP_MAX_ELEMS)
}

/// Strategy dispatch with explicit size caps. Split out so the
/// cap-triggered fallbacks can be driven on small problems instead of
/// needing a design matrix near the real thresholds.
fn solve_min_bounds_with_caps(
    problem: &CalibProblem, options: &CalibOptions, lp_auto_elems: usize,
    lp_max_elems: usize,
) -> CalibResult<BoundsOutcome> {
    options.validate()?;
    if problem.has_custom_q() {
        return Err(CalibError::UnsupportedCombination {
            reason: "q-weights are not supported with the min-bounds method",
        });
    }

    let elems = problem.n_units() * problem.n_margins();
    match options.bounds_strategy {
        BoundsStrategy::Bisection => solve_by_bisection(problem, options, Vec::new()),
        BoundsStrategy::LinearProgram => {
            if elems > lp_max_elems {
                let warnings = vec![CalibWarning::RiskyConfiguration {
                    reason: format!(
                        "forced LP on {elems} design-matrix elements exceeds the {lp_max_elems} cap; falling back to bisection"
                    ),
                }];
                solve_by_bisection(problem, options, warnings)
            } else {
                solve_by_lp(problem, options)
            }
        }
        BoundsStrategy::Auto => {
            if elems <= lp_auto_elems {
                match solve_by_lp(problem, options) {
                    Err(CalibError::LpBackend { status }) => {
                        let warnings = vec![CalibWarning::RiskyConfiguration {
                            reason: format!("LP backend failed ({status}); falling back to bisection"),
                        }];
                        solve_by_bisection(problem, options, warnings)
                    }
                    other => other,
                }
            } else {
                solve_by_bisection(problem, options, Vec::new())
            }
        }
    }
}

/// Bisection path: monotone search over the half-width ε.
fn solve_by_bisection(
    problem: &CalibProblem, options: &CalibOptions, warnings: Vec<CalibWarning>,
) -> CalibResult<BoundsOutcome> {
    let probe = probe_options(options);
    let feasible = |eps: f64| -> Option<SolverOutcome> {
        let distance = DistanceFn::Logit { lower: 1.0 - eps, upper: 1.0 + eps };
        solve_distance(problem, distance, &probe).ok()
    };

    let widest = feasible(EPS_CEILING).ok_or(CalibError::BoundSearchExhausted)?;
    let out = bisect_boundary(
        0.0,
        EPS_CEILING,
        widest,
        options.precision_bounds,
        options.max_iter,
        feasible,
    );

    if options.verbose {
        eprintln!(
            "bounds bisection: eps = {:.6} after {} probes",
            out.boundary, out.steps
        );
    }
    Ok(BoundsOutcome {
        lower: 1.0 - out.boundary,
        upper: 1.0 + out.boundary,
        g: out.payload.g,
        iterations: out.payload.iterations,
        warnings,
    })
}

/// LP path: exact minimal ε by simplex, then a logit solve at the widened
/// optimum.
fn solve_by_lp(problem: &CalibProblem, options: &CalibOptions) -> CalibResult<BoundsOutcome> {
    let n = problem.n_units();
    let cols = problem.n_margins();

    let mut vars = variables!();
    let eps = vars.add(variable().min(0.0).max(1.0));
    let g: Vec<Variable> = (0..n).map(|_| vars.add(variable().min(0.0))).collect();

    let mut model = vars.minimise(eps).using(default_solver);
    for j in 0..cols {
        let margin: Expression = g
            .iter()
            .enumerate()
            .map(|(k, &gk)| problem.d()[k] * problem.x()[[k, j]] * gk)
            .sum();
        model = model.with(constraint!(margin == problem.total()[j]));
    }
    for &gk in &g {
        model = model.with(constraint!(gk - eps <= 1.0));
        model = model.with(constraint!(gk + eps >= 1.0));
    }

    let solution = model.solve().map_err(|err| match err {
        ResolutionError::Infeasible => CalibError::LpInfeasible,
        other => CalibError::LpBackend { status: other.to_string() },
    })?;
    let eps_star = solution.value(eps);
    if options.verbose {
        eprintln!("bounds LP: minimal eps = {eps_star:.6}");
    }

    // The LP certifies a solution on the closed interval; the logit family
    // needs strict interior room, so widen before the final solve and retry
    // with progressively more slack if the Newton loop balks.
    let probe = probe_options(options);
    let mut last_err = CalibError::ConvergenceFailure { iterations: options.max_iter };
    for widen in [1.0, 10.0, 100.0] {
        let eps_final = (eps_star + widen * options.precision_bounds).min(EPS_CEILING);
        let distance = DistanceFn::Logit { lower: 1.0 - eps_final, upper: 1.0 + eps_final };
        match solve_distance(problem, distance, &probe) {
            Ok(outcome) => {
                return Ok(BoundsOutcome {
                    lower: 1.0 - eps_final,
                    upper: 1.0 + eps_final,
                    g: outcome.g,
                    iterations: outcome.iterations,
                    warnings: Vec::new(),
                });
            }
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Flag resolution into BoundsStrategy, including the both-set case.
    // - Recovery of a known minimal ε by bisection and by the LP, and their
    //   agreement.
    // - The LpInfeasible vs BoundSearchExhausted failure split.
    // - The size-cap fallbacks, driven through lowered caps on a small
    //   problem.
    // - Rejection of custom q-weights.
    //
    // They intentionally DO NOT cover:
    // - The simplex backend's internals (good_lp's concern).
    // -------------------------------------------------------------------------

    /// Two equal units whose total must grow by 20%: the minimal symmetric
    /// half-width is exactly ε = 0.2 (both factors at 1 + ε).
    fn stretch_problem() -> CalibProblem {
        let x = array![[1.0], [1.0]];
        let d = array![1.0, 1.0];
        let total = array![2.4];
        CalibProblem::new(x, d, total, None).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Pin the precedence of the legacy flag pair: both set resolves to
    // bisection (the explicit override of the faster default wins).
    //
    // Given
    // -----
    // - All four flag combinations.
    //
    // Expect
    // ------
    // - (F,F) → Auto, (T,F) → LinearProgram, (F,T) → Bisection,
    //   (T,T) → Bisection.
    fn from_flags_resolves_both_set_to_bisection() {
        assert_eq!(BoundsStrategy::from_flags(false, false), BoundsStrategy::Auto);
        assert_eq!(BoundsStrategy::from_flags(true, false), BoundsStrategy::LinearProgram);
        assert_eq!(BoundsStrategy::from_flags(false, true), BoundsStrategy::Bisection);
        assert_eq!(BoundsStrategy::from_flags(true, true), BoundsStrategy::Bisection);
    }

    #[test]
    // Purpose
    // -------
    // Verify that bisection locates the known minimal half-width from above
    // within precision_bounds, with factors inside the returned interval.
    //
    // Given
    // -----
    // - The 20%-stretch problem, forced bisection, precision 1e-4.
    //
    // Expect
    // ------
    // - ε within 1e-3 of 0.2 (the solver tolerance lets candidates a hair
    //   below the algebraic minimum converge, so the boundary sits within
    //   tolerance of 0.2 rather than exactly on it).
    fn bisection_finds_minimal_half_width() {
        // Arrange
        let problem = stretch_problem();
        let options = CalibOptions {
            bounds_strategy: BoundsStrategy::Bisection,
            ..CalibOptions::default()
        };

        // Act
        let out = solve_min_bounds(&problem, &options).unwrap();

        // Assert
        let eps = 1.0 - out.lower;
        assert!((eps - 0.2).abs() <= 1e-3, "eps = {eps}");
        assert!((out.upper - (1.0 + eps)).abs() < 1e-12);
        assert!(out.g.iter().all(|&v| v >= out.lower && v <= out.upper));
        assert!(out.warnings.is_empty());
    }

    #[test]
    // Purpose
    // -------
    // Verify the LP path recovers the same minimal half-width (exactly, up
    // to its widening margin) and agrees with bisection.
    //
    // Given
    // -----
    // - The 20%-stretch problem, forced LP.
    //
    // Expect
    // ------
    // - ε within [0.2, 0.2 + 1e-2]; margins satisfied at the returned g.
    fn lp_agrees_with_bisection_on_minimal_half_width() {
        let problem = stretch_problem();
        let options = CalibOptions {
            bounds_strategy: BoundsStrategy::LinearProgram,
            ..CalibOptions::default()
        };

        let out = solve_min_bounds(&problem, &options).unwrap();
        let eps = 1.0 - out.lower;
        assert!(eps >= 0.2, "eps = {eps}");
        assert!(eps <= 0.2 + 1e-2, "eps = {eps}");

        let weighted = problem.d() * &out.g;
        let achieved = problem.x().t().dot(&weighted);
        assert!((achieved[0] - 2.4).abs() / 2.4 < 1e-6);
    }

    #[test]
    // Purpose
    // -------
    // Verify the hard-cap fallback: a forced LP on a problem above the
    // element cap runs bisection instead and says so in a warning, still
    // returning the right interval.
    //
    // Given
    // -----
    // - The 20%-stretch problem (2 elements) dispatched with lp_max_elems
    //   lowered to 1.
    //
    // Expect
    // ------
    // - Success with ε within 1e-3 of 0.2 and exactly one
    //   RiskyConfiguration warning mentioning the cap.
    fn forced_lp_above_cap_falls_back_to_bisection_with_warning() {
        // Arrange
        let problem = stretch_problem();
        let options = CalibOptions {
            bounds_strategy: BoundsStrategy::LinearProgram,
            ..CalibOptions::default()
        };

        // Act
        let out = solve_min_bounds_with_caps(&problem, &options, 0, 1).unwrap();

        // Assert
        let eps = 1.0 - out.lower;
        assert!((eps - 0.2).abs() <= 1e-3, "eps = {eps}");
        match out.warnings.as_slice() {
            [CalibWarning::RiskyConfiguration { reason }] => {
                assert!(reason.contains("falling back to bisection"), "{reason}");
            }
            other => panic!("expected one cap warning, got {other:?}"),
        }
    }

    #[test]
    // Purpose
    // -------
    // Verify the Auto size heuristic: above the LP-benefit threshold the
    // dispatcher picks bisection silently (no warning, since nothing was
    // overridden).
    //
    // Given
    // -----
    // - The 20%-stretch problem under Auto with lp_auto_elems lowered to 0.
    //
    // Expect
    // ------
    // - Success with ε within 1e-3 of 0.2 and no warnings.
    fn auto_above_lp_threshold_picks_bisection_silently() {
        let problem = stretch_problem();
        let options = CalibOptions::default();

        let out =
            solve_min_bounds_with_caps(&problem, &options, 0, LP_MAX_ELEMS).unwrap();

        let eps = 1.0 - out.lower;
        assert!((eps - 0.2).abs() <= 1e-3, "eps = {eps}");
        assert!(out.warnings.is_empty());
    }

    #[test]
    // Purpose
    // -------
    // Verify the failure split: a structurally impossible problem (total
    // weight must more than double) is LpInfeasible under the LP strategy
    // and BoundSearchExhausted under bisection.
    //
    // Given
    // -----
    // - Two unit-weight units with target total 5 (max reachable under
    //   ε < 1 is 4).
    //
    // Expect
    // ------
    // - LpInfeasible from the LP path, BoundSearchExhausted from bisection.
    fn infeasible_problem_reports_structural_vs_search_failure() {
        let x = array![[1.0], [1.0]];
        let d = array![1.0, 1.0];
        let total = array![5.0];
        let problem = CalibProblem::new(x, d, total, None).unwrap();

        let lp_opts = CalibOptions {
            bounds_strategy: BoundsStrategy::LinearProgram,
            ..CalibOptions::default()
        };
        assert_eq!(solve_min_bounds(&problem, &lp_opts).unwrap_err(), CalibError::LpInfeasible);

        let bis_opts = CalibOptions {
            bounds_strategy: BoundsStrategy::Bisection,
            max_iter: 200,
            ..CalibOptions::default()
        };
        assert_eq!(
            solve_min_bounds(&problem, &bis_opts).unwrap_err(),
            CalibError::BoundSearchExhausted
        );
    }

    #[test]
    // Purpose
    // -------
    // Verify that custom q-weights are rejected up front.
    //
    // Given
    // -----
    // - The stretch problem with a non-trivial q vector.
    //
    // Expect
    // ------
    // - UnsupportedCombination before any search runs.
    fn custom_q_is_rejected() {
        let x = array![[1.0], [1.0]];
        let d = array![1.0, 1.0];
        let total = array![2.4];
        let q = array![1.0, 2.0];
        let problem = CalibProblem::new(x, d, total, Some(q)).unwrap();

        let err = solve_min_bounds(&problem, &CalibOptions::default()).unwrap_err();
        assert!(matches!(err, CalibError::UnsupportedCombination { .. }));
    }
}
