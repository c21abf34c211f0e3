//! calibration::solver — Newton-Raphson calibration on the dual.
//!
//! Purpose
//! -------
//! Find the reweighting-factor vector `g` solving the calibration equation
//! `Xᵀ(d ⊙ g) = total` for a chosen distance family, by Newton-Raphson
//! iteration on the dual (Lagrange multiplier) formulation. The same loop,
//! augmented with a ridge term on the dual, powers the penalized solver.
//!
//! Key behaviors
//! -------------
//! - Each iteration evaluates `g = F(q ⊙ Xλ)` through the family's closed
//!   form, the residual `r = Xᵀ(d ⊙ g) − total`, and the weighted Jacobian
//!   `J = Xᵀ diag(d ⊙ q ⊙ F′) X`, then solves `J Δ = −r` and updates
//!   `λ ← λ + Δ`.
//! - Convergence is declared when the largest residual, relative to its
//!   target (absolute for numerically-zero targets), falls below the
//!   configured tolerance.
//! - A step that would produce non-finite factors or leave the family's
//!   admissible range is rejected and halved, up to [`STEP_HALVINGS`]
//!   retries, before the solve is declared non-convergent.
//! - The iteration state is an explicit value type, [`NewtonState`], so a
//!   single step is unit-testable in isolation.
//!
//! Invariants & assumptions
//! ------------------------
//! - Inputs arrive as a validated [`CalibProblem`]; no input re-validation
//!   happens here, and in particular the structurally infeasible
//!   zero-column case has already been rejected upstream.
//! - The linear family has a constant Jacobian, so the first Newton step is
//!   exact and the loop converges at iteration 1.
//! - `g` returned on success is finite everywhere and admissible for the
//!   family (inside `[L, U]` for logit, strictly positive for raking); a
//!   degenerate `g` is never returned as success.
//!
//! Conventions
//! -----------
//! - λ (the dual multiplier vector, one entry per margin) is distinct from
//!   the ridge strength of the penalized solver, which enters through
//!   [`RidgeTerm`].
//! - The Newton system is solved by LU decomposition on the cols×cols
//!   matrix; `ndarray` accumulations are copied into `nalgebra` for the
//!   solve.
//!
//! Downstream usage
//! ----------------
//! - [`solve_distance`] is the public entry for the linear/raking/logit
//!   methods; `bounds` calls it per bisection candidate and `penalized`
//!   calls the ridge-augmented variant.
//!
//! Testing notes
//! -------------
//! - Unit tests cover one-step exactness of the linear family, raking and
//!   logit convergence with admissible factors, the relative/absolute
//!   residual switch, and non-convergence under infeasibly tight bounds.
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, Axis};

use crate::calibration::distance::DistanceFn;
use crate::calibration::errors::{CalibError, CalibResult};
use crate::calibration::options::CalibOptions;
use crate::calibration::problem::CalibProblem;

/// Retry budget for rejected (halved) Newton steps within one iteration.
const STEP_HALVINGS: usize = 8;

/// Targets with absolute value at or below this floor use an absolute
/// residual test instead of a relative one.
const TOTAL_FLOOR: f64 = 1e-10;

/// Ridge augmentation of the Newton system used by the penalized solver:
/// adds `strength · inv_cost_j · λ_j` to residual component j and
/// `strength · inv_cost_j` to the Jacobian diagonal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RidgeTerm<'a> {
    pub strength: f64,
    pub inv_cost: &'a Array1<f64>,
}

/// NewtonState — one iteration's worth of solver state, passed by value.
///
/// Fields
/// ------
/// - `lambda`: current dual multipliers, one per margin.
/// - `g`: reweighting factors at `lambda`.
/// - `u`: per-unit dual scores `q ⊙ Xλ` (inputs to the closed forms).
/// - `residual`: `Xᵀ(d ⊙ g) − total` (+ ridge term when present).
/// - `iteration`: number of completed Newton updates.
#[derive(Debug, Clone, PartialEq)]
pub struct NewtonState {
    pub lambda: Array1<f64>,
    pub g: Array1<f64>,
    pub u: Array1<f64>,
    pub residual: Array1<f64>,
    pub iteration: usize,
}

/// Successful solve: the factors, the dual at the solution, the iteration
/// count, and the convergence measure actually achieved.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub g: Array1<f64>,
    pub lambda: Array1<f64>,
    pub iterations: usize,
    pub max_relative_residual: f64,
}

/// Solve the calibration equation for a distance family.
///
/// Parameters
/// ----------
/// - `problem`: validated inputs (X, d, total, q), borrowed read-only.
/// - `distance`: the distance family; bounds are validated here before any
///   iteration.
/// - `options`: iteration budget, tolerance, verbosity.
///
/// Returns
/// -------
/// `CalibResult<SolverOutcome>`
///   Factors satisfying the calibration equation to within
///   `options.tolerance`, or a typed failure.
///
/// Errors
/// ------
/// - `CalibError::InvalidBounds` for a malformed logit family.
/// - `CalibError::InvalidOption` for malformed options.
/// - `CalibError::SingularSystem` when the Newton system cannot be solved.
/// - `CalibError::ConvergenceFailure` when the iteration budget (or the
///   step-halving retry budget) is exhausted before reaching tolerance.
///
/// Notes
/// -----
/// - With `method = linear` the first step lands exactly on the solution
///   (constant Jacobian), so the loop reports convergence at iteration 1.
pub fn solve_distance(
    problem: &CalibProblem, distance: DistanceFn, options: &CalibOptions,
) -> CalibResult<SolverOutcome> {
    solve_with_ridge(problem, distance, options, None)
}

/// Ridge-augmented Newton solve shared with the penalized solver.
pub(crate) fn solve_with_ridge(
    problem: &CalibProblem, distance: DistanceFn, options: &CalibOptions,
    ridge: Option<RidgeTerm<'_>>,
) -> CalibResult<SolverOutcome> {
    distance.validate()?;
    options.validate()?;

    let cols = problem.n_margins();
    let mut state = initial_state(problem, distance, ridge.as_ref(), Array1::zeros(cols))
        .ok_or(CalibError::ConvergenceFailure { iterations: 0 })?;

    loop {
        let measure = convergence_measure(&state.residual, problem.total());
        if options.verbose {
            eprintln!(
                "newton iter {}: max relative residual = {:.6e}",
                state.iteration, measure
            );
        }
        if measure <= options.tolerance {
            return Ok(SolverOutcome {
                g: state.g,
                lambda: state.lambda,
                iterations: state.iteration,
                max_relative_residual: measure,
            });
        }
        if state.iteration >= options.max_iter {
            return Err(CalibError::ConvergenceFailure { iterations: options.max_iter });
        }
        state = newton_step(problem, distance, ridge.as_ref(), state)?;
    }
}

/// Perform one Newton update on an explicit state value.
///
/// Parameters
/// ----------
/// - `state`: the current [`NewtonState`]; consumed and replaced by the
///   post-update state.
///
/// Returns
/// -------
/// `CalibResult<NewtonState>`
///   The state after one accepted (possibly halved) step.
///
/// Errors
/// ------
/// - `CalibError::SingularSystem` when `J Δ = −r` has no solution on the
///   first step (structural degeneracy).
/// - `CalibError::ConvergenceFailure` when a later system is numerically
///   singular, or when every halved step up to the retry budget still
///   produces inadmissible factors.
pub fn newton_step(
    problem: &CalibProblem, distance: DistanceFn, ridge: Option<&RidgeTerm<'_>>,
    state: NewtonState,
) -> CalibResult<NewtonState> {
    let jac = jacobian(problem, distance, ridge, &state.u);
    let rhs = state.residual.mapv(|v| -v);
    // A singular system on the very first step is structural (collinear or
    // degenerate margins) and fails fast; later singularity means the
    // iteration has driven the Jacobian numerically flat (e.g. saturated
    // bounds) and is reported as non-convergence.
    let delta = solve_symmetric_system(&jac, &rhs).ok_or(if state.iteration == 0 {
        CalibError::SingularSystem { iteration: 0 }
    } else {
        CalibError::ConvergenceFailure { iterations: state.iteration }
    })?;

    let mut scale = 1.0;
    for _ in 0..=STEP_HALVINGS {
        let candidate = &state.lambda + &(delta.mapv(|v| v * scale));
        if let Some(next) = initial_state(problem, distance, ridge, candidate) {
            return Ok(NewtonState { iteration: state.iteration + 1, ..next });
        }
        scale *= 0.5;
    }
    Err(CalibError::ConvergenceFailure { iterations: state.iteration + 1 })
}

/// Evaluate the state at a candidate dual vector; `None` when the factors
/// are non-finite or leave the family's admissible range (step rejected).
fn initial_state(
    problem: &CalibProblem, distance: DistanceFn, ridge: Option<&RidgeTerm<'_>>,
    lambda: Array1<f64>,
) -> Option<NewtonState> {
    let u = problem.x().dot(&lambda) * problem.q();
    let g = u.mapv(|ui| distance.g(ui));
    if !g.iter().all(|&v| distance.admits(v)) {
        return None;
    }
    let weighted = problem.d() * &g;
    let mut residual = problem.x().t().dot(&weighted) - problem.total();
    if let Some(ridge) = ridge {
        residual = residual + (ridge.inv_cost * &lambda) * ridge.strength;
    }
    if !residual.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(NewtonState { lambda, g, u, residual, iteration: 0 })
}

/// Weighted Newton Jacobian `Xᵀ diag(d ⊙ q ⊙ F′(u)) X` (+ ridge diagonal).
fn jacobian(
    problem: &CalibProblem, distance: DistanceFn, ridge: Option<&RidgeTerm<'_>>,
    u: &Array1<f64>,
) -> Array2<f64> {
    let weights = u.mapv(|ui| distance.g_prime(ui)) * problem.d() * problem.q();
    let weighted_x = problem.x() * &weights.insert_axis(Axis(1));
    let mut jac = problem.x().t().dot(&weighted_x);
    if let Some(ridge) = ridge {
        for j in 0..jac.nrows() {
            jac[[j, j]] += ridge.strength * ridge.inv_cost[j];
        }
    }
    jac
}

/// Largest residual component, relative to its target (absolute when the
/// target is numerically zero).
fn convergence_measure(residual: &Array1<f64>, total: &Array1<f64>) -> f64 {
    residual
        .iter()
        .zip(total.iter())
        .map(|(&r, &t)| if t.abs() > TOTAL_FLOOR { (r / t).abs() } else { r.abs() })
        .fold(0.0, f64::max)
}

/// Copy the cols×cols `ndarray` Newton matrix into `nalgebra` and solve by
/// LU decomposition; `None` when the matrix is singular.
fn solve_symmetric_system(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut a_nalg = DMatrix::<f64>::zeros(n, n);
    for col in 0..n {
        for row in 0..n {
            a_nalg[(row, col)] = a[[row, col]];
        }
    }
    let b_nalg = DVector::from_iterator(n, b.iter().cloned());
    let solution = a_nalg.lu().solve(&b_nalg)?;
    if !solution.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(Array1::from_iter(solution.iter().cloned()))
}
