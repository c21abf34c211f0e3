//! calibration::problem — validated calibration inputs.
//!
//! Purpose
//! -------
//! Bundle the numeric inputs of a calibration call — design matrix `X`,
//! initial weights `d`, target totals, and optional q-weights — into a
//! single validated carrier, [`CalibProblem`], constructed once per call
//! and borrowed read-only by every solver.
//!
//! Key behaviors
//! -------------
//! - Validate all structural invariants at construction time (dimension
//!   agreement, strict positivity of weights, finiteness of every entry,
//!   no all-zero column facing a nonzero target), so that the iterative
//!   solvers never have to re-check inputs or defend against division by
//!   zero.
//! - Default the q-weights to all-ones when the caller supplies none.
//! - Expose cheap accessors plus the initial weighted totals `Xᵀd`, which
//!   every solver needs to seed its residual.
//!
//! Invariants & assumptions
//! ------------------------
//! - `x.nrows() == d.len() == q.len()` and `x.ncols() == total.len()`.
//! - Every entry of `d` and `q` is strictly positive and finite; every
//!   entry of `x` and `total` is finite.
//! - No column of `x` is entirely zero while its target is nonzero.
//! - The problem is immutable after construction; bisection and λ-search
//!   loops borrow it across repeated solver calls without re-allocating
//!   the design matrix.
//!
//! Conventions
//! -----------
//! - Rows index sample units, columns index auxiliary variables (margins).
//! - All numeric data uses `f64` via `ndarray`.
//!
//! Downstream usage
//! ----------------
//! - Constructed directly from arrays via [`CalibProblem::new`], or from a
//!   margin-specification table via `margins::build_problem`.
//! - Borrowed by `solver::solve_distance`, `bounds::solve_min_bounds`, and
//!   `penalized::solve_penalized`.
//!
//! Testing notes
//! -------------
//! - Unit tests in this module cover every rejection branch of
//!   [`CalibProblem::new`] and one success path including the q-weight
//!   default.
use ndarray::{Array1, Array2};

use crate::calibration::errors::{CalibError, CalibResult};

/// Tolerance below which a design-matrix column is considered entirely
/// zero for the structural-feasibility check.
const ZERO_COLUMN_EPS: f64 = 0.0;

/// CalibProblem — immutable, validated calibration inputs.
///
/// Purpose
/// -------
/// Hold the (X, d, total, q) quadruple for one calibration call with all
/// structural invariants already enforced.
///
/// Fields
/// ------
/// - `x`: `Array2<f64>` — design matrix, rows = units, columns = margins.
/// - `d`: `Array1<f64>` — strictly positive initial (design) weights.
/// - `total`: `Array1<f64>` — target population totals, absolute units.
/// - `q`: `Array1<f64>` — positive heterogeneity weights (all-ones by
///   default).
///
/// Invariants
/// ----------
/// - See the module-level invariants; they hold for every constructed
///   value, so solvers may index freely without re-validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibProblem {
    x: Array2<f64>,
    d: Array1<f64>,
    total: Array1<f64>,
    q: Array1<f64>,
}

impl CalibProblem {
    /// Construct a validated calibration problem.
    ///
    /// Parameters
    /// ----------
    /// - `x`: `Array2<f64>`
    ///   Design matrix with one row per sample unit and one column per
    ///   auxiliary variable. Every entry must be finite.
    /// - `d`: `Array1<f64>`
    ///   Initial design weights, one per row; strictly positive and finite.
    /// - `total`: `Array1<f64>`
    ///   Target totals, one per column; finite, absolute units.
    /// - `q`: `Option<Array1<f64>>`
    ///   Optional per-unit heterogeneity weights; strictly positive and
    ///   finite. `None` defaults to all-ones.
    ///
    /// Returns
    /// -------
    /// `CalibResult<CalibProblem>`
    ///   The validated problem, or the first `CalibError` encountered.
    ///
    /// Errors
    /// ------
    /// - `CalibError::EmptyProblem` when `x` has no rows or no columns.
    /// - `CalibError::DimensionMismatch` when `d`, `total`, or `q` disagree
    ///   with the shape of `x`.
    /// - `CalibError::NonPositiveWeight` / `NonPositiveQWeight` for weights
    ///   that are not strictly positive and finite.
    /// - `CalibError::NonFiniteEntry` for NaN/±inf in `x` or `total`.
    /// - `CalibError::ZeroColumn` when a column is entirely zero but its
    ///   target is nonzero (structurally unsatisfiable margin).
    ///
    /// Panics
    /// ------
    /// - Never panics; all failures are reported via `CalibError`.
    pub fn new(
        x: Array2<f64>, d: Array1<f64>, total: Array1<f64>, q: Option<Array1<f64>>,
    ) -> CalibResult<CalibProblem> {
        let (rows, cols) = x.dim();
        if rows == 0 || cols == 0 {
            return Err(CalibError::EmptyProblem);
        }
        if d.len() != rows {
            return Err(CalibError::DimensionMismatch {
                what: "weights",
                expected: rows,
                actual: d.len(),
            });
        }
        if total.len() != cols {
            return Err(CalibError::DimensionMismatch {
                what: "targets",
                expected: cols,
                actual: total.len(),
            });
        }

        for (index, &value) in d.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(CalibError::NonPositiveWeight { index, value });
            }
        }
        for (index, &value) in total.iter().enumerate() {
            if !value.is_finite() {
                return Err(CalibError::NonFiniteEntry { what: "target", index, value });
            }
        }
        for (index, &value) in x.iter().enumerate() {
            if !value.is_finite() {
                return Err(CalibError::NonFiniteEntry {
                    what: "design-matrix entry",
                    index,
                    value,
                });
            }
        }

        let q = match q {
            Some(q) => {
                if q.len() != rows {
                    return Err(CalibError::DimensionMismatch {
                        what: "q-weights",
                        expected: rows,
                        actual: q.len(),
                    });
                }
                for (index, &value) in q.iter().enumerate() {
                    if !value.is_finite() || value <= 0.0 {
                        return Err(CalibError::NonPositiveQWeight { index, value });
                    }
                }
                q
            }
            None => Array1::ones(rows),
        };

        // A margin whose column is identically zero can only be satisfied
        // by a zero target; anything else must fail fast, before the
        // Newton loop ever runs.
        for j in 0..cols {
            let col_is_zero = x.column(j).iter().all(|&v| v.abs() <= ZERO_COLUMN_EPS);
            if col_is_zero && total[j] != 0.0 {
                return Err(CalibError::ZeroColumn { column: j, target: total[j] });
            }
        }

        Ok(CalibProblem { x, d, total, q })
    }

    /// Number of sample units (rows of the design matrix).
    pub fn n_units(&self) -> usize {
        self.x.nrows()
    }

    /// Number of calibration margins (columns of the design matrix).
    pub fn n_margins(&self) -> usize {
        self.x.ncols()
    }

    /// The design matrix.
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    /// The initial design weights.
    pub fn d(&self) -> &Array1<f64> {
        &self.d
    }

    /// The target totals.
    pub fn total(&self) -> &Array1<f64> {
        &self.total
    }

    /// The heterogeneity weights (all-ones when none were supplied).
    pub fn q(&self) -> &Array1<f64> {
        &self.q
    }

    /// Whether the caller supplied non-trivial q-weights.
    ///
    /// Notes
    /// -----
    /// - Used to reject the q + penalized and q + min-bounds combinations,
    ///   which the engine does not support.
    pub fn has_custom_q(&self) -> bool {
        self.q.iter().any(|&v| v != 1.0)
    }

    /// Initial weighted totals `Xᵀd`, one per margin.
    pub fn initial_totals(&self) -> Array1<f64> {
        self.x.t().dot(&self.d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - A successful construction with defaulted q-weights.
    // - Every rejection branch: empty problem, dimension mismatches,
    //   non-positive weights and q-weights, non-finite entries, and the
    //   zero-column structural check.
    //
    // They intentionally DO NOT cover:
    // - Solver behavior on the validated problem (solver/bounds/penalized
    //   tests).
    // -------------------------------------------------------------------------

    fn small_x() -> Array2<f64> {
        array![[1.0, 0.0], [1.0, 1.0], [0.0, 2.0]]
    }

    #[test]
    // Purpose
    // -------
    // Verify that a well-formed problem constructs and defaults q to ones.
    //
    // Given
    // -----
    // - A 3×2 design matrix, positive weights, finite targets, no q.
    //
    // Expect
    // ------
    // - Construction succeeds; q is all-ones; accessors report the shape.
    fn new_accepts_valid_inputs_and_defaults_q_to_ones() {
        // Arrange
        let x = small_x();
        let d = array![1.0, 2.0, 3.0];
        let total = array![4.0, 9.0];

        // Act
        let problem = CalibProblem::new(x, d, total, None).unwrap();

        // Assert
        assert_eq!(problem.n_units(), 3);
        assert_eq!(problem.n_margins(), 2);
        assert!(problem.q().iter().all(|&v| v == 1.0));
        assert!(!problem.has_custom_q());
        let t0 = problem.initial_totals();
        assert!((t0[0] - 3.0).abs() < 1e-12);
        assert!((t0[1] - 8.0).abs() < 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Verify that empty problems and shape mismatches are rejected.
    //
    // Given
    // -----
    // - A 0-column matrix, then a weight vector of the wrong length, then a
    //   target vector of the wrong length, then a q of the wrong length.
    //
    // Expect
    // ------
    // - EmptyProblem and DimensionMismatch errors respectively.
    fn new_rejects_empty_and_mismatched_shapes() {
        let empty: Array2<f64> = Array2::zeros((3, 0));
        let err = CalibProblem::new(empty, array![1.0, 1.0, 1.0], array![], None).unwrap_err();
        assert_eq!(err, CalibError::EmptyProblem);

        let err =
            CalibProblem::new(small_x(), array![1.0, 1.0], array![4.0, 9.0], None).unwrap_err();
        assert!(matches!(err, CalibError::DimensionMismatch { what: "weights", .. }));

        let err =
            CalibProblem::new(small_x(), array![1.0, 1.0, 1.0], array![4.0], None).unwrap_err();
        assert!(matches!(err, CalibError::DimensionMismatch { what: "targets", .. }));

        let err = CalibProblem::new(
            small_x(),
            array![1.0, 1.0, 1.0],
            array![4.0, 9.0],
            Some(array![1.0, 1.0]),
        )
        .unwrap_err();
        assert!(matches!(err, CalibError::DimensionMismatch { what: "q-weights", .. }));
    }

    #[test]
    // Purpose
    // -------
    // Verify that non-positive or non-finite weights and q-weights are
    // rejected with the offending index and value.
    //
    // Given
    // -----
    // - Weight vectors with a zero, a negative, and a NaN entry; a q with a
    //   zero entry.
    //
    // Expect
    // ------
    // - NonPositiveWeight / NonPositiveQWeight with the right index.
    fn new_rejects_bad_weights_and_q() {
        let total = array![4.0, 9.0];

        let err =
            CalibProblem::new(small_x(), array![1.0, 0.0, 1.0], total.clone(), None).unwrap_err();
        assert!(matches!(err, CalibError::NonPositiveWeight { index: 1, .. }));

        let err = CalibProblem::new(small_x(), array![1.0, 1.0, f64::NAN], total.clone(), None)
            .unwrap_err();
        assert!(matches!(err, CalibError::NonPositiveWeight { index: 2, .. }));

        let err = CalibProblem::new(
            small_x(),
            array![1.0, 1.0, 1.0],
            total,
            Some(array![1.0, -2.0, 1.0]),
        )
        .unwrap_err();
        assert!(matches!(err, CalibError::NonPositiveQWeight { index: 1, .. }));
    }

    #[test]
    // Purpose
    // -------
    // Verify that non-finite matrix entries and targets are rejected.
    //
    // Given
    // -----
    // - A matrix with one infinite entry; a target vector with a NaN.
    //
    // Expect
    // ------
    // - NonFiniteEntry naming the design matrix or the target.
    fn new_rejects_non_finite_entries() {
        let mut x = small_x();
        x[[1, 1]] = f64::INFINITY;
        let err = CalibProblem::new(x, array![1.0, 1.0, 1.0], array![4.0, 9.0], None).unwrap_err();
        assert!(matches!(err, CalibError::NonFiniteEntry { what: "design-matrix entry", .. }));

        let err =
            CalibProblem::new(small_x(), array![1.0, 1.0, 1.0], array![4.0, f64::NAN], None)
                .unwrap_err();
        assert!(matches!(err, CalibError::NonFiniteEntry { what: "target", .. }));
    }

    #[test]
    // Purpose
    // -------
    // Verify the structural-feasibility fast-fail: an all-zero column with a
    // nonzero target is rejected, while a zero target is fine.
    //
    // Given
    // -----
    // - A matrix whose second column is all zeros.
    //
    // Expect
    // ------
    // - ZeroColumn for target 5.0; success for target 0.0.
    fn new_rejects_zero_column_with_nonzero_target() {
        let x = array![[1.0, 0.0], [2.0, 0.0]];
        let d = array![1.0, 1.0];

        let err =
            CalibProblem::new(x.clone(), d.clone(), array![3.0, 5.0], None).unwrap_err();
        assert_eq!(err, CalibError::ZeroColumn { column: 1, target: 5.0 });

        assert!(CalibProblem::new(x, d, array![3.0, 0.0], None).is_ok());
    }
}
