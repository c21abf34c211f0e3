//! calibration::search — monotone-predicate bisection.
//!
//! Purpose
//! -------
//! Provide the one search primitive shared by the tight-bounds solver and
//! the penalized λ search: given a feasibility predicate that is monotone
//! non-decreasing on an interval (infeasible below some boundary, feasible
//! above it), locate the boundary to a requested precision by repeated
//! halving, keeping the payload produced at the best feasible candidate so
//! the caller never re-solves it.
//!
//! Invariants & assumptions
//! ------------------------
//! - The predicate is monotone on `[lo, hi]`: if it accepts `c`, it accepts
//!   every `c' > c`. Under that assumption the returned boundary is never
//!   below the true minimal feasible point, and exceeds it by at most
//!   `precision` (or by the bracket width reachable within `max_steps`).
//! - `hi` is already known feasible and its payload is supplied by the
//!   caller; `lo` is already known infeasible (or is the open lower edge).
//!
//! Downstream usage
//! ----------------
//! - `bounds::solve_min_bounds` bisects over the symmetric half-width ε of
//!   candidate bound intervals.
//! - `penalized::solve_penalized` bisects over `ln λ` after geometric
//!   bracketing, so precision is relative on the λ scale.
use crate::calibration::options::CalibOptions;

/// Outcome of a monotone bisection: the located boundary, the payload of
/// the smallest feasible candidate found, and the number of predicate
/// evaluations spent.
#[derive(Debug, Clone, PartialEq)]
pub struct BisectOutcome<T> {
    pub boundary: f64,
    pub payload: T,
    pub steps: usize,
}

/// Locate the feasibility boundary of a monotone predicate on `[lo, hi]`.
///
/// Parameters
/// ----------
/// - `lo`: known-infeasible lower edge of the bracket.
/// - `hi`: known-feasible upper edge; tightened toward the boundary.
/// - `hi_payload`: payload the caller obtained when establishing that `hi`
///   is feasible.
/// - `precision`: stop once `hi − lo` falls below this width.
/// - `max_steps`: hard cap on predicate evaluations; the search returns the
///   best bracket reached when the cap binds.
/// - `pred`: feasibility predicate; `Some(payload)` iff the candidate is
///   feasible. Must be monotone non-decreasing on `[lo, hi]`.
///
/// Returns
/// -------
/// `BisectOutcome<T>`
///   The final feasible upper edge, its payload, and the step count.
///
/// Notes
/// -----
/// - The boundary returned is always a *feasible* candidate; monotonicity
///   guarantees it is within `precision` of the minimal feasible point when
///   the cap does not bind.
pub fn bisect_boundary<T>(
    mut lo: f64, mut hi: f64, hi_payload: T, precision: f64, max_steps: usize,
    mut pred: impl FnMut(f64) -> Option<T>,
) -> BisectOutcome<T> {
    let mut payload = hi_payload;
    let mut steps = 0;
    while hi - lo > precision && steps < max_steps {
        let mid = 0.5 * (lo + hi);
        steps += 1;
        match pred(mid) {
            Some(p) => {
                hi = mid;
                payload = p;
            }
            None => lo = mid,
        }
    }
    BisectOutcome { boundary: hi, payload, steps }
}

/// Per-candidate solver options for search subproblems: same tolerances as
/// the outer call, but never verbose (a bisection probes many infeasible
/// candidates whose diagnostics would only be noise).
pub fn probe_options(options: &CalibOptions) -> CalibOptions {
    CalibOptions { verbose: false, ..options.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Boundary location to the requested precision on a known predicate.
    // - Payload propagation from the smallest feasible candidate.
    // - The max_steps cap.
    //
    // They intentionally DO NOT cover:
    // - Solver-backed predicates (bounds/penalized tests).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify the located boundary brackets the true threshold from above
    // within the requested precision, and never from below.
    //
    // Given
    // -----
    // - The predicate `c ≥ 0.37` on [0, 1] with precision 1e-6.
    //
    // Expect
    // ------
    // - boundary ∈ [0.37, 0.37 + 1e-6]; payload equals the boundary.
    fn locates_threshold_within_precision() {
        // Arrange
        let threshold = 0.37;

        // Act
        let out = bisect_boundary(0.0, 1.0, 1.0, 1e-6, 200, |c| {
            if c >= threshold { Some(c) } else { None }
        });

        // Assert
        assert!(out.boundary >= threshold);
        assert!(out.boundary <= threshold + 1e-6);
        assert_eq!(out.payload, out.boundary);
    }

    #[test]
    // Purpose
    // -------
    // Verify that the step cap binds and the best feasible bracket so far is
    // returned instead of looping.
    //
    // Given
    // -----
    // - The same predicate with max_steps = 3.
    //
    // Expect
    // ------
    // - Exactly 3 steps; boundary is feasible but coarser than 1e-6.
    fn respects_step_cap() {
        let out = bisect_boundary(0.0, 1.0, 1.0, 1e-9, 3, |c| {
            if c >= 0.37 { Some(c) } else { None }
        });
        assert_eq!(out.steps, 3);
        assert!(out.boundary >= 0.37);
        assert!(out.boundary > 0.37 + 1e-6);
    }

    #[test]
    // Purpose
    // -------
    // Verify the degenerate case where the bracket is already narrower than
    // the precision: the feasible edge and its payload come back untouched.
    //
    // Given
    // -----
    // - lo = 0.5, hi = 0.5 + 1e-8, precision 1e-4.
    //
    // Expect
    // ------
    // - Zero steps; boundary = hi; payload preserved.
    fn returns_immediately_when_bracket_is_resolved() {
        let out =
            bisect_boundary(0.5, 0.5 + 1e-8, "payload", 1e-4, 100, |_| Some("probed"));
        assert_eq!(out.steps, 0);
        assert_eq!(out.payload, "payload");
    }
}
