//! calibration::distance — distance-function families and their closed forms.
//!
//! Purpose
//! -------
//! Define the distance-function family used by the calibration solvers as a
//! tagged variant, [`DistanceFn`], selected once at call entry. Each variant
//! supplies the closed form `g = F(u)` mapping the per-unit dual score
//! `u = q·(Xλ)` to a reweighting factor, together with its derivative
//! `F′(u)` needed by the Newton-Raphson Jacobian.
//!
//! Key behaviors
//! -------------
//! - Linear: `F(u) = 1 + u` (chi-squared distance; Newton is exact in one
//!   step because `F′` is constant).
//! - Raking: `F(u) = exp(u)` (multiplicative/exponential distance; factors
//!   are always strictly positive).
//! - Logit with bounds `(L, U)`, `L < 1 < U`:
//!   `F(u) = (L(U−1) + U(1−L)e^{Au}) / ((U−1) + (1−L)e^{Au})` with the
//!   normalizing constant `A = (U−L)/((1−L)(U−1))` chosen so that
//!   `F(0) = 1` and `F′(0) = 1`; factors stay strictly inside `(L, U)` for
//!   every finite `u`.
//!
//! Invariants & assumptions
//! ------------------------
//! - `F(0) = 1` and `F′(0) = 1` for every variant, so λ = 0 is always the
//!   "no reweighting" starting point.
//! - `F` and `F′` are evaluated in an overflow-safe form: the logit family
//!   is rewritten with `e^{−Au}` for positive exponents so that large dual
//!   scores saturate at the bound instead of producing `inf/inf`.
//! - Bound validation happens in [`DistanceFn::validate`]; the evaluation
//!   functions assume validated bounds.
//!
//! Conventions
//! -----------
//! - `u` is the per-unit scalar dual score; vectorized application lives in
//!   the solver, keeping these functions pure scalars.
//!
//! Downstream usage
//! ----------------
//! - `solver::solve_distance` evaluates `g` and `g′` per unit each Newton
//!   iteration; `bounds::solve_min_bounds` constructs `Logit` variants per
//!   bisection candidate; `penalized::solve_penalized` reuses the same
//!   closed forms inside the ridge-augmented system.
//!
//! Testing notes
//! -------------
//! - Unit tests check `F(0) = 1` and `F′(0) = 1` for all variants, strict
//!   interior containment and saturation for the logit family, positivity
//!   for raking, and rejection of malformed bounds.
use crate::calibration::errors::{CalibError, CalibResult};

/// Distance-function family for the calibration solvers.
///
/// Selected once at call entry; each variant's closed form and derivative
/// are pure functions of the scalar dual score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceFn {
    /// Chi-squared (linear) distance; unbounded factors, exact in one step.
    Linear,
    /// Multiplicative (raking/exponential) distance; strictly positive
    /// factors.
    Raking,
    /// Logit distance bounded to `(lower, upper)` with `lower < 1 < upper`.
    Logit { lower: f64, upper: f64 },
}

impl DistanceFn {
    /// Check that the variant's parameters are admissible.
    ///
    /// Errors
    /// ------
    /// - `CalibError::InvalidBounds` for a logit family whose bounds are not
    ///   finite with `0 ≤ lower < 1 < upper`.
    pub fn validate(&self) -> CalibResult<()> {
        match *self {
            DistanceFn::Linear | DistanceFn::Raking => Ok(()),
            DistanceFn::Logit { lower, upper } => {
                if !lower.is_finite() || !upper.is_finite() || lower < 0.0 || lower >= 1.0
                    || upper <= 1.0
                {
                    Err(CalibError::InvalidBounds { lower, upper })
                } else {
                    Ok(())
                }
            }
        }
    }

    /// The bound interval enforced by this family, if any.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match *self {
            DistanceFn::Logit { lower, upper } => Some((lower, upper)),
            _ => None,
        }
    }

    /// The normalizing constant `A = (U−L)/((1−L)(U−1))` of the logit
    /// family, 1.0 for the unbounded families.
    fn scale(&self) -> f64 {
        match *self {
            DistanceFn::Logit { lower, upper } => {
                (upper - lower) / ((1.0 - lower) * (upper - 1.0))
            }
            _ => 1.0,
        }
    }

    /// Closed form `g = F(u)` for a single unit.
    pub fn g(&self, u: f64) -> f64 {
        match *self {
            DistanceFn::Linear => 1.0 + u,
            DistanceFn::Raking => u.exp(),
            DistanceFn::Logit { lower, upper } => {
                let t = self.scale() * u;
                if t >= 0.0 {
                    // Multiply through by e^{-t} so large positive scores
                    // saturate at `upper` instead of overflowing.
                    let e = (-t).exp();
                    (lower * (upper - 1.0) * e + upper * (1.0 - lower))
                        / ((upper - 1.0) * e + (1.0 - lower))
                } else {
                    let e = t.exp();
                    (lower * (upper - 1.0) + upper * (1.0 - lower) * e)
                        / ((upper - 1.0) + (1.0 - lower) * e)
                }
            }
        }
    }

    /// Derivative `F′(u)` for a single unit.
    pub fn g_prime(&self, u: f64) -> f64 {
        match *self {
            DistanceFn::Linear => 1.0,
            DistanceFn::Raking => u.exp(),
            DistanceFn::Logit { lower, upper } => {
                let a = self.scale();
                let t = a * u;
                let num = a * (1.0 - lower) * (upper - 1.0) * (upper - lower);
                if t >= 0.0 {
                    let e = (-t).exp();
                    let denom = (upper - 1.0) * e + (1.0 - lower);
                    num * e / (denom * denom)
                } else {
                    let e = t.exp();
                    let denom = (upper - 1.0) + (1.0 - lower) * e;
                    num * e / (denom * denom)
                }
            }
        }
    }

    /// Whether a factor lies in the family's admissible range.
    ///
    /// Notes
    /// -----
    /// - The logit check is on the closed interval `[L, U]`: saturation at a
    ///   bound is numerically reachable and still admissible output.
    pub fn admits(&self, g: f64) -> bool {
        if !g.is_finite() {
            return false;
        }
        match *self {
            DistanceFn::Linear => true,
            DistanceFn::Raking => g > 0.0,
            DistanceFn::Logit { lower, upper } => g >= lower && g <= upper,
        }
    }
}
