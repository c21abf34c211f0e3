//! report — descriptive statistics around a calibration run.
//!
//! Purpose
//! -------
//! Summarize what a calibration did: per-margin weighted totals before and
//! after reweighting next to their targets, and a distribution summary of
//! the factors themselves. Both functions return plain data carriers; no
//! user-facing text, plotting, or export lives here.
//!
//! Conventions
//! -----------
//! - "Before" totals use the design weights `d`, "after" totals use
//!   `d ⊙ g`.
//! - Quartiles use linear interpolation between order statistics.
//!
//! Downstream usage
//! ----------------
//! - The Python bindings expose both summaries next to the factors so a
//!   caller can audit a calibration without recomputing totals.
use ndarray::Array1;

use crate::calibration::errors::{CalibError, CalibResult};
use crate::calibration::problem::CalibProblem;

/// One margin's view of a calibration: its target and the weighted totals
/// before and after reweighting.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginStat {
    pub label: String,
    pub target: f64,
    pub before: f64,
    pub after: f64,
}

/// Distribution summary of the reweighting factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

/// Per-margin before/after totals next to the targets.
///
/// Parameters
/// ----------
/// - `problem`: the calibrated problem.
/// - `g`: factors produced for it.
/// - `labels`: optional column labels (e.g. from
///   [`crate::margins::column_labels`]); columns are labeled `col{j}`
///   when absent.
///
/// Returns
/// -------
/// `CalibResult<Vec<MarginStat>>`
///   One entry per design-matrix column, in column order.
///
/// Errors
/// ------
/// - `CalibError::DimensionMismatch` when `g` or `labels` disagree with
///   the problem's dimensions.
pub fn margin_stats(
    problem: &CalibProblem, g: &Array1<f64>, labels: Option<&[String]>,
) -> CalibResult<Vec<MarginStat>> {
    if g.len() != problem.n_units() {
        return Err(CalibError::DimensionMismatch {
            what: "factors",
            expected: problem.n_units(),
            actual: g.len(),
        });
    }
    if let Some(labels) = labels {
        if labels.len() != problem.n_margins() {
            return Err(CalibError::DimensionMismatch {
                what: "margin labels",
                expected: problem.n_margins(),
                actual: labels.len(),
            });
        }
    }
    let before = problem.initial_totals();
    let after = problem.x().t().dot(&(problem.d() * g));
    Ok((0..problem.n_margins())
        .map(|j| MarginStat {
            label: labels.map_or_else(|| format!("col{j}"), |l| l[j].clone()),
            target: problem.total()[j],
            before: before[j],
            after: after[j],
        })
        .collect())
}

/// Five-number-plus-mean summary of the factors; `None` for an empty
/// vector.
pub fn weight_summary(g: &Array1<f64>) -> Option<WeightSummary> {
    if g.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = g.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    Some(WeightSummary {
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
        mean,
    })
}

/// Linear-interpolation quantile of an already-sorted slice.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}
