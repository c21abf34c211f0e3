//! margins — margin tables to calibration problems.
//!
//! Purpose
//! -------
//! Turn a user-facing margin specification (continuous variables with one
//! total each, categorical variables with per-modality targets) plus a
//! data matrix of raw columns into the validated design matrix and target
//! vector a [`CalibProblem`] needs, and map user cost vectors onto the
//! penalized solver's internal convention.
//!
//! Key behaviors
//! -------------
//! - A [`MarginSpec`] with `modalities == 0` is continuous: its data
//!   column passes through unchanged with one absolute target. With
//!   `modalities == m ≥ 2` the column holds integer codes `0..m` and is
//!   expanded into m indicator columns with one target per modality.
//! - Categorical targets given as population shares (each in [0, 1],
//!   summing to 1 within the variable) are converted to absolute units
//!   with the supplied population total; shares without a population
//!   total fail with [`CalibError::MissingPopulationTotal`].
//! - [`format_costs`] recycles a scalar across all columns and maps
//!   negative or non-finite entries to `f64::INFINITY` (exact
//!   enforcement); zero passes through (margin dropped by the penalized
//!   solver).
//! - A reweighting `gap` requested without a population total is legal
//!   but usually not what the caller means (the gap then constrains
//!   factors around totals in sample units); it is flagged with a
//!   [`CalibWarning::RiskyConfiguration`] and the build proceeds.
//!
//! Invariants & assumptions
//! ------------------------
//! - Data columns correspond to specs positionally: column j of `data`
//!   belongs to `specs[j]`.
//! - Codes must be exact non-negative integers below the declared
//!   modality count; any other value is an
//!   [`CalibError::InvalidCategoryCode`].
//! - All structural validation of the assembled problem (weights,
//!   finiteness, zero columns) is delegated to [`CalibProblem::new`].
//!
//! Downstream usage
//! ----------------
//! - The Python bindings build problems exclusively through
//!   [`build_problem`]; `report::margin_stats` labels its rows with the
//!   column names produced here.
//!
//! Testing notes
//! -------------
//! - Unit tests cover indicator expansion, share conversion and its
//!   missing-total failure, code validation, the gap warning, and every
//!   `format_costs` branch.
use ndarray::{Array1, Array2};

use crate::calibration::errors::{CalibError, CalibResult, CalibWarning};
use crate::calibration::options::CalibOptions;
use crate::calibration::problem::CalibProblem;

/// Shares are recognized when the categorical targets sum to 1 within
/// this tolerance (and every entry lies in [0, 1]).
const SHARE_SUM_TOL: f64 = 1e-6;

/// MarginSpec — one margin variable of the specification table.
///
/// Fields
/// ------
/// - `name`: label used in errors and reports.
/// - `modalities`: 0 for a continuous variable, m ≥ 2 for a categorical
///   one whose data column holds codes `0..m`.
/// - `totals`: one absolute total (continuous) or one target per modality
///   (categorical; absolute or shares).
#[derive(Debug, Clone, PartialEq)]
pub struct MarginSpec {
    pub name: String,
    pub modalities: usize,
    pub totals: Vec<f64>,
}

impl MarginSpec {
    /// Continuous margin: one raw column, one absolute total.
    pub fn continuous(name: &str, total: f64) -> MarginSpec {
        MarginSpec { name: name.to_string(), modalities: 0, totals: vec![total] }
    }

    /// Categorical margin: a coded column with one target per modality.
    pub fn categorical(name: &str, totals: Vec<f64>) -> MarginSpec {
        MarginSpec { name: name.to_string(), modalities: totals.len(), totals }
    }

    /// Number of design-matrix columns this margin expands to.
    fn width(&self) -> usize {
        if self.modalities == 0 { 1 } else { self.modalities }
    }

    /// Labels of the expanded columns, used by the reporting layer.
    pub(crate) fn column_labels(&self) -> Vec<String> {
        if self.modalities == 0 {
            vec![self.name.clone()]
        } else {
            (0..self.modalities).map(|m| format!("{}={m}", self.name)).collect()
        }
    }
}

/// Assemble a [`CalibProblem`] from raw data columns and margin specs.
///
/// Parameters
/// ----------
/// - `data`: one raw column per spec (codes for categorical margins,
///   values for continuous ones).
/// - `specs`: the margin table; positionally aligned with `data` columns.
/// - `d`: initial design weights.
/// - `pop_total`: population size used to convert share-based categorical
///   targets to absolute units.
/// - `options`: only consulted for the gap-without-population-total
///   warning.
///
/// Returns
/// -------
/// `CalibResult<(CalibProblem, Vec<CalibWarning>)>`
///   The validated problem plus non-fatal warnings.
///
/// Errors
/// ------
/// - `CalibError::DimensionMismatch` when the data column count disagrees
///   with the spec count, or a spec's totals length disagrees with its
///   modality count.
/// - `CalibError::InvalidOption` for a categorical margin declaring fewer
///   than 2 modalities.
/// - `CalibError::InvalidCategoryCode` for a non-integer or out-of-range
///   code.
/// - `CalibError::MissingPopulationTotal` for share-based targets without
///   a population total.
/// - Anything [`CalibProblem::new`] rejects on the assembled matrices.
pub fn build_problem(
    data: &Array2<f64>, specs: &[MarginSpec], d: Array1<f64>, pop_total: Option<f64>,
    options: &CalibOptions,
) -> CalibResult<(CalibProblem, Vec<CalibWarning>)> {
    if specs.is_empty() || data.nrows() == 0 {
        return Err(CalibError::EmptyProblem);
    }
    if data.ncols() != specs.len() {
        return Err(CalibError::DimensionMismatch {
            what: "data columns vs margin specs",
            expected: specs.len(),
            actual: data.ncols(),
        });
    }

    let mut warnings = Vec::new();
    if options.gap.is_some() && pop_total.is_none() {
        warnings.push(CalibWarning::RiskyConfiguration {
            reason: "a reweighting gap was requested without a population total; the gap \
                     will constrain factors against totals in sample units"
                .to_string(),
        });
    }

    let width: usize = specs.iter().map(MarginSpec::width).sum();
    let rows = data.nrows();
    let mut x = Array2::zeros((rows, width));
    let mut total = Array1::zeros(width);

    let mut col = 0;
    for (j, spec) in specs.iter().enumerate() {
        if spec.modalities == 0 {
            if spec.totals.len() != 1 {
                return Err(CalibError::DimensionMismatch {
                    what: "continuous margin totals",
                    expected: 1,
                    actual: spec.totals.len(),
                });
            }
            x.column_mut(col).assign(&data.column(j));
            total[col] = spec.totals[0];
            col += 1;
        } else {
            if spec.modalities < 2 {
                return Err(CalibError::InvalidOption {
                    name: "modalities",
                    value: spec.modalities as f64,
                    reason: "categorical margins need at least 2 modalities",
                });
            }
            if spec.totals.len() != spec.modalities {
                return Err(CalibError::DimensionMismatch {
                    what: "categorical margin totals",
                    expected: spec.modalities,
                    actual: spec.totals.len(),
                });
            }
            let targets = modality_targets(spec, pop_total)?;
            for (row, &code) in data.column(j).iter().enumerate() {
                let modality = decode(spec, row, code)?;
                x[[row, col + modality]] = 1.0;
            }
            for (m, &t) in targets.iter().enumerate() {
                total[col + m] = t;
            }
            col += spec.modalities;
        }
    }

    let problem = CalibProblem::new(x, d, total, None)?;
    Ok((problem, warnings))
}

/// Labels of all expanded design-matrix columns, in problem order.
pub fn column_labels(specs: &[MarginSpec]) -> Vec<String> {
    specs.iter().flat_map(|s| s.column_labels()).collect()
}

/// Map a raw user cost vector onto the internal per-column convention.
///
/// Parameters
/// ----------
/// - `raw`: either a single scalar (recycled across all columns) or one
///   entry per design-matrix column.
/// - `n_cols`: number of design-matrix columns of the target problem.
///
/// Returns
/// -------
/// `CalibResult<Array1<f64>>`
///   One cost per column; negative and non-finite entries become
///   `f64::INFINITY` (exact enforcement), zero passes through (margin
///   dropped).
///
/// Errors
/// ------
/// - `CalibError::InvalidCosts` for any other length.
pub fn format_costs(raw: &[f64], n_cols: usize) -> CalibResult<Array1<f64>> {
    let normalize = |c: f64| if !c.is_finite() || c < 0.0 { f64::INFINITY } else { c };
    match raw.len() {
        1 => Ok(Array1::from_elem(n_cols, normalize(raw[0]))),
        n if n == n_cols => Ok(Array1::from_iter(raw.iter().map(|&c| normalize(c)))),
        n => Err(CalibError::InvalidCosts { expected: n_cols, actual: n }),
    }
}

/// Per-modality absolute targets, converting shares when needed.
fn modality_targets(spec: &MarginSpec, pop_total: Option<f64>) -> CalibResult<Vec<f64>> {
    let sum: f64 = spec.totals.iter().sum();
    let share_like = spec.totals.iter().all(|&t| (0.0..=1.0).contains(&t))
        && (sum - 1.0).abs() <= SHARE_SUM_TOL;
    if !share_like {
        return Ok(spec.totals.clone());
    }
    match pop_total {
        Some(pop) => Ok(spec.totals.iter().map(|&t| t * pop).collect()),
        None => Err(CalibError::MissingPopulationTotal { margin: spec.name.clone() }),
    }
}

/// Validate one categorical code and return its modality index.
fn decode(spec: &MarginSpec, row: usize, code: f64) -> CalibResult<usize> {
    if code.fract() == 0.0 && code >= 0.0 && (code as usize) < spec.modalities {
        Ok(code as usize)
    } else {
        Err(CalibError::InvalidCategoryCode { margin: spec.name.clone(), row, code })
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
    // - Indicator expansion and positional alignment of mixed margins.
    // - Share-to-absolute conversion and the missing-population-total error.
    // - Code validation (non-integer and out-of-range).
    // - The gap-without-population-total warning.
    // - Every `format_costs` branch.
    //
    // They intentionally DO NOT cover:
    // - Structural problem validation (problem tests) or solving.
    // -------------------------------------------------------------------------

    fn mixed_specs() -> Vec<MarginSpec> {
        vec![
            MarginSpec::categorical("region", vec![30.0, 70.0]),
            MarginSpec::continuous("income", 5200.0),
        ]
    }

    /// Region codes in column 0, income in column 1.
    fn mixed_data() -> Array2<f64> {
        array![[0.0, 100.0], [1.0, 200.0], [1.0, 300.0], [0.0, 400.0]]
    }

    #[test]
    // Purpose
    // -------
    // Verify the expansion: a 2-modality categorical plus a continuous
    // margin yield a 3-column design matrix with indicators and the raw
    // column, and the targets land in the matching slots.
    //
    // Given
    // -----
    // - The mixed specs and data, unit weights, no population total.
    //
    // Expect
    // ------
    // - X = [indicators(region), income]; total = [30, 70, 5200]; labels
    //   ["region=0", "region=1", "income"]; no warnings.
    fn expands_mixed_margins_positionally() {
        // Arrange
        let specs = mixed_specs();
        let d = array![1.0, 1.0, 1.0, 1.0];

        // Act
        let (problem, warnings) =
            build_problem(&mixed_data(), &specs, d, None, &CalibOptions::default()).unwrap();

        // Assert
        assert!(warnings.is_empty());
        assert_eq!(problem.n_margins(), 3);
        let expected_x = array![
            [1.0, 0.0, 100.0],
            [0.0, 1.0, 200.0],
            [0.0, 1.0, 300.0],
            [1.0, 0.0, 400.0]
        ];
        assert_eq!(problem.x(), &expected_x);
        assert_eq!(problem.total(), &array![30.0, 70.0, 5200.0]);
        assert_eq!(column_labels(&specs), vec!["region=0", "region=1", "income"]);
    }

    #[test]
    // Purpose
    // -------
    // Verify share handling: share-based categorical targets are scaled by
    // the population total, and fail without one.
    //
    // Given
    // -----
    // - Region targets [0.3, 0.7] with and without pop_total = 100.
    //
    // Expect
    // ------
    // - With the total: targets [30, 70]. Without: MissingPopulationTotal
    //   naming the margin.
    fn converts_shares_and_requires_population_total() {
        let specs = vec![
            MarginSpec::categorical("region", vec![0.3, 0.7]),
            MarginSpec::continuous("income", 5200.0),
        ];
        let d = array![1.0, 1.0, 1.0, 1.0];

        let (problem, _) = build_problem(
            &mixed_data(),
            &specs,
            d.clone(),
            Some(100.0),
            &CalibOptions::default(),
        )
        .unwrap();
        assert_eq!(problem.total(), &array![30.0, 70.0, 5200.0]);

        let err =
            build_problem(&mixed_data(), &specs, d, None, &CalibOptions::default()).unwrap_err();
        assert!(
            matches!(err, CalibError::MissingPopulationTotal { ref margin } if margin == "region")
        );
    }

    #[test]
    // Purpose
    // -------
    // Verify code validation: non-integer and out-of-range codes are
    // rejected with the margin name, row, and offending code.
    //
    // Given
    // -----
    // - A region column holding 1.5, then one holding 2 (modalities = 2).
    //
    // Expect
    // ------
    // - InvalidCategoryCode with the matching row in both cases.
    fn rejects_bad_category_codes() {
        let specs = vec![MarginSpec::categorical("region", vec![30.0, 70.0])];
        let d = array![1.0, 1.0];

        let err = build_problem(
            &array![[0.0], [1.5]],
            &specs,
            d.clone(),
            None,
            &CalibOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CalibError::InvalidCategoryCode { row: 1, .. }));

        let err =
            build_problem(&array![[2.0], [0.0]], &specs, d, None, &CalibOptions::default())
                .unwrap_err();
        assert!(matches!(err, CalibError::InvalidCategoryCode { row: 0, .. }));
    }

    #[test]
    // Purpose
    // -------
    // Verify the gap warning: requesting a gap without a population total
    // is flagged but does not abort the build.
    //
    // Given
    // -----
    // - The mixed specs with absolute targets, gap = 0.1, no pop_total.
    //
    // Expect
    // ------
    // - The build succeeds with one RiskyConfiguration warning.
    fn warns_on_gap_without_population_total() {
        let d = array![1.0, 1.0, 1.0, 1.0];
        let options = CalibOptions { gap: Some(0.1), ..CalibOptions::default() };

        let (_, warnings) =
            build_problem(&mixed_data(), &mixed_specs(), d, None, &options).unwrap();

        assert!(matches!(
            warnings.as_slice(),
            [CalibWarning::RiskyConfiguration { .. }]
        ));
    }

    #[test]
    // Purpose
    // -------
    // Verify every `format_costs` branch: scalar recycling, negative and
    // non-finite mapping to infinity, zero passthrough, and the length
    // rejection.
    //
    // Given
    // -----
    // - A scalar, a full vector with a negative, a NaN, and a zero entry,
    //   and a wrong-length vector, against 4 columns.
    //
    // Expect
    // ------
    // - Recycled [2, 2, 2, 2]; mapped [1, inf, inf, 0]; InvalidCosts for
    //   length 3.
    fn format_costs_covers_all_branches() {
        let recycled = format_costs(&[2.0], 4).unwrap();
        assert_eq!(recycled, array![2.0, 2.0, 2.0, 2.0]);

        let mapped = format_costs(&[1.0, -5.0, f64::NAN, 0.0], 4).unwrap();
        assert_eq!(mapped[0], 1.0);
        assert_eq!(mapped[1], f64::INFINITY);
        assert_eq!(mapped[2], f64::INFINITY);
        assert_eq!(mapped[3], 0.0);

        let err = format_costs(&[1.0, 1.0, 1.0], 4).unwrap_err();
        assert!(matches!(err, CalibError::InvalidCosts { expected: 4, actual: 3 }));
    }
}
