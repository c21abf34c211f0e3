#[cfg(feature = "python-bindings")]
use ndarray::{Array1, Array2};

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::calibration::{
    bounds::BoundsStrategy, options::CalibOptions, CalibMethod,
};
#[cfg(feature = "python-bindings")]
use crate::margins::format_costs;

#[cfg(feature = "python-bindings")]
use numpy::{IntoPyArray, PyArrayMethods, PyReadonlyArray1, PyReadonlyArray2};

/// Pull a contiguous 1-D float64 view out of anything array-like.
///
/// Accepts numpy arrays as-is, pandas Series through `to_numpy(copy=False)`,
/// and plain Python sequences as a last resort (one copy into a fresh
/// array). Weight, target, and q vectors all arrive through here.
#[cfg(feature = "python-bindings")]
#[inline]
pub fn extract_f64_array<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>,
) -> PyResult<PyReadonlyArray1<'py, f64>> {
    if let Ok(direct) = raw_data.extract::<PyReadonlyArray1<f64>>() {
        if direct.as_slice().is_ok() {
            return Ok(direct);
        }
    }

    // Series path: ask pandas for a view and fall through when the column
    // is not already contiguous float64.
    if let Ok(converted) = raw_data.call_method("to_numpy", (false,), None) {
        if let Ok(series) = converted.extract::<PyReadonlyArray1<f64>>() {
            if series.as_slice().is_ok() {
                return Ok(series);
            }
        }
    }

    let values: Vec<f64> = raw_data.extract().map_err(|_| {
        pyo3::exceptions::PyTypeError::new_err(
            "expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64",
        )
    })?;
    Ok(values.into_pyarray(py).readonly())
}

#[cfg(feature = "python-bindings")]
#[inline]
pub fn extract_f64_matrix<'py>(
    _py: Python<'py>, raw_data: &Bound<'py, PyAny>,
) -> PyResult<Array2<f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray2<f64>>() {
        return Ok(arr_ro.as_array().to_owned());
    }

    // pandas.DataFrame path.
    if let Ok(obj) = raw_data.call_method("to_numpy", (false,), None) {
        if let Ok(frame_ro) = obj.extract::<PyReadonlyArray2<f64>>() {
            return Ok(frame_ro.as_array().to_owned());
        }
    }

    Err(pyo3::exceptions::PyTypeError::new_err(
        "expected a 2-D numpy.ndarray or pandas.DataFrame of float64",
    ))
}

/// Copy a validated 1-D Python array into an owned `Array1<f64>`.
#[cfg(feature = "python-bindings")]
pub fn owned_f64_vector<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>, what: &str,
) -> PyResult<Array1<f64>> {
    let arr = extract_f64_array(py, raw_data)?;
    let slice = arr.as_slice().map_err(|_| {
        PyValueError::new_err(format!(
            "{what} must be a 1-D contiguous float64 array or sequence"
        ))
    })?;
    Ok(Array1::from(slice.to_vec()))
}

/// Resolve the method name plus its method-specific arguments into a
/// [`CalibMethod`].
#[cfg(feature = "python-bindings")]
pub fn extract_method(
    method: Option<&str>, lower: Option<f64>, upper: Option<f64>, costs: Option<Vec<f64>>,
    n_cols: usize,
) -> PyResult<CalibMethod> {
    let name = method.unwrap_or("linear").to_lowercase();
    match name.as_str() {
        "linear" => Ok(CalibMethod::Linear),
        "raking" | "raking_ratio" => Ok(CalibMethod::Raking),
        "logit" => {
            let (lower, upper) = match (lower, upper) {
                (Some(l), Some(u)) => (l, u),
                _ => {
                    return Err(PyValueError::new_err(
                        "method='logit' requires both lower and upper bounds",
                    ));
                }
            };
            Ok(CalibMethod::Logit { lower, upper })
        }
        "min_bounds" | "bounds" => Ok(CalibMethod::MinBounds),
        "penalized" => {
            let raw = costs.ok_or_else(|| {
                PyValueError::new_err("method='penalized' requires a costs vector")
            })?;
            let costs = format_costs(&raw, n_cols)?;
            Ok(CalibMethod::Penalized { costs })
        }
        other => Err(PyValueError::new_err(format!(
            "invalid method {other:?} (expected 'linear', 'raking', 'logit', 'min_bounds', or 'penalized')"
        ))),
    }
}

/// Assemble validated solver options from Python-friendly optionals.
#[cfg(feature = "python-bindings")]
#[allow(clippy::too_many_arguments)]
pub fn extract_options(
    max_iter: Option<usize>, tolerance: Option<f64>, precision_bounds: Option<f64>,
    u_cost_penalized: Option<f64>, lambda: Option<f64>, gap: Option<f64>, force_simplex: bool,
    force_bisection: bool, verbose: bool,
) -> PyResult<CalibOptions> {
    let defaults = CalibOptions::default();
    let options = CalibOptions {
        max_iter: max_iter.unwrap_or(defaults.max_iter),
        tolerance: tolerance.unwrap_or(defaults.tolerance),
        precision_bounds: precision_bounds.unwrap_or(defaults.precision_bounds),
        u_cost_penalized: u_cost_penalized.unwrap_or(defaults.u_cost_penalized),
        lambda,
        gap,
        bounds_strategy: BoundsStrategy::from_flags(force_simplex, force_bisection),
        verbose,
    };
    options.validate()?;
    Ok(options)
}
