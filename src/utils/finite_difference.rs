//! Finite difference Jacobians.
//!
//! The solver uses the registry's analytic gradients; this forward-difference
//! Jacobian exists to cross-check them in tests and for ad hoc numerical
//! verification of new model families.

use crate::error::{AttenFitError, Result};
use ndarray::{Array1, Array2};

/// Default step size for finite differences.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Compute the Jacobian of a vector-valued function using forward
/// differences: `J[i, j] = d f_i / d params_j`.
///
/// The step is adapted to the scale of each parameter: `|p_j| * epsilon` for
/// parameters larger than `epsilon` in magnitude, `epsilon` otherwise.
pub fn jacobian<F>(f: F, params: &Array1<f64>, epsilon: Option<f64>) -> Result<Array2<f64>>
where
    F: Fn(&Array1<f64>) -> Result<Array1<f64>>,
{
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();

    let base = f(params)?;
    let n_outputs = base.len();

    let mut jac = Array2::zeros((n_outputs, n_params));

    for j in 0..n_params {
        let param_j = params[j];
        let eps_j = if param_j.abs() > eps {
            param_j.abs() * eps
        } else {
            eps
        };

        let mut perturbed = params.clone();
        perturbed[j] += eps_j;

        let shifted = f(&perturbed)?;
        if shifted.len() != n_outputs {
            return Err(AttenFitError::DimensionMismatch(format!(
                "function returned {} outputs at the perturbed point, expected {}",
                shifted.len(),
                n_outputs
            )));
        }

        for i in 0..n_outputs {
            jac[[i, j]] = (shifted[i] - base[i]) / eps_j;
        }
    }

    Ok(jac)
}
