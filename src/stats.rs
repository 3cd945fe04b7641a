//! Goodness-of-fit statistics.
//!
//! The evaluator shares the solver's exact weighting convention (same
//! effective variance), so a chi-square computed here is directly comparable
//! to the one a [`crate::solver::FitResult`] reports.

use crate::dataset::Dataset;
use crate::error::Result;
use crate::model::ModelKind;
use serde::{Deserialize, Serialize};

/// Weighted residual sum of squares, degrees of freedom, and their ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoodnessOfFit {
    /// `sum_i [(y_i - f(x_i, theta)) / sigma_i]^2`
    pub chi_square: f64,
    /// `n - p`; can be zero or negative for an overparameterized dataset.
    pub ndf: i64,
    /// `chi_square / ndf`, NaN when `ndf <= 0`.
    pub reduced_chi_square: f64,
}

/// Per-sample effective uncertainty.
///
/// Without position-error weighting this is the value uncertainty. With it,
/// position uncertainty is propagated through the local model slope:
/// `sigma_eff^2 = sigma_y^2 + (df/dx * sigma_x)^2`, evaluated at the supplied
/// parameters.
pub(crate) fn effective_sigma(
    dataset: &Dataset,
    model: ModelKind,
    params: &[f64],
    weight_by_position_error: bool,
) -> Vec<f64> {
    dataset
        .samples()
        .iter()
        .map(|s| {
            if weight_by_position_error {
                let slope = model.slope(s.position, params);
                (s.value_error * s.value_error + (slope * s.position_error).powi(2)).sqrt()
            } else {
                s.value_error
            }
        })
        .collect()
}

/// Compute chi-square, degrees of freedom, and reduced chi-square for a
/// parameter vector against a dataset.
///
/// `weight_by_position_error` must match the setting the fit used, or the
/// reported ratio is not comparable to the fit's own.
pub fn evaluate(
    dataset: &Dataset,
    model: ModelKind,
    params: &[f64],
    weight_by_position_error: bool,
) -> Result<GoodnessOfFit> {
    model.check_params(params)?;

    let sigma = effective_sigma(dataset, model, params, weight_by_position_error);
    let chi_square = dataset
        .samples()
        .iter()
        .zip(&sigma)
        .map(|(s, sg)| {
            let r = (s.value - model.value(s.position, params)) / sg;
            r * r
        })
        .sum::<f64>();

    let ndf = dataset.len() as i64 - model.parameter_count() as i64;
    let reduced_chi_square = if ndf > 0 {
        chi_square / ndf as f64
    } else {
        f64::NAN
    };

    Ok(GoodnessOfFit {
        chi_square,
        ndf,
        reduced_chi_square,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Sample;
    use approx::assert_relative_eq;

    fn dataset_from(points: &[(f64, f64, f64)]) -> Dataset {
        Dataset::new(
            points
                .iter()
                .map(|&(position, value, value_error)| Sample {
                    position,
                    value,
                    position_error: 0.0,
                    value_error,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_chi_square_zero_on_exact_model() {
        let params = [30.0, 450.0, 2.0];
        let model = ModelKind::SingleExpOffset;
        let points: Vec<(f64, f64, f64)> = [3.0, 20.0, 40.0, 80.0, 150.0]
            .iter()
            .map(|&x| (x, model.value(x, &params), 0.1))
            .collect();

        let gof = evaluate(&dataset_from(&points), model, &params, false).unwrap();

        assert_relative_eq!(gof.chi_square, 0.0, epsilon = 1e-20);
        assert_eq!(gof.ndf, 2);
        assert_relative_eq!(gof.reduced_chi_square, 0.0, epsilon = 1e-20);
    }

    #[test]
    fn test_chi_square_hand_computed() {
        // Model value 5 everywhere (I0 = 0), data off by 1 and 2 with sigma 0.5
        let model = ModelKind::SingleExpOffset;
        let params = [0.0, 100.0, 5.0];
        let dataset = dataset_from(&[(10.0, 6.0, 0.5), (20.0, 3.0, 0.5)]);

        let gof = evaluate(&dataset, model, &params, false).unwrap();

        // (1/0.5)^2 + (2/0.5)^2 = 4 + 16
        assert_relative_eq!(gof.chi_square, 20.0, epsilon = 1e-12);
        assert_eq!(gof.ndf, -1);
        assert!(gof.reduced_chi_square.is_nan());
    }

    #[test]
    fn test_ndf_zero_reports_nan_ratio() {
        let model = ModelKind::SingleExpOffset;
        let dataset = dataset_from(&[(3.0, 30.0, 0.1), (20.0, 25.0, 0.1), (40.0, 21.0, 0.1)]);

        let gof = evaluate(&dataset, model, &[30.0, 450.0, 2.0], false).unwrap();

        assert_eq!(gof.ndf, 0);
        assert!(gof.reduced_chi_square.is_nan());
        assert!(gof.chi_square.is_finite());
    }

    #[test]
    fn test_position_error_weighting_inflates_sigma() {
        let model = ModelKind::SingleExpOffset;
        let params = [30.0, 50.0, 2.0];
        let samples = vec![Sample {
            position: 10.0,
            value: 20.0,
            position_error: 1.0,
            value_error: 0.1,
        }];
        let dataset = Dataset::new(samples).unwrap();

        let plain = effective_sigma(&dataset, model, &params, false);
        let weighted = effective_sigma(&dataset, model, &params, true);

        assert_eq!(plain[0], 0.1);
        let slope = model.slope(10.0, &params);
        let expected = (0.1f64 * 0.1 + slope * slope).sqrt();
        assert_relative_eq!(weighted[0], expected, epsilon = 1e-12);
        assert!(weighted[0] > plain[0]);
    }
}
