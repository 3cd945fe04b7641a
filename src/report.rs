//! Plain-text and serializable fit summaries.
//!
//! The plotting and canvas layer lives outside this crate; what it needs from
//! here is a stable set of field names and units. `FitReport` is a flat,
//! serializable snapshot of a fit, and [`parameter_summary`] renders the
//! familiar `I1 = (... +/- ...) a.u.` block.

use crate::model::ModelKind;
use crate::solver::FitResult;
use serde::{Deserialize, Serialize};

/// A flat snapshot of a completed fit, suitable for persistence or for
/// handing to an external reporting layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub model: ModelKind,
    pub labels: Vec<String>,
    pub units: Vec<String>,
    pub params: Vec<f64>,
    pub standard_errors: Vec<f64>,
    pub chi_square: f64,
    pub ndf: i64,
    pub reduced_chi_square: f64,
    pub converged: bool,
}

impl FitReport {
    pub fn from_result(result: &FitResult) -> Self {
        Self {
            model: result.model,
            labels: result
                .model
                .parameter_labels()
                .iter()
                .map(|l| l.to_string())
                .collect(),
            units: result
                .model
                .parameter_units()
                .iter()
                .map(|u| u.to_string())
                .collect(),
            params: result.params.to_vec(),
            standard_errors: result.standard_errors.to_vec(),
            chi_square: result.chi_square,
            ndf: result.ndf,
            reduced_chi_square: result.reduced_chi_square,
            converged: result.converged,
        }
    }
}

/// Render a fitted-parameter block, one line per parameter, followed by the
/// goodness-of-fit line.
///
/// Decay lengths are printed with two decimals, charges with three, matching
/// the display convention of the upstream analysis.
pub fn parameter_summary(result: &FitResult) -> String {
    let labels = result.model.parameter_labels();
    let units = result.model.parameter_units();

    let mut out = String::new();
    for i in 0..labels.len() {
        let line = if units[i] == "cm" {
            format!(
                "{} = ({:.2} +/- {:.2}) {}\n",
                labels[i], result.params[i], result.standard_errors[i], units[i]
            )
        } else {
            format!(
                "{} = ({:.3} +/- {:.3}) {}\n",
                labels[i], result.params[i], result.standard_errors[i], units[i]
            )
        };
        out.push_str(&line);
    }

    out.push_str(&format!(
        "chi2/ndf = {:.3} (chi2 = {:.3}, ndf = {})",
        result.reduced_chi_square, result.chi_square, result.ndf
    ));
    if !result.converged {
        out.push_str("  [not converged]");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn fake_result() -> FitResult {
        FitResult {
            model: ModelKind::DoubleExpOffset,
            params: Array1::from_vec(vec![35.1234, 452.987, 3.21, 41.5, 2.05]),
            standard_errors: Array1::from_vec(vec![0.4567, 12.34, 0.11, 1.9, 0.08]),
            covariance: Array2::zeros((5, 5)),
            chi_square: 6.15,
            ndf: 5,
            reduced_chi_square: 1.23,
            converged: true,
            iterations: 17,
            message: "cost convergence".to_string(),
            residuals: Array1::zeros(10),
        }
    }

    #[test]
    fn test_summary_lines_and_units() {
        let summary = parameter_summary(&fake_result());

        assert!(summary.contains("I1 = (35.123 +/- 0.457) a.u."));
        assert!(summary.contains("lambda1 = (452.99 +/- 12.34) cm"));
        assert!(summary.contains("const = (2.050 +/- 0.080) a.u."));
        assert!(summary.contains("chi2/ndf = 1.230"));
        assert!(!summary.contains("[not converged]"));
    }

    #[test]
    fn test_summary_flags_marginal_fit() {
        let mut result = fake_result();
        result.converged = false;

        let summary = parameter_summary(&result);
        assert!(summary.contains("[not converged]"));
    }

    #[test]
    fn test_report_serde_round_trip() {
        let report = FitReport::from_result(&fake_result());

        let json = serde_json::to_string(&report).unwrap();
        let back: FitReport = serde_json::from_str(&json).unwrap();

        assert_eq!(back, report);
        assert_eq!(back.labels[1], "lambda1");
        assert_eq!(back.units[1], "cm");
    }
}
