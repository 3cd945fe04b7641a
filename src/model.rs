//! The attenuation model registry.
//!
//! Light yield along a scintillating fiber is modelled as one or two
//! exponential decay terms, optionally on top of a constant offset. Each model
//! family is a pure function of position and a fixed-length parameter vector;
//! the registry carries, per family, the parameter labels and display units,
//! the analytic parameter gradient and position slope, preset seeds and box
//! bounds for the standard fiber scan, and the additive term decomposition.
//!
//! All variants are stateless and re-entrant; nothing here is mutated by a
//! fit.

use crate::error::{AttenFitError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// The closed family of attenuation models.
///
/// Adding a model means adding a variant and extending every match below,
/// including [`ModelKind::decompose`]; the compiler enforces that a new family
/// declares its term decomposition alongside its evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// `y = I0 * exp(-x/lambda) + C`, 3 parameters `(I0, lambda, C)`.
    SingleExpOffset,
    /// `y = I1 * exp(-x/lambda1) + I2 * exp(-x/lambda2)`, 4 parameters.
    DoubleExp,
    /// `y = I1 * exp(-x/lambda1) + I2 * exp(-x/lambda2) + C`, 5 parameters.
    DoubleExpOffset,
}

impl ModelKind {
    /// Number of parameters in this model family.
    pub fn parameter_count(&self) -> usize {
        match self {
            ModelKind::SingleExpOffset => 3,
            ModelKind::DoubleExp => 4,
            ModelKind::DoubleExpOffset => 5,
        }
    }

    /// Human labels for each parameter, in vector order.
    pub fn parameter_labels(&self) -> &'static [&'static str] {
        match self {
            ModelKind::SingleExpOffset => &["I0", "lambda", "const"],
            ModelKind::DoubleExp => &["I1", "lambda1", "I2", "lambda2"],
            ModelKind::DoubleExpOffset => &["I1", "lambda1", "I2", "lambda2", "const"],
        }
    }

    /// Display units for each parameter: charge in arbitrary units, decay
    /// lengths in centimeters.
    pub fn parameter_units(&self) -> &'static [&'static str] {
        match self {
            ModelKind::SingleExpOffset => &["a.u.", "cm", "a.u."],
            ModelKind::DoubleExp => &["a.u.", "cm", "a.u.", "cm"],
            ModelKind::DoubleExpOffset => &["a.u.", "cm", "a.u.", "cm", "a.u."],
        }
    }

    /// Check a parameter vector against this family's arity.
    pub fn check_params(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.parameter_count() {
            return Err(AttenFitError::DimensionMismatch(format!(
                "expected {} parameters for {:?}, got {}",
                self.parameter_count(),
                self,
                params.len()
            )));
        }
        Ok(())
    }

    /// Evaluate the model at a single position.
    ///
    /// `params` must have exactly [`parameter_count`](Self::parameter_count)
    /// entries; callers on the public surface go through
    /// [`predict`](Self::predict), which checks.
    pub fn value(&self, x: f64, params: &[f64]) -> f64 {
        match self {
            ModelKind::SingleExpOffset => params[0] * (-x / params[1]).exp() + params[2],
            ModelKind::DoubleExp => {
                params[0] * (-x / params[1]).exp() + params[2] * (-x / params[3]).exp()
            }
            ModelKind::DoubleExpOffset => {
                params[0] * (-x / params[1]).exp()
                    + params[2] * (-x / params[3]).exp()
                    + params[4]
            }
        }
    }

    /// Evaluate the model over a position vector.
    pub fn predict(&self, x: &Array1<f64>, params: &[f64]) -> Result<Array1<f64>> {
        self.check_params(params)?;
        Ok(x.mapv(|xi| self.value(xi, params)))
    }

    /// Analytic gradient of the model value with respect to each parameter,
    /// written into `out` (length = parameter count).
    pub fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]) {
        match self {
            ModelKind::SingleExpOffset => {
                let e = (-x / params[1]).exp();
                out[0] = e;
                out[1] = params[0] * e * x / (params[1] * params[1]);
                out[2] = 1.0;
            }
            ModelKind::DoubleExp => {
                let e1 = (-x / params[1]).exp();
                let e2 = (-x / params[3]).exp();
                out[0] = e1;
                out[1] = params[0] * e1 * x / (params[1] * params[1]);
                out[2] = e2;
                out[3] = params[2] * e2 * x / (params[3] * params[3]);
            }
            ModelKind::DoubleExpOffset => {
                let e1 = (-x / params[1]).exp();
                let e2 = (-x / params[3]).exp();
                out[0] = e1;
                out[1] = params[0] * e1 * x / (params[1] * params[1]);
                out[2] = e2;
                out[3] = params[2] * e2 * x / (params[3] * params[3]);
                out[4] = 1.0;
            }
        }
    }

    /// Analytic slope `df/dx` at a position, used to propagate position
    /// uncertainty into the effective variance.
    pub fn slope(&self, x: f64, params: &[f64]) -> f64 {
        match self {
            ModelKind::SingleExpOffset => -params[0] * (-x / params[1]).exp() / params[1],
            ModelKind::DoubleExp => {
                -params[0] * (-x / params[1]).exp() / params[1]
                    - params[2] * (-x / params[3]).exp() / params[3]
            }
            ModelKind::DoubleExpOffset => {
                -params[0] * (-x / params[1]).exp() / params[1]
                    - params[2] * (-x / params[3]).exp() / params[3]
            }
        }
    }

    /// Preset initial guess for the standard fiber scan.
    ///
    /// The double-exponential seed `(35, 450, 3, 40, 30)` and the
    /// single-exponential seed `(30, 450, 30)` are the values used for the
    /// BCF20XL1 measurement campaign. Seeds are presets, not defaults the
    /// solver falls back to: [`crate::solver::Fitter::fit`] always takes the
    /// guess explicitly.
    pub fn preset_guess(&self) -> Vec<f64> {
        match self {
            ModelKind::SingleExpOffset => vec![30.0, 450.0, 30.0],
            ModelKind::DoubleExp => vec![35.0, 450.0, 3.0, 40.0],
            ModelKind::DoubleExpOffset => vec![35.0, 450.0, 3.0, 40.0, 30.0],
        }
    }

    /// Preset box bounds matching [`preset_guess`](Self::preset_guess):
    /// intensities in `[0, 100]`, the long decay length in `[0, 6000]` cm, the
    /// short one in `[0, 100]` cm, the offset in `[0, 30]`. The
    /// single-exponential model is fitted unconstrained.
    pub fn preset_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        match self {
            ModelKind::SingleExpOffset => {
                (vec![f64::NEG_INFINITY; 3], vec![f64::INFINITY; 3])
            }
            ModelKind::DoubleExp => (vec![0.0; 4], vec![100.0, 6000.0, 100.0, 100.0]),
            ModelKind::DoubleExpOffset => {
                (vec![0.0; 5], vec![100.0, 6000.0, 100.0, 100.0, 30.0])
            }
        }
    }

    /// Split a fitted parameter vector into the model's additive terms.
    ///
    /// Pure parameter slicing; no re-fitting. The sum of the returned curves
    /// reproduces [`value`](Self::value) at every position.
    pub fn decompose(&self, params: &[f64]) -> Result<Vec<ComponentCurve>> {
        self.check_params(params)?;
        Ok(match self {
            ModelKind::SingleExpOffset => vec![
                ComponentCurve {
                    label: "single component",
                    term: Term::Exponential {
                        intensity: params[0],
                        decay_length: params[1],
                    },
                },
                ComponentCurve {
                    label: "constant",
                    term: Term::Constant { level: params[2] },
                },
            ],
            ModelKind::DoubleExp => vec![
                ComponentCurve {
                    label: "long component",
                    term: Term::Exponential {
                        intensity: params[0],
                        decay_length: params[1],
                    },
                },
                ComponentCurve {
                    label: "short component",
                    term: Term::Exponential {
                        intensity: params[2],
                        decay_length: params[3],
                    },
                },
            ],
            ModelKind::DoubleExpOffset => vec![
                ComponentCurve {
                    label: "long component",
                    term: Term::Exponential {
                        intensity: params[0],
                        decay_length: params[1],
                    },
                },
                ComponentCurve {
                    label: "short component",
                    term: Term::Exponential {
                        intensity: params[2],
                        decay_length: params[3],
                    },
                },
                ComponentCurve {
                    label: "constant",
                    term: Term::Constant { level: params[4] },
                },
            ],
        })
    }
}

/// One additive term of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Term {
    /// `intensity * exp(-x / decay_length)`
    Exponential { intensity: f64, decay_length: f64 },
    /// A constant offset.
    Constant { level: f64 },
}

/// A read-only sub-curve derived from a completed fit, evaluable at arbitrary
/// position for separate inspection or plotting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentCurve {
    label: &'static str,
    term: Term,
}

impl ComponentCurve {
    /// Legend label of this term ("long component", "short component",
    /// "single component", or "constant").
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn term(&self) -> Term {
        self.term
    }

    /// Evaluate the term at a position.
    pub fn value(&self, x: f64) -> f64 {
        match self.term {
            Term::Exponential {
                intensity,
                decay_length,
            } => intensity * (-x / decay_length).exp(),
            Term::Constant { level } => level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::finite_difference;
    use approx::assert_relative_eq;
    use ndarray::array;

    const ALL_MODELS: [ModelKind; 3] = [
        ModelKind::SingleExpOffset,
        ModelKind::DoubleExp,
        ModelKind::DoubleExpOffset,
    ];

    #[test]
    fn test_registry_shapes_agree() {
        for model in ALL_MODELS {
            let p = model.parameter_count();
            assert_eq!(model.parameter_labels().len(), p);
            assert_eq!(model.parameter_units().len(), p);
            assert_eq!(model.preset_guess().len(), p);
            let (lower, upper) = model.preset_bounds();
            assert_eq!(lower.len(), p);
            assert_eq!(upper.len(), p);
        }
    }

    #[test]
    fn test_double_exp_offset_value() {
        let params = [30.0, 50.0, 5.0, 300.0, 2.0];
        let model = ModelKind::DoubleExpOffset;

        // At x = 0 the exponentials are 1
        assert_relative_eq!(model.value(0.0, &params), 37.0, epsilon = 1e-12);

        let x = 300.0;
        let expected = 30.0 * (-6.0f64).exp() + 5.0 * (-1.0f64).exp() + 2.0;
        assert_relative_eq!(model.value(x, &params), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_predict_checks_arity() {
        let x = array![0.0, 10.0];
        let err = ModelKind::DoubleExpOffset
            .predict(&x, &[1.0, 2.0])
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::AttenFitError::DimensionMismatch(_)
        ));
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let x_values = array![3.0, 20.0, 80.0, 400.0];

        let cases: Vec<(ModelKind, Vec<f64>)> = vec![
            (ModelKind::SingleExpOffset, vec![30.0, 450.0, 2.0]),
            (ModelKind::DoubleExp, vec![30.0, 300.0, 5.0, 40.0]),
            (ModelKind::DoubleExpOffset, vec![30.0, 300.0, 5.0, 40.0, 2.0]),
        ];

        for (model, params) in cases {
            let p = model.parameter_count();
            let params_arr = Array1::from_vec(params.clone());

            let numeric = finite_difference::jacobian(
                |theta: &Array1<f64>| model.predict(&x_values, theta.as_slice().unwrap()),
                &params_arr,
                None,
            )
            .unwrap();

            let mut analytic = vec![0.0; p];
            for (i, &x) in x_values.iter().enumerate() {
                model.gradient(x, &params, &mut analytic);
                for j in 0..p {
                    assert_relative_eq!(
                        analytic[j],
                        numeric[[i, j]],
                        epsilon = 1e-4,
                        max_relative = 1e-3
                    );
                }
            }
        }
    }

    #[test]
    fn test_slope_matches_finite_difference() {
        let params = [30.0, 300.0, 5.0, 40.0, 2.0];
        let model = ModelKind::DoubleExpOffset;
        let h = 1e-5;

        for &x in &[3.0, 60.0, 150.0, 400.0] {
            let numeric = (model.value(x + h, &params) - model.value(x - h, &params)) / (2.0 * h);
            assert_relative_eq!(model.slope(x, &params), numeric, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_decomposition_sums_to_model() {
        let cases: Vec<(ModelKind, Vec<f64>)> = vec![
            (ModelKind::SingleExpOffset, vec![30.0, 450.0, 2.0]),
            (ModelKind::DoubleExp, vec![30.0, 300.0, 5.0, 40.0]),
            (ModelKind::DoubleExpOffset, vec![30.0, 300.0, 5.0, 40.0, 2.0]),
        ];

        for (model, params) in cases {
            let components = model.decompose(&params).unwrap();
            for &x in &[0.0, 3.0, 20.0, 100.0, 400.0] {
                let sum: f64 = components.iter().map(|c| c.value(x)).sum();
                assert_relative_eq!(sum, model.value(x, &params), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_decomposition_labels() {
        let components = ModelKind::DoubleExpOffset
            .decompose(&[30.0, 300.0, 5.0, 40.0, 2.0])
            .unwrap();
        let labels: Vec<_> = components.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["long component", "short component", "constant"]);

        match components[2].term() {
            Term::Constant { level } => assert_eq!(level, 2.0),
            other => panic!("expected constant term, got {:?}", other),
        }
    }
}
