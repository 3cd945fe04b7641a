//! Box-constrained Levenberg-Marquardt fitting.
//!
//! The solver minimizes the weighted residual sum of squares of an
//! attenuation model over a dataset, subject to per-parameter box
//! constraints. Internally it runs an unconstrained Levenberg-Marquardt loop
//! in transformed coordinates (see [`crate::bounds`]), so every parameter
//! vector it evaluates or reports satisfies the bounds by construction.
//!
//! Fits are pure functions of their inputs: all iteration state is local, and
//! independent fits may run concurrently without synchronization
//! ([`fit_many`]).

use crate::bounds::{self, Bounds};
use crate::dataset::Dataset;
use crate::error::{AttenFitError, Result};
use crate::model::{ComponentCurve, ModelKind};
use crate::stats;
use crate::utils::matrix_convert::{
    faer_to_ndarray, faer_vec_to_ndarray, ndarray_to_faer, ndarray_vec_to_faer,
};
use faer::{Col, Mat};
use log::debug;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration options for the bounded Levenberg-Marquardt solver.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Maximum number of accepted iterations. Default: 200
    pub max_iterations: usize,

    /// Tolerance for relative decrease of the weighted sum of squares.
    /// Default: 1e-8
    pub ftol: f64,

    /// Tolerance for change in (internal) parameter values. Default: 1e-8
    pub xtol: f64,

    /// Tolerance for gradient norm. Default: 1e-8
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase/decrease the damping. Default: 10.0
    pub lambda_factor: f64,

    /// Minimum damping. Default: 1e-10
    pub min_lambda: f64,

    /// Maximum damping. Default: 1e10
    pub max_lambda: f64,

    /// Fold position uncertainty into the weights through the local model
    /// slope, recomputed each iteration. Default: false
    pub weight_by_position_error: bool,

    /// Scale the covariance by the reduced chi-square. Off by default: the
    /// supplied uncertainties are treated as absolute, matching the "S" fit
    /// option of the upstream analysis.
    pub rescale_errors: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            initial_lambda: 1e-3,
            lambda_factor: 10.0,
            min_lambda: 1e-10,
            max_lambda: 1e10,
            weight_by_position_error: false,
            rescale_errors: false,
        }
    }
}

/// Result of a bounded fit.
///
/// A fit that stops at the iteration cap, or whose Jacobian is rank-deficient
/// at the solution, still returns its last parameter estimate here with
/// `converged = false` so downstream reporting can flag marginal fits instead
/// of discarding them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// The fitted model family.
    pub model: ModelKind,

    /// Fitted parameter values. Always inside the requested box.
    pub params: Array1<f64>,

    /// One-sigma standard errors (square roots of the covariance diagonal).
    /// NaN when the covariance could not be formed.
    pub standard_errors: Array1<f64>,

    /// Parameter covariance matrix `(J^T W J)^-1` at the solution, in
    /// external parameter coordinates. NaN-filled when the weighted normal
    /// matrix is numerically rank-deficient.
    pub covariance: Array2<f64>,

    /// Weighted residual sum of squares at the solution.
    pub chi_square: f64,

    /// Degrees of freedom `n - p`.
    pub ndf: i64,

    /// `chi_square / ndf`.
    pub reduced_chi_square: f64,

    /// Whether the solver met a convergence criterion (and the covariance
    /// could be formed).
    pub converged: bool,

    /// Number of accepted iterations.
    pub iterations: usize,

    /// Human-readable description of how the fit terminated.
    pub message: String,

    /// Weighted residuals `(y_i - f(x_i)) / sigma_i` at the solution.
    pub residuals: Array1<f64>,
}

impl FitResult {
    /// Additive component curves of the fitted model.
    pub fn components(&self) -> Result<Vec<ComponentCurve>> {
        self.model.decompose(&self.params.to_vec())
    }
}

/// One entry of a batch fit.
#[derive(Debug, Clone)]
pub struct FitJob {
    pub dataset: Dataset,
    pub model: ModelKind,
    pub guess: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// The bounded Levenberg-Marquardt fitter.
#[derive(Debug, Clone, Default)]
pub struct Fitter {
    config: SolverConfig,
}

/// Outcome of one solver iteration.
enum IterationStatus {
    Continue,
    Converged(String),
    Stopped(String),
}

impl Fitter {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Fit `model` to `dataset` from `guess`, constrained to
    /// `lower <= theta <= upper`.
    ///
    /// The guess is mandatory; there is no automatic seeding, because the
    /// objective is multimodal in decay-length space for well-separated
    /// decay lengths. Preconditions checked before any iteration:
    ///
    /// * `dataset.len() >= parameter_count + 1`, else `InsufficientData`;
    /// * `lower[i] <= upper[i]` and `guess` inside the box, else
    ///   `InvalidBounds`.
    pub fn fit(
        &self,
        dataset: &Dataset,
        model: ModelKind,
        guess: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Result<FitResult> {
        model.check_params(guess)?;
        let p = model.parameter_count();
        let n = dataset.len();
        if n < p + 1 {
            return Err(AttenFitError::InsufficientData {
                n_samples: n,
                n_params: p,
            });
        }
        let boxes = bounds::validate(guess, lower, upper)?;

        // Map the seed into internal coordinates. A seed resting exactly on a
        // finite bound has zero transform derivative and could never move, so
        // it is started just inside the box.
        let mut internal = Array1::zeros(p);
        for i in 0..p {
            internal[i] = boxes[i].to_internal(start_inside(&boxes[i], guess[i]))?;
        }

        let objective = Objective {
            dataset,
            model,
            boxes: &boxes,
            weight_by_position_error: self.config.weight_by_position_error,
        };

        let mut lambda = self.config.initial_lambda;
        let mut params = objective.external(&internal);
        let mut sigma = objective.sigma(&params);
        let mut residuals = objective.residuals(&params, &sigma);
        let mut cost: f64 = residuals.iter().map(|r| r * r).sum();
        if !cost.is_finite() {
            return Err(AttenFitError::FunctionEvaluation(format!(
                "model evaluation is not finite at the initial guess {:?}",
                params
            )));
        }

        let mut iterations = 0;
        let mut converged = false;
        let mut message;

        loop {
            let jac = objective.jacobian_internal(&internal, &params, &sigma);
            let j = ndarray_to_faer(&jac)?;
            let r = ndarray_vec_to_faer(&residuals)?;

            // Gradient of the cost in internal coordinates: g = J^T r
            let g = j.transpose() * &r;
            let gradient_norm = g.norm_l2();
            if gradient_norm < self.config.gtol {
                converged = true;
                message = format!(
                    "gradient convergence: ||g|| = {:.2e} < {:.2e}",
                    gradient_norm, self.config.gtol
                );
                break;
            }

            let step = match self.calculate_step(&j, &r, lambda)? {
                Some(s) => s,
                None => {
                    // Singular normal equations; more damping makes them
                    // positive definite again
                    lambda = (lambda * self.config.lambda_factor).min(self.config.max_lambda);
                    if lambda == self.config.max_lambda {
                        message = "normal equations singular at maximum damping".to_string();
                        break;
                    }
                    continue;
                }
            };

            let new_internal = &internal + &step;
            let new_params = objective.external(&new_internal);
            let new_sigma = objective.sigma(&new_params);
            let new_residuals = objective.residuals(&new_params, &new_sigma);
            let new_cost: f64 = new_residuals.iter().map(|r| r * r).sum();

            if new_cost.is_finite() && new_cost < cost {
                let step_size = step.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
                let cost_change = (cost - new_cost) / cost.max(1e-300);

                internal = new_internal;
                params = new_params;
                sigma = new_sigma;
                residuals = new_residuals;
                cost = new_cost;
                lambda = (lambda / self.config.lambda_factor).max(self.config.min_lambda);
                iterations += 1;

                let status = if step_size < self.config.xtol {
                    IterationStatus::Converged(format!(
                        "parameter convergence: |dx| = {:.2e} < {:.2e}",
                        step_size, self.config.xtol
                    ))
                } else if cost_change < self.config.ftol {
                    IterationStatus::Converged(format!(
                        "cost convergence: |df|/|f| = {:.2e} < {:.2e}",
                        cost_change, self.config.ftol
                    ))
                } else if iterations >= self.config.max_iterations {
                    IterationStatus::Stopped(format!(
                        "maximum iterations ({}) reached",
                        self.config.max_iterations
                    ))
                } else {
                    IterationStatus::Continue
                };

                match status {
                    IterationStatus::Continue => (),
                    IterationStatus::Converged(m) => {
                        converged = true;
                        message = m;
                        break;
                    }
                    IterationStatus::Stopped(m) => {
                        message = m;
                        break;
                    }
                }
            } else {
                // Step rejected: increase damping and retry
                lambda = (lambda * self.config.lambda_factor).min(self.config.max_lambda);
                if lambda == self.config.max_lambda {
                    message = "cost not reduced at maximum damping".to_string();
                    break;
                }
            }
        }

        let chi_square = cost;
        let ndf = n as i64 - p as i64;
        let reduced_chi_square = chi_square / ndf as f64;

        // Covariance in external parameter coordinates, from the weighted
        // Gauss-Newton normal matrix at the solution.
        let jac_external = objective.jacobian_external(&params, &sigma);
        let normal = jac_external.t().dot(&jac_external);
        let (covariance, standard_errors) = match invert_spd(&normal) {
            Some(mut covariance) => {
                if self.config.rescale_errors {
                    covariance.mapv_inplace(|c| c * reduced_chi_square);
                }
                let standard_errors = Array1::from_shape_fn(p, |i| {
                    let var = covariance[[i, i]];
                    if var >= 0.0 {
                        var.sqrt()
                    } else {
                        f64::NAN
                    }
                });
                (covariance, standard_errors)
            }
            None => {
                converged = false;
                message = format!(
                    "{}; Jacobian rank-deficient at solution, standard errors unavailable",
                    message
                );
                (
                    Array2::from_elem((p, p), f64::NAN),
                    Array1::from_elem(p, f64::NAN),
                )
            }
        };

        debug!(
            "{:?} fit finished after {} iterations: {} (chi2/ndf = {:.4})",
            model, iterations, message, reduced_chi_square
        );

        Ok(FitResult {
            model,
            params: Array1::from_vec(params),
            standard_errors,
            covariance,
            chi_square,
            ndf,
            reduced_chi_square,
            converged,
            iterations,
            message,
            residuals,
        })
    }

    /// Solve the damped normal equations `(J^T J + lambda I) delta = -J^T r`.
    ///
    /// Returns `None` when the damped matrix is not positive definite; the
    /// caller increases the damping and retries.
    fn calculate_step(
        &self,
        j: &Mat<f64>,
        r: &Col<f64>,
        lambda: f64,
    ) -> Result<Option<Array1<f64>>> {
        let j_nd = faer_to_ndarray(j)?;
        let r_nd = faer_vec_to_ndarray(r)?;

        let jt = j_nd.t();
        let mut a = jt.dot(&j_nd);
        for i in 0..a.nrows() {
            a[[i, i]] += lambda;
        }
        let rhs = jt.dot(&r_nd);

        Ok(match cholesky_factor(&a) {
            Some(l) => Some(-cholesky_solve(&l, &rhs)),
            None => None,
        })
    }
}

/// Fit with the default configuration.
pub fn fit(
    dataset: &Dataset,
    model: ModelKind,
    guess: &[f64],
    lower: &[f64],
    upper: &[f64],
) -> Result<FitResult> {
    Fitter::with_default_config().fit(dataset, model, guess, lower, upper)
}

/// Fit a batch of independent (dataset, model) pairs in parallel.
///
/// Each job owns its dataset and iteration state, so no synchronization is
/// needed; results come back in job order.
pub fn fit_many(config: &SolverConfig, jobs: &[FitJob]) -> Vec<Result<FitResult>> {
    let fitter = Fitter::new(config.clone());
    jobs.par_iter()
        .map(|job| fitter.fit(&job.dataset, job.model, &job.guess, &job.lower, &job.upper))
        .collect()
}

/// Local, immutable view of one fit's objective function.
struct Objective<'a> {
    dataset: &'a Dataset,
    model: ModelKind,
    boxes: &'a [Bounds],
    weight_by_position_error: bool,
}

impl Objective<'_> {
    /// Map internal coordinates to external parameter values.
    fn external(&self, internal: &Array1<f64>) -> Vec<f64> {
        internal
            .iter()
            .zip(self.boxes)
            .map(|(&u, b)| b.to_external(u))
            .collect()
    }

    /// Effective per-sample uncertainties at the current parameters.
    fn sigma(&self, params: &[f64]) -> Vec<f64> {
        stats::effective_sigma(
            self.dataset,
            self.model,
            params,
            self.weight_by_position_error,
        )
    }

    /// Weighted residuals `(y_i - f(x_i, theta)) / sigma_i`.
    ///
    /// A non-finite residual surfaces as a non-finite cost, which the loop
    /// treats as a rejected step.
    fn residuals(&self, params: &[f64], sigma: &[f64]) -> Array1<f64> {
        Array1::from_shape_fn(self.dataset.len(), |i| {
            let s = &self.dataset.samples()[i];
            (s.value - self.model.value(s.position, params)) / sigma[i]
        })
    }

    /// Jacobian of the weighted residuals with respect to the internal
    /// coordinates: chain rule through the bounds transform, negated because
    /// the residual is `y - f`.
    fn jacobian_internal(
        &self,
        internal: &Array1<f64>,
        params: &[f64],
        sigma: &[f64],
    ) -> Array2<f64> {
        let n = self.dataset.len();
        let p = params.len();
        let scale: Vec<f64> = internal
            .iter()
            .zip(self.boxes)
            .map(|(&u, b)| b.dext_dint(u))
            .collect();

        let mut jac = Array2::zeros((n, p));
        let mut grad = vec![0.0; p];
        for (i, s) in self.dataset.samples().iter().enumerate() {
            self.model.gradient(s.position, params, &mut grad);
            for j in 0..p {
                jac[[i, j]] = -grad[j] * scale[j] / sigma[i];
            }
        }
        jac
    }

    /// Jacobian of the weighted residuals with respect to the external
    /// parameters, for the covariance estimate.
    fn jacobian_external(&self, params: &[f64], sigma: &[f64]) -> Array2<f64> {
        let n = self.dataset.len();
        let p = params.len();

        let mut jac = Array2::zeros((n, p));
        let mut grad = vec![0.0; p];
        for (i, s) in self.dataset.samples().iter().enumerate() {
            self.model.gradient(s.position, params, &mut grad);
            for j in 0..p {
                jac[[i, j]] = -grad[j] / sigma[i];
            }
        }
        jac
    }
}

/// Move a seed that rests exactly on a finite bound just inside the box.
fn start_inside(b: &Bounds, value: f64) -> f64 {
    if b.has_lower() && b.has_upper() {
        let margin = 1e-6 * (b.max - b.min);
        if margin > 0.0 {
            value.clamp(b.min + margin, b.max - margin)
        } else {
            value
        }
    } else if b.has_lower() && value <= b.min {
        b.min + 1e-6 * (1.0 + b.min.abs())
    } else if b.has_upper() && value >= b.max {
        b.max - 1e-6 * (1.0 + b.max.abs())
    } else {
        value
    }
}

/// Cholesky factorization `A = L L^T` of a symmetric matrix, returning the
/// lower factor, or `None` when the matrix is not positive definite.
fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = a.clone();

    for k in 0..n {
        for j in 0..k {
            l[[k, k]] -= l[[k, j]] * l[[k, j]];
        }
        if l[[k, k]] <= 0.0 || !l[[k, k]].is_finite() {
            return None;
        }
        let d = l[[k, k]].sqrt();
        l[[k, k]] = d;

        for i in k + 1..n {
            for j in 0..k {
                l[[i, k]] -= l[[i, j]] * l[[k, j]];
            }
            l[[i, k]] /= d;
        }
    }

    Some(l)
}

/// Solve `L L^T x = b` given the lower Cholesky factor.
fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // Forward substitution: L y = b
    let mut y = b.clone();
    for i in 0..n {
        for j in 0..i {
            let yj = y[j];
            y[i] -= l[[i, j]] * yj;
        }
        y[i] /= l[[i, i]];
    }

    // Backward substitution: L^T x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = y[i];
        for j in i + 1..n {
            x[i] -= l[[j, i]] * x[j];
        }
        x[i] /= l[[i, i]];
    }

    x
}

/// Invert a symmetric positive definite matrix via Cholesky, column by
/// column. `None` when the factorization fails (rank deficiency).
fn invert_spd(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let l = cholesky_factor(a)?;

    let mut inv = Array2::zeros((n, n));
    for j in 0..n {
        let mut e = Array1::zeros(n);
        e[j] = 1.0;
        let col = cholesky_solve(&l, &e);
        for i in 0..n {
            inv[[i, j]] = col[i];
        }
    }
    Some(inv)
}
