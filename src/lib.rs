//! # attenfit
//!
//! `attenfit` fits attenuation curves of scintillating-fiber light yield
//! versus readout position to single- and double-exponential decay models,
//! under box constraints on the parameters, and reports parameter
//! uncertainties and goodness-of-fit statistics.
//!
//! The library provides:
//! - An aggregator turning per-site (value, uncertainty) measurements into an
//!   ordered, immutable dataset, tolerant of missing sites
//! - A closed registry of attenuation models with labels, units, analytic
//!   gradients, and per-term decomposition
//! - A box-constrained Levenberg-Marquardt solver with covariance and
//!   standard-error reporting
//! - A goodness-of-fit evaluator sharing the solver's weighting convention
//!
//! ## Basic Usage
//!
//! ```
//! use attenfit::{aggregate, fit, Measurement, ModelKind};
//!
//! // Mean charge per readout position, with uncertainties
//! let measurements: Vec<Option<Measurement>> = [
//!     (36.2, 0.1), (33.5, 0.1), (30.9, 0.1), (28.7, 0.1), (26.9, 0.1),
//!     (25.4, 0.1), (22.7, 0.1), (20.9, 0.1), (18.6, 0.1), (17.1, 0.1),
//! ]
//! .iter()
//! .map(|&(value, error)| Some(Measurement::new(value, error)))
//! .collect();
//! let positions = [3.0, 20.0, 40.0, 60.0, 80.0, 100.0, 150.0, 200.0, 300.0, 400.0];
//!
//! let dataset = aggregate(&measurements, &positions, 0.1, 10.0).unwrap();
//!
//! let model = ModelKind::DoubleExpOffset;
//! let (lower, upper) = model.preset_bounds();
//! let result = fit(&dataset, model, &model.preset_guess(), &lower, &upper).unwrap();
//!
//! assert_eq!(result.params.len(), 5);
//! for curve in result.components().unwrap() {
//!     let _ = curve.value(100.0);
//! }
//! ```

// Public modules
pub mod bounds;
pub mod dataset;
pub mod error;
pub mod model;
pub mod report;
pub mod solver;
pub mod stats;

mod utils;

// Re-exports for convenience
pub use dataset::{aggregate, Dataset, Measurement, Sample};
pub use error::{AttenFitError, Result};
pub use model::{ComponentCurve, ModelKind, Term};
pub use report::{parameter_summary, FitReport};
pub use solver::{fit, fit_many, FitJob, FitResult, Fitter, SolverConfig};
pub use stats::{evaluate, GoodnessOfFit};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
