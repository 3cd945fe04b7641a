//! Sample aggregation: turning per-site measurements into a fit-ready dataset.
//!
//! A fiber scan produces one mean-charge measurement per readout position,
//! each with its own uncertainty, and any individual site may be missing or
//! unreadable (an absent run file, a histogram without its fitted function).
//! The aggregator tolerates those gaps: bad sites are skipped with a warning
//! and the output dataset simply has fewer samples.

use crate::error::{AttenFitError, Result};
use log::warn;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// One data point of an attenuation curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Readout position along the fiber, in cm.
    pub position: f64,
    /// Measured mean charge, in arbitrary units.
    pub value: f64,
    /// Uncertainty on the position, in cm.
    pub position_error: f64,
    /// Uncertainty on the charge. Strictly positive.
    pub value_error: f64,
}

/// A raw per-site reading before positions are attached.
///
/// `position_error` overrides the aggregation-wide default for this site when
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub error: f64,
    pub position_error: Option<f64>,
}

impl Measurement {
    pub fn new(value: f64, error: f64) -> Self {
        Self {
            value,
            error,
            position_error: None,
        }
    }

    pub fn with_position_error(value: f64, error: f64, position_error: f64) -> Self {
        Self {
            value,
            error,
            position_error: Some(position_error),
        }
    }
}

/// An ordered, immutable sequence of samples.
///
/// Built once by [`aggregate`] (or directly from samples) and never mutated
/// afterwards; each fit call borrows it exclusively for the duration of the
/// fit. Duplicate positions are permitted and never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    /// Build a dataset from already-assembled samples.
    ///
    /// Rejects any sample with `value_error <= 0`, which would imply infinite
    /// weight in the fit.
    pub fn new(samples: Vec<Sample>) -> Result<Self> {
        for (i, s) in samples.iter().enumerate() {
            if !(s.value_error > 0.0) {
                return Err(AttenFitError::InvalidSample(format!(
                    "sample {} has value_error = {}; uncertainties must be positive",
                    i, s.value_error
                )));
            }
        }
        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Positions as a vector, in sample order.
    pub fn positions(&self) -> Array1<f64> {
        self.samples.iter().map(|s| s.position).collect()
    }

    /// Measured values as a vector, in sample order.
    pub fn values(&self) -> Array1<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }
}

/// Assemble a [`Dataset`] from per-site measurements.
///
/// Positions are attached by index **before** any skipping, so a missing site
/// never shifts its neighbours:
///
/// - a non-empty `positions` slice is used verbatim and must be exactly one
///   entry per measurement slot (`ShapeMismatch` otherwise);
/// - an empty `positions` slice synthesizes `index * step_if_positions_empty`
///   from the 1-based slot index, matching run-numbered scan files.
///
/// `position_error_default` applies to every sample unless the measurement
/// carries its own override. `None` slots and measurements with non-positive
/// uncertainty are skipped with a warning; the call only fails on a shape
/// mismatch.
pub fn aggregate(
    measurements: &[Option<Measurement>],
    positions: &[f64],
    position_error_default: f64,
    step_if_positions_empty: f64,
) -> Result<Dataset> {
    if !positions.is_empty() && positions.len() != measurements.len() {
        return Err(AttenFitError::ShapeMismatch(format!(
            "{} positions for {} measurements",
            positions.len(),
            measurements.len()
        )));
    }

    let mut samples = Vec::with_capacity(measurements.len());
    for (idx, slot) in measurements.iter().enumerate() {
        let site = idx + 1;
        let m = match slot {
            Some(m) => m,
            None => {
                warn!("site {}: no readable measurement, skipping", site);
                continue;
            }
        };
        if !(m.error > 0.0) {
            warn!(
                "site {}: non-positive uncertainty {}, skipping",
                site, m.error
            );
            continue;
        }

        let position = if positions.is_empty() {
            site as f64 * step_if_positions_empty
        } else {
            positions[idx]
        };

        samples.push(Sample {
            position,
            value: m.value,
            position_error: m.position_error.unwrap_or(position_error_default),
            value_error: m.error,
        });
    }

    Dataset::new(samples)
}
