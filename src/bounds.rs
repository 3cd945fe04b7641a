//! Box constraints and the bounded-to-unbounded parameter transform.
//!
//! The solver runs an unconstrained Levenberg-Marquardt loop in internal
//! coordinates and maps them through the Minuit-style transform below, so the
//! external parameter values it reports always satisfy their bounds.

use crate::error::{AttenFitError, Result};

/// Box constraint on a single parameter.
///
/// Either side may be infinite; `Bounds::unbounded()` leaves the parameter
/// free. The transform degrades gracefully: an unbounded parameter passes
/// through the identity, one-sided bounds use a hyperbolic map, two-sided
/// bounds use the sine map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum allowed value for the parameter.
    pub min: f64,

    /// Maximum allowed value for the parameter.
    pub max: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }
}

impl Bounds {
    /// Create a box constraint, failing when `min > max`.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if min > max {
            return Err(AttenFitError::InvalidBounds(format!(
                "min ({}) must not exceed max ({})",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// An unconstrained parameter (-inf, +inf).
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Whether `value` lies inside the box (inclusive on both ends).
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn has_lower(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper(&self) -> bool {
        self.max.is_finite()
    }

    /// Map an internal (unconstrained) coordinate to the external parameter
    /// value. The image is always inside the box.
    pub fn to_external(&self, internal: f64) -> f64 {
        match (self.has_lower(), self.has_upper()) {
            (false, false) => internal,
            (true, false) => self.min - 1.0 + (internal * internal + 1.0).sqrt(),
            (false, true) => self.max + 1.0 - (internal * internal + 1.0).sqrt(),
            (true, true) => {
                let range = self.max - self.min;
                // A zero-width box pins the parameter
                if range == 0.0 {
                    return self.min;
                }
                self.min + (internal.sin() + 1.0) * range / 2.0
            }
        }
    }

    /// Map an external parameter value to an internal coordinate.
    ///
    /// The value must already lie inside the box; the solver validates the
    /// initial guess before calling this.
    pub fn to_internal(&self, external: f64) -> Result<f64> {
        if !external.is_finite() {
            return Err(AttenFitError::InvalidBounds(
                "non-finite parameter value".to_string(),
            ));
        }
        if !self.contains(external) {
            return Err(AttenFitError::InvalidBounds(format!(
                "value {} outside [{}, {}]",
                external, self.min, self.max
            )));
        }

        Ok(match (self.has_lower(), self.has_upper()) {
            (false, false) => external,
            (true, false) => ((external - self.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((self.max - external + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                let range = self.max - self.min;
                if range == 0.0 {
                    return Ok(0.0);
                }
                let scaled = 2.0 * (external - self.min) / range - 1.0;
                scaled.clamp(-1.0, 1.0).asin()
            }
        })
    }

    /// Derivative d(external)/d(internal) at the given internal coordinate.
    ///
    /// Used to chain-rule the model Jacobian from external parameters onto the
    /// internal coordinates the solver steps in.
    pub fn dext_dint(&self, internal: f64) -> f64 {
        match (self.has_lower(), self.has_upper()) {
            (false, false) => 1.0,
            (true, false) => internal / (internal * internal + 1.0).sqrt(),
            (false, true) => -internal / (internal * internal + 1.0).sqrt(),
            (true, true) => {
                let range = self.max - self.min;
                range * internal.cos() / 2.0
            }
        }
    }
}

/// Validate a full bound specification against a guess, before any iteration.
///
/// Checks, in order: bound vector lengths, `lower[i] <= upper[i]` for every i,
/// and the guess lying inside the box. Any violation is `InvalidBounds`.
pub fn validate(guess: &[f64], lower: &[f64], upper: &[f64]) -> Result<Vec<Bounds>> {
    let p = guess.len();
    if lower.len() != p || upper.len() != p {
        return Err(AttenFitError::InvalidBounds(format!(
            "expected {} lower and upper bounds, got {} and {}",
            p,
            lower.len(),
            upper.len()
        )));
    }

    let mut boxes = Vec::with_capacity(p);
    for i in 0..p {
        if lower[i] > upper[i] {
            return Err(AttenFitError::InvalidBounds(format!(
                "lower[{}] = {} > upper[{}] = {}",
                i, lower[i], i, upper[i]
            )));
        }
        let b = Bounds::new(lower[i], upper[i])?;
        if !b.contains(guess[i]) {
            return Err(AttenFitError::InvalidBounds(format!(
                "initial guess[{}] = {} outside [{}, {}]",
                i, guess[i], lower[i], upper[i]
            )));
        }
        boxes.push(b);
    }

    Ok(boxes)
}
