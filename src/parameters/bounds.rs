//! Parameter bounds implementation
//!
//! Every free parameter of a calibration lives in a closed, finite interval.
//! The swarm samples inside it, and positions that leave it are projected back.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must be less than max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Bounds must be finite, got [{min}, {max}]")]
    NonFinite { min: f64, max: f64 },
}

/// Represents the bounds constraints on a parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

impl Bounds {
    /// Create a new bounds constraint with min and max values
    ///
    /// # Arguments
    ///
    /// * `min` - Minimum allowed value for the parameter
    /// * `max` - Maximum allowed value for the parameter
    ///
    /// # Returns
    ///
    /// A new `Bounds` object if both ends are finite and min < max, or an error otherwise
    ///
    /// # Examples
    ///
    /// ```
    /// use swarm_calib::parameters::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert_eq!(bounds.width(), 10.0);
    /// assert!(Bounds::new(1.0, 1.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(BoundsError::NonFinite { min, max });
        }
        if min >= max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Check if a value is within the bounds (inclusive on both ends)
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Width of the interval
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Clamp a value to be within the bounds
    ///
    /// NaN is mapped to the lower bound so a broken velocity can never leak
    /// a non-finite position into the simulator.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    /// Draw a value uniformly from `[min, max)`
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        rng.gen_range(self.min..self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_bounds_creation() {
        let bounds = Bounds::new(0.0, 10.0).unwrap();
        assert_eq!(bounds.min, 0.0);
        assert_eq!(bounds.max, 10.0);

        // Inverted and degenerate intervals are rejected
        assert_eq!(
            Bounds::new(10.0, 0.0),
            Err(BoundsError::InvalidBounds { min: 10.0, max: 0.0 })
        );
        assert!(Bounds::new(3.0, 3.0).is_err());

        // So are infinite ones
        assert!(matches!(
            Bounds::new(f64::NEG_INFINITY, 1.0),
            Err(BoundsError::NonFinite { .. })
        ));
        assert!(Bounds::new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_contains() {
        let bounds = Bounds::new(0.0, 10.0).unwrap();

        assert!(bounds.contains(0.0));
        assert!(bounds.contains(5.0));
        assert!(bounds.contains(10.0));

        assert!(!bounds.contains(-1.0));
        assert!(!bounds.contains(11.0));
    }

    #[test]
    fn test_clamp() {
        let bounds = Bounds::new(0.0, 10.0).unwrap();

        assert_eq!(bounds.clamp(-5.0), 0.0);
        assert_eq!(bounds.clamp(5.0), 5.0);
        assert_eq!(bounds.clamp(15.0), 10.0);
        assert_eq!(bounds.clamp(f64::NAN), 0.0);
        assert_eq!(bounds.clamp(f64::INFINITY), 10.0);
    }

    #[test]
    fn test_sample_within_bounds() {
        let bounds = Bounds::new(-2.5, 1e-3).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1000 {
            let x = bounds.sample(&mut rng);
            assert!(x >= bounds.min && x < bounds.max);
        }
    }
}
