//! A single free parameter of the simulator.

use serde::Serialize;

use crate::error::{CalibError, Result};
use crate::parameters::bounds::Bounds;

/// A free parameter: the simulator parameter-file key it controls and the
/// interval the swarm may explore.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    name: String,
    bounds: Bounds,
}

impl Parameter {
    /// Create a new parameter with the given name and bounds
    ///
    /// # Examples
    ///
    /// ```
    /// use swarm_calib::parameters::Parameter;
    ///
    /// let param = Parameter::new("SfrEfficiency", 0.01, 0.2).unwrap();
    /// assert_eq!(param.name(), "SfrEfficiency");
    /// assert_eq!(param.min(), 0.01);
    /// assert!(Parameter::new("Bad", 1.0, 0.0).is_err());
    /// ```
    pub fn new(name: &str, min: f64, max: f64) -> Result<Self> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(CalibError::config(format!(
                "Invalid parameter name '{}': names must be non-empty and contain no whitespace",
                name
            )));
        }

        let bounds = Bounds::new(min, max)
            .map_err(|e| CalibError::config(format!("Parameter '{}': {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            bounds,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn min(&self) -> f64 {
        self.bounds.min
    }

    pub fn max(&self) -> f64 {
        self.bounds.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_creation() {
        let param = Parameter::new("RadioModeEfficiency", 0.0, 0.5).unwrap();
        assert_eq!(param.name(), "RadioModeEfficiency");
        assert_eq!(param.bounds(), Bounds::new(0.0, 0.5).unwrap());
    }

    #[test]
    fn test_parameter_errors_are_config_errors() {
        let err = Parameter::new("FeedbackReheatingEpsilon", 5.0, 1.0).unwrap_err();
        assert!(err.is_config());
        assert!(format!("{}", err).contains("FeedbackReheatingEpsilon"));

        assert!(Parameter::new("", 0.0, 1.0).unwrap_err().is_config());
        assert!(Parameter::new("two words", 0.0, 1.0).unwrap_err().is_config());
        assert!(Parameter::new("x", f64::NAN, 1.0).unwrap_err().is_config());
    }

    #[test]
    fn test_parameter_serialization() {
        let param = Parameter::new("ThreshMajorMerger", 0.1, 0.5).unwrap();
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["name"], "ThreshMajorMerger");
        assert_eq!(json["bounds"]["min"], 0.1);
        assert_eq!(json["bounds"]["max"], 0.5);
    }
}
