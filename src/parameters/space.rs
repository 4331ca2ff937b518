//! The bounded search domain of a calibration.
//!
//! A [`ParameterSpace`] is an ordered list of [`Parameter`]s. Its order defines
//! the meaning of every coordinate of a particle position, so it is fixed at
//! construction and never mutated afterwards.

use ndarray::Array1;
use rand::Rng;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{CalibError, Result};
use crate::parameters::bounds::Bounds;
use crate::parameters::parameter::Parameter;
use crate::utils::text::{bound_triple, complete, strip_comment};

/// Ordered collection of free parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    parameters: Vec<Parameter>,
}

impl ParameterSpace {
    /// Create a parameter space from an ordered list of parameters
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the list is empty or two parameters
    /// share a name.
    pub fn new(parameters: Vec<Parameter>) -> Result<Self> {
        if parameters.is_empty() {
            return Err(CalibError::config("Parameter space must contain at least one parameter"));
        }

        let mut seen = HashSet::new();
        for param in &parameters {
            if !seen.insert(param.name()) {
                return Err(CalibError::config(format!(
                    "Duplicate parameter name '{}'",
                    param.name()
                )));
            }
        }

        Ok(Self { parameters })
    }

    /// Load a parameter space definition file
    ///
    /// The file contains one `name lower upper` line per parameter. Text after
    /// `#` or `%` is ignored, as are blank lines.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| CalibError::config(format!("Cannot read parameter space {}: {}", path.display(), e)))?;

        text.parse()
            .map_err(|e: CalibError| CalibError::config(format!("{}: {}", path.display(), e)))
    }

    /// Number of free parameters (the dimension of the search)
    pub fn dimension(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn bounds(&self) -> Vec<Bounds> {
        self.parameters.iter().map(Parameter::bounds).collect()
    }

    /// Width of each dimension's interval
    pub fn widths(&self) -> Array1<f64> {
        self.parameters.iter().map(|p| p.bounds().width()).collect()
    }

    /// Check that a vector has the right dimension and lies inside every bound
    pub fn contains(&self, point: &Array1<f64>) -> bool {
        point.len() == self.dimension()
            && self
                .parameters
                .iter()
                .zip(point.iter())
                .all(|(p, &x)| p.bounds().contains(x))
    }

    /// Project a vector back into the space, coordinate by coordinate.
    ///
    /// Coordinates beyond the space's dimension are dropped; missing ones are
    /// not invented, so callers must pass full-length vectors.
    pub fn clamp(&self, point: &Array1<f64>) -> Array1<f64> {
        self.parameters
            .iter()
            .zip(point.iter())
            .map(|(p, &x)| p.bounds().clamp(x))
            .collect()
    }

    /// Draw a position uniformly from the space
    pub fn sample_uniform(&self, rng: &mut impl Rng) -> Array1<f64> {
        self.parameters.iter().map(|p| p.bounds().sample(rng)).collect()
    }

    /// Render `name value` rows, one per parameter
    pub fn to_table(&self, values: &Array1<f64>) -> Result<String> {
        if values.len() != self.dimension() {
            return Err(CalibError::DimensionMismatch(format!(
                "Expected {} values, got {}",
                self.dimension(),
                values.len()
            )));
        }

        let width = self.parameters.iter().map(|p| p.name().len()).max().unwrap_or(0);
        let mut table = String::new();
        for (param, value) in self.parameters.iter().zip(values.iter()) {
            // writing to a String cannot fail
            let _ = writeln!(table, "{:<width$}  {}", param.name(), value, width = width);
        }
        Ok(table)
    }
}

impl FromStr for ParameterSpace {
    type Err = CalibError;

    fn from_str(text: &str) -> Result<Self> {
        let mut parameters = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = strip_comment(raw, &['#', '%']);
            if line.is_empty() {
                continue;
            }

            let (name, lower, upper) = complete(bound_triple(line))
                .map_err(|e| CalibError::config(format!("line {}: {}", idx + 1, e)))?;

            let param = Parameter::new(name, lower, upper)
                .map_err(|e| CalibError::config(format!("line {}: {}", idx + 1, e)))?;
            parameters.push(param);
        }

        ParameterSpace::new(parameters)
    }
}
