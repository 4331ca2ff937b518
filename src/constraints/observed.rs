//! Binned observational data.
//!
//! Observation files list one bin per line as `lower upper value sigma`, where
//! `lower`/`upper` are the bin edges on the constraint's abscissa (usually
//! `log10` of a mass), `value` is the observed quantity and `sigma` its 1σ
//! uncertainty in the same units. Lines may carry `#` comments.

use std::fs;
use std::path::Path;

use crate::error::{CalibError, Result};
use crate::utils::text::{complete, number_row, strip_comment};

/// A single observed bin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedBin {
    pub lower: f64,
    pub upper: f64,
    pub value: f64,
    pub sigma: f64,
}

impl ObservedBin {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Whether `x` falls into the half-open bin `[lower, upper)`
    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x < self.upper
    }

    /// Squared, uncertainty-normalized residual of a simulated value
    pub fn chi_squared(&self, simulated: f64) -> f64 {
        ((simulated - self.value) / self.sigma).powi(2)
    }
}

/// Observational dataset for one constraint
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedData {
    bins: Vec<ObservedBin>,
}

impl ObservedData {
    /// Build a dataset from bins, validating edges and uncertainties
    pub fn new(bins: Vec<ObservedBin>) -> Result<Self> {
        if bins.is_empty() {
            return Err(CalibError::config("Observed data must contain at least one bin"));
        }

        for (idx, bin) in bins.iter().enumerate() {
            let finite = [bin.lower, bin.upper, bin.value, bin.sigma]
                .iter()
                .all(|v| v.is_finite());
            if !finite {
                return Err(CalibError::config(format!("bin {}: values must be finite", idx + 1)));
            }
            if bin.lower >= bin.upper {
                return Err(CalibError::config(format!(
                    "bin {}: lower edge {} must be below upper edge {}",
                    idx + 1,
                    bin.lower,
                    bin.upper
                )));
            }
            if bin.sigma <= 0.0 {
                return Err(CalibError::config(format!(
                    "bin {}: uncertainty must be positive, got {}",
                    idx + 1,
                    bin.sigma
                )));
            }
        }

        Ok(Self { bins })
    }

    /// Parse the text form of an observation file
    pub fn parse(text: &str) -> Result<Self> {
        let mut bins = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = strip_comment(raw, &['#']);
            if line.is_empty() {
                continue;
            }

            let row = complete(number_row(line))
                .map_err(|e| CalibError::config(format!("line {}: {}", idx + 1, e)))?;
            match row.as_slice() {
                &[lower, upper, value, sigma] => bins.push(ObservedBin {
                    lower,
                    upper,
                    value,
                    sigma,
                }),
                other => {
                    return Err(CalibError::config(format!(
                        "line {}: expected 4 columns (lower upper value sigma), found {}",
                        idx + 1,
                        other.len()
                    )))
                }
            }
        }

        Self::new(bins)
    }

    /// Load an observation file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            CalibError::config(format!("Cannot read observed data {}: {}", path.display(), e))
        })?;
        Self::parse(&text).map_err(|e| CalibError::config(format!("{}: {}", path.display(), e)))
    }

    pub fn bins(&self) -> &[ObservedBin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}
