//! Mass function constraints (stellar, HI, baryonic, ...).
//!
//! The simulated mass function is the histogram of `log10(mass)` in the
//! observed bins, normalized by the simulated volume and the bin width:
//!
//! ```text
//! φ = N_bin / (V · Δlog10 M)      [Mpc⁻³ dex⁻¹]
//! ```
//!
//! The score is `Σ ((log10 φ_sim − log10 φ_obs) / σ)²` over the observed bins.

use crate::catalog::CatalogData;
use crate::constraints::observed::ObservedData;
use crate::constraints::{required_column, Constraint, EvaluationError};
use crate::error::{CalibError, Result};

/// Mass function of one catalog column compared to observed `log10 φ`
#[derive(Debug, Clone)]
pub struct MassFunction {
    id: String,
    catalog: String,
    column: String,
    /// Comoving volume of the simulated region in Mpc³
    volume: f64,
    /// Factor converting catalog units to the observed mass units
    unit_scale: f64,
    /// Whether the column already holds `log10` masses
    log_column: bool,
    observed: ObservedData,
}

impl MassFunction {
    /// Create a mass function constraint
    ///
    /// # Arguments
    ///
    /// * `id` - Constraint identifier, e.g. `SMF_z0`
    /// * `catalog` - Label of the catalog to read
    /// * `column` - Mass column
    /// * `volume` - Simulated volume in Mpc³
    /// * `observed` - Observed `log10 φ` per `log10 M` bin
    pub fn new(id: &str, catalog: &str, column: &str, volume: f64, observed: ObservedData) -> Result<Self> {
        if !(volume.is_finite() && volume > 0.0) {
            return Err(CalibError::config(format!(
                "Constraint '{}': volume must be positive, got {}",
                id, volume
            )));
        }

        Ok(Self {
            id: id.to_string(),
            catalog: catalog.to_string(),
            column: column.to_string(),
            volume,
            unit_scale: 1.0,
            log_column: false,
            observed,
        })
    }

    /// Multiply catalog values by `scale` before taking the logarithm
    pub fn with_unit_scale(mut self, scale: f64) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(CalibError::config(format!(
                "Constraint '{}': unit scale must be positive, got {}",
                self.id, scale
            )));
        }
        self.unit_scale = scale;
        Ok(self)
    }

    /// Treat the column as already holding `log10` masses
    pub fn with_log_column(mut self, log_column: bool) -> Self {
        self.log_column = log_column;
        self
    }

    fn log_mass(&self, value: f64) -> Option<f64> {
        let log_mass = if self.log_column {
            value + self.unit_scale.log10()
        } else if value > 0.0 {
            (value * self.unit_scale).log10()
        } else {
            return None;
        };
        log_mass.is_finite().then_some(log_mass)
    }

    /// Simulated `log10 φ` in each observed bin, `None` for empty bins
    pub fn simulated(&self, catalogs: &CatalogData) -> std::result::Result<Vec<Option<f64>>, EvaluationError> {
        let (_, masses) = required_column(catalogs, &self.catalog, &self.column)?;

        let bins = self.observed.bins();
        let mut counts = vec![0usize; bins.len()];
        for log_mass in masses.iter().filter_map(|&m| self.log_mass(m)) {
            if let Some(idx) = bins.iter().position(|b| b.contains(log_mass)) {
                counts[idx] += 1;
            }
        }

        Ok(bins
            .iter()
            .zip(counts)
            .map(|(bin, n)| (n > 0).then(|| (n as f64 / (self.volume * bin.width())).log10()))
            .collect())
    }
}

impl Constraint for MassFunction {
    fn id(&self) -> &str {
        &self.id
    }

    fn score(&self, catalogs: &CatalogData) -> std::result::Result<f64, EvaluationError> {
        let simulated = self.simulated(catalogs)?;

        let mut chi2 = 0.0;
        for (bin, log_phi) in self.observed.bins().iter().zip(simulated) {
            let log_phi = log_phi.ok_or_else(|| EvaluationError::EmptyBin {
                constraint: self.id.clone(),
                lower: bin.lower,
                upper: bin.upper,
            })?;
            chi2 += bin.chi_squared(log_phi);
        }

        if chi2.is_finite() {
            Ok(chi2)
        } else {
            Err(EvaluationError::NonFinite { constraint: self.id.clone() })
        }
    }
}
