//! Declarative constraint definitions, as found in a calibration config.
//!
//! ```json
//! { "id": "SMF_z0", "weight": 1.0, "kind": "mass_function",
//!   "catalog": "z0", "column": "StellarMass", "observed": "obs/smf_z0.dat",
//!   "volume": 125000.0, "unit_scale": 1.37e10 }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constraints::{Constraint, MassFunction, ObservedData, ScalingRelation};
use crate::error::Result;

fn one() -> f64 {
    1.0
}

fn one_count() -> usize {
    1
}

/// One constraint to activate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub id: String,

    #[serde(default = "one")]
    pub weight: f64,

    #[serde(flatten)]
    pub kind: ConstraintKind,
}

/// The built-in constraint kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKind {
    MassFunction {
        catalog: String,
        column: String,
        observed: PathBuf,
        volume: f64,
        #[serde(default = "one")]
        unit_scale: f64,
        #[serde(default)]
        log_column: bool,
    },
    ScalingRelation {
        catalog: String,
        x_column: String,
        y_column: String,
        observed: PathBuf,
        #[serde(default = "one")]
        x_scale: f64,
        #[serde(default = "one")]
        y_scale: f64,
        #[serde(default = "one_count")]
        min_count: usize,
    },
}

impl ConstraintSpec {
    /// Load the observed data and build the constraint
    pub fn build(&self, base_dir: &Path) -> Result<Box<dyn Constraint>> {
        match &self.kind {
            ConstraintKind::MassFunction {
                catalog,
                column,
                observed,
                volume,
                unit_scale,
                log_column,
            } => {
                let data = ObservedData::load(base_dir.join(observed))?;
                let constraint = MassFunction::new(&self.id, catalog, column, *volume, data)?
                    .with_unit_scale(*unit_scale)?
                    .with_log_column(*log_column);
                Ok(Box::new(constraint))
            }
            ConstraintKind::ScalingRelation {
                catalog,
                x_column,
                y_column,
                observed,
                x_scale,
                y_scale,
                min_count,
            } => {
                let data = ObservedData::load(base_dir.join(observed))?;
                let constraint = ScalingRelation::new(&self.id, catalog, x_column, y_column, data)
                    .with_scales(*x_scale, *y_scale)?
                    .with_min_count(*min_count);
                Ok(Box::new(constraint))
            }
        }
    }
}
