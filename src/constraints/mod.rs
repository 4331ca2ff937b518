//! # Observational constraints
//!
//! A [`Constraint`] turns the catalogs of one simulation run into a
//! non-negative badness-of-fit score against one observational dataset. A
//! [`ConstraintSet`] holds every active constraint keyed by identifier, scores
//! them independently and combines the scores with a pluggable
//! [`Aggregation`] strategy.
//!
//! Scoring never fails loudly: when a catalog cannot be compared with the data
//! (an empty bin, a missing column) the constraint reports an
//! [`EvaluationError`], and the fitness layer turns that into the penalty.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::catalog::{Catalog, CatalogData};
use crate::error::{CalibError, Result};

pub mod aggregation;
pub mod mass_function;
pub mod observed;
pub mod scaling_relation;
pub mod spec;

pub use aggregation::{aggregate, Aggregation, AggregationRule, Product, Sum, WeightedSum};
pub use mass_function::MassFunction;
pub use observed::{ObservedBin, ObservedData};
pub use scaling_relation::ScalingRelation;
pub use spec::{ConstraintKind, ConstraintSpec};

/// Reasons a successful run still cannot be scored
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("catalog '{label}' was not produced")]
    MissingCatalog { label: String },

    #[error("catalog '{label}' has no column '{column}'")]
    MissingColumn { label: String, column: String },

    #[error("catalog '{label}' is empty")]
    EmptyCatalog { label: String },

    #[error("{constraint}: no simulated objects in bin [{lower}, {upper})")]
    EmptyBin {
        constraint: String,
        lower: f64,
        upper: f64,
    },

    #[error("{constraint}: {count} objects in bin [{lower}, {upper}), need {required}")]
    SparseBin {
        constraint: String,
        lower: f64,
        upper: f64,
        count: usize,
        required: usize,
    },

    #[error("{constraint}: score is not finite")]
    NonFinite { constraint: String },

    #[error("no constraint with a non-zero weight")]
    NothingWeighted,

    #[error("aggregate fitness {fitness} is not below the penalty")]
    ExceedsPenalty { fitness: f64 },
}

/// A single observational constraint
///
/// Implementations must be deterministic: the same catalogs always produce the
/// same score.
pub trait Constraint: Send + Sync + fmt::Debug {
    /// Unique identifier, e.g. `SMF_z0`
    fn id(&self) -> &str;

    /// Score a run's catalogs; lower is better, zero is a perfect match.
    fn score(&self, catalogs: &CatalogData) -> std::result::Result<f64, EvaluationError>;
}

/// Look up a non-empty catalog and one of its columns
pub(crate) fn required_column<'a>(
    catalogs: &'a CatalogData,
    label: &str,
    column: &str,
) -> std::result::Result<(&'a Catalog, &'a [f64]), EvaluationError> {
    let catalog = catalogs
        .get(label)
        .ok_or_else(|| EvaluationError::MissingCatalog { label: label.to_string() })?;
    let values = catalog.column(column).ok_or_else(|| EvaluationError::MissingColumn {
        label: label.to_string(),
        column: column.to_string(),
    })?;
    if catalog.is_empty() {
        return Err(EvaluationError::EmptyCatalog { label: label.to_string() });
    }
    Ok((catalog, values))
}

/// Outcome of scoring a single constraint
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintScore {
    Scored(f64),
    Undefined(EvaluationError),
}

impl ConstraintScore {
    pub fn value(&self) -> Option<f64> {
        match self {
            ConstraintScore::Scored(v) => Some(*v),
            ConstraintScore::Undefined(_) => None,
        }
    }
}

/// Per-constraint scores of one run, ordered by constraint identifier
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PerConstraintScores {
    entries: BTreeMap<String, ConstraintScore>,
}

impl PerConstraintScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, score: ConstraintScore) {
        self.entries.insert(id.into(), score);
    }

    /// Build from plain values; handy for synthetic scores
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut scores = Self::new();
        for (id, v) in values {
            scores.insert(id, ConstraintScore::Scored(v));
        }
        scores
    }

    pub fn get(&self, id: &str) -> Option<&ConstraintScore> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConstraintScore)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First undefined score, in identifier order
    pub fn first_error(&self) -> Option<(&str, &EvaluationError)> {
        self.entries.iter().find_map(|(id, score)| match score {
            ConstraintScore::Undefined(e) => Some((id.as_str(), e)),
            ConstraintScore::Scored(_) => None,
        })
    }
}

/// The active constraints of a calibration and how their scores combine
#[derive(Debug)]
pub struct ConstraintSet {
    constraints: BTreeMap<String, Box<dyn Constraint>>,
    weights: BTreeMap<String, f64>,
    aggregation: Box<dyn Aggregation>,
}

impl ConstraintSet {
    /// Create an empty set combining scores with the given strategy
    pub fn new(aggregation: Box<dyn Aggregation>) -> Self {
        Self {
            constraints: BTreeMap::new(),
            weights: BTreeMap::new(),
            aggregation,
        }
    }

    /// Build a set from declarative specifications
    ///
    /// Observation file paths are resolved against `base_dir`.
    pub fn from_specs(specs: &[ConstraintSpec], rule: AggregationRule, base_dir: &Path) -> Result<Self> {
        if specs.is_empty() {
            return Err(CalibError::config("At least one constraint must be active"));
        }

        let mut set = Self::new(rule.into_strategy());
        for spec in specs {
            let constraint = spec.build(base_dir)?;
            set.register(constraint, spec.weight)?;
        }
        if !set.has_weighted_constraint() {
            return Err(CalibError::config("At least one active constraint needs a non-zero weight"));
        }
        Ok(set)
    }

    /// Register a constraint under its identifier with a weight
    pub fn register(&mut self, constraint: Box<dyn Constraint>, weight: f64) -> Result<()> {
        let id = constraint.id().to_string();
        if !weight.is_finite() || weight < 0.0 {
            return Err(CalibError::config(format!(
                "Constraint '{}': weight must be finite and non-negative, got {}",
                id, weight
            )));
        }
        if self.constraints.contains_key(&id) {
            return Err(CalibError::config(format!("Duplicate constraint identifier '{}'", id)));
        }

        self.weights.insert(id.clone(), weight);
        self.constraints.insert(id, constraint);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.constraints.keys().map(String::as_str)
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    /// Whether any constraint contributes to the aggregate
    pub fn has_weighted_constraint(&self) -> bool {
        self.weights.values().any(|&w| w > 0.0)
    }

    pub fn aggregation(&self) -> &dyn Aggregation {
        self.aggregation.as_ref()
    }

    /// Score every constraint independently
    pub fn score(&self, catalogs: &CatalogData) -> PerConstraintScores {
        let mut scores = PerConstraintScores::new();
        for (id, constraint) in &self.constraints {
            let score = match constraint.score(catalogs) {
                Ok(v) if v.is_finite() && v >= 0.0 => ConstraintScore::Scored(v),
                Ok(_) => ConstraintScore::Undefined(EvaluationError::NonFinite { constraint: id.clone() }),
                Err(e) => ConstraintScore::Undefined(e),
            };
            scores.insert(id.clone(), score);
        }
        scores
    }

    /// Combine scores with this set's weights and strategy
    pub fn aggregate(&self, scores: &PerConstraintScores) -> Option<f64> {
        aggregate(scores, &self.weights, self.aggregation.as_ref())
    }
}
