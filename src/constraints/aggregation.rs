//! Strategies for combining per-constraint scores into one fitness.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::PerConstraintScores;

/// Combines weighted constraint scores into a single fitness value.
///
/// `terms` holds `(score, weight)` pairs in constraint-identifier order and
/// never contains zero-weight terms.
pub trait Aggregation: Send + Sync + fmt::Debug {
    fn aggregate(&self, terms: &[(f64, f64)]) -> f64;

    fn name(&self) -> &'static str;
}

/// Unweighted sum of scores
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Aggregation for Sum {
    fn aggregate(&self, terms: &[(f64, f64)]) -> f64 {
        terms.iter().map(|(score, _)| score).sum()
    }

    fn name(&self) -> &'static str {
        "sum"
    }
}

/// Weighted sum of scores, `Σ wᵢ·sᵢ`
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedSum;

impl Aggregation for WeightedSum {
    fn aggregate(&self, terms: &[(f64, f64)]) -> f64 {
        terms.iter().map(|(score, weight)| weight * score).sum()
    }

    fn name(&self) -> &'static str {
        "weighted_sum"
    }
}

/// Weighted product of scores, `Π sᵢ^wᵢ`
#[derive(Debug, Clone, Copy, Default)]
pub struct Product;

impl Aggregation for Product {
    fn aggregate(&self, terms: &[(f64, f64)]) -> f64 {
        terms.iter().map(|(score, weight)| score.powf(*weight)).product()
    }

    fn name(&self) -> &'static str {
        "product"
    }
}

/// Declarative choice of aggregation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationRule {
    Sum,
    #[default]
    WeightedSum,
    Product,
}

impl AggregationRule {
    pub fn into_strategy(self) -> Box<dyn Aggregation> {
        match self {
            AggregationRule::Sum => Box::new(Sum),
            AggregationRule::WeightedSum => Box::new(WeightedSum),
            AggregationRule::Product => Box::new(Product),
        }
    }
}

/// Combine scores with explicit weights.
///
/// Constraints without a weight default to 1. Terms with weight zero are
/// dropped before the strategy sees them, whatever their score. Returns `None`
/// if no term is left, any remaining score is undefined or the result is not
/// finite.
///
/// Terms are visited in identifier order, so the result does not depend on
/// the order constraints were registered in.
pub fn aggregate(
    scores: &PerConstraintScores,
    weights: &BTreeMap<String, f64>,
    strategy: &dyn Aggregation,
) -> Option<f64> {
    let mut terms = Vec::with_capacity(scores.len());
    for (id, score) in scores.iter() {
        let weight = weights.get(id).copied().unwrap_or(1.0);
        if weight == 0.0 {
            continue;
        }
        terms.push((score.value()?, weight));
    }
    if terms.is_empty() {
        return None;
    }

    let fitness = strategy.aggregate(&terms);
    fitness.is_finite().then_some(fitness)
}
