//! Binned scaling relations such as black hole–bulge mass.
//!
//! Objects are binned in `log10 x`; in each bin the median of `log10 y` is
//! compared with the observed median. Bins holding fewer than `min_count`
//! objects cannot give a meaningful median and make the run unscorable.

use crate::catalog::CatalogData;
use crate::constraints::observed::ObservedData;
use crate::constraints::{required_column, Constraint, EvaluationError};
use crate::error::{CalibError, Result};

#[derive(Debug, Clone)]
pub struct ScalingRelation {
    id: String,
    catalog: String,
    x_column: String,
    y_column: String,
    x_scale: f64,
    y_scale: f64,
    min_count: usize,
    observed: ObservedData,
}

impl ScalingRelation {
    pub fn new(id: &str, catalog: &str, x_column: &str, y_column: &str, observed: ObservedData) -> Self {
        Self {
            id: id.to_string(),
            catalog: catalog.to_string(),
            x_column: x_column.to_string(),
            y_column: y_column.to_string(),
            x_scale: 1.0,
            y_scale: 1.0,
            min_count: 1,
            observed,
        }
    }

    /// Multiply raw x and y values by these factors before taking logarithms
    pub fn with_scales(mut self, x_scale: f64, y_scale: f64) -> Result<Self> {
        for scale in [x_scale, y_scale] {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(CalibError::config(format!(
                    "Constraint '{}': unit scales must be positive, got {}",
                    self.id, scale
                )));
            }
        }
        self.x_scale = x_scale;
        self.y_scale = y_scale;
        Ok(self)
    }

    pub fn with_min_count(mut self, min_count: usize) -> Self {
        self.min_count = min_count.max(1);
        self
    }

    /// Median `log10 y` per observed bin, checking the minimum occupancy
    pub fn binned_medians(&self, catalogs: &CatalogData) -> std::result::Result<Vec<f64>, EvaluationError> {
        let (catalog, xs) = required_column(catalogs, &self.catalog, &self.x_column)?;
        let ys = catalog.column(&self.y_column).ok_or_else(|| EvaluationError::MissingColumn {
            label: self.catalog.clone(),
            column: self.y_column.clone(),
        })?;

        let bins = self.observed.bins();
        let mut members: Vec<Vec<f64>> = vec![Vec::new(); bins.len()];
        for (&x, &y) in xs.iter().zip(ys) {
            if x <= 0.0 || y <= 0.0 {
                continue;
            }
            let log_x = (x * self.x_scale).log10();
            let log_y = (y * self.y_scale).log10();
            if !(log_x.is_finite() && log_y.is_finite()) {
                continue;
            }
            if let Some(idx) = bins.iter().position(|b| b.contains(log_x)) {
                members[idx].push(log_y);
            }
        }

        bins.iter()
            .zip(members)
            .map(|(bin, mut values)| {
                if values.len() < self.min_count {
                    return Err(EvaluationError::SparseBin {
                        constraint: self.id.clone(),
                        lower: bin.lower,
                        upper: bin.upper,
                        count: values.len(),
                        required: self.min_count,
                    });
                }
                Ok(median(&mut values))
            })
            .collect()
    }
}

/// Median of a non-empty slice of finite values
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

impl Constraint for ScalingRelation {
    fn id(&self) -> &str {
        &self.id
    }

    fn score(&self, catalogs: &CatalogData) -> std::result::Result<f64, EvaluationError> {
        let medians = self.binned_medians(catalogs)?;
        let chi2: f64 = self
            .observed
            .bins()
            .iter()
            .zip(medians)
            .map(|(bin, m)| bin.chi_squared(m))
            .sum();

        if chi2.is_finite() {
            Ok(chi2)
        } else {
            Err(EvaluationError::NonFinite { constraint: self.id.clone() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use approx::assert_relative_eq;

    fn bhbm_data(bulge: &[f64], black_hole: &[f64]) -> CatalogData {
        let catalog = Catalog::from_columns(vec![
            ("BulgeMass".to_string(), bulge.to_vec()),
            ("BlackHoleMass".to_string(), black_hole.to_vec()),
        ])
        .unwrap();
        CatalogData::new().with_catalog("z0", catalog)
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_bhbm_score() {
        // log10 M_bulge bins [1,2) and [2,3); observed log10 M_bh medians -2 and -1
        let observed = ObservedData::parse("1 2 -2 0.5\n2 3 -1 0.5\n").unwrap();
        let relation = ScalingRelation::new("BHBM_z0", "z0", "BulgeMass", "BlackHoleMass", observed);

        let data = bhbm_data(&[20.0, 30.0, 40.0, 200.0], &[0.01, 0.01, 1.0, 0.1]);
        // first bin median = log10(0.01) = -2 exactly; second bin = -1
        assert_relative_eq!(relation.score(&data).unwrap(), 0.0, epsilon = 1e-12);

        let data = bhbm_data(&[20.0, 200.0], &[0.1, 0.1]);
        // first bin off by one dex: (1 / 0.5)^2
        assert_relative_eq!(relation.score(&data).unwrap(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sparse_bins() {
        let observed = ObservedData::parse("1 2 -2 0.5\n2 3 -1 0.5\n").unwrap();
        let relation = ScalingRelation::new("BHBM_z0", "z0", "BulgeMass", "BlackHoleMass", observed)
            .with_min_count(2);

        let data = bhbm_data(&[20.0, 30.0, 200.0], &[0.01, 0.01, 0.1]);
        assert!(matches!(
            relation.score(&data),
            Err(EvaluationError::SparseBin { count: 1, required: 2, .. })
        ));
    }

    #[test]
    fn test_missing_y_column() {
        let observed = ObservedData::parse("1 2 -2 0.5\n").unwrap();
        let relation = ScalingRelation::new("BHBM_z0", "z0", "BulgeMass", "Missing", observed);
        let data = bhbm_data(&[20.0], &[0.01]);
        assert!(matches!(relation.score(&data), Err(EvaluationError::MissingColumn { .. })));
    }
}
