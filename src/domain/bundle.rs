//! Fitted preprocessing parameters shared by every inference request.
//!
//! A `ParameterBundle` is produced at training time and loaded once. It is
//! read-only afterwards; the pipeline only ever borrows it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Survey fields that share one set of "refused / don't know" codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NanGroup {
    pub fields: Vec<String>,
    pub codes: Vec<f64>,
}

impl NanGroup {
    #[must_use]
    pub fn is_sentinel(&self, value: f64) -> bool {
        self.codes.iter().any(|&c| c == value)
    }
}

fn unit_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// Fitted numeric rescaling, one entry per `scale_columns` item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    /// `(x - min) / (max - min)` mapped into `feature_range`.
    MinMax {
        data_min: Vec<f64>,
        data_max: Vec<f64>,
        #[serde(default = "unit_range")]
        feature_range: (f64, f64),
    },
    /// `(x - mean) / scale`.
    Standard { mean: Vec<f64>, scale: Vec<f64> },
}

impl Scaler {
    /// Number of columns the scaler was fitted on.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::MinMax { data_min, .. } => data_min.len(),
            Self::Standard { mean, .. } => mean.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transform one value of the `index`-th fitted column.
    ///
    /// Constant columns (zero range or zero scale) divide by one, matching
    /// how the training-side scaler handles them.
    #[must_use]
    pub fn transform(&self, index: usize, x: f64) -> f64 {
        match self {
            Self::MinMax {
                data_min,
                data_max,
                feature_range: (lo, hi),
            } => {
                let range = non_zero(data_max[index] - data_min[index]);
                (x - data_min[index]) / range * (hi - lo) + lo
            }
            Self::Standard { mean, scale } => (x - mean[index]) / non_zero(scale[index]),
        }
    }

    fn parameters(&self) -> Vec<&[f64]> {
        match self {
            Self::MinMax {
                data_min, data_max, ..
            } => vec![data_min, data_max],
            Self::Standard { mean, scale } => vec![mean, scale],
        }
    }
}

fn non_zero(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        x
    }
}

/// Everything the pipeline needs to rebuild the training-time feature row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBundle {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Fallback values (medians or constants) keyed by field name.
    pub imputer_stats: BTreeMap<String, f64>,

    /// Sentinel-code groups keyed by group name.
    pub nan_groups: BTreeMap<String, NanGroup>,

    /// Raw field name -> model feature name.
    pub rename_table: BTreeMap<String, String>,

    /// Raw fields superseded by derived ones.
    #[serde(default)]
    pub drop_columns: Vec<String>,

    /// Post-rename columns to rescale, aligned with the scaler parameters.
    pub scale_columns: Vec<String>,

    pub scaler: Scaler,

    /// Post-rename columns to one-hot expand.
    #[serde(default)]
    pub categorical_columns: Vec<String>,

    /// Exact column order the classifier was trained on.
    pub final_feature_order: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl ParameterBundle {
    /// Fallback statistic for a field, if the bundle carries one.
    #[must_use]
    pub fn stat(&self, field: &str) -> Option<f64> {
        self.imputer_stats.get(field).copied()
    }

    /// Whether `column` is a one-hot branch of one of the categorical columns.
    #[must_use]
    pub fn is_one_hot_branch(&self, column: &str) -> bool {
        self.categorical_columns.iter().any(|c| {
            column.len() > c.len() + 1
                && column.starts_with(c.as_str())
                && column.as_bytes()[c.len()] == b'_'
        })
    }

    /// Structural checks run once at load time.
    ///
    /// # Errors
    /// Returns every inconsistency found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.final_feature_order.is_empty() {
            errors.push("final_feature_order is empty".to_string());
        }
        let mut seen = BTreeSet::new();
        for name in &self.final_feature_order {
            if !seen.insert(name.as_str()) {
                errors.push(format!("final_feature_order lists {name} twice"));
            }
        }

        if self.scaler.len() != self.scale_columns.len() {
            errors.push(format!(
                "scaler fitted on {} columns but scale_columns lists {}",
                self.scaler.len(),
                self.scale_columns.len()
            ));
        }
        for params in self.scaler.parameters() {
            if params.len() != self.scaler.len() {
                errors.push("scaler parameter arrays differ in length".to_string());
            }
            if params.iter().any(|p| !p.is_finite()) {
                errors.push("scaler parameters must be finite".to_string());
            }
        }

        for column in &self.scale_columns {
            if self.categorical_columns.contains(column) {
                errors.push(format!("{column} is both scaled and one-hot encoded"));
            }
        }

        for (name, value) in &self.imputer_stats {
            if !value.is_finite() {
                errors.push(format!("imputer stat {name} is not finite"));
            }
        }

        for (group, spec) in &self.nan_groups {
            if spec.codes.is_empty() {
                errors.push(format!("nan group {group} has no codes"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> ParameterBundle {
        ParameterBundle {
            version: 1,
            imputer_stats: BTreeMap::from([("BMXHT".to_string(), 166.0)]),
            nan_groups: BTreeMap::new(),
            rename_table: BTreeMap::new(),
            drop_columns: vec![],
            scale_columns: vec!["age".into()],
            scaler: Scaler::MinMax {
                data_min: vec![20.0],
                data_max: vec![80.0],
                feature_range: (0.0, 1.0),
            },
            categorical_columns: vec!["gender".into()],
            final_feature_order: vec!["age".into(), "gender_1.0".into()],
        }
    }

    #[test]
    fn test_min_max_transform() {
        let b = bundle();
        assert!((b.scaler.transform(0, 50.0) - 0.5).abs() < 1e-12);
        assert!((b.scaler.transform(0, 20.0)).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_divides_by_one() {
        let scaler = Scaler::Standard {
            mean: vec![3.0],
            scale: vec![0.0],
        };
        assert!((scaler.transform(0, 5.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_one_hot_branch_detection() {
        let b = bundle();
        assert!(b.is_one_hot_branch("gender_1.0"));
        assert!(!b.is_one_hot_branch("gender"));
        assert!(!b.is_one_hot_branch("gender_"));
        assert!(!b.is_one_hot_branch("genderx_1.0"));
        assert!(!b.is_one_hot_branch("age"));
    }

    #[test]
    fn test_validation() {
        assert!(bundle().validate().is_ok());

        let mut broken = bundle();
        broken.final_feature_order.push("age".into());
        broken.scale_columns.push("bmi".into());
        let errors = broken.validate().expect_err("Should be invalid");
        assert!(errors.iter().any(|e| e.contains("twice")));
        assert!(errors.iter().any(|e| e.contains("scale_columns")));
    }

    #[test]
    fn test_deserialize_scaler_kinds() {
        let json = r#"{"kind": "standard", "mean": [1.0], "scale": [2.0]}"#;
        let scaler: Scaler = serde_json::from_str(json).expect("Should parse");
        assert_eq!(scaler.len(), 1);

        let json = r#"{"kind": "min_max", "data_min": [0.0], "data_max": [10.0]}"#;
        let scaler: Scaler = serde_json::from_str(json).expect("Should parse");
        assert!((scaler.transform(0, 5.0) - 0.5).abs() < 1e-12);
    }
}
