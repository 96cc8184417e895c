//! Logistic regression classifier with exact linear attribution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Attribution, FeatureContribution, FeatureVector};
use crate::ports::{Classifier, ClassifierError, ExplainError, Explainer};

use super::bundle_fs::BundleError;

/// Logistic model as exported by the training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticArtifact {
    pub intercept: f64,
    /// Coefficient per feature name; features not listed weigh zero.
    pub coefficients: BTreeMap<String, f64>,
    /// Reference point for attribution (training means); defaults to zero.
    #[serde(default)]
    pub baseline: BTreeMap<String, f64>,
}

pub(crate) fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Logistic model compiled against a fixed feature order.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    intercept: f64,
    weights: Vec<f64>,
    baseline: Vec<f64>,
}

impl LogisticModel {
    /// Resolve named coefficients into positional weights.
    ///
    /// # Errors
    /// Returns `BundleError::Invalid` if a coefficient or baseline names a
    /// feature outside `feature_order`, or any parameter is not finite.
    pub fn compile(
        artifact: &LogisticArtifact,
        feature_order: &[String],
    ) -> Result<Self, BundleError> {
        let weights = positional(&artifact.coefficients, feature_order, "coefficient")?;
        let baseline = positional(&artifact.baseline, feature_order, "baseline")?;
        if !artifact.intercept.is_finite() {
            return Err(BundleError::Invalid("intercept is not finite".into()));
        }
        Ok(Self {
            intercept: artifact.intercept,
            weights,
            baseline,
        })
    }

    fn check_len(&self, features: &FeatureVector) -> Result<(), ClassifierError> {
        if features.len() != self.weights.len() {
            return Err(ClassifierError::FeatureCount {
                expected: self.weights.len(),
                actual: features.len(),
            });
        }
        Ok(())
    }

    /// Log-odds of the positive class.
    #[must_use]
    pub fn margin(&self, x: &[f64]) -> f64 {
        self.intercept + self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
    }
}

fn positional(
    named: &BTreeMap<String, f64>,
    feature_order: &[String],
    what: &str,
) -> Result<Vec<f64>, BundleError> {
    let mut out = vec![0.0; feature_order.len()];
    for (name, &value) in named {
        let index = feature_order
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| BundleError::Invalid(format!("{what} for unknown feature {name}")))?;
        if !value.is_finite() {
            return Err(BundleError::Invalid(format!("{what} for {name} is not finite")));
        }
        out[index] = value;
    }
    Ok(out)
}

impl Classifier for LogisticModel {
    fn num_features(&self) -> usize {
        self.weights.len()
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<f64, ClassifierError> {
        self.check_len(features)?;
        let p = sigmoid(self.margin(features.values()));
        if p.is_finite() {
            Ok(p)
        } else {
            Err(ClassifierError::NonFinite)
        }
    }
}

impl Explainer for LogisticModel {
    fn explain(&self, features: &FeatureVector) -> Result<Attribution, ExplainError> {
        self.check_len(features)
            .map_err(|e| ExplainError::Failed(e.to_string()))?;

        let base_value = self.margin(&self.baseline);
        let contributions: Vec<FeatureContribution> = features
            .names()
            .iter()
            .zip(features.values())
            .enumerate()
            .map(|(i, (name, &value))| FeatureContribution {
                feature: name.clone(),
                value,
                contribution: self.weights[i] * (value - self.baseline[i]),
            })
            .collect();

        Ok(Attribution {
            base_value,
            margin: self.margin(features.values()),
            contributions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    fn model() -> LogisticModel {
        let artifact = LogisticArtifact {
            intercept: -1.0,
            coefficients: BTreeMap::from([("a".into(), 2.0), ("c".into(), -0.5)]),
            baseline: BTreeMap::from([("a".into(), 0.5)]),
        };
        LogisticModel::compile(&artifact, &order()).expect("Should compile")
    }

    fn vector(values: Vec<f64>) -> FeatureVector {
        FeatureVector::new(order(), values).expect("Should build")
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(40.0) <= 1.0);
        assert!(sigmoid(-40.0) >= 0.0);
    }

    #[test]
    fn test_predict_proba() {
        let p = model().predict_proba(&vector(vec![1.0, 9.0, 2.0])).expect("Should score");
        // margin = -1 + 2*1 - 0.5*2 = 0
        assert!((p - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_attribution_is_additive() {
        let m = model();
        let attribution = m.explain(&vector(vec![1.0, 9.0, 2.0])).expect("Should explain");
        let total: f64 = attribution.contributions.iter().map(|c| c.contribution).sum();
        assert!((attribution.base_value + total - attribution.margin).abs() < 1e-12);
        assert_eq!(attribution.contributions[1].contribution, 0.0);
    }

    #[test]
    fn test_unknown_coefficient_rejected() {
        let artifact = LogisticArtifact {
            intercept: 0.0,
            coefficients: BTreeMap::from([("zzz".into(), 1.0)]),
            baseline: BTreeMap::new(),
        };
        assert!(LogisticModel::compile(&artifact, &order()).is_err());
    }

    #[test]
    fn test_feature_count_mismatch() {
        let short = FeatureVector::new(vec!["a".into()], vec![1.0]).expect("Should build");
        assert!(matches!(
            model().predict_proba(&short),
            Err(ClassifierError::FeatureCount { expected: 3, actual: 1 })
        ));
    }
}
