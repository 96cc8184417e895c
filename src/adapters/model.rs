//! Classifier artifact dispatch.

use serde::{Deserialize, Serialize};

use crate::domain::{Attribution, FeatureVector};
use crate::ports::{Classifier, ClassifierError, ExplainError, Explainer};

use super::bundle_fs::BundleError;
use super::forest::{TreeEnsemble, TreeEnsembleArtifact};
use super::linear::{LogisticArtifact, LogisticModel};

/// The `model` section of a bundle document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    Logistic(LogisticArtifact),
    TreeEnsemble(TreeEnsembleArtifact),
}

/// A compiled model; serves as both classifier and explainer.
#[derive(Debug, Clone)]
pub enum TabularModel {
    Logistic(LogisticModel),
    TreeEnsemble(TreeEnsemble),
}

impl TabularModel {
    /// Compile an artifact against the bundle's final feature order.
    ///
    /// # Errors
    /// Returns `BundleError::Invalid` if the artifact references features
    /// outside `feature_order` or is malformed.
    pub fn build(artifact: &ModelArtifact, feature_order: &[String]) -> Result<Self, BundleError> {
        Ok(match artifact {
            ModelArtifact::Logistic(a) => Self::Logistic(LogisticModel::compile(a, feature_order)?),
            ModelArtifact::TreeEnsemble(a) => {
                Self::TreeEnsemble(TreeEnsemble::compile(a, feature_order)?)
            }
        })
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Logistic(_) => "logistic",
            Self::TreeEnsemble(_) => "tree_ensemble",
        }
    }
}

impl Classifier for TabularModel {
    fn num_features(&self) -> usize {
        match self {
            Self::Logistic(m) => m.num_features(),
            Self::TreeEnsemble(m) => m.num_features(),
        }
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<f64, ClassifierError> {
        match self {
            Self::Logistic(m) => m.predict_proba(features),
            Self::TreeEnsemble(m) => m.predict_proba(features),
        }
    }
}

impl Explainer for TabularModel {
    fn explain(&self, features: &FeatureVector) -> Result<Attribution, ExplainError> {
        match self {
            Self::Logistic(m) => m.explain(features),
            Self::TreeEnsemble(m) => m.explain(features),
        }
    }
}
