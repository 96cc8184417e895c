//! Classifier port: Trait for scoring an aligned feature vector.

use crate::domain::FeatureVector;

/// Errors that can occur while scoring.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifierError {
    #[error("Feature count mismatch: model expects {expected}, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("Model produced a non-finite score")]
    NonFinite,

    #[error("Classifier failed: {0}")]
    Failed(String),
}

/// Trait for binary classifiers trained on the aligned feature layout.
pub trait Classifier: Send + Sync {
    /// Number of features the model consumes, positionally.
    fn num_features(&self) -> usize;

    /// Probability of the positive class, in [0, 1].
    ///
    /// # Errors
    /// Returns `ClassifierError` if the vector does not fit the model or the
    /// score is not a number.
    fn predict_proba(&self, features: &FeatureVector) -> Result<f64, ClassifierError>;
}
