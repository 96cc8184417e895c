//! Explainer port: Trait for per-feature attribution of one prediction.

use crate::domain::{Attribution, FeatureVector};

/// Errors that can occur while explaining a prediction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExplainError {
    #[error("Explainer unavailable: {0}")]
    Unavailable(String),

    #[error("Attribution failed: {0}")]
    Failed(String),
}

/// Trait for additive feature attribution.
///
/// A failure here never fails the request; the façade attaches the error
/// note to the response instead.
pub trait Explainer: Send + Sync {
    /// # Errors
    /// Returns `ExplainError` if no attribution can be computed.
    fn explain(&self, features: &FeatureVector) -> Result<Attribution, ExplainError>;
}
