//! Ports layer: Trait definitions for external collaborators.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the inference façade and the trained model artifacts.

mod classifier;
mod explainer;

pub use classifier::{Classifier, ClassifierError};
pub use explainer::{ExplainError, Explainer};
