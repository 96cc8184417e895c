//! Application layer: Use cases and services.
//!
//! This module orchestrates the pipeline with the model ports to implement
//! the assessment use case.

mod inference;

pub use inference::InferenceService;
