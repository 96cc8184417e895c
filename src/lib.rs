//! # HealthShield
//!
//! Diabetes risk inference over NHANES-style survey and lab records.
//!
//! This crate provides:
//! - Deterministic reconstruction of the training-time feature row from a
//!   partially filled record (sentinel codes, fallbacks, height/weight/BMI)
//! - Feature alignment against the classifier's exact column order
//! - Scoring, rule-based advisory notes and per-feature attribution
//! - Signed parameter bundles loaded once at startup
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (records, frames, bundle parameters, assessments)
//! - `pipeline`: The five reconstruction stages
//! - `ports`: Trait definitions for the classifier and explainer
//! - `adapters`: Model evaluators, bundle loader, log sanitizer
//! - `application`: The inference façade
//! - `config`: Environment-driven settings

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod pipeline;
pub mod ports;

pub use application::InferenceService;
pub use domain::{Assessment, PatientRecord, RiskLevel};

/// Result type for HealthShield operations
pub type Result<T> = std::result::Result<T, HealthShieldError>;

/// Who is at fault for an error, in HTTP terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 4xx: the request itself cannot be processed.
    Client,
    /// 5xx: the service or its bundle is at fault.
    Server,
}

impl ErrorClass {
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::Client => 400,
            Self::Server => 500,
        }
    }
}

/// Main error type for HealthShield
#[derive(Debug, thiserror::Error)]
pub enum HealthShieldError {
    #[error("Missing mandatory field: {0}")]
    MissingField(String),

    #[error("Invalid patient record: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Invalid anthropometrics: {0}")]
    InvalidAnthropometrics(String),

    #[error("Parameter bundle does not match the model: {0}")]
    ConfigIntegrity(String),

    #[error("Classifier failed: {0}")]
    Classifier(#[from] ports::ClassifierError),

    #[error("Bundle unavailable: {0}")]
    Bundle(#[from] adapters::BundleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HealthShieldError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MissingField(_)
            | Self::Validation(_)
            | Self::InvalidAnthropometrics(_)
            | Self::Serialization(_) => ErrorClass::Client,
            Self::ConfigIntegrity(_) | Self::Classifier(_) | Self::Bundle(_) | Self::Io(_) => {
                ErrorClass::Server
            }
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::Validation(_) => "invalid_record",
            Self::InvalidAnthropometrics(_) => "invalid_anthropometrics",
            Self::ConfigIntegrity(_) => "config_integrity",
            Self::Classifier(_) => "classifier_failed",
            Self::Bundle(_) => "bundle_unavailable",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "malformed_input",
        }
    }
}

impl From<pipeline::PipelineError> for HealthShieldError {
    fn from(err: pipeline::PipelineError) -> Self {
        match err {
            pipeline::PipelineError::MissingField(field) => Self::MissingField(field.to_string()),
            pipeline::PipelineError::InvalidAnthropometrics(msg) => {
                Self::InvalidAnthropometrics(msg)
            }
            pipeline::PipelineError::ConfigIntegrity(msg) => Self::ConfigIntegrity(msg),
        }
    }
}
