//! Domain layer: Core business types.
//!
//! This module contains plain Rust types with no I/O. Everything here is
//! serializable and validates itself.

mod assessment;
mod bundle;
mod frame;
pub mod patient;

pub use assessment::{
    Advisory, Assessment, Attribution, Explanation, FeatureContribution, RiskLevel,
    BMI_ADVISORY_THRESHOLD, HIGH_RISK_THRESHOLD, MEDIUM_RISK_THRESHOLD,
};
pub use bundle::{NanGroup, ParameterBundle, Scaler};
pub use frame::{FeatureVector, RecordFrame};
pub use patient::PatientRecord;
