//! Adapters layer: Concrete implementations of ports.
//!
//! - `linear`, `forest`: model evaluators (classifier + explainer)
//! - `model`: artifact dispatch over the evaluators
//! - `bundle_fs`: bundle loading with signature and digest checks
//! - `sanitize`: patient-data filtering for logs

pub mod bundle_fs;
pub mod forest;
pub mod linear;
pub mod model;
pub mod sanitize;

pub use bundle_fs::{BundleError, BundleLoader, LoadedBundle};
pub use model::{ModelArtifact, TabularModel};
