//! On-disk parameter bundle: parsing, integrity and structural checks.
//!
//! A bundle directory holds:
//!
//! - `bundle.json`: fitted pipeline parameters plus the classifier artifact
//! - `manifest.json`: SHA-256 digests of the files it binds
//! - `bundle.sig`: Ed25519 signature over the raw manifest bytes
//!
//! # Security
//!
//! - Release builds refuse bundles without a valid signature
//! - Debug builds may load unsigned bundles when explicitly allowed
//!   (`HEALTHSHIELD_ALLOW_UNSIGNED_BUNDLES`)
//! - The manifest must bind `bundle.json`, and every bound file must match
//!   its digest

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::domain::ParameterBundle;

use super::model::{ModelArtifact, TabularModel};

pub const BUNDLE_FILE: &str = "bundle.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "bundle.sig";

pub const MANIFEST_VERSION: u32 = 1;

/// Clock skew tolerated on `created_at`.
const MAX_FUTURE_SKEW_SECS: i64 = 300;

/// Errors raised while loading a bundle. Any of them leaves the service
/// unavailable.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Bundle I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bundle parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid bundle: {0}")]
    Invalid(String),

    #[error("Bundle integrity check failed: {0}")]
    Integrity(String),

    #[error("Bundle signature rejected: {0}")]
    Signature(String),
}

impl BundleError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Signed description of a bundle directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub version: u32,
    /// Monotonic release number.
    pub serial: u64,
    /// Unix seconds.
    pub created_at: i64,
    /// 16 random bytes, base64.
    #[serde(default)]
    pub nonce_b64: Option<String>,
    /// Relative path -> lowercase hex SHA-256.
    pub files: BTreeMap<String, String>,
}

/// `bundle.json` as written by the training job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDocument {
    #[serde(flatten)]
    pub params: ParameterBundle,
    pub model: ModelArtifact,
}

/// A bundle that passed every check.
#[derive(Debug, Clone)]
pub struct LoadedBundle {
    pub params: ParameterBundle,
    pub model: TabularModel,
    /// False only for debug-build unsigned loads.
    pub verified: bool,
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Decode a base64 Ed25519 public key.
///
/// # Errors
/// `BundleError::Signature` for bad base64, wrong length or an invalid point.
pub fn verifying_key_from_b64(b64: &str) -> Result<VerifyingKey, BundleError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|_| BundleError::Signature("invalid public key base64".into()))?;
    let key: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| BundleError::Signature("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&key)
        .map_err(|_| BundleError::Signature("invalid verifying key".into()))
}

fn validate_nonce_b64(nonce_b64: &str) -> Result<(), BundleError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(nonce_b64.trim())
        .map_err(|e| BundleError::Integrity(format!("invalid nonce base64: {e}")))?;
    if raw.len() != 16 {
        return Err(BundleError::Integrity(
            "nonce must decode to exactly 16 bytes".into(),
        ));
    }
    Ok(())
}

/// Reads and checks bundles.
#[derive(Debug, Clone)]
pub struct BundleLoader {
    verifying_key: Option<VerifyingKey>,
    allow_unsigned: bool,
}

impl BundleLoader {
    /// `allow_unsigned` has no effect in release builds.
    #[must_use]
    pub fn new(verifying_key: Option<VerifyingKey>, allow_unsigned: bool) -> Self {
        Self {
            verifying_key,
            allow_unsigned: cfg!(debug_assertions) && allow_unsigned,
        }
    }

    /// # Errors
    /// Fails if the configured public key file cannot be read or decoded.
    pub fn from_settings(settings: &Settings) -> Result<Self, BundleError> {
        let key = match &settings.pubkey_file {
            Some(path) => {
                let b64 = fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
                Some(verifying_key_from_b64(&b64)?)
            }
            None => None,
        };
        Ok(Self::new(key, settings.allow_unsigned_bundles))
    }

    /// Load a bundle from a directory or from its `bundle.json` path.
    ///
    /// # Errors
    /// Any I/O, parse, integrity, signature or structural failure.
    pub fn load(&self, path: &Path) -> Result<LoadedBundle, BundleError> {
        let (dir, bundle_path) = if path.is_dir() {
            (path.to_path_buf(), path.join(BUNDLE_FILE))
        } else {
            let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            (dir, path.to_path_buf())
        };

        let bundle_name = bundle_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(BUNDLE_FILE);
        let bytes = fs::read(&bundle_path).map_err(|e| BundleError::io(&bundle_path, e))?;
        let verified = self.verify(&dir, bundle_name, &bytes)?;

        let document: BundleDocument = serde_json::from_slice(&bytes)?;

        if let Err(errors) = document.params.validate() {
            for e in &errors {
                tracing::error!(problem = %e, "bundle validation");
            }
            return Err(BundleError::Invalid(errors.join("; ")));
        }

        let model = TabularModel::build(&document.model, &document.params.final_feature_order)?;

        tracing::info!(
            path = %bundle_path.display(),
            model = model.kind(),
            features = document.params.final_feature_order.len(),
            verified,
            "parameter bundle loaded"
        );

        Ok(LoadedBundle {
            params: document.params,
            model,
            verified,
        })
    }

    /// Returns whether the bundle was signature-checked.
    ///
    /// `bundle_bytes` is the buffer the caller parses; its digest is taken
    /// from memory, never re-read from disk.
    fn verify(
        &self,
        dir: &Path,
        bundle_name: &str,
        bundle_bytes: &[u8],
    ) -> Result<bool, BundleError> {
        let sig_path = dir.join(SIGNATURE_FILE);
        let manifest_path = dir.join(MANIFEST_FILE);

        let signed = sig_path.exists() && manifest_path.exists();
        let key = match (&self.verifying_key, signed) {
            (Some(key), true) => key,
            _ if self.allow_unsigned => {
                tracing::warn!(
                    signed,
                    "loading bundle WITHOUT signature verification (debug build, unsigned allowed)"
                );
                return Ok(false);
            }
            (None, _) => {
                return Err(BundleError::Signature(
                    "no verifying key configured (set HEALTHSHIELD_BUNDLE_PUBKEY_B64_FILE)".into(),
                ))
            }
            (Some(_), false) => {
                return Err(BundleError::Signature(format!(
                    "{SIGNATURE_FILE} and {MANIFEST_FILE} required beside the bundle"
                )))
            }
        };

        let sig_bytes = fs::read(&sig_path).map_err(|e| BundleError::io(&sig_path, e))?;
        let sig_array: [u8; 64] = sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| BundleError::Signature("signature must be 64 bytes".into()))?;
        let signature = Signature::from_bytes(&sig_array);

        let manifest_bytes =
            fs::read(&manifest_path).map_err(|e| BundleError::io(&manifest_path, e))?;
        key.verify(&manifest_bytes, &signature)
            .map_err(|_| BundleError::Signature("signature does not match manifest".into()))?;

        let manifest: BundleManifest = serde_json::from_slice(&manifest_bytes)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(BundleError::Integrity(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        if let Some(nonce) = &manifest.nonce_b64 {
            validate_nonce_b64(nonce)?;
        }
        if manifest.created_at > chrono::Utc::now().timestamp() + MAX_FUTURE_SKEW_SECS {
            return Err(BundleError::Integrity(
                "manifest created_at is in the future".into(),
            ));
        }

        if !manifest.files.contains_key(bundle_name) {
            return Err(BundleError::Integrity(format!(
                "manifest does not bind {bundle_name}"
            )));
        }

        for (rel, expected_hex) in &manifest.files {
            if Path::new(rel).components().count() != 1 {
                return Err(BundleError::Integrity(format!(
                    "manifest entry {rel} is not a plain file name"
                )));
            }
            let digest = if rel == bundle_name {
                sha256_hex(bundle_bytes)
            } else {
                let path = dir.join(rel);
                sha256_hex(&fs::read(&path).map_err(|e| BundleError::io(&path, e))?)
            };
            if !constant_time_eq_str(&digest, &expected_hex.to_ascii_lowercase()) {
                return Err(BundleError::Integrity(format!("digest mismatch for {rel}")));
            }
        }

        tracing::info!(serial = manifest.serial, "bundle signature verified");
        Ok(true)
    }
}
