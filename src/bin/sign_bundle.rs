//! Bundle signing utility.
//!
//! Writes `manifest.json` (SHA-256 of `bundle.json`, serial, timestamp,
//! nonce) and its Ed25519 signature `bundle.sig` next to the bundle.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sign_bundle -- <bundle_dir> [--serial <n>] [--pub-out <path>]
//! cargo run --bin sign_bundle -- <bundle_dir> --new-key <seed_path> [--pub-out <path>]
//! ```
//!
//! # Security
//!
//! - Signing seed read from `HEALTHSHIELD_SIGNING_KEY_B64_FILE`, or freshly
//!   generated with `--new-key` (written with 0600 permissions)
//! - Only the public key is printed
//! - Seed material is zeroized after use

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use healthshield::adapters::bundle_fs::{
    sha256_hex, BundleManifest, BUNDLE_FILE, MANIFEST_FILE, MANIFEST_VERSION, SIGNATURE_FILE,
};

const KEY_FILE_ENV: &str = "HEALTHSHIELD_SIGNING_KEY_B64_FILE";

const USAGE: &str =
    "Usage: sign_bundle <bundle_dir> [--serial <u64>] [--new-key <seed_path>] [--pub-out <path>]";

#[derive(Zeroize, ZeroizeOnDrop)]
struct Seed([u8; 32]);

struct Args {
    bundle_dir: PathBuf,
    serial: Option<u64>,
    new_key: Option<PathBuf>,
    pub_out: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let mut bundle_dir = None;
    let mut serial = None;
    let mut new_key = None;
    let mut pub_out = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--serial" => {
                let v = args.next().context(USAGE)?;
                serial = Some(v.trim().parse::<u64>().context("--serial must be a u64")?);
            }
            "--new-key" => new_key = Some(PathBuf::from(args.next().context(USAGE)?)),
            "--pub-out" => pub_out = Some(PathBuf::from(args.next().context(USAGE)?)),
            "-h" | "--help" => bail!(USAGE),
            _ => {
                if bundle_dir.is_some() {
                    bail!("Unexpected argument {arg}\n{USAGE}");
                }
                bundle_dir = Some(PathBuf::from(arg));
            }
        }
    }

    Ok(Args {
        bundle_dir: bundle_dir.context(USAGE)?,
        serial,
        new_key,
        pub_out,
    })
}

fn decode_seed(b64: &str) -> Result<Seed> {
    let raw = Zeroizing::new(
        general_purpose::STANDARD
            .decode(b64.trim())
            .context("Invalid base64 in signing key")?,
    );
    if raw.len() != 32 {
        bail!(
            "Signing key seed must be 32 bytes after base64 decode (got {})",
            raw.len()
        );
    }
    let mut seed = Seed([0u8; 32]);
    seed.0.copy_from_slice(&raw);
    Ok(seed)
}

fn read_seed() -> Result<Seed> {
    let path = env::var(KEY_FILE_ENV)
        .with_context(|| format!("Missing signing key: set {KEY_FILE_ENV} or pass --new-key"))?;
    let content = Zeroizing::new(
        fs::read_to_string(path.trim()).context("Failed reading signing key file")?,
    );
    decode_seed(&content)
}

fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    if path.exists() {
        bail!("Refusing to overwrite existing file {}", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }
    let mut file = opts
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(contents)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn generate_seed(out: &Path) -> Result<Seed> {
    let mut seed = Seed([0u8; 32]);
    OsRng.fill_bytes(&mut seed.0);
    let b64 = Zeroizing::new(general_purpose::STANDARD.encode(seed.0));
    write_private(out, b64.as_bytes())?;
    println!("Wrote new signing seed: {}", out.display());
    Ok(seed)
}

fn make_nonce_b64() -> String {
    let mut nonce = [0u8; 16];
    OsRng.fill_bytes(&mut nonce);
    general_purpose::STANDARD.encode(nonce)
}

fn main() -> Result<()> {
    let args = parse_args()?;

    let dir = if args.bundle_dir.is_file() {
        args.bundle_dir
            .parent()
            .context("Bundle path has no parent directory")?
            .to_path_buf()
    } else {
        args.bundle_dir.clone()
    };

    let bundle_path = dir.join(BUNDLE_FILE);
    let bundle_bytes =
        fs::read(&bundle_path).with_context(|| format!("No bundle at {}", bundle_path.display()))?;
    // Refuse to sign something the loader would reject as unparseable.
    serde_json::from_slice::<serde_json::Value>(&bundle_bytes)
        .context("bundle.json is not valid JSON")?;

    let seed = match &args.new_key {
        Some(out) => generate_seed(out)?,
        None => read_seed()?,
    };
    let signing_key = SigningKey::from_bytes(&seed.0);
    drop(seed);

    let created_at = chrono::Utc::now().timestamp();
    let manifest = BundleManifest {
        version: MANIFEST_VERSION,
        serial: args
            .serial
            .unwrap_or_else(|| u64::try_from(created_at).unwrap_or(1)),
        created_at,
        nonce_b64: Some(make_nonce_b64()),
        files: BTreeMap::from([(BUNDLE_FILE.to_string(), sha256_hex(&bundle_bytes))]),
    };
    let manifest_bytes =
        serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest")?;

    let manifest_path = dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, &manifest_bytes)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    let sig: Signature = signing_key.sign(&manifest_bytes);
    let sig_path = dir.join(SIGNATURE_FILE);
    fs::write(&sig_path, sig.to_bytes())
        .with_context(|| format!("Failed to write {}", sig_path.display()))?;

    let pub_b64 = general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes());
    if let Some(out) = &args.pub_out {
        fs::write(out, format!("{pub_b64}\n"))
            .with_context(|| format!("Failed to write {}", out.display()))?;
    }

    println!("Signed manifest: {}", manifest_path.display());
    println!("Wrote signature: {}", sig_path.display());
    println!("Verifying key (base64): {pub_b64}");

    Ok(())
}
