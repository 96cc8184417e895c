//! Runtime settings resolved from `HEALTHSHIELD_*` environment variables.

use std::path::PathBuf;

pub const BUNDLE_ENV: &str = "HEALTHSHIELD_BUNDLE";
pub const ALLOW_UNSIGNED_ENV: &str = "HEALTHSHIELD_ALLOW_UNSIGNED_BUNDLES";
pub const PUBKEY_FILE_ENV: &str = "HEALTHSHIELD_BUNDLE_PUBKEY_B64_FILE";
pub const EXPLAIN_TOP_N_ENV: &str = "HEALTHSHIELD_EXPLAIN_TOP_N";
pub const BATCH_THREADS_ENV: &str = "HEALTHSHIELD_BATCH_THREADS";
pub const LOG_MODE_ENV: &str = "HEALTHSHIELD_LOG_MODE";
pub const LOG_FILE_ENV: &str = "HEALTHSHIELD_LOG_FILE";

const DEFAULT_BUNDLE: &str = "models";
const DEFAULT_LOG_FILE: &str = "healthshield.log";
const DEFAULT_EXPLAIN_TOP_N: usize = 10;

/// Where the binary sends its logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    /// File when stdout is piped (it carries the JSON output), else stdout.
    #[default]
    Auto,
    File,
    Stdout,
}

impl LogMode {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "file" => Self::File,
            "stdout" => Self::Stdout,
            _ => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Bundle directory, or the bundle JSON itself.
    pub bundle_path: PathBuf,
    /// Honoured in debug builds only.
    pub allow_unsigned_bundles: bool,
    pub pubkey_file: Option<PathBuf>,
    pub explain_top_n: usize,
    pub batch_threads: usize,
    pub log_mode: LogMode,
    pub log_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "yes" | "YES")
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

impl Settings {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any key lookup. Unparseable values fall back to
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let positive = |name: &str| {
            lookup(name)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|&n| n > 0)
        };

        Self {
            bundle_path: lookup(BUNDLE_ENV)
                .map(|v| PathBuf::from(v.trim()))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BUNDLE)),
            allow_unsigned_bundles: lookup(ALLOW_UNSIGNED_ENV).is_some_and(|v| parse_bool(&v)),
            pubkey_file: lookup(PUBKEY_FILE_ENV)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            explain_top_n: positive(EXPLAIN_TOP_N_ENV).unwrap_or(DEFAULT_EXPLAIN_TOP_N),
            batch_threads: positive(BATCH_THREADS_ENV).unwrap_or_else(default_threads),
            log_mode: lookup(LOG_MODE_ENV)
                .map(|v| LogMode::parse(&v))
                .unwrap_or_default(),
            log_file: lookup(LOG_FILE_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s.bundle_path, PathBuf::from("models"));
        assert!(!s.allow_unsigned_bundles);
        assert_eq!(s.pubkey_file, None);
        assert_eq!(s.explain_top_n, 10);
        assert!(s.batch_threads >= 1);
        assert_eq!(s.log_mode, LogMode::Auto);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            (BUNDLE_ENV, "/srv/bundle.json"),
            (ALLOW_UNSIGNED_ENV, "yes"),
            (PUBKEY_FILE_ENV, "/run/secrets/pub.b64"),
            (EXPLAIN_TOP_N_ENV, "5"),
            (BATCH_THREADS_ENV, "3"),
            (LOG_MODE_ENV, "stdout"),
        ]);
        assert_eq!(s.bundle_path, PathBuf::from("/srv/bundle.json"));
        assert!(s.allow_unsigned_bundles);
        assert_eq!(s.pubkey_file, Some(PathBuf::from("/run/secrets/pub.b64")));
        assert_eq!(s.explain_top_n, 5);
        assert_eq!(s.batch_threads, 3);
        assert_eq!(s.log_mode, LogMode::Stdout);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let s = settings(&[(EXPLAIN_TOP_N_ENV, "0"), (BATCH_THREADS_ENV, "many")]);
        assert_eq!(s.explain_top_n, 10);
        assert!(s.batch_threads >= 1);
    }

    #[test]
    fn test_parse_bool() {
        for v in ["1", "true", "TRUE", "yes", "YES", " true "] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["0", "false", "True", "on", ""] {
            assert!(!parse_bool(v), "{v}");
        }
    }
}
