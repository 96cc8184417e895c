//! HealthShield: diabetes risk assessment from NHANES-coded records.
//!
//! Reads one record (JSON object) or many (JSON array) from the file given
//! as the first argument, or from stdin, and prints the assessments as JSON.

use std::io::{IsTerminal, Read};
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use healthshield::adapters::sanitize::SanitizingMakeWriter;
use healthshield::adapters::{BundleLoader, TabularModel};
use healthshield::config::{LogMode, Settings};
use healthshield::ports::ClassifierError;
use healthshield::{Assessment, HealthShieldError, InferenceService, PatientRecord};

type Service = InferenceService<TabularModel, TabularModel>;

fn main() -> ExitCode {
    let settings = Settings::from_env();

    let _guard = match init_logging(&settings) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&settings) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(settings: &Settings) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Assessments go to stdout; when it is piped, keep logs out of it.
    let use_file = match settings.log_mode {
        LogMode::File => true,
        LogMode::Stdout => false,
        LogMode::Auto => !std::io::stdout().is_terminal(),
    };

    let (writer, guard) = if use_file {
        if let Some(parent) = settings.log_file.parent() {
            // Best-effort: don't fail startup just because the directory is missing.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&settings.log_file)
            .with_context(|| format!("Cannot open log file {}", settings.log_file.display()))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    Ok(guard)
}

fn read_input() -> Result<Value> {
    let mut raw = String::new();
    match std::env::args().nth(1) {
        Some(path) if path != "-" => {
            raw = std::fs::read_to_string(&path).with_context(|| format!("Cannot read {path}"))?;
        }
        _ => {
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Cannot read stdin")?;
        }
    }
    serde_json::from_str(&raw).context("Input is not valid JSON")
}

fn render(result: &healthshield::Result<Assessment>) -> Result<Value> {
    Ok(match result {
        Ok(assessment) => serde_json::to_value(assessment)?,
        Err(e) => error_body(e),
    })
}

fn error_body(e: &HealthShieldError) -> Value {
    json!({
        "error": {
            "code": e.code(),
            "status": e.class().http_status(),
            "message": e.to_string(),
        }
    })
}

fn parse_record(item: Value) -> healthshield::Result<PatientRecord> {
    Ok(serde_json::from_value(item)?)
}

/// Assess a JSON array element by element, keeping input order.
///
/// An element that is not a valid record gets its own `malformed_input`
/// error; the well-formed ones are still scored as one batch.
fn assess_items(service: &Service, items: Vec<Value>) -> Vec<healthshield::Result<Assessment>> {
    let parsed: Vec<_> = items.into_iter().map(parse_record).collect();
    let records: Vec<PatientRecord> = parsed
        .iter()
        .filter_map(|slot| slot.as_ref().ok().cloned())
        .collect();
    let mut assessed = service.assess_batch(&records).into_iter();

    parsed
        .into_iter()
        .map(|slot| {
            slot.and_then(|_| {
                assessed.next().unwrap_or_else(|| {
                    Err(ClassifierError::Failed("no batch result for record".into()).into())
                })
            })
        })
        .collect()
}

/// Returns whether every record was assessed.
fn run(settings: &Settings) -> Result<bool> {
    tracing::info!("Starting HealthShield...");

    let loaded = BundleLoader::from_settings(settings)
        .and_then(|loader| loader.load(&settings.bundle_path))
        .map_err(|e| {
            tracing::error!(error = %e, "parameter bundle unavailable, refusing to serve");
            HealthShieldError::from(e)
        })?;
    let service = InferenceService::from_bundle(loaded, settings);

    let input = read_input()?;
    let (body, all_ok) = match input {
        Value::Array(items) => {
            let results = assess_items(&service, items);
            let all_ok = results.iter().all(std::result::Result::is_ok);
            let rendered = results.iter().map(render).collect::<Result<Vec<_>>>()?;
            (Value::Array(rendered), all_ok)
        }
        single => {
            let result = parse_record(single).and_then(|record| service.assess(&record));
            (render(&result)?, result.is_ok())
        }
    };

    println!("{}", serde_json::to_string_pretty(&body)?);

    tracing::info!("HealthShield shutdown complete.");
    Ok(all_ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn create_test_service() -> Service {
        let loaded = BundleLoader::new(None, true)
            .load(Path::new("models"))
            .expect("Shipped bundle should load for tests");
        InferenceService::from_bundle(loaded, &Settings::default()).with_batch_threads(2)
    }

    #[test]
    fn test_malformed_item_does_not_sink_batch() {
        let service = create_test_service();
        let items = vec![
            json!({"RIDAGEYR": 30, "RIAGENDR": 1}),
            json!({"RIDAGEYR": "abc", "RIAGENDR": 1}),
            json!({"RIDAGEYR": 50, "RIAGENDR": 2}),
        ];

        let results = assess_items(&service, items);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[2].is_ok());

        let err = results[1].as_ref().expect_err("Bad element must fail alone");
        assert_eq!(err.code(), "malformed_input");
        assert_eq!(err.class().http_status(), 400);

        let body = render(&results[1]).expect("Should render");
        assert_eq!(body["error"]["code"], "malformed_input");
        assert_eq!(body["error"]["status"], 400);
    }

    #[test]
    fn test_results_follow_input_positions() {
        let service = create_test_service();
        let items = vec![
            json!("not a record"),
            json!({"RIDAGEYR": 65, "RIAGENDR": 1, "LBXGH": 8.5, "LBXGLU": 160}),
            json!({"RIAGENDR": 1}),
        ];

        let results = assess_items(&service, items);
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().expect_err("String element").code(),
            "malformed_input"
        );
        assert!(results[1].is_ok());
        assert_eq!(
            results[2].as_ref().expect_err("Age missing").code(),
            "missing_field"
        );
    }
}
