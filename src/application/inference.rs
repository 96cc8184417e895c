//! Inference service: Orchestrates one diabetes risk assessment.
//!
//! This service coordinates:
//! - Input validation (mandatory fields rejected before the pipeline)
//! - Feature reconstruction and alignment
//! - Scoring
//! - Attribution (non-fatal)
//! - Advisory notes

use std::sync::Arc;

use crate::adapters::{LoadedBundle, TabularModel};
use crate::config::Settings;
use crate::domain::patient::codes;
use crate::domain::{Assessment, Explanation, FeatureVector, ParameterBundle, PatientRecord};
use crate::pipeline::{self, Stage};
use crate::ports::{Classifier, ClassifierError, Explainer};
use crate::{HealthShieldError, Result};

const DEFAULT_EXPLAIN_TOP_N: usize = 10;

/// Current stage of one request; logs every transition.
struct Progress {
    stage: Stage,
}

impl Progress {
    fn new() -> Self {
        tracing::debug!(stage = %Stage::Received, "assessment started");
        Self {
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, next: Stage) {
        tracing::debug!(from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }
}

/// Service for scoring patient records against one loaded bundle.
///
/// The bundle and model are shared read-only, so one service can serve
/// concurrent requests without locking.
pub struct InferenceService<C, E>
where
    C: Classifier,
    E: Explainer,
{
    bundle: Arc<ParameterBundle>,
    classifier: Arc<C>,
    explainer: Arc<E>,
    explain_top_n: usize,
    batch_threads: usize,
}

impl InferenceService<TabularModel, TabularModel> {
    /// Build a service around a loaded bundle; its model serves as both
    /// classifier and explainer.
    #[must_use]
    pub fn from_bundle(loaded: LoadedBundle, settings: &Settings) -> Self {
        let model = Arc::new(loaded.model);
        Self::new(Arc::new(loaded.params), Arc::clone(&model), model)
            .with_explain_top_n(settings.explain_top_n)
            .with_batch_threads(settings.batch_threads)
    }
}

impl<C, E> InferenceService<C, E>
where
    C: Classifier,
    E: Explainer,
{
    /// Create a new inference service.
    pub fn new(bundle: Arc<ParameterBundle>, classifier: Arc<C>, explainer: Arc<E>) -> Self {
        Self {
            bundle,
            classifier,
            explainer,
            explain_top_n: DEFAULT_EXPLAIN_TOP_N,
            batch_threads: 1,
        }
    }

    #[must_use]
    pub fn with_explain_top_n(mut self, n: usize) -> Self {
        self.explain_top_n = n.max(1);
        self
    }

    #[must_use]
    pub fn with_batch_threads(mut self, threads: usize) -> Self {
        self.batch_threads = threads.max(1);
        self
    }

    #[must_use]
    pub fn bundle(&self) -> &ParameterBundle {
        &self.bundle
    }

    fn check_record(record: &PatientRecord) -> Result<()> {
        if record.age.is_none() {
            return Err(HealthShieldError::MissingField(codes::AGE.to_string()));
        }
        if record.sex.is_none() {
            return Err(HealthShieldError::MissingField(codes::SEX.to_string()));
        }
        record.validate().map_err(HealthShieldError::Validation)
    }

    /// The aligned feature vector the classifier and explainer consume.
    ///
    /// # Errors
    /// Validation and pipeline failures.
    pub fn prepare(&self, record: &PatientRecord) -> Result<FeatureVector> {
        Self::check_record(record)?;
        Ok(pipeline::prepare_features(record, &self.bundle, |_| {})?)
    }

    /// Run the full assessment for one record.
    ///
    /// # Errors
    /// Returns error if validation, the pipeline or the classifier fails.
    /// Explainer failures are carried in the result instead.
    pub fn assess(&self, record: &PatientRecord) -> Result<Assessment> {
        let mut progress = Progress::new();

        match self.run(record, &mut progress) {
            Ok(assessment) => {
                progress.advance(Stage::Done);
                tracing::info!(
                    risk = %assessment.risk_level,
                    advisories = assessment.advisory.len(),
                    "assessment complete"
                );
                Ok(assessment)
            }
            Err(e) => {
                tracing::warn!(after = %progress.stage, code = e.code(), "assessment failed");
                progress.advance(Stage::Failed);
                Err(e)
            }
        }
    }

    fn run(&self, record: &PatientRecord, progress: &mut Progress) -> Result<Assessment> {
        Self::check_record(record)?;

        let features =
            pipeline::prepare_features(record, &self.bundle, |stage| progress.advance(stage))?;

        let probability = self.classifier.predict_proba(&features).map_err(|e| {
            tracing::error!(error = %e, "classifier invocation failed");
            e
        })?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(ClassifierError::Failed(format!(
                "probability {probability} outside [0, 1]"
            ))
            .into());
        }
        progress.advance(Stage::Scored);

        let explanation = match self.explainer.explain(&features) {
            Ok(attribution) => Explanation::Attribution(attribution.top(self.explain_top_n)),
            Err(e) => {
                tracing::warn!(error = %e, "explainer failed, returning score without attribution");
                Explanation::Error(e.to_string())
            }
        };
        progress.advance(Stage::Explained);

        Ok(Assessment::new(probability, record.reported_bmi(), explanation))
    }

    /// Assess many records over the shared bundle with scoped worker threads.
    ///
    /// Results come back in input order; one record's failure never affects
    /// another.
    pub fn assess_batch(&self, records: &[PatientRecord]) -> Vec<Result<Assessment>> {
        if records.is_empty() {
            return Vec::new();
        }
        let workers = self.batch_threads.clamp(1, records.len());
        let chunk_size = records.len().div_ceil(workers);

        tracing::info!(records = records.len(), workers, "batch assessment started");

        std::thread::scope(|scope| {
            let handles: Vec<_> = records
                .chunks(chunk_size)
                .map(|chunk| {
                    let handle = scope.spawn(move || {
                        chunk.iter().map(|r| self.assess(r)).collect::<Vec<_>>()
                    });
                    (chunk.len(), handle)
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|(len, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        tracing::error!(records = len, "batch worker panicked");
                        (0..len)
                            .map(|_| {
                                Err(ClassifierError::Failed("batch worker panicked".into()).into())
                            })
                            .collect()
                    })
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::BundleLoader;
    use crate::domain::{Advisory, Attribution, RiskLevel};
    use crate::ports::ExplainError;
    use crate::ErrorClass;
    use std::path::Path;

    fn create_test_service() -> InferenceService<TabularModel, TabularModel> {
        let loaded = BundleLoader::new(None, true)
            .load(Path::new("models"))
            .expect("Shipped bundle should load for tests");
        InferenceService::from_bundle(loaded, &Settings::default()).with_batch_threads(2)
    }

    fn low_risk() -> PatientRecord {
        PatientRecord {
            age: Some(25.0),
            sex: Some(1.0),
            height_cm: Some(170.0),
            weight_kg: Some(63.58),
            bmi: Some(22.0),
            waist_cm: Some(80.0),
            systolic_avg: Some(115.0),
            diastolic_avg: Some(75.0),
            glucose: Some(88.0),
            insulin: Some(6.0),
            hba1c: Some(5.1),
            total_cholesterol: Some(170.0),
            hdl: Some(60.0),
            ldl: Some(95.0),
            triglycerides: Some(90.0),
            smoking: Some(2.0),
            alcohol: Some(1.0),
            moderate_activity: Some(1.0),
            vigorous_activity: Some(1.0),
            family_history: Some(2.0),
            general_health: Some(2.0),
            sleep_hours: Some(7.5),
            sleep_hours_alias: None,
            sleep_hours_legacy: None,
        }
    }

    fn high_risk() -> PatientRecord {
        PatientRecord {
            age: Some(65.0),
            height_cm: Some(172.0),
            weight_kg: Some(100.6),
            bmi: Some(34.0),
            waist_cm: Some(115.0),
            systolic_avg: Some(150.0),
            diastolic_avg: Some(90.0),
            glucose: Some(160.0),
            insulin: Some(20.0),
            hba1c: Some(8.5),
            hdl: Some(40.0),
            triglycerides: Some(200.0),
            smoking: Some(1.0),
            family_history: Some(1.0),
            general_health: Some(4.0),
            ..low_risk()
        }
    }

    #[test]
    fn test_low_risk_record() {
        let service = create_test_service();
        let assessment = service.assess(&low_risk()).expect("Should assess");

        assert!(assessment.probability < 0.3, "p = {}", assessment.probability);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert!(assessment.advisory.is_empty());
        assert!(matches!(assessment.explanation, Explanation::Attribution(_)));
    }

    #[test]
    fn test_high_risk_record_gets_both_notes() {
        let service = create_test_service();
        let assessment = service.assess(&high_risk()).expect("Should assess");

        assert!(assessment.probability > 0.7);
        assert_eq!(
            assessment.advisory,
            vec![Advisory::HighRisk, Advisory::WeightManagement]
        );
    }

    #[test]
    fn test_bmi_note_ignores_height_and_weight() {
        let service = create_test_service();
        let record = PatientRecord {
            bmi: None,
            ..high_risk()
        };
        let assessment = service.assess(&record).expect("Should assess");

        // 100.6 kg at 172 cm solves to BMI 34 for the model only.
        assert!(assessment.probability > 0.7);
        assert_eq!(assessment.advisory, vec![Advisory::HighRisk]);
    }

    #[test]
    fn test_sparse_record_uses_medians_without_bmi_note() {
        let service = create_test_service();
        let record = PatientRecord {
            age: Some(45.0),
            sex: Some(2.0),
            ..Default::default()
        };
        let assessment = service.assess(&record).expect("Should assess");

        // Median BMI (27.2) feeds the model but is not the person's own.
        assert_eq!(assessment.risk_level, RiskLevel::Moderate);
        assert_eq!(assessment.advisory, vec![Advisory::MediumRisk]);
    }

    #[test]
    fn test_attribution_is_truncated_and_additive() {
        let service = create_test_service().with_explain_top_n(3);
        let assessment = service.assess(&high_risk()).expect("Should assess");

        let Explanation::Attribution(attribution) = assessment.explanation else {
            panic!("Expected attribution");
        };
        assert_eq!(attribution.contributions.len(), 3);
        assert_eq!(attribution.contributions[0].feature, "hba1c");

        let full = service
            .explainer
            .explain(&service.prepare(&high_risk()).expect("Should prepare"))
            .expect("Should explain");
        let total: f64 = full.contributions.iter().map(|c| c.contribution).sum();
        assert!((full.base_value + total - full.margin).abs() < 1e-9);
    }

    #[test]
    fn test_prepared_vector_matches_final_order() {
        let service = create_test_service();
        let vector = service.prepare(&low_risk()).expect("Should prepare");

        assert_eq!(vector.names(), service.bundle().final_feature_order.as_slice());
        assert_eq!(vector.get("gender_1.0"), Some(1.0));
        assert_eq!(vector.get("gender_2.0"), Some(0.0));
        assert_eq!(vector.get("smoking_2.0"), Some(1.0));
        assert!(vector.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_missing_age_rejected_before_pipeline() {
        let service = create_test_service();
        let record = PatientRecord {
            age: None,
            ..low_risk()
        };
        let err = service.assess(&record).expect_err("Age is mandatory");
        assert!(matches!(err, HealthShieldError::MissingField(ref f) if f == codes::AGE));
        assert_eq!(err.class(), ErrorClass::Client);
    }

    #[test]
    fn test_zero_height_is_client_error() {
        let service = create_test_service();
        let record = PatientRecord {
            height_cm: Some(0.0),
            bmi: None,
            ..low_risk()
        };
        let err = service.assess(&record).expect_err("Zero height must fail");
        assert_eq!(err.code(), "invalid_anthropometrics");
        assert_eq!(err.class(), ErrorClass::Client);
    }

    struct BrokenExplainer;

    impl Explainer for BrokenExplainer {
        fn explain(&self, _: &FeatureVector) -> std::result::Result<Attribution, ExplainError> {
            Err(ExplainError::Unavailable("no background data".into()))
        }
    }

    struct BrokenClassifier;

    impl Classifier for BrokenClassifier {
        fn num_features(&self) -> usize {
            0
        }

        fn predict_proba(&self, _: &FeatureVector) -> std::result::Result<f64, ClassifierError> {
            Err(ClassifierError::Failed("model crashed".into()))
        }
    }

    #[test]
    fn test_explainer_failure_is_not_fatal() {
        let base = create_test_service();
        let service = InferenceService::new(
            Arc::clone(&base.bundle),
            Arc::clone(&base.classifier),
            Arc::new(BrokenExplainer),
        );

        let assessment = service.assess(&low_risk()).expect("Score still returned");
        assert!(assessment.probability < 0.3);
        assert!(matches!(
            assessment.explanation,
            Explanation::Error(ref msg) if msg.contains("no background data")
        ));
    }

    #[test]
    fn test_classifier_failure_is_fatal() {
        let base = create_test_service();
        let service = InferenceService::new(
            Arc::clone(&base.bundle),
            Arc::new(BrokenClassifier),
            Arc::clone(&base.explainer),
        );

        let err = service.assess(&low_risk()).expect_err("No partial result");
        assert_eq!(err.code(), "classifier_failed");
        assert_eq!(err.class(), ErrorClass::Server);
    }

    #[test]
    fn test_batch_keeps_order_and_isolates_failures() {
        let service = create_test_service();
        let bad = PatientRecord {
            sex: None,
            ..low_risk()
        };
        let records = vec![low_risk(), bad, high_risk(), low_risk(), high_risk()];

        let results = service.assess_batch(&records);

        assert_eq!(results.len(), 5);
        assert!(results[1].is_err());
        let risks: Vec<_> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|a| a.risk_level)
            .collect();
        assert_eq!(
            risks,
            vec![RiskLevel::Low, RiskLevel::High, RiskLevel::Low, RiskLevel::High]
        );
        assert!(service.assess_batch(&[]).is_empty());
    }
}
