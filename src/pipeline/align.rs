//! Feature alignment against the classifier's column order.
//!
//! The classifier indexes features by position, so the emitted vector must
//! match `final_feature_order` exactly. Zero is the right value only for a
//! one-hot branch this record did not hit; any other absent or missing
//! column means the bundle and the model disagree.

use crate::domain::{FeatureVector, ParameterBundle, RecordFrame};

use super::PipelineError;

/// Reindex a reshaped frame into a `FeatureVector`.
///
/// Columns outside the final order are dropped. Absent one-hot branches are
/// filled with 0.
///
/// # Errors
/// `ConfigIntegrity` if an expected non-categorical column is absent, or if
/// any expected column is still missing a value.
pub fn align(frame: &RecordFrame, bundle: &ParameterBundle) -> Result<FeatureVector, PipelineError> {
    let order = &bundle.final_feature_order;
    let mut values = Vec::with_capacity(order.len());

    for name in order {
        let value = match frame.cell(name) {
            Some(Some(v)) => v,
            Some(None) => {
                tracing::error!(feature = %name, "feature still missing at alignment");
                return Err(PipelineError::ConfigIntegrity(format!(
                    "feature {name} has no value and no fallback"
                )));
            }
            None if bundle.is_one_hot_branch(name) => 0.0,
            None => {
                tracing::error!(feature = %name, "expected feature absent from reshaped row");
                return Err(PipelineError::ConfigIntegrity(format!(
                    "feature {name} is not produced by the pipeline"
                )));
            }
        };
        values.push(value);
    }

    let dropped: Vec<&str> = frame
        .columns()
        .filter(|c| !order.iter().any(|o| o == c))
        .collect();
    if !dropped.is_empty() {
        tracing::debug!(columns = ?dropped, "columns not used by the model");
    }

    FeatureVector::new(order.clone(), values).map_err(PipelineError::ConfigIntegrity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures;

    fn reshaped() -> RecordFrame {
        [
            ("age", Some(0.5)),
            ("bmi", Some(0.4)),
            ("glucose", Some(0.3)),
            ("hba1c", Some(5.4)),
            ("waist", Some(88.0)),
            ("sleep_hours", Some(7.0)),
            ("gender_2.0", Some(1.0)),
            ("smoking_2.0", Some(1.0)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_alignment_order_and_fill() {
        let bundle = fixtures::bundle();
        let mut frame = reshaped();
        frame.set("BMXHT", Some(170.0));
        frame.set("smoking_9.0", Some(1.0));
        frame.remove("smoking_2.0");

        let vector = align(&frame, &bundle).expect("Should align");

        assert_eq!(vector.len(), bundle.final_feature_order.len());
        assert_eq!(vector.names(), bundle.final_feature_order.as_slice());
        assert_eq!(vector.get("BMXHT"), None);
        assert_eq!(vector.get("smoking_9.0"), None);
        assert_eq!(vector.get("smoking_2.0"), Some(0.0));
        assert_eq!(vector.get("gender_2.0"), Some(1.0));
        assert_eq!(vector.get("gender_1.0"), Some(0.0));
        assert_eq!(vector.values()[0], 0.5);
    }

    #[test]
    fn test_absent_numeric_feature_is_not_zero_filled() {
        let mut frame = reshaped();
        frame.remove("hba1c");

        let err = align(&frame, &fixtures::bundle()).expect_err("Numeric gap must fail");
        assert!(matches!(err, PipelineError::ConfigIntegrity(_)));
    }

    #[test]
    fn test_missing_value_is_rejected() {
        let mut frame = reshaped();
        frame.set("glucose", None);

        let err = align(&frame, &fixtures::bundle()).expect_err("NaN must not reach the model");
        assert!(matches!(err, PipelineError::ConfigIntegrity(_)));
    }
}
