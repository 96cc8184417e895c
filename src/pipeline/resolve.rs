//! Fallbacks for derived, lab and lifestyle fields.

use crate::domain::patient::codes;
use crate::domain::{ParameterBundle, RecordFrame};

use super::PipelineError;

/// Age from which smoking and alcohol questions are asked.
pub const ADULT_AGE: f64 = 20.0;

/// SMQ020 fill for respondents too young to be asked.
pub const SMOKING_TOO_YOUNG: f64 = 2.0;

/// SMQ020 fill for adults who did not answer.
pub const SMOKING_UNDISCLOSED: f64 = 3.0;

/// Neutral fill for family-history and activity flags.
pub const NEUTRAL_FLAG: f64 = 3.0;

/// Stat key holding the adult alcohol fallback.
pub const ALCOHOL_ADULT_STAT: &str = "ALQ130_adult";

const STAT_FILLED: [&str; 10] = [
    codes::WAIST,
    codes::SYSTOLIC_AVG,
    codes::DIASTOLIC_AVG,
    codes::GLUCOSE,
    codes::INSULIN,
    codes::HBA1C,
    codes::TOTAL_CHOLESTEROL,
    codes::HDL,
    codes::LDL,
    codes::TRIGLYCERIDES,
];

const FLAGS: [&str; 3] = [
    codes::FAMILY_HISTORY,
    codes::VIGOROUS_ACTIVITY,
    codes::MODERATE_ACTIVITY,
];

/// Fill missing values that do not depend on height, weight or BMI.
///
/// Age is read as given and never imputed; its absence fails the request.
///
/// # Errors
/// Returns `PipelineError::MissingField` if age is missing.
pub fn resolve(frame: &mut RecordFrame, bundle: &ParameterBundle) -> Result<(), PipelineError> {
    let age = frame
        .value(codes::AGE)
        .ok_or(PipelineError::MissingField(codes::AGE))?;
    let adult = age >= ADULT_AGE;

    for field in STAT_FILLED {
        fill_from_stat(frame, bundle, field, field);
    }

    if frame.contains(codes::SMOKING) {
        let code = if adult {
            SMOKING_UNDISCLOSED
        } else {
            SMOKING_TOO_YOUNG
        };
        frame.fill_missing(codes::SMOKING, code);
    }

    if frame.contains(codes::ALCOHOL) {
        if adult {
            fill_from_stat(frame, bundle, codes::ALCOHOL, ALCOHOL_ADULT_STAT);
        } else {
            frame.fill_missing(codes::ALCOHOL, 0.0);
        }
    }

    for flag in FLAGS {
        frame.fill_missing(flag, NEUTRAL_FLAG);
    }

    let hours = sleep_hours(frame);
    frame.set(codes::SLEEP_HOURS, hours);
    fill_from_stat(frame, bundle, codes::SLEEP_HOURS, codes::SLEEP_HOURS);

    fill_from_stat(frame, bundle, codes::GENERAL_HEALTH, codes::GENERAL_HEALTH);

    Ok(())
}

/// The current-cycle sleep field wins over the legacy one whenever it has a value.
fn sleep_hours(frame: &RecordFrame) -> Option<f64> {
    match (frame.cell(codes::SLEEP_CURRENT), frame.cell(codes::SLEEP_LEGACY)) {
        (Some(current), Some(legacy)) => current.or(legacy),
        (Some(current), None) => current,
        (None, Some(legacy)) => legacy,
        (None, None) => None,
    }
}

fn fill_from_stat(frame: &mut RecordFrame, bundle: &ParameterBundle, field: &str, stat: &str) {
    if frame.cell(field) != Some(None) {
        return;
    }
    match bundle.stat(stat) {
        Some(value) => {
            frame.fill_missing(field, value);
        }
        None => tracing::warn!(field, stat, "no fallback statistic in bundle, leaving missing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PatientRecord;
    use crate::pipeline::fixtures;

    fn resolved(record: &PatientRecord) -> RecordFrame {
        let mut frame = record.to_frame();
        resolve(&mut frame, &fixtures::bundle()).expect("Should resolve");
        frame
    }

    #[test]
    fn test_smoking_default_depends_on_age() {
        let teen = PatientRecord {
            age: Some(15.0),
            ..fixtures::record()
        };
        assert_eq!(resolved(&teen).value(codes::SMOKING), Some(SMOKING_TOO_YOUNG));

        let adult = PatientRecord {
            age: Some(45.0),
            ..fixtures::record()
        };
        assert_eq!(resolved(&adult).value(codes::SMOKING), Some(SMOKING_UNDISCLOSED));

        let answered = PatientRecord {
            smoking: Some(1.0),
            ..fixtures::record()
        };
        assert_eq!(resolved(&answered).value(codes::SMOKING), Some(1.0));
    }

    #[test]
    fn test_alcohol_default_depends_on_age() {
        let teen = PatientRecord {
            age: Some(19.0),
            ..fixtures::record()
        };
        assert_eq!(resolved(&teen).value(codes::ALCOHOL), Some(0.0));

        let adult = PatientRecord {
            age: Some(20.0),
            ..fixtures::record()
        };
        assert_eq!(resolved(&adult).value(codes::ALCOHOL), Some(2.0));
    }

    #[test]
    fn test_lab_and_derived_fallbacks() {
        let frame = resolved(&PatientRecord {
            glucose: Some(88.0),
            ..fixtures::record()
        });

        assert_eq!(frame.value(codes::GLUCOSE), Some(88.0));
        assert_eq!(frame.value(codes::HBA1C), Some(5.5));
        assert_eq!(frame.value(codes::TRIGLYCERIDES), Some(110.0));
        assert_eq!(frame.value(codes::WAIST), Some(96.0));
        assert_eq!(frame.value(codes::SYSTOLIC_AVG), Some(120.0));
        assert_eq!(frame.value(codes::GENERAL_HEALTH), Some(3.0));
        for flag in FLAGS {
            assert_eq!(frame.value(flag), Some(NEUTRAL_FLAG));
        }
    }

    #[test]
    fn test_sleep_source_precedence() {
        let both = resolved(&PatientRecord {
            sleep_hours: Some(6.0),
            sleep_hours_legacy: Some(9.0),
            ..fixtures::record()
        });
        assert_eq!(both.value(codes::SLEEP_HOURS), Some(6.0));

        let legacy_only = resolved(&PatientRecord {
            sleep_hours_legacy: Some(5.0),
            ..fixtures::record()
        });
        assert_eq!(legacy_only.value(codes::SLEEP_HOURS), Some(5.0));

        let neither = resolved(&fixtures::record());
        assert_eq!(neither.value(codes::SLEEP_HOURS), Some(7.0));
    }

    #[test]
    fn test_missing_stat_leaves_value_missing() {
        let mut bundle = fixtures::bundle();
        bundle.imputer_stats.remove("LBXIN");

        let mut frame = fixtures::record().to_frame();
        resolve(&mut frame, &bundle).expect("Skipping is not an error");
        assert_eq!(frame.cell(codes::INSULIN), Some(None));
    }

    #[test]
    fn test_missing_age_fails_fast() {
        let mut frame = PatientRecord::default().to_frame();
        let err = resolve(&mut frame, &fixtures::bundle()).expect_err("Age is mandatory");
        assert_eq!(err, PipelineError::MissingField(codes::AGE));
    }
}
