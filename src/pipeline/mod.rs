//! Feature pipeline: rebuilds the training-time feature row from one record.
//!
//! Stages run strictly in this order, each over the previous stage's frame:
//!
//! 1. [`normalize`]: sentinel survey codes become missing values
//! 2. [`resolve`]: fallbacks for derived, lab and lifestyle fields
//! 3. [`anthropometry`]: height / weight / BMI reconstruction
//! 4. [`reshape`]: drop, rename, rescale, one-hot expand
//! 5. [`align`]: reindex against the classifier's column order
//!
//! Every stage borrows the same [`ParameterBundle`](crate::domain::ParameterBundle)
//! and never mutates it.

pub mod align;
pub mod anthropometry;
pub mod normalize;
pub mod reshape;
pub mod resolve;

pub use align::align;
pub use anthropometry::back_solve;
pub use normalize::normalize;
pub use reshape::reshape;
pub use resolve::resolve;

use std::fmt;

use crate::domain::{FeatureVector, ParameterBundle, PatientRecord};

/// Lifecycle of one assessment request.
///
/// The pipeline owns the first five transitions; the inference service
/// drives the rest. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Normalized,
    Resolved,
    Reshaped,
    Aligned,
    Scored,
    /// The explainer ran, or failed and was skipped.
    Explained,
    Done,
    Failed,
}

impl Stage {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Normalized => "normalized",
            Self::Resolved => "resolved",
            Self::Reshaped => "reshaped",
            Self::Aligned => "aligned",
            Self::Scored => "scored",
            Self::Explained => "explained",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Errors raised while turning a record into a feature vector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// A mandatory input field is absent.
    #[error("Missing mandatory field: {0}")]
    MissingField(&'static str),

    /// Height, weight or BMI cannot be used in the reconstruction formulas.
    #[error("Invalid anthropometrics: {0}")]
    InvalidAnthropometrics(String),

    /// The bundle does not describe the columns this record produces.
    #[error("Parameter bundle does not match the model: {0}")]
    ConfigIntegrity(String),
}

/// Run stages 1-5 over one record.
///
/// `on_stage` is called after each stage completes. The record must already
/// have passed [`PatientRecord::validate`]; age is still re-checked by the
/// resolver since the age-conditioned rules depend on it.
///
/// # Errors
/// The first [`PipelineError`] any stage raises.
pub fn prepare_features(
    record: &PatientRecord,
    bundle: &ParameterBundle,
    mut on_stage: impl FnMut(Stage),
) -> Result<FeatureVector, PipelineError> {
    let mut frame = record.to_frame();

    let nulled = normalize(&mut frame, &bundle.nan_groups);
    if nulled > 0 {
        tracing::debug!(count = nulled, "sentinel codes cleared");
    }
    on_stage(Stage::Normalized);

    resolve(&mut frame, bundle)?;
    back_solve(&mut frame, bundle)?;
    on_stage(Stage::Resolved);

    let frame = reshape(frame, bundle)?;
    on_stage(Stage::Reshaped);

    let features = align(&frame, bundle)?;
    on_stage(Stage::Aligned);

    Ok(features)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeMap;

    use crate::domain::{NanGroup, ParameterBundle, PatientRecord, Scaler};

    /// A compact bundle shaped like the shipped one.
    pub fn bundle() -> ParameterBundle {
        let stats = [
            ("BMXHT", 166.0),
            ("BMXWT", 75.0),
            ("BMXWAIST", 96.0),
            ("systolic_avg", 120.0),
            ("diastolic_avg", 70.0),
            ("LBXGLU", 100.0),
            ("LBXIN", 10.0),
            ("LBXGH", 5.5),
            ("LBXTC", 190.0),
            ("LBDHDD", 52.0),
            ("LBDLDL", 110.0),
            ("LBXTR", 110.0),
            ("ALQ130_adult", 2.0),
            ("Sleep_Hours", 7.0),
            ("HUQ010", 3.0),
        ];
        let groups = [
            (
                "group_big",
                vec!["SMQ020", "MCQ300C", "HUQ010"],
                vec![7.0, 9.0, 77.0, 99.0, 777.0, 999.0, 7777.0, 9999.0],
            ),
            ("group_7_9", vec!["PAQ665", "PAQ650"], vec![7.0, 9.0]),
            ("group_77_99", vec!["SLD010H"], vec![77.0, 99.0]),
            ("group_777_999", vec!["ALQ130"], vec![777.0, 999.0]),
        ];
        let renames = [
            ("RIDAGEYR", "age"),
            ("RIAGENDR", "gender"),
            ("BMXBMI", "bmi"),
            ("BMXWAIST", "waist"),
            ("LBXGLU", "glucose"),
            ("LBXGH", "hba1c"),
            ("SMQ020", "smoking"),
            ("Sleep_Hours", "sleep_hours"),
        ];

        ParameterBundle {
            version: 1,
            imputer_stats: stats.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            nan_groups: groups
                .into_iter()
                .map(|(name, fields, codes)| {
                    (
                        name.to_string(),
                        NanGroup {
                            fields: fields.into_iter().map(String::from).collect(),
                            codes,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
            rename_table: renames
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            drop_columns: ["SLD012", "SLD010H", "BPXSY1", "BPXDI1"]
                .map(String::from)
                .to_vec(),
            scale_columns: vec!["age".into(), "bmi".into(), "glucose".into()],
            scaler: Scaler::MinMax {
                data_min: vec![20.0, 15.0, 50.0],
                data_max: vec![80.0, 45.0, 250.0],
                feature_range: (0.0, 1.0),
            },
            categorical_columns: vec!["gender".into(), "smoking".into()],
            final_feature_order: [
                "age",
                "bmi",
                "glucose",
                "hba1c",
                "waist",
                "sleep_hours",
                "gender_1.0",
                "gender_2.0",
                "smoking_1.0",
                "smoking_2.0",
                "smoking_3.0",
            ]
            .map(String::from)
            .to_vec(),
        }
    }

    pub fn record() -> PatientRecord {
        PatientRecord {
            age: Some(45.0),
            sex: Some(2.0),
            ..Default::default()
        }
    }
}
