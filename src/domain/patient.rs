//! Patient record types for diabetes risk prediction.
//!
//! Based on NHANES (CDC National Health and Nutrition Examination Survey) features.
//! Serialized field names are the NHANES variable codes the model was trained on.

use serde::{Deserialize, Serialize};

use super::frame::RecordFrame;

/// NHANES codes of the columns a record contributes to the pipeline.
pub mod codes {
    pub const AGE: &str = "RIDAGEYR";
    pub const SEX: &str = "RIAGENDR";
    pub const HEIGHT: &str = "BMXHT";
    pub const WEIGHT: &str = "BMXWT";
    pub const BMI: &str = "BMXBMI";
    pub const WAIST: &str = "BMXWAIST";
    pub const SYSTOLIC_AVG: &str = "systolic_avg";
    pub const DIASTOLIC_AVG: &str = "diastolic_avg";
    pub const GLUCOSE: &str = "LBXGLU";
    pub const INSULIN: &str = "LBXIN";
    pub const HBA1C: &str = "LBXGH";
    pub const TOTAL_CHOLESTEROL: &str = "LBXTC";
    pub const HDL: &str = "LBDHDD";
    pub const LDL: &str = "LBDLDL";
    pub const TRIGLYCERIDES: &str = "LBXTR";
    pub const SMOKING: &str = "SMQ020";
    pub const ALCOHOL: &str = "ALQ130";
    pub const MODERATE_ACTIVITY: &str = "PAQ665";
    pub const VIGOROUS_ACTIVITY: &str = "PAQ650";
    pub const FAMILY_HISTORY: &str = "MCQ300C";
    pub const GENERAL_HEALTH: &str = "HUQ010";
    pub const SLEEP_CURRENT: &str = "SLD012";
    pub const SLEEP_LEGACY: &str = "SLD010H";
    /// Derived column. The inbound `Sleep_Hours` key is folded into SLD012.
    pub const SLEEP_HOURS: &str = "Sleep_Hours";
}

/// One inbound record.
///
/// Every optional field uses `None` as the explicit "I don't know" marker;
/// zero is a real value and is never treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Age in years (RIDAGEYR). Mandatory.
    #[serde(rename = "RIDAGEYR", default)]
    pub age: Option<f64>,

    /// Sex: 1 = male, 2 = female (RIAGENDR). Mandatory.
    #[serde(rename = "RIAGENDR", default)]
    pub sex: Option<f64>,

    /// Standing height in cm (BMXHT)
    #[serde(rename = "BMXHT", default)]
    pub height_cm: Option<f64>,

    /// Weight in kg (BMXWT)
    #[serde(rename = "BMXWT", default)]
    pub weight_kg: Option<f64>,

    /// Body mass index in kg/m^2 (BMXBMI)
    #[serde(rename = "BMXBMI", default)]
    pub bmi: Option<f64>,

    /// Waist circumference in cm (BMXWAIST)
    #[serde(rename = "BMXWAIST", default)]
    pub waist_cm: Option<f64>,

    /// Mean systolic pressure in mmHg, already averaged across readings
    #[serde(default)]
    pub systolic_avg: Option<f64>,

    /// Mean diastolic pressure in mmHg, already averaged across readings
    #[serde(default)]
    pub diastolic_avg: Option<f64>,

    /// Fasting glucose in mg/dL (LBXGLU)
    #[serde(rename = "LBXGLU", default)]
    pub glucose: Option<f64>,

    /// Insulin in uU/mL (LBXIN)
    #[serde(rename = "LBXIN", default)]
    pub insulin: Option<f64>,

    /// Glycohemoglobin HbA1c in % (LBXGH)
    #[serde(rename = "LBXGH", default)]
    pub hba1c: Option<f64>,

    /// Total cholesterol in mg/dL (LBXTC)
    #[serde(rename = "LBXTC", default)]
    pub total_cholesterol: Option<f64>,

    /// HDL cholesterol in mg/dL (LBDHDD)
    #[serde(rename = "LBDHDD", default)]
    pub hdl: Option<f64>,

    /// LDL cholesterol in mg/dL (LBDLDL)
    #[serde(rename = "LBDLDL", default)]
    pub ldl: Option<f64>,

    /// Triglycerides in mg/dL (LBXTR)
    #[serde(rename = "LBXTR", default)]
    pub triglycerides: Option<f64>,

    /// Smoked 100+ cigarettes in life: 1 = yes, 2 = no (SMQ020)
    #[serde(rename = "SMQ020", default)]
    pub smoking: Option<f64>,

    /// Average drinks per day over the past year (ALQ130)
    #[serde(rename = "ALQ130", default)]
    pub alcohol: Option<f64>,

    /// Moderate recreational activity: 1 = yes, 2 = no (PAQ665)
    #[serde(rename = "PAQ665", default)]
    pub moderate_activity: Option<f64>,

    /// Vigorous recreational activity: 1 = yes, 2 = no (PAQ650)
    #[serde(rename = "PAQ650", default)]
    pub vigorous_activity: Option<f64>,

    /// Close relative had diabetes: 1 = yes, 2 = no (MCQ300C)
    #[serde(rename = "MCQ300C", default)]
    pub family_history: Option<f64>,

    /// Self-rated general health, 1 (excellent) to 5 (poor) (HUQ010)
    #[serde(rename = "HUQ010", default)]
    pub general_health: Option<f64>,

    /// Usual sleep hours, current survey cycles (SLD012)
    #[serde(rename = "SLD012", default)]
    pub sleep_hours: Option<f64>,

    /// Usual sleep hours under the API name (`Sleep_Hours`).
    /// Used only when `SLD012` carries no value.
    #[serde(rename = "Sleep_Hours", default)]
    pub sleep_hours_alias: Option<f64>,

    /// Usual sleep hours, legacy survey cycles (SLD010H)
    #[serde(rename = "SLD010H", default)]
    pub sleep_hours_legacy: Option<f64>,
}

impl PatientRecord {
    /// Validate mandatory fields and numeric sanity.
    ///
    /// Anthropometric plausibility is checked later by the back-solver, which
    /// knows which values it actually divides by.
    ///
    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match self.age {
            None => errors.push(format!("{} (age) is required", codes::AGE)),
            Some(age) if !(0.0..=150.0).contains(&age) => {
                errors.push(format!("Age {age} out of range [0, 150]"));
            }
            Some(_) => {}
        }
        match self.sex {
            None => errors.push(format!("{} (sex) is required", codes::SEX)),
            Some(sex) if sex != 1.0 && sex != 2.0 => {
                errors.push(format!("Sex {sex} must be 1 (male) or 2 (female)"));
            }
            Some(_) => {}
        }

        for (code, value) in self.columns() {
            if let Some(v) = value {
                if !v.is_finite() {
                    errors.push(format!("{code} must be a finite number"));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// BMI exactly as submitted in `BMXBMI`.
    ///
    /// Never derived from height and weight and never imputed: the
    /// weight-management advisory only fires on a BMI the caller sent.
    #[must_use]
    pub fn reported_bmi(&self) -> Option<f64> {
        self.bmi
    }

    /// All columns in NHANES code order.
    #[must_use]
    pub fn columns(&self) -> [(&'static str, Option<f64>); 23] {
        [
            (codes::AGE, self.age),
            (codes::SEX, self.sex),
            (codes::HEIGHT, self.height_cm),
            (codes::WEIGHT, self.weight_kg),
            (codes::BMI, self.bmi),
            (codes::WAIST, self.waist_cm),
            (codes::SYSTOLIC_AVG, self.systolic_avg),
            (codes::DIASTOLIC_AVG, self.diastolic_avg),
            (codes::GLUCOSE, self.glucose),
            (codes::INSULIN, self.insulin),
            (codes::HBA1C, self.hba1c),
            (codes::TOTAL_CHOLESTEROL, self.total_cholesterol),
            (codes::HDL, self.hdl),
            (codes::LDL, self.ldl),
            (codes::TRIGLYCERIDES, self.triglycerides),
            (codes::SMOKING, self.smoking),
            (codes::ALCOHOL, self.alcohol),
            (codes::MODERATE_ACTIVITY, self.moderate_activity),
            (codes::VIGOROUS_ACTIVITY, self.vigorous_activity),
            (codes::FAMILY_HISTORY, self.family_history),
            (codes::GENERAL_HEALTH, self.general_health),
            (codes::SLEEP_CURRENT, self.sleep_hours.or(self.sleep_hours_alias)),
            (codes::SLEEP_LEGACY, self.sleep_hours_legacy),
        ]
    }

    /// Build the one-row frame the pipeline operates on.
    #[must_use]
    pub fn to_frame(&self) -> RecordFrame {
        self.columns().into_iter().collect()
    }
}
