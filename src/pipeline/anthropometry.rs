//! Height / weight / BMI reconstruction.
//!
//! With H in cm, W in kg and B in kg/m^2 the three are tied by
//! `B = W / (H/100)^2`. Any two determine the third; with fewer than two the
//! stored training medians stand in first. The medians always come from the
//! bundle: a median over a one-row request is just the input itself.

use crate::domain::patient::codes;
use crate::domain::{ParameterBundle, RecordFrame};

use super::PipelineError;

/// A complete, consistent set of body measures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyMeasures {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub bmi: f64,
}

/// Training-time medians used when fewer than two measures are known.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Medians {
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
}

impl Medians {
    #[must_use]
    pub fn from_bundle(bundle: &ParameterBundle) -> Self {
        Self {
            height_cm: bundle.stat(codes::HEIGHT),
            weight_kg: bundle.stat(codes::WEIGHT),
        }
    }

    fn height(&self) -> Result<Option<f64>, PipelineError> {
        match self.height_cm {
            Some(h) if h <= 0.0 => Err(PipelineError::ConfigIntegrity(format!(
                "median height {h} must be positive"
            ))),
            other => Ok(other),
        }
    }

    fn weight(&self) -> Result<Option<f64>, PipelineError> {
        match self.weight_kg {
            Some(w) if w <= 0.0 => Err(PipelineError::ConfigIntegrity(format!(
                "median weight {w} must be positive"
            ))),
            other => Ok(other),
        }
    }
}

fn bmi_from(height_cm: f64, weight_kg: f64) -> f64 {
    weight_kg / (height_cm / 100.0).powi(2)
}

fn weight_from(height_cm: f64, bmi: f64) -> f64 {
    bmi * (height_cm / 100.0).powi(2)
}

fn height_from(weight_kg: f64, bmi: f64) -> f64 {
    100.0 * (weight_kg / bmi).sqrt()
}

fn require_positive(name: &str, value: Option<f64>) -> Result<(), PipelineError> {
    match value {
        Some(v) if v <= 0.0 || !v.is_finite() => Err(PipelineError::InvalidAnthropometrics(
            format!("{name} must be a positive number"),
        )),
        _ => Ok(()),
    }
}

/// Reconstruct missing measures.
///
/// Returns `Ok(None)` when a median the branch needs is not in the bundle;
/// the caller then leaves the measures as they are.
///
/// # Errors
/// `InvalidAnthropometrics` for non-positive inputs, `ConfigIntegrity` for
/// non-positive medians.
pub fn reconstruct(
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    bmi: Option<f64>,
    medians: Medians,
) -> Result<Option<BodyMeasures>, PipelineError> {
    require_positive("height", height_cm)?;
    require_positive("weight", weight_kg)?;
    require_positive("BMI", bmi)?;

    let measures = match (height_cm, weight_kg, bmi) {
        (Some(h), Some(w), Some(b)) => (h, w, b),

        // One missing: solve the defining formula.
        (Some(h), Some(w), None) => (h, w, bmi_from(h, w)),
        (Some(h), None, Some(b)) => (h, weight_from(h, b), b),
        (None, Some(w), Some(b)) => (height_from(w, b), w, b),

        // Two missing: median first, then the formula.
        (None, None, Some(b)) => {
            let Some(w) = medians.weight()? else {
                return Ok(None);
            };
            (height_from(w, b), w, b)
        }
        (None, Some(w), None) => {
            let Some(h) = medians.height()? else {
                return Ok(None);
            };
            (h, w, bmi_from(h, w))
        }
        (Some(h), None, None) => {
            let Some(w) = medians.weight()? else {
                return Ok(None);
            };
            (h, w, bmi_from(h, w))
        }

        // Nothing known.
        (None, None, None) => {
            let (Some(h), Some(w)) = (medians.height()?, medians.weight()?) else {
                return Ok(None);
            };
            (h, w, bmi_from(h, w))
        }
    };

    let (height_cm, weight_kg, bmi) = measures;
    if ![height_cm, weight_kg, bmi].iter().all(|v| v.is_finite()) {
        return Err(PipelineError::InvalidAnthropometrics(
            "reconstructed measures are not finite".to_string(),
        ));
    }

    Ok(Some(BodyMeasures {
        height_cm,
        weight_kg,
        bmi,
    }))
}

/// Fill BMXHT, BMXWT and BMXBMI in place.
///
/// Runs only when all three columns exist in the frame.
///
/// # Errors
/// See [`reconstruct`].
pub fn back_solve(frame: &mut RecordFrame, bundle: &ParameterBundle) -> Result<(), PipelineError> {
    if ![codes::HEIGHT, codes::WEIGHT, codes::BMI]
        .iter()
        .all(|c| frame.contains(c))
    {
        return Ok(());
    }

    let solved = reconstruct(
        frame.value(codes::HEIGHT),
        frame.value(codes::WEIGHT),
        frame.value(codes::BMI),
        Medians::from_bundle(bundle),
    )?;

    match solved {
        Some(m) => {
            frame.set(codes::HEIGHT, Some(m.height_cm));
            frame.set(codes::WEIGHT, Some(m.weight_kg));
            frame.set(codes::BMI, Some(m.bmi));
        }
        None => tracing::warn!("height/weight medians missing from bundle, body measures left as given"),
    }

    Ok(())
}
