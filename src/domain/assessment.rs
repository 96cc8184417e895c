//! Assessment result types.
//!
//! Represents the output of one diabetes risk inference: probability, advisory
//! notes and the attribution payload handed to the visualisation layer.

use serde::{Deserialize, Serialize};

/// Probability above which the high-risk note is issued.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

/// Probability above which (up to the high threshold) the medium-risk note is issued.
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.3;

/// Reported BMI above which the weight-management note is issued.
pub const BMI_ADVISORY_THRESHOLD: f64 = 24.0;

/// Risk level classification for diabetes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Low risk of diabetes
    Low,
    /// Moderate risk, monitoring recommended
    Moderate,
    /// High risk, consultation recommended
    High,
}

impl RiskLevel {
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability > HIGH_RISK_THRESHOLD {
            Self::High
        } else if probability > MEDIUM_RISK_THRESHOLD {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Rule-based advisory note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    HighRisk,
    MediumRisk,
    WeightManagement,
}

impl Advisory {
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::HighRisk => "High risk warning: please consult a physician.",
            Self::MediumRisk => "Medium risk warning: regular follow-up is recommended.",
            Self::WeightManagement => {
                "Weight management: BMI is above 24, consider adjusting diet and exercise."
            }
        }
    }

    /// Notes in output order: risk tier first, then BMI.
    #[must_use]
    pub fn evaluate(probability: f64, reported_bmi: Option<f64>) -> Vec<Self> {
        let mut notes = Vec::with_capacity(2);
        match RiskLevel::from_probability(probability) {
            RiskLevel::High => notes.push(Self::HighRisk),
            RiskLevel::Moderate => notes.push(Self::MediumRisk),
            RiskLevel::Low => {}
        }
        if reported_bmi.is_some_and(|bmi| bmi > BMI_ADVISORY_THRESHOLD) {
            notes.push(Self::WeightManagement);
        }
        notes
    }
}

impl Serialize for Advisory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.message())
    }
}

/// One feature's share of a prediction, in log-odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    /// Aligned (scaled / encoded) value the model saw.
    pub value: f64,
    pub contribution: f64,
}

/// Additive per-feature explanation of a single prediction.
///
/// `base_value + sum(contributions) == margin`, all in log-odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub base_value: f64,
    pub margin: f64,
    pub contributions: Vec<FeatureContribution>,
}

impl Attribution {
    /// Keep the `n` largest contributions by magnitude, largest first.
    #[must_use]
    pub fn top(mut self, n: usize) -> Self {
        self.contributions.sort_by(|a, b| {
            b.contribution
                .abs()
                .total_cmp(&a.contribution.abs())
                .then_with(|| a.feature.cmp(&b.feature))
        });
        self.contributions.truncate(n);
        self
    }
}

/// Explanation payload: attribution data, or the reason it is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Explanation {
    Attribution(Attribution),
    Error(String),
}

/// Complete result of one inference request.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    /// Unique identifier
    pub request_id: String,

    /// Probability of diabetes, in [0, 1]
    pub probability: f64,

    pub risk_level: RiskLevel,

    pub advisory: Vec<Advisory>,

    pub explanation: Explanation,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Assessment {
    #[must_use]
    pub fn new(probability: f64, reported_bmi: Option<f64>, explanation: Explanation) -> Self {
        Self {
            request_id: uuid_v4(),
            probability,
            risk_level: RiskLevel::from_probability(probability),
            advisory: Advisory::evaluate(probability, reported_bmi),
            explanation,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Generate a random UUID v4 using a CSPRNG seeded from OS entropy.
fn uuid_v4() -> String {
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_entropy();
    let bytes: [u8; 16] = rng.gen();

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        (bytes[6] & 0x0f) | 0x40, bytes[7],
        (bytes[8] & 0x3f) | 0x80, bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_boundaries() {
        assert_eq!(RiskLevel::from_probability(0.1), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.3), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.31), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.7), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.71), RiskLevel::High);
    }

    #[test]
    fn test_advisory_order() {
        assert_eq!(
            Advisory::evaluate(0.9, Some(30.0)),
            vec![Advisory::HighRisk, Advisory::WeightManagement]
        );
        assert_eq!(Advisory::evaluate(0.5, None), vec![Advisory::MediumRisk]);
        assert_eq!(
            Advisory::evaluate(0.1, Some(24.5)),
            vec![Advisory::WeightManagement]
        );
        assert!(Advisory::evaluate(0.1, Some(24.0)).is_empty());
    }

    #[test]
    fn test_advisory_serializes_as_text() {
        let json = serde_json::to_string(&vec![Advisory::HighRisk]).expect("Should serialize");
        assert!(json.contains("consult a physician"));
    }

    #[test]
    fn test_attribution_top() {
        let attribution = Attribution {
            base_value: -1.0,
            margin: 0.0,
            contributions: vec![
                FeatureContribution { feature: "a".into(), value: 1.0, contribution: 0.1 },
                FeatureContribution { feature: "b".into(), value: 1.0, contribution: -0.7 },
                FeatureContribution { feature: "c".into(), value: 1.0, contribution: 0.3 },
            ],
        };
        let top = attribution.top(2);
        let names: Vec<_> = top.contributions.iter().map(|c| c.feature.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_explanation_error_payload() {
        let json = serde_json::to_value(Explanation::Error("boom".into())).expect("Should serialize");
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn test_uuid_generation() {
        let id1 = uuid_v4();
        let id2 = uuid_v4();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }
}
