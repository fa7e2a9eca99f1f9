//! Anomaly Detector
//!
//! Flags every field where both methods produced a value and the values
//! disagree, regardless of which method won the recommendation.
//!
//! # Scoring
//! All method conflicts carry the same configured severity. The reason text
//! includes the normalized Levenshtein similarity of the two values for the
//! reviewer; it does not affect the score.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fusion::FieldVerdict;
use crate::schema::normalize_text;

/// Anomaly policy (`[anomaly]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Score assigned to pattern/model conflicts (0.0-1.0)
    pub conflict_severity: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            conflict_severity: 0.8,
        }
    }
}

/// Field-level disagreement flagged for human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub field: String,
    pub reason: String,
    pub score: f64,
}

pub struct AnomalyDetector {
    conflict_severity: f64,
}

impl AnomalyDetector {
    pub fn new(config: &AnomalyConfig) -> Self {
        Self {
            conflict_severity: config.conflict_severity.clamp(0.0, 1.0),
        }
    }

    /// One anomaly per present-but-mismatched verdict, in verdict order
    pub fn detect(&self, verdicts: &[FieldVerdict]) -> Vec<Anomaly> {
        let anomalies: Vec<Anomaly> = verdicts
            .iter()
            .filter(|v| v.both_present && !v.values_match)
            .map(|v| {
                let pattern = v.pattern_value.as_ref().map(normalize_text).unwrap_or_default();
                let model = v.model_value.as_ref().map(normalize_text).unwrap_or_default();
                let similarity = strsim::normalized_levenshtein(&pattern, &model);

                Anomaly {
                    field: v.field.clone(),
                    reason: format!(
                        "pattern and model disagree: {:?} vs {:?} (similarity {:.2})",
                        pattern, model, similarity
                    ),
                    score: self.conflict_severity,
                }
            })
            .collect();

        if !anomalies.is_empty() {
            debug!(count = anomalies.len(), "Anomalies detected");
        }
        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::RecommendedMethod;
    use serde_json::json;

    fn verdict(field: &str, both_present: bool, values_match: bool) -> FieldVerdict {
        FieldVerdict {
            field: field.to_string(),
            pattern_value: Some(json!("ACME")),
            model_value: Some(json!("ACME CORP")),
            pattern_confidence: 0.6,
            model_confidence: 0.9,
            both_present,
            values_match,
            recommended_value: Some(json!("ACME CORP")),
            recommended_method: RecommendedMethod::Model,
        }
    }

    #[test]
    fn test_disagreement_emits_one_anomaly() {
        let detector = AnomalyDetector::new(&AnomalyConfig::default());
        let anomalies = detector.detect(&[verdict("total_amount", true, false)]);

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].field, "total_amount");
        assert_eq!(anomalies[0].score, 0.8);
        assert_eq!(
            anomalies[0].reason,
            "pattern and model disagree: \"acme\" vs \"acme corp\" (similarity 0.44)"
        );
    }

    #[test]
    fn test_agreement_and_single_source_not_flagged() {
        let detector = AnomalyDetector::new(&AnomalyConfig::default());
        let anomalies = detector.detect(&[
            verdict("vendor", true, true),
            verdict("invoice_date", false, false),
        ]);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_configured_severity() {
        let detector = AnomalyDetector::new(&AnomalyConfig {
            conflict_severity: 0.5,
        });
        let anomalies = detector.detect(&[verdict("vendor", true, false)]);
        assert_eq!(anomalies[0].score, 0.5);
    }
}
