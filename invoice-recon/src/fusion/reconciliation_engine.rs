//! Reconciliation Engine
//!
//! Merges the pattern and model opinions about one document into a single
//! recommended value per field, plus document-level metrics.
//!
//! # Implementation
//! Per compared field:
//! 1. Both present and equal under the field's comparator → pattern value, method "either"
//! 2. Otherwise the higher stated confidence wins, even when that side's value
//!    is absent (the field then stays without data). With
//!    `absent_counts_as_zero` an absent value competes with confidence 0.0
//! 3. Exact ties go to the configured `tie_break` method if it has a value,
//!    then to the other method, else the field stays unrecommended
//!
//! # Architecture
//! Pure and deterministic: the same inputs always produce the same verdicts.
//! Inputs violating the extraction contract (wrong method tag, confidence
//! outside 0.0-1.0) are rejected with `ReconcileError` rather than guessed at.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::schema::{fields, Comparator, FieldSchema};
use crate::types::{value_is_present, ExtractionMethod, ExtractionResult, FieldValue, ReconcileError};

/// Method preferred on an exact confidence tie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    #[default]
    Model,
    Pattern,
}

/// Reconciliation policy (`[reconcile]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Fields compared between the two methods, in report order
    pub fields: Vec<String>,
    /// Agreement rate above which the higher-fidelity method is trusted
    pub high_agreement_threshold: f64,
    /// Completeness below which upstream signal is considered poor
    pub low_completeness_threshold: f64,
    pub tie_break: TieBreak,
    /// Treat an absent value as confidence 0.0 when comparing confidences
    pub absent_counts_as_zero: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            fields: vec![
                fields::INVOICE_NUMBER.to_string(),
                fields::VENDOR.to_string(),
                fields::INVOICE_DATE.to_string(),
                fields::TOTAL_AMOUNT.to_string(),
            ],
            high_agreement_threshold: 0.8,
            low_completeness_threshold: 0.5,
            tie_break: TieBreak::Model,
            absent_counts_as_zero: false,
        }
    }
}

/// Which method the recommended value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedMethod {
    /// Both methods agreed
    Either,
    Pattern,
    Model,
    /// Neither method had a value
    None,
}

impl std::fmt::Display for RecommendedMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecommendedMethod::Either => "either",
            RecommendedMethod::Pattern => "pattern",
            RecommendedMethod::Model => "model",
            RecommendedMethod::None => "none",
        };
        write!(f, "{}", s)
    }
}

/// Per-field reconciliation outcome; created once per field per document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldVerdict {
    pub field: String,
    pub pattern_value: Option<Value>,
    pub model_value: Option<Value>,
    pub pattern_confidence: f64,
    pub model_confidence: f64,
    pub both_present: bool,
    pub values_match: bool,
    pub recommended_value: Option<Value>,
    pub recommended_method: RecommendedMethod,
}

impl FieldVerdict {
    /// True if the recommended value carries data
    pub fn has_recommendation(&self) -> bool {
        self.recommended_value
            .as_ref()
            .map(value_is_present)
            .unwrap_or(false)
    }

    /// Confidence backing the recommended value
    pub fn recommended_confidence(&self) -> f64 {
        match self.recommended_method {
            RecommendedMethod::Either => self.pattern_confidence.max(self.model_confidence),
            RecommendedMethod::Pattern => self.pattern_confidence,
            RecommendedMethod::Model => self.model_confidence,
            RecommendedMethod::None => 0.0,
        }
    }
}

/// Document-level reconciliation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetrics {
    pub total_fields: usize,
    pub fields_with_data: usize,
    pub matching_fields: usize,
    /// fields_with_data / total_fields
    pub data_completeness: f64,
    /// matching_fields / fields_with_data (0.0 when no field has data)
    pub agreement_rate: f64,
}

impl DocumentMetrics {
    pub fn from_verdicts(verdicts: &[FieldVerdict]) -> Self {
        let total_fields = verdicts.len();
        let fields_with_data = verdicts.iter().filter(|v| v.has_recommendation()).count();
        let matching_fields = verdicts
            .iter()
            .filter(|v| v.has_recommendation() && v.values_match)
            .count();

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        Self {
            total_fields,
            fields_with_data,
            matching_fields,
            data_completeness: ratio(fields_with_data, total_fields),
            agreement_rate: ratio(matching_fields, fields_with_data),
        }
    }
}

/// Textual guidance derived from the document metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Methods agree closely; trust the higher-fidelity method
    TrustHigherFidelity,
    /// Little data found; trust neither method strongly
    PoorSignal,
    /// Mixed picture; weight each field by confidence
    BlendByConfidence,
}

impl Recommendation {
    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::TrustHigherFidelity => {
                "High agreement between methods; trust the higher-fidelity method"
            }
            Recommendation::PoorSignal => {
                "Low data completeness; upstream signal is poor, trust neither method strongly"
            }
            Recommendation::BlendByConfidence => {
                "Moderate agreement; blend field values by confidence"
            }
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Full reconciliation of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub verdicts: Vec<FieldVerdict>,
    pub metrics: DocumentMetrics,
    pub recommendation: Recommendation,
}

/// Field-by-field reconciler
pub struct ReconciliationEngine {
    config: ReconcileConfig,
    /// Comparator per compared field, aligned with `config.fields`
    comparators: Vec<Comparator>,
}

impl ReconciliationEngine {
    /// Create engine; comparators are taken from `schema`
    ///
    /// # Errors
    /// `DuplicateField` if a field is listed twice in `config.fields`
    pub fn new(config: ReconcileConfig, schema: &FieldSchema) -> Result<Self, ReconcileError> {
        let mut seen = HashSet::new();
        for field in &config.fields {
            if !seen.insert(field.as_str()) {
                return Err(ReconcileError::DuplicateField(field.clone()));
            }
        }

        let comparators = config.fields.iter().map(|f| schema.comparator(f)).collect();
        Ok(Self {
            config,
            comparators,
        })
    }

    /// Compared field names in report order
    pub fn fields(&self) -> &[String] {
        &self.config.fields
    }

    pub fn is_compared(&self, field: &str) -> bool {
        self.config.fields.iter().any(|f| f == field)
    }

    /// Reconcile one document's two extraction results
    ///
    /// A field missing from either map is treated as absent.
    ///
    /// # Errors
    /// Contract violations only: wrong method tag or invalid confidence
    pub fn reconcile(
        &self,
        pattern: &ExtractionResult,
        model: &ExtractionResult,
    ) -> Result<Reconciliation, ReconcileError> {
        check_result(pattern, ExtractionMethod::Pattern)?;
        check_result(model, ExtractionMethod::Model)?;

        let empty = FieldValue::empty();
        let verdicts: Vec<FieldVerdict> = self
            .config
            .fields
            .iter()
            .zip(&self.comparators)
            .map(|(field, comparator)| {
                self.reconcile_field(
                    field,
                    *comparator,
                    pattern.get(field).unwrap_or(&empty),
                    model.get(field).unwrap_or(&empty),
                )
            })
            .collect();

        let metrics = DocumentMetrics::from_verdicts(&verdicts);
        let recommendation = self.recommend(&metrics);

        debug!(
            completeness = metrics.data_completeness,
            agreement = metrics.agreement_rate,
            recommendation = ?recommendation,
            "Reconciliation complete"
        );

        Ok(Reconciliation {
            verdicts,
            metrics,
            recommendation,
        })
    }

    /// Decide one field
    pub fn reconcile_field(
        &self,
        field: &str,
        comparator: Comparator,
        pattern: &FieldValue,
        model: &FieldValue,
    ) -> FieldVerdict {
        let pattern_present = pattern.is_present();
        let model_present = model.is_present();
        let both_present = pattern_present && model_present;

        let values_match = match (&pattern.value, &model.value) {
            (Some(p), Some(m)) if both_present => comparator.matches(p, m),
            _ => false,
        };

        let effective = |present: bool, confidence: f64| {
            if present || !self.config.absent_counts_as_zero {
                confidence
            } else {
                0.0
            }
        };
        let pattern_confidence = effective(pattern_present, pattern.confidence);
        let model_confidence = effective(model_present, model.confidence);

        let method = if values_match {
            RecommendedMethod::Either
        } else if model_confidence > pattern_confidence {
            RecommendedMethod::Model
        } else if pattern_confidence > model_confidence {
            RecommendedMethod::Pattern
        } else {
            self.break_tie(pattern_present, model_present)
        };

        let recommended_value = match method {
            RecommendedMethod::Either | RecommendedMethod::Pattern => pattern.value.clone(),
            RecommendedMethod::Model => model.value.clone(),
            RecommendedMethod::None => None,
        };

        if both_present && !values_match {
            debug!(
                field = %field,
                pattern_confidence = pattern.confidence,
                model_confidence = model.confidence,
                chosen = %method,
                "Methods disagree"
            );
        }

        FieldVerdict {
            field: field.to_string(),
            pattern_value: pattern.value.clone(),
            model_value: model.value.clone(),
            pattern_confidence: pattern.confidence,
            model_confidence: model.confidence,
            both_present,
            values_match,
            recommended_value,
            recommended_method: method,
        }
    }

    fn break_tie(&self, pattern_present: bool, model_present: bool) -> RecommendedMethod {
        let (first, first_present, second, second_present) = match self.config.tie_break {
            TieBreak::Model => (
                RecommendedMethod::Model,
                model_present,
                RecommendedMethod::Pattern,
                pattern_present,
            ),
            TieBreak::Pattern => (
                RecommendedMethod::Pattern,
                pattern_present,
                RecommendedMethod::Model,
                model_present,
            ),
        };

        if first_present {
            first
        } else if second_present {
            second
        } else {
            RecommendedMethod::None
        }
    }

    /// Derive the document recommendation from its metrics
    pub fn recommend(&self, metrics: &DocumentMetrics) -> Recommendation {
        if metrics.agreement_rate > self.config.high_agreement_threshold {
            Recommendation::TrustHigherFidelity
        } else if metrics.data_completeness < self.config.low_completeness_threshold {
            Recommendation::PoorSignal
        } else {
            Recommendation::BlendByConfidence
        }
    }
}

fn check_result(result: &ExtractionResult, expected: ExtractionMethod) -> Result<(), ReconcileError> {
    if result.method != expected {
        return Err(ReconcileError::WrongMethod {
            expected,
            actual: result.method,
        });
    }

    for (field, value) in &result.fields {
        if !value.confidence.is_finite() || !(0.0..=1.0).contains(&value.confidence) {
            return Err(ReconcileError::InvalidConfidence {
                field: field.clone(),
                method: result.method,
                confidence: value.confidence,
            });
        }
    }
    Ok(())
}
