//! Schema Normalizer
//!
//! Maps heterogeneous model output onto the canonical field schema.
//!
//! # Implementation
//! - Keys are looked up canonical name first, then aliases (`vendor_name` → `vendor`)
//! - `{value, confidence}` objects pass through; bare values are wrapped using the
//!   sibling `<key>_confidence` entry or the configured default confidence
//! - Values are coerced to the field's declared kind; failed coercions keep the
//!   original value and add a warning
//! - Line item lists are shape-checked but never altered
//! - An `error` key in the model output means "no model data": the result is
//!   empty and the error text is surfaced as an upstream error

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::coercion::{coerce, line_item_issues, Coerced};
use crate::schema::{FieldKind, FieldSchema, FieldSpec};
use crate::types::{json_type, ExtractionMethod, ExtractionResult, FieldValue, NormalizeError};

/// Normalizer configuration (`[normalizer]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Confidence assigned to bare values with no confidence of their own
    pub default_confidence: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            default_confidence: 0.8,
        }
    }
}

/// Normalized model output
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSchema {
    /// Canonical model-side extraction result
    pub result: ExtractionResult,
    /// Non-fatal issues (failed coercions, malformed line items, bad confidences)
    pub warnings: Vec<String>,
    /// Error reported by the model itself
    pub upstream_error: Option<String>,
}

pub struct SchemaNormalizer {
    schema: FieldSchema,
    default_confidence: f64,
}

impl SchemaNormalizer {
    pub fn new(schema: FieldSchema, config: &NormalizerConfig) -> Self {
        Self {
            schema,
            default_confidence: config.default_confidence.clamp(0.0, 1.0),
        }
    }

    /// Normalize raw model output
    ///
    /// # Errors
    /// `NotAMapping` if the top-level value is not a JSON object
    pub fn normalize(&self, raw: &Value) -> Result<NormalizedSchema, NormalizeError> {
        let map = raw
            .as_object()
            .ok_or_else(|| NormalizeError::NotAMapping(json_type(raw)))?;

        let mut normalized = NormalizedSchema {
            result: ExtractionResult::new(ExtractionMethod::Model),
            warnings: Vec::new(),
            upstream_error: None,
        };

        if let Some(error) = map.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            warn!(error = %message, "Model reported an error, treating as no model data");
            normalized.upstream_error = Some(message);
            return Ok(normalized);
        }

        for spec in &self.schema.fields {
            if let Some(field) = self.normalize_field(spec, map, &mut normalized.warnings) {
                normalized.result.insert(spec.name.clone(), field);
            }
        }

        debug!(
            present = normalized.result.present_count(),
            warnings = normalized.warnings.len(),
            "Model output normalized"
        );
        Ok(normalized)
    }

    fn normalize_field(
        &self,
        spec: &FieldSpec,
        map: &Map<String, Value>,
        warnings: &mut Vec<String>,
    ) -> Option<FieldValue> {
        let (key, raw) = spec
            .lookup_keys()
            .find_map(|k| map.get(k).map(|v| (k, v)))?;

        let sibling = map.get(&format!("{}_confidence", key));
        let (value, stated_confidence) = match raw {
            Value::Object(obj) if obj.contains_key("value") => {
                (obj.get("value").cloned().unwrap_or(Value::Null), obj.get("confidence").or(sibling))
            }
            other => (other.clone(), sibling),
        };

        let confidence = self.read_confidence(&spec.name, stated_confidence, warnings);

        let value = if spec.kind == FieldKind::List {
            for issue in line_item_issues(&value) {
                warnings.push(format!("{}: {}", spec.name, issue));
            }
            value
        } else {
            match coerce(value, spec.kind) {
                Coerced::Kept { value, reason } => {
                    warnings.push(format!(
                        "Could not convert {} to {}: {}",
                        spec.name, spec.kind, reason
                    ));
                    value
                }
                Coerced::Converted(value) => {
                    debug!(field = %spec.name, kind = %spec.kind, "Coerced model value");
                    value
                }
                Coerced::Unchanged(value) => value,
            }
        };

        Some(FieldValue {
            value: (!value.is_null()).then_some(value),
            confidence,
        })
    }

    fn read_confidence(&self, field: &str, stated: Option<&Value>, warnings: &mut Vec<String>) -> f64 {
        let Some(stated) = stated.filter(|v| !v.is_null()) else {
            return self.default_confidence;
        };

        let parsed = match stated {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        match parsed {
            Some(c) if c.is_finite() => {
                if !(0.0..=1.0).contains(&c) {
                    warnings.push(format!("{}: confidence {} clamped to [0, 1]", field, c));
                }
                c.clamp(0.0, 1.0)
            }
            _ => {
                warnings.push(format!(
                    "{}: unreadable confidence {}, using default {}",
                    field, stated, self.default_confidence
                ));
                self.default_confidence
            }
        }
    }
}
