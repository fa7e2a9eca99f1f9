//! Core Types and Trait Definitions for invoice-recon
//!
//! Defines the shared vocabulary of the extract → reconcile → detect pipeline:
//! - **FieldValue / ExtractionResult:** per-method field opinions
//! - **OcrEngine / ModelInference:** external collaborator seams
//! - **Error enums:** one per failure class (collaborator, normalizer, reconciliation)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Field values
// ============================================================================

/// One method's opinion about one field
///
/// `value` is `None` when the method found nothing. Empty strings, zero,
/// `false` and empty collections also count as absent (see [`FieldValue::is_present`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    /// Extracted value (scalar or structured)
    #[serde(default)]
    pub value: Option<Value>,
    /// Confidence score (0.0-1.0)
    #[serde(default)]
    pub confidence: f64,
}

impl FieldValue {
    /// Create new field value with clamped confidence (0.0-1.0)
    pub fn new(value: impl Into<Value>, confidence: f64) -> Self {
        Self {
            value: Some(value.into()),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Field with no value and zero confidence
    pub fn empty() -> Self {
        Self {
            value: None,
            confidence: 0.0,
        }
    }

    /// True if the value carries any data
    pub fn is_present(&self) -> bool {
        self.value.as_ref().map(value_is_present).unwrap_or(false)
    }

    /// Display text of a present value
    pub fn text(&self) -> Option<String> {
        if !self.is_present() {
            return None;
        }
        self.value.as_ref().map(value_text)
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::empty()
    }
}

/// Truthiness of a raw value: null, blank strings, zero, false and empty collections are absent
pub fn value_is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Plain text rendering of a value (strings unquoted, everything else as compact JSON)
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Extraction results
// ============================================================================

/// Extraction method that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Ordered regular-expression rules over OCR text
    Pattern,
    /// Vision-language model prediction mapped into the field schema
    Model,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMethod::Pattern => write!(f, "pattern"),
            ExtractionMethod::Model => write!(f, "model"),
        }
    }
}

/// Field name → FieldValue map tagged with its producing method
///
/// Read-only to downstream stages once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub method: ExtractionMethod,
    pub fields: BTreeMap<String, FieldValue>,
}

impl ExtractionResult {
    /// Create an empty result for `method`
    pub fn new(method: ExtractionMethod) -> Self {
        Self {
            method,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style insert
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Number of fields holding a present value
    pub fn present_count(&self) -> usize {
        self.fields.values().filter(|f| f.is_present()).count()
    }

    /// Parse a result from loosely-shaped JSON
    ///
    /// Accepts either a serialized `ExtractionResult` (`{"method": ..., "fields": {...}}`)
    /// or a bare field map. Every field entry must be an object; a missing
    /// `confidence` reads as 0.0.
    pub fn from_json(method: ExtractionMethod, json: &Value) -> Result<Self, ReconcileError> {
        let root = json
            .as_object()
            .ok_or_else(|| ReconcileError::Malformed(format!("expected a field map, got {}", json_type(json))))?;

        let field_map = match (root.get("method"), root.get("fields")) {
            (Some(tag), Some(fields)) => {
                let tagged: ExtractionMethod = serde_json::from_value(tag.clone())
                    .map_err(|e| ReconcileError::Malformed(format!("invalid method tag: {}", e)))?;
                if tagged != method {
                    return Err(ReconcileError::WrongMethod {
                        expected: method,
                        actual: tagged,
                    });
                }
                fields.as_object().ok_or_else(|| {
                    ReconcileError::Malformed(format!("'fields' must be a map, got {}", json_type(fields)))
                })?
            }
            _ => root,
        };

        let mut result = ExtractionResult::new(method);
        for (name, entry) in field_map {
            let obj = entry.as_object().ok_or_else(|| {
                ReconcileError::Malformed(format!(
                    "field '{}' must be a {{value, confidence}} object, got {}",
                    name,
                    json_type(entry)
                ))
            })?;
            let value = obj.get("value").cloned().filter(|v| !v.is_null());
            let confidence = match obj.get("confidence") {
                None | Some(Value::Null) => 0.0,
                Some(c) => c.as_f64().ok_or_else(|| {
                    ReconcileError::Malformed(format!("field '{}' has non-numeric confidence {}", name, c))
                })?,
            };
            result.insert(name.clone(), FieldValue { value, confidence });
        }
        Ok(result)
    }
}

/// Short JSON type name for error messages
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

// ============================================================================
// External collaborators
// ============================================================================

/// Document image loaded once and shared by both extraction branches
#[derive(Debug, Clone)]
pub struct DocumentImage {
    /// Source path on disk
    pub path: PathBuf,
    /// Raw file bytes
    pub bytes: Vec<u8>,
    /// Sniffed MIME type (e.g. "image/png")
    pub mime_type: String,
}

/// OCR collaborator: image → recognized text
///
/// May return an empty string. Failures are degraded to empty text by the pipeline.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name for provenance and logs
    fn name(&self) -> &'static str;

    /// Recognize the text of one document image
    async fn recognize(&self, image: &DocumentImage) -> Result<String, ExtractionError>;
}

/// Model-inference collaborator: image → raw field map
///
/// The raw map is heterogeneous (`{value, confidence}` objects, bare scalars,
/// sibling `<field>_confidence` keys) and is handed to the schema normalizer.
#[async_trait]
pub trait ModelInference: Send + Sync {
    /// Backend name for provenance and logs
    fn name(&self) -> &'static str;

    /// Predict raw field values for one document image
    async fn infer(&self, image: &DocumentImage) -> Result<Value, ExtractionError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Collaborator failure (OCR engine or model backend)
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// I/O error (file read/process spawn)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// External API or tool reported an error
    #[error("API error: {0}")]
    Api(String),

    /// Failed to parse response or data
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unsupported input format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Collaborator not installed or not configured
    #[error("Extractor not available: {0}")]
    NotAvailable(String),

    /// Collaborator did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Internal processing error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Schema normalizer failure
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Top-level model output was not a field map
    #[error("Model output is not a field map (got {0})")]
    NotAMapping(&'static str),
}

/// Reconciliation contract violation
///
/// These indicate a wiring bug rather than bad document data.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Input was not a field → FieldValue mapping
    #[error("Malformed extraction result: {0}")]
    Malformed(String),

    /// Result passed on the wrong side of the comparison
    #[error("Expected {expected} extraction result, got {actual}")]
    WrongMethod {
        expected: ExtractionMethod,
        actual: ExtractionMethod,
    },

    /// Confidence outside 0.0-1.0 or not a number
    #[error("Invalid confidence {confidence} for field '{field}' from {method}")]
    InvalidConfidence {
        field: String,
        method: ExtractionMethod,
        confidence: f64,
    },

    /// Same field listed twice in the compared set
    #[error("Field '{0}' listed more than once")]
    DuplicateField(String),
}
