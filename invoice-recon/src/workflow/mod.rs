//! Per-document workflow for invoice reconciliation
//!
//! Implements the image → record pipeline:
//! 1. Load the image once (size and format checks, SHA-256)
//! 2. OCR → pattern extraction
//! 3. Model inference → schema normalization
//! 4. Reconciliation → anomaly detection
//! 5. Record assembly, optional persistence through a `RecordSink`
//!
//! # Error isolation
//! Upstream failures degrade to empty extraction results and are recorded on
//! the record's `errors` list. Only a per-document timeout yields no record.

pub mod batch;
pub mod pipeline;
pub mod storage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::fusion::{DocumentMetrics, FieldVerdict, Recommendation, RecommendedMethod};
use crate::types::{ExtractionResult, FieldValue};
use crate::validators::Anomaly;

// Re-exports for convenience
pub use batch::{discover_images, run_batch, BatchSummary};
pub use pipeline::{Collaborators, Pipeline, PipelineConfig};
pub use storage::{JsonDirectorySink, RecordSink, StoredRecord};

/// Recommended value of one compared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChosenValue {
    pub value: Value,
    pub confidence: f64,
    pub method: RecommendedMethod,
}

/// Final structured output for one document
///
/// Owned by the pipeline and handed to persistence as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub source_path: PathBuf,
    /// Hex SHA-256 of the image bytes (absent if the file could not be read)
    pub content_sha256: Option<String>,
    pub processed_at: DateTime<Utc>,
    /// Recommended values of the compared fields
    pub fields: BTreeMap<String, ChosenValue>,
    /// Present values of schema fields outside the compared set (model first, then pattern)
    pub supplementary: BTreeMap<String, FieldValue>,
    pub metrics: DocumentMetrics,
    pub recommendation: Recommendation,
    pub anomalies: Vec<Anomaly>,
    pub verdicts: Vec<FieldVerdict>,
    pub pattern_extraction: ExtractionResult,
    /// Normalized model result (absent when model inference failed or was disabled)
    pub model_extraction: Option<ExtractionResult>,
    pub ocr_text: String,
    /// Non-fatal normalization issues
    pub warnings: Vec<String>,
    /// Upstream failures; non-empty does not mean nothing was extracted
    pub errors: Vec<String>,
    pub processing_time_seconds: f64,
}

impl InvoiceRecord {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A document that produced no record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub source_path: PathBuf,
    pub error: String,
}

/// Result of processing one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    /// Best-effort record (may still carry errors)
    Processed(Box<InvoiceRecord>),
    Failed(FailedDocument),
}

impl DocumentOutcome {
    pub fn record(&self) -> Option<&InvoiceRecord> {
        match self {
            DocumentOutcome::Processed(record) => Some(record.as_ref()),
            DocumentOutcome::Failed(_) => None,
        }
    }

    pub fn source_path(&self) -> &PathBuf {
        match self {
            DocumentOutcome::Processed(record) => &record.source_path,
            DocumentOutcome::Failed(failed) => &failed.source_path,
        }
    }
}

/// Upstream stage that can fail without aborting the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ImageLoad,
    Ocr,
    ModelInference,
    Normalization,
    Storage,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::ImageLoad => "image load",
            Stage::Ocr => "OCR",
            Stage::ModelInference => "model inference",
            Stage::Normalization => "normalization",
            Stage::Storage => "storage",
        };
        write!(f, "{}", s)
    }
}

/// Pipeline progress events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Document processing started
    DocumentStarted {
        path: PathBuf,
        /// Unix timestamp (seconds since epoch)
        timestamp: i64,
    },

    /// An upstream stage failed; processing continues
    StageFailed {
        path: PathBuf,
        stage: Stage,
        message: String,
    },

    /// Record assembled
    DocumentCompleted {
        path: PathBuf,
        data_completeness: f64,
        agreement_rate: f64,
        anomalies: usize,
        errors: usize,
    },

    /// No record produced (timeout)
    DocumentFailed { path: PathBuf, error: String },
}
