//! Pipeline-level error types
//!
//! Per-document upstream failures (OCR, model, normalization) never surface
//! here: they are recorded on the document's `errors` list. `PipelineError`
//! covers setup problems and contract violations that abort a caller.

use thiserror::Error;

use crate::extractors::pattern_extractor::PatternError;
use crate::types::ReconcileError;

/// Result type for pipeline setup and orchestration
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Field schema contains an invalid extraction rule
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// Reconciliation contract violation
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Persisting a record failed
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] invoice_common::Error),
}
