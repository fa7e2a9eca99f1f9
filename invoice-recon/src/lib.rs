//! invoice-recon library interface
//!
//! Dual-method invoice extraction with field-level reconciliation:
//! - **extractors:** OCR + pattern rules, vision-language model backend
//! - **normalizer:** model output → canonical field schema
//! - **fusion:** reconciliation engine (verdicts, metrics, recommendation)
//! - **validators:** anomaly detection over verdicts
//! - **workflow:** per-document pipeline, batch runner, record sinks

pub mod config;
pub mod error;
pub mod extractors;
pub mod fusion;
pub mod normalizer;
pub mod schema;
pub mod types;
pub mod validators;
pub mod workflow;

pub use crate::config::AppConfig;
pub use crate::error::{PipelineError, Result};
pub use crate::types::{ExtractionMethod, ExtractionResult, FieldValue};
