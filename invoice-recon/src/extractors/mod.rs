//! Extraction branches
//!
//! Two independent opinions about every invoice:
//! - **pattern_extractor:** regex and line-scan rules over OCR text (deterministic)
//! - **gemini_client:** vision-language model prediction (raw, normalized later)
//!
//! plus the OCR engine feeding the pattern branch.
//!
//! # Error isolation
//! Collaborator failures (`ExtractionError`) are recorded per document by the
//! pipeline and never abort a run.

pub mod gemini_client;
pub mod pattern_extractor;
pub mod prompts;
pub mod tesseract_ocr;

pub use gemini_client::{GeminiClient, ModelConfig};
pub use pattern_extractor::{PatternError, PatternExtractor};
pub use prompts::PromptKind;
pub use tesseract_ocr::{OcrConfig, TesseractOcr};
