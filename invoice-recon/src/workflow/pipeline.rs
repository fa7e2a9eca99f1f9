//! Pipeline Orchestrator
//!
//! Runs one document image through both extraction branches, reconciles
//! them and assembles the `InvoiceRecord`.
//!
//! # Architecture
//! ```text
//! image ─┬─ OCR ──────────────► PatternExtractor ──┐
//!        └─ ModelInference ───► SchemaNormalizer ───┴─► ReconciliationEngine ─► AnomalyDetector ─► record
//! ```
//! The two branches run concurrently. Each upstream stage degrades to an empty
//! result on failure and adds an entry to the record's `errors` list, so a
//! partially failed document still yields a best-effort record.
//!
//! Reconciliation contract violations are returned as `PipelineError`. A
//! document exceeding the wall-clock timeout is reported as
//! `DocumentOutcome::Failed` with no record.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    ChosenValue, DocumentOutcome, FailedDocument, InvoiceRecord, PipelineEvent, RecordSink, Stage,
};
use crate::config::{resolve_model_api_key, AppConfig};
use crate::error::Result;
use crate::extractors::{GeminiClient, PatternExtractor, TesseractOcr};
use crate::fusion::ReconciliationEngine;
use crate::normalizer::{NormalizedSchema, SchemaNormalizer};
use crate::types::{
    DocumentImage, ExtractionError, ExtractionMethod, ExtractionResult, ModelInference, OcrEngine,
};
use crate::validators::AnomalyDetector;

/// Orchestration limits (`[pipeline]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall-clock limit for one document
    pub document_timeout_secs: u64,
    /// Documents processed concurrently in batch mode
    pub batch_concurrency: usize,
    /// Larger images are not sent to OCR or the model
    pub max_image_bytes: u64,
    /// Default directory for stored records
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            document_timeout_secs: 300,
            batch_concurrency: 4,
            max_image_bytes: 16 * 1024 * 1024,
            output_dir: PathBuf::from("data/processed/extractions"),
        }
    }
}

/// External collaborators of the pipeline
#[derive(Clone, Default)]
pub struct Collaborators {
    pub ocr: Option<Arc<dyn OcrEngine>>,
    /// `None` disables the model branch (pattern-only reconciliation)
    pub model: Option<Arc<dyn ModelInference>>,
}

impl Collaborators {
    /// Tesseract OCR plus the Gemini backend when enabled
    ///
    /// An enabled model without a usable API key is wired as an unavailable
    /// backend, so every record reports the missing key as an upstream error.
    pub fn from_config(config: &AppConfig) -> Self {
        let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractOcr::new(&config.ocr));

        let model: Option<Arc<dyn ModelInference>> = if !config.model.enabled {
            info!("Model inference disabled by config");
            None
        } else {
            let backend: Arc<dyn ModelInference> = match resolve_model_api_key(&config.model) {
                Some(key) => match GeminiClient::new(&config.model, key) {
                    Ok(client) => Arc::new(client),
                    Err(e) => Arc::new(UnavailableModel::new(e.to_string())),
                },
                None => {
                    warn!(
                        "Model API key not configured. Set {} or [model] api_key",
                        crate::config::API_KEY_ENV_VAR
                    );
                    Arc::new(UnavailableModel::new("model API key not configured"))
                }
            };
            Some(backend)
        };

        Self {
            ocr: Some(ocr),
            model,
        }
    }
}

/// Model backend that could not be constructed
struct UnavailableModel {
    reason: String,
}

impl UnavailableModel {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl ModelInference for UnavailableModel {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn infer(&self, _image: &DocumentImage) -> std::result::Result<serde_json::Value, ExtractionError> {
        Err(ExtractionError::NotAvailable(self.reason.clone()))
    }
}

/// Pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
    extractor: PatternExtractor,
    normalizer: SchemaNormalizer,
    engine: ReconciliationEngine,
    detector: AnomalyDetector,
    /// Schema fields reported outside the compared set
    supplementary_fields: Vec<String>,
    sink: Option<Arc<dyn RecordSink>>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Pipeline {
    /// Create pipeline from application config
    ///
    /// # Errors
    /// Invalid schema regexes or a duplicated compared field
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> Result<Self> {
        let extractor = PatternExtractor::new(&config.schema)?;
        let normalizer = SchemaNormalizer::new(config.schema.clone(), &config.normalizer);
        let engine = ReconciliationEngine::new(config.reconcile.clone(), &config.schema)?;
        let detector = AnomalyDetector::new(&config.anomaly);

        let supplementary_fields = config
            .schema
            .names()
            .filter(|name| !engine.is_compared(name))
            .map(str::to_string)
            .collect();

        Ok(Self {
            config: config.pipeline.clone(),
            collaborators,
            extractor,
            normalizer,
            engine,
            detector,
            supplementary_fields,
            sink: None,
            event_tx: None,
        })
    }

    /// Store every processed record through `sink`
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Report progress on `event_tx`
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The pattern extractor built from the configured schema
    pub fn extractor(&self) -> &PatternExtractor {
        &self.extractor
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Process one document under the configured timeout
    ///
    /// # Errors
    /// Reconciliation contract violations only; upstream failures are recorded
    /// on the record and timeouts produce `DocumentOutcome::Failed`.
    pub async fn process(&self, image: &Path) -> Result<DocumentOutcome> {
        self.emit_event(PipelineEvent::DocumentStarted {
            path: image.to_path_buf(),
            timestamp: chrono::Utc::now().timestamp(),
        })
        .await;

        let limit = Duration::from_secs(self.config.document_timeout_secs);
        let mut record = match tokio::time::timeout(limit, self.process_document(image)).await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                error!(path = %image.display(), error = %e, "Reconciliation contract violated");
                self.emit_event(PipelineEvent::DocumentFailed {
                    path: image.to_path_buf(),
                    error: e.to_string(),
                })
                .await;
                return Err(e);
            }
            Err(_) => {
                let message = format!(
                    "Processing timed out after {}s",
                    self.config.document_timeout_secs
                );
                warn!(path = %image.display(), "{}", message);
                self.emit_event(PipelineEvent::DocumentFailed {
                    path: image.to_path_buf(),
                    error: message.clone(),
                })
                .await;
                return Ok(DocumentOutcome::Failed(FailedDocument {
                    source_path: image.to_path_buf(),
                    error: message,
                }));
            }
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.store(&record).await {
                let message = format!("Storing record failed: {}", e);
                self.stage_failed(image, Stage::Storage, message, &mut record.errors)
                    .await;
            }
        }

        info!(
            path = %image.display(),
            completeness = record.metrics.data_completeness,
            agreement = record.metrics.agreement_rate,
            anomalies = record.anomalies.len(),
            errors = record.errors.len(),
            elapsed_secs = record.processing_time_seconds,
            "Document processed"
        );
        self.emit_event(PipelineEvent::DocumentCompleted {
            path: image.to_path_buf(),
            data_completeness: record.metrics.data_completeness,
            agreement_rate: record.metrics.agreement_rate,
            anomalies: record.anomalies.len(),
            errors: record.errors.len(),
        })
        .await;

        Ok(DocumentOutcome::Processed(Box::new(record)))
    }

    /// Process one document without a timeout or persistence
    pub async fn process_document(&self, image: &Path) -> Result<InvoiceRecord> {
        let started = Instant::now();
        let mut errors = Vec::new();

        let (document, content_sha256) = match self.load_image(image).await {
            Ok(document) => {
                let digest = format!("{:x}", Sha256::digest(&document.bytes));
                (Some(document), Some(digest))
            }
            Err(e) => {
                let message = format!("Image rejected: {}", e);
                self.stage_failed(image, Stage::ImageLoad, message, &mut errors).await;
                (None, None)
            }
        };

        let (ocr_text, normalized) = match &document {
            Some(document) => {
                let (ocr, model) = tokio::join!(self.run_ocr(document), self.run_model(document));

                let ocr_text = match ocr {
                    Ok(text) => text,
                    Err(message) => {
                        self.stage_failed(image, Stage::Ocr, message, &mut errors).await;
                        String::new()
                    }
                };
                let normalized = match model {
                    Ok(normalized) => normalized,
                    Err((stage, message)) => {
                        self.stage_failed(image, stage, message, &mut errors).await;
                        None
                    }
                };
                (ocr_text, normalized)
            }
            None => (String::new(), None),
        };

        let mut record = self.assemble(image, ocr_text, normalized, errors)?;
        record.content_sha256 = content_sha256;
        record.processing_time_seconds = started.elapsed().as_secs_f64();
        Ok(record)
    }

    /// Reconcile already-extracted inputs into a record
    ///
    /// `normalized` is `None` when the model branch produced nothing.
    pub fn assemble(
        &self,
        source: &Path,
        ocr_text: String,
        normalized: Option<NormalizedSchema>,
        mut errors: Vec<String>,
    ) -> Result<InvoiceRecord> {
        let started = Instant::now();
        let mut warnings = Vec::new();

        let pattern = self.extractor.extract(&ocr_text);

        let model_extraction = match normalized {
            Some(normalized) => {
                warnings.extend(normalized.warnings);
                match normalized.upstream_error {
                    Some(upstream) => {
                        errors.push(format!("Model reported an error: {}", upstream));
                        None
                    }
                    None => Some(normalized.result),
                }
            }
            None => {
                if self.collaborators.model.is_none() {
                    warnings.push("Model inference disabled; pattern results only".to_string());
                }
                None
            }
        };

        let empty_model = ExtractionResult::new(ExtractionMethod::Model);
        let reconciliation = self
            .engine
            .reconcile(&pattern, model_extraction.as_ref().unwrap_or(&empty_model))?;
        let anomalies = self.detector.detect(&reconciliation.verdicts);

        let fields = reconciliation
            .verdicts
            .iter()
            .filter(|v| v.has_recommendation())
            .filter_map(|v| {
                v.recommended_value.clone().map(|value| {
                    (
                        v.field.clone(),
                        ChosenValue {
                            value,
                            confidence: v.recommended_confidence(),
                            method: v.recommended_method,
                        },
                    )
                })
            })
            .collect();

        let mut supplementary = BTreeMap::new();
        for name in &self.supplementary_fields {
            let value = model_extraction
                .as_ref()
                .and_then(|m| m.get(name))
                .filter(|f| f.is_present())
                .or_else(|| pattern.get(name).filter(|f| f.is_present()));
            if let Some(value) = value {
                supplementary.insert(name.clone(), value.clone());
            }
        }

        Ok(InvoiceRecord {
            source_path: source.to_path_buf(),
            content_sha256: None,
            processed_at: chrono::Utc::now(),
            fields,
            supplementary,
            metrics: reconciliation.metrics,
            recommendation: reconciliation.recommendation,
            anomalies,
            verdicts: reconciliation.verdicts,
            pattern_extraction: pattern,
            model_extraction,
            ocr_text,
            warnings,
            errors,
            processing_time_seconds: started.elapsed().as_secs_f64(),
        })
    }

    /// Read the image once, enforcing the size limit and image format
    async fn load_image(&self, path: &Path) -> std::result::Result<DocumentImage, ExtractionError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > self.config.max_image_bytes {
            return Err(ExtractionError::UnsupportedFormat(format!(
                "{} bytes exceeds the {} byte limit",
                size, self.config.max_image_bytes
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let kind = infer::get(&bytes)
            .filter(|k| k.matcher_type() == infer::MatcherType::Image)
            .ok_or_else(|| {
                ExtractionError::UnsupportedFormat("file is not a recognised image".to_string())
            })?;

        debug!(path = %path.display(), mime = kind.mime_type(), bytes = bytes.len(), "Image loaded");
        Ok(DocumentImage {
            path: path.to_path_buf(),
            mime_type: kind.mime_type().to_string(),
            bytes,
        })
    }

    async fn run_ocr(&self, document: &DocumentImage) -> std::result::Result<String, String> {
        let Some(ocr) = &self.collaborators.ocr else {
            return Err("OCR failed: no OCR engine configured".to_string());
        };
        ocr.recognize(document)
            .await
            .map_err(|e| format!("OCR ({}) failed: {}", ocr.name(), e))
    }

    async fn run_model(
        &self,
        document: &DocumentImage,
    ) -> std::result::Result<Option<NormalizedSchema>, (Stage, String)> {
        let Some(model) = &self.collaborators.model else {
            return Ok(None);
        };

        let raw = model.infer(document).await.map_err(|e| {
            (
                Stage::ModelInference,
                format!("Model inference ({}) failed: {}", model.name(), e),
            )
        })?;

        self.normalizer
            .normalize(&raw)
            .map(Some)
            .map_err(|e| (Stage::Normalization, format!("Model output rejected: {}", e)))
    }

    /// Record a non-fatal stage failure
    async fn stage_failed(&self, path: &Path, stage: Stage, message: String, errors: &mut Vec<String>) {
        warn!(path = %path.display(), stage = %stage, error = %message, "Stage failed, continuing");
        self.emit_event(PipelineEvent::StageFailed {
            path: path.to_path_buf(),
            stage,
            message: message.clone(),
        })
        .await;
        errors.push(message);
    }

    /// Emit pipeline event if channel configured
    async fn emit_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
