//! Test Helper Utilities
//!
//! Mock collaborators and image fixtures for invoice-recon integration tests.
//! No network access or tesseract install required.

#![allow(dead_code)]

use async_trait::async_trait;
use invoice_recon::types::{DocumentImage, ExtractionError, ModelInference, OcrEngine};
use invoice_recon::workflow::{Collaborators, Pipeline};
use invoice_recon::AppConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// End-to-end OCR text fixture
pub const E2E_TEXT: &str = "Invoice #INV-2024-001\nACME CORP LTD\nDate: 2024-01-15\nTotal: $1,234.56";

/// Smallest byte sequence sniffed as PNG
pub const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
];

/// Write a fake PNG named `name` into `dir`
pub fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, PNG_BYTES).unwrap();
    path
}

// ============================================================================
// Mock OCR
// ============================================================================

pub struct MockOcr {
    text: String,
    fail: bool,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl MockOcr {
    /// OCR that always recognizes `text`
    pub fn returning(text: &str) -> Self {
        Self {
            text: text.to_string(),
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// OCR that always fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning("")
        }
    }

    /// OCR that sleeps before answering
    pub fn slow(text: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::returning(text)
        }
    }
}

#[async_trait]
impl OcrEngine for MockOcr {
    fn name(&self) -> &'static str {
        "mock-ocr"
    }

    async fn recognize(&self, _image: &DocumentImage) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ExtractionError::NotAvailable("mock OCR offline".to_string()));
        }
        Ok(self.text.clone())
    }
}

// ============================================================================
// Mock model
// ============================================================================

pub struct MockModel {
    response: Value,
    fail: bool,
}

impl MockModel {
    /// Model that always returns `response`
    pub fn returning(response: Value) -> Self {
        Self {
            response,
            fail: false,
        }
    }

    /// Model whose backend is unreachable
    pub fn failing() -> Self {
        Self {
            response: Value::Null,
            fail: true,
        }
    }
}

#[async_trait]
impl ModelInference for MockModel {
    fn name(&self) -> &'static str {
        "mock-model"
    }

    async fn infer(&self, _image: &DocumentImage) -> Result<Value, ExtractionError> {
        if self.fail {
            return Err(ExtractionError::Network("connection refused".to_string()));
        }
        Ok(self.response.clone())
    }
}

// ============================================================================
// Pipeline construction
// ============================================================================

pub fn collaborators(ocr: MockOcr, model: Option<MockModel>) -> Collaborators {
    Collaborators {
        ocr: Some(Arc::new(ocr)),
        model: model.map(|m| Arc::new(m) as Arc<dyn ModelInference>),
    }
}

pub fn pipeline(ocr: MockOcr, model: Option<MockModel>) -> Pipeline {
    Pipeline::new(&AppConfig::default(), collaborators(ocr, model)).unwrap()
}

pub fn pipeline_with_config(config: &AppConfig, ocr: MockOcr, model: Option<MockModel>) -> Pipeline {
    Pipeline::new(config, collaborators(ocr, model)).unwrap()
}
