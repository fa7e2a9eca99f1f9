//! Tesseract OCR Engine
//!
//! Recognizes document text by running the `tesseract` command-line tool.
//!
//! # Architecture
//! Implements `OcrEngine` for the pipeline's OCR stage. The binary is invoked
//! as `tesseract <image> stdout -l <lang> --psm <mode>` and its stdout is the
//! recognized text. Missing binary, non-zero exit and timeouts are reported as
//! `ExtractionError`; the pipeline degrades them to empty text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::types::{DocumentImage, ExtractionError, OcrEngine};

/// OCR configuration (`[ocr]` section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract executable (name on PATH or absolute path)
    pub binary: String,
    /// Tesseract language pack(s), e.g. "eng" or "eng+deu"
    pub language: String,
    /// Page segmentation mode (3 = fully automatic)
    pub page_segmentation_mode: u8,
    /// Per-image recognition timeout
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
            page_segmentation_mode: 3,
            timeout_secs: 60,
        }
    }
}

/// OCR engine backed by the tesseract CLI
pub struct TesseractOcr {
    binary: String,
    language: String,
    psm: u8,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            language: config.language.clone(),
            psm: config.page_segmentation_mode,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    async fn run(&self, image: &DocumentImage) -> Result<String, ExtractionError> {
        let output = Command::new(&self.binary)
            .arg(&image.path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.psm.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractionError::NotAvailable(format!("'{}' not found on PATH", self.binary))
                } else {
                    ExtractionError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Api(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn recognize(&self, image: &DocumentImage) -> Result<String, ExtractionError> {
        debug!(path = %image.path.display(), language = %self.language, "Running tesseract");

        let text = tokio::time::timeout(self.timeout, self.run(image))
            .await
            .map_err(|_| {
                ExtractionError::Timeout(format!(
                    "tesseract did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        debug!(chars = text.len(), "OCR complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config() {
        let config = OcrConfig::default();
        assert_eq!(config.binary, "tesseract");
        assert_eq!(config.language, "eng");
        assert_eq!(config.page_segmentation_mode, 3);
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_available() {
        let config = OcrConfig {
            binary: "invoice-recon-no-such-tesseract".to_string(),
            ..OcrConfig::default()
        };
        let ocr = TesseractOcr::new(&config);
        let image = DocumentImage {
            path: PathBuf::from("/tmp/none.png"),
            bytes: Vec::new(),
            mime_type: "image/png".to_string(),
        };

        let err = ocr.recognize(&image).await.unwrap_err();
        assert!(matches!(err, ExtractionError::NotAvailable(_)));
    }
}
