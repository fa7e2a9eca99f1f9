//! Batch processing of an image directory
//!
//! # Architecture
//! - Discovery: `walkdir`, top level only, image extensions (case-insensitive), sorted
//! - Processing: `futures::stream::buffer_unordered(batch_concurrency)` workers,
//!   each running one document through the full pipeline
//! - Outcomes are returned in input order regardless of completion order

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use super::{DocumentOutcome, FailedDocument, Pipeline};
use crate::error::Result;

/// File extensions treated as document images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "bmp"];

/// List the images directly inside `dir`, sorted by path
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(invoice_common::Error::InvalidInput(format!(
            "Not a directory: {}",
            dir.display()
        ))
        .into());
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && has_image_extension(entry.path()) {
                    images.push(entry.path().to_path_buf());
                }
            }
            Err(e) => warn!(error = %e, "Skipping unreadable directory entry"),
        }
    }

    images.sort();
    info!(dir = %dir.display(), count = images.len(), "Discovered images");
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Process `images` concurrently, returning outcomes in input order
///
/// A reconciliation contract violation fails only the affected document.
pub async fn run_batch(pipeline: &Pipeline, images: Vec<PathBuf>) -> Vec<DocumentOutcome> {
    let concurrency = pipeline.config().batch_concurrency.max(1);
    let total = images.len();
    info!(total, concurrency, "Starting batch");

    let mut results: Vec<(usize, DocumentOutcome)> = stream::iter(images.into_iter().enumerate())
        .map(|(index, path)| async move {
            let outcome = match pipeline.process(&path).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Document failed");
                    DocumentOutcome::Failed(FailedDocument {
                        source_path: path,
                        error: e.to_string(),
                    })
                }
            };
            (index, outcome)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Aggregate statistics over a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Documents that produced a record
    pub processed: usize,
    /// Documents that produced no record (timeout or contract violation)
    pub failed: usize,
    /// Records carrying at least one upstream error
    pub with_errors: usize,
    /// Fraction of documents processed without any upstream error
    pub success_rate: f64,
    /// Mean data completeness over produced records
    pub mean_completeness: f64,
    /// Mean agreement rate over produced records
    pub mean_agreement: f64,
    pub total_anomalies: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[DocumentOutcome]) -> Self {
        let records: Vec<_> = outcomes.iter().filter_map(|o| o.record()).collect();
        let total = outcomes.len();
        let processed = records.len();
        let with_errors = records.iter().filter(|r| r.has_errors()).count();

        let mean = |values: Vec<f64>| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };

        Self {
            total,
            processed,
            failed: total - processed,
            with_errors,
            success_rate: if total == 0 {
                0.0
            } else {
                (processed - with_errors) as f64 / total as f64
            },
            mean_completeness: mean(records.iter().map(|r| r.metrics.data_completeness).collect()),
            mean_agreement: mean(records.iter().map(|r| r.metrics.agreement_rate).collect()),
            total_anomalies: records.iter().map(|r| r.anomalies.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension_case_insensitive() {
        assert!(has_image_extension(Path::new("a/scan.PNG")));
        assert!(has_image_extension(Path::new("scan.tif")));
        assert!(!has_image_extension(Path::new("scan.pdf")));
        assert!(!has_image_extension(Path::new("README")));
    }

    #[test]
    fn test_discover_images_sorted_top_level_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.PNG", "notes.txt", "c.bmp"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("d.png"), b"x").unwrap();

        let images = discover_images(dir.path()).unwrap();
        let names: Vec<String> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.jpg", "c.bmp"]);
    }

    #[test]
    fn test_discover_missing_dir_is_error() {
        assert!(discover_images(Path::new("/nonexistent/invoices")).is_err());
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::from_outcomes(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.mean_completeness, 0.0);
    }

    #[test]
    fn test_summary_counts_failures() {
        let outcomes = vec![DocumentOutcome::Failed(FailedDocument {
            source_path: PathBuf::from("x.png"),
            error: "Processing timed out after 1s".to_string(),
        })];
        let summary = BatchSummary::from_outcomes(&outcomes);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.mean_agreement, 0.0);
    }
}
