// Batch Processing Integration Tests
//
// Directory discovery plus concurrent processing with mock collaborators.

use invoice_recon::workflow::{discover_images, run_batch, BatchSummary, DocumentOutcome};
use invoice_recon::AppConfig;
use serde_json::json;
use std::time::{Duration, Instant};

mod helpers;
use helpers::{MockModel, MockOcr, E2E_TEXT};

#[tokio::test]
async fn test_batch_outcomes_follow_input_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["c.png", "a.png", "b.png"] {
        helpers::write_png(dir.path(), name);
    }
    std::fs::write(dir.path().join("readme.txt"), b"not an invoice").unwrap();

    let images = discover_images(dir.path()).unwrap();
    assert_eq!(images.len(), 3);

    let pipeline = helpers::pipeline(MockOcr::returning(E2E_TEXT), None);
    let outcomes = run_batch(&pipeline, images.clone()).await;

    let order: Vec<_> = outcomes.iter().map(|o| o.source_path().clone()).collect();
    assert_eq!(order, images);
    assert!(outcomes.iter().all(|o| o.record().is_some()));
}

#[tokio::test]
async fn test_batch_runs_documents_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let images: Vec<_> = (0..4)
        .map(|i| helpers::write_png(dir.path(), &format!("scan_{}.png", i)))
        .collect();

    let mut config = AppConfig::default();
    config.pipeline.batch_concurrency = 4;
    let ocr = MockOcr::slow(E2E_TEXT, Duration::from_millis(300));
    let pipeline = helpers::pipeline_with_config(&config, ocr, None);

    let started = Instant::now();
    let outcomes = run_batch(&pipeline, images).await;

    assert_eq!(outcomes.len(), 4);
    assert!(started.elapsed() < Duration::from_millis(1100), "{:?}", started.elapsed());
}

#[tokio::test]
async fn test_batch_summary_over_mixed_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let good = helpers::write_png(dir.path(), "good.png");
    let missing = dir.path().join("missing.png");

    let model = MockModel::returning(json!({
        "invoice_number": {"value": "INV-2024-001", "confidence": 0.95},
        "vendor_name": {"value": "ACME CORP", "confidence": 0.9},
        "invoice_date": {"value": "2024-01-15", "confidence": 0.9},
        "total_amount": {"value": 1234.56, "confidence": 0.95}
    }));
    let pipeline = helpers::pipeline(MockOcr::returning(E2E_TEXT), Some(model));
    let outcomes = run_batch(&pipeline, vec![good, missing]).await;

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.with_errors, 1);
    assert_eq!(summary.success_rate, 0.5);
    assert_eq!(summary.total_anomalies, 1);
    assert_eq!(summary.mean_completeness, 0.5);
}

#[tokio::test]
async fn test_batch_timeouts_counted_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let images = vec![
        helpers::write_png(dir.path(), "a.png"),
        helpers::write_png(dir.path(), "b.png"),
    ];

    let mut config = AppConfig::default();
    config.pipeline.document_timeout_secs = 1;
    let ocr = MockOcr::slow(E2E_TEXT, Duration::from_secs(3));
    let pipeline = helpers::pipeline_with_config(&config, ocr, None);

    let outcomes = run_batch(&pipeline, images).await;
    assert!(outcomes.iter().all(|o| matches!(o, DocumentOutcome::Failed(_))));

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.success_rate, 0.0);
}
