//! Record persistence
//!
//! The pipeline hands finished records to a `RecordSink`; the sink assigns
//! identity and storage timestamp. `JsonDirectorySink` writes one pretty-printed
//! JSON envelope per record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use super::InvoiceRecord;
use crate::error::PipelineError;

/// Where and as what a record was stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub stored_at: DateTime<Utc>,
    pub location: PathBuf,
}

/// Persistence collaborator
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn store(&self, record: &InvoiceRecord) -> Result<StoredRecord, PipelineError>;
}

/// On-disk envelope written by `JsonDirectorySink`
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredEnvelope {
    pub id: Uuid,
    pub stored_at: DateTime<Utc>,
    pub record: InvoiceRecord,
}

/// Writes `<stem>_extraction_<YYYYmmdd_HHMMSS>_<id8>.json` files into one directory
pub struct JsonDirectorySink {
    dir: PathBuf,
}

impl JsonDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(record: &InvoiceRecord, id: &Uuid, stored_at: &DateTime<Utc>) -> String {
        let stem = record
            .source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let short_id: String = id.simple().to_string().chars().take(8).collect();
        format!(
            "{}_extraction_{}_{}.json",
            stem,
            stored_at.format("%Y%m%d_%H%M%S"),
            short_id
        )
    }
}

#[async_trait]
impl RecordSink for JsonDirectorySink {
    async fn store(&self, record: &InvoiceRecord) -> Result<StoredRecord, PipelineError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            PipelineError::Storage(format!("Cannot create {}: {}", self.dir.display(), e))
        })?;

        let id = Uuid::new_v4();
        let stored_at = Utc::now();
        let location = self.dir.join(Self::file_name(record, &id, &stored_at));

        let envelope = StoredEnvelope {
            id,
            stored_at,
            record: record.clone(),
        };
        let json = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| PipelineError::Storage(format!("Serialize record failed: {}", e)))?;

        tokio::fs::write(&location, json).await.map_err(|e| {
            PipelineError::Storage(format!("Write {} failed: {}", location.display(), e))
        })?;

        info!(id = %id, path = %location.display(), "Record stored");
        Ok(StoredRecord {
            id,
            stored_at,
            location,
        })
    }
}
