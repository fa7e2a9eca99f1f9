//! Application configuration
//!
//! One TOML file with a section per component:
//! `[logging]`, `[ocr]`, `[model]`, `[normalizer]`, `[reconcile]`, `[anomaly]`,
//! `[pipeline]` and `[schema]`. Every key is optional; missing keys keep
//! their built-in defaults.
//!
//! Config file resolution (see `invoice_common::config`):
//! 1. `--config PATH`
//! 2. `INVOICE_RECON_CONFIG` environment variable
//! 3. `<config dir>/invoice-recon/config.toml`
//! 4. Built-in defaults
//!
//! The model API key is resolved separately: `GOOGLE_AI_API_KEY`, then `[model] api_key`.

use invoice_common::config::{load_toml_config, ConfigFileResolver, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::extractors::{ModelConfig, OcrConfig};
use crate::fusion::ReconcileConfig;
use crate::normalizer::NormalizerConfig;
use crate::schema::FieldSchema;
use crate::validators::AnomalyConfig;
use crate::workflow::PipelineConfig;

/// Application name used for the platform config directory
pub const APP_NAME: &str = "invoice-recon";

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "INVOICE_RECON_CONFIG";

/// Environment variable holding the model API key
pub const API_KEY_ENV_VAR: &str = "GOOGLE_AI_API_KEY";

/// Largest accepted `max_image_bytes` (50 MiB)
const MAX_IMAGE_BYTES_CEILING: u64 = 50 * 1024 * 1024;

/// Longest accepted per-document timeout
const MAX_DOCUMENT_TIMEOUT_SECS: u64 = 600;

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub ocr: OcrConfig,
    pub model: ModelConfig,
    pub normalizer: NormalizerConfig,
    pub reconcile: ReconcileConfig,
    pub anomaly: AnomalyConfig,
    pub pipeline: PipelineConfig,
    pub schema: FieldSchema,
}

impl AppConfig {
    /// Load config using the standard resolution order
    pub fn load(cli_path: Option<&Path>) -> invoice_common::Result<Self> {
        let resolver = ConfigFileResolver::new(APP_NAME, CONFIG_ENV_VAR);
        let resolved = resolver.resolve(cli_path);
        load_toml_config(resolved.as_ref())
    }

    /// Check cross-field consistency
    ///
    /// Returns every problem found; an empty list means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let mut unit_interval = |name: &str, value: f64| {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                issues.push(format!("{} must be within [0, 1], got {}", name, value));
            }
        };
        unit_interval("reconcile.high_agreement_threshold", self.reconcile.high_agreement_threshold);
        unit_interval("reconcile.low_completeness_threshold", self.reconcile.low_completeness_threshold);
        unit_interval("normalizer.default_confidence", self.normalizer.default_confidence);
        for spec in &self.schema.fields {
            for rule in &spec.patterns {
                unit_interval(&format!("schema.{}.patterns.confidence", spec.name), rule.confidence);
            }
            if let Some(scan) = &spec.line_scan {
                unit_interval(&format!("schema.{}.line_scan.confidence", spec.name), scan.confidence);
            }
        }

        let severity = self.anomaly.conflict_severity;
        if !(severity > 0.0 && severity <= 1.0) {
            issues.push(format!("anomaly.conflict_severity must be within (0, 1], got {}", severity));
        }

        let timeout = self.pipeline.document_timeout_secs;
        if timeout == 0 || timeout > MAX_DOCUMENT_TIMEOUT_SECS {
            issues.push(format!(
                "pipeline.document_timeout_secs must be within 1-{}, got {}",
                MAX_DOCUMENT_TIMEOUT_SECS, timeout
            ));
        }
        if self.pipeline.batch_concurrency == 0 {
            issues.push("pipeline.batch_concurrency must be at least 1".to_string());
        }
        if self.pipeline.max_image_bytes == 0 || self.pipeline.max_image_bytes > MAX_IMAGE_BYTES_CEILING {
            issues.push(format!(
                "pipeline.max_image_bytes must be within 1-{}, got {}",
                MAX_IMAGE_BYTES_CEILING, self.pipeline.max_image_bytes
            ));
        }

        if self.reconcile.fields.is_empty() {
            issues.push("reconcile.fields must name at least one field".to_string());
        }
        let mut seen = HashSet::new();
        for field in &self.reconcile.fields {
            if !self.schema.contains(field) {
                issues.push(format!("reconcile.fields names unknown field '{}'", field));
            }
            if !seen.insert(field.as_str()) {
                issues.push(format!("reconcile.fields lists '{}' more than once", field));
            }
        }

        let mut names = HashSet::new();
        for spec in &self.schema.fields {
            if !names.insert(spec.name.as_str()) {
                issues.push(format!("schema defines '{}' more than once", spec.name));
            }
        }

        issues
    }
}

/// Resolve the model API key: environment first, then TOML
///
/// Returns `None` when neither source holds a usable key.
pub fn resolve_model_api_key(model: &ModelConfig) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|k| is_valid_key(k));
    let toml_key = model.api_key.clone().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Model API key found in both environment and TOML config. Using {} (highest priority).",
            API_KEY_ENV_VAR
        );
    }

    if let Some(key) = env_key {
        info!("Model API key loaded from environment variable");
        return Some(key);
    }
    if let Some(key) = toml_key {
        info!("Model API key loaded from TOML config");
        return Some(key);
    }
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
