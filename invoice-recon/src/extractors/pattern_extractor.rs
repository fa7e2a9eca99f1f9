//! Pattern Extractor (OCR text branch)
//!
//! Deterministic, rule-based field extraction over recognized document text.
//!
//! # Implementation
//! - Rules come from the field schema table; each field has ordered regex rules
//!   and/or a line-scan heuristic
//! - Regexes run case-insensitively against the lowercased text; the first rule
//!   yielding a non-empty capture wins
//! - Every extractable field appears in the result, absent fields with
//!   confidence 0.0
//!
//! # Architecture
//! Pure and synchronous: no I/O, never fails on input text. Invalid rules are
//! rejected once, at construction.

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::schema::{CaptureTransform, FieldSchema, LineScanRule};
use crate::types::{ExtractionMethod, ExtractionResult, FieldValue};

/// Schema rule that failed to compile
#[derive(Debug, Error)]
#[error("Invalid pattern for field '{field}': {pattern}: {source}")]
pub struct PatternError {
    pub field: String,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

struct CompiledRule {
    regex: Regex,
    confidence: f64,
    transform: CaptureTransform,
}

struct CompiledField {
    name: String,
    rules: Vec<CompiledRule>,
    line_scan: Option<LineScanRule>,
}

/// Regex and heuristic extractor over OCR text
pub struct PatternExtractor {
    fields: Vec<CompiledField>,
}

impl PatternExtractor {
    /// Compile the extraction rules of `schema`
    ///
    /// # Errors
    /// Returns the first rule whose regex does not compile
    pub fn new(schema: &FieldSchema) -> Result<Self, PatternError> {
        let mut fields = Vec::new();

        for spec in schema.fields.iter().filter(|f| f.is_extractable()) {
            let mut rules = Vec::with_capacity(spec.patterns.len());
            for rule in &spec.patterns {
                let regex = RegexBuilder::new(&rule.regex)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| PatternError {
                        field: spec.name.clone(),
                        pattern: rule.regex.clone(),
                        source,
                    })?;
                rules.push(CompiledRule {
                    regex,
                    confidence: rule.confidence,
                    transform: rule.transform,
                });
            }

            fields.push(CompiledField {
                name: spec.name.clone(),
                rules,
                line_scan: spec.line_scan.clone(),
            });
        }

        Ok(Self { fields })
    }

    /// Fields this extractor reports on
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Extract fields from OCR text
    ///
    /// Empty or whitespace-only text yields an all-absent result.
    pub fn extract(&self, text: &str) -> ExtractionResult {
        let mut result = ExtractionResult::new(ExtractionMethod::Pattern);
        for field in &self.fields {
            result.insert(field.name.clone(), FieldValue::empty());
        }

        if text.trim().is_empty() {
            debug!("No OCR text, pattern extraction skipped");
            return result;
        }

        let lowered = text.to_lowercase();

        for field in &self.fields {
            let found = match_rules(&field.rules, &lowered)
                .or_else(|| field.line_scan.as_ref().and_then(|scan| scan_lines(scan, text)));

            if let Some((value, confidence)) = found {
                debug!(field = %field.name, value = %value, confidence, "Pattern match");
                result.insert(field.name.clone(), FieldValue::new(Value::String(value), confidence));
            }
        }

        debug!(
            found = result.present_count(),
            total = self.fields.len(),
            "Pattern extraction complete"
        );
        result
    }
}

/// First rule with a non-empty capture
fn match_rules(rules: &[CompiledRule], lowered: &str) -> Option<(String, f64)> {
    rules.iter().find_map(|rule| {
        let caps = rule.regex.captures(lowered)?;
        let capture = caps.get(1).or_else(|| caps.get(0))?;
        let value = rule.transform.apply(capture.as_str());
        (!value.is_empty()).then_some((value, rule.confidence))
    })
}

/// First qualifying line among the leading lines of the text
fn scan_lines(rule: &LineScanRule, text: &str) -> Option<(String, f64)> {
    text.lines()
        .take(rule.max_lines)
        .map(str::trim)
        .find(|line| {
            if line.chars().count() < rule.min_len {
                return false;
            }
            let lower = line.to_lowercase();
            if rule.skip_keywords.iter().any(|k| lower.contains(k.as_str())) {
                return false;
            }
            let upper = line.to_uppercase();
            rule.require_any.iter().any(|m| upper.contains(m.as_str()))
        })
        .map(|line| (line.to_string(), rule.confidence))
}
