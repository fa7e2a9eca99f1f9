//! Field Schema Table
//!
//! Single source of truth for which invoice fields exist, how each one is
//! extracted from OCR text, how model output keys map onto it, and how two
//! values of the field are compared.
//!
//! # Implementation
//! - Table-driven: extractor rules, normalizer aliases and comparators all read
//!   from [`FieldSchema`] instead of per-field code
//! - Replaceable from the `[schema]` config section

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::value_text;

/// Canonical field names of the built-in schema
pub mod fields {
    pub const VENDOR: &str = "vendor";
    pub const INVOICE_NUMBER: &str = "invoice_number";
    pub const INVOICE_DATE: &str = "invoice_date";
    pub const DUE_DATE: &str = "due_date";
    pub const SUBTOTAL: &str = "subtotal";
    pub const TAX_AMOUNT: &str = "tax_amount";
    pub const DISCOUNT_AMOUNT: &str = "discount_amount";
    pub const TOTAL_AMOUNT: &str = "total_amount";
    pub const CURRENCY: &str = "currency";
    pub const CUSTOMER_NAME: &str = "customer_name";
    pub const VENDOR_ADDRESS: &str = "vendor_address";
    pub const CUSTOMER_ADDRESS: &str = "customer_address";
    pub const LINE_ITEMS: &str = "line_items";
}

/// Declared value type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Amount,
    /// Sequence of records; exempt from scalar coercion
    List,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Text => write!(f, "text"),
            FieldKind::Amount => write!(f, "amount"),
            FieldKind::List => write!(f, "list"),
        }
    }
}

/// How two values of a field are judged equal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    /// Case-insensitive, whitespace-trimmed textual equality
    #[default]
    Text,
    /// Numeric equality within half a cent, falling back to text
    Amount,
}

impl Comparator {
    /// True if both values denote the same field content
    pub fn matches(&self, a: &Value, b: &Value) -> bool {
        match self {
            Comparator::Text => normalize_text(a) == normalize_text(b),
            Comparator::Amount => match (parse_amount(a), parse_amount(b)) {
                (Some(x), Some(y)) => (x - y).abs() < 0.005,
                _ => normalize_text(a) == normalize_text(b),
            },
        }
    }
}

/// Lowercased, trimmed text with inner whitespace collapsed
pub fn normalize_text(value: &Value) -> String {
    value_text(value)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse a monetary amount, ignoring currency symbols, thousands separators and whitespace
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !c.is_whitespace() && !matches!(c, ',' | '$' | '₹' | '€' | '£' | '¥'))
                .collect();
            cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Post-processing applied to a regex capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTransform {
    #[default]
    None,
    Uppercase,
    /// Drop `,` thousands separators
    StripThousands,
}

impl CaptureTransform {
    pub fn apply(&self, capture: &str) -> String {
        let trimmed = capture.trim();
        match self {
            CaptureTransform::None => trimmed.to_string(),
            CaptureTransform::Uppercase => trimmed.to_uppercase(),
            CaptureTransform::StripThousands => trimmed.replace(',', ""),
        }
    }
}

/// One ordered regex rule; matched case-insensitively against lowercased OCR text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Regex with one capture group holding the value
    pub regex: String,
    /// Confidence assigned on match (0.0-1.0)
    pub confidence: f64,
    #[serde(default)]
    pub transform: CaptureTransform,
}

impl PatternRule {
    pub fn new(regex: &str, confidence: f64, transform: CaptureTransform) -> Self {
        Self {
            regex: regex.to_string(),
            confidence,
            transform,
        }
    }
}

/// Heuristic scan over the first lines of OCR text
///
/// A line qualifies when it is long enough, contains none of the skip keywords
/// and (uppercased) contains one of the required markers. The whole trimmed
/// line is the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineScanRule {
    pub max_lines: usize,
    /// Minimum trimmed line length in characters
    pub min_len: usize,
    /// Lowercase keywords that disqualify a line
    pub skip_keywords: Vec<String>,
    /// Uppercase markers, at least one of which must appear
    pub require_any: Vec<String>,
    pub confidence: f64,
}

/// One schema entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub comparator: Comparator,
    /// Alternative model output keys, tried after `name`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_scan: Option<LineScanRule>,
    /// Ordered extraction rules; first non-empty capture wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<PatternRule>,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind) -> Self {
        let comparator = match kind {
            FieldKind::Amount => Comparator::Amount,
            _ => Comparator::Text,
        };
        Self {
            name: name.to_string(),
            kind,
            comparator,
            aliases: Vec::new(),
            line_scan: None,
            patterns: Vec::new(),
        }
    }

    fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    fn pattern(mut self, rule: PatternRule) -> Self {
        self.patterns.push(rule);
        self
    }

    fn line_scan(mut self, rule: LineScanRule) -> Self {
        self.line_scan = Some(rule);
        self
    }

    /// True if the pattern extractor has any rule for this field
    pub fn is_extractable(&self) -> bool {
        !self.patterns.is_empty() || self.line_scan.is_some()
    }

    /// Model output keys to try, canonical name first
    pub fn lookup_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(|a| a.as_str()))
    }
}

/// Ordered table of field specs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub fields: Vec<FieldSpec>,
}

impl FieldSchema {
    /// The standard invoice schema
    pub fn builtin() -> Self {
        use fields::*;

        let vendor_scan = LineScanRule {
            max_lines: 5,
            min_len: 4,
            skip_keywords: ["invoice", "date", "total", "amount", "bill"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            require_any: ["LTD", "INC", "CORP", "CO.", "LLC"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            confidence: 0.6,
        };

        let fields = vec![
            FieldSpec::new(VENDOR, FieldKind::Text)
                .aliases(&["vendor_name"])
                .line_scan(vendor_scan),
            FieldSpec::new(INVOICE_NUMBER, FieldKind::Text)
                .aliases(&["invoice_no"])
                .pattern(PatternRule::new(
                    r"invoice\s*#?\s*([A-Z0-9\-]+)",
                    0.8,
                    CaptureTransform::Uppercase,
                ))
                .pattern(PatternRule::new(
                    r"inv\s*#?\s*([A-Z0-9\-]+)",
                    0.8,
                    CaptureTransform::Uppercase,
                ))
                .pattern(PatternRule::new(
                    r"bill\s*#?\s*([A-Z0-9\-]+)",
                    0.8,
                    CaptureTransform::Uppercase,
                )),
            FieldSpec::new(INVOICE_DATE, FieldKind::Text)
                .aliases(&["date"])
                .pattern(PatternRule::new(
                    r"date[:\s]*(\d{1,2}[/-]\d{1,2}[/-]\d{4})",
                    0.7,
                    CaptureTransform::None,
                ))
                .pattern(PatternRule::new(
                    r"(\d{4}[/-]\d{1,2}[/-]\d{1,2})",
                    0.7,
                    CaptureTransform::None,
                ))
                .pattern(PatternRule::new(
                    r"date[:\s]*(\w{3}\s+\d{1,2},?\s+\d{4})",
                    0.7,
                    CaptureTransform::None,
                )),
            FieldSpec::new(DUE_DATE, FieldKind::Text),
            FieldSpec::new(SUBTOTAL, FieldKind::Amount),
            FieldSpec::new(TAX_AMOUNT, FieldKind::Amount).aliases(&["tax"]),
            FieldSpec::new(DISCOUNT_AMOUNT, FieldKind::Amount).aliases(&["discount"]),
            FieldSpec::new(TOTAL_AMOUNT, FieldKind::Amount)
                .aliases(&["total"])
                .pattern(PatternRule::new(
                    r"total[:\s]*[$₹€£¥]?\s*([\d,]+\.?\d*)",
                    0.75,
                    CaptureTransform::StripThousands,
                ))
                .pattern(PatternRule::new(
                    r"amount[:\s]*[$₹€£¥]?\s*([\d,]+\.?\d*)",
                    0.75,
                    CaptureTransform::StripThousands,
                ))
                .pattern(PatternRule::new(
                    r"grand\s+total[:\s]*[$₹€£¥]?\s*([\d,]+\.?\d*)",
                    0.75,
                    CaptureTransform::StripThousands,
                )),
            FieldSpec::new(CURRENCY, FieldKind::Text),
            FieldSpec::new(CUSTOMER_NAME, FieldKind::Text),
            FieldSpec::new(VENDOR_ADDRESS, FieldKind::Text),
            FieldSpec::new(CUSTOMER_ADDRESS, FieldKind::Text),
            FieldSpec::new(LINE_ITEMS, FieldKind::List).aliases(&["items"]),
        ];

        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Comparator for `name` (text for unknown fields)
    pub fn comparator(&self, name: &str) -> Comparator {
        self.get(name).map(|f| f.comparator).unwrap_or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::builtin()
    }
}
