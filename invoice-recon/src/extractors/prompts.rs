//! Instruction prompts for the vision-language model backend

use serde::{Deserialize, Serialize};

/// Which instruction prompt to send with each image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    #[default]
    Standard,
    /// Same field list, plus handling of mixed-language (e.g. English/Hindi) documents
    MultiLanguage,
}

impl PromptKind {
    pub fn text(&self) -> &'static str {
        match self {
            PromptKind::Standard => STANDARD_PROMPT,
            PromptKind::MultiLanguage => MULTI_LANGUAGE_PROMPT,
        }
    }
}

const STANDARD_PROMPT: &str = r#"Extract structured data from the attached invoice image.

Fields (use exactly these keys):
- vendor: company or vendor name (string)
- invoice_number: invoice or bill number (string)
- invoice_date: invoice date as YYYY-MM-DD (string)
- total_amount: total amount (number)
- currency: currency code such as USD, EUR or INR (string)
- vendor_address, customer_name, customer_address (string, if present)
- due_date: payment due date as YYYY-MM-DD (string, if present)
- subtotal, tax_amount, discount_amount (number, if present)
- line_items: list of {"description", "quantity", "unit_price", "total"} (if present)

Wrap every field except line_items as {"value": ..., "confidence": 0.0-1.0}.

Example:
{
  "vendor": {"value": "ACME CORP", "confidence": 0.95},
  "invoice_number": {"value": "INV-001", "confidence": 0.98},
  "invoice_date": {"value": "2024-01-15", "confidence": 0.9},
  "total_amount": {"value": 123.45, "confidence": 0.95},
  "currency": {"value": "USD", "confidence": 0.95},
  "line_items": [{"description": "Item", "quantity": 1, "unit_price": 123.45, "total": 123.45}]
}

Rules:
- Reply with the JSON object only, no prose and no code fences
- Use null for values that are not on the document
- Amounts must be numbers, not strings
"#;

const MULTI_LANGUAGE_PROMPT: &str = r#"Extract structured data from the attached invoice image. The document may be written in English, Hindi or a mix of both; read either script.

Fields (use exactly these keys, in English):
- vendor: company or vendor name (string)
- invoice_number: invoice or bill number (string)
- invoice_date: invoice date as YYYY-MM-DD (string)
- total_amount: total amount (number)
- currency: currency code such as USD, EUR or INR (string)
- vendor_address, customer_name, customer_address (string, if present)
- due_date: payment due date as YYYY-MM-DD (string, if present)
- subtotal, tax_amount, discount_amount (number, if present)
- line_items: list of {"description", "quantity", "unit_price", "total"} (if present)

Wrap every field except line_items as {"value": ..., "confidence": 0.0-1.0}.
Keep names and addresses in their original script.

Rules:
- Reply with the JSON object only, no prose and no code fences
- Use null for values that are not on the document
- Amounts must be numbers, not strings
"#;
