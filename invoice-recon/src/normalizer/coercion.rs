//! Value coercion to declared field kinds
//!
//! Conversion never drops data: a value that cannot be converted is kept as-is
//! and the reason is reported so the caller can record a warning.

use serde_json::{Number, Value};

use crate::schema::{parse_amount, FieldKind};
use crate::types::json_type;

/// Outcome of coercing one value
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// Already the declared type
    Unchanged(Value),
    /// Converted to the declared type
    Converted(Value),
    /// Conversion failed; original value preserved
    Kept { value: Value, reason: String },
}

impl Coerced {
    pub fn into_value(self) -> Value {
        match self {
            Coerced::Unchanged(v) | Coerced::Converted(v) => v,
            Coerced::Kept { value, .. } => value,
        }
    }
}

/// Coerce `value` to `kind`
///
/// Null passes through untouched. List fields are not coerced here; see
/// [`line_item_issues`].
pub fn coerce(value: Value, kind: FieldKind) -> Coerced {
    if value.is_null() {
        return Coerced::Unchanged(value);
    }

    match kind {
        FieldKind::Text => to_text(value),
        FieldKind::Amount => to_amount(value),
        FieldKind::List => Coerced::Unchanged(value),
    }
}

fn to_text(value: Value) -> Coerced {
    match value {
        Value::String(_) => Coerced::Unchanged(value),
        Value::Number(n) => Coerced::Converted(Value::String(n.to_string())),
        Value::Bool(b) => Coerced::Converted(Value::String(b.to_string())),
        other => Coerced::Converted(Value::String(other.to_string())),
    }
}

fn to_amount(value: Value) -> Coerced {
    match value {
        Value::Number(_) => Coerced::Unchanged(value),
        Value::String(ref s) => {
            // Same cleaning rules the comparator uses
            match parse_amount(&value).and_then(Number::from_f64) {
                Some(n) => Coerced::Converted(Value::Number(n)),
                None => {
                    let reason = format!("'{}' is not a number", s);
                    Coerced::Kept { value, reason }
                }
            }
        }
        other => {
            let reason = format!("{} is not a number", json_type(&other));
            Coerced::Kept {
                value: other,
                reason,
            }
        }
    }
}

/// Required keys of one line item record
pub const LINE_ITEM_KEYS: [&str; 4] = ["description", "quantity", "unit_price", "total"];

/// Shape problems of a line item list; the list itself is never altered
pub fn line_item_issues(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Null => return Vec::new(),
        Value::Array(items) => items,
        other => return vec![format!("expected a list, got {}", json_type(other))],
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match item.as_object() {
            None => Some(format!("entry {} is a {}, not a record", i, json_type(item))),
            Some(record) => {
                let missing: Vec<&str> = LINE_ITEM_KEYS
                    .iter()
                    .copied()
                    .filter(|k| !record.contains_key(*k))
                    .collect();
                (!missing.is_empty())
                    .then(|| format!("entry {} is missing {}", i, missing.join(", ")))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_string_to_amount() {
        assert_eq!(
            coerce(json!(" 123.45 "), FieldKind::Amount),
            Coerced::Converted(json!(123.45))
        );
        assert_eq!(coerce(json!(99), FieldKind::Amount), Coerced::Unchanged(json!(99)));
    }

    #[test]
    fn test_formatted_amount_string_converted() {
        assert_eq!(
            coerce(json!("$1,234.56"), FieldKind::Amount),
            Coerced::Converted(json!(1234.56))
        );
        assert_eq!(
            coerce(json!("€ 2,000"), FieldKind::Amount),
            Coerced::Converted(json!(2000.0))
        );
    }

    #[test]
    fn test_unparseable_amount_kept() {
        match coerce(json!("about fifty"), FieldKind::Amount) {
            Coerced::Kept { value, reason } => {
                assert_eq!(value, json!("about fifty"));
                assert!(reason.contains("not a number"));
            }
            other => panic!("expected Kept, got {:?}", other),
        }
        assert!(matches!(
            coerce(json!(true), FieldKind::Amount),
            Coerced::Kept { .. }
        ));
        // Not finite
        assert!(matches!(
            coerce(json!("NaN"), FieldKind::Amount),
            Coerced::Kept { .. }
        ));
    }

    #[test]
    fn test_number_to_text() {
        assert_eq!(
            coerce(json!(42), FieldKind::Text),
            Coerced::Converted(json!("42"))
        );
        assert_eq!(
            coerce(json!("ACME"), FieldKind::Text),
            Coerced::Unchanged(json!("ACME"))
        );
    }

    #[test]
    fn test_null_untouched() {
        assert_eq!(coerce(Value::Null, FieldKind::Amount), Coerced::Unchanged(Value::Null));
    }

    #[test]
    fn test_line_item_issues() {
        let items = json!([
            {"description": "Widget", "quantity": 2, "unit_price": 5.0, "total": 10.0},
            {"description": "Gadget", "total": 3.0},
            "free text"
        ]);
        let issues = line_item_issues(&items);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("entry 1 is missing quantity, unit_price"));
        assert!(issues[1].contains("entry 2 is a string"));

        assert!(line_item_issues(&json!([])).is_empty());
        assert_eq!(line_item_issues(&json!("n/a")).len(), 1);
    }
}
