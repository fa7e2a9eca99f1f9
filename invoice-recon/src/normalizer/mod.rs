//! Model output normalization
//!
//! Turns the model backend's loosely-shaped JSON into a canonical
//! `ExtractionResult` that the reconciliation engine can compare field by field.

pub mod coercion;
pub mod schema_normalizer;

pub use coercion::{coerce, line_item_issues, Coerced};
pub use schema_normalizer::{NormalizedSchema, NormalizerConfig, SchemaNormalizer};
