//! Fusion of the two extraction opinions
//!
//! Pattern result + normalized model result → per-field verdicts, document
//! metrics and a textual recommendation.

pub mod reconciliation_engine;

pub use reconciliation_engine::{
    DocumentMetrics, FieldVerdict, Recommendation, RecommendedMethod, Reconciliation,
    ReconcileConfig, ReconciliationEngine, TieBreak,
};
