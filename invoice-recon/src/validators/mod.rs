//! Post-reconciliation checks
//!
//! Validators read the engine's verdicts and never mutate them.

pub mod anomaly_detector;

pub use anomaly_detector::{Anomaly, AnomalyConfig, AnomalyDetector};
