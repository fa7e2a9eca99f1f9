//! # Invoice Common Library
//!
//! Shared code for the invoice reconciliation workspace:
//! - Common error type
//! - Configuration file resolution, loading and write-back
//! - Logging configuration section

pub mod config;
pub mod error;

pub use error::{Error, Result};
