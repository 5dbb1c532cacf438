//! # HMX Common Library
//!
//! Shared code for the HMX harmonic mixing crates including:
//! - Camelot wheel table and key parsing
//! - The `AnalysisResult` data model and its provider wire format
//! - Configuration loading (TOML, environment, compiled defaults)
//! - Error types
//! - Time helpers

pub mod camelot;
pub mod config;
pub mod error;
pub mod models;
pub mod time;

pub use camelot::{CamelotKey, KeyType};
pub use error::{Error, Result};
pub use models::{AnalysisPayload, AnalysisResult};
