use std::path::PathBuf;
use thiserror::Error;

use crate::warehouse::verify::IntegrityReport;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("schema error in {table}: {detail}")]
    Schema { table: String, detail: String },

    #[error("data quality check failed for {dataset}: {detail}")]
    DataQuality { dataset: String, detail: String },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("integrity verification failed with {} violation(s)", .0.violations.len())]
    Integrity(IntegrityReport),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
