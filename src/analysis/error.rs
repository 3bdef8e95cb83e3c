//! Analysis error types

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that abort a table scan
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A leaf error, tagged with the table and tenant being scanned
    #[error("table {table}, tenant {tenant}: {source}")]
    Scan {
        table: String,
        tenant: String,
        #[source]
        source: StorageError,
    },

    /// Tenants of a table could not be enumerated
    #[error("table {table}: listing tenants: {source}")]
    Tenants {
        table: String,
        #[source]
        source: StorageError,
    },

    /// A tenant list contained an empty tenant id
    #[error("table {table}: empty tenant id")]
    EmptyTenant { table: String },

    /// Analysis parameters cannot produce meaningful statistics
    #[error("Invalid analysis config: {0}")]
    InvalidConfig(String),
}

impl AnalysisError {
    /// The untouched storage error behind a scan failure
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            AnalysisError::Scan { source, .. } | AnalysisError::Tenants { source, .. } => {
                Some(source)
            }
            AnalysisError::EmptyTenant { .. } | AnalysisError::InvalidConfig(_) => None,
        }
    }
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;
