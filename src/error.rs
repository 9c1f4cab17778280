//! Error taxonomy for the pipeline stages.
//!
//! Every variant of [`PipelineError`] is fatal for the current invocation.
//! Geocoding failures are the one recoverable condition and live in
//! [`crate::location::LookupFailure`] instead.

use thiserror::Error;

/// Errors that abort a transform, load or query run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input row has the wrong field count or an unparseable numeric field
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// Total usage is zero or not finite, so the usage percentages are undefined
    #[error("degenerate usage at line {line}: unusable total usage for city '{city}'")]
    DegenerateUsage { line: usize, city: String },

    /// Destination table could not be created
    #[error("schema error: {0}")]
    Schema(String),

    /// A batch insert failed; earlier batches stay committed
    #[error("batch {batch_index} failed to insert: {message}")]
    BatchInsert { batch_index: usize, message: String },

    /// Query request is invalid; nothing was executed
    #[error("query compilation error: {0}")]
    QueryCompilation(String),

    /// Query failed while running against the store
    #[error("query execution error: {0}")]
    QueryExecution(String),

    /// Object store read/write failures
    #[error("storage error: {0}")]
    Storage(String),

    /// Persisted location cache could not be read or written
    #[error("cache snapshot error: {0}")]
    CacheSnapshot(String),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }

    pub fn query_compilation(msg: impl Into<String>) -> Self {
        Self::QueryCompilation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
