//! Error types for shardex.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! is [`ShardexError`]. The variants follow the stages of an index build so
//! the orchestrator can tell a root cause apart from the cancellations it
//! triggers in sibling workers.
//!
//! # Examples
//!
//! ```
//! use shardex::error::{Result, ShardexError};
//!
//! fn check_batch_size(batch_docs: usize) -> Result<()> {
//!     if batch_docs == 0 {
//!         return Err(ShardexError::invalid_config("batch_docs must be at least 1"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_batch_size(0).is_err());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for shardex operations.
#[derive(Error, Debug)]
pub enum ShardexError {
    /// I/O errors not attributed to a specific pipeline stage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The source corpus is missing or unreadable.
    #[error("Input error: {0}")]
    Input(String),

    /// A map worker failed (error or panic) while building its batch table.
    #[error("Worker failure: {0}")]
    Worker(String),

    /// A run file could not be written.
    #[error("Spill error: {0}")]
    Spill(String),

    /// Run files could not be read back or were malformed during the merge.
    #[error("Merge error: {0}")]
    Merge(String),

    /// A shard file could not be written.
    #[error("Shard error: {0}")]
    Shard(String),

    /// The summary report could not be written. Never fatal to a build.
    #[error("Report error: {0}")]
    Report(String),

    /// An existing index failed verification.
    #[error("Index error: {0}")]
    Index(String),

    /// Configuration rejected during resolution.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker stopped early because a sibling failed.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with ShardexError.
pub type Result<T> = std::result::Result<T, ShardexError>;

impl ShardexError {
    /// Create a new input error.
    pub fn input<S: Into<String>>(msg: S) -> Self {
        ShardexError::Input(msg.into())
    }

    /// Create a new worker failure.
    pub fn worker<S: Into<String>>(msg: S) -> Self {
        ShardexError::Worker(msg.into())
    }

    /// Create a new spill error.
    pub fn spill<S: Into<String>>(msg: S) -> Self {
        ShardexError::Spill(msg.into())
    }

    /// Create a new merge error.
    pub fn merge<S: Into<String>>(msg: S) -> Self {
        ShardexError::Merge(msg.into())
    }

    /// Create a new shard error.
    pub fn shard<S: Into<String>>(msg: S) -> Self {
        ShardexError::Shard(msg.into())
    }

    /// Create a new report error.
    pub fn report<S: Into<String>>(msg: S) -> Self {
        ShardexError::Report(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        ShardexError::Index(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        ShardexError::InvalidConfig(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        ShardexError::Cancelled(msg.into())
    }

    /// Whether this error only reports a cooperative cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ShardexError::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = ShardexError::spill("disk full");
        assert_eq!(error.to_string(), "Spill error: disk full");

        let error = ShardexError::merge("truncated run");
        assert_eq!(error.to_string(), "Merge error: truncated run");

        let error = ShardexError::invalid_config("batch_docs must be at least 1");
        assert_eq!(
            error.to_string(),
            "Invalid configuration: batch_docs must be at least 1"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = ShardexError::from(io_error);

        match error {
            ShardexError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_cancellation_is_not_root_cause() {
        assert!(ShardexError::cancelled("sibling failed").is_cancellation());
        assert!(!ShardexError::worker("panicked").is_cancellation());
    }
}
