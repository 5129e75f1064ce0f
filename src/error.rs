//! Error types for pixdex.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`PixdexError`] enum. The variants follow the index-layer taxonomy:
//! missing or duplicate scopes, dimension and batch-length mismatches,
//! unresolvable owners, and failures of the embedding provider.
//!
//! # Examples
//!
//! ```
//! use pixdex::error::{PixdexError, Result};
//! use pixdex::scope::Scope;
//!
//! fn lookup() -> Result<()> {
//!     Err(PixdexError::NotFound(Scope::new(1, 2)))
//! }
//!
//! let err = lookup().unwrap_err();
//! assert!(err.is_not_found());
//! ```

use std::io;

use thiserror::Error;

use crate::scope::Scope;

/// The main error type for pixdex operations.
#[derive(Error, Debug)]
pub enum PixdexError {
    /// The scope has no index artifact when one was expected.
    #[error("No index for {0}")]
    NotFound(Scope),

    /// An index artifact already exists for the scope.
    #[error("Index already exists for {0}")]
    AlreadyExists(Scope),

    /// A vector's length does not match the deployment dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Batch vectors and external ids differ in count.
    #[error("Length mismatch: {vectors} vectors but {ids} external ids")]
    LengthMismatch { vectors: usize, ids: usize },

    /// A requested collection has no resolvable owner.
    #[error("No owner known for collection {0}")]
    InvalidOwnerMapping(u64),

    /// The embedding provider failed or is exhausted.
    #[error("Embedding provider unavailable: {0}")]
    Embedding(String),

    /// An operation exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Operation cancelled
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// An index artifact failed validation on decode.
    #[error("Corrupted index artifact: {0}")]
    Corrupted(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with PixdexError.
pub type Result<T> = std::result::Result<T, PixdexError>;

impl PixdexError {
    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        PixdexError::Storage(msg.into())
    }

    /// Create a new embedding provider error.
    pub fn embedding<S: Into<String>>(msg: S) -> Self {
        PixdexError::Embedding(msg.into())
    }

    /// Create a new corruption error.
    pub fn corrupted<S: Into<String>>(msg: S) -> Self {
        PixdexError::Corrupted(msg.into())
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        PixdexError::Timeout(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        PixdexError::Cancelled(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        PixdexError::InvalidConfig(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        PixdexError::Other(format!("Invalid argument: {}", msg.into()))
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PixdexError::Other(msg.into())
    }

    /// Whether this error means "the scope has no index".
    pub fn is_not_found(&self) -> bool {
        matches!(self, PixdexError::NotFound(_))
    }

    /// Whether repeating the same request later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PixdexError::Embedding(_)
                | PixdexError::Timeout(_)
                | PixdexError::Cancelled(_)
                | PixdexError::Storage(_)
                | PixdexError::Io(_)
        )
    }

    /// Whether a federated search should skip the scope instead of failing.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            PixdexError::NotFound(_) | PixdexError::InvalidOwnerMapping(_)
        )
    }
}
