//! Storage abstraction layer for index artifacts.
//!
//! The index store persists one artifact per scope through the [`Storage`]
//! trait, so the same code runs against the local filesystem or an
//! in-memory map. Names are relative keys that may contain `/` separators
//! (`"7/3.pxdx"`); backends create whatever hierarchy they need.
//!
//! # Storage Types
//!
//! ## FileStorage
//! - Disk-based persistent storage rooted at one directory
//! - Nested keys map to nested directories
//! - `rename_file` is an atomic replace
//!
//! ## MemoryStorage
//! - In-memory storage for testing and ephemeral deployments
//! - Outputs become visible only when closed
//!
//! # Example
//!
//! ```
//! use pixdex::storage::memory::MemoryStorage;
//! use pixdex::storage::Storage;
//! use std::io::{Read, Write};
//!
//! # fn main() -> pixdex::error::Result<()> {
//! let storage = MemoryStorage::new_default();
//!
//! let mut output = storage.create_output("1/2.pxdx")?;
//! output.write_all(b"payload")?;
//! output.close()?;
//!
//! let mut input = storage.open_input("1/2.pxdx")?;
//! let mut buffer = Vec::new();
//! input.read_to_end(&mut buffer)?;
//! assert_eq!(buffer, b"payload");
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Seek, Write};

use crate::error::{PixdexError, Result};

pub mod file;
pub mod memory;

/// A trait for storage backends that can store and retrieve data.
///
/// This provides a pluggable interface for different storage implementations
/// like file system, memory, or remote storage.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open a file for reading.
    ///
    /// Fails with [`StorageError::FileNotFound`] when the file is absent.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a file for writing, truncating any existing contents.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files in the storage, sorted, with `/`-separated names.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Rename a file.
    ///
    /// Atomically replaces `new_name` if it exists. This is the commit step of
    /// every index write: data goes to a temporary file first, then is renamed
    /// over the canonical key so readers never see a partial artifact.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Create a uniquely named temporary file next to `prefix`.
    fn create_temp_output(&self, prefix: &str) -> Result<(String, Box<dyn StorageOutput>)>;

    /// Sync all pending writes to storage.
    fn sync(&self) -> Result<()>;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Get the size of the input stream.
    fn size(&self) -> Result<u64>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Get the current position in the output stream.
    fn position(&self) -> Result<u64>;

    /// Close the output stream, making its contents durable and visible.
    fn close(&mut self) -> Result<()>;
}

/// Configuration for storage backends.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Buffer size for I/O operations.
    pub buffer_size: usize,

    /// Whether to fsync files when they are closed.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            buffer_size: 65536, // 64KB buffer for better I/O performance
            sync_writes: true,
        }
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// Permission denied.
    PermissionDenied(String),

    /// I/O error.
    IoError(String),

    /// Invalid operation.
    InvalidOperation(String),
}

impl StorageError {
    /// Classify an `io::Error` raised while touching `name`.
    pub fn from_io(name: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::FileNotFound(name.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                StorageError::PermissionDenied(name.to_string())
            }
            _ => StorageError::IoError(format!("{name}: {err}")),
        }
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::PermissionDenied(name) => write!(f, "Permission denied: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::InvalidOperation(msg) => write!(f, "Invalid operation: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for PixdexError {
    fn from(err: StorageError) -> Self {
        PixdexError::storage(err.to_string())
    }
}

/// Reject names that would escape the storage root.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('/')
        || name.split('/').any(|part| part.is_empty() || part == "..")
    {
        return Err(StorageError::InvalidOperation(format!("invalid file name '{name}'")).into());
    }
    Ok(())
}
