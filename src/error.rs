//! Error types for the Sarissa index checker.
//!
//! All fallible operations return [`SarissaError`]. Only two variants abort a
//! check run: [`SarissaError::LockObtainFailed`] when the index is already
//! locked, and [`SarissaError::CatalogCorruption`] when the commit point cannot
//! be read. Every other fault found while verifying a segment is folded into
//! the report instead of being propagated.
//!
//! # Examples
//!
//! ```
//! use sarissa_check::error::{Result, SarissaError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(SarissaError::corruption("truncated block"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Sarissa operations.
#[derive(Error, Debug)]
pub enum SarissaError {
    /// I/O errors (file operations, short reads, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-related errors
    #[error("Index error: {0}")]
    Index(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Analysis-related errors (tokenization, filtering, etc.)
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Field-related errors
    #[error("Field error: {0}")]
    Field(String),

    /// The exclusive index lock is held by someone else.
    #[error("Lock obtain failed: {0}")]
    LockObtainFailed(String),

    /// The commit point itself could not be read.
    #[error("Catalog corruption: {0}")]
    CatalogCorruption(String),

    /// A file's trailing checksum does not match its content.
    #[error("Checksum mismatch in {file}: expected {expected:#010x}, actual {actual:#010x}")]
    ChecksumMismatch {
        /// Name of the file whose footer failed.
        file: String,
        /// Checksum stored in the footer.
        expected: u32,
        /// Checksum recomputed from the content.
        actual: u32,
    },

    /// Truncated or malformed data that cannot be decoded.
    #[error("Corrupt index: {0}")]
    Corruption(String),

    /// Decoded data that contradicts itself (counts, ordering, ranges).
    #[error("Inconsistent index: {0}")]
    Inconsistency(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with SarissaError.
pub type Result<T> = std::result::Result<T, SarissaError>;

impl SarissaError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        SarissaError::Index(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        SarissaError::Storage(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        SarissaError::Analysis(msg.into())
    }

    /// Create a new field error.
    pub fn field<S: Into<String>>(msg: S) -> Self {
        SarissaError::Field(msg.into())
    }

    /// Create a new lock failure.
    pub fn lock_obtain_failed<S: Into<String>>(msg: S) -> Self {
        SarissaError::LockObtainFailed(msg.into())
    }

    /// Create a new catalog corruption error.
    pub fn catalog_corruption<S: Into<String>>(msg: S) -> Self {
        SarissaError::CatalogCorruption(msg.into())
    }

    /// Create a new corruption error.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        SarissaError::Corruption(msg.into())
    }

    /// Create a new inconsistency error.
    pub fn inconsistency<S: Into<String>>(msg: S) -> Self {
        SarissaError::Inconsistency(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        SarissaError::InvalidOperation(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SarissaError::Other(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        SarissaError::Other(format!("Not found: {}", msg.into()))
    }

    /// Whether this error aborts a whole check run rather than a single segment.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SarissaError::LockObtainFailed(_) | SarissaError::CatalogCorruption(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = SarissaError::index("Test index error");
        assert_eq!(error.to_string(), "Index error: Test index error");

        let error = SarissaError::corruption("bad varint");
        assert_eq!(error.to_string(), "Corrupt index: bad varint");

        let error = SarissaError::lock_obtain_failed("write.lock");
        assert_eq!(error.to_string(), "Lock obtain failed: write.lock");
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let error = SarissaError::ChecksumMismatch {
            file: "_0.pst".to_string(),
            expected: 0xdeadbeef,
            actual: 0x1,
        };
        assert_eq!(
            error.to_string(),
            "Checksum mismatch in _0.pst: expected 0xdeadbeef, actual 0x00000001"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SarissaError::lock_obtain_failed("x").is_fatal());
        assert!(SarissaError::catalog_corruption("x").is_fatal());
        assert!(!SarissaError::corruption("x").is_fatal());
        assert!(!SarissaError::inconsistency("x").is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let sarissa_error = SarissaError::from(io_error);

        match sarissa_error {
            SarissaError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
