//! # Sarissa Check
//!
//! An integrity checker for Sarissa's segmented inverted indexes.
//!
//! ## Features
//!
//! - Fail-fast exclusive locking of the checked index
//! - Footer checksum verification of every segment file
//! - Structural and statistical checks of norms, postings, stored fields and term vectors
//! - A serializable report tree with per-segment and whole-index verdicts
//! - Optional parallel segment checks
//! - An index writer for building test fixtures

pub mod analysis;
pub mod check;
pub mod document;
pub mod error;
pub mod index;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::check::{CheckIndex, CheckIndexConfig, SegmentInfoStatus, Status};
    pub use crate::document::{Document, Field, FieldType, FieldValue};
    pub use crate::error::{Result, SarissaError};
    pub use crate::index::{IndexWriter, IndexWriterConfig};
    pub use crate::storage::Storage;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
