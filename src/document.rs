//! Documents and fields fed to the index writer.

#[allow(clippy::module_inception)]
pub mod document;
pub mod field;

pub use document::{Document, DocumentBuilder};
pub use field::{Field, FieldType, FieldValue, IndexOptions};
