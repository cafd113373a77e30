//! The segmented inverted index: file formats, the commit point, a segment
//! reader and the writer used to build indexes.
//!
//! Every file is written through [`StructWriter`](crate::storage::structured::StructWriter)
//! and ends with a checksummed footer.

pub mod codec;
pub mod commit;
pub mod field_infos;
pub mod live_docs;
pub mod norms;
pub mod postings;
pub mod reader;
pub mod segment;
pub mod stored_fields;
pub mod term_vectors;
pub mod writer;

pub use commit::{CommitPoint, SegmentDescriptor};
pub use reader::SegmentReader;
pub use writer::{IndexWriter, IndexWriterConfig};
