//! Deleted-document bitmaps (`<segment>_<delgen>.liv`).

use bit_vec::BitVec;

use crate::error::{Result, SarissaError};
use crate::index::codec::{FORMAT_VERSION, LIVE_DOCS_MAGIC, live_docs_file_name};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

/// A bitmap-based deletion tracker for a segment (bit set = deleted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDocs {
    deleted_docs: BitVec,
    deleted_count: u32,
}

impl LiveDocs {
    /// All `max_doc` documents live.
    pub fn all_live(max_doc: u32) -> Self {
        LiveDocs {
            deleted_docs: BitVec::from_elem(max_doc as usize, false),
            deleted_count: 0,
        }
    }

    /// Mark a document as deleted. Returns whether it was live before.
    pub fn delete_document(&mut self, doc_id: u32) -> Result<bool> {
        if doc_id >= self.max_doc() {
            return Err(SarissaError::index(format!(
                "Document ID {doc_id} out of range (max_doc {})",
                self.max_doc()
            )));
        }

        let was_already_deleted = self.deleted_docs.get(doc_id as usize).unwrap_or(false);
        if !was_already_deleted {
            self.deleted_docs.set(doc_id as usize, true);
            self.deleted_count += 1;
        }
        Ok(!was_already_deleted)
    }

    /// Check if a document is live. Out-of-range ids are never live.
    pub fn is_live(&self, doc_id: u32) -> bool {
        matches!(self.deleted_docs.get(doc_id as usize), Some(false))
    }

    /// Number of documents covered.
    pub fn max_doc(&self) -> u32 {
        self.deleted_docs.len() as u32
    }

    /// Number of deleted documents.
    pub fn deleted_count(&self) -> u32 {
        self.deleted_count
    }

    /// Get number of live (non-deleted) documents.
    pub fn live_count(&self) -> u32 {
        self.max_doc() - self.deleted_count
    }

    /// Write the bitmap for deletion generation `del_gen`.
    pub fn write(&self, storage: &dyn Storage, segment: &str, del_gen: u64) -> Result<String> {
        let file_name = live_docs_file_name(segment, del_gen);
        let mut writer = StructWriter::new(storage.create_output(&file_name)?);

        writer.write_header(LIVE_DOCS_MAGIC, FORMAT_VERSION)?;
        writer.write_u32(self.max_doc())?;
        writer.write_u32(self.deleted_count)?;
        writer.write_bytes(&self.deleted_docs.to_bytes())?;
        writer.close()?;
        Ok(file_name)
    }

    /// Read the bitmap for deletion generation `del_gen`, checking it covers
    /// exactly `max_doc` documents.
    pub fn read(storage: &dyn Storage, segment: &str, del_gen: u64, max_doc: u32) -> Result<Self> {
        let file_name = live_docs_file_name(segment, del_gen);
        let mut reader = StructReader::new(storage.open_input(&file_name)?)?;
        reader.check_header(LIVE_DOCS_MAGIC, FORMAT_VERSION)?;

        let stored_max_doc = reader.read_u32()?;
        if stored_max_doc != max_doc {
            return Err(SarissaError::corruption(format!(
                "{file_name}: covers {stored_max_doc} docs but segment has maxDoc {max_doc}"
            )));
        }
        let stored_deleted = reader.read_u32()?;
        let bytes = reader.read_bytes()?;
        if bytes.len() != (max_doc as usize).div_ceil(8) {
            return Err(SarissaError::corruption(format!(
                "{file_name}: bitmap is {} bytes, expected {}",
                bytes.len(),
                (max_doc as usize).div_ceil(8)
            )));
        }
        reader.expect_eof("live docs")?;
        reader.close()?;

        let mut deleted_docs = BitVec::from_bytes(&bytes);
        if deleted_docs.iter().skip(max_doc as usize).any(|bit| bit) {
            return Err(SarissaError::corruption(format!(
                "{file_name}: deletion bits set beyond maxDoc {max_doc}"
            )));
        }
        deleted_docs.truncate(max_doc as usize);

        let deleted_count = deleted_docs.iter().filter(|&bit| bit).count() as u32;
        if deleted_count != stored_deleted {
            return Err(SarissaError::corruption(format!(
                "{file_name}: header says {stored_deleted} deleted docs but bitmap has {deleted_count}"
            )));
        }

        Ok(LiveDocs {
            deleted_docs,
            deleted_count,
        })
    }
}
