//! Per-document length norms (`.nrm`).
//!
//! ```text
//! header | num_fields: varint | { field_number: varint, doc_count: varint, doc_count x u32 }*
//! ```

use crate::error::Result;
use crate::index::codec::{FORMAT_VERSION, NORMS_EXTENSION, NORMS_MAGIC, segment_file_name};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageInput};

/// Norm values of one field, one per document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormsEntry {
    pub field_number: u32,
    pub values: Vec<u32>,
}

/// Write `<segment>.nrm`.
pub fn write_norms(storage: &dyn Storage, segment: &str, entries: &[NormsEntry]) -> Result<String> {
    let file_name = segment_file_name(segment, NORMS_EXTENSION);
    let mut writer = StructWriter::new(storage.create_output(&file_name)?);

    writer.write_header(NORMS_MAGIC, FORMAT_VERSION)?;
    writer.write_varint(entries.len() as u64)?;
    for entry in entries {
        writer.write_varint(entry.field_number as u64)?;
        writer.write_varint(entry.values.len() as u64)?;
        for &value in &entry.values {
            writer.write_u32(value)?;
        }
    }
    writer.close()?;
    Ok(file_name)
}

/// Sequential decoder for `.nrm`.
#[derive(Debug)]
pub struct NormsReader {
    reader: StructReader<Box<dyn StorageInput>>,
    file_name: String,
    field_count: usize,
    fields_read: usize,
}

impl NormsReader {
    /// Open `<segment>.nrm` and read its header.
    pub fn open(storage: &dyn Storage, segment: &str) -> Result<Self> {
        let file_name = segment_file_name(segment, NORMS_EXTENSION);
        let mut reader = StructReader::new(storage.open_input(&file_name)?)?;
        reader.check_header(NORMS_MAGIC, FORMAT_VERSION)?;
        let field_count = reader.read_count(reader.remaining(), "norms field count")?;

        Ok(NormsReader {
            reader,
            file_name,
            field_count,
            fields_read: 0,
        })
    }

    /// Name of the underlying file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Number of fields announced in the header.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Current read offset.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Decode the next field, or `None` once all announced fields were read.
    pub fn next_entry(&mut self) -> Result<Option<NormsEntry>> {
        if self.fields_read == self.field_count {
            self.reader.expect_eof("norms")?;
            return Ok(None);
        }
        self.fields_read += 1;

        let field_number = self.reader.read_varint_u32("norms field number")?;
        let limit = self.reader.remaining() / 4;
        let doc_count = self.reader.read_count(limit, "norms doc count")?;
        let mut values = Vec::with_capacity(doc_count);
        for _ in 0..doc_count {
            values.push(self.reader.read_u32()?);
        }
        Ok(Some(NormsEntry {
            field_number,
            values,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_write_and_read() {
        let storage = MemoryStorage::new_default();
        let entries = vec![
            NormsEntry {
                field_number: 0,
                values: vec![1, 2, 3],
            },
            NormsEntry {
                field_number: 2,
                values: vec![0, 0, 7],
            },
        ];
        write_norms(&storage, "_0", &entries).unwrap();

        let mut reader = NormsReader::open(&storage, "_0").unwrap();
        assert_eq!(reader.field_count(), 2);
        assert_eq!(reader.next_entry().unwrap(), Some(entries[0].clone()));
        assert_eq!(reader.next_entry().unwrap(), Some(entries[1].clone()));
        assert_eq!(reader.next_entry().unwrap(), None);
    }

    #[test]
    fn test_oversized_doc_count_is_corruption() {
        let storage = MemoryStorage::new_default();
        let mut writer = StructWriter::new(storage.create_output("_0.nrm").unwrap());
        writer.write_header(NORMS_MAGIC, FORMAT_VERSION).unwrap();
        writer.write_varint(1).unwrap();
        writer.write_varint(0).unwrap();
        writer.write_varint(1000).unwrap();
        writer.write_u32(1).unwrap();
        writer.close().unwrap();

        let mut reader = NormsReader::open(&storage, "_0").unwrap();
        assert!(reader.next_entry().is_err());
    }
}
