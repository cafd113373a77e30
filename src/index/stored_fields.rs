//! Stored field values (`.fdx` index, `.fdt` data).
//!
//! `.fdx` holds the document count followed by one u64 offset per document
//! into `.fdt`. Each `.fdt` record is a field count followed by
//! `(field_number, type tag, value)` triples.

use crate::document::field::FieldValue;
use crate::error::{Result, SarissaError};
use crate::index::codec::{
    FORMAT_VERSION, HEADER_LEN, STORED_DATA_EXTENSION, STORED_DATA_MAGIC, STORED_INDEX_EXTENSION,
    STORED_INDEX_MAGIC, segment_file_name,
};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageInput};

const TYPE_TEXT: u8 = 0;
const TYPE_INTEGER: u8 = 1;
const TYPE_FLOAT: u8 = 2;
const TYPE_BINARY: u8 = 3;

/// A stored value of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredField {
    pub field_number: u32,
    pub value: FieldValue,
}

/// Write `<segment>.fdx` and `<segment>.fdt` for documents `0..docs.len()`.
pub fn write_stored_fields(
    storage: &dyn Storage,
    segment: &str,
    docs: &[Vec<StoredField>],
) -> Result<Vec<String>> {
    let index_file = segment_file_name(segment, STORED_INDEX_EXTENSION);
    let data_file = segment_file_name(segment, STORED_DATA_EXTENSION);

    let mut index_writer = StructWriter::new(storage.create_output(&index_file)?);
    let mut data_writer = StructWriter::new(storage.create_output(&data_file)?);
    index_writer.write_header(STORED_INDEX_MAGIC, FORMAT_VERSION)?;
    data_writer.write_header(STORED_DATA_MAGIC, FORMAT_VERSION)?;

    index_writer.write_varint(docs.len() as u64)?;
    for fields in docs {
        index_writer.write_u64(data_writer.position())?;
        data_writer.write_varint(fields.len() as u64)?;

        for field in fields {
            data_writer.write_varint(field.field_number as u64)?;
            match &field.value {
                FieldValue::Text(text) => {
                    data_writer.write_u8(TYPE_TEXT)?;
                    data_writer.write_string(text)?;
                }
                FieldValue::Integer(num) => {
                    data_writer.write_u8(TYPE_INTEGER)?;
                    data_writer.write_i64(*num)?;
                }
                FieldValue::Float(num) => {
                    data_writer.write_u8(TYPE_FLOAT)?;
                    data_writer.write_f64(*num)?;
                }
                FieldValue::Binary(bytes) => {
                    data_writer.write_u8(TYPE_BINARY)?;
                    data_writer.write_bytes(bytes)?;
                }
            }
        }
    }

    data_writer.close()?;
    index_writer.close()?;
    Ok(vec![index_file, data_file])
}

/// Random-access decoder for stored fields.
#[derive(Debug)]
pub struct StoredFieldsReader {
    offsets: Vec<u64>,
    data: StructReader<Box<dyn StorageInput>>,
    data_file: String,
}

impl StoredFieldsReader {
    /// Open both stored field files and load the offset index.
    pub fn open(storage: &dyn Storage, segment: &str) -> Result<Self> {
        let index_file = segment_file_name(segment, STORED_INDEX_EXTENSION);
        let mut index = StructReader::new(storage.open_input(&index_file)?)?;
        index.check_header(STORED_INDEX_MAGIC, FORMAT_VERSION)?;
        let doc_count = index.read_count(index.remaining() / 8, "stored doc count")?;
        let mut offsets = Vec::with_capacity(doc_count);
        for _ in 0..doc_count {
            offsets.push(index.read_u64()?);
        }
        index.expect_eof("stored fields index")?;
        index.close()?;

        let data_file = segment_file_name(segment, STORED_DATA_EXTENSION);
        let mut data = StructReader::new(storage.open_input(&data_file)?)?;
        data.check_header(STORED_DATA_MAGIC, FORMAT_VERSION)?;

        Ok(StoredFieldsReader {
            offsets,
            data,
            data_file,
        })
    }

    /// Number of documents in the index file.
    pub fn doc_count(&self) -> usize {
        self.offsets.len()
    }

    /// Decode the record of `doc_id`.
    ///
    /// The record must end exactly where the next one starts.
    pub fn document(&mut self, doc_id: u32) -> Result<Vec<StoredField>> {
        let (start, end) = self.record_bounds(doc_id)?;
        self.data.seek(start)?;

        let field_count = self.data.read_count(end - start, "stored field count")?;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let field_number = self.data.read_varint_u32("stored field number")?;
            let tag_offset = self.data.position();
            let value = match self.data.read_u8()? {
                TYPE_TEXT => FieldValue::Text(self.data.read_string()?),
                TYPE_INTEGER => FieldValue::Integer(self.data.read_i64()?),
                TYPE_FLOAT => FieldValue::Float(self.data.read_f64()?),
                TYPE_BINARY => FieldValue::Binary(self.data.read_bytes()?),
                tag => {
                    return Err(SarissaError::corruption(format!(
                        "{}: unknown value type {tag} at offset {tag_offset}",
                        self.data_file
                    )));
                }
            };
            fields.push(StoredField {
                field_number,
                value,
            });
        }

        if self.data.position() != end {
            return Err(SarissaError::corruption(format!(
                "{}: record of doc {doc_id} spans {start}..{} but the next record starts at {end}",
                self.data_file,
                self.data.position()
            )));
        }
        Ok(fields)
    }

    fn record_bounds(&self, doc_id: u32) -> Result<(u64, u64)> {
        let index = doc_id as usize;
        let start = *self.offsets.get(index).ok_or_else(|| {
            SarissaError::corruption(format!(
                "{}: doc {doc_id} beyond stored doc count {}",
                self.data_file,
                self.offsets.len()
            ))
        })?;
        let end = self
            .offsets
            .get(index + 1)
            .copied()
            .unwrap_or_else(|| self.data.payload_end());

        if start < HEADER_LEN || start > end || end > self.data.payload_end() {
            return Err(SarissaError::corruption(format!(
                "{}: doc {doc_id} has invalid record bounds {start}..{end}",
                self.data_file
            )));
        }
        Ok((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn sample_docs() -> Vec<Vec<StoredField>> {
        vec![
            vec![
                StoredField {
                    field_number: 0,
                    value: FieldValue::Text("aaa0".to_string()),
                },
                StoredField {
                    field_number: 1,
                    value: FieldValue::Integer(-3),
                },
            ],
            Vec::new(),
            vec![StoredField {
                field_number: 2,
                value: FieldValue::Binary(vec![1, 2, 3]),
            }],
        ]
    }

    #[test]
    fn test_write_and_read() {
        let storage = MemoryStorage::new_default();
        let docs = sample_docs();
        write_stored_fields(&storage, "_0", &docs).unwrap();

        let mut reader = StoredFieldsReader::open(&storage, "_0").unwrap();
        assert_eq!(reader.doc_count(), 3);
        // random access order
        assert_eq!(reader.document(2).unwrap(), docs[2]);
        assert_eq!(reader.document(0).unwrap(), docs[0]);
        assert!(reader.document(1).unwrap().is_empty());
        assert!(reader.document(3).is_err());
    }

    #[test]
    fn test_unknown_type_tag() {
        let storage = MemoryStorage::new_default();
        write_stored_fields(&storage, "_0", &sample_docs()).unwrap();

        let mut bytes = crate::storage::read_all(&storage, "_0.fdt").unwrap();
        // header(8) + field count(1) + field number(1) -> type tag
        bytes[10] = 9;
        crate::storage::write_all(&storage, "_0.fdt", &bytes).unwrap();

        let mut reader = StoredFieldsReader::open(&storage, "_0").unwrap();
        assert!(matches!(
            reader.document(0),
            Err(SarissaError::Corruption(_))
        ));
        assert!(reader.document(2).is_ok());
    }
}
