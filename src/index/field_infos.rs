//! Per-segment field metadata (`.fnm`).

use ahash::AHashMap;
use serde::Serialize;

use crate::document::field::{FieldType, IndexOptions};
use crate::error::{Result, SarissaError};
use crate::index::codec::{FIELD_INFOS_EXTENSION, FIELD_INFOS_MAGIC, FORMAT_VERSION, segment_file_name};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

const FLAG_INDEXED: u8 = 0x01;
const FLAG_STORED: u8 = 0x02;
const FLAG_TOKENIZED: u8 = 0x04;
const FLAG_OMIT_NORMS: u8 = 0x08;
const FLAG_TERM_VECTORS: u8 = 0x10;
const FLAG_VECTOR_POSITIONS: u8 = 0x20;
const FLAG_VECTOR_OFFSETS: u8 = 0x40;
const KNOWN_FLAGS: u8 = 0x7F;

/// Metadata for one field of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub indexed: bool,
    pub stored: bool,
    pub tokenized: bool,
    pub omit_norms: bool,
    pub index_options: IndexOptions,
    pub store_term_vectors: bool,
    pub store_term_vector_positions: bool,
    pub store_term_vector_offsets: bool,
}

impl FieldInfo {
    fn new(name: &str, number: u32, field_type: &FieldType) -> Self {
        FieldInfo {
            name: name.to_string(),
            number,
            indexed: field_type.indexed,
            stored: field_type.stored,
            tokenized: field_type.tokenized,
            omit_norms: field_type.omit_norms,
            index_options: field_type.index_options,
            store_term_vectors: field_type.store_term_vectors,
            store_term_vector_positions: field_type.store_term_vector_positions,
            store_term_vector_offsets: field_type.store_term_vector_offsets,
        }
    }

    /// Whether a length norm is written for this field.
    pub fn has_norms(&self) -> bool {
        self.indexed && !self.omit_norms
    }

    /// Whether postings carry positions.
    pub fn has_positions(&self) -> bool {
        self.indexed && self.index_options.has_positions()
    }

    /// Whether postings carry frequencies.
    pub fn has_freqs(&self) -> bool {
        self.indexed && self.index_options.has_freqs()
    }

    /// Widen this info so it also covers `other`.
    fn merge_from(&mut self, other: &FieldInfo) {
        self.indexed |= other.indexed;
        self.stored |= other.stored;
        self.tokenized |= other.tokenized;
        self.omit_norms &= other.omit_norms;
        self.index_options = self.index_options.max(other.index_options);
        self.store_term_vectors |= other.store_term_vectors;
        self.store_term_vector_positions |= other.store_term_vector_positions;
        self.store_term_vector_offsets |= other.store_term_vector_offsets;
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        for (set, bit) in [
            (self.indexed, FLAG_INDEXED),
            (self.stored, FLAG_STORED),
            (self.tokenized, FLAG_TOKENIZED),
            (self.omit_norms, FLAG_OMIT_NORMS),
            (self.store_term_vectors, FLAG_TERM_VECTORS),
            (self.store_term_vector_positions, FLAG_VECTOR_POSITIONS),
            (self.store_term_vector_offsets, FLAG_VECTOR_OFFSETS),
        ] {
            if set {
                flags |= bit;
            }
        }
        flags
    }
}

/// All fields of a segment, numbered densely from 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldInfos {
    fields: Vec<FieldInfo>,
    #[serde(skip)]
    by_name: AHashMap<String, u32>,
}

impl FieldInfos {
    /// Create an empty set.
    pub fn new() -> Self {
        FieldInfos::default()
    }

    /// Register a field occurrence and return its number.
    pub fn add_or_update(&mut self, name: &str, field_type: &FieldType) -> u32 {
        let number = self.fields.len() as u32;
        let candidate = FieldInfo::new(name, number, field_type);
        self.add_info(candidate)
    }

    /// Register a field copied from another segment and return its number here.
    pub fn add_info(&mut self, info: FieldInfo) -> u32 {
        if let Some(&number) = self.by_name.get(&info.name) {
            self.fields[number as usize].merge_from(&info);
            return number;
        }
        let number = self.fields.len() as u32;
        self.by_name.insert(info.name.clone(), number);
        self.fields.push(FieldInfo { number, ..info });
        number
    }

    /// Look up a field by number.
    pub fn by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.fields.get(number as usize)
    }

    /// Look up a field by name.
    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name
            .get(name)
            .and_then(|&number| self.by_number(number))
    }

    /// Iterate fields in number order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether any field carries norms.
    pub fn has_norms(&self) -> bool {
        self.fields.iter().any(FieldInfo::has_norms)
    }

    /// Whether any field stores term vectors.
    pub fn has_vectors(&self) -> bool {
        self.fields.iter().any(|f| f.store_term_vectors)
    }

    /// Write `<segment>.fnm`.
    pub fn write(&self, storage: &dyn Storage, segment: &str) -> Result<String> {
        let file_name = segment_file_name(segment, FIELD_INFOS_EXTENSION);
        let mut writer = StructWriter::new(storage.create_output(&file_name)?);

        writer.write_header(FIELD_INFOS_MAGIC, FORMAT_VERSION)?;
        writer.write_varint(self.fields.len() as u64)?;
        for field in &self.fields {
            writer.write_string(&field.name)?;
            writer.write_varint(field.number as u64)?;
            writer.write_u8(field.flags())?;
            writer.write_u8(field.index_options.to_byte())?;
        }
        writer.close()?;
        Ok(file_name)
    }

    /// Read `<segment>.fnm`.
    pub fn read(storage: &dyn Storage, segment: &str) -> Result<FieldInfos> {
        let file_name = segment_file_name(segment, FIELD_INFOS_EXTENSION);
        let mut reader = StructReader::new(storage.open_input(&file_name)?)?;
        reader.check_header(FIELD_INFOS_MAGIC, FORMAT_VERSION)?;

        let count = reader.read_count(reader.remaining(), "field count")?;
        let mut infos = FieldInfos::new();
        for expected_number in 0..count as u32 {
            let name = reader.read_string()?;
            let number = reader.read_varint()?;
            if number != expected_number as u64 {
                return Err(SarissaError::corruption(format!(
                    "{file_name}: field {name:?} has number {number}, expected {expected_number}"
                )));
            }
            let flags = reader.read_u8()?;
            if flags & !KNOWN_FLAGS != 0 {
                return Err(SarissaError::corruption(format!(
                    "{file_name}: field {name:?} has unknown flags {flags:#04x}"
                )));
            }
            let options = reader.read_u8()?;
            let index_options = IndexOptions::from_byte(options).ok_or_else(|| {
                SarissaError::corruption(format!(
                    "{file_name}: field {name:?} has invalid index options {options}"
                ))
            })?;
            if infos.by_name.contains_key(&name) {
                return Err(SarissaError::corruption(format!(
                    "{file_name}: duplicate field name {name:?}"
                )));
            }

            infos.by_name.insert(name.clone(), expected_number);
            infos.fields.push(FieldInfo {
                name,
                number: expected_number,
                indexed: flags & FLAG_INDEXED != 0,
                stored: flags & FLAG_STORED != 0,
                tokenized: flags & FLAG_TOKENIZED != 0,
                omit_norms: flags & FLAG_OMIT_NORMS != 0,
                index_options,
                store_term_vectors: flags & FLAG_TERM_VECTORS != 0,
                store_term_vector_positions: flags & FLAG_VECTOR_POSITIONS != 0,
                store_term_vector_offsets: flags & FLAG_VECTOR_OFFSETS != 0,
            });
        }
        reader.expect_eof("field infos")?;
        reader.close()?;
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_numbers_are_dense_and_stable() {
        let mut infos = FieldInfos::new();
        assert_eq!(infos.add_or_update("title", &FieldType::TEXT_STORED), 0);
        assert_eq!(infos.add_or_update("id", &FieldType::STRING_STORED), 1);
        assert_eq!(infos.add_or_update("title", &FieldType::TEXT_NOT_STORED), 0);
        assert_eq!(infos.len(), 2);
        assert!(infos.by_name("title").unwrap().stored);
    }

    #[test]
    fn test_merge_widens_flags() {
        let mut infos = FieldInfos::new();
        infos.add_or_update("body", &FieldType::STRING_STORED);
        infos.add_or_update("body", &FieldType::TEXT_NOT_STORED.with_term_vectors(true, false));

        let body = infos.by_name("body").unwrap();
        assert!(body.has_norms());
        assert!(body.has_positions());
        assert!(body.store_term_vectors);
        assert!(!body.store_term_vector_offsets);
    }

    #[test]
    fn test_write_and_read() {
        let storage = MemoryStorage::new_default();
        let mut infos = FieldInfos::new();
        infos.add_or_update("field", &FieldType::TEXT_STORED.with_term_vectors(true, true));
        infos.add_or_update("blob", &FieldType::STORED_ONLY);

        let file_name = infos.write(&storage, "_0").unwrap();
        assert_eq!(file_name, "_0.fnm");

        let read = FieldInfos::read(&storage, "_0").unwrap();
        assert_eq!(read, infos);
        assert!(read.has_vectors());
        assert!(read.has_norms());
    }
}
