//! Term dictionary (`.tim`) and postings lists (`.pst`).
//!
//! ```text
//! .tim: header | num_fields | { field_number, term_count,
//!           { term: bytes, doc_freq, total_term_freq, postings_offset }* }*
//! .pst: header | per term at postings_offset:
//!           doc_count | { doc_delta, [freq], [pos_block_len, position deltas] }*
//! ```
//!
//! All integers are varints. Frequencies are only written for fields indexed
//! with freqs; positions are framed by their byte length so the number of
//! decoded positions can be compared with the frequency.

use std::collections::BTreeMap;

use crate::error::{Result, SarissaError};
use crate::index::codec::{
    FORMAT_VERSION, POSTINGS_EXTENSION, POSTINGS_MAGIC, TERMS_EXTENSION, TERMS_MAGIC,
    segment_file_name,
};
use crate::index::field_infos::FieldInfos;
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageInput};
use crate::util::varint::{decode_u64, encode_u64};

/// One document in a postings list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: u32,
    pub freq: u32,
    pub positions: Vec<u32>,
}

/// Term dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    pub term: Vec<u8>,
    pub doc_freq: u64,
    pub total_term_freq: u64,
    pub postings_offset: u64,
}

impl TermEntry {
    /// The term as text, lossily decoded for messages.
    pub fn term_text(&self) -> String {
        String::from_utf8_lossy(&self.term).into_owned()
    }
}

/// Inverted postings of a segment: field number -> term -> postings.
pub type InvertedFields = BTreeMap<u32, BTreeMap<Vec<u8>, Vec<Posting>>>;

/// Write `<segment>.tim` and `<segment>.pst`.
pub fn write_postings(
    storage: &dyn Storage,
    segment: &str,
    field_infos: &FieldInfos,
    fields: &InvertedFields,
) -> Result<Vec<String>> {
    let terms_file = segment_file_name(segment, TERMS_EXTENSION);
    let postings_file = segment_file_name(segment, POSTINGS_EXTENSION);

    let mut terms_writer = StructWriter::new(storage.create_output(&terms_file)?);
    let mut postings_writer = StructWriter::new(storage.create_output(&postings_file)?);
    terms_writer.write_header(TERMS_MAGIC, FORMAT_VERSION)?;
    postings_writer.write_header(POSTINGS_MAGIC, FORMAT_VERSION)?;

    terms_writer.write_varint(fields.len() as u64)?;
    for (&field_number, terms) in fields {
        let info = field_infos.by_number(field_number).ok_or_else(|| {
            SarissaError::index(format!("postings for unknown field number {field_number}"))
        })?;
        let has_freqs = info.has_freqs();
        let has_positions = info.has_positions();

        terms_writer.write_varint(field_number as u64)?;
        terms_writer.write_varint(terms.len() as u64)?;
        for (term, postings) in terms {
            let postings_offset = postings_writer.position();
            let mut total_term_freq = 0u64;
            let mut prev_doc = 0u32;

            postings_writer.write_varint(postings.len() as u64)?;
            for posting in postings {
                postings_writer.write_varint((posting.doc_id - prev_doc) as u64)?;
                prev_doc = posting.doc_id;

                let freq = if has_freqs { posting.freq } else { 1 };
                total_term_freq += freq as u64;
                if has_freqs {
                    postings_writer.write_varint(freq as u64)?;
                }
                if has_positions {
                    let mut block = Vec::new();
                    let mut prev_position = 0u32;
                    for &position in &posting.positions {
                        block.extend(encode_u64((position - prev_position) as u64));
                        prev_position = position;
                    }
                    postings_writer.write_bytes(&block)?;
                }
            }

            terms_writer.write_bytes(term)?;
            terms_writer.write_varint(postings.len() as u64)?;
            terms_writer.write_varint(total_term_freq)?;
            terms_writer.write_varint(postings_offset)?;
        }
    }

    postings_writer.close()?;
    terms_writer.close()?;
    Ok(vec![terms_file, postings_file])
}

/// Header of one field's block in the term dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTermsHeader {
    pub field_number: u32,
    pub term_count: usize,
}

/// Sequential decoder for `.tim`.
#[derive(Debug)]
pub struct TermDictionaryReader {
    reader: StructReader<Box<dyn StorageInput>>,
    file_name: String,
    field_count: usize,
    fields_read: usize,
}

impl TermDictionaryReader {
    /// Open `<segment>.tim` and read its header.
    pub fn open(storage: &dyn Storage, segment: &str) -> Result<Self> {
        let file_name = segment_file_name(segment, TERMS_EXTENSION);
        let mut reader = StructReader::new(storage.open_input(&file_name)?)?;
        reader.check_header(TERMS_MAGIC, FORMAT_VERSION)?;
        let field_count = reader.read_count(reader.remaining(), "term dictionary field count")?;

        Ok(TermDictionaryReader {
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

    /// Current read offset.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Read the next field header, or `None` after the last field.
    pub fn next_field(&mut self) -> Result<Option<FieldTermsHeader>> {
        if self.fields_read == self.field_count {
            self.reader.expect_eof("term dictionary")?;
            return Ok(None);
        }
        self.fields_read += 1;

        let field_number = self.reader.read_varint_u32("term dictionary field number")?;
        let term_count = self
            .reader
            .read_count(self.reader.remaining(), "term count")?;
        Ok(Some(FieldTermsHeader {
            field_number,
            term_count,
        }))
    }

    /// Read the next term of the current field.
    pub fn next_term(&mut self) -> Result<TermEntry> {
        Ok(TermEntry {
            term: self.reader.read_bytes()?,
            doc_freq: self.reader.read_varint()?,
            total_term_freq: self.reader.read_varint()?,
            postings_offset: self.reader.read_varint()?,
        })
    }
}

/// Random-access decoder for `.pst`.
#[derive(Debug)]
pub struct PostingsReader {
    reader: StructReader<Box<dyn StorageInput>>,
    file_name: String,
}

impl PostingsReader {
    /// Open `<segment>.pst` and validate its header.
    pub fn open(storage: &dyn Storage, segment: &str) -> Result<Self> {
        let file_name = segment_file_name(segment, POSTINGS_EXTENSION);
        let mut reader = StructReader::new(storage.open_input(&file_name)?)?;
        reader.check_header(POSTINGS_MAGIC, FORMAT_VERSION)?;
        Ok(PostingsReader { reader, file_name })
    }

    /// Name of the underlying file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Decode the postings list at `offset`.
    ///
    /// Only framing is validated here. Ordering, ranges and frequency
    /// agreement are left to the caller. Without freqs every posting has
    /// frequency 1.
    pub fn read_postings(
        &mut self,
        offset: u64,
        has_freqs: bool,
        has_positions: bool,
    ) -> Result<Vec<Posting>> {
        self.reader.seek(offset)?;
        let doc_count = self
            .reader
            .read_count(self.reader.remaining(), "postings doc count")?;

        let mut postings = Vec::with_capacity(doc_count);
        let mut doc_id = 0u64;
        for _ in 0..doc_count {
            let delta_offset = self.reader.position();
            doc_id = doc_id.saturating_add(self.reader.read_varint()?);
            let doc_id = u32::try_from(doc_id).map_err(|_| {
                SarissaError::corruption(format!(
                    "{}: doc id {doc_id} overflows at offset {delta_offset}",
                    self.file_name
                ))
            })?;

            let freq = if has_freqs {
                let freq_offset = self.reader.position();
                u32::try_from(self.reader.read_varint()?).map_err(|_| {
                    SarissaError::corruption(format!(
                        "{}: frequency overflows at offset {freq_offset}",
                        self.file_name
                    ))
                })?
            } else {
                1
            };

            let positions = if has_positions {
                let block_offset = self.reader.position();
                let block = self.reader.read_bytes()?;
                decode_positions(&block).map_err(|e| {
                    SarissaError::corruption(format!(
                        "{}: bad position block at offset {block_offset}: {e}",
                        self.file_name
                    ))
                })?
            } else {
                Vec::new()
            };

            postings.push(Posting {
                doc_id,
                freq,
                positions,
            });
        }
        Ok(postings)
    }
}

fn decode_positions(mut block: &[u8]) -> Result<Vec<u32>> {
    let mut positions = Vec::new();
    let mut position = 0u64;
    while !block.is_empty() {
        let (delta, consumed) = decode_u64(block)?;
        position = position.saturating_add(delta);
        positions.push(
            u32::try_from(position)
                .map_err(|_| SarissaError::corruption(format!("position {position} overflows")))?,
        );
        block = &block[consumed..];
    }
    Ok(positions)
}

/// Read every term and postings list of a segment.
pub fn read_inverted_fields(
    storage: &dyn Storage,
    segment: &str,
    field_infos: &FieldInfos,
) -> Result<InvertedFields> {
    let mut dictionary = TermDictionaryReader::open(storage, segment)?;
    let mut postings_reader = PostingsReader::open(storage, segment)?;
    let mut fields = InvertedFields::new();

    while let Some(header) = dictionary.next_field()? {
        let info = field_infos.by_number(header.field_number).ok_or_else(|| {
            SarissaError::corruption(format!(
                "{}: unknown field number {}",
                dictionary.file_name(),
                header.field_number
            ))
        })?;
        let terms = fields.entry(header.field_number).or_default();
        for _ in 0..header.term_count {
            let entry = dictionary.next_term()?;
            let postings = postings_reader.read_postings(
                entry.postings_offset,
                info.has_freqs(),
                info.has_positions(),
            )?;
            terms.insert(entry.term, postings);
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::field::FieldType;
    use crate::storage::memory::MemoryStorage;

    fn sample() -> (FieldInfos, InvertedFields) {
        let mut infos = FieldInfos::new();
        infos.add_or_update("body", &FieldType::TEXT_STORED);
        infos.add_or_update("id", &FieldType::STRING_STORED);

        let mut fields = InvertedFields::new();
        let body = fields.entry(0).or_default();
        body.insert(
            b"apple".to_vec(),
            vec![
                Posting {
                    doc_id: 0,
                    freq: 2,
                    positions: vec![0, 4],
                },
                Posting {
                    doc_id: 3,
                    freq: 1,
                    positions: vec![1],
                },
            ],
        );
        let id = fields.entry(1).or_default();
        id.insert(
            b"7".to_vec(),
            vec![Posting {
                doc_id: 2,
                freq: 1,
                positions: Vec::new(),
            }],
        );
        (infos, fields)
    }

    #[test]
    fn test_write_then_read() {
        let storage = MemoryStorage::new_default();
        let (infos, fields) = sample();
        let files = write_postings(&storage, "_0", &infos, &fields).unwrap();
        assert_eq!(files, vec!["_0.tim", "_0.pst"]);

        let read = read_inverted_fields(&storage, "_0", &infos).unwrap();
        assert_eq!(read, fields);
    }

    #[test]
    fn test_dictionary_statistics() {
        let storage = MemoryStorage::new_default();
        let (infos, fields) = sample();
        write_postings(&storage, "_0", &infos, &fields).unwrap();

        let mut dictionary = TermDictionaryReader::open(&storage, "_0").unwrap();
        let header = dictionary.next_field().unwrap().unwrap();
        assert_eq!(header.field_number, 0);
        assert_eq!(header.term_count, 1);

        let entry = dictionary.next_term().unwrap();
        assert_eq!(entry.term_text(), "apple");
        assert_eq!(entry.doc_freq, 2);
        assert_eq!(entry.total_term_freq, 3);
    }

    #[test]
    fn test_bad_position_block() {
        assert!(decode_positions(&[0x80]).is_err());
        assert_eq!(decode_positions(&[1, 2]).unwrap(), vec![1, 3]);
    }
}
