//! Per-document term vectors (`.tvx` index, `.tvd` data).
//!
//! Each document owns one length-framed block in `.tvd`:
//!
//! ```text
//! block_len: u32 | num_fields
//!   { field_number, flags: u8, num_terms,
//!     { term: bytes, freq,
//!       [freq x zigzag position delta],
//!       [freq x (zigzag start delta, zigzag length)] }* }*
//! ```
//!
//! Positions and offsets are zig-zag deltas, so values that go backwards can
//! be written and read back verbatim. Whether such values are acceptable is
//! left to the caller.

use crate::error::{Result, SarissaError};
use crate::index::codec::{
    FORMAT_VERSION, HEADER_LEN, VECTORS_DATA_EXTENSION, VECTORS_DATA_MAGIC,
    VECTORS_INDEX_EXTENSION, VECTORS_INDEX_MAGIC, segment_file_name,
};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageInput};
use crate::util::varint::{decode_u64, encode_u64, zigzag_decode, zigzag_encode};

/// Flag bit: the field vector carries positions.
pub const VECTOR_FLAG_POSITIONS: u8 = 0x01;
/// Flag bit: the field vector carries offsets.
pub const VECTOR_FLAG_OFFSETS: u8 = 0x02;

/// One term of a field vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorTerm {
    pub term: Vec<u8>,
    pub freq: u32,
    pub positions: Vec<i64>,
    /// `(start, end)` pairs.
    pub offsets: Vec<(i64, i64)>,
}

/// The term vector of one field in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldVector {
    pub field_number: u32,
    pub has_positions: bool,
    pub has_offsets: bool,
    pub terms: Vec<VectorTerm>,
}

/// Encode one document's vectors as a block body (without the length prefix).
pub fn encode_block(fields: &[FieldVector]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(encode_u64(fields.len() as u64));
    for field in fields {
        out.extend(encode_u64(field.field_number as u64));
        let mut flags = 0u8;
        if field.has_positions {
            flags |= VECTOR_FLAG_POSITIONS;
        }
        if field.has_offsets {
            flags |= VECTOR_FLAG_OFFSETS;
        }
        out.push(flags);
        out.extend(encode_u64(field.terms.len() as u64));

        for term in &field.terms {
            out.extend(encode_u64(term.term.len() as u64));
            out.extend_from_slice(&term.term);
            out.extend(encode_u64(term.freq as u64));
            if field.has_positions {
                let mut prev = 0i64;
                for &position in &term.positions {
                    out.extend(encode_u64(zigzag_encode(position - prev)));
                    prev = position;
                }
            }
            if field.has_offsets {
                let mut prev_start = 0i64;
                for &(start, end) in &term.offsets {
                    out.extend(encode_u64(zigzag_encode(start - prev_start)));
                    out.extend(encode_u64(zigzag_encode(end - start)));
                    prev_start = start;
                }
            }
        }
    }
    out
}

/// Write `<segment>.tvx` and `<segment>.tvd` for documents `0..docs.len()`.
pub fn write_term_vectors(
    storage: &dyn Storage,
    segment: &str,
    docs: &[Vec<FieldVector>],
) -> Result<Vec<String>> {
    let index_file = segment_file_name(segment, VECTORS_INDEX_EXTENSION);
    let data_file = segment_file_name(segment, VECTORS_DATA_EXTENSION);

    let mut index_writer = StructWriter::new(storage.create_output(&index_file)?);
    let mut data_writer = StructWriter::new(storage.create_output(&data_file)?);
    index_writer.write_header(VECTORS_INDEX_MAGIC, FORMAT_VERSION)?;
    data_writer.write_header(VECTORS_DATA_MAGIC, FORMAT_VERSION)?;

    index_writer.write_varint(docs.len() as u64)?;
    for fields in docs {
        index_writer.write_u64(data_writer.position())?;
        let block = encode_block(fields);
        data_writer.write_u32(block.len() as u32)?;
        data_writer.write_raw(&block)?;
    }

    data_writer.close()?;
    index_writer.close()?;
    Ok(vec![index_file, data_file])
}

/// Random-access decoder for term vectors.
#[derive(Debug)]
pub struct TermVectorsReader {
    offsets: Vec<u64>,
    data: StructReader<Box<dyn StorageInput>>,
    data_file: String,
}

impl TermVectorsReader {
    /// Open both term vector files and load the offset index.
    pub fn open(storage: &dyn Storage, segment: &str) -> Result<Self> {
        let index_file = segment_file_name(segment, VECTORS_INDEX_EXTENSION);
        let mut index = StructReader::new(storage.open_input(&index_file)?)?;
        index.check_header(VECTORS_INDEX_MAGIC, FORMAT_VERSION)?;
        let doc_count = index.read_count(index.remaining() / 8, "vector doc count")?;
        let mut offsets = Vec::with_capacity(doc_count);
        for _ in 0..doc_count {
            offsets.push(index.read_u64()?);
        }
        index.expect_eof("term vectors index")?;
        index.close()?;

        let data_file = segment_file_name(segment, VECTORS_DATA_EXTENSION);
        let mut data = StructReader::new(storage.open_input(&data_file)?)?;
        data.check_header(VECTORS_DATA_MAGIC, FORMAT_VERSION)?;

        Ok(TermVectorsReader {
            offsets,
            data,
            data_file,
        })
    }

    /// Number of documents in the index file.
    pub fn doc_count(&self) -> usize {
        self.offsets.len()
    }

    /// Read the framed block of `doc_id`, checking the length prefix against
    /// the start of the next block.
    pub fn raw_block(&mut self, doc_id: u32) -> Result<Vec<u8>> {
        let index = doc_id as usize;
        let start = *self.offsets.get(index).ok_or_else(|| {
            SarissaError::corruption(format!(
                "{}: doc {doc_id} beyond vector doc count {}",
                self.data_file,
                self.offsets.len()
            ))
        })?;
        let end = self
            .offsets
            .get(index + 1)
            .copied()
            .unwrap_or_else(|| self.data.payload_end());
        if start < HEADER_LEN || end < start.saturating_add(4) || end > self.data.payload_end() {
            return Err(SarissaError::corruption(format!(
                "{}: doc {doc_id} has invalid block bounds {start}..{end}",
                self.data_file
            )));
        }

        self.data.seek(start)?;
        let block_len = self.data.read_u32()? as u64;
        if start + 4 + block_len != end {
            return Err(SarissaError::corruption(format!(
                "{}: block of doc {doc_id} at offset {start} declares {block_len} bytes but spans {}",
                self.data_file,
                end - start - 4
            )));
        }
        self.data.read_raw(block_len as usize)
    }

    /// Read and decode the vectors of `doc_id`.
    pub fn document(&mut self, doc_id: u32) -> Result<Vec<FieldVector>> {
        let block = self.raw_block(doc_id)?;
        decode_block(&block).map_err(|e| {
            SarissaError::corruption(format!("{}: doc {doc_id}: {e}", self.data_file))
        })
    }
}

/// Decode a block body. Fails only on broken framing: truncation, bad
/// varints, unknown flags or trailing bytes.
pub fn decode_block(block: &[u8]) -> Result<Vec<FieldVector>> {
    let mut cursor = BlockCursor { block, position: 0 };

    let field_count = cursor.read_count("field count")?;
    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        let field_number = cursor.read_u32("field number")?;
        let flags_offset = cursor.position;
        let flags = cursor.read_u8()?;
        if flags & !(VECTOR_FLAG_POSITIONS | VECTOR_FLAG_OFFSETS) != 0 {
            return Err(SarissaError::corruption(format!(
                "unknown vector flags {flags:#04x} at block offset {flags_offset}"
            )));
        }
        let has_positions = flags & VECTOR_FLAG_POSITIONS != 0;
        let has_offsets = flags & VECTOR_FLAG_OFFSETS != 0;

        let term_count = cursor.read_count("term count")?;
        let mut terms = Vec::with_capacity(term_count);
        for _ in 0..term_count {
            let term_len = cursor.read_count("term length")?;
            let term = cursor.read_raw(term_len)?.to_vec();
            let freq = cursor.read_u32("frequency")?;

            let mut positions = Vec::new();
            if has_positions {
                cursor.ensure_available(freq as usize)?;
                let mut position = 0i64;
                for _ in 0..freq {
                    position = position.wrapping_add(zigzag_decode(cursor.read_varint()?));
                    positions.push(position);
                }
            }

            let mut offsets = Vec::new();
            if has_offsets {
                cursor.ensure_available(freq as usize * 2)?;
                let mut start = 0i64;
                for _ in 0..freq {
                    start = start.wrapping_add(zigzag_decode(cursor.read_varint()?));
                    let length = zigzag_decode(cursor.read_varint()?);
                    offsets.push((start, start.wrapping_add(length)));
                }
            }

            terms.push(VectorTerm {
                term,
                freq,
                positions,
                offsets,
            });
        }

        fields.push(FieldVector {
            field_number,
            has_positions,
            has_offsets,
            terms,
        });
    }

    if cursor.position != block.len() {
        return Err(SarissaError::corruption(format!(
            "{} trailing bytes after vector fields",
            block.len() - cursor.position
        )));
    }
    Ok(fields)
}

struct BlockCursor<'a> {
    block: &'a [u8],
    position: usize,
}

impl<'a> BlockCursor<'a> {
    fn remaining(&self) -> usize {
        self.block.len() - self.position
    }

    fn ensure_available(&self, length: usize) -> Result<()> {
        if length > self.remaining() {
            return Err(SarissaError::corruption(format!(
                "block truncated: need {length} bytes at block offset {}, {} left",
                self.position,
                self.remaining()
            )));
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.ensure_available(1)?;
        let byte = self.block[self.position];
        self.position += 1;
        Ok(byte)
    }

    fn read_varint(&mut self) -> Result<u64> {
        let (value, consumed) = decode_u64(&self.block[self.position..]).map_err(|e| {
            SarissaError::corruption(format!("{e} at block offset {}", self.position))
        })?;
        self.position += consumed;
        Ok(value)
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let offset = self.position;
        let value = self.read_varint()?;
        u32::try_from(value).map_err(|_| {
            SarissaError::corruption(format!("{what} {value} overflows at block offset {offset}"))
        })
    }

    /// Counts are bounded by the bytes left, every element takes at least one.
    fn read_count(&mut self, what: &str) -> Result<usize> {
        let offset = self.position;
        let value = self.read_varint()?;
        if value > self.remaining() as u64 {
            return Err(SarissaError::corruption(format!(
                "{what} {value} at block offset {offset} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(value as usize)
    }

    fn read_raw(&mut self, length: usize) -> Result<&'a [u8]> {
        self.ensure_available(length)?;
        let bytes = &self.block[self.position..self.position + length];
        self.position += length;
        Ok(bytes)
    }
}
