//! Structured file I/O for checksummed binary index files.
//!
//! Every index file is written through [`StructWriter`] and ends with a fixed
//! footer:
//!
//! ```text
//! payload ... | FOOTER_MAGIC: u32 LE | crc32: u32 LE
//! ```
//!
//! The CRC32 covers every byte before the checksum value, footer magic
//! included. [`StructReader`] decodes the payload and refuses to read into the
//! footer, so a truncated or garbled length prefix surfaces as a
//! [`SarissaError::Corruption`] instead of a huge allocation.

use std::collections::BTreeMap;
use std::io::{Read, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{Result, SarissaError};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint::{MAX_VARINT_LEN, decode_u64, encode_u64, zigzag_decode, zigzag_encode};

/// Marks the start of the footer.
pub const FOOTER_MAGIC: u32 = 0xC02893E8;

/// Size of the footer in bytes.
pub const FOOTER_LEN: u64 = 8;

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: Hasher,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Write a file header: magic followed by a format version.
    pub fn write_header(&mut self, magic: u32, version: u32) -> Result<()> {
        self.write_u32(magic)?;
        self.write_u32(version)
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_raw(&[value])
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write an i64 value (little-endian).
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a f64 value (little-endian).
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let encoded = encode_u64(value);
        self.write_raw(&encoded)
    }

    /// Write a zig-zag encoded signed variable-length integer.
    pub fn write_zigzag(&mut self, value: i64) -> Result<()> {
        self.write_varint(zigzag_encode(value))
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.write_raw(value)
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.hasher.update(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Write a string-to-string map, keys in sorted order.
    pub fn write_string_map(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        self.write_varint(map.len() as u64)?;
        for (key, value) in map {
            self.write_string(key)?;
            self.write_string(value)?;
        }
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Append the footer, then flush and close the underlying output.
    pub fn close(mut self) -> Result<()> {
        self.write_u32(FOOTER_MAGIC)?;
        let checksum = self.hasher.clone().finalize();
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.writer.flush_and_sync()?;
        self.writer.close()?;
        Ok(())
    }
}

/// A structured file reader for binary data.
#[derive(Debug)]
pub struct StructReader<R: StorageInput> {
    reader: R,
    position: u64,
    payload_end: u64,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured file reader over a footer-terminated file.
    pub fn new(reader: R) -> Result<Self> {
        let file_size = reader.size()?;
        if file_size < FOOTER_LEN {
            return Err(SarissaError::corruption(format!(
                "file too short for footer: {file_size} bytes"
            )));
        }
        Ok(StructReader {
            reader,
            position: 0,
            payload_end: file_size - FOOTER_LEN,
        })
    }

    /// Read and validate a file header.
    pub fn check_header(&mut self, magic: u32, version: u32) -> Result<()> {
        let actual_magic = self.read_u32()?;
        if actual_magic != magic {
            return Err(SarissaError::corruption(format!(
                "bad header magic {actual_magic:#010x} (expected {magic:#010x})"
            )));
        }
        let actual_version = self.read_u32()?;
        if actual_version != version {
            return Err(SarissaError::corruption(format!(
                "unsupported format version {actual_version} (expected {version})"
            )));
        }
        Ok(())
    }

    fn ensure_available(&self, length: u64) -> Result<()> {
        if length > self.remaining() {
            return Err(SarissaError::corruption(format!(
                "read of {length} bytes at offset {} runs past payload end {}",
                self.position, self.payload_end
            )));
        }
        Ok(())
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure_available(1)?;
        let value = self.reader.read_u8()?;
        self.position += 1;
        Ok(value)
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure_available(4)?;
        let value = self.reader.read_u32::<LittleEndian>()?;
        self.position += 4;
        Ok(value)
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure_available(8)?;
        let value = self.reader.read_u64::<LittleEndian>()?;
        self.position += 8;
        Ok(value)
    }

    /// Read an i64 value (little-endian).
    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure_available(8)?;
        let value = self.reader.read_i64::<LittleEndian>()?;
        self.position += 8;
        Ok(value)
    }

    /// Read a f64 value (little-endian).
    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure_available(8)?;
        let value = self.reader.read_f64::<LittleEndian>()?;
        self.position += 8;
        Ok(value)
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let start = self.position;
        let mut bytes = Vec::with_capacity(4);
        loop {
            let byte = self.read_u8().map_err(|_| {
                SarissaError::corruption(format!("unterminated varint at offset {start}"))
            })?;
            bytes.push(byte);
            if byte & 0x80 == 0 {
                break;
            }
            if bytes.len() >= MAX_VARINT_LEN {
                return Err(SarissaError::corruption(format!(
                    "varint longer than {MAX_VARINT_LEN} bytes at offset {start}"
                )));
            }
        }

        let (value, _) = decode_u64(&bytes)
            .map_err(|e| SarissaError::corruption(format!("{e} at offset {start}")))?;
        Ok(value)
    }

    /// Read a varint that must fit in a `u32`; a wider value is corruption.
    pub fn read_varint_u32(&mut self, what: &str) -> Result<u32> {
        let offset = self.position;
        let value = self.read_varint()?;
        u32::try_from(value).map_err(|_| {
            SarissaError::corruption(format!("{what} {value} overflows u32 at offset {offset}"))
        })
    }

    /// Read a zig-zag encoded signed variable-length integer.
    pub fn read_zigzag(&mut self) -> Result<i64> {
        Ok(zigzag_decode(self.read_varint()?))
    }

    /// Read a varint that must fit in `usize` and not exceed `limit`.
    pub fn read_count(&mut self, limit: u64, what: &str) -> Result<usize> {
        let offset = self.position;
        let value = self.read_varint()?;
        if value > limit {
            return Err(SarissaError::corruption(format!(
                "{what} {value} exceeds limit {limit} at offset {offset}"
            )));
        }
        Ok(value as usize)
    }

    /// Read bytes with length prefix.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let offset = self.position;
        let length = self.read_varint()?;
        if length > self.remaining() {
            return Err(SarissaError::corruption(format!(
                "length prefix {length} at offset {offset} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        self.read_raw(length as usize)
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let offset = self.position;
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| {
            SarissaError::corruption(format!("invalid UTF-8 string at offset {offset}: {e}"))
        })
    }

    /// Read exact number of raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        self.ensure_available(length as u64)?;
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.position += length as u64;
        Ok(bytes)
    }

    /// Read a string-to-string map.
    pub fn read_string_map(&mut self) -> Result<BTreeMap<String, String>> {
        let length = self.read_count(self.remaining(), "map size")?;
        let mut map = BTreeMap::new();
        for _ in 0..length {
            let key = self.read_string()?;
            let value = self.read_string()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Move to an absolute payload offset.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.payload_end {
            return Err(SarissaError::corruption(format!(
                "seek to offset {offset} beyond payload end {}",
                self.payload_end
            )));
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Offset where the footer starts.
    pub fn payload_end(&self) -> u64 {
        self.payload_end
    }

    /// Bytes left before the footer.
    pub fn remaining(&self) -> u64 {
        self.payload_end.saturating_sub(self.position)
    }

    /// Whether the whole payload has been consumed.
    pub fn is_eof(&self) -> bool {
        self.position >= self.payload_end
    }

    /// Fail unless the payload was consumed exactly.
    pub fn expect_eof(&self, what: &str) -> Result<()> {
        if !self.is_eof() {
            return Err(SarissaError::corruption(format!(
                "{} trailing bytes after {what} at offset {}",
                self.remaining(),
                self.position
            )));
        }
        Ok(())
    }

    /// Close the reader.
    pub fn close(mut self) -> Result<()> {
        self.reader.close()
    }
}

/// Recompute the checksum of a whole file and compare it with its footer.
///
/// Returns the stored checksum on success.
pub fn verify_footer<R: StorageInput + ?Sized>(input: &mut R, name: &str) -> Result<u32> {
    let size = input.size()?;
    if size < FOOTER_LEN {
        return Err(SarissaError::corruption(format!(
            "{name}: file too short for footer ({size} bytes)"
        )));
    }

    input.seek(SeekFrom::Start(0))?;
    let mut hasher = Hasher::new();
    let mut remaining = size - FOOTER_LEN;
    let mut buffer = [0u8; 8192];
    while remaining > 0 {
        let chunk = remaining.min(buffer.len() as u64) as usize;
        input.read_exact(&mut buffer[..chunk])?;
        hasher.update(&buffer[..chunk]);
        remaining -= chunk as u64;
    }

    let mut magic_bytes = [0u8; 4];
    input.read_exact(&mut magic_bytes)?;
    hasher.update(&magic_bytes);
    let magic = u32::from_le_bytes(magic_bytes);
    if magic != FOOTER_MAGIC {
        return Err(SarissaError::corruption(format!(
            "{name}: bad footer magic {magic:#010x}"
        )));
    }

    let actual = hasher.finalize();
    let expected = input.read_u32::<LittleEndian>()?;
    if expected != actual {
        return Err(SarissaError::ChecksumMismatch {
            file: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn write_sample(storage: &MemoryStorage, name: &str) {
        let mut writer = StructWriter::new(storage.create_output(name).unwrap());
        writer.write_header(0x54455354, 1).unwrap();
        writer.write_varint(300).unwrap();
        writer.write_zigzag(-7).unwrap();
        writer.write_string("hello").unwrap();
        writer.write_u64(42).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_write_then_read_values() {
        let storage = MemoryStorage::new_default();
        write_sample(&storage, "sample.bin");

        let mut reader = StructReader::new(storage.open_input("sample.bin").unwrap()).unwrap();
        reader.check_header(0x54455354, 1).unwrap();
        assert_eq!(reader.read_varint().unwrap(), 300);
        assert_eq!(reader.read_zigzag().unwrap(), -7);
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert_eq!(reader.read_u64().unwrap(), 42);
        reader.expect_eof("sample").unwrap();

        // the footer is never readable as payload
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_verify_footer_detects_bit_flip() {
        let storage = MemoryStorage::new_default();
        write_sample(&storage, "sample.bin");

        let mut input = storage.open_input("sample.bin").unwrap();
        verify_footer(&mut input, "sample.bin").unwrap();

        let mut bytes = crate::storage::read_all(&storage, "sample.bin").unwrap();
        bytes[10] ^= 0x04;
        crate::storage::write_all(&storage, "sample.bin", &bytes).unwrap();

        let mut input = storage.open_input("sample.bin").unwrap();
        match verify_footer(&mut input, "sample.bin") {
            Err(SarissaError::ChecksumMismatch { file, .. }) => assert_eq!(file, "sample.bin"),
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_footer_rejects_truncation() {
        let storage = MemoryStorage::new_default();
        write_sample(&storage, "sample.bin");

        let bytes = crate::storage::read_all(&storage, "sample.bin").unwrap();
        crate::storage::write_all(&storage, "short.bin", &bytes[..bytes.len() - 3]).unwrap();

        let mut input = storage.open_input("short.bin").unwrap();
        assert!(verify_footer(&mut input, "short.bin").is_err());
    }

    #[test]
    fn test_oversized_length_prefix_is_corruption() {
        let storage = MemoryStorage::new_default();
        let mut writer = StructWriter::new(storage.create_output("bad.bin").unwrap());
        writer.write_varint(1 << 40).unwrap();
        writer.write_raw(b"abc").unwrap();
        writer.close().unwrap();

        let mut reader = StructReader::new(storage.open_input("bad.bin").unwrap()).unwrap();
        assert!(matches!(
            reader.read_bytes(),
            Err(SarissaError::Corruption(_))
        ));
    }

    #[test]
    fn test_wide_varint_is_not_truncated_to_u32() {
        let storage = MemoryStorage::new_default();
        let mut writer = StructWriter::new(storage.create_output("wide.bin").unwrap());
        writer.write_varint(u32::MAX as u64).unwrap();
        writer.write_varint(1 << 32).unwrap();
        writer.close().unwrap();

        let mut reader = StructReader::new(storage.open_input("wide.bin").unwrap()).unwrap();
        assert_eq!(reader.read_varint_u32("field number").unwrap(), u32::MAX);
        match reader.read_varint_u32("field number") {
            Err(SarissaError::Corruption(msg)) => assert!(msg.contains("4294967296")),
            other => panic!("expected corruption, got {other:?}"),
        }
    }
}
