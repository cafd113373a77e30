//! In-memory storage for tests and throwaway indexes.
//!
//! Locks live in a name table shared by every handle to the same storage, so
//! a writer and a checker on one `MemoryStorage` exclude each other.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use ahash::AHashSet;
use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::{LockManager, Storage, StorageError, StorageInput, StorageLock, StorageOutput};

/// Configuration for in-memory storage.
#[derive(Debug, Clone)]
pub struct MemoryStorageConfig {
    /// Initial capacity of the file table.
    pub initial_capacity: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        MemoryStorageConfig {
            initial_capacity: 16,
        }
    }
}

type FileTable = Arc<Mutex<HashMap<String, Box<[u8]>>>>;

/// An in-memory storage implementation.
///
/// Files become visible to readers when their output is closed (or dropped).
#[derive(Debug)]
pub struct MemoryStorage {
    files: FileTable,
    lock_manager: MemoryLockManager,
}

impl MemoryStorage {
    /// Create a new memory storage.
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(Mutex::new(HashMap::with_capacity(config.initial_capacity))),
            lock_manager: MemoryLockManager::default(),
        }
    }

    /// Create a new memory storage with default configuration.
    pub fn new_default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Get the total size of all files.
    pub fn total_size(&self) -> u64 {
        self.files.lock().values().map(|data| data.len() as u64).sum()
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let files = self.files.lock();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(Box::new(MemoryInput::new(data.to_vec())))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(Box::new(MemoryOutput::new(
            name.to_string(),
            Arc::clone(&self.files),
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.lock().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut file_names: Vec<String> = self.files.lock().keys().cloned().collect();
        file_names.sort();
        Ok(file_names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.lock();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(data.len() as u64)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut files = self.files.lock();
        let data = files
            .remove(old_name)
            .ok_or_else(|| StorageError::FileNotFound(old_name.to_string()))?;

        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn lock_manager(&self) -> &dyn LockManager {
        &self.lock_manager
    }
}

/// A memory-based input implementation.
#[derive(Debug)]
pub struct MemoryInput {
    cursor: Cursor<Vec<u8>>,
    size: u64,
}

impl MemoryInput {
    fn new(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        MemoryInput {
            cursor: Cursor::new(data),
            size,
        }
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A memory-based output implementation.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: FileTable,
    closed: bool,
}

impl MemoryOutput {
    fn new(name: String, files: FileTable) -> Self {
        MemoryOutput {
            name,
            buffer: Vec::new(),
            files,
            closed: false,
        }
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }

        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.buffer.len() as u64)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            let data = std::mem::take(&mut self.buffer).into_boxed_slice();
            self.files.lock().insert(self.name.clone(), data);
            self.closed = true;
        }
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

type LockTable = Arc<Mutex<AHashSet<String>>>;

/// Lock names held against one [`MemoryStorage`].
#[derive(Debug, Default)]
pub struct MemoryLockManager {
    held: LockTable,
}

impl LockManager for MemoryLockManager {
    fn acquire_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        if !self.held.lock().insert(name.to_string()) {
            return Err(StorageError::LockFailed(name.to_string()).into());
        }
        Ok(Box::new(MemoryLock {
            name: name.to_string(),
            held: Some(Arc::clone(&self.held)),
        }))
    }

    fn lock_exists(&self, name: &str) -> bool {
        self.held.lock().contains(name)
    }
}

#[derive(Debug)]
struct MemoryLock {
    name: String,
    /// `None` once released.
    held: Option<LockTable>,
}

impl StorageLock for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if let Some(held) = self.held.take() {
            held.lock().remove(&self.name);
        }
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.held.is_some()
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SarissaError;

    #[test]
    fn test_memory_storage_creation() {
        let storage = MemoryStorage::new_default();
        assert_eq!(storage.file_count(), 0);
        assert_eq!(storage.total_size(), 0);
        assert!(storage.lock_manager().try_acquire_lock("write").unwrap().is_some());
    }

    #[test]
    fn test_create_and_read_file() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("_0.fdt").unwrap();
        output.write_all(b"stored fields").unwrap();
        output.close().unwrap();

        let mut input = storage.open_input("_0.fdt").unwrap();
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer).unwrap();

        assert_eq!(buffer, b"stored fields");
        assert_eq!(input.size().unwrap(), 13);
        assert_eq!(storage.file_count(), 1);
        assert_eq!(storage.total_size(), 13);
    }

    #[test]
    fn test_output_visible_only_after_close() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("pending.bin").unwrap();
        output.write_all(b"abc").unwrap();
        assert_eq!(output.position().unwrap(), 3);
        assert!(!storage.file_exists("pending.bin"));

        drop(output);
        assert!(storage.file_exists("pending.bin"));
    }

    #[test]
    fn test_rename_and_delete() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("a").unwrap();
        output.write_all(b"1").unwrap();
        output.close().unwrap();

        storage.rename_file("a", "b").unwrap();
        assert_eq!(storage.list_files().unwrap(), vec!["b"]);
        assert!(storage.rename_file("a", "c").is_err());

        storage.delete_file("b").unwrap();
        assert!(storage.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_lock_release_frees_name() {
        let storage = MemoryStorage::new_default();
        let manager = storage.lock_manager();

        let mut lock = manager.acquire_lock("write").unwrap();
        assert!(manager.lock_exists("write"));
        assert!(matches!(
            manager.acquire_lock("write"),
            Err(SarissaError::LockObtainFailed(_))
        ));

        lock.release().unwrap();
        lock.release().unwrap();
        assert!(!lock.is_held());
        assert!(!manager.lock_exists("write"));

        let again = manager.acquire_lock("write").unwrap();
        drop(again);
        assert!(!manager.lock_exists("write"));
    }
}
