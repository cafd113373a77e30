//! Storage abstraction layer for the index checker.
//!
//! The checker and the index writer never touch the filesystem directly. They
//! go through the [`Storage`] trait, which hands out sequential readers and
//! writers for named files and a [`LockManager`] for the advisory index lock.
//!
//! # Storage Types
//!
//! ## FileStorage
//! - Disk-based persistent storage
//! - Lock files created with `create_new`, so a held lock fails fast
//!
//! ## MemoryStorage
//! - In-memory storage for testing and temporary indexes
//! - Lock table shared by every user of the same storage instance
//!
//! # Example
//!
//! ```
//! use sarissa_check::storage::{StorageConfig, StorageFactory};
//! use sarissa_check::storage::memory::MemoryStorageConfig;
//!
//! # fn main() -> sarissa_check::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?;
//! assert!(storage.list_files()?.is_empty());
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use crate::error::{Result, SarissaError};

pub mod file;
pub mod memory;
pub mod structured;

/// A flat namespace of index files plus the lock manager guarding it.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open a file for reading.
    ///
    /// The file must exist, or this will return an error.
    ///
    /// # Example
    ///
    /// ```
    /// use sarissa_check::storage::memory::{MemoryStorage, MemoryStorageConfig};
    /// use sarissa_check::storage::{Storage, StorageOutput};
    /// use std::io::{Read, Write};
    ///
    /// # fn main() -> sarissa_check::error::Result<()> {
    /// let storage = MemoryStorage::new(MemoryStorageConfig::default());
    ///
    /// let mut output = storage.create_output("index.bin")?;
    /// output.write_all(b"test data")?;
    /// output.close()?;
    ///
    /// let mut input = storage.open_input("index.bin")?;
    /// let mut buffer = Vec::new();
    /// input.read_to_end(&mut buffer)?;
    /// assert_eq!(buffer, b"test data");
    /// # Ok(())
    /// # }
    /// ```
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a file for writing.
    ///
    /// Creates a new file or truncates an existing file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files in the storage, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Atomically rename a file.
    ///
    /// Commit points are written under a temporary name and renamed into
    /// place so readers never observe a half-written catalog.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Sync all pending writes to storage.
    fn sync(&self) -> Result<()>;

    /// The lock manager guarding this storage location.
    fn lock_manager(&self) -> &dyn LockManager;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Get the size of the input stream.
    fn size(&self) -> Result<u64>;

    /// Close the input stream.
    fn close(&mut self) -> Result<()>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Get the current position in the output stream.
    fn position(&self) -> Result<u64>;

    /// Close the output stream.
    fn close(&mut self) -> Result<()>;
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn position(&self) -> Result<u64> {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// Hands out the named advisory locks of one index location.
///
/// Acquisition is a single attempt: a lock that is already held makes
/// [`LockManager::acquire_lock`] fail with
/// [`SarissaError::LockObtainFailed`] immediately instead of waiting. The
/// index writer and the checker both take [`WRITE_LOCK_NAME`], which is what
/// keeps a check from running against an index that is being modified.
///
/// [`WRITE_LOCK_NAME`]: crate::index::codec::WRITE_LOCK_NAME
pub trait LockManager: Send + Sync + std::fmt::Debug {
    /// Take the lock `name`, failing fast when someone else holds it.
    fn acquire_lock(&self, name: &str) -> Result<Box<dyn StorageLock>>;

    /// Like [`acquire_lock`](LockManager::acquire_lock), but a held lock is
    /// `Ok(None)` rather than an error.
    fn try_acquire_lock(&self, name: &str) -> Result<Option<Box<dyn StorageLock>>> {
        match self.acquire_lock(name) {
            Ok(lock) => Ok(Some(lock)),
            Err(SarissaError::LockObtainFailed(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether anyone currently holds `name`.
    fn lock_exists(&self, name: &str) -> bool;
}

/// A held lock. Dropping it without calling [`release`](StorageLock::release)
/// releases it as well.
pub trait StorageLock: Send + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Give the lock up. Releasing twice is a no-op.
    fn release(&mut self) -> Result<()>;

    /// False once released.
    fn is_held(&self) -> bool;
}

/// Configuration for storage backends.
///
/// # Example
///
/// ```
/// use sarissa_check::storage::StorageConfig;
/// use sarissa_check::storage::file::FileStorageConfig;
/// use sarissa_check::storage::memory::MemoryStorageConfig;
///
/// let config = StorageConfig::File(FileStorageConfig::new("/data/index").with_buffer_size(128 * 1024));
///
/// let config = StorageConfig::Memory(MemoryStorageConfig::default());
/// ```
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// File-based storage rooted at a directory.
    File(file::FileStorageConfig),

    /// In-memory storage.
    Memory(memory::MemoryStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(memory::MemoryStorageConfig::default())
    }
}

/// A factory for creating storage instances.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a storage backend from its configuration.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(mem_config) => {
                let storage = memory::MemoryStorage::new(mem_config);
                Ok(Arc::new(storage))
            }
            StorageConfig::File(file_config) => {
                let path = file_config.path.clone();
                let storage = file::FileStorage::new(&path, file_config)?;
                Ok(Arc::new(storage))
            }
        }
    }
}

/// Read a whole file into memory.
pub fn read_all(storage: &dyn Storage, name: &str) -> Result<Vec<u8>> {
    let mut input = storage.open_input(name)?;
    let mut bytes = Vec::with_capacity(input.size()? as usize);
    input.read_to_end(&mut bytes)?;
    input.close()?;
    Ok(bytes)
}

/// Replace a whole file with the given bytes.
pub fn write_all(storage: &dyn Storage, name: &str, bytes: &[u8]) -> Result<()> {
    let mut output = storage.create_output(name)?;
    output.write_all(bytes)?;
    output.close()
}

/// Failures raised by storage backends before they become a [`SarissaError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The named file does not exist.
    FileNotFound(String),

    /// An underlying I/O call failed.
    IoError(String),

    /// The named lock is held elsewhere.
    LockFailed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::LockFailed(name) => write!(f, "Lock held elsewhere: {name}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for SarissaError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LockFailed(_) => SarissaError::lock_obtain_failed(err.to_string()),
            _ => SarissaError::storage(err.to_string()),
        }
    }
}
