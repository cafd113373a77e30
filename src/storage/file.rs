//! Directory-backed storage.
//!
//! Every index file is a regular file in one directory. Locks are marker
//! files next to them: `write` is `write.lock`, created with `create_new` so
//! a second holder fails at once, even from another process.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, warn};

use crate::error::{Result, SarissaError};
use crate::storage::{LockManager, Storage, StorageError, StorageInput, StorageLock, StorageOutput};

const MIN_BUFFER_SIZE: usize = 4096;

/// Configuration for file-based storage.
#[derive(Debug, Clone)]
pub struct FileStorageConfig {
    /// Root directory of the index.
    pub path: PathBuf,

    /// Capacity of the read and write buffers.
    pub buffer_size: usize,
}

impl FileStorageConfig {
    /// Create a configuration rooted at `path` with 64KB buffers.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            buffer_size: 64 * 1024,
        }
    }

    /// Buffers smaller than 4KB are rounded up.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
        self
    }
}

/// Index files in a filesystem directory.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    config: FileStorageConfig,
    lock_manager: FileLockManager,
}

impl FileStorage {
    /// Open `directory`, creating it when missing.
    pub fn new<P: AsRef<Path>>(directory: P, config: FileStorageConfig) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        if !directory.exists() {
            std::fs::create_dir_all(&directory).map_err(|e| {
                SarissaError::storage(format!(
                    "cannot create index directory {}: {e}",
                    directory.display()
                ))
            })?;
        }
        if !directory.is_dir() {
            return Err(SarissaError::storage(format!(
                "{} is not a directory",
                directory.display()
            )));
        }

        Ok(FileStorage {
            lock_manager: FileLockManager {
                directory: directory.clone(),
            },
            directory,
            config,
        })
    }

    /// Root directory of this storage.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }
}

fn map_io_error(name: &str, e: std::io::Error) -> StorageError {
    match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::FileNotFound(name.to_string()),
        _ => StorageError::IoError(format!("{name}: {e}")),
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let file = File::open(self.file_path(name)).map_err(|e| map_io_error(name, e))?;
        let size = file.metadata().map_err(|e| map_io_error(name, e))?.len();
        Ok(Box::new(FileInput {
            reader: BufReader::with_capacity(self.config.buffer_size, file),
            size,
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.file_path(name))
            .map_err(|e| map_io_error(name, e))?;

        Ok(Box::new(FileOutput {
            writer: BufWriter::with_capacity(self.config.buffer_size, file),
            position: 0,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.file_path(name).is_file()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.file_path(name)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(map_io_error(name, e).into())
            }
            _ => Ok(()),
        }
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.directory)
            .map_err(|e| StorageError::IoError(e.to_string()))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::IoError(e.to_string()))?;
            if !entry.path().is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => files.push(name),
                Err(raw) => debug!("skipping non UTF-8 file name {raw:?}"),
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let metadata = self
            .file_path(name)
            .metadata()
            .map_err(|e| map_io_error(name, e))?;
        Ok(metadata.len())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        std::fs::rename(self.file_path(old_name), self.file_path(new_name))
            .map_err(|e| map_io_error(old_name, e))?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        // Data files are synced on close; this makes renames durable.
        #[cfg(unix)]
        File::open(&self.directory)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| StorageError::IoError(format!("sync directory: {e}")))?;
        Ok(())
    }

    fn lock_manager(&self) -> &dyn LockManager {
        &self.lock_manager
    }
}

/// Buffered sequential reader over one file.
#[derive(Debug)]
pub struct FileInput {
    reader: BufReader<File>,
    size: u64,
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Buffered writer that tracks how many bytes it has accepted.
#[derive(Debug)]
pub struct FileOutput {
    writer: BufWriter<File>,
    position: u64,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        self.flush_and_sync()
    }
}

/// Lock files in the index directory.
#[derive(Debug)]
pub struct FileLockManager {
    directory: PathBuf,
}

impl FileLockManager {
    fn lock_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.lock"))
    }
}

impl LockManager for FileLockManager {
    fn acquire_lock(&self, name: &str) -> Result<Box<dyn StorageLock>> {
        let path = self.lock_path(name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    StorageError::LockFailed(path.display().to_string())
                }
                _ => StorageError::IoError(format!("{}: {e}", path.display())),
            })?;

        // Holder details for whoever finds a stale lock file.
        writeln!(
            file,
            "pid={} acquired={}",
            std::process::id(),
            Utc::now().to_rfc3339()
        )?;
        debug!("acquired lock {}", path.display());

        Ok(Box::new(FileLock {
            name: name.to_string(),
            path,
            file: Some(file),
        }))
    }

    fn lock_exists(&self, name: &str) -> bool {
        self.lock_path(name).exists()
    }
}

/// A held lock file; the file is removed on release.
#[derive(Debug)]
struct FileLock {
    name: String,
    path: PathBuf,
    file: Option<File>,
}

impl StorageLock for FileLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            std::fs::remove_file(&self.path).map_err(|e| {
                SarissaError::storage(format!("cannot remove {}: {e}", self.path.display()))
            })?;
            debug!("released lock {}", self.path.display());
        }
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, FileStorage) {
        let temp_dir = TempDir::new().unwrap();
        let config = FileStorageConfig::new(temp_dir.path());
        let storage = FileStorage::new(temp_dir.path(), config).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_create_and_read_file() {
        let (_temp_dir, storage) = create_test_storage();

        let mut output = storage.create_output("_0.fnm").unwrap();
        output.write_all(b"field infos").unwrap();
        assert_eq!(output.position().unwrap(), 11);
        output.close().unwrap();

        let mut input = storage.open_input("_0.fnm").unwrap();
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer).unwrap();

        assert_eq!(buffer, b"field infos");
        assert_eq!(input.size().unwrap(), 11);
    }

    #[test]
    fn test_file_operations() {
        let (_temp_dir, storage) = create_test_storage();

        assert!(!storage.file_exists("segments_1"));

        let mut output = storage.create_output("pending_segments_1").unwrap();
        output.write_all(b"catalog").unwrap();
        output.close().unwrap();

        assert_eq!(storage.file_size("pending_segments_1").unwrap(), 7);
        storage
            .rename_file("pending_segments_1", "segments_1")
            .unwrap();
        storage.sync().unwrap();
        assert_eq!(storage.list_files().unwrap(), vec!["segments_1"]);

        storage.delete_file("segments_1").unwrap();
        storage.delete_file("segments_1").unwrap();
        assert!(!storage.file_exists("segments_1"));
    }

    #[test]
    fn test_file_not_found() {
        let (_temp_dir, storage) = create_test_storage();

        assert!(matches!(
            storage.open_input("_9.pst"),
            Err(SarissaError::Storage(msg)) if msg.contains("_9.pst")
        ));
        assert!(storage.file_size("_9.pst").is_err());
    }

    #[test]
    fn test_lock_is_exclusive_and_fails_fast() {
        let (temp_dir, storage) = create_test_storage();
        let lock_file = temp_dir.path().join("write.lock");

        let mut first = storage.lock_manager().acquire_lock("write").unwrap();
        assert!(first.is_held());
        let holder = std::fs::read_to_string(&lock_file).unwrap();
        assert!(holder.starts_with(&format!("pid={}", std::process::id())));

        let second = storage.lock_manager().acquire_lock("write");
        assert!(matches!(second, Err(SarissaError::LockObtainFailed(_))));
        assert!(
            storage
                .lock_manager()
                .try_acquire_lock("write")
                .unwrap()
                .is_none()
        );

        first.release().unwrap();
        first.release().unwrap();
        assert!(!first.is_held());
        assert!(!lock_file.exists());

        let third = storage.lock_manager().acquire_lock("write").unwrap();
        drop(third);
        assert!(!lock_file.exists());
    }

    #[test]
    fn test_lock_seen_across_storage_instances() {
        let (temp_dir, storage) = create_test_storage();
        let other =
            FileStorage::new(temp_dir.path(), FileStorageConfig::new(temp_dir.path())).unwrap();

        let mut lock = storage.lock_manager().acquire_lock("write").unwrap();
        assert!(other.lock_manager().lock_exists("write"));
        assert!(other.lock_manager().acquire_lock("write").is_err());
        lock.release().unwrap();
        assert!(!other.lock_manager().lock_exists("write"));
    }
}
