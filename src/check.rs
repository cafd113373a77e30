//! Index integrity checking.
//!
//! [`CheckIndex`] takes the exclusive write lock of an index, reads the
//! latest commit point and verifies each segment: footer checksums first,
//! then field norms, the term index, stored fields and term vectors. Faults
//! found inside a segment are recorded in the returned [`Status`] tree and
//! never abort the run. Only a held lock or an unreadable commit point fail
//! the call itself.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use sarissa_check::check::CheckIndex;
//! use sarissa_check::document::{Document, FieldType};
//! use sarissa_check::index::{IndexWriter, IndexWriterConfig};
//! use sarissa_check::storage::Storage;
//! use sarissa_check::storage::memory::MemoryStorage;
//!
//! # fn main() -> sarissa_check::error::Result<()> {
//! let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
//!
//! let mut writer = IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default())?;
//! writer.add_document(
//!     Document::builder()
//!         .add_text("body", "hello world", FieldType::TEXT_STORED)
//!         .build(),
//! )?;
//! writer.close()?;
//!
//! let mut checker = CheckIndex::open(storage)?;
//! let status = checker.check_index()?;
//! assert!(status.clean);
//! checker.close()?;
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod config;
pub mod norms;
pub mod postings;
pub mod report;
pub mod status;
pub mod stored;
pub mod vectors;

use std::sync::Arc;

use log::{debug, info};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

pub use self::config::CheckIndexConfig;
pub use self::report::{ReportSink, Reporter};
pub use self::status::{
    FieldNormStatus, SegmentInfoStatus, Status, StoredFieldStatus, TermIndexStatus,
    TermVectorStatus,
};

use crate::check::checksum::verify_segment_files;
use crate::check::report::SegmentReport;
use crate::check::status::RecordFault;
use crate::error::{Result, SarissaError};
use crate::index::codec::WRITE_LOCK_NAME;
use crate::index::commit::{CommitPoint, SegmentDescriptor};
use crate::index::reader::SegmentReader;
use crate::storage::{Storage, StorageLock};

/// Checker for one index, holding its write lock until closed.
#[derive(Debug)]
pub struct CheckIndex {
    storage: Arc<dyn Storage>,
    config: CheckIndexConfig,
    lock: Option<Box<dyn StorageLock>>,
    reporter: Reporter,
}

impl CheckIndex {
    /// Open a checker with the default configuration.
    ///
    /// Fails with [`SarissaError::LockObtainFailed`] without waiting when a
    /// writer or another checker holds the index.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        Self::with_config(storage, CheckIndexConfig::default())
    }

    /// Open a checker with the given configuration.
    pub fn with_config(storage: Arc<dyn Storage>, config: CheckIndexConfig) -> Result<Self> {
        let lock = storage.lock_manager().acquire_lock(WRITE_LOCK_NAME)?;
        debug!("check index: acquired lock '{}'", lock.name());

        let reporter = if config.verbose {
            Reporter::new(Some(Box::new(std::io::stderr())), true)
        } else {
            Reporter::default()
        };

        Ok(CheckIndex {
            storage,
            config,
            lock: Some(lock),
            reporter,
        })
    }

    pub fn config(&self) -> &CheckIndexConfig {
        &self.config
    }

    /// Send progress lines to `sink`, or drop them with `None`.
    /// `flush_each_line` flushes after every line instead of buffering.
    pub fn set_report_sink(&mut self, sink: Option<ReportSink>, flush_each_line: bool) {
        self.reporter.set_sink(sink, flush_each_line);
    }

    /// Verify every segment of the latest commit point.
    pub fn check_index(&self) -> Result<Status> {
        self.run(None)
    }

    /// Verify only the named segments of the latest commit point.
    ///
    /// Names that are not in the commit point are ignored.
    pub fn check_segments<S: AsRef<str>>(&self, names: &[S]) -> Result<Status> {
        let names = names.iter().map(|name| name.as_ref().to_string()).collect();
        self.run(Some(names))
    }

    /// Release the lock. Further checks fail; statuses already returned stay
    /// valid.
    pub fn close(&mut self) -> Result<()> {
        self.reporter.flush();
        if let Some(mut lock) = self.lock.take() {
            lock.release()?;
            debug!("check index: released lock");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock.is_none()
    }

    fn run(&self, requested: Option<Vec<String>>) -> Result<Status> {
        if self.is_closed() {
            return Err(SarissaError::invalid_operation("CheckIndex is closed"));
        }

        let commit = match CommitPoint::read_latest(self.storage.as_ref()) {
            Ok(commit) => commit,
            Err(e) => {
                self.reporter
                    .line(&format!("ERROR: could not read the commit point: {e}"));
                self.reporter.flush();
                return Err(e);
            }
        };
        let segments_file_name = commit.file_name();
        let num_segments = commit.segments.len();
        self.reporter.line(&format!(
            "Segments file={segments_file_name} numSegments={num_segments} generation={}",
            commit.generation
        ));

        let selected: Vec<&SegmentDescriptor> = match &requested {
            None => commit.segments.iter().collect(),
            Some(names) => {
                self.reporter
                    .line(&format!("\nChecking only these segments: {}", names.join(" ")));
                for name in names {
                    if !commit.segments.iter().any(|segment| &segment.name == name) {
                        self.reporter
                            .line(&format!("  segment {name} is not in {segments_file_name}"));
                    }
                }
                commit
                    .segments
                    .iter()
                    .filter(|segment| names.contains(&segment.name))
                    .collect()
            }
        };

        let checker = SegmentChecker {
            storage: &self.storage,
            reporter: &self.reporter,
            cross_check_term_vectors: self.config.cross_check_term_vectors,
        };
        let segments: Vec<SegmentInfoStatus> = if self.config.threads > 1 && selected.len() > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(self.config.threads)
                .thread_name(|i| format!("check-index-{i}"))
                .build()
                .map_err(|e| SarissaError::other(format!("Failed to create thread pool: {e}")))?;
            pool.install(|| {
                selected
                    .par_iter()
                    .enumerate()
                    .map(|(i, descriptor)| checker.check(i, num_segments, descriptor, true))
                    .collect()
            })
        } else {
            selected
                .iter()
                .enumerate()
                .map(|(i, descriptor)| checker.check(i, num_segments, descriptor, false))
                .collect()
        };

        let status = Status::aggregate(segments_file_name, num_segments, requested, segments);
        if status.clean {
            self.reporter
                .line("\nNo problems were detected with this index.\n");
        } else {
            self.reporter.line(&format!(
                "\nWARNING: {} broken segments (containing {} documents) detected\n",
                status.num_bad_segments, status.tot_lose_doc_count
            ));
        }
        self.reporter.flush();

        info!(
            "checked {} of {} segments in {}: {}",
            status.segments.len(),
            num_segments,
            status.segments_file_name,
            if status.clean { "clean" } else { "NOT clean" }
        );
        Ok(status)
    }
}

impl Drop for CheckIndex {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// What a single segment check needs. Shared by reference across worker
/// threads, so it leaves out the lock.
struct SegmentChecker<'a> {
    storage: &'a Arc<dyn Storage>,
    reporter: &'a Reporter,
    cross_check_term_vectors: bool,
}

impl SegmentChecker<'_> {
    fn check(
        &self,
        index: usize,
        total: usize,
        descriptor: &SegmentDescriptor,
        prefixed: bool,
    ) -> SegmentInfoStatus {
        let report = self.reporter.segment(&descriptor.name, prefixed);
        report.line(&format!(
            "  {} of {total}: name={} maxDoc={}",
            index + 1,
            descriptor.name,
            descriptor.max_doc
        ));

        let size_bytes: u64 = descriptor
            .files
            .iter()
            .filter_map(|file| self.storage.file_size(file).ok())
            .sum();
        let mut status = SegmentInfoStatus {
            name: descriptor.name.clone(),
            max_doc: descriptor.max_doc,
            num_deleted: descriptor.del_count,
            has_deletions: descriptor.has_deletions(),
            num_files: descriptor.files.len(),
            size_bytes,
            diagnostics: descriptor.diagnostics.clone(),
            ..Default::default()
        };

        report.line(&format!("    numFiles={}", status.num_files));
        report.line(&format!(
            "    size (MB)={:.3}",
            size_bytes as f64 / (1024.0 * 1024.0)
        ));
        if !status.diagnostics.is_empty() {
            let pairs: Vec<String> = status
                .diagnostics
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            report.line(&format!("    diagnostics = {{{}}}", pairs.join(", ")));
        }
        if status.has_deletions {
            report.line(&format!(
                "    has deletions [delGen={}, delCount={}]",
                descriptor.del_gen, descriptor.del_count
            ));
        } else {
            report.line("    no deletions");
        }

        let checksums = verify_segment_files(self.storage.as_ref(), descriptor, &report);

        let reader = match SegmentReader::open(Arc::clone(self.storage), descriptor) {
            Ok(reader) => reader,
            Err(e) => {
                let message = format!("cannot open segment {}: {e}", descriptor.name);
                report.line("    test: open reader.........FAILED");
                report.line(&format!("      ERROR: {message}"));
                status.error = Some(message);
                status.open_reader_passed = false;
                return status;
            }
        };
        status.open_reader_passed = true;
        status.num_fields = reader.field_infos().len();
        report.line(&format!(
            "    test: open reader.........OK [{} fields]",
            status.num_fields
        ));
        if let Some(first) = checksums.metadata.first() {
            status.error = Some(first.clone());
        }

        status.field_norm_status = Some(with_earlier(
            norms::verify_field_norms(&reader, &report),
            &checksums.norms,
        ));
        status.term_index_status = Some(with_earlier(
            postings::verify_term_index(&reader, &report),
            &checksums.term_index,
        ));
        status.stored_field_status = Some(with_earlier(
            stored::verify_stored_fields(&reader, &report),
            &checksums.stored_fields,
        ));
        status.term_vector_status = Some(with_earlier(
            vectors::verify_term_vectors(&reader, self.cross_check_term_vectors, &report),
            &checksums.term_vectors,
        ));

        finish_segment(&status, &report);
        status
    }
}

fn with_earlier<S: RecordFault>(mut status: S, faults: &[String]) -> S {
    status.absorb_earlier_faults(faults);
    status
}

fn finish_segment(status: &SegmentInfoStatus, report: &SegmentReport<'_>) {
    if status.is_clean() {
        report.line("  OK");
        return;
    }
    let first = status.error.as_deref().or_else(|| {
        [
            status.field_norm_status.as_ref().and_then(|s| s.error.as_deref()),
            status.term_index_status.as_ref().and_then(|s| s.error.as_deref()),
            status.stored_field_status.as_ref().and_then(|s| s.error.as_deref()),
            status.term_vector_status.as_ref().and_then(|s| s.error.as_deref()),
        ]
        .into_iter()
        .flatten()
        .next()
    });
    report.line(&format!("    FAILED: {}", first.unwrap_or("unknown fault")));
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::document::{Document, FieldType};
    use crate::index::commit::{CommitPoint, SegmentDescriptor};
    use crate::index::reader::SegmentReader;
    use crate::index::writer::{IndexWriter, IndexWriterConfig};
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    /// One committed segment `_0` with a stored, vectored text field per doc.
    pub fn text_segment(texts: &[&str]) -> (Arc<dyn Storage>, SegmentDescriptor) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer =
            IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default()).unwrap();
        for text in texts {
            writer
                .add_document(
                    Document::builder()
                        .add_text(
                            "field",
                            *text,
                            FieldType::TEXT_STORED.with_term_vectors(true, true),
                        )
                        .build(),
                )
                .unwrap();
        }
        writer.close().unwrap();

        let commit = CommitPoint::read_latest(storage.as_ref()).unwrap();
        let descriptor = commit.segments[0].clone();
        (storage, descriptor)
    }

    pub fn open_segment(storage: &Arc<dyn Storage>, descriptor: &SegmentDescriptor) -> SegmentReader {
        SegmentReader::open(Arc::clone(storage), descriptor).unwrap()
    }
}
