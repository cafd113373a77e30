//! Index writer: buffers documents, flushes segments, applies deletions,
//! merges and commits.
//!
//! The writer holds the exclusive `write` lock from [`IndexWriter::open`]
//! until [`IndexWriter::close`] (or drop), so no checker can run against an
//! index that is being written.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, info};

use crate::analysis::analyzer::{Analyzer, StandardAnalyzer};
use crate::analysis::token::Token;
use crate::document::Document;
use crate::error::{Result, SarissaError};
use crate::index::codec::{WRITE_LOCK_NAME, segment_name};
use crate::index::commit::{CommitPoint, SegmentDescriptor, latest_segments_file};
use crate::index::field_infos::FieldInfos;
use crate::index::live_docs::LiveDocs;
use crate::index::reader::SegmentReader;
use crate::index::segment::{DocTerm, IndexedDoc, write_segment};
use crate::index::stored_fields::StoredField;
use crate::index::term_vectors::{FieldVector, VectorTerm};
use crate::storage::{Storage, StorageLock};

/// Index writer configuration.
#[derive(Clone)]
pub struct IndexWriterConfig {
    /// Maximum number of documents to buffer before flushing a segment.
    pub max_buffered_docs: usize,

    /// Analyzer for tokenized fields.
    pub analyzer: Arc<dyn Analyzer>,
}

impl IndexWriterConfig {
    /// Set the flush threshold.
    pub fn with_max_buffered_docs(mut self, max_buffered_docs: usize) -> Self {
        self.max_buffered_docs = max_buffered_docs.max(1);
        self
    }

    /// Set the analyzer.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }
}

impl std::fmt::Debug for IndexWriterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWriterConfig")
            .field("max_buffered_docs", &self.max_buffered_docs)
            .field("analyzer", &self.analyzer.name())
            .finish()
    }
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        IndexWriterConfig {
            max_buffered_docs: 10000,
            analyzer: Arc::new(StandardAnalyzer::new()),
        }
    }
}

/// Writer for a segmented index.
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    config: IndexWriterConfig,
    lock: Option<Box<dyn StorageLock>>,

    /// Last committed catalog plus uncommitted segment changes.
    commit: CommitPoint,

    /// Field infos of the segment being buffered.
    field_infos: FieldInfos,
    buffered_docs: Vec<IndexedDoc>,

    /// Deletions not yet written, by segment name.
    pending_deletes: AHashMap<String, LiveDocs>,

    has_commit: bool,
    dirty: bool,
    closed: bool,
}

impl std::fmt::Debug for IndexWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWriter")
            .field("config", &self.config)
            .field("segments", &self.commit.segments.len())
            .field("buffered_docs", &self.buffered_docs.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl IndexWriter {
    /// Open a writer, taking the write lock without waiting.
    ///
    /// Fails with [`SarissaError::LockObtainFailed`] when another writer or a
    /// checker holds the lock.
    pub fn open(storage: Arc<dyn Storage>, config: IndexWriterConfig) -> Result<Self> {
        let lock = storage.lock_manager().acquire_lock(WRITE_LOCK_NAME)?;

        let (commit, has_commit) = match latest_segments_file(storage.as_ref())? {
            Some(_) => (CommitPoint::read_latest(storage.as_ref())?, true),
            None => (CommitPoint::default(), false),
        };
        debug!(
            "opened index writer at generation {} with {} segments",
            commit.generation,
            commit.segments.len()
        );

        Ok(IndexWriter {
            storage,
            config,
            lock: Some(lock),
            commit,
            field_infos: FieldInfos::new(),
            buffered_docs: Vec::new(),
            pending_deletes: AHashMap::new(),
            has_commit,
            dirty: false,
            closed: false,
        })
    }

    /// Add a document. May flush a new segment.
    pub fn add_document(&mut self, doc: Document) -> Result<()> {
        self.check_closed()?;

        let indexed = self.invert_document(&doc)?;
        self.buffered_docs.push(indexed);
        if self.buffered_docs.len() >= self.config.max_buffered_docs {
            self.flush()?;
        }
        Ok(())
    }

    fn invert_document(&mut self, doc: &Document) -> Result<IndexedDoc> {
        let mut indexed = IndexedDoc::default();
        let mut vectors: BTreeMap<u32, (FieldVector, BTreeMap<Vec<u8>, VectorTerm>)> =
            BTreeMap::new();
        // next position and offset base per field, for repeated field names
        let mut bases: AHashMap<u32, (usize, usize)> = AHashMap::new();

        for field in doc.fields() {
            let field_type = &field.field_type;
            let number = self.field_infos.add_or_update(&field.name, field_type);

            if field_type.stored {
                indexed.stored.push(StoredField {
                    field_number: number,
                    value: field.value.clone(),
                });
            }
            if !field_type.indexed {
                continue;
            }

            let tokens: Vec<Token> = match (&field.tokens, field.value.index_text()) {
                (Some(tokens), _) => tokens.clone(),
                (None, Some(text)) if field_type.tokenized => {
                    self.config.analyzer.analyze(&text)?.collect()
                }
                (None, Some(text)) => {
                    let len = text.len();
                    vec![Token::with_offsets(text, 0, 0, len)]
                }
                (None, None) => {
                    return Err(SarissaError::field(format!(
                        "field {:?} is indexed but has no indexable value",
                        field.name
                    )));
                }
            };

            let (position_base, offset_base) = bases.get(&number).copied().unwrap_or((0, 0));
            let mut next_position = position_base;
            let mut max_end = offset_base;
            for token in &tokens {
                let position = position_base + token.position;
                let start = offset_base + token.start_offset;
                let end = offset_base + token.end_offset;
                next_position = next_position.max(position + 1);
                max_end = max_end.max(end);

                let occurrences = indexed
                    .terms
                    .entry((number, token.text.as_bytes().to_vec()))
                    .or_insert_with(DocTerm::default);
                occurrences.freq += 1;
                occurrences.positions.push(position as u32);

                if field_type.store_term_vectors {
                    let (_, terms) = vectors.entry(number).or_insert_with(|| {
                        (
                            FieldVector {
                                field_number: number,
                                has_positions: field_type.store_term_vector_positions,
                                has_offsets: field_type.store_term_vector_offsets,
                                terms: Vec::new(),
                            },
                            BTreeMap::new(),
                        )
                    });
                    let vector_term =
                        terms
                            .entry(token.text.as_bytes().to_vec())
                            .or_insert_with(|| VectorTerm {
                                term: token.text.as_bytes().to_vec(),
                                freq: 0,
                                positions: Vec::new(),
                                offsets: Vec::new(),
                            });
                    vector_term.freq += 1;
                    if field_type.store_term_vector_positions {
                        vector_term.positions.push(position as i64);
                    }
                    if field_type.store_term_vector_offsets {
                        vector_term.offsets.push((start as i64, end as i64));
                    }
                }
            }
            bases.insert(number, (next_position, max_end));
            *indexed.norms.entry(number).or_insert(0) += tokens.len() as u32;
        }

        for occurrences in indexed.terms.values_mut() {
            occurrences.positions.sort_unstable();
        }
        indexed.vectors = vectors
            .into_values()
            .map(|(mut vector, terms)| {
                vector.terms = terms.into_values().collect();
                vector
            })
            .collect();
        Ok(indexed)
    }

    /// Write buffered documents as a new segment.
    pub fn flush(&mut self) -> Result<()> {
        self.check_closed()?;
        if self.buffered_docs.is_empty() {
            return Ok(());
        }

        let name = self.next_segment_name();
        let docs = std::mem::take(&mut self.buffered_docs);
        let field_infos = std::mem::take(&mut self.field_infos);
        let files = write_segment(self.storage.as_ref(), &name, &field_infos, &docs)?;

        info!("flushed segment {name} with {} docs", docs.len());
        self.commit.segments.push(SegmentDescriptor {
            name,
            max_doc: docs.len() as u32,
            del_count: 0,
            del_gen: 0,
            diagnostics: diagnostics("flush"),
            files,
        });
        self.dirty = true;
        Ok(())
    }

    fn next_segment_name(&mut self) -> String {
        let name = segment_name(self.commit.counter);
        self.commit.counter += 1;
        name
    }

    /// Delete every document whose `field` contains `term`.
    ///
    /// Buffered documents are flushed first. Returns the number of documents
    /// newly deleted. Deletions become durable on the next commit.
    pub fn delete_documents(&mut self, field: &str, term: &str) -> Result<u64> {
        self.check_closed()?;
        self.flush()?;

        let mut deleted = 0u64;
        for descriptor in self.commit.segments.clone() {
            let reader = self.open_reader(&descriptor)?;
            let doc_ids = reader.docs_with_term(field, term.as_bytes())?;
            if doc_ids.is_empty() {
                continue;
            }

            let mut live_docs = reader.live_docs().clone();
            for doc_id in doc_ids {
                if live_docs.delete_document(doc_id)? {
                    deleted += 1;
                }
            }
            if live_docs.deleted_count() != reader.live_docs().deleted_count() {
                self.pending_deletes.insert(descriptor.name.clone(), live_docs);
                self.dirty = true;
            }
        }

        debug!("deleted {deleted} docs matching {field}:{term}");
        Ok(deleted)
    }

    fn open_reader(&self, descriptor: &SegmentDescriptor) -> Result<SegmentReader> {
        let reader = SegmentReader::open(Arc::clone(&self.storage), descriptor)?;
        Ok(match self.pending_deletes.get(&descriptor.name) {
            Some(live_docs) => reader.with_live_docs(live_docs.clone()),
            None => reader,
        })
    }

    /// Merge segments until at most `max_num_segments` remain.
    ///
    /// The trailing segments are merged into one; deleted documents are
    /// dropped.
    pub fn force_merge(&mut self, max_num_segments: usize) -> Result<()> {
        self.check_closed()?;
        if max_num_segments == 0 {
            return Err(SarissaError::invalid_operation(
                "max_num_segments must be at least 1",
            ));
        }
        self.flush()?;

        let count = self.commit.segments.len();
        if count <= max_num_segments {
            return Ok(());
        }
        let first = max_num_segments - 1;
        let sources: Vec<SegmentDescriptor> = self.commit.segments.drain(first..).collect();

        let mut merged_infos = FieldInfos::new();
        let mut merged_docs = Vec::new();
        for descriptor in &sources {
            let reader = self.open_reader(descriptor)?;
            let mapping: Vec<u32> = reader
                .field_infos()
                .iter()
                .map(|info| merged_infos.add_info(info.clone()))
                .collect();
            for doc in reader.load_live_documents()? {
                merged_docs.push(doc.renumber_fields(&mapping));
            }
            self.pending_deletes.remove(&descriptor.name);
        }

        let name = self.next_segment_name();
        let files = write_segment(self.storage.as_ref(), &name, &merged_infos, &merged_docs)?;
        info!(
            "merged {} segments into {name} with {} docs",
            sources.len(),
            merged_docs.len()
        );

        let mut diagnostics = diagnostics("merge");
        diagnostics.insert(
            "merge_max_num_segments".to_string(),
            max_num_segments.to_string(),
        );
        self.commit.segments.push(SegmentDescriptor {
            name,
            max_doc: merged_docs.len() as u32,
            del_count: 0,
            del_gen: 0,
            diagnostics,
            files,
        });
        self.dirty = true;
        Ok(())
    }

    /// Make all changes durable in a new commit point.
    pub fn commit(&mut self) -> Result<()> {
        self.check_closed()?;
        self.flush()?;
        if !self.dirty && self.has_commit {
            return Ok(());
        }

        let pending = std::mem::take(&mut self.pending_deletes);
        for descriptor in &mut self.commit.segments {
            let Some(live_docs) = pending.get(&descriptor.name) else {
                continue;
            };
            let del_gen = descriptor.del_gen + 1;
            let file_name = live_docs.write(self.storage.as_ref(), &descriptor.name, del_gen)?;
            descriptor.files.retain(|f| !f.ends_with(".liv"));
            descriptor.files.push(file_name);
            descriptor.del_gen = del_gen;
            descriptor.del_count = live_docs.deleted_count();
        }

        self.commit.generation += 1;
        self.commit.write(self.storage.as_ref())?;
        self.has_commit = true;
        self.dirty = false;
        info!(
            "committed {} ({} segments)",
            self.commit.file_name(),
            self.commit.segments.len()
        );

        self.delete_unreferenced_files()
    }

    fn delete_unreferenced_files(&self) -> Result<()> {
        let referenced = self.commit.referenced_files();
        for file in self.storage.list_files()? {
            let index_file = file.starts_with('_')
                || file.starts_with(crate::index::codec::SEGMENTS_PREFIX)
                || file.starts_with(crate::index::codec::PENDING_SEGMENTS_PREFIX);
            if index_file && !referenced.contains(&file) {
                debug!("deleting unreferenced file {file}");
                self.storage.delete_file(&file)?;
            }
        }
        Ok(())
    }

    /// Segments as of the last flush, merge or commit.
    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.commit.segments
    }

    /// Get the number of buffered documents.
    pub fn pending_docs(&self) -> usize {
        self.buffered_docs.len()
    }

    /// Commit and release the write lock. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.commit();
        self.closed = true;
        if let Some(mut lock) = self.lock.take() {
            lock.release()?;
        }
        result
    }

    /// Check if the writer is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            Err(SarissaError::invalid_operation("Writer is closed"))
        } else {
            Ok(())
        }
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Provenance recorded with every new segment.
fn diagnostics(source: &str) -> BTreeMap<String, String> {
    let mut diagnostics = BTreeMap::new();
    diagnostics.insert("source".to_string(), source.to_string());
    diagnostics.insert("os".to_string(), std::env::consts::OS.to_string());
    diagnostics.insert("os.arch".to_string(), std::env::consts::ARCH.to_string());
    diagnostics.insert("sarissa.version".to_string(), crate::VERSION.to_string());
    diagnostics.insert("timestamp".to_string(), chrono::Utc::now().to_rfc3339());
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Field, FieldType};
    use crate::storage::memory::MemoryStorage;

    fn memory_storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new_default())
    }

    fn doc(text: &str) -> Document {
        Document::builder()
            .add_text("field", text, FieldType::TEXT_STORED)
            .build()
    }

    #[test]
    fn test_second_writer_fails_fast() {
        let storage = memory_storage();
        let _writer = IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default()).unwrap();
        assert!(matches!(
            IndexWriter::open(storage, IndexWriterConfig::default()),
            Err(SarissaError::LockObtainFailed(_))
        ));
    }

    #[test]
    fn test_flush_threshold() {
        let storage = memory_storage();
        let config = IndexWriterConfig::default().with_max_buffered_docs(2);
        let mut writer = IndexWriter::open(Arc::clone(&storage), config).unwrap();
        for i in 0..5 {
            writer.add_document(doc(&format!("aaa{i}"))).unwrap();
        }
        assert_eq!(writer.segments().len(), 2);
        assert_eq!(writer.pending_docs(), 1);

        writer.commit().unwrap();
        let names: Vec<&str> = writer.segments().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["_0", "_1", "_2"]);
        assert_eq!(writer.segments()[0].diagnostics["source"], "flush");
    }

    #[test]
    fn test_delete_and_merge() {
        let storage = memory_storage();
        let config = IndexWriterConfig::default().with_max_buffered_docs(2);
        let mut writer = IndexWriter::open(Arc::clone(&storage), config).unwrap();
        for i in 0..5 {
            writer.add_document(doc(&format!("aaa{i}"))).unwrap();
        }
        assert_eq!(writer.delete_documents("field", "aaa1").unwrap(), 1);
        assert_eq!(writer.delete_documents("field", "aaa1").unwrap(), 0);
        assert_eq!(writer.delete_documents("missing", "aaa1").unwrap(), 0);

        writer.force_merge(1).unwrap();
        writer.commit().unwrap();

        let segment = &writer.segments()[0];
        assert_eq!(writer.segments().len(), 1);
        assert_eq!(segment.max_doc, 4);
        assert_eq!(segment.diagnostics["source"], "merge");
        assert_eq!(segment.diagnostics["merge_max_num_segments"], "1");

        // the flushed segments are gone after the commit
        assert!(!storage.file_exists("_0.fnm"));
        assert!(storage.file_exists(&format!("{}.fnm", segment.name)));
    }

    #[test]
    fn test_deletions_written_on_commit() {
        let storage = memory_storage();
        let mut writer =
            IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default()).unwrap();
        writer.add_document(doc("aaa0")).unwrap();
        writer.add_document(doc("aaa1")).unwrap();
        writer.commit().unwrap();

        writer.delete_documents("field", "aaa0").unwrap();
        writer.close().unwrap();
        writer.close().unwrap();

        let commit = CommitPoint::read_latest(storage.as_ref()).unwrap();
        let segment = &commit.segments[0];
        assert_eq!(segment.del_gen, 1);
        assert_eq!(segment.del_count, 1);
        assert!(segment.files.contains(&"_0_1.liv".to_string()));
        assert!(!storage.lock_manager().lock_exists(WRITE_LOCK_NAME));
    }

    #[test]
    fn test_canned_tokens_keep_offsets() {
        let storage = memory_storage();
        let mut writer =
            IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default()).unwrap();
        let field_type = FieldType::TEXT_NOT_STORED.with_term_vectors(false, true);
        let mut document = Document::new();
        document.add(Field::text("foo", "", field_type).with_tokens(vec![
            Token::with_offsets("bar", 0, 5, 10),
            Token::with_offsets("bar", 1, 1, 4),
        ]));

        let indexed = writer.invert_document(&document).unwrap();
        let term = &indexed.vectors[0].terms[0];
        assert_eq!(term.freq, 2);
        assert_eq!(term.offsets, vec![(5, 10), (1, 4)]);
        assert_eq!(indexed.norms[&0], 2);
        assert_eq!(indexed.terms[&(0, b"bar".to_vec())].positions, vec![0, 1]);
    }

    #[test]
    fn test_closed_writer_rejects_documents() {
        let mut writer =
            IndexWriter::open(memory_storage(), IndexWriterConfig::default()).unwrap();
        writer.close().unwrap();
        assert!(writer.add_document(doc("x")).is_err());
    }
}
