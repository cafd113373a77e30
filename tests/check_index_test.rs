#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use sarissa_check::analysis::token::Token;
    use sarissa_check::check::{CheckIndex, CheckIndexConfig};
    use sarissa_check::document::{Document, Field, FieldType};
    use sarissa_check::error::SarissaError;
    use sarissa_check::index::{IndexWriter, IndexWriterConfig};
    use sarissa_check::storage::memory::MemoryStorageConfig;
    use sarissa_check::storage::{Storage, StorageConfig, StorageFactory};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    /// Buffer that also counts flushes.
    #[derive(Clone, Default)]
    struct FlushCountingBuffer {
        buffer: SharedBuffer,
        flushes: Arc<AtomicUsize>,
    }

    impl Write for FlushCountingBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl FlushCountingBuffer {
        fn flushes(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }
    }

    fn memory_storage() -> Arc<dyn Storage> {
        StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default())).unwrap()
    }

    fn vectored_doc(text: &str) -> Document {
        Document::builder()
            .add_text(
                "field",
                text,
                FieldType::TEXT_STORED.with_term_vectors(true, true),
            )
            .build()
    }

    /// 19 docs flushed two at a time, merged into one segment, then "aaa5"
    /// deleted.
    fn merged_index_with_one_deletion() -> Arc<dyn Storage> {
        let storage = memory_storage();
        let config = IndexWriterConfig::default().with_max_buffered_docs(2);
        let mut writer = IndexWriter::open(Arc::clone(&storage), config).unwrap();
        for i in 0..19 {
            writer.add_document(vectored_doc(&format!("aaa{i}"))).unwrap();
        }
        writer.force_merge(1).unwrap();
        writer.commit().unwrap();
        assert_eq!(writer.delete_documents("field", "aaa5").unwrap(), 1);
        writer.close().unwrap();
        storage
    }

    #[test]
    fn test_deleted_docs() {
        let storage = merged_index_with_one_deletion();

        let buffer = SharedBuffer::default();
        let mut checker = CheckIndex::open(storage).unwrap();
        checker.set_report_sink(Some(Box::new(buffer.clone())), false);
        let status = checker.check_index().unwrap();
        assert!(status.clean, "{}", buffer.text());
        assert_eq!(status.segments.len(), 1);

        let seg = &status.segments[0];
        assert!(seg.open_reader_passed);
        assert!(seg.has_deletions);
        assert_eq!(seg.max_doc, 19);
        assert_eq!(seg.num_deleted, 1);

        let stored = seg.stored_field_status.as_ref().unwrap();
        assert_eq!(stored.doc_count, 18);
        assert_eq!(stored.tot_fields, 18);

        let terms = seg.term_index_status.as_ref().unwrap();
        assert_eq!(terms.term_count, 18);
        assert_eq!(terms.del_term_count, 1);
        assert_eq!(terms.tot_freq, 18);
        assert_eq!(terms.tot_pos, 18);

        assert_eq!(seg.field_norm_status.as_ref().unwrap().tot_fields, 1);

        let vectors = seg.term_vector_status.as_ref().unwrap();
        assert_eq!(vectors.doc_count, 18);
        assert_eq!(vectors.tot_vectors, 18);

        assert!(!seg.diagnostics.is_empty());
        assert_eq!(seg.diagnostics.get("source").map(String::as_str), Some("merge"));

        let only = checker.check_segments(&[seg.name.as_str()]).unwrap();
        assert!(only.clean);
        assert!(only.partial);
        assert_eq!(only.segments.len(), 1);

        checker.close().unwrap();
        assert!(status.clean);
    }

    #[test]
    fn test_report_lines() {
        let storage = merged_index_with_one_deletion();
        let buffer = SharedBuffer::default();
        let mut checker = CheckIndex::open(storage).unwrap();
        checker.set_report_sink(Some(Box::new(buffer.clone())), true);
        checker.check_index().unwrap();

        let text = buffer.text();
        assert!(text.contains("test: field norms.........OK [1 fields]"));
        assert!(text.contains("test: terms, freq, prox...OK [18 terms; 18 terms/docs pairs; 18 tokens]"));
        assert!(text.contains("has deletions [delGen=1, delCount=1]"));
        assert!(text.contains("No problems were detected with this index."));
    }

    #[test]
    fn test_cross_check_on_clean_index() {
        let storage = merged_index_with_one_deletion();
        let config = CheckIndexConfig::default().with_cross_check_term_vectors(true);
        let checker = CheckIndex::with_config(storage, config).unwrap();
        let status = checker.check_index().unwrap();
        assert!(status.clean);
    }

    #[test]
    fn test_bogus_term_vectors() {
        let storage = memory_storage();
        let mut writer = IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default()).unwrap();

        let field_type = FieldType::TEXT_NOT_STORED.with_term_vectors(false, true);
        let field = Field::text("foo", "", field_type).with_tokens(vec![
            Token::with_offsets("bar", 0, 5, 10),
            Token::with_offsets("bar", 1, 1, 4),
        ]);
        let mut doc = Document::new();
        doc.add(field.clone());
        doc.add(field);
        writer.add_document(doc).unwrap();
        writer.close().unwrap();

        let checker = CheckIndex::open(storage).unwrap();
        let status = checker.check_index().unwrap();
        assert!(status.clean);

        let vectors = status.segments[0].term_vector_status.as_ref().unwrap();
        assert!(vectors.error.is_none());
        assert_eq!(vectors.doc_count, 1);
        assert_eq!(vectors.tot_vectors, 1);
    }

    #[test]
    fn test_obtains_lock() {
        let storage = memory_storage();
        let mut writer = IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default()).unwrap();
        writer.add_document(vectored_doc("foo")).unwrap();
        writer.commit().unwrap();

        // the writer still holds the lock
        assert!(matches!(
            CheckIndex::open(Arc::clone(&storage)),
            Err(SarissaError::LockObtainFailed(_))
        ));

        writer.close().unwrap();
        let mut checker = CheckIndex::open(Arc::clone(&storage)).unwrap();
        assert!(matches!(
            IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default()),
            Err(SarissaError::LockObtainFailed(_))
        ));
        checker.close().unwrap();
    }

    #[test]
    fn test_unknown_segment_name_is_ignored() {
        let storage = memory_storage();
        let config = IndexWriterConfig::default().with_max_buffered_docs(1);
        let mut writer = IndexWriter::open(Arc::clone(&storage), config).unwrap();
        for text in ["aaa", "bbb"] {
            writer.add_document(vectored_doc(text)).unwrap();
        }
        writer.close().unwrap();

        let checker = CheckIndex::open(storage).unwrap();
        let status = checker.check_segments(&["_1", "_missing"]).unwrap();
        assert!(status.clean);
        assert_eq!(status.num_segments, 2);
        assert_eq!(status.segments_checked, vec!["_1", "_missing"]);
        let names: Vec<&str> = status.segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["_1"]);

        let none = checker.check_segments(&["_missing"]).unwrap();
        assert!(none.clean);
        assert!(none.segments.is_empty());
    }

    #[test]
    fn test_parallel_check_keeps_catalog_order() {
        let storage = memory_storage();
        let config = IndexWriterConfig::default().with_max_buffered_docs(3);
        let mut writer = IndexWriter::open(Arc::clone(&storage), config).unwrap();
        for i in 0..20 {
            writer.add_document(vectored_doc(&format!("doc {i} text"))).unwrap();
        }
        writer.close().unwrap();

        let sequential = CheckIndex::open(Arc::clone(&storage))
            .unwrap()
            .check_index()
            .unwrap();

        let buffer = SharedBuffer::default();
        let mut checker =
            CheckIndex::with_config(storage, CheckIndexConfig::default().with_threads(4)).unwrap();
        checker.set_report_sink(Some(Box::new(buffer.clone())), false);
        let parallel = checker.check_index().unwrap();

        assert_eq!(parallel.segments.len(), 7);
        let names: Vec<&str> = parallel.segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["_0", "_1", "_2", "_3", "_4", "_5", "_6"]);
        for (a, b) in sequential.segments.iter().zip(&parallel.segments) {
            assert_eq!(a.term_index_status, b.term_index_status);
            assert_eq!(a.stored_field_status, b.stored_field_status);
        }

        let text = buffer.text();
        for line in text.lines().filter(|line| line.contains("test: ")) {
            assert!(line.starts_with("[_"), "unattributed line: {line}");
        }
    }

    #[test]
    fn test_status_serializes_to_json() {
        let storage = merged_index_with_one_deletion();
        let checker = CheckIndex::open(storage).unwrap();
        let status = checker.check_index().unwrap();

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["clean"], true);
        assert_eq!(value["segments"][0]["stored_field_status"]["doc_count"], 18);
    }

    #[test]
    fn test_flush_mode_does_not_change_result() {
        let storage = merged_index_with_one_deletion();

        let per_line = FlushCountingBuffer::default();
        let mut checker = CheckIndex::open(Arc::clone(&storage)).unwrap();
        checker.set_report_sink(Some(Box::new(per_line.clone())), true);
        let flushed_status = checker.check_index().unwrap();
        // every "test:" line is written on its own and flushed
        let test_lines = per_line.buffer.text().matches("test: ").count();
        assert!(test_lines > 0);
        assert!(per_line.flushes() > test_lines);
        checker.close().unwrap();

        let buffered = FlushCountingBuffer::default();
        let mut checker = CheckIndex::open(storage).unwrap();
        checker.set_report_sink(Some(Box::new(buffered.clone())), false);
        let buffered_status = checker.check_index().unwrap();
        // only the end of the run flushes
        assert_eq!(buffered.flushes(), 1);
        checker.close().unwrap();
        assert_eq!(buffered.flushes(), 2);

        assert_eq!(flushed_status, buffered_status);
        assert_eq!(per_line.buffer.text(), buffered.buffer.text());
    }

    #[test]
    fn test_empty_document() {
        let storage = memory_storage();
        let mut writer = IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default()).unwrap();
        writer.add_document(Document::new()).unwrap();
        writer.add_document(vectored_doc("foo")).unwrap();
        writer.close().unwrap();

        let checker = CheckIndex::open(storage).unwrap();
        let status = checker.check_index().unwrap();
        assert!(status.clean);

        let seg = &status.segments[0];
        assert_eq!(seg.max_doc, 2);
        assert_eq!(seg.stored_field_status.as_ref().unwrap().doc_count, 2);
        assert_eq!(seg.stored_field_status.as_ref().unwrap().tot_fields, 1);
        assert_eq!(seg.term_index_status.as_ref().unwrap().term_count, 1);
        assert_eq!(seg.term_vector_status.as_ref().unwrap().tot_vectors, 1);
    }

    #[test]
    fn test_only_empty_documents() {
        let storage = memory_storage();
        let mut writer = IndexWriter::open(Arc::clone(&storage), IndexWriterConfig::default()).unwrap();
        writer.add_document(Document::new()).unwrap();
        writer.close().unwrap();

        let checker = CheckIndex::open(storage).unwrap();
        let status = checker.check_index().unwrap();
        assert!(status.clean);

        let stored = status.segments[0].stored_field_status.as_ref().unwrap();
        assert_eq!(stored.doc_count, 1);
        assert_eq!(stored.tot_fields, 0);
        assert_eq!(status.segments[0].term_index_status.as_ref().unwrap().term_count, 0);
    }
}
