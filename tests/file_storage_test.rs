use std::sync::Arc;

use sarissa_check::check::CheckIndex;
use sarissa_check::document::{Document, FieldType};
use sarissa_check::error::SarissaError;
use sarissa_check::index::{IndexWriter, IndexWriterConfig};
use sarissa_check::storage::Storage;
use sarissa_check::storage::file::{FileStorage, FileStorageConfig};
use tempfile::TempDir;

fn open_storage(dir: &TempDir) -> Arc<dyn Storage> {
    Arc::new(FileStorage::new(dir.path(), FileStorageConfig::new(dir.path())).unwrap())
}

#[test]
fn test_deleted_docs_on_disk() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);

    let config = IndexWriterConfig::default().with_max_buffered_docs(2);
    let mut writer = IndexWriter::open(Arc::clone(&storage), config).unwrap();
    for i in 0..19 {
        let doc = Document::builder()
            .add_text(
                "field",
                format!("aaa{i}"),
                FieldType::TEXT_STORED.with_term_vectors(true, true),
            )
            .build();
        writer.add_document(doc).unwrap();
    }
    writer.force_merge(1).unwrap();
    writer.commit().unwrap();
    writer.delete_documents("field", "aaa5").unwrap();
    writer.close().unwrap();

    // a fresh handle sees only what reached the directory
    let checker = CheckIndex::open(open_storage(&dir)).unwrap();
    let status = checker.check_index().unwrap();
    assert!(status.clean);

    let seg = &status.segments[0];
    assert_eq!(seg.stored_field_status.as_ref().unwrap().doc_count, 18);
    assert_eq!(seg.term_index_status.as_ref().unwrap().term_count, 18);
    assert_eq!(seg.term_vector_status.as_ref().unwrap().tot_vectors, 18);
    assert!(seg.size_bytes > 0);
}

#[test]
fn test_lock_file_is_exclusive_across_handles() {
    let dir = TempDir::new().unwrap();

    let mut writer = IndexWriter::open(open_storage(&dir), IndexWriterConfig::default()).unwrap();
    writer
        .add_document(
            Document::builder()
                .add_text("field", "hello", FieldType::TEXT_STORED)
                .build(),
        )
        .unwrap();
    writer.commit().unwrap();

    assert!(matches!(
        CheckIndex::open(open_storage(&dir)),
        Err(SarissaError::LockObtainFailed(_))
    ));

    writer.close().unwrap();
    let mut checker = CheckIndex::open(open_storage(&dir)).unwrap();
    assert!(checker.check_index().unwrap().clean);
    checker.close().unwrap();
    assert!(!dir.path().join("write.lock").exists());
}
