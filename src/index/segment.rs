//! In-memory form of a segment's documents and the code that writes it.
//!
//! Flushing buffered documents and merging existing segments both end in
//! [`write_segment`]: merges decode the source segments back into
//! [`IndexedDoc`]s, renumber their fields and write them out again.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::index::field_infos::FieldInfos;
use crate::index::norms::{NormsEntry, write_norms};
use crate::index::postings::{InvertedFields, Posting, write_postings};
use crate::index::stored_fields::{StoredField, write_stored_fields};
use crate::index::term_vectors::{FieldVector, write_term_vectors};
use crate::storage::Storage;

/// Occurrences of one term in one document field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocTerm {
    pub freq: u32,
    pub positions: Vec<u32>,
}

/// Everything the index keeps about one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedDoc {
    pub stored: Vec<StoredField>,
    /// Field number -> length norm.
    pub norms: BTreeMap<u32, u32>,
    /// (field number, term) -> occurrences.
    pub terms: BTreeMap<(u32, Vec<u8>), DocTerm>,
    pub vectors: Vec<FieldVector>,
}

impl IndexedDoc {
    /// Rewrite field numbers through `mapping` (old number -> new number).
    pub fn renumber_fields(self, mapping: &[u32]) -> IndexedDoc {
        let map = |number: u32| mapping.get(number as usize).copied().unwrap_or(number);

        IndexedDoc {
            stored: self
                .stored
                .into_iter()
                .map(|field| StoredField {
                    field_number: map(field.field_number),
                    ..field
                })
                .collect(),
            norms: self
                .norms
                .into_iter()
                .map(|(number, norm)| (map(number), norm))
                .collect(),
            terms: self
                .terms
                .into_iter()
                .map(|((number, term), occurrences)| ((map(number), term), occurrences))
                .collect(),
            vectors: self
                .vectors
                .into_iter()
                .map(|vector| FieldVector {
                    field_number: map(vector.field_number),
                    ..vector
                })
                .collect(),
        }
    }
}

/// Write every file of a segment and return the file names.
pub fn write_segment(
    storage: &dyn Storage,
    segment: &str,
    field_infos: &FieldInfos,
    docs: &[IndexedDoc],
) -> Result<Vec<String>> {
    let mut files = vec![field_infos.write(storage, segment)?];

    let norms: Vec<NormsEntry> = field_infos
        .iter()
        .filter(|info| info.has_norms())
        .map(|info| NormsEntry {
            field_number: info.number,
            values: docs
                .iter()
                .map(|doc| doc.norms.get(&info.number).copied().unwrap_or(0))
                .collect(),
        })
        .collect();
    files.push(write_norms(storage, segment, &norms)?);

    let mut inverted = InvertedFields::new();
    for (doc_id, doc) in docs.iter().enumerate() {
        for ((field_number, term), occurrences) in &doc.terms {
            let indexed = field_infos
                .by_number(*field_number)
                .is_some_and(|info| info.indexed);
            if !indexed {
                continue;
            }
            inverted
                .entry(*field_number)
                .or_default()
                .entry(term.clone())
                .or_default()
                .push(Posting {
                    doc_id: doc_id as u32,
                    freq: occurrences.freq,
                    positions: occurrences.positions.clone(),
                });
        }
    }
    files.extend(write_postings(storage, segment, field_infos, &inverted)?);

    let stored: Vec<Vec<StoredField>> = docs.iter().map(|doc| doc.stored.clone()).collect();
    files.extend(write_stored_fields(storage, segment, &stored)?);

    let vectors: Vec<Vec<FieldVector>> = docs.iter().map(|doc| doc.vectors.clone()).collect();
    files.extend(write_term_vectors(storage, segment, &vectors)?);

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::field::{FieldType, FieldValue};
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_renumber_fields() {
        let mut doc = IndexedDoc::default();
        doc.stored.push(StoredField {
            field_number: 0,
            value: FieldValue::Text("x".to_string()),
        });
        doc.norms.insert(0, 1);
        doc.terms.insert((0, b"x".to_vec()), DocTerm::default());

        let doc = doc.renumber_fields(&[3]);
        assert_eq!(doc.stored[0].field_number, 3);
        assert!(doc.norms.contains_key(&3));
        assert!(doc.terms.contains_key(&(3, b"x".to_vec())));
    }

    #[test]
    fn test_write_segment_files() {
        let storage = MemoryStorage::new_default();
        let mut infos = FieldInfos::new();
        infos.add_or_update("body", &FieldType::TEXT_STORED);

        let mut doc = IndexedDoc::default();
        doc.norms.insert(0, 1);
        doc.terms.insert(
            (0, b"hello".to_vec()),
            DocTerm {
                freq: 1,
                positions: vec![0],
            },
        );

        let files = write_segment(&storage, "_0", &infos, &[doc, IndexedDoc::default()]).unwrap();
        assert_eq!(
            files,
            vec!["_0.fnm", "_0.nrm", "_0.tim", "_0.pst", "_0.fdx", "_0.fdt", "_0.tvx", "_0.tvd"]
        );
        for file in &files {
            assert!(storage.file_exists(file));
        }
    }
}
