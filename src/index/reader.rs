//! Read access to one committed segment.

use std::sync::Arc;

use log::debug;

use crate::error::{Result, SarissaError};
use crate::index::codec::{FIELD_INFOS_EXTENSION, live_docs_file_name, segment_file_name};
use crate::index::commit::SegmentDescriptor;
use crate::index::field_infos::FieldInfos;
use crate::index::live_docs::LiveDocs;
use crate::index::norms::NormsReader;
use crate::index::postings::{PostingsReader, TermDictionaryReader, read_inverted_fields};
use crate::index::segment::{DocTerm, IndexedDoc};
use crate::index::stored_fields::StoredFieldsReader;
use crate::index::term_vectors::TermVectorsReader;
use crate::storage::Storage;
use crate::storage::structured::verify_footer;

/// A segment with its metadata loaded.
///
/// Opening only reads field infos and the deletions bitmap. Content files are
/// opened on demand by the `*_reader` methods, each returning a decoder that
/// owns its input and closes it when dropped.
#[derive(Debug)]
pub struct SegmentReader {
    storage: Arc<dyn Storage>,
    descriptor: SegmentDescriptor,
    field_infos: FieldInfos,
    live_docs: LiveDocs,
}

impl SegmentReader {
    /// Open a segment, verifying and decoding its metadata files.
    pub fn open(storage: Arc<dyn Storage>, descriptor: &SegmentDescriptor) -> Result<Self> {
        let fnm = segment_file_name(&descriptor.name, FIELD_INFOS_EXTENSION);
        verify_file(storage.as_ref(), &fnm)?;
        let field_infos = FieldInfos::read(storage.as_ref(), &descriptor.name)?;

        let live_docs = if descriptor.has_deletions() {
            let liv = live_docs_file_name(&descriptor.name, descriptor.del_gen);
            verify_file(storage.as_ref(), &liv)?;
            let live_docs = LiveDocs::read(
                storage.as_ref(),
                &descriptor.name,
                descriptor.del_gen,
                descriptor.max_doc,
            )?;
            if live_docs.deleted_count() != descriptor.del_count {
                return Err(SarissaError::inconsistency(format!(
                    "{liv}: {} deleted docs but the commit point says {}",
                    live_docs.deleted_count(),
                    descriptor.del_count
                )));
            }
            live_docs
        } else {
            if descriptor.del_count != 0 {
                return Err(SarissaError::inconsistency(format!(
                    "segment {} has del_count {} but no deletions file",
                    descriptor.name, descriptor.del_count
                )));
            }
            LiveDocs::all_live(descriptor.max_doc)
        };

        debug!(
            "opened segment {} ({} fields, {} live of {})",
            descriptor.name,
            field_infos.len(),
            live_docs.live_count(),
            descriptor.max_doc
        );

        Ok(SegmentReader {
            storage,
            descriptor: descriptor.clone(),
            field_infos,
            live_docs,
        })
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Catalog entry this reader was opened from.
    pub fn descriptor(&self) -> &SegmentDescriptor {
        &self.descriptor
    }

    /// Total documents, deleted included.
    pub fn max_doc(&self) -> u32 {
        self.descriptor.max_doc
    }

    /// Documents that are not deleted.
    pub fn num_docs(&self) -> u32 {
        self.live_docs.live_count()
    }

    pub fn field_infos(&self) -> &FieldInfos {
        &self.field_infos
    }

    pub fn live_docs(&self) -> &LiveDocs {
        &self.live_docs
    }

    /// Replace the deletions with an uncommitted view.
    pub fn with_live_docs(mut self, live_docs: LiveDocs) -> Self {
        self.live_docs = live_docs;
        self
    }

    /// Ids of the live documents, ascending.
    pub fn live_doc_ids(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.max_doc()).filter(|&doc| self.live_docs.is_live(doc))
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn norms_reader(&self) -> Result<NormsReader> {
        NormsReader::open(self.storage(), self.name())
    }

    pub fn term_dictionary(&self) -> Result<TermDictionaryReader> {
        TermDictionaryReader::open(self.storage(), self.name())
    }

    pub fn postings_reader(&self) -> Result<PostingsReader> {
        PostingsReader::open(self.storage(), self.name())
    }

    pub fn stored_fields_reader(&self) -> Result<StoredFieldsReader> {
        StoredFieldsReader::open(self.storage(), self.name())
    }

    pub fn term_vectors_reader(&self) -> Result<TermVectorsReader> {
        TermVectorsReader::open(self.storage(), self.name())
    }

    /// Documents (live or not) containing `term` in `field`.
    pub fn docs_with_term(&self, field: &str, term: &[u8]) -> Result<Vec<u32>> {
        let Some(info) = self.field_infos.by_name(field) else {
            return Ok(Vec::new());
        };
        if !info.indexed {
            return Ok(Vec::new());
        }

        let mut dictionary = self.term_dictionary()?;
        let mut postings = self.postings_reader()?;
        while let Some(header) = dictionary.next_field()? {
            for _ in 0..header.term_count {
                let entry = dictionary.next_term()?;
                if header.field_number == info.number && entry.term == term {
                    let docs = postings
                        .read_postings(
                            entry.postings_offset,
                            info.has_freqs(),
                            info.has_positions(),
                        )?
                        .into_iter()
                        .map(|posting| posting.doc_id)
                        .collect();
                    return Ok(docs);
                }
            }
        }
        Ok(Vec::new())
    }

    /// Decode every live document back into its in-memory form.
    pub fn load_live_documents(&self) -> Result<Vec<IndexedDoc>> {
        let max_doc = self.max_doc() as usize;
        let mut docs = vec![IndexedDoc::default(); max_doc];

        let mut norms = self.norms_reader()?;
        while let Some(entry) = norms.next_entry()? {
            for (doc_id, value) in entry.values.into_iter().enumerate().take(max_doc) {
                docs[doc_id].norms.insert(entry.field_number, value);
            }
        }

        let inverted = read_inverted_fields(self.storage(), self.name(), &self.field_infos)?;
        for (field_number, terms) in inverted {
            for (term, postings) in terms {
                for posting in postings {
                    let doc = docs.get_mut(posting.doc_id as usize).ok_or_else(|| {
                        SarissaError::corruption(format!(
                            "segment {}: posting for doc {} beyond maxDoc {max_doc}",
                            self.name(),
                            posting.doc_id
                        ))
                    })?;
                    doc.terms.insert(
                        (field_number, term.clone()),
                        DocTerm {
                            freq: posting.freq,
                            positions: posting.positions,
                        },
                    );
                }
            }
        }

        let mut stored = self.stored_fields_reader()?;
        let mut vectors = self.term_vectors_reader()?;
        let mut live = Vec::with_capacity(self.num_docs() as usize);
        for (doc_id, mut doc) in docs.into_iter().enumerate() {
            let doc_id = doc_id as u32;
            if !self.live_docs.is_live(doc_id) {
                continue;
            }
            doc.stored = stored.document(doc_id)?;
            doc.vectors = vectors.document(doc_id)?;
            live.push(doc);
        }
        Ok(live)
    }
}

fn verify_file(storage: &dyn Storage, file_name: &str) -> Result<()> {
    let mut input = storage.open_input(file_name)?;
    verify_footer(&mut input, file_name)?;
    input.close()
}
