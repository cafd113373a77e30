//! Term vector verification.
//!
//! Block framing is strict: a truncated block, a bad length prefix or an
//! unreadable varint is an error. Within an intact block, positions and
//! offsets that go backwards (or end before they start) are accepted as
//! written by older writers. Terms must still sort, frequencies must be
//! positive and no absolute position or start offset may be negative.

use ahash::AHashMap;
use log::debug;

use crate::check::report::SegmentReport;
use crate::check::status::TermVectorStatus;
use crate::index::postings::{Posting, read_inverted_fields};
use crate::index::reader::SegmentReader;
use crate::index::term_vectors::{FieldVector, decode_block};

/// Postings of a segment keyed by (field number, term).
type PostingsIndex = AHashMap<(u32, Vec<u8>), Vec<Posting>>;

/// Verify the term vectors of every live document.
///
/// With `cross_check`, each vector term's frequency is compared with the
/// postings of the same field and document.
pub fn verify_term_vectors(
    reader: &SegmentReader,
    cross_check: bool,
    report: &SegmentReport<'_>,
) -> TermVectorStatus {
    let mut status = TermVectorStatus::default();

    let mut vectors = match reader.term_vectors_reader() {
        Ok(vectors) => vectors,
        Err(e) => {
            report.fault(&mut status, format!("cannot open term vectors: {e}"));
            report.line("    test: term vectors........FAILED");
            return status;
        }
    };

    if vectors.doc_count() != reader.max_doc() as usize {
        report.fault(
            &mut status,
            format!(
                "term vectors index has {} docs but maxDoc is {}",
                vectors.doc_count(),
                reader.max_doc()
            ),
        );
    }

    let postings = if cross_check {
        load_postings(reader, &mut status, report)
    } else {
        None
    };

    for doc in reader.live_doc_ids() {
        let fields = match vectors
            .raw_block(doc)
            .and_then(|block| decode_block(&block))
        {
            Ok(fields) => fields,
            Err(e) => {
                report.fault(&mut status, format!("term vectors of doc {doc}: {e}"));
                continue;
            }
        };

        for field in &fields {
            check_field_vector(reader, doc, field, &mut status, report);
            if let Some(postings) = &postings {
                cross_check_field(doc, field, postings, reader, &mut status, report);
            }
        }
        if !fields.is_empty() {
            status.doc_count += 1;
            status.tot_vectors += fields.len() as u64;
        }
    }

    match &status.error {
        None => {
            let avg = if status.doc_count == 0 {
                0.0
            } else {
                status.tot_vectors as f64 / status.doc_count as f64
            };
            report.line(&format!(
                "    test: term vectors........OK [{} total vector count; avg {avg:.1} term/freq vector fields per doc]",
                status.tot_vectors
            ));
        }
        Some(_) => report.line("    test: term vectors........FAILED"),
    }
    status
}

fn check_field_vector(
    reader: &SegmentReader,
    doc: u32,
    field: &FieldVector,
    status: &mut TermVectorStatus,
    report: &SegmentReport<'_>,
) {
    let Some(info) = reader.field_infos().by_number(field.field_number) else {
        report.fault(
            status,
            format!(
                "doc {doc} has a term vector for unknown field number {}",
                field.field_number
            ),
        );
        return;
    };
    let context = format!("doc {doc} field '{}'", info.name);

    if !info.store_term_vectors {
        report.fault(
            status,
            format!("{context}: term vector for a field that does not store them"),
        );
        return;
    }
    if field.has_positions != info.store_term_vector_positions
        || field.has_offsets != info.store_term_vector_offsets
    {
        report.fault(
            status,
            format!(
                "{context}: vector flags (positions {}, offsets {}) disagree with the field (positions {}, offsets {})",
                field.has_positions,
                field.has_offsets,
                info.store_term_vector_positions,
                info.store_term_vector_offsets
            ),
        );
    }

    let mut prev_term: Option<&[u8]> = None;
    for term in &field.terms {
        let text = String::from_utf8_lossy(&term.term);
        if prev_term.is_some_and(|prev| prev >= term.term.as_slice()) {
            report.fault(status, format!("{context}: term '{text}' out of order"));
        }
        prev_term = Some(&term.term);

        if term.freq == 0 {
            report.fault(status, format!("{context}: term '{text}' has frequency 0"));
        }
        if let Some(position) = term.positions.iter().find(|&&position| position < 0) {
            report.fault(
                status,
                format!("{context}: term '{text}' has negative position {position}"),
            );
        }
        if let Some((start, _)) = term.offsets.iter().find(|(start, _)| *start < 0) {
            report.fault(
                status,
                format!("{context}: term '{text}' has negative start offset {start}"),
            );
        }
    }
}

fn load_postings(
    reader: &SegmentReader,
    status: &mut TermVectorStatus,
    report: &SegmentReport<'_>,
) -> Option<PostingsIndex> {
    match read_inverted_fields(reader.storage(), reader.name(), reader.field_infos()) {
        Ok(fields) => {
            let mut index = PostingsIndex::new();
            for (field_number, terms) in fields {
                for (term, postings) in terms {
                    index.insert((field_number, term), postings);
                }
            }
            debug!(
                "segment {}: loaded {} postings lists for cross-check",
                reader.name(),
                index.len()
            );
            Some(index)
        }
        Err(e) => {
            report.fault(
                status,
                format!("cannot load postings to cross-check term vectors: {e}"),
            );
            None
        }
    }
}

fn cross_check_field(
    doc: u32,
    field: &FieldVector,
    postings: &PostingsIndex,
    reader: &SegmentReader,
    status: &mut TermVectorStatus,
    report: &SegmentReport<'_>,
) {
    let Some(info) = reader.field_infos().by_number(field.field_number) else {
        return;
    };
    if !info.indexed {
        return;
    }

    for term in &field.terms {
        let text = String::from_utf8_lossy(&term.term);
        let posting = postings
            .get(&(field.field_number, term.term.clone()))
            .and_then(|list| {
                list.binary_search_by_key(&doc, |posting| posting.doc_id)
                    .ok()
                    .map(|index| &list[index])
            });

        match posting {
            None => report.fault(
                status,
                format!(
                    "doc {doc} field '{}': vector term '{text}' has no posting for this doc",
                    info.name
                ),
            ),
            Some(posting) if info.has_freqs() && posting.freq != term.freq => report.fault(
                status,
                format!(
                    "doc {doc} field '{}': vector term '{text}' has frequency {} but postings say {}",
                    info.name, term.freq, posting.freq
                ),
            ),
            Some(_) => {}
        }
    }
}
