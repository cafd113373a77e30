//! Term dictionary and postings verification.
//!
//! Walks every field of the term dictionary in file order and decodes the
//! postings list of each term. Faults carry the field, the term and the file
//! offset. Only a broken dictionary frame stops the walk, every other fault
//! moves on to the next term.

use log::debug;

use crate::check::report::SegmentReport;
use crate::check::status::TermIndexStatus;
use crate::index::field_infos::FieldInfo;
use crate::index::postings::{Posting, PostingsReader, TermEntry};
use crate::index::reader::SegmentReader;

/// Live-document totals of one postings list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LiveTotals {
    docs: u64,
    freq: u64,
    positions: u64,
}

/// Verify the term index of a segment.
pub fn verify_term_index(reader: &SegmentReader, report: &SegmentReport<'_>) -> TermIndexStatus {
    let mut status = TermIndexStatus::default();

    let opened = reader
        .term_dictionary()
        .and_then(|dictionary| Ok((dictionary, reader.postings_reader()?)));
    let (mut dictionary, mut postings) = match opened {
        Ok(readers) => readers,
        Err(e) => {
            report.fault(&mut status, format!("cannot open term index: {e}"));
            report.line("    test: terms, freq, prox...FAILED");
            return status;
        }
    };
    let tim = dictionary.file_name().to_string();

    let mut prev_field: Option<u32> = None;
    'fields: loop {
        let offset = dictionary.position();
        let header = match dictionary.next_field() {
            Ok(Some(header)) => header,
            Ok(None) => break,
            Err(e) => {
                report.fault(&mut status, format!("{tim}: at offset {offset}: {e}"));
                break;
            }
        };

        let field_number = header.field_number;
        if prev_field.is_some_and(|prev| prev >= field_number) {
            report.fault(
                &mut status,
                format!(
                    "{tim}: field number {field_number} at offset {offset} does not follow {}",
                    prev_field.unwrap_or_default()
                ),
            );
        }
        prev_field = Some(field_number);

        let info = match reader.field_infos().by_number(field_number) {
            Some(info) if info.indexed => Some(info),
            Some(info) => {
                report.fault(
                    &mut status,
                    format!("{tim}: field '{}' has terms but is not indexed", info.name),
                );
                None
            }
            None => {
                report.fault(
                    &mut status,
                    format!("{tim}: terms for unknown field number {field_number} at offset {offset}"),
                );
                None
            }
        };
        let field_name = info
            .map(|info| info.name.clone())
            .unwrap_or_else(|| format!("#{field_number}"));

        let mut prev_term: Option<Vec<u8>> = None;
        for _ in 0..header.term_count {
            let term_offset = dictionary.position();
            let entry = match dictionary.next_term() {
                Ok(entry) => entry,
                Err(e) => {
                    report.fault(
                        &mut status,
                        format!("{tim}: field '{field_name}': term at offset {term_offset}: {e}"),
                    );
                    break 'fields;
                }
            };

            if let Some(prev) = &prev_term {
                if prev.as_slice() >= entry.term.as_slice() {
                    report.fault(
                        &mut status,
                        format!(
                            "{tim}: field '{field_name}': term '{}' at offset {term_offset} does not sort after '{}'",
                            entry.term_text(),
                            String::from_utf8_lossy(prev)
                        ),
                    );
                }
            }

            if let Some(info) = info {
                match check_term(reader, info, &entry, &mut postings, &mut status, report) {
                    Some(totals) if totals.docs > 0 => {
                        status.term_count += 1;
                        status.tot_freq += totals.freq;
                        status.tot_pos += totals.positions;
                    }
                    Some(_) => status.del_term_count += 1,
                    None => {}
                }
            }
            prev_term = Some(entry.term);
        }
    }

    debug!(
        "segment {}: {} terms, {} deleted terms",
        reader.name(),
        status.term_count,
        status.del_term_count
    );
    match &status.error {
        None => report.line(&format!(
            "    test: terms, freq, prox...OK [{} terms; {} terms/docs pairs; {} tokens]",
            status.term_count, status.tot_freq, status.tot_pos
        )),
        Some(_) => report.line("    test: terms, freq, prox...FAILED"),
    }
    status
}

/// Decode and check the postings of one term. Returns the live totals, or
/// `None` when the list could not be decoded.
fn check_term(
    reader: &SegmentReader,
    info: &FieldInfo,
    entry: &TermEntry,
    postings: &mut PostingsReader,
    status: &mut TermIndexStatus,
    report: &SegmentReport<'_>,
) -> Option<LiveTotals> {
    let pst = postings.file_name().to_string();
    let max_doc = reader.max_doc();
    let context = format!(
        "{pst}: field '{}' term '{}' at offset {}",
        info.name,
        entry.term_text(),
        entry.postings_offset
    );

    if entry.doc_freq == 0 || entry.doc_freq > max_doc as u64 {
        report.fault(
            status,
            format!("{context}: docFreq {} outside 1..={max_doc}", entry.doc_freq),
        );
        return None;
    }

    let list: Vec<Posting> =
        match postings.read_postings(entry.postings_offset, info.has_freqs(), info.has_positions()) {
            Ok(list) => list,
            Err(e) => {
                report.fault(status, format!("{context}: {e}"));
                return None;
            }
        };

    if list.len() as u64 != entry.doc_freq {
        report.fault(
            status,
            format!(
                "{context}: docFreq is {} but {} postings were decoded",
                entry.doc_freq,
                list.len()
            ),
        );
    }

    let mut totals = LiveTotals::default();
    let mut sum_freq = 0u64;
    let mut prev_doc: Option<u32> = None;
    for posting in &list {
        let doc = posting.doc_id;
        if prev_doc.is_some_and(|prev| prev >= doc) {
            report.fault(
                status,
                format!(
                    "{context}: doc {doc} does not follow doc {}",
                    prev_doc.unwrap_or_default()
                ),
            );
        }
        prev_doc = Some(doc);

        if doc >= max_doc {
            report.fault(status, format!("{context}: doc {doc} is beyond maxDoc {max_doc}"));
            continue;
        }
        if posting.freq == 0 {
            report.fault(status, format!("{context}: doc {doc} has frequency 0"));
        }
        if info.has_positions() && posting.positions.len() != posting.freq as usize {
            report.fault(
                status,
                format!(
                    "{context}: doc {doc} has frequency {} but {} positions",
                    posting.freq,
                    posting.positions.len()
                ),
            );
        }

        sum_freq += posting.freq as u64;
        if reader.live_docs().is_live(doc) {
            totals.docs += 1;
            totals.freq += posting.freq as u64;
            if info.has_positions() {
                totals.positions += posting.positions.len() as u64;
            }
        }
    }

    if sum_freq != entry.total_term_freq {
        report.fault(
            status,
            format!(
                "{context}: totalTermFreq is {} but postings sum to {sum_freq}",
                entry.total_term_freq
            ),
        );
    }
    Some(totals)
}
