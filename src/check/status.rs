//! The report tree returned by a check.
//!
//! A fresh tree is built on every call; nothing in it is shared with the
//! checker that produced it.

use std::collections::BTreeMap;

use serde::Serialize;

/// A sub-status that accumulates faults: the first one is kept in `error`,
/// all of them are counted.
pub trait RecordFault {
    /// Record one fault.
    fn record_fault(&mut self, message: String);

    /// The first recorded fault, if any.
    fn error(&self) -> Option<&str>;

    /// Fold in faults found before this status was built, such as checksum
    /// failures of the owning files. The earliest of them becomes `error`.
    fn absorb_earlier_faults(&mut self, faults: &[String]);
}

macro_rules! impl_record_fault {
    ($($status:ty),*) => {
        $(
            impl RecordFault for $status {
                fn record_fault(&mut self, message: String) {
                    if self.error.is_none() {
                        self.error = Some(message);
                    }
                    self.error_count += 1;
                }

                fn error(&self) -> Option<&str> {
                    self.error.as_deref()
                }

                fn absorb_earlier_faults(&mut self, faults: &[String]) {
                    if let Some(first) = faults.first() {
                        self.error = Some(first.clone());
                        self.error_count += faults.len();
                    }
                }
            }
        )*
    };
}

impl_record_fault!(FieldNormStatus, TermIndexStatus, StoredFieldStatus, TermVectorStatus);

/// Result of verifying a segment's length norms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldNormStatus {
    /// Number of fields whose norms were read.
    pub tot_fields: u64,
    pub error: Option<String>,
    pub error_count: usize,
}

/// Result of verifying a segment's term dictionary and postings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TermIndexStatus {
    /// Distinct terms, across all fields, with at least one live posting.
    pub term_count: u64,
    /// Terms whose postings all point at deleted documents.
    pub del_term_count: u64,
    /// Sum of term frequencies over live documents.
    pub tot_freq: u64,
    /// Sum of positions over live documents, for fields with positions.
    pub tot_pos: u64,
    pub error: Option<String>,
    pub error_count: usize,
}

/// Result of verifying a segment's stored fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoredFieldStatus {
    /// Live documents whose record decoded.
    pub doc_count: u64,
    /// Stored values across those documents.
    pub tot_fields: u64,
    pub error: Option<String>,
    pub error_count: usize,
}

/// Result of verifying a segment's term vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TermVectorStatus {
    /// Live documents with at least one field vector.
    pub doc_count: u64,
    /// Field vectors across those documents.
    pub tot_vectors: u64,
    pub error: Option<String>,
    pub error_count: usize,
}

/// Result of checking one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentInfoStatus {
    pub name: String,
    pub max_doc: u32,
    pub num_deleted: u32,
    pub has_deletions: bool,
    pub num_files: usize,
    pub size_bytes: u64,
    pub num_fields: usize,
    /// Provenance recorded when the segment was written, passed through
    /// untouched.
    pub diagnostics: BTreeMap<String, String>,
    /// False when the segment metadata could not be opened; the sub-statuses
    /// are then absent.
    pub open_reader_passed: bool,
    /// Why the segment could not be opened.
    pub error: Option<String>,
    pub field_norm_status: Option<FieldNormStatus>,
    pub term_index_status: Option<TermIndexStatus>,
    pub stored_field_status: Option<StoredFieldStatus>,
    pub term_vector_status: Option<TermVectorStatus>,
}

impl SegmentInfoStatus {
    /// Live documents according to the catalog.
    pub fn num_docs(&self) -> u32 {
        self.max_doc.saturating_sub(self.num_deleted)
    }

    /// Whether the segment opened and every present sub-status is clean.
    pub fn is_clean(&self) -> bool {
        self.open_reader_passed
            && self.error.is_none()
            && self
                .field_norm_status
                .as_ref()
                .is_none_or(|s| s.error.is_none())
            && self
                .term_index_status
                .as_ref()
                .is_none_or(|s| s.error.is_none())
            && self
                .stored_field_status
                .as_ref()
                .is_none_or(|s| s.error.is_none())
            && self
                .term_vector_status
                .as_ref()
                .is_none_or(|s| s.error.is_none())
    }
}

/// Result of a whole check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    /// True iff every checked segment is clean.
    pub clean: bool,
    /// Commit point that was checked.
    pub segments_file_name: String,
    /// Segments in the commit point.
    pub num_segments: usize,
    /// Whether only some segments were requested.
    pub partial: bool,
    /// Names requested by a partial check.
    pub segments_checked: Vec<String>,
    pub num_bad_segments: usize,
    /// Live documents held by bad segments.
    pub tot_lose_doc_count: u64,
    /// Checked segments, in catalog order.
    pub segments: Vec<SegmentInfoStatus>,
}

impl Status {
    /// Assemble the index verdict from per-segment results.
    pub fn aggregate(
        segments_file_name: String,
        num_segments: usize,
        requested: Option<Vec<String>>,
        segments: Vec<SegmentInfoStatus>,
    ) -> Status {
        let bad: Vec<&SegmentInfoStatus> =
            segments.iter().filter(|s| !s.is_clean()).collect();
        let num_bad_segments = bad.len();
        let tot_lose_doc_count = bad.iter().map(|s| s.num_docs() as u64).sum();

        Status {
            clean: num_bad_segments == 0,
            segments_file_name,
            num_segments,
            partial: requested.is_some(),
            segments_checked: requested.unwrap_or_default(),
            num_bad_segments,
            tot_lose_doc_count,
            segments,
        }
    }
}
