//! Stored field verification.

use crate::check::report::SegmentReport;
use crate::check::status::StoredFieldStatus;
use crate::index::reader::SegmentReader;

/// Decode the stored record of every live document.
pub fn verify_stored_fields(
    reader: &SegmentReader,
    report: &SegmentReport<'_>,
) -> StoredFieldStatus {
    let mut status = StoredFieldStatus::default();

    let mut stored = match reader.stored_fields_reader() {
        Ok(stored) => stored,
        Err(e) => {
            report.fault(&mut status, format!("cannot open stored fields: {e}"));
            report.line("    test: stored fields.......FAILED");
            return status;
        }
    };

    if stored.doc_count() != reader.max_doc() as usize {
        report.fault(
            &mut status,
            format!(
                "stored fields index has {} docs but maxDoc is {}",
                stored.doc_count(),
                reader.max_doc()
            ),
        );
    }

    for doc in reader.live_doc_ids() {
        let fields = match stored.document(doc) {
            Ok(fields) => fields,
            Err(e) => {
                report.fault(&mut status, format!("stored fields of doc {doc}: {e}"));
                continue;
            }
        };

        for field in &fields {
            match reader.field_infos().by_number(field.field_number) {
                Some(info) if info.stored => {}
                Some(info) => report.fault(
                    &mut status,
                    format!("doc {doc} stores a value for unstored field '{}'", info.name),
                ),
                None => report.fault(
                    &mut status,
                    format!(
                        "doc {doc} stores a value for unknown field number {}",
                        field.field_number
                    ),
                ),
            }
        }
        status.doc_count += 1;
        status.tot_fields += fields.len() as u64;
    }

    match &status.error {
        None => {
            let avg = if status.doc_count == 0 {
                0.0
            } else {
                status.tot_fields as f64 / status.doc_count as f64
            };
            report.line(&format!(
                "    test: stored fields.......OK [{} total field count; avg {avg:.1} fields per doc]",
                status.tot_fields
            ));
        }
        Some(_) => report.line("    test: stored fields.......FAILED"),
    }
    status
}
