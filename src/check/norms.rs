//! Field norm verification.

use std::collections::BTreeSet;

use log::debug;

use crate::check::report::SegmentReport;
use crate::check::status::FieldNormStatus;
use crate::index::reader::SegmentReader;

/// Verify the norms of every field that carries them.
///
/// Each entry must belong to a known field with norms and hold exactly one
/// value per document. Every such field must have an entry.
pub fn verify_field_norms(reader: &SegmentReader, report: &SegmentReport<'_>) -> FieldNormStatus {
    let mut status = FieldNormStatus::default();
    let field_infos = reader.field_infos();
    let max_doc = reader.max_doc() as usize;

    let mut norms = match reader.norms_reader() {
        Ok(norms) => norms,
        Err(e) => {
            report.fault(&mut status, format!("cannot open norms: {e}"));
            report.line("    test: field norms.........FAILED");
            return status;
        }
    };
    let file_name = norms.file_name().to_string();

    let mut seen = BTreeSet::new();
    loop {
        let offset = norms.position();
        let entry = match norms.next_entry() {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                report.fault(&mut status, format!("{file_name}: at offset {offset}: {e}"));
                break;
            }
        };

        let field_number = entry.field_number;
        let Some(info) = field_infos.by_number(field_number) else {
            report.fault(
                &mut status,
                format!("{file_name}: norms for unknown field number {field_number} at offset {offset}"),
            );
            continue;
        };
        if !seen.insert(field_number) {
            report.fault(
                &mut status,
                format!("{file_name}: field '{}' has norms twice", info.name),
            );
            continue;
        }
        if !info.has_norms() {
            report.fault(
                &mut status,
                format!("{file_name}: field '{}' has norms but omits them", info.name),
            );
            continue;
        }
        if entry.values.len() != max_doc {
            report.fault(
                &mut status,
                format!(
                    "{file_name}: field '{}' has {} norms but maxDoc is {max_doc}",
                    info.name,
                    entry.values.len()
                ),
            );
            continue;
        }

        let live_total: u64 = reader
            .live_doc_ids()
            .map(|doc| entry.values[doc as usize] as u64)
            .sum();
        debug!(
            "segment {}: field '{}' norms sum {live_total} over live docs",
            reader.name(),
            info.name
        );
        status.tot_fields += 1;
    }

    for info in field_infos.iter().filter(|info| info.has_norms()) {
        if !seen.contains(&info.number) {
            report.fault(
                &mut status,
                format!("{file_name}: missing norms for field '{}'", info.name),
            );
        }
    }

    match &status.error {
        None => report.line(&format!(
            "    test: field norms.........OK [{} fields]",
            status.tot_fields
        )),
        Some(_) => report.line("    test: field norms.........FAILED"),
    }
    status
}
