//! Footer checksum verification of every file a segment references.
//!
//! A failing file is attributed to the sub-status that owns it, so the
//! verdict of a checksum pass lands next to the structural findings for the
//! same data.

use log::debug;

use crate::check::report::SegmentReport;
use crate::error::SarissaError;
use crate::index::codec::{
    NORMS_EXTENSION, POSTINGS_EXTENSION, STORED_DATA_EXTENSION, STORED_INDEX_EXTENSION,
    TERMS_EXTENSION, VECTORS_DATA_EXTENSION, VECTORS_INDEX_EXTENSION, file_extension,
};
use crate::index::commit::SegmentDescriptor;
use crate::storage::Storage;
use crate::storage::structured::verify_footer;

/// The part of a segment a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOwner {
    /// Field infos, deletions and anything unrecognised.
    Metadata,
    Norms,
    TermIndex,
    StoredFields,
    TermVectors,
}

impl FileOwner {
    /// Owner of `file_name`, by extension.
    pub fn of(file_name: &str) -> FileOwner {
        match file_extension(file_name) {
            Some(NORMS_EXTENSION) => FileOwner::Norms,
            Some(TERMS_EXTENSION) | Some(POSTINGS_EXTENSION) => FileOwner::TermIndex,
            Some(STORED_INDEX_EXTENSION) | Some(STORED_DATA_EXTENSION) => FileOwner::StoredFields,
            Some(VECTORS_INDEX_EXTENSION) | Some(VECTORS_DATA_EXTENSION) => {
                FileOwner::TermVectors
            }
            _ => FileOwner::Metadata,
        }
    }
}

/// Checksum faults of one segment, grouped by owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumFaults {
    pub metadata: Vec<String>,
    pub norms: Vec<String>,
    pub term_index: Vec<String>,
    pub stored_fields: Vec<String>,
    pub term_vectors: Vec<String>,
    /// Files whose footer matched.
    pub verified_files: usize,
}

impl ChecksumFaults {
    fn push(&mut self, owner: FileOwner, message: String) {
        let faults = match owner {
            FileOwner::Metadata => &mut self.metadata,
            FileOwner::Norms => &mut self.norms,
            FileOwner::TermIndex => &mut self.term_index,
            FileOwner::StoredFields => &mut self.stored_fields,
            FileOwner::TermVectors => &mut self.term_vectors,
        };
        faults.push(message);
    }

    /// Total number of failing files.
    pub fn len(&self) -> usize {
        self.metadata.len()
            + self.norms.len()
            + self.term_index.len()
            + self.stored_fields.len()
            + self.term_vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Recompute the footer checksum of every file in `descriptor.files`.
///
/// Missing or unreadable files are faults as well. Verification always
/// continues with the next file.
pub fn verify_segment_files(
    storage: &dyn Storage,
    descriptor: &SegmentDescriptor,
    report: &SegmentReport<'_>,
) -> ChecksumFaults {
    let mut faults = ChecksumFaults::default();

    for file_name in &descriptor.files {
        match verify_file(storage, file_name) {
            Ok(crc) => {
                debug!("{file_name}: checksum {crc:#010x} ok");
                faults.verified_files += 1;
            }
            Err(e) => {
                let message = match e {
                    SarissaError::ChecksumMismatch { .. } => e.to_string(),
                    other => format!("{file_name}: checksum not verifiable: {other}"),
                };
                report.line(&format!("      ERROR: {message}"));
                faults.push(FileOwner::of(file_name), message);
            }
        }
    }

    report.line(&format!(
        "    test: checksums...........{} [{} files]",
        if faults.is_empty() { "OK" } else { "FAILED" },
        descriptor.files.len()
    ));
    faults
}

fn verify_file(storage: &dyn Storage, file_name: &str) -> crate::error::Result<u32> {
    let mut input = storage.open_input(file_name)?;
    let crc = verify_footer(&mut input, file_name)?;
    input.close()?;
    Ok(crc)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::check::report::Reporter;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::structured::StructWriter;
    use crate::storage::{read_all, write_all};

    fn write_checksummed(storage: &dyn Storage, name: &str) {
        let mut writer = StructWriter::new(storage.create_output(name).unwrap());
        writer.write_header(0x1234_5678, 1).unwrap();
        writer.write_string("payload").unwrap();
        writer.close().unwrap();
    }

    fn descriptor(files: &[&str]) -> SegmentDescriptor {
        SegmentDescriptor {
            name: "_0".to_string(),
            max_doc: 1,
            del_count: 0,
            del_gen: 0,
            diagnostics: BTreeMap::new(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_owner_by_extension() {
        assert_eq!(FileOwner::of("_0.pst"), FileOwner::TermIndex);
        assert_eq!(FileOwner::of("_0.tim"), FileOwner::TermIndex);
        assert_eq!(FileOwner::of("_0.nrm"), FileOwner::Norms);
        assert_eq!(FileOwner::of("_0.fdt"), FileOwner::StoredFields);
        assert_eq!(FileOwner::of("_0.tvx"), FileOwner::TermVectors);
        assert_eq!(FileOwner::of("_0_1.liv"), FileOwner::Metadata);
        assert_eq!(FileOwner::of("_0.xyz"), FileOwner::Metadata);
    }

    #[test]
    fn test_faults_are_attributed() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        write_checksummed(storage.as_ref(), "_0.nrm");
        write_checksummed(storage.as_ref(), "_0.pst");

        let mut bytes = read_all(storage.as_ref(), "_0.pst").unwrap();
        bytes[9] ^= 0x01;
        write_all(storage.as_ref(), "_0.pst", &bytes).unwrap();

        let reporter = Reporter::default();
        let faults = verify_segment_files(
            storage.as_ref(),
            &descriptor(&["_0.nrm", "_0.pst", "_0.fdt"]),
            &reporter.segment("_0", false),
        );

        assert_eq!(faults.verified_files, 1);
        assert!(faults.norms.is_empty());
        assert_eq!(faults.term_index.len(), 1);
        assert!(faults.term_index[0].contains("_0.pst"));
        assert_eq!(faults.stored_fields.len(), 1);
        assert_eq!(faults.len(), 2);
    }
}
