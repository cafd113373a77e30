//! Commit points: the durable catalog of live segments.
//!
//! A commit point is written to `pending_segments_<gen>` and renamed to
//! `segments_<gen>` once complete, so readers only ever see finished catalogs.
//! The commit with the highest generation is the current one.

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::error::{Result, SarissaError};
use crate::index::codec::{
    FORMAT_VERSION, PENDING_SEGMENTS_PREFIX, SEGMENTS_MAGIC, generation_from_segments_file_name,
    segments_file_name, to_base36,
};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter, verify_footer};

/// Catalog entry for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentDescriptor {
    /// Segment name, e.g. `_a`.
    pub name: String,
    /// Number of documents written to the segment, deleted ones included.
    pub max_doc: u32,
    /// Number of deleted documents.
    pub del_count: u32,
    /// Deletion generation; 0 means no deletions file.
    pub del_gen: u64,
    /// Provenance recorded when the segment was written.
    pub diagnostics: BTreeMap<String, String>,
    /// Every file that belongs to the segment.
    pub files: Vec<String>,
}

impl SegmentDescriptor {
    /// Documents that are not deleted.
    pub fn live_doc_count(&self) -> u32 {
        self.max_doc.saturating_sub(self.del_count)
    }

    /// Whether a deletions file exists.
    pub fn has_deletions(&self) -> bool {
        self.del_gen > 0
    }
}

/// The parsed content of a `segments_<gen>` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitPoint {
    /// Generation of this commit.
    pub generation: u64,
    /// Next segment number to hand out.
    pub counter: u64,
    /// Segments in catalog order.
    pub segments: Vec<SegmentDescriptor>,
}

impl CommitPoint {
    /// File name of this commit.
    pub fn file_name(&self) -> String {
        segments_file_name(self.generation)
    }

    /// Every file referenced by this commit, itself included.
    pub fn referenced_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .segments
            .iter()
            .flat_map(|s| s.files.iter().cloned())
            .collect();
        files.push(self.file_name());
        files
    }

    /// Write this commit as `segments_<generation>`.
    pub fn write(&self, storage: &dyn Storage) -> Result<()> {
        let pending = format!("{PENDING_SEGMENTS_PREFIX}{}", to_base36(self.generation));
        let mut writer = StructWriter::new(storage.create_output(&pending)?);

        writer.write_header(SEGMENTS_MAGIC, FORMAT_VERSION)?;
        writer.write_u64(self.generation)?;
        writer.write_u64(self.counter)?;
        writer.write_varint(self.segments.len() as u64)?;
        for segment in &self.segments {
            writer.write_string(&segment.name)?;
            writer.write_u32(segment.max_doc)?;
            writer.write_u32(segment.del_count)?;
            writer.write_u64(segment.del_gen)?;
            writer.write_string_map(&segment.diagnostics)?;
            writer.write_varint(segment.files.len() as u64)?;
            for file in &segment.files {
                writer.write_string(file)?;
            }
        }
        writer.close()?;

        storage.sync()?;
        storage.rename_file(&pending, &self.file_name())?;
        debug!(
            "wrote commit {} with {} segments",
            self.file_name(),
            self.segments.len()
        );
        Ok(())
    }

    /// Read a specific commit file.
    pub fn read(storage: &dyn Storage, file_name: &str) -> Result<CommitPoint> {
        let mut input = storage.open_input(file_name)?;
        verify_footer(&mut input, file_name)?;
        input.close()?;

        let mut reader = StructReader::new(storage.open_input(file_name)?)?;
        reader.check_header(SEGMENTS_MAGIC, FORMAT_VERSION)?;
        let generation = reader.read_u64()?;
        let counter = reader.read_u64()?;
        let count = reader.read_count(reader.remaining(), "segment count")?;

        let mut segments = Vec::with_capacity(count);
        for _ in 0..count {
            let name = reader.read_string()?;
            let max_doc = reader.read_u32()?;
            let del_count = reader.read_u32()?;
            let del_gen = reader.read_u64()?;
            if del_count > max_doc {
                return Err(SarissaError::corruption(format!(
                    "segment {name}: del_count {del_count} exceeds max_doc {max_doc}"
                )));
            }
            let diagnostics = reader.read_string_map()?;
            let file_count = reader.read_count(reader.remaining(), "file count")?;
            let mut files = Vec::with_capacity(file_count);
            for _ in 0..file_count {
                files.push(reader.read_string()?);
            }
            segments.push(SegmentDescriptor {
                name,
                max_doc,
                del_count,
                del_gen,
                diagnostics,
                files,
            });
        }
        reader.expect_eof("commit point")?;
        reader.close()?;

        Ok(CommitPoint {
            generation,
            counter,
            segments,
        })
    }

    /// Read the most recent commit point.
    ///
    /// Any failure, including the absence of a commit, is a
    /// [`SarissaError::CatalogCorruption`].
    pub fn read_latest(storage: &dyn Storage) -> Result<CommitPoint> {
        let file_name = latest_segments_file(storage)?
            .ok_or_else(|| SarissaError::catalog_corruption("no segments_N file found"))?;

        CommitPoint::read(storage, &file_name).map_err(|e| match e {
            SarissaError::CatalogCorruption(_) => e,
            other => SarissaError::catalog_corruption(format!(
                "unable to read commit point {file_name}: {other}"
            )),
        })
    }
}

/// Name of the newest `segments_<gen>` file, if any.
pub fn latest_segments_file(storage: &dyn Storage) -> Result<Option<String>> {
    let latest = storage
        .list_files()?
        .into_iter()
        .filter_map(|name| generation_from_segments_file_name(&name).map(|g| (g, name)))
        .max_by_key(|(generation, _)| *generation)
        .map(|(_, name)| name);
    Ok(latest)
}
