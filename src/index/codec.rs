//! File names, extensions and format constants shared by every segment file.

/// Field infos.
pub const FIELD_INFOS_EXTENSION: &str = "fnm";
/// Length norms.
pub const NORMS_EXTENSION: &str = "nrm";
/// Term dictionary.
pub const TERMS_EXTENSION: &str = "tim";
/// Postings lists.
pub const POSTINGS_EXTENSION: &str = "pst";
/// Stored fields index.
pub const STORED_INDEX_EXTENSION: &str = "fdx";
/// Stored fields data.
pub const STORED_DATA_EXTENSION: &str = "fdt";
/// Term vectors index.
pub const VECTORS_INDEX_EXTENSION: &str = "tvx";
/// Term vectors data.
pub const VECTORS_DATA_EXTENSION: &str = "tvd";
/// Deleted documents.
pub const LIVE_DOCS_EXTENSION: &str = "liv";

/// Prefix of commit point files.
pub const SEGMENTS_PREFIX: &str = "segments_";
/// Prefix of a commit point that is still being written.
pub const PENDING_SEGMENTS_PREFIX: &str = "pending_segments_";
/// Name of the exclusive write lock.
pub const WRITE_LOCK_NAME: &str = "write";

pub const SEGMENTS_MAGIC: u32 = 0x5345474E; // "SEGN"
pub const FIELD_INFOS_MAGIC: u32 = 0x46494E46; // "FINF"
pub const LIVE_DOCS_MAGIC: u32 = 0x44454C42; // "DELB"
pub const NORMS_MAGIC: u32 = 0x4E524D53; // "NRMS"
pub const TERMS_MAGIC: u32 = 0x5445524D; // "TERM"
pub const POSTINGS_MAGIC: u32 = 0x504F5354; // "POST"
pub const STORED_INDEX_MAGIC: u32 = 0x46445849; // "FDXI"
pub const STORED_DATA_MAGIC: u32 = 0x46445444; // "FDTD"
pub const VECTORS_INDEX_MAGIC: u32 = 0x54565849; // "TVXI"
pub const VECTORS_DATA_MAGIC: u32 = 0x54564444; // "TVDD"

/// Format version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the magic + version header.
pub const HEADER_LEN: u64 = 8;

/// Every per-segment extension, in the order files are written.
pub const SEGMENT_EXTENSIONS: [&str; 8] = [
    FIELD_INFOS_EXTENSION,
    NORMS_EXTENSION,
    TERMS_EXTENSION,
    POSTINGS_EXTENSION,
    STORED_INDEX_EXTENSION,
    STORED_DATA_EXTENSION,
    VECTORS_INDEX_EXTENSION,
    VECTORS_DATA_EXTENSION,
];

/// Encode a number in lowercase base 36.
pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Decode a lowercase base 36 number.
pub fn from_base36(text: &str) -> Option<u64> {
    if text.is_empty() {
        return None;
    }
    u64::from_str_radix(text, 36).ok()
}

/// Name of the `counter`-th segment: `_0`, `_1`, ..., `_a`, ...
pub fn segment_name(counter: u64) -> String {
    format!("_{}", to_base36(counter))
}

/// Name of a per-segment file.
pub fn segment_file_name(segment: &str, extension: &str) -> String {
    format!("{segment}.{extension}")
}

/// Name of the deletions file for a deletion generation.
pub fn live_docs_file_name(segment: &str, del_gen: u64) -> String {
    format!("{segment}_{}.{LIVE_DOCS_EXTENSION}", to_base36(del_gen))
}

/// Name of a commit point.
pub fn segments_file_name(generation: u64) -> String {
    format!("{SEGMENTS_PREFIX}{}", to_base36(generation))
}

/// Generation of a commit point file, if `name` is one.
pub fn generation_from_segments_file_name(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENTS_PREFIX).and_then(from_base36)
}

/// Extension of a file name, if any.
pub fn file_extension(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(_, ext)| ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(10), "a");
        assert_eq!(to_base36(36), "10");
        assert_eq!(from_base36("a"), Some(10));
        assert_eq!(from_base36(""), None);
        assert_eq!(from_base36("!"), None);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(segment_name(10), "_a");
        assert_eq!(segment_file_name("_a", TERMS_EXTENSION), "_a.tim");
        assert_eq!(live_docs_file_name("_a", 1), "_a_1.liv");
        assert_eq!(segments_file_name(11), "segments_b");
        assert_eq!(generation_from_segments_file_name("segments_b"), Some(11));
        assert_eq!(generation_from_segments_file_name("pending_segments_b"), None);
        assert_eq!(file_extension("_a_1.liv"), Some("liv"));
    }
}
