//! File and object naming conventions
//!
//! Maps between the names the remote services hand out and the object keys
//! and local paths the collector works with.

use chrono::NaiveDateTime;

use crate::error::{Error, Result};
use crate::request::DataSource;

/// Key prefix holding the BlueTopo tile-scheme GeoPackage.
pub const TILE_SCHEME_PREFIX: &str = "BlueTopo/_BlueTopo_Tile_Scheme/";

/// Timestamp format used in list-file names.
pub const LIST_TIMESTAMP_FORMAT: &str = "%m_%d_%Y_%H%M%S";

/// Length of the leading timestamp in a CSB archive name.
const CSB_TIMESTAMP_LEN: usize = 20;

/// Kind of list file written after a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// Local file paths.
    FilePaths,
    /// `s3://` URLs.
    S3Urls,
}

impl ListKind {
    fn tag(&self) -> &'static str {
        match self {
            ListKind::FilePaths => "filepaths",
            ListKind::S3Urls => "S3URLpaths",
        }
    }
}

/// Map a CSB archive name to the key of its point-data CSV.
///
/// `20190222113324825195_7cb9a8c2-5d2a-4c91-ac35-13fd2340a589.tar.gz` becomes
/// `csb/csv/2019/02/22/20190222113324825195_7cb9a8c2-5d2a-4c91-ac35-13fd2340a589_pointData.csv`.
pub fn csb_object_key(name: &str) -> Result<String> {
    let stem = name.trim();
    let stem = stem.strip_suffix(".tar.gz").unwrap_or(stem);

    let malformed = |reason: &str| Error::InvalidParameter {
        name: "csb_name",
        value: name.to_string(),
        reason: reason.to_string(),
    };

    let (timestamp, rest) = match (stem.get(..CSB_TIMESTAMP_LEN), stem.get(CSB_TIMESTAMP_LEN..)) {
        (Some(ts), Some(rest)) => (ts, rest),
        _ => return Err(malformed("shorter than its 20-digit timestamp")),
    };
    if !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("does not start with a 20-digit timestamp"));
    }
    let id = match rest.strip_prefix('_') {
        Some(id) if !id.is_empty() => id,
        _ => return Err(malformed("missing '_<id>' after the timestamp")),
    };

    Ok(format!(
        "csb/csv/{}/{}/{}/{}_{}_pointData.csv",
        &timestamp[..4],
        &timestamp[4..6],
        &timestamp[6..8],
        timestamp,
        id
    ))
}

/// Last path segment of an object key.
pub fn key_file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// The 8-digit date stamp in a BlueTopo file name
/// (`BlueTopo_BH4JJ57V_20240311.tiff` -> `20240311`).
pub fn bluetopo_date_stamp(key: &str) -> Option<&str> {
    let file = key_file_name(key);
    let (_, tail) = file.rsplit_once('_')?;
    let stamp = tail.get(..8)?;
    stamp.bytes().all(|b| b.is_ascii_digit()).then_some(stamp)
}

/// Object prefix of a BlueTopo tile.
pub fn tile_prefix(tile: &str) -> String {
    format!("BlueTopo/{tile}/")
}

/// Tile name from a tile prefix or key (`BlueTopo/BH4JJ57V/...` -> `BH4JJ57V`).
pub fn tile_from_key(key: &str) -> Option<&str> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next()) {
        (Some("BlueTopo"), Some(tile)) if !tile.is_empty() => Some(tile),
        _ => None,
    }
}

/// Directory for platforms whose name cannot be used as a directory name.
pub const UNNAMED_PLATFORM_DIR: &str = "UNNAMED_PLATFORM";

/// Directory name for a CSB platform.
///
/// Trailing whitespace is dropped and path separators removed. Names that
/// would still resolve to the parent or the DCDB directory itself (empty,
/// `.`, `..`) map to [`UNNAMED_PLATFORM_DIR`].
pub fn platform_dir_name(platform: &str) -> String {
    let name: String = platform
        .trim_end()
        .chars()
        .filter(|c| !matches!(c, '/' | '\\'))
        .collect();
    if name.trim().chars().all(|c| c == '.') {
        UNNAMED_PLATFORM_DIR.to_string()
    } else {
        name
    }
}

/// List-file name for a source, kind and time.
pub fn list_file_name(source: DataSource, kind: ListKind, at: NaiveDateTime) -> String {
    format!(
        "{}_{}_{}.txt",
        source.as_str(),
        kind.tag(),
        at.format(LIST_TIMESTAMP_FORMAT)
    )
}
