//! On-disk layout of the output root.
//!
//! ```text
//! <root>/nbs/                 tile-scheme GeoPackage, Archive/, list files
//! <root>/nbs/tiles/<TILE>/    downloaded tiles, Archive/
//! <root>/dcdb/                list files
//! <root>/dcdb/<PLATFORM>/     downloaded CSB files, Archive/
//! <root>/reputation_calcs/    one directory per reputation run
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::debug;

use vbicompare_core::naming::{list_file_name, platform_dir_name, ListKind};
use vbicompare_core::DataSource;

use crate::error::Result;

/// Name of the per-directory archive for superseded files.
pub const ARCHIVE_DIR: &str = "Archive";

/// Placeholder for an entry that turned out to be unavailable.
pub const UNAVAILABLE: &str = "N/A";

/// Paths under one output root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self, source: DataSource) -> PathBuf {
        self.root.join(source.as_str())
    }

    /// Create `<root>/<source>`, plus its `Archive/` for NBS.
    pub fn ensure_source_dir(&self, source: DataSource) -> Result<PathBuf> {
        let dir = self.source_dir(source);
        fs::create_dir_all(&dir)?;
        if source == DataSource::Nbs {
            fs::create_dir_all(dir.join(ARCHIVE_DIR))?;
        }
        Ok(dir)
    }

    pub fn tile_dir(&self, tile: &str) -> PathBuf {
        self.source_dir(DataSource::Nbs).join("tiles").join(tile)
    }

    pub fn platform_dir(&self, platform: &str) -> PathBuf {
        self.source_dir(DataSource::Dcdb).join(platform_dir_name(platform))
    }

    pub fn reputation_dir(&self) -> PathBuf {
        self.root.join("reputation_calcs")
    }

    /// Write a list file into `<root>/<source>/`, one entry per line.
    ///
    /// `.xml` sidecars and [`UNAVAILABLE`] placeholders are left out.
    pub fn write_list<S: AsRef<str>>(
        &self,
        source: DataSource,
        kind: ListKind,
        entries: &[S],
        at: NaiveDateTime,
    ) -> Result<PathBuf> {
        let dir = self.source_dir(source);
        fs::create_dir_all(&dir)?;
        let path = dir.join(list_file_name(source, kind, at));

        let mut file = fs::File::create(&path)?;
        let mut written = 0usize;
        for entry in entries.iter().map(AsRef::as_ref) {
            if entry.ends_with("xml") || entry == UNAVAILABLE {
                continue;
            }
            writeln!(file, "{entry}")?;
            written += 1;
        }
        file.flush()?;

        debug!(path = %path.display(), entries = written, "wrote list file");
        Ok(path)
    }
}

/// Create `dir` and its `Archive/`.
pub fn ensure_with_archive(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir.join(ARCHIVE_DIR))?;
    Ok(())
}

/// Move `file` into the `Archive/` next to it, returning the new path.
pub fn archive_file(file: &Path) -> Result<PathBuf> {
    let parent = file.parent().unwrap_or_else(|| Path::new("."));
    let archive = parent.join(ARCHIVE_DIR);
    fs::create_dir_all(&archive)?;

    let target = match file.file_name() {
        Some(name) => archive.join(name),
        None => archive.join("unnamed"),
    };
    fs::rename(file, &target)?;
    debug!(from = %file.display(), to = %target.display(), "archived");
    Ok(target)
}

/// Regular files directly inside `dir` (no sub-directories).
pub fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
