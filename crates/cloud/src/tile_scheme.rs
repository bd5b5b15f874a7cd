//! BlueTopo tile-scheme GeoPackage.
//!
//! The tile scheme is a GeoPackage with one feature table whose rows carry the
//! tile name, a link to the tile's GeoTIFF and the tile footprint.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use vbicompare_core::BBox;

use crate::bucket::ObjectEntry;
use crate::error::{CloudError, Result};
use crate::gpb;

/// One tile of the scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct TileDescriptor {
    pub tile: String,
    /// HTTP(S) link to the tile's GeoTIFF, if the tile has been published.
    pub geotiff_url: Option<String>,
    pub extent: BBox,
}

/// An open tile-scheme GeoPackage.
pub struct TileScheme {
    conn: Connection,
    table: String,
    path: PathBuf,
}

impl TileScheme {
    /// Open a tile scheme read-only.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CloudError::NotFound(format!(
                "can't find GeoPackage file at '{}'",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| CloudError::GeoPackage(format!("can't open '{}': {e}", path.display())))?;

        let table: Option<String> = conn
            .query_row("SELECT table_name FROM gpkg_contents", [], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(CloudError::GeoPackage(format!(
                    "'{}' is not a GeoPackage: {e}",
                    path.display()
                ))),
            })?;

        let table = table.ok_or_else(|| {
            CloudError::GeoPackage(format!("no tile scheme tables in '{}'", path.display()))
        })?;

        // The table name is spliced into SQL, so it must be a plain identifier
        if !is_safe_table_name(&table) {
            return Err(CloudError::GeoPackage(format!(
                "invalid tile scheme table name '{table}' in '{}'",
                path.display()
            )));
        }

        debug!(table = %table, path = %path.display(), "opened tile scheme");
        Ok(Self {
            conn,
            table,
            path: path.to_path_buf(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every tile whose footprint intersects `bbox` (touching counts).
    pub fn tiles_intersecting(&self, bbox: &BBox) -> Result<Vec<TileDescriptor>> {
        let sql = format!("SELECT tile, GeoTIFF_Link, geom FROM {}", self.table);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut tiles = Vec::new();
        while let Some(row) = rows.next()? {
            let tile: Option<String> = row.get(0)?;
            let link: Option<String> = row.get(1)?;
            let geom: Option<Vec<u8>> = row.get(2)?;

            let (Some(tile), Some(geom)) = (tile, geom) else {
                continue;
            };
            let extent = match gpb::geometry_extent(&geom) {
                Ok(Some(extent)) => extent,
                Ok(None) => continue,
                Err(e) => {
                    warn!(tile = %tile, error = %e, "skipping tile with unreadable footprint");
                    continue;
                }
            };
            if extent.intersects(bbox) {
                tiles.push(TileDescriptor {
                    tile,
                    geotiff_url: link.filter(|l| !l.trim().is_empty()),
                    extent,
                });
            }
        }

        debug!(table = %self.table, matches = tiles.len(), "tile query");
        Ok(tiles)
    }
}

/// `^[A-Za-z][A-Za-z0-9_]*$`
pub fn is_safe_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The newest tile-scheme GeoPackage among listed objects.
///
/// Scheme file names embed their publication timestamp, so the greatest key
/// is the newest.
pub fn latest_scheme_object(entries: &[ObjectEntry]) -> Option<&ObjectEntry> {
    entries
        .iter()
        .filter(|e| e.key.ends_with(".gpkg"))
        .max_by(|a, b| a.key.cmp(&b.key))
}
