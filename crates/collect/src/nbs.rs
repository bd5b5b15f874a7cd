//! NBS (BlueTopo) workflow.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use vbicompare_cloud::tile_scheme::latest_scheme_object;
use vbicompare_cloud::{ObjectEntry, TileDescriptor, TileScheme};
use vbicompare_core::naming::{bluetopo_date_stamp, key_file_name, tile_prefix, ListKind, TILE_SCHEME_PREFIX};
use vbicompare_core::{DataSource, Region};

use crate::downloader::{now, sync_object, Downloader};
use crate::error::{CollectError, Result};
use crate::layout::{archive_file, ensure_with_archive, files_in};
use crate::reporter::Reporter;

pub(crate) struct NbsOutcome {
    pub list: PathBuf,
    pub charts: Vec<String>,
}

impl Downloader {
    /// Collect the BlueTopo tiles covering `regions`.
    ///
    /// Returns `None` when nothing was available and the job was cancelled.
    pub(crate) async fn collect_nbs(
        &self,
        regions: &[Region],
        reporter: &mut Reporter,
    ) -> Result<Option<NbsOutcome>> {
        let dir = self.layout.ensure_source_dir(DataSource::Nbs)?;
        reporter.info(format!("NBS data path: {}", dir.display()));
        reporter.step_done();

        let scheme_path = self.fetch_tile_scheme(&dir, reporter).await?;
        let tiles = {
            let scheme = TileScheme::open(&scheme_path)?;
            let mut tiles: Vec<TileDescriptor> = Vec::new();
            for region in regions {
                let search = region.negative_buffer().bbox();
                for tile in scheme.tiles_intersecting(&search)? {
                    if !tiles.iter().any(|t| t.tile == tile.tile) {
                        tiles.push(tile);
                    }
                }
            }
            tiles
        };
        reporter.step_done();

        if tiles.is_empty() {
            reporter.cancel("No NBS tile data available in given area.");
            return Ok(None);
        }
        reporter.info(format!("{} NBS tiles intersect the search area.", tiles.len()));

        let mut charts: Vec<String> = Vec::new();
        let (kind, entries) = if self.request.mode.is_local() {
            (ListKind::FilePaths, self.download_tiles(&tiles, &mut charts, reporter).await?)
        } else {
            (ListKind::S3Urls, self.tile_urls(&tiles, &mut charts, reporter).await?)
        };
        reporter.step_done();

        if entries.is_empty() {
            reporter.cancel("No NBS files available in given area.");
            return Ok(None);
        }

        let list = self.layout.write_list(DataSource::Nbs, kind, &entries, now())?;
        reporter.success(format!(
            "{} created at {}",
            list.file_name().unwrap_or_default().to_string_lossy(),
            dir.display()
        ));
        reporter.step_done();

        if !charts.is_empty() {
            reporter.info(format!(
                "MCD charts [{}] potentially affected by selected datasets include: {}",
                charts.len(),
                charts.join(", ")
            ));
        }

        Ok(Some(NbsOutcome { list, charts }))
    }

    /// Make sure the newest tile-scheme GeoPackage is in `dir`.
    ///
    /// Older `.gpkg` files are moved to `Archive/` before the new one lands.
    async fn fetch_tile_scheme(&self, dir: &Path, reporter: &Reporter) -> Result<PathBuf> {
        let bucket = &self.sources.nbs;
        let entries = bucket.list(TILE_SCHEME_PREFIX).await?;
        let latest = latest_scheme_object(&entries)
            .ok_or_else(|| CollectError::NoTileScheme(bucket.s3_url(TILE_SCHEME_PREFIX)))?;

        let name = key_file_name(&latest.key);
        let local = dir.join(name);
        if local.exists() {
            reporter.info(format!("Tile scheme {name} is up to date."));
            return Ok(local);
        }

        for old in files_in(dir)? {
            if old.extension().is_some_and(|ext| ext == "gpkg") {
                debug!(file = %old.display(), "archiving old tile scheme");
                archive_file(&old)?;
            }
        }

        reporter.info(format!("Downloading tile scheme {name}"));
        bucket.download(&latest.key, &local).await?;
        Ok(local)
    }

    /// Cloud mode: one `s3://` GeoTIFF URL per available tile.
    async fn tile_urls(
        &self,
        tiles: &[TileDescriptor],
        charts: &mut Vec<String>,
        reporter: &Reporter,
    ) -> Result<Vec<String>> {
        let bucket = &self.sources.nbs;
        let mut urls = Vec::new();

        for tile in tiles {
            let objects = bucket.list(&tile_prefix(&tile.tile)).await?;
            if objects.is_empty() {
                reporter.warning(format!("No NBS files available for tile: {}", tile.tile));
                continue;
            }

            let url = tile
                .geotiff_url
                .as_deref()
                .and_then(|link| bucket.to_s3_url(link).ok())
                .or_else(|| first_raster(&objects).map(|o| bucket.s3_url(&o.key)));
            let Some(url) = url else {
                reporter.warning(format!("No GeoTIFF found for tile: {}", tile.tile));
                continue;
            };

            self.note_tile(tile, charts, reporter).await;
            reporter.success(format!("Collecting NBS tile: {}", tile.tile));
            urls.push(url);
        }

        Ok(urls)
    }

    /// Local mode: download every object of every available tile.
    async fn download_tiles(
        &self,
        tiles: &[TileDescriptor],
        charts: &mut Vec<String>,
        reporter: &mut Reporter,
    ) -> Result<Vec<String>> {
        for tile in tiles {
            ensure_with_archive(&self.layout.tile_dir(&tile.tile))?;
        }
        reporter.step_done();

        let bucket = &self.sources.nbs;
        let mut paths = Vec::new();

        for tile in tiles {
            let objects = bucket.list(&tile_prefix(&tile.tile)).await?;
            if objects.is_empty() {
                reporter.warning(format!("No NBS files available for tile: {}", tile.tile));
                continue;
            }

            self.note_tile(tile, charts, reporter).await;
            reporter.success(format!("Collecting NBS tile: {}", tile.tile));

            let tile_dir = self.layout.tile_dir(&tile.tile);
            for object in &objects {
                if let Some(stamp) = bluetopo_date_stamp(&object.key) {
                    for file in files_in(&tile_dir)? {
                        let outdated = file
                            .file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| !n.contains(stamp));
                        if outdated {
                            reporter.info(format!("Archiving outdated {}", file.display()));
                            archive_file(&file)?;
                        }
                    }
                }
                let path = sync_object(bucket, &object.key, object.size, &tile_dir, reporter).await?;
                paths.push(path.display().to_string());
            }
        }

        Ok(paths)
    }

    /// Report a tile's outline and the charts overlapping it.
    ///
    /// The chart lookup uses the tile extent shrunk by the negative buffer so
    /// charts that only touch the tile edge are left out. A failed lookup is
    /// reported and does not stop the job.
    async fn note_tile(&self, tile: &TileDescriptor, charts: &mut Vec<String>, reporter: &Reporter) {
        let search = Region::from_bbox(&tile.extent).negative_buffer();
        match self.sources.charts.charts_in_region(&search).await {
            Ok(outlines) => {
                for outline in outlines {
                    if charts.contains(&outline.name) {
                        continue;
                    }
                    reporter.chart_outline(&outline.name, outline.ring);
                    charts.push(outline.name);
                }
            }
            Err(e) => {
                warn!(tile = %tile.tile, error = %e, "chart lookup failed");
                reporter.error(format!("Could not access MCD server: {e}"));
            }
        }
        reporter.tile_outline(&tile.tile, tile.extent);
    }
}

fn first_raster(objects: &[ObjectEntry]) -> Option<&ObjectEntry> {
    objects.iter().find(|o| !o.key.ends_with("xml"))
}
