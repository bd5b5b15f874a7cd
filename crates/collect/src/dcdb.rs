//! DCDB (crowdsourced bathymetry) workflow.

use std::path::PathBuf;

use tracing::debug;

use vbicompare_cloud::csb::group_by_platform;
use vbicompare_cloud::CsbTrack;
use vbicompare_core::naming::{key_file_name, ListKind};
use vbicompare_core::{DataSource, Region};

use crate::downloader::{now, sync_object, Downloader};
use crate::error::Result;
use crate::layout::ensure_with_archive;
use crate::reporter::Reporter;

/// How tracks are looked up on the CSB service.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TrackQuery<'a> {
    Vessels(&'a [String]),
    Regions(&'a [Region]),
}

pub(crate) struct DcdbOutcome {
    pub list: PathBuf,
    /// Tracks whose files were available in the bucket.
    pub tracks: Vec<CsbTrack>,
}

impl Downloader {
    /// Collect the CSB files matching `query`.
    ///
    /// Returns `None` when nothing was available and the job was cancelled.
    pub(crate) async fn collect_dcdb(
        &self,
        query: TrackQuery<'_>,
        reporter: &mut Reporter,
    ) -> Result<Option<DcdbOutcome>> {
        let dir = self.layout.ensure_source_dir(DataSource::Dcdb)?;
        reporter.info(format!("DCDB data path: {}", dir.display()));
        reporter.step_done();

        let tracks = self.discover_tracks(query, reporter).await?;
        reporter.step_done();
        if tracks.is_empty() {
            reporter.cancel("No CSB data available for the requested search.");
            return Ok(None);
        }

        let groups = group_by_platform(tracks);
        let local = self.request.mode.is_local();
        if local {
            for group in &groups {
                ensure_with_archive(&self.layout.platform_dir(&group.platform))?;
            }
            reporter.step_done();
        }

        let bucket = &self.sources.dcdb;
        let mut entries: Vec<String> = Vec::new();
        let mut available: Vec<CsbTrack> = Vec::new();

        for group in groups {
            reporter.success(format!("Collecting CSB data for platform: {}", group.platform));
            let platform_dir = self.layout.platform_dir(&group.platform);

            for track in group.tracks {
                let key = match track.object_key() {
                    Ok(key) => key,
                    Err(e) => {
                        reporter.warning(format!("Skipping CSB file {}: {e}", track.name));
                        continue;
                    }
                };

                let Some(size) = bucket.head(&key).await? else {
                    reporter.warning(format!(
                        "{} does not exist in DCDB AWS bucket. Skipping",
                        key_file_name(&key)
                    ));
                    continue;
                };

                let entry = if local {
                    sync_object(bucket, &key, size, &platform_dir, reporter)
                        .await?
                        .display()
                        .to_string()
                } else {
                    bucket.s3_url(&key)
                };
                entries.push(entry);
                reporter.trackline(&track.platform, track.path.clone());
                available.push(track);
            }
        }
        reporter.step_done();

        if entries.is_empty() {
            reporter.cancel("None of the CSB files are available in the DCDB AWS bucket.");
            return Ok(None);
        }

        let kind = if local { ListKind::FilePaths } else { ListKind::S3Urls };
        let list = self.layout.write_list(DataSource::Dcdb, kind, &entries, now())?;
        reporter.success(format!(
            "{} created at {}",
            list.file_name().unwrap_or_default().to_string_lossy(),
            dir.display()
        ));
        reporter.step_done();

        Ok(Some(DcdbOutcome {
            list,
            tracks: available,
        }))
    }

    /// Every track matching `query`, unique by file name in service order.
    async fn discover_tracks(&self, query: TrackQuery<'_>, reporter: &Reporter) -> Result<Vec<CsbTrack>> {
        let csb = &self.sources.csb;
        let mut found: Vec<CsbTrack> = Vec::new();
        fn keep(track: CsbTrack, found: &mut Vec<CsbTrack>) {
            if !found.iter().any(|t| t.name == track.name) {
                found.push(track);
            }
        }

        match query {
            TrackQuery::Vessels(names) => {
                for name in names {
                    let search = csb.tracks_for_platform(name).await?;
                    let tracks = search.found;
                    if tracks.is_empty() {
                        reporter.warning(format!("No CSB data found for vessel: {name}"));
                        continue;
                    }
                    reporter.info(format!("{} CSB files found for vessel: {name}", tracks.len()));
                    if search.truncated {
                        reporter.warning(format!(
                            "CSB search for vessel {name} stopped at {} files; the rest were not collected.",
                            tracks.len()
                        ));
                    }
                    for track in tracks {
                        keep(track, &mut found);
                    }
                }
            }
            TrackQuery::Regions(regions) => {
                for region in regions {
                    let search = csb.tracks_in_region(region).await?;
                    debug!(region = %region, platforms = search.found.len(), "area search");
                    if search.truncated {
                        let files: usize = search.found.iter().map(|g| g.tracks.len()).sum();
                        reporter.warning(format!(
                            "CSB search for area {region} stopped at {files} files; the rest were not collected."
                        ));
                    }
                    for group in search.found {
                        reporter.info(format!(
                            "{} CSB files found for platform: {}",
                            group.tracks.len(),
                            group.platform
                        ));
                        for track in group.tracks {
                            keep(track, &mut found);
                        }
                    }
                }
            }
        }

        Ok(found)
    }
}
