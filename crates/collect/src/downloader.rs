//! Collection job orchestration.
//!
//! A job runs the primary source's workflow and, when asked, the other
//! source's workflow over the same ground:
//!
//! - NBS first: the DCDB pass reuses the searched regions as they are.
//! - DCDB first: the MCD charts crossed by the collected tracks are resolved
//!   to their extents and the NBS pass runs over those.
//!
//! The per-source workflows live in `nbs.rs` and `dcdb.rs`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{info, warn};

use vbicompare_cloud::{Bucket, ChartService, CsbService, HttpClient};
use vbicompare_core::naming::key_file_name;
use vbicompare_core::{CollectionRequest, DataSource, GeoPoint, Region, SearchMethod};

use crate::batch::BatchInputs;
use crate::dcdb::TrackQuery;
use crate::error::{CollectError, Result};
use crate::layout::{archive_file, Layout};
use crate::plan::plan;
use crate::reporter::{Reporter, DISCOVERY_COMPLETE};
use crate::settings::Settings;

/// Remote services and buckets a job reads from.
#[derive(Clone)]
pub struct Sources {
    pub charts: ChartService,
    pub csb: CsbService,
    pub nbs: Bucket,
    pub dcdb: Bucket,
}

impl Sources {
    /// Clients for the endpoints named in `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = HttpClient::new(settings.http.timeout(), settings.http.max_retries)?;
        let paging = settings.http.paging();
        let src = &settings.sources;
        let endpoint = src.endpoint.as_deref();

        Ok(Self {
            charts: ChartService::new(http.clone(), src.chart_service_url.clone(), paging),
            csb: CsbService::new(http, &src.csb_service_url, paging),
            nbs: Bucket::anonymous(&src.nbs_bucket, &src.bucket_region, endpoint)?,
            dcdb: Bucket::anonymous(&src.dcdb_bucket, &src.bucket_region, endpoint)?,
        })
    }
}

/// What a job produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadSummary {
    pub nbs_list: Option<PathBuf>,
    pub dcdb_list: Option<PathBuf>,
    /// MCD charts overlapping the collected NBS tiles.
    pub affected_charts: Vec<String>,
    pub cancelled: bool,
}

impl DownloadSummary {
    /// Inputs for the reputation script, when both lists were written.
    pub fn batch_inputs(&self) -> Option<BatchInputs> {
        if self.cancelled {
            return None;
        }
        Some(BatchInputs {
            nbs_list: self.nbs_list.clone()?,
            dcdb_list: self.dcdb_list.clone()?,
        })
    }

    fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }
}

/// Runs one collection request.
pub struct Downloader {
    pub(crate) request: CollectionRequest,
    pub(crate) sources: Sources,
    pub(crate) layout: Layout,
}

impl Downloader {
    /// The request is normalized here; it is validated when the job runs.
    pub fn new(request: CollectionRequest, sources: Sources) -> Self {
        let request = request.normalized();
        let layout = Layout::new(request.output_root.clone());
        Self {
            request,
            sources,
            layout,
        }
    }

    pub fn request(&self) -> &CollectionRequest {
        &self.request
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Run the job, reporting as it goes.
    ///
    /// A search that finds nothing ends with a cancellation and a summary
    /// marked `cancelled`. Transport, storage and file-system failures are
    /// returned as errors.
    pub async fn run(&self, reporter: &mut Reporter) -> Result<DownloadSummary> {
        let request = &self.request;
        request.validate()?;

        reporter.begin(plan(request).len());
        info!(
            primary = %request.primary,
            search = request.search.label(),
            mode = ?request.mode,
            secondary = request.secondary,
            "collection started"
        );
        reporter.info(format!(
            "Collecting {} data by {} search.",
            request.primary,
            request.search.label()
        ));
        reporter.step_done();

        let mut summary = DownloadSummary::default();

        match request.primary {
            DataSource::Nbs => {
                let regions = match &request.search {
                    SearchMethod::Charts(names) => match self.resolve_charts(names, reporter).await? {
                        Some(regions) => regions,
                        None => return Ok(summary.cancelled()),
                    },
                    SearchMethod::Area(regions) => regions.clone(),
                    SearchMethod::Vessels(_) => return Err(mismatched(request)),
                };

                let Some(nbs) = self.collect_nbs(&regions, reporter).await? else {
                    return Ok(summary.cancelled());
                };
                summary.nbs_list = Some(nbs.list);
                summary.affected_charts = nbs.charts;

                if request.secondary {
                    let Some(dcdb) = self.collect_dcdb(TrackQuery::Regions(&regions), reporter).await? else {
                        return Ok(summary.cancelled());
                    };
                    summary.dcdb_list = Some(dcdb.list);
                }
            }
            DataSource::Dcdb => {
                let query = match &request.search {
                    SearchMethod::Vessels(names) => TrackQuery::Vessels(names),
                    SearchMethod::Area(regions) => TrackQuery::Regions(regions),
                    SearchMethod::Charts(_) => return Err(mismatched(request)),
                };

                let Some(dcdb) = self.collect_dcdb(query, reporter).await? else {
                    return Ok(summary.cancelled());
                };
                summary.dcdb_list = Some(dcdb.list);

                if request.secondary {
                    let paths: Vec<Vec<GeoPoint>> = dcdb.tracks.iter().map(|t| t.path.clone()).collect();
                    let charts = self
                        .sources
                        .charts
                        .charts_crossing_tracks(&paths)
                        .await
                        .inspect_err(|_| reporter.error("Could not access MCD server"))?;
                    reporter.step_done();

                    if charts.is_empty() {
                        reporter.cancel("No MCD charts are crossed by the collected CSB tracks.");
                        return Ok(summary.cancelled());
                    }
                    reporter.info(format!(
                        "CSB tracks cross {} MCD charts: {}",
                        charts.len(),
                        charts.join(", ")
                    ));

                    let Some(regions) = self.resolve_charts(&charts, reporter).await? else {
                        return Ok(summary.cancelled());
                    };
                    let Some(nbs) = self.collect_nbs(&regions, reporter).await? else {
                        return Ok(summary.cancelled());
                    };
                    summary.nbs_list = Some(nbs.list);
                    summary.affected_charts = nbs.charts;
                }
            }
        }

        reporter.milestone(DISCOVERY_COMPLETE);
        reporter.fill();
        info!("collection complete");
        Ok(summary)
    }

    /// Look up the coverage of each named chart.
    ///
    /// Unknown charts are skipped with a warning; `None` means none resolved
    /// and the job was cancelled.
    pub(crate) async fn resolve_charts(
        &self,
        names: &[String],
        reporter: &mut Reporter,
    ) -> Result<Option<Vec<Region>>> {
        let mut regions = Vec::with_capacity(names.len());

        for name in names {
            let extent = self
                .sources
                .charts
                .chart_extent(name)
                .await
                .inspect_err(|_| reporter.error("Could not access MCD server"))?;
            match extent {
                Some(region) => {
                    reporter.info(format!("Chart {name} extent: {region}"));
                    regions.push(region);
                }
                None => {
                    warn!(chart = %name, "chart not found");
                    reporter.warning(format!("Chart {name} was not found on the MCD server. Skipping."));
                }
            }
        }
        reporter.step_done();

        if regions.is_empty() {
            reporter.cancel("None of the requested charts could be found.");
            return Ok(None);
        }
        Ok(Some(regions))
    }
}

fn mismatched(request: &CollectionRequest) -> CollectError {
    CollectError::Core(vbicompare_core::Error::InvalidRequest(vec![format!(
        "{} search cannot be used with {} as the primary source",
        request.search.label(),
        request.primary
    )]))
}

/// Timestamp for list-file names.
pub(crate) fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Bring one object into `dir`.
///
/// A local copy of the same size is kept. A copy of any other size is moved
/// to `Archive/` and fetched again.
pub(crate) async fn sync_object(
    bucket: &Bucket,
    key: &str,
    remote_size: u64,
    dir: &Path,
    reporter: &Reporter,
) -> Result<PathBuf> {
    let name = key_file_name(key);
    let target = dir.join(name);

    match fs::metadata(&target) {
        Ok(meta) if meta.len() == remote_size => {
            reporter.info(format!("{name} already downloaded. Skipping."));
            return Ok(target);
        }
        Ok(_) => {
            reporter.warning(format!("Moving corrupt {name} to Archive"));
            archive_file(&target)?;
        }
        Err(_) => {}
    }

    reporter.info(format!("Downloading {name}"));
    bucket.download(key, &target).await?;
    Ok(target)
}
