//! Stages a collection job passes through.
//!
//! The length of the plan is the progress total shown by the monitor.

use vbicompare_core::{CollectionRequest, DataSource, SearchMethod};

/// One progress step of a collection job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Request accepted and the job started.
    Start,
    /// Chart names resolved to their coverage.
    ResolveCharts,
    /// `<root>/<source>` created.
    PrepareOutput(DataSource),
    /// Tile scheme fetched and queried.
    FindTiles,
    /// CSB service queried for track files.
    FindTracks,
    /// Charts crossed by the collected tracks found.
    ChartsFromTracks,
    /// Per-tile or per-platform download directories created.
    PrepareDownloadDirs(DataSource),
    /// Objects checked and downloaded or turned into URLs.
    Collect(DataSource),
    /// List file written.
    WriteList(DataSource),
}

/// The ordered stages `request` will pass when nothing is cancelled.
pub fn plan(request: &CollectionRequest) -> Vec<Stage> {
    let local = request.mode.is_local();
    let mut stages = vec![Stage::Start];

    let nbs = |stages: &mut Vec<Stage>, resolve_charts: bool| {
        if resolve_charts {
            stages.push(Stage::ResolveCharts);
        }
        stages.push(Stage::PrepareOutput(DataSource::Nbs));
        stages.push(Stage::FindTiles);
        if local {
            stages.push(Stage::PrepareDownloadDirs(DataSource::Nbs));
        }
        stages.push(Stage::Collect(DataSource::Nbs));
        stages.push(Stage::WriteList(DataSource::Nbs));
    };

    let dcdb = |stages: &mut Vec<Stage>| {
        stages.push(Stage::PrepareOutput(DataSource::Dcdb));
        stages.push(Stage::FindTracks);
        if local {
            stages.push(Stage::PrepareDownloadDirs(DataSource::Dcdb));
        }
        stages.push(Stage::Collect(DataSource::Dcdb));
        stages.push(Stage::WriteList(DataSource::Dcdb));
    };

    match request.primary {
        DataSource::Nbs => {
            nbs(&mut stages, matches!(request.search, SearchMethod::Charts(_)));
            if request.secondary {
                dcdb(&mut stages);
            }
        }
        DataSource::Dcdb => {
            dcdb(&mut stages);
            if request.secondary {
                stages.push(Stage::ChartsFromTracks);
                nbs(&mut stages, true);
            }
        }
    }

    stages
}
