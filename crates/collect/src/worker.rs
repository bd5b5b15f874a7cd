//! Background job runner.
//!
//! A job runs on its own thread with a single-threaded Tokio runtime and
//! reports over an unbounded channel. The last event of every job is
//! [`StatusEvent::Finished`], whether it succeeded, was cancelled or failed.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};
use tracing::error;

use vbicompare_core::{CollectionRequest, StatusEvent};

use crate::batch::{BatchBuilder, PreparedRun};
use crate::downloader::{DownloadSummary, Downloader, Sources};
use crate::error::{CollectError, Result};
use crate::reporter::Reporter;
use crate::settings::Settings;

/// Everything a finished job produced.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub summary: DownloadSummary,
    /// The reputation run, when both lists were written.
    pub reputation: Option<PreparedRun>,
}

/// Start `request` on a worker thread.
pub fn spawn(
    request: CollectionRequest,
    settings: Settings,
    sources: Sources,
) -> (JoinHandle<Result<JobOutcome>>, Receiver<StatusEvent>) {
    let (tx, rx) = unbounded();

    let handle = thread::spawn(move || {
        let mut reporter = Reporter::new(tx);
        let outcome = run_job(request, &settings, sources, &mut reporter);

        if let Err(e) = &outcome {
            error!(error = %e, "collection job failed");
            reporter.error(e.to_string());
            reporter.fill();
            reporter.calc_fill();
        }
        reporter.finished();
        outcome
    });

    (handle, rx)
}

/// Run the whole job on the current thread.
pub fn run_job(
    request: CollectionRequest,
    settings: &Settings,
    sources: Sources,
    reporter: &mut Reporter,
) -> Result<JobOutcome> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CollectError::Runtime(e.to_string()))?;

    let downloader = Downloader::new(request, sources);
    let summary = runtime.block_on(downloader.run(reporter))?;

    let reputation = match summary.batch_inputs() {
        Some(inputs) => {
            let request = downloader.request();
            let builder = BatchBuilder::new(&request.output_root, settings.reputation.clone());
            Some(builder.build(&inputs, request.run_reputation, reporter)?)
        }
        None => None,
    };

    Ok(JobOutcome { summary, reputation })
}
