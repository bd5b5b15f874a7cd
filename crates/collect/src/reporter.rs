//! Status reporting from a running job to its monitor.

use crossbeam_channel::Sender;
use tracing::debug;

use vbicompare_core::{BBox, GeoPoint, Severity, StatusEvent, StatusLine};

/// Milestone ending a job that found nothing to collect.
pub const CANCELLED: &str = "Request Cancelled.";

/// Milestone ending a job that collected everything it was asked for.
pub const DISCOVERY_COMPLETE: &str = "Data Discovery Complete.";

/// Sends [`StatusEvent`]s and keeps the step counters.
///
/// A monitor that has gone away is not an error; events are dropped.
pub struct Reporter {
    tx: Sender<StatusEvent>,
    total: usize,
    complete: usize,
    calc_total: usize,
    calc_complete: usize,
}

impl Reporter {
    pub fn new(tx: Sender<StatusEvent>) -> Self {
        Self {
            tx,
            total: 0,
            complete: 0,
            calc_total: 0,
            calc_complete: 0,
        }
    }

    fn send(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }

    /// Announce the step total and reset progress.
    pub fn begin(&mut self, total: usize) {
        self.total = total;
        self.complete = 0;
        self.send(StatusEvent::TotalSteps(total));
        self.send(StatusEvent::StepsComplete(0));
    }

    /// One step done.
    pub fn step_done(&mut self) {
        self.complete = (self.complete + 1).min(self.total);
        self.send(StatusEvent::StepsComplete(self.complete));
    }

    /// Mark every step done.
    pub fn fill(&mut self) {
        self.complete = self.total;
        self.send(StatusEvent::StepsComplete(self.complete));
    }

    pub fn steps_complete(&self) -> usize {
        self.complete
    }

    pub fn status(&self, severity: Severity, message: impl Into<String>) {
        let line = StatusLine::new(severity, message);
        debug!(severity = ?line.severity, "{}", line.message);
        self.send(StatusEvent::Status(line));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.status(Severity::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.status(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.status(Severity::Error, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.status(Severity::Success, message);
    }

    pub fn milestone(&self, message: impl Into<String>) {
        self.status(Severity::Milestone, message);
    }

    /// Warn, announce the cancellation and fill the bar.
    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.warning(reason);
        self.milestone(CANCELLED);
        self.fill();
    }

    pub fn chart_outline(&self, name: &str, ring: Vec<GeoPoint>) {
        self.send(StatusEvent::ChartOutline {
            name: name.to_string(),
            ring,
        });
    }

    pub fn tile_outline(&self, tile: &str, extent: BBox) {
        self.send(StatusEvent::TileOutline {
            tile: tile.to_string(),
            extent,
        });
    }

    pub fn trackline(&self, platform: &str, path: Vec<GeoPoint>) {
        self.send(StatusEvent::Trackline {
            platform: platform.to_string(),
            path,
        });
    }

    /// Announce the reputation-calculation step total.
    pub fn calc_begin(&mut self, total: usize) {
        self.calc_total = total;
        self.calc_complete = 0;
        self.send(StatusEvent::CalcTotalSteps(total));
    }

    pub fn calc_step_done(&mut self) {
        self.calc_complete = (self.calc_complete + 1).min(self.calc_total);
        self.send(StatusEvent::CalcStepsComplete(self.calc_complete));
    }

    pub fn calc_fill(&mut self) {
        self.calc_complete = self.calc_total;
        self.send(StatusEvent::CalcStepsComplete(self.calc_complete));
    }

    /// Last event of a job.
    pub fn finished(&self) {
        self.send(StatusEvent::Finished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_fills_bar() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut r = Reporter::new(tx);
        r.begin(5);
        r.step_done();
        r.cancel("nothing here");

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events[0], StatusEvent::TotalSteps(5));
        assert_eq!(events[2], StatusEvent::StepsComplete(1));
        assert_eq!(events[3], StatusEvent::Status(StatusLine::warning("nothing here")));
        assert_eq!(events[4], StatusEvent::Status(StatusLine::milestone(CANCELLED)));
        assert_eq!(events[5], StatusEvent::StepsComplete(5));
    }

    #[test]
    fn steps_never_pass_total() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut r = Reporter::new(tx);
        r.begin(1);
        r.step_done();
        r.step_done();
        assert_eq!(r.steps_complete(), 1);
    }

    #[test]
    fn dropped_monitor_is_ignored() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let mut r = Reporter::new(tx);
        r.begin(2);
        r.info("still fine");
        r.finished();
    }
}
