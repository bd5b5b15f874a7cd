//! Status events sent from a running collection job to its monitor.

use serde::Serialize;

use crate::region::{BBox, GeoPoint};

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
    /// Phase boundaries such as `Request Cancelled.`
    Milestone,
}

impl Severity {
    /// Display colour as an HTML hex string.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Info => "#000000",
            Severity::Warning => "#CCA70E",
            Severity::Error => "#CF0D04",
            Severity::Success => "#11B01A",
            Severity::Milestone => "#1C5BC2",
        }
    }

    /// Colour as an RGB triple.
    pub fn rgb(&self) -> (u8, u8, u8) {
        let hex = &self.color()[1..];
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
        (channel(0), channel(2), channel(4))
    }
}

/// One line of status text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusLine {
    pub severity: Severity,
    pub message: String,
}

impl StatusLine {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(Severity::Info, msg)
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self::new(Severity::Warning, msg)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(Severity::Error, msg)
    }

    pub fn success(msg: impl Into<String>) -> Self {
        Self::new(Severity::Success, msg)
    }

    pub fn milestone(msg: impl Into<String>) -> Self {
        Self::new(Severity::Milestone, msg)
    }
}

/// Messages sent from the worker thread to the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StatusEvent {
    /// A status line for the log.
    Status(StatusLine),
    /// Total number of collection steps.
    TotalSteps(usize),
    /// Collection steps finished so far.
    StepsComplete(usize),
    /// Outline of an affected ENC chart.
    ChartOutline { name: String, ring: Vec<GeoPoint> },
    /// Extent of a BlueTopo tile with data.
    TileOutline { tile: String, extent: BBox },
    /// Track of a CSB file.
    Trackline { platform: String, path: Vec<GeoPoint> },
    /// Total number of reputation-calculation steps.
    CalcTotalSteps(usize),
    /// Reputation-calculation steps finished so far.
    CalcStepsComplete(usize),
    /// The worker is done; no further events follow.
    Finished,
}

impl From<StatusLine> for StatusEvent {
    fn from(line: StatusLine) -> Self {
        StatusEvent::Status(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_colors() {
        assert_eq!(Severity::Warning.color(), "#CCA70E");
        assert_eq!(Severity::Error.rgb(), (0xCF, 0x0D, 0x04));
        assert_eq!(Severity::Info.rgb(), (0, 0, 0));
    }

    #[test]
    fn line_into_event() {
        let ev: StatusEvent = StatusLine::success("done").into();
        assert_eq!(
            ev,
            StatusEvent::Status(StatusLine {
                severity: Severity::Success,
                message: "done".into()
            })
        );
    }
}
