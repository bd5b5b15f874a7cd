//! Terminal monitor for a running job.
//!
//! Draws the step and calculation bars, prints status lines above them and
//! keeps the outlines the job announced so they can be saved as GeoJSON.

use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::{json, Value};

use vbicompare_core::{BBox, GeoPoint, Severity, StatusEvent, StatusLine};

const BAR_TEMPLATE: &str = "{prefix:>12} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Outlines collected from a job's events.
#[derive(Debug, Default)]
pub struct Footprints {
    pub charts: Vec<(String, Vec<GeoPoint>)>,
    pub tiles: Vec<(String, BBox)>,
    pub tracks: Vec<(String, Vec<GeoPoint>)>,
}

impl Footprints {
    pub fn summary(&self) -> String {
        format!(
            "{} charts, {} tiles, {} tracks",
            self.charts.len(),
            self.tiles.len(),
            self.tracks.len()
        )
    }

    /// Extent of everything collected.
    pub fn extent(&self) -> Option<BBox> {
        let points = self
            .charts
            .iter()
            .chain(self.tracks.iter())
            .flat_map(|(_, pts)| pts.iter().map(|p| (p.lon, p.lat)));
        let tiles = self
            .tiles
            .iter()
            .flat_map(|(_, b)| [(b.min_x, b.min_y), (b.max_x, b.max_y)]);
        BBox::enclosing(points.chain(tiles))
    }

    /// A GeoJSON `FeatureCollection`; `kind` tells charts, tiles and tracks apart.
    pub fn to_geojson(&self) -> Value {
        let ring = |pts: &[GeoPoint]| pts.iter().map(|p| json!([p.lon, p.lat])).collect::<Vec<_>>();

        let mut features = Vec::new();
        for (name, pts) in &self.charts {
            features.push(feature("chart", name, json!({ "type": "Polygon", "coordinates": [ring(pts.as_slice())] })));
        }
        for (name, b) in &self.tiles {
            let coords = json!([[
                [b.min_x, b.min_y],
                [b.min_x, b.max_y],
                [b.max_x, b.max_y],
                [b.max_x, b.min_y],
                [b.min_x, b.min_y]
            ]]);
            features.push(feature("tile", name, json!({ "type": "Polygon", "coordinates": coords })));
        }
        for (platform, pts) in &self.tracks {
            features.push(feature(
                "track",
                platform,
                json!({ "type": "LineString", "coordinates": ring(pts.as_slice()) }),
            ));
        }

        let mut collection = json!({ "type": "FeatureCollection", "features": features });
        if let Some(b) = self.extent() {
            collection["bbox"] = json!([b.min_x, b.min_y, b.max_x, b.max_y]);
        }
        collection
    }

    pub fn write_geojson(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &self.to_geojson())?;
        out.flush()?;
        Ok(())
    }
}

fn feature(kind: &str, name: &str, geometry: Value) -> Value {
    json!({
        "type": "Feature",
        "properties": { "kind": kind, "name": name },
        "geometry": geometry
    })
}

fn bar(multi: &MultiProgress, prefix: &'static str) -> Result<ProgressBar> {
    let pb = multi.add(ProgressBar::new(0));
    pb.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)?
            .progress_chars("=> "),
    );
    pb.set_prefix(prefix);
    Ok(pb)
}

/// A status line as printed; colored by severity on a terminal.
pub fn render_line(line: &StatusLine, color: bool) -> String {
    let label = match line.severity {
        Severity::Info => return line.message.clone(),
        Severity::Warning => "warning",
        Severity::Error => "error",
        Severity::Success => "ok",
        Severity::Milestone => "==>",
    };
    if color {
        let (r, g, b) = line.severity.rgb();
        format!("\x1b[38;2;{r};{g};{b}m{label}\x1b[0m {}", line.message)
    } else {
        format!("{label} {}", line.message)
    }
}

/// Follow `events` until the job finishes or its sender goes away.
pub fn watch(events: Receiver<StatusEvent>) -> Result<Footprints> {
    let multi = MultiProgress::new();
    let color = std::io::stderr().is_terminal();
    let steps = bar(&multi, "Collecting")?;
    let mut calc: Option<ProgressBar> = None;
    let mut footprints = Footprints::default();

    for event in events.iter() {
        match event {
            StatusEvent::Status(line) => {
                let _ = multi.println(render_line(&line, color));
            }
            StatusEvent::TotalSteps(n) => steps.set_length(n as u64),
            StatusEvent::StepsComplete(n) => steps.set_position(n as u64),
            StatusEvent::CalcTotalSteps(n) => {
                let pb = match calc.take() {
                    Some(pb) => pb,
                    None => bar(&multi, "Reputation")?,
                };
                pb.set_length(n as u64);
                pb.set_position(0);
                calc = Some(pb);
            }
            StatusEvent::CalcStepsComplete(n) => {
                if let Some(pb) = &calc {
                    pb.set_position(n as u64);
                }
            }
            StatusEvent::ChartOutline { name, ring } => {
                footprints.charts.push((name, ring));
                steps.set_message(footprints.summary());
            }
            StatusEvent::TileOutline { tile, extent } => {
                footprints.tiles.push((tile, extent));
                steps.set_message(footprints.summary());
            }
            StatusEvent::Trackline { platform, path } => {
                footprints.tracks.push((platform, path));
                steps.set_message(footprints.summary());
            }
            StatusEvent::Finished => break,
        }
    }

    steps.finish();
    if let Some(pb) = calc {
        pb.finish();
    }
    Ok(footprints)
}
