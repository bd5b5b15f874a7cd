//! NOAA ENC chart status service.
//!
//! Each usage band is published as its own map-service layer. Tile and track
//! overlap queries cover layers 1-4 (bands 2-5).

use tracing::{debug, warn};

use vbicompare_core::request::chart_band;
use vbicompare_core::{BBox, GeoPoint, Region};

use crate::arcgis::{FeatureLayer, Paging, QueryParams};
use crate::error::Result;
use crate::http::HttpClient;

/// Default `MapServer` root of the chart status service.
pub const DEFAULT_CHART_SERVICE_URL: &str =
    "https://gis.charttools.noaa.gov/arcgis/rest/services/MarineChart_Services/Status_New_NOAA_ENCs/MapServer";

/// Layers searched for charts overlapping an area or track.
pub const OVERLAP_LAYERS: [u8; 4] = [1, 2, 3, 4];

/// Paths sent per polyline request.
const TRACKS_PER_REQUEST: usize = 200;

/// A chart and its coverage outline.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOutline {
    pub name: String,
    pub ring: Vec<GeoPoint>,
    pub extent: BBox,
}

/// Client for the chart status service.
#[derive(Clone)]
pub struct ChartService {
    http: HttpClient,
    service_url: String,
    paging: Paging,
}

impl ChartService {
    pub fn new(http: HttpClient, service_url: impl Into<String>, paging: Paging) -> Self {
        Self {
            http,
            service_url: service_url.into(),
            paging,
        }
    }

    fn layer(&self, layer: u8) -> FeatureLayer {
        FeatureLayer::new(self.http.clone(), &self.service_url, layer)
    }

    /// Coverage of one chart, looked up on the layer named by its band digit.
    ///
    /// Returns `None` when the name has no band digit or the service does not
    /// know the chart.
    pub async fn chart_extent(&self, cell_name: &str) -> Result<Option<Region>> {
        let Some(band) = chart_band(cell_name) else {
            warn!(cell_name, "chart name has no band digit");
            return Ok(None);
        };

        let params = QueryParams::new().where_eq("CELL_NAME", cell_name);
        let features = self.layer(band).query_all(&params, self.paging).await?.features;

        let extent = features
            .iter()
            .filter_map(|f| f.geometry.as_ref()?.extent())
            .reduce(|a, b| a.union(&b));

        debug!(cell_name, band, found = extent.is_some(), "chart extent");
        Ok(extent.map(|b| Region::from_bbox(&b)))
    }

    /// Charts whose coverage intersects `bbox`, unique by name in first-seen order.
    pub async fn charts_in_area(&self, bbox: &BBox) -> Result<Vec<ChartOutline>> {
        let params = QueryParams::new().envelope(bbox);
        let mut out: Vec<ChartOutline> = Vec::new();

        for layer in OVERLAP_LAYERS {
            for feature in self.layer(layer).query_all(&params, self.paging).await?.features {
                let Some(name) = feature.attr_str("cell_name") else {
                    continue;
                };
                if out.iter().any(|c| c.name == name) {
                    continue;
                }
                let Some(ring) = feature.first_ring() else {
                    continue;
                };
                let Some(extent) = BBox::enclosing(ring.iter().map(|p| (p.lon, p.lat))) else {
                    continue;
                };
                out.push(ChartOutline {
                    name: name.to_string(),
                    ring,
                    extent,
                });
            }
        }

        Ok(out)
    }

    /// Charts whose coverage intersects `region`.
    pub async fn charts_in_region(&self, region: &Region) -> Result<Vec<ChartOutline>> {
        self.charts_in_area(&region.bbox()).await
    }

    /// Names of charts crossed by any of the track polylines.
    pub async fn charts_crossing_tracks(&self, tracks: &[Vec<GeoPoint>]) -> Result<Vec<String>> {
        let tracks: Vec<Vec<GeoPoint>> = tracks.iter().filter(|t| t.len() >= 2).cloned().collect();
        let mut names: Vec<String> = Vec::new();

        for chunk in tracks.chunks(TRACKS_PER_REQUEST) {
            let params = QueryParams::new().polyline(chunk).return_geometry(false);
            for layer in OVERLAP_LAYERS {
                for feature in self.layer(layer).query_all(&params, self.paging).await?.features {
                    if let Some(name) = feature.attr_str("cell_name") {
                        if !names.iter().any(|n| n == name) {
                            names.push(name.to_string());
                        }
                    }
                }
            }
        }

        Ok(names)
    }
}
