//! ArcGIS REST `MapServer/<layer>/query` data types and paging.
//!
//! Lightweight serde models covering the subset of the feature-query response
//! the NOAA chart and CSB services return: attributes, polygon rings,
//! polyline paths, the transfer-limit flag and service-level errors.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use vbicompare_core::{BBox, GeoPoint};

use crate::error::{CloudError, Result};
use crate::http::HttpClient;

/// WKID of WGS84, used for every geometry sent and requested.
pub const WGS84_WKID: u32 = 4326;

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Response of a feature query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureSet {
    #[serde(default)]
    pub features: Vec<Feature>,

    /// More features match than were returned.
    #[serde(default, rename = "exceededTransferLimit")]
    pub exceeded_transfer_limit: bool,

    #[serde(default)]
    pub error: Option<ServiceError>,

    /// Some servers answer `{"status": "error", ...}` instead of an `error` object.
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub messages: Vec<String>,
}

impl FeatureSet {
    /// Turn embedded service errors into `Err`.
    pub fn into_result(self) -> Result<Self> {
        if let Some(err) = self.error {
            let mut message = err.message;
            if !err.details.is_empty() {
                message = format!("{message} ({})", err.details.join("; "));
            }
            return Err(CloudError::Service {
                code: err.code,
                message,
            });
        }
        if self.status.as_deref() == Some("error") {
            return Err(CloudError::Service {
                code: 0,
                message: if self.messages.is_empty() {
                    "service reported an error".to_string()
                } else {
                    self.messages.join("; ")
                },
            });
        }
        Ok(self)
    }
}

/// `{"error": {...}}` body of a failed query.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
}

/// One feature: attribute map plus optional geometry.
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

impl Feature {
    /// String attribute, matched case-insensitively.
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_str())
    }

    /// First ring of a polygon geometry.
    pub fn first_ring(&self) -> Option<Vec<GeoPoint>> {
        self.geometry.as_ref()?.rings.first().map(|r| to_points(r))
    }

    /// First path of a polyline geometry.
    pub fn first_path(&self) -> Option<Vec<GeoPoint>> {
        self.geometry.as_ref()?.paths.first().map(|p| to_points(p))
    }
}

/// Polygon (`rings`) or polyline (`paths`) geometry.
///
/// Vertices are `[x, y]` with optional trailing z/m values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Geometry {
    #[serde(default)]
    pub rings: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub paths: Vec<Vec<Vec<f64>>>,
}

impl Geometry {
    /// Lon/lat extent of every vertex.
    pub fn extent(&self) -> Option<BBox> {
        BBox::enclosing(
            self.rings
                .iter()
                .chain(self.paths.iter())
                .flatten()
                .filter(|v| v.len() >= 2)
                .map(|v| (v[0], v[1])),
        )
    }
}

fn to_points(vertices: &[Vec<f64>]) -> Vec<GeoPoint> {
    vertices
        .iter()
        .filter(|v| v.len() >= 2)
        .map(|v| GeoPoint::new(v[1], v[0]))
        .collect()
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Parameters of a feature query.
#[derive(Debug, Clone)]
pub struct QueryParams {
    where_clause: Option<String>,
    geometry: Option<(String, &'static str)>,
    return_geometry: bool,
}

impl QueryParams {
    pub fn new() -> Self {
        Self {
            where_clause: None,
            geometry: None,
            return_geometry: true,
        }
    }

    /// SQL `where` clause.
    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    /// `field = 'value'`, with single quotes in the value escaped.
    pub fn where_eq(self, field: &str, value: &str) -> Self {
        self.where_clause(format!("{field} = '{}'", value.replace('\'', "''")))
    }

    /// Features intersecting a WGS84 envelope.
    pub fn envelope(mut self, bbox: &BBox) -> Self {
        let geom = json!({
            "xmin": bbox.min_x,
            "ymin": bbox.min_y,
            "xmax": bbox.max_x,
            "ymax": bbox.max_y,
            "spatialReference": { "wkid": WGS84_WKID },
        });
        self.geometry = Some((geom.to_string(), "esriGeometryEnvelope"));
        self
    }

    /// Features intersecting a WGS84 polyline.
    pub fn polyline(mut self, paths: &[Vec<GeoPoint>]) -> Self {
        let paths: Vec<Vec<[f64; 2]>> = paths
            .iter()
            .map(|p| p.iter().map(|pt| [pt.lon, pt.lat]).collect())
            .collect();
        let geom = json!({
            "paths": paths,
            "spatialReference": { "wkid": WGS84_WKID },
        });
        self.geometry = Some((geom.to_string(), "esriGeometryPolyline"));
        self
    }

    pub fn return_geometry(mut self, yes: bool) -> Self {
        self.return_geometry = yes;
        self
    }

    /// Whether the request is large enough to need a form POST.
    pub fn is_polyline(&self) -> bool {
        matches!(self.geometry, Some((_, "esriGeometryPolyline")))
    }

    /// Key/value pairs for one page of the query.
    pub fn to_pairs(&self, page: Option<(usize, usize)>) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::with_capacity(12);
        let mut push = |k: &str, v: String| pairs.push((k.to_string(), v));

        push("where", self.where_clause.clone().unwrap_or_else(|| "1=1".to_string()));
        if let Some((geom, kind)) = &self.geometry {
            push("geometry", geom.clone());
            push("geometryType", kind.to_string());
            push("inSR", WGS84_WKID.to_string());
            push("spatialRel", "esriSpatialRelIntersects".to_string());
        }
        push("outFields", "*".to_string());
        push("returnGeometry", self.return_geometry.to_string());
        push("outSR", WGS84_WKID.to_string());
        if let Some((offset, count)) = page {
            push("resultOffset", offset.to_string());
            push("resultRecordCount", count.to_string());
        }
        push("f", "json".to_string());
        pairs
    }
}

impl Default for QueryParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Page size and overall cap for [`FeatureLayer::query_all`].
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub page_size: usize,
    pub max_features: usize,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_features: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Layer
// ---------------------------------------------------------------------------

/// Features gathered by [`FeatureLayer::query_all`].
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub features: Vec<Feature>,
    /// The service matched more than `max_features`; the rest were dropped.
    pub truncated: bool,
}

/// One queryable `MapServer/<layer>` endpoint.
#[derive(Clone)]
pub struct FeatureLayer {
    http: HttpClient,
    query_url: String,
}

impl FeatureLayer {
    /// `service_url` is the `.../MapServer` root.
    pub fn new(http: HttpClient, service_url: &str, layer: u8) -> Self {
        let base = service_url.trim_end_matches('/');
        Self {
            http,
            query_url: format!("{base}/{layer}/query"),
        }
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    /// Execute one page of the query.
    pub async fn query(&self, params: &QueryParams, page: Option<(usize, usize)>) -> Result<FeatureSet> {
        let pairs = params.to_pairs(page);
        let set: FeatureSet = if params.is_polyline() {
            self.http.post_form_json(&self.query_url, &pairs).await?
        } else {
            self.http.get_json(&self.query_url, &pairs).await?
        };
        set.into_result()
    }

    /// Query with automatic paging, collecting up to `paging.max_features`.
    pub async fn query_all(&self, params: &QueryParams, paging: Paging) -> Result<QueryResult> {
        let mut all: Vec<Feature> = Vec::new();
        let page_size = paging.page_size.max(1);
        let mut more;

        loop {
            let page = self.query(params, Some((all.len(), page_size))).await?;
            let returned = page.features.len();
            all.extend(page.features);
            more = page.exceeded_transfer_limit && returned > 0;

            debug!(url = %self.query_url, returned, total = all.len(), "query page");

            if !more || all.len() >= paging.max_features {
                break;
            }
        }

        let truncated = all.len() > paging.max_features || (more && all.len() >= paging.max_features);
        if truncated {
            warn!(
                url = %self.query_url,
                max_features = paging.max_features,
                "query stopped at the feature cap; remaining features dropped"
            );
        }
        all.truncate(paging.max_features);
        Ok(QueryResult {
            features: all,
            truncated,
        })
    }
}
