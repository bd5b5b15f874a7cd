//! DCDB crowdsourced bathymetry (CSB) track service.

use tracing::debug;

use vbicompare_core::naming::csb_object_key;
use vbicompare_core::{GeoPoint, Region};

use crate::arcgis::{Feature, FeatureLayer, Paging, QueryParams};
use crate::error::Result;
use crate::http::HttpClient;

/// Default `MapServer` root of the CSB service.
pub const DEFAULT_CSB_SERVICE_URL: &str = "https://gis.ngdc.noaa.gov/arcgis/rest/services/csb/MapServer";

/// Layer holding one feature per CSB file.
pub const CSB_TRACK_LAYER: u8 = 1;

/// One CSB file: the platform that logged it, its archive name and its track.
#[derive(Debug, Clone, PartialEq)]
pub struct CsbTrack {
    pub platform: String,
    pub name: String,
    pub path: Vec<GeoPoint>,
}

impl CsbTrack {
    fn from_feature(feature: &Feature) -> Option<Self> {
        Some(Self {
            platform: feature.attr_str("PLATFORM")?.to_string(),
            name: feature.attr_str("NAME")?.to_string(),
            path: feature.first_path().unwrap_or_default(),
        })
    }

    /// Key of the point-data CSV in the DCDB bucket.
    pub fn object_key(&self) -> vbicompare_core::Result<String> {
        csb_object_key(&self.name)
    }
}

/// Tracks of one platform, in service order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformTracks {
    pub platform: String,
    pub tracks: Vec<CsbTrack>,
}

/// Outcome of a track search.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSearch<T> {
    pub found: Vec<T>,
    /// More files matched than the configured feature cap.
    pub truncated: bool,
}

/// Client for the CSB service.
#[derive(Clone)]
pub struct CsbService {
    layer: FeatureLayer,
    paging: Paging,
}

impl CsbService {
    pub fn new(http: HttpClient, service_url: &str, paging: Paging) -> Self {
        Self {
            layer: FeatureLayer::new(http, service_url, CSB_TRACK_LAYER),
            paging,
        }
    }

    /// All files logged by the named platform.
    pub async fn tracks_for_platform(&self, platform: &str) -> Result<TrackSearch<CsbTrack>> {
        let params = QueryParams::new().where_eq("PLATFORM", platform);
        let result = self.layer.query_all(&params, self.paging).await?;
        let tracks: Vec<CsbTrack> = result.features.iter().filter_map(CsbTrack::from_feature).collect();
        debug!(platform, files = tracks.len(), truncated = result.truncated, "platform tracks");
        Ok(TrackSearch {
            found: tracks,
            truncated: result.truncated,
        })
    }

    /// Files whose tracks intersect `region`, grouped by platform in
    /// first-seen order.
    pub async fn tracks_in_region(&self, region: &Region) -> Result<TrackSearch<PlatformTracks>> {
        let params = QueryParams::new().envelope(&region.bbox());
        let result = self.layer.query_all(&params, self.paging).await?;
        let grouped = group_by_platform(result.features.iter().filter_map(CsbTrack::from_feature));
        debug!(region = %region, platforms = grouped.len(), truncated = result.truncated, "area tracks");
        Ok(TrackSearch {
            found: grouped,
            truncated: result.truncated,
        })
    }
}

/// Group tracks by platform, keeping platforms and tracks in first-seen order.
pub fn group_by_platform<I>(tracks: I) -> Vec<PlatformTracks>
where
    I: IntoIterator<Item = CsbTrack>,
{
    let mut groups: Vec<PlatformTracks> = Vec::new();
    for track in tracks {
        match groups.iter_mut().find(|g| g.platform == track.platform) {
            Some(group) => group.tracks.push(track),
            None => groups.push(PlatformTracks {
                platform: track.platform.clone(),
                tracks: vec![track],
            }),
        }
    }
    groups
}
