//! # VBI Compare Cloud
//!
//! Access to the remote holdings a collection job reads from.
//!
//! - [`ChartService`]: NOAA ENC chart status service (ArcGIS REST)
//! - [`CsbService`]: DCDB crowdsourced bathymetry track service (ArcGIS REST)
//! - [`Bucket`]: anonymous S3 access to the BlueTopo and DCDB buckets
//! - [`TileScheme`]: the BlueTopo tile-scheme GeoPackage

pub mod arcgis;
pub mod bucket;
pub mod charts;
pub mod csb;
pub mod error;
pub mod gpb;
pub mod http;
pub mod tile_scheme;

pub use arcgis::{FeatureLayer, FeatureSet, Paging, QueryParams, QueryResult};
pub use bucket::{Bucket, ObjectEntry, DCDB_BUCKET, NBS_BUCKET};
pub use charts::{ChartOutline, ChartService, DEFAULT_CHART_SERVICE_URL};
pub use csb::{CsbService, CsbTrack, PlatformTracks, TrackSearch, DEFAULT_CSB_SERVICE_URL};
pub use error::{CloudError, Result};
pub use http::HttpClient;
pub use tile_scheme::{TileDescriptor, TileScheme};
