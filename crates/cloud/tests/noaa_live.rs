//! Checks against the live NOAA services and buckets.
//!
//! All tests are `#[ignore]`d and need network access.
//! Run with: `cargo test -p vbicompare-cloud -- --ignored`

use std::time::Duration;

use vbicompare_cloud::bucket::DEFAULT_REGION;
use vbicompare_cloud::{
    Bucket, ChartService, CsbService, HttpClient, Paging, DEFAULT_CHART_SERVICE_URL,
    DEFAULT_CSB_SERVICE_URL, NBS_BUCKET,
};
use vbicompare_core::naming::TILE_SCHEME_PREFIX;
use vbicompare_core::{GeoPoint, Region};

fn http() -> HttpClient {
    HttpClient::new(Duration::from_secs(60), 2).unwrap()
}

/// Boston Harbor approaches.
fn boston() -> Region {
    Region::new(GeoPoint::new(42.40, -70.95), GeoPoint::new(42.30, -70.80))
}

#[tokio::test]
#[ignore]
async fn live_charts_in_region() {
    let svc = ChartService::new(http(), DEFAULT_CHART_SERVICE_URL, Paging::default());
    let charts = svc
        .charts_in_region(&boston().negative_buffer())
        .await
        .expect("chart query failed");
    println!("charts: {:?}", charts.iter().map(|c| &c.name).collect::<Vec<_>>());
    assert!(!charts.is_empty());
}

#[tokio::test]
#[ignore]
async fn live_csb_tracks_in_region() {
    let svc = CsbService::new(http(), DEFAULT_CSB_SERVICE_URL, Paging::default());
    let search = svc.tracks_in_region(&boston()).await.expect("csb query failed");
    println!("truncated: {}", search.truncated);
    for g in &search.found {
        println!("{}: {} files", g.platform, g.tracks.len());
    }
}

#[tokio::test]
#[ignore]
async fn live_tile_scheme_listing() {
    let bucket = Bucket::anonymous(NBS_BUCKET, DEFAULT_REGION, None).unwrap();
    let entries = bucket.list(TILE_SCHEME_PREFIX).await.expect("listing failed");
    println!("{entries:?}");
    assert!(entries.iter().any(|e| e.key.ends_with(".gpkg")));
}
