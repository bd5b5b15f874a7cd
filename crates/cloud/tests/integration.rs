//! Chart and CSB service clients against mocked ArcGIS endpoints.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vbicompare_cloud::{ChartService, CloudError, CsbService, HttpClient, Paging};
use vbicompare_core::{GeoPoint, Region};

fn http() -> HttpClient {
    HttpClient::new(Duration::from_secs(5), 0).unwrap()
}

fn paging() -> Paging {
    Paging {
        page_size: 2,
        max_features: 100,
    }
}

fn chart_feature(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> serde_json::Value {
    json!({
        "attributes": { "cell_name": name },
        "geometry": { "rings": [[[x0, y0], [x0, y1], [x1, y1], [x1, y0], [x0, y0]]] }
    })
}

fn empty() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "features": [] }))
}

#[tokio::test]
async fn chart_extent_uses_band_layer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/MapServer/5/query"))
        .and(query_param("where", "CELL_NAME = 'US5MA1AM'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [chart_feature("US5MA1AM", -70.5, 42.0, -70.0, 42.5)]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/MapServer/5/query"))
        .respond_with(empty())
        .mount(&server)
        .await;

    let svc = ChartService::new(http(), format!("{}/MapServer", server.uri()), paging());

    let region = svc.chart_extent("US5MA1AM").await.unwrap().unwrap();
    assert_eq!(region.nw, GeoPoint::new(42.5, -70.5));
    assert_eq!(region.se, GeoPoint::new(42.0, -70.0));

    assert!(svc.chart_extent("US5ZZZZZ").await.unwrap().is_none());
    assert!(svc.chart_extent("USX").await.unwrap().is_none());
}

#[tokio::test]
async fn charts_in_region_merges_layers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/MapServer/1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [chart_feature("US2EC02M", -75.0, 35.0, -65.0, 45.0)]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/MapServer/3/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [
                chart_feature("US4MA1DM", -71.0, 41.5, -69.5, 43.0),
                chart_feature("US2EC02M", -75.0, 35.0, -65.0, 45.0)
            ]
        })))
        .mount(&server)
        .await;
    for layer in [2, 4] {
        Mock::given(method("GET"))
            .and(path(format!("/MapServer/{layer}/query")))
            .respond_with(empty())
            .mount(&server)
            .await;
    }

    let svc = ChartService::new(http(), format!("{}/MapServer", server.uri()), paging());
    let region = Region::new(GeoPoint::new(43.0, -70.0), GeoPoint::new(42.0, -69.0));
    let charts = svc.charts_in_region(&region).await.unwrap();

    let names: Vec<_> = charts.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["US2EC02M", "US4MA1DM"]);
    assert_eq!(charts[1].ring.len(), 5);
}

#[tokio::test]
async fn crossing_tracks_posts_polyline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/MapServer/2/query"))
        .and(body_string_contains("esriGeometryPolyline"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [{ "attributes": { "cell_name": "US3EC10M" } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(empty())
        .mount(&server)
        .await;

    let svc = ChartService::new(http(), format!("{}/MapServer", server.uri()), paging());
    let tracks = vec![
        vec![GeoPoint::new(42.0, -70.0), GeoPoint::new(42.1, -70.1)],
        vec![GeoPoint::new(42.0, -70.0)],
    ];
    let names = svc.charts_crossing_tracks(&tracks).await.unwrap();
    assert_eq!(names, vec!["US3EC10M".to_string()]);
}

#[tokio::test]
async fn service_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "code": 500, "message": "Unable to complete operation." }
        })))
        .mount(&server)
        .await;

    let svc = ChartService::new(http(), format!("{}/MapServer", server.uri()), paging());
    let res = svc.chart_extent("US5MA1AM").await;
    assert!(matches!(res, Err(CloudError::Service { code: 500, .. })));
}

fn csb_feature(platform: &str, name: &str) -> serde_json::Value {
    json!({
        "attributes": { "PLATFORM": platform, "NAME": name },
        "geometry": { "paths": [[[-70.0, 42.0], [-70.2, 42.3]]] }
    })
}

#[tokio::test]
async fn csb_platform_query_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/csb/MapServer/1/query"))
        .and(query_param("where", "PLATFORM = 'SEA HUNTER'"))
        .and(query_param("resultOffset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [
                csb_feature("SEA HUNTER", "20190222113324825195_aaaa.tar.gz"),
                csb_feature("SEA HUNTER", "20190223113324825195_bbbb.tar.gz")
            ],
            "exceededTransferLimit": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/csb/MapServer/1/query"))
        .and(query_param("resultOffset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [csb_feature("SEA HUNTER", "20190224113324825195_cccc.tar.gz")]
        })))
        .mount(&server)
        .await;

    let svc = CsbService::new(http(), &format!("{}/csb/MapServer", server.uri()), paging());
    let search = svc.tracks_for_platform("SEA HUNTER").await.unwrap();
    assert!(!search.truncated);
    let tracks = search.found;

    assert_eq!(tracks.len(), 3);
    assert_eq!(
        tracks[2].object_key().unwrap(),
        "csb/csv/2019/02/24/20190224113324825195_cccc_pointData.csv"
    );
    assert_eq!(tracks[0].path.len(), 2);
}

#[tokio::test]
async fn csb_area_groups_platforms() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/csb/MapServer/1/query"))
        .and(query_param("geometryType", "esriGeometryEnvelope"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [
                csb_feature("COPPER STAR", "20200101000000000001_a.tar.gz"),
                csb_feature("LADY JANE", "20200101000000000002_b.tar.gz"),
                csb_feature("COPPER STAR", "20200101000000000003_c.tar.gz")
            ]
        })))
        .mount(&server)
        .await;

    let svc = CsbService::new(http(), &format!("{}/csb/MapServer", server.uri()), paging());
    let region = Region::new(GeoPoint::new(43.0, -70.5), GeoPoint::new(42.0, -69.5));
    let groups = svc.tracks_in_region(&region).await.unwrap().found;

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].platform, "COPPER STAR");
    assert_eq!(groups[0].tracks.len(), 2);
    assert_eq!(groups[1].tracks[0].name, "20200101000000000002_b.tar.gz");
}

#[tokio::test]
async fn csb_search_reports_feature_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/csb/MapServer/1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [
                csb_feature("SEA HUNTER", "20190222113324825195_aaaa.tar.gz"),
                csb_feature("SEA HUNTER", "20190223113324825195_bbbb.tar.gz")
            ],
            "exceededTransferLimit": true
        })))
        .expect(2)
        .mount(&server)
        .await;

    let capped = Paging {
        page_size: 2,
        max_features: 3,
    };
    let svc = CsbService::new(http(), &format!("{}/csb/MapServer", server.uri()), capped);
    let search = svc.tracks_for_platform("SEA HUNTER").await.unwrap();

    assert!(search.truncated);
    assert_eq!(search.found.len(), 3);
}
