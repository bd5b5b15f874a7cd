//! Whole collection jobs against mocked services and in-memory buckets.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use rusqlite::{params, Connection};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vbicompare_cloud::{Bucket, ChartService, CsbService, HttpClient, Paging};
use vbicompare_collect::reporter::{CANCELLED, DISCOVERY_COMPLETE};
use vbicompare_collect::settings::ScriptFlavor;
use vbicompare_collect::{spawn, CollectError, Settings, Sources};
use vbicompare_core::{
    CollectionRequest, DataSource, ProcessingMode, Region, SearchMethod, Severity, StatusEvent, StatusLine,
};

const SCHEME_KEY: &str = "BlueTopo/_BlueTopo_Tile_Scheme/BlueTopo_Tile_Scheme_20240101.gpkg";
const T1_KEY: &str = "BlueTopo/T1/BlueTopo_T1_20240101.tiff";
const CSB_NAME: &str = "20190222113324825195_7cb9a8c2-5d2a-4c91-ac35-13fd2340a589.tar.gz";
const CSB_KEY: &str =
    "csb/csv/2019/02/22/20190222113324825195_7cb9a8c2-5d2a-4c91-ac35-13fd2340a589_pointData.csv";
const MISSING_NAME: &str = "20190301000000000000_0b1c.tar.gz";

fn gpb_rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<u8> {
    let mut buf = b"GP".to_vec();
    buf.push(0);
    buf.push(0b0000_0011);
    buf.extend(4326i32.to_le_bytes());
    for v in [min_x, max_x, min_y, max_y] {
        buf.extend(v.to_le_bytes());
    }
    // polygon WKB, little endian
    buf.push(1);
    buf.extend(3u32.to_le_bytes());
    buf.extend(1u32.to_le_bytes());
    buf.extend(5u32.to_le_bytes());
    for (x, y) in [(min_x, min_y), (min_x, max_y), (max_x, max_y), (max_x, min_y), (min_x, min_y)] {
        buf.extend(x.to_le_bytes());
        buf.extend(y.to_le_bytes());
    }
    buf
}

fn tile_scheme_bytes(dir: &Path) -> Vec<u8> {
    let path = dir.join("scheme.gpkg");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE gpkg_contents (table_name TEXT NOT NULL PRIMARY KEY, data_type TEXT);
         INSERT INTO gpkg_contents VALUES ('BlueTopo_Tile_Scheme', 'features');
         CREATE TABLE BlueTopo_Tile_Scheme (fid INTEGER PRIMARY KEY, tile TEXT, GeoTIFF_Link TEXT, geom BLOB);",
    )
    .unwrap();
    let rows = [
        ("T1", "https://nbs.s3.amazonaws.com/BlueTopo/T1/BlueTopo_T1_20240101.tiff", (-70.0, 42.0, -69.5, 42.5)),
        ("T2", "https://nbs.s3.amazonaws.com/BlueTopo/T2/BlueTopo_T2_20240101.tiff", (-69.5, 42.0, -69.0, 42.5)),
        ("T9", "https://nbs.s3.amazonaws.com/BlueTopo/T9/BlueTopo_T9_20240101.tiff", (-60.0, 30.0, -59.5, 30.5)),
    ];
    for (tile, link, (a, b, c, d)) in rows {
        conn.execute(
            "INSERT INTO BlueTopo_Tile_Scheme (tile, GeoTIFF_Link, geom) VALUES (?1, ?2, ?3)",
            params![tile, link, gpb_rect(a, b, c, d)],
        )
        .unwrap();
    }
    drop(conn);
    fs::read(&path).unwrap()
}

async fn bucket(name: &str, objects: Vec<(&str, Vec<u8>)>) -> Bucket {
    let store = InMemory::new();
    for (key, data) in objects {
        store
            .put(&ObjectPath::from(key), PutPayload::from_bytes(Bytes::from(data)))
            .await
            .unwrap();
    }
    Bucket::with_store(name, Arc::new(store))
}

fn csb_feature(platform: &str, name: &str) -> serde_json::Value {
    json!({
        "attributes": { "PLATFORM": platform, "NAME": name },
        "geometry": { "paths": [[[-69.8, 42.2], [-69.6, 42.3]]] }
    })
}

fn features(list: Vec<serde_json::Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "features": list }))
}

async fn mock_services(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/charts/3/query"))
        .respond_with(features(vec![json!({
            "attributes": { "cell_name": "US4MA1DM" },
            "geometry": { "rings": [[[-71.0, 41.5], [-71.0, 43.0], [-69.5, 43.0], [-69.5, 41.5], [-71.0, 41.5]]] }
        })]))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/csb/1/query"))
        .and(query_param("where", "PLATFORM = 'SEA HUNTER'"))
        .respond_with(features(vec![csb_feature("SEA HUNTER", CSB_NAME)]))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/csb/1/query"))
        .and(query_param("geometryType", "esriGeometryEnvelope"))
        .respond_with(features(vec![
            csb_feature("SEA HUNTER", CSB_NAME),
            csb_feature("R/V TERN", MISSING_NAME),
        ]))
        .mount(server)
        .await;
    Mock::given(method("GET")).respond_with(features(vec![])).mount(server).await;
}

async fn sources(server: &MockServer, scheme: Vec<u8>) -> Sources {
    let paging = Paging {
        page_size: 100,
        max_features: 1000,
    };
    sources_with(server, scheme, paging).await
}

async fn sources_with(server: &MockServer, scheme: Vec<u8>, paging: Paging) -> Sources {
    let http = HttpClient::new(Duration::from_secs(5), 0).unwrap();
    Sources {
        charts: ChartService::new(http.clone(), format!("{}/charts", server.uri()), paging),
        csb: CsbService::new(http, &format!("{}/csb", server.uri()), paging),
        nbs: bucket(
            "nbs-test",
            vec![
                (SCHEME_KEY, scheme),
                (T1_KEY, b"tiff".to_vec()),
                ("BlueTopo/T1/BlueTopo_T1_20240101.tiff.aux.xml", b"<xml/>".to_vec()),
            ],
        )
        .await,
        dcdb: bucket("dcdb-test", vec![(CSB_KEY, b"lon,lat,depth\n".to_vec())]).await,
    }
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.reputation.flavor = ScriptFlavor::Sh;
    settings
}

fn area() -> SearchMethod {
    SearchMethod::Area(vec![Region::from_corners("42.4, -69.9", "42.1, -69.2").unwrap()])
}

fn statuses(events: &[StatusEvent]) -> Vec<StatusLine> {
    events
        .iter()
        .filter_map(|e| match e {
            StatusEvent::Status(line) => Some(line.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn nbs_area_cloud_with_secondary_dcdb() {
    let work = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mock_services(&server).await;
    let sources = sources(&server, tile_scheme_bytes(work.path())).await;

    let root = work.path().join("out");
    let request = CollectionRequest {
        primary: DataSource::Nbs,
        search: area(),
        secondary: true,
        mode: ProcessingMode::Cloud,
        output_root: root.clone(),
        run_reputation: false,
    };

    let (handle, rx) = spawn(request, settings(), sources);
    let events: Vec<StatusEvent> = rx.iter().collect();
    let outcome = handle.join().unwrap().unwrap();

    let summary = &outcome.summary;
    assert!(!summary.cancelled);
    assert_eq!(summary.affected_charts, vec!["US4MA1DM".to_string()]);

    let nbs_list = summary.nbs_list.as_ref().unwrap();
    assert_eq!(nbs_list.parent().unwrap(), root.join("nbs"));
    assert_eq!(
        fs::read_to_string(nbs_list).unwrap(),
        "s3://nbs-test/BlueTopo/T1/BlueTopo_T1_20240101.tiff\n"
    );
    assert!(root.join("nbs/BlueTopo_Tile_Scheme_20240101.gpkg").exists());

    let dcdb_list = summary.dcdb_list.as_ref().unwrap();
    assert_eq!(fs::read_to_string(dcdb_list).unwrap(), format!("s3://dcdb-test/{CSB_KEY}\n"));

    let run = outcome.reputation.as_ref().unwrap();
    let script = fs::read_to_string(&run.script_path).unwrap();
    assert!(script.contains(&format!(
        "csb loadrefs -d \"$DB_NAME\" -r ../../nbs/{}",
        nbs_list.file_name().unwrap().to_string_lossy()
    )));

    let lines = statuses(&events);
    assert!(lines.contains(&StatusLine::warning("No NBS files available for tile: T2")));
    assert!(lines.contains(&StatusLine::success("Collecting NBS tile: T1")));
    assert!(lines.contains(&StatusLine::warning(
        "20190301000000000000_0b1c_pointData.csv does not exist in DCDB AWS bucket. Skipping"
    )));
    assert!(lines.contains(&StatusLine::info(
        "MCD charts [1] potentially affected by selected datasets include: US4MA1DM"
    )));
    assert!(lines.contains(&StatusLine::milestone(DISCOVERY_COMPLETE)));

    assert_eq!(events[0], StatusEvent::TotalSteps(9));
    assert!(events.contains(&StatusEvent::StepsComplete(9)));
    assert!(events
        .iter()
        .any(|e| matches!(e, StatusEvent::TileOutline { tile, .. } if tile == "T1")));
    assert!(events
        .iter()
        .any(|e| matches!(e, StatusEvent::ChartOutline { name, .. } if name == "US4MA1DM")));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, StatusEvent::Trackline { .. }))
            .count(),
        1
    );
    assert_eq!(events.last(), Some(&StatusEvent::Finished));
}

#[tokio::test]
async fn dcdb_vessel_local_replaces_corrupt_copy() {
    let work = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mock_services(&server).await;
    let sources = sources(&server, tile_scheme_bytes(work.path())).await;

    let root = work.path().join("out");
    let platform_dir = root.join("dcdb/SEA HUNTER");
    let file_name = CSB_KEY.rsplit('/').next().unwrap();
    fs::create_dir_all(&platform_dir).unwrap();
    fs::write(platform_dir.join(file_name), b"truncated").unwrap();

    let request = CollectionRequest {
        primary: DataSource::Dcdb,
        search: SearchMethod::Vessels(vec![" sea hunter ".to_string()]),
        secondary: false,
        mode: ProcessingMode::Local,
        output_root: root.clone(),
        run_reputation: false,
    };

    let (handle, rx) = spawn(request, settings(), sources);
    let events: Vec<StatusEvent> = rx.iter().collect();
    let outcome = handle.join().unwrap().unwrap();

    assert!(outcome.reputation.is_none());
    assert!(outcome.summary.nbs_list.is_none());

    let local = platform_dir.join(file_name);
    assert_eq!(fs::read(&local).unwrap(), b"lon,lat,depth\n");
    assert_eq!(fs::read(platform_dir.join("Archive").join(file_name)).unwrap(), b"truncated");

    let list = outcome.summary.dcdb_list.unwrap();
    assert!(list.file_name().unwrap().to_string_lossy().starts_with("dcdb_filepaths_"));
    assert_eq!(fs::read_to_string(list).unwrap(), format!("{}\n", local.display()));

    let lines = statuses(&events);
    assert!(lines.contains(&StatusLine::warning(format!("Moving corrupt {file_name} to Archive"))));
    assert_eq!(events[0], StatusEvent::TotalSteps(6));
    assert_eq!(events.last(), Some(&StatusEvent::Finished));
}

#[tokio::test]
async fn empty_area_is_cancelled() {
    let work = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mock_services(&server).await;
    let sources = sources(&server, tile_scheme_bytes(work.path())).await;

    let request = CollectionRequest {
        primary: DataSource::Nbs,
        search: SearchMethod::Area(vec![Region::from_corners("10.5, 10.0", "10.0, 10.5").unwrap()]),
        secondary: true,
        mode: ProcessingMode::Cloud,
        output_root: work.path().join("out"),
        run_reputation: false,
    };

    let (handle, rx) = spawn(request, settings(), sources);
    let events: Vec<StatusEvent> = rx.iter().collect();
    let outcome = handle.join().unwrap().unwrap();

    assert!(outcome.summary.cancelled);
    assert!(outcome.summary.nbs_list.is_none());
    assert!(outcome.reputation.is_none());

    let lines = statuses(&events);
    assert!(lines.contains(&StatusLine::warning("No NBS tile data available in given area.")));
    assert!(lines.contains(&StatusLine::milestone(CANCELLED)));
    assert!(!lines.contains(&StatusLine::milestone(DISCOVERY_COMPLETE)));

    let StatusEvent::TotalSteps(total) = events[0] else {
        panic!("first event should announce the step total");
    };
    assert!(events.contains(&StatusEvent::StepsComplete(total)));
}

#[tokio::test]
async fn invalid_request_fails_with_every_problem() {
    let work = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let sources = sources(&server, tile_scheme_bytes(work.path())).await;

    let request = CollectionRequest {
        primary: DataSource::Nbs,
        search: SearchMethod::Vessels(vec![]),
        secondary: false,
        mode: ProcessingMode::Cloud,
        output_root: work.path().join("my data"),
        run_reputation: true,
    };

    let (handle, rx) = spawn(request, settings(), sources);
    let events: Vec<StatusEvent> = rx.iter().collect();
    let err = handle.join().unwrap().unwrap_err();

    let CollectError::Core(core) = &err else {
        panic!("expected a validation error, got {err}");
    };
    assert_eq!(core.problems().len(), 4);
    assert!(matches!(events.iter().rev().nth(1), Some(StatusEvent::CalcStepsComplete(_))));
    assert_eq!(events.last(), Some(&StatusEvent::Finished));
}

#[tokio::test]
async fn nbs_area_local_archives_outdated_tiles() {
    let work = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mock_services(&server).await;
    let sources = sources(&server, tile_scheme_bytes(work.path())).await;

    let root = work.path().join("out");
    let tile_dir = root.join("nbs/tiles/T1");
    fs::create_dir_all(&tile_dir).unwrap();
    let outdated = tile_dir.join("BlueTopo_T1_20231201.tiff");
    fs::write(&outdated, b"old tiff").unwrap();
    fs::write(root.join("nbs/BlueTopo_Tile_Scheme_20230101.gpkg"), b"old scheme").unwrap();

    let request = CollectionRequest {
        primary: DataSource::Nbs,
        search: area(),
        secondary: false,
        mode: ProcessingMode::Local,
        output_root: root.clone(),
        run_reputation: false,
    };

    let (handle, rx) = spawn(request, settings(), sources);
    let events: Vec<StatusEvent> = rx.iter().collect();
    let outcome = handle.join().unwrap().unwrap();

    assert!(outcome.reputation.is_none());
    assert!(outcome.summary.dcdb_list.is_none());
    assert_eq!(outcome.summary.affected_charts, vec!["US4MA1DM".to_string()]);

    assert_eq!(
        fs::read(tile_dir.join("Archive/BlueTopo_T1_20231201.tiff")).unwrap(),
        b"old tiff"
    );
    assert!(!outdated.exists());
    assert!(root.join("nbs/Archive/BlueTopo_Tile_Scheme_20230101.gpkg").exists());
    assert!(root.join("nbs/BlueTopo_Tile_Scheme_20240101.gpkg").exists());

    let tiff = tile_dir.join("BlueTopo_T1_20240101.tiff");
    assert_eq!(fs::read(&tiff).unwrap(), b"tiff");
    assert!(tile_dir.join("BlueTopo_T1_20240101.tiff.aux.xml").exists());

    let list = outcome.summary.nbs_list.unwrap();
    assert!(list.file_name().unwrap().to_string_lossy().starts_with("nbs_filepaths_"));
    assert_eq!(fs::read_to_string(list).unwrap(), format!("{}\n", tiff.display()));

    let lines = statuses(&events);
    assert!(lines.contains(&StatusLine::info(format!("Archiving outdated {}", outdated.display()))));
    assert!(lines.contains(&StatusLine::warning("No NBS files available for tile: T2")));
    assert_eq!(events[0], StatusEvent::TotalSteps(6));
    assert!(events.contains(&StatusEvent::StepsComplete(6)));
    assert_eq!(events.last(), Some(&StatusEvent::Finished));
}

#[tokio::test]
async fn dcdb_vessel_with_secondary_nbs_from_crossed_charts() {
    let work = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/charts/3/query"))
        .respond_with(features(vec![json!({ "attributes": { "cell_name": "US4MA1DM" } })]))
        .mount(&server)
        .await;
    Mock::given(method("POST")).respond_with(features(vec![])).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/charts/4/query"))
        .and(query_param("where", "CELL_NAME = 'US4MA1DM'"))
        .respond_with(features(vec![json!({
            "attributes": { "cell_name": "US4MA1DM" },
            "geometry": { "rings": [[[-71.0, 41.5], [-71.0, 43.0], [-69.5, 43.0], [-69.5, 41.5], [-71.0, 41.5]]] }
        })]))
        .mount(&server)
        .await;
    mock_services(&server).await;
    let sources = sources(&server, tile_scheme_bytes(work.path())).await;

    let root = work.path().join("out");
    let request = CollectionRequest {
        primary: DataSource::Dcdb,
        search: SearchMethod::Vessels(vec!["SEA HUNTER".to_string()]),
        secondary: true,
        mode: ProcessingMode::Cloud,
        output_root: root.clone(),
        run_reputation: false,
    };

    let (handle, rx) = spawn(request, settings(), sources);
    let events: Vec<StatusEvent> = rx.iter().collect();
    let outcome = handle.join().unwrap().unwrap();

    let summary = &outcome.summary;
    assert!(!summary.cancelled);
    assert_eq!(summary.affected_charts, vec!["US4MA1DM".to_string()]);
    assert_eq!(
        fs::read_to_string(summary.dcdb_list.as_ref().unwrap()).unwrap(),
        format!("s3://dcdb-test/{CSB_KEY}\n")
    );
    assert_eq!(
        fs::read_to_string(summary.nbs_list.as_ref().unwrap()).unwrap(),
        "s3://nbs-test/BlueTopo/T1/BlueTopo_T1_20240101.tiff\n"
    );
    assert!(outcome.reputation.is_some());

    let lines = statuses(&events);
    assert!(lines.contains(&StatusLine::info("CSB tracks cross 1 MCD charts: US4MA1DM")));
    assert!(lines
        .iter()
        .any(|l| l.severity == Severity::Info && l.message.starts_with("Chart US4MA1DM extent:")));
    assert!(lines.contains(&StatusLine::milestone(DISCOVERY_COMPLETE)));

    assert_eq!(events[0], StatusEvent::TotalSteps(11));
    assert!(events.contains(&StatusEvent::StepsComplete(11)));
    assert_eq!(events.last(), Some(&StatusEvent::Finished));
}

#[cfg(unix)]
#[tokio::test]
async fn reputation_runs_from_relative_root() {
    let work = tempfile::Builder::new().prefix("job").tempdir_in(".").unwrap();
    let rel = PathBuf::from(work.path().file_name().unwrap());
    let server = MockServer::start().await;
    mock_services(&server).await;
    let sources = sources(&server, tile_scheme_bytes(work.path())).await;

    fs::write(work.path().join("platforms.json"), b"{}").unwrap();
    fs::write(work.path().join("waterlevels.txt"), b"").unwrap();
    fs::write(
        work.path().join("activate.sh"),
        "csb() {\n\
         \x20   case \"$1\" in\n\
         \x20       loadplatf|loadobscsv|loadrefs)\n\
         \x20           if [ ! -f \"$5\" ]; then echo \"ERROR missing $5\"; return 1; fi;;\n\
         \x20   esac\n\
         \x20   echo \"csb $1 done\"\n\
         }\n",
    )
    .unwrap();

    let mut settings = settings();
    settings.reputation.platforms_file = rel.join("platforms.json");
    settings.reputation.water_levels_file = rel.join("waterlevels.txt");
    settings.reputation.activation_script = Some(rel.join("activate.sh"));

    let request = CollectionRequest {
        primary: DataSource::Nbs,
        search: area(),
        secondary: true,
        mode: ProcessingMode::Cloud,
        output_root: rel.join("out"),
        run_reputation: true,
    };

    let (handle, rx) = spawn(request, settings, sources);
    let events: Vec<StatusEvent> = rx.iter().collect();
    let outcome = handle.join().unwrap().unwrap();

    assert!(outcome.summary.nbs_list.as_ref().unwrap().is_absolute());
    assert!(outcome.reputation.as_ref().unwrap().run_dir.is_absolute());

    let lines = statuses(&events);
    assert!(lines.contains(&StatusLine::info("csb loadrefs done")));
    assert!(lines.contains(&StatusLine::info("csb detrep done")));
    assert!(lines
        .iter()
        .any(|l| l.severity == Severity::Milestone && l.message.starts_with("Calculation Complete. Files located at")));
    assert!(!lines.iter().any(|l| l.severity == Severity::Error), "{lines:?}");
    assert!(!lines.iter().any(|l| l.message.starts_with("Reputation input")));
    assert_eq!(events.last(), Some(&StatusEvent::Finished));
}

#[tokio::test]
async fn vessel_search_over_feature_cap_is_reported() {
    let work = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/csb/1/query"))
        .and(query_param("where", "PLATFORM = 'BUSY BOAT'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [csb_feature("BUSY BOAT", CSB_NAME), csb_feature("BUSY BOAT", MISSING_NAME)],
            "exceededTransferLimit": true
        })))
        .mount(&server)
        .await;
    mock_services(&server).await;
    let paging = Paging {
        page_size: 100,
        max_features: 1,
    };
    let sources = sources_with(&server, tile_scheme_bytes(work.path()), paging).await;

    let request = CollectionRequest {
        primary: DataSource::Dcdb,
        search: SearchMethod::Vessels(vec!["BUSY BOAT".to_string()]),
        secondary: false,
        mode: ProcessingMode::Cloud,
        output_root: work.path().join("out"),
        run_reputation: false,
    };

    let (handle, rx) = spawn(request, settings(), sources);
    let events: Vec<StatusEvent> = rx.iter().collect();
    let outcome = handle.join().unwrap().unwrap();

    assert_eq!(
        fs::read_to_string(outcome.summary.dcdb_list.unwrap()).unwrap(),
        format!("s3://dcdb-test/{CSB_KEY}\n")
    );

    let lines = statuses(&events);
    assert!(lines.contains(&StatusLine::info("1 CSB files found for vessel: BUSY BOAT")));
    assert!(lines.contains(&StatusLine::warning(
        "CSB search for vessel BUSY BOAT stopped at 1 files; the rest were not collected."
    )));
}
