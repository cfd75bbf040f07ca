//! Integration tests for the download flow.
//!
//! These tests drive the engine against mock HTTP servers and a real
//! `SQLite` settings database.

mod support;

use std::sync::Arc;

use ads_downloader_core::download::{HttpClient, HttpTransferService, PacingPolicy};
use ads_downloader_core::settings::{
    DOWNLOAD_RECORD_PREFIX, DownloadRecord, FILTER_CRITERIA_KEY, load_json,
};
use ads_downloader_core::{
    Database, Engine, EngineConfig, FilterCriteria, SettingsStore, SqliteSettingsStore,
};
use ads_downloader_core::filter::StatusFilter;
use chrono::NaiveDate;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::pages::{Card, tree};
use support::socket_guard::start_mock_server_or_skip;

const BROWSER_UA_FRAGMENT: &str = "Mozilla/5.0";

async fn mount_file(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

fn config_for(server: &MockServer) -> EngineConfig {
    let mut config = EngineConfig {
        pacing: PacingPolicy::immediate(),
        visible_only: false,
        ..EngineConfig::default()
    };
    // Mock servers live on localhost, not on a content CDN.
    let host = server.address().ip().to_string();
    config.media.cdn_patterns = vec![host];
    config
}

async fn engine(
    server: &MockServer,
    output: &TempDir,
    store: Arc<dyn SettingsStore>,
) -> Engine {
    let service = Arc::new(HttpTransferService::new(
        HttpClient::new().unwrap(),
        output.path(),
    ));
    let mut engine = Engine::new(config_for(server), store, service)
        .with_today(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
    engine.init().await.unwrap();
    engine
}

#[tokio::test]
async fn test_download_writes_synthesized_files_and_records() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_file(&server, "/v/acme.mp4", b"video bytes").await;
    mount_file(&server, "/v/globex.jpg", b"image bytes").await;

    let output = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let db = Database::new(&db_dir.path().join("settings.db")).await.unwrap();
    let store: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(db));
    let mut engine = engine(&server, &output, store.clone()).await;

    let uri = server.uri();
    let tree = tree(&[
        Card::new("Acme", 0)
            .status("Active")
            .started("Mar 5, 2024")
            .video(&format!("{uri}/v/acme.mp4?tok=1")),
        Card::new("Globex", 320).image(&format!("{uri}/v/globex.jpg")),
    ]);

    let report = engine.download_all_matching(&tree).await.unwrap();

    assert_eq!(report.items_succeeded(), 2, "{report:?}");
    let video = output.path().join("acme_2024-03-05_video_active.mp4");
    assert_eq!(std::fs::read(&video).unwrap(), b"video bytes");
    assert!(output.path().join("globex_2024-06-15_image.jpg").exists());

    let keys = store.keys_with_prefix(DOWNLOAD_RECORD_PREFIX).await.unwrap();
    assert_eq!(keys.len(), 2);
    let record: DownloadRecord = load_json(store.as_ref(), &keys[0]).await.unwrap().unwrap();
    assert!(record.original_url.contains("tok=1"));
    assert_eq!(record.filename, "acme_2024-03-05_video_active.mp4");
}

#[tokio::test]
async fn test_records_from_earlier_runs_are_kept() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_file(&server, "/v/acme.mp4", b"a").await;
    mount_file(&server, "/v/globex.jpg", b"g").await;
    let output = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let db_path = db_dir.path().join("settings.db");
    let uri = server.uri();

    for card in [
        Card::new("Acme", 0).video(&format!("{uri}/v/acme.mp4")),
        Card::new("Globex", 0).image(&format!("{uri}/v/globex.jpg")),
    ] {
        let db = Database::new(&db_path).await.unwrap();
        let store: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(db.clone()));
        let mut engine = engine(&server, &output, store).await;
        let report = engine.download_all_matching(&tree(&[card])).await.unwrap();
        assert_eq!(report.items_succeeded(), 1);
        db.close().await;
    }

    let db = Database::new(&db_path).await.unwrap();
    let store = SqliteSettingsStore::new(db);
    let keys = store.keys_with_prefix(DOWNLOAD_RECORD_PREFIX).await.unwrap();
    assert_eq!(keys.len(), 2, "{keys:?}");
}

#[tokio::test]
async fn test_second_run_uniquifies_instead_of_overwriting() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_file(&server, "/v/acme.mp4", b"v").await;
    let output = TempDir::new().unwrap();
    let store: Arc<dyn SettingsStore> = Arc::new(ads_downloader_core::MemorySettingsStore::new());
    let mut engine = engine(&server, &output, store).await;
    let tree = tree(&[Card::new("Acme", 0).video(&format!("{}/v/acme.mp4", server.uri()))]);

    engine.download_all_matching(&tree).await.unwrap();
    engine.download_all_matching(&tree).await.unwrap();

    assert!(output.path().join("acme_2024-06-15_video.mp4").exists());
    assert!(output.path().join("acme_2024-06-15_video (1).mp4").exists());
    assert_eq!(engine.download_count(), 2);
}

#[tokio::test]
async fn test_forbidden_fetch_recovers_through_direct_link() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/v/guarded.mp4"))
        .and(|request: &wiremock::Request| {
            request
                .headers
                .get("user-agent")
                .and_then(|ua| ua.to_str().ok())
                .is_some_and(|ua| ua.contains(BROWSER_UA_FRAGMENT))
        })
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v/guarded.mp4"))
        .respond_with(ResponseTemplate::new(403))
        .with_priority(2)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let store: Arc<dyn SettingsStore> = Arc::new(ads_downloader_core::MemorySettingsStore::new());
    let mut engine = engine(&server, &output, store).await;
    let tree = tree(&[Card::new("Acme", 0).video(&format!("{}/v/guarded.mp4", server.uri()))]);

    let report = engine.download_all_matching(&tree).await.unwrap();

    assert_eq!(report.items_succeeded(), 1);
    assert_eq!(report.items_failed(), 0);
    assert!(output.path().join("acme_2024-06-15_video.mp4").exists());
}

#[tokio::test]
async fn test_missing_resource_fails_item_but_batch_continues() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_file(&server, "/v/ok.jpg", b"img").await;
    Mock::given(method("GET"))
        .and(path("/v/gone.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let store: Arc<dyn SettingsStore> = Arc::new(ads_downloader_core::MemorySettingsStore::new());
    let mut engine = engine(&server, &output, store).await;
    let uri = server.uri();
    let tree = tree(&[
        Card::new("Acme", 0).video(&format!("{uri}/v/gone.mp4")),
        Card::new("Globex", 320).image(&format!("{uri}/v/ok.jpg")),
    ]);

    let report = engine.download_all_matching(&tree).await.unwrap();

    assert_eq!(report.items_failed(), 1);
    assert_eq!(report.items_succeeded(), 1);
    assert_eq!(engine.download_count(), 1);
    assert!(!output.path().join("acme_2024-06-15_video.mp4").exists());
}

#[tokio::test]
async fn test_filter_criteria_survive_engine_restart() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let output = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let db_path = db_dir.path().join("settings.db");
    let criteria = FilterCriteria {
        status_filter: StatusFilter::Active,
        brand_filter: "acme".to_string(),
        ..FilterCriteria::default()
    };

    {
        let db = Database::new(&db_path).await.unwrap();
        let store: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(db.clone()));
        let mut engine = engine(&server, &output, store).await;
        let mut tree = tree(&[Card::new("Acme", 0).status("Active")]);
        engine.apply_filters(&mut tree, criteria.clone()).await.unwrap();
        db.close().await;
    }

    let db = Database::new(&db_path).await.unwrap();
    let store: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(db));
    let stored: Option<FilterCriteria> = load_json(store.as_ref(), FILTER_CRITERIA_KEY).await.unwrap();
    assert_eq!(stored.as_ref(), Some(&criteria));

    let engine = engine(&server, &output, store).await;
    assert_eq!(engine.saved_criteria(), &criteria);
    assert!(engine.filter_state().criteria().is_none(), "restored, not applied");
}
