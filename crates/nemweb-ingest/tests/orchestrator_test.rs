//! Crawler run scenarios against a scripted transport and in-memory stores

mod common;

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use common::{iis_page, iis_row, scada_csv, zip_bytes, ScriptedTransport, BASE_URL};
use nemweb_common::Network;
use nemweb_ingest::crawler::{
    CrawlError, CrawlerDefinition, EntryOutcome, Orchestrator, RunOptions, RunState, SelectionMode,
};
use nemweb_ingest::store::{CrawlHistoryStore, CrawlerMetadata, CrawlerMetadataStore, MemoryStore};
use nemweb_ingest::IngestConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CRAWLER: &str = "test.dispatch_scada";

fn ts(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 6, 13)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// A published interval file: (filename, interval label, modified label)
struct Published {
    name: String,
    interval: String,
    modified: String,
}

fn published(minute: u32) -> Published {
    Published {
        name: format!("PUBLIC_DISPATCHSCADA_2022061300{minute:02}_00000003650485{minute:02}.zip"),
        interval: format!("2022/06/13 00:{minute:02}:00"),
        modified: format!("Monday, June 13, 2022 12:{:02} AM", minute + 1),
    }
}

fn url_of(name: &str) -> String {
    format!("{BASE_URL}{name}")
}

fn archive(file: &Published) -> Vec<u8> {
    let csv = scada_csv(&file.interval, &[("BW01", "660.5"), ("ER01", "700")]);
    let inner_name = file.name.replace(".zip", ".CSV");
    zip_bytes(&[(inner_name.as_str(), csv.as_bytes())])
}

/// Transport serving a listing of `files` and each file's archive
fn transport_for(files: &[Published]) -> ScriptedTransport {
    let rows: Vec<String> = files
        .iter()
        .map(|f| iis_row(&f.modified, 2048, &f.name, &f.name))
        .collect();

    files.iter().fold(
        ScriptedTransport::new().serve(BASE_URL, iis_page(&rows)),
        |transport, f| transport.serve(&url_of(&f.name), archive(f)),
    )
}

fn crawler() -> CrawlerDefinition {
    CrawlerDefinition::new(CRAWLER, BASE_URL, Network::Nem)
}

fn orchestrator(transport: Arc<ScriptedTransport>, store: Arc<MemoryStore>) -> Orchestrator {
    Orchestrator::with_store(transport, store, IngestConfig::default())
}

#[tokio::test]
async fn test_full_run_stores_records_history_and_watermark() {
    let files = [published(25), published(30), published(35)];
    let transport = Arc::new(transport_for(&files));
    let store = Arc::new(MemoryStore::new());

    let summary = orchestrator(transport.clone(), store.clone())
        .run(&crawler(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.inserted, 6);
    assert_eq!(summary.watermark, Some(ts(0, 36)));
    assert_eq!(summary.server_latest, Some(ts(0, 35)));

    assert_eq!(store.row_count("dispatch_unit_scada").await, 6);

    let history = store.history(CRAWLER).await;
    let intervals: Vec<NaiveDateTime> = history.iter().map(|h| h.interval).collect();
    assert_eq!(intervals, vec![ts(0, 25), ts(0, 30), ts(0, 35)]);
    assert!(history.iter().all(|h| h.records == 2));

    let metadata = store.get_metadata(CRAWLER).await.unwrap().unwrap();
    assert_eq!(metadata.last_crawled, Some(ts(0, 36)));
    assert_eq!(metadata.server_latest, Some(ts(0, 35)));
    assert!(metadata.last_processed.is_some());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let files = [published(25), published(30)];
    let transport = Arc::new(transport_for(&files));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(transport, store.clone());

    orchestrator.run(&crawler(), RunOptions::default()).await.unwrap();
    orchestrator.run(&crawler(), RunOptions::default()).await.unwrap();

    assert_eq!(store.row_count("dispatch_unit_scada").await, 4);
    assert_eq!(store.history(CRAWLER).await.len(), 2);
}

#[tokio::test]
async fn test_partial_failure_keeps_watermark() {
    let files = [published(25), published(30), published(35)];
    let transport = Arc::new(transport_for(&files).fail(&url_of(&files[1].name), 500));
    let store = Arc::new(MemoryStore::new());

    let summary = orchestrator(transport, store.clone())
        .run(&crawler(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::PartiallyFailed);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.watermark, None);

    let failed: Vec<&EntryOutcome> = summary.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].url(), url_of(&files[1].name));

    // Siblings still landed
    assert_eq!(store.row_count("dispatch_unit_scada").await, 4);
    assert_eq!(store.history(CRAWLER).await.len(), 2);
    assert!(store.get_metadata(CRAWLER).await.unwrap().is_none());
}

#[tokio::test]
async fn test_all_entries_failing_is_reported_not_raised() {
    let files = [published(25)];
    let transport = Arc::new(transport_for(&files).fail(&url_of(&files[0].name), 404));
    let store = Arc::new(MemoryStore::new());

    let summary = orchestrator(transport, store.clone())
        .run(&crawler(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::PartiallyFailed);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.processed, 0);
}

#[tokio::test]
async fn test_watermark_never_moves_backwards() {
    let store = Arc::new(MemoryStore::new());

    let newer = [published(40), published(45)];
    orchestrator(Arc::new(transport_for(&newer)), store.clone())
        .run(&crawler(), RunOptions::default())
        .await
        .unwrap();
    let first = store.get_metadata(CRAWLER).await.unwrap().unwrap();
    assert_eq!(first.last_crawled, Some(ts(0, 46)));

    let older = [published(25), published(30)];
    let summary = orchestrator(Arc::new(transport_for(&older)), store.clone())
        .run(&crawler(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.watermark, Some(ts(0, 46)));
    let second = store.get_metadata(CRAWLER).await.unwrap().unwrap();
    assert_eq!(second.last_crawled, first.last_crawled);
}

#[tokio::test]
async fn test_empty_selection_completes_without_fetching() {
    let files = [published(25)];
    let transport = Arc::new(transport_for(&files));
    let store = Arc::new(MemoryStore::new());
    store
        .set_metadata(CrawlerMetadata {
            crawler_name: CRAWLER.to_string(),
            last_crawled: Some(ts(0, 20)),
            last_processed: None,
            server_latest: None,
        })
        .await;

    let summary = orchestrator(transport.clone(), store.clone())
        .run(
            &crawler().with_filter("^PUBLIC_TRADINGIS_"),
            RunOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.listed, 0);
    assert_eq!(summary.candidates, 0);
    assert_eq!(summary.watermark, Some(ts(0, 20)));
    assert_eq!(transport.requests(), 1);
}

#[tokio::test]
async fn test_latest_selects_only_missing_intervals() {
    let files = [published(25), published(30), published(35)];
    let transport = Arc::new(transport_for(&files));
    let store = Arc::new(MemoryStore::new());
    store.record_history(CRAWLER, ts(0, 25), 2).await.unwrap();
    store.record_history(CRAWLER, ts(0, 30), 2).await.unwrap();

    // 00:40 in Brisbane
    let now = Utc.with_ymd_and_hms(2022, 6, 12, 14, 40, 0).unwrap();
    let summary = orchestrator(transport, store.clone())
        .run(&crawler().with_latest(), RunOptions::default().at(now))
        .await
        .unwrap();

    assert_eq!(summary.mode, SelectionMode::Latest { lookback_days: 1 });
    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.outcomes[0].url(), url_of(&files[2].name));
    assert_eq!(summary.watermark, Some(ts(0, 36)));
}

#[tokio::test]
async fn test_latest_wins_over_limit() {
    let files = [published(25), published(30), published(35)];
    let transport = Arc::new(transport_for(&files));
    let store = Arc::new(MemoryStore::new());
    store.record_history(CRAWLER, ts(0, 35), 2).await.unwrap();

    let now = Utc.with_ymd_and_hms(2022, 6, 12, 14, 40, 0).unwrap();
    let summary = orchestrator(transport, store)
        .run(
            &crawler().with_limit(1).with_latest(),
            RunOptions::default().at(now),
        )
        .await
        .unwrap();

    // Limit would have picked 00:35; latest picks the two gaps
    assert_eq!(summary.candidates, 2);
}

#[tokio::test]
async fn test_limit_takes_most_recently_modified() {
    let files = [published(25), published(35), published(30)];
    let transport = Arc::new(transport_for(&files));
    let store = Arc::new(MemoryStore::new());

    let summary = orchestrator(transport, store.clone())
        .run(&crawler(), RunOptions::default().with_mode(SelectionMode::Limit(2)))
        .await
        .unwrap();

    assert_eq!(summary.candidates, 2);
    let mut intervals: Vec<NaiveDateTime> =
        store.history(CRAWLER).await.iter().map(|h| h.interval).collect();
    intervals.sort();
    assert_eq!(intervals, vec![ts(0, 30), ts(0, 35)]);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let files: Vec<Published> = (0..12).map(|i| published(i * 5)).collect();
    let transport = Arc::new(transport_for(&files).with_delay(Duration::from_millis(20)));
    let store = Arc::new(MemoryStore::new());

    let summary = orchestrator(transport.clone(), store)
        .run(&crawler(), RunOptions::default().with_concurrency(3))
        .await
        .unwrap();

    assert_eq!(summary.processed, 12);
    assert!(transport.max_in_flight() <= 3);
    assert!(transport.max_in_flight() >= 2);
}

#[tokio::test]
async fn test_large_and_bulk_entries_stream_from_disk() {
    let files = [published(25), published(30)];
    let store = Arc::new(MemoryStore::new());

    // Listed size (2048) exceeds the threshold
    let config = IngestConfig {
        large_file_threshold_bytes: 1_000,
        ..IngestConfig::default()
    };
    let transport = Arc::new(transport_for(&files));
    let summary = Orchestrator::with_store(transport.clone(), store.clone(), config)
        .run(&crawler(), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(transport.downloads(), 2);
    assert_eq!(store.row_count("dispatch_unit_scada").await, 4);

    // Bulk crawlers always stream
    let transport = Arc::new(transport_for(&files));
    Orchestrator::with_store(transport.clone(), Arc::new(MemoryStore::new()), IngestConfig::default())
        .run(&crawler().with_bulk_insert(), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(transport.downloads(), 2);
}

fn streaming_config(temp_dir: &Path) -> IngestConfig {
    IngestConfig {
        large_file_threshold_bytes: 1_000,
        temp_dir: Some(temp_dir.to_path_buf()),
        ..IngestConfig::default()
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn test_streamed_entries_leave_no_temp_files() {
    let temp = tempfile::tempdir().unwrap();
    let files = [published(25), published(30), published(35)];
    let transport = Arc::new(
        transport_for(&files)
            .serve(&url_of(&files[1].name), b"PK\x03\x04garbage".to_vec())
            .fail(&url_of(&files[2].name), 404),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = Orchestrator::with_store(transport, store.clone(), streaming_config(temp.path()))
        .run(&crawler(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.errors, 2);
    assert_eq!(store.row_count("dispatch_unit_scada").await, 2);
    assert!(is_empty_dir(temp.path()));
}

#[tokio::test]
async fn test_listing_text_cannot_redirect_downloads() {
    let temp = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let file = published(25);
    let target = elsewhere.path().join(&file.name);

    let row = iis_row(&file.modified, 200_000, &file.name, &target.to_string_lossy());
    let transport = Arc::new(
        ScriptedTransport::new()
            .serve(BASE_URL, iis_page(&[row]))
            .serve(&url_of(&file.name), archive(&file)),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = Orchestrator::with_store(transport.clone(), store.clone(), streaming_config(temp.path()))
        .run(&crawler(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(transport.downloads(), 1);
    assert_eq!(store.row_count("dispatch_unit_scada").await, 2);
    assert!(!target.exists());
    assert!(is_empty_dir(elsewhere.path()));
    assert!(is_empty_dir(temp.path()));
}

#[tokio::test]
async fn test_cancelled_run_submits_nothing_and_keeps_watermark() {
    let files = [published(25), published(30)];
    let transport = Arc::new(transport_for(&files));
    let store = Arc::new(MemoryStore::new());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = orchestrator(transport.clone(), store.clone())
        .run(&crawler(), RunOptions::default().with_cancel(cancel))
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::PartiallyFailed);
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.cancelled, 2);
    assert_eq!(transport.requests(), 1);
    assert!(store.get_metadata(CRAWLER).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_rows_do_not_fail_the_entry() {
    let file = published(25);
    let csv = "I,DISPATCH,UNIT_SCADA,1,SETTLEMENTDATE,DUID,SCADAVALUE\n\
               D,DISPATCH,UNIT_SCADA,1,\"2022/06/13 00:25:00\",BW01,660\n\
               D,DISPATCH,UNIT_SCADA,1,\"2022/06/13 00:25:00\",BW02\n\
               D,DISPATCH,UNIT_SCADA,1,\"2022/06/13 00:25:00\",BW03,not-a-number\n\
               I,DISPATCH,CASE_SOLUTION,2,SETTLEMENTDATE,RUNNO\n\
               D,DISPATCH,CASE_SOLUTION,2,\"2022/06/13 00:25:00\",1\n";
    let transport = Arc::new(
        ScriptedTransport::new()
            .serve(BASE_URL, iis_page(&[iis_row(&file.modified, 512, &file.name, &file.name)]))
            .serve(&url_of(&file.name), zip_bytes(&[("a.CSV", csv.as_bytes())])),
    );
    let store = Arc::new(MemoryStore::new());

    let summary = orchestrator(transport, store.clone())
        .run(&crawler(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Completed);
    // One typed record stored; the untyped table is parsed but not stored
    assert_eq!(summary.inserted, 1);
    match &summary.outcomes[0] {
        EntryOutcome::Processed { records, .. } => assert_eq!(*records, 2),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_listing_failure_is_a_run_error() {
    let transport = Arc::new(ScriptedTransport::new().fail(BASE_URL, 503));
    let store = Arc::new(MemoryStore::new());

    let result = orchestrator(transport, store)
        .run(&crawler(), RunOptions::default())
        .await;
    assert!(matches!(result, Err(CrawlError::Listing(_))));
}

#[tokio::test]
async fn test_missing_url_is_a_run_error() {
    let transport = Arc::new(ScriptedTransport::new());
    let store = Arc::new(MemoryStore::new());
    let mut definition = crawler();
    definition.url = None;

    let result = orchestrator(transport.clone(), store)
        .run(&definition, RunOptions::default())
        .await;
    assert!(matches!(result, Err(CrawlError::MissingUrl(_))));
    assert_eq!(transport.requests(), 0);
}
