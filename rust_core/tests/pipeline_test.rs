//! Pipeline Integration Tests
//!
//! Full runs over saved sportsbook pages against an in-memory downstream API.

use async_trait::async_trait;
use oddsline_rust_core::{
    ApiError, EventConfig, EventType, FileGameDirectory, GameId, GameKey, MemoryGameDirectory,
    NewGame, OddsApi, OddsPipeline, OddsReceipt, PageSnapshot, PageSource, Payload,
    PipelineError, RetryPolicy, SourceError, StaticPageSource, StrategyId, SubmissionClient,
    SubmissionStage,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const NBA_PAGE: &str = include_str!("fixtures/nba_championship.html");
const NFL_DIVISION_PAGE: &str = include_str!("fixtures/nfl_division.html");
const NBA_REDESIGNED_PAGE: &str = include_str!("fixtures/nba_redesigned.html");
const NBA_PLAIN_TEXT_PAGE: &str = include_str!("fixtures/nba_plain_text.html");
const NOT_FOUND_PAGE: &str = include_str!("fixtures/not_found.html");

#[derive(Default)]
struct RecordingApi {
    creates: AtomicU32,
    submits: AtomicU32,
    next_id: AtomicI64,
    create_delay: Option<Duration>,
    submitted: Mutex<Vec<Payload>>,
}

impl RecordingApi {
    fn slow(delay: Duration) -> Self {
        Self {
            create_delay: Some(delay),
            ..Self::default()
        }
    }
}

#[async_trait]
impl OddsApi for RecordingApi {
    async fn create_game(&self, _game: &NewGame) -> Result<GameId, ApiError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(GameId(5000 + self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn submit_odds(&self, _game_id: GameId, payload: &Payload) -> Result<OddsReceipt, ApiError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().push(payload.clone());
        Ok(OddsReceipt {
            accepted_count: payload.entry_count(),
            rejected: Vec::new(),
        })
    }
}

/// Never answers within any test's timeout.
struct StalledSource;

#[async_trait]
impl PageSource for StalledSource {
    async fn fetch(&self, _config: &EventConfig) -> Result<PageSnapshot, SourceError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(SourceError {
            url: "unreachable".to_string(),
            status: None,
            reason: "stalled".to_string(),
        })
    }
}

fn nba_config() -> EventConfig {
    EventConfig::new(
        "NBA",
        "NBA Championship",
        EventType::Championship,
        "https://sportsbook.example/nba",
        3102,
        1,
    )
    .with_season("2025-26")
}

fn nfl_division_config() -> EventConfig {
    EventConfig::new(
        "NFL",
        "Division Winner",
        EventType::Division,
        "https://sportsbook.example/nfl",
        3101,
        3,
    )
    .with_season("2025-26")
}

fn submitter(api: Arc<RecordingApi>) -> Arc<SubmissionClient> {
    Arc::new(
        SubmissionClient::new(api, Arc::new(MemoryGameDirectory::new()))
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1))),
    )
}

fn pipeline(html: &str) -> OddsPipeline {
    OddsPipeline::new(Arc::new(StaticPageSource::new(html)))
}

#[tokio::test]
async fn test_championship_run_end_to_end() {
    let api = Arc::new(RecordingApi::default());
    let report = pipeline(NBA_PAGE)
        .with_submitter(submitter(api.clone()))
        .run(&nba_config())
        .await
        .unwrap();

    assert_eq!(report.strategy, StrategyId::PrimarySelectors);
    assert!(!report.realigned);
    assert_eq!(report.event_type, EventType::Championship);
    assert_eq!(report.entries, 4);
    assert_eq!(report.diagnostics.pairs_seen, 5);
    assert_eq!(report.diagnostics.duplicate, 1);

    let submission = report.submission.unwrap();
    assert_eq!(submission.game_id, GameId(5000));
    assert_eq!(submission.accepted_count, 4);
    assert!(submission.rejected.is_empty());

    let submitted = api.submitted.lock();
    let entries = submitted[0].entries();
    let rows: Vec<(&str, i32)> = entries
        .iter()
        .map(|e| (e.label.display.as_str(), e.price.value))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("Boston Celtics", 260),
            ("Oklahoma City Thunder", 225),
            ("Los Angeles Lakers", 900),
            ("New York Knicks", 600),
        ]
    );
}

#[tokio::test]
async fn test_lakers_keep_first_price() {
    let prepared = pipeline(NBA_PAGE).prepare(&nba_config()).await.unwrap();

    let lakers: Vec<_> = prepared
        .payload
        .entries()
        .into_iter()
        .filter(|e| e.label.canonical == "los angeles lakers")
        .collect();
    assert_eq!(lakers.len(), 1);
    assert_eq!(lakers[0].price.value, 900);
    assert_eq!(lakers[0].price.original, 1200);

    let dropped = &prepared.diagnostics.dropped;
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].label_text, "LA Lakers");
}

#[tokio::test]
async fn test_division_groups_follow_header_order() {
    let prepared = pipeline(NFL_DIVISION_PAGE)
        .prepare(&nfl_division_config())
        .await
        .unwrap();

    let groups = prepared.payload.groups();
    let labels: Vec<&str> = groups.iter().map(|g| g.group.label.as_str()).collect();
    assert_eq!(labels, vec!["AFC East", "AFC North", "NFC West"]);
    assert!(groups.iter().all(|g| g.teams.len() == 2));

    assert_eq!(groups[0].group.conference.as_deref(), Some("AFC"));
    assert_eq!(groups[2].group.conference.as_deref(), Some("NFC"));

    let afc_east: Vec<(&str, i32)> = groups[0]
        .teams
        .iter()
        .map(|e| (e.label.display.as_str(), e.price.value))
        .collect();
    assert_eq!(afc_east, vec![("Buffalo Bills", -185), ("Miami Dolphins", 300)]);

    let document = prepared.payload.to_document();
    assert_eq!(document["event_type"], "division");
    assert_eq!(document["groups"].as_array().map(|g| g.len()), Some(3));
}

#[tokio::test]
async fn test_redesigned_page_falls_back_to_generalized_selectors() {
    let prepared = pipeline(NBA_REDESIGNED_PAGE)
        .prepare(&nba_config())
        .await
        .unwrap();

    assert_eq!(prepared.strategy, StrategyId::GeneralizedSelectors);
    assert_eq!(prepared.attempts.len(), 2);
    assert!(!prepared.attempts[0].accepted);
    assert_eq!(prepared.payload.entry_count(), 2);
}

#[tokio::test]
async fn test_unmarked_page_falls_back_to_text_pattern() {
    let prepared = pipeline(NBA_PLAIN_TEXT_PAGE)
        .prepare(&nba_config())
        .await
        .unwrap();

    assert_eq!(prepared.strategy, StrategyId::TextPattern);
    assert_eq!(prepared.attempts.len(), 3);
    assert!(!prepared.attempts[0].accepted);
    assert!(!prepared.attempts[1].accepted);
    assert!(prepared.attempts[2].accepted);

    let entries = prepared.payload.entries();
    let rows: Vec<(&str, i32)> = entries
        .iter()
        .map(|e| (e.label.display.as_str(), e.price.value))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("Boston Celtics", 260),
            ("Denver Nuggets", 750),
            ("Milwaukee Bucks", 900),
        ]
    );
}

#[tokio::test]
async fn test_wrong_page_fails_extraction_without_submitting() {
    let api = Arc::new(RecordingApi::default());
    let err = pipeline(NOT_FOUND_PAGE)
        .with_submitter(submitter(api.clone()))
        .run(&nba_config())
        .await
        .unwrap_err();

    match err {
        PipelineError::ExtractionFailed { reason, diagnostics } => {
            assert!(reason.contains("wrong or empty page"));
            assert!(!diagnostics.content_markers_present);
            assert_eq!(diagnostics.attempts.len(), 3);
            assert!(diagnostics.attempts.iter().all(|a| !a.accepted));
            assert_eq!(diagnostics.title.as_deref(), Some("Page Not Found"));
        }
        other => panic!("expected ExtractionFailed, got {:?}", other),
    }
    assert_eq!(api.creates.load(Ordering::SeqCst), 0);
    assert_eq!(api.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_payload_never_submits() {
    // Division event over a page with no group headers: every entry is ungrouped
    let api = Arc::new(RecordingApi::default());
    let err = pipeline(NBA_PAGE)
        .with_submitter(submitter(api.clone()))
        .run(&nfl_division_config())
        .await
        .unwrap_err();

    match err {
        PipelineError::EmptyPayload { diagnostics } => {
            assert_eq!(diagnostics.pairs_seen, 5);
            assert_eq!(diagnostics.ungrouped, 5);
        }
        other => panic!("expected EmptyPayload, got {:?}", other),
    }
    assert_eq!(api.creates.load(Ordering::SeqCst), 0);
    assert_eq!(api.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_create_game_once() {
    let api = Arc::new(RecordingApi::slow(Duration::from_millis(20)));
    let pipeline = Arc::new(pipeline(NBA_PAGE).with_submitter(submitter(api.clone())));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run(&nba_config()).await })
        })
        .collect();

    let mut game_ids = Vec::new();
    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        game_ids.push(report.submission.unwrap().game_id);
    }

    assert_eq!(api.creates.load(Ordering::SeqCst), 1);
    assert_eq!(api.submits.load(Ordering::SeqCst), 5);
    assert!(game_ids.iter().all(|id| *id == game_ids[0]));
}

#[tokio::test]
async fn test_game_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("games.json");
    let api = Arc::new(RecordingApi::default());

    for _ in 0..2 {
        let directory = Arc::new(FileGameDirectory::open(&ledger).unwrap());
        let client = Arc::new(SubmissionClient::new(api.clone(), directory));
        let report = pipeline(NBA_PAGE)
            .with_submitter(client)
            .run(&nba_config())
            .await
            .unwrap();
        assert_eq!(report.submission.unwrap().game_id, GameId(5000));
    }

    assert_eq!(api.creates.load(Ordering::SeqCst), 1);
    assert_eq!(api.submits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_export_written_before_submission() {
    let dir = tempfile::tempdir().unwrap();
    let report = pipeline(NFL_DIVISION_PAGE)
        .with_export_dir(dir.path())
        .run(&nfl_division_config())
        .await
        .unwrap();

    assert!(report.is_dry_run());
    let path = report.export_path.unwrap();
    let name = path.file_name().and_then(|n| n.to_str()).unwrap();
    assert!(name.starts_with("draftkings_nfl_division_winner_"));

    let content = std::fs::read_to_string(&path).unwrap();
    let document: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(document["run_id"], report.run_id.to_string());
    assert_eq!(document["data"]["event_type"], "division");
}

#[tokio::test]
async fn test_stalled_fetch_hits_run_timeout() {
    let err = OddsPipeline::new(Arc::new(StalledSource))
        .with_run_timeout(Duration::from_millis(50))
        .run(&nba_config())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_slow_downstream_times_out_with_stage() {
    let api = Arc::new(RecordingApi::slow(Duration::from_secs(5)));
    let err = pipeline(NBA_PAGE)
        .with_submitter(submitter(api.clone()))
        .with_run_timeout(Duration::from_millis(100))
        .run(&nba_config())
        .await
        .unwrap_err();

    match err {
        PipelineError::SubmissionTimedOut { stage, elapsed } => {
            assert_eq!(stage, SubmissionStage::PendingGameLookup);
            assert!(elapsed >= Duration::from_millis(100));
        }
        other => panic!("expected SubmissionTimedOut, got {:?}", other),
    }
    assert_eq!(api.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_during_game_creation() {
    let api = Arc::new(RecordingApi::slow(Duration::from_secs(5)));
    let (tx, rx) = watch::channel(false);
    let pipeline = pipeline(NBA_PAGE)
        .with_submitter(submitter(api.clone()))
        .with_cancellation(rx);

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
    });

    let err = pipeline.run(&nba_config()).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(
        err,
        PipelineError::Cancelled {
            stage: "pending_game_lookup"
        }
    ));
    assert!(!err.is_retryable());
    assert_eq!(api.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_game_key_is_stable_per_season() {
    let a = nba_config().current_game_key();
    let b: GameKey = nba_config().current_game_key();
    assert_eq!(a, b);
    assert_eq!(a.to_string(), "3102:1:nba championship:2025-26");
}
