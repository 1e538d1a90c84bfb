//! One run: fetch -> extract -> assemble -> build -> (export) -> submit.
//!
//! Runs share nothing but the submission client. Every network step is
//! bounded by the run deadline and aborts promptly when the run is cancelled.

use crate::assemble::{AssemblyDiagnostics, EntryAssembler};
use crate::error::{PipelineError, SourceError, SubmissionStage};
use crate::extraction::{extract, StrategyAttempt};
use crate::models::{EventConfig, EventType, StrategyId, SubmissionResult};
use crate::payload::{build_from_assembly, export, Payload};
use crate::sources::PageSource;
use crate::submission::{NewGame, SubmissionClient};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Payload built but not yet submitted.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedRun {
    pub run_id: Uuid,
    pub strategy: StrategyId,
    pub realigned: bool,
    pub attempts: Vec<StrategyAttempt>,
    pub diagnostics: AssemblyDiagnostics,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
}

/// Everything a finished run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub sport: String,
    pub tournament: String,
    pub event_type: EventType,
    pub strategy: StrategyId,
    pub realigned: bool,
    pub diagnostics: AssemblyDiagnostics,
    pub entries: usize,
    pub groups: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
    /// `None` for dry runs
    pub submission: Option<SubmissionResult>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl RunReport {
    fn new(
        config: &EventConfig,
        prepared: PreparedRun,
        submission: Option<SubmissionResult>,
        started_at: DateTime<Utc>,
        started: Instant,
    ) -> Self {
        Self {
            run_id: prepared.run_id,
            sport: config.sport.clone(),
            tournament: config.tournament.clone(),
            event_type: config.event_type,
            strategy: prepared.strategy,
            realigned: prepared.realigned,
            entries: prepared.payload.entry_count(),
            groups: prepared.payload.group_count(),
            diagnostics: prepared.diagnostics,
            export_path: prepared.export_path,
            submission,
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.submission.is_none()
    }
}

/// Resolves once the run is cancelled; never resolves without a receiver.
async fn cancelled(rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without cancelling
            return std::future::pending().await;
        }
    }
}

pub struct OddsPipeline {
    source: Arc<dyn PageSource>,
    submitter: Option<Arc<SubmissionClient>>,
    export_dir: Option<PathBuf>,
    run_timeout: Duration,
    cancel: Option<watch::Receiver<bool>>,
}

impl OddsPipeline {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self {
            source,
            submitter: None,
            export_dir: None,
            run_timeout: Duration::from_secs(120),
            cancel: None,
        }
    }

    /// Without a submitter every run is a dry run.
    pub fn with_submitter(mut self, submitter: Arc<SubmissionClient>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Cancel runs by sending `true` on the matching sender.
    pub fn with_cancellation(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel = Some(rx);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Run `fut` until it finishes, the deadline passes, or the run is cancelled.
    async fn bounded<T, F>(
        &self,
        stage: &'static str,
        deadline: Instant,
        fut: F,
    ) -> Option<Result<T, PipelineError>>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        tokio::select! {
            biased;
            _ = cancelled(self.cancel.clone()) => Some(Err(PipelineError::Cancelled { stage })),
            res = tokio::time::timeout_at(deadline, fut) => res.ok(),
        }
    }

    /// Fetch and extract, then assemble and build the payload. Nothing is submitted.
    pub async fn prepare(&self, config: &EventConfig) -> Result<PreparedRun, PipelineError> {
        let deadline = Instant::now() + self.run_timeout;
        self.prepare_until(config, deadline, Uuid::new_v4()).await
    }

    async fn prepare_until(
        &self,
        config: &EventConfig,
        deadline: Instant,
        run_id: Uuid,
    ) -> Result<PreparedRun, PipelineError> {
        let fetch = async { self.source.fetch(config).await.map_err(PipelineError::from) };
        let snapshot = match self.bounded("fetch", deadline, fetch).await {
            Some(result) => result?,
            None => {
                return Err(PipelineError::SourceUnavailable(SourceError {
                    url: config.url.clone(),
                    status: None,
                    reason: format!("page fetch exceeded the run timeout of {:?}", self.run_timeout),
                }))
            }
        };

        let extraction = extract(&snapshot, config)?;
        let assembly = EntryAssembler::new(config).assemble(&extraction.pairs, &extraction.headers);
        let (payload, diagnostics) = build_from_assembly(assembly, config)?;

        info!(
            entries = payload.entry_count(),
            groups = payload.group_count(),
            dropped = diagnostics.dropped_count(),
            "Payload built"
        );

        let export_path = match &self.export_dir {
            Some(dir) => Some(export(&payload, config, run_id, dir)?),
            None => None,
        };

        Ok(PreparedRun {
            run_id,
            strategy: extraction.strategy,
            realigned: extraction.realigned,
            attempts: extraction.attempts,
            diagnostics,
            payload,
            export_path,
        })
    }

    async fn submit_until(
        &self,
        submitter: &SubmissionClient,
        payload: &Payload,
        config: &EventConfig,
        deadline: Instant,
        started: Instant,
    ) -> Result<SubmissionResult, PipelineError> {
        let timed_out = |stage| PipelineError::SubmissionTimedOut {
            stage,
            elapsed: started.elapsed(),
        };

        // A cancelled run never reaches the downstream
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: SubmissionStage::PendingGameLookup.as_str(),
            });
        }

        let game = NewGame::new(config.current_game_key(), config, payload);
        let stage = SubmissionStage::PendingGameLookup;
        let game_id = self
            .bounded(stage.as_str(), deadline, submitter.ensure_game(&game))
            .await
            .ok_or_else(|| timed_out(stage))??;

        let stage = SubmissionStage::GameEnsured;
        self.bounded(stage.as_str(), deadline, submitter.submit_odds(game_id, payload))
            .await
            .ok_or_else(|| timed_out(stage))?
    }

    /// Full run for one event.
    pub async fn run(&self, config: &EventConfig) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "odds_run",
            run_id = %run_id,
            sport = %config.sport,
            tournament = %config.tournament
        );

        async move {
            let started_at = Utc::now();
            let started = Instant::now();
            let deadline = started + self.run_timeout;

            let prepared = self.prepare_until(config, deadline, run_id).await?;

            let submission = match &self.submitter {
                Some(submitter) => Some(
                    self.submit_until(submitter, &prepared.payload, config, deadline, started)
                        .await?,
                ),
                None => {
                    warn!("No submitter configured; dry run");
                    None
                }
            };

            let report = RunReport::new(config, prepared, submission, started_at, started);
            info!(
                strategy = %report.strategy,
                entries = report.entries,
                elapsed_ms = report.elapsed_ms,
                "Run complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticPageSource;

    const PAGE: &str = r#"<html><head><title>NBA Futures</title></head><body>
        <span data-testid="button-title-market-board">Boston Celtics</span>
        <span data-testid="button-odds-market-board">+350</span>
        <span data-testid="button-title-market-board">Oklahoma City Thunder</span>
        <span data-testid="button-odds-market-board">+300</span>
    </body></html>"#;

    fn config() -> EventConfig {
        EventConfig::new("NBA", "NBA Championship", EventType::Championship, "https://example.test/nba", 3102, 1)
    }

    #[tokio::test]
    async fn test_prepare_builds_payload_without_submitting() {
        let pipeline = OddsPipeline::new(Arc::new(StaticPageSource::new(PAGE)));
        let prepared = pipeline.prepare(&config()).await.unwrap();
        assert_eq!(prepared.strategy, StrategyId::PrimarySelectors);
        assert_eq!(prepared.payload.entry_count(), 2);
        assert!(prepared.export_path.is_none());
    }

    #[tokio::test]
    async fn test_dry_run_report() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline =
            OddsPipeline::new(Arc::new(StaticPageSource::new(PAGE))).with_export_dir(dir.path());
        let report = pipeline.run(&config()).await.unwrap();
        assert!(report.is_dry_run());
        assert_eq!(report.entries, 2);
        assert_eq!(report.groups, 0);
        assert!(report.export_path.unwrap().exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let (tx, rx) = watch::channel(false);
        let pipeline =
            OddsPipeline::new(Arc::new(StaticPageSource::new(PAGE))).with_cancellation(rx);
        tx.send(true).unwrap();

        let err = pipeline.run(&config()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { stage: "fetch" }));
    }
}
