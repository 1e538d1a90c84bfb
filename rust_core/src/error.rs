//! Error taxonomy for the odds pipeline.
//!
//! Per-pair errors (`PairError`) are recovered locally by dropping the pair.
//! Everything in `PipelineError` ends the run.

use crate::assemble::AssemblyDiagnostics;
use crate::extraction::PageDiagnostics;
use std::time::Duration;
use thiserror::Error;

/// Why a single label/price pair was dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairError {
    #[error("invalid price token '{raw}'")]
    InvalidPrice { raw: String },

    #[error("label '{raw}' is empty after cleaning")]
    EmptyLabel { raw: String },
}

/// Failures of the raw element source (page fetch or render).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("source unavailable for {url}: {reason}")]
pub struct SourceError {
    pub url: String,
    pub status: Option<u16>,
    pub reason: String,
}

/// Errors returned by the downstream odds API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Network failure, timeout, 408/429 or 5xx. Safe to retry.
    #[error("transient downstream failure (status {status:?}): {message}")]
    Transient { status: Option<u16>, message: String },

    /// The game already exists. Carries the existing id when the API reports it.
    #[error("downstream conflict: game already exists (id {existing:?})")]
    Conflict { existing: Option<i64> },

    /// Validation failure (4xx). Terminal.
    #[error("downstream rejected request (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient { .. })
    }

    /// Classify an HTTP status code that is not a success.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            408 | 429 | 500..=599 => ApiError::Transient {
                status: Some(status),
                message: body,
            },
            409 => ApiError::Conflict { existing: None },
            _ => ApiError::Rejected { status, body },
        }
    }
}

/// Submission state at which a failure happened. A run that gets past
/// `GameEnsured` has submitted its odds, so no later state can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    PendingGameLookup,
    GameEnsured,
}

impl SubmissionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStage::PendingGameLookup => "pending_game_lookup",
            SubmissionStage::GameEnsured => "game_ensured",
        }
    }
}

impl std::fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-level failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    SourceUnavailable(#[from] SourceError),

    #[error("extraction failed: {reason}")]
    ExtractionFailed {
        reason: String,
        diagnostics: Box<PageDiagnostics>,
    },

    #[error("payload is empty: {} pairs seen, none usable", .diagnostics.pairs_seen)]
    EmptyPayload { diagnostics: AssemblyDiagnostics },

    #[error("submission timed out after {elapsed:?} during {stage}")]
    SubmissionTimedOut {
        stage: SubmissionStage,
        elapsed: Duration,
    },

    #[error("submission rejected during {stage}: {source}")]
    SubmissionRejected {
        stage: SubmissionStage,
        #[source]
        source: ApiError,
        /// The payload document (or fragment) the downstream refused
        fragment: Option<serde_json::Value>,
    },

    /// Transient downstream failures outlasted the retry budget.
    #[error("downstream unavailable during {stage}: {source}")]
    DownstreamUnavailable {
        stage: SubmissionStage,
        #[source]
        source: ApiError,
    },

    #[error("run cancelled during {stage}")]
    Cancelled { stage: &'static str },

    #[error("failed to export payload: {0}")]
    Export(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the caller can retry the run without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::SourceUnavailable(_)
            | PipelineError::SubmissionTimedOut { .. }
            | PipelineError::DownstreamUnavailable { .. } => true,
            PipelineError::SubmissionRejected { .. }
            | PipelineError::ExtractionFailed { .. }
            | PipelineError::EmptyPayload { .. }
            | PipelineError::Cancelled { .. }
            | PipelineError::Export(_) => false,
        }
    }

    /// Short machine-readable kind, used in logs and run reports
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable(_) => "source_unavailable",
            PipelineError::ExtractionFailed { .. } => "extraction_failed",
            PipelineError::EmptyPayload { .. } => "empty_payload",
            PipelineError::SubmissionTimedOut { .. } => "submission_timed_out",
            PipelineError::SubmissionRejected { .. } => "submission_rejected",
            PipelineError::DownstreamUnavailable { .. } => "downstream_unavailable",
            PipelineError::Cancelled { .. } => "cancelled",
            PipelineError::Export(_) => "export_failed",
        }
    }
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid event '{event}': {reason}")]
    InvalidEvent { event: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ApiError::from_status(503, String::new()).is_transient());
        assert!(ApiError::from_status(429, String::new()).is_transient());
        assert!(ApiError::from_status(408, String::new()).is_transient());
        assert_eq!(
            ApiError::from_status(409, String::new()),
            ApiError::Conflict { existing: None }
        );
        assert!(matches!(
            ApiError::from_status(422, "bad odds".to_string()),
            ApiError::Rejected { status: 422, .. }
        ));
    }

    #[test]
    fn test_retryability() {
        let source = PipelineError::SourceUnavailable(SourceError {
            url: "https://example.test".to_string(),
            status: Some(503),
            reason: "service unavailable".to_string(),
        });
        assert!(source.is_retryable());

        let rejected = PipelineError::SubmissionRejected {
            stage: SubmissionStage::GameEnsured,
            source: ApiError::Rejected {
                status: 400,
                body: "invalid".to_string(),
            },
            fragment: None,
        };
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.kind(), "submission_rejected");

        let timed_out = PipelineError::SubmissionTimedOut {
            stage: SubmissionStage::GameEnsured,
            elapsed: Duration::from_secs(30),
        };
        assert!(timed_out.is_retryable());

        let unavailable = PipelineError::DownstreamUnavailable {
            stage: SubmissionStage::PendingGameLookup,
            source: ApiError::Transient {
                status: Some(503),
                message: "service unavailable".to_string(),
            },
        };
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.kind(), "downstream_unavailable");
    }
}
