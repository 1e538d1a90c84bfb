//! Oddsline Core - sportsbook futures odds extraction and submission.
//!
//! This crate provides:
//! - Layered extraction of label/price pairs from sportsbook pages
//! - Price and label normalization (American odds transform, aliases, boilerplate)
//! - Entry assembly with grouping, deduplication and drop diagnostics
//! - Payload construction and JSON export per event type
//! - Idempotent game creation and odds submission against the CLM API
//! - Circuit breaker and retry for downstream calls

pub mod assemble;
pub mod circuit_breaker;
pub mod clients;
pub mod config;
pub mod error;
pub mod extraction;
pub mod models;
pub mod normalize;
pub mod payload;
pub mod pipeline;
pub mod sources;
pub mod submission;

pub use assemble::{assemble, Assembly, AssemblyDiagnostics, DropReason, EntryAssembler};
pub use circuit_breaker::{BreakerConfig, BreakerState, DownstreamBreaker};
pub use clients::{ClmApiClient, ClmConfig};
pub use config::EventCatalog;
pub use error::{ApiError, ConfigError, PairError, PipelineError, SourceError, SubmissionStage};
pub use extraction::{extract, Extraction, PageDiagnostics, PageNode, PageSnapshot};
pub use models::*;
pub use normalize::{normalize_price, AliasTable, LabelNormalizer};
pub use payload::{build, build_from_assembly, export, Payload, PayloadGroup};
pub use pipeline::{OddsPipeline, PreparedRun, RunReport};
pub use sources::{HttpPageSource, PageSource, StaticPageSource};
pub use submission::{
    FileGameDirectory, GameDirectory, MemoryGameDirectory, NewGame, OddsApi, OddsReceipt,
    SubmissionClient,
};
pub use submission::retry::RetryPolicy;
