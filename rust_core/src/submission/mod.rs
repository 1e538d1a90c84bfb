//! Idempotent submission to the downstream odds API.
//!
//! A run moves through `PendingGameLookup -> GameEnsured` and is done once its
//! odds are accepted. Games are keyed by [`GameKey`]; creation is
//! lookup-then-create, with a downstream conflict treated as "already exists".
//! Every retry repeats the lookup, since a create that failed in transit may
//! still have landed downstream. Within one process,
//! concurrent `ensure_game` calls for the same key are serialized so only one
//! of them ever reaches the create call.

pub mod retry;

use crate::error::{ApiError, PipelineError, SubmissionStage};
use crate::models::{EventConfig, GameId, GameKey, SubmissionResult};
use crate::payload::Payload;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use retry::{with_retry, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything the downstream needs to create a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewGame {
    pub key: GameKey,
    pub tournament: String,
    pub description: String,
    pub num_teams: usize,
}

impl NewGame {
    pub fn new(key: GameKey, config: &EventConfig, payload: &Payload) -> Self {
        Self {
            key,
            tournament: config.tournament.clone(),
            description: config.description(),
            num_teams: payload.entry_count(),
        }
    }
}

/// What the downstream accepted from an odds submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OddsReceipt {
    pub accepted_count: usize,
    /// Display names of the entries the downstream refused
    pub rejected: Vec<String>,
}

/// Downstream game/odds API.
#[async_trait]
pub trait OddsApi: Send + Sync {
    /// Find an existing game. APIs without a lookup return `Ok(None)`.
    async fn find_game(&self, _key: &GameKey) -> Result<Option<GameId>, ApiError> {
        Ok(None)
    }

    /// Create a game. Returns `ApiError::Conflict` when it already exists.
    async fn create_game(&self, game: &NewGame) -> Result<GameId, ApiError>;

    /// Submit the whole payload against a game as one document.
    async fn submit_odds(&self, game_id: GameId, payload: &Payload) -> Result<OddsReceipt, ApiError>;
}

/// Record of games already created downstream.
pub trait GameDirectory: Send + Sync {
    fn lookup(&self, key: &GameKey) -> Option<GameId>;

    /// Remember `id` for `key`. If the key is already recorded, the stored id
    /// wins and is returned.
    fn record(&self, key: &GameKey, id: GameId) -> Result<GameId, std::io::Error>;
}

#[derive(Debug, Default)]
pub struct MemoryGameDirectory {
    games: RwLock<HashMap<GameKey, GameId>>,
}

impl MemoryGameDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.games.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.read().is_empty()
    }
}

impl GameDirectory for MemoryGameDirectory {
    fn lookup(&self, key: &GameKey) -> Option<GameId> {
        self.games.read().get(key).copied()
    }

    fn record(&self, key: &GameKey, id: GameId) -> Result<GameId, std::io::Error> {
        Ok(*self.games.write().entry(key.clone()).or_insert(id))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerRecord {
    key: GameKey,
    game_id: GameId,
}

/// JSON-file ledger of created games, rewritten on every new record.
#[derive(Debug)]
pub struct FileGameDirectory {
    path: PathBuf,
    games: RwLock<HashMap<GameKey, GameId>>,
}

impl FileGameDirectory {
    /// Open the ledger at `path`. A missing file is an empty ledger.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let path = path.as_ref().to_path_buf();
        let mut games = HashMap::new();

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let records: Vec<LedgerRecord> = serde_json::from_str(&content)?;
            for record in records {
                games.entry(record.key).or_insert(record.game_id);
            }
        }

        debug!(path = %path.display(), games = games.len(), "Game ledger loaded");
        Ok(Self {
            path,
            games: RwLock::new(games),
        })
    }

    fn save(&self, games: &HashMap<GameKey, GameId>) -> Result<(), std::io::Error> {
        let mut records: Vec<LedgerRecord> = games
            .iter()
            .map(|(key, id)| LedgerRecord {
                key: key.clone(),
                game_id: *id,
            })
            .collect();
        records.sort_by(|a, b| a.game_id.cmp(&b.game_id));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&records)?;
        fs::write(&self.path, content)
    }
}

impl GameDirectory for FileGameDirectory {
    fn lookup(&self, key: &GameKey) -> Option<GameId> {
        self.games.read().get(key).copied()
    }

    fn record(&self, key: &GameKey, id: GameId) -> Result<GameId, std::io::Error> {
        let mut games = self.games.write();
        if let Some(existing) = games.get(key) {
            return Ok(*existing);
        }
        games.insert(key.clone(), id);
        self.save(&games)?;
        Ok(id)
    }
}

pub struct SubmissionClient {
    api: Arc<dyn OddsApi>,
    directory: Arc<dyn GameDirectory>,
    retry: RetryPolicy,
    in_flight: Mutex<HashMap<GameKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl SubmissionClient {
    pub fn new(api: Arc<dyn OddsApi>, directory: Arc<dyn GameDirectory>) -> Self {
        Self {
            api,
            directory,
            retry: RetryPolicy::default(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn key_lock(&self, key: &GameKey) -> Arc<tokio::sync::Mutex<()>> {
        self.in_flight.lock().entry(key.clone()).or_default().clone()
    }

    fn remember(&self, key: &GameKey, id: GameId) -> GameId {
        match self.directory.record(key, id) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(game_key = %key, game_id = %id, "Failed to record game in directory: {}", e);
                id
            }
        }
    }

    /// Run-level error for a failed downstream call at `stage`.
    fn stage_failed(
        stage: SubmissionStage,
        source: ApiError,
        fragment: Option<serde_json::Value>,
    ) -> PipelineError {
        if source.is_transient() {
            PipelineError::DownstreamUnavailable { stage, source }
        } else {
            PipelineError::SubmissionRejected {
                stage,
                source,
                fragment,
            }
        }
    }

    /// One lookup-then-create pass. Retried as a whole by [`Self::ensure_game`].
    async fn lookup_or_create(&self, game: &NewGame) -> Result<GameId, ApiError> {
        let key = &game.key;
        if let Some(id) = self.directory.lookup(key) {
            debug!(game_key = %key, game_id = %id, "Game found in directory");
            return Ok(id);
        }

        if let Some(id) = self.api.find_game(key).await? {
            debug!(game_key = %key, game_id = %id, "Game found downstream");
            return Ok(self.remember(key, id));
        }

        match self.api.create_game(game).await {
            Ok(id) => {
                info!(game_key = %key, game_id = %id, "Game created");
                Ok(self.remember(key, id))
            }
            Err(ApiError::Conflict { existing: Some(id) }) => {
                info!(game_key = %key, game_id = id, "Game already exists downstream");
                Ok(self.remember(key, GameId(id)))
            }
            Err(ApiError::Conflict { existing: None }) => {
                // Another process won the race; its id is in the directory or downstream
                if let Some(id) = self.directory.lookup(key) {
                    return Ok(id);
                }
                match self.api.find_game(key).await? {
                    Some(id) => Ok(self.remember(key, id)),
                    None => Err(ApiError::Conflict { existing: None }),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Return the id of the game for `game.key`, creating it at most once.
    pub async fn ensure_game(&self, game: &NewGame) -> Result<GameId, PipelineError> {
        let lock = self.key_lock(&game.key);
        let _guard = lock.lock().await;

        with_retry(&self.retry, "ensure_game", || self.lookup_or_create(game))
            .await
            .map_err(|source| Self::stage_failed(SubmissionStage::PendingGameLookup, source, None))
    }

    /// Ensure the game exists, then submit the full payload against it.
    pub async fn submit(
        &self,
        payload: &Payload,
        config: &EventConfig,
    ) -> Result<SubmissionResult, PipelineError> {
        let game = NewGame::new(config.current_game_key(), config, payload);
        self.submit_game(payload, &game).await
    }

    pub async fn submit_game(
        &self,
        payload: &Payload,
        game: &NewGame,
    ) -> Result<SubmissionResult, PipelineError> {
        let game_id = self.ensure_game(game).await?;
        self.submit_odds(game_id, payload).await
    }

    /// Submit the whole payload against an ensured game, retrying it as a unit.
    pub async fn submit_odds(
        &self,
        game_id: GameId,
        payload: &Payload,
    ) -> Result<SubmissionResult, PipelineError> {
        let receipt = with_retry(&self.retry, "submit_odds", || {
            self.api.submit_odds(game_id, payload)
        })
        .await
        .map_err(|source| {
            Self::stage_failed(SubmissionStage::GameEnsured, source, Some(payload.to_document()))
        })?;

        let refused: HashSet<String> = receipt
            .rejected
            .iter()
            .map(|name| name.trim().to_lowercase())
            .collect();
        let rejected = payload
            .entries()
            .into_iter()
            .filter(|e| refused.contains(&e.label.display.to_lowercase()))
            .cloned()
            .collect::<Vec<_>>();

        info!(
            game_id = %game_id,
            accepted = receipt.accepted_count,
            rejected = rejected.len(),
            "Odds submitted"
        );

        Ok(SubmissionResult {
            game_id,
            accepted_count: receipt.accepted_count,
            rejected,
        })
    }
}
