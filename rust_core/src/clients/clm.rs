//! HTTP client for the CLM game/odds API.
//!
//! Games are created with `POST /api/Game/InsertGame`; odds go to
//! `POST /api/Game/InsertGameValuesTNT?idGame=<id>` as one flat list.

use crate::circuit_breaker::{BreakerConfig, DownstreamBreaker};
use crate::error::ApiError;
use crate::models::GameId;
use crate::payload::Payload;
use crate::submission::{NewGame, OddsApi, OddsReceipt};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const MIN_VALUE_ID: u32 = 1_000_000;
pub const MAX_VALUE_ID: u32 = 9_999_999;

#[derive(Debug, Clone)]
pub struct ClmConfig {
    pub base_url: String,
    pub user_id: i64,
    /// First 7-digit id handed to the odds values of a submission
    pub value_id_start: u32,
    pub timeout: Duration,
}

impl Default for ClmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://clmapi.sportsfanwagers.com".to_string(),
            user_id: 360,
            value_id_start: MIN_VALUE_ID,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Game document for `InsertGame`. Field names follow the API's casing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameData {
    pub id_sport: String,
    pub id_league: i64,
    pub id_game_type: i64,
    pub game_date_time: String,
    pub visitor_number: i32,
    pub home_number: i32,
    pub visitor_team: String,
    pub home_team: String,
    pub visitor_score: i32,
    pub home_score: i32,
    pub visitor_pitcher: String,
    pub home_pitcher: String,
    pub normal_game: i32,
    pub game_stat: String,
    pub graded: bool,
    pub hookups: bool,
    pub local: bool,
    pub online: bool,
    pub short_game: bool,
    pub event_date: String,
    pub date_changed: bool,
    // Spelled this way by the API
    pub yime_changed: bool,
    pub pitcher_changed: i32,
    pub period: i32,
    pub parent_game: i32,
    pub graded_date: Option<String>,
    pub num_teams: usize,
    pub id_event: i32,
    pub family_game: i32,
    pub has_children: bool,
    pub id_team_visitor: i32,
    pub id_team_home: i32,
    pub id_banner_type: i32,
    pub description: String,
    pub accept_auto_changes: bool,
    pub id_user: i64,
    pub result: i32,
    pub tournament_type: i32,
    pub tournament_placesto_paid: String,
}

impl GameData {
    pub fn tournament(game: &NewGame, user_id: i64) -> Self {
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        Self {
            id_sport: "TNT".to_string(),
            id_league: game.key.league_id,
            id_game_type: game.key.game_type_id,
            game_date_time: now.clone(),
            visitor_number: 1,
            home_number: 2,
            visitor_team: game.tournament.clone(),
            home_team: game.tournament.clone(),
            visitor_score: 0,
            home_score: 0,
            visitor_pitcher: String::new(),
            home_pitcher: String::new(),
            normal_game: 0,
            game_stat: "D".to_string(),
            graded: false,
            hookups: false,
            local: true,
            online: true,
            short_game: false,
            event_date: now,
            date_changed: false,
            yime_changed: false,
            pitcher_changed: 0,
            period: 0,
            parent_game: 0,
            graded_date: None,
            num_teams: game.num_teams,
            id_event: 0,
            family_game: 0,
            has_children: false,
            id_team_visitor: 0,
            id_team_home: 0,
            id_banner_type: 0,
            description: game.description.clone(),
            accept_auto_changes: true,
            id_user: user_id,
            result: 0,
            tournament_type: 1,
            tournament_placesto_paid: "1".to_string(),
        }
    }
}

/// One row of `InsertGameValuesTNT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameValue {
    pub id: u32,
    pub team_name: String,
    pub odds: String,
}

/// Flatten a payload into value rows with sequential ids from `start`.
///
/// Fails before any request if the ids would leave the 7-digit range.
pub fn game_values(payload: &Payload, start: u32) -> Result<Vec<GameValue>, ApiError> {
    let entries = payload.entries();
    let count = entries.len() as u64;

    if !(MIN_VALUE_ID..=MAX_VALUE_ID).contains(&start) {
        return Err(ApiError::Rejected {
            status: 0,
            body: format!("value id start {} is not a 7-digit id", start),
        });
    }
    if start as u64 + count.saturating_sub(1) > MAX_VALUE_ID as u64 {
        return Err(ApiError::Rejected {
            status: 0,
            body: format!(
                "{} values starting at {} exceed the maximum id {}",
                count, start, MAX_VALUE_ID
            ),
        });
    }

    Ok(entries
        .into_iter()
        .zip(start..)
        .map(|(entry, id)| GameValue {
            id,
            team_name: entry.label.display.clone(),
            odds: entry.price.to_string(),
        })
        .collect())
}

/// Pull the game id out of an `InsertGame` response body.
fn parse_game_id(body: &serde_json::Value) -> Option<i64> {
    match body {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::Object(map) => ["idGame", "IdGame", "id_game"]
            .iter()
            .filter_map(|k| map.get(*k))
            .find_map(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))),
        _ => None,
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    ApiError::Transient {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

#[derive(Clone)]
pub struct ClmApiClient {
    client: Client,
    config: ClmConfig,
    breaker: Arc<DownstreamBreaker>,
}

impl std::fmt::Debug for ClmApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClmApiClient")
            .field("base_url", &self.config.base_url)
            .field("breaker_state", &self.breaker.state())
            .finish()
    }
}

impl ClmApiClient {
    pub fn new(config: ClmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            breaker: Arc::new(DownstreamBreaker::new("clm", BreakerConfig::default())),
            config,
        }
    }

    pub fn config(&self) -> &ClmConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<serde_json::Value, ApiError> {
        self.breaker.check()?;

        let result: Result<serde_json::Value, ApiError> = async {
            let resp = self
                .client
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(transport_error)?;

            let status = resp.status();
            let text = resp.text().await.map_err(transport_error)?;
            if status.is_success() {
                // Some endpoints answer 200 with an empty body
                Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::Null))
            } else if status.as_u16() == 409 {
                let existing = serde_json::from_str(&text)
                    .ok()
                    .and_then(|v: serde_json::Value| parse_game_id(&v));
                Err(ApiError::Conflict { existing })
            } else {
                Err(ApiError::from_status(status.as_u16(), text))
            }
        }
        .await;

        self.breaker.record(&result);
        result
    }
}

#[async_trait]
impl OddsApi for ClmApiClient {
    async fn create_game(&self, game: &NewGame) -> Result<GameId, ApiError> {
        let url = self.endpoint("/api/Game/InsertGame");
        let data = GameData::tournament(game, self.config.user_id);
        debug!(url = %url, league_id = data.id_league, game_type_id = data.id_game_type, "Creating game");

        let body = self.post_json(&url, &data).await?;
        let id = parse_game_id(&body).ok_or_else(|| ApiError::Rejected {
            status: 200,
            body: format!("InsertGame response carried no game id: {}", body),
        })?;

        info!(game_id = id, tournament = %game.tournament, "CLM game created");
        Ok(GameId(id))
    }

    async fn submit_odds(&self, game_id: GameId, payload: &Payload) -> Result<OddsReceipt, ApiError> {
        let values = game_values(payload, self.config.value_id_start)?;
        let url = self.endpoint(&format!("/api/Game/InsertGameValuesTNT?idGame={}", game_id));

        self.post_json(&url, &values).await?;
        info!(game_id = %game_id, values = values.len(), "CLM odds submitted");

        Ok(OddsReceipt {
            accepted_count: values.len(),
            rejected: Vec::new(),
        })
    }
}
