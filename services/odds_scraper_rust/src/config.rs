use anyhow::{anyhow, Context, Result};
use oddsline_rust_core::clients::ClmConfig;
use oddsline_rust_core::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Game ledger used when `GAME_LEDGER_PATH` is unset, relative to the working directory
pub const DEFAULT_GAME_LEDGER_PATH: &str = "odds_scraper_games.json";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_base_url: String,
    pub api_user_id: i64,
    pub event_catalog_path: Option<String>,
    pub export_dir: Option<PathBuf>,
    /// Survives between runs so the same game is never created twice
    pub game_ledger_path: PathBuf,

    pub run_timeout: Duration,
    pub http_timeout: Duration,

    pub submit_max_attempts: u32,
    pub submit_base_backoff: Duration,
    pub value_id_start: u32,

    pub dry_run: bool,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = ClmConfig::default();

        let api_base_url = env::var("API_BASE_URL").unwrap_or(defaults.base_url);
        let api_user_id = parse_env("API_USER_ID", defaults.user_id)?;

        let run_timeout = Duration::from_secs(parse_env("RUN_TIMEOUT_SECS", 120u64)?);
        let http_timeout = Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 30u64)?);

        let submit_max_attempts = parse_env("SUBMIT_MAX_ATTEMPTS", 3u32)?;
        if submit_max_attempts == 0 {
            return Err(anyhow!("SUBMIT_MAX_ATTEMPTS must be at least 1"));
        }
        let submit_base_backoff =
            Duration::from_millis(parse_env("SUBMIT_BASE_BACKOFF_MS", 100u64)?);

        let value_id_start = parse_env("VALUE_ID_START", defaults.value_id_start)?;

        Ok(Self {
            api_base_url,
            api_user_id,
            event_catalog_path: optional_env("EVENT_CATALOG_PATH"),
            export_dir: optional_env("EXPORT_DIR").map(PathBuf::from),
            game_ledger_path: ledger_path(optional_env("GAME_LEDGER_PATH")),
            run_timeout,
            http_timeout,
            submit_max_attempts,
            submit_base_backoff,
            value_id_start,
            dry_run: parse_bool_env("DRY_RUN", false),
        })
    }

    pub fn clm_config(&self) -> ClmConfig {
        ClmConfig {
            base_url: self.api_base_url.clone(),
            user_id: self.api_user_id,
            value_id_start: self.value_id_start,
            timeout: self.http_timeout,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.submit_max_attempts, self.submit_base_backoff)
    }
}

fn ledger_path(raw: Option<String>) -> PathBuf {
    PathBuf::from(raw.unwrap_or_else(|| DEFAULT_GAME_LEDGER_PATH.to_string()))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {}", key, raw)),
        None => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    optional_env(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}
