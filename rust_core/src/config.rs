//! Event catalog: the set of scrape targets a service runs over.

use crate::error::ConfigError;
use crate::models::{EventConfig, EventType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const DK_FOOTBALL: &str = "https://sportsbook.draftkings.com/leagues/football/nfl?category=futures&subcategory=";
const DK_BASKETBALL: &str = "https://sportsbook.draftkings.com/leagues/basketball/nba?category=futures&subcategory=";

/// NFL league id in the downstream API
pub const NFL_LEAGUE_ID: i64 = 3101;
/// NBA league id in the downstream API
pub const NBA_LEAGUE_ID: i64 = 3102;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCatalog {
    pub events: Vec<EventConfig>,
}

impl EventCatalog {
    pub fn new(events: Vec<EventConfig>) -> Result<Self, ConfigError> {
        let catalog = Self { events };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The default DraftKings futures markets.
    pub fn builtin() -> Self {
        Self {
            events: vec![
                EventConfig::new(
                    "NFL",
                    "Super Bowl",
                    EventType::Championship,
                    format!("{}super-bowl", DK_FOOTBALL),
                    NFL_LEAGUE_ID,
                    1,
                )
                .with_description("NFL Super Bowl Championship"),
                EventConfig::new(
                    "NFL",
                    "Conference Winner",
                    EventType::Conference,
                    format!("{}conference-winner", DK_FOOTBALL),
                    NFL_LEAGUE_ID,
                    2,
                )
                .with_description("NFL Conference Winner"),
                EventConfig::new(
                    "NFL",
                    "Division Winner",
                    EventType::Division,
                    format!("{}division-winner", DK_FOOTBALL),
                    NFL_LEAGUE_ID,
                    3,
                )
                .with_description("NFL Division Winner"),
                EventConfig::new(
                    "NBA",
                    "NBA Championship",
                    EventType::Championship,
                    format!("{}nba-championship", DK_BASKETBALL),
                    NBA_LEAGUE_ID,
                    1,
                )
                .with_description("NBA Championship"),
            ],
        }
    }

    /// Load a catalog from a JSON file: either `{"events": [...]}` or a bare array.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: display.clone(),
            source,
        })?;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum CatalogFile {
            Wrapped { events: Vec<EventConfig> },
            Bare(Vec<EventConfig>),
        }

        let events = match serde_json::from_str(&content) {
            Ok(CatalogFile::Wrapped { events }) | Ok(CatalogFile::Bare(events)) => events,
            Err(source) => {
                return Err(ConfigError::Parse {
                    path: display,
                    source,
                })
            }
        };

        Self::new(events)
    }

    /// Catalog from `path` when given, otherwise the built-in one.
    pub fn load_or_builtin(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for event in &self.events {
            let name = format!("{} {}", event.sport, event.tournament);
            let invalid = |reason: &str| ConfigError::InvalidEvent {
                event: name.clone(),
                reason: reason.to_string(),
            };

            if event.sport.trim().is_empty() {
                return Err(invalid("sport is empty"));
            }
            if event.tournament.trim().is_empty() {
                return Err(invalid("tournament is empty"));
            }
            if !(event.url.starts_with("http://") || event.url.starts_with("https://")) {
                return Err(invalid("url must be http(s)"));
            }
            let key = (event.sport.to_lowercase(), event.tournament.to_lowercase());
            if !seen.insert(key) {
                return Err(invalid("duplicate sport/tournament"));
            }
        }
        Ok(())
    }

    /// Find an event by sport and tournament, case-insensitively.
    pub fn find(&self, sport: &str, tournament: &str) -> Option<&EventConfig> {
        self.events.iter().find(|e| {
            e.sport.eq_ignore_ascii_case(sport) && e.tournament.eq_ignore_ascii_case(tournament)
        })
    }

    pub fn sports(&self) -> Vec<&str> {
        let mut sports: Vec<&str> = Vec::new();
        for event in &self.events {
            if !sports.contains(&event.sport.as_str()) {
                sports.push(&event.sport);
            }
        }
        sports
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
