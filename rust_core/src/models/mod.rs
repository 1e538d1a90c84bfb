// Shared models for the Oddsline pipeline
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Event configuration
// ============================================================================

/// How the entries of a futures market are categorized downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Championship,
    Conference,
    Division,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Championship => "championship",
            EventType::Conference => "conference",
            EventType::Division => "division",
        }
    }

    /// Conference and division markets nest their entries under group headers
    pub fn is_grouped(&self) -> bool {
        !matches!(self, EventType::Championship)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_provider() -> String {
    "draftkings".to_string()
}

/// One scrape target. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub sport: String,
    pub tournament: String,
    pub event_type: EventType,
    pub url: String,
    pub league_id: i64,
    pub game_type_id: i64,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Season label used in the game idempotency key. Falls back to the run date.
    #[serde(default)]
    pub season: Option<String>,
    /// Extra label aliases (abbreviation -> full name) for this event
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl EventConfig {
    pub fn new(
        sport: impl Into<String>,
        tournament: impl Into<String>,
        event_type: EventType,
        url: impl Into<String>,
        league_id: i64,
        game_type_id: i64,
    ) -> Self {
        Self {
            sport: sport.into(),
            tournament: tournament.into(),
            event_type,
            url: url.into(),
            league_id,
            game_type_id,
            provider: default_provider(),
            description: None,
            season: None,
            aliases: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_season(mut self, season: impl Into<String>) -> Self {
        self.season = Some(season.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, full_name: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), full_name.into());
        self
    }

    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.sport, self.tournament))
    }

    /// Idempotency key for the downstream game this event maps to.
    pub fn game_key(&self, run_date: NaiveDate) -> GameKey {
        GameKey {
            league_id: self.league_id,
            game_type_id: self.game_type_id,
            tournament: self.tournament.trim().to_lowercase(),
            season: self
                .season
                .clone()
                .unwrap_or_else(|| run_date.format("%Y-%m-%d").to_string()),
        }
    }

    /// Game key for a run starting now
    pub fn current_game_key(&self) -> GameKey {
        self.game_key(Utc::now().date_naive())
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Extraction strategies, in the order the chain tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    /// Exact `data-testid` match on the provider's title/odds roles
    PrimarySelectors,
    /// Partial attribute match on title/name and odds/price markers
    GeneralizedSelectors,
    /// Price-shaped text nodes paired with the nearest preceding text
    TextPattern,
}

impl StrategyId {
    pub const CHAIN: [StrategyId; 3] = [
        StrategyId::PrimarySelectors,
        StrategyId::GeneralizedSelectors,
        StrategyId::TextPattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::PrimarySelectors => "primary_selectors",
            StrategyId::GeneralizedSelectors => "generalized_selectors",
            StrategyId::TextPattern => "text_pattern",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label/price candidate as found on the page. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawPair {
    pub label_text: String,
    pub price_text: String,
    pub source_strategy: StrategyId,
    /// Document position of the label node, used for group resolution
    pub position: usize,
}

impl RawPair {
    pub fn new(
        label_text: impl Into<String>,
        price_text: impl Into<String>,
        source_strategy: StrategyId,
        position: usize,
    ) -> Self {
        Self {
            label_text: label_text.into(),
            price_text: price_text.into(),
            source_strategy,
            position,
        }
    }
}

/// A group header (conference/division title) and where it sits in the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupHeader {
    pub position: usize,
    pub text: String,
}

// ============================================================================
// Normalized values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sign {
    Positive,
    Negative,
}

/// American odds after the reduction/rounding/cap transform.
///
/// `|value|` is always a multiple of 5 and never above 20000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizedPrice {
    pub value: i32,
    pub sign: Sign,
    /// Signed price as quoted by the provider, before the transform
    pub original: i32,
}

impl NormalizedPrice {
    pub fn magnitude(&self) -> u32 {
        self.value.unsigned_abs()
    }
}

impl fmt::Display for NormalizedPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sign {
            Sign::Positive => write!(f, "+{}", self.magnitude()),
            Sign::Negative => write!(f, "-{}", self.magnitude()),
        }
    }
}

/// A cleaned selection name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedLabel {
    /// Lowercase comparison form; the deduplication key
    pub canonical: String,
    /// Display form sent downstream
    pub display: String,
    pub raw: String,
    pub alias_matched: bool,
}

/// Conference or division an entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupKey {
    pub label: String,
    /// Leading conference token of a division label ("AFC" in "AFC East")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conference: Option<String>,
}

impl GroupKey {
    /// Parse a provider header such as `"NFL 2025/26 - AFC East"`.
    ///
    /// Returns `None` when nothing usable remains after trimming.
    pub fn from_header(text: &str, event_type: EventType) -> Option<Self> {
        let tail = text.rsplit(" - ").next().unwrap_or(text);
        let label = tail.split_whitespace().collect::<Vec<_>>().join(" ");
        if label.is_empty() {
            return None;
        }

        let conference = match event_type {
            EventType::Division => {
                let mut words = label.split(' ');
                match (words.next(), words.next()) {
                    (Some(first), Some(_)) => Some(first.to_string()),
                    _ => None,
                }
            }
            _ => None,
        };

        Some(Self { label, conference })
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// One priced selection that survived assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub label: NormalizedLabel,
    pub price: NormalizedPrice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupKey>,
}

// ============================================================================
// Submission
// ============================================================================

/// Downstream game identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub i64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a downstream game: one per league, game type, tournament and season.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameKey {
    pub league_id: i64,
    pub game_type_id: i64,
    pub tournament: String,
    pub season: String,
}

impl fmt::Display for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.league_id, self.game_type_id, self.tournament, self.season
        )
    }
}

/// Outcome of a submission. Returned to the caller, never retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionResult {
    pub game_id: GameId,
    pub accepted_count: usize,
    pub rejected: Vec<Entry>,
}
