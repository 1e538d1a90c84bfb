//! Selection label cleaning and alias resolution.

use crate::error::PairError;
use crate::models::{EventConfig, NormalizedLabel};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Prefix stripping repeats at most this many times ("To Win Winner X")
const MAX_PREFIX_PASSES: usize = 5;

/// Market wording the provider glues onto selection names.
const BOILERPLATE_PREFIXES: &[&str] = &[
    r"amrace\s+winner",
    r"amrace",
    r"race\s+winner",
    r"finish\s+to\s+win",
    r"finish\s+winner",
    r"to\s+finish",
    r"to\s+win",
    r"finish",
    r"winner",
    r"champion",
    r"place",
    r"position",
];

const BOILERPLATE_SUFFIXES: &[&str] = &[r"to\s+win", r"to\s+finish", r"winner", r"champion", r"finish"];

const PROMO_MARKERS: &[&str] = &[
    r"odds\s+boost",
    r"profit\s+boost",
    r"boosted",
    r"sponsored",
    r"promo",
    r"sgp",
];

fn prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"(?i)^(?:{})\b[\s:\-]*", BOILERPLATE_PREFIXES.join("|"));
        Regex::new(&pattern).expect("static prefix regex")
    })
}

fn suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"(?i)[\s:\-]*\b(?:{})$", BOILERPLATE_SUFFIXES.join("|"));
        Regex::new(&pattern).expect("static suffix regex")
    })
}

fn promo_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let words = PROMO_MARKERS.join("|");
        // "New" only counts inside brackets: "New York Giants" is a team
        let pattern = format!(r"(?i)[\(\[]\s*(?:{words}|new!?)?\s*[\)\]]|\b(?:{words})\b");
        Regex::new(&pattern).expect("static promo regex")
    })
}

/// Collapse runs of whitespace into single spaces.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase comparison form: alphanumerics and single spaces only.
pub fn comparison_form(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title-case labels the provider shouted or whispered; keep mixed case as-is.
fn display_form(cleaned: &str) -> String {
    let has_upper = cleaned.chars().any(|c| c.is_uppercase());
    let has_lower = cleaned.chars().any(|c| c.is_lowercase());
    if has_upper && has_lower {
        return cleaned.to_string();
    }

    cleaned
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip promotional markers and market wording from a raw label.
pub fn strip_boilerplate(raw: &str) -> String {
    let mut cleaned = collapse_whitespace(&promo_regex().replace_all(raw, " "));

    for _ in 0..MAX_PREFIX_PASSES {
        let stripped = prefix_regex().replace(&cleaned, "").trim().to_string();
        if stripped == cleaned {
            break;
        }
        cleaned = stripped;
    }

    loop {
        let stripped = suffix_regex().replace(&cleaned, "").trim().to_string();
        if stripped == cleaned {
            break;
        }
        cleaned = stripped;
    }

    let trimmed = cleaned.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | ':' | '|' | '•'));
    collapse_whitespace(trimmed)
}

/// Abbreviation/nickname -> full name lookup. Keys are stored in comparison form.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in table for a sport, empty for sports without one.
    pub fn builtin(sport: &str) -> Self {
        let mut table = Self::new();
        let pairs: &[(&str, &str)] = match sport.to_lowercase().as_str() {
            "nfl" | "football" => NFL_ALIASES,
            "nba" | "basketball" => NBA_ALIASES,
            _ => &[],
        };
        for (alias, full_name) in pairs {
            table.insert(alias, full_name);
        }
        table
    }

    /// Built-in table for the event's sport, overlaid with the event's own aliases.
    pub fn for_event(config: &EventConfig) -> Self {
        let mut table = Self::builtin(&config.sport);
        for (alias, full_name) in &config.aliases {
            table.insert(alias, full_name);
        }
        table
    }

    pub fn insert(&mut self, alias: &str, full_name: &str) {
        let key = comparison_form(alias);
        if !key.is_empty() {
            self.entries.insert(key, full_name.trim().to_string());
        }
    }

    pub fn resolve(&self, cleaned: &str) -> Option<&str> {
        self.entries.get(&comparison_form(cleaned)).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Turns raw label text into a [`NormalizedLabel`].
#[derive(Debug, Clone, Default)]
pub struct LabelNormalizer {
    aliases: AliasTable,
}

impl LabelNormalizer {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    pub fn for_event(config: &EventConfig) -> Self {
        Self::new(AliasTable::for_event(config))
    }

    pub fn normalize(&self, label_text: &str) -> Result<NormalizedLabel, PairError> {
        let cleaned = strip_boilerplate(label_text);

        let (display, alias_matched) = match self.aliases.resolve(&cleaned) {
            Some(full_name) => (full_name.to_string(), true),
            None => (display_form(&cleaned), false),
        };

        let canonical = comparison_form(&display);
        if canonical.is_empty() {
            return Err(PairError::EmptyLabel {
                raw: label_text.to_string(),
            });
        }

        Ok(NormalizedLabel {
            canonical,
            display,
            raw: label_text.to_string(),
            alias_matched,
        })
    }
}

const NFL_ALIASES: &[(&str, &str)] = &[
    ("ari", "Arizona Cardinals"),
    ("cardinals", "Arizona Cardinals"),
    ("atl", "Atlanta Falcons"),
    ("falcons", "Atlanta Falcons"),
    ("bal", "Baltimore Ravens"),
    ("ravens", "Baltimore Ravens"),
    ("buf", "Buffalo Bills"),
    ("bills", "Buffalo Bills"),
    ("car", "Carolina Panthers"),
    ("panthers", "Carolina Panthers"),
    ("chi", "Chicago Bears"),
    ("bears", "Chicago Bears"),
    ("cin", "Cincinnati Bengals"),
    ("bengals", "Cincinnati Bengals"),
    ("cle", "Cleveland Browns"),
    ("browns", "Cleveland Browns"),
    ("dal", "Dallas Cowboys"),
    ("cowboys", "Dallas Cowboys"),
    ("den", "Denver Broncos"),
    ("broncos", "Denver Broncos"),
    ("det", "Detroit Lions"),
    ("lions", "Detroit Lions"),
    ("gb", "Green Bay Packers"),
    ("packers", "Green Bay Packers"),
    ("hou", "Houston Texans"),
    ("texans", "Houston Texans"),
    ("ind", "Indianapolis Colts"),
    ("colts", "Indianapolis Colts"),
    ("jax", "Jacksonville Jaguars"),
    ("jaguars", "Jacksonville Jaguars"),
    ("jags", "Jacksonville Jaguars"),
    ("kc", "Kansas City Chiefs"),
    ("kc chiefs", "Kansas City Chiefs"),
    ("chiefs", "Kansas City Chiefs"),
    ("lv", "Las Vegas Raiders"),
    ("lv raiders", "Las Vegas Raiders"),
    ("raiders", "Las Vegas Raiders"),
    ("lac", "Los Angeles Chargers"),
    ("la chargers", "Los Angeles Chargers"),
    ("chargers", "Los Angeles Chargers"),
    ("lar", "Los Angeles Rams"),
    ("la rams", "Los Angeles Rams"),
    ("rams", "Los Angeles Rams"),
    ("mia", "Miami Dolphins"),
    ("dolphins", "Miami Dolphins"),
    ("min", "Minnesota Vikings"),
    ("vikings", "Minnesota Vikings"),
    ("ne", "New England Patriots"),
    ("ne patriots", "New England Patriots"),
    ("patriots", "New England Patriots"),
    ("no", "New Orleans Saints"),
    ("no saints", "New Orleans Saints"),
    ("saints", "New Orleans Saints"),
    ("nyg", "New York Giants"),
    ("ny giants", "New York Giants"),
    ("giants", "New York Giants"),
    ("nyj", "New York Jets"),
    ("ny jets", "New York Jets"),
    ("jets", "New York Jets"),
    ("phi", "Philadelphia Eagles"),
    ("eagles", "Philadelphia Eagles"),
    ("pit", "Pittsburgh Steelers"),
    ("steelers", "Pittsburgh Steelers"),
    ("sf", "San Francisco 49ers"),
    ("sf 49ers", "San Francisco 49ers"),
    ("49ers", "San Francisco 49ers"),
    ("niners", "San Francisco 49ers"),
    ("sea", "Seattle Seahawks"),
    ("seahawks", "Seattle Seahawks"),
    ("tb", "Tampa Bay Buccaneers"),
    ("tb buccaneers", "Tampa Bay Buccaneers"),
    ("buccaneers", "Tampa Bay Buccaneers"),
    ("bucs", "Tampa Bay Buccaneers"),
    ("ten", "Tennessee Titans"),
    ("titans", "Tennessee Titans"),
    ("was", "Washington Commanders"),
    ("commanders", "Washington Commanders"),
];

const NBA_ALIASES: &[(&str, &str)] = &[
    ("atl", "Atlanta Hawks"),
    ("hawks", "Atlanta Hawks"),
    ("bos", "Boston Celtics"),
    ("celtics", "Boston Celtics"),
    ("bkn", "Brooklyn Nets"),
    ("nets", "Brooklyn Nets"),
    ("cha", "Charlotte Hornets"),
    ("hornets", "Charlotte Hornets"),
    ("chi", "Chicago Bulls"),
    ("bulls", "Chicago Bulls"),
    ("cle", "Cleveland Cavaliers"),
    ("cavaliers", "Cleveland Cavaliers"),
    ("cavs", "Cleveland Cavaliers"),
    ("dal", "Dallas Mavericks"),
    ("mavericks", "Dallas Mavericks"),
    ("mavs", "Dallas Mavericks"),
    ("den", "Denver Nuggets"),
    ("nuggets", "Denver Nuggets"),
    ("det", "Detroit Pistons"),
    ("pistons", "Detroit Pistons"),
    ("gs", "Golden State Warriors"),
    ("gsw", "Golden State Warriors"),
    ("warriors", "Golden State Warriors"),
    ("hou", "Houston Rockets"),
    ("rockets", "Houston Rockets"),
    ("ind", "Indiana Pacers"),
    ("pacers", "Indiana Pacers"),
    ("lac", "LA Clippers"),
    ("clippers", "LA Clippers"),
    ("lal", "Los Angeles Lakers"),
    ("la lakers", "Los Angeles Lakers"),
    ("lakers", "Los Angeles Lakers"),
    ("mem", "Memphis Grizzlies"),
    ("grizzlies", "Memphis Grizzlies"),
    ("mia", "Miami Heat"),
    ("heat", "Miami Heat"),
    ("mil", "Milwaukee Bucks"),
    ("bucks", "Milwaukee Bucks"),
    ("min", "Minnesota Timberwolves"),
    ("timberwolves", "Minnesota Timberwolves"),
    ("wolves", "Minnesota Timberwolves"),
    ("nop", "New Orleans Pelicans"),
    ("pelicans", "New Orleans Pelicans"),
    ("nyk", "New York Knicks"),
    ("ny knicks", "New York Knicks"),
    ("knicks", "New York Knicks"),
    ("okc", "Oklahoma City Thunder"),
    ("okc thunder", "Oklahoma City Thunder"),
    ("thunder", "Oklahoma City Thunder"),
    ("orl", "Orlando Magic"),
    ("magic", "Orlando Magic"),
    ("phi", "Philadelphia 76ers"),
    ("76ers", "Philadelphia 76ers"),
    ("sixers", "Philadelphia 76ers"),
    ("phx", "Phoenix Suns"),
    ("suns", "Phoenix Suns"),
    ("por", "Portland Trail Blazers"),
    ("blazers", "Portland Trail Blazers"),
    ("trail blazers", "Portland Trail Blazers"),
    ("sac", "Sacramento Kings"),
    ("kings", "Sacramento Kings"),
    ("sa", "San Antonio Spurs"),
    ("sas", "San Antonio Spurs"),
    ("spurs", "San Antonio Spurs"),
    ("tor", "Toronto Raptors"),
    ("raptors", "Toronto Raptors"),
    ("uta", "Utah Jazz"),
    ("jazz", "Utah Jazz"),
    ("was", "Washington Wizards"),
    ("wizards", "Washington Wizards"),
];
