//! Extraction strategy chain.
//!
//! A [`PageSnapshot`] is a flattened, document-ordered view of a rendered page.
//! The chain runs each strategy in [`StrategyId::CHAIN`] order and accepts the
//! first one whose output is non-empty and carries at least one valid price.

pub mod html;
pub mod strategies;

use crate::error::PipelineError;
use crate::models::{EventConfig, GroupHeader, RawPair, StrategyId};
use crate::normalize::normalize_price;
use serde::Serialize;
use strategies::StrategyOutput;
use tracing::{debug, info, warn};

/// Class token the provider puts on conference/division titles
pub const NAV_TITLE_CLASS: &str = "cb-title__nav-title";

/// Minimum Jaro-Winkler score for a fuzzy content marker hit
const MARKER_SIMILARITY: f64 = 0.92;

/// How many text samples a failed extraction keeps for later reproduction
const RAW_SAMPLE_LEN: usize = 12;

/// One element of the page, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageNode {
    pub index: usize,
    pub parent: Option<usize>,
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    /// All descendant text, whitespace-collapsed
    pub text: String,
    /// Text of this element's direct text children only
    pub own_text: String,
}

impl PageNode {
    pub fn new(index: usize, parent: Option<usize>, tag: &str) -> Self {
        Self {
            index,
            parent,
            tag: tag.to_lowercase(),
            attributes: Vec::new(),
            text: String::new(),
            own_text: String::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_lowercase(), value.to_string()));
        self
    }

    /// Sets both `text` and `own_text`; for leaf nodes they coincide.
    pub fn with_text(mut self, text: &str) -> Self {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        self.text = collapsed.clone();
        self.own_text = collapsed;
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, token: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == token))
            .unwrap_or(false)
    }

    pub fn is_heading(&self) -> bool {
        matches!(self.tag.as_str(), "h1" | "h2" | "h3") || self.has_class(NAV_TITLE_CLASS)
    }
}

/// Flattened page as produced by a page source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: Option<String>,
    pub error_banner: Option<String>,
    pub nodes: Vec<PageNode>,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, title: Option<String>, nodes: Vec<PageNode>) -> Self {
        Self {
            url: url.into(),
            title,
            error_banner: None,
            nodes,
        }
    }

    pub fn with_error_banner(mut self, banner: impl Into<String>) -> Self {
        self.error_banner = Some(banner.into());
        self
    }

    /// Conference/division headers in document order.
    ///
    /// The provider's nav-title class wins; plain h2/h3 headings are the fallback.
    pub fn group_headers(&self) -> Vec<GroupHeader> {
        let collect = |pred: &dyn Fn(&PageNode) -> bool| -> Vec<GroupHeader> {
            self.nodes
                .iter()
                .filter(|n| pred(n) && !n.text.is_empty())
                .map(|n| GroupHeader {
                    position: n.index,
                    text: n.text.clone(),
                })
                .collect()
        };

        let primary = collect(&|n: &PageNode| n.has_class(NAV_TITLE_CLASS));
        if !primary.is_empty() {
            return primary;
        }
        collect(&|n: &PageNode| matches!(n.tag.as_str(), "h2" | "h3"))
    }

    /// First few non-empty text fragments, kept for failure diagnostics
    pub fn raw_sample(&self, limit: usize) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| !n.own_text.is_empty())
            .take(limit)
            .map(|n| n.own_text.clone())
            .collect()
    }

    /// Whether `marker` shows up in the title or page text, exactly or fuzzily.
    pub fn mentions(&self, marker: &str) -> bool {
        let needle = marker.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }

        let haystacks = self
            .title
            .iter()
            .map(|t| t.as_str())
            .chain(self.nodes.iter().map(|n| n.own_text.as_str()));

        for hay in haystacks {
            let hay = hay.to_lowercase();
            if hay.contains(&needle) || fuzzy_window_match(&hay, &needle) {
                return true;
            }
        }
        false
    }
}

/// Compare `needle` against word windows of `hay` with spacing ignored,
/// so "superbowl" still matches "super bowl".
fn fuzzy_window_match(hay: &str, needle: &str) -> bool {
    let compact_needle: String = needle.split_whitespace().collect();
    let needle_words = needle.split_whitespace().count().max(1);
    let words: Vec<&str> = hay.split_whitespace().collect();

    let mut sizes = vec![needle_words];
    if needle_words > 1 {
        sizes.push(needle_words - 1);
    }

    sizes.into_iter().filter(|&n| n <= words.len()).any(|n| {
        words.windows(n).any(|w| {
            let window: String = w.concat();
            strsim::jaro_winkler(&window, &compact_needle) >= MARKER_SIMILARITY
        })
    })
}

/// What one strategy produced and why it was accepted or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: StrategyId,
    pub labels_found: usize,
    pub prices_found: usize,
    pub pairs: usize,
    pub valid_prices: usize,
    pub count_matched: bool,
    pub realigned: bool,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
}

/// Context attached to `ExtractionFailed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageDiagnostics {
    pub url: String,
    pub title: Option<String>,
    pub error_banner: Option<String>,
    /// Sport or tournament name seen on the page. `false` suggests the wrong page
    /// was served; `true` suggests the markup changed.
    pub content_markers_present: bool,
    pub markers_checked: Vec<String>,
    pub node_count: usize,
    pub attempts: Vec<StrategyAttempt>,
    pub raw_sample: Vec<String>,
}

/// Accepted strategy output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub strategy: StrategyId,
    pub pairs: Vec<RawPair>,
    pub headers: Vec<GroupHeader>,
    pub realigned: bool,
    pub attempts: Vec<StrategyAttempt>,
}

fn run_strategy(strategy: StrategyId, snapshot: &PageSnapshot) -> StrategyOutput {
    match strategy {
        StrategyId::PrimarySelectors => strategies::primary_selectors(snapshot),
        StrategyId::GeneralizedSelectors => strategies::generalized_selectors(snapshot),
        StrategyId::TextPattern => strategies::text_pattern(snapshot),
    }
}

/// Judge one strategy's output against the shared acceptance predicate.
fn evaluate(output: &StrategyOutput) -> StrategyAttempt {
    let valid_prices = output
        .pairs
        .iter()
        .filter(|p| normalize_price(&p.price_text).is_ok())
        .count();

    let rejection = if output.labels_found == 0 && output.prices_found == 0 {
        Some("no matching elements".to_string())
    } else if output.pairs.is_empty() {
        Some(format!(
            "{} labels and {} prices could not be aligned",
            output.labels_found, output.prices_found
        ))
    } else if valid_prices == 0 {
        Some("no candidate price passed validation".to_string())
    } else {
        None
    };

    StrategyAttempt {
        strategy: output.strategy,
        labels_found: output.labels_found,
        prices_found: output.prices_found,
        pairs: output.pairs.len(),
        valid_prices,
        count_matched: output.labels_found == output.prices_found,
        realigned: output.realigned,
        accepted: rejection.is_none(),
        rejection,
    }
}

/// Run the strategy chain over a snapshot.
pub fn extract(snapshot: &PageSnapshot, config: &EventConfig) -> Result<Extraction, PipelineError> {
    let mut attempts = Vec::with_capacity(StrategyId::CHAIN.len());

    for strategy in StrategyId::CHAIN {
        let output = run_strategy(strategy, snapshot);
        let attempt = evaluate(&output);

        debug!(
            strategy = %strategy,
            labels = attempt.labels_found,
            prices = attempt.prices_found,
            pairs = attempt.pairs,
            valid_prices = attempt.valid_prices,
            "Strategy attempt"
        );

        let accepted = attempt.accepted;
        attempts.push(attempt);

        if accepted {
            if output.realigned {
                warn!(
                    strategy = %strategy,
                    labels = output.labels_found,
                    prices = output.prices_found,
                    "Label/price counts differed; pairs realigned by position"
                );
            }
            info!(
                sport = %config.sport,
                tournament = %config.tournament,
                strategy = %strategy,
                pairs = output.pairs.len(),
                "Extraction accepted"
            );
            return Ok(Extraction {
                strategy,
                pairs: output.pairs,
                headers: snapshot.group_headers(),
                realigned: output.realigned,
                attempts,
            });
        }
    }

    let markers_checked = vec![config.tournament.clone(), config.sport.clone()];
    let content_markers_present = markers_checked.iter().any(|m| snapshot.mentions(m));

    let reason = match (&snapshot.error_banner, content_markers_present) {
        (Some(banner), _) => format!("page shows an error banner: {}", banner),
        (None, true) => "expected content present but no strategy matched; page structure likely changed".to_string(),
        (None, false) => "expected content markers missing; wrong or empty page".to_string(),
    };

    warn!(
        sport = %config.sport,
        tournament = %config.tournament,
        url = %snapshot.url,
        content_markers_present,
        "Extraction failed: {}",
        reason
    );

    Err(PipelineError::ExtractionFailed {
        reason,
        diagnostics: Box::new(PageDiagnostics {
            url: snapshot.url.clone(),
            title: snapshot.title.clone(),
            error_banner: snapshot.error_banner.clone(),
            content_markers_present,
            markers_checked,
            node_count: snapshot.nodes.len(),
            attempts,
            raw_sample: snapshot.raw_sample(RAW_SAMPLE_LEN),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;

    fn config() -> EventConfig {
        EventConfig::new(
            "NBA",
            "NBA Championship",
            EventType::Championship,
            "https://example.test/nba",
            3102,
            1,
        )
    }

    fn primary_page(rows: &[(&str, &str)]) -> PageSnapshot {
        let mut nodes = vec![PageNode::new(0, None, "div")];
        for (label, price) in rows {
            let idx = nodes.len();
            nodes.push(
                PageNode::new(idx, Some(0), "span")
                    .with_attr("data-testid", "button-title-market-board")
                    .with_text(label),
            );
            nodes.push(
                PageNode::new(idx + 1, Some(0), "span")
                    .with_attr("data-testid", "button-odds-market-board")
                    .with_text(price),
            );
        }
        PageSnapshot::new("https://example.test/nba", Some("NBA Championship Odds".into()), nodes)
    }

    #[test]
    fn test_primary_strategy_accepted_first() {
        let page = primary_page(&[("Boston Celtics", "+350"), ("Denver Nuggets", "+600")]);
        let extraction = extract(&page, &config()).unwrap();
        assert_eq!(extraction.strategy, StrategyId::PrimarySelectors);
        assert_eq!(extraction.pairs.len(), 2);
        assert_eq!(extraction.pairs[0].label_text, "Boston Celtics");
        assert_eq!(extraction.pairs[1].price_text, "+600");
        assert_eq!(extraction.attempts.len(), 1);
        assert!(!extraction.realigned);
    }

    #[test]
    fn test_empty_page_fails_with_diagnostics() {
        let page = PageSnapshot::new(
            "https://example.test/nba",
            Some("NBA Championship Odds".into()),
            vec![PageNode::new(0, None, "div").with_text("Loading")],
        );
        let err = extract(&page, &config()).unwrap_err();
        match err {
            PipelineError::ExtractionFailed { diagnostics, .. } => {
                assert_eq!(diagnostics.attempts.len(), 3);
                assert!(diagnostics.attempts.iter().all(|a| !a.accepted));
                assert!(diagnostics.content_markers_present);
                assert_eq!(diagnostics.raw_sample, vec!["Loading".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_page_is_distinguished() {
        let page = PageSnapshot::new(
            "https://example.test/nba",
            Some("Sign in".into()),
            vec![PageNode::new(0, None, "p").with_text("Please log in to continue")],
        );
        match extract(&page, &config()).unwrap_err() {
            PipelineError::ExtractionFailed { diagnostics, reason } => {
                assert!(!diagnostics.content_markers_present);
                assert!(reason.contains("missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_prices_advance_the_chain() {
        // Primary selectors match, but every price is junk; the text pattern has nothing either
        let page = primary_page(&[("Boston Celtics", "OFF"), ("Denver Nuggets", "N/A")]);
        let err = extract(&page, &config()).unwrap_err();
        match err {
            PipelineError::ExtractionFailed { diagnostics, .. } => {
                let first = &diagnostics.attempts[0];
                assert_eq!(first.pairs, 2);
                assert_eq!(first.valid_prices, 0);
                assert_eq!(first.rejection.as_deref(), Some("no candidate price passed validation"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fuzzy_marker_match() {
        let page = PageSnapshot::new(
            "u",
            Some("NFL Superbowl Futures".into()),
            Vec::new(),
        );
        assert!(page.mentions("Super bowl"));
        assert!(!page.mentions("Stanley Cup"));
    }

    #[test]
    fn test_group_headers_prefer_nav_title() {
        let nodes = vec![
            PageNode::new(0, None, "h2").with_text("Popular"),
            PageNode::new(1, None, "div")
                .with_attr("class", "cb-title__simple-title cb-title__nav-title")
                .with_text("NFL 2025/26 - AFC East"),
        ];
        let page = PageSnapshot::new("u", None, nodes);
        let headers = page.group_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].position, 1);
    }
}
