//! The three extraction strategies.
//!
//! Each is a pure function over a [`PageSnapshot`]. None of them validate
//! prices; acceptance is decided by the chain.

use super::PageSnapshot;
use crate::models::{RawPair, StrategyId};
use crate::normalize::is_price_token;
use std::collections::HashSet;

pub const PRIMARY_TITLE_TESTID: &str = "button-title-market-board";
pub const PRIMARY_ODDS_TESTID: &str = "button-odds-market-board";

const LABEL_MARKERS: &[&str] = &["title", "name", "outcome-label", "participant"];
const PRICE_MARKERS: &[&str] = &["odds", "price"];

/// Raw strategy output plus the signals the chain judges it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyOutput {
    pub strategy: StrategyId,
    pub labels_found: usize,
    pub prices_found: usize,
    pub pairs: Vec<RawPair>,
    pub realigned: bool,
}

/// A located text fragment and its document position.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Located {
    position: usize,
    text: String,
}

/// Pair labels and prices found by a selector strategy.
///
/// Equal counts zip in order. Otherwise pairs are rebuilt by walking both lists
/// in document order, giving each price the closest unpaired label before it.
fn pair_up(strategy: StrategyId, labels: Vec<Located>, prices: Vec<Located>) -> StrategyOutput {
    let labels_found = labels.len();
    let prices_found = prices.len();

    if labels_found == prices_found {
        let pairs = labels
            .into_iter()
            .zip(prices)
            .map(|(l, p)| RawPair::new(l.text, p.text, strategy, l.position))
            .collect();
        return StrategyOutput {
            strategy,
            labels_found,
            prices_found,
            pairs,
            realigned: false,
        };
    }

    let mut events: Vec<(usize, bool, String)> = labels
        .into_iter()
        .map(|l| (l.position, true, l.text))
        .chain(prices.into_iter().map(|p| (p.position, false, p.text)))
        .collect();
    events.sort_by_key(|(position, is_label, _)| (*position, !*is_label));

    let mut pairs = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (position, is_label, text) in events {
        if is_label {
            pending = Some((position, text));
        } else if let Some((label_pos, label)) = pending.take() {
            pairs.push(RawPair::new(label, text, strategy, label_pos));
        }
    }

    StrategyOutput {
        strategy,
        labels_found,
        prices_found,
        pairs,
        realigned: true,
    }
}

/// Exact `data-testid` match on the provider's market-board title and odds spans.
pub fn primary_selectors(snapshot: &PageSnapshot) -> StrategyOutput {
    let mut labels = Vec::new();
    let mut prices = Vec::new();

    for node in &snapshot.nodes {
        let target = match node.attr("data-testid") {
            Some(PRIMARY_TITLE_TESTID) => &mut labels,
            Some(PRIMARY_ODDS_TESTID) => &mut prices,
            _ => continue,
        };
        if !node.text.is_empty() {
            target.push(Located {
                position: node.index,
                text: node.text.clone(),
            });
        }
    }

    pair_up(StrategyId::PrimarySelectors, labels, prices)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Label,
    Price,
}

fn marker_role(node: &super::PageNode) -> Option<Role> {
    let markers = ["data-testid", "class", "data-test", "aria-label"]
        .iter()
        .filter_map(|name| node.attr(name))
        .map(|v| v.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    if markers.is_empty() {
        return None;
    }

    if PRICE_MARKERS.iter().any(|m| markers.contains(m)) {
        Some(Role::Price)
    } else if LABEL_MARKERS.iter().any(|m| markers.contains(m)) {
        Some(Role::Label)
    } else {
        None
    }
}

/// Partial attribute match: title/name markers for labels, odds/price markers
/// for prices. Headings are skipped and only the innermost of nested matches counts.
pub fn generalized_selectors(snapshot: &PageSnapshot) -> StrategyOutput {
    let candidates: Vec<(usize, Role)> = snapshot
        .nodes
        .iter()
        .filter(|n| !n.is_heading() && !n.text.is_empty())
        .filter_map(|n| marker_role(n).map(|role| (n.index, role)))
        .collect();

    // Any candidate that contains another candidate of the same role is a wrapper
    let mut wrappers = HashSet::new();
    for &(idx, role) in &candidates {
        let mut current = snapshot.nodes.get(idx).and_then(|n| n.parent);
        while let Some(parent) = current {
            if candidates.iter().any(|&(c, r)| c == parent && r == role) {
                wrappers.insert(parent);
            }
            current = snapshot.nodes.get(parent).and_then(|n| n.parent);
        }
    }

    let mut labels = Vec::new();
    let mut prices = Vec::new();
    for (idx, role) in candidates {
        if wrappers.contains(&idx) {
            continue;
        }
        let Some(node) = snapshot.nodes.get(idx) else {
            continue;
        };
        let located = Located {
            position: idx,
            text: node.text.clone(),
        };
        match role {
            Role::Label => labels.push(located),
            Role::Price => prices.push(located),
        }
    }

    pair_up(StrategyId::GeneralizedSelectors, labels, prices)
}

/// Scan text nodes; each price-shaped node takes the nearest preceding
/// unconsumed non-price text as its label.
pub fn text_pattern(snapshot: &PageSnapshot) -> StrategyOutput {
    let mut labels_found = 0;
    let mut prices_found = 0;
    let mut pairs = Vec::new();
    let mut pending: Option<(usize, &str)> = None;

    for node in &snapshot.nodes {
        let text = node.own_text.as_str();
        if text.is_empty() || node.is_heading() {
            continue;
        }

        if is_price_token(text) {
            prices_found += 1;
            if let Some((position, label)) = pending.take() {
                pairs.push(RawPair::new(label, text, StrategyId::TextPattern, position));
            }
        } else {
            labels_found += 1;
            pending = Some((node.index, text));
        }
    }

    StrategyOutput {
        strategy: StrategyId::TextPattern,
        labels_found,
        prices_found,
        realigned: false,
        pairs,
    }
}
