//! Entry assembly: normalize each raw pair, resolve its group, drop duplicates.
//!
//! Per-pair failures never abort a run. They are counted and listed in
//! [`AssemblyDiagnostics`] so the caller can report them with the payload.

use crate::models::{Entry, EventConfig, GroupHeader, GroupKey, RawPair};
use crate::normalize::{normalize_price, LabelNormalizer};
use crate::error::PairError;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    InvalidPrice,
    EmptyLabel,
    /// Same canonical label already seen earlier in the run
    Duplicate,
    /// Grouped event type but no header precedes the pair
    Ungrouped,
}

impl From<&PairError> for DropReason {
    fn from(err: &PairError) -> Self {
        match err {
            PairError::InvalidPrice { .. } => DropReason::InvalidPrice,
            PairError::EmptyLabel { .. } => DropReason::EmptyLabel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedPair {
    pub position: usize,
    pub label_text: String,
    pub price_text: String,
    pub reason: DropReason,
}

/// Counts and reasons for one assembly pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyDiagnostics {
    pub pairs_seen: usize,
    pub entries_kept: usize,
    pub aliases_resolved: usize,
    pub invalid_price: usize,
    pub empty_label: usize,
    pub duplicate: usize,
    pub ungrouped: usize,
    pub dropped: Vec<DroppedPair>,
}

impl AssemblyDiagnostics {
    fn drop_pair(&mut self, pair: &RawPair, reason: DropReason) {
        match reason {
            DropReason::InvalidPrice => self.invalid_price += 1,
            DropReason::EmptyLabel => self.empty_label += 1,
            DropReason::Duplicate => self.duplicate += 1,
            DropReason::Ungrouped => self.ungrouped += 1,
        }
        self.dropped.push(DroppedPair {
            position: pair.position,
            label_text: pair.label_text.clone(),
            price_text: pair.price_text.clone(),
            reason,
        });
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assembly {
    pub entries: Vec<Entry>,
    pub diagnostics: AssemblyDiagnostics,
}

/// Group of the nearest header strictly before `position`.
fn resolve_group(headers: &[GroupHeader], position: usize, config: &EventConfig) -> Option<GroupKey> {
    // Headers arrive in document order
    let preceding = headers.partition_point(|h| h.position < position);
    let header = preceding.checked_sub(1).and_then(|i| headers.get(i))?;
    GroupKey::from_header(&header.text, config.event_type)
}

pub struct EntryAssembler<'a> {
    config: &'a EventConfig,
    labels: LabelNormalizer,
}

impl<'a> EntryAssembler<'a> {
    pub fn new(config: &'a EventConfig) -> Self {
        Self {
            config,
            labels: LabelNormalizer::for_event(config),
        }
    }

    pub fn with_normalizer(config: &'a EventConfig, labels: LabelNormalizer) -> Self {
        Self { config, labels }
    }

    pub fn assemble(&self, pairs: &[RawPair], headers: &[GroupHeader]) -> Assembly {
        let mut diagnostics = AssemblyDiagnostics {
            pairs_seen: pairs.len(),
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::new();
        let mut entries = Vec::new();

        for pair in pairs {
            let normalized = self
                .labels
                .normalize(&pair.label_text)
                .and_then(|label| normalize_price(&pair.price_text).map(|price| (label, price)));

            let (label, price) = match normalized {
                Ok(v) => v,
                Err(err) => {
                    debug!(position = pair.position, "Dropping pair: {}", err);
                    diagnostics.drop_pair(pair, DropReason::from(&err));
                    continue;
                }
            };

            let group = if self.config.event_type.is_grouped() {
                match resolve_group(headers, pair.position, self.config) {
                    Some(group) => Some(group),
                    None => {
                        diagnostics.drop_pair(pair, DropReason::Ungrouped);
                        continue;
                    }
                }
            } else {
                None
            };

            // First-seen wins; page order reflects the provider's ranking
            if !seen.insert(label.canonical.clone()) {
                diagnostics.drop_pair(pair, DropReason::Duplicate);
                continue;
            }

            if label.alias_matched {
                diagnostics.aliases_resolved += 1;
            }
            entries.push(Entry { label, price, group });
        }

        diagnostics.entries_kept = entries.len();
        Assembly {
            entries,
            diagnostics,
        }
    }
}

/// Assemble with the event's default label normalizer.
pub fn assemble(pairs: &[RawPair], headers: &[GroupHeader], config: &EventConfig) -> Assembly {
    EntryAssembler::new(config).assemble(pairs, headers)
}
