//! Payload building and run artifact export.

use crate::assemble::{Assembly, AssemblyDiagnostics};
use crate::error::PipelineError;
use crate::models::{Entry, EventConfig, EventType, GroupKey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadGroup {
    pub group: GroupKey,
    pub teams: Vec<Entry>,
}

/// Submission-ready document for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum Payload {
    Championship { teams: Vec<Entry> },
    Conference { groups: Vec<PayloadGroup> },
    Division { groups: Vec<PayloadGroup> },
}

impl Payload {
    pub fn event_type(&self) -> EventType {
        match self {
            Payload::Championship { .. } => EventType::Championship,
            Payload::Conference { .. } => EventType::Conference,
            Payload::Division { .. } => EventType::Division,
        }
    }

    /// Groups of a grouped payload; empty for championships
    pub fn groups(&self) -> &[PayloadGroup] {
        match self {
            Payload::Championship { .. } => &[],
            Payload::Conference { groups } | Payload::Division { groups } => groups,
        }
    }

    /// All entries in payload order (group by group for grouped events).
    pub fn entries(&self) -> Vec<&Entry> {
        match self {
            Payload::Championship { teams } => teams.iter().collect(),
            Payload::Conference { groups } | Payload::Division { groups } => {
                groups.iter().flat_map(|g| g.teams.iter()).collect()
            }
        }
    }

    pub fn entry_count(&self) -> usize {
        match self {
            Payload::Championship { teams } => teams.len(),
            Payload::Conference { groups } | Payload::Division { groups } => {
                groups.iter().map(|g| g.teams.len()).sum()
            }
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups().len()
    }

    pub fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Partition entries into groups, keeping first-seen group order.
fn partition(entries: Vec<Entry>) -> Vec<PayloadGroup> {
    let mut groups: Vec<PayloadGroup> = Vec::new();
    for entry in entries {
        let Some(key) = entry.group.clone() else {
            continue;
        };
        match groups.iter_mut().find(|g| g.group == key) {
            Some(group) => group.teams.push(entry),
            None => groups.push(PayloadGroup {
                group: key,
                teams: vec![entry],
            }),
        }
    }
    groups
}

/// Build the payload for `config.event_type`.
///
/// Fails with `EmptyPayload` when nothing is left to submit.
pub fn build(entries: Vec<Entry>, config: &EventConfig) -> Result<Payload, PipelineError> {
    let payload = match config.event_type {
        EventType::Championship => Payload::Championship { teams: entries },
        EventType::Conference => Payload::Conference {
            groups: partition(entries),
        },
        EventType::Division => Payload::Division {
            groups: partition(entries),
        },
    };

    if payload.entry_count() == 0 {
        return Err(PipelineError::EmptyPayload {
            diagnostics: AssemblyDiagnostics::default(),
        });
    }
    Ok(payload)
}

/// [`build`] over an assembly, carrying its diagnostics into the result or the error.
pub fn build_from_assembly(
    assembly: Assembly,
    config: &EventConfig,
) -> Result<(Payload, AssemblyDiagnostics), PipelineError> {
    let Assembly {
        entries,
        diagnostics,
    } = assembly;

    match build(entries, config) {
        Ok(payload) => Ok((payload, diagnostics)),
        Err(PipelineError::EmptyPayload { .. }) => Err(PipelineError::EmptyPayload { diagnostics }),
        Err(other) => Err(other),
    }
}

/// Exported run artifact.
#[derive(Debug, Serialize)]
pub struct ExportDocument<'a> {
    pub provider: &'a str,
    pub sport: &'a str,
    pub tournament: &'a str,
    pub event_type: EventType,
    pub run_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub data: &'a Payload,
}

fn file_token(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Artifact name for one run. The run id suffix keeps runs exported in the
/// same second from overwriting each other.
pub fn export_file_name(config: &EventConfig, at: DateTime<Utc>, run_id: Uuid) -> String {
    let run = run_id.simple().to_string();
    format!(
        "{}_{}_{}_{}_{}.json",
        file_token(&config.provider),
        file_token(&config.sport),
        file_token(&config.tournament),
        at.format("%Y%m%d_%H%M%S"),
        &run[..8]
    )
}

/// Write the payload to `dir` as a JSON artifact, returning the file path.
pub fn export(
    payload: &Payload,
    config: &EventConfig,
    run_id: Uuid,
    dir: &Path,
) -> Result<PathBuf, std::io::Error> {
    let exported_at = Utc::now();
    let document = ExportDocument {
        provider: &config.provider,
        sport: &config.sport,
        tournament: &config.tournament,
        event_type: payload.event_type(),
        run_id,
        exported_at,
        data: payload,
    };

    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(config, exported_at, run_id));
    let content = serde_json::to_string_pretty(&document)?;
    fs::write(&path, content)?;

    info!(path = %path.display(), entries = payload.entry_count(), "Payload exported");
    Ok(path)
}
