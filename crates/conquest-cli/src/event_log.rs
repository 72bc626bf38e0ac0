//! Append-only JSONL log of session events.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use conquest_reconcile::ReconcileEvent;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct LoggedEvent<'a> {
    timestamp: DateTime<Utc>,
    session: &'a str,
    #[serde(flatten)]
    event: &'a ReconcileEvent,
}

pub struct EventLog {
    path: PathBuf,
    session: String,
}

impl EventLog {
    pub fn new(path: &Path, session: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            session: session.into(),
        }
    }

    pub fn append(&self, event: &ReconcileEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open event log {}", self.path.display()))?;

        let line = serde_json::to_string(&LoggedEvent {
            timestamp: Utc::now(),
            session: &self.session,
            event,
        })?;
        writeln!(file, "{}", line)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use conquest_protocol::PlayerSlot;
    use conquest_reconcile::BannerState;

    use super::*;

    #[test]
    fn appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/events.jsonl");
        let log = EventLog::new(&path, "session-1");

        log.append(&ReconcileEvent::PlayerEliminated(PlayerSlot(2))).unwrap();
        log.append(&ReconcileEvent::BannerChanged(BannerState::ShowingReplayBanner(PlayerSlot(1))))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["session"], "session-1");
        assert_eq!(lines[0]["event"], "player_eliminated");
        assert_eq!(lines[0]["data"], 2);
        assert!(lines[0]["timestamp"].is_string());
        assert_eq!(lines[1]["data"]["state"], "showing_replay_banner");
        assert_eq!(lines[1]["data"]["player"], 1);
    }
}
