//! Reconciliation timing configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Presentation timings and queue policy, loaded from YAML.
///
/// All durations are milliseconds on disk and exposed as [`Duration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// How long a recruitment/upgrade/conquest highlight stays up
    #[serde(default = "default_highlight_ms")]
    pub highlight_ms: u64,

    /// Soldier position interpolation for a movement with a known source
    #[serde(default = "default_movement_transition_ms")]
    pub movement_transition_ms: u64,

    /// Pause after each replayed combat round
    #[serde(default = "default_combat_round_ms")]
    pub combat_round_ms: u64,

    /// Simplified conquest feedback: gap between attack and combat sounds
    #[serde(default = "default_attack_gap_ms")]
    pub attack_gap_ms: u64,

    /// Simplified conquest feedback: gap between combat and conquest sounds
    #[serde(default = "default_combat_gap_ms")]
    pub combat_gap_ms: u64,

    /// How long the "P is acting" banner holds before their moves replay
    #[serde(default = "default_replay_banner_ms")]
    pub replay_banner_ms: u64,

    /// Retry interval while a local battle is in flight or no baseline exists
    #[serde(default = "default_defer_backoff_ms")]
    pub defer_backoff_ms: u64,

    /// Skip replay for snapshots with more than this many queued behind them
    #[serde(default)]
    pub coalesce_after: Option<usize>,
}

fn default_highlight_ms() -> u64 {
    1500
}
fn default_movement_transition_ms() -> u64 {
    800
}
fn default_combat_round_ms() -> u64 {
    600
}
fn default_attack_gap_ms() -> u64 {
    400
}
fn default_combat_gap_ms() -> u64 {
    700
}
fn default_replay_banner_ms() -> u64 {
    1500
}
fn default_defer_backoff_ms() -> u64 {
    250
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            highlight_ms: default_highlight_ms(),
            movement_transition_ms: default_movement_transition_ms(),
            combat_round_ms: default_combat_round_ms(),
            attack_gap_ms: default_attack_gap_ms(),
            combat_gap_ms: default_combat_gap_ms(),
            replay_banner_ms: default_replay_banner_ms(),
            defer_backoff_ms: default_defer_backoff_ms(),
            coalesce_after: None,
        }
    }
}

impl ReconcileConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Same queue policy with every presentation delay removed (headless runs).
    pub fn instant(&self) -> Self {
        Self {
            highlight_ms: 0,
            movement_transition_ms: 0,
            combat_round_ms: 0,
            attack_gap_ms: 0,
            combat_gap_ms: 0,
            replay_banner_ms: 0,
            ..self.clone()
        }
    }

    pub fn highlight(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }

    pub fn movement_transition(&self) -> Duration {
        Duration::from_millis(self.movement_transition_ms)
    }

    pub fn combat_round(&self) -> Duration {
        Duration::from_millis(self.combat_round_ms)
    }

    pub fn attack_gap(&self) -> Duration {
        Duration::from_millis(self.attack_gap_ms)
    }

    pub fn combat_gap(&self) -> Duration {
        Duration::from_millis(self.combat_gap_ms)
    }

    pub fn replay_banner(&self) -> Duration {
        Duration::from_millis(self.replay_banner_ms)
    }

    pub fn defer_backoff(&self) -> Duration {
        // Never zero, or the deferral loop never yields to the timer.
        Duration::from_millis(self.defer_backoff_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "highlight_ms: 900\ncoalesce_after: 4").unwrap();

        let config = ReconcileConfig::load(file.path()).unwrap();
        assert_eq!(config.highlight(), Duration::from_millis(900));
        assert_eq!(config.coalesce_after, Some(4));
        assert_eq!(config.defer_backoff_ms, 250);
        assert_eq!(config.replay_banner_ms, 1500);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ReconcileConfig::load(Path::new("/nonexistent/reconcile.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/reconcile.yaml"));
    }

    #[test]
    fn instant_zeroes_presentation_only() {
        let config = ReconcileConfig {
            coalesce_after: Some(2),
            ..ReconcileConfig::default()
        }
        .instant();
        assert_eq!(config.highlight(), Duration::ZERO);
        assert_eq!(config.replay_banner(), Duration::ZERO);
        assert_eq!(config.defer_backoff(), Duration::from_millis(250));
        assert_eq!(config.coalesce_after, Some(2));
    }
}
