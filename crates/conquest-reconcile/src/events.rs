use std::sync::Arc;

use conquest_protocol::{EndResult, PlayerSlot, Snapshot};
use serde::Serialize;

use crate::banner::BannerState;

/// Signals produced by a reconciliation session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ReconcileEvent {
    /// A player dropped to zero regions (announced once per session)
    PlayerEliminated(PlayerSlot),
    /// The snapshot is now the displayed state
    StateCommitted(Arc<Snapshot>),
    /// Terminal state committed; `None` when only the external end check fired
    GameEnded(Option<EndResult>),
    BannerChanged(BannerState),
}

impl ReconcileEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ReconcileEvent::PlayerEliminated(_) => "player_eliminated",
            ReconcileEvent::StateCommitted(_) => "state_committed",
            ReconcileEvent::GameEnded(_) => "game_ended",
            ReconcileEvent::BannerChanged(_) => "banner_changed",
        }
    }
}
