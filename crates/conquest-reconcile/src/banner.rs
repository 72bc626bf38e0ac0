//! Turn/banner coordinator.
//!
//! Decides which banner the UI shows while snapshots are reconciled and
//! whether regions may be interacted with. The state is published on a
//! watch channel; the drain loop of the update sequencer is the only writer,
//! except for the UI's "banner complete" signal.

use std::sync::Arc;

use conquest_protocol::PlayerSlot;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::effects::SessionHooks;
use crate::events::ReconcileEvent;

/// What the turn banner area is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "player", rename_all = "snake_case")]
pub enum BannerState {
    #[default]
    Idle,
    /// "P is acting" - shown before P's moves replay
    ShowingReplayBanner(PlayerSlot),
    /// "Your turn" - held until the UI reports the banner finished
    ShowingMyTurnBanner,
    /// Remote moves are replaying
    Transitioning,
}

/// Banner state machine for one session.
pub struct BannerCoordinator {
    state: Arc<watch::Sender<BannerState>>,
    events: broadcast::Sender<ReconcileEvent>,
    /// Last player whose replay banner was shown during the current streak.
    last_replay_banner: Option<PlayerSlot>,
}

impl BannerCoordinator {
    pub fn new(
        state: Arc<watch::Sender<BannerState>>,
        events: broadcast::Sender<ReconcileEvent>,
    ) -> Self {
        Self {
            state,
            events,
            last_replay_banner: None,
        }
    }

    pub fn state(&self) -> BannerState {
        *self.state.borrow()
    }

    /// A remote player's moves are about to replay.
    ///
    /// Returns `true` when the replay banner was newly raised; a player's
    /// banner is not repeated across back-to-back snapshots of their streak.
    /// A my-turn banner the UI has not dismissed yet stays up.
    pub fn begin_remote_replay(&mut self, acting: PlayerSlot) -> bool {
        if self.my_turn_pending() {
            debug!(acting = %acting, "my-turn banner still pending; replaying under it");
            return false;
        }
        if self.last_replay_banner == Some(acting) {
            self.set(BannerState::Transitioning);
            return false;
        }
        self.last_replay_banner = Some(acting);
        self.set(BannerState::ShowingReplayBanner(acting));
        true
    }

    /// The replay banner has been visible long enough; moves start playing.
    pub fn start_transition(&mut self) {
        if !self.my_turn_pending() {
            self.set(BannerState::Transitioning);
        }
    }

    /// Reconciliation of one snapshot finished.
    ///
    /// `turn_passed_to` is the new current player when the turn changed hands.
    pub fn finish(&mut self, local: PlayerSlot, turn_passed_to: Option<PlayerSlot>) {
        match turn_passed_to {
            Some(next) if next == local => self.begin_local_turn(),
            _ => {
                // A pending my-turn banner stays until the UI dismisses it.
                if !self.my_turn_pending() {
                    self.set(BannerState::Idle);
                }
            }
        }
    }

    /// The local player's turn starts: raise the my-turn banner.
    pub fn begin_local_turn(&mut self) {
        self.last_replay_banner = None;
        self.set(BannerState::ShowingMyTurnBanner);
    }

    /// Back to idle without banners (game end, reload).
    pub fn reset(&mut self) {
        self.last_replay_banner = None;
        self.set(BannerState::Idle);
    }

    fn my_turn_pending(&self) -> bool {
        self.state() == BannerState::ShowingMyTurnBanner
    }

    fn set(&self, next: BannerState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            debug!(banner = ?next, "banner state changed");
            let _ = self.events.send(ReconcileEvent::BannerChanged(next));
        }
    }
}

/// The UI finished showing the my-turn banner.
///
/// Returns `true` if a my-turn banner was pending; the turn-ready hook is then
/// invoked exactly once.
pub(crate) fn complete_my_turn_banner(
    state: &watch::Sender<BannerState>,
    events: &broadcast::Sender<ReconcileEvent>,
    hooks: &dyn SessionHooks,
) -> bool {
    let completed = state.send_if_modified(|state| {
        if *state != BannerState::ShowingMyTurnBanner {
            return false;
        }
        *state = BannerState::Idle;
        true
    });
    if completed {
        debug!("my-turn banner completed");
        let _ = events.send(ReconcileEvent::BannerChanged(BannerState::Idle));
        hooks.turn_ready();
    }
    completed
}
