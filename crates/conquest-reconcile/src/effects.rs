//! Collaborator traits at the boundary of the engine.
//!
//! Rendering, audio and the game shell live outside this crate. They plug in
//! through [`ReplayEffects`] (what a replay looks and sounds like) and
//! [`SessionHooks`] (signals the engine polls or fires).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use conquest_protocol::{PlayerSlot, RegionId, Snapshot};

/// Sound cues emitted during replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundCue {
    Attack,
    Combat,
    Conquest,
    Movement,
    Recruitment,
    Upgrade,
}

/// Visual emphasis applied to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HighlightKind {
    Conquered,
    Reinforced,
    Recruited,
    Upgraded,
}

/// Audio/visual side effects of a replayed move.
#[async_trait]
pub trait ReplayEffects: Send + Sync {
    async fn play_sound(&self, cue: SoundCue) -> Result<()>;

    async fn highlight(&self, region: RegionId, kind: HighlightKind) -> Result<()>;

    /// Interpolate soldier positions from `from` to `to` over `duration`.
    async fn animate_movement(
        &self,
        from: RegionId,
        to: RegionId,
        soldiers: u32,
        duration: Duration,
    ) -> Result<()>;

    /// Show the casualties of one combat round at the contested region.
    async fn show_casualties(
        &self,
        region: RegionId,
        round: usize,
        attacker_losses: u32,
        defender_losses: u32,
    ) -> Result<()>;
}

/// Signals exchanged with the surrounding game shell.
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// Polled before each snapshot; while true, processing is deferred.
    fn local_battle_in_flight(&self) -> bool {
        false
    }

    /// Extra end-of-game check for states the server does not flag.
    fn game_ended(&self, _snapshot: &Snapshot) -> bool {
        false
    }

    /// Called when the turn passes to an AI seat. Fire and forget.
    async fn trigger_ai_turn(&self, _player: PlayerSlot) -> Result<()> {
        Ok(())
    }

    /// Called once per local turn, after the my-turn banner completes.
    fn turn_ready(&self) {}
}

/// Hooks that never defer and never trigger anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}
