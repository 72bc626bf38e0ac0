//! Headless stand-ins for the game shell: effects become log lines.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use conquest_protocol::{PlayerSlot, RegionId};
use conquest_reconcile::{HighlightKind, ReplayEffects, SessionHooks, SoundCue};
use tracing::info;

pub struct TracingEffects;

#[async_trait]
impl ReplayEffects for TracingEffects {
    async fn play_sound(&self, cue: SoundCue) -> Result<()> {
        info!(?cue, "sound");
        Ok(())
    }

    async fn highlight(&self, region: RegionId, kind: HighlightKind) -> Result<()> {
        info!(region = %region, ?kind, "highlight");
        Ok(())
    }

    async fn animate_movement(
        &self,
        from: RegionId,
        to: RegionId,
        soldiers: u32,
        duration: Duration,
    ) -> Result<()> {
        info!(from = %from, to = %to, soldiers, ?duration, "move soldiers");
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn show_casualties(
        &self,
        region: RegionId,
        round: usize,
        attacker_losses: u32,
        defender_losses: u32,
    ) -> Result<()> {
        info!(region = %region, round, attacker_losses, defender_losses, "combat round");
        Ok(())
    }
}

/// Hooks for a replay with nobody at the controls.
pub struct CliHooks;

#[async_trait]
impl SessionHooks for CliHooks {
    async fn trigger_ai_turn(&self, player: PlayerSlot) -> Result<()> {
        info!(player = %player, "AI turn requested");
        Ok(())
    }

    fn turn_ready(&self) {
        info!("local turn ready");
    }
}
