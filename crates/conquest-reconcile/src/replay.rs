//! Move replay - turns inferred moves into timed presentation tasks.
//!
//! Every move becomes exactly one [`AnimationTask`] on the shared timeline.
//! Replay is best effort: a failing battle replay degrades to the simplified
//! attack/combat/conquest feedback and never stalls the caller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use conquest_protocol::{CombatRound, RegionGraph, RegionId};
use tracing::{debug, warn};

use crate::config::ReconcileConfig;
use crate::detector::Move;
use crate::effects::{HighlightKind, ReplayEffects, SoundCue};
use crate::error::TaskCancelled;
use crate::sequencer::{AnimationTask, TaskSequencer};

#[derive(Debug, Clone, Copy)]
struct Timing {
    highlight: Duration,
    movement_transition: Duration,
    combat_round: Duration,
    attack_gap: Duration,
    combat_gap: Duration,
}

impl From<&ReconcileConfig> for Timing {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            highlight: config.highlight(),
            movement_transition: config.movement_transition(),
            combat_round: config.combat_round(),
            attack_gap: config.attack_gap(),
            combat_gap: config.combat_gap(),
        }
    }
}

/// Plays moves on the animation timeline through a [`ReplayEffects`] sink.
#[derive(Clone)]
pub struct MoveReplayer {
    sequencer: TaskSequencer,
    effects: Arc<dyn ReplayEffects>,
    timing: Timing,
}

impl MoveReplayer {
    pub fn new(
        sequencer: TaskSequencer,
        effects: Arc<dyn ReplayEffects>,
        config: &ReconcileConfig,
    ) -> Self {
        Self {
            sequencer,
            effects,
            timing: Timing::from(config),
        }
    }

    /// Replay one move and wait until its presentation has finished.
    pub async fn play(&self, mv: &Move, regions: &RegionGraph) -> Result<(), TaskCancelled> {
        debug!(kind = mv.kind(), region = %mv.region(), "replaying move");
        let task = self.task_for(mv, regions);
        self.sequencer.enqueue(task).await
    }

    fn task_for(&self, mv: &Move, regions: &RegionGraph) -> AnimationTask {
        let effects = Arc::clone(&self.effects);
        let timing = self.timing;

        match mv.clone() {
            Move::Recruitment { region, .. } => {
                AnimationTask::new("recruitment", timing.highlight, move || {
                    announce(effects, region, SoundCue::Recruitment, HighlightKind::Recruited)
                })
            }
            Move::Upgrade { region, .. } => {
                AnimationTask::new("upgrade", timing.highlight, move || {
                    announce(effects, region, SoundCue::Upgrade, HighlightKind::Upgraded)
                })
            }
            Move::Movement {
                region,
                old_soldiers,
                new_soldiers,
                source,
            } => match source.filter(|from| regions.is_empty() || regions.are_adjacent(*from, region)) {
                Some(from) => {
                    let moved = new_soldiers.saturating_sub(old_soldiers);
                    AnimationTask::new("movement", timing.movement_transition, move || {
                        march(effects, from, region, moved, timing.movement_transition)
                    })
                }
                None => AnimationTask::new("movement", timing.highlight, move || {
                    announce(effects, region, SoundCue::Movement, HighlightKind::Reinforced)
                }),
            },
            Move::Conquest {
                region,
                attack_sequence: Some(rounds),
                ..
            } => AnimationTask::new("battle", timing.highlight, move || {
                battle(effects, region, rounds, timing)
            }),
            Move::Conquest { region, .. } => {
                AnimationTask::new("conquest", timing.highlight, move || {
                    simplified_conquest(effects, region, timing)
                })
            }
        }
    }
}

async fn announce(
    effects: Arc<dyn ReplayEffects>,
    region: RegionId,
    cue: SoundCue,
    highlight: HighlightKind,
) -> Result<()> {
    effects.play_sound(cue).await?;
    effects.highlight(region, highlight).await
}

async fn march(
    effects: Arc<dyn ReplayEffects>,
    from: RegionId,
    to: RegionId,
    soldiers: u32,
    duration: Duration,
) -> Result<()> {
    effects.play_sound(SoundCue::Movement).await?;
    effects.animate_movement(from, to, soldiers, duration).await
}

async fn battle(
    effects: Arc<dyn ReplayEffects>,
    region: RegionId,
    rounds: Arc<[CombatRound]>,
    timing: Timing,
) -> Result<()> {
    match replay_rounds(effects.as_ref(), region, &rounds, timing.combat_round).await {
        Ok(()) => {
            effects.play_sound(SoundCue::Conquest).await?;
            effects.highlight(region, HighlightKind::Conquered).await
        }
        Err(err) => {
            warn!(region = %region, error = %err, "battle replay failed; using simplified feedback");
            simplified_conquest(effects, region, timing).await
        }
    }
}

async fn replay_rounds(
    effects: &dyn ReplayEffects,
    region: RegionId,
    rounds: &[CombatRound],
    pace: Duration,
) -> Result<()> {
    effects.play_sound(SoundCue::Attack).await?;
    for (index, round) in rounds.iter().enumerate() {
        effects
            .show_casualties(region, index, round.attacker_losses, round.defender_losses)
            .await?;
        tokio::time::sleep(pace).await;
    }
    Ok(())
}

async fn simplified_conquest(
    effects: Arc<dyn ReplayEffects>,
    region: RegionId,
    timing: Timing,
) -> Result<()> {
    effects.play_sound(SoundCue::Attack).await?;
    tokio::time::sleep(timing.attack_gap).await;
    effects.play_sound(SoundCue::Combat).await?;
    tokio::time::sleep(timing.combat_gap).await;
    effects.play_sound(SoundCue::Conquest).await?;
    effects.highlight(region, HighlightKind::Conquered).await
}
