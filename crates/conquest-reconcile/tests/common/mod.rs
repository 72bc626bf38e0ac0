//! Shared fixtures for the reconciliation integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use conquest_protocol::{Player, PlayerSlot, RegionGraph, RegionId, Snapshot};
use conquest_reconcile::{HighlightKind, ReplayEffects, SessionHooks, SoundCue};
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Sound(SoundCue),
    Highlight(RegionId, HighlightKind),
    Move {
        from: RegionId,
        to: RegionId,
        soldiers: u32,
    },
    Casualties {
        region: RegionId,
        round: usize,
        attacker: u32,
        defender: u32,
    },
}

/// Effects sink that records every call with its (virtual) timestamp.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<(Instant, Call)>>,
    fail_casualties: AtomicBool,
    guard: OnceLock<watch::Receiver<bool>>,
    unguarded: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_casualties() -> Arc<Self> {
        let recorder = Self::default();
        recorder.fail_casualties.store(true, Ordering::SeqCst);
        Arc::new(recorder)
    }

    /// Count effects that run while the replay flag is down.
    pub fn watch_guard(&self, replaying: watch::Receiver<bool>) {
        let _ = self.guard.set(replaying);
    }

    pub fn unguarded(&self) -> usize {
        self.unguarded.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sounds(&self) -> Vec<SoundCue> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Sound(cue) => Some(cue),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        if let Some(guard) = self.guard.get() {
            if !*guard.borrow() {
                self.unguarded.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.calls.lock().unwrap().push((Instant::now(), call));
    }
}

#[async_trait]
impl ReplayEffects for Recorder {
    async fn play_sound(&self, cue: SoundCue) -> Result<()> {
        self.record(Call::Sound(cue));
        Ok(())
    }

    async fn highlight(&self, region: RegionId, kind: HighlightKind) -> Result<()> {
        self.record(Call::Highlight(region, kind));
        Ok(())
    }

    async fn animate_movement(
        &self,
        from: RegionId,
        to: RegionId,
        soldiers: u32,
        duration: Duration,
    ) -> Result<()> {
        self.record(Call::Move { from, to, soldiers });
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
        if self.fail_casualties.load(Ordering::SeqCst) {
            bail!("casualty overlay missing");
        }
        self.record(Call::Casualties {
            region,
            round,
            attacker: attacker_losses,
            defender: defender_losses,
        });
        Ok(())
    }
}

/// Session hooks driven by the test.
#[derive(Default)]
pub struct TestHooks {
    pub battle_in_flight: AtomicBool,
    pub ai_triggers: Mutex<Vec<PlayerSlot>>,
    pub turn_ready: AtomicUsize,
}

impl TestHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_battle(&self, in_flight: bool) {
        self.battle_in_flight.store(in_flight, Ordering::SeqCst);
    }

    pub fn ai_triggers(&self) -> Vec<PlayerSlot> {
        self.ai_triggers.lock().unwrap().clone()
    }

    pub fn turn_ready_count(&self) -> usize {
        self.turn_ready.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionHooks for TestHooks {
    fn local_battle_in_flight(&self) -> bool {
        self.battle_in_flight.load(Ordering::SeqCst)
    }

    async fn trigger_ai_turn(&self, player: PlayerSlot) -> Result<()> {
        self.ai_triggers.lock().unwrap().push(player);
        Ok(())
    }

    fn turn_ready(&self) {
        self.turn_ready.fetch_add(1, Ordering::SeqCst);
    }
}

/// Regions 1..=6 in a line: 1-2-3-4-5-6.
pub fn line_graph() -> RegionGraph {
    let mut graph = RegionGraph::new();
    for region in 1..6 {
        graph.connect(RegionId(region), RegionId(region + 1));
    }
    graph
}

/// Three human players; `regions` lists `(region, owner, soldiers)`.
pub fn state(current: u8, regions: &[(u32, u8, u32)]) -> Snapshot {
    let mut snapshot = Snapshot {
        current_player: PlayerSlot(current),
        turn_number: 1,
        moves_remaining: 3,
        players: (0..3)
            .map(|slot| Player {
                slot: PlayerSlot(slot),
                name: format!("player-{slot}"),
                is_ai: false,
            })
            .collect(),
        ..Snapshot::default()
    };
    for &(region, owner, soldiers) in regions {
        snapshot.owners.insert(RegionId(region), PlayerSlot(owner));
        snapshot.soldiers.insert(RegionId(region), soldiers);
    }
    snapshot
}

pub fn with_ai(mut snapshot: Snapshot, slot: u8) -> Snapshot {
    if let Some(player) = snapshot.players.iter_mut().find(|p| p.slot == PlayerSlot(slot)) {
        player.is_ai = true;
    }
    snapshot
}
