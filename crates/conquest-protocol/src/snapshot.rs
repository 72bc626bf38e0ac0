use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{PlayerSlot, RegionGraph, RegionId, UpgradeId};

/// Full game state at one instant, as pushed by the server.
///
/// Immutable once decoded; the reconciliation engine shares it behind an `Arc`.
/// Absent map entries mean "unowned", "no soldiers" and "no upgrades".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub current_player: PlayerSlot,
    pub turn_number: u32,
    pub moves_remaining: u32,
    #[serde(default)]
    pub owners: BTreeMap<RegionId, PlayerSlot>,
    #[serde(default)]
    pub soldiers: BTreeMap<RegionId, u32>,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub temple_upgrades: BTreeMap<RegionId, Vec<UpgradeId>>,
    #[serde(default)]
    pub end_result: Option<EndResult>,
    /// Authoritative round-by-round trace of the battle that produced this state.
    #[serde(default)]
    pub attack_sequence: Option<Arc<[CombatRound]>>,
    /// Adjacency shipped with the snapshot, when the server includes it.
    #[serde(default)]
    pub regions: Option<RegionGraph>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub slot: PlayerSlot,
    #[serde(default)]
    pub name: String,
    pub is_ai: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndResult {
    Winner(PlayerSlot),
    Draw,
}

/// Casualties of one combat round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatRound {
    pub attacker_losses: u32,
    pub defender_losses: u32,
}

impl Snapshot {
    pub fn owner(&self, region: RegionId) -> Option<PlayerSlot> {
        self.owners.get(&region).copied()
    }

    pub fn soldier_count(&self, region: RegionId) -> u32 {
        self.soldiers.get(&region).copied().unwrap_or(0)
    }

    pub fn upgrades(&self, region: RegionId) -> &[UpgradeId] {
        self.temple_upgrades
            .get(&region)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn player(&self, slot: PlayerSlot) -> Option<&Player> {
        self.players.iter().find(|p| p.slot == slot)
    }

    pub fn is_ai(&self, slot: PlayerSlot) -> bool {
        self.player(slot).is_some_and(|p| p.is_ai)
    }

    /// Number of regions owned by a player
    pub fn region_count(&self, slot: PlayerSlot) -> usize {
        self.owners.values().filter(|owner| **owner == slot).count()
    }

    /// Every region id mentioned by any of the per-region maps.
    pub fn region_ids(&self) -> BTreeSet<RegionId> {
        self.owners
            .keys()
            .chain(self.soldiers.keys())
            .chain(self.temple_upgrades.keys())
            .copied()
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.end_result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_empty_and_unfinished() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.current_player, PlayerSlot(0));
        assert_eq!(snapshot.region_count(PlayerSlot(0)), 0);
        assert!(snapshot.region_ids().is_empty());
        assert!(!snapshot.is_finished());
    }

    #[test]
    fn region_ids_span_every_map() {
        let mut snapshot = Snapshot::default();
        snapshot.owners.insert(RegionId(1), PlayerSlot(2));
        snapshot.soldiers.insert(RegionId(3), 4);
        snapshot
            .temple_upgrades
            .insert(RegionId(5), vec![UpgradeId::from("fire")]);

        let ids: Vec<_> = snapshot.region_ids().into_iter().collect();
        assert_eq!(ids, vec![RegionId(1), RegionId(3), RegionId(5)]);
        assert_eq!(snapshot.region_count(PlayerSlot(2)), 1);
        assert_eq!(snapshot.soldier_count(RegionId(1)), 0);
    }
}
