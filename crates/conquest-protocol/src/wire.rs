//! Decoding of the server's JSON game-state push.
//!
//! The server's shape is looser than the client model: soldiers arrive as
//! arrays whose length is the count, owners are a sparse map with explicit
//! nulls, and the end result is either a player reference or a draw marker.
//! Everything is normalized here so the engine never probes untyped fields.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{CombatRound, EndResult, Player, PlayerSlot, RegionGraph, RegionId, Snapshot, UpgradeId};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("player slot {0} out of range")]
    SlotOutOfRange(i64),
    #[error("unrecognized end result: {0}")]
    EndResult(String),
}

/// Decode one pushed game state.
pub fn decode_snapshot(json: &str) -> Result<Snapshot, WireError> {
    let wire: GameStateWire = serde_json::from_str(json)?;
    wire.into_snapshot()
}

/// Decode an already-parsed JSON value (e.g. one field of a larger message).
pub fn decode_snapshot_value(value: Value) -> Result<Snapshot, WireError> {
    let wire: GameStateWire = serde_json::from_value(value)?;
    wire.into_snapshot()
}

/// Decode a standalone adjacency list (`[{"index": 1, "neighbors": [2]}]`).
pub fn decode_regions(json: &str) -> Result<RegionGraph, WireError> {
    let regions: Vec<RegionWire> = serde_json::from_str(json)?;
    Ok(graph_from_wire(regions))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameStateWire {
    current_player_slot: i64,
    #[serde(default)]
    turn_number: i64,
    #[serde(default)]
    moves_remaining: i64,
    #[serde(default)]
    owners_by_region: BTreeMap<u32, Option<i64>>,
    #[serde(default)]
    soldiers_by_region: BTreeMap<u32, SoldiersWire>,
    #[serde(default)]
    temple_upgrades_by_region: BTreeMap<u32, Vec<UpgradeWire>>,
    #[serde(default)]
    players: Vec<PlayerWire>,
    #[serde(default)]
    end_result: Option<EndResultWire>,
    #[serde(default)]
    attack_sequence: Option<Vec<CombatRoundWire>>,
    #[serde(default)]
    regions: Option<Vec<RegionWire>>,
}

/// Soldiers are opaque objects; only the array length matters.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SoldiersWire {
    Units(Vec<Value>),
    Count(i64),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UpgradeWire {
    Name(String),
    Index(i64),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerWire {
    slot_index: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "isAI")]
    is_ai: Option<bool>,
    /// AI players carry a personality; humans send null or omit it.
    #[serde(default)]
    personality: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EndResultWire {
    Player {
        #[serde(rename = "slotIndex")]
        slot_index: i64,
    },
    Flag {
        draw: bool,
    },
    Marker(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CombatRoundWire {
    #[serde(default)]
    attacker_losses: i64,
    #[serde(default)]
    defender_losses: i64,
}

#[derive(Debug, Deserialize)]
struct RegionWire {
    index: u32,
    #[serde(default)]
    neighbors: Vec<u32>,
}

impl GameStateWire {
    fn into_snapshot(self) -> Result<Snapshot, WireError> {
        let mut owners = BTreeMap::new();
        for (region, owner) in self.owners_by_region {
            if let Some(owner) = owner {
                owners.insert(RegionId(region), slot(owner)?);
            }
        }

        let soldiers = self
            .soldiers_by_region
            .into_iter()
            .map(|(region, soldiers)| {
                let count = match soldiers {
                    SoldiersWire::Units(units) => clamp_count(units.len() as i64),
                    SoldiersWire::Count(count) => clamp_count(count),
                };
                (RegionId(region), count)
            })
            .collect();

        let temple_upgrades = self
            .temple_upgrades_by_region
            .into_iter()
            .map(|(region, upgrades)| {
                let upgrades = upgrades
                    .into_iter()
                    .map(|u| match u {
                        UpgradeWire::Name(name) => UpgradeId(name),
                        UpgradeWire::Index(index) => UpgradeId(index.to_string()),
                    })
                    .collect();
                (RegionId(region), upgrades)
            })
            .collect();

        let players = self
            .players
            .into_iter()
            .map(|p| {
                let has_personality = p.personality.as_ref().is_some_and(|v| !v.is_null());
                Ok(Player {
                    slot: slot(p.slot_index)?,
                    name: p.name.unwrap_or_default(),
                    is_ai: p.is_ai.unwrap_or(has_personality),
                })
            })
            .collect::<Result<Vec<_>, WireError>>()?;

        let end_result = match self.end_result {
            None => None,
            Some(EndResultWire::Player { slot_index }) => Some(EndResult::Winner(slot(slot_index)?)),
            Some(EndResultWire::Flag { draw: true }) => Some(EndResult::Draw),
            Some(EndResultWire::Flag { draw: false }) => None,
            Some(EndResultWire::Marker(marker)) => match marker.to_ascii_lowercase().as_str() {
                "draw" | "drawn_game" | "drawngame" => Some(EndResult::Draw),
                _ => return Err(WireError::EndResult(marker)),
            },
        };

        let attack_sequence = self.attack_sequence.map(|rounds| {
            rounds
                .into_iter()
                .map(|r| CombatRound {
                    attacker_losses: clamp_count(r.attacker_losses),
                    defender_losses: clamp_count(r.defender_losses),
                })
                .collect::<Arc<[CombatRound]>>()
        });

        let regions = self.regions.map(graph_from_wire);

        Ok(Snapshot {
            current_player: slot(self.current_player_slot)?,
            turn_number: clamp_count(self.turn_number),
            moves_remaining: clamp_count(self.moves_remaining),
            owners,
            soldiers,
            players,
            temple_upgrades,
            end_result,
            attack_sequence,
            regions,
        })
    }
}

fn slot(raw: i64) -> Result<PlayerSlot, WireError> {
    u8::try_from(raw)
        .map(PlayerSlot)
        .map_err(|_| WireError::SlotOutOfRange(raw))
}

fn graph_from_wire(regions: Vec<RegionWire>) -> RegionGraph {
    RegionGraph::from_adjacency(regions.into_iter().map(|r| {
        (
            RegionId(r.index),
            r.neighbors.into_iter().map(RegionId).collect::<Vec<_>>(),
        )
    }))
}

/// Counts below zero are a producer bug; treat them as empty instead of failing.
fn clamp_count(raw: i64) -> u32 {
    raw.clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUSH: &str = r#"{
        "currentPlayerSlot": 1,
        "turnNumber": 7,
        "movesRemaining": 2,
        "ownersByRegion": { "0": 0, "1": 1, "2": null },
        "soldiersByRegion": { "0": [{"id": 1}, {"id": 2}], "1": [{"id": 3}], "2": 4 },
        "templeUpgradesByRegion": { "1": ["fire", 3] },
        "players": [
            { "slotIndex": 0, "name": "Ann" },
            { "slotIndex": 1, "personality": { "aggression": 0.8 } }
        ],
        "endResult": null,
        "attackSequence": [
            { "attackerLosses": 1, "defenderLosses": 0 },
            { "attackerLosses": -2, "defenderLosses": 2 }
        ],
        "regions": [ { "index": 0, "neighbors": [1] }, { "index": 1, "neighbors": [2] } ]
    }"#;

    #[test]
    fn decodes_server_push() {
        let snapshot = decode_snapshot(PUSH).unwrap();

        assert_eq!(snapshot.current_player, PlayerSlot(1));
        assert_eq!(snapshot.turn_number, 7);
        assert_eq!(snapshot.owner(RegionId(0)), Some(PlayerSlot(0)));
        assert_eq!(snapshot.owner(RegionId(2)), None);
        assert_eq!(snapshot.soldier_count(RegionId(0)), 2);
        assert_eq!(snapshot.soldier_count(RegionId(2)), 4);
        assert_eq!(snapshot.soldier_count(RegionId(9)), 0);
        assert_eq!(
            snapshot.upgrades(RegionId(1)),
            &[UpgradeId::from("fire"), UpgradeId::from("3")]
        );

        assert!(!snapshot.is_ai(PlayerSlot(0)));
        assert!(snapshot.is_ai(PlayerSlot(1)));
        assert_eq!(snapshot.player(PlayerSlot(0)).unwrap().name, "Ann");

        let rounds = snapshot.attack_sequence.as_deref().unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[1].attacker_losses, 0);
        assert_eq!(rounds[1].defender_losses, 2);

        let graph = snapshot.regions.as_ref().unwrap();
        assert!(graph.are_adjacent(RegionId(1), RegionId(0)));
        assert!(graph.are_adjacent(RegionId(2), RegionId(1)));
    }

    #[test]
    fn decodes_end_results() {
        let winner = decode_snapshot(r#"{"currentPlayerSlot": 0, "endResult": {"slotIndex": 2}}"#)
            .unwrap();
        assert_eq!(winner.end_result, Some(EndResult::Winner(PlayerSlot(2))));

        let draw = decode_snapshot(r#"{"currentPlayerSlot": 0, "endResult": "DRAWN_GAME"}"#).unwrap();
        assert_eq!(draw.end_result, Some(EndResult::Draw));

        let flag = decode_snapshot(r#"{"currentPlayerSlot": 0, "endResult": {"draw": true}}"#).unwrap();
        assert!(flag.is_finished());

        let err = decode_snapshot(r#"{"currentPlayerSlot": 0, "endResult": "surrender"}"#);
        assert!(matches!(err, Err(WireError::EndResult(_))));
    }

    #[test]
    fn rejects_out_of_range_slot() {
        let err = decode_snapshot(r#"{"currentPlayerSlot": 300}"#);
        assert!(matches!(err, Err(WireError::SlotOutOfRange(300))));
    }

    #[test]
    fn missing_optional_fields_default_to_empty() {
        let snapshot = decode_snapshot(r#"{"currentPlayerSlot": 0}"#).unwrap();
        assert!(snapshot.owners.is_empty());
        assert!(snapshot.attack_sequence.is_none());
        assert!(snapshot.regions.is_none());
        assert!(!snapshot.is_finished());
    }

    #[test]
    fn decodes_standalone_adjacency() {
        let graph = decode_regions(r#"[{"index": 4, "neighbors": [5, 6]}, {"index": 7}]"#).unwrap();
        assert!(graph.are_adjacent(RegionId(6), RegionId(4)));
        assert!(!graph.are_adjacent(RegionId(5), RegionId(6)));
    }
}
