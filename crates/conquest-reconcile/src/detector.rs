//! Move detector - infers discrete moves from two full snapshots.
//!
//! The server only sends state, never the actions that produced it, so the
//! client reconstructs conquests, movements, recruitments and upgrades from
//! per-region deltas. Movement sources are paired greedily: each gaining
//! region takes the first unused, adjacent region that lost soldiers.

use std::collections::BTreeSet;
use std::sync::Arc;

use conquest_protocol::{CombatRound, PlayerSlot, RegionGraph, RegionId, Snapshot, UpgradeId};
use serde::Serialize;
use tracing::{debug, warn};

/// One inferred action, in playback order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Move {
    Conquest {
        region: RegionId,
        old_owner: PlayerSlot,
        new_owner: Option<PlayerSlot>,
        old_soldiers: u32,
        new_soldiers: u32,
        source: Option<RegionId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        attack_sequence: Option<Arc<[CombatRound]>>,
    },
    Movement {
        region: RegionId,
        old_soldiers: u32,
        new_soldiers: u32,
        source: Option<RegionId>,
    },
    Recruitment {
        region: RegionId,
        soldiers_added: u32,
    },
    Upgrade {
        region: RegionId,
        added: Vec<UpgradeId>,
    },
}

impl Move {
    /// Region the move lands on.
    pub fn region(&self) -> RegionId {
        match self {
            Move::Conquest { region, .. }
            | Move::Movement { region, .. }
            | Move::Recruitment { region, .. }
            | Move::Upgrade { region, .. } => *region,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Move::Conquest { .. } => "conquest",
            Move::Movement { .. } => "movement",
            Move::Recruitment { .. } => "recruitment",
            Move::Upgrade { .. } => "upgrade",
        }
    }
}

#[derive(Debug)]
struct Loss {
    region: RegionId,
    used: bool,
}

#[derive(Debug)]
struct Gain {
    region: RegionId,
    old_soldiers: u32,
    new_soldiers: u32,
    was_conquest: bool,
}

/// Compare two snapshots and list the moves that explain the difference.
///
/// Pure and deterministic: regions are visited in ascending id order and the
/// output is grouped as conquests, then movements/recruitments, then upgrades.
/// `regions` is used for source pairing when `next` carries no adjacency.
pub fn detect(previous: &Snapshot, next: &Snapshot, regions: &RegionGraph) -> Vec<Move> {
    let graph = next.regions.as_ref().unwrap_or(regions);
    let acting = previous.current_player;

    let mut ids: BTreeSet<RegionId> = previous.region_ids();
    ids.extend(next.region_ids());

    // Conquest pass
    let mut conquests = Vec::new();
    for &region in &ids {
        let old_owner = previous.owner(region);
        let new_owner = next.owner(region);
        if old_owner == new_owner {
            continue;
        }
        if let Some(old_owner) = old_owner {
            conquests.push(Move::Conquest {
                region,
                old_owner,
                new_owner,
                old_soldiers: previous.soldier_count(region),
                new_soldiers: next.soldier_count(region),
                source: None,
                attack_sequence: None,
            });
        }
    }

    // Movement pairing pass
    let mut losses = Vec::new();
    let mut gains = Vec::new();
    for &region in &ids {
        let old_soldiers = previous.soldier_count(region);
        let new_soldiers = next.soldier_count(region);
        let owner_changed = previous.owner(region) != next.owner(region);
        let delta = i64::from(new_soldiers) - i64::from(old_soldiers);

        if delta < 0 && !owner_changed && next.owner(region).is_some() {
            losses.push(Loss {
                region,
                used: false,
            });
        } else if delta > 0 || (owner_changed && next.owner(region).is_some()) {
            gains.push(Gain {
                region,
                old_soldiers,
                new_soldiers,
                was_conquest: owner_changed,
            });
        }
    }

    let mut movements = Vec::new();
    for gain in &gains {
        let source = losses
            .iter_mut()
            .find(|loss| !loss.used && graph.are_adjacent(loss.region, gain.region))
            .map(|loss| {
                loss.used = true;
                loss.region
            });

        if gain.was_conquest {
            let mut lent = false;
            for conquest in &mut conquests {
                if let Move::Conquest {
                    region,
                    source: slot,
                    ..
                } = conquest
                {
                    if *region == gain.region {
                        *slot = source;
                        lent = true;
                    }
                }
            }
            if lent {
                continue;
            }
        }

        let owner_unchanged = previous.owner(gain.region) == next.owner(gain.region);
        if source.is_none() && owner_unchanged && next.owner(gain.region) == Some(acting) {
            movements.push(Move::Recruitment {
                region: gain.region,
                soldiers_added: gain.new_soldiers - gain.old_soldiers,
            });
        } else {
            movements.push(Move::Movement {
                region: gain.region,
                old_soldiers: gain.old_soldiers,
                new_soldiers: gain.new_soldiers,
                source,
            });
        }
    }

    // Upgrade pass
    let mut upgrades = Vec::new();
    for &region in &ids {
        let before = previous.upgrades(region);
        let after = next.upgrades(region);
        if after.len() > before.len() {
            upgrades.push(Move::Upgrade {
                region,
                added: after[before.len()..].to_vec(),
            });
        }
    }

    if let Some(sequence) = &next.attack_sequence {
        attach_attack_sequence(&mut conquests, sequence);
    }

    let mut moves = conquests;
    moves.extend(movements);
    moves.extend(upgrades);

    debug!(
        turn = next.turn_number,
        acting = %acting,
        moves = moves.len(),
        "detected moves"
    );
    moves
}

fn attach_attack_sequence(conquests: &mut [Move], sequence: &Arc<[CombatRound]>) {
    match conquests {
        [] => {
            warn!(
                rounds = sequence.len(),
                "attack sequence present but no conquest detected; dropping it"
            );
        }
        [first, rest @ ..] => {
            if !rest.is_empty() {
                debug!(
                    conquests = rest.len() + 1,
                    "several conquests in one transition; attack sequence goes to the first"
                );
            }
            if let Move::Conquest {
                attack_sequence, ..
            } = first
            {
                *attack_sequence = Some(Arc::clone(sequence));
            }
        }
    }
}
