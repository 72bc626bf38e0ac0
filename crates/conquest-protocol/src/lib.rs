//! Conquest protocol - the client's view of server game state.
//!
//! Snapshots arrive as camelCase JSON over the push channel and are decoded
//! once into the typed, immutable [`Snapshot`] model used by the
//! reconciliation engine.

pub mod graph;
pub mod ids;
pub mod snapshot;
pub mod wire;

pub use graph::RegionGraph;
pub use ids::{PlayerSlot, RegionId, UpgradeId};
pub use snapshot::{CombatRound, EndResult, Player, Snapshot};
pub use wire::{decode_regions, decode_snapshot, decode_snapshot_value, WireError};
