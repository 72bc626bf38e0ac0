//! Region adjacency graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::RegionId;

/// Undirected adjacency between map regions.
///
/// The map is fixed for a game, so the graph is built once (from the
/// snapshot's `regions` list or from map data) and only queried afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionGraph {
    neighbors: BTreeMap<RegionId, BTreeSet<RegionId>>,
}

impl RegionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(region, neighbors)` pairs; edges are made symmetric.
    pub fn from_adjacency<I, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (RegionId, N)>,
        N: IntoIterator<Item = RegionId>,
    {
        let mut graph = Self::new();
        for (region, neighbors) in entries {
            graph.neighbors.entry(region).or_default();
            for neighbor in neighbors {
                graph.connect(region, neighbor);
            }
        }
        graph
    }

    pub fn connect(&mut self, a: RegionId, b: RegionId) {
        if a == b {
            return;
        }
        self.neighbors.entry(a).or_default().insert(b);
        self.neighbors.entry(b).or_default().insert(a);
    }

    pub fn are_adjacent(&self, a: RegionId, b: RegionId) -> bool {
        self.neighbors.get(&a).is_some_and(|n| n.contains(&b))
    }

    pub fn neighbors(&self, region: RegionId) -> impl Iterator<Item = RegionId> + '_ {
        self.neighbors.get(&region).into_iter().flatten().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_is_symmetric() {
        let graph = RegionGraph::from_adjacency([(RegionId(1), vec![RegionId(3)])]);
        assert!(graph.are_adjacent(RegionId(1), RegionId(3)));
        assert!(graph.are_adjacent(RegionId(3), RegionId(1)));
        assert!(!graph.are_adjacent(RegionId(1), RegionId(2)));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn self_loops_are_ignored() {
        let mut graph = RegionGraph::new();
        graph.connect(RegionId(4), RegionId(4));
        assert!(graph.is_empty());
        assert_eq!(graph.neighbors(RegionId(4)).count(), 0);
    }
}
