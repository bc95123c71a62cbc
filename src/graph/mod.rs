//! Local projection of the block graph
//!
//! The engine owns block existence; [`Graph`] only mirrors what the engine
//! accepted, plus UI-only data such as canvas positions. It is mutated
//! exclusively by the [`GraphSynchronizer`].

pub mod sync;

pub use sync::GraphSynchronizer;

use crate::registry::{BlockConfig, BlockKind};
use crate::types::{BlockId, Position, Wire};
use serde::Serialize;
use std::collections::BTreeMap;

/// One node on the canvas
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: BlockId,
    pub config: BlockConfig,
    pub position: Position,
}

impl GraphNode {
    pub fn kind(&self) -> BlockKind {
        self.config.kind()
    }
}

/// Nodes and edges the engine has confirmed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    nodes: BTreeMap<BlockId, GraphNode>,
    edges: Vec<Wire>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: BlockId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: BlockId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Ids of every node of `kind`
    pub fn ids_of(&self, kind: BlockKind) -> Vec<BlockId> {
        self.nodes
            .values()
            .filter(|n| n.kind() == kind)
            .map(|n| n.id)
            .collect()
    }

    pub fn edges(&self) -> &[Wire] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn insert(&mut self, node: GraphNode) {
        self.nodes.insert(node.id, node);
    }

    /// Remove a node and every edge touching it
    pub(crate) fn remove(&mut self, id: BlockId) -> Option<GraphNode> {
        let node = self.nodes.remove(&id)?;
        self.edges.retain(|w| !w.touches(id));
        Some(node)
    }

    pub(crate) fn add_edge(&mut self, wire: Wire) {
        if !self.edges.contains(&wire) {
            self.edges.push(wire);
        }
    }

    pub(crate) fn remove_edge(&mut self, wire: &Wire) -> bool {
        let before = self.edges.len();
        self.edges.retain(|w| w != wire);
        self.edges.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u32, kind: BlockKind) -> GraphNode {
        GraphNode {
            id: BlockId(id),
            config: kind.default_config(),
            position: Position::default(),
        }
    }

    #[test]
    fn test_remove_drops_touching_edges() {
        let mut graph = Graph::new();
        graph.insert(node(1, BlockKind::Tap));
        graph.insert(node(2, BlockKind::Machine));
        graph.insert(node(3, BlockKind::Pixel));
        graph.add_edge(Wire::new(BlockId(1), 0, BlockId(2), 0));
        graph.add_edge(Wire::new(BlockId(2), 0, BlockId(3), 0));

        assert!(graph.remove(BlockId(2)).is_some());
        assert!(graph.edges().is_empty());
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = Graph::new();
        let wire = Wire::new(BlockId(1), 0, BlockId(2), 0);
        graph.add_edge(wire);
        graph.add_edge(wire);
        assert_eq!(graph.edges().len(), 1);
        assert!(graph.remove_edge(&wire));
        assert!(!graph.remove_edge(&wire));
    }

    #[test]
    fn test_ids_of_kind() {
        let mut graph = Graph::new();
        graph.insert(node(1, BlockKind::Machine));
        graph.insert(node(2, BlockKind::Tap));
        graph.insert(node(3, BlockKind::Machine));
        assert_eq!(graph.ids_of(BlockKind::Machine), vec![BlockId(1), BlockId(3)]);
    }
}
