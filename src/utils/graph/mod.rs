//! Minimal directed-graph abstractions.
//!
//! Algorithms in this module are written against the [`Successors`] trait rather than a
//! concrete graph type, so the lifter can run them on its raw block layout and the verifier
//! on an [`crate::analysis::SsaFunction`] without copying either into an intermediate graph.
//!
//! - [`NodeId`] - dense node identifier
//! - [`GraphBase`] / [`Successors`] - the traits algorithms are generic over
//! - [`traversal`] - depth-first orders (postorder, reverse postorder)
//! - [`dominators`] - dominator trees

use std::fmt;

pub mod dominators;
pub mod traversal;

pub use dominators::{compute_dominators, DominatorTree};
pub use traversal::{postorder, reverse_postorder};

/// Dense identifier of a node, valid in `0..node_count()`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a node identifier from its index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// The index of this node.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Node count and enumeration.
pub trait GraphBase {
    /// Number of nodes; every [`NodeId`] below this is valid.
    fn node_count(&self) -> usize;
}

/// Forward edge traversal.
pub trait Successors: GraphBase {
    /// Direct successors of `node`. Duplicates are allowed.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph given as adjacency lists, handy for algorithms that build a throw-away view.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyGraph {
    edges: Vec<Vec<NodeId>>,
}

impl AdjacencyGraph {
    /// Creates a graph with `node_count` nodes and no edges.
    #[must_use]
    pub fn new(node_count: usize) -> Self {
        AdjacencyGraph {
            edges: vec![Vec::new(); node_count],
        }
    }

    /// Adds an edge; out-of-range endpoints are ignored.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        if to < self.edges.len() {
            if let Some(out) = self.edges.get_mut(from) {
                out.push(NodeId(to));
            }
        }
    }
}

impl GraphBase for AdjacencyGraph {
    fn node_count(&self) -> usize {
        self.edges.len()
    }
}

impl Successors for AdjacencyGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.edges
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacency_graph() {
        let mut graph = AdjacencyGraph::new(3);
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 7);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(
            graph.successors(NodeId::new(0)).collect::<Vec<_>>(),
            vec![NodeId::new(1), NodeId::new(2)]
        );
        assert_eq!(graph.successors(NodeId::new(1)).count(), 0);
        assert_eq!(graph.successors(NodeId::new(9)).count(), 0);
    }
}
