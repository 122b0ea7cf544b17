//! Dominator trees.
//!
//! Node `a` dominates node `b` if every path from the entry to `b` passes through `a`.
//! The tree is computed with the iterative algorithm of Cooper, Harvey and Kennedy
//! ("A Simple, Fast Dominance Algorithm"): immediate dominators are refined over the
//! reverse postorder until nothing changes, intersecting along the current tree.
//! Unreachable nodes have no dominator and are dominated by nothing.

use crate::utils::graph::{reverse_postorder, NodeId, Successors};

/// Immediate-dominator tree of a rooted graph.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: NodeId,
    /// Entry maps to itself; unreachable nodes map to `None`.
    idom: Vec<Option<NodeId>>,
}

impl DominatorTree {
    /// The root of the tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Immediate dominator of `node`; `None` for the entry and unreachable nodes.
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry {
            return None;
        }
        self.idom.get(node.index()).copied().flatten()
    }

    /// Returns `true` if `node` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        matches!(self.idom.get(node.index()), Some(Some(_)))
    }

    /// Returns `true` if `a` dominates `b` (reflexive).
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if !self.is_reachable(b) {
            return false;
        }
        if a == b {
            return true;
        }
        let mut current = b;
        while let Some(parent) = self.immediate_dominator(current) {
            if parent == a {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Returns `true` if `a` dominates `b` and differs from it.
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Depth of `node` in the tree (the entry has depth 0).
    #[must_use]
    pub fn depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = node;
        while let Some(parent) = self.immediate_dominator(current) {
            current = parent;
            depth += 1;
        }
        depth
    }
}

/// Computes the dominator tree of `graph` rooted at `entry`.
pub fn compute_dominators<G: Successors>(graph: &G, entry: NodeId) -> DominatorTree {
    let node_count = graph.node_count();
    let mut idom: Vec<Option<NodeId>> = vec![None; node_count];
    if entry.index() >= node_count {
        return DominatorTree { entry, idom };
    }

    let order = reverse_postorder(graph, entry);
    let mut rpo_index = vec![usize::MAX; node_count];
    for (i, node) in order.iter().enumerate() {
        rpo_index[node.index()] = i;
    }

    let mut predecessors: Vec<Vec<NodeId>> = vec![Vec::new(); node_count];
    for &node in &order {
        for succ in graph.successors(node) {
            if succ.index() < node_count {
                predecessors[succ.index()].push(node);
            }
        }
    }

    idom[entry.index()] = Some(entry);
    let mut changed = true;
    while changed {
        changed = false;
        for &node in order.iter().skip(1) {
            let mut new_idom: Option<NodeId> = None;
            for &pred in &predecessors[node.index()] {
                if idom[pred.index()].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(&idom, &rpo_index, pred, current),
                });
            }
            if new_idom.is_some() && idom[node.index()] != new_idom {
                idom[node.index()] = new_idom;
                changed = true;
            }
        }
    }

    DominatorTree { entry, idom }
}

fn intersect(idom: &[Option<NodeId>], rpo_index: &[usize], a: NodeId, b: NodeId) -> NodeId {
    let mut finger1 = a;
    let mut finger2 = b;
    while finger1 != finger2 {
        while rpo_index[finger1.index()] > rpo_index[finger2.index()] {
            match idom[finger1.index()] {
                Some(next) => finger1 = next,
                None => return finger2,
            }
        }
        while rpo_index[finger2.index()] > rpo_index[finger1.index()] {
            match idom[finger2.index()] {
                Some(next) => finger2 = next,
                None => return finger1,
            }
        }
    }
    finger1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::AdjacencyGraph;

    fn n(i: usize) -> NodeId {
        NodeId::new(i)
    }

    #[test]
    fn test_diamond() {
        let mut graph = AdjacencyGraph::new(4);
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 3);
        graph.add_edge(2, 3);
        let tree = compute_dominators(&graph, n(0));

        assert_eq!(tree.immediate_dominator(n(3)), Some(n(0)));
        assert_eq!(tree.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(tree.immediate_dominator(n(0)), None);
        assert!(tree.dominates(n(0), n(3)));
        assert!(!tree.dominates(n(1), n(3)));
        assert!(tree.dominates(n(3), n(3)));
        assert!(!tree.strictly_dominates(n(3), n(3)));
        assert_eq!(tree.depth(n(3)), 1);
    }

    #[test]
    fn test_loop() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3
        let mut graph = AdjacencyGraph::new(4);
        graph.add_edge(0, 1);
        graph.add_edge(1, 2);
        graph.add_edge(2, 1);
        graph.add_edge(1, 3);
        let tree = compute_dominators(&graph, n(0));

        assert_eq!(tree.immediate_dominator(n(2)), Some(n(1)));
        assert_eq!(tree.immediate_dominator(n(3)), Some(n(1)));
        assert!(tree.dominates(n(1), n(2)));
        assert!(!tree.dominates(n(2), n(3)));
    }

    #[test]
    fn test_unreachable() {
        let mut graph = AdjacencyGraph::new(3);
        graph.add_edge(0, 1);
        graph.add_edge(2, 1);
        let tree = compute_dominators(&graph, n(0));

        assert!(!tree.is_reachable(n(2)));
        assert!(!tree.dominates(n(0), n(2)));
        assert_eq!(tree.immediate_dominator(n(1)), Some(n(0)));
    }
}
