//! Depth-first traversal orders.

use crate::utils::graph::{NodeId, Successors};

/// Computes the postorder of the nodes reachable from `start`.
///
/// Iterative, so deep graphs cannot overflow the call stack. Successors are visited in the
/// order the graph yields them.
///
/// # Examples
///
/// ```rust,ignore
/// // 0 -> 1 -> 2
/// assert_eq!(postorder(&graph, NodeId::new(0)), vec![n2, n1, n0]);
/// ```
#[allow(clippy::items_after_statements)]
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = vec![false; node_count];
    let mut result = Vec::with_capacity(node_count);

    #[derive(Clone, Copy)]
    enum State {
        Enter,
        Exit,
    }

    let mut stack = vec![(start, State::Enter)];
    while let Some((node, state)) = stack.pop() {
        match state {
            State::Enter => {
                if visited[node.index()] {
                    continue;
                }
                visited[node.index()] = true;
                stack.push((node, State::Exit));

                // Reverse so the first successor is explored first.
                let successors: Vec<NodeId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if succ.index() < node_count && !visited[succ.index()] {
                        stack.push((succ, State::Enter));
                    }
                }
            }
            State::Exit => result.push(node),
        }
    }

    result
}

/// Computes the reverse postorder of the nodes reachable from `start`.
///
/// Every reachable node other than `start` appears after at least one of its predecessors,
/// which is what forward dataflow problems and on-the-fly SSA construction rely on.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::AdjacencyGraph;

    fn diamond() -> AdjacencyGraph {
        let mut graph = AdjacencyGraph::new(4);
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 3);
        graph.add_edge(2, 3);
        graph
    }

    #[test]
    fn test_postorder_diamond() {
        let order = postorder(&diamond(), NodeId::new(0));
        assert_eq!(order.len(), 4);
        assert_eq!(order.last(), Some(&NodeId::new(0)));
        assert_eq!(order[0], NodeId::new(3));
    }

    #[test]
    fn test_reverse_postorder_respects_edges() {
        let order = reverse_postorder(&diamond(), NodeId::new(0));
        let pos = |n: usize| order.iter().position(|x| x.index() == n).unwrap();
        assert_eq!(pos(0), 0);
        assert!(pos(1) < pos(3));
        assert!(pos(2) < pos(3));
    }

    #[test]
    fn test_unreachable_nodes_are_skipped() {
        let mut graph = AdjacencyGraph::new(3);
        graph.add_edge(0, 1);
        graph.add_edge(2, 1);
        let order = reverse_postorder(&graph, NodeId::new(0));
        assert_eq!(order, vec![NodeId::new(0), NodeId::new(1)]);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut graph = AdjacencyGraph::new(2);
        graph.add_edge(0, 1);
        graph.add_edge(1, 0);
        assert_eq!(postorder(&graph, NodeId::new(0)).len(), 2);
        assert!(postorder(&graph, NodeId::new(5)).is_empty());
    }
}
