//! Graph algorithms over genome topology.
//!
//! Two traversals live here, both iterative so that deep networks cannot
//! exhaust the call stack:
//!
//! - [`would_create_cycle`]: reverse reachability from a candidate source
//!   node through its incoming edges. Used by the add-connection mutation and
//!   by the crossover builder, which store connectivity differently and
//!   therefore expose it through the [`SourceGraph`] trait.
//! - [`longest_path_depths`]: layering by longest path from the root nodes,
//!   computed over a CSR snapshot of the edges.

use std::collections::{HashSet, VecDeque};

use crate::gene::{InnovationId, NodeGene};
use crate::gene_list::GeneList;

/// Read access to the incoming edges of a partially or fully built network.
pub trait SourceGraph {
    /// Whether `node` is part of the graph.
    fn contains_node(&self, node: InnovationId) -> bool;

    /// Push the source node of every connection entering `node` onto `stack`.
    fn push_sources(&self, node: InnovationId, stack: &mut Vec<InnovationId>);
}

/// Whether adding `source -> target` would close a directed cycle.
///
/// Walks backwards from `source` through its current input edges; if
/// `target` already feeds into `source` the new edge would be recurrent.
/// A self-loop counts as a cycle. If either endpoint is not yet part of the
/// graph no cycle is possible.
#[must_use]
pub fn would_create_cycle<G: SourceGraph + ?Sized>(
    graph: &G,
    source: InnovationId,
    target: InnovationId,
) -> bool {
    if source == target {
        return true;
    }
    if !graph.contains_node(source) || !graph.contains_node(target) {
        return false;
    }

    let mut visited: HashSet<InnovationId> = HashSet::new();
    visited.insert(source);

    let mut stack = Vec::new();
    graph.push_sources(source, &mut stack);

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        if current == target {
            return true;
        }
        graph.push_sources(current, &mut stack);
    }

    false
}

/// Longest-path depth of every node, indexed by position in `nodes`.
///
/// Nodes without incoming edges (inputs, the bias, and any orphaned hidden or
/// output nodes) sit at depth 0; every other node sits one deeper than its
/// deepest predecessor. Edges whose endpoints are missing from `nodes` are
/// ignored. Returns `None` if the edges contain a cycle.
#[must_use]
pub fn longest_path_depths<I>(nodes: &GeneList<NodeGene>, edges: I) -> Option<Vec<usize>>
where
    I: IntoIterator<Item = (InnovationId, InnovationId)>,
{
    let node_count = nodes.len();

    let dense: Vec<(usize, usize)> = edges
        .into_iter()
        .filter_map(|(from, to)| match (nodes.search(from), nodes.search(to)) {
            (Ok(from_idx), Ok(to_idx)) => Some((from_idx, to_idx)),
            _ => None,
        })
        .collect();

    // Forward CSR.
    let mut offsets = vec![0usize; node_count + 1];
    let mut in_degree = vec![0usize; node_count];
    for &(from, to) in &dense {
        offsets[from + 1] += 1;
        in_degree[to] += 1;
    }
    for i in 0..node_count {
        offsets[i + 1] += offsets[i];
    }
    let mut targets = vec![0usize; dense.len()];
    let mut write_pos = offsets[..node_count].to_vec();
    for &(from, to) in &dense {
        targets[write_pos[from]] = to;
        write_pos[from] += 1;
    }

    let mut depths = vec![0usize; node_count];
    let mut queue: VecDeque<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();

    let mut processed = 0;
    while let Some(u) = queue.pop_front() {
        processed += 1;
        for &v in &targets[offsets[u]..offsets[u + 1]] {
            let candidate = depths[u] + 1;
            if candidate > depths[v] {
                depths[v] = candidate;
            }
            in_degree[v] -= 1;
            if in_degree[v] == 0 {
                queue.push_back(v);
            }
        }
    }

    (processed == node_count).then_some(depths)
}

/// Whether the given edges contain a directed cycle.
#[must_use]
pub fn has_cycle<I>(nodes: &GeneList<NodeGene>, edges: I) -> bool
where
    I: IntoIterator<Item = (InnovationId, InnovationId)>,
{
    longest_path_depths(nodes, edges).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::NodeType;
    use std::collections::HashMap;

    struct EdgeList {
        incoming: HashMap<InnovationId, Vec<InnovationId>>,
    }

    impl EdgeList {
        fn new(edges: &[(InnovationId, InnovationId)]) -> Self {
            let mut incoming: HashMap<InnovationId, Vec<InnovationId>> = HashMap::new();
            for &(from, to) in edges {
                incoming.entry(to).or_default().push(from);
                incoming.entry(from).or_default();
            }
            Self { incoming }
        }
    }

    impl SourceGraph for EdgeList {
        fn contains_node(&self, node: InnovationId) -> bool {
            self.incoming.contains_key(&node)
        }

        fn push_sources(&self, node: InnovationId, stack: &mut Vec<InnovationId>) {
            if let Some(sources) = self.incoming.get(&node) {
                stack.extend(sources.iter().copied());
            }
        }
    }

    fn node_list(ids: &[(InnovationId, NodeType)]) -> GeneList<NodeGene> {
        GeneList::from_unsorted(
            ids.iter()
                .map(|&(id, kind)| NodeGene::new(id, kind))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let graph = EdgeList::new(&[(0, 1)]);
        assert!(would_create_cycle(&graph, 1, 1));
    }

    #[test]
    fn test_back_edge_is_cycle() {
        // 0 -> 1 -> 2
        let graph = EdgeList::new(&[(0, 1), (1, 2)]);
        assert!(would_create_cycle(&graph, 2, 0));
        assert!(would_create_cycle(&graph, 2, 1));
        assert!(!would_create_cycle(&graph, 0, 2));
    }

    #[test]
    fn test_unknown_endpoint_is_not_cycle() {
        let graph = EdgeList::new(&[(0, 1)]);
        assert!(!would_create_cycle(&graph, 1, 99));
    }

    #[test]
    fn test_diamond_is_not_cycle() {
        // 0 -> 1 -> 3, 0 -> 2 -> 3
        let graph = EdgeList::new(&[(0, 1), (0, 2), (1, 3), (2, 3)]);
        assert!(!would_create_cycle(&graph, 1, 2));
        assert!(would_create_cycle(&graph, 3, 0));
    }

    #[test]
    fn test_longest_path_depths() {
        let nodes = node_list(&[
            (0, NodeType::Input),
            (1, NodeType::Bias),
            (2, NodeType::Output),
            (5, NodeType::Hidden),
            (8, NodeType::Hidden),
        ]);
        // 0 -> 5 -> 8 -> 2 and a shortcut 0 -> 2.
        let depths = longest_path_depths(&nodes, [(0, 5), (5, 8), (8, 2), (0, 2)]).unwrap();
        assert_eq!(depths, vec![0, 0, 3, 1, 2]);
    }

    #[test]
    fn test_orphan_chain_is_ordered() {
        let nodes = node_list(&[
            (0, NodeType::Input),
            (1, NodeType::Output),
            (4, NodeType::Hidden),
            (6, NodeType::Hidden),
        ]);
        // 4 has no inputs but still feeds 6 which feeds the output.
        let depths = longest_path_depths(&nodes, [(0, 1), (4, 6), (6, 1)]).unwrap();
        assert_eq!(depths, vec![0, 2, 0, 1]);
    }

    #[test]
    fn test_cycle_detected() {
        let nodes = node_list(&[(0, NodeType::Hidden), (1, NodeType::Hidden)]);
        assert!(has_cycle(&nodes, [(0, 1), (1, 0)]));
        assert!(!has_cycle(&nodes, [(0, 1)]));
    }
}
