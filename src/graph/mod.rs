//! Build-graph traversal: dependent-set computation over the host build
//! system's rule graph.
//!
//! The relinker never owns the build graph. It sees it through the
//! [`DependencyOracle`] trait: `incoming_edges(n)` lists the nodes that
//! depend on `n`, and `node_for_library` resolves a library file back to
//! its producer node (if the build system knows one).
//!
//! [`DependencyAnalyzer`] answers the one question planning needs: for each
//! library-producing node in the input set, which *other* input libraries
//! could reference its symbols? That is the set of input nodes reachable
//! along dependent-edges, computed with a single reverse-topological sweep
//! over the closed subgraph.

use std::collections::VecDeque;
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::common::error::{RelinkError, Result};

/// Opaque identifier of a node in the host build graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The build system's view of its rule graph, as consumed by the relinker.
pub trait DependencyOracle {
    /// Nodes that directly depend on `node` (edges oriented
    /// dependent → dependency; these are the edges arriving at `node`).
    fn incoming_edges(&self, node: NodeId) -> Vec<NodeId>;

    /// The node that produces `library`, if its provenance is known.
    /// `None` marks the library as copied: sealed input, unknown dependents.
    fn node_for_library(&self, library: &Path) -> Option<NodeId>;
}

/// Order `nodes` so that every node appears after all of its dependents.
///
/// `incoming` must list, for each node, its direct dependents *within*
/// `nodes` (edges from outside the slice are ignored). Fails with
/// `CyclicLibraryGraph` when no such order exists.
pub(crate) fn dependents_first_order(
    nodes: &[NodeId],
    incoming: &FxHashMap<NodeId, Vec<NodeId>>,
) -> Result<Vec<NodeId>> {
    let node_set: FxHashSet<NodeId> = nodes.iter().copied().collect();
    let mut indegree: FxHashMap<NodeId, usize> =
        nodes.iter().map(|&n| (n, 0)).collect();
    let mut out: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();

    for &n in nodes {
        let Some(dependents) = incoming.get(&n) else { continue };
        let mut seen = FxHashSet::default();
        for &m in dependents {
            // Skip edges leaving the slice and duplicate edges; both would
            // skew the in-degree accounting.
            if !node_set.contains(&m) || !seen.insert(m) {
                continue;
            }
            if let Some(d) = indegree.get_mut(&n) {
                *d += 1;
            }
            out.entry(m).or_default().push(n);
        }
    }

    let mut queue: VecDeque<NodeId> = nodes
        .iter()
        .copied()
        .filter(|n| indegree.get(n) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(m) = queue.pop_front() {
        order.push(m);
        if let Some(successors) = out.get(&m) {
            for &n in successors {
                let d = indegree.get_mut(&n).expect("successor outside node set");
                *d -= 1;
                if *d == 0 {
                    queue.push_back(n);
                }
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(RelinkError::CyclicLibraryGraph);
    }
    Ok(order)
}

/// Computes, for each owned input node, the set of other owned inputs that
/// transitively depend on it.
pub struct DependencyAnalyzer<'a> {
    oracle: &'a dyn DependencyOracle,
}

impl<'a> DependencyAnalyzer<'a> {
    pub fn new(oracle: &'a dyn DependencyOracle) -> Self {
        Self { oracle }
    }

    /// For every node in `owned`, the owned inputs reachable along
    /// dependent-edges, i.e. the libraries that could use a symbol from it.
    ///
    /// The traversal closes over *all* ancestors, so intermediate
    /// non-library nodes correctly forward dependent sets between inputs.
    /// Fails with `CyclicLibraryGraph` if the closed subgraph has a cycle.
    pub fn dependents_of(
        &self,
        owned: &[NodeId],
    ) -> Result<FxHashMap<NodeId, FxHashSet<NodeId>>> {
        // Close the subgraph over incoming edges, caching each node's
        // (deduplicated) dependent list.
        let mut incoming: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        let mut visited: FxHashSet<NodeId> = owned.iter().copied().collect();
        let mut worklist: Vec<NodeId> = owned.to_vec();

        while let Some(n) = worklist.pop() {
            let mut dependents = Vec::new();
            let mut seen = FxHashSet::default();
            for m in self.oracle.incoming_edges(n) {
                if !seen.insert(m) {
                    continue;
                }
                dependents.push(m);
                if visited.insert(m) {
                    worklist.push(m);
                }
            }
            incoming.insert(n, dependents);
        }

        let mut nodes: Vec<NodeId> = visited.into_iter().collect();
        nodes.sort_unstable();
        let order = dependents_first_order(&nodes, &incoming)?;

        // Sweep dependents-first: by the time a node is processed, every
        // one of its direct dependents already has its full set.
        let owned_set: FxHashSet<NodeId> = owned.iter().copied().collect();
        let mut all: FxHashMap<NodeId, FxHashSet<NodeId>> = FxHashMap::default();
        for n in order {
            let mut dependents = FxHashSet::default();
            for m in &incoming[&n] {
                if let Some(transitive) = all.get(m) {
                    dependents.extend(transitive.iter().copied());
                }
                if owned_set.contains(m) {
                    dependents.insert(*m);
                }
            }
            all.insert(n, dependents);
        }

        all.retain(|n, _| owned_set.contains(n));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Oracle over a fixed edge table. Edges are stored dependency-side:
    /// `edges[n]` lists the nodes depending on `n`.
    struct MapOracle {
        dependents: FxHashMap<NodeId, Vec<NodeId>>,
    }

    impl MapOracle {
        fn new(edges: &[(u64, &[u64])]) -> Self {
            let dependents = edges
                .iter()
                .map(|(n, ms)| (NodeId(*n), ms.iter().map(|&m| NodeId(m)).collect()))
                .collect();
            Self { dependents }
        }
    }

    impl DependencyOracle for MapOracle {
        fn incoming_edges(&self, node: NodeId) -> Vec<NodeId> {
            self.dependents.get(&node).cloned().unwrap_or_default()
        }

        fn node_for_library(&self, _library: &Path) -> Option<NodeId> {
            None
        }
    }

    fn set(ids: &[u64]) -> FxHashSet<NodeId> {
        ids.iter().map(|&i| NodeId(i)).collect()
    }

    #[test]
    fn linear_chain() {
        // 1 depends on 2 depends on 3: incoming(3) = [2], incoming(2) = [1].
        let oracle = MapOracle::new(&[(3, &[2]), (2, &[1])]);
        let owned = [NodeId(1), NodeId(2), NodeId(3)];
        let map = DependencyAnalyzer::new(&oracle).dependents_of(&owned).unwrap();

        assert_eq!(map[&NodeId(1)], set(&[]));
        assert_eq!(map[&NodeId(2)], set(&[1]));
        assert_eq!(map[&NodeId(3)], set(&[1, 2]));
    }

    #[test]
    fn diamond_merges_both_arms() {
        // top(1) -> l(2), r(3); l and r -> bot(4).
        let oracle = MapOracle::new(&[(2, &[1]), (3, &[1]), (4, &[2, 3])]);
        let owned = [NodeId(1), NodeId(2), NodeId(3), NodeId(4)];
        let map = DependencyAnalyzer::new(&oracle).dependents_of(&owned).unwrap();

        assert_eq!(map[&NodeId(4)], set(&[1, 2, 3]));
        assert_eq!(map[&NodeId(2)], set(&[1]));
        assert_eq!(map[&NodeId(3)], set(&[1]));
        assert_eq!(map[&NodeId(1)], set(&[]));
    }

    #[test]
    fn intermediate_nodes_forward_dependents() {
        // Library 1 depends on library 3 through a non-library rule 10:
        // incoming(3) = [10], incoming(10) = [1]. Node 10 is not an input.
        let oracle = MapOracle::new(&[(3, &[10]), (10, &[1])]);
        let owned = [NodeId(1), NodeId(3)];
        let map = DependencyAnalyzer::new(&oracle).dependents_of(&owned).unwrap();

        assert_eq!(map[&NodeId(3)], set(&[1]));
        // The intermediate never appears in the result.
        assert!(!map.contains_key(&NodeId(10)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn owned_input_that_is_also_an_ancestor() {
        // 2 is both an input and an ancestor of input 3's dependents chain:
        // incoming(3) = [2], incoming(2) = [1].
        let oracle = MapOracle::new(&[(3, &[2]), (2, &[1])]);
        let owned = [NodeId(2), NodeId(3)];
        let map = DependencyAnalyzer::new(&oracle).dependents_of(&owned).unwrap();

        // 1 is not an input, so only 2 itself flows into 3's set.
        assert_eq!(map[&NodeId(3)], set(&[2]));
        assert_eq!(map[&NodeId(2)], set(&[]));
    }

    #[test]
    fn cycle_is_rejected() {
        let oracle = MapOracle::new(&[(1, &[2]), (2, &[1])]);
        let owned = [NodeId(1), NodeId(2)];
        let err = DependencyAnalyzer::new(&oracle).dependents_of(&owned).unwrap_err();
        assert!(matches!(err, RelinkError::CyclicLibraryGraph));
    }

    #[test]
    fn duplicate_edges_do_not_break_ordering() {
        let oracle = MapOracle::new(&[(2, &[1, 1, 1])]);
        let owned = [NodeId(1), NodeId(2)];
        let map = DependencyAnalyzer::new(&oracle).dependents_of(&owned).unwrap();
        assert_eq!(map[&NodeId(2)], set(&[1]));
    }
}
