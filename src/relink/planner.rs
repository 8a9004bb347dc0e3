//! Relink planning: from input libraries to an executable DAG.
//!
//! By default every symbol of a shared library is exported; in a given
//! package most of them are never used by anything else. The planner
//! schedules a relink of every library in the package, in reverse
//! dependency order, so that each library is relinked *after* the
//! libraries that use it: by then their relinked forms pin down exactly
//! which symbols they still demand, and everything else can be hidden for
//! the linker to dead-code eliminate.
//!
//! Libraries whose producer the build graph cannot identify ("copied"
//! libraries) are handled conservatively: we cannot know what they call,
//! so every copied library of a cpu is an upstream of every owned relink
//! of that cpu, and copied libraries themselves are never reduced.
//!
//! The planner does no linking itself. It produces an ordered node list
//! plus per-node dependency edges for the enclosing scheduler; any set of
//! nodes whose upstream artifacts exist may execute concurrently.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::common::error::{RelinkError, Result};
use crate::graph::{dependents_first_order, DependencyAnalyzer, DependencyOracle, NodeId};
use crate::relink::action::RelinkAction;
use crate::relink::node::{LibraryHandle, LibraryKey, PlanNodeId, RelinkNode};
use crate::symbols::extract::SymbolSource;
use crate::symbols::SymbolSet;
use crate::toolchain::{TargetCpu, ToolchainSet};

/// Original library → relinked library, complete over all inputs and
/// partitioned the same way the inputs were.
#[derive(Debug, Clone, Default)]
pub struct RewriteMap {
    relinked_libs: BTreeMap<LibraryKey, PathBuf>,
    relinked_libs_assets: BTreeMap<LibraryKey, PathBuf>,
}

impl RewriteMap {
    /// Rewrites for the main library partition.
    pub fn relinked_libs(&self) -> &BTreeMap<LibraryKey, PathBuf> {
        &self.relinked_libs
    }

    /// Rewrites for the asset library partition.
    pub fn relinked_libs_assets(&self) -> &BTreeMap<LibraryKey, PathBuf> {
        &self.relinked_libs_assets
    }

    /// Look up a rewrite in either partition.
    pub fn get(&self, key: &LibraryKey) -> Option<&Path> {
        self.relinked_libs
            .get(key)
            .or_else(|| self.relinked_libs_assets.get(key))
            .map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.relinked_libs.len() + self.relinked_libs_assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One input library, with its partition remembered for the rewrite map.
struct InputLib {
    key: LibraryKey,
    handle: LibraryHandle,
    is_asset: bool,
}

/// Plans the relink schedule for a package's native libraries.
pub struct RelinkPlanner<'a> {
    libs: BTreeMap<LibraryKey, LibraryHandle>,
    asset_libs: BTreeMap<LibraryKey, LibraryHandle>,
    toolchains: &'a ToolchainSet,
    oracle: &'a dyn DependencyOracle,
    extractor: &'a dyn SymbolSource,
    output_root: PathBuf,
}

impl<'a> RelinkPlanner<'a> {
    /// `libs` and `asset_libs` are the two input partitions (either may be
    /// empty, not both). Every node's outputs land under
    /// `<output_root>/<cpu>/<library name>/`.
    pub fn new(
        libs: BTreeMap<LibraryKey, LibraryHandle>,
        asset_libs: BTreeMap<LibraryKey, LibraryHandle>,
        toolchains: &'a ToolchainSet,
        oracle: &'a dyn DependencyOracle,
        extractor: &'a dyn SymbolSource,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            libs,
            asset_libs,
            toolchains,
            oracle,
            extractor,
            output_root: output_root.into(),
        }
    }

    /// Build the plan. Pure bookkeeping apart from the read-only symbol
    /// extraction of the inputs (parallelized across libraries); nothing is
    /// linked or written yet.
    pub fn plan(self) -> Result<RelinkPlan> {
        if self.libs.is_empty() && self.asset_libs.is_empty() {
            return Err(RelinkError::EmptyInput);
        }

        let inputs: Vec<InputLib> = self
            .libs
            .iter()
            .map(|(k, h)| (k, h, false))
            .chain(self.asset_libs.iter().map(|(k, h)| (k, h, true)))
            .map(|(k, h, is_asset)| InputLib { key: k.clone(), handle: h.clone(), is_asset })
            .collect();

        // Fail fast on a cpu we have no toolchain for.
        for input in &inputs {
            self.toolchains.get(input.key.cpu, &input.key.name)?;
        }

        let cpus: BTreeSet<TargetCpu> = inputs.iter().map(|i| i.key.cpu).collect();
        info!(
            target: "relinker",
            "planning relinks for {} libraries across {} cpus",
            inputs.len(),
            cpus.len()
        );

        let mut plan = RelinkPlan::default();
        for cpu in cpus {
            let cpu_inputs: Vec<&InputLib> =
                inputs.iter().filter(|i| i.key.cpu == cpu).collect();
            self.plan_cpu(cpu, &cpu_inputs, &mut plan)?;
        }
        Ok(plan)
    }

    /// Plan one cpu's libraries. No symbol and no dependency edge ever
    /// crosses cpu boundaries, so each cpu is planned independently.
    fn plan_cpu(&self, cpu: TargetCpu, cpu_inputs: &[&InputLib], plan: &mut RelinkPlan) -> Result<()> {
        let toolchain = self.toolchains.get(cpu, &cpu_inputs[0].key.name)?;

        // The cpu's known-symbol pool: everything defined by any input
        // library of this cpu. Inputs are read-only here, so the sweep is
        // safe to fan out.
        let extractor = self.extractor;
        let defined_sets: Vec<SymbolSet> = cpu_inputs
            .par_iter()
            .map(|input| {
                extractor
                    .extract(toolchain, &input.handle.path)
                    .map(|symbols| symbols.defined)
            })
            .collect::<Result<Vec<_>>>()?;
        let mut known = SymbolSet::empty();
        for set in &defined_sets {
            known.extend_from(set);
        }
        debug!(target: "relinker", "{}: {} known symbols", cpu, known.len());

        // Which owned inputs could use symbols from which others.
        let owned: Vec<(&InputLib, NodeId)> = cpu_inputs
            .iter()
            .filter_map(|input| input.handle.producer().map(|node| (*input, node)))
            .collect();
        let owned_nodes: Vec<NodeId> = owned.iter().map(|(_, node)| *node).collect();
        let dependents = DependencyAnalyzer::new(self.oracle).dependents_of(&owned_nodes)?;

        // Copied libraries first: no upstream, never reduced. Each one
        // is an upstream of every owned relink of this cpu, because any of
        // its undefined references might land in any owned library.
        let mut copied_ids = Vec::new();
        for input in cpu_inputs.iter().copied().filter(|i| i.handle.is_copied()) {
            let id = plan.push_node(self.make_node(input, Vec::new()), input.is_asset);
            copied_ids.push(id);
        }

        // Owned libraries in reverse dependency order (dependents before
        // dependencies): every dependent's plan node exists by the time it
        // is needed as an upstream.
        let by_node: FxHashMap<NodeId, &InputLib> =
            owned.iter().map(|(input, node)| (*node, *input)).collect();
        let mut restricted: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        for &node in &owned_nodes {
            let mut direct: Vec<NodeId> = dependents[&node].iter().copied().collect();
            direct.sort_unstable();
            restricted.insert(node, direct);
        }
        let order = dependents_first_order(&owned_nodes, &restricted)?;

        let mut planned: FxHashMap<NodeId, PlanNodeId> = FxHashMap::default();
        for node in order {
            let input = by_node[&node];
            let mut upstream = copied_ids.clone();
            let mut dependent_ids: Vec<PlanNodeId> = dependents[&node]
                .iter()
                .map(|d| {
                    *planned
                        .get(d)
                        .expect("dependent planned before its dependency")
                })
                .collect();
            dependent_ids.sort_unstable();
            upstream.extend(dependent_ids);

            let id = plan.push_node(self.make_node(input, upstream), input.is_asset);
            planned.insert(node, id);
        }

        plan.known_symbols.insert(cpu, known);
        Ok(())
    }

    fn make_node(&self, input: &InputLib, upstream: Vec<PlanNodeId>) -> RelinkNode {
        let dir = self
            .output_root
            .join(input.key.cpu.name())
            .join(&input.key.name);
        RelinkNode {
            key: input.key.clone(),
            input: input.handle.clone(),
            upstream,
            relinked_library: dir.join(&input.key.name),
            symbols_needed: dir.join("symbols_needed.txt"),
        }
    }
}

/// The finished plan: ordered nodes, rewrite map, and the per-cpu known
/// symbol pools. Immutable; execution reads it but never changes it.
#[derive(Debug, Default)]
pub struct RelinkPlan {
    nodes: Vec<RelinkNode>,
    rewrite: RewriteMap,
    known_symbols: FxHashMap<TargetCpu, SymbolSet>,
}

impl RelinkPlan {
    /// The planned nodes. For any node, every upstream appears earlier in
    /// this list, so executing in list order is always a valid (serial)
    /// schedule.
    pub fn nodes(&self) -> &[RelinkNode] {
        &self.nodes
    }

    pub fn node(&self, id: PlanNodeId) -> &RelinkNode {
        &self.nodes[id.0]
    }

    pub fn rewrite_map(&self) -> &RewriteMap {
        &self.rewrite
    }

    /// The known-symbol pool for a planned cpu.
    pub fn known_symbols(&self, cpu: TargetCpu) -> Option<&SymbolSet> {
        self.known_symbols.get(&cpu)
    }

    /// The symbols-needed artifacts a node waits for.
    pub fn upstream_artifacts(&self, id: PlanNodeId) -> Vec<&Path> {
        self.nodes[id.0]
            .upstream
            .iter()
            .map(|u| self.nodes[u.0].symbols_needed.as_path())
            .collect()
    }

    /// Execute one node. The caller (the enclosing scheduler) must ensure
    /// every upstream node of `id` has already executed.
    pub fn execute_node(
        &self,
        id: PlanNodeId,
        toolchains: &ToolchainSet,
        extractor: &dyn SymbolSource,
    ) -> Result<()> {
        let node = &self.nodes[id.0];
        let toolchain = toolchains.get(node.cpu(), &node.key.name)?;
        // Planned nodes always have a pool for their cpu.
        let known = &self.known_symbols[&node.cpu()];
        RelinkAction::new(node, self.upstream_artifacts(id), toolchain, known)
            .execute(extractor)
    }

    /// Serial fallback driver: execute every node in plan order. Real
    /// builds schedule the DAG themselves and run independent nodes
    /// concurrently.
    pub fn execute_all(
        &self,
        toolchains: &ToolchainSet,
        extractor: &dyn SymbolSource,
    ) -> Result<()> {
        for id in 0..self.nodes.len() {
            self.execute_node(PlanNodeId(id), toolchains, extractor)?;
        }
        Ok(())
    }

    fn push_node(&mut self, node: RelinkNode, is_asset: bool) -> PlanNodeId {
        let id = PlanNodeId(self.nodes.len());
        let entry = (node.key.clone(), node.relinked_library.clone());
        if is_asset {
            self.rewrite.relinked_libs_assets.insert(entry.0, entry.1);
        } else {
            self.rewrite.relinked_libs.insert(entry.0, entry.1);
        }
        self.nodes.push(node);
        id
    }
}
