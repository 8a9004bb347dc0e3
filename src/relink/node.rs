//! Plan data model: library identities, handles, and planned relink nodes.

use std::path::{Path, PathBuf};

use crate::graph::{DependencyOracle, NodeId};
use crate::toolchain::TargetCpu;

/// Identity of one library within the package: (cpu, on-disk filename).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryKey {
    pub cpu: TargetCpu,
    /// On-disk filename, e.g. `libfoo.so`. Unique per cpu within a package.
    pub name: String,
}

impl LibraryKey {
    pub fn new(cpu: TargetCpu, name: impl Into<String>) -> Self {
        Self { cpu, name: name.into() }
    }
}

impl std::fmt::Display for LibraryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.cpu, self.name)
    }
}

/// Where a library came from.
///
/// A tagged variant rather than a trait hierarchy: the planner dispatches
/// on the tag in exactly two places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryOrigin {
    /// Produced by a known build-graph node; its dependents can be queried.
    Owned(NodeId),
    /// Provenance unknown. Treated as a sealed input: no resolvable
    /// dependents, so conservatively a potential caller of everything.
    Copied,
}

/// Source-of-truth pointer to a library file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryHandle {
    pub path: PathBuf,
    pub origin: LibraryOrigin,
}

impl LibraryHandle {
    pub fn owned(path: impl Into<PathBuf>, producer: NodeId) -> Self {
        Self { path: path.into(), origin: LibraryOrigin::Owned(producer) }
    }

    pub fn copied(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), origin: LibraryOrigin::Copied }
    }

    /// Build a handle for `path`, asking the oracle whether the build graph
    /// knows a producer for it.
    pub fn resolve(path: impl Into<PathBuf>, oracle: &dyn DependencyOracle) -> Self {
        let path = path.into();
        match oracle.node_for_library(&path) {
            Some(node) => Self::owned(path, node),
            None => Self::copied(path),
        }
    }

    /// The producer node, for owned handles.
    pub fn producer(&self) -> Option<NodeId> {
        match self.origin {
            LibraryOrigin::Owned(node) => Some(node),
            LibraryOrigin::Copied => None,
        }
    }

    pub fn is_copied(&self) -> bool {
        matches!(self.origin, LibraryOrigin::Copied)
    }
}

/// Index of a node within a [`crate::relink::RelinkPlan`]'s node list.
///
/// Upstream references are indices, never pointers; nodes are created in
/// schedule order, so an upstream index is always smaller than the index
/// of the node referencing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlanNodeId(pub usize);

/// One planned relink. Immutable once planning completes.
#[derive(Debug, Clone)]
pub struct RelinkNode {
    pub key: LibraryKey,
    /// The original library this node relinks.
    pub input: LibraryHandle,
    /// Nodes whose symbol demands constrain this relink. All target the
    /// same cpu as this node.
    pub upstream: Vec<PlanNodeId>,
    /// Where the relinked `.so` will be published.
    pub relinked_library: PathBuf,
    /// Where this node's symbols-needed artifact will be published.
    pub symbols_needed: PathBuf,
}

impl RelinkNode {
    pub fn cpu(&self) -> TargetCpu {
        self.key.cpu
    }

    /// Whether this node takes the copied-library fast path: no upstream
    /// demands and an input of unknown provenance.
    pub fn is_copied(&self) -> bool {
        self.input.is_copied() && self.upstream.is_empty()
    }

    /// Directory all of this node's outputs live under.
    pub fn output_dir(&self) -> &Path {
        self.relinked_library
            .parent()
            .unwrap_or_else(|| Path::new("."))
    }
}
