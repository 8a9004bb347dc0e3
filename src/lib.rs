//! Native-library relinker.
//!
//! When linking shared libraries, by default every symbol is exported. In a
//! given application package, most of those symbols are never used by the
//! other libraries shipped alongside them. If each library exported only
//! what its in-package dependents actually reference, the linker could
//! strip everything unreachable from that set (cross-DSO dead-code
//! elimination) and the package would shrink.
//!
//! This crate plans and executes that reduction. It takes the package's
//! libraries and relinks them in reverse dependency order, telling the
//! linker to keep only the symbols referenced by an already-relinked
//! dependent. Relinking a dependent first matters, because its own
//! reduction changes the set of symbols it still needs. Libraries whose
//! producing build rule is unknown are copied through untouched and
//! conservatively treated as potential callers of everything.
//!
//! The crate is a library: the enclosing build tool supplies the
//! dependency oracle ([`graph::DependencyOracle`]), the per-CPU toolchains
//! ([`toolchain::ToolchainSet`]), and the scheduler that runs the planned
//! actions. [`relink::RelinkPlanner`] turns inputs into a [`relink::RelinkPlan`]
//! whose nodes form a DAG; nodes with satisfied upstreams may execute
//! concurrently.

pub mod common;
pub mod graph;
pub mod relink;
pub mod symbols;
pub mod toolchain;

pub use common::error::{RelinkError, Result};
pub use relink::{
    LibraryHandle, LibraryKey, LibraryOrigin, PlanNodeId, RelinkPlan, RelinkPlanner, RelinkNode,
    RewriteMap,
};
pub use symbols::extract::{ExtractedSymbols, SymbolSource, ToolSymbolExtractor};
pub use symbols::SymbolSet;
pub use toolchain::{TargetCpu, Toolchain, ToolchainSet};
