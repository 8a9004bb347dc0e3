//! Error types for planning and relinking.
//!
//! One enum covers every failure the crate can surface. The planner recovers
//! from nothing: construction-time problems (`EmptyInput`, `UnknownCpu`,
//! `CyclicLibraryGraph`) abort planning, and per-action problems abort that
//! action and propagate to the enclosing scheduler. Nothing here retries.

use std::path::PathBuf;

use crate::toolchain::TargetCpu;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RelinkError>;

/// Everything that can go wrong while planning or executing relinks.
#[derive(Debug, thiserror::Error)]
pub enum RelinkError {
    /// No libraries were supplied to the planner at all.
    #[error("there should be at least one native library to relink")]
    EmptyInput,

    /// The library dependency graph contains a cycle. The relinking schedule
    /// requires a DAG; a cycle means no valid relink order exists.
    #[error("cycle detected in the native library dependency graph")]
    CyclicLibraryGraph,

    /// An input library targets a CPU with no registered toolchain.
    #[error("no toolchain registered for cpu `{cpu}` (library {library})")]
    UnknownCpu { cpu: TargetCpu, library: String },

    /// An upstream symbols-needed file was absent when an action started.
    /// The scheduler must only start an action once every upstream artifact
    /// exists; hitting this means a dependency edge was not honored.
    #[error("missing symbols file: {}", path.display())]
    MissingSymbolArtifact { path: PathBuf },

    /// An external tool (symbol dumper or linker) could not be spawned or
    /// exited non-zero. The captured stderr is included verbatim.
    #[error("`{tool}` failed: {message}")]
    ToolchainError { tool: String, message: String },

    /// The linker exited successfully but the output's dynamic symbol table
    /// is not the one the version script asked for.
    #[error("relinked {} has a malformed export set: {detail}", library.display())]
    LinkError { library: PathBuf, detail: String },

    /// A filesystem read or write failed.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RelinkError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RelinkError::Io { path: path.into(), source }
    }
}
