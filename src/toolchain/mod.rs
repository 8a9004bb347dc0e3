//! Per-CPU toolchain description and external tool invocation.
//!
//! The relinker delegates all binary-level work to the platform toolchain:
//! a symbol dumper (`nm -D` / `objdump -T` equivalent) to read dynamic
//! symbol tables, and the platform linker to re-emit a shared object under
//! a version script. This module centralizes process spawning so the rest
//! of the crate never deals with `std::process::Command` building.
//!
//! The embedding build tool supplies one [`Toolchain`] per [`TargetCpu`];
//! the core never hard-codes tool paths, link flags, or the mandatory
//! symbol list.

use std::path::{Path, PathBuf};
use std::process::Output;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::common::error::{RelinkError, Result};

/// CPU architectures a package can carry native libraries for.
///
/// Opaque as far as the core is concerned: the value only selects a
/// toolchain and namespaces output paths. Symbols never cross CPUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetCpu {
    Arm,
    Arm64,
    X86,
    X86_64,
}

impl TargetCpu {
    /// Stable lowercase name, used in output paths and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            TargetCpu::Arm => "arm",
            TargetCpu::Arm64 => "arm64",
            TargetCpu::X86 => "x86",
            TargetCpu::X86_64 => "x86_64",
        }
    }

    /// Parse a CPU name as produced by `name()`. Returns None for
    /// unrecognized names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "arm" => Some(TargetCpu::Arm),
            "arm64" => Some(TargetCpu::Arm64),
            "x86" => Some(TargetCpu::X86),
            "x86_64" => Some(TargetCpu::X86_64),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetCpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tools and flags for one CPU, supplied by the embedding build tool.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Platform linker binary.
    pub linker: PathBuf,
    /// Flags passed to every relink invocation, before the per-action
    /// output/script/input arguments (e.g. `-shared`, sysroot flags).
    pub linker_flags: Vec<String>,
    /// Dynamic symbol dumper binary (`nm` or equivalent).
    pub symbol_dumper: PathBuf,
    /// Flags that make the dumper print the dynamic symbol table with
    /// version suffixes (e.g. `-D --with-symbol-versions` for GNU nm).
    pub dumper_flags: Vec<String>,
    /// Symbols that must stay exported even when no dependent references
    /// them (e.g. `__bss_start`, `_edata`, `_end`). Toolchain-defined.
    pub mandatory_symbols: Vec<String>,
}

impl Toolchain {
    /// A toolchain with just the two tool paths; flags and the mandatory
    /// list start empty.
    pub fn new(linker: impl Into<PathBuf>, symbol_dumper: impl Into<PathBuf>) -> Self {
        Self {
            linker: linker.into(),
            linker_flags: Vec::new(),
            symbol_dumper: symbol_dumper.into(),
            dumper_flags: Vec::new(),
            mandatory_symbols: Vec::new(),
        }
    }
}

/// The per-CPU toolchain table handed to the planner.
#[derive(Debug, Clone, Default)]
pub struct ToolchainSet {
    toolchains: FxHashMap<TargetCpu, Toolchain>,
}

impl ToolchainSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the toolchain for a CPU, replacing any previous entry.
    pub fn insert(&mut self, cpu: TargetCpu, toolchain: Toolchain) {
        self.toolchains.insert(cpu, toolchain);
    }

    /// Look up the toolchain for a CPU. `library` names the input that
    /// triggered the lookup, for the error message.
    pub fn get(&self, cpu: TargetCpu, library: &str) -> Result<&Toolchain> {
        self.toolchains.get(&cpu).ok_or_else(|| RelinkError::UnknownCpu {
            cpu,
            library: library.to_string(),
        })
    }

    /// Whether a toolchain is registered for `cpu`.
    pub fn contains(&self, cpu: TargetCpu) -> bool {
        self.toolchains.contains_key(&cpu)
    }
}

/// Run an external tool to completion, capturing stdout and stderr.
///
/// Spawn failure and non-zero exit both surface as `ToolchainError` with
/// the captured stderr included verbatim, so the build tool can show the
/// user what the linker or dumper actually said.
pub(crate) fn run_tool<I, S>(program: &Path, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let tool = program.display().to_string();
    let mut cmd = std::process::Command::new(program);
    cmd.args(args);
    debug!(target: "relinker", "running {:?}", cmd);

    let output = cmd.output().map_err(|e| RelinkError::ToolchainError {
        tool: tool.clone(),
        message: format!("failed to spawn: {}", e),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RelinkError::ToolchainError {
            tool,
            message: format!("exited with {}: {}", output.status, stderr.trim()),
        });
    }
    Ok(output)
}
