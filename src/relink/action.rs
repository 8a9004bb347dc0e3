//! Execution of one planned relink.
//!
//! An action reads the symbols-needed artifacts of its upstream nodes
//! (all already relinked; the scheduler honors the plan's dependency
//! edges), narrows them to the symbols this library actually defines,
//! and re-links the library so that exactly that set (plus the
//! toolchain's mandatory symbols) stays exported. It then publishes its
//! own symbols-needed artifact for the libraries *it* depends on.
//!
//! All outputs are published atomically (temp name, then rename), so a
//! cancelled action never leaves a half-formed artifact visible to the
//! scheduler. Intermediates live in a scratch directory that is removed
//! on every exit path.

use std::ffi::OsString;
use std::path::Path;

use tracing::{debug, info};

use crate::common::error::{RelinkError, Result};
use crate::common::temp_files::{copy_atomic, sibling_temp_path, ScopedDir};
use crate::relink::node::RelinkNode;
use crate::symbols::extract::SymbolSource;
use crate::symbols::version_script::write_version_script;
use crate::symbols::SymbolSet;
use crate::toolchain::{run_tool, Toolchain};

/// One relink, wired with everything it needs to run.
///
/// Construction is cheap; all I/O happens in [`execute`](Self::execute).
/// The action has no internal concurrency (external tools run
/// synchronously) and writes only under its node's output directory.
pub struct RelinkAction<'a> {
    node: &'a RelinkNode,
    /// Symbols-needed artifacts of the upstream nodes, written before this
    /// action starts.
    upstream_symbols: Vec<&'a Path>,
    toolchain: &'a Toolchain,
    /// Union of the defined symbols of every input library of this cpu.
    /// Plan-scoped constant; used to keep only in-package references in
    /// the symbols-needed output.
    known_symbols: &'a SymbolSet,
}

impl<'a> RelinkAction<'a> {
    pub fn new(
        node: &'a RelinkNode,
        upstream_symbols: Vec<&'a Path>,
        toolchain: &'a Toolchain,
        known_symbols: &'a SymbolSet,
    ) -> Self {
        Self { node, upstream_symbols, toolchain, known_symbols }
    }

    /// Run the relink to completion, publishing the relinked library and
    /// the symbols-needed artifact.
    pub fn execute(&self, extractor: &dyn SymbolSource) -> Result<()> {
        let node = self.node;
        std::fs::create_dir_all(node.output_dir())
            .map_err(|e| RelinkError::io(node.output_dir(), e))?;

        if node.is_copied() {
            return self.execute_copied(extractor);
        }

        let demanded = collect_demanded(&self.upstream_symbols)?;
        let old = extractor.extract(self.toolchain, &node.input.path)?;

        // Only export what a dependent demands *and* this library defines.
        // Demanded symbols defined elsewhere belong to other libraries'
        // relinks.
        let exports = demanded.intersect(&old.defined);
        let mandatory: SymbolSet =
            self.toolchain.mandatory_symbols.iter().map(String::as_str).collect();
        debug!(
            target: "relinker",
            "{}: {} of {} demanded symbols defined here",
            node.key,
            exports.len(),
            demanded.len()
        );

        let scratch = ScopedDir::new(node.output_dir(), "relink")?;
        let script = scratch.path().join("version_script.txt");
        write_version_script(&script, &exports, &mandatory)?;
        self.run_linker(&script)?;

        // The linker exiting zero is not enough: verify the new dynamic
        // symbol table is exactly the surface the script asked for.
        let new = extractor.extract(self.toolchain, &node.relinked_library)?;
        verify_relinked(&node.relinked_library, &exports, &mandatory, &new.defined)?;

        let needed = new.undefined.intersect(self.known_symbols);
        needed.write(&node.symbols_needed)?;
        info!(
            target: "relinker",
            "relinked {}: exports {}, needs {}",
            node.key,
            exports.len(),
            needed.len()
        );
        Ok(())
    }

    /// Copied-library fast path: provenance unknown, so nothing may be
    /// hidden. Copy the library verbatim and only compute what it needs
    /// from the rest of the package.
    fn execute_copied(&self, extractor: &dyn SymbolSource) -> Result<()> {
        let node = self.node;
        copy_atomic(&node.input.path, &node.relinked_library)?;
        let old = extractor.extract(self.toolchain, &node.input.path)?;
        let needed = old.undefined.intersect(self.known_symbols);
        needed.write(&node.symbols_needed)?;
        info!(
            target: "relinker",
            "copied {} verbatim, needs {}",
            node.key,
            needed.len()
        );
        Ok(())
    }

    /// Re-link the existing shared object under the version script. The
    /// linker writes to a sibling temp path; the output is renamed into
    /// place only on success.
    fn run_linker(&self, script: &Path) -> Result<()> {
        let node = self.node;
        let tmp_out = sibling_temp_path(&node.relinked_library);

        let mut args: Vec<OsString> =
            self.toolchain.linker_flags.iter().map(OsString::from).collect();
        args.push(OsString::from("-o"));
        args.push(tmp_out.clone().into_os_string());
        let mut script_flag = OsString::from("--version-script=");
        script_flag.push(script.as_os_str());
        args.push(script_flag);
        args.push(node.input.path.clone().into_os_string());

        if let Err(e) = run_tool(&self.toolchain.linker, &args) {
            let _ = std::fs::remove_file(&tmp_out);
            return Err(e);
        }
        std::fs::rename(&tmp_out, &node.relinked_library)
            .map_err(|e| RelinkError::io(&node.relinked_library, e))
    }
}

/// Union the symbols-needed artifacts of all upstream nodes. An absent
/// artifact means the scheduler started this action too early.
pub(crate) fn collect_demanded(upstream_symbols: &[&Path]) -> Result<SymbolSet> {
    let mut demanded = SymbolSet::empty();
    for path in upstream_symbols {
        demanded.extend_from(&SymbolSet::read(path)?);
    }
    Ok(demanded)
}

/// Check the relinked library's defined set against the intended surface:
/// every requested export must be present, and nothing beyond
/// `exports ∪ mandatory` may be exported.
pub(crate) fn verify_relinked(
    library: &Path,
    exports: &SymbolSet,
    mandatory: &SymbolSet,
    defined_new: &SymbolSet,
) -> Result<()> {
    for symbol in exports.iter() {
        if !defined_new.contains(symbol) {
            return Err(RelinkError::LinkError {
                library: library.to_path_buf(),
                detail: format!("required symbol `{}` is no longer exported", symbol),
            });
        }
    }
    for symbol in defined_new.iter() {
        if !exports.contains(symbol) && !mandatory.contains(symbol) {
            return Err(RelinkError::LinkError {
                library: library.to_path_buf(),
                detail: format!("unexpected exported symbol `{}`", symbol),
            });
        }
    }
    Ok(())
}
