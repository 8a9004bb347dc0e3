//! Linker version script emission.
//!
//! A version script is how the relink restricts a shared object's export
//! surface: one anonymous version node listing the kept symbols as
//! `global:` and hiding everything else with `local: *;`. The emitted
//! bytes are deterministic for a given input (sorted globals), which is
//! required for bit-identical relink outputs across runs.

use std::path::Path;

use crate::common::error::Result;
use crate::common::temp_files::write_atomic;
use crate::symbols::SymbolSet;

/// Render the script text for `exported ∪ mandatory`.
///
/// The mandatory set is unioned in unconditionally: symbols like
/// `__bss_start`, `_edata` and `_end` must stay visible even when no
/// dependent references them, or the resulting object breaks at load time.
pub fn render_version_script(exported: &SymbolSet, mandatory: &SymbolSet) -> String {
    let merged = exported.union(mandatory);
    let mut out = String::from("{\n");
    if !merged.is_empty() {
        out.push_str("global:\n");
        for name in merged.iter() {
            out.push_str("  ");
            out.push_str(name);
            out.push_str(";\n");
        }
    }
    out.push_str("local: *;\n};\n");
    out
}

/// Write the version script for `exported ∪ mandatory` to `path`
/// atomically.
pub fn write_version_script(path: &Path, exported: &SymbolSet, mandatory: &SymbolSet) -> Result<()> {
    write_atomic(path, render_version_script(exported, mandatory).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_are_sorted_and_locals_wildcarded() {
        let exported: SymbolSet = ["zeta", "alpha"].into_iter().collect();
        let mandatory: SymbolSet = ["_end"].into_iter().collect();
        let script = render_version_script(&exported, &mandatory);
        assert_eq!(
            script,
            "{\nglobal:\n  _end;\n  alpha;\n  zeta;\nlocal: *;\n};\n"
        );
    }

    #[test]
    fn empty_export_set_hides_everything() {
        let script = render_version_script(&SymbolSet::empty(), &SymbolSet::empty());
        assert_eq!(script, "{\nlocal: *;\n};\n");
    }

    #[test]
    fn mandatory_symbols_survive_empty_exports() {
        let mandatory: SymbolSet = ["__bss_start", "_edata", "_end"].into_iter().collect();
        let script = render_version_script(&SymbolSet::empty(), &mandatory);
        assert!(script.contains("  __bss_start;\n"));
        assert!(script.contains("  _edata;\n"));
        assert!(script.contains("  _end;\n"));
    }

    #[test]
    fn rendering_is_byte_deterministic() {
        let exported: SymbolSet = ["b", "a", "c"].into_iter().collect();
        let mandatory: SymbolSet = ["m"].into_iter().collect();
        assert_eq!(
            render_version_script(&exported, &mandatory),
            render_version_script(&exported, &mandatory)
        );
    }
}
