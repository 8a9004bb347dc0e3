//! Dynamic symbol extraction from shared libraries.
//!
//! Extraction goes through the toolchain's symbol dumper (GNU `nm` with
//! `-D --with-symbol-versions`, or an equivalent that prints the same
//! shape) rather than parsing ELF in-process: the dumper already knows the
//! target's ELF class and keeps the version-suffix formatting the rest of
//! the pipeline depends on.
//!
//! The classification mirrors the dynamic symbol table: a symbol is
//! *defined* if its binding is non-LOCAL and its section is not SHN_UNDEF,
//! and *undefined* if its section is SHN_UNDEF. Weak symbols land on
//! whichever side their definedness puts them.

use std::path::Path;

use tracing::debug;

use crate::common::error::Result;
use crate::symbols::SymbolSet;
use crate::toolchain::{run_tool, Toolchain};

/// The two sides of a library's dynamic symbol table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedSymbols {
    /// Exported symbols: non-LOCAL binding, defined section.
    pub defined: SymbolSet,
    /// Undefined references the dynamic linker must resolve at load time.
    pub undefined: SymbolSet,
}

/// Seam for symbol extraction, so planning logic can be exercised without
/// real binaries or a real toolchain. `Sync` because the planner fans the
/// initial extraction sweep out across inputs.
pub trait SymbolSource: Sync {
    /// List the defined and undefined dynamic symbols of `library`.
    fn extract(&self, toolchain: &Toolchain, library: &Path) -> Result<ExtractedSymbols>;
}

/// Production extractor: runs the toolchain's symbol dumper.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolSymbolExtractor;

impl SymbolSource for ToolSymbolExtractor {
    fn extract(&self, toolchain: &Toolchain, library: &Path) -> Result<ExtractedSymbols> {
        let args = toolchain
            .dumper_flags
            .iter()
            .map(std::ffi::OsStr::new)
            .chain(std::iter::once(library.as_os_str()));
        let output = run_tool(&toolchain.symbol_dumper, args)?;
        let text = String::from_utf8_lossy(&output.stdout);
        let symbols = parse_dumper_output(&text);
        debug!(
            target: "relinker",
            "{}: {} defined, {} undefined",
            library.display(),
            symbols.defined.len(),
            symbols.undefined.len()
        );
        Ok(symbols)
    }
}

/// Parse `nm -D`-style output into defined/undefined sets.
///
/// Expected line shapes:
///
/// ```text
/// 0000000000001040 T foo@@VERS_1.0
///                  U bar
///                  w __gmon_start__
/// ```
///
/// i.e. an optional address, a one-character type code, and the symbol name
/// (version suffix included). The code determines the side:
///
/// - `U`, `w`, `v`: referenced but undefined (SHN_UNDEF), including weak
///   references
/// - other lowercase codes (`t`, `d`, `b`, ...): LOCAL binding, dropped
/// - `u`, `i`: GNU unique / indirect, non-LOCAL despite the lowercase code
/// - any other uppercase code (`T`, `D`, `B`, `R`, `W`, `V`, ...): defined
///   with non-LOCAL binding
///
/// Anything that doesn't match (file headers, "no symbols" notices, blank
/// lines) is skipped.
pub fn parse_dumper_output(text: &str) -> ExtractedSymbols {
    let mut symbols = ExtractedSymbols::default();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        let code_field = fields[fields.len() - 2];
        let name = fields[fields.len() - 1];
        if code_field.len() != 1 || name.is_empty() {
            continue;
        }
        let code = code_field.chars().next().unwrap_or(' ');
        match code {
            'U' | 'w' | 'v' => symbols.undefined.insert(name),
            'u' | 'i' => symbols.defined.insert(name),
            c if c.is_ascii_uppercase() => symbols.defined.insert(name),
            _ => {} // LOCAL binding, or not a symbol line
        }
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_defined_and_undefined() {
        let out = "\
0000000000001040 T foo
0000000000002000 D data_sym
                 U bar
                 U baz
";
        let symbols = parse_dumper_output(out);
        assert_eq!(symbols.defined, ["foo", "data_sym"].into_iter().collect());
        assert_eq!(symbols.undefined, ["bar", "baz"].into_iter().collect());
    }

    #[test]
    fn weak_symbols_land_on_their_definedness_side() {
        let out = "\
0000000000001100 W weak_fn
0000000000001200 V weak_obj
                 w __gmon_start__
                 v weak_undef_obj
";
        let symbols = parse_dumper_output(out);
        assert_eq!(symbols.defined, ["weak_fn", "weak_obj"].into_iter().collect());
        assert_eq!(
            symbols.undefined,
            ["__gmon_start__", "weak_undef_obj"].into_iter().collect()
        );
    }

    #[test]
    fn local_symbols_are_dropped() {
        let out = "\
0000000000001000 t local_fn
0000000000002000 d local_data
0000000000003000 T exported_fn
0000000000004000 u gnu_unique
0000000000005000 i ifunc_resolver
";
        let symbols = parse_dumper_output(out);
        assert_eq!(
            symbols.defined,
            ["exported_fn", "gnu_unique", "ifunc_resolver"].into_iter().collect()
        );
        assert!(symbols.undefined.is_empty());
    }

    #[test]
    fn version_suffixes_kept_verbatim() {
        let out = "\
0000000000001040 T mylib_entry@@MYLIB_1.0
                 U memcpy@GLIBC_2.14
";
        let symbols = parse_dumper_output(out);
        assert!(symbols.defined.contains("mylib_entry@@MYLIB_1.0"));
        assert!(symbols.undefined.contains("memcpy@GLIBC_2.14"));
    }

    #[test]
    fn non_symbol_lines_are_skipped() {
        let out = "\

libfoo.so:
libfoo.so: no symbols
0000000000001040 T real_sym
";
        let symbols = parse_dumper_output(out);
        assert_eq!(symbols.defined, ["real_sym"].into_iter().collect());
        assert!(symbols.undefined.is_empty());
    }
}
