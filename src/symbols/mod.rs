//! Linker symbol sets with a canonical on-disk form.
//!
//! A `SymbolSet` is an unordered set of dynamic symbol names. Version
//! suffixes (`name@VER`, `name@@VER`) are part of the name and preserved
//! verbatim. The serialized form is canonical: one symbol per line, sorted
//! lexicographically, LF line endings, no BOM, no blank lines, no trailing
//! whitespace. Two sets are equal iff their serialized forms are
//! byte-identical, which is what lets the enclosing build system
//! content-address these artifacts.

pub mod extract;
pub mod version_script;

use std::collections::BTreeSet;
use std::path::Path;

use crate::common::error::{RelinkError, Result};
use crate::common::temp_files::write_atomic;

/// An unordered set of linker symbol names.
///
/// Backed by a `BTreeSet` so iteration (and therefore serialization) is
/// sorted without a separate normalization step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolSet {
    names: BTreeSet<String>,
}

impl SymbolSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Insert one symbol name. Duplicate inserts are no-ops.
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Whether `name` is a member.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Set union, as a new set.
    pub fn union(&self, other: &SymbolSet) -> SymbolSet {
        SymbolSet { names: self.names.union(&other.names).cloned().collect() }
    }

    /// Set intersection, as a new set.
    pub fn intersect(&self, other: &SymbolSet) -> SymbolSet {
        SymbolSet { names: self.names.intersection(&other.names).cloned().collect() }
    }

    /// Absorb all members of `other`.
    pub fn extend_from(&mut self, other: &SymbolSet) {
        for name in &other.names {
            self.names.insert(name.clone());
        }
    }

    /// Members in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }

    /// The canonical serialized form: sorted, one name per line, each line
    /// LF-terminated. The empty set serializes to the empty string.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for name in &self.names {
            out.push_str(name);
            out.push('\n');
        }
        out
    }

    /// Write the canonical form to `path` atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.serialize().as_bytes())
    }

    /// Read a serialized set back from `path`.
    ///
    /// An absent file is `MissingSymbolArtifact`: an action reading its
    /// upstream artifacts must be able to distinguish "not produced yet"
    /// from any other read failure.
    pub fn read(path: &Path) -> Result<SymbolSet> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RelinkError::MissingSymbolArtifact { path: path.to_path_buf() });
            }
            Err(e) => return Err(RelinkError::io(path, e)),
        };
        Ok(text.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
    }
}

impl FromIterator<String> for SymbolSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        SymbolSet { names: iter.into_iter().collect() }
    }
}

impl<'a> FromIterator<&'a str> for SymbolSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        SymbolSet { names: iter.into_iter().map(str::to_string).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_is_sorted_and_lf_terminated() {
        let set: SymbolSet = ["zeta", "alpha", "mid"].into_iter().collect();
        assert_eq!(set.serialize(), "alpha\nmid\nzeta\n");
        assert_eq!(SymbolSet::empty().serialize(), "");
    }

    #[test]
    fn version_suffixes_are_ordinary_name_bytes() {
        let set: SymbolSet = ["memcpy@@GLIBC_2.14", "memcpy@GLIBC_2.2.5"].into_iter().collect();
        assert!(set.contains("memcpy@@GLIBC_2.14"));
        assert!(!set.contains("memcpy"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn union_and_intersect() {
        let a: SymbolSet = ["x", "y"].into_iter().collect();
        let b: SymbolSet = ["y", "z"].into_iter().collect();
        assert_eq!(a.union(&b), ["x", "y", "z"].into_iter().collect());
        assert_eq!(a.intersect(&b), ["y"].into_iter().collect());
        // Inputs untouched.
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn round_trip_through_file() {
        let dir = std::env::temp_dir()
            .join(format!("relinker_symset_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("needed.txt");

        let set: SymbolSet = ["b", "a", "c@@V1"].into_iter().collect();
        set.write(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\nc@@V1\n");
        assert_eq!(SymbolSet::read(&path).unwrap(), set);

        // Byte-determinism: a second write produces identical bytes.
        let first = std::fs::read(&path).unwrap();
        set.write(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn reading_absent_file_is_missing_artifact() {
        let path = std::env::temp_dir().join("relinker_definitely_absent_symbols.txt");
        let err = SymbolSet::read(&path).unwrap_err();
        assert!(matches!(err, RelinkError::MissingSymbolArtifact { .. }));
    }
}
