//! Atomic artifact publication and scoped scratch directories.
//!
//! Provides:
//! - `write_atomic()` / `copy_atomic()`: publish a file under a temporary
//!   name in the destination directory and rename it into place, so a
//!   cancelled or failed action never leaves a half-formed artifact visible
//! - `sibling_temp_path()`: a unique temp name next to a target path
//! - `ScopedDir`: RAII guard for a scratch directory, removed on drop
//!   (even on early return or panic)

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::error::{RelinkError, Result};

/// Global counter for generating unique temp names within a process.
/// Combined with the PID so concurrently scheduled actions never collide.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique temporary path in the same directory as `target`.
///
/// Staying in the target's directory keeps the final `rename` on the same
/// filesystem, which is what makes the publication atomic.
pub fn sibling_temp_path(target: &Path) -> PathBuf {
    let pid = std::process::id();
    let id = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let stem = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!(".{}.{}.{}.tmp", stem, pid, id))
}

/// Write `contents` to `path` atomically: write a sibling temp file, then
/// rename it over the target. The temp file is removed if any step fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = sibling_temp_path(path);
    if let Err(e) = std::fs::write(&tmp, contents) {
        return Err(RelinkError::io(&tmp, e));
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(RelinkError::io(path, e));
    }
    Ok(())
}

/// Copy `src` to `dst` atomically, preserving the same temp-then-rename
/// discipline as `write_atomic`.
pub fn copy_atomic(src: &Path, dst: &Path) -> Result<()> {
    let tmp = sibling_temp_path(dst);
    if let Err(e) = std::fs::copy(src, &tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(RelinkError::io(src, e));
    }
    if let Err(e) = std::fs::rename(&tmp, dst) {
        let _ = std::fs::remove_file(&tmp);
        return Err(RelinkError::io(dst, e));
    }
    Ok(())
}

/// RAII guard for a scratch directory. The directory is created on
/// construction and removed recursively when the guard drops.
///
/// Used by relink actions for intermediates (version scripts, linker temp
/// output) that must not outlive the action on any exit path.
pub struct ScopedDir {
    path: PathBuf,
}

impl ScopedDir {
    /// Create a unique scratch directory under `parent`.
    pub fn new(parent: &Path, label: &str) -> Result<Self> {
        let pid = std::process::id();
        let id = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = parent.join(format!(".{}.{}.{}", label, pid, id));
        std::fs::create_dir_all(&path).map_err(|e| RelinkError::io(&path, e))?;
        Ok(Self { path })
    }

    /// Path of the scratch directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedDir {
    fn drop(&mut self) {
        // Cleanup failures are not actionable at this point.
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "relinker_test_{}_{}_{}",
            name,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn write_atomic_creates_and_replaces() {
        let dir = test_dir("write_atomic");
        let path = dir.join("out.txt");

        write_atomic(&path, b"first").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        // No stray temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "stray temps: {:?}", leftovers);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn copy_atomic_copies_bytes() {
        let dir = test_dir("copy_atomic");
        let src = dir.join("src.so");
        let dst = dir.join("dst.so");
        std::fs::write(&src, b"\x7fELF fake contents").unwrap();

        copy_atomic(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), std::fs::read(&src).unwrap());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn copy_atomic_missing_source_is_io_error() {
        let dir = test_dir("copy_missing");
        let err = copy_atomic(&dir.join("absent.so"), &dir.join("dst.so")).unwrap_err();
        assert!(matches!(err, RelinkError::Io { .. }));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn scoped_dir_removed_on_drop() {
        let dir = test_dir("scoped");
        let scratch_path;
        {
            let scratch = ScopedDir::new(&dir, "scratch").unwrap();
            scratch_path = scratch.path().to_path_buf();
            assert!(scratch_path.is_dir());
            std::fs::write(scratch_path.join("inner.txt"), b"x").unwrap();
        }
        assert!(!scratch_path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
