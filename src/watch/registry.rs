//! Idempotency registry for the folder watcher.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Canonical paths the watcher has already taken on.
///
/// Owned by one [`super::Watcher`]; entries are never removed, so a path is
/// handled at most once per process run.
#[derive(Debug, Default)]
pub struct ProcessedRegistry {
    seen: HashSet<PathBuf>,
}

impl ProcessedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `path`. Returns false if it was already registered.
    pub fn register(&mut self, path: &Path) -> bool {
        self.seen.insert(canonical_key(path))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(&canonical_key(path))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Canonical form when the file exists, else the path as given.
fn canonical_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_register_once() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.png");
        fs::write(&file, b"x").unwrap();

        let mut registry = ProcessedRegistry::new();
        assert!(registry.register(&file));
        assert!(!registry.register(&file));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_equivalent_spellings_share_an_entry() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let file = dir.path().join("a.png");
        fs::write(&file, b"x").unwrap();

        let mut registry = ProcessedRegistry::new();
        assert!(registry.register(&file));
        let detour = dir.path().join("sub").join("..").join("a.png");
        assert!(registry.contains(&detour));
        assert!(!registry.register(&detour));
    }
}
