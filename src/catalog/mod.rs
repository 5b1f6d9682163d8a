//! File catalog
//!
//! Ordered, client-side view of the remote file set that backs the list UI.
//! The catalog is only ever replaced as a whole, so a reader sees either the
//! previous list or the new one, never a mix.

use tracing::debug;

use crate::drive::types::RemoteFile;

#[derive(Debug, Default)]
pub struct FileCatalog {
    files: Vec<RemoteFile>,
    /// Number of list results applied so far
    generation: u64,
}

impl FileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a complete list result, in the order the store returned it.
    ///
    /// Results are applied in the order they complete. An older list that
    /// finishes late replaces a newer one.
    pub fn replace(&mut self, files: Vec<RemoteFile>) {
        self.generation += 1;
        debug!(
            "Catalog generation {}: {} -> {} files",
            self.generation,
            self.files.len(),
            files.len()
        );
        self.files = files;
    }

    /// Copy of the current list; later replacements do not affect it
    pub fn current(&self) -> Vec<RemoteFile> {
        self.files.clone()
    }

    pub fn get(&self, id: &str) -> Option<&RemoteFile> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, name: &str) -> RemoteFile {
        RemoteFile::new(id, name, None)
    }

    #[test]
    fn test_replace_keeps_server_order() {
        let mut catalog = FileCatalog::new();
        catalog.replace(vec![file("b", "zeta"), file("a", "alpha")]);

        let ids: Vec<_> = catalog.current().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(catalog.generation(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut catalog = FileCatalog::new();
        catalog.replace(vec![file("1", "one")]);
        let snapshot = catalog.current();

        catalog.replace(vec![file("2", "two"), file("3", "three")]);

        assert_eq!(snapshot, vec![file("1", "one")]);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("1").is_none());
        assert_eq!(catalog.get("3").map(|f| f.name.as_str()), Some("three"));
    }

    #[test]
    fn test_replace_with_empty() {
        let mut catalog = FileCatalog::new();
        catalog.replace(vec![file("1", "one")]);
        catalog.replace(Vec::new());
        assert!(catalog.is_empty());
        assert_eq!(catalog.generation(), 2);
    }
}
