use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{ArtifactCatalog, ArtifactExporter, ArtifactImporter};
use crate::error::{Error, Result};

const INDEX: &str = "index.json";
const EXT: &str = "ss3";

#[derive(Debug, Serialize, Deserialize)]
struct Index {
    #[serde(default = "first_id")]
    next_id: u64,
    #[serde(default)]
    aliases: BTreeMap<String, u64>,
}

fn first_id() -> u64 {
    1
}

/// Artifact backend kept in a plain directory.
///
/// Layout:
/// - `<root>/<id>.ss3` artifact payloads
/// - `<root>/index.json` alias table and id counter
/// - `<root>/cache/<id>/` rendered output, dropped by [`clear_cache`](ArtifactImporter::clear_cache)
pub struct DirectoryStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl DirectoryStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn payload(&self, id: u64) -> PathBuf {
        self.root.join(format!("{id}.{EXT}"))
    }

    fn cache_dir(&self, id: u64) -> PathBuf {
        self.root.join("cache").join(id.to_string())
    }

    fn read_index(&self) -> Result<Index> {
        match fs::read_to_string(self.root.join(INDEX)) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Index {
                next_id: first_id(),
                aliases: BTreeMap::new(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn write_index(&self, index: &Index) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(serde_json::to_string_pretty(index)?.as_bytes())?;
        tmp.persist(self.root.join(INDEX)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Store `bytes` as a new artifact aliased to `slug`, returning its id.
    pub fn add(&self, slug: &str, bytes: &[u8]) -> Result<u64> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut index = self.read_index()?;
        let id = index.next_id;
        index.next_id += 1;
        fs::write(self.payload(id), bytes)?;
        fs::create_dir_all(self.cache_dir(id))?;
        index.aliases.insert(slug.to_string(), id);
        self.write_index(&index)?;
        Ok(id)
    }

    pub fn exists(&self, id: u64) -> bool {
        self.payload(id).is_file()
    }

    pub fn read(&self, id: u64) -> Result<Vec<u8>> {
        Ok(fs::read(self.payload(id))?)
    }

    pub fn has_cache(&self, id: u64) -> bool {
        self.cache_dir(id).exists()
    }
}

impl ArtifactCatalog for DirectoryStore {
    fn resolve_id(&self, slug: &str) -> Result<Option<u64>> {
        let index = self.read_index()?;
        Ok(index
            .aliases
            .get(slug)
            .copied()
            .filter(|id| self.exists(*id)))
    }
}

impl ArtifactExporter for DirectoryStore {
    fn export(&self, id: u64) -> Result<PathBuf> {
        if !self.exists(id) {
            return Err(Error::backend(format!("project {id} not found")));
        }
        let tmp = tempfile::Builder::new()
            .prefix("ssgs-export-")
            .suffix(&format!(".{EXT}"))
            .tempfile()?;
        fs::copy(self.payload(id), tmp.path())?;
        let (_file, path) = tmp.keep().map_err(|e| e.error)?;
        Ok(path)
    }
}

impl ArtifactImporter for DirectoryStore {
    fn import(&self, path: &Path) -> Result<Option<u64>> {
        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            return Err(Error::backend(format!("{} is empty", path.display())));
        }
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut index = self.read_index()?;
        let id = index.next_id;
        index.next_id += 1;
        fs::write(self.payload(id), &bytes)?;
        fs::create_dir_all(self.cache_dir(id))?;
        self.write_index(&index)?;
        Ok(Some(id))
    }

    fn delete(&self, id: u64) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut index = self.read_index()?;
        index.aliases.retain(|_, v| *v != id);
        self.write_index(&index)?;
        match fs::remove_file(self.payload(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let cache = self.cache_dir(id);
        if cache.exists() {
            fs::remove_dir_all(cache)?;
        }
        Ok(())
    }

    fn update_alias(&self, id: u64, slug: &str) -> Result<()> {
        if !self.exists(id) {
            return Err(Error::backend(format!("project {id} not found")));
        }
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut index = self.read_index()?;
        index.aliases.insert(slug.to_string(), id);
        self.write_index(&index)
    }

    fn clear_cache(&self, id: u64) -> Result<()> {
        if !self.exists(id) {
            return Err(Error::backend(format!("project {id} not found")));
        }
        let cache = self.cache_dir(id);
        if cache.exists() {
            fs::remove_dir_all(cache)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn export_produces_a_copy() {
        let td = tempdir().unwrap();
        let store = DirectoryStore::open(td.path()).unwrap();
        let id = store.add("hero", b"slides").unwrap();
        assert_eq!(store.resolve_id("hero").unwrap(), Some(id));

        let out = store.export(id).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"slides");
        fs::remove_file(out).unwrap();
        assert!(store.exists(id));
    }

    #[test]
    fn export_of_missing_id_fails() {
        let td = tempdir().unwrap();
        let store = DirectoryStore::open(td.path()).unwrap();
        assert!(store.export(42).is_err());
    }

    #[test]
    fn import_assigns_fresh_ids_and_alias_is_explicit() {
        let td = tempdir().unwrap();
        let store = DirectoryStore::open(td.path().join("store")).unwrap();
        let file = td.path().join("hero.ss3");
        fs::write(&file, b"v1").unwrap();

        let a = store.import(&file).unwrap().unwrap();
        let b = store.import(&file).unwrap().unwrap();
        assert_ne!(a, b);
        assert_eq!(store.resolve_id("hero").unwrap(), None);

        store.update_alias(b, "hero").unwrap();
        assert_eq!(store.resolve_id("hero").unwrap(), Some(b));
    }

    #[test]
    fn import_rejects_empty_file() {
        let td = tempdir().unwrap();
        let store = DirectoryStore::open(td.path().join("store")).unwrap();
        let file = td.path().join("empty.ss3");
        fs::write(&file, b"").unwrap();
        assert!(store.import(&file).is_err());
    }

    #[test]
    fn delete_drops_payload_alias_and_cache() {
        let td = tempdir().unwrap();
        let store = DirectoryStore::open(td.path()).unwrap();
        let id = store.add("hero", b"x").unwrap();
        assert!(store.has_cache(id));

        store.delete(id).unwrap();
        assert!(!store.exists(id));
        assert!(!store.has_cache(id));
        assert_eq!(store.resolve_id("hero").unwrap(), None);
    }

    #[test]
    fn clear_cache_keeps_payload() {
        let td = tempdir().unwrap();
        let store = DirectoryStore::open(td.path()).unwrap();
        let id = store.add("hero", b"x").unwrap();
        store.clear_cache(id).unwrap();
        assert!(store.exists(id));
        assert!(!store.has_cache(id));
        assert!(store.clear_cache(id + 1).is_err());
    }
}
