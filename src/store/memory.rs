//! In-memory store backed by a [`KeySnapshot`] tree
//!
//! Keys are flattened into an arena at construction; handles are resolved by
//! path. Keys marked `inaccessible` resolve normally but fail every read, the
//! way a permission-protected key does in a live registry.

use crate::error::{Result, StoreError, StoreResult};
use crate::store::types::{join_path, KeySnapshot, NodeHandle, ValueData};
use crate::store::Store;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// A key in the arena
#[derive(Debug)]
struct MemKey {
    handle: NodeHandle,
    values: BTreeMap<String, ValueData>,
    children: Vec<usize>,
    inaccessible: bool,
}

/// Store holding a whole tree in memory
#[derive(Debug)]
pub struct MemoryStore {
    keys: Vec<MemKey>,
    by_path: HashMap<String, usize>,
    /// Simulated backend latency applied to every read
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Build a store from a snapshot; the root's name is its path
    ///
    /// Fails with [`StoreError::DuplicateKey`] when two siblings share a name.
    pub fn from_snapshot(root: KeySnapshot) -> StoreResult<Self> {
        let mut store = Self {
            keys: Vec::with_capacity(root.key_count()),
            by_path: HashMap::new(),
            latency: None,
        };
        let root_path = root.name.clone();
        store.insert(root, root_path)?;
        Ok(store)
    }

    /// Load a JSON snapshot file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let snapshot: KeySnapshot = serde_json::from_reader(BufReader::new(file))?;
        debug!(path = %path.display(), keys = snapshot.key_count(), "Loaded snapshot");
        Ok(Self::from_snapshot(snapshot)?)
    }

    /// Sleep for `latency` on every read, to mimic a slow backend
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Path of the root key
    pub fn root_path(&self) -> &str {
        self.keys[0].handle.path()
    }

    /// Number of keys in the store
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the store is empty (never true for a built store)
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn insert(&mut self, snapshot: KeySnapshot, path: String) -> StoreResult<usize> {
        let id = self.keys.len();
        match self.by_path.entry(path.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateKey { path }),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
        self.keys.push(MemKey {
            handle: NodeHandle::new(snapshot.name, path.clone()),
            values: snapshot.values,
            children: Vec::with_capacity(snapshot.children.len()),
            inaccessible: snapshot.inaccessible,
        });

        for child in snapshot.children {
            let child_path = join_path(&path, &child.name);
            let child_id = self.insert(child, child_path)?;
            self.keys[id].children.push(child_id);
        }
        Ok(id)
    }

    /// Look up a readable key for `node`
    fn readable(&self, node: &NodeHandle) -> StoreResult<&MemKey> {
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }

        let key = self
            .by_path
            .get(node.path())
            .map(|&id| &self.keys[id])
            .ok_or_else(|| StoreError::NotFound {
                path: node.path().to_string(),
            })?;

        if key.inaccessible {
            return Err(StoreError::NotAccessible {
                path: node.path().to_string(),
                reason: "access denied".into(),
            });
        }
        Ok(key)
    }
}

impl Store for MemoryStore {
    fn resolve(&self, path: &str) -> StoreResult<NodeHandle> {
        self.by_path
            .get(path)
            .map(|&id| self.keys[id].handle.clone())
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    fn children(&self, node: &NodeHandle) -> StoreResult<Vec<NodeHandle>> {
        let key = self.readable(node)?;
        Ok(key
            .children
            .iter()
            .map(|&id| self.keys[id].handle.clone())
            .collect())
    }

    fn values(&self, node: &NodeHandle) -> StoreResult<BTreeMap<String, ValueData>> {
        Ok(self.readable(node)?.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FinderError;
    use std::io::Write;

    fn sample() -> KeySnapshot {
        KeySnapshot::new("HKLM")
            .with_child(
                KeySnapshot::new("Software")
                    .with_value("Version", ValueData::Dword(7))
                    .with_child(KeySnapshot::new("Vendor")),
            )
            .with_child(KeySnapshot::new("SAM").inaccessible())
    }

    #[test]
    fn test_resolve_and_children() {
        let store = MemoryStore::from_snapshot(sample()).unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(store.root_path(), "HKLM");

        let root = store.resolve("HKLM").unwrap();
        let names: Vec<_> = store
            .children(&root)
            .unwrap()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["Software", "SAM"]);

        let vendor = store.resolve(r"HKLM\Software\Vendor").unwrap();
        assert_eq!(vendor.name(), "Vendor");
        assert!(store.children(&vendor).unwrap().is_empty());
    }

    #[test]
    fn test_inaccessible_key() {
        let store = MemoryStore::from_snapshot(sample()).unwrap();
        let sam = store.resolve(r"HKLM\SAM").unwrap();
        assert!(matches!(
            store.children(&sam),
            Err(StoreError::NotAccessible { .. })
        ));
        assert!(matches!(
            store.values(&sam),
            Err(StoreError::NotAccessible { .. })
        ));
    }

    #[test]
    fn test_missing_path() {
        let store = MemoryStore::from_snapshot(sample()).unwrap();
        assert_eq!(
            store.resolve(r"HKLM\Nope"),
            Err(StoreError::NotFound {
                path: r"HKLM\Nope".into()
            })
        );
    }

    #[test]
    fn test_load_snapshot_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&sample()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let store = MemoryStore::load(file.path()).unwrap();
        let software = store.resolve(r"HKLM\Software").unwrap();
        let values = store.values(&software).unwrap();
        assert_eq!(values.get("Version"), Some(&ValueData::Dword(7)));
    }

    #[test]
    fn test_duplicate_sibling_rejected() {
        let tree = KeySnapshot::new("root")
            .with_child(KeySnapshot::new("a").with_child(KeySnapshot::new("foo_first")))
            .with_child(KeySnapshot::new("a").with_child(KeySnapshot::new("foo_second")));

        assert_eq!(
            MemoryStore::from_snapshot(tree).unwrap_err(),
            StoreError::DuplicateKey {
                path: r"root\a".into()
            }
        );
    }

    #[test]
    fn test_load_rejects_duplicate_sibling() {
        let tree = KeySnapshot::new("HKLM")
            .with_child(KeySnapshot::new("Run"))
            .with_child(KeySnapshot::new("Run"));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&tree).unwrap().as_bytes())
            .unwrap();

        let err = MemoryStore::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            FinderError::Store(StoreError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_same_name_under_different_parents() {
        let tree = KeySnapshot::new("root")
            .with_child(KeySnapshot::new("a").with_child(KeySnapshot::new("x")))
            .with_child(KeySnapshot::new("b").with_child(KeySnapshot::new("x")));
        let store = MemoryStore::from_snapshot(tree).unwrap();
        assert_eq!(store.len(), 5);
        assert!(store.resolve(r"root\b\x").is_ok());
    }
}
