//! Hierarchical key/value store access
//!
//! The search engine only ever talks to a store through the [`Store`] trait.
//! A store hands out [`NodeHandle`]s for paths, and enumerates a handle's
//! children and values on demand. Every call may fail per node.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    SearchEngine                      │
//! │  - resolve(root) once                               │
//! │  - children()/values() per node, semaphore-bounded  │
//! └──────────────────────────┬──────────────────────────┘
//!                            │ spawn_blocking
//!                            ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                   dyn Store                          │
//! │  - MemoryStore (snapshot files, tests)              │
//! │  - any blocking backend implementing the trait      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Store calls are blocking. The engine runs them on tokio's blocking pool so
//! a slow or serialized backend never stalls the traversal's async tasks.
//!
//! # Example
//!
//! ```
//! use regfind::store::{KeySnapshot, MemoryStore, Store, ValueData};
//!
//! let snapshot = KeySnapshot::new("HKCU")
//!     .with_child(KeySnapshot::new("Software").with_value("Theme", ValueData::Sz("dark".into())));
//! let store = MemoryStore::from_snapshot(snapshot).unwrap();
//!
//! let root = store.resolve("HKCU").unwrap();
//! let children = store.children(&root).unwrap();
//! assert_eq!(children[0].path(), r"HKCU\Software");
//! ```

pub mod memory;
pub mod types;

use crate::error::StoreResult;
use std::collections::BTreeMap;

pub use memory::MemoryStore;
pub use types::{join_path, KeySnapshot, NodeHandle, ValueData, PATH_SEPARATOR};

/// A lazily-enumerated hierarchical key/value store
///
/// Implementations own the handles they return; the engine never mutates a
/// handle and never caches one across searches.
pub trait Store: Send + Sync {
    /// Resolve a fully qualified path to a handle
    fn resolve(&self, path: &str) -> StoreResult<NodeHandle>;

    /// Enumerate the child keys of a node
    fn children(&self, node: &NodeHandle) -> StoreResult<Vec<NodeHandle>>;

    /// Enumerate the values of a node, keyed by value name
    fn values(&self, node: &NodeHandle) -> StoreResult<BTreeMap<String, ValueData>>;
}
