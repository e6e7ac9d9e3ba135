//! Store entry types
//!
//! These types describe positions in the tree and the typed data attached to
//! each key. [`KeySnapshot`] is the serialized form used to load a tree into a
//! [`MemoryStore`](super::MemoryStore).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Separator between path components
pub const PATH_SEPARATOR: char = '\\';

/// Join a parent path and a child name
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", parent, PATH_SEPARATOR, name)
    }
}

/// Opaque handle for a position in the tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    name: String,
    path: String,
}

impl NodeHandle {
    /// Create a handle; `path` must be fully qualified
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Last path component
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified path
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Typed value data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueData {
    /// No data
    None,
    /// String
    Sz(String),
    /// String with unexpanded environment references
    ExpandSz(String),
    /// List of strings
    MultiSz(Vec<String>),
    /// 32-bit number
    Dword(u32),
    /// 64-bit number
    Qword(u64),
    /// Raw bytes
    Binary(Vec<u8>),
}

impl ValueData {
    /// Short type label
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueData::None => "NONE",
            ValueData::Sz(_) => "SZ",
            ValueData::ExpandSz(_) => "EXPAND_SZ",
            ValueData::MultiSz(_) => "MULTI_SZ",
            ValueData::Dword(_) => "DWORD",
            ValueData::Qword(_) => "QWORD",
            ValueData::Binary(_) => "BINARY",
        }
    }
}

/// Renders the data the way it is matched against a query.
///
/// Numbers render as hex followed by the decimal value, binary data as
/// space-separated hex bytes, and string lists joined with `", "`.
impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueData::None => Ok(()),
            ValueData::Sz(s) | ValueData::ExpandSz(s) => f.write_str(s),
            ValueData::MultiSz(items) => f.write_str(&items.join(", ")),
            ValueData::Dword(n) => write!(f, "0x{:08x} ({})", n, n),
            ValueData::Qword(n) => write!(f, "0x{:016x} ({})", n, n),
            ValueData::Binary(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Serialized key tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeySnapshot {
    /// Key name (the root's name is its full path)
    pub name: String,

    /// Values by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, ValueData>,

    /// Child keys
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<KeySnapshot>,

    /// Reads of this key fail with an access error
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inaccessible: bool,
}

impl KeySnapshot {
    /// Create an empty key
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a value
    pub fn with_value(mut self, name: impl Into<String>, data: ValueData) -> Self {
        self.values.insert(name.into(), data);
        self
    }

    /// Add a child key
    pub fn with_child(mut self, child: KeySnapshot) -> Self {
        self.children.push(child);
        self
    }

    /// Mark this key as unreadable
    pub fn inaccessible(mut self) -> Self {
        self.inaccessible = true;
        self
    }

    /// Total number of keys in this subtree, including self
    pub fn key_count(&self) -> usize {
        1 + self.children.iter().map(KeySnapshot::key_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("HKLM", "Software"), r"HKLM\Software");
        assert_eq!(join_path("", "HKLM"), "HKLM");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(ValueData::Sz("abc".into()).to_string(), "abc");
        assert_eq!(ValueData::Dword(42).to_string(), "0x0000002a (42)");
        assert_eq!(ValueData::Binary(vec![0xde, 0xad]).to_string(), "de ad");
        assert_eq!(
            ValueData::MultiSz(vec!["a".into(), "b".into()]).to_string(),
            "a, b"
        );
        assert_eq!(ValueData::None.to_string(), "");
    }

    #[test]
    fn test_snapshot_json() {
        let json = r#"{
            "name": "HKCU",
            "values": { "Path": { "type": "EXPAND_SZ", "data": "%HOME%" } },
            "children": [ { "name": "Locked", "inaccessible": true } ]
        }"#;
        let snapshot: KeySnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.name, "HKCU");
        assert_eq!(
            snapshot.values.get("Path"),
            Some(&ValueData::ExpandSz("%HOME%".into()))
        );
        assert!(snapshot.children[0].inaccessible);
        assert_eq!(snapshot.key_count(), 2);
    }
}
