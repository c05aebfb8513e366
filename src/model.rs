//! Domain types mirrored from the snapshot manager
//!
//! Snapshot records are opaque `Value`s. Volumes carry the tag bag the
//! name resolver reads, plus whatever extra fields the server sends.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::names;

/// Volume id → Volume, in server insertion order
pub type VolumeMap = IndexMap<String, Volume>;

/// Snapshot id → opaque snapshot record
pub type SnapshotMap = IndexMap<String, Value>;

/// Cluster name → PV listing for that cluster
pub type PvMap = BTreeMap<String, Vec<PersistentVolume>>;

/// Volume tags (AWS-style key/value pairs)
pub type Tags = BTreeMap<String, String>;

/// Volume record as sent by the server, before naming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeTagBag {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tags: Tags,
    /// Everything else the server attaches (state, size, attachments, ...)
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// A volume as held in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub tags: Tags,
    /// Cached projection of `tags`, recomputed on every registry write
    pub name: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Volume {
    /// Build a registry entry, resolving the display name from the tags.
    ///
    /// `key` is the mapping key the record arrived under; it stands in for
    /// the id when the record omits one.
    pub fn from_bag(key: &str, mut bag: VolumeTagBag) -> Self {
        if bag.id.is_empty() {
            bag.id = key.to_string();
        }
        // a stale server-side name must not shadow the resolved one
        bag.details.remove("name");
        let name = names::better_name(&bag.id, &bag.tags);
        Self {
            id: bag.id,
            tags: bag.tags,
            name,
            details: bag.details,
        }
    }
}

/// Persistent volume listing entry.
///
/// Only `name` is read here. Everything else (capacity, access_modes,
/// claim, status, ...) is kept exactly as the server sent it, nulls included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentVolume {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// `null` or a missing value becomes `T::default()`
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Strings pass through, `null` is empty, anything else is rendered as JSON
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Values and action buttons for one cluster's debug panel
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebugSection {
    #[serde(default)]
    pub values: Map<String, Value>,
    /// Button label → command template sent back as a `debugButton` command
    #[serde(default)]
    pub buttons: Map<String, Value>,
}

/// Debug panel data, keyed by cluster id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub names: Vec<String>,
    pub sections: IndexMap<String, DebugSection>,
}

impl DebugInfo {
    /// Clusters shown before the server has reported anything
    pub const DEFAULT_CLUSTERS: [&'static str; 2] = ["kube1", "kube2"];

    /// Merge per-cluster sections; unseen clusters are appended to `names`
    pub fn merge_sections(&mut self, sections: IndexMap<String, DebugSection>) {
        for (cluster, section) in sections {
            if !self.names.iter().any(|n| n == &cluster) {
                self.names.push(cluster.clone());
            }
            self.sections.insert(cluster, section);
        }
    }
}

impl Default for DebugInfo {
    fn default() -> Self {
        let mut sections = IndexMap::new();
        for cluster in Self::DEFAULT_CLUSTERS {
            let mut values = Map::new();
            values.insert("state".into(), json!("SLEEP"));
            let mut buttons = Map::new();
            buttons.insert("trigger".into(), json!({ "cluster": cluster }));
            sections.insert(cluster.to_string(), DebugSection { values, buttons });
        }
        Self {
            names: Self::DEFAULT_CLUSTERS.iter().map(|s| s.to_string()).collect(),
            sections,
        }
    }
}
