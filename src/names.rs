//! Human-readable volume labels
//!
//! Volumes provisioned for a Kubernetes PVC are labelled by the claim
//! (`namespace / name`); other volumes fall back to their `Name` tag or id.

use crate::model::{Tags, VolumeTagBag};

/// Tag the EBS CSI driver sets to the claim's namespace
pub const PVC_NAMESPACE_TAG: &str = "kubernetes.io/created-for/pvc/namespace";

/// Tag the EBS CSI driver sets to the claim's name
pub const PVC_NAME_TAG: &str = "kubernetes.io/created-for/pvc/name";

/// Generic AWS name tag
pub const NAME_TAG: &str = "Name";

/// Stands in for a missing id so a label is never empty
pub const UNNAMED: &str = "(unnamed)";

/// Resolve the display name for a volume record
pub fn resolve(volume: &VolumeTagBag) -> String {
    better_name(&volume.id, &volume.tags)
}

/// Compute a display name from an id and its tags.
///
/// First match wins:
/// 1. no tags → `id`
/// 2. PVC namespace and name tags → `"<namespace> / <name>"`
/// 3. `Name` tag → `"<id> / <Name>"`
/// 4. otherwise → `id`
///
/// Empty tag values count as absent. An empty `id` reads as [`UNNAMED`].
pub fn better_name(id: &str, tags: &Tags) -> String {
    let id = if id.is_empty() { UNNAMED } else { id };
    if tags.is_empty() {
        return id.to_string();
    }

    if let (Some(namespace), Some(name)) = (tag(tags, PVC_NAMESPACE_TAG), tag(tags, PVC_NAME_TAG)) {
        return format!("{} / {}", namespace, name);
    }

    match tag(tags, NAME_TAG) {
        Some(name) => format!("{} / {}", id, name),
        None => id.to_string(),
    }
}

fn tag<'a>(tags: &'a Tags, key: &str) -> Option<&'a str> {
    tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
}
