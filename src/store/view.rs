//! Filtered view of the volume registry
//!
//! Recomputed synchronously whenever the volumes or the filter change, so
//! it is never stale at the next read.

use tokio::sync::watch;

use super::registry::Registry;
use crate::model::VolumeMap;

/// Volumes whose name contains `filter`, case-insensitively.
///
/// An empty filter returns every volume. Source order is preserved.
pub fn filter_volumes(all: &VolumeMap, filter: &str) -> VolumeMap {
    let needle = filter.to_lowercase();
    if needle.is_empty() {
        return all.clone();
    }

    all.iter()
        .filter(|(_, volume)| volume.name.to_lowercase().contains(&needle))
        .map(|(id, volume)| (id.clone(), volume.clone()))
        .collect()
}

/// Derived registry depending on {volumes, filter}
#[derive(Debug, Default)]
pub struct FilteredView {
    derived: Registry<VolumeMap>,
}

impl FilteredView {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn recompute(&self, all: &VolumeMap, filter: &str) {
        self.derived.replace(filter_volumes(all, filter));
    }

    pub fn subscribe(&self) -> watch::Receiver<VolumeMap> {
        self.derived.subscribe()
    }

    pub fn get(&self) -> VolumeMap {
        self.derived.get()
    }

    pub fn borrow(&self) -> watch::Ref<'_, VolumeMap> {
        self.derived.borrow()
    }
}
