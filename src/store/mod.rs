//! Store Module - mirrored cluster state
//!
//! `Store` is the context object owned by the application root. It holds
//! every registry, the filter, the recent-event ring and the filtered view.
//! Clones share state; anyone may read or subscribe, but registry writes
//! are crate-private and only the dispatcher performs them.
//!
//! Key types:
//! - `Registry`: subscribe/update container
//! - `FilteredView`: volumes narrowed by the filter
//! - `Store`: owns all of the above plus filter persistence

mod registry;
mod view;

pub use registry::Registry;
pub use view::{filter_volumes, FilteredView};

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::event_log::RecentEvents;
use crate::model::{DebugInfo, DebugSection, PersistentVolume, PvMap, SnapshotMap, VolumeMap};
use crate::persist::{FilterStorage, MemoryFilterStorage};
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Shared handle to all mirrored state
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    volumes: Registry<VolumeMap>,
    view: FilteredView,
    snapshots: Registry<SnapshotMap>,
    pvs: Registry<PvMap>,
    debug: Registry<DebugInfo>,
    filter: Registry<String>,
    recent: Registry<RecentEvents>,
    storage: Box<dyn FilterStorage>,
    /// Held across every write to the view's inputs and the recompute
    view_lock: Mutex<()>,
}

impl Store {
    /// Create a store, restoring the persisted filter if there is one.
    ///
    /// A storage fault is logged and the filter starts empty.
    pub fn new(storage: impl FilterStorage + 'static) -> Self {
        let restored = match storage.load() {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Could not restore volume filter, using in-memory filter");
                None
            }
        };
        if let Some(value) = &restored {
            debug!(filter = %value, "Restored volume filter");
        }

        let store = Self {
            inner: Arc::new(StoreInner {
                volumes: Registry::default(),
                view: FilteredView::new(),
                snapshots: Registry::default(),
                pvs: Registry::default(),
                debug: Registry::default(),
                filter: Registry::new(restored.unwrap_or_default()),
                recent: Registry::default(),
                storage: Box::new(storage),
                view_lock: Mutex::new(()),
            }),
        };
        store.refresh_view();
        store
    }

    /// Store with a throwaway in-memory filter slot
    pub fn in_memory() -> Self {
        Self::new(MemoryFilterStorage::new())
    }

    // ═══════════════════════════════════════════
    // READS
    // ═══════════════════════════════════════════

    /// All volumes, unfiltered
    pub fn volumes(&self) -> VolumeMap {
        self.inner.volumes.get()
    }

    /// Volumes matching the current filter
    pub fn visible_volumes(&self) -> VolumeMap {
        self.inner.view.get()
    }

    pub fn snapshots(&self) -> SnapshotMap {
        self.inner.snapshots.get()
    }

    pub fn pvs(&self) -> PvMap {
        self.inner.pvs.get()
    }

    pub fn pvs_for(&self, cluster: &str) -> Option<Vec<PersistentVolume>> {
        self.inner.pvs.borrow().get(cluster).cloned()
    }

    pub fn debug_info(&self) -> DebugInfo {
        self.inner.debug.get()
    }

    pub fn filter(&self) -> String {
        self.inner.filter.get()
    }

    pub fn recent_events(&self) -> RecentEvents {
        self.inner.recent.get()
    }

    pub fn subscribe_volumes(&self) -> watch::Receiver<VolumeMap> {
        self.inner.volumes.subscribe()
    }

    pub fn subscribe_visible(&self) -> watch::Receiver<VolumeMap> {
        self.inner.view.subscribe()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<SnapshotMap> {
        self.inner.snapshots.subscribe()
    }

    pub fn subscribe_pvs(&self) -> watch::Receiver<PvMap> {
        self.inner.pvs.subscribe()
    }

    pub fn subscribe_debug(&self) -> watch::Receiver<DebugInfo> {
        self.inner.debug.subscribe()
    }

    pub fn subscribe_filter(&self) -> watch::Receiver<String> {
        self.inner.filter.subscribe()
    }

    pub fn subscribe_recent(&self) -> watch::Receiver<RecentEvents> {
        self.inner.recent.subscribe()
    }

    // ═══════════════════════════════════════════
    // FILTER
    // ═══════════════════════════════════════════

    /// Change the filter, persist it (best-effort) and refresh the view.
    ///
    /// Safe to call while a client is dispatching: filter and volume writes
    /// are serialized with the view recompute, so the view always reflects
    /// the latest pair.
    pub fn set_filter(&self, value: impl Into<String>) {
        let value = value.into();
        let _guard = self.inner.view_lock.lock();
        if *self.inner.filter.borrow() == value {
            return;
        }

        if let Err(e) = self.inner.storage.save(&value) {
            warn!(error = %e, "Could not persist volume filter, keeping it in memory");
        }
        self.inner.filter.replace(value);
        self.refresh_view();
    }

    // ═══════════════════════════════════════════
    // REDUCER WRITES (dispatcher only)
    // ═══════════════════════════════════════════

    pub(crate) fn record_event(&self, payload: Value) -> u64 {
        let mut id = 0;
        self.inner.recent.update(|log| id = log.push(payload));
        id
    }

    pub(crate) fn replace_volumes(&self, volumes: VolumeMap) {
        let _guard = self.inner.view_lock.lock();
        self.inner.volumes.replace(volumes);
        self.refresh_view();
    }

    pub(crate) fn replace_snapshots(&self, snapshots: SnapshotMap) {
        self.inner.snapshots.replace(snapshots);
    }

    pub(crate) fn replace_cluster_pvs(&self, cluster: String, pvs: Vec<PersistentVolume>) {
        self.inner.pvs.update(|all| {
            all.insert(cluster, pvs);
        });
    }

    pub(crate) fn merge_debug(&self, sections: IndexMap<String, DebugSection>) {
        self.inner.debug.update(|info| info.merge_sections(sections));
    }

    /// Callers hold `view_lock`, except during construction
    fn refresh_view(&self) {
        let filter = self.inner.filter.get();
        let all = self.inner.volumes.borrow();
        self.inner.view.recompute(&all, &filter);
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("volumes", &self.inner.volumes.borrow().len())
            .field("visible", &self.inner.view.borrow().len())
            .field("snapshots", &self.inner.snapshots.borrow().len())
            .field("clusters", &self.inner.pvs.borrow().len())
            .field("filter", &*self.inner.filter.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SyncError};
    use crate::model::{Volume, VolumeTagBag};
    use serde_json::json;

    struct BrokenStorage;

    impl FilterStorage for BrokenStorage {
        fn load(&self) -> Result<Option<String>> {
            Err(SyncError::Storage {
                reason: "unavailable".into(),
            })
        }

        fn save(&self, _value: &str) -> Result<()> {
            Err(SyncError::Storage {
                reason: "unavailable".into(),
            })
        }
    }

    fn volume_map(names: &[(&str, &str)]) -> VolumeMap {
        names
            .iter()
            .map(|(id, name)| {
                let bag = VolumeTagBag {
                    id: id.to_string(),
                    tags: [("Name".to_string(), name.to_string())].into(),
                    details: Default::default(),
                };
                (id.to_string(), Volume::from_bag(id, bag))
            })
            .collect()
    }

    #[test]
    fn restores_persisted_filter_at_startup() {
        let storage = MemoryFilterStorage::with_value("ns1");
        let store = Store::new(storage);
        assert_eq!(store.filter(), "ns1");
    }

    #[test]
    fn filter_changes_are_persisted() {
        let storage = MemoryFilterStorage::new();
        let store = Store::new(storage.clone());

        store.set_filter("db");
        assert_eq!(storage.value().as_deref(), Some("db"));

        // a fresh store over the same slot starts with the saved value
        let restarted = Store::new(storage);
        assert_eq!(restarted.filter(), "db");
    }

    #[test]
    fn broken_storage_degrades_to_memory() {
        let store = Store::new(BrokenStorage);
        assert_eq!(store.filter(), "");

        store.set_filter("abc");
        assert_eq!(store.filter(), "abc");
    }

    #[test]
    fn view_follows_filter_and_volumes() {
        let store = Store::in_memory();
        store.replace_volumes(volume_map(&[("vol-1", "alpha"), ("vol-2", "beta")]));
        assert_eq!(store.visible_volumes().len(), 2);

        store.set_filter("ALPHA");
        assert_eq!(store.visible_volumes().keys().collect::<Vec<_>>(), vec!["vol-1"]);

        store.replace_volumes(volume_map(&[("vol-3", "alphabet")]));
        assert_eq!(store.visible_volumes().keys().collect::<Vec<_>>(), vec!["vol-3"]);

        store.set_filter("");
        assert_eq!(store.visible_volumes(), store.volumes());
    }

    #[test]
    fn concurrent_filter_and_volume_writes_leave_view_consistent() {
        let store = Store::in_memory();
        let filters = ["alpha", "beta", "", "ALP"];

        std::thread::scope(|scope| {
            let writer = store.clone();
            scope.spawn(move || {
                for round in 0..2_000 {
                    let name = if round % 2 == 0 { "alpha" } else { "beta" };
                    writer.replace_volumes(volume_map(&[
                        ("vol-1", name),
                        ("vol-2", "gamma"),
                    ]));
                }
            });
            let filterer = store.clone();
            scope.spawn(move || {
                for round in 0..2_000 {
                    filterer.set_filter(filters[round % filters.len()]);
                }
            });
        });

        assert_eq!(
            store.visible_volumes(),
            filter_volumes(&store.volumes(), &store.filter())
        );
    }

    #[test]
    fn restored_filter_applies_to_first_volumes() {
        let store = Store::new(MemoryFilterStorage::with_value("beta"));
        store.replace_volumes(volume_map(&[("vol-1", "alpha"), ("vol-2", "beta")]));
        assert_eq!(store.visible_volumes().keys().collect::<Vec<_>>(), vec!["vol-2"]);
    }

    #[test]
    fn cluster_pvs_replace_only_that_cluster() {
        let store = Store::in_memory();
        let pv = |name: &str| -> PersistentVolume {
            serde_json::from_value(json!({"name": name})).unwrap()
        };

        store.replace_cluster_pvs("kube1".into(), vec![pv("a")]);
        store.replace_cluster_pvs("kube2".into(), vec![pv("b")]);
        store.replace_cluster_pvs("kube1".into(), vec![pv("c"), pv("d")]);

        assert_eq!(store.pvs_for("kube1").unwrap().len(), 2);
        assert_eq!(store.pvs_for("kube2").unwrap(), vec![pv("b")]);
        assert!(store.pvs_for("kube3").is_none());
    }

    #[test]
    fn clones_share_state() {
        let store = Store::in_memory();
        let reader = store.clone();
        store.record_event(json!({"kind": "x"}));
        assert_eq!(reader.recent_events().len(), 1);
    }

    #[test]
    fn debug_defaults_until_updated() {
        let store = Store::in_memory();
        assert_eq!(store.debug_info(), DebugInfo::default());
    }
}
