//! Event dispatcher
//!
//! Every inbound payload is recorded in the recent-event ring, classified by
//! its discriminant and routed to exactly one reducer. Reducers are the only
//! writers of the store's registries.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::message::InboundEvent;
use crate::model::{Volume, VolumeMap};
use crate::store::Store;

/// What a dispatch did to the store
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A reducer ran for this kind
    Applied { kind: &'static str },
    /// Recognized as a message but no reducer handles it
    Unhandled { kind: Option<String> },
    /// Decode fault; nothing was mutated
    Rejected(SyncError),
}

impl DispatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Dispatch one frame of text.
///
/// Text that is not JSON is rejected before it reaches the event ring.
pub fn dispatch_text(store: &Store, text: &str) -> DispatchOutcome {
    match InboundEvent::parse(text) {
        Ok(payload) => dispatch(store, payload),
        Err(e) => {
            warn!(error = %e, len = text.len(), "Discarding malformed inbound frame");
            DispatchOutcome::Rejected(e)
        }
    }
}

/// Dispatch one decoded payload
pub fn dispatch(store: &Store, payload: Value) -> DispatchOutcome {
    let decoded = InboundEvent::decode(&payload);
    let seq = store.record_event(payload);

    let event = match decoded {
        Ok(event) => event,
        Err(e) => {
            warn!(seq, error = %e, "Discarding undecodable event");
            return DispatchOutcome::Rejected(e);
        }
    };

    debug!(seq, kind = event.label(), "Dispatching event");
    match event {
        InboundEvent::Volumes(bags) => {
            let volumes: VolumeMap = bags
                .into_iter()
                .map(|(key, bag)| {
                    let volume = Volume::from_bag(&key, bag);
                    (key, volume)
                })
                .collect();
            debug!(count = volumes.len(), "Replacing volume registry");
            store.replace_volumes(volumes);
            DispatchOutcome::Applied { kind: "volumes" }
        }
        InboundEvent::Snapshots(snapshots) => {
            debug!(count = snapshots.len(), "Replacing snapshot registry");
            store.replace_snapshots(snapshots);
            DispatchOutcome::Applied { kind: "snapshots" }
        }
        InboundEvent::Pvs { cluster, pvs } => {
            debug!(cluster = %cluster, count = pvs.len(), "Replacing cluster PVs");
            store.replace_cluster_pvs(cluster, pvs);
            DispatchOutcome::Applied { kind: "pvs" }
        }
        InboundEvent::Debug(sections) => {
            store.merge_debug(sections);
            DispatchOutcome::Applied { kind: "debug" }
        }
        InboundEvent::Unhandled { kind } => {
            info!(seq, kind = kind.as_deref().unwrap_or("<none>"), "Unhandled event");
            DispatchOutcome::Unhandled { kind }
        }
    }
}
