//! # Sync Client Tests
//!
//! Drives `SyncClient` end to end over `MockTransport`:
//! - inbound frames reach the registries and the filtered view
//! - outbound commands survive disconnects, in order, without duplicates
//! - reconnects, decode faults and teardown

use std::time::Duration;

use kubesnap::channel::{MockListener, MockPeer};
use kubesnap::{
    ChannelState, ClientHandle, MemoryFilterStorage, MockTransport, ReconnectConfig, Store,
    SyncClient,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

// ============================================================================
// TEST HELPERS
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig::default()
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
        .with_jitter(0.0)
}

fn spawn_client(
    transport: MockTransport,
    store: Store,
) -> (ClientHandle, JoinHandle<kubesnap::Result<()>>) {
    let client = SyncClient::new(
        transport,
        Url::parse("ws://localhost:8000/api/ws").unwrap(),
        fast_reconnect(),
        store,
    );
    let handle = client.handle();
    (handle, tokio::spawn(client.run()))
}

async fn accept(listener: &mut MockListener) -> MockPeer {
    tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("timed out waiting for a connection")
        .expect("transport dropped")
}

async fn recv_json(peer: &mut MockPeer) -> Value {
    tokio::time::timeout(WAIT, peer.recv_json())
        .await
        .expect("timed out waiting for a frame")
        .expect("client closed")
}

async fn wait_for<T>(rx: &mut watch::Receiver<T>, f: impl FnMut(&T) -> bool) {
    tokio::time::timeout(WAIT, rx.wait_for(f))
        .await
        .expect("timed out waiting for state")
        .expect("sender dropped");
}

async fn stop(handle: ClientHandle, task: JoinHandle<kubesnap::Result<()>>) {
    handle.shutdown();
    tokio::time::timeout(WAIT, task)
        .await
        .expect("client did not stop")
        .unwrap()
        .unwrap();
}

fn volumes_event(entries: &[(&str, Value)]) -> Value {
    let volumes: serde_json::Map<String, Value> = entries
        .iter()
        .map(|(id, tags)| (id.to_string(), json!({"id": id, "tags": tags})))
        .collect();
    json!({"kind": "volumes", "volumes": volumes})
}

// ============================================================================
// INBOUND
// ============================================================================

#[tokio::test]
async fn volumes_event_populates_registry_and_view() {
    let (transport, mut listener) = MockTransport::new();
    let (handle, task) = spawn_client(transport, Store::in_memory());
    let peer = accept(&mut listener).await;

    let mut visible = handle.store().subscribe_visible();
    peer.send_json(volumes_event(&[
        ("vol-1", json!({})),
        (
            "vol-2",
            json!({
                "kubernetes.io/created-for/pvc/namespace": "ns",
                "kubernetes.io/created-for/pvc/name": "claim"
            }),
        ),
        ("vol-3", json!({"Name": "mydisk"})),
    ]));
    wait_for(&mut visible, |v| v.len() == 3).await;

    let names: Vec<String> = handle
        .store()
        .volumes()
        .values()
        .map(|v| v.name.clone())
        .collect();
    assert_eq!(names, vec!["vol-1", "ns / claim", "vol-3 / mydisk"]);

    stop(handle, task).await;
}

#[tokio::test]
async fn volumes_snapshot_drops_absent_ids() {
    let (transport, mut listener) = MockTransport::new();
    let (handle, task) = spawn_client(transport, Store::in_memory());
    let peer = accept(&mut listener).await;
    let mut volumes = handle.store().subscribe_volumes();

    peer.send_json(volumes_event(&[("vol-1", json!({})), ("vol-2", json!({}))]));
    wait_for(&mut volumes, |v| v.len() == 2).await;

    peer.send_json(volumes_event(&[("vol-3", json!({}))]));
    wait_for(&mut volumes, |v| v.contains_key("vol-3")).await;

    let ids: Vec<String> = handle.store().volumes().keys().cloned().collect();
    assert_eq!(ids, vec!["vol-3"]);

    stop(handle, task).await;
}

#[tokio::test]
async fn pvs_for_one_cluster_leave_others_untouched() {
    let (transport, mut listener) = MockTransport::new();
    let (handle, task) = spawn_client(transport, Store::in_memory());
    let peer = accept(&mut listener).await;
    let mut pvs = handle.store().subscribe_pvs();

    peer.send_json(json!({"event": "pvs", "cluster": "kube2", "pvs": [
        {"name": "pv-b", "capacity": "5Gi", "access_modes": ["ReadWriteOnce"], "status": "Bound"}
    ]}));
    wait_for(&mut pvs, |p| p.contains_key("kube2")).await;
    let kube2_before = handle.store().pvs_for("kube2").unwrap();

    peer.send_json(json!({"event": "pvs", "cluster": "kube1", "pvs": [{"name": "pv-a"}]}));
    wait_for(&mut pvs, |p| p.contains_key("kube1")).await;

    assert_eq!(handle.store().pvs_for("kube2").unwrap(), kube2_before);
    assert_eq!(handle.store().pvs().len(), 2);

    stop(handle, task).await;
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let (transport, mut listener) = MockTransport::new();
    let (handle, task) = spawn_client(transport.clone(), Store::in_memory());
    let peer = accept(&mut listener).await;
    let mut stats = handle.stats();

    peer.send("{definitely not json");
    peer.send_json(json!({"kind": "snapshots", "snapshots": {"snap-1": {"progress": "100%"}}}));
    wait_for(&mut stats, |s| s.dispatched == 1).await;

    let s = handle.stats().borrow().clone();
    assert_eq!(s.decode_errors, 1);
    assert_eq!(s.connects, 1);
    assert_eq!(transport.attempts(), 1);
    assert_eq!(handle.store().snapshots()["snap-1"]["progress"], "100%");
    // the malformed frame never made it into the ring
    assert_eq!(handle.store().recent_events().len(), 1);

    stop(handle, task).await;
}

#[tokio::test]
async fn unknown_kind_is_logged_not_applied() {
    let (transport, mut listener) = MockTransport::new();
    let (handle, task) = spawn_client(transport, Store::in_memory());
    let peer = accept(&mut listener).await;
    let mut stats = handle.stats();

    peer.send_json(json!({"kind": "metrics", "volumes": {"vol-1": {"id": "vol-1"}}}));
    wait_for(&mut stats, |s| s.unhandled == 1).await;

    assert!(handle.store().volumes().is_empty());
    let recent = handle.store().recent_events();
    assert_eq!(recent.newest().unwrap().kind(), Some("metrics"));

    stop(handle, task).await;
}

#[tokio::test]
async fn recent_events_keep_last_ten_newest_first() {
    let (transport, mut listener) = MockTransport::new();
    let (handle, task) = spawn_client(transport, Store::in_memory());
    let peer = accept(&mut listener).await;
    let mut recent = handle.store().subscribe_recent();

    for n in 1..=11 {
        peer.send_json(json!({"kind": "tick", "n": n}));
    }
    wait_for(&mut recent, |r| r.total() == 11).await;

    let ns: Vec<i64> = handle
        .store()
        .recent_events()
        .payloads()
        .iter()
        .map(|p| p["n"].as_i64().unwrap())
        .collect();
    assert_eq!(ns, (2..=11).rev().collect::<Vec<i64>>());

    stop(handle, task).await;
}

// ============================================================================
// OUTBOUND
// ============================================================================

#[tokio::test]
async fn commands_sent_while_disconnected_arrive_in_order_on_connect() {
    let (transport, mut listener) = MockTransport::new();
    transport.set_refusing(true);
    let (handle, task) = spawn_client(transport.clone(), Store::in_memory());
    let mut stats = handle.stats();

    for n in 1..=3 {
        handle.send(json!({"event": "debugButton", "action": "trigger", "n": n})).unwrap();
    }
    wait_for(&mut stats, |s| s.queued == 3).await;

    transport.set_refusing(false);
    let mut peer = accept(&mut listener).await;
    for n in 1..=3 {
        assert_eq!(recv_json(&mut peer).await["n"], n);
    }
    assert!(peer.try_recv().is_none());

    // nothing duplicated: the next frame is the next command
    handle.send(json!({"n": 4})).unwrap();
    assert_eq!(recv_json(&mut peer).await, json!({"n": 4}));
    wait_for(&mut stats, |s| s.sent == 4 && s.queued == 0).await;

    stop(handle, task).await;
}

#[tokio::test]
async fn drop_then_reconnect_flushes_pending_commands() {
    let (transport, mut listener) = MockTransport::new();
    let (handle, task) = spawn_client(transport, Store::in_memory());
    let mut stats = handle.stats();

    let first = accept(&mut listener).await;
    wait_for(&mut stats, |s| s.connects == 1).await;
    drop(first);

    handle.send(json!({"n": 1})).unwrap();
    handle.send(json!({"n": 2})).unwrap();

    let mut second = accept(&mut listener).await;
    assert_eq!(recv_json(&mut second).await, json!({"n": 1}));
    assert_eq!(recv_json(&mut second).await, json!({"n": 2}));
    wait_for(&mut stats, |s| s.connects == 2).await;

    stop(handle, task).await;
}

#[tokio::test]
async fn debug_button_command_reaches_server() {
    let (transport, mut listener) = MockTransport::new();
    let (handle, task) = spawn_client(transport, Store::in_memory());
    let mut peer = accept(&mut listener).await;

    let mut extra = serde_json::Map::new();
    extra.insert("cluster".into(), json!("kube1"));
    handle.debug_button("trigger", extra).unwrap();

    assert_eq!(
        recv_json(&mut peer).await,
        json!({"cluster": "kube1", "event": "debugButton", "action": "trigger"})
    );

    stop(handle, task).await;
}

// ============================================================================
// FILTER + PERSISTENCE
// ============================================================================

#[tokio::test]
async fn persisted_filter_restored_without_any_event() {
    let storage = MemoryFilterStorage::with_value("ns1");
    let (transport, _listener) = MockTransport::new();
    transport.set_refusing(true);
    let (handle, task) = spawn_client(transport, Store::new(storage));

    assert_eq!(handle.store().filter(), "ns1");
    assert!(handle.store().recent_events().is_empty());

    stop(handle, task).await;
}

#[tokio::test]
async fn set_filter_through_handle_narrows_view_and_persists() {
    let storage = MemoryFilterStorage::new();
    let (transport, mut listener) = MockTransport::new();
    let (handle, task) = spawn_client(transport, Store::new(storage.clone()));
    let peer = accept(&mut listener).await;
    let mut visible = handle.store().subscribe_visible();

    peer.send_json(volumes_event(&[
        ("vol-1", json!({"Name": "Postgres"})),
        ("vol-2", json!({"Name": "redis"})),
    ]));
    wait_for(&mut visible, |v| v.len() == 2).await;

    handle.set_filter("POST").unwrap();
    wait_for(&mut visible, |v| v.len() == 1).await;

    assert!(handle.store().visible_volumes().contains_key("vol-1"));
    assert_eq!(storage.value().as_deref(), Some("POST"));

    stop(handle, task).await;
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn shutdown_stops_reconnect_attempts() {
    let (transport, _listener) = MockTransport::new();
    transport.set_refusing(true);
    let (handle, task) = spawn_client(transport.clone(), Store::in_memory());

    tokio::time::timeout(WAIT, async {
        while transport.attempts() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("client never retried");
    stop(handle.clone(), task).await;

    let attempts = transport.attempts();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.attempts(), attempts);
    assert_eq!(*handle.state().borrow(), ChannelState::Stopped);
    assert!(handle.send(json!({})).is_err());
}

#[tokio::test]
async fn refused_connects_are_retried() {
    let (transport, mut listener) = MockTransport::new();
    transport.refuse_next(3);
    let (handle, task) = spawn_client(transport.clone(), Store::in_memory());

    let _peer = accept(&mut listener).await;
    assert_eq!(transport.attempts(), 4);
    let mut stats = handle.stats();
    wait_for(&mut stats, |s| s.connects == 1).await;

    stop(handle, task).await;
}
