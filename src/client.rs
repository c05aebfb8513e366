//! Sync client
//!
//! Runs the channel lifecycle on a single task: connect, flush the outbound
//! queue, dispatch inbound frames in arrival order, and reconnect with
//! backoff when the connection drops. Callers talk to the loop through a
//! [`ClientHandle`]; their commands never block and are queued while the
//! channel is down.
//!
//! Every store write happens on the run loop, so dispatch is never
//! re-entered and the store keeps a single writer.

use std::future::Future;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::channel::{
    Channel, ChannelState, OutboundQueue, ReconnectConfig, Transport, WsTransport,
};
use crate::config::ClientConfig;
use crate::dispatch::{dispatch_text, DispatchOutcome};
use crate::error::{Result, SyncError};
use crate::message::OutboundCommand;
use crate::persist::FileFilterStorage;
use crate::store::Store;

/// Work the run loop accepts from handles
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Send(OutboundCommand),
    SetFilter(String),
}

/// Counters published by the run loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Successful connects (first connect plus reconnects)
    pub connects: u64,
    /// Frames routed to a reducer
    pub dispatched: u64,
    /// Frames discarded as malformed or undecodable
    pub decode_errors: u64,
    /// Frames with an unknown or missing kind
    pub unhandled: u64,
    /// Commands written to the transport
    pub sent: u64,
    /// Commands waiting for a connection
    pub queued: usize,
}

/// Cheap, cloneable access to a running client
#[derive(Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<ClientCommand>,
    cancel: CancellationToken,
    store: Store,
    state: watch::Receiver<ChannelState>,
    stats: watch::Receiver<ClientStats>,
}

impl ClientHandle {
    /// Submit a command; returns immediately whether or not connected
    pub fn send(&self, command: impl Into<OutboundCommand>) -> Result<()> {
        self.submit(ClientCommand::Send(command.into()))
    }

    /// Submit `{event: "debugButton", action, ...extra}`
    pub fn debug_button(&self, action: &str, extra: Map<String, Value>) -> Result<()> {
        self.send(OutboundCommand::debug_button(action, extra))
    }

    /// Change the volume filter on the run loop
    pub fn set_filter(&self, value: impl Into<String>) -> Result<()> {
        self.submit(ClientCommand::SetFilter(value.into()))
    }

    /// Tear the channel down and stop reconnecting
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    pub fn stats(&self) -> watch::Receiver<ClientStats> {
        self.stats.clone()
    }

    fn submit(&self, command: ClientCommand) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::ClientStopped);
        }
        self.tx.send(command).map_err(|_| SyncError::ClientStopped)
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("state", &*self.state.borrow())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

pub struct SyncClient<T: Transport> {
    channel: Channel<T>,
    store: Store,
    queue: OutboundQueue,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    tx: mpsc::UnboundedSender<ClientCommand>,
    cancel: CancellationToken,
    stats: watch::Sender<ClientStats>,
}

impl SyncClient<WsTransport> {
    /// WebSocket client for a config, with the filter persisted under its
    /// state directory
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let store = Store::new(FileFilterStorage::new(config.state_dir()));
        Ok(Self::new(
            WsTransport,
            config.endpoint()?,
            config.reconnect.clone(),
            store,
        ))
    }
}

impl<T: Transport> SyncClient<T> {
    pub fn new(transport: T, endpoint: Url, reconnect: ReconnectConfig, store: Store) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        let (stats, _rx) = watch::channel(ClientStats::default());
        Self {
            channel: Channel::new(transport, endpoint, reconnect),
            store,
            queue: OutboundQueue::new(),
            commands,
            tx,
            cancel: CancellationToken::new(),
            stats,
        }
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
            store: self.store.clone(),
            state: self.channel.subscribe_state(),
            stats: self.stats.subscribe(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run until shut down through a handle
    pub async fn run(self) -> Result<()> {
        let SyncClient {
            mut channel,
            store,
            mut queue,
            mut commands,
            tx: _tx,
            cancel,
            stats,
        } = self;

        info!(endpoint = %channel.endpoint(), "Sync client starting");
        let mut first_attempt = true;

        'session: loop {
            if !first_attempt {
                let delay = channel.next_backoff();
                let waited = serve_offline(
                    tokio::time::sleep(delay),
                    &mut commands,
                    &store,
                    &mut queue,
                    &stats,
                    &cancel,
                )
                .await;
                if waited.is_none() {
                    break 'session;
                }
            }
            first_attempt = false;

            let opened = serve_offline(
                channel.open(),
                &mut commands,
                &store,
                &mut queue,
                &stats,
                &cancel,
            )
            .await;
            match opened {
                None => break 'session,
                Some(Err(_)) => continue 'session,
                Some(Ok(_)) => {}
            }

            let connects = channel.connects();
            stats.send_modify(|s| s.connects = connects);

            let before = queue.len();
            let flushed = queue.flush(&mut channel).await;
            record_sent(&stats, before, queue.len());
            if flushed.is_err() {
                continue 'session;
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break 'session,
                    frame = channel.recv() => match frame {
                        Some(Ok(text)) => {
                            let outcome = dispatch_text(&store, &text);
                            record_outcome(&stats, &outcome);
                        }
                        // dropped; the channel already logged why
                        _ => continue 'session,
                    },
                    Some(command) = commands.recv() => match command {
                        ClientCommand::Send(command) => {
                            let before = queue.len() + 1;
                            let result = queue.submit(command, &mut channel).await;
                            record_sent(&stats, before, queue.len());
                            if result.is_err() {
                                continue 'session;
                            }
                        }
                        ClientCommand::SetFilter(value) => store.set_filter(value),
                    },
                }
            }
        }

        if !queue.is_empty() {
            info!(pending = queue.len(), "Stopping with unsent commands");
        }
        channel.close().await;
        Ok(())
    }
}

/// Drive `fut` while the channel is down: commands are queued and filter
/// changes applied. `None` when shutdown wins the race.
async fn serve_offline<F: Future>(
    fut: F,
    commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
    store: &Store,
    queue: &mut OutboundQueue,
    stats: &watch::Sender<ClientStats>,
    cancel: &CancellationToken,
) -> Option<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            out = &mut fut => return Some(out),
            Some(command) = commands.recv() => match command {
                ClientCommand::Send(command) => {
                    queue.enqueue(command);
                    let queued = queue.len();
                    debug!(queued, "Channel down, command queued");
                    stats.send_modify(|s| s.queued = queued);
                }
                ClientCommand::SetFilter(value) => store.set_filter(value),
            },
        }
    }
}

fn record_sent(stats: &watch::Sender<ClientStats>, before: usize, after: usize) {
    let sent = before.saturating_sub(after) as u64;
    stats.send_modify(|s| {
        s.sent += sent;
        s.queued = after;
    });
}

fn record_outcome(stats: &watch::Sender<ClientStats>, outcome: &DispatchOutcome) {
    stats.send_modify(|s| match outcome {
        DispatchOutcome::Applied { .. } => s.dispatched += 1,
        DispatchOutcome::Unhandled { .. } => s.unhandled += 1,
        DispatchOutcome::Rejected(_) => s.decode_errors += 1,
    });
}
