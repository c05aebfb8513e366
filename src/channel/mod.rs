//! # Channel
//!
//! One duplex message connection to a single endpoint.
//!
//! The wire itself is a collaborator behind two traits:
//!
//! - [`Transport`] - opens connections to an endpoint
//! - [`Connection`] - sends and receives text frames
//!
//! [`Channel`] owns at most one live connection, publishes its
//! [`ChannelState`], and hands out reconnect delays from a
//! [`ReconnectPolicy`]. The run loop in `client` decides when to call
//! `open` again; the channel never reconnects on its own.
//!
//! ## Available Transports
//!
//! | Transport | Use Case |
//! |-----------|----------|
//! | [`WsTransport`] | Production, WebSocket via tokio-tungstenite |
//! | [`MockTransport`] | Tests, scripted peers over in-process channels |

mod backoff;
mod mock;
mod queue;
mod ws;

pub use backoff::{ReconnectConfig, ReconnectPolicy};
pub use mock::{MockListener, MockPeer, MockTransport};
pub use queue::OutboundQueue;
pub use ws::WsTransport;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, SyncError};

/// Opens connections to an endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, endpoint: &Url) -> Result<Box<dyn Connection>>;
}

/// A live duplex connection carrying text frames
#[async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame; `None` once the peer has closed
    async fn recv_text(&mut self) -> Option<Result<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Lifecycle of the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Never opened, or dropped and not yet retrying
    Idle,
    Connecting { attempt: u32 },
    Open,
    /// Waiting before the next connect attempt
    Backoff { attempt: u32, delay: Duration },
    /// Torn down; no further reconnects
    Stopped,
}

impl ChannelState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

pub struct Channel<T: Transport> {
    transport: T,
    endpoint: Url,
    policy: ReconnectPolicy,
    conn: Option<Box<dyn Connection>>,
    state: watch::Sender<ChannelState>,
    connects: u64,
}

impl<T: Transport> Channel<T> {
    pub fn new(transport: T, endpoint: Url, reconnect: ReconnectConfig) -> Self {
        let (state, _rx) = watch::channel(ChannelState::Idle);
        Self {
            transport,
            endpoint,
            policy: ReconnectPolicy::new(reconnect),
            conn: None,
            state,
            connects: 0,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn state(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Number of the next connect attempt since the last successful connect
    pub fn next_attempt(&self) -> u32 {
        self.policy.attempt() + 1
    }

    /// Successful connects so far (first connect plus every reconnect)
    pub fn connects(&self) -> u64 {
        self.connects
    }

    /// Connect if not already connected.
    ///
    /// Returns `Ok(true)` when a new connection was made; that is the
    /// "connected" signal the outbound queue flushes on. `Ok(false)` means
    /// a connection already existed and nothing happened.
    pub async fn open(&mut self) -> Result<bool> {
        if self.conn.is_some() {
            return Ok(false);
        }
        if *self.state.borrow() == ChannelState::Stopped {
            return Err(SyncError::ClientStopped);
        }

        let attempt = self.next_attempt();
        self.state.send_replace(ChannelState::Connecting { attempt });
        debug!(endpoint = %self.endpoint, attempt, "Connecting");

        match self.transport.connect(&self.endpoint).await {
            Ok(conn) => {
                self.conn = Some(conn);
                self.policy.reset();
                self.connects += 1;
                self.state.send_replace(ChannelState::Open);
                info!(endpoint = %self.endpoint, connects = self.connects, "Channel open");
                Ok(true)
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, attempt, error = %e, "Connect failed");
                self.state.send_replace(ChannelState::Idle);
                Err(e)
            }
        }
    }

    /// Send one frame. A transport error drops the connection.
    pub async fn send(&mut self, text: String) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(SyncError::NotConnected)?;
        let result = conn.send_text(text).await;
        if let Err(e) = &result {
            self.disconnect(&e.to_string());
        }
        result
    }

    /// Next inbound frame.
    ///
    /// Pending forever while closed, so it can sit in a `select!` next to
    /// other branches. `None` or an error means the connection is gone and
    /// has been dropped.
    pub async fn recv(&mut self) -> Option<Result<String>> {
        let frame = match self.conn.as_mut() {
            Some(conn) => conn.recv_text().await,
            None => std::future::pending().await,
        };
        match &frame {
            None => self.disconnect("closed by peer"),
            Some(Err(e)) => self.disconnect(&e.to_string()),
            Some(Ok(_)) => {}
        }
        frame
    }

    /// Forget the current connection after a transport fault
    pub fn disconnect(&mut self, reason: &str) {
        if self.conn.take().is_some() {
            warn!(endpoint = %self.endpoint, reason, "Channel dropped");
            self.state.send_replace(ChannelState::Idle);
        }
    }

    /// Delay before the next connect attempt.
    ///
    /// The published `Backoff` carries the number of the attempt being
    /// waited for, matching the `Connecting` state that follows it.
    pub fn next_backoff(&mut self) -> Duration {
        let delay = self.policy.next_delay();
        let attempt = self.next_attempt();
        self.state.send_replace(ChannelState::Backoff { attempt, delay });
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        delay
    }

    /// Close any connection and stop for good
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "Error while closing connection");
            }
        }
        self.state.send_replace(ChannelState::Stopped);
        info!(endpoint = %self.endpoint, "Channel stopped");
    }
}

impl<T: Transport> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &*self.state.borrow())
            .field("connects", &self.connects)
            .finish()
    }
}
