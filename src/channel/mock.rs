//! Mock transport for testing
//!
//! Every successful connect hands a [`MockPeer`] to the [`MockListener`],
//! which plays the server: it pushes inbound frames and reads what the
//! client sent. Dropping the peer closes the connection.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use super::{Connection, Transport};
use crate::error::{Result, SyncError};

#[derive(Debug, Default)]
struct MockState {
    /// Refuse every connect while set
    refusing: bool,
    /// Refuse this many more connects, then accept
    refusals: u32,
    /// Total connect calls, refused or not
    attempts: u32,
}

/// Transport whose connections are in-process channels
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    accepted: mpsc::UnboundedSender<MockPeer>,
}

/// Receives the server side of each accepted connection
pub struct MockListener {
    rx: mpsc::UnboundedReceiver<MockPeer>,
}

/// Server side of one mock connection
pub struct MockPeer {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

struct MockConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl MockTransport {
    pub fn new() -> (Self, MockListener) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let transport = Self {
            state: Arc::new(Mutex::new(MockState::default())),
            accepted,
        };
        (transport, MockListener { rx })
    }

    /// Refuse (or stop refusing) all connects
    pub fn set_refusing(&self, refusing: bool) {
        self.state.lock().refusing = refusing;
    }

    /// Refuse the next `n` connects
    pub fn refuse_next(&self, n: u32) {
        self.state.lock().refusals = n;
    }

    /// Connect calls so far, including refused ones
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, endpoint: &Url) -> Result<Box<dyn Connection>> {
        {
            let mut state = self.state.lock();
            state.attempts += 1;
            if state.refusing || state.refusals > 0 {
                state.refusals = state.refusals.saturating_sub(1);
                return Err(SyncError::ConnectFailed {
                    endpoint: endpoint.to_string(),
                    reason: "connection refused (mock)".into(),
                });
            }
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        // a dropped listener just means nobody plays the server
        let _ = self.accepted.send(MockPeer {
            to_client,
            from_client,
        });
        Ok(Box::new(MockConnection { inbound, outbound }))
    }
}

impl MockListener {
    /// Wait for the next accepted connection
    pub async fn accept(&mut self) -> Option<MockPeer> {
        self.rx.recv().await
    }
}

impl MockPeer {
    /// Push a raw text frame to the client
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.to_client.send(text.into()).is_ok()
    }

    /// Push a JSON frame to the client
    pub fn send_json(&self, payload: Value) -> bool {
        self.send(payload.to_string())
    }

    /// Next frame the client sent; `None` once the client side is gone
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame the client sent, parsed as JSON
    pub async fn recv_json(&mut self) -> Option<Value> {
        let text = self.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Frame the client already sent, without waiting
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outbound.send(text).map_err(|_| SyncError::Transport {
            reason: "peer closed (mock)".into(),
        })
    }

    async fn recv_text(&mut self) -> Option<Result<String>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.inbound.close();
        Ok(())
    }
}
