//! Outbound queue
//!
//! Commands submitted while the channel is down wait here and are flushed
//! in submission order on the next connect. A command leaves the queue only
//! after the transport accepted it, so a drop mid-flush loses nothing.

use std::collections::VecDeque;

use tracing::debug;

use super::{Channel, Transport};
use crate::error::Result;
use crate::message::OutboundCommand;

#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<OutboundCommand>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command without trying to send it
    pub fn enqueue(&mut self, command: OutboundCommand) {
        self.pending.push_back(command);
    }

    /// Forward immediately when open and nothing is waiting, otherwise queue.
    ///
    /// Returns how many commands reached the transport. On a transport
    /// error the command stays queued and the error is returned.
    pub async fn submit<T: Transport>(
        &mut self,
        command: OutboundCommand,
        channel: &mut Channel<T>,
    ) -> Result<usize> {
        self.pending.push_back(command);
        if !channel.is_open() {
            debug!(queued = self.pending.len(), "Channel not open, command queued");
            return Ok(0);
        }
        self.flush(channel).await
    }

    /// Send everything in FIFO order, stopping at the first failure
    pub async fn flush<T: Transport>(&mut self, channel: &mut Channel<T>) -> Result<usize> {
        let mut sent = 0;
        while let Some(command) = self.pending.front() {
            channel.send(command.to_text()).await?;
            self.pending.pop_front();
            sent += 1;
        }
        if sent > 0 {
            debug!(sent, "Flushed outbound queue");
        }
        Ok(sent)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
