//! Delivery of domain events from the protocol state machine to their single consumer.
//!
//! The channel is bounded and FIFO. `EventSender` cannot be cloned, so there is exactly one
//! producer, and `EventStream` takes `&mut self` to receive, so there is at most one consumer
//! handling an event at any time. Events reach the consumer in the order they were emitted.

use crate::domain::event::DomainEvent;
use crate::error::{BridgeError, Result};
use tokio::sync::mpsc;

pub const DEFAULT_CAPACITY: usize = 64;

/// Producing half, owned by the state machine.
#[derive(Debug)]
pub struct EventSender {
    tx: mpsc::Sender<DomainEvent>,
}

/// Consuming half, owned by the reconciliation loop.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<DomainEvent>,
}

pub fn event_channel(capacity: usize) -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx }, EventStream { rx })
}

impl EventSender {
    /// Waits for buffer space when the consumer lags behind.
    pub async fn emit(&self, event: DomainEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

impl EventStream {
    /// Next event in emission order, or `None` once the producer is gone and the buffer drained.
    pub async fn next(&mut self) -> Option<DomainEvent> {
        self.rx.recv().await
    }
}
