//! The external event bus boundary the Stream Consumer pulls from.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A source of raw JSON payloads, standing in for a Kafka/NATS-style
/// broker subscription. Implementations commit offsets internally (or
/// have nothing to commit, as the in-memory test source does). Payloads
/// are handed to the consumer unparsed so malformed messages can be
/// dropped and counted rather than failing the whole source.
#[async_trait]
pub trait BgpEventSource: Send + Sync {
    /// Pulls the next raw message, or `None` once the source is exhausted
    /// and will never produce another message.
    async fn recv(&mut self) -> Option<String>;
}

/// Channel-backed source for tests and local running: a producer pushes
/// raw payloads via the paired [`InMemoryEventSource::channel`] sender,
/// the consumer pulls them through `recv`.
pub struct InMemoryEventSource {
    receiver: mpsc::Receiver<String>,
}

impl InMemoryEventSource {
    /// Builds a bounded channel pair; returns the source and a sender
    /// producers can clone and push onto.
    pub fn channel(capacity: usize) -> (Self, mpsc::Sender<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { receiver: rx }, tx)
    }
}

#[async_trait]
impl BgpEventSource for InMemoryEventSource {
    async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}
