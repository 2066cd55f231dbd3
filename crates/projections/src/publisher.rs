//! In-process fact bus and the consumer that feeds projections from it.

use std::sync::Arc;

use event_store::EventEnvelope;
use tokio::sync::broadcast;

use crate::projection::Projection;

/// Default capacity of the bus channel.
const DEFAULT_CAPACITY: usize = 256;

/// Routing topic for an event type: `documents.<lowercased type>`.
pub fn topic_for(event_type: &str) -> String {
    format!("documents.{}", event_type.to_lowercase())
}

/// A fact on the bus: the persisted envelope plus its routing topic.
#[derive(Debug, Clone)]
pub struct PublishedFact {
    pub topic: String,
    pub envelope: EventEnvelope,
}

/// Broadcast bus for persisted facts.
///
/// Delivery is best-effort per subscriber: a slow subscriber can lag and
/// lose bus messages, and recovers by catching up from the event store.
/// The store, not the bus, is the source of truth.
#[derive(Clone)]
pub struct FactBus {
    sender: broadcast::Sender<PublishedFact>,
}

impl FactBus {
    /// Creates a bus with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus with an explicit channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes persisted envelopes, in order.
    ///
    /// Publishing with no live subscribers is not an error; the facts are
    /// already durable in the store.
    pub fn publish(&self, envelopes: &[EventEnvelope]) {
        for envelope in envelopes {
            let fact = PublishedFact {
                topic: topic_for(&envelope.event_type),
                envelope: envelope.clone(),
            };
            if self.sender.send(fact).is_ok() {
                metrics::counter!("bus.facts_published").increment(1);
            }
        }
    }

    /// Subscribes to every fact published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedFact> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for FactBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Feeds bus facts to a set of projections in a background task.
///
/// A lagged receiver logs the gap and keeps going; the missed facts are
/// recovered by the next catch-up run against the store.
pub struct ProjectionConsumer {
    name: String,
    receiver: broadcast::Receiver<PublishedFact>,
    projections: Vec<Arc<dyn Projection>>,
    shutdown: broadcast::Receiver<()>,
}

impl ProjectionConsumer {
    pub fn new(
        name: impl Into<String>,
        receiver: broadcast::Receiver<PublishedFact>,
        projections: Vec<Arc<dyn Projection>>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            receiver,
            projections,
            shutdown,
        }
    }

    /// Spawns the consume loop as a background task.
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        tracing::info!(consumer = %self.name, "projection consumer started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!(consumer = %self.name, "projection consumer shutting down");
                    break;
                }
                received = self.receiver.recv() => {
                    match received {
                        Ok(fact) => self.deliver(&fact).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(
                                consumer = %self.name,
                                missed,
                                "bus receiver lagged; catch-up will recover"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!(consumer = %self.name, "fact bus closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn deliver(&self, fact: &PublishedFact) {
        for projection in &self.projections {
            if let Err(err) = projection.handle(&fact.envelope).await {
                // Keep consuming; the projection converges on rebuild.
                tracing::error!(
                    consumer = %self.name,
                    projection = projection.name(),
                    topic = %fact.topic,
                    error = %err,
                    "projection failed to handle fact"
                );
            }
        }
    }
}
