use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("failed to publish to topic {topic}: {reason}")]
    PublishFailed { topic: String, reason: String },
}

/// Publish-only surface the authority talks to. Bus failures are always
/// logged and swallowed by callers per spec — this trait just reports them.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), EventBusError>;
}

/// Single-process bus: one bounded mpsc channel per subscriber, fanned out
/// from a dashmap of topic -> senders. Subscribers are single-threaded per
/// topic in the reference; the contract admits more as long as consumers are
/// idempotent (envelopes carry ids).
pub struct InMemoryEventBus {
    subscribers: DashMap<String, Vec<mpsc::Sender<serde_json::Value>>>,
    capacity: usize,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self { subscribers: DashMap::new(), capacity: 256 }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { subscribers: DashMap::new(), capacity }
    }

    pub fn subscribe(&self, topic: impl Into<String>) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.entry(topic.into()).or_default().push(tx);
        rx
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), EventBusError> {
        let Some(mut senders) = self.subscribers.get_mut(topic) else {
            return Ok(());
        };
        senders.retain(|tx| !tx.is_closed());
        for tx in senders.iter() {
            if let Err(e) = tx.try_send(payload.clone()) {
                warn!(topic, error = %e, "event bus subscriber lagging, dropping one delivery");
            }
        }
        Ok(())
    }
}

/// Bus that never delivers anywhere; used where a caller needs an
/// `Arc<dyn EventBus>` but genuinely has no subscribers wired (tests, or a
/// deployment that runs the authority standalone).
pub struct NullEventBus;

#[async_trait]
impl EventBus for NullEventBus {
    async fn publish(&self, _topic: &str, _payload: serde_json::Value) -> Result<(), EventBusError> {
        Ok(())
    }
}

pub fn null_bus() -> Arc<dyn EventBus> {
    Arc::new(NullEventBus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = InMemoryEventBus::new();
        bus.publish("auth:events:login", serde_json::json!({"ok": true})).await.unwrap();
    }

    #[tokio::test]
    async fn subscriber_receives_published_payload() {
        let bus = InMemoryEventBus::new();
        let mut rx = bus.subscribe("auth:events:login");
        bus.publish("auth:events:login", serde_json::json!({"user_id": "u1"})).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received["user_id"], "u1");
    }
}
