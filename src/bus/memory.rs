//! In-Process Event Bus (Observer Pattern)
//!
//! Handlers registered per topic; publish dispatches to every handler in
//! registration order, tolerating individual handler failures. Keeps a
//! bounded ring buffer of recent envelopes for diagnostics.

use super::{EventBus, EventEnvelope, Publisher, TopicHandler};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, error, info};

const MAX_EVENT_LOG: usize = 1000;

#[derive(Default)]
pub struct InMemoryBus {
    subscribers: RwLock<HashMap<String, Vec<(String, TopicHandler)>>>,
    event_log: Mutex<VecDeque<EventEnvelope>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recent envelopes, optionally filtered by topic. Diagnostics only.
    pub fn event_log(&self, topic: Option<&str>, limit: usize) -> Vec<EventEnvelope> {
        let log = self.event_log.lock();
        log.iter()
            .rev()
            .filter(|e| topic.map_or(true, |t| e.topic == t))
            .take(limit)
            .cloned()
            .collect()
    }

    fn record(&self, envelope: &EventEnvelope) {
        let mut log = self.event_log.lock();
        if log.len() >= MAX_EVENT_LOG {
            log.pop_front();
        }
        log.push_back(envelope.clone());
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, topic: &str, data: Value) -> Result<()> {
        let envelope = EventEnvelope::new(topic, data);
        self.record(&envelope);
        debug!(topic, "📤 published");

        // Snapshot handlers so a subscriber can re-subscribe from inside its
        // own callback without deadlocking the registry.
        let handlers: Vec<(String, TopicHandler)> = {
            let subscribers = self.subscribers.read();
            subscribers.get(topic).cloned().unwrap_or_default()
        };

        for (name, handler) in handlers {
            if let Err(e) = handler(envelope.clone()).await {
                error!(topic, handler = %name, error = %e, "❌ handler failed");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    fn subscribe(&self, topic: &str, name: &str, handler: TopicHandler) {
        let mut subscribers = self.subscribers.write();
        let entry = subscribers.entry(topic.to_string()).or_default();
        if let Some(existing) = entry.iter_mut().find(|(n, _)| n == name) {
            existing.1 = handler;
        } else {
            entry.push((name.to_string(), handler));
        }
        info!(topic, handler = name, "📥 subscribed");
    }

    fn unsubscribe(&self, topic: &str, name: &str) {
        let mut subscribers = self.subscribers.write();
        if let Some(entry) = subscribers.get_mut(topic) {
            entry.retain(|(n, _)| n != name);
            info!(topic, handler = name, "unsubscribed");
        }
    }

    async fn start_listening(&self) -> Result<()> {
        Ok(())
    }

    async fn stop_listening(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::handler;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn delivers_to_all_subscribers_in_order() {
        let bus = InMemoryBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let seen = seen.clone();
            let label = name.to_string();
            bus.subscribe(
                "market.movements",
                name,
                handler(move |envelope| {
                    let seen = seen.clone();
                    let label = label.clone();
                    async move {
                        seen.lock().push((label, envelope.data["n"].as_i64().unwrap()));
                        Ok(())
                    }
                }),
            );
        }

        bus.publish("market.movements", json!({"n": 1})).await.unwrap();
        bus.publish("market.movements", json!({"n": 2})).await.unwrap();

        let seen = seen.lock();
        // Per-publisher order preserved per handler.
        let firsts: Vec<i64> = seen.iter().filter(|(l, _)| l == "first").map(|(_, n)| *n).collect();
        assert_eq!(firsts, vec![1, 2]);
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn handler_failure_is_isolated() {
        let bus = InMemoryBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            "risk.alerts",
            "broken",
            handler(|_| async { Err(anyhow!("boom")) }),
        );
        let counter = delivered.clone();
        bus.subscribe(
            "risk.alerts",
            "healthy",
            handler(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        bus.publish("risk.alerts", json!({"type": "bet_size_check"}))
            .await
            .unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resubscribing_same_name_is_idempotent() {
        let bus = InMemoryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            bus.subscribe(
                "ui.updates",
                "renderer",
                handler(move |_| {
                    let count = count.clone();
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            );
        }
        bus.publish("ui.updates", json!({})).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn event_log_is_bounded() {
        let bus = InMemoryBus::new();
        for i in 0..(MAX_EVENT_LOG + 50) {
            bus.publish("user.activity", json!({"n": i})).await.unwrap();
        }
        let log = bus.event_log(None, usize::MAX);
        assert_eq!(log.len(), MAX_EVENT_LOG);
        // Newest first, oldest entries evicted.
        assert_eq!(log[0].data["n"], (MAX_EVENT_LOG + 49) as i64);

        let filtered = bus.event_log(Some("other.topic"), 10);
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_removes_handler() {
        let bus = InMemoryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        bus.subscribe(
            "feedback.outcomes",
            "tracker",
            handler(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        bus.publish("feedback.outcomes", json!({})).await.unwrap();
        bus.unsubscribe("feedback.outcomes", "tracker");
        bus.publish("feedback.outcomes", json!({})).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
