//! Cross-Process Event Bus (WebSocket broker transport)
//!
//! Identical contract to the in-process bus, carried over a long-lived
//! WebSocket connection to a message broker. The worker task owns the
//! connection: it replays subscriptions after every reconnect, forwards
//! published envelopes as text frames, and dispatches inbound frames to the
//! local handler registry.

use super::{EventBus, EventEnvelope, Publisher, TopicHandler};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const COMMAND_QUEUE_DEPTH: usize = 1024;
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug)]
enum BrokerCommand {
    Publish(EventEnvelope),
    Subscribe(String),
}

pub struct BrokerBus {
    url: String,
    cmd_tx: mpsc::Sender<BrokerCommand>,
    cmd_rx: Mutex<Option<mpsc::Receiver<BrokerCommand>>>,
    subscribers: Arc<RwLock<HashMap<String, Vec<(String, TopicHandler)>>>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BrokerBus {
    pub fn new(url: &str) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        Self {
            url: url.to_string(),
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    async fn run_worker(
        url: String,
        mut cmd_rx: mpsc::Receiver<BrokerCommand>,
        subscribers: Arc<RwLock<HashMap<String, Vec<(String, TopicHandler)>>>>,
        running: Arc<AtomicBool>,
    ) {
        let mut reconnect_delay = Duration::from_secs(1);

        while running.load(Ordering::SeqCst) {
            match Self::connect_and_stream(&url, &mut cmd_rx, &subscribers, &running).await {
                Ok(_) => {
                    reconnect_delay = Duration::from_secs(1);
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "broker connection lost; reconnecting");
                    sleep(reconnect_delay).await;
                    reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
                }
            }
        }
        info!("broker worker stopped");
    }

    async fn connect_and_stream(
        url: &str,
        cmd_rx: &mut mpsc::Receiver<BrokerCommand>,
        subscribers: &Arc<RwLock<HashMap<String, Vec<(String, TopicHandler)>>>>,
        running: &Arc<AtomicBool>,
    ) -> Result<()> {
        info!(url, "🔌 connecting to event broker");
        let (ws_stream, _) = connect_async(url).await.context("connect broker ws")?;
        info!("✅ event broker connected");

        let (mut write, mut read) = ws_stream.split();

        // Replay every known subscription so a reconnect is transparent.
        let topics: Vec<String> = {
            let subs = subscribers.read();
            subs.keys().cloned().collect()
        };
        for topic in topics {
            let frame = serde_json::json!({"op": "subscribe", "topic": topic});
            write
                .send(Message::Text(frame.to_string()))
                .await
                .context("send subscribe frame")?;
        }

        loop {
            tokio::select! {
                command = cmd_rx.recv() => {
                    match command {
                        Some(BrokerCommand::Publish(envelope)) => {
                            let raw = serde_json::to_string(&envelope)?;
                            write.send(Message::Text(raw)).await.context("send publish frame")?;
                            debug!(topic = %envelope.topic, "📤 published to broker");
                        }
                        Some(BrokerCommand::Subscribe(topic)) => {
                            let frame = serde_json::json!({"op": "subscribe", "topic": topic});
                            write.send(Message::Text(frame.to_string())).await
                                .context("send subscribe frame")?;
                        }
                        None => return Ok(()),
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(raw))) => {
                            Self::dispatch(&raw, subscribers).await;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            write.send(Message::Pong(payload)).await.ok();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(anyhow!("broker closed connection"));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(anyhow!("broker read error: {e}")),
                    }
                }
                _ = async {
                    while running.load(Ordering::SeqCst) {
                        sleep(Duration::from_millis(200)).await;
                    }
                } => {
                    return Ok(());
                }
            }
        }
    }

    async fn dispatch(
        raw: &str,
        subscribers: &Arc<RwLock<HashMap<String, Vec<(String, TopicHandler)>>>>,
    ) {
        let envelope: EventEnvelope = match serde_json::from_str(raw) {
            Ok(e) => e,
            Err(e) => {
                error!(error = %e, "❌ invalid broker frame");
                return;
            }
        };

        let handlers: Vec<(String, TopicHandler)> = {
            let subs = subscribers.read();
            subs.get(&envelope.topic).cloned().unwrap_or_default()
        };

        for (name, handler) in handlers {
            if let Err(e) = handler(envelope.clone()).await {
                error!(topic = %envelope.topic, handler = %name, error = %e, "❌ handler failed");
            }
        }
    }
}

#[async_trait]
impl Publisher for BrokerBus {
    async fn publish(&self, topic: &str, data: Value) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(anyhow!("event broker not listening"));
        }
        let envelope = EventEnvelope::new(topic, data);
        self.cmd_tx
            .send(BrokerCommand::Publish(envelope))
            .await
            .map_err(|_| anyhow!("broker worker gone"))?;
        Ok(())
    }
}

#[async_trait]
impl EventBus for BrokerBus {
    fn subscribe(&self, topic: &str, name: &str, handler: TopicHandler) {
        let is_new_topic = {
            let mut subs = self.subscribers.write();
            let entry = subs.entry(topic.to_string()).or_default();
            let was_empty = entry.is_empty();
            if let Some(existing) = entry.iter_mut().find(|(n, _)| n == name) {
                existing.1 = handler;
            } else {
                entry.push((name.to_string(), handler));
            }
            was_empty
        };
        info!(topic, handler = name, "📥 subscribed");

        if is_new_topic && self.running.load(Ordering::SeqCst) {
            // Best effort; the worker replays all topics on reconnect anyway.
            let _ = self.cmd_tx.try_send(BrokerCommand::Subscribe(topic.to_string()));
        }
    }

    fn unsubscribe(&self, topic: &str, name: &str) {
        let mut subs = self.subscribers.write();
        if let Some(entry) = subs.get_mut(topic) {
            entry.retain(|(n, _)| n != name);
        }
    }

    async fn start_listening(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("broker listener already running");
            return Ok(());
        }
        let cmd_rx = self
            .cmd_rx
            .lock()
            .take()
            .ok_or_else(|| anyhow!("broker listener cannot be restarted"))?;

        let url = self.url.clone();
        let subscribers = self.subscribers.clone();
        let running = self.running.clone();
        let handle = tokio::spawn(async move {
            Self::run_worker(url, cmd_rx, subscribers, running).await;
        });
        *self.worker.lock() = Some(handle);
        info!("🎧 event broker listener started");
        Ok(())
    }

    async fn stop_listening(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        info!("event broker listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_before_listening_is_an_error() {
        let bus = BrokerBus::new("ws://127.0.0.1:1/bus");
        let err = bus
            .publish("ui.updates", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not listening"));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let bus = BrokerBus::new("ws://127.0.0.1:1/bus");
        bus.stop_listening().await;
        bus.stop_listening().await;
    }
}
