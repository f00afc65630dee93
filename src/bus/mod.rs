//! Event Bus for Multi-Agent Communication
//!
//! Topic-addressed publish/subscribe between agents. Two transports share
//! one contract: an in-process observer registry and a WebSocket broker for
//! cross-process deployment.

pub mod broker;
pub mod memory;

pub use broker::BrokerBus;
pub use memory::InMemoryBus;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Canonical topic taxonomy.
pub mod topics {
    pub const PARLAY_REQUESTS: &str = "parlay.requests";
    pub const PARLAY_RESPONSES: &str = "parlay.responses";
    pub const RISK_ALERTS: &str = "risk.alerts";
    pub const RISK_RESPONSES: &str = "risk.responses";
    pub const SIMULATION_RESPONSES: &str = "simulation.responses";
    pub const USER_ACTIVITY: &str = "user.activity";
    pub const FEEDBACK_OUTCOMES: &str = "feedback.outcomes";
    pub const MARKET_MOVEMENTS: &str = "market.movements";
    pub const UI_UPDATES: &str = "ui.updates";
}

/// Wire envelope for every bus message. Payload keys are snake_case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub topic: String,
    pub timestamp: String,
    pub data: Value,
}

impl EventEnvelope {
    pub fn new(topic: &str, data: Value) -> Self {
        Self {
            topic: topic.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            data,
        }
    }
}

pub type HandlerFuture = BoxFuture<'static, Result<()>>;

/// A topic handler. Handlers may suspend; a handler failure is isolated to
/// that handler and the event still counts as delivered.
pub type TopicHandler = Arc<dyn Fn(EventEnvelope) -> HandlerFuture + Send + Sync>;

/// Build a [`TopicHandler`] from an async closure.
pub fn handler<F, Fut>(f: F) -> TopicHandler
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |envelope| Box::pin(f(envelope)))
}

/// Publish-only capability handed to agents. Agents never hold the full bus
/// or a back-pointer to the orchestrator.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, data: Value) -> Result<()>;
}

pub type SharedPublisher = Arc<dyn Publisher>;

/// The transport contract shared by [`InMemoryBus`] and [`BrokerBus`].
///
/// Guarantees: per-publisher order within a topic, no order across topics,
/// at-most-once delivery, subscriber failures isolated.
#[async_trait]
pub trait EventBus: Publisher {
    /// Register a named handler for a topic. Re-subscribing the same name
    /// replaces the previous handler (idempotent addition).
    fn subscribe(&self, topic: &str, name: &str, handler: TopicHandler);

    fn unsubscribe(&self, topic: &str, name: &str);

    /// Start the broker listener task (no-op for the in-process transport).
    async fn start_listening(&self) -> Result<()>;

    async fn stop_listening(&self);
}

pub type SharedBus = Arc<dyn EventBus>;
