//! Agent Orchestrator
//!
//! Wires the event bus to the agents in a deterministic order, starts the
//! bus listener, and exposes the request-side façade. Agents only ever hold
//! a publish capability; subscription wiring lives here, so no agent holds
//! a back-pointer to the orchestrator.

use crate::bus::{handler, topics, SharedBus};
use crate::parlay::agent::RequestLeg;
use crate::parlay::ParlayAgent;
use crate::risk::RiskAgent;
use crate::sim::{record_simulation_output, SimulationOutput};
use crate::signals::SignalManager;
use crate::store::SharedStore;
use anyhow::Result;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct Orchestrator {
    bus: SharedBus,
    store: SharedStore,
    signal_manager: Arc<SignalManager>,
    parlay_agent: Arc<ParlayAgent>,
    risk_agent: Arc<RiskAgent>,
    shutdown: broadcast::Sender<()>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Construct the agents, subscribe them in deterministic order (parlay,
    /// then risk, then persistence), and start the bus listener.
    pub async fn start(bus: SharedBus, store: SharedStore) -> Result<Arc<Self>> {
        info!("🚀 starting agent orchestrator");

        let signal_manager = Arc::new(SignalManager::new(store.clone()));
        let parlay_agent = Arc::new(ParlayAgent::new(bus.clone()));
        let risk_agent = Arc::new(RiskAgent::new(bus.clone(), store.clone()));
        let (shutdown, _) = broadcast::channel(4);

        let orchestrator = Arc::new(Self {
            bus,
            store,
            signal_manager,
            parlay_agent,
            risk_agent,
            shutdown,
            background_tasks: Mutex::new(Vec::new()),
        });

        orchestrator.wire_subscriptions();
        orchestrator.bus.start_listening().await?;

        info!("🎯 multi-agent system online");
        Ok(orchestrator)
    }

    fn wire_subscriptions(&self) {
        // Parlay agent.
        let agent = self.parlay_agent.clone();
        self.bus.subscribe(
            topics::PARLAY_REQUESTS,
            "parlay_agent.build",
            handler(move |envelope| {
                let agent = agent.clone();
                async move { agent.handle_parlay_request(envelope).await }
            }),
        );
        let agent = self.parlay_agent.clone();
        self.bus.subscribe(
            topics::SIMULATION_RESPONSES,
            "parlay_agent.simulation_cache",
            handler(move |envelope| {
                let agent = agent.clone();
                async move { agent.handle_simulation_response(envelope).await }
            }),
        );

        // Risk agent.
        let agent = self.risk_agent.clone();
        self.bus.subscribe(
            topics::RISK_ALERTS,
            "risk_agent.checks",
            handler(move |envelope| {
                let agent = agent.clone();
                async move { agent.handle_risk_check(envelope).await }
            }),
        );
        let agent = self.risk_agent.clone();
        self.bus.subscribe(
            topics::USER_ACTIVITY,
            "risk_agent.activity",
            handler(move |envelope| {
                let agent = agent.clone();
                async move { agent.handle_user_activity(envelope).await }
            }),
        );
        let agent = self.risk_agent.clone();
        self.bus.subscribe(
            topics::PARLAY_RESPONSES,
            "risk_agent.guidance",
            handler(move |envelope| {
                let agent = agent.clone();
                async move { agent.handle_parlay_response(envelope).await }
            }),
        );
        let agent = self.risk_agent.clone();
        self.bus.subscribe(
            topics::FEEDBACK_OUTCOMES,
            "risk_agent.outcomes",
            handler(move |envelope| {
                let agent = agent.clone();
                async move { agent.handle_feedback_outcome(envelope).await }
            }),
        );

        // Simulation persistence: runs arriving on the bus feed the store
        // the scheduler reads from.
        let store = self.store.clone();
        self.bus.subscribe(
            topics::SIMULATION_RESPONSES,
            "simulation_recorder",
            handler(move |envelope| {
                let store = store.clone();
                async move {
                    let output: SimulationOutput = match serde_json::from_value(envelope.data) {
                        Ok(output) => output,
                        Err(_) => return Ok(()),
                    };
                    record_simulation_output(&store, &output).await.map(|_| ())
                }
            }),
        );
    }

    // ------------------------------------------------------------------
    // Façade
    // ------------------------------------------------------------------

    pub fn signal_manager(&self) -> Arc<SignalManager> {
        self.signal_manager.clone()
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn bus(&self) -> SharedBus {
        self.bus.clone()
    }

    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Track a background task (scheduler loops) for shutdown.
    pub fn adopt_tasks(&self, handles: Vec<JoinHandle<()>>) {
        self.background_tasks.lock().extend(handles);
    }

    /// Fire-and-forget: the analysis returns via `parlay.responses`.
    pub async fn request_parlay_analysis(
        &self,
        user_id: &str,
        legs: Vec<RequestLeg>,
    ) -> Result<Value> {
        self.bus
            .publish(
                topics::PARLAY_REQUESTS,
                json!({
                    "type": "build",
                    "user_id": user_id,
                    "legs": legs,
                }),
            )
            .await?;
        Ok(json!({"status": "processing", "message": "Parlay analysis in progress"}))
    }

    /// Ask the risk agent to validate a proposed bet size.
    pub async fn check_bet_size(&self, user_id: &str, amount: f64, bet_data: Value) -> Result<()> {
        let mut payload = json!({
            "type": "bet_size_check",
            "user_id": user_id,
            "amount": amount,
        });
        if let (Some(object), Some(extra)) = (payload.as_object_mut(), bet_data.as_object()) {
            for (key, value) in extra {
                object.entry(key.clone()).or_insert(value.clone());
            }
        }
        self.bus.publish(topics::RISK_ALERTS, payload).await
    }

    /// Feed a settled outcome back for behavioral learning.
    pub async fn record_pick_outcome(
        &self,
        user_id: &str,
        pick_id: &str,
        outcome: &str,
    ) -> Result<()> {
        self.bus
            .publish(
                topics::FEEDBACK_OUTCOMES,
                json!({
                    "user_id": user_id,
                    "pick_id": pick_id,
                    "outcome": outcome,
                }),
            )
            .await
    }

    pub async fn publish_user_activity(
        &self,
        user_id: &str,
        activity_type: &str,
        data: Value,
    ) -> Result<()> {
        let mut payload = json!({
            "user_id": user_id,
            "activity_type": activity_type,
        });
        if let (Some(object), Some(extra)) = (payload.as_object_mut(), data.as_object()) {
            for (key, value) in extra {
                object.entry(key.clone()).or_insert(value.clone());
            }
        }
        self.bus.publish(topics::USER_ACTIVITY, payload).await
    }

    /// Cancel scheduler loops, stop the bus listener, release handlers, and
    /// flush the store.
    pub async fn shutdown(&self) {
        info!("🛑 shutting down agent orchestrator");
        let _ = self.shutdown.send(());

        let tasks: Vec<JoinHandle<()>> = self.background_tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        self.bus.stop_listening().await;
        for (topic, name) in [
            (topics::PARLAY_REQUESTS, "parlay_agent.build"),
            (topics::SIMULATION_RESPONSES, "parlay_agent.simulation_cache"),
            (topics::RISK_ALERTS, "risk_agent.checks"),
            (topics::USER_ACTIVITY, "risk_agent.activity"),
            (topics::PARLAY_RESPONSES, "risk_agent.guidance"),
            (topics::FEEDBACK_OUTCOMES, "risk_agent.outcomes"),
            (topics::SIMULATION_RESPONSES, "simulation_recorder"),
        ] {
            self.bus.unsubscribe(topic, name);
        }

        if let Err(e) = self.store.ping().await {
            error!(error = %e, "store unhealthy at shutdown");
        }
        info!("✅ orchestrator shutdown complete");
    }
}

lazy_static! {
    static ref GLOBAL_ORCHESTRATOR: tokio::sync::Mutex<Option<Arc<Orchestrator>>> =
        tokio::sync::Mutex::new(None);
}

/// Process-wide singleton accessor; repeated calls return the same
/// instance. Tests construct their own [`Orchestrator`] directly with mock
/// adapters instead.
pub async fn get_orchestrator(bus: SharedBus, store: SharedStore) -> Result<Arc<Orchestrator>> {
    let mut guard = GLOBAL_ORCHESTRATOR.lock().await;
    if let Some(existing) = guard.as_ref() {
        return Ok(existing.clone());
    }
    let orchestrator = Orchestrator::start(bus, store).await?;
    *guard = Some(orchestrator.clone());
    Ok(orchestrator)
}

pub async fn shutdown_orchestrator() {
    let mut guard = GLOBAL_ORCHESTRATOR.lock().await;
    if let Some(orchestrator) = guard.take() {
        orchestrator.shutdown().await;
    }
}
