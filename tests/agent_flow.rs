//! Request-side flows through the orchestrator: façade publish → bus →
//! agent → response topic. Uses the in-process bus and the memory store.

use serde_json::{json, Value};
use sharpline_backend::bus::{handler, EventBus, InMemoryBus, Publisher, SharedBus};
use sharpline_backend::orchestrator::Orchestrator;
use sharpline_backend::parlay::agent::RequestLeg;
use sharpline_backend::parlay::{LegMarket, Period};
use sharpline_backend::store::{collections, MemoryDocumentStore, SharedStore};
use std::sync::Arc;

struct Harness {
    orchestrator: Arc<Orchestrator>,
    bus: Arc<InMemoryBus>,
    captured: Arc<parking_lot::Mutex<Vec<(String, Value)>>>,
}

async fn harness() -> Harness {
    let bus = Arc::new(InMemoryBus::new());
    let store: SharedStore = Arc::new(MemoryDocumentStore::new());
    let shared_bus: SharedBus = bus.clone();
    let orchestrator = Orchestrator::start(shared_bus, store).await.unwrap();

    // Capture everything landing on the response topics.
    let captured = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for topic in ["parlay.responses", "risk.responses", "ui.updates"] {
        let sink = captured.clone();
        bus.subscribe(
            topic,
            "test_capture",
            handler(move |envelope| {
                let sink = sink.clone();
                async move {
                    sink.lock().push((envelope.topic.clone(), envelope.data));
                    Ok(())
                }
            }),
        );
    }

    Harness {
        orchestrator,
        bus,
        captured,
    }
}

fn leg(event_id: &str, bet_type: LegMarket, line: Option<f64>, odds: i32) -> RequestLeg {
    RequestLeg {
        event_id: event_id.to_string(),
        bet_type,
        sport_key: Some("nba".to_string()),
        team: None,
        line,
        side: None,
        period: Some(Period::Full),
        odds,
    }
}

#[tokio::test]
async fn parlay_request_produces_analysis_and_risk_guidance() {
    let h = harness().await;

    let status = h
        .orchestrator
        .request_parlay_analysis(
            "user_1",
            vec![
                leg("evt_1", LegMarket::Spread, Some(-5.5), -110),
                leg("evt_2", LegMarket::Total, Some(220.5), -105),
            ],
        )
        .await
        .unwrap();
    assert_eq!(status["status"], "processing");

    let captured = h.captured.lock();
    let analysis = captured
        .iter()
        .find(|(topic, data)| topic == "parlay.responses" && data["type"] == "parlay_analysis")
        .expect("parlay analysis published");
    assert_eq!(analysis.1["user_id"], "user_1");
    assert!(analysis.1["combined_probability"].as_f64().unwrap() > 0.0);
    assert!(analysis.1["recommendation"].is_string());

    // The parlay agent's risk.alerts request flows into the risk agent,
    // which answers with an assessment; guidance rides parlay.responses.
    assert!(captured
        .iter()
        .any(|(topic, data)| topic == "risk.responses"
            && data["type"] == "parlay_risk_assessment"));
    assert!(captured
        .iter()
        .any(|(topic, data)| topic == "risk.responses"
            && data["type"] == "parlay_risk_guidance"));
}

#[tokio::test]
async fn bet_size_check_flags_danger_for_oversized_bets() {
    let h = harness().await;

    // Default profile: bankroll 1000, avg bet 100. A 400 bet is 40% of
    // bankroll and 4x average.
    h.orchestrator
        .check_bet_size(
            "user_1",
            400.0,
            json!({"win_probability": 0.55, "odds": -110}),
        )
        .await
        .unwrap();

    let captured = h.captured.lock();
    let (_, assessment) = captured
        .iter()
        .find(|(topic, data)| topic == "risk.responses" && data["type"] == "bet_size_assessment")
        .expect("bet size assessment published");
    assert_eq!(assessment["alert_level"], "DANGER");
    let alerts = assessment["alerts"].as_array().unwrap();
    assert!(alerts.iter().any(|a| a.as_str().unwrap().contains("x your average")));
    assert!(alerts.iter().any(|a| a.as_str().unwrap().contains("% of bankroll")));
    assert!(assessment["recommended_size"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn pick_outcomes_feed_back_into_risk_profiles() {
    let h = harness().await;
    for pick in ["p1", "p2", "p3"] {
        h.orchestrator
            .record_pick_outcome("user_1", pick, "loss")
            .await
            .unwrap();
    }

    // Three straight losses: the next tracked bet trips the loss-streak
    // advisory.
    h.orchestrator
        .publish_user_activity("user_1", "bet_placed", json!({"amount": 100.0}))
        .await
        .unwrap();

    let captured = h.captured.lock();
    let (_, alert) = captured
        .iter()
        .find(|(topic, data)| topic == "risk.responses" && data["type"] == "tilt_alert")
        .expect("tilt alert published");
    assert_eq!(alert["reason"], "LOSS_STREAK");
}

#[tokio::test]
async fn simulation_responses_are_persisted_for_the_scheduler() {
    let h = harness().await;
    let bus: SharedBus = h.bus.clone();
    bus.publish(
        "simulation.responses",
        json!({
            "event_id": "evt_9",
            "win_probabilities": {"Home": 0.61},
            "spread_distribution": {"-3": 0.4, "4": 0.6},
            "total_distribution": {},
            "convergence_rate": 0.97,
            "win_prob_std": 0.015,
            "total_std": 0.02,
            "num_simulations": 50000,
            "model_version": "v3.1",
        }),
    )
    .await
    .unwrap();

    let runs = h
        .orchestrator
        .store()
        .find_eq(
            collections::SIMULATION_RUNS,
            "event_id",
            &json!("evt_9"),
            10,
        )
        .await
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["model_version"], "v3.1");
}

#[tokio::test]
async fn shutdown_unsubscribes_the_agents() {
    let h = harness().await;
    h.orchestrator.shutdown().await;

    h.orchestrator
        .request_parlay_analysis("user_1", vec![leg("evt_1", LegMarket::Spread, Some(-3.5), -110)])
        .await
        .unwrap();
    let captured = h.captured.lock();
    assert!(!captured
        .iter()
        .any(|(topic, data)| topic == "parlay.responses" && data["type"] == "parlay_analysis"));
}
