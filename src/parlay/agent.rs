//! Parlay Construction Agent
//!
//! Consumes `parlay.requests` and `simulation.responses`; analyzes legs
//! against cached simulation distributions, scores correlation, and
//! publishes combined-probability analysis on `parlay.responses` plus a
//! risk check request on `risk.alerts`.

use super::correlation::{combined_probability, correlation_score, CorrelationLeg};
use super::engine::recommendation_text;
use super::{LegMarket, Period};
use crate::bus::{topics, EventEnvelope, SharedPublisher};
use crate::sim::SimulationOutput;
use crate::sport::{american_to_decimal, implied_probability};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, error, info};

/// One leg of a build request, as sent by the request side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLeg {
    pub event_id: String,
    pub bet_type: LegMarket,
    #[serde(default)]
    pub sport_key: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub line: Option<f64>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default = "default_odds")]
    pub odds: i32,
}

fn default_odds() -> i32 {
    -110
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParlayBuildRequest {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    legs: Vec<RequestLeg>,
}

pub struct ParlayAgent {
    publisher: SharedPublisher,
    simulation_cache: RwLock<HashMap<String, SimulationOutput>>,
}

impl ParlayAgent {
    pub fn new(publisher: SharedPublisher) -> Self {
        Self {
            publisher,
            simulation_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cache simulation results for later leg analysis.
    pub async fn handle_simulation_response(&self, envelope: EventEnvelope) -> Result<()> {
        let output: SimulationOutput = match serde_json::from_value(envelope.data) {
            Ok(output) => output,
            Err(e) => {
                debug!(error = %e, "ignoring malformed simulation payload");
                return Ok(());
            }
        };
        debug!(event_id = %output.event_id, "cached simulation");
        self.simulation_cache
            .write()
            .insert(output.event_id.clone(), output);
        Ok(())
    }

    /// Process a parlay build request; recoverable failures become error
    /// messages on the response topic.
    pub async fn handle_parlay_request(&self, envelope: EventEnvelope) -> Result<()> {
        let request: ParlayBuildRequest = match serde_json::from_value(envelope.data) {
            Ok(request) => request,
            Err(e) => {
                self.respond_error(None, &format!("malformed parlay request: {e}"))
                    .await;
                return Ok(());
            }
        };
        let user_id = request.user_id.clone();
        debug!(kind = %request.kind, legs = request.legs.len(), "parlay request");

        if request.legs.is_empty() {
            self.respond_error(user_id.as_deref(), "No legs provided").await;
            return Ok(());
        }

        let analyzed: Vec<Value> = request.legs.iter().map(|leg| self.analyze_leg(leg)).collect();

        let correlation_legs: Vec<CorrelationLeg> = request
            .legs
            .iter()
            .map(|leg| CorrelationLeg {
                event_id: leg.event_id.clone(),
                sport_key: leg.sport_key.clone().unwrap_or_else(|| "unknown".to_string()),
                bet_type: leg.bet_type,
                period: leg.period.unwrap_or_default(),
                side: leg.side.clone(),
                team: leg.team.clone(),
            })
            .collect();
        let correlation = correlation_score(&correlation_legs);

        let leg_probs: Vec<f64> = analyzed
            .iter()
            .map(|leg| leg["true_probability"].as_f64().unwrap_or(0.5))
            .collect();
        let combined = combined_probability(&leg_probs, correlation.score);

        let parlay_odds: f64 = request
            .legs
            .iter()
            .map(|leg| american_to_decimal(leg.odds))
            .product();
        let expected_value = combined * parlay_odds - (1.0 - combined);
        let risk_score = Self::risk_score(&analyzed, correlation.score);
        let recommendation = recommendation_text(expected_value, risk_score);

        let response = json!({
            "type": "parlay_analysis",
            "user_id": user_id,
            "legs": analyzed,
            "combined_probability": (combined * 10_000.0).round() / 100.0,
            "correlation_score": (correlation.score * 1000.0).round() / 1000.0,
            "correlation_conflict": correlation.conflict,
            "risk_score": risk_score,
            "expected_value": (expected_value * 10_000.0).round() / 100.0,
            "parlay_odds": parlay_odds,
            "recommendation": recommendation,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        });

        self.publisher
            .publish(topics::PARLAY_RESPONSES, response.clone())
            .await?;
        self.publisher
            .publish(
                topics::RISK_ALERTS,
                json!({
                    "type": "parlay_risk_check",
                    "user_id": user_id,
                    "parlay_data": response,
                }),
            )
            .await?;

        info!(
            user_id = user_id.as_deref().unwrap_or("-"),
            ev = expected_value,
            "✅ parlay analysis complete"
        );
        Ok(())
    }

    /// Analyze a single leg: true probability from the cached simulation
    /// (implied probability as fallback), edge, and EV.
    fn analyze_leg(&self, leg: &RequestLeg) -> Value {
        let cache = self.simulation_cache.read();
        let sim = cache.get(&leg.event_id);

        let implied = implied_probability(leg.odds);
        let true_prob = match sim {
            None => implied,
            Some(sim) => match leg.bet_type {
                LegMarket::Moneyline => leg
                    .team
                    .as_deref()
                    .and_then(|team| sim.win_probability(team))
                    .unwrap_or(0.5),
                LegMarket::Spread => sim.cover_probability(leg.line.unwrap_or(0.0)),
                LegMarket::Total => {
                    let over = leg.side.as_deref().unwrap_or("over") == "over";
                    sim.total_probability(leg.line.unwrap_or(0.0), over)
                }
                LegMarket::PlayerProp => 0.5,
            },
        };

        let ev = true_prob * american_to_decimal(leg.odds) - 1.0;
        json!({
            "event_id": leg.event_id,
            "bet_type": leg.bet_type,
            "team": leg.team,
            "line": leg.line,
            "side": leg.side,
            "period": leg.period.unwrap_or_default(),
            "odds": leg.odds,
            "true_probability": (true_prob * 10_000.0).round() / 10_000.0,
            "implied_probability": (implied * 10_000.0).round() / 10_000.0,
            "expected_value": (ev * 10_000.0).round() / 100.0,
            "edge": ((true_prob - implied) * 10_000.0).round() / 100.0,
        })
    }

    /// Risk from leg count, correlation, and low-confidence legs.
    fn risk_score(legs: &[Value], correlation: f64) -> &'static str {
        let count = legs.len();
        if count >= 5 {
            return "EXTREME";
        }
        if count >= 4 {
            return "HIGH";
        }
        if correlation > 0.8 {
            return "HIGH";
        }
        let negative_ev = legs
            .iter()
            .any(|leg| leg["expected_value"].as_f64().unwrap_or(0.0) < 0.0);
        if negative_ev {
            return "HIGH";
        }
        if count >= 3 {
            return "MEDIUM";
        }
        "LOW"
    }

    async fn respond_error(&self, user_id: Option<&str>, message: &str) {
        error!(user_id = user_id.unwrap_or("-"), error = message, "❌ parlay request failed");
        let payload = json!({
            "type": "error",
            "user_id": user_id,
            "error": message,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        });
        if let Err(e) = self.publisher.publish(topics::PARLAY_RESPONSES, payload).await {
            error!(error = %e, "failed to publish parlay error");
        }
    }
}
