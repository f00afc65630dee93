//! Simulation Output Contract
//!
//! The engine consumes Monte-Carlo output; it never runs the numerics. Runs
//! arrive on `simulation.responses` and are persisted to the
//! `monte_carlo_simulations` collection; the scheduler reads the latest run
//! per event through [`SimulationClient`].

use crate::store::{collections, SharedStore};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::sport::evaluator::SimStats;

/// One Monte-Carlo pass over a game, as published by the simulator.
/// Distribution keys are stringified margins/totals mapped to frequencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub event_id: String,
    #[serde(default)]
    pub win_probabilities: HashMap<String, f64>,
    #[serde(default)]
    pub spread_distribution: HashMap<String, f64>,
    #[serde(default)]
    pub total_distribution: HashMap<String, f64>,
    #[serde(default)]
    pub convergence_rate: f64,
    #[serde(default)]
    pub win_prob_std: f64,
    #[serde(default)]
    pub total_std: f64,
    #[serde(default)]
    pub num_simulations: u64,
    #[serde(default)]
    pub model_version: String,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Signed model spread (+ = underdog covers). When the simulator does
    /// not report one it is derived from the margin distribution.
    #[serde(default)]
    pub model_spread: Option<f64>,
}

impl SimulationOutput {
    pub fn stats(&self) -> SimStats {
        SimStats {
            win_prob_std: self.win_prob_std,
            total_std: self.total_std,
            convergence_rate: self.convergence_rate,
        }
    }

    pub fn win_probability(&self, team: &str) -> Option<f64> {
        self.win_probabilities.get(team).copied()
    }

    /// Probability that the margin beats `line` (covering side), summed from
    /// the margin distribution. 0.5 when the distribution is missing.
    pub fn cover_probability(&self, line: f64) -> f64 {
        distribution_probability(&self.spread_distribution, |margin| margin > line)
    }

    /// Probability of the total landing over (or under) `line`.
    pub fn total_probability(&self, line: f64, over: bool) -> f64 {
        distribution_probability(&self.total_distribution, |total| {
            if over {
                total > line
            } else {
                total < line
            }
        })
    }

    /// Expected margin from the distribution, used when the simulator did
    /// not report a model spread directly.
    pub fn derived_model_spread(&self) -> Option<f64> {
        if self.spread_distribution.is_empty() {
            return None;
        }
        let mut expectation = 0.0;
        let mut mass = 0.0;
        for (margin, freq) in &self.spread_distribution {
            if let Ok(margin) = margin.parse::<f64>() {
                expectation += margin * freq;
                mass += freq;
            }
        }
        if mass > 0.0 {
            Some(expectation / mass)
        } else {
            None
        }
    }

    pub fn effective_model_spread(&self) -> Option<f64> {
        self.model_spread.or_else(|| self.derived_model_spread())
    }
}

fn distribution_probability<F: Fn(f64) -> bool>(dist: &HashMap<String, f64>, qualifies: F) -> f64 {
    if dist.is_empty() {
        return 0.5;
    }
    dist.iter()
        .filter_map(|(key, freq)| key.parse::<f64>().ok().map(|v| (v, freq)))
        .filter(|(v, _)| qualifies(*v))
        .map(|(_, freq)| freq)
        .sum()
}

/// Source of simulation runs for the scheduler. Implementations may call a
/// remote service or read runs the bus already persisted.
#[async_trait]
pub trait SimulationClient: Send + Sync {
    async fn latest_for_event(&self, event_id: &str) -> Result<Option<SimulationOutput>>;
}

/// Reads the newest persisted run for an event. The orchestrator subscribes
/// a handler on `simulation.responses` that feeds the collection, so this is
/// the default client in production wiring.
pub struct StoredSimulationClient {
    store: SharedStore,
}

impl StoredSimulationClient {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SimulationClient for StoredSimulationClient {
    async fn latest_for_event(&self, event_id: &str) -> Result<Option<SimulationOutput>> {
        let docs = self
            .store
            .find_eq(
                collections::SIMULATION_RUNS,
                "event_id",
                &serde_json::json!(event_id),
                1,
            )
            .await?;
        docs.into_iter()
            .next()
            .map(|doc| serde_json::from_value(doc).map_err(|e| anyhow!("bad simulation doc: {e}")))
            .transpose()
    }
}

/// Persist one simulation run (bus handler and tests share this path).
pub async fn record_simulation_output(store: &SharedStore, output: &SimulationOutput) -> Result<String> {
    let run_id = format!("sim_{}", &Uuid::new_v4().simple().to_string()[..12]);
    let mut doc = serde_json::to_value(output)?;
    doc["run_id"] = serde_json::json!(run_id);
    doc["created_at"] = serde_json::json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true));
    store
        .insert(collections::SIMULATION_RUNS, &run_id, doc)
        .await?;
    Ok(run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use std::sync::Arc;

    fn sample_output() -> SimulationOutput {
        let mut spread = HashMap::new();
        spread.insert("-7".to_string(), 0.2);
        spread.insert("-3".to_string(), 0.3);
        spread.insert("2".to_string(), 0.3);
        spread.insert("6".to_string(), 0.2);
        let mut total = HashMap::new();
        total.insert("210".to_string(), 0.4);
        total.insert("225".to_string(), 0.6);
        let mut wins = HashMap::new();
        wins.insert("Home".to_string(), 0.62);
        wins.insert("Away".to_string(), 0.38);
        SimulationOutput {
            event_id: "evt_1".to_string(),
            win_probabilities: wins,
            spread_distribution: spread,
            total_distribution: total,
            convergence_rate: 0.98,
            win_prob_std: 0.015,
            total_std: 0.02,
            num_simulations: 50_000,
            model_version: "v2.1".to_string(),
            seed: Some(42),
            model_spread: None,
        }
    }

    #[test]
    fn cover_probability_sums_qualifying_margins() {
        let output = sample_output();
        // Margins above -5: -3, 2, 6 → 0.8
        assert!((output.cover_probability(-5.0) - 0.8).abs() < 1e-9);
        assert!((output.cover_probability(10.0)).abs() < 1e-9);
    }

    #[test]
    fn total_probability_by_side() {
        let output = sample_output();
        assert!((output.total_probability(220.0, true) - 0.6).abs() < 1e-9);
        assert!((output.total_probability(220.0, false) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn empty_distribution_defaults_to_coin_flip() {
        let output = SimulationOutput {
            spread_distribution: HashMap::new(),
            ..sample_output()
        };
        assert_eq!(output.cover_probability(3.0), 0.5);
    }

    #[test]
    fn derives_model_spread_from_distribution() {
        let output = sample_output();
        // -7*0.2 + -3*0.3 + 2*0.3 + 6*0.2 = -0.5
        assert!((output.derived_model_spread().unwrap() + 0.5).abs() < 1e-9);
        assert!((output.effective_model_spread().unwrap() + 0.5).abs() < 1e-9);

        let explicit = SimulationOutput {
            model_spread: Some(4.5),
            ..sample_output()
        };
        assert_eq!(explicit.effective_model_spread(), Some(4.5));
    }

    #[tokio::test]
    async fn stored_client_reads_newest_run() {
        let store: SharedStore = Arc::new(MemoryDocumentStore::new());
        let client = StoredSimulationClient::new(store.clone());
        assert!(client.latest_for_event("evt_1").await.unwrap().is_none());

        let mut first = sample_output();
        first.model_version = "v1".to_string();
        record_simulation_output(&store, &first).await.unwrap();
        let mut second = sample_output();
        second.model_version = "v2".to_string();
        record_simulation_output(&store, &second).await.unwrap();

        let latest = client.latest_for_event("evt_1").await.unwrap().unwrap();
        assert_eq!(latest.model_version, "v2");
    }
}
