//! Parlay Portfolio Engine
//!
//! Candidate filtering, weighting, correlation, risk-profile constraints,
//! and a fallback ladder that never returns empty unless the slate is.

pub mod agent;
pub mod correlation;
pub mod engine;
pub mod weight;

pub use agent::ParlayAgent;
pub use correlation::{combined_probability, correlation_score, CorrelationLeg, CorrelationResult};
pub use engine::{
    GenerationRequest, ParlayGenerationResult, ParlayOptimizationEngine, RiskProfileConstraints,
};
pub use weight::{
    calculate_parlay_weight, check_parlay_pool_eligibility, validate_prop_integrity,
    ParlayWeight, PoolEligibility, PropIntegrityCheck, MIN_PARLAY_WEIGHT,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TruthMode {
    /// PICK only, strict gates.
    Strict,
    /// PICK + LEAN with weight penalties instead of blocks.
    Parlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskProfile {
    HighConfidence,
    Balanced,
    HighVolatility,
}

impl std::fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RiskProfile::HighConfidence => "HIGH_CONFIDENCE",
            RiskProfile::Balanced => "BALANCED",
            RiskProfile::HighVolatility => "HIGH_VOLATILITY",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrictState {
    Pick,
    Lean,
    NoPlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityBand {
    Low,
    Med,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropRiskBand {
    Low,
    Med,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1H")]
    FirstHalf,
    #[serde(rename = "2H")]
    SecondHalf,
    #[serde(rename = "full")]
    Full,
}

impl Default for Period {
    fn default() -> Self {
        Period::Full
    }
}

/// Market class of a candidate or request leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegMarket {
    Spread,
    Total,
    Moneyline,
    PlayerProp,
}

/// A slate entry the engine can weigh and select from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayLegCandidate {
    pub event_id: String,
    pub sport_key: String,
    pub market_type: LegMarket,
    pub strict_state: StrictState,
    pub win_probability: f64,
    pub edge_points: f64,
    /// Model confidence, 0-100.
    pub confidence: f64,
    pub volatility_band: VolatilityBand,
    pub distribution_stable: bool,
    #[serde(default)]
    pub variance_z: f64,
    #[serde(default)]
    pub can_parlay: bool,
    #[serde(default = "default_true")]
    pub data_integrity_pass: bool,
    #[serde(default = "default_true")]
    pub model_validity_pass: bool,
    #[serde(default = "default_true")]
    pub player_status_ok: bool,
    #[serde(default = "default_prop_band")]
    pub prop_risk_band: PropRiskBand,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default = "default_odds")]
    pub odds: i32,

    // Filled by the engine during weighting.
    #[serde(default)]
    pub parlay_weight: f64,
    #[serde(default)]
    pub parlay_eligible: bool,
    #[serde(default)]
    pub parlay_reason_codes: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_prop_band() -> PropRiskBand {
    PropRiskBand::Low
}

fn default_odds() -> i32 {
    -110
}

impl ParlayLegCandidate {
    /// A plain game-line candidate with sane defaults; tests and adapters
    /// adjust from here.
    pub fn game_line(event_id: &str, sport_key: &str, market_type: LegMarket) -> Self {
        Self {
            event_id: event_id.to_string(),
            sport_key: sport_key.to_string(),
            market_type,
            strict_state: StrictState::Pick,
            win_probability: 0.58,
            edge_points: 3.0,
            confidence: 70.0,
            volatility_band: VolatilityBand::Low,
            distribution_stable: true,
            variance_z: 0.0,
            can_parlay: true,
            data_integrity_pass: true,
            model_validity_pass: true,
            player_status_ok: true,
            prop_risk_band: PropRiskBand::Low,
            period: Period::Full,
            side: None,
            team: None,
            odds: -110,
            parlay_weight: 0.0,
            parlay_eligible: false,
            parlay_reason_codes: Vec::new(),
        }
    }
}
