//! Risk Management
//!
//! Bankroll protection, Kelly sizing, parlay risk assessment, and tilt
//! detection, driven by bus traffic.

pub mod agent;
pub mod tilt;

pub use agent::{kelly_size, RiskAgent};
pub use tilt::{TiltAlert, TiltDetector, TiltReason};

use serde::{Deserialize, Serialize};

/// Cached per-user risk profile, sourced from the document store with
/// write-through on outcome updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRiskProfile {
    pub user_id: String,
    pub bankroll: f64,
    pub starting_bankroll: f64,
    pub avg_bet_size: f64,
    pub unit_size: f64,
    pub recent_loss_streak: u32,
}

impl UserRiskProfile {
    pub fn default_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            bankroll: 1000.0,
            starting_bankroll: 1000.0,
            avg_bet_size: 100.0,
            unit_size: 100.0,
            recent_loss_streak: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Safe,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankrollHealth {
    Healthy,
    Warning,
    Critical,
}
