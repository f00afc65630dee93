//! Sport-Agnostic Edge Core
//!
//! Shared market vocabulary, probability compression, odds conversion, the
//! per-sport threshold registry, the edge evaluation pipeline, sharp-side
//! selection, and pure grading functions.

pub mod config;
pub mod evaluator;
pub mod grading;
pub mod sharp_side;

pub use config::{sport_config, MarketThresholds, SportConfig};
pub use evaluator::{evaluate_market, Confirmations, MarketEvaluation, MarketInputs, SimStats};
pub use grading::{grade_moneyline, grade_parlay, grade_spread, grade_total, BetResult};
pub use sharp_side::{
    select_sharp_side_moneyline, select_sharp_side_spread, select_sharp_side_total,
    validate_sharp_side_alignment, SharpAction, SharpSideSelection,
};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Mlb,
    Nba,
    Ncaab,
    Ncaaf,
    Nfl,
    Nhl,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Mlb => "mlb",
            Sport::Nba => "nba",
            Sport::Ncaab => "ncaab",
            Sport::Ncaaf => "ncaaf",
            Sport::Nfl => "nfl",
            Sport::Nhl => "nhl",
        }
    }

    pub fn parse(s: &str) -> Option<Sport> {
        match s.to_ascii_lowercase().as_str() {
            "mlb" => Some(Sport::Mlb),
            "nba" => Some(Sport::Nba),
            "ncaab" => Some(Sport::Ncaab),
            "ncaaf" => Some(Sport::Ncaaf),
            "nfl" => Some(Sport::Nfl),
            "nhl" => Some(Sport::Nhl),
            _ => None,
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketKey {
    Spread,
    Total,
    Moneyline,
    Puckline,
    Prop,
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketKey::Spread => "SPREAD",
            MarketKey::Total => "TOTAL",
            MarketKey::Moneyline => "MONEYLINE",
            MarketKey::Puckline => "PUCKLINE",
            MarketKey::Prop => "PROP",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeState {
    Edge,
    Lean,
    NoPlay,
}

impl EdgeState {
    pub fn is_playable(&self) -> bool {
        matches!(self, EdgeState::Edge | EdgeState::Lean)
    }
}

impl fmt::Display for EdgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeState::Edge => "EDGE",
            EdgeState::Lean => "LEAN",
            EdgeState::NoPlay => "NO_PLAY",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl fmt::Display for VolatilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolatilityLevel::Low => "LOW",
            VolatilityLevel::Medium => "MEDIUM",
            VolatilityLevel::High => "HIGH",
            VolatilityLevel::Extreme => "EXTREME",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionFlag {
    Stable,
    Unstable,
    UnstableExtreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TotalSide {
    Over,
    Under,
}

impl fmt::Display for TotalSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TotalSide::Over => "OVER",
            TotalSide::Under => "UNDER",
        })
    }
}

/// Regress a raw simulation probability toward 0.5 by the sport's
/// compression factor. Counters overconfidence in simulation output.
pub fn compress_probability(raw_prob: f64, compression_factor: f64) -> f64 {
    0.5 + (raw_prob - 0.5) * compression_factor
}

/// American odds to implied probability. -150 → 0.60, +130 → 0.4348.
pub fn implied_probability(american_odds: i32) -> f64 {
    if american_odds < 0 {
        let o = american_odds.abs() as f64;
        o / (o + 100.0)
    } else {
        100.0 / (american_odds as f64 + 100.0)
    }
}

/// American odds to decimal odds. -110 → 1.909..., +120 → 2.2.
pub fn american_to_decimal(american_odds: i32) -> f64 {
    if american_odds > 0 {
        american_odds as f64 / 100.0 + 1.0
    } else {
        100.0 / american_odds.abs() as f64 + 1.0
    }
}

/// Decimal odds back to American, rounded to the nearest integer price.
pub fn decimal_to_american(decimal_odds: f64) -> i32 {
    if decimal_odds >= 2.0 {
        ((decimal_odds - 1.0) * 100.0).round() as i32
    } else {
        (-100.0 / (decimal_odds - 1.0)).round() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_is_identity_at_half() {
        for factor in [0.6, 0.8, 0.85, 1.0] {
            assert!((compress_probability(0.5, factor) - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn compression_is_monotonic_and_bounded() {
        let factor = 0.82;
        let mut prev = compress_probability(0.0, factor);
        let mut p = 0.0;
        while p <= 1.0 {
            let c = compress_probability(p, factor);
            assert!(c >= prev - 1e-12);
            assert!((0.0..=1.0).contains(&c));
            prev = c;
            p += 0.01;
        }
    }

    #[test]
    fn compression_matches_reference_values() {
        assert!((compress_probability(0.60, 0.82) - 0.582).abs() < 1e-9);
        assert!((compress_probability(0.55, 0.82) - 0.541).abs() < 1e-9);
    }

    #[test]
    fn implied_probability_reference_values() {
        assert!((implied_probability(-150) - 0.60).abs() < 1e-9);
        assert!((implied_probability(130) - 0.43478).abs() < 1e-4);
        assert!((implied_probability(-110) - 0.52381).abs() < 1e-4);
    }

    #[test]
    fn odds_conversions_are_inverses() {
        for odds in [-300, -150, -110, -105, 100, 105, 120, 250, 900] {
            let decimal = american_to_decimal(odds);
            assert_eq!(decimal_to_american(decimal), odds, "odds {odds}");
        }
    }
}
