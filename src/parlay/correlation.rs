//! Leg Correlation Model
//!
//! Correlation between parlay legs, from same-game structural dependence
//! down to cross-sport independence, with 1H vs full-game conflict
//! detection for totals on the same event.

use super::{LegMarket, Period};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Cities that produce the cross-sport "same city" bias.
const BIAS_CITIES: &[&str] = &[
    "Boston",
    "New York",
    "Los Angeles",
    "Chicago",
    "Philadelphia",
    "Toronto",
    "Miami",
    "Dallas",
];

/// Minimal view of a leg for correlation purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationLeg {
    pub event_id: String,
    pub sport_key: String,
    pub bet_type: LegMarket,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodConflict {
    pub kind: String,
    pub event_id: String,
    pub correlation: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// Correlation in [-1, 1]; negative values mark hedged/conflicting legs.
    pub score: f64,
    #[serde(default)]
    pub conflict: Option<PeriodConflict>,
}

/// Correlation between a set of legs.
pub fn correlation_score(legs: &[CorrelationLeg]) -> CorrelationResult {
    if legs.len() < 2 {
        return CorrelationResult {
            score: 0.0,
            conflict: None,
        };
    }

    // 1H vs full-game conflicts override everything else.
    if let Some(conflict) = detect_first_half_conflict(legs) {
        warn!(event_id = %conflict.event_id, kind = %conflict.kind, "⚠️ period conflict detected");
        return CorrelationResult {
            score: conflict.correlation,
            conflict: Some(conflict),
        };
    }

    let same_event = legs
        .iter()
        .all(|leg| leg.event_id == legs[0].event_id);
    if same_event {
        return CorrelationResult {
            score: same_game_correlation(legs),
            conflict: None,
        };
    }

    let same_sport = legs
        .iter()
        .all(|leg| leg.sport_key == legs[0].sport_key);
    if !same_sport {
        return CorrelationResult {
            score: cross_sport_correlation(legs),
            conflict: None,
        };
    }

    // Same sport, different games: low but non-zero (league-wide scoring
    // trends, shared weather for outdoor slates).
    CorrelationResult {
        score: 0.15,
        conflict: None,
    }
}

/// Same-game structural correlation by market pair.
fn same_game_correlation(legs: &[CorrelationLeg]) -> f64 {
    let spreads = legs.iter().filter(|l| l.bet_type == LegMarket::Spread).count();
    let has_total = legs.iter().any(|l| l.bet_type == LegMarket::Total);
    let has_ml = legs.iter().any(|l| l.bet_type == LegMarket::Moneyline);

    if spreads >= 2 {
        return 0.95;
    }
    if spreads >= 1 && has_total {
        return 0.65;
    }
    if has_ml && spreads >= 1 {
        return 0.85;
    }
    0.7
}

/// Cross-sport legs are independent unless teams share a home city.
fn cross_sport_correlation(legs: &[CorrelationLeg]) -> f64 {
    let mut cities = Vec::new();
    for leg in legs {
        let Some(team) = &leg.team else { continue };
        if let Some(city) = BIAS_CITIES.iter().find(|c| team.contains(*c)) {
            cities.push(*city);
        }
    }
    let unique: std::collections::HashSet<&str> = cities.iter().copied().collect();
    if cities.len() >= 2 && unique.len() < cities.len() {
        info!(cities = ?unique, "🏙️ city bias applied to cross-sport parlay");
        return 0.10;
    }
    0.0
}

/// Contradictory or reinforcing 1H vs full-game totals on the same event.
pub fn detect_first_half_conflict(legs: &[CorrelationLeg]) -> Option<PeriodConflict> {
    let mut by_event: HashMap<&str, Vec<&CorrelationLeg>> = HashMap::new();
    for leg in legs {
        by_event.entry(leg.event_id.as_str()).or_default().push(leg);
    }

    for (event_id, event_legs) in by_event {
        let first_half: Vec<_> = event_legs
            .iter()
            .filter(|l| l.period == Period::FirstHalf && l.bet_type == LegMarket::Total)
            .collect();
        let full_game: Vec<_> = event_legs
            .iter()
            .filter(|l| l.period == Period::Full && l.bet_type == LegMarket::Total)
            .collect();

        for fh in &first_half {
            for fg in &full_game {
                let fh_side = fh.side.as_deref().unwrap_or("");
                let fg_side = fg.side.as_deref().unwrap_or("");
                match (fh_side, fg_side) {
                    ("under", "over") => {
                        return Some(PeriodConflict {
                            kind: "1H_FG_CONFLICT".to_string(),
                            event_id: event_id.to_string(),
                            correlation: -0.3,
                            message: "1H under + full-game over requires a quiet first half \
                                      then a shootout"
                                .to_string(),
                        })
                    }
                    ("over", "over") => {
                        return Some(PeriodConflict {
                            kind: "1H_FG_SUPPORT".to_string(),
                            event_id: event_id.to_string(),
                            correlation: 0.75,
                            message: "1H over + full-game over both need sustained scoring"
                                .to_string(),
                        })
                    }
                    ("over", "under") => {
                        return Some(PeriodConflict {
                            kind: "1H_FG_CONFLICT".to_string(),
                            event_id: event_id.to_string(),
                            correlation: -0.4,
                            message: "1H over + full-game under is a mathematical conflict"
                                .to_string(),
                        })
                    }
                    _ => {}
                }
            }
        }
    }
    None
}

/// Combined hit probability adjusted for correlation: a blend between the
/// independent product (ρ = 0) and the weakest leg (ρ = 1), clamped to
/// [0, 1].
pub fn combined_probability(leg_probs: &[f64], correlation: f64) -> f64 {
    if leg_probs.is_empty() {
        return 0.0;
    }
    let independent: f64 = leg_probs.iter().product();
    let min_prob = leg_probs.iter().copied().fold(f64::INFINITY, f64::min);
    (independent * (1.0 - correlation) + min_prob * correlation).clamp(0.0, 1.0)
}
