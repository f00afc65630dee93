//! Edge Evaluation Pipeline
//!
//! One sport-parameterized pipeline for every market. Only thresholds and
//! required-confirmation flags differ between sports; the shape is fixed:
//! validate → compress → implied probability → edge → classify → volatility
//! and distribution → eligibility gates → override.
//!
//! NO_PLAY is a valid outcome, not an evaluator failure.

use super::config::{sport_config, SportConfig};
use super::{
    compress_probability, implied_probability, DistributionFlag, EdgeState, MarketKey, Sport,
    TotalSide, VolatilityLevel,
};
use serde::{Deserialize, Serialize};

/// Distribution metrics reported by the simulator for one run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SimStats {
    /// Std dev of the win/cover probability across simulation batches.
    pub win_prob_std: f64,
    /// Std dev of the simulated total.
    pub total_std: f64,
    /// How quickly the simulation converged, in [0, 1].
    pub convergence_rate: f64,
}

/// Lineup/weather confirmations collected before tip-off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Confirmations {
    pub pitcher_confirmed: bool,
    pub qb_confirmed: bool,
    pub goalie_confirmed: bool,
    pub weather_clear: bool,
}

impl Default for Confirmations {
    fn default() -> Self {
        Self {
            pitcher_confirmed: false,
            qb_confirmed: false,
            goalie_confirmed: false,
            weather_clear: true,
        }
    }
}

impl Confirmations {
    /// Everything confirmed; for sports with no confirmation requirements.
    pub fn all_clear() -> Self {
        Self {
            pitcher_confirmed: true,
            qb_confirmed: true,
            goalie_confirmed: true,
            weather_clear: true,
        }
    }
}

/// Inputs for evaluating a single market. Fields are optional because the
/// required set depends on the market type; missing required fields produce
/// NO_PLAY with `MISSING_MARKET_DATA`.
#[derive(Debug, Clone, Default)]
pub struct MarketInputs {
    pub market: Option<MarketKey>,

    /// Simulated probability of covering the spread (spread market).
    pub sim_cover_prob: Option<f64>,
    /// Simulated win probability (moneyline market).
    pub sim_win_prob: Option<f64>,
    /// Simulated over probability (totals market).
    pub sim_over_prob: Option<f64>,

    /// Signed point spread for the priced side (negative = favorite).
    pub spread: Option<f64>,
    pub spread_odds: Option<i32>,
    pub over_odds: Option<i32>,
    pub under_odds: Option<i32>,
    pub ml_odds: Option<i32>,

    /// Whether the priced side is the market favorite (guardrails differ).
    pub is_favorite: Option<bool>,

    pub stats: SimStats,
    pub confirmations: Confirmations,
}

/// Result of evaluating one market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvaluation {
    pub market: MarketKey,
    pub edge_state: EdgeState,
    /// Raw edge in percentage points.
    pub raw_edge: f64,
    /// Compressed edge in percentage points.
    pub compressed_edge: f64,
    /// Chosen side for totals markets.
    pub total_side: Option<TotalSide>,
    pub volatility: VolatilityLevel,
    pub distribution_flag: DistributionFlag,
    pub spread_size: Option<f64>,
    pub is_large_spread: bool,
    pub near_key_number: bool,
    pub eligible: bool,
    pub blocking_reason: Option<String>,
}

impl MarketEvaluation {
    fn blocked(market: MarketKey, reason: &str) -> Self {
        Self {
            market,
            edge_state: EdgeState::NoPlay,
            raw_edge: 0.0,
            compressed_edge: 0.0,
            total_side: None,
            volatility: VolatilityLevel::Low,
            distribution_flag: DistributionFlag::Stable,
            spread_size: None,
            is_large_spread: false,
            near_key_number: false,
            eligible: false,
            blocking_reason: Some(reason.to_string()),
        }
    }
}

/// Check whether a spread sits within 0.5 points of a key number.
pub fn is_near_key_number(spread: f64, key_numbers: &[f64]) -> bool {
    let abs_spread = spread.abs();
    key_numbers.iter().any(|k| (abs_spread - k).abs() <= 0.5)
}

/// Spread size guardrails. Limits differ for favorites vs underdogs; NHL
/// spread markets are pucklines and use the puckline reason code.
/// Returns (is_large_spread, eligible, blocking_reason).
fn check_spread_size_guardrails(
    sport: Sport,
    config: &SportConfig,
    spread: f64,
    is_favorite: bool,
) -> (bool, bool, Option<String>) {
    let abs_spread = spread.abs();
    let max_spread = if is_favorite {
        config.max_favorite_spread
    } else {
        config.max_dog_spread
    };

    if let Some(max_spread) = max_spread {
        if abs_spread > max_spread {
            let code = if sport == Sport::Nhl {
                format!("PUCKLINE_TOO_LARGE_{abs_spread}")
            } else {
                format!("SPREAD_TOO_LARGE_{abs_spread}")
            };
            return (true, false, Some(code));
        }
    }

    let is_large = config
        .large_spread_flag_threshold
        .map(|t| abs_spread > t)
        .unwrap_or(false);
    (is_large, true, None)
}

fn classify_edge_state(
    config: &SportConfig,
    market: MarketKey,
    compressed_edge_pct: f64,
    is_large_spread: bool,
) -> EdgeState {
    match market {
        MarketKey::Spread | MarketKey::Puckline => {
            if is_large_spread {
                // Large spreads demand a bigger number; no LEAN tier.
                let required = config.large_spread_edge_requirement.unwrap_or(f64::MAX);
                if compressed_edge_pct >= required {
                    return EdgeState::Edge;
                }
                return EdgeState::NoPlay;
            }
            if compressed_edge_pct >= config.spread.edge_threshold {
                EdgeState::Edge
            } else if compressed_edge_pct >= config.spread.lean_min {
                EdgeState::Lean
            } else {
                EdgeState::NoPlay
            }
        }
        MarketKey::Total => {
            if compressed_edge_pct >= config.total.edge_threshold {
                EdgeState::Edge
            } else if compressed_edge_pct >= config.total.lean_min {
                EdgeState::Lean
            } else {
                EdgeState::NoPlay
            }
        }
        MarketKey::Moneyline => match (config.ml_edge_threshold, config.ml_lean_min) {
            (Some(edge), Some(lean)) => {
                if compressed_edge_pct >= edge {
                    EdgeState::Edge
                } else if compressed_edge_pct >= lean {
                    EdgeState::Lean
                } else {
                    EdgeState::NoPlay
                }
            }
            _ => EdgeState::NoPlay,
        },
        MarketKey::Prop => EdgeState::NoPlay,
    }
}

/// Bucket the distribution std dev into the sport's volatility bands and
/// derive the stability flag from convergence.
pub fn assess_distribution(
    config: &SportConfig,
    market: MarketKey,
    stats: &SimStats,
) -> (DistributionFlag, VolatilityLevel) {
    let std = match market {
        MarketKey::Total => stats.total_std,
        _ => stats.win_prob_std,
    };

    let [low, medium, high] = config.volatility_bands;
    let volatility = if std < low {
        VolatilityLevel::Low
    } else if std < medium {
        VolatilityLevel::Medium
    } else if std < high {
        VolatilityLevel::High
    } else {
        VolatilityLevel::Extreme
    };

    let flag = if volatility <= VolatilityLevel::Medium && stats.convergence_rate > 0.95 {
        DistributionFlag::Stable
    } else if volatility == VolatilityLevel::Extreme {
        DistributionFlag::UnstableExtreme
    } else {
        DistributionFlag::Unstable
    };

    (flag, volatility)
}

fn check_eligibility_gates(
    sport: Sport,
    config: &SportConfig,
    market: MarketKey,
    compressed_edge_pct: f64,
    distribution_flag: DistributionFlag,
    inputs: &MarketInputs,
) -> (bool, Option<String>) {
    let confirmations = &inputs.confirmations;

    if config.requires_pitcher_confirmation && !confirmations.pitcher_confirmed {
        return (false, Some("PITCHER_NOT_CONFIRMED".to_string()));
    }
    if config.requires_qb_confirmation && !confirmations.qb_confirmed {
        return (false, Some("QB_NOT_CONFIRMED".to_string()));
    }
    if config.requires_goalie_confirmation && !confirmations.goalie_confirmed {
        return (false, Some("GOALIE_NOT_CONFIRMED".to_string()));
    }
    if config.weather_sensitive && !confirmations.weather_clear {
        return (false, Some("WEATHER_UNCERTAIN".to_string()));
    }

    if distribution_flag == DistributionFlag::UnstableExtreme {
        return (false, Some("DISTRIBUTION_UNSTABLE_EXTREME".to_string()));
    }

    let eligibility_min = match market {
        MarketKey::Spread | MarketKey::Puckline => config.spread.eligibility_min,
        MarketKey::Total => config.total.eligibility_min,
        MarketKey::Moneyline => config.ml_win_prob_edge_min.unwrap_or(0.0),
        MarketKey::Prop => 0.0,
    };
    if compressed_edge_pct < eligibility_min {
        return (false, Some("EDGE_BELOW_MINIMUM".to_string()));
    }

    if matches!(market, MarketKey::Spread | MarketKey::Puckline) {
        if let (Some(spread), Some(is_favorite)) = (inputs.spread, inputs.is_favorite) {
            let (_, eligible, reason) =
                check_spread_size_guardrails(sport, config, spread, is_favorite);
            if !eligible {
                return (false, reason);
            }
        }
    }

    (true, None)
}

/// Complete evaluation of one market for one sport.
pub fn evaluate_market(sport: Sport, inputs: &MarketInputs) -> MarketEvaluation {
    let config = sport_config(sport);
    let Some(market) = inputs.market else {
        return MarketEvaluation::blocked(MarketKey::Spread, "MISSING_MARKET_DATA");
    };

    // Spread guardrails first so an oversized line short-circuits the math.
    let mut spread_size = None;
    let mut is_large_spread = false;
    let mut near_key_number = false;
    if matches!(market, MarketKey::Spread | MarketKey::Puckline) {
        if let Some(spread) = inputs.spread {
            spread_size = Some(spread.abs());
            if let Some(key_numbers) = config.key_numbers {
                near_key_number = is_near_key_number(spread, key_numbers);
            }
            if let Some(is_favorite) = inputs.is_favorite {
                let (large, eligible, reason) =
                    check_spread_size_guardrails(sport, config, spread, is_favorite);
                is_large_spread = large;
                if !eligible {
                    let mut evaluation =
                        MarketEvaluation::blocked(market, reason.as_deref().unwrap_or(""));
                    evaluation.spread_size = spread_size;
                    evaluation.is_large_spread = is_large_spread;
                    evaluation.near_key_number = near_key_number;
                    return evaluation;
                }
            }
        }
    }

    // Validate inputs and compute both edges.
    let (raw_edge, compressed_edge, total_side) = match market {
        MarketKey::Spread | MarketKey::Puckline => {
            let (Some(cover_prob), Some(_), Some(odds)) =
                (inputs.sim_cover_prob, inputs.spread, inputs.spread_odds)
            else {
                return MarketEvaluation::blocked(market, "MISSING_MARKET_DATA");
            };
            let compressed = compress_probability(cover_prob, config.compression_factor);
            let implied = implied_probability(odds);
            (cover_prob - implied, compressed - implied, None)
        }
        MarketKey::Moneyline => {
            let (Some(win_prob), Some(odds)) = (inputs.sim_win_prob, inputs.ml_odds) else {
                return MarketEvaluation::blocked(market, "MISSING_MARKET_DATA");
            };
            let compressed = compress_probability(win_prob, config.compression_factor);
            let implied = implied_probability(odds);
            (win_prob - implied, compressed - implied, None)
        }
        MarketKey::Total => {
            let (Some(over_prob), Some(over_odds), Some(under_odds)) =
                (inputs.sim_over_prob, inputs.over_odds, inputs.under_odds)
            else {
                return MarketEvaluation::blocked(market, "MISSING_MARKET_DATA");
            };
            let compressed_over = compress_probability(over_prob, config.compression_factor);
            let compressed_under = 1.0 - compressed_over;
            let over_implied = implied_probability(over_odds);
            let under_implied = implied_probability(under_odds);
            let over_edge = compressed_over - over_implied;
            let under_edge = compressed_under - under_implied;
            if over_edge > under_edge {
                (over_prob - over_implied, over_edge, Some(TotalSide::Over))
            } else {
                (
                    (1.0 - over_prob) - under_implied,
                    under_edge,
                    Some(TotalSide::Under),
                )
            }
        }
        MarketKey::Prop => {
            return MarketEvaluation::blocked(market, "MARKET_TYPE_NOT_SUPPORTED");
        }
    };

    let raw_edge_pct = raw_edge * 100.0;
    let compressed_edge_pct = compressed_edge * 100.0;

    let edge_state = classify_edge_state(config, market, compressed_edge_pct, is_large_spread);
    let (distribution_flag, volatility) = assess_distribution(config, market, &inputs.stats);
    let (eligible, blocking_reason) = check_eligibility_gates(
        sport,
        config,
        market,
        compressed_edge_pct,
        distribution_flag,
        inputs,
    );

    MarketEvaluation {
        market,
        // Ineligible markets are NO_PLAY regardless of edge.
        edge_state: if eligible { edge_state } else { EdgeState::NoPlay },
        raw_edge: raw_edge_pct,
        compressed_edge: compressed_edge_pct,
        total_side,
        volatility,
        distribution_flag,
        spread_size,
        is_large_spread,
        near_key_number,
        eligible,
        blocking_reason,
    }
}
