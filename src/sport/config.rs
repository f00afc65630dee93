//! Sport-Specific Configuration Registry
//!
//! All thresholds live here, not in the pipeline. The registry is built once
//! and immutable at runtime.

use super::Sport;
use lazy_static::lazy_static;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct MarketThresholds {
    /// Minimum compressed edge (pct points) for the market to be eligible.
    pub eligibility_min: f64,
    /// Compressed edge required for EDGE.
    pub edge_threshold: f64,
    pub lean_min: f64,
    pub lean_max: f64,
}

#[derive(Debug, Clone)]
pub struct SportConfig {
    pub compression_factor: f64,

    pub spread: MarketThresholds,
    pub total: MarketThresholds,

    // Moneyline thresholds (if the sport trades moneyline-first)
    pub ml_win_prob_edge_min: Option<f64>,
    pub ml_edge_threshold: Option<f64>,
    pub ml_lean_min: Option<f64>,

    // Spread size guardrails
    pub max_favorite_spread: Option<f64>,
    pub max_dog_spread: Option<f64>,
    pub large_spread_edge_requirement: Option<f64>,
    /// Absolute spread above which the "large spread" flag applies.
    pub large_spread_flag_threshold: Option<f64>,

    /// Volatility std-dev band upper bounds: [low, medium, high].
    /// Anything above the last bound is EXTREME.
    pub volatility_bands: [f64; 3],

    // Required confirmations
    pub requires_pitcher_confirmation: bool,
    pub requires_qb_confirmation: bool,
    pub requires_goalie_confirmation: bool,
    pub weather_sensitive: bool,

    pub key_numbers: Option<&'static [f64]>,

    // Expected probability ranges (monitoring only, not gates)
    pub expected_prob_min: f64,
    pub expected_prob_max: f64,
}

impl SportConfig {
    fn base() -> Self {
        Self {
            compression_factor: 1.0,
            spread: MarketThresholds {
                eligibility_min: 0.0,
                edge_threshold: 0.0,
                lean_min: 0.0,
                lean_max: 0.0,
            },
            total: MarketThresholds {
                eligibility_min: 0.0,
                edge_threshold: 0.0,
                lean_min: 0.0,
                lean_max: 0.0,
            },
            ml_win_prob_edge_min: None,
            ml_edge_threshold: None,
            ml_lean_min: None,
            max_favorite_spread: None,
            max_dog_spread: None,
            large_spread_edge_requirement: None,
            large_spread_flag_threshold: None,
            volatility_bands: [0.02, 0.04, 0.06],
            requires_pitcher_confirmation: false,
            requires_qb_confirmation: false,
            requires_goalie_confirmation: false,
            weather_sensitive: false,
            key_numbers: None,
            expected_prob_min: 0.51,
            expected_prob_max: 0.62,
        }
    }
}

/// NFL key numbers: the margins games land on most often.
pub const NFL_KEY_NUMBERS: &[f64] = &[3.0, 7.0, 10.0];

lazy_static! {
    static ref SPORT_CONFIGS: HashMap<Sport, SportConfig> = {
        let mut configs = HashMap::new();

        // MLB: moneyline-first, very sharp totals market, pitcher-dependent.
        configs.insert(Sport::Mlb, SportConfig {
            compression_factor: 0.82,
            ml_win_prob_edge_min: Some(2.0),
            ml_edge_threshold: Some(3.5),
            ml_lean_min: Some(2.0),
            total: MarketThresholds {
                eligibility_min: 1.5,
                edge_threshold: 2.5,
                lean_min: 1.5,
                lean_max: 2.4,
            },
            spread: MarketThresholds {
                eligibility_min: 2.0,
                edge_threshold: 3.5,
                lean_min: 2.0,
                lean_max: 3.4,
            },
            volatility_bands: [0.02, 0.04, 0.06],
            requires_pitcher_confirmation: true,
            weather_sensitive: true,
            expected_prob_min: 0.53,
            expected_prob_max: 0.57,
            ..SportConfig::base()
        });

        // NBA: spread-first, generous blowout room.
        configs.insert(Sport::Nba, SportConfig {
            compression_factor: 0.83,
            spread: MarketThresholds {
                eligibility_min: 4.0,
                edge_threshold: 5.5,
                lean_min: 4.0,
                lean_max: 5.4,
            },
            total: MarketThresholds {
                eligibility_min: 4.5,
                edge_threshold: 6.0,
                lean_min: 4.5,
                lean_max: 5.9,
            },
            max_favorite_spread: Some(12.5),
            max_dog_spread: Some(12.5),
            large_spread_edge_requirement: Some(7.0),
            large_spread_flag_threshold: Some(14.0),
            volatility_bands: [0.02, 0.04, 0.06],
            expected_prob_min: 0.54,
            expected_prob_max: 0.62,
            ..SportConfig::base()
        });

        // NCAAB: spread-first, college blowouts allowed.
        configs.insert(Sport::Ncaab, SportConfig {
            compression_factor: 0.80,
            spread: MarketThresholds {
                eligibility_min: 4.5,
                edge_threshold: 6.0,
                lean_min: 4.5,
                lean_max: 5.9,
            },
            total: MarketThresholds {
                eligibility_min: 5.5,
                edge_threshold: 7.0,
                lean_min: 5.5,
                lean_max: 6.9,
            },
            max_favorite_spread: Some(12.5),
            max_dog_spread: Some(12.5),
            large_spread_edge_requirement: Some(7.5),
            large_spread_flag_threshold: Some(14.0),
            volatility_bands: [0.025, 0.045, 0.065],
            expected_prob_min: 0.53,
            expected_prob_max: 0.58,
            ..SportConfig::base()
        });

        // NCAAF: spread-first, QB-dependent, widest guardrails.
        configs.insert(Sport::Ncaaf, SportConfig {
            compression_factor: 0.80,
            spread: MarketThresholds {
                eligibility_min: 4.0,
                edge_threshold: 6.0,
                lean_min: 4.0,
                lean_max: 5.9,
            },
            total: MarketThresholds {
                eligibility_min: 4.5,
                edge_threshold: 6.5,
                lean_min: 4.5,
                lean_max: 6.4,
            },
            max_favorite_spread: Some(21.0),
            max_dog_spread: Some(24.0),
            large_spread_edge_requirement: Some(8.0),
            large_spread_flag_threshold: Some(14.0),
            volatility_bands: [0.025, 0.045, 0.065],
            requires_qb_confirmation: true,
            expected_prob_min: 0.54,
            expected_prob_max: 0.60,
            ..SportConfig::base()
        });

        // NFL: spread-first, tight guardrails, key numbers matter.
        configs.insert(Sport::Nfl, SportConfig {
            compression_factor: 0.85,
            spread: MarketThresholds {
                eligibility_min: 3.0,
                edge_threshold: 4.5,
                lean_min: 3.0,
                lean_max: 4.4,
            },
            total: MarketThresholds {
                eligibility_min: 3.5,
                edge_threshold: 5.0,
                lean_min: 3.5,
                lean_max: 4.9,
            },
            max_favorite_spread: Some(7.5),
            max_dog_spread: Some(8.5),
            large_spread_edge_requirement: Some(6.0),
            large_spread_flag_threshold: Some(6.0),
            volatility_bands: [0.02, 0.035, 0.055],
            requires_qb_confirmation: true,
            weather_sensitive: true,
            key_numbers: Some(NFL_KEY_NUMBERS),
            expected_prob_min: 0.54,
            expected_prob_max: 0.59,
            ..SportConfig::base()
        });

        // NHL: puckline/totals, most aggressive compression, goalie-dependent.
        configs.insert(Sport::Nhl, SportConfig {
            compression_factor: 0.60,
            total: MarketThresholds {
                eligibility_min: 1.5,
                edge_threshold: 2.5,
                lean_min: 1.5,
                lean_max: 2.4,
            },
            spread: MarketThresholds {
                eligibility_min: 1.0,
                edge_threshold: 1.5,
                lean_min: 1.0,
                lean_max: 1.4,
            },
            max_favorite_spread: Some(2.5),
            max_dog_spread: Some(2.5),
            volatility_bands: [0.03, 0.05, 0.07],
            requires_goalie_confirmation: true,
            expected_prob_min: 0.52,
            expected_prob_max: 0.56,
            ..SportConfig::base()
        });

        configs
    };
}

pub fn sport_config(sport: Sport) -> &'static SportConfig {
    &SPORT_CONFIGS[&sport]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_sport_is_registered() {
        for sport in [
            Sport::Mlb,
            Sport::Nba,
            Sport::Ncaab,
            Sport::Ncaaf,
            Sport::Nfl,
            Sport::Nhl,
        ] {
            let config = sport_config(sport);
            assert!(config.compression_factor > 0.0 && config.compression_factor <= 1.0);
            let bands = config.volatility_bands;
            assert!(bands[0] < bands[1] && bands[1] < bands[2]);
        }
    }

    #[test]
    fn nhl_compresses_hardest() {
        let nhl = sport_config(Sport::Nhl).compression_factor;
        for sport in [Sport::Mlb, Sport::Nba, Sport::Ncaab, Sport::Ncaaf, Sport::Nfl] {
            assert!(nhl < sport_config(sport).compression_factor);
        }
    }

    #[test]
    fn nfl_carries_key_numbers() {
        let config = sport_config(Sport::Nfl);
        assert_eq!(config.key_numbers, Some(NFL_KEY_NUMBERS));
        assert!(config.requires_qb_confirmation);
        assert!(config.weather_sensitive);
    }
}
