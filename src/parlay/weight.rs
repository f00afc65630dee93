//! Parlay Weighting & Pool Eligibility
//!
//! Weight is a scalar in [0, 1] over probability, edge, and confidence with
//! penalties for HIGH volatility and unstable distributions. Volatility
//! never blocks a candidate here; it only costs weight. The parlay pool has
//! its own looser thresholds than single-pick gating.

use super::{ParlayLegCandidate, PropRiskBand, StrictState, TruthMode, VolatilityBand};
use serde::{Deserialize, Serialize};

/// Candidates below this weight are not parlay eligible.
pub const MIN_PARLAY_WEIGHT: f64 = 0.5;

// Parlay-pool thresholds (looser than single-pick gates).
pub const POOL_MIN_PROBABILITY: f64 = 0.53;
pub const POOL_MIN_EDGE: f64 = 1.5;
pub const POOL_MIN_CONFIDENCE: f64 = 50.0;
pub const POOL_MAX_VARIANCE_Z: f64 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayWeight {
    pub final_weight: f64,
    pub reason_codes: Vec<String>,
}

/// Weight components: probability dominates, edge and confidence follow.
pub fn calculate_parlay_weight(candidate: &ParlayLegCandidate, mode: TruthMode) -> ParlayWeight {
    let mut reason_codes = Vec::new();

    let prob_component = ((candidate.win_probability - 0.50) / 0.15).clamp(0.0, 1.0) * 0.45;
    let edge_component = (candidate.edge_points / 5.0).clamp(0.0, 1.0) * 0.30;
    let confidence_component = (candidate.confidence / 100.0).clamp(0.0, 1.0) * 0.25;

    let mut weight = prob_component + edge_component + confidence_component;

    match candidate.volatility_band {
        VolatilityBand::High => {
            weight -= 0.15;
            reason_codes.push("HIGH_VOLATILITY_PENALTY".to_string());
        }
        VolatilityBand::Med => {
            weight -= 0.05;
            reason_codes.push("MED_VOLATILITY_PENALTY".to_string());
        }
        VolatilityBand::Low => {}
    }

    if !candidate.distribution_stable {
        weight -= 0.20;
        reason_codes.push("UNSTABLE_DISTRIBUTION_PENALTY".to_string());
    }

    if mode == TruthMode::Parlay && candidate.strict_state == StrictState::Lean {
        weight -= 0.05;
        reason_codes.push("LEAN_STATE_PENALTY".to_string());
    }

    ParlayWeight {
        final_weight: weight.clamp(0.0, 1.0),
        reason_codes,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEligibility {
    pub is_eligible: bool,
    pub failed_checks: Vec<String>,
}

/// PARLAY-mode pool thresholds, distinct from single-pick thresholds.
pub fn check_parlay_pool_eligibility(
    probability: f64,
    edge: f64,
    confidence: f64,
    variance_z: f64,
) -> PoolEligibility {
    let mut failed_checks = Vec::new();
    if probability < POOL_MIN_PROBABILITY {
        failed_checks.push(format!("PROBABILITY_BELOW_{POOL_MIN_PROBABILITY}"));
    }
    if edge < POOL_MIN_EDGE {
        failed_checks.push(format!("EDGE_BELOW_{POOL_MIN_EDGE}"));
    }
    if confidence < POOL_MIN_CONFIDENCE {
        failed_checks.push(format!("CONFIDENCE_BELOW_{POOL_MIN_CONFIDENCE}"));
    }
    if variance_z.abs() > POOL_MAX_VARIANCE_Z {
        failed_checks.push(format!("VARIANCE_Z_ABOVE_{POOL_MAX_VARIANCE_Z}"));
    }
    PoolEligibility {
        is_eligible: failed_checks.is_empty(),
        failed_checks,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropIntegrityCheck {
    pub player_status_pass: bool,
    pub prop_risk_band: PropRiskBand,
}

/// Prop Integrity Gate: confirmed player status and a bounded risk band.
pub fn validate_prop_integrity(candidate: &ParlayLegCandidate) -> PropIntegrityCheck {
    PropIntegrityCheck {
        player_status_pass: candidate.player_status_ok,
        prop_risk_band: candidate.prop_risk_band,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parlay::LegMarket;

    fn candidate() -> ParlayLegCandidate {
        ParlayLegCandidate::game_line("evt_1", "nba", LegMarket::Spread)
    }

    #[test]
    fn strong_candidate_is_eligible() {
        let weight = calculate_parlay_weight(&candidate(), TruthMode::Parlay);
        assert!(weight.final_weight >= MIN_PARLAY_WEIGHT);
        assert!(weight.reason_codes.is_empty());
        assert!((0.0..=1.0).contains(&weight.final_weight));
    }

    #[test]
    fn penalties_stack_with_reason_codes() {
        let mut shaky = candidate();
        shaky.volatility_band = VolatilityBand::High;
        shaky.distribution_stable = false;
        let weight = calculate_parlay_weight(&shaky, TruthMode::Parlay);
        let clean = calculate_parlay_weight(&candidate(), TruthMode::Parlay);
        assert!((clean.final_weight - weight.final_weight - 0.35).abs() < 1e-9);
        assert!(weight
            .reason_codes
            .contains(&"HIGH_VOLATILITY_PENALTY".to_string()));
        assert!(weight
            .reason_codes
            .contains(&"UNSTABLE_DISTRIBUTION_PENALTY".to_string()));
    }

    #[test]
    fn lean_pays_a_penalty_in_parlay_mode_only() {
        let mut lean = candidate();
        lean.strict_state = StrictState::Lean;
        let parlay = calculate_parlay_weight(&lean, TruthMode::Parlay);
        let strict = calculate_parlay_weight(&lean, TruthMode::Strict);
        assert!((strict.final_weight - parlay.final_weight - 0.05).abs() < 1e-9);
    }

    #[test]
    fn weight_is_clamped() {
        let mut weak = candidate();
        weak.win_probability = 0.40;
        weak.edge_points = 0.0;
        weak.confidence = 0.0;
        weak.volatility_band = VolatilityBand::High;
        weak.distribution_stable = false;
        let weight = calculate_parlay_weight(&weak, TruthMode::Parlay);
        assert_eq!(weight.final_weight, 0.0);
    }

    #[test]
    fn pool_thresholds() {
        assert!(check_parlay_pool_eligibility(0.55, 2.0, 60.0, 0.5).is_eligible);

        let rejected = check_parlay_pool_eligibility(0.51, 1.0, 40.0, 3.0);
        assert!(!rejected.is_eligible);
        assert_eq!(rejected.failed_checks.len(), 4);

        // Boundary values pass.
        assert!(check_parlay_pool_eligibility(0.53, 1.5, 50.0, 2.0).is_eligible);
    }

    #[test]
    fn prop_integrity_gate() {
        let mut prop = candidate();
        prop.market_type = LegMarket::PlayerProp;
        prop.prop_risk_band = PropRiskBand::Med;
        let check = validate_prop_integrity(&prop);
        assert!(check.player_status_pass);
        assert_eq!(check.prop_risk_band, PropRiskBand::Med);
    }
}
