//! Parlay Generation Engine — portfolio optimization with fallback
//!
//! Selects N legs that maximize portfolio score under risk constraints
//! instead of demanding that every leg pass strict gates. The fallback
//! ladder relaxes the configuration step by step and never returns nothing
//! unless the slate is literally empty. Generation never raises to callers;
//! the result is always structured.

use super::weight::{
    calculate_parlay_weight, check_parlay_pool_eligibility, validate_prop_integrity,
    MIN_PARLAY_WEIGHT,
};
use super::{LegMarket, ParlayLegCandidate, PropRiskBand, RiskProfile, StrictState, TruthMode};
use crate::store::{collections, SharedStore};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const MIN_LEG_COUNT: usize = 3;

/// Constraints applied per attempt, by risk profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfileConstraints {
    pub min_win_prob: f64,
    pub min_parlay_weight: f64,
    pub allow_lean: bool,
    pub max_high_vol_legs: usize,
    pub max_unstable_legs: usize,
    pub max_prop_legs: usize,
}

impl RiskProfileConstraints {
    pub fn get(profile: RiskProfile) -> Self {
        match profile {
            RiskProfile::HighConfidence => Self {
                min_win_prob: 0.60,
                min_parlay_weight: 0.60,
                allow_lean: false,
                max_high_vol_legs: 0,
                max_unstable_legs: 0,
                max_prop_legs: 1,
            },
            RiskProfile::Balanced => Self {
                min_win_prob: 0.55,
                min_parlay_weight: MIN_PARLAY_WEIGHT,
                allow_lean: false,
                max_high_vol_legs: 1,
                max_unstable_legs: 1,
                max_prop_legs: 2,
            },
            RiskProfile::HighVolatility => Self {
                min_win_prob: 0.50,
                min_parlay_weight: MIN_PARLAY_WEIGHT,
                allow_lean: true,
                max_high_vol_legs: 3,
                max_unstable_legs: 2,
                max_prop_legs: 3,
            },
        }
    }
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub mode: TruthMode,
    pub risk_profile: RiskProfile,
    pub leg_count: usize,
    pub include_higher_risk_legs: bool,
    pub include_props: bool,
    pub include_game_lines: bool,
    pub dfs_mode: bool,
    pub allow_same_game: bool,
    pub allow_cross_sport: bool,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            mode: TruthMode::Parlay,
            risk_profile: RiskProfile::Balanced,
            leg_count: 4,
            include_higher_risk_legs: false,
            include_props: true,
            include_game_lines: true,
            dfs_mode: false,
            allow_same_game: false,
            allow_cross_sport: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayGenerationResult {
    pub success: bool,
    pub parlay_id: Option<String>,
    pub mode: TruthMode,
    pub risk_profile_requested: RiskProfile,
    pub risk_profile_used: RiskProfile,
    pub leg_count_requested: usize,
    pub leg_count_used: usize,
    pub legs: Vec<ParlayLegCandidate>,
    pub portfolio_score: f64,
    pub expected_hit_rate: f64,
    pub expected_value_proxy: f64,
    pub fallback_steps_taken: Vec<String>,
    pub fail_reason: Option<String>,
    pub generation_timestamp: String,
}

pub struct ParlayOptimizationEngine {
    store: Option<SharedStore>,
}

impl ParlayOptimizationEngine {
    pub fn new(store: Option<SharedStore>) -> Self {
        Self { store }
    }

    /// Generate an optimized parlay with the fallback ladder. Always returns
    /// a structured result.
    pub async fn generate_parlay(
        &self,
        candidates: &[ParlayLegCandidate],
        request: &GenerationRequest,
    ) -> ParlayGenerationResult {
        let attempt_id = format!("attempt_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let mut fallback_steps = Vec::new();

        info!(
            mode = ?request.mode,
            profile = %request.risk_profile,
            legs = request.leg_count,
            candidates = candidates.len(),
            "🎯 parlay generation"
        );

        let eligible = self.build_candidate_pool(candidates, request);
        let result = if eligible.is_empty() {
            warn!("🚫 no eligible candidates after DI+MV filtering");
            self.fail_result(
                request,
                "NO_ELIGIBLE_CANDIDATES_DI_MV_FAILED",
                fallback_steps.clone(),
            )
        } else {
            let weighted = Self::compute_weights(eligible, request.mode);
            self.try_with_fallback_ladder(&weighted, request, &mut fallback_steps)
        };

        self.log_generation_audit(&attempt_id, candidates, request, &result)
            .await;
        result
    }

    /// DI + MV + mode + market + prop-integrity filtering.
    fn build_candidate_pool(
        &self,
        candidates: &[ParlayLegCandidate],
        request: &GenerationRequest,
    ) -> Vec<ParlayLegCandidate> {
        let mut eligible = Vec::new();

        for candidate in candidates {
            if candidate.event_id.is_empty() {
                continue;
            }
            // Data Integrity + Model Validity are always required.
            if !candidate.data_integrity_pass || !candidate.model_validity_pass {
                continue;
            }

            match request.mode {
                TruthMode::Strict => {
                    if candidate.strict_state != StrictState::Pick || !candidate.can_parlay {
                        continue;
                    }
                }
                TruthMode::Parlay => {
                    if candidate.strict_state == StrictState::NoPlay {
                        continue;
                    }
                    let pool = check_parlay_pool_eligibility(
                        candidate.win_probability,
                        candidate.edge_points,
                        candidate.confidence,
                        candidate.variance_z,
                    );
                    if !pool.is_eligible {
                        continue;
                    }
                }
            }

            if candidate.market_type == LegMarket::PlayerProp {
                if !request.include_props {
                    continue;
                }
                let prop = validate_prop_integrity(candidate);
                if !prop.player_status_pass || prop.prop_risk_band == PropRiskBand::High {
                    continue;
                }
            } else {
                if !request.include_game_lines {
                    continue;
                }
                // DFS slates are props only.
                if request.dfs_mode {
                    continue;
                }
            }

            eligible.push(candidate.clone());
        }

        info!(
            eligible = eligible.len(),
            total = candidates.len(),
            "✅ candidate pool built"
        );
        eligible
    }

    fn compute_weights(
        candidates: Vec<ParlayLegCandidate>,
        mode: TruthMode,
    ) -> Vec<ParlayLegCandidate> {
        candidates
            .into_iter()
            .map(|mut candidate| {
                let weight = calculate_parlay_weight(&candidate, mode);
                candidate.parlay_weight = weight.final_weight;
                candidate.parlay_eligible = weight.final_weight >= MIN_PARLAY_WEIGHT;
                candidate.parlay_reason_codes = weight.reason_codes;
                candidate
            })
            .collect()
    }

    /// The ladder: requested → BALANCED → enable LEAN → HIGH_VOLATILITY →
    /// shrink legs to the floor → structured failure.
    fn try_with_fallback_ladder(
        &self,
        candidates: &[ParlayLegCandidate],
        request: &GenerationRequest,
        fallback_steps: &mut Vec<String>,
    ) -> ParlayGenerationResult {
        // Step 1: exactly as requested.
        let result = self.select_legs(
            candidates,
            request,
            request.risk_profile,
            request.leg_count,
            request.include_higher_risk_legs,
        );
        if result.success {
            return result;
        }

        // Step 2: HIGH_CONFIDENCE relaxes to BALANCED.
        if request.risk_profile == RiskProfile::HighConfidence {
            fallback_steps.push("FALLBACK_TO_BALANCED".to_string());
            info!("⚠️ fallback: HIGH_CONFIDENCE → BALANCED");
            let result = self.select_legs(
                candidates,
                request,
                RiskProfile::Balanced,
                request.leg_count,
                false,
            );
            if result.success {
                return Self::with_steps(result, fallback_steps);
            }
        }

        // Step 3: allow LEAN legs.
        if !request.include_higher_risk_legs {
            fallback_steps.push("ENABLE_HIGHER_RISK_LEGS".to_string());
            info!("⚠️ fallback: enable higher risk legs");
            let result = self.select_legs(
                candidates,
                request,
                RiskProfile::Balanced,
                request.leg_count,
                true,
            );
            if result.success {
                return Self::with_steps(result, fallback_steps);
            }
        }

        // Step 4: HIGH_VOLATILITY.
        if request.risk_profile != RiskProfile::HighVolatility {
            fallback_steps.push("FALLBACK_TO_HIGH_VOL".to_string());
            info!("⚠️ fallback: → HIGH_VOLATILITY");
            let result = self.select_legs(
                candidates,
                request,
                RiskProfile::HighVolatility,
                request.leg_count,
                true,
            );
            if result.success {
                return Self::with_steps(result, fallback_steps);
            }
        }

        // Step 5: shed legs down to the floor.
        let mut leg_count = request.leg_count;
        while leg_count > MIN_LEG_COUNT {
            leg_count -= 1;
            fallback_steps.push(format!("REDUCE_LEG_COUNT_TO_{leg_count}"));
            info!(leg_count, "⚠️ fallback: reduce leg count");
            let result = self.select_legs(
                candidates,
                request,
                RiskProfile::HighVolatility,
                leg_count,
                true,
            );
            if result.success {
                return Self::with_steps(result, fallback_steps);
            }
        }

        // Step 6: genuine failure; usually a feed problem.
        error!("🚫 fallback ladder exhausted, no parlay possible");
        self.fail_result(
            request,
            "FALLBACK_EXHAUSTED_NO_VALID_LEGS",
            fallback_steps.clone(),
        )
    }

    fn with_steps(
        mut result: ParlayGenerationResult,
        steps: &[String],
    ) -> ParlayGenerationResult {
        result.fallback_steps_taken = steps.to_vec();
        result
    }

    /// Filter by profile constraints, sort by weight, pick top N with
    /// diversification.
    fn select_legs(
        &self,
        candidates: &[ParlayLegCandidate],
        request: &GenerationRequest,
        profile: RiskProfile,
        leg_count: usize,
        include_higher_risk_legs: bool,
    ) -> ParlayGenerationResult {
        let mut constraints = RiskProfileConstraints::get(profile);
        if include_higher_risk_legs {
            constraints.allow_lean = true;
        }

        let filtered = Self::apply_constraints(candidates, &constraints);
        if filtered.len() < leg_count {
            return self.fail_result_for(
                request,
                profile,
                leg_count,
                &format!(
                    "INSUFFICIENT_LEGS_AFTER_CONSTRAINTS_{}_OF_{leg_count}",
                    filtered.len()
                ),
            );
        }

        let mut sorted = filtered;
        sorted.sort_by(|a, b| {
            b.parlay_weight
                .partial_cmp(&a.parlay_weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let selected = Self::diversify_selection(
            &sorted,
            leg_count,
            request.allow_same_game,
            request.allow_cross_sport,
        );
        if selected.len() < leg_count {
            return self.fail_result_for(
                request,
                profile,
                leg_count,
                &format!(
                    "INSUFFICIENT_LEGS_AFTER_DIVERSIFICATION_{}_OF_{leg_count}",
                    selected.len()
                ),
            );
        }

        let portfolio_score: f64 = selected.iter().map(|leg| leg.parlay_weight).sum();
        let expected_hit_rate: f64 = selected.iter().map(|leg| leg.win_probability).product();
        let avg_edge =
            selected.iter().map(|leg| leg.edge_points).sum::<f64>() / selected.len() as f64;
        let expected_value_proxy = avg_edge * expected_hit_rate;

        ParlayGenerationResult {
            success: true,
            parlay_id: Some(format!(
                "parlay_{}",
                &Uuid::new_v4().simple().to_string()[..12]
            )),
            mode: request.mode,
            risk_profile_requested: request.risk_profile,
            risk_profile_used: profile,
            leg_count_requested: request.leg_count,
            leg_count_used: selected.len(),
            legs: selected,
            portfolio_score,
            expected_hit_rate,
            expected_value_proxy,
            fallback_steps_taken: Vec::new(),
            fail_reason: None,
            generation_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    fn apply_constraints(
        candidates: &[ParlayLegCandidate],
        constraints: &RiskProfileConstraints,
    ) -> Vec<ParlayLegCandidate> {
        let mut filtered = Vec::new();
        let mut high_vol_count = 0usize;
        let mut unstable_count = 0usize;
        let mut prop_count = 0usize;

        for candidate in candidates {
            if !candidate.parlay_eligible {
                continue;
            }
            if candidate.win_probability < constraints.min_win_prob {
                continue;
            }
            if candidate.parlay_weight < constraints.min_parlay_weight {
                continue;
            }
            if candidate.strict_state == StrictState::Lean && !constraints.allow_lean {
                continue;
            }

            let is_high_vol = candidate.volatility_band == super::VolatilityBand::High;
            let is_unstable = !candidate.distribution_stable;
            let is_prop = candidate.market_type == LegMarket::PlayerProp;

            if is_high_vol && high_vol_count >= constraints.max_high_vol_legs {
                continue;
            }
            if is_unstable && unstable_count >= constraints.max_unstable_legs {
                continue;
            }
            if is_prop && prop_count >= constraints.max_prop_legs {
                continue;
            }

            filtered.push(candidate.clone());
            high_vol_count += is_high_vol as usize;
            unstable_count += is_unstable as usize;
            prop_count += is_prop as usize;
        }
        filtered
    }

    fn diversify_selection(
        candidates: &[ParlayLegCandidate],
        leg_count: usize,
        allow_same_game: bool,
        allow_cross_sport: bool,
    ) -> Vec<ParlayLegCandidate> {
        let mut selected = Vec::new();
        let mut seen_events = HashSet::new();
        let mut seen_sports = HashSet::new();

        for candidate in candidates {
            if selected.len() >= leg_count {
                break;
            }
            if !allow_same_game && seen_events.contains(&candidate.event_id) {
                continue;
            }
            if !allow_cross_sport
                && !seen_sports.is_empty()
                && !seen_sports.contains(&candidate.sport_key)
            {
                continue;
            }
            seen_events.insert(candidate.event_id.clone());
            seen_sports.insert(candidate.sport_key.clone());
            selected.push(candidate.clone());
        }
        selected
    }

    fn fail_result(
        &self,
        request: &GenerationRequest,
        fail_reason: &str,
        fallback_steps: Vec<String>,
    ) -> ParlayGenerationResult {
        ParlayGenerationResult {
            success: false,
            parlay_id: None,
            mode: request.mode,
            risk_profile_requested: request.risk_profile,
            risk_profile_used: request.risk_profile,
            leg_count_requested: request.leg_count,
            leg_count_used: 0,
            legs: Vec::new(),
            portfolio_score: 0.0,
            expected_hit_rate: 0.0,
            expected_value_proxy: 0.0,
            fallback_steps_taken: fallback_steps,
            fail_reason: Some(fail_reason.to_string()),
            generation_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    fn fail_result_for(
        &self,
        request: &GenerationRequest,
        profile: RiskProfile,
        leg_count: usize,
        fail_reason: &str,
    ) -> ParlayGenerationResult {
        let mut result = self.fail_result(request, fail_reason, Vec::new());
        result.risk_profile_used = profile;
        result.leg_count_requested = leg_count;
        result
    }

    /// Every generation attempt is persisted for valuation-grade tracking.
    async fn log_generation_audit(
        &self,
        attempt_id: &str,
        candidates: &[ParlayLegCandidate],
        request: &GenerationRequest,
        result: &ParlayGenerationResult,
    ) {
        let Some(store) = &self.store else { return };

        let picks = candidates
            .iter()
            .filter(|c| c.strict_state == StrictState::Pick)
            .count();
        let leans = candidates
            .iter()
            .filter(|c| c.strict_state == StrictState::Lean)
            .count();
        let audit = json!({
            "attempt_id": attempt_id,
            "mode": request.mode,
            "risk_profile_requested": request.risk_profile,
            "risk_profile_used": result.risk_profile_used,
            "leg_count_requested": request.leg_count,
            "leg_count_used": result.leg_count_used,
            "candidates_total": candidates.len(),
            "candidates_pick": picks,
            "candidates_lean": leans,
            "constraints_applied": RiskProfileConstraints::get(request.risk_profile),
            "fallback_steps_taken": result.fallback_steps_taken,
            "result_status": if result.success { "SUCCESS" } else { "FAIL" },
            "fail_reason_codes": result.fail_reason.iter().collect::<Vec<_>>(),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        });
        if let Err(e) = store
            .insert(collections::PARLAY_AUDIT, attempt_id, audit)
            .await
        {
            error!(error = %e, "failed to log parlay audit");
        }
        info!(
            status = if result.success { "SUCCESS" } else { "FAIL" },
            legs = result.leg_count_used,
            fallbacks = result.fallback_steps_taken.len(),
            "📊 parlay audit"
        );
    }
}

/// Terminal recommendation text from expected value and risk score.
pub fn recommendation_text(expected_value: f64, risk_score: &str) -> &'static str {
    if expected_value < -0.05 {
        "AVOID - Negative expected value"
    } else if expected_value < 0.02 {
        "PASS - Minimal edge"
    } else if expected_value >= 0.10 && (risk_score == "LOW" || risk_score == "MEDIUM") {
        "STRONG PLAY - High EV with manageable risk"
    } else if expected_value >= 0.05 {
        "CONSIDER - Positive EV"
    } else {
        "PASS - Risk outweighs reward"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ParlayOptimizationEngine {
        ParlayOptimizationEngine::new(None)
    }

    fn pick(event: &str, sport: &str) -> ParlayLegCandidate {
        let mut c = ParlayLegCandidate::game_line(event, sport, LegMarket::Spread);
        c.win_probability = 0.61;
        c.edge_points = 3.5;
        c.confidence = 75.0;
        c
    }

    fn lean(event: &str, sport: &str) -> ParlayLegCandidate {
        let mut c = ParlayLegCandidate::game_line(event, sport, LegMarket::Spread);
        c.strict_state = StrictState::Lean;
        // Below BALANCED's 0.55 min win prob, above HIGH_VOLATILITY's 0.50;
        // strong enough on edge/confidence to stay parlay eligible.
        c.win_probability = 0.53;
        c.edge_points = 5.0;
        c.confidence = 90.0;
        c
    }

    #[tokio::test]
    async fn happy_path_selects_requested_legs() {
        let candidates: Vec<_> = (0..6).map(|i| pick(&format!("evt_{i}"), "nba")).collect();
        let request = GenerationRequest {
            leg_count: 4,
            ..Default::default()
        };
        let result = engine().generate_parlay(&candidates, &request).await;
        assert!(result.success);
        assert_eq!(result.leg_count_used, 4);
        assert_eq!(result.risk_profile_used, RiskProfile::Balanced);
        assert!(result.fallback_steps_taken.is_empty());
        assert!(result.expected_hit_rate > 0.0 && result.expected_hit_rate < 1.0);
        assert!(result.portfolio_score > 0.0);
        assert!(!result.legs.is_empty());
    }

    #[tokio::test]
    async fn lean_only_slate_falls_all_the_way_to_high_volatility() {
        let candidates: Vec<_> = (0..6).map(|i| lean(&format!("evt_{i}"), "nba")).collect();
        let request = GenerationRequest {
            risk_profile: RiskProfile::HighConfidence,
            leg_count: 5,
            ..Default::default()
        };
        let result = engine().generate_parlay(&candidates, &request).await;
        assert!(result.success);
        assert_eq!(result.risk_profile_used, RiskProfile::HighVolatility);
        assert!(result.leg_count_used <= 5);
        for step in ["FALLBACK_TO_BALANCED", "ENABLE_HIGHER_RISK_LEGS", "FALLBACK_TO_HIGH_VOL"] {
            assert!(
                result.fallback_steps_taken.contains(&step.to_string()),
                "missing {step} in {:?}",
                result.fallback_steps_taken
            );
        }
    }

    #[tokio::test]
    async fn empty_slate_is_structured_failure() {
        let result = engine()
            .generate_parlay(&[], &GenerationRequest::default())
            .await;
        assert!(!result.success);
        assert!(result.legs.is_empty());
        assert_eq!(
            result.fail_reason.as_deref(),
            Some("NO_ELIGIBLE_CANDIDATES_DI_MV_FAILED")
        );
    }

    #[tokio::test]
    async fn exhausted_ladder_reports_the_code() {
        // Candidates that pass DI/MV but never survive constraints: NO_PLAY
        // excluded, and the rest fail the pool probability floor.
        let mut weak = pick("evt_1", "nba");
        weak.win_probability = 0.40;
        weak.edge_points = 0.5;
        let result = engine()
            .generate_parlay(&[weak], &GenerationRequest::default())
            .await;
        assert!(!result.success);
        assert!(result.fail_reason.is_some());
    }

    #[tokio::test]
    async fn ladder_attempt_count_is_bounded() {
        // Enough eligible candidates to pass pool filtering but too few for
        // any leg count: ladder must terminate with the exhaustion code.
        let candidates = vec![pick("evt_1", "nba"), pick("evt_2", "nba")];
        let request = GenerationRequest {
            risk_profile: RiskProfile::HighConfidence,
            leg_count: 8,
            ..Default::default()
        };
        let result = engine().generate_parlay(&candidates, &request).await;
        assert!(!result.success);
        assert_eq!(
            result.fail_reason.as_deref(),
            Some("FALLBACK_EXHAUSTED_NO_VALID_LEGS")
        );
        // Steps: 3 profile relaxations + (8 - 3) leg reductions.
        assert_eq!(result.fallback_steps_taken.len(), 3 + (8 - MIN_LEG_COUNT));
    }

    #[tokio::test]
    async fn same_game_diversification() {
        let mut candidates = vec![
            pick("evt_1", "nba"),
            pick("evt_1", "nba"),
            pick("evt_2", "nba"),
            pick("evt_3", "nba"),
        ];
        candidates[1].market_type = LegMarket::Total;

        let request = GenerationRequest {
            leg_count: 3,
            allow_same_game: false,
            ..Default::default()
        };
        let result = engine().generate_parlay(&candidates, &request).await;
        assert!(result.success);
        let events: HashSet<_> = result.legs.iter().map(|l| l.event_id.clone()).collect();
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn strict_mode_requires_pick_and_can_parlay() {
        let mut not_parlayable = pick("evt_1", "nba");
        not_parlayable.can_parlay = false;
        let candidates = vec![
            not_parlayable,
            lean("evt_2", "nba"),
            pick("evt_3", "nba"),
            pick("evt_4", "nba"),
            pick("evt_5", "nba"),
        ];
        let request = GenerationRequest {
            mode: TruthMode::Strict,
            leg_count: 3,
            ..Default::default()
        };
        let result = engine().generate_parlay(&candidates, &request).await;
        assert!(result.success);
        assert!(result
            .legs
            .iter()
            .all(|l| l.strict_state == StrictState::Pick && l.can_parlay));
    }

    #[tokio::test]
    async fn props_gated_by_integrity() {
        let mut risky_prop = pick("evt_1", "nba");
        risky_prop.market_type = LegMarket::PlayerProp;
        risky_prop.prop_risk_band = PropRiskBand::High;
        let mut fine_prop = pick("evt_2", "nba");
        fine_prop.market_type = LegMarket::PlayerProp;
        let candidates = vec![
            risky_prop,
            fine_prop,
            pick("evt_3", "nba"),
            pick("evt_4", "nba"),
        ];
        let request = GenerationRequest {
            leg_count: 3,
            ..Default::default()
        };
        let result = engine().generate_parlay(&candidates, &request).await;
        assert!(result.success);
        assert!(!result.legs.iter().any(|l| l.event_id == "evt_1"));
    }

    #[test]
    fn recommendation_thresholds() {
        assert!(recommendation_text(-0.10, "LOW").starts_with("AVOID"));
        assert!(recommendation_text(0.01, "LOW").starts_with("PASS"));
        assert!(recommendation_text(0.12, "MEDIUM").starts_with("STRONG PLAY"));
        assert!(recommendation_text(0.06, "HIGH").starts_with("CONSIDER"));
        assert!(recommendation_text(0.03, "EXTREME").starts_with("PASS"));
    }
}
