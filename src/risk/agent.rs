//! Risk Management Agent
//!
//! Consumes `risk.alerts`, `user.activity`, and `parlay.responses`;
//! publishes advisories on `risk.responses`. Bet-size validation, Kelly
//! sizing, parlay risk assessment, bankroll health, and tilt alerts.

use super::tilt::TiltDetector;
use super::{AlertLevel, BankrollHealth, UserRiskProfile};
use crate::bus::{topics, EventEnvelope, SharedPublisher};
use crate::sport::american_to_decimal;
use crate::store::{collections, SharedStore};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{error, warn};
use uuid::Uuid;

/// Fractional-Kelly cap: never suggest more than 5% of bankroll.
const KELLY_CAP: f64 = 0.05;

/// Kelly criterion: `(b·p − q) / b` with `b = decimal − 1`, clamped to
/// [0, KELLY_CAP] of bankroll.
pub fn kelly_size(bankroll: f64, win_probability: f64, odds: i32) -> f64 {
    let b = american_to_decimal(odds) - 1.0;
    if b <= 0.0 {
        return 0.0;
    }
    let p = win_probability;
    let q = 1.0 - p;
    let kelly_pct = ((b * p - q) / b).clamp(0.0, KELLY_CAP);
    bankroll * kelly_pct
}

pub struct RiskAgent {
    publisher: SharedPublisher,
    store: SharedStore,
    profiles: RwLock<HashMap<String, UserRiskProfile>>,
    tilt: TiltDetector,
}

impl RiskAgent {
    pub fn new(publisher: SharedPublisher, store: SharedStore) -> Self {
        Self {
            publisher,
            store,
            profiles: RwLock::new(HashMap::new()),
            tilt: TiltDetector::new(),
        }
    }

    // ------------------------------------------------------------------
    // Bus handlers
    // ------------------------------------------------------------------

    /// `risk.alerts`: bet_size_check / parlay_risk_check / bankroll_alert.
    pub async fn handle_risk_check(&self, envelope: EventEnvelope) -> Result<()> {
        let data = envelope.data;
        let user_id = data["user_id"].as_str().unwrap_or("unknown").to_string();
        match data["type"].as_str() {
            Some("bet_size_check") => self.check_bet_size(&user_id, &data).await,
            Some("parlay_risk_check") => self.check_parlay_risk(&user_id, &data).await,
            Some("bankroll_alert") => self.check_bankroll_health(&user_id).await,
            other => {
                warn!(kind = ?other, "unhandled risk check type");
                Ok(())
            }
        }
    }

    /// `user.activity`: bet placement feeds tilt detection.
    pub async fn handle_user_activity(&self, envelope: EventEnvelope) -> Result<()> {
        let data = envelope.data;
        let Some(user_id) = data["user_id"].as_str().map(str::to_string) else {
            return Ok(());
        };
        match data["activity_type"].as_str() {
            Some("bet_placed") => {
                let amount = data["amount"].as_f64().unwrap_or(0.0);
                self.track_bet(&user_id, amount).await
            }
            Some("loss") => self.check_bankroll_health(&user_id).await,
            _ => Ok(()),
        }
    }

    /// `parlay.responses`: attach sizing guidance to finished analyses.
    pub async fn handle_parlay_response(&self, envelope: EventEnvelope) -> Result<()> {
        let data = envelope.data;
        if data["type"].as_str() != Some("parlay_analysis") {
            return Ok(());
        }
        let user_id = data["user_id"].as_str().unwrap_or("unknown").to_string();
        let profile = self.get_profile(&user_id).await;

        let combined_prob = data["combined_probability"].as_f64().unwrap_or(0.0) / 100.0;
        let parlay_odds = data["parlay_odds"].as_f64().unwrap_or(1.0);
        let ev = data["expected_value"].as_f64().unwrap_or(0.0) / 100.0;

        let suggested_units = if combined_prob > 0.3 { 0.5 } else { 0.25 };
        let suggested_amount = (profile.bankroll * 0.01) * suggested_units;
        let breakeven_needed = if parlay_odds > 0.0 {
            round4(1.0 / parlay_odds)
        } else {
            0.0
        };

        let guidance = json!({
            "suggested_bet_amount": round2(suggested_amount),
            "suggested_units": suggested_units,
            "max_recommended_amount": round2(profile.bankroll * 0.03),
            "breakeven_needed": breakeven_needed,
            "variance_warning": if combined_prob < 0.2 {
                Some("High variance - prepare for long losing streaks")
            } else {
                None
            },
            "positive_ev": ev > 0.0,
        });

        self.publish_response(json!({
            "type": "parlay_risk_guidance",
            "user_id": user_id,
            "guidance": guidance,
            "timestamp": now_iso(),
        }))
        .await
    }

    /// `feedback.outcomes`: keep loss streaks current (write-through).
    pub async fn handle_feedback_outcome(&self, envelope: EventEnvelope) -> Result<()> {
        let data = envelope.data;
        let Some(user_id) = data["user_id"].as_str().map(str::to_string) else {
            return Ok(());
        };
        let outcome = data["outcome"].as_str().unwrap_or("");
        let mut profile = self.get_profile(&user_id).await;
        match outcome {
            "loss" => profile.recent_loss_streak += 1,
            "win" => profile.recent_loss_streak = 0,
            _ => return Ok(()),
        }
        self.save_profile(&profile).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------

    /// Validate a proposed bet size against the user's profile.
    async fn check_bet_size(&self, user_id: &str, data: &Value) -> Result<()> {
        let amount = data["amount"].as_f64().unwrap_or(0.0);
        let profile = self.get_profile(user_id).await;

        let bankroll_pct = if profile.bankroll > 0.0 {
            amount / profile.bankroll * 100.0
        } else {
            0.0
        };
        let size_multiplier = if profile.avg_bet_size > 0.0 {
            amount / profile.avg_bet_size
        } else {
            1.0
        };

        let mut alert_level = AlertLevel::Safe;
        let mut alerts: Vec<String> = Vec::new();

        if size_multiplier >= 3.0 {
            alert_level = AlertLevel::Danger;
            alerts.push(format!(
                "Bet is {size_multiplier:.1}x your average - potential tilt behavior"
            ));
        }
        if bankroll_pct >= 10.0 {
            alert_level = AlertLevel::Danger;
            alerts.push(format!(
                "Betting {bankroll_pct:.1}% of bankroll - recommended max is 5%"
            ));
        } else if bankroll_pct >= 5.0 {
            if alert_level == AlertLevel::Safe {
                alert_level = AlertLevel::Warning;
            }
            alerts.push(format!(
                "Betting {bankroll_pct:.1}% of bankroll - approaching limit"
            ));
        }

        let win_probability = data["win_probability"].as_f64().unwrap_or(0.52);
        let odds = data["odds"].as_i64().unwrap_or(-110) as i32;
        let suggested = kelly_size(profile.bankroll, win_probability, odds);
        if amount > suggested * 1.5 {
            alerts.push(format!(
                "Kelly criterion suggests ${suggested:.2} (you're betting ${amount:.2})"
            ));
        }

        if alert_level == AlertLevel::Danger {
            warn!(user_id, ?alerts, "🚨 bet size danger");
        }

        self.publish_response(json!({
            "type": "bet_size_assessment",
            "user_id": user_id,
            "alert_level": alert_level,
            "alerts": alerts,
            "recommended_size": round2(suggested),
            "bankroll_percentage": round2(bankroll_pct),
            "size_multiplier": round2(size_multiplier),
            "timestamp": now_iso(),
        }))
        .await
    }

    /// Assess a constructed parlay.
    async fn check_parlay_risk(&self, user_id: &str, data: &Value) -> Result<()> {
        let parlay = &data["parlay_data"];
        let combined_prob = parlay["combined_probability"].as_f64().unwrap_or(0.0) / 100.0;
        let leg_count = parlay["legs"].as_array().map(|l| l.len()).unwrap_or(0);
        let correlation = parlay["correlation_score"].as_f64().unwrap_or(0.0);
        let ev = parlay["expected_value"].as_f64().unwrap_or(0.0);

        let mut risk_level = "MEDIUM";
        let mut alerts: Vec<String> = Vec::new();

        if combined_prob < 0.10 {
            risk_level = "EXTREME";
            alerts.push("Less than 10% chance of hitting - lottery ticket odds".to_string());
        }
        if leg_count >= 5 {
            risk_level = "EXTREME";
            alerts.push(format!(
                "{leg_count}-leg parlay has exponentially lower odds"
            ));
        }
        if correlation > 0.8 {
            alerts.push("High correlation between legs reduces diversification".to_string());
        }
        if ev > 5.0 && combined_prob < 0.20 {
            alerts.push("High EV but low hit rate - variance will be extreme".to_string());
        }

        let recommended_action = if risk_level == "EXTREME" {
            "AVOID - Risk too high for expected return"
        } else if ev < 5.0 {
            "PASS - Risk outweighs potential reward"
        } else if ev > 10.0 {
            "CONSIDER - Strong EV but manage position size"
        } else {
            "PROCEED WITH CAUTION - Use small unit size"
        };

        self.publish_response(json!({
            "type": "parlay_risk_assessment",
            "user_id": user_id,
            "risk_level": risk_level,
            "alerts": alerts,
            "recommended_action": recommended_action,
            "timestamp": now_iso(),
        }))
        .await
    }

    /// Drawdown and loss-streak health check.
    async fn check_bankroll_health(&self, user_id: &str) -> Result<()> {
        let profile = self.get_profile(user_id).await;
        let drawdown = if profile.starting_bankroll > 0.0 {
            (profile.starting_bankroll - profile.bankroll) / profile.starting_bankroll * 100.0
        } else {
            0.0
        };

        let mut health = BankrollHealth::Healthy;
        let mut alerts: Vec<String> = Vec::new();

        if drawdown > 50.0 {
            health = BankrollHealth::Critical;
            alerts.push(format!("Bankroll down {drawdown:.1}% - consider taking a break"));
        } else if drawdown > 30.0 {
            health = BankrollHealth::Warning;
            alerts.push(format!("Bankroll down {drawdown:.1}% - reduce unit sizes"));
        } else if drawdown > 20.0 {
            alerts.push(format!("Bankroll down {drawdown:.1}% - stay disciplined"));
        }

        if profile.recent_loss_streak >= 5 {
            if health == BankrollHealth::Healthy {
                health = BankrollHealth::Warning;
            }
            alerts.push(format!(
                "{} straight losses - avoid emotional betting",
                profile.recent_loss_streak
            ));
        }

        self.publish_response(json!({
            "type": "bankroll_health_check",
            "user_id": user_id,
            "health_status": health,
            "bankroll": profile.bankroll,
            "drawdown_percentage": round2(drawdown),
            "alerts": alerts,
            "timestamp": now_iso(),
        }))
        .await
    }

    /// Feed tilt detection; broadcast and persist any alert.
    async fn track_bet(&self, user_id: &str, amount: f64) -> Result<()> {
        let profile = self.get_profile(user_id).await;
        let Some(alert) = self.tilt.track_bet(
            user_id,
            amount,
            profile.unit_size,
            profile.recent_loss_streak,
            Utc::now(),
        ) else {
            return Ok(());
        };

        warn!(user_id, reason = %alert.reason, "🚨 tilt detected");

        let alert_id = format!("alert_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let record = json!({
            "alert_id": alert_id,
            "user_id": user_id,
            "alert_type": "TILT_DETECTED",
            "reason": alert.reason,
            "bet_count": alert.bet_count,
            "timeframe": alert.timeframe,
            "timestamp": now_iso(),
            "acknowledged": false,
        });
        if let Err(e) = self
            .store
            .insert(collections::RISK_ALERTS, &alert_id, record)
            .await
        {
            error!(error = %e, "failed to persist tilt alert");
        }

        self.publish_response(json!({
            "type": "tilt_alert",
            "user_id": user_id,
            "reason": alert.reason,
            "bet_count": alert.bet_count,
            "timeframe": alert.timeframe,
            "recommended_action": alert.recommended_action,
            "timestamp": now_iso(),
        }))
        .await
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    async fn get_profile(&self, user_id: &str) -> UserRiskProfile {
        if let Some(profile) = self.profiles.read().get(user_id) {
            return profile.clone();
        }
        let profile = match self.store.get(collections::USERS, user_id).await {
            Ok(Some(doc)) => serde_json::from_value(doc)
                .unwrap_or_else(|_| UserRiskProfile::default_for(user_id)),
            Ok(None) => UserRiskProfile::default_for(user_id),
            Err(e) => {
                error!(error = %e, user_id, "profile fetch failed");
                UserRiskProfile::default_for(user_id)
            }
        };
        self.profiles
            .write()
            .insert(user_id.to_string(), profile.clone());
        profile
    }

    async fn save_profile(&self, profile: &UserRiskProfile) {
        self.profiles
            .write()
            .insert(profile.user_id.clone(), profile.clone());
        if let Ok(doc) = serde_json::to_value(profile) {
            if let Err(e) = self
                .store
                .upsert(collections::USERS, &profile.user_id, doc)
                .await
            {
                error!(error = %e, "profile write-through failed");
            }
        }
    }

    /// Seed the cache (tests and warm starts).
    pub fn prime_profile(&self, profile: UserRiskProfile) {
        self.profiles
            .write()
            .insert(profile.user_id.clone(), profile);
    }

    async fn publish_response(&self, payload: Value) -> Result<()> {
        self.publisher.publish(topics::RISK_RESPONSES, payload).await
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
