//! Tilt Detection
//!
//! Watches per-user betting cadence and sizing for emotional-betting
//! patterns. At most one alert per user per hour for the same reason class.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const FREQUENCY_WINDOW_MINUTES: i64 = 10;
const FREQUENCY_LIMIT: usize = 3;
const OVERSIZED_MULTIPLIER: f64 = 3.0;
const RAPID_BET_SECONDS: i64 = 120;
const LOSS_STREAK_LIMIT: u32 = 3;
const ALERT_COOLDOWN_HOURS: i64 = 1;
const HISTORY_RETENTION_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TiltReason {
    HighFrequency,
    OversizedBet,
    RapidBetting,
    LossStreak,
}

impl std::fmt::Display for TiltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TiltReason::HighFrequency => "HIGH_FREQUENCY",
            TiltReason::OversizedBet => "OVERSIZED_BET",
            TiltReason::RapidBetting => "RAPID_BETTING",
            TiltReason::LossStreak => "LOSS_STREAK",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiltAlert {
    pub reason: TiltReason,
    pub bet_count: usize,
    pub timeframe: String,
    pub unit_size: f64,
    pub recommended_action: String,
}

#[derive(Default)]
pub struct TiltDetector {
    bet_history: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    last_alert: Mutex<HashMap<(String, TiltReason), DateTime<Utc>>>,
}

impl TiltDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a bet and check every tilt pattern. Returns an alert only when
    /// a pattern fires and its hourly cooldown for this user has elapsed.
    pub fn track_bet(
        &self,
        user_id: &str,
        amount: f64,
        unit_size: f64,
        loss_streak: u32,
        now: DateTime<Utc>,
    ) -> Option<TiltAlert> {
        let previous_bet = {
            let mut history = self.bet_history.lock();
            let entries = history.entry(user_id.to_string()).or_default();
            entries.retain(|ts| now - *ts < Duration::hours(HISTORY_RETENTION_HOURS));
            let previous = entries.last().copied();
            entries.push(now);
            previous
        };

        let alert = self
            .check_high_frequency(user_id, unit_size, now)
            .or_else(|| Self::check_oversized(amount, unit_size))
            .or_else(|| Self::check_rapid(previous_bet, unit_size, now))
            .or_else(|| Self::check_loss_streak(loss_streak, unit_size))?;

        self.allow_alert(user_id, alert.reason, now).then_some(alert)
    }

    fn check_high_frequency(
        &self,
        user_id: &str,
        unit_size: f64,
        now: DateTime<Utc>,
    ) -> Option<TiltAlert> {
        let history = self.bet_history.lock();
        let recent = history
            .get(user_id)?
            .iter()
            .filter(|ts| now - **ts < Duration::minutes(FREQUENCY_WINDOW_MINUTES))
            .count();
        (recent > FREQUENCY_LIMIT).then(|| TiltAlert {
            reason: TiltReason::HighFrequency,
            bet_count: recent,
            timeframe: format!("{FREQUENCY_WINDOW_MINUTES} minutes"),
            unit_size,
            recommended_action: format!(
                "{recent} bets in {FREQUENCY_WINDOW_MINUTES} minutes. Take a break and review \
                 your strategy before the next bet."
            ),
        })
    }

    fn check_oversized(amount: f64, unit_size: f64) -> Option<TiltAlert> {
        (unit_size > 0.0 && amount > unit_size * OVERSIZED_MULTIPLIER).then(|| TiltAlert {
            reason: TiltReason::OversizedBet,
            bet_count: 1,
            timeframe: "current bet".to_string(),
            unit_size,
            recommended_action: format!(
                "This bet (${amount:.2}) is {:.1}x your normal unit size. Stick to your \
                 sizing plan.",
                amount / unit_size
            ),
        })
    }

    fn check_rapid(
        previous_bet: Option<DateTime<Utc>>,
        unit_size: f64,
        now: DateTime<Utc>,
    ) -> Option<TiltAlert> {
        let previous = previous_bet?;
        let gap = (now - previous).num_seconds();
        (gap < RAPID_BET_SECONDS).then(|| TiltAlert {
            reason: TiltReason::RapidBetting,
            bet_count: 2,
            timeframe: format!("{gap} seconds"),
            unit_size,
            recommended_action: "Bets are landing too quickly for proper analysis. Wait a few \
                                 minutes between bets."
                .to_string(),
        })
    }

    fn check_loss_streak(loss_streak: u32, unit_size: f64) -> Option<TiltAlert> {
        (loss_streak >= LOSS_STREAK_LIMIT).then(|| TiltAlert {
            reason: TiltReason::LossStreak,
            bet_count: loss_streak as usize,
            timeframe: "recent bets".to_string(),
            unit_size,
            recommended_action: format!(
                "{loss_streak} straight losses. Emotional betting risk is high; consider \
                 stepping away for a day."
            ),
        })
    }

    fn allow_alert(&self, user_id: &str, reason: TiltReason, now: DateTime<Utc>) -> bool {
        let mut last_alert = self.last_alert.lock();
        let key = (user_id.to_string(), reason);
        match last_alert.get(&key) {
            Some(last) if now - *last < Duration::hours(ALERT_COOLDOWN_HOURS) => false,
            _ => {
                last_alert.insert(key, now);
                true
            }
        }
    }

    /// Reset tracking for a user (after a break period).
    pub fn reset_user(&self, user_id: &str) {
        self.bet_history.lock().remove(user_id);
        self.last_alert
            .lock()
            .retain(|(user, _), _| user != user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_frequency_fires_above_three_bets_in_ten_minutes() {
        let detector = TiltDetector::new();
        let start = Utc::now();
        for i in 0..3 {
            // Spaced out beyond the rapid-bet threshold.
            let at = start + Duration::seconds(i * 180);
            assert!(detector.track_bet("u1", 100.0, 100.0, 0, at).is_none());
        }
        let alert = detector
            .track_bet("u1", 100.0, 100.0, 0, start + Duration::seconds(540))
            .expect("fourth bet in window should trigger");
        assert_eq!(alert.reason, TiltReason::HighFrequency);
        assert_eq!(alert.bet_count, 4);
    }

    #[test]
    fn oversized_bet_fires_immediately() {
        let detector = TiltDetector::new();
        let alert = detector
            .track_bet("u1", 400.0, 100.0, 0, Utc::now())
            .expect("4x unit bet should trigger");
        assert_eq!(alert.reason, TiltReason::OversizedBet);
    }

    #[test]
    fn rapid_betting_fires_under_two_minutes() {
        let detector = TiltDetector::new();
        let start = Utc::now();
        assert!(detector.track_bet("u1", 100.0, 100.0, 0, start).is_none());
        let alert = detector
            .track_bet("u1", 100.0, 100.0, 0, start + Duration::seconds(45))
            .expect("45s gap should trigger");
        assert_eq!(alert.reason, TiltReason::RapidBetting);
        assert!(alert.timeframe.contains("45"));
    }

    #[test]
    fn loss_streak_advisory() {
        let detector = TiltDetector::new();
        let alert = detector
            .track_bet("u1", 100.0, 100.0, 3, Utc::now())
            .expect("3 losses should trigger");
        assert_eq!(alert.reason, TiltReason::LossStreak);
    }

    #[test]
    fn one_alert_per_reason_class_per_hour() {
        let detector = TiltDetector::new();
        let start = Utc::now();
        assert!(detector.track_bet("u1", 400.0, 100.0, 0, start).is_some());
        // Same reason 10 minutes later: suppressed.
        assert!(detector
            .track_bet("u1", 500.0, 100.0, 0, start + Duration::minutes(10))
            .is_none());
        // Different reason class still alerts...
        let alert = detector
            .track_bet("u1", 100.0, 100.0, 4, start + Duration::minutes(20))
            .expect("loss streak is a different reason class");
        assert_eq!(alert.reason, TiltReason::LossStreak);
        // ...and the original reason fires again after the cooldown.
        assert!(detector
            .track_bet("u1", 450.0, 100.0, 0, start + Duration::minutes(90))
            .is_some());
    }

    #[test]
    fn users_are_tracked_independently() {
        let detector = TiltDetector::new();
        let now = Utc::now();
        assert!(detector.track_bet("u1", 400.0, 100.0, 0, now).is_some());
        assert!(detector.track_bet("u2", 400.0, 100.0, 0, now).is_some());
    }
}
