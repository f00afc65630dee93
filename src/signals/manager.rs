//! Signal Manager
//!
//! Owns signals and their append-only sub-entities. Enforces immutability,
//! locking, delta computation, and robustness scoring. Per-signal mutations
//! are serialized through a keyed async lock so no two concurrent mutators
//! advance the same signal.

use super::types::{
    EntrySnapshot, MarketSnapshot, MoneylineQuote, RobustnessLabel, Signal, SignalDelta,
    SignalIntent, SignalRun, SignalState, SignalWave, SpreadQuote, TotalQuote,
};
use crate::sport::BetResult;
use crate::store::{collections, SharedStore};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::json;
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::sport::{MarketKey, Sport, VolatilityLevel};

#[derive(Debug, Clone)]
pub struct SignalManagerConfig {
    /// Minimum compressed edge (pct) for Wave 3 publish.
    pub min_edge_for_publish: f64,
    /// Maximum Wave 1 → Wave 2 edge drift (pct points).
    pub max_edge_drift: f64,
    /// Default action-freeze window applied on PICK/LEAN entry.
    pub freeze_minutes: i64,
    /// Market moves that release a freeze early.
    pub material_spread_move: f64,
    pub material_total_move: f64,
    /// Snapshot dedup window.
    pub dedup_window_minutes: i64,
    pub robustness_lookback: usize,
}

impl Default for SignalManagerConfig {
    fn default() -> Self {
        Self {
            min_edge_for_publish: 3.0,
            max_edge_drift: 1.5,
            freeze_minutes: 60,
            material_spread_move: 1.0,
            material_total_move: 2.0,
            dedup_window_minutes: 60,
            robustness_lookback: 5,
        }
    }
}

/// Arguments for creating a signal.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub game_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub game_time: DateTime<Utc>,
    pub intent: SignalIntent,
    pub market_key: MarketKey,
    pub state: SignalState,
    pub edge_points: f64,
    pub win_prob: f64,
    pub volatility_bucket: VolatilityLevel,
    pub sharp_side: Option<String>,
    pub gates: super::types::GateEvaluation,
}

pub struct SignalManager {
    store: SharedStore,
    config: SignalManagerConfig,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

fn short_id(prefix: &str) -> String {
    format!("{prefix}_{}", &Uuid::new_v4().simple().to_string()[..12])
}

impl SignalManager {
    pub fn new(store: SharedStore) -> Self {
        Self::with_config(store, SignalManagerConfig::default())
    }

    pub fn with_config(store: SharedStore, config: SignalManagerConfig) -> Self {
        Self {
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SignalManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    fn lock_for(&self, signal_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(signal_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ------------------------------------------------------------------
    // Market snapshots
    // ------------------------------------------------------------------

    /// Create an immutable market snapshot. An identical capture within the
    /// dedup window returns the existing snapshot.
    pub async fn create_market_snapshot(
        &self,
        game_id: &str,
        wave: SignalWave,
        book: &str,
        spread: Option<SpreadQuote>,
        total: Option<TotalQuote>,
        moneyline: Option<MoneylineQuote>,
    ) -> Result<MarketSnapshot> {
        let hash = MarketSnapshot::content_hash(game_id, book, &spread, &total, &moneyline);

        let window_start = Utc::now() - Duration::minutes(self.config.dedup_window_minutes);
        let existing = self
            .store
            .find_eq(collections::MARKET_SNAPSHOTS, "snapshot_hash", &json!(hash), 5)
            .await?;
        for doc in existing {
            let snapshot: MarketSnapshot =
                serde_json::from_value(doc).context("decode market snapshot")?;
            if snapshot.captured_at >= window_start {
                return Ok(snapshot);
            }
        }

        let snapshot = MarketSnapshot {
            snapshot_id: short_id("snap"),
            game_id: game_id.to_string(),
            captured_at: Utc::now(),
            wave,
            book: book.to_string(),
            spread,
            total,
            moneyline,
            snapshot_hash: hash,
            spread_delta: None,
            total_delta: None,
        };
        self.store
            .insert(
                collections::MARKET_SNAPSHOTS,
                &snapshot.snapshot_id,
                serde_json::to_value(&snapshot)?,
            )
            .await?;
        Ok(snapshot)
    }

    // ------------------------------------------------------------------
    // Signal creation and lookup
    // ------------------------------------------------------------------

    pub async fn create_signal(&self, new: NewSignal) -> Result<Signal> {
        let mut signal = Signal {
            signal_id: short_id("sig"),
            game_id: new.game_id,
            sport: new.sport,
            home_team: new.home_team,
            away_team: new.away_team,
            game_time: new.game_time,
            intent: new.intent,
            market_key: new.market_key,
            state: new.state,
            created_at: Utc::now(),
            published_at: None,
            locked_at: None,
            edge_points: new.edge_points,
            win_prob: new.win_prob,
            volatility_bucket: new.volatility_bucket,
            sharp_side: new.sharp_side,
            gates: new.gates,
            snapshots: Vec::new(),
            runs: Vec::new(),
            entry: None,
            freeze_until: None,
            freeze_reason: None,
            robustness_label: None,
            robustness_score: None,
            result: None,
            final_score_home: None,
            final_score_away: None,
            graded_at: None,
        };

        if let Some((label, score)) = self
            .compute_robustness(&signal.game_id, signal.market_key)
            .await?
        {
            signal.robustness_label = Some(label);
            signal.robustness_score = Some(score);
        }

        // Actionable entry gets an automatic freeze window against
        // re-simulation churn.
        if signal.state.is_actionable() {
            signal.freeze_until =
                Some(Utc::now() + Duration::minutes(self.config.freeze_minutes));
            signal.freeze_reason = Some("ACTIONABLE_FIRST_HIT".to_string());
        }

        self.store
            .insert(
                collections::SIGNALS,
                &signal.signal_id,
                serde_json::to_value(&signal)?,
            )
            .await?;
        self.log_signal_event("signal_created", &signal.signal_id, &signal.game_id, None)
            .await?;
        info!(
            signal_id = %signal.signal_id,
            game_id = %signal.game_id,
            state = %signal.state,
            "🆕 signal created"
        );
        Ok(signal)
    }

    pub async fn get_signal(&self, signal_id: &str) -> Result<Option<Signal>> {
        self.store
            .get(collections::SIGNALS, signal_id)
            .await?
            .map(|doc| serde_json::from_value(doc).context("decode signal"))
            .transpose()
    }

    async fn require_signal(&self, signal_id: &str) -> Result<Signal> {
        self.get_signal(signal_id)
            .await?
            .ok_or_else(|| anyhow!("signal {signal_id} not found"))
    }

    pub async fn get_latest_signal(
        &self,
        game_id: &str,
        market_key: MarketKey,
    ) -> Result<Option<Signal>> {
        Ok(self
            .get_signal_history(game_id, market_key, 1)
            .await?
            .into_iter()
            .next())
    }

    /// Signal history for a market, newest first.
    pub async fn get_signal_history(
        &self,
        game_id: &str,
        market_key: MarketKey,
        limit: usize,
    ) -> Result<Vec<Signal>> {
        let docs = self
            .store
            .find_eq(collections::SIGNALS, "game_id", &json!(game_id), limit * 4)
            .await?;
        let mut signals = Vec::new();
        for doc in docs {
            let signal: Signal = serde_json::from_value(doc).context("decode signal")?;
            if signal.market_key == market_key {
                signals.push(signal);
                if signals.len() >= limit {
                    break;
                }
            }
        }
        Ok(signals)
    }

    // ------------------------------------------------------------------
    // Append-only mutation
    // ------------------------------------------------------------------

    /// Append a market snapshot to a signal, computing deltas against the
    /// previous snapshot. Locked and graded signals reject appends.
    pub async fn add_market_snapshot(
        &self,
        signal_id: &str,
        mut snapshot: MarketSnapshot,
    ) -> Result<MarketSnapshot> {
        let lock = self.lock_for(signal_id);
        let _guard = lock.lock().await;

        let signal = self.require_signal(signal_id).await?;
        if matches!(signal.state, SignalState::Locked | SignalState::Graded) {
            bail!(
                "integrity violation: snapshot append on {} signal {signal_id}",
                signal.state
            );
        }

        if let Some(previous) = signal.snapshots.last() {
            // Re-appending an unchanged capture is a no-op.
            if previous.snapshot_hash == snapshot.snapshot_hash {
                return Ok(previous.clone());
            }
            snapshot.spread_delta = match (previous.spread, snapshot.spread) {
                (Some(prev), Some(next)) => Some(next.line - prev.line),
                _ => None,
            };
            snapshot.total_delta = match (previous.total, snapshot.total) {
                (Some(prev), Some(next)) => Some(next.line - prev.line),
                _ => None,
            };
        }

        self.store
            .append_to_list(
                collections::SIGNALS,
                signal_id,
                "snapshots",
                serde_json::to_value(&snapshot)?,
            )
            .await?;

        // A material move releases an advisory freeze early.
        self.maybe_release_freeze(&signal, &snapshot).await?;
        Ok(snapshot)
    }

    /// Append a simulation run to the signal (append-only).
    pub async fn add_signal_run(&self, signal_id: &str, run: SignalRun) -> Result<()> {
        let lock = self.lock_for(signal_id);
        let _guard = lock.lock().await;

        let signal = self.require_signal(signal_id).await?;
        if matches!(signal.state, SignalState::Locked | SignalState::Graded) {
            bail!(
                "integrity violation: run append on {} signal {signal_id}",
                signal.state
            );
        }
        self.store
            .append_to_list(
                collections::SIGNALS,
                signal_id,
                "runs",
                serde_json::to_value(&run)?,
            )
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Publish / lock / grade
    // ------------------------------------------------------------------

    /// Publish: transition to PUBLISHED and freeze the entry snapshot.
    /// Idempotent for an identical entry; a differing second entry is an
    /// integrity violation.
    pub async fn lock_signal_with_entry(
        &self,
        signal_id: &str,
        entry: EntrySnapshot,
    ) -> Result<Signal> {
        let lock = self.lock_for(signal_id);
        let _guard = lock.lock().await;

        let signal = self.require_signal(signal_id).await?;
        match signal.state {
            SignalState::Locked | SignalState::Graded => {
                bail!("integrity violation: publish on {} signal {signal_id}", signal.state)
            }
            SignalState::Published => {
                let existing = signal
                    .entry
                    .as_ref()
                    .ok_or_else(|| anyhow!("published signal {signal_id} missing entry"))?;
                if *existing == entry {
                    return Ok(signal);
                }
                bail!("integrity violation: second entry for published signal {signal_id}");
            }
            _ => {}
        }

        let sharp_side = entry.sharp_side.clone();
        self.store
            .set_fields(
                collections::SIGNALS,
                signal_id,
                json!({
                    "entry": serde_json::to_value(&entry)?,
                    "published_at": Utc::now(),
                    "state": SignalState::Published,
                    "sharp_side": sharp_side,
                }),
            )
            .await?;
        self.log_signal_event("signal_published", signal_id, &signal.game_id, None)
            .await?;
        info!(signal_id, sharp_side = %entry.sharp_side, "🟢 signal published with entry");
        self.require_signal(signal_id).await
    }

    /// Game start: transition to LOCKED. Only grading may follow.
    pub async fn lock_signal_at_game_start(&self, signal_id: &str) -> Result<()> {
        let lock = self.lock_for(signal_id);
        let _guard = lock.lock().await;

        let signal = self.require_signal(signal_id).await?;
        if signal.state == SignalState::Graded {
            bail!("integrity violation: lock on graded signal {signal_id}");
        }
        if signal.state == SignalState::Locked {
            return Ok(());
        }
        self.store
            .set_fields(
                collections::SIGNALS,
                signal_id,
                json!({"state": SignalState::Locked, "locked_at": Utc::now()}),
            )
            .await?;
        self.log_signal_event("signal_locked", signal_id, &signal.game_id, None)
            .await
    }

    pub async fn freeze_signal(&self, signal_id: &str, minutes: i64, reason: &str) -> Result<()> {
        let lock = self.lock_for(signal_id);
        let _guard = lock.lock().await;
        let signal = self.require_signal(signal_id).await?;
        self.store
            .set_fields(
                collections::SIGNALS,
                signal_id,
                json!({
                    "freeze_until": Utc::now() + Duration::minutes(minutes),
                    "freeze_reason": reason,
                }),
            )
            .await?;
        self.log_signal_event(
            "signal_frozen",
            signal_id,
            &signal.game_id,
            Some(json!({"minutes": minutes, "reason": reason})),
        )
        .await
    }

    /// Advisory only: re-simulation logic consults this to skip redundant
    /// work, it is not a lock.
    pub fn is_frozen(signal: &Signal) -> bool {
        signal
            .freeze_until
            .map(|until| Utc::now() < until)
            .unwrap_or(false)
    }

    async fn maybe_release_freeze(
        &self,
        signal: &Signal,
        snapshot: &MarketSnapshot,
    ) -> Result<bool> {
        if !Self::is_frozen(signal) {
            return Ok(false);
        }
        let spread_moved = snapshot
            .spread_delta
            .map(|d| d.abs() >= self.config.material_spread_move)
            .unwrap_or(false);
        let total_moved = snapshot
            .total_delta
            .map(|d| d.abs() >= self.config.material_total_move)
            .unwrap_or(false);
        if !(spread_moved || total_moved) {
            return Ok(false);
        }

        self.store
            .set_fields(
                collections::SIGNALS,
                &signal.signal_id,
                json!({"freeze_until": null, "freeze_reason": null}),
            )
            .await?;
        warn!(
            signal_id = %signal.signal_id,
            spread_delta = ?snapshot.spread_delta,
            total_delta = ?snapshot.total_delta,
            "freeze released on material market move"
        );
        self.log_signal_event(
            "freeze_released",
            &signal.signal_id,
            &signal.game_id,
            Some(json!({
                "spread_delta": snapshot.spread_delta,
                "total_delta": snapshot.total_delta,
            })),
        )
        .await?;
        Ok(true)
    }

    /// Record the final result. Idempotent for a repeated identical grade.
    pub async fn grade_signal(
        &self,
        signal_id: &str,
        home_score: i32,
        away_score: i32,
        result: BetResult,
    ) -> Result<()> {
        let lock = self.lock_for(signal_id);
        let _guard = lock.lock().await;

        let signal = self.require_signal(signal_id).await?;
        if signal.state == SignalState::Graded {
            if signal.result == Some(result) {
                return Ok(());
            }
            bail!("integrity violation: re-grade of {signal_id} with different result");
        }
        self.store
            .set_fields(
                collections::SIGNALS,
                signal_id,
                json!({
                    "state": SignalState::Graded,
                    "result": result,
                    "final_score_home": home_score,
                    "final_score_away": away_score,
                    "graded_at": Utc::now(),
                }),
            )
            .await?;
        self.log_signal_event(
            "signal_graded",
            signal_id,
            &signal.game_id,
            Some(json!({"result": result.to_string()})),
        )
        .await
    }

    pub(crate) async fn set_state(&self, signal_id: &str, state: SignalState) -> Result<()> {
        let signal = self.require_signal(signal_id).await?;
        if signal.state.is_terminal_except_grading() && state != SignalState::Graded {
            bail!(
                "integrity violation: {} → {state} on locked signal {signal_id}",
                signal.state
            );
        }
        self.store
            .set_fields(collections::SIGNALS, signal_id, json!({"state": state}))
            .await?;
        self.log_signal_event(
            "state_changed",
            signal_id,
            &signal.game_id,
            Some(json!({"from": signal.state.to_string(), "to": state.to_string()})),
        )
        .await
    }

    // ------------------------------------------------------------------
    // Delta and robustness
    // ------------------------------------------------------------------

    fn line_value(signal: &Signal) -> Option<f64> {
        let last = signal.snapshots.last()?;
        match signal.market_key {
            MarketKey::Spread | MarketKey::Puckline => last.spread.map(|q| q.line),
            MarketKey::Total => last.total.map(|q| q.line),
            _ => None,
        }
    }

    /// Diff two signals on the same market into a persisted [`SignalDelta`].
    pub async fn compute_delta(
        &self,
        from_signal_id: &str,
        to_signal_id: &str,
    ) -> Result<SignalDelta> {
        let from = self.require_signal(from_signal_id).await?;
        let to = self.require_signal(to_signal_id).await?;

        let delta_edge = to.edge_points - from.edge_points;
        let delta_prob = to.win_prob - from.win_prob;
        let state_changed = from.state != to.state;
        let vol_changed = from.volatility_bucket != to.volatility_bucket;
        let gate_changes: Vec<String> = from
            .gates
            .changed_gates(&to.gates)
            .into_iter()
            .map(str::to_string)
            .collect();

        let from_line = Self::line_value(&from);
        let to_line = Self::line_value(&to);
        let line_move_points = match (from_line, to_line) {
            (Some(a), Some(b)) if (b - a).abs() > f64::EPSILON => Some(b - a),
            _ => None,
        };
        let line_moved = line_move_points.is_some();

        let mut parts = Vec::new();
        if let Some(moved) = line_move_points {
            parts.push(format!("Line moved {:.1} points", moved.abs()));
        }
        if delta_prob.abs() >= 0.03 {
            parts.push(format!("Win prob {:+.1}%", delta_prob * 100.0));
        }
        if state_changed {
            parts.push(format!("{} → {}", from.state, to.state));
        }
        if !gate_changes.is_empty() {
            parts.push(format!("Gates changed: {}", gate_changes.join(", ")));
        }
        let change_summary = if parts.is_empty() {
            "Minor updates".to_string()
        } else {
            parts.join("; ")
        };

        let delta = SignalDelta {
            delta_id: short_id("delta"),
            from_signal_id: from_signal_id.to_string(),
            to_signal_id: to_signal_id.to_string(),
            game_id: to.game_id.clone(),
            market_key: to.market_key,
            computed_at: Utc::now(),
            delta_edge_points: delta_edge,
            delta_win_prob: delta_prob,
            state_changed,
            previous_state: from.state,
            new_state: to.state,
            volatility_bucket_changed: vol_changed,
            previous_volatility: vol_changed.then_some(from.volatility_bucket),
            new_volatility: vol_changed.then_some(to.volatility_bucket),
            gate_changes,
            line_moved,
            line_move_points,
            change_summary,
        };

        self.store
            .insert(
                collections::SIGNAL_DELTAS,
                &delta.delta_id,
                serde_json::to_value(&delta)?,
            )
            .await?;
        Ok(delta)
    }

    /// Robustness over the last N signals for a market: a signal is robust
    /// when it survives re-simulation and line movement. Returns None under
    /// three signals of history.
    pub async fn compute_robustness(
        &self,
        game_id: &str,
        market_key: MarketKey,
    ) -> Result<Option<(RobustnessLabel, i32)>> {
        let signals = self
            .get_signal_history(game_id, market_key, self.config.robustness_lookback)
            .await?;
        if signals.len() < 3 {
            return Ok(None);
        }

        let states: Vec<SignalState> = signals.iter().map(|s| s.state).collect();
        let state_stability =
            states.iter().filter(|s| **s == states[0]).count() as f64 / states.len() as f64;

        let edges: Vec<f64> = signals.iter().map(|s| s.edge_points).collect();
        let edge_std = (&edges[..]).std_dev();
        let edge_std = if edge_std.is_nan() { 0.0 } else { edge_std };

        let buckets: Vec<VolatilityLevel> =
            signals.iter().map(|s| s.volatility_bucket).collect();
        let vol_stability =
            buckets.iter().filter(|b| **b == buckets[0]).count() as f64 / buckets.len() as f64;

        let score = (state_stability * 40.0
            + (1.0 - edge_std / 5.0).max(0.0) * 30.0
            + vol_stability * 30.0) as i32;

        let label = if score >= 70 {
            RobustnessLabel::Robust
        } else {
            RobustnessLabel::Fragile
        };
        Ok(Some((label, score)))
    }

    // ------------------------------------------------------------------
    // Event log
    // ------------------------------------------------------------------

    pub(crate) async fn log_signal_event(
        &self,
        event_type: &str,
        signal_id: &str,
        game_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let event_id = short_id("evt");
        self.store
            .insert(
                collections::SIGNAL_EVENTS,
                &event_id,
                json!({
                    "event_id": event_id,
                    "event_type": event_type,
                    "signal_id": signal_id,
                    "game_id": game_id,
                    "created_at": Utc::now(),
                    "metadata": metadata.unwrap_or(json!({})),
                }),
            )
            .await?;
        Ok(())
    }
}
