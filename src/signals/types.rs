//! Signal Domain Types
//!
//! The signal is the central aggregate: it exclusively owns its market
//! snapshots, simulation runs, and entry snapshot. List fields are
//! append-only; once published the entry is frozen; once locked only
//! grading may follow.

use crate::sport::{BetResult, EdgeState, MarketKey, Sport, VolatilityLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalWave {
    #[serde(rename = "WAVE_1_DISCOVERY")]
    Wave1Discovery,
    #[serde(rename = "WAVE_2_VALIDATION")]
    Wave2Validation,
    #[serde(rename = "WAVE_3_PUBLISH")]
    Wave3Publish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalState {
    Discovered,
    Validating,
    Validated,
    Unstable,
    Published,
    Withdrawn,
    Locked,
    Graded,
    NoPlay,
    Lean,
    Pick,
}

impl SignalState {
    /// States that admit no further mutation except grading.
    pub fn is_terminal_except_grading(&self) -> bool {
        matches!(self, SignalState::Locked)
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, SignalState::Pick | SignalState::Lean)
    }
}

impl std::fmt::Display for SignalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SignalState::Discovered => "DISCOVERED",
            SignalState::Validating => "VALIDATING",
            SignalState::Validated => "VALIDATED",
            SignalState::Unstable => "UNSTABLE",
            SignalState::Published => "PUBLISHED",
            SignalState::Withdrawn => "WITHDRAWN",
            SignalState::Locked => "LOCKED",
            SignalState::Graded => "GRADED",
            SignalState::NoPlay => "NO_PLAY",
            SignalState::Lean => "LEAN",
            SignalState::Pick => "PICK",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalIntent {
    #[serde(rename = "TRUTH_MODE")]
    TruthMode,
    #[serde(rename = "PARLAY_MODE")]
    ParlayMode,
    #[serde(rename = "B2B")]
    B2b,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadQuote {
    /// Home-perspective line (negative = home favored).
    pub line: f64,
    pub home_price: i32,
    pub away_price: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TotalQuote {
    pub line: f64,
    pub over_price: i32,
    pub under_price: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoneylineQuote {
    pub home_price: i32,
    pub away_price: i32,
}

/// Prices captured from one book at one instant. Immutable once written;
/// the content hash deduplicates identical captures within a recent window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub snapshot_id: String,
    pub game_id: String,
    pub captured_at: DateTime<Utc>,
    pub wave: SignalWave,
    pub book: String,
    pub spread: Option<SpreadQuote>,
    pub total: Option<TotalQuote>,
    pub moneyline: Option<MoneylineQuote>,
    pub snapshot_hash: String,
    /// Line movement vs the previous snapshot on the same signal.
    #[serde(default)]
    pub spread_delta: Option<f64>,
    #[serde(default)]
    pub total_delta: Option<f64>,
}

impl MarketSnapshot {
    /// Content hash over the price-bearing fields.
    pub fn content_hash(
        game_id: &str,
        book: &str,
        spread: &Option<SpreadQuote>,
        total: &Option<TotalQuote>,
        moneyline: &Option<MoneylineQuote>,
    ) -> String {
        let payload = serde_json::json!({
            "game_id": game_id,
            "book": book,
            "spread": spread,
            "total": total,
            "moneyline": moneyline,
        });
        let digest = Sha256::digest(payload.to_string().as_bytes());
        hex::encode(digest)[..16].to_string()
    }
}

/// One simulation pass as recorded on a signal: the evaluation outcome the
/// stability checks compare across waves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRun {
    pub run_id: String,
    pub wave: SignalWave,
    pub created_at: DateTime<Utc>,
    pub num_sims: u64,
    pub model_version: String,
    #[serde(default)]
    pub seed: Option<u64>,
    pub edge_state: EdgeState,
    pub compressed_edge: f64,
    pub raw_edge: f64,
    pub volatility: VolatilityLevel,
    pub distribution_flag: crate::sport::DistributionFlag,
    #[serde(default)]
    pub sharp_side: Option<String>,
    #[serde(default)]
    pub convergence_rate: f64,
}

/// The edge is the price we captured: frozen at publish, line movement is
/// measured against it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub sharp_side: String,
    pub market_type: MarketKey,
    #[serde(default)]
    pub entry_line: Option<f64>,
    #[serde(default)]
    pub entry_total: Option<f64>,
    pub entry_odds: i32,
    #[serde(default)]
    pub max_acceptable_line: Option<f64>,
    #[serde(default)]
    pub max_acceptable_total: Option<f64>,
    #[serde(default)]
    pub max_acceptable_odds: Option<i32>,
    pub captured_at: DateTime<Utc>,
    pub captured_wave: SignalWave,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub passed: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl GateResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reasons: Vec::new(),
        }
    }

    pub fn fail(reason: &str) -> Self {
        Self {
            passed: false,
            reasons: vec![reason.to_string()],
        }
    }
}

/// Conjunction of the named sub-gates. All must pass for PICK/LEAN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateEvaluation {
    pub data_integrity: GateResult,
    pub sim_power: GateResult,
    pub model_validity: GateResult,
    pub volatility: GateResult,
    pub publish_rcl: GateResult,
}

impl GateEvaluation {
    pub fn all_pass() -> Self {
        Self {
            data_integrity: GateResult::pass(),
            sim_power: GateResult::pass(),
            model_validity: GateResult::pass(),
            volatility: GateResult::pass(),
            publish_rcl: GateResult::pass(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.data_integrity.passed
            && self.sim_power.passed
            && self.model_validity.passed
            && self.volatility.passed
            && self.publish_rcl.passed
    }

    pub fn all_reasons(&self) -> Vec<String> {
        [
            &self.data_integrity,
            &self.sim_power,
            &self.model_validity,
            &self.volatility,
            &self.publish_rcl,
        ]
        .iter()
        .flat_map(|g| g.reasons.iter().cloned())
        .collect()
    }

    /// Names of gates whose pass/fail flipped between two evaluations.
    pub fn changed_gates(&self, other: &GateEvaluation) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.data_integrity.passed != other.data_integrity.passed {
            changed.push("data_integrity");
        }
        if self.sim_power.passed != other.sim_power.passed {
            changed.push("sim_power");
        }
        if self.model_validity.passed != other.model_validity.passed {
            changed.push("model_validity");
        }
        if self.volatility.passed != other.volatility.passed {
            changed.push("volatility");
        }
        if self.publish_rcl.passed != other.publish_rcl.passed {
            changed.push("publish_rcl");
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RobustnessLabel {
    Robust,
    Fragile,
}

/// The central aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub game_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub game_time: DateTime<Utc>,
    pub intent: SignalIntent,
    pub market_key: MarketKey,
    pub state: SignalState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,

    // Edge data carried for delta/robustness computation.
    pub edge_points: f64,
    pub win_prob: f64,
    pub volatility_bucket: VolatilityLevel,
    #[serde(default)]
    pub sharp_side: Option<String>,
    pub gates: GateEvaluation,

    // Append-only sub-entities.
    #[serde(default)]
    pub snapshots: Vec<MarketSnapshot>,
    #[serde(default)]
    pub runs: Vec<SignalRun>,

    #[serde(default)]
    pub entry: Option<EntrySnapshot>,

    #[serde(default)]
    pub freeze_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub freeze_reason: Option<String>,

    #[serde(default)]
    pub robustness_label: Option<RobustnessLabel>,
    #[serde(default)]
    pub robustness_score: Option<i32>,

    #[serde(default)]
    pub result: Option<BetResult>,
    #[serde(default)]
    pub final_score_home: Option<i32>,
    #[serde(default)]
    pub final_score_away: Option<i32>,
    #[serde(default)]
    pub graded_at: Option<DateTime<Utc>>,
}

/// What changed between two signals on the same market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDelta {
    pub delta_id: String,
    pub from_signal_id: String,
    pub to_signal_id: String,
    pub game_id: String,
    pub market_key: MarketKey,
    pub computed_at: DateTime<Utc>,
    pub delta_edge_points: f64,
    pub delta_win_prob: f64,
    pub state_changed: bool,
    pub previous_state: SignalState,
    pub new_state: SignalState,
    pub volatility_bucket_changed: bool,
    #[serde(default)]
    pub previous_volatility: Option<VolatilityLevel>,
    #[serde(default)]
    pub new_volatility: Option<VolatilityLevel>,
    pub gate_changes: Vec<String>,
    pub line_moved: bool,
    #[serde(default)]
    pub line_move_points: Option<f64>,
    pub change_summary: String,
}

/// Strict-mode classification from gates + probability + edge.
pub fn classify_state(gates: &GateEvaluation, win_prob: f64, edge_points: f64) -> SignalState {
    if !gates.all_passed() {
        return SignalState::NoPlay;
    }
    if win_prob >= 0.58 && edge_points.abs() >= 3.0 {
        SignalState::Pick
    } else if win_prob >= 0.54 && edge_points.abs() >= 1.5 {
        SignalState::Lean
    } else {
        SignalState::NoPlay
    }
}
