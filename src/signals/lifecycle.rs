//! Three-Wave Signal Lifecycle
//!
//! Wave 1 (T-6h) discovery, Wave 2 (T-120m) validation with a stability
//! check, Wave 3 (T-60m) final lock and publish decision. The wave scans
//! orchestrate snapshot capture, evaluation, sharp-side selection, and the
//! state machine; the decision helpers stay pure.

use super::manager::{NewSignal, SignalManager};
use super::types::{
    EntrySnapshot, GateEvaluation, GateResult, MoneylineQuote, Signal, SignalIntent, SignalRun,
    SignalState, SignalWave, SpreadQuote, TotalQuote,
};
use crate::sim::SimulationOutput;
use crate::sport::evaluator::{Confirmations, MarketInputs};
use crate::sport::{
    evaluate_market, select_sharp_side_moneyline, select_sharp_side_spread,
    select_sharp_side_total, validate_sharp_side_alignment, DistributionFlag, EdgeState, MarketKey,
    MarketEvaluation, SharpAction, SharpSideSelection, Sport, TotalSide,
};
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

/// Minimum simulation count for the SIM_POWER gate.
const MIN_SIM_POWER: u64 = 10_000;

/// The game a scan operates on.
#[derive(Debug, Clone)]
pub struct GameInfo {
    pub game_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub game_time: DateTime<Utc>,
}

/// Market prices for a scan, from one book.
#[derive(Debug, Clone)]
pub struct MarketQuotes {
    pub book: String,
    pub spread: Option<SpreadQuote>,
    pub total: Option<TotalQuote>,
    pub moneyline: Option<MoneylineQuote>,
    pub confirmations: Confirmations,
}

/// Wave execution times relative to game start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveTiming {
    pub wave1_start: DateTime<Utc>,
    pub wave2_start: DateTime<Utc>,
    pub wave3_start: DateTime<Utc>,
    pub lock_time: DateTime<Utc>,
}

pub fn wave_timing(game_time: DateTime<Utc>) -> WaveTiming {
    WaveTiming {
        wave1_start: game_time - Duration::hours(6),
        wave2_start: game_time - Duration::minutes(120),
        wave3_start: game_time - Duration::minutes(60),
        lock_time: game_time,
    }
}

/// Wave 1 → Wave 2 stability: bounded edge drift, unchanged edge state,
/// unchanged sharp side.
pub fn check_stability(
    previous: &SignalRun,
    next: &SignalRun,
    max_edge_drift: f64,
) -> Result<(), String> {
    let drift = (next.compressed_edge - previous.compressed_edge).abs();
    if drift > max_edge_drift {
        return Err(format!("EDGE_DRIFT_{drift:.1}%"));
    }
    if previous.edge_state != next.edge_state {
        return Err(format!(
            "EDGE_STATE_CHANGED_{}_TO_{}",
            previous.edge_state, next.edge_state
        ));
    }
    if previous.sharp_side != next.sharp_side {
        return Err(format!(
            "SHARP_SIDE_FLIPPED_{}_TO_{}",
            previous.sharp_side.as_deref().unwrap_or("NONE"),
            next.sharp_side.as_deref().unwrap_or("NONE"),
        ));
    }
    Ok(())
}

/// Wave 3 publish decision.
pub fn should_publish(run: &SignalRun, min_edge_for_publish: f64) -> Result<(), String> {
    if run.edge_state == EdgeState::NoPlay {
        return Err("EDGE_STATE_NO_PLAY".to_string());
    }
    if run.compressed_edge < min_edge_for_publish {
        return Err(format!("EDGE_BELOW_MINIMUM_{:.1}%", run.compressed_edge));
    }
    if run.distribution_flag == DistributionFlag::UnstableExtreme {
        return Err("DISTRIBUTION_UNSTABLE_EXTREME".to_string());
    }
    if run.sharp_side.is_none() {
        return Err("SHARP_SIDE_NOT_SET".to_string());
    }
    Ok(())
}

/// Gate evaluation derived from one market evaluation + simulation run.
pub fn gates_from_evaluation(
    evaluation: &MarketEvaluation,
    sim: &SimulationOutput,
) -> GateEvaluation {
    let data_integrity = if evaluation.blocking_reason.as_deref() == Some("MISSING_MARKET_DATA") {
        GateResult::fail("MISSING_MARKET_DATA")
    } else {
        GateResult::pass()
    };
    let sim_power = if sim.num_simulations >= MIN_SIM_POWER {
        GateResult::pass()
    } else {
        GateResult::fail("INSUFFICIENT_SIM_POWER")
    };
    let model_validity = if sim.model_version.is_empty() {
        GateResult::fail("MODEL_VERSION_MISSING")
    } else {
        GateResult::pass()
    };
    let volatility = if evaluation.distribution_flag == DistributionFlag::UnstableExtreme {
        GateResult::fail("DISTRIBUTION_UNSTABLE_EXTREME")
    } else {
        GateResult::pass()
    };
    let publish_rcl = if evaluation.eligible {
        GateResult::pass()
    } else {
        match &evaluation.blocking_reason {
            Some(reason) => GateResult::fail(reason),
            None => GateResult::fail("NOT_ELIGIBLE"),
        }
    };
    GateEvaluation {
        data_integrity,
        sim_power,
        model_validity,
        volatility,
        publish_rcl,
    }
}

/// One evaluated market plus its selection, ready to be recorded on a signal.
pub struct WaveEvaluation {
    pub market_key: MarketKey,
    pub evaluation: MarketEvaluation,
    pub selection: Option<SharpSideSelection>,
    pub win_prob: f64,
}

/// Evaluate the game's primary market: spread when quoted (puckline for
/// NHL), else moneyline, else total.
pub fn evaluate_primary_market(
    game: &GameInfo,
    sim: &SimulationOutput,
    quotes: &MarketQuotes,
) -> Result<WaveEvaluation> {
    if let Some(spread) = quotes.spread {
        let market_key = if game.sport == Sport::Nhl {
            MarketKey::Puckline
        } else {
            MarketKey::Spread
        };
        // Evaluate from the favorite's perspective. Margin is home - away;
        // with home favored at `line` (< 0) the favorite covers when
        // margin > -line.
        let home_favored = spread.line <= 0.0;
        let favorite_cover_prob = if home_favored {
            sim.cover_probability(-spread.line)
        } else {
            1.0 - sim.cover_probability(-spread.line)
        };
        let favorite_line = -spread.line.abs();
        let inputs = MarketInputs {
            market: Some(market_key),
            sim_cover_prob: Some(favorite_cover_prob),
            spread: Some(favorite_line),
            spread_odds: Some(if home_favored {
                spread.home_price
            } else {
                spread.away_price
            }),
            is_favorite: Some(true),
            stats: sim.stats(),
            confirmations: quotes.confirmations,
            ..Default::default()
        };
        let mut evaluation = evaluate_market(game.sport, &inputs);

        let selection = if evaluation.edge_state.is_playable() {
            match sim.effective_model_spread() {
                Some(model_spread) => {
                    let selection = select_sharp_side_spread(
                        &game.home_team,
                        &game.away_team,
                        spread.line,
                        model_spread,
                        evaluation.volatility,
                        spread.home_price,
                        spread.away_price,
                    );
                    // A penalty-suppressed selection downgrades the edge too.
                    if selection.sharp_action == SharpAction::None {
                        evaluation.edge_state = EdgeState::NoPlay;
                    }
                    Some(selection)
                }
                None => {
                    // A playable edge with no model spread cannot pick a side.
                    evaluation.edge_state = EdgeState::NoPlay;
                    evaluation.eligible = false;
                    evaluation.blocking_reason = Some("MISSING_MARKET_DATA".to_string());
                    None
                }
            }
        } else {
            None
        };
        return Ok(WaveEvaluation {
            market_key,
            evaluation,
            selection,
            win_prob: favorite_cover_prob,
        });
    }

    if let Some(ml) = quotes.moneyline {
        let home_prob = sim
            .win_probability(&game.home_team)
            .unwrap_or_else(|| sim.cover_probability(0.0));
        let away_prob = 1.0 - home_prob;
        let (side_prob, side_odds) = if home_prob >= away_prob {
            (home_prob, ml.home_price)
        } else {
            (away_prob, ml.away_price)
        };
        let inputs = MarketInputs {
            market: Some(MarketKey::Moneyline),
            sim_win_prob: Some(side_prob),
            ml_odds: Some(side_odds),
            stats: sim.stats(),
            confirmations: quotes.confirmations,
            ..Default::default()
        };
        let evaluation = evaluate_market(game.sport, &inputs);
        let selection = evaluation.edge_state.is_playable().then(|| {
            select_sharp_side_moneyline(
                home_prob,
                away_prob,
                &game.home_team,
                &game.away_team,
                evaluation.compressed_edge,
                ml.home_price,
                ml.away_price,
            )
        });
        return Ok(WaveEvaluation {
            market_key: MarketKey::Moneyline,
            evaluation,
            selection,
            win_prob: side_prob,
        });
    }

    if let Some(total) = quotes.total {
        let over_prob = sim.total_probability(total.line, true);
        let inputs = MarketInputs {
            market: Some(MarketKey::Total),
            sim_over_prob: Some(over_prob),
            over_odds: Some(total.over_price),
            under_odds: Some(total.under_price),
            stats: sim.stats(),
            confirmations: quotes.confirmations,
            ..Default::default()
        };
        let evaluation = evaluate_market(game.sport, &inputs);
        let side_prob = match evaluation.total_side {
            Some(TotalSide::Under) => 1.0 - over_prob,
            _ => over_prob,
        };
        let selection = evaluation.edge_state.is_playable().then(|| {
            select_sharp_side_total(
                over_prob,
                1.0 - over_prob,
                total.line,
                evaluation.compressed_edge,
                total.over_price,
                total.under_price,
            )
        });
        return Ok(WaveEvaluation {
            market_key: MarketKey::Total,
            evaluation,
            selection,
            win_prob: side_prob,
        });
    }

    bail!("no quoted market for game {}", game.game_id)
}

fn run_from_evaluation(wave: SignalWave, sim: &SimulationOutput, wave_eval: &WaveEvaluation) -> SignalRun {
    SignalRun {
        run_id: format!("run_{}", &Uuid::new_v4().simple().to_string()[..12]),
        wave,
        created_at: Utc::now(),
        num_sims: sim.num_simulations,
        model_version: sim.model_version.clone(),
        seed: sim.seed,
        edge_state: wave_eval.evaluation.edge_state,
        compressed_edge: wave_eval.evaluation.compressed_edge,
        raw_edge: wave_eval.evaluation.raw_edge,
        volatility: wave_eval.evaluation.volatility,
        distribution_flag: wave_eval.evaluation.distribution_flag,
        sharp_side: wave_eval
            .selection
            .as_ref()
            .filter(|s| s.sharp_action.is_play())
            .map(|s| s.sharp_side.clone()),
        convergence_rate: sim.convergence_rate,
    }
}

fn build_entry_snapshot(
    signal: &Signal,
    quotes: &MarketQuotes,
    wave_eval: &WaveEvaluation,
) -> Result<EntrySnapshot> {
    let selection = wave_eval
        .selection
        .as_ref()
        .ok_or_else(|| anyhow!("entry snapshot requires a sharp side"))?;

    let entry = match wave_eval.market_key {
        MarketKey::Spread | MarketKey::Puckline => {
            let spread = quotes
                .spread
                .ok_or_else(|| anyhow!("spread quote missing at publish"))?;
            let laying = selection.sharp_action == SharpAction::LayPoints;
            let entry_line = if laying {
                -selection.market_spread
            } else {
                selection.market_spread
            };
            let sharp_team_is_home = selection.sharp_side.contains(&signal.home_team);
            let entry_odds = if sharp_team_is_home {
                spread.home_price
            } else {
                spread.away_price
            };
            EntrySnapshot {
                sharp_side: selection.sharp_side.clone(),
                market_type: wave_eval.market_key,
                entry_line: Some(entry_line),
                entry_total: None,
                entry_odds,
                // Worst line still acceptable: half a point worse.
                max_acceptable_line: Some(entry_line - 0.5),
                max_acceptable_total: None,
                max_acceptable_odds: Some(entry_odds - 10),
                captured_at: Utc::now(),
                captured_wave: SignalWave::Wave3Publish,
            }
        }
        MarketKey::Total => {
            let total = quotes
                .total
                .ok_or_else(|| anyhow!("total quote missing at publish"))?;
            let over = selection.sharp_action == SharpAction::Over;
            let entry_odds = if over {
                total.over_price
            } else {
                total.under_price
            };
            EntrySnapshot {
                sharp_side: selection.sharp_side.clone(),
                market_type: MarketKey::Total,
                entry_line: None,
                entry_total: Some(total.line),
                entry_odds,
                max_acceptable_line: None,
                max_acceptable_total: Some(if over { total.line + 0.5 } else { total.line - 0.5 }),
                max_acceptable_odds: Some(entry_odds - 10),
                captured_at: Utc::now(),
                captured_wave: SignalWave::Wave3Publish,
            }
        }
        MarketKey::Moneyline => {
            let ml = quotes
                .moneyline
                .ok_or_else(|| anyhow!("moneyline quote missing at publish"))?;
            let sharp_team_is_home = selection.sharp_side.contains(&signal.home_team);
            let entry_odds = if sharp_team_is_home {
                ml.home_price
            } else {
                ml.away_price
            };
            EntrySnapshot {
                sharp_side: selection.sharp_side.clone(),
                market_type: MarketKey::Moneyline,
                entry_line: None,
                entry_total: None,
                entry_odds,
                max_acceptable_line: None,
                max_acceptable_total: None,
                max_acceptable_odds: Some(entry_odds - 10),
                captured_at: Utc::now(),
                captured_wave: SignalWave::Wave3Publish,
            }
        }
        MarketKey::Prop => bail!("props do not publish entry snapshots"),
    };
    Ok(entry)
}

impl SignalManager {
    /// Wave 1 (T-6h): discovery snapshot, first simulation, evaluation.
    /// EDGE/LEAN stays DISCOVERED for validation; otherwise the signal is
    /// created as NO_PLAY.
    pub async fn wave1_primary_scan(
        &self,
        game: &GameInfo,
        intent: SignalIntent,
        sim: &SimulationOutput,
        quotes: &MarketQuotes,
    ) -> Result<Signal> {
        let wave_eval = evaluate_primary_market(game, sim, quotes)?;
        validate_sharp_side_alignment(wave_eval.evaluation.edge_state, wave_eval.selection.as_ref())
            .map_err(|e| anyhow!("sharp side integrity violation: {e}"))?;

        let state = if wave_eval.evaluation.edge_state.is_playable() {
            SignalState::Discovered
        } else {
            SignalState::NoPlay
        };

        let snapshot = self
            .create_market_snapshot(
                &game.game_id,
                SignalWave::Wave1Discovery,
                &quotes.book,
                quotes.spread,
                quotes.total,
                quotes.moneyline,
            )
            .await?;

        let signal = self
            .create_signal(NewSignal {
                game_id: game.game_id.clone(),
                sport: game.sport,
                home_team: game.home_team.clone(),
                away_team: game.away_team.clone(),
                game_time: game.game_time,
                intent,
                market_key: wave_eval.market_key,
                state,
                edge_points: wave_eval.evaluation.compressed_edge,
                win_prob: wave_eval.win_prob,
                volatility_bucket: wave_eval.evaluation.volatility,
                sharp_side: wave_eval
                    .selection
                    .as_ref()
                    .filter(|s| s.sharp_action.is_play())
                    .map(|s| s.sharp_side.clone()),
                gates: gates_from_evaluation(&wave_eval.evaluation, sim),
            })
            .await?;

        self.add_market_snapshot(&signal.signal_id, snapshot).await?;
        self.add_signal_run(
            &signal.signal_id,
            run_from_evaluation(SignalWave::Wave1Discovery, sim, &wave_eval),
        )
        .await?;

        info!(
            signal_id = %signal.signal_id,
            game_id = %game.game_id,
            state = %state,
            edge = wave_eval.evaluation.compressed_edge,
            "wave 1 scan complete"
        );
        self.get_signal(&signal.signal_id)
            .await?
            .ok_or_else(|| anyhow!("signal vanished after wave 1"))
    }

    /// Wave 2 (T-120m): re-snapshot, re-simulate, stability check.
    pub async fn wave2_stability_scan(
        &self,
        signal_id: &str,
        game: &GameInfo,
        sim: &SimulationOutput,
        quotes: &MarketQuotes,
    ) -> Result<SignalState> {
        let signal = self
            .get_signal(signal_id)
            .await?
            .ok_or_else(|| anyhow!("signal {signal_id} not found"))?;
        if !matches!(signal.state, SignalState::Discovered | SignalState::Validating) {
            bail!("wave 2 scan on {} signal {signal_id}", signal.state);
        }

        let wave_eval = evaluate_primary_market(game, sim, quotes)?;
        let run = run_from_evaluation(SignalWave::Wave2Validation, sim, &wave_eval);

        let snapshot = self
            .create_market_snapshot(
                &game.game_id,
                SignalWave::Wave2Validation,
                &quotes.book,
                quotes.spread,
                quotes.total,
                quotes.moneyline,
            )
            .await?;
        self.add_market_snapshot(signal_id, snapshot).await?;
        self.add_signal_run(signal_id, run.clone()).await?;

        let previous = signal
            .runs
            .iter()
            .rev()
            .find(|r| r.wave == SignalWave::Wave1Discovery)
            .ok_or_else(|| anyhow!("signal {signal_id} has no wave 1 run"))?;

        let state = match check_stability(previous, &run, self.config().max_edge_drift) {
            Ok(()) => SignalState::Validated,
            Err(reason) => {
                warn!(signal_id, reason = %reason, "wave 2 stability failed");
                self.log_signal_event(
                    "stability_failed",
                    signal_id,
                    &signal.game_id,
                    Some(serde_json::json!({"reason": reason})),
                )
                .await?;
                SignalState::Unstable
            }
        };
        self.set_state(signal_id, state).await?;
        info!(signal_id, state = %state, "wave 2 scan complete");
        Ok(state)
    }

    /// Wave 3 (T-60m): final snapshot and simulation against live prices;
    /// publish with an entry snapshot or silence the signal.
    pub async fn wave3_final_lock_scan(
        &self,
        signal_id: &str,
        game: &GameInfo,
        sim: &SimulationOutput,
        live_quotes: &MarketQuotes,
    ) -> Result<Option<EntrySnapshot>> {
        let signal = self
            .get_signal(signal_id)
            .await?
            .ok_or_else(|| anyhow!("signal {signal_id} not found"))?;
        if signal.state != SignalState::Validated {
            bail!("wave 3 scan on {} signal {signal_id}", signal.state);
        }

        let wave_eval = evaluate_primary_market(game, sim, live_quotes)?;
        validate_sharp_side_alignment(wave_eval.evaluation.edge_state, wave_eval.selection.as_ref())
            .map_err(|e| anyhow!("sharp side integrity violation: {e}"))?;
        let run = run_from_evaluation(SignalWave::Wave3Publish, sim, &wave_eval);

        let snapshot = self
            .create_market_snapshot(
                &game.game_id,
                SignalWave::Wave3Publish,
                &live_quotes.book,
                live_quotes.spread,
                live_quotes.total,
                live_quotes.moneyline,
            )
            .await?;
        self.add_market_snapshot(signal_id, snapshot).await?;
        self.add_signal_run(signal_id, run.clone()).await?;

        match should_publish(&run, self.config().min_edge_for_publish) {
            Ok(()) => {
                let entry = build_entry_snapshot(&signal, live_quotes, &wave_eval)?;
                self.lock_signal_with_entry(signal_id, entry.clone()).await?;
                Ok(Some(entry))
            }
            Err(reason) => {
                info!(signal_id, reason = %reason, "🔴 wave 3 silenced");
                self.log_signal_event(
                    "publish_silenced",
                    signal_id,
                    &signal.game_id,
                    Some(serde_json::json!({"reason": reason})),
                )
                .await?;
                self.set_state(signal_id, SignalState::Withdrawn).await?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sport::VolatilityLevel;

    fn run(
        wave: SignalWave,
        edge_state: EdgeState,
        compressed_edge: f64,
        sharp_side: Option<&str>,
        flag: DistributionFlag,
    ) -> SignalRun {
        SignalRun {
            run_id: "run_test".to_string(),
            wave,
            created_at: Utc::now(),
            num_sims: 50_000,
            model_version: "v2.1".to_string(),
            seed: None,
            edge_state,
            compressed_edge,
            raw_edge: compressed_edge + 1.0,
            volatility: VolatilityLevel::Medium,
            distribution_flag: flag,
            sharp_side: sharp_side.map(str::to_string),
            convergence_rate: 0.98,
        }
    }

    #[test]
    fn wave_timing_offsets() {
        let game_time = Utc::now() + Duration::hours(8);
        let timing = wave_timing(game_time);
        assert_eq!(timing.wave1_start, game_time - Duration::hours(6));
        assert_eq!(timing.wave2_start, game_time - Duration::minutes(120));
        assert_eq!(timing.wave3_start, game_time - Duration::minutes(60));
        assert_eq!(timing.lock_time, game_time);
    }

    #[test]
    fn stability_allows_bounded_drift() {
        let w1 = run(
            SignalWave::Wave1Discovery,
            EdgeState::Edge,
            4.5,
            Some("Celtics +3.5"),
            DistributionFlag::Stable,
        );
        let w2 = run(
            SignalWave::Wave2Validation,
            EdgeState::Edge,
            4.8,
            Some("Celtics +3.5"),
            DistributionFlag::Stable,
        );
        assert!(check_stability(&w1, &w2, 1.5).is_ok());
    }

    #[test]
    fn stability_rejects_drift_state_and_side_changes() {
        let w1 = run(
            SignalWave::Wave1Discovery,
            EdgeState::Edge,
            4.5,
            Some("Celtics +3.5"),
            DistributionFlag::Stable,
        );

        let drifted = run(
            SignalWave::Wave2Validation,
            EdgeState::Edge,
            6.5,
            Some("Celtics +3.5"),
            DistributionFlag::Stable,
        );
        assert!(check_stability(&w1, &drifted, 1.5)
            .unwrap_err()
            .starts_with("EDGE_DRIFT"));

        let downgraded = run(
            SignalWave::Wave2Validation,
            EdgeState::Lean,
            4.4,
            Some("Celtics +3.5"),
            DistributionFlag::Stable,
        );
        assert!(check_stability(&w1, &downgraded, 1.5)
            .unwrap_err()
            .starts_with("EDGE_STATE_CHANGED"));

        let flipped = run(
            SignalWave::Wave2Validation,
            EdgeState::Edge,
            4.6,
            Some("Lakers -3.5"),
            DistributionFlag::Stable,
        );
        assert!(check_stability(&w1, &flipped, 1.5)
            .unwrap_err()
            .starts_with("SHARP_SIDE_FLIPPED"));
    }

    #[test]
    fn publish_gate_conditions() {
        let good = run(
            SignalWave::Wave3Publish,
            EdgeState::Edge,
            5.1,
            Some("Celtics +3.5"),
            DistributionFlag::Stable,
        );
        assert!(should_publish(&good, 3.0).is_ok());

        let no_play = run(
            SignalWave::Wave3Publish,
            EdgeState::NoPlay,
            5.1,
            Some("Celtics +3.5"),
            DistributionFlag::Stable,
        );
        assert_eq!(should_publish(&no_play, 3.0).unwrap_err(), "EDGE_STATE_NO_PLAY");

        let thin = run(
            SignalWave::Wave3Publish,
            EdgeState::Lean,
            2.4,
            Some("Celtics +3.5"),
            DistributionFlag::Stable,
        );
        assert!(should_publish(&thin, 3.0).unwrap_err().starts_with("EDGE_BELOW_MINIMUM"));

        let unstable = run(
            SignalWave::Wave3Publish,
            EdgeState::Edge,
            5.1,
            Some("Celtics +3.5"),
            DistributionFlag::UnstableExtreme,
        );
        assert_eq!(
            should_publish(&unstable, 3.0).unwrap_err(),
            "DISTRIBUTION_UNSTABLE_EXTREME"
        );

        let sideless = run(
            SignalWave::Wave3Publish,
            EdgeState::Edge,
            5.1,
            None,
            DistributionFlag::Stable,
        );
        assert_eq!(should_publish(&sideless, 3.0).unwrap_err(), "SHARP_SIDE_NOT_SET");
    }
}
