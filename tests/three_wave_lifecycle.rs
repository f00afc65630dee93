//! End-to-end lifecycle: discovery at T-6h, validation at T-120m, publish
//! at T-60m, lock at game start, grade at final score. Exercises the signal
//! manager against the in-memory document store.

use chrono::{Duration, Utc};
use sharpline_backend::signals::{
    EntrySnapshot, GameInfo, MarketQuotes, MoneylineQuote, SignalIntent, SignalManager,
    SignalState, SignalWave, SpreadQuote, TotalQuote,
};
use sharpline_backend::sim::SimulationOutput;
use sharpline_backend::sport::evaluator::Confirmations;
use sharpline_backend::sport::{BetResult, MarketKey, Sport};
use sharpline_backend::store::{MemoryDocumentStore, SharedStore};
use std::collections::HashMap;
use std::sync::Arc;

fn game() -> GameInfo {
    GameInfo {
        game_id: "NFL_20251109_KC_BUF".to_string(),
        sport: Sport::Nfl,
        home_team: "Kansas City Chiefs".to_string(),
        away_team: "Buffalo Bills".to_string(),
        game_time: Utc::now() + Duration::hours(6),
    }
}

fn quotes(spread_line: f64) -> MarketQuotes {
    quotes_with_total(spread_line, 47.5)
}

fn quotes_with_total(spread_line: f64, total_line: f64) -> MarketQuotes {
    MarketQuotes {
        book: "draftkings".to_string(),
        spread: Some(SpreadQuote {
            line: spread_line,
            home_price: -110,
            away_price: -110,
        }),
        total: Some(TotalQuote {
            line: total_line,
            over_price: -110,
            under_price: -110,
        }),
        moneyline: Some(MoneylineQuote {
            home_price: -220,
            away_price: 180,
        }),
        confirmations: Confirmations::all_clear(),
    }
}

/// Simulation whose margin distribution puts `cover_prob` of the mass above
/// the favorite's number (5.5 here).
fn simulation(cover_prob: f64) -> SimulationOutput {
    let mut spread_distribution = HashMap::new();
    spread_distribution.insert("3".to_string(), 1.0 - cover_prob);
    spread_distribution.insert("7".to_string(), cover_prob);
    SimulationOutput {
        event_id: "NFL_20251109_KC_BUF".to_string(),
        win_probabilities: HashMap::new(),
        spread_distribution,
        total_distribution: HashMap::new(),
        convergence_rate: 0.98,
        win_prob_std: 0.01,
        total_std: 0.01,
        num_simulations: 100_000,
        model_version: "v3.1".to_string(),
        seed: Some(7),
        // Dog-side model number: market is generous to the Bills.
        model_spread: Some(-3.2),
    }
}

fn manager() -> SignalManager {
    let store: SharedStore = Arc::new(MemoryDocumentStore::new());
    SignalManager::new(store)
}

#[tokio::test]
async fn discovery_to_publish_happy_path() {
    let manager = manager();
    let game = game();

    // Wave 1: edge ~4.5 pct, playable, DISCOVERED.
    let signal = manager
        .wave1_primary_scan(&game, SignalIntent::TruthMode, &simulation(0.581), &quotes(-5.5))
        .await
        .unwrap();
    assert_eq!(signal.state, SignalState::Discovered);
    assert_eq!(signal.market_key, MarketKey::Spread);
    assert_eq!(signal.snapshots.len(), 1);
    assert_eq!(signal.runs.len(), 1);
    assert_eq!(signal.runs[0].wave, SignalWave::Wave1Discovery);
    let sharp_side = signal.sharp_side.clone().unwrap();
    assert!(sharp_side.contains("Buffalo Bills"));

    // Wave 2: edge drifts 0.3 pct with the same side, VALIDATED.
    let state = manager
        .wave2_stability_scan(
            &signal.signal_id,
            &game,
            &simulation(0.585),
            &quotes_with_total(-5.5, 48.0),
        )
        .await
        .unwrap();
    assert_eq!(state, SignalState::Validated);

    // Wave 3: stable distribution, edge above the publish floor, PUBLISHED.
    let entry = manager
        .wave3_final_lock_scan(
            &signal.signal_id,
            &game,
            &simulation(0.588),
            &quotes_with_total(-5.5, 48.5),
        )
        .await
        .unwrap()
        .expect("entry snapshot captured at publish");
    assert_eq!(entry.captured_wave, SignalWave::Wave3Publish);
    assert_eq!(entry.entry_line, Some(5.5));
    assert!(entry.sharp_side.contains("Buffalo Bills"));

    let published = manager.get_signal(&signal.signal_id).await.unwrap().unwrap();
    assert_eq!(published.state, SignalState::Published);
    assert!(published.published_at.is_some());
    assert_eq!(published.entry.as_ref().unwrap(), &entry);
    assert_eq!(published.snapshots.len(), 3);
    assert_eq!(published.runs.len(), 3);

    // Lock at game start, then grade: Chiefs 31-20 covers -5.5, the dog
    // side loses.
    manager.lock_signal_at_game_start(&signal.signal_id).await.unwrap();
    manager
        .grade_signal(&signal.signal_id, 31, 20, BetResult::Loss)
        .await
        .unwrap();
    let graded = manager.get_signal(&signal.signal_id).await.unwrap().unwrap();
    assert_eq!(graded.state, SignalState::Graded);
    assert_eq!(graded.result, Some(BetResult::Loss));
}

#[tokio::test]
async fn unstable_wave2_marks_signal_unstable() {
    let manager = manager();
    let game = game();
    let signal = manager
        .wave1_primary_scan(&game, SignalIntent::TruthMode, &simulation(0.581), &quotes(-5.5))
        .await
        .unwrap();

    // Edge jumps ~3.4 pct: beyond the 1.5 drift budget.
    let state = manager
        .wave2_stability_scan(&signal.signal_id, &game, &simulation(0.621), &quotes(-5.5))
        .await
        .unwrap();
    assert_eq!(state, SignalState::Unstable);

    // An unstable signal never reaches wave 3.
    assert!(manager
        .wave3_final_lock_scan(&signal.signal_id, &game, &simulation(0.588), &quotes(-5.5))
        .await
        .is_err());
}

#[tokio::test]
async fn no_play_discovery_creates_silent_signal() {
    let manager = manager();
    let game = game();
    // Cover probability barely above implied: edge below eligibility.
    let signal = manager
        .wave1_primary_scan(&game, SignalIntent::TruthMode, &simulation(0.53), &quotes(-5.5))
        .await
        .unwrap();
    assert_eq!(signal.state, SignalState::NoPlay);
    assert!(!signal.gates.publish_rcl.passed);
}

#[tokio::test]
async fn published_entry_is_immutable() {
    let manager = manager();
    let game = game();
    let signal = manager
        .wave1_primary_scan(&game, SignalIntent::TruthMode, &simulation(0.581), &quotes(-5.5))
        .await
        .unwrap();
    manager
        .wave2_stability_scan(&signal.signal_id, &game, &simulation(0.585), &quotes(-5.5))
        .await
        .unwrap();
    let entry = manager
        .wave3_final_lock_scan(&signal.signal_id, &game, &simulation(0.588), &quotes(-5.5))
        .await
        .unwrap()
        .unwrap();

    // Re-locking with the identical entry is idempotent.
    manager
        .lock_signal_with_entry(&signal.signal_id, entry.clone())
        .await
        .unwrap();

    // A differing entry is an integrity violation; state is untouched.
    let second = EntrySnapshot {
        entry_line: Some(6.5),
        ..entry.clone()
    };
    let err = manager
        .lock_signal_with_entry(&signal.signal_id, second)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("integrity violation"));
    let unchanged = manager.get_signal(&signal.signal_id).await.unwrap().unwrap();
    assert_eq!(unchanged.entry.as_ref().unwrap(), &entry);
}

#[tokio::test]
async fn locked_signals_reject_appends() {
    let manager = manager();
    let game = game();
    let signal = manager
        .wave1_primary_scan(&game, SignalIntent::TruthMode, &simulation(0.581), &quotes(-5.5))
        .await
        .unwrap();
    manager.lock_signal_at_game_start(&signal.signal_id).await.unwrap();

    let snapshot = manager
        .create_market_snapshot(
            &game.game_id,
            SignalWave::Wave3Publish,
            "draftkings",
            Some(SpreadQuote {
                line: -6.0,
                home_price: -110,
                away_price: -110,
            }),
            None,
            None,
        )
        .await
        .unwrap();
    let err = manager
        .add_market_snapshot(&signal.signal_id, snapshot)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("integrity violation"));

    // The only transition left is grading.
    manager
        .grade_signal(&signal.signal_id, 28, 24, BetResult::Win)
        .await
        .unwrap();
    // Re-grading identically is idempotent; a different result is refused.
    manager
        .grade_signal(&signal.signal_id, 28, 24, BetResult::Win)
        .await
        .unwrap();
    assert!(manager
        .grade_signal(&signal.signal_id, 28, 24, BetResult::Loss)
        .await
        .is_err());
}

#[tokio::test]
async fn snapshot_dedup_within_window() {
    let manager = manager();
    let spread = Some(SpreadQuote {
        line: -5.5,
        home_price: -110,
        away_price: -110,
    });
    let first = manager
        .create_market_snapshot("g1", SignalWave::Wave1Discovery, "draftkings", spread, None, None)
        .await
        .unwrap();
    let second = manager
        .create_market_snapshot("g1", SignalWave::Wave2Validation, "draftkings", spread, None, None)
        .await
        .unwrap();
    assert_eq!(first.snapshot_id, second.snapshot_id);

    // A moved line is a new capture.
    let moved = manager
        .create_market_snapshot(
            "g1",
            SignalWave::Wave2Validation,
            "draftkings",
            Some(SpreadQuote {
                line: -6.0,
                home_price: -110,
                away_price: -110,
            }),
            None,
            None,
        )
        .await
        .unwrap();
    assert_ne!(first.snapshot_id, moved.snapshot_id);
}

#[tokio::test]
async fn snapshot_appends_compute_line_deltas() {
    let manager = manager();
    let game = game();
    let signal = manager
        .wave1_primary_scan(&game, SignalIntent::TruthMode, &simulation(0.581), &quotes(-5.5))
        .await
        .unwrap();

    let moved = manager
        .create_market_snapshot(
            &game.game_id,
            SignalWave::Wave2Validation,
            "draftkings",
            Some(SpreadQuote {
                line: -6.5,
                home_price: -110,
                away_price: -110,
            }),
            Some(TotalQuote {
                line: 49.5,
                over_price: -110,
                under_price: -110,
            }),
            None,
        )
        .await
        .unwrap();
    let appended = manager
        .add_market_snapshot(&signal.signal_id, moved)
        .await
        .unwrap();
    assert_eq!(appended.spread_delta, Some(-1.0));
    assert_eq!(appended.total_delta, Some(2.0));
}

#[tokio::test]
async fn robustness_needs_history_then_scores_it() {
    let manager = manager();
    let game = game();

    assert!(manager
        .compute_robustness(&game.game_id, MarketKey::Spread)
        .await
        .unwrap()
        .is_none());

    // Three consistent discoveries on the same market build ROBUST history.
    for cover in [0.581, 0.582, 0.583] {
        manager
            .wave1_primary_scan(&game, SignalIntent::TruthMode, &simulation(cover), &quotes(-5.5))
            .await
            .unwrap();
    }
    let (label, score) = manager
        .compute_robustness(&game.game_id, MarketKey::Spread)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(label, sharpline_backend::signals::RobustnessLabel::Robust);
    assert!(score >= 70);
}

#[tokio::test]
async fn delta_tracks_what_changed() {
    let manager = manager();
    let game = game();
    let first = manager
        .wave1_primary_scan(&game, SignalIntent::TruthMode, &simulation(0.581), &quotes(-5.5))
        .await
        .unwrap();
    let second = manager
        .wave1_primary_scan(&game, SignalIntent::TruthMode, &simulation(0.53), &quotes(-6.5))
        .await
        .unwrap();

    let delta = manager
        .compute_delta(&first.signal_id, &second.signal_id)
        .await
        .unwrap();
    assert!(delta.state_changed);
    assert_eq!(delta.previous_state, SignalState::Discovered);
    assert_eq!(delta.new_state, SignalState::NoPlay);
    assert!(delta.line_moved);
    assert_eq!(delta.line_move_points, Some(-1.0));
    assert!(!delta.change_summary.is_empty());
}

#[tokio::test]
async fn freeze_is_advisory_and_releases_on_material_move() {
    let manager = manager();
    let game = game();
    let signal = manager
        .wave1_primary_scan(&game, SignalIntent::TruthMode, &simulation(0.581), &quotes(-5.5))
        .await
        .unwrap();

    manager
        .freeze_signal(&signal.signal_id, 60, "ACTIONABLE_FIRST_HIT")
        .await
        .unwrap();
    let frozen = manager.get_signal(&signal.signal_id).await.unwrap().unwrap();
    assert!(SignalManager::is_frozen(&frozen));

    // A full-point spread move releases the freeze during append.
    let moved = manager
        .create_market_snapshot(
            &game.game_id,
            SignalWave::Wave2Validation,
            "draftkings",
            Some(SpreadQuote {
                line: -7.0,
                home_price: -110,
                away_price: -110,
            }),
            None,
            None,
        )
        .await
        .unwrap();
    manager
        .add_market_snapshot(&signal.signal_id, moved)
        .await
        .unwrap();
    let released = manager.get_signal(&signal.signal_id).await.unwrap().unwrap();
    assert!(!SignalManager::is_frozen(&released));
}
