//! Three-Wave Scheduler
//!
//! Three independent cooperative loops sweep upcoming games through the
//! signal lifecycle: discovery at T-6h, validation at T-120m, final lock at
//! T-60m. One game's failure never aborts a sweep, and all loops share one
//! shutdown signal.

use crate::adapters::{GameRecord, OddsClient};
use crate::bus::{topics, SharedPublisher};
use crate::sim::SimulationClient;
use crate::signals::{SignalManager, SignalState};
use crate::sport::evaluator::Confirmations;
use crate::sport::Sport;
use crate::store::{collections, SharedStore};
use anyhow::{anyhow, Result};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::signals::SignalIntent;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub wave1_interval: Duration,
    pub wave2_interval: Duration,
    pub wave3_interval: Duration,
    pub sports: Vec<Sport>,
    pub region: String,
    /// Confirmations are fed by an external lineup service; the scheduler
    /// carries a static default per deployment.
    pub confirmations: Confirmations,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wave1_interval: Duration::from_secs(30 * 60),
            wave2_interval: Duration::from_secs(15 * 60),
            wave3_interval: Duration::from_secs(5 * 60),
            sports: vec![Sport::Nba, Sport::Nfl, Sport::Mlb, Sport::Nhl],
            region: "us".to_string(),
            confirmations: Confirmations::all_clear(),
        }
    }
}

pub struct ThreeWaveScheduler {
    store: SharedStore,
    odds: Arc<dyn OddsClient>,
    simulations: Arc<dyn SimulationClient>,
    signal_manager: Arc<SignalManager>,
    publisher: SharedPublisher,
    config: SchedulerConfig,
    shutdown: broadcast::Sender<()>,
}

impl ThreeWaveScheduler {
    pub fn new(
        store: SharedStore,
        odds: Arc<dyn OddsClient>,
        simulations: Arc<dyn SimulationClient>,
        signal_manager: Arc<SignalManager>,
        publisher: SharedPublisher,
        config: SchedulerConfig,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            odds,
            simulations,
            signal_manager,
            publisher,
            config,
            shutdown,
        }
    }

    /// Spawn the three wave loops. They stop on the shared shutdown signal.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!("🚀 three-wave scheduler started");
        vec![
            self.clone().spawn_loop(1, self.config.wave1_interval),
            self.clone().spawn_loop(2, self.config.wave2_interval),
            self.clone().spawn_loop(3, self.config.wave3_interval),
        ]
    }

    fn spawn_loop(self: Arc<Self>, wave: u8, period: Duration) -> JoinHandle<()> {
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sweep = match wave {
                            1 => self.wave1_sweep().await,
                            2 => self.wave2_sweep().await,
                            _ => self.wave3_sweep().await,
                        };
                        if let Err(e) = sweep {
                            error!(wave, error = %e, "wave sweep failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        info!(wave, "wave loop stopped");
                        return;
                    }
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Wave 1: discovery
    // ------------------------------------------------------------------

    /// Games with commence time in [now+4h, now+6h] that have no candidate
    /// yet get their first scan.
    pub async fn wave1_sweep(&self) -> Result<()> {
        let now = Utc::now();
        let window_start = now + ChronoDuration::hours(4);
        let window_end = now + ChronoDuration::hours(6);

        for sport in self.config.sports.clone() {
            let events = match self
                .odds
                .fetch_events(sport, &self.config.region, &["h2h", "spreads", "totals"])
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    warn!(sport = %sport, error = %e, "odds fetch failed; skipping sport");
                    continue;
                }
            };

            for event in events {
                // Keep the events collection current regardless of window.
                let record = GameRecord::from_event(&event, sport);
                if let Err(e) = self
                    .store
                    .upsert(
                        collections::EVENTS,
                        &record.event_id,
                        serde_json::to_value(&record)?,
                    )
                    .await
                {
                    error!(event_id = %event.id, error = %e, "event upsert failed");
                }

                if event.commence_time < window_start || event.commence_time > window_end {
                    continue;
                }
                if let Err(e) = self.scan_wave1_game(sport, &event).await {
                    error!(event_id = %event.id, error = %e, "wave 1 scan failed");
                }
            }
        }
        Ok(())
    }

    async fn scan_wave1_game(
        &self,
        sport: Sport,
        event: &crate::adapters::OddsEvent,
    ) -> Result<()> {
        let game = event.game_info(sport);

        // Already scanned this game in any market.
        let existing = self
            .store
            .find_eq(collections::SIGNALS, "game_id", &json!(game.game_id), 1)
            .await?;
        if !existing.is_empty() {
            return Ok(());
        }

        let Some(sim) = self.simulations.latest_for_event(&game.game_id).await? else {
            info!(game_id = %game.game_id, "no simulation yet; skipping wave 1");
            return Ok(());
        };

        let quotes = event.market_quotes(self.config.confirmations);
        let signal = self
            .signal_manager
            .wave1_primary_scan(&game, SignalIntent::TruthMode, &sim, &quotes)
            .await?;
        info!(
            signal_id = %signal.signal_id,
            game_id = %game.game_id,
            "✅ wave 1 candidate created"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Wave 2: validation
    // ------------------------------------------------------------------

    /// DISCOVERED signals whose game starts in [now+110m, now+130m] get a
    /// stability re-scan.
    pub async fn wave2_sweep(&self) -> Result<()> {
        let signals = self.signals_in_window(SignalState::Discovered, 110, 130).await?;
        for signal in signals {
            if let Err(e) = self.scan_wave2_signal(&signal).await {
                error!(signal_id = %signal.signal_id, error = %e, "wave 2 scan failed");
            }
        }
        Ok(())
    }

    async fn scan_wave2_signal(&self, signal: &crate::signals::Signal) -> Result<()> {
        if SignalManager::is_frozen(signal) {
            info!(signal_id = %signal.signal_id, "frozen; skipping re-simulation");
            return Ok(());
        }
        let (game, quotes) = self.refresh_market(signal).await?;
        let sim = self
            .simulations
            .latest_for_event(&signal.game_id)
            .await?
            .ok_or_else(|| anyhow!("no simulation for {}", signal.game_id))?;
        let state = self
            .signal_manager
            .wave2_stability_scan(&signal.signal_id, &game, &sim, &quotes)
            .await?;
        info!(signal_id = %signal.signal_id, state = %state, "✅ wave 2 validated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Wave 3: final lock
    // ------------------------------------------------------------------

    /// VALIDATED signals in [now+60m, now+75m] get the final scan against
    /// live prices; published entries are announced on the bus. Published
    /// signals whose games have started are locked.
    pub async fn wave3_sweep(&self) -> Result<()> {
        let signals = self.signals_in_window(SignalState::Validated, 60, 75).await?;
        for signal in signals {
            if let Err(e) = self.scan_wave3_signal(&signal).await {
                error!(signal_id = %signal.signal_id, error = %e, "wave 3 scan failed");
            }
        }
        self.lock_started_games().await
    }

    async fn scan_wave3_signal(&self, signal: &crate::signals::Signal) -> Result<()> {
        // Live prices are mandatory here; a stale quote cannot lock an entry.
        let (game, quotes) = self.refresh_market(signal).await?;
        let sim = self
            .simulations
            .latest_for_event(&signal.game_id)
            .await?
            .ok_or_else(|| anyhow!("no simulation for {}", signal.game_id))?;

        match self
            .signal_manager
            .wave3_final_lock_scan(&signal.signal_id, &game, &sim, &quotes)
            .await?
        {
            Some(entry) => {
                info!(signal_id = %signal.signal_id, "🟢 wave 3 published");
                self.publisher
                    .publish(
                        topics::UI_UPDATES,
                        json!({
                            "type": "signal_published",
                            "signal_id": signal.signal_id,
                            "game_id": signal.game_id,
                            "sharp_side": entry.sharp_side,
                            "entry": entry,
                        }),
                    )
                    .await?;
            }
            None => {
                info!(signal_id = %signal.signal_id, "🔴 wave 3 silenced");
            }
        }
        Ok(())
    }

    async fn lock_started_games(&self) -> Result<()> {
        let now = Utc::now();
        let published = self
            .store
            .find_eq(collections::SIGNALS, "state", &json!("PUBLISHED"), 200)
            .await?;
        for doc in published {
            let signal: crate::signals::Signal = match serde_json::from_value(doc) {
                Ok(signal) => signal,
                Err(e) => {
                    error!(error = %e, "undecodable signal during lock sweep");
                    continue;
                }
            };
            if signal.game_time <= now {
                if let Err(e) = self
                    .signal_manager
                    .lock_signal_at_game_start(&signal.signal_id)
                    .await
                {
                    error!(signal_id = %signal.signal_id, error = %e, "lock at game start failed");
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Signals in `state` whose game starts within [now+from, now+to]
    /// minutes. State filtering keeps two waves off the same game.
    async fn signals_in_window(
        &self,
        state: SignalState,
        from_minutes: i64,
        to_minutes: i64,
    ) -> Result<Vec<crate::signals::Signal>> {
        let now = Utc::now();
        let from = now + ChronoDuration::minutes(from_minutes);
        let to = now + ChronoDuration::minutes(to_minutes);

        let docs = self
            .store
            .find_eq(
                collections::SIGNALS,
                "state",
                &serde_json::to_value(state)?,
                200,
            )
            .await?;
        let mut signals = Vec::new();
        for doc in docs {
            let signal: crate::signals::Signal = match serde_json::from_value(doc) {
                Ok(signal) => signal,
                Err(e) => {
                    error!(error = %e, "undecodable signal in window query");
                    continue;
                }
            };
            if signal.game_time >= from && signal.game_time <= to {
                signals.push(signal);
            }
        }
        Ok(signals)
    }

    /// Fresh market data for a signal's game from the odds provider.
    async fn refresh_market(
        &self,
        signal: &crate::signals::Signal,
    ) -> Result<(crate::signals::GameInfo, crate::signals::MarketQuotes)> {
        let events = self
            .odds
            .fetch_events(
                signal.sport,
                &self.config.region,
                &["h2h", "spreads", "totals"],
            )
            .await?;
        let event = events
            .into_iter()
            .find(|e| e.id == signal.game_id)
            .ok_or_else(|| anyhow!("game {} no longer quoted", signal.game_id))?;
        Ok((
            event.game_info(signal.sport),
            event.market_quotes(self.config.confirmations),
        ))
    }
}
