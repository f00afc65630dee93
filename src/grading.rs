//! Unified Grading Service
//!
//! Settles picks from provider scores with strict idempotency: the grading
//! key is sha256(pick_id|source|settlement_rules|clv_rules)[:32]. Re-running
//! with identical rules versions returns the identical record; a rules
//! change creates a new record without touching history. Provider mapping
//! drift freezes grading for the event.

use crate::adapters::{validate_provider_mapping, ScoreClient, ScoreReport};
use crate::ops::{record_ops_alert, ALERT_MAPPING_DRIFT};
use crate::sport::grading::SpreadSide;
use crate::sport::{grade_moneyline, grade_spread, grade_total, BetResult, TotalSide};
use crate::store::{collections, SharedStore};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

pub const SETTLEMENT_RULES_VERSION: &str = "settle-v2";
pub const CLV_RULES_VERSION: &str = "clv-v1";

/// What was bet, in terms the pure graders understand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "market", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradeSelection {
    Spread {
        side: SpreadSide,
        /// Favorite's (negative) number.
        spread: f64,
        favorite_is_home: bool,
    },
    Total {
        side: TotalSide,
        line: f64,
    },
    Moneyline {
        home: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickToGrade {
    pub pick_id: String,
    pub event_id: String,
    pub provider_event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub selection: GradeSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingRecord {
    pub grading_idempotency_key: String,
    pub pick_id: String,
    pub event_id: String,
    pub grade_source: String,
    pub result: BetResult,
    pub home_score: i32,
    pub away_score: i32,
    pub settlement_rules_version: String,
    pub clv_rules_version: String,
    pub graded_at: DateTime<Utc>,
    #[serde(default)]
    pub admin_note: Option<String>,
}

/// sha256(pick_id|source|settlement_version|clv_version)[:32]
pub fn grading_idempotency_key(
    pick_id: &str,
    grade_source: &str,
    settlement_rules_version: &str,
    clv_rules_version: &str,
) -> String {
    let components = [
        pick_id,
        grade_source,
        settlement_rules_version,
        clv_rules_version,
    ]
    .join("|");
    hex::encode(Sha256::digest(components.as_bytes()))[..32].to_string()
}

pub struct GradingService {
    store: SharedStore,
    scores: Arc<dyn ScoreClient>,
    settlement_rules_version: String,
    clv_rules_version: String,
}

impl GradingService {
    pub fn new(store: SharedStore, scores: Arc<dyn ScoreClient>) -> Self {
        Self {
            store,
            scores,
            settlement_rules_version: SETTLEMENT_RULES_VERSION.to_string(),
            clv_rules_version: CLV_RULES_VERSION.to_string(),
        }
    }

    pub fn with_rules_versions(mut self, settlement: &str, clv: &str) -> Self {
        self.settlement_rules_version = settlement.to_string();
        self.clv_rules_version = clv.to_string();
        self
    }

    /// Settle a pick. Idempotent per (pick, source, rules versions).
    pub async fn grade_pick(&self, pick: &PickToGrade) -> Result<GradingRecord> {
        self.grade_pick_with_source(pick, "PROVIDER", None).await
    }

    /// Admin override path; an audit note is mandatory.
    pub async fn grade_pick_admin_override(
        &self,
        pick: &PickToGrade,
        note: &str,
    ) -> Result<GradingRecord> {
        if note.trim().is_empty() {
            bail!("admin grading override requires an audit note");
        }
        self.grade_pick_with_source(pick, "ADMIN", Some(note)).await
    }

    async fn grade_pick_with_source(
        &self,
        pick: &PickToGrade,
        source: &str,
        admin_note: Option<&str>,
    ) -> Result<GradingRecord> {
        let key = grading_idempotency_key(
            &pick.pick_id,
            source,
            &self.settlement_rules_version,
            &self.clv_rules_version,
        );

        // Identical rerun returns the stored record.
        if let Some(existing) = self.store.get(collections::GRADING_RECORDS, &key).await? {
            return serde_json::from_value(existing).context("decode grading record");
        }

        if self.is_grading_frozen(&pick.event_id).await? {
            bail!("grading frozen for event {} (mapping drift)", pick.event_id);
        }

        let report = self
            .scores
            .fetch_score(&pick.provider_event_id)
            .await?
            .ok_or_else(|| anyhow!("no score yet for {}", pick.provider_event_id))?;
        if !report.completed {
            bail!("event {} not completed yet", pick.provider_event_id);
        }

        if let Err(drift) =
            validate_provider_mapping(&pick.home_team, &pick.away_team, &report)
        {
            self.freeze_grading(&pick.event_id).await?;
            record_ops_alert(
                &self.store,
                ALERT_MAPPING_DRIFT,
                json!({
                    "event_id": pick.event_id,
                    "provider_event_id": drift.provider_event_id,
                    "expected_home": drift.expected_home,
                    "expected_away": drift.expected_away,
                    "provider_home": drift.provider_home,
                    "provider_away": drift.provider_away,
                }),
            )
            .await?;
            bail!("{drift}");
        }

        let result = Self::settle(&pick.selection, &report);
        let record = GradingRecord {
            grading_idempotency_key: key.clone(),
            pick_id: pick.pick_id.clone(),
            event_id: pick.event_id.clone(),
            grade_source: source.to_string(),
            result,
            home_score: report.home_score,
            away_score: report.away_score,
            settlement_rules_version: self.settlement_rules_version.clone(),
            clv_rules_version: self.clv_rules_version.clone(),
            graded_at: Utc::now(),
            admin_note: admin_note.map(str::to_string),
        };
        self.store
            .insert(
                collections::GRADING_RECORDS,
                &key,
                serde_json::to_value(&record)?,
            )
            .await?;
        info!(pick_id = %pick.pick_id, result = %result, "graded pick");
        Ok(record)
    }

    fn settle(selection: &GradeSelection, report: &ScoreReport) -> BetResult {
        match selection {
            GradeSelection::Spread {
                side,
                spread,
                favorite_is_home,
            } => {
                let (favorite_score, underdog_score) = if *favorite_is_home {
                    (report.home_score, report.away_score)
                } else {
                    (report.away_score, report.home_score)
                };
                grade_spread(*side, favorite_score, underdog_score, *spread)
            }
            GradeSelection::Total { side, line } => {
                grade_total(*side, report.home_score, report.away_score, *line)
            }
            GradeSelection::Moneyline { home } => {
                grade_moneyline(*home, report.home_score, report.away_score)
            }
        }
    }

    async fn is_grading_frozen(&self, event_id: &str) -> Result<bool> {
        Ok(self
            .store
            .get(collections::EVENTS, event_id)
            .await?
            .and_then(|doc| doc["grading_frozen"].as_bool())
            .unwrap_or(false))
    }

    async fn freeze_grading(&self, event_id: &str) -> Result<()> {
        let updated = self
            .store
            .set_fields(
                collections::EVENTS,
                event_id,
                json!({"grading_frozen": true}),
            )
            .await?;
        if !updated {
            // Event record may not exist locally; persist the freeze anyway.
            self.store
                .upsert(
                    collections::EVENTS,
                    event_id,
                    json!({"event_id": event_id, "grading_frozen": true}),
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FixedScores {
        report: Mutex<Option<ScoreReport>>,
    }

    #[async_trait]
    impl ScoreClient for FixedScores {
        async fn fetch_score(&self, _provider_event_id: &str) -> Result<Option<ScoreReport>> {
            Ok(self.report.lock().clone())
        }
    }

    fn knicks_win() -> ScoreReport {
        ScoreReport {
            event_id: "prov_1".to_string(),
            home_team: "New York Knicks".to_string(),
            away_team: "Atlanta Hawks".to_string(),
            home_score: 112,
            away_score: 104,
            completed: true,
            last_update: None,
        }
    }

    fn pick() -> PickToGrade {
        PickToGrade {
            pick_id: "pick_1".to_string(),
            event_id: "evt_1".to_string(),
            provider_event_id: "prov_1".to_string(),
            home_team: "New York Knicks".to_string(),
            away_team: "Atlanta Hawks".to_string(),
            selection: GradeSelection::Spread {
                side: SpreadSide::Favorite,
                spread: -5.5,
                favorite_is_home: true,
            },
        }
    }

    fn service(report: Option<ScoreReport>) -> (GradingService, SharedStore) {
        let store: SharedStore = Arc::new(MemoryDocumentStore::new());
        let scores = Arc::new(FixedScores {
            report: Mutex::new(report),
        });
        (GradingService::new(store.clone(), scores), store)
    }

    #[test]
    fn key_is_stable_and_version_sensitive() {
        let a = grading_idempotency_key("pick_1", "PROVIDER", "settle-v2", "clv-v1");
        let b = grading_idempotency_key("pick_1", "PROVIDER", "settle-v2", "clv-v1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        let c = grading_idempotency_key("pick_1", "PROVIDER", "settle-v3", "clv-v1");
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn grading_is_idempotent() {
        let (service, store) = service(Some(knicks_win()));
        let first = service.grade_pick(&pick()).await.unwrap();
        assert_eq!(first.result, BetResult::Win);

        let second = service.grade_pick(&pick()).await.unwrap();
        assert_eq!(first.grading_idempotency_key, second.grading_idempotency_key);
        assert_eq!(first.graded_at, second.graded_at);
        assert_eq!(store.count(collections::GRADING_RECORDS).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rules_version_change_creates_new_record() {
        let store: SharedStore = Arc::new(MemoryDocumentStore::new());
        let scores = Arc::new(FixedScores {
            report: Mutex::new(Some(knicks_win())),
        });
        let v2 = GradingService::new(store.clone(), scores.clone());
        let v3 = GradingService::new(store.clone(), scores).with_rules_versions("settle-v3", "clv-v1");

        v2.grade_pick(&pick()).await.unwrap();
        v3.grade_pick(&pick()).await.unwrap();
        assert_eq!(store.count(collections::GRADING_RECORDS).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn mapping_drift_freezes_grading_and_alerts() {
        let mut wrong_teams = knicks_win();
        wrong_teams.home_team = "Brooklyn Nets".to_string();
        let (service, store) = service(Some(wrong_teams));

        let err = service.grade_pick(&pick()).await.unwrap_err();
        assert!(err.to_string().contains("mapping drift"));
        assert_eq!(store.count(collections::OPS_ALERTS).await.unwrap(), 1);

        // Subsequent grading attempts for the event are frozen, even with a
        // now-correct score.
        let (frozen_service, _) = {
            let scores = Arc::new(FixedScores {
                report: Mutex::new(Some(knicks_win())),
            });
            (GradingService::new(store.clone(), scores), ())
        };
        let err = frozen_service.grade_pick(&pick()).await.unwrap_err();
        assert!(err.to_string().contains("frozen"));
    }

    #[tokio::test]
    async fn incomplete_game_cannot_grade() {
        let mut in_progress = knicks_win();
        in_progress.completed = false;
        let (service, _) = service(Some(in_progress));
        assert!(service.grade_pick(&pick()).await.is_err());
    }

    #[tokio::test]
    async fn admin_override_requires_note() {
        let (service, _) = service(Some(knicks_win()));
        assert!(service
            .grade_pick_admin_override(&pick(), "  ")
            .await
            .is_err());
        let record = service
            .grade_pick_admin_override(&pick(), "score correction per league office")
            .await
            .unwrap();
        assert_eq!(record.grade_source, "ADMIN");
        assert!(record.admin_note.is_some());
    }
}
