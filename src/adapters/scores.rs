//! Score Provider HTTP Client & Mapping Drift Detection
//!
//! Scores are fetched by exact provider event id only. A mismatch between
//! the teams on the local event and the teams the provider returns for that
//! id is provider mapping drift: grading for the event must freeze and an
//! ops alert must be raised. No fuzzy matching, ever.

use super::{ScoreClient, ScoreReport};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";
const CALL_TIMEOUT: Duration = Duration::from_secs(20);

/// Mismatch between locally recorded teams and the provider's teams for the
/// same event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingDrift {
    pub provider_event_id: String,
    pub expected_home: String,
    pub expected_away: String,
    pub provider_home: String,
    pub provider_away: String,
}

impl std::fmt::Display for MappingDrift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "provider mapping drift on {}: expected {} vs {}, provider returned {} vs {}",
            self.provider_event_id,
            self.expected_home,
            self.expected_away,
            self.provider_home,
            self.provider_away
        )
    }
}

/// Exact (case-insensitive) team comparison between the local event and the
/// provider's score payload.
pub fn validate_provider_mapping(
    expected_home: &str,
    expected_away: &str,
    report: &ScoreReport,
) -> Result<(), MappingDrift> {
    let home_matches = report.home_team.eq_ignore_ascii_case(expected_home);
    let away_matches = report.away_team.eq_ignore_ascii_case(expected_away);
    if home_matches && away_matches {
        return Ok(());
    }
    warn!(
        event_id = %report.event_id,
        expected_home,
        expected_away,
        provider_home = %report.home_team,
        provider_away = %report.away_team,
        "🚧 provider mapping drift"
    );
    Err(MappingDrift {
        provider_event_id: report.event_id.clone(),
        expected_home: expected_home.to_string(),
        expected_away: expected_away.to_string(),
        provider_home: report.home_team.clone(),
        provider_away: report.away_team.clone(),
    })
}

#[derive(Debug, Deserialize)]
struct ProviderScoreRow {
    id: String,
    home_team: String,
    away_team: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    scores: Option<Vec<ProviderScoreEntry>>,
    #[serde(default)]
    last_update: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct ProviderScoreEntry {
    name: String,
    score: String,
}

pub struct ScoresApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    sport_key: String,
}

impl ScoresApiClient {
    pub fn new(api_key: &str, sport_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, sport_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, sport_key: &str, base_url: &str) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(CALL_TIMEOUT)
                .build()
                .context("build scores http client")?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            sport_key: sport_key.to_string(),
        })
    }

    fn row_to_report(row: ProviderScoreRow) -> Result<ScoreReport> {
        let scores = row
            .scores
            .ok_or_else(|| anyhow!("no scores reported yet for {}", row.id))?;
        let score_for = |team: &str| -> Result<i32> {
            scores
                .iter()
                .find(|s| s.name == team)
                .ok_or_else(|| anyhow!("no score entry for {team}"))?
                .score
                .parse::<i32>()
                .with_context(|| format!("unparseable score for {team}"))
        };
        Ok(ScoreReport {
            home_score: score_for(&row.home_team)?,
            away_score: score_for(&row.away_team)?,
            event_id: row.id,
            home_team: row.home_team,
            away_team: row.away_team,
            completed: row.completed,
            last_update: row.last_update,
        })
    }
}

#[async_trait]
impl ScoreClient for ScoresApiClient {
    async fn fetch_score(&self, provider_event_id: &str) -> Result<Option<ScoreReport>> {
        let url = format!("{}/sports/{}/scores", self.base_url, self.sport_key);
        let rows: Vec<ProviderScoreRow> = self
            .http
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("eventIds", provider_event_id),
                ("daysFrom", "3"),
            ])
            .send()
            .await
            .context("score provider request failed")?
            .error_for_status()
            .context("score provider error status")?
            .json()
            .await
            .context("decode score payload")?;

        rows.into_iter()
            .find(|row| row.id == provider_event_id)
            .map(Self::row_to_report)
            .transpose()
    }
}
