//! Odds Provider HTTP Client
//!
//! Key-pool rotation: on a 401 with OUT_OF_USAGE_CREDITS the client moves
//! to the next key and retries; an exhausted pool surfaces as a transient
//! failure callers may retry later.

use super::{OddsClient, OddsEvent};
use crate::sport::Sport;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";
const CALL_TIMEOUT: Duration = Duration::from_secs(20);

fn provider_sport_key(sport: Sport) -> &'static str {
    match sport {
        Sport::Mlb => "baseball_mlb",
        Sport::Nba => "basketball_nba",
        Sport::Ncaab => "basketball_ncaab",
        Sport::Ncaaf => "americanfootball_ncaaf",
        Sport::Nfl => "americanfootball_nfl",
        Sport::Nhl => "icehockey_nhl",
    }
}

pub struct OddsApiClient {
    http: reqwest::Client,
    base_url: String,
    keys: Vec<String>,
    current_key: Mutex<usize>,
}

impl OddsApiClient {
    pub fn new(keys: Vec<String>) -> Result<Self> {
        Self::with_base_url(keys, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(keys: Vec<String>, base_url: &str) -> Result<Self> {
        if keys.is_empty() {
            bail!("odds client needs at least one API key");
        }
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(CALL_TIMEOUT)
                .build()
                .context("build odds http client")?,
            base_url: base_url.trim_end_matches('/').to_string(),
            keys,
            current_key: Mutex::new(0),
        })
    }

    fn current_key(&self) -> String {
        let index = *self.current_key.lock();
        self.keys[index % self.keys.len()].clone()
    }

    /// Advance to the next key. Returns false when the pool wrapped around.
    fn rotate_key(&self) -> bool {
        let mut index = self.current_key.lock();
        *index += 1;
        if *index >= self.keys.len() {
            *index = 0;
            return false;
        }
        info!(key_index = *index, "🔑 rotated odds API key");
        true
    }

    async fn get_events_once(
        &self,
        sport: Sport,
        region: &str,
        markets: &[&str],
        api_key: &str,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/sports/{}/odds", self.base_url, provider_sport_key(sport));
        self.http
            .get(&url)
            .query(&[
                ("apiKey", api_key),
                ("regions", region),
                ("markets", &markets.join(",")),
                ("oddsFormat", "american"),
            ])
            .send()
            .await
            .context("odds provider request failed")
    }

    fn is_quota_exhausted(body: &str) -> bool {
        body.contains("OUT_OF_USAGE_CREDITS")
    }
}

#[async_trait]
impl OddsClient for OddsApiClient {
    async fn fetch_events(
        &self,
        sport: Sport,
        region: &str,
        markets: &[&str],
    ) -> Result<Vec<OddsEvent>> {
        let mut attempts = 0usize;
        loop {
            attempts += 1;
            let api_key = self.current_key();
            let response = self.get_events_once(sport, region, markets, &api_key).await?;

            if response.status() == StatusCode::UNAUTHORIZED {
                let body = response.text().await.unwrap_or_default();
                if Self::is_quota_exhausted(&body) {
                    warn!(sport = %sport, "odds key out of usage credits");
                    if self.rotate_key() && attempts < self.keys.len() {
                        continue;
                    }
                    // Pool exhausted: transient, retryable later.
                    return Err(anyhow!("odds provider quota exhausted across key pool"));
                }
                return Err(anyhow!("odds provider rejected key: {body}"));
            }

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("odds provider error {status}: {body}"));
            }

            let events: Vec<OddsEvent> =
                response.json().await.context("decode odds provider payload")?;
            return Ok(events);
        }
    }
}
