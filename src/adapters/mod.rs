//! External Provider Adapters
//!
//! Abstract contracts for odds and score providers plus the HTTP
//! implementations. Retries and key rotation live here, never in the core.

pub mod odds_api;
pub mod scores;

pub use odds_api::OddsApiClient;
pub use scores::{validate_provider_mapping, MappingDrift, ScoresApiClient};

use crate::signals::{GameInfo, MarketQuotes, MoneylineQuote, SpreadQuote, TotalQuote};
use crate::sport::evaluator::Confirmations;
use crate::sport::Sport;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsOutcome {
    pub name: String,
    pub price: i32,
    #[serde(default)]
    pub point: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsMarket {
    pub key: String,
    pub outcomes: Vec<OddsOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmaker {
    pub key: String,
    #[serde(default)]
    pub title: String,
    pub markets: Vec<OddsMarket>,
}

/// One upcoming event with per-book market prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsEvent {
    pub id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

/// Odds provider contract. Must support at least `h2h`, `spreads`,
/// `totals`, and `totals_1h` market keys.
#[async_trait]
pub trait OddsClient: Send + Sync {
    async fn fetch_events(
        &self,
        sport: Sport,
        region: &str,
        markets: &[&str],
    ) -> Result<Vec<OddsEvent>>;
}

/// Final (or in-progress) score for an exact provider event id. Fuzzy
/// matching is forbidden at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReport {
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: i32,
    pub away_score: i32,
    pub completed: bool,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ScoreClient: Send + Sync {
    async fn fetch_score(&self, provider_event_id: &str) -> Result<Option<ScoreReport>>;
}

impl OddsEvent {
    pub fn game_info(&self, sport: Sport) -> GameInfo {
        GameInfo {
            game_id: self.id.clone(),
            sport,
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            game_time: self.commence_time,
        }
    }

    /// Collapse the first bookmaker carrying each market into one quote set.
    pub fn market_quotes(&self, confirmations: Confirmations) -> MarketQuotes {
        let mut spread = None;
        let mut total = None;
        let mut moneyline = None;
        let mut book = "CONSENSUS".to_string();

        for bookmaker in &self.bookmakers {
            for market in &bookmaker.markets {
                match market.key.as_str() {
                    "spreads" if spread.is_none() => {
                        let home = market.outcomes.iter().find(|o| o.name == self.home_team);
                        let away = market.outcomes.iter().find(|o| o.name == self.away_team);
                        if let (Some(home), Some(away)) = (home, away) {
                            if let Some(line) = home.point {
                                spread = Some(SpreadQuote {
                                    line,
                                    home_price: home.price,
                                    away_price: away.price,
                                });
                                book = bookmaker.key.clone();
                            }
                        }
                    }
                    "totals" if total.is_none() => {
                        let over = market
                            .outcomes
                            .iter()
                            .find(|o| o.name.eq_ignore_ascii_case("over"));
                        let under = market
                            .outcomes
                            .iter()
                            .find(|o| o.name.eq_ignore_ascii_case("under"));
                        if let (Some(over), Some(under)) = (over, under) {
                            if let Some(line) = over.point {
                                total = Some(TotalQuote {
                                    line,
                                    over_price: over.price,
                                    under_price: under.price,
                                });
                            }
                        }
                    }
                    "h2h" if moneyline.is_none() => {
                        let home = market.outcomes.iter().find(|o| o.name == self.home_team);
                        let away = market.outcomes.iter().find(|o| o.name == self.away_team);
                        if let (Some(home), Some(away)) = (home, away) {
                            moneyline = Some(MoneylineQuote {
                                home_price: home.price,
                                away_price: away.price,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        MarketQuotes {
            book,
            spread,
            total,
            moneyline,
            confirmations,
        }
    }
}

/// Persisted game record in the `events` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub event_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub status: String,
    #[serde(default)]
    pub provider_event_id: Option<String>,
    #[serde(default)]
    pub grading_frozen: bool,
}

impl GameRecord {
    pub fn from_event(event: &OddsEvent, sport: Sport) -> Self {
        Self {
            event_id: event.id.clone(),
            sport,
            home_team: event.home_team.clone(),
            away_team: event.away_team.clone(),
            commence_time: event.commence_time,
            status: "scheduled".to_string(),
            provider_event_id: Some(event.id.clone()),
            grading_frozen: false,
        }
    }

    pub fn game_info(&self) -> GameInfo {
        GameInfo {
            game_id: self.event_id.clone(),
            sport: self.sport,
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            game_time: self.commence_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> OddsEvent {
        OddsEvent {
            id: "evt_1".to_string(),
            sport_key: "basketball_nba".to_string(),
            home_team: "New York Knicks".to_string(),
            away_team: "Atlanta Hawks".to_string(),
            commence_time: Utc::now(),
            bookmakers: vec![Bookmaker {
                key: "draftkings".to_string(),
                title: "DraftKings".to_string(),
                markets: vec![
                    OddsMarket {
                        key: "spreads".to_string(),
                        outcomes: vec![
                            OddsOutcome {
                                name: "New York Knicks".to_string(),
                                price: -110,
                                point: Some(-5.5),
                            },
                            OddsOutcome {
                                name: "Atlanta Hawks".to_string(),
                                price: -110,
                                point: Some(5.5),
                            },
                        ],
                    },
                    OddsMarket {
                        key: "totals".to_string(),
                        outcomes: vec![
                            OddsOutcome {
                                name: "Over".to_string(),
                                price: -110,
                                point: Some(220.5),
                            },
                            OddsOutcome {
                                name: "Under".to_string(),
                                price: -110,
                                point: Some(220.5),
                            },
                        ],
                    },
                    OddsMarket {
                        key: "h2h".to_string(),
                        outcomes: vec![
                            OddsOutcome {
                                name: "New York Knicks".to_string(),
                                price: -220,
                                point: None,
                            },
                            OddsOutcome {
                                name: "Atlanta Hawks".to_string(),
                                price: 180,
                                point: None,
                            },
                        ],
                    },
                ],
            }],
        }
    }

    #[test]
    fn quotes_extracted_from_bookmaker_markets() {
        let quotes = event().market_quotes(Confirmations::all_clear());
        assert_eq!(quotes.book, "draftkings");
        let spread = quotes.spread.unwrap();
        assert_eq!(spread.line, -5.5);
        assert_eq!(spread.away_price, -110);
        assert_eq!(quotes.total.unwrap().line, 220.5);
        assert_eq!(quotes.moneyline.unwrap().home_price, -220);
    }

    #[test]
    fn provider_payload_deserializes() {
        let raw = r#"{
            "id": "abc123",
            "sport_key": "americanfootball_nfl",
            "home_team": "Kansas City Chiefs",
            "away_team": "Buffalo Bills",
            "commence_time": "2025-11-09T18:00:00Z",
            "bookmakers": [
                {"key": "fanduel", "title": "FanDuel", "markets": [
                    {"key": "h2h", "outcomes": [
                        {"name": "Kansas City Chiefs", "price": -130},
                        {"name": "Buffalo Bills", "price": 110}
                    ]}
                ]}
            ]
        }"#;
        let event: OddsEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.bookmakers.len(), 1);
        assert!(event
            .market_quotes(Confirmations::all_clear())
            .moneyline
            .is_some());
    }
}
