//! Universal Sharp Side Selection
//!
//! Model spread is a SIGNED value relative to team direction: positive means
//! the underdog covers, negative means the favorite covers. It is a
//! model-implied spread direction and magnitude, not a delta vs market and
//! not a probability.
//!
//! Spread rule (underdog value exploitation):
//! - Favorites are only sharp when the market severely undersells them
//!   (favorite spread at -3.0 or lower AND the model at least 3 points
//!   heavier than the market).
//! - Model gives the dog fewer points than the market → market is generous
//!   to the dog → TAKE_POINTS, pregame entry OK.
//! - Model gives the dog more points than the market → market is shorting
//!   the dog → TAKE_POINTS_LIVE, entry deferred to the live market.
//! - Volatility penalties apply after side selection.

use super::{EdgeState, VolatilityLevel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SharpAction {
    LayPoints,
    TakePoints,
    TakePointsLive,
    Over,
    Under,
    Ml,
    None,
}

impl SharpAction {
    pub fn is_play(&self) -> bool {
        !matches!(self, SharpAction::None)
    }
}

/// Result of the sharp side selection algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharpSideSelection {
    /// Team name + line (e.g. "New York Knicks -5.5"), or "NO_SHARP_PLAY".
    pub sharp_side: String,
    pub recommended_bet: String,
    pub sharp_action: SharpAction,

    /// Market spread from the underdog's perspective (or the total line).
    pub market_spread: f64,
    /// Model spread as given (signed: + = underdog, - = favorite).
    pub model_spread: f64,

    pub market_favorite: String,
    pub market_underdog: String,

    pub edge_magnitude: f64,
    pub volatility_penalty: f64,
    pub edge_after_penalty: f64,

    // Display strings - the source of truth for downstream renderers.
    pub market_spread_display: String,
    pub model_spread_display: String,
    pub sharp_side_display: String,

    pub reasoning: String,
}

/// Select the sharp side for a spread market.
///
/// `market_spread_home` is the spread from the HOME perspective (negative =
/// home favored); `model_spread` is signed (+ = underdog covers).
pub fn select_sharp_side_spread(
    home_team: &str,
    away_team: &str,
    market_spread_home: f64,
    model_spread: f64,
    volatility: VolatilityLevel,
    market_odds_home: i32,
    market_odds_away: i32,
) -> SharpSideSelection {
    let market_spread_away = -market_spread_home;

    let (market_favorite, market_underdog, market_spread_underdog, market_spread_favorite) =
        if market_spread_home < 0.0 {
            (home_team, away_team, market_spread_away, market_spread_home)
        } else {
            (away_team, home_team, market_spread_home, market_spread_away)
        };

    // Normalize to the underdog's perspective for comparison.
    let model_spread_normalized = model_spread.abs();
    let model_spread_fav = -model_spread_normalized;
    let market_spread_fav = market_spread_favorite;

    let mut edge_magnitude = (model_spread_normalized - market_spread_underdog).abs();

    // The rare "favorite is sharp" scenario: only when the market is
    // severely underselling a real favorite (not a near pick'em).
    let favorite_sharp =
        market_spread_fav <= -3.0 && model_spread_fav < market_spread_fav - 3.0;

    let market_spread_display = format!("{market_underdog} +{market_spread_underdog:.1}");
    let model_spread_display = format!("{market_underdog} +{model_spread_normalized:.1}");

    let (sharp_side_team, sharp_side_line, sharp_action, mut reason) = if favorite_sharp {
        edge_magnitude = (model_spread_fav - market_spread_fav).abs();
        let reason = format!(
            "Model projects {market_favorite} at {model_spread_fav:.1}, market only offers \
             {market_spread_fav:.1}. Market severely underselling favorite by \
             {edge_magnitude:.1} pts. Sharp side = FAVORITE (rare scenario)."
        );
        (
            market_favorite,
            market_spread_favorite,
            SharpAction::LayPoints,
            reason,
        )
    } else if model_spread_normalized < market_spread_underdog {
        let reason = format!(
            "Model projects {market_underdog} at +{model_spread_normalized:.1}, market offers \
             +{market_spread_underdog:.1}. Market is generous to dog by {edge_magnitude:.1} pts. \
             Sharp side = UNDERDOG (pregame OK)."
        );
        (
            market_underdog,
            market_spread_underdog,
            SharpAction::TakePoints,
            reason,
        )
    } else if model_spread_normalized > market_spread_underdog {
        let reason = format!(
            "Model projects {market_underdog} at +{model_spread_normalized:.1}, market only \
             offers +{market_spread_underdog:.1}. Market is shorting dog by {edge_magnitude:.1} \
             pts. Sharp side = UNDERDOG (prefer live entry after the line moves)."
        );
        (
            market_underdog,
            market_spread_underdog,
            SharpAction::TakePointsLive,
            reason,
        )
    } else {
        return SharpSideSelection {
            sharp_side: "NO_SHARP_PLAY".to_string(),
            recommended_bet: "NO PLAY (model agrees with market)".to_string(),
            sharp_action: SharpAction::None,
            market_spread: market_spread_underdog,
            model_spread,
            market_favorite: market_favorite.to_string(),
            market_underdog: market_underdog.to_string(),
            edge_magnitude: 0.0,
            volatility_penalty: 0.0,
            edge_after_penalty: 0.0,
            market_spread_display,
            model_spread_display,
            sharp_side_display: "NO PLAY".to_string(),
            reasoning: "Model spread matches market spread".to_string(),
        };
    };

    // Volatility penalty: live-only entries pay at every level, pregame dogs
    // only at EXTREME, favorite sharps never.
    let penalty = match sharp_action {
        SharpAction::TakePointsLive => match volatility {
            VolatilityLevel::Low => 0.5,
            VolatilityLevel::Medium => 1.0,
            VolatilityLevel::High => 2.0,
            VolatilityLevel::Extreme => 3.0,
        },
        SharpAction::TakePoints if volatility == VolatilityLevel::Extreme => 1.0,
        _ => 0.0,
    };
    if penalty > 0.0 {
        reason.push_str(&format!(
            " | Volatility penalty: -{penalty:.1} pts ({volatility} volatility)"
        ));
    }

    let edge_after_penalty = edge_magnitude - penalty;
    if edge_after_penalty <= 0.0 {
        return SharpSideSelection {
            sharp_side: "NO_SHARP_PLAY".to_string(),
            recommended_bet: format!(
                "NO PLAY (edge eliminated by volatility penalty: {edge_magnitude:.1} - \
                 {penalty:.1} = {edge_after_penalty:.1})"
            ),
            sharp_action: SharpAction::None,
            market_spread: market_spread_underdog,
            model_spread,
            market_favorite: market_favorite.to_string(),
            market_underdog: market_underdog.to_string(),
            edge_magnitude,
            volatility_penalty: penalty,
            edge_after_penalty,
            market_spread_display,
            model_spread_display,
            sharp_side_display: "NO PLAY".to_string(),
            reasoning: reason,
        };
    }

    let sharp_side_display = format!("{sharp_side_team} {sharp_side_line:+.1}");
    let sharp_odds = if sharp_side_team == home_team {
        market_odds_home
    } else {
        market_odds_away
    };

    let recommended_bet = match sharp_action {
        SharpAction::TakePointsLive => format!(
            "{sharp_side_team} {sharp_side_line:+.1} ({sharp_odds:+}) WAIT FOR LIVE ENTRY - \
             line should improve if {market_favorite} goes up early"
        ),
        SharpAction::LayPoints => format!(
            "{sharp_side_team} {sharp_side_line:+.1} ({sharp_odds:+}) PREGAME OK - favorite \
             severely undervalued"
        ),
        _ => format!(
            "{sharp_side_team} {sharp_side_line:+.1} ({sharp_odds:+}) PREGAME OK - market \
             generous to underdog"
        ),
    };

    SharpSideSelection {
        sharp_side: sharp_side_display.clone(),
        recommended_bet,
        sharp_action,
        market_spread: market_spread_underdog,
        model_spread,
        market_favorite: market_favorite.to_string(),
        market_underdog: market_underdog.to_string(),
        edge_magnitude,
        volatility_penalty: penalty,
        edge_after_penalty,
        market_spread_display,
        model_spread_display,
        sharp_side_display,
        reasoning: reason,
    }
}

/// Select the sharp side for a totals market: whichever side the compressed
/// distribution favors. No penalty logic beyond the standard volatility flag.
pub fn select_sharp_side_total(
    over_prob: f64,
    under_prob: f64,
    total_line: f64,
    compressed_edge: f64,
    over_odds: i32,
    under_odds: i32,
) -> SharpSideSelection {
    let (favored_side, sharp_action, sharp_odds, prob) = if over_prob > under_prob {
        ("OVER", SharpAction::Over, over_odds, over_prob)
    } else {
        ("UNDER", SharpAction::Under, under_odds, under_prob)
    };

    let sharp_side_display = format!("{favored_side} {total_line}");
    SharpSideSelection {
        sharp_side: sharp_side_display.clone(),
        recommended_bet: format!("{favored_side} {total_line} ({sharp_odds:+})"),
        sharp_action,
        market_spread: total_line,
        model_spread: 0.0,
        market_favorite: "N/A".to_string(),
        market_underdog: "N/A".to_string(),
        edge_magnitude: compressed_edge,
        volatility_penalty: 0.0,
        edge_after_penalty: compressed_edge,
        market_spread_display: format!("Total: {total_line}"),
        model_spread_display: format!("Model favors: {favored_side}"),
        sharp_side_display,
        reasoning: format!(
            "Model favors {favored_side} {total_line} with {:.1}% probability",
            prob * 100.0
        ),
    }
}

/// Select the sharp side for a moneyline market: the team with the higher
/// compressed win probability.
pub fn select_sharp_side_moneyline(
    home_win_prob: f64,
    away_win_prob: f64,
    home_team: &str,
    away_team: &str,
    compressed_edge: f64,
    home_odds: i32,
    away_odds: i32,
) -> SharpSideSelection {
    let (favored_team, sharp_odds, prob) = if home_win_prob > away_win_prob {
        (home_team, home_odds, home_win_prob)
    } else {
        (away_team, away_odds, away_win_prob)
    };

    let sharp_side_display = format!("{favored_team} ML");
    SharpSideSelection {
        sharp_side: sharp_side_display.clone(),
        recommended_bet: format!("{favored_team} ML ({sharp_odds:+})"),
        sharp_action: SharpAction::Ml,
        market_spread: 0.0,
        model_spread: 0.0,
        market_favorite: "N/A".to_string(),
        market_underdog: "N/A".to_string(),
        edge_magnitude: compressed_edge,
        volatility_penalty: 0.0,
        edge_after_penalty: compressed_edge,
        market_spread_display: format!(
            "{home_team} ({home_odds:+}) vs {away_team} ({away_odds:+})"
        ),
        model_spread_display: format!("Model favors: {favored_team}"),
        sharp_side_display,
        reasoning: format!(
            "Model favors {favored_team} to win with {:.1}% probability",
            prob * 100.0
        ),
    }
}

/// Alignment invariant between the evaluator and the selector. EDGE/LEAN
/// requires a real selection; NO_PLAY forbids one. Violations are hard
/// errors: the caller must refuse to publish.
pub fn validate_sharp_side_alignment(
    edge_state: EdgeState,
    selection: Option<&SharpSideSelection>,
) -> Result<(), String> {
    match edge_state {
        EdgeState::Edge | EdgeState::Lean => {
            let Some(selection) = selection else {
                return Err(format!(
                    "edge_state is {edge_state} but sharp_side not selected"
                ));
            };
            if selection.sharp_side.is_empty() || selection.sharp_side == "NO_SHARP_PLAY" {
                return Err(format!(
                    "edge_state is {edge_state} but sharp_side is {}",
                    selection.sharp_side
                ));
            }
            if selection.edge_after_penalty <= 0.0 {
                return Err(format!(
                    "edge_after_penalty is {:.2} but edge_state is {edge_state}",
                    selection.edge_after_penalty
                ));
            }
            Ok(())
        }
        EdgeState::NoPlay => match selection {
            Some(selection) if selection.sharp_side != "NO_SHARP_PLAY" => Err(format!(
                "edge_state is NO_PLAY but sharp_side is set to {}",
                selection.sharp_side
            )),
            _ => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME: &str = "New York Knicks";
    const AWAY: &str = "Atlanta Hawks";

    #[test]
    fn severely_undersold_favorite_is_lay_points() {
        // Market: Hawks +5.5 / Knicks -5.5; model has the dog down 12.3.
        let selection =
            select_sharp_side_spread(HOME, AWAY, -5.5, 12.3, VolatilityLevel::Medium, -110, -110);

        assert_eq!(selection.sharp_action, SharpAction::LayPoints);
        assert_eq!(selection.market_spread_display, "Atlanta Hawks +5.5");
        assert!(selection.model_spread_display.contains("+12.3"));
        assert!(selection.sharp_side_display.contains("Knicks"));
        assert!((selection.edge_magnitude - 6.8).abs() < 1e-9);
        // Favorite sharp pays no volatility penalty.
        assert_eq!(selection.volatility_penalty, 0.0);
        assert!((selection.edge_after_penalty - 6.8).abs() < 1e-9);
    }

    #[test]
    fn generous_market_dog_is_take_points() {
        let selection =
            select_sharp_side_spread(HOME, AWAY, -5.5, -3.2, VolatilityLevel::Low, -110, -110);

        assert_eq!(selection.sharp_action, SharpAction::TakePoints);
        assert!((selection.edge_magnitude - 2.3).abs() < 1e-9);
        assert!(selection.sharp_side.contains("Hawks"));
        assert_eq!(selection.market_spread_display, "Atlanta Hawks +5.5");
        assert_eq!(selection.volatility_penalty, 0.0);
    }

    #[test]
    fn shorted_dog_is_live_only_with_penalty() {
        // Model +8.0 vs market +5.5: market shorting the dog by 2.5.
        let selection =
            select_sharp_side_spread(HOME, AWAY, -5.5, 8.0, VolatilityLevel::Medium, -110, -110);

        assert_eq!(selection.sharp_action, SharpAction::TakePointsLive);
        assert!((selection.edge_magnitude - 2.5).abs() < 1e-9);
        assert_eq!(selection.volatility_penalty, 1.0);
        assert!((selection.edge_after_penalty - 1.5).abs() < 1e-9);
        assert!(selection.recommended_bet.contains("LIVE"));
    }

    #[test]
    fn penalty_can_suppress_the_play() {
        // Edge 2.5 with EXTREME volatility on a live-only entry: 2.5 - 3.0 < 0.
        let selection =
            select_sharp_side_spread(HOME, AWAY, -5.5, 8.0, VolatilityLevel::Extreme, -110, -110);

        assert_eq!(selection.sharp_action, SharpAction::None);
        assert_eq!(selection.sharp_side, "NO_SHARP_PLAY");
        assert!((selection.edge_after_penalty - (-0.5)).abs() < 1e-9);
        assert_eq!(selection.volatility_penalty, 3.0);
    }

    #[test]
    fn pregame_dog_pays_only_extreme_penalty() {
        let selection =
            select_sharp_side_spread(HOME, AWAY, -5.5, -3.2, VolatilityLevel::Extreme, -110, -110);
        assert_eq!(selection.sharp_action, SharpAction::TakePoints);
        assert_eq!(selection.volatility_penalty, 1.0);
        assert!((selection.edge_after_penalty - 1.3).abs() < 1e-9);
    }

    #[test]
    fn model_agreeing_with_market_is_no_play() {
        let selection =
            select_sharp_side_spread(HOME, AWAY, -5.5, 5.5, VolatilityLevel::Low, -110, -110);
        assert_eq!(selection.sharp_action, SharpAction::None);
        assert_eq!(selection.sharp_side, "NO_SHARP_PLAY");
        assert_eq!(selection.edge_magnitude, 0.0);
    }

    #[test]
    fn small_favorites_never_trigger_the_favorite_case() {
        // Market -2.5 is inside the pick'em guard; a heavy model number
        // reads as "market shorting the dog", not a favorite sharp.
        let selection =
            select_sharp_side_spread(HOME, AWAY, -2.5, 9.0, VolatilityLevel::Low, -110, -110);
        assert_eq!(selection.sharp_action, SharpAction::TakePointsLive);
    }

    #[test]
    fn away_favorite_orientation() {
        // Home spread +4.5 → away team is the favorite.
        let selection =
            select_sharp_side_spread(HOME, AWAY, 4.5, -2.0, VolatilityLevel::Low, -110, -110);
        assert_eq!(selection.market_favorite, AWAY);
        assert_eq!(selection.market_underdog, HOME);
        assert_eq!(selection.sharp_action, SharpAction::TakePoints);
        assert!(selection.sharp_side.contains("Knicks"));
    }

    #[test]
    fn totals_pick_the_probable_side() {
        let selection = select_sharp_side_total(0.58, 0.42, 220.5, 5.1, -110, -110);
        assert_eq!(selection.sharp_action, SharpAction::Over);
        assert_eq!(selection.sharp_side, "OVER 220.5");
        assert_eq!(selection.edge_after_penalty, 5.1);

        let selection = select_sharp_side_total(0.45, 0.55, 220.5, 3.0, -110, -105);
        assert_eq!(selection.sharp_action, SharpAction::Under);
    }

    #[test]
    fn moneyline_picks_the_higher_win_probability() {
        let selection =
            select_sharp_side_moneyline(0.56, 0.44, "New York Yankees", "Boston Red Sox", 3.8, -140, 120);
        assert_eq!(selection.sharp_action, SharpAction::Ml);
        assert_eq!(selection.sharp_side, "New York Yankees ML");
    }

    #[test]
    fn alignment_violations_are_hard_errors() {
        assert!(validate_sharp_side_alignment(EdgeState::Edge, None).is_err());

        let no_play =
            select_sharp_side_spread(HOME, AWAY, -5.5, 5.5, VolatilityLevel::Low, -110, -110);
        assert!(validate_sharp_side_alignment(EdgeState::Edge, Some(&no_play)).is_err());
        assert!(validate_sharp_side_alignment(EdgeState::NoPlay, Some(&no_play)).is_ok());

        let play =
            select_sharp_side_spread(HOME, AWAY, -5.5, -3.2, VolatilityLevel::Low, -110, -110);
        assert!(validate_sharp_side_alignment(EdgeState::Lean, Some(&play)).is_ok());
        assert!(validate_sharp_side_alignment(EdgeState::NoPlay, Some(&play)).is_err());
    }
}
