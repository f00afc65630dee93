//! Pure Grading Functions
//!
//! Settle spread/total/moneyline bets from final scores. A push on a graded
//! leg propagates up to the parlay as a reduction of leg count, not a loss.

use serde::{Deserialize, Serialize};

use super::TotalSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetResult {
    Win,
    Loss,
    Push,
}

impl std::fmt::Display for BetResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BetResult::Win => "WIN",
            BetResult::Loss => "LOSS",
            BetResult::Push => "PUSH",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpreadSide {
    Favorite,
    Underdog,
}

/// Grade a spread bet. `spread` is the favorite's (negative) number; the
/// favorite covers iff `favorite_score + spread > underdog_score`.
pub fn grade_spread(
    bet_side: SpreadSide,
    favorite_score: i32,
    underdog_score: i32,
    spread: f64,
) -> BetResult {
    let favorite_ats = favorite_score as f64 + spread;
    let underdog = underdog_score as f64;

    if (favorite_ats - underdog).abs() < f64::EPSILON {
        return BetResult::Push;
    }
    let favorite_covered = favorite_ats > underdog;
    match bet_side {
        SpreadSide::Favorite if favorite_covered => BetResult::Win,
        SpreadSide::Favorite => BetResult::Loss,
        SpreadSide::Underdog if favorite_covered => BetResult::Loss,
        SpreadSide::Underdog => BetResult::Win,
    }
}

/// Grade a totals bet against the combined final score.
pub fn grade_total(bet_side: TotalSide, home_score: i32, away_score: i32, line: f64) -> BetResult {
    let total = (home_score + away_score) as f64;
    if (total - line).abs() < f64::EPSILON {
        return BetResult::Push;
    }
    match bet_side {
        TotalSide::Over if total > line => BetResult::Win,
        TotalSide::Over => BetResult::Loss,
        TotalSide::Under if total < line => BetResult::Win,
        TotalSide::Under => BetResult::Loss,
    }
}

/// Grade a moneyline bet by the outright winner. `bet_home` selects the side.
pub fn grade_moneyline(bet_home: bool, home_score: i32, away_score: i32) -> BetResult {
    if home_score == away_score {
        return BetResult::Push;
    }
    let home_won = home_score > away_score;
    if bet_home == home_won {
        BetResult::Win
    } else {
        BetResult::Loss
    }
}

/// Settle a parlay from graded legs. Pushed legs drop out of the ticket;
/// any loss sinks it; a parlay where every leg pushed is itself a push.
pub fn grade_parlay(leg_results: &[BetResult]) -> BetResult {
    if leg_results.iter().any(|r| *r == BetResult::Loss) {
        return BetResult::Loss;
    }
    if leg_results.iter().all(|r| *r == BetResult::Push) {
        return BetResult::Push;
    }
    BetResult::Win
}

/// Surviving (non-push) leg count after settlement.
pub fn surviving_leg_count(leg_results: &[BetResult]) -> usize {
    leg_results.iter().filter(|r| **r != BetResult::Push).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn favorite_covers_or_not() {
        // Favorite -5.5 wins by 7: covers.
        assert_eq!(grade_spread(SpreadSide::Favorite, 110, 103, -5.5), BetResult::Win);
        assert_eq!(grade_spread(SpreadSide::Underdog, 110, 103, -5.5), BetResult::Loss);

        // Wins by 3: does not cover.
        assert_eq!(grade_spread(SpreadSide::Favorite, 106, 103, -5.5), BetResult::Loss);
        assert_eq!(grade_spread(SpreadSide::Underdog, 106, 103, -5.5), BetResult::Win);
    }

    #[test]
    fn whole_number_spread_can_push() {
        assert_eq!(grade_spread(SpreadSide::Favorite, 108, 105, -3.0), BetResult::Push);
        assert_eq!(grade_spread(SpreadSide::Underdog, 108, 105, -3.0), BetResult::Push);
    }

    #[test]
    fn totals_grade_against_the_line() {
        assert_eq!(grade_total(TotalSide::Over, 115, 110, 220.5), BetResult::Win);
        assert_eq!(grade_total(TotalSide::Under, 115, 110, 220.5), BetResult::Loss);
        assert_eq!(grade_total(TotalSide::Over, 110, 110, 220.0), BetResult::Push);
    }

    #[test]
    fn moneyline_by_outright_winner() {
        assert_eq!(grade_moneyline(true, 4, 2), BetResult::Win);
        assert_eq!(grade_moneyline(false, 4, 2), BetResult::Loss);
        assert_eq!(grade_moneyline(true, 3, 3), BetResult::Push);
    }

    #[test]
    fn parlay_push_reduces_leg_count() {
        let legs = [BetResult::Win, BetResult::Push, BetResult::Win];
        assert_eq!(grade_parlay(&legs), BetResult::Win);
        assert_eq!(surviving_leg_count(&legs), 2);

        assert_eq!(
            grade_parlay(&[BetResult::Win, BetResult::Loss, BetResult::Push]),
            BetResult::Loss
        );
        assert_eq!(grade_parlay(&[BetResult::Push, BetResult::Push]), BetResult::Push);
    }
}
