use crate::models::player_stats::PlayerStats;

/// Rating change factor applied per decided game.
pub const RATING_K: f64 = 30.0;

pub const WIN_SCORE: f64 = 1.0;
pub const DRAW_SCORE: f64 = 0.5;
pub const LOSS_SCORE: f64 = 0.0;

/// Probability that the holder of `rating_b` beats the holder of
/// `rating_a`. `win_probability(r, r)` is 0.5 and the two orderings sum
/// to 1.
pub fn win_probability(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_a - rating_b) / 400.0))
}

/// Logistic rating update. `score_a` is player A's actual score: 1.0 for a
/// win, 0.5 for a draw, 0.0 for a loss. The update is exactly zero-sum:
/// whatever A gains, B loses.
pub fn update_ratings(rating_a: f64, rating_b: f64, k: f64, score_a: f64) -> (f64, f64) {
    let expected_a = win_probability(rating_b, rating_a);
    let expected_b = win_probability(rating_a, rating_b);
    (
        rating_a + k * (score_a - expected_a),
        rating_b + k * ((1.0 - score_a) - expected_b),
    )
}

/// Settles one finished game into both stat records. Play counts always
/// advance; ratings and win/loss counters move only for a decided outcome.
/// `None` (a game that was never decided) leaves everything but the play
/// counts untouched.
pub fn apply_outcome(stats_a: &mut PlayerStats, stats_b: &mut PlayerStats, a_won: Option<bool>) {
    stats_a.games_played += 1;
    stats_b.games_played += 1;

    if let Some(a_won) = a_won {
        let score_a = if a_won { WIN_SCORE } else { LOSS_SCORE };
        let (new_a, new_b) = update_ratings(stats_a.rating, stats_b.rating, RATING_K, score_a);
        stats_a.rating = new_a;
        stats_b.rating = new_b;
        if a_won {
            stats_a.games_won += 1;
            stats_b.games_lost += 1;
        } else {
            stats_b.games_won += 1;
            stats_a.games_lost += 1;
        }
    }
}
