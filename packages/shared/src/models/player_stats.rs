use serde::{Deserialize, Serialize};

/// Starting rating for a newly registered player.
pub const INITIAL_RATING: f64 = 400.0;

/// Per-player rating record, keyed by the globally unique player name.
/// Mutated only at game termination, once per finished game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player_id: String,
    pub games_played: u64,
    pub games_won: u64,
    pub games_lost: u64,
    pub rating: f64,
}

impl PlayerStats {
    pub fn new(player_id: &str) -> Self {
        PlayerStats {
            player_id: player_id.to_string(),
            games_played: 0,
            games_won: 0,
            games_lost: 0,
            rating: INITIAL_RATING,
        }
    }

    /// Stats carrying only a rating, for the opponent side of a settlement
    /// where the counters are the opponent's own business.
    pub fn with_rating(player_id: &str, rating: f64) -> Self {
        PlayerStats {
            rating,
            ..PlayerStats::new(player_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_defaults() {
        let stats = PlayerStats::new("alice");

        assert_eq!(stats.player_id, "alice");
        assert_eq!(stats.games_played, 0);
        assert_eq!(stats.games_won, 0);
        assert_eq!(stats.games_lost, 0);
        assert_eq!(stats.rating, INITIAL_RATING);
    }

    #[test]
    fn test_with_rating() {
        let stats = PlayerStats::with_rating("bob", 612.0);

        assert_eq!(stats.player_id, "bob");
        assert_eq!(stats.rating, 612.0);
        assert_eq!(stats.games_played, 0);
    }

    #[test]
    fn test_serialization() {
        let stats = PlayerStats::new("alice");
        let serialized = serde_json::to_string(&stats).unwrap();
        let deserialized: PlayerStats = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, stats);
    }
}
