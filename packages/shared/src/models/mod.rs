pub mod game_session;
pub mod player_stats;
pub mod position;
