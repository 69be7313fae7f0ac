use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wildcard prefix for variant/time-mode filters. A value starting with
/// "any" ("any", "any variant", "any time mode") matches every session and
/// is omitted from store predicates instead of being matched literally.
pub const WILDCARD_PREFIX: &str = "any";

/// Defaults substituted when both sides of a pairing left a field as a
/// wildcard.
pub const DEFAULT_VARIANT: &str = "standard";
pub const DEFAULT_TIME_MODE: &str = "blitz (5 minutes)";

pub fn is_wildcard(value: &str) -> bool {
    value.starts_with(WILDCARD_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One replicated game-session document. Both participants read and write
/// the same record through the document store; `player2_id` goes from empty
/// to non-empty exactly once (enforced by a conditional write) and
/// `finished` only ever flips false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub session_id: String,
    pub variant_name: String,
    pub time_mode: String,
    pub player1_id: String,
    pub player1_color: Color,
    pub player1_rating: f64,
    pub player2_id: String,
    pub player2_color: Color,
    pub player2_rating: f64,
    pub current_position: String,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    /// A fresh open session. The creator always takes white so the joiner's
    /// color is known before anyone joins.
    pub fn new(variant_name: &str, time_mode: &str, player1_id: &str, player1_rating: f64) -> Self {
        GameSession {
            session_id: Uuid::new_v4().to_string(),
            variant_name: variant_name.to_string(),
            time_mode: time_mode.to_string(),
            player1_id: player1_id.to_string(),
            player1_color: Color::White,
            player1_rating,
            player2_id: String::new(),
            player2_color: Color::Black,
            player2_rating: 0.0,
            current_position: String::new(),
            finished: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        !self.finished && self.player2_id.is_empty()
    }

    pub fn color_of(&self, player_id: &str) -> Option<Color> {
        if self.player1_id == player_id {
            Some(self.player1_color)
        } else if self.player2_id == player_id {
            Some(self.player2_color)
        } else {
            None
        }
    }

    pub fn opponent_of(&self, player_id: &str) -> Option<&str> {
        if self.player1_id == player_id {
            Some(self.player2_id.as_str())
        } else if self.player2_id == player_id {
            Some(self.player1_id.as_str())
        } else {
            None
        }
    }

    pub fn rating_of(&self, player_id: &str) -> Option<f64> {
        if self.player1_id == player_id {
            Some(self.player1_rating)
        } else if self.player2_id == player_id {
            Some(self.player2_rating)
        } else {
            None
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            variant_name: self.variant_name.clone(),
            time_mode: self.time_mode.clone(),
            host_rating: self.player1_rating,
            guest_color: self.player2_color,
        }
    }
}

/// Discovery projection of an open session: what a searching player needs
/// to pick and join a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub variant_name: String,
    pub time_mode: String,
    pub host_rating: f64,
    pub guest_color: Color,
}
