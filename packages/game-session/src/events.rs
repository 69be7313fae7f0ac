use shared::models::game_session::Color;

use crate::clock::ClockSide;

/// Everything the rendering layer can observe about a live session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    SecondPlayerJoined { opponent_id: String },
    PositionChanged { position: String },
    GameFinished { cause: String, player_won: Option<bool> },
    ClockTick { remaining_ms: u64, side: ClockSide },
    ClockExpired { side: ClockSide },
    IllegalMove,
    PromotionRequired { square: String },
}

/// Answer to an attempted move. `Illegal` covers every rejected input
/// (wrong turn, oracle said no, oracle unreachable) - it is a normal
/// answer, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Applied,
    Illegal,
    PromotionPending,
}

/// A decoded terminal oracle result.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalResult {
    /// `None` for a draw.
    pub winner: Option<Color>,
    pub cause: String,
}

impl TerminalResult {
    /// Decodes an oracle result string. Empty means the game continues.
    /// Otherwise the string leads with "white", "black" or "draw",
    /// optionally followed by ":<cause>".
    pub fn from_result_string(result: &str) -> Option<TerminalResult> {
        if result.is_empty() {
            return None;
        }
        let (head, tail) = result.split_once(':').unwrap_or((result, ""));
        let winner = match head {
            "white" => Some(Color::White),
            "black" => Some(Color::Black),
            _ => None,
        };
        let cause = if tail.is_empty() {
            result.to_string()
        } else {
            tail.to_string()
        };
        Some(TerminalResult { winner, cause })
    }

    /// Classifies the outcome for the side playing `player_color`:
    /// `Some(true)` won, `Some(false)` lost, `None` drawn.
    pub fn player_won(&self, player_color: Color) -> Option<bool> {
        self.winner.map(|winner| winner == player_color)
    }
}
