use chrono::{DateTime, Utc};

use shared::models::game_session::Color;
use shared::models::position::{self, PositionError};

/// Coordinates of a move awaiting a promotion choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPromotion {
    pub from: String,
    pub to: String,
}

/// The in-memory mirror of one session from the acting client's
/// perspective. Derived fields are rebuilt wholesale from the replicated
/// position on every change - never patched incrementally - so applying
/// the same position twice is a no-op by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalGameView {
    pub active_color: Color,
    pub move_count: u32,
    pub captured_count: u32,
    pub start_time: DateTime<Utc>,
    pub pending_promotion: Option<PendingPromotion>,
    pub position: String,
    /// Piece count of the first non-empty position this view saw; the
    /// capture total is measured against it.
    baseline_piece_count: Option<u32>,
}

impl LocalGameView {
    /// View of a session before any move was replicated. White moves
    /// first, so an empty position means white to move.
    pub fn empty() -> Self {
        LocalGameView {
            active_color: Color::White,
            move_count: 0,
            captured_count: 0,
            start_time: Utc::now(),
            pending_promotion: None,
            position: String::new(),
            baseline_piece_count: None,
        }
    }

    pub fn from_position(position: &str) -> Result<Self, PositionError> {
        let mut view = LocalGameView::empty();
        if !position.is_empty() {
            view.rebuild(position)?;
        }
        Ok(view)
    }

    /// Full replacement of every derived field from the given position.
    /// On error the view is left untouched, so corrupt replicated state
    /// surfaces without destroying the last good view.
    pub fn rebuild(&mut self, position: &str) -> Result<(), PositionError> {
        if position.is_empty() {
            return Err(PositionError::Empty);
        }
        let active_color = position::active_color(position)?;
        let move_count = position::moves_made(position)?;
        let pieces = position::piece_count(position)?;

        let baseline = self.baseline_piece_count.unwrap_or(pieces);
        self.baseline_piece_count = Some(baseline);
        self.active_color = active_color;
        self.move_count = move_count;
        self.captured_count = baseline.saturating_sub(pieces);
        self.pending_promotion = None;
        self.position = position.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPPPPPP/RNBQKBNR b KQkq e3 0 1";
    const AFTER_CAPTURE: &str =
        "rnbqkbnr/ppp1pppp/8/3P4/8/8/PPPP1PPP/RNBQKBNR b KQkq - 0 2";

    #[test]
    fn test_empty_view_defaults() {
        let view = LocalGameView::empty();
        assert_eq!(view.active_color, Color::White);
        assert_eq!(view.move_count, 0);
        assert_eq!(view.captured_count, 0);
        assert!(view.pending_promotion.is_none());
    }

    #[test]
    fn test_rebuild_derives_everything_from_position() {
        let mut view = LocalGameView::from_position(START).unwrap();
        view.rebuild(AFTER_E4).unwrap();

        assert_eq!(view.active_color, Color::Black);
        assert_eq!(view.move_count, 1);
        assert_eq!(view.captured_count, 0);
        assert_eq!(view.position, AFTER_E4);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut once = LocalGameView::from_position(START).unwrap();
        once.rebuild(AFTER_E4).unwrap();
        let mut twice = once.clone();
        twice.rebuild(AFTER_E4).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_capture_count_is_relative_to_baseline() {
        let mut view = LocalGameView::from_position(START).unwrap();
        view.rebuild(AFTER_CAPTURE).unwrap();

        assert_eq!(view.captured_count, 1);
    }

    #[test]
    fn test_rebuild_clears_pending_promotion() {
        let mut view = LocalGameView::from_position(START).unwrap();
        view.pending_promotion = Some(PendingPromotion {
            from: "a7".to_string(),
            to: "a8".to_string(),
        });

        view.rebuild(AFTER_E4).unwrap();
        assert!(view.pending_promotion.is_none());
    }

    #[test]
    fn test_corrupt_position_leaves_view_untouched() {
        let mut view = LocalGameView::from_position(AFTER_E4).unwrap();
        let before = view.clone();

        let result = view.rebuild("definitely not a position");
        assert!(result.is_err());
        assert_eq!(view, before);
    }
}
