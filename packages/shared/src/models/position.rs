use crate::models::game_session::Color;

/// Readers for the FEN-shaped envelope of a replicated position string.
///
/// The position is otherwise opaque to the sync core (only the oracle
/// understands game semantics), but the envelope carries the side to move,
/// the fullmove counter, and the piece placement, which the local view
/// needs to track turns and capture totals. A stored position that fails
/// these readers is corrupt state and must be surfaced, never treated as a
/// fresh board.
#[derive(Debug, PartialEq, Eq)]
pub enum PositionError {
    Empty,
    Malformed(String),
}

impl std::fmt::Display for PositionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionError::Empty => write!(f, "position string is empty"),
            PositionError::Malformed(msg) => write!(f, "malformed position: {}", msg),
        }
    }
}

impl std::error::Error for PositionError {}

fn field(position: &str, index: usize) -> Result<&str, PositionError> {
    if position.is_empty() {
        return Err(PositionError::Empty);
    }
    position
        .split_whitespace()
        .nth(index)
        .ok_or_else(|| PositionError::Malformed(format!("missing field {}", index)))
}

/// Side to move, from the second envelope field.
pub fn active_color(position: &str) -> Result<Color, PositionError> {
    match field(position, 1)? {
        "w" => Ok(Color::White),
        "b" => Ok(Color::Black),
        other => Err(PositionError::Malformed(format!(
            "unknown side to move {:?}",
            other
        ))),
    }
}

/// Number of half-moves played so far, derived from the fullmove counter
/// and the side to move.
pub fn moves_made(position: &str) -> Result<u32, PositionError> {
    let fullmove: u32 = field(position, 5)?
        .parse()
        .map_err(|_| PositionError::Malformed("fullmove counter is not a number".to_string()))?;
    if fullmove == 0 {
        return Err(PositionError::Malformed(
            "fullmove counter must start at 1".to_string(),
        ));
    }
    let black_to_move = active_color(position)? == Color::Black;
    Ok((fullmove - 1) * 2 + u32::from(black_to_move))
}

/// Number of pieces still on the board, from the placement field.
pub fn piece_count(position: &str) -> Result<u32, PositionError> {
    let placement = field(position, 0)?;
    let mut count = 0u32;
    for c in placement.chars() {
        if c.is_ascii_alphabetic() {
            count += 1;
        } else if !c.is_ascii_digit() && c != '/' {
            return Err(PositionError::Malformed(format!(
                "unexpected character {:?} in placement",
                c
            )));
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPPPPPP/RNBQKBNR b KQkq e3 0 1";
    const AFTER_E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPPPPPP/RNBQKBNR w KQkq e6 0 2";

    #[test_case(START, Color::White)]
    #[test_case(AFTER_E4, Color::Black)]
    #[test_case(AFTER_E4_E5, Color::White)]
    fn test_active_color(position: &str, expected: Color) {
        assert_eq!(active_color(position).unwrap(), expected);
    }

    #[test_case(START, 0)]
    #[test_case(AFTER_E4, 1)]
    #[test_case(AFTER_E4_E5, 2)]
    fn test_moves_made(position: &str, expected: u32) {
        assert_eq!(moves_made(position).unwrap(), expected);
    }

    #[test]
    fn test_piece_count() {
        assert_eq!(piece_count(START).unwrap(), 32);
        assert_eq!(piece_count("8/P7/8/8/8/8/8/K6k w - - 0 1").unwrap(), 3);
    }

    #[test]
    fn test_empty_position_is_distinct_from_malformed() {
        assert_eq!(active_color(""), Err(PositionError::Empty));
        assert_eq!(moves_made(""), Err(PositionError::Empty));
    }

    #[test]
    fn test_malformed_positions_are_rejected() {
        assert!(matches!(
            active_color("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1"),
            Err(PositionError::Malformed(_))
        ));
        assert!(matches!(
            moves_made("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 zero"),
            Err(PositionError::Malformed(_))
        ));
        assert!(matches!(
            moves_made("rnbqkbnr w"),
            Err(PositionError::Malformed(_))
        ));
        assert!(matches!(
            piece_count("rnbq?bnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
            Err(PositionError::Malformed(_))
        ));
    }

    #[test]
    fn test_fullmove_counter_must_be_positive() {
        assert!(matches!(
            moves_made("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 0"),
            Err(PositionError::Malformed(_))
        ));
    }
}
