use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chess::{Board, BoardStatus, ChessMove, MoveGen, Piece, Square};

use crate::oracle::{MoveOracle, OracleError};

/// The one variant this oracle understands.
pub const STANDARD_VARIANT: &str = "standard";

const MATE_SCORE: i32 = 100_000;

/// Standard-chess implementation of the oracle contract, built on the
/// `chess` crate. The sync core never calls into this type directly; it is
/// the batteries-included `dyn MoveOracle` for sessions whose variant is
/// "standard". Fairy variants need an external engine behind the same
/// trait.
#[derive(Clone)]
pub struct ChessOracle;

impl ChessOracle {
    pub fn new() -> Self {
        ChessOracle
    }
}

impl Default for ChessOracle {
    fn default() -> Self {
        ChessOracle::new()
    }
}

fn ensure_variant(variant: &str) -> Result<(), OracleError> {
    if variant == STANDARD_VARIANT {
        Ok(())
    } else {
        Err(OracleError::UnsupportedVariant(variant.to_string()))
    }
}

fn board_from(position: &str) -> Result<Board, OracleError> {
    if position.is_empty() {
        return Ok(Board::default());
    }
    Board::from_str(position)
        .map_err(|e| OracleError::InvalidPosition(format!("invalid FEN: {}", e)))
}

fn parse_candidate(candidate: &str) -> Result<ChessMove, OracleError> {
    if candidate.len() < 4 {
        return Err(OracleError::InvalidMove(format!(
            "move too short: {:?}",
            candidate
        )));
    }
    let from = candidate
        .get(0..2)
        .and_then(|s| Square::from_str(s).ok())
        .ok_or_else(|| {
            OracleError::InvalidMove(format!("invalid source square in {:?}", candidate))
        })?;
    let to = candidate
        .get(2..4)
        .and_then(|s| Square::from_str(s).ok())
        .ok_or_else(|| {
            OracleError::InvalidMove(format!("invalid target square in {:?}", candidate))
        })?;
    let promotion = match candidate.get(4..5) {
        None | Some("") => None,
        Some("q") => Some(Piece::Queen),
        Some("r") => Some(Piece::Rook),
        Some("b") => Some(Piece::Bishop),
        Some("n") => Some(Piece::Knight),
        Some(other) => {
            return Err(OracleError::InvalidMove(format!(
                "invalid promotion piece {:?}",
                other
            )))
        }
    };
    Ok(ChessMove::new(from, to, promotion))
}

fn move_to_string(chess_move: &ChessMove) -> String {
    let promotion = match chess_move.get_promotion() {
        Some(Piece::Queen) => "q",
        Some(Piece::Rook) => "r",
        Some(Piece::Bishop) => "b",
        Some(Piece::Knight) => "n",
        _ => "",
    };
    format!(
        "{}{}{}",
        chess_move.get_source(),
        chess_move.get_dest(),
        promotion
    )
}

/// Halfmove clock and fullmove number of a position, with the defaults of
/// a fresh game for the empty position.
fn parse_counters(position: &str) -> (u32, u32) {
    let mut fields = position.split_whitespace().skip(4);
    let halfmove = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let fullmove = fields.next().and_then(|s| s.parse().ok()).unwrap_or(1);
    (halfmove, fullmove)
}

/// The rules library does not track move counters, so its FEN rendering
/// always ends in "0 1"; splice in the counters we carry forward.
fn render_fen(board: &Board, halfmove: u32, fullmove: u32) -> String {
    let raw = format!("{}", board);
    let halfmove_field = halfmove.to_string();
    let fullmove_field = fullmove.to_string();
    let mut fields: Vec<&str> = raw.split_whitespace().collect();
    if fields.len() >= 6 {
        fields[4] = &halfmove_field;
        fields[5] = &fullmove_field;
    }
    fields.join(" ")
}

fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight => 320,
        Piece::Bishop => 330,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => 0,
    }
}

/// Material balance from the side to move's perspective.
fn material_balance(board: &Board) -> i32 {
    let mut score = 0;
    for square in chess::ALL_SQUARES {
        if let Some(piece) = board.piece_on(square) {
            let value = piece_value(piece);
            if board.color_on(square) == Some(board.side_to_move()) {
                score += value;
            } else {
                score -= value;
            }
        }
    }
    score
}

fn negamax(board: &Board, depth: u8, deadline: Instant) -> i32 {
    match board.status() {
        BoardStatus::Checkmate => return -MATE_SCORE,
        BoardStatus::Stalemate => return 0,
        BoardStatus::Ongoing => {}
    }
    if depth == 0 || Instant::now() >= deadline {
        return material_balance(board);
    }
    let mut best = -MATE_SCORE;
    for chess_move in MoveGen::new_legal(board) {
        let mut next = *board;
        board.make_move(chess_move, &mut next);
        best = best.max(-negamax(&next, depth - 1, deadline));
    }
    best
}

#[async_trait]
impl MoveOracle for ChessOracle {
    async fn is_legal_move(
        &self,
        variant: &str,
        position: &str,
        candidate: &str,
    ) -> Result<bool, OracleError> {
        ensure_variant(variant)?;
        let board = board_from(position)?;
        let chess_move = match parse_candidate(candidate) {
            Ok(chess_move) => chess_move,
            // a malformed candidate is simply not a legal move
            Err(_) => return Ok(false),
        };
        if board.status() != BoardStatus::Ongoing {
            return Ok(false);
        }
        Ok(MoveGen::new_legal(&board).any(|legal| legal == chess_move))
    }

    async fn is_capture(
        &self,
        variant: &str,
        position: &str,
        candidate: &str,
    ) -> Result<bool, OracleError> {
        ensure_variant(variant)?;
        let board = board_from(position)?;
        let chess_move = parse_candidate(candidate)?;
        let target_occupied = board.piece_on(chess_move.get_dest()).is_some();
        let en_passant = board.piece_on(chess_move.get_source()) == Some(Piece::Pawn)
            && chess_move.get_source().get_file() != chess_move.get_dest().get_file()
            && !target_occupied;
        Ok(target_occupied || en_passant)
    }

    async fn apply_move(
        &self,
        variant: &str,
        position: &str,
        moves: &[String],
    ) -> Result<String, OracleError> {
        ensure_variant(variant)?;
        let mut board = board_from(position)?;
        let (mut halfmove, mut fullmove) = parse_counters(position);
        for candidate in moves {
            let chess_move = parse_candidate(candidate)?;
            let pawn_move = board.piece_on(chess_move.get_source()) == Some(Piece::Pawn);
            let capture = board.piece_on(chess_move.get_dest()).is_some()
                || (pawn_move
                    && chess_move.get_source().get_file() != chess_move.get_dest().get_file());
            let mover = board.side_to_move();
            let mut next = board;
            board.make_move(chess_move, &mut next);
            board = next;
            if pawn_move || capture {
                halfmove = 0;
            } else {
                halfmove += 1;
            }
            if mover == chess::Color::Black {
                fullmove += 1;
            }
        }
        Ok(render_fen(&board, halfmove, fullmove))
    }

    async fn terminal_result(&self, variant: &str, position: &str) -> Result<String, OracleError> {
        ensure_variant(variant)?;
        let board = board_from(position)?;
        let result = match board.status() {
            BoardStatus::Ongoing => String::new(),
            BoardStatus::Stalemate => "draw:stalemate".to_string(),
            BoardStatus::Checkmate => {
                // the side to move is the side that got mated
                let winner = match board.side_to_move() {
                    chess::Color::White => "black",
                    chess::Color::Black => "white",
                };
                format!("{}:checkmate", winner)
            }
        };
        Ok(result)
    }

    async fn best_move(
        &self,
        variant: &str,
        position: &str,
        difficulty_depth: u8,
        time_budget_ms: u64,
    ) -> Result<String, OracleError> {
        ensure_variant(variant)?;
        let board = board_from(position)?;
        let deadline = Instant::now() + Duration::from_millis(time_budget_ms);

        let mut best: Option<(ChessMove, i32)> = None;
        for chess_move in MoveGen::new_legal(&board) {
            let mut next = board;
            board.make_move(chess_move, &mut next);
            let score = -negamax(&next, difficulty_depth.saturating_sub(1), deadline);
            if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                best = Some((chess_move, score));
            }
        }

        best.map(|(chess_move, _)| move_to_string(&chess_move))
            .ok_or_else(|| OracleError::InvalidPosition("no legal moves".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACK_RANK_MATE_IN_ONE: &str = "6k1/5ppp/8/8/8/8/8/R3K3 w - - 0 1";
    const PROMOTION_READY: &str = "8/P7/8/8/8/8/8/K6k w - - 0 1";
    const FOOLS_MATE: &str =
        "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";

    #[tokio::test]
    async fn test_legality_from_the_starting_position() {
        let oracle = ChessOracle::new();

        assert!(oracle.is_legal_move("standard", "", "e2e4").await.unwrap());
        assert!(!oracle.is_legal_move("standard", "", "e2e5").await.unwrap());
        assert!(!oracle.is_legal_move("standard", "", "e7e5").await.unwrap());
        assert!(!oracle
            .is_legal_move("standard", "", "garbage")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_apply_move_sequence_from_start() {
        let oracle = ChessOracle::new();

        let position = oracle
            .apply_move("standard", "", &["e2e4".to_string(), "e7e5".to_string()])
            .await
            .unwrap();

        assert!(position.starts_with("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w"));
    }

    #[tokio::test]
    async fn test_apply_move_carries_move_counters() {
        let oracle = ChessOracle::new();

        let position = oracle
            .apply_move(
                "standard",
                "",
                &["g1f3".to_string(), "g8f6".to_string(), "f3g1".to_string()],
            )
            .await
            .unwrap();

        // three knight moves: halfmove clock 3, black to move in move 2
        assert!(position.ends_with("3 2"), "unexpected FEN: {}", position);
        assert_eq!(
            shared::models::position::moves_made(&position).unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_capture_detection() {
        let oracle = ChessOracle::new();
        let position = oracle
            .apply_move("standard", "", &["e2e4".to_string(), "d7d5".to_string()])
            .await
            .unwrap();

        assert!(oracle
            .is_capture("standard", &position, "e4d5")
            .await
            .unwrap());
        assert!(!oracle
            .is_capture("standard", &position, "e4e5")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_promotion_requires_a_piece() {
        let oracle = ChessOracle::new();

        assert!(!oracle
            .is_legal_move("standard", PROMOTION_READY, "a7a8")
            .await
            .unwrap());
        assert!(oracle
            .is_legal_move("standard", PROMOTION_READY, "a7a8q")
            .await
            .unwrap());

        let promoted = oracle
            .apply_move("standard", PROMOTION_READY, &["a7a8q".to_string()])
            .await
            .unwrap();
        assert!(promoted.contains('Q'));
    }

    #[tokio::test]
    async fn test_terminal_result_detection() {
        let oracle = ChessOracle::new();

        assert_eq!(oracle.terminal_result("standard", "").await.unwrap(), "");
        assert_eq!(
            oracle
                .terminal_result("standard", FOOLS_MATE)
                .await
                .unwrap(),
            "black:checkmate"
        );
    }

    #[tokio::test]
    async fn test_best_move_takes_the_mate_in_one() {
        let oracle = ChessOracle::new();

        let best = oracle
            .best_move("standard", BACK_RANK_MATE_IN_ONE, 2, 2_000)
            .await
            .unwrap();
        let position = oracle
            .apply_move("standard", BACK_RANK_MATE_IN_ONE, &[best])
            .await
            .unwrap();

        assert_eq!(
            oracle.terminal_result("standard", &position).await.unwrap(),
            "white:checkmate"
        );
    }

    #[tokio::test]
    async fn test_unsupported_variant_is_rejected() {
        let oracle = ChessOracle::new();

        assert!(matches!(
            oracle.is_legal_move("grasshopper chess", "", "e2e4").await,
            Err(OracleError::UnsupportedVariant(_))
        ));
    }
}
