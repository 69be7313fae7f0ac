use shared::models::position::PositionError;
use shared::repositories::errors::game_repository_errors::GameSessionRepositoryError;

use crate::oracle::OracleError;

#[derive(Debug)]
pub enum SessionError {
    /// Legality could not be confirmed; the move was rejected, never
    /// optimistically applied.
    OracleUnavailable(String),
    /// A stored or oracle-produced position failed the envelope readers.
    CorruptPosition(String),
    Storage(String),
    InvalidPhase(String),
    NotAParticipant(String),
    /// The session runtime is gone (left, or its task ended).
    Closed,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::OracleUnavailable(msg) => write!(f, "Oracle unavailable: {}", msg),
            SessionError::CorruptPosition(msg) => write!(f, "Corrupt position: {}", msg),
            SessionError::Storage(msg) => write!(f, "Storage error: {}", msg),
            SessionError::InvalidPhase(msg) => write!(f, "Invalid session phase: {}", msg),
            SessionError::NotAParticipant(player_id) => {
                write!(f, "Player {} is not part of this session", player_id)
            }
            SessionError::Closed => write!(f, "Session is closed"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<PositionError> for SessionError {
    fn from(e: PositionError) -> Self {
        SessionError::CorruptPosition(e.to_string())
    }
}

impl From<OracleError> for SessionError {
    fn from(e: OracleError) -> Self {
        SessionError::OracleUnavailable(e.to_string())
    }
}

impl From<GameSessionRepositoryError> for SessionError {
    fn from(e: GameSessionRepositoryError) -> Self {
        SessionError::Storage(e.to_string())
    }
}
