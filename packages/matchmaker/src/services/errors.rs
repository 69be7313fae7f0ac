#[derive(Debug)]
pub enum MatchmakingServiceError {
    ValidationError(String),
    /// The search produced no open sessions at all.
    NoOpenSessions,
    /// Open sessions exist but none fall inside the fairness band. Callers
    /// offer session creation instead of failing silently.
    NoFairOpponent,
    /// Another player claimed the second seat first.
    SeatTaken,
    NameTaken(String),
    PlayerNotFound(String),
    RepositoryError(String),
}

impl std::fmt::Display for MatchmakingServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchmakingServiceError::ValidationError(msg) => {
                write!(f, "Validation error: {}", msg)
            }
            MatchmakingServiceError::NoOpenSessions => write!(f, "No open sessions found"),
            MatchmakingServiceError::NoFairOpponent => {
                write!(f, "No open session inside the fairness band")
            }
            MatchmakingServiceError::SeatTaken => {
                write!(f, "Session was already joined by another player")
            }
            MatchmakingServiceError::NameTaken(name) => {
                write!(f, "Player name already taken: {}", name)
            }
            MatchmakingServiceError::PlayerNotFound(name) => {
                write!(f, "Player not found: {}", name)
            }
            MatchmakingServiceError::RepositoryError(msg) => {
                write!(f, "Repository error: {}", msg)
            }
        }
    }
}

impl std::error::Error for MatchmakingServiceError {}
