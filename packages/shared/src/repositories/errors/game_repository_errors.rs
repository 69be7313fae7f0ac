#[derive(Debug)]
pub enum GameSessionRepositoryError {
    NotFound,
    /// A conditional write lost its race (seat already claimed, session
    /// already finished). The loser's side effects must be discarded,
    /// never merged.
    Conflict(String),
    Serialization(String),
    DynamoDb(String),
}

impl std::fmt::Display for GameSessionRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameSessionRepositoryError::NotFound => write!(f, "Game session not found"),
            GameSessionRepositoryError::Conflict(msg) => write!(f, "Conditional write conflict: {}", msg),
            GameSessionRepositoryError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            GameSessionRepositoryError::DynamoDb(msg) => write!(f, "DynamoDB error: {}", msg),
        }
    }
}

impl std::error::Error for GameSessionRepositoryError {}
