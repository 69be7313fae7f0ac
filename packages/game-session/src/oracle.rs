use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

#[derive(Debug)]
pub enum OracleError {
    /// The oracle could not answer (timeout, engine failure). Callers must
    /// treat this as "legality unconfirmed" and reject the move.
    Unavailable(String),
    InvalidPosition(String),
    InvalidMove(String),
    UnsupportedVariant(String),
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Unavailable(msg) => write!(f, "Oracle unavailable: {}", msg),
            OracleError::InvalidPosition(msg) => write!(f, "Invalid position: {}", msg),
            OracleError::InvalidMove(msg) => write!(f, "Invalid move: {}", msg),
            OracleError::UnsupportedVariant(variant) => {
                write!(f, "Unsupported variant: {}", variant)
            }
        }
    }
}

impl std::error::Error for OracleError {}

/// The move-legality / move-generation boundary. The sync core never
/// implements game rules itself; it injects an implementation of this
/// trait and treats it as a black box.
///
/// Conventions: an empty `position` string denotes the variant's starting
/// position. Moves are coordinate strings ("e2e4", "e7e8q" with a
/// promotion piece appended). `terminal_result` answers the empty string
/// while the game continues, otherwise `"white:<cause>"`,
/// `"black:<cause>"` or `"draw:<cause>"`.
///
/// Calls may be slow (engine search); they are always invoked off the
/// session's serialization point and their results re-enter it as events.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MoveOracle: Send + Sync {
    async fn is_legal_move(
        &self,
        variant: &str,
        position: &str,
        candidate: &str,
    ) -> Result<bool, OracleError>;

    async fn is_capture(
        &self,
        variant: &str,
        position: &str,
        candidate: &str,
    ) -> Result<bool, OracleError>;

    async fn apply_move(
        &self,
        variant: &str,
        position: &str,
        moves: &[String],
    ) -> Result<String, OracleError>;

    async fn terminal_result(&self, variant: &str, position: &str) -> Result<String, OracleError>;

    async fn best_move(
        &self,
        variant: &str,
        position: &str,
        difficulty_depth: u8,
        time_budget_ms: u64,
    ) -> Result<String, OracleError>;
}
