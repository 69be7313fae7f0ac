use crate::models::game_session::{is_wildcard, GameSession, SessionSummary};
use crate::models::player_stats::PlayerStats;
use crate::repositories::errors::game_repository_errors::GameSessionRepositoryError;
use crate::repositories::errors::player_repository_errors::PlayerRepositoryError;
use crate::repositories::game_repository::{GameSessionRepository, SessionWatch};
use crate::repositories::player_repository::PlayerRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// In-memory session store with push-based change subscriptions.
///
/// Backs tests and local wiring behind the same trait as the DynamoDB
/// implementation. Every mutation republishes the full document to all
/// watchers of that session, which gives the at-least-once, unordered
/// delivery the sync layer is written against. The seat-claim race is
/// decided under one lock, mirroring the conditional-write semantics of
/// the real store.
#[derive(Default)]
pub struct InMemoryGameSessionRepository {
    sessions: Mutex<HashMap<String, GameSession>>,
    watchers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<GameSession>>>>,
}

impl InMemoryGameSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, game_session: &GameSession) {
        let mut watchers = self
            .watchers
            .lock()
            .expect("watcher registry lock poisoned");
        if let Some(senders) = watchers.get_mut(&game_session.session_id) {
            senders.retain(|sender| sender.send(game_session.clone()).is_ok());
        }
    }
}

#[async_trait]
impl GameSessionRepository for InMemoryGameSessionRepository {
    async fn create_game_session(
        &self,
        game_session: &GameSession,
    ) -> Result<(), GameSessionRepositoryError> {
        {
            let mut sessions = self.sessions.lock().expect("session store lock poisoned");
            if sessions.contains_key(&game_session.session_id) {
                return Err(GameSessionRepositoryError::Conflict(
                    "session already exists".to_string(),
                ));
            }
            sessions.insert(game_session.session_id.clone(), game_session.clone());
        }
        self.notify(game_session);
        Ok(())
    }

    async fn get_game_session(
        &self,
        session_id: &str,
    ) -> Result<Option<GameSession>, GameSessionRepositoryError> {
        let sessions = self.sessions.lock().expect("session store lock poisoned");
        Ok(sessions.get(session_id).cloned())
    }

    async fn find_open_sessions(
        &self,
        variant_name: Option<&str>,
        time_mode: Option<&str>,
        exclude_player: &str,
    ) -> Result<Vec<SessionSummary>, GameSessionRepositoryError> {
        let sessions = self.sessions.lock().expect("session store lock poisoned");
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| s.is_open() && s.player1_id != exclude_player)
            .filter(|s| match variant_name {
                Some(variant) => s.variant_name == variant || is_wildcard(&s.variant_name),
                None => true,
            })
            .filter(|s| match time_mode {
                Some(time_mode) => s.time_mode == time_mode || is_wildcard(&s.time_mode),
                None => true,
            })
            .map(GameSession::summary)
            .collect();
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(summaries)
    }

    async fn claim_second_seat(
        &self,
        session_id: &str,
        player_id: &str,
        rating: f64,
        resolved_variant: Option<&str>,
        resolved_time_mode: Option<&str>,
    ) -> Result<GameSession, GameSessionRepositoryError> {
        let claimed = {
            let mut sessions = self.sessions.lock().expect("session store lock poisoned");
            let game_session = sessions
                .get_mut(session_id)
                .ok_or(GameSessionRepositoryError::NotFound)?;
            if !game_session.is_open() {
                return Err(GameSessionRepositoryError::Conflict(
                    "second seat already taken".to_string(),
                ));
            }
            game_session.player2_id = player_id.to_string();
            game_session.player2_rating = rating;
            if let Some(variant) = resolved_variant {
                game_session.variant_name = variant.to_string();
            }
            if let Some(time_mode) = resolved_time_mode {
                game_session.time_mode = time_mode.to_string();
            }
            game_session.clone()
        };
        self.notify(&claimed);
        Ok(claimed)
    }

    async fn write_position(
        &self,
        session_id: &str,
        position: &str,
    ) -> Result<(), GameSessionRepositoryError> {
        let updated = {
            let mut sessions = self.sessions.lock().expect("session store lock poisoned");
            let game_session = sessions
                .get_mut(session_id)
                .ok_or(GameSessionRepositoryError::NotFound)?;
            game_session.current_position = position.to_string();
            game_session.clone()
        };
        self.notify(&updated);
        Ok(())
    }

    async fn finish_game_session(
        &self,
        session_id: &str,
    ) -> Result<bool, GameSessionRepositoryError> {
        let finished = {
            let mut sessions = self.sessions.lock().expect("session store lock poisoned");
            let game_session = sessions
                .get_mut(session_id)
                .ok_or(GameSessionRepositoryError::NotFound)?;
            if game_session.finished {
                return Ok(false);
            }
            game_session.finished = true;
            game_session.clone()
        };
        self.notify(&finished);
        Ok(true)
    }

    fn watch_game_session(&self, session_id: &str) -> SessionWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        // new subscribers see the current state first, then changes
        if let Some(game_session) = self
            .sessions
            .lock()
            .expect("session store lock poisoned")
            .get(session_id)
        {
            let _ = tx.send(game_session.clone());
        }
        self.watchers
            .lock()
            .expect("watcher registry lock poisoned")
            .entry(session_id.to_string())
            .or_default()
            .push(tx);
        SessionWatch::new(rx)
    }
}

#[derive(Default)]
pub struct InMemoryPlayerRepository {
    players: Mutex<HashMap<String, PlayerStats>>,
}

impl InMemoryPlayerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlayerRepository for InMemoryPlayerRepository {
    async fn create_player(&self, stats: &PlayerStats) -> Result<(), PlayerRepositoryError> {
        let mut players = self.players.lock().expect("player store lock poisoned");
        if players.contains_key(&stats.player_id) {
            return Err(PlayerRepositoryError::AlreadyExists);
        }
        players.insert(stats.player_id.clone(), stats.clone());
        Ok(())
    }

    async fn get_player_stats(
        &self,
        player_id: &str,
    ) -> Result<PlayerStats, PlayerRepositoryError> {
        let players = self.players.lock().expect("player store lock poisoned");
        players
            .get(player_id)
            .cloned()
            .ok_or(PlayerRepositoryError::NotFound)
    }

    async fn set_player_stats(&self, stats: &PlayerStats) -> Result<(), PlayerRepositoryError> {
        let mut players = self.players.lock().expect("player store lock poisoned");
        if !players.contains_key(&stats.player_id) {
            return Err(PlayerRepositoryError::NotFound);
        }
        players.insert(stats.player_id.clone(), stats.clone());
        Ok(())
    }

    async fn player_name_exists(&self, player_id: &str) -> Result<bool, PlayerRepositoryError> {
        let players = self.players.lock().expect("player store lock poisoned");
        Ok(players.contains_key(player_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session(player1_id: &str) -> GameSession {
        GameSession::new("standard", "blitz (5 minutes)", player1_id, 400.0)
    }

    #[tokio::test]
    async fn test_claim_second_seat_race_has_one_winner() {
        let repository = std::sync::Arc::new(InMemoryGameSessionRepository::new());
        let session = open_session("alice");
        repository.create_game_session(&session).await.unwrap();

        let (first, second) = tokio::join!(
            repository.claim_second_seat(&session.session_id, "bob", 450.0, None, None),
            repository.claim_second_seat(&session.session_id, "carol", 500.0, None, None),
        );

        assert_eq!(first.is_ok(), !second.is_ok(), "exactly one claim must win");
        let winner = if first.is_ok() { "bob" } else { "carol" };
        let stored = repository
            .get_game_session(&session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.player2_id, winner);
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(
            loser.unwrap_err(),
            GameSessionRepositoryError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_watch_delivers_current_state_then_changes() {
        let repository = InMemoryGameSessionRepository::new();
        let session = open_session("alice");
        repository.create_game_session(&session).await.unwrap();

        let mut watch = repository.watch_game_session(&session.session_id);
        let initial = watch.recv().await.unwrap();
        assert_eq!(initial.current_position, "");

        repository
            .write_position(&session.session_id, "some position w - - 0 1")
            .await
            .unwrap();
        let changed = watch.recv().await.unwrap();
        assert_eq!(changed.current_position, "some position w - - 0 1");
    }

    #[tokio::test]
    async fn test_finish_is_idempotent() {
        let repository = InMemoryGameSessionRepository::new();
        let session = open_session("alice");
        repository.create_game_session(&session).await.unwrap();

        assert!(repository
            .finish_game_session(&session.session_id)
            .await
            .unwrap());
        assert!(!repository
            .finish_game_session(&session.session_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_find_open_sessions_filters() {
        let repository = InMemoryGameSessionRepository::new();
        let standard = open_session("alice");
        let mut rapid = GameSession::new("standard", "rapid (10 minutes)", "bob", 400.0);
        rapid.variant_name = "racing kings".to_string();
        let own = open_session("carol");
        repository.create_game_session(&standard).await.unwrap();
        repository.create_game_session(&rapid).await.unwrap();
        repository.create_game_session(&own).await.unwrap();

        let found = repository
            .find_open_sessions(Some("standard"), Some("blitz (5 minutes)"), "carol")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].session_id, standard.session_id);

        let unfiltered = repository
            .find_open_sessions(None, None, "nobody")
            .await
            .unwrap();
        assert_eq!(unfiltered.len(), 3);
    }

    #[tokio::test]
    async fn test_player_repository_uniqueness() {
        let repository = InMemoryPlayerRepository::new();
        let stats = PlayerStats::new("alice");
        repository.create_player(&stats).await.unwrap();

        assert!(repository.player_name_exists("alice").await.unwrap());
        assert!(!repository.player_name_exists("bob").await.unwrap());
        assert!(matches!(
            repository.create_player(&stats).await,
            Err(PlayerRepositoryError::AlreadyExists)
        ));
    }
}
