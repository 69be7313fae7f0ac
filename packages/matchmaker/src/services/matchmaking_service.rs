use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use tracing::info;

use shared::models::game_session::{
    is_wildcard, GameSession, SessionSummary, DEFAULT_TIME_MODE, DEFAULT_VARIANT,
};
use shared::models::player_stats::PlayerStats;
use shared::repositories::errors::game_repository_errors::GameSessionRepositoryError;
use shared::repositories::errors::player_repository_errors::PlayerRepositoryError;
use shared::repositories::game_repository::GameSessionRepository;
use shared::repositories::player_repository::PlayerRepository;
use shared::services::rating_service;

use crate::services::errors::MatchmakingServiceError;

/// Half-width of the fairness band around an even 0.5 win chance.
/// Meaningful range 0.0 ... 0.5.
pub const FAIRNESS_HALF_WIDTH: f64 = 0.3;

pub struct MatchmakingService {
    game_repository: Arc<dyn GameSessionRepository + Send + Sync>,
    player_repository: Arc<dyn PlayerRepository + Send + Sync>,
    fairness_half_width: f64,
    /// Sessions this instance already handed to a runtime. Join
    /// confirmation can arrive through both the direct path and the change
    /// subscription; the set makes entry idempotent.
    launched_sessions: Mutex<HashSet<String>>,
}

impl MatchmakingService {
    pub fn new(
        game_repository: Arc<dyn GameSessionRepository + Send + Sync>,
        player_repository: Arc<dyn PlayerRepository + Send + Sync>,
    ) -> Self {
        MatchmakingService {
            game_repository,
            player_repository,
            fairness_half_width: FAIRNESS_HALF_WIDTH,
            launched_sessions: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_fairness_half_width(mut self, half_width: f64) -> Self {
        self.fairness_half_width = half_width;
        self
    }

    /// Open sessions matching the requested variant and time mode. A
    /// wildcard value drops that predicate from the store query instead of
    /// matching the literal wildcard string. An empty result is a normal
    /// answer, not an error.
    pub async fn search_open_sessions(
        &self,
        variant_name: &str,
        time_mode: &str,
        exclude_player: &str,
    ) -> Result<Vec<SessionSummary>, MatchmakingServiceError> {
        if exclude_player.is_empty() {
            return Err(MatchmakingServiceError::ValidationError(
                "Player ID cannot be empty".to_string(),
            ));
        }

        let variant_filter = (!is_wildcard(variant_name)).then_some(variant_name);
        let time_filter = (!is_wildcard(time_mode)).then_some(time_mode);

        let summaries = self
            .game_repository
            .find_open_sessions(variant_filter, time_filter, exclude_player)
            .await
            .map_err(|e| MatchmakingServiceError::RepositoryError(e.to_string()))?;

        info!(
            "found {} open session(s) for {} / {}",
            summaries.len(),
            variant_name,
            time_mode
        );
        Ok(summaries)
    }

    /// Any open session from any other player, regardless of variant or
    /// time mode.
    pub async fn quick_match(
        &self,
        player_id: &str,
    ) -> Result<Vec<SessionSummary>, MatchmakingServiceError> {
        if player_id.is_empty() {
            return Err(MatchmakingServiceError::ValidationError(
                "Player ID cannot be empty".to_string(),
            ));
        }
        self.game_repository
            .find_open_sessions(None, None, player_id)
            .await
            .map_err(|e| MatchmakingServiceError::RepositoryError(e.to_string()))
    }

    pub async fn create_session(
        &self,
        variant_name: &str,
        time_mode: &str,
        player_id: &str,
        player_rating: f64,
    ) -> Result<GameSession, MatchmakingServiceError> {
        if player_id.is_empty() {
            return Err(MatchmakingServiceError::ValidationError(
                "Player ID cannot be empty".to_string(),
            ));
        }
        if variant_name.is_empty() || time_mode.is_empty() {
            return Err(MatchmakingServiceError::ValidationError(
                "Variant and time mode cannot be empty".to_string(),
            ));
        }

        let game_session = GameSession::new(variant_name, time_mode, player_id, player_rating);
        self.game_repository
            .create_game_session(&game_session)
            .await
            .map_err(|e| MatchmakingServiceError::RepositoryError(e.to_string()))?;

        info!(
            "created session {} ({} / {})",
            game_session.session_id, variant_name, time_mode
        );
        Ok(game_session)
    }

    /// Picks a session whose pairing would be fair: the requester's win
    /// probability must lie strictly inside the band around 0.5. The pick
    /// among fair candidates is uniformly random. "Nothing open" and
    /// "nothing fair" are distinct answers so the caller can offer session
    /// creation.
    pub fn choose_fair_opponent_session(
        &self,
        candidates: &[SessionSummary],
        my_rating: f64,
    ) -> Result<SessionSummary, MatchmakingServiceError> {
        if candidates.is_empty() {
            return Err(MatchmakingServiceError::NoOpenSessions);
        }

        let fair_sessions: Vec<&SessionSummary> = candidates
            .iter()
            .filter(|candidate| {
                let p = rating_service::win_probability(candidate.host_rating, my_rating);
                (p - 0.5).abs() < self.fairness_half_width
            })
            .collect();

        let mut rng = rand::thread_rng();
        match fair_sessions.choose(&mut rng) {
            Some(chosen) => Ok((*chosen).clone()),
            None => Err(MatchmakingServiceError::NoFairOpponent),
        }
    }

    /// Claims the second seat of a chosen session. Safe under races: the
    /// store's conditional update lets exactly one of two concurrent
    /// joiners through; the other gets `SeatTaken`. Wildcard fields on the
    /// session resolve to the requester's values, or to the documented
    /// defaults when the request was itself a wildcard.
    pub async fn join_session(
        &self,
        chosen: &SessionSummary,
        player_id: &str,
        player_rating: f64,
        requested_variant: &str,
        requested_time_mode: &str,
    ) -> Result<GameSession, MatchmakingServiceError> {
        if player_id.is_empty() {
            return Err(MatchmakingServiceError::ValidationError(
                "Player ID cannot be empty".to_string(),
            ));
        }

        let resolved_variant = if is_wildcard(&chosen.variant_name) {
            if is_wildcard(requested_variant) {
                Some(DEFAULT_VARIANT)
            } else {
                Some(requested_variant)
            }
        } else {
            None
        };
        let resolved_time_mode = if is_wildcard(&chosen.time_mode) {
            if is_wildcard(requested_time_mode) {
                Some(DEFAULT_TIME_MODE)
            } else {
                Some(requested_time_mode)
            }
        } else {
            None
        };

        let game_session = self
            .game_repository
            .claim_second_seat(
                &chosen.session_id,
                player_id,
                player_rating,
                resolved_variant,
                resolved_time_mode,
            )
            .await
            .map_err(|e| match e {
                GameSessionRepositoryError::Conflict(_) => MatchmakingServiceError::SeatTaken,
                other => MatchmakingServiceError::RepositoryError(other.to_string()),
            })?;

        info!(
            "{} joined session {} hosted by {}",
            player_id, game_session.session_id, game_session.player1_id
        );
        Ok(game_session)
    }

    /// Creates the player record after the uniqueness pre-check.
    pub async fn register_player(
        &self,
        player_id: &str,
    ) -> Result<PlayerStats, MatchmakingServiceError> {
        if player_id.is_empty() {
            return Err(MatchmakingServiceError::ValidationError(
                "Player name cannot be empty".to_string(),
            ));
        }

        let exists = self
            .player_repository
            .player_name_exists(player_id)
            .await
            .map_err(|e| MatchmakingServiceError::RepositoryError(e.to_string()))?;
        if exists {
            return Err(MatchmakingServiceError::NameTaken(player_id.to_string()));
        }

        let stats = PlayerStats::new(player_id);
        self.player_repository
            .create_player(&stats)
            .await
            .map_err(|e| match e {
                PlayerRepositoryError::AlreadyExists => {
                    MatchmakingServiceError::NameTaken(player_id.to_string())
                }
                other => MatchmakingServiceError::RepositoryError(other.to_string()),
            })?;

        Ok(stats)
    }

    pub async fn player_stats(
        &self,
        player_id: &str,
    ) -> Result<PlayerStats, MatchmakingServiceError> {
        self.player_repository
            .get_player_stats(player_id)
            .await
            .map_err(|e| match e {
                PlayerRepositoryError::NotFound => {
                    MatchmakingServiceError::PlayerNotFound(player_id.to_string())
                }
                other => MatchmakingServiceError::RepositoryError(other.to_string()),
            })
    }

    /// Returns true the first time a session id is marked; later calls
    /// return false so duplicate join confirmations don't enter a game
    /// twice.
    pub fn mark_launched(&self, session_id: &str) -> bool {
        self.launched_sessions
            .lock()
            .expect("launched set lock poisoned")
            .insert(session_id.to_string())
    }

    pub fn is_launched(&self, session_id: &str) -> bool {
        self.launched_sessions
            .lock()
            .expect("launched set lock poisoned")
            .contains(session_id)
    }
}
