use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use game_session::chess_oracle::ChessOracle;
use game_session::clock::ClockState;
use game_session::events::{MoveOutcome, SessionNotification};
use game_session::runtime::{enter_session, host_session, SessionHandle};
use game_session::session::OpponentKind;
use matchmaker::services::MatchmakingService;
use shared::models::game_session::{Color, GameSession};
use shared::models::player_stats::PlayerStats;
use shared::repositories::game_repository::GameSessionRepository;
use shared::repositories::memory::{InMemoryGameSessionRepository, InMemoryPlayerRepository};
use shared::repositories::player_repository::PlayerRepository;

const EVENT_WAIT: Duration = Duration::from_secs(5);

type Events = mpsc::UnboundedReceiver<SessionNotification>;

async fn next_event(notifications: &mut Events) -> SessionNotification {
    loop {
        let event = timeout(EVENT_WAIT, notifications.recv())
            .await
            .expect("timed out waiting for a session notification")
            .expect("notification channel closed");
        if !matches!(event, SessionNotification::ClockTick { .. }) {
            return event;
        }
    }
}

struct Fixture {
    game_repository: Arc<InMemoryGameSessionRepository>,
    player_repository: Arc<InMemoryPlayerRepository>,
    oracle: Arc<ChessOracle>,
}

impl Fixture {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init();
        Fixture {
            game_repository: Arc::new(InMemoryGameSessionRepository::new()),
            player_repository: Arc::new(InMemoryPlayerRepository::new()),
            oracle: Arc::new(ChessOracle::new()),
        }
    }

    async fn register(&self, player_id: &str) -> PlayerStats {
        let stats = PlayerStats::new(player_id);
        self.player_repository.create_player(&stats).await.unwrap();
        stats
    }

    /// A session with both seats already bound, written to the store, plus
    /// runtimes for both participants.
    async fn bound_pair(
        &self,
        position: &str,
    ) -> (SessionHandle, Events, SessionHandle, Events, String) {
        let alice = self.register("alice").await;
        let bob = self.register("bob").await;

        let mut session = GameSession::new("standard", "blitz (5 minutes)", "alice", alice.rating);
        session.player2_id = "bob".to_string();
        session.player2_rating = bob.rating;
        session.current_position = position.to_string();
        self.game_repository
            .create_game_session(&session)
            .await
            .unwrap();

        let (alice_handle, alice_events) = enter_session(
            session.clone(),
            "alice",
            alice,
            OpponentKind::Human,
            self.game_repository.clone(),
            self.player_repository.clone(),
            self.oracle.clone(),
        )
        .unwrap();
        let (bob_handle, bob_events) = enter_session(
            session.clone(),
            "bob",
            bob,
            OpponentKind::Human,
            self.game_repository.clone(),
            self.player_repository.clone(),
            self.oracle.clone(),
        )
        .unwrap();

        (
            alice_handle,
            alice_events,
            bob_handle,
            bob_events,
            session.session_id,
        )
    }
}

#[tokio::test]
async fn test_create_join_and_first_move_flow() {
    let fixture = Fixture::new();
    let matchmaking = MatchmakingService::new(
        fixture.game_repository.clone(),
        fixture.player_repository.clone(),
    );

    let alice = matchmaking.register_player("alice").await.unwrap();
    let bob = matchmaking.register_player("bob").await.unwrap();

    let session = matchmaking
        .create_session("standard", "blitz (5 minutes)", "alice", alice.rating)
        .await
        .unwrap();
    let (alice_handle, mut alice_events) = host_session(
        session.clone(),
        "alice",
        alice,
        fixture.game_repository.clone(),
        fixture.player_repository.clone(),
        fixture.oracle.clone(),
    )
    .unwrap();

    let candidates = matchmaking
        .search_open_sessions("standard", "blitz (5 minutes)", "bob")
        .await
        .unwrap();
    let chosen = matchmaking
        .choose_fair_opponent_session(&candidates, bob.rating)
        .unwrap();
    let joined = matchmaking
        .join_session(&chosen, "bob", bob.rating, "standard", "blitz (5 minutes)")
        .await
        .unwrap();
    assert!(matchmaking.mark_launched(&joined.session_id));

    let (bob_handle, mut bob_events) = enter_session(
        joined,
        "bob",
        bob,
        OpponentKind::Human,
        fixture.game_repository.clone(),
        fixture.player_repository.clone(),
        fixture.oracle.clone(),
    )
    .unwrap();

    // the creator learns about the join through the change subscription
    let joined_event = next_event(&mut alice_events).await;
    assert!(matches!(
        joined_event,
        SessionNotification::SecondPlayerJoined { ref opponent_id } if opponent_id == "bob"
    ));

    let outcome = alice_handle.attempt_move("e2", "e4").await.unwrap();
    assert_eq!(outcome, MoveOutcome::Applied);

    let snapshot = alice_handle.snapshot().await.unwrap();
    assert_eq!(snapshot.view.move_count, 1);
    assert_eq!(snapshot.view.active_color, Color::Black);
    // after white's move the opponent's clock runs
    assert_eq!(
        snapshot.clock_states,
        Some((ClockState::Paused, ClockState::Running))
    );

    assert!(matches!(
        next_event(&mut alice_events).await,
        SessionNotification::PositionChanged { .. }
    ));
    assert!(matches!(
        next_event(&mut bob_events).await,
        SessionNotification::PositionChanged { .. }
    ));

    let bob_snapshot = bob_handle.snapshot().await.unwrap();
    assert_eq!(bob_snapshot.view.move_count, 1);
    // bob plays black, black to move: his own clock runs
    assert_eq!(
        bob_snapshot.clock_states,
        Some((ClockState::Running, ClockState::Paused))
    );
}

#[tokio::test]
async fn test_illegal_and_wrong_turn_moves_are_rejected() {
    let fixture = Fixture::new();
    let (alice_handle, _alice_events, bob_handle, _bob_events, _) =
        fixture.bound_pair("").await;

    // illegal shape
    let outcome = alice_handle.attempt_move("e2", "e5").await.unwrap();
    assert_eq!(outcome, MoveOutcome::Illegal);

    // not bob's turn
    let outcome = bob_handle.attempt_move("e7", "e5").await.unwrap();
    assert_eq!(outcome, MoveOutcome::Illegal);

    let snapshot = alice_handle.snapshot().await.unwrap();
    assert_eq!(snapshot.view.move_count, 0);
}

#[tokio::test]
async fn test_checkmate_settles_both_sides_exactly_once() {
    // white mates with the rook lift to a8
    const MATE_IN_ONE: &str = "6k1/5ppp/8/8/8/8/8/R3K3 w - - 0 1";

    let fixture = Fixture::new();
    let (alice_handle, mut alice_events, _bob_handle, mut bob_events, session_id) =
        fixture.bound_pair(MATE_IN_ONE).await;

    let outcome = alice_handle.attempt_move("a1", "a8").await.unwrap();
    assert_eq!(outcome, MoveOutcome::Applied);

    // winner's side settles from its own terminal detection
    loop {
        if let SessionNotification::GameFinished { cause, player_won } =
            next_event(&mut alice_events).await
        {
            assert_eq!(cause, "checkmate");
            assert_eq!(player_won, Some(true));
            break;
        }
    }
    let alice_stats = fixture
        .player_repository
        .get_player_stats("alice")
        .await
        .unwrap();
    assert_eq!(alice_stats.games_played, 1);
    assert_eq!(alice_stats.games_won, 1);
    assert!((alice_stats.rating - 415.0).abs() < 1e-9);

    // loser's side settles from the replicated position
    loop {
        if let SessionNotification::GameFinished { player_won, .. } =
            next_event(&mut bob_events).await
        {
            assert_eq!(player_won, Some(false));
            break;
        }
    }
    let bob_stats = fixture
        .player_repository
        .get_player_stats("bob")
        .await
        .unwrap();
    assert_eq!(bob_stats.games_played, 1);
    assert_eq!(bob_stats.games_lost, 1);
    assert!((bob_stats.rating - 385.0).abs() < 1e-9);

    // duplicate termination signals (the finish-flag echo) settle nothing
    tokio::time::sleep(Duration::from_millis(200)).await;
    let alice_again = fixture
        .player_repository
        .get_player_stats("alice")
        .await
        .unwrap();
    assert_eq!(alice_again.games_played, 1);

    let stored = fixture
        .game_repository
        .get_game_session(&session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.finished);
}

#[tokio::test]
async fn test_leaving_mid_game_settles_both_sides() {
    let fixture = Fixture::new();
    let (_alice_handle, mut alice_events, bob_handle, _bob_events, _) =
        fixture.bound_pair("").await;

    bob_handle.leave().await.unwrap();

    let bob_stats = fixture
        .player_repository
        .get_player_stats("bob")
        .await
        .unwrap();
    assert_eq!(bob_stats.games_played, 1);
    assert_eq!(bob_stats.games_lost, 1);

    // the other side learns through the store and wins
    loop {
        if let SessionNotification::GameFinished { player_won, .. } =
            next_event(&mut alice_events).await
        {
            assert_eq!(player_won, Some(true));
            break;
        }
    }
    let alice_stats = fixture
        .player_repository
        .get_player_stats("alice")
        .await
        .unwrap();
    assert_eq!(alice_stats.games_won, 1);
}

#[tokio::test]
async fn test_cancel_before_join_settles_nothing() {
    let fixture = Fixture::new();
    let matchmaking = MatchmakingService::new(
        fixture.game_repository.clone(),
        fixture.player_repository.clone(),
    );
    let alice = matchmaking.register_player("alice").await.unwrap();
    let session = matchmaking
        .create_session("standard", "blitz (5 minutes)", "alice", alice.rating)
        .await
        .unwrap();
    let (handle, mut events) = host_session(
        session.clone(),
        "alice",
        alice,
        fixture.game_repository.clone(),
        fixture.player_repository.clone(),
        fixture.oracle.clone(),
    )
    .unwrap();

    handle.leave().await.unwrap();

    loop {
        if let SessionNotification::GameFinished { player_won, .. } = next_event(&mut events).await
        {
            assert_eq!(player_won, None);
            break;
        }
    }

    let stats = fixture
        .player_repository
        .get_player_stats("alice")
        .await
        .unwrap();
    assert_eq!(stats.games_played, 0);

    let stored = fixture
        .game_repository
        .get_game_session(&session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.finished);
    assert!(stored.player2_id.is_empty());
}

#[tokio::test]
async fn test_promotion_flow() {
    const PROMOTION_READY: &str = "8/P6k/8/8/8/8/8/K7 w - - 0 1";

    let fixture = Fixture::new();
    let (alice_handle, mut alice_events, _bob_handle, _bob_events, _) =
        fixture.bound_pair(PROMOTION_READY).await;

    let outcome = alice_handle.attempt_move("a7", "a8").await.unwrap();
    assert_eq!(outcome, MoveOutcome::PromotionPending);
    assert!(matches!(
        next_event(&mut alice_events).await,
        SessionNotification::PromotionRequired { ref square } if square == "a8"
    ));

    // other moves stay blocked until the choice is made
    let blocked = alice_handle.attempt_move("a7", "a6").await.unwrap();
    assert_eq!(blocked, MoveOutcome::Illegal);

    let outcome = alice_handle.resolve_promotion('q').await.unwrap();
    assert_eq!(outcome, MoveOutcome::Applied);

    let snapshot = alice_handle.snapshot().await.unwrap();
    assert!(snapshot.view.position.contains('Q'));
    assert!(snapshot.view.pending_promotion.is_none());
}

#[tokio::test]
async fn test_engine_opponent_game() {
    let fixture = Fixture::new();
    let mut session = GameSession::new("standard", "rapid (10 minutes)", "carol", 400.0);
    session.player2_id = "engine".to_string();
    session.player2_rating = 400.0;

    let (handle, mut events) = enter_session(
        session,
        "carol",
        PlayerStats::new("carol"),
        OpponentKind::Engine {
            difficulty_depth: 2,
        },
        fixture.game_repository.clone(),
        fixture.player_repository.clone(),
        fixture.oracle.clone(),
    )
    .unwrap();

    let outcome = handle.attempt_move("e2", "e4").await.unwrap();
    assert_eq!(outcome, MoveOutcome::Applied);
    assert!(matches!(
        next_event(&mut events).await,
        SessionNotification::PositionChanged { .. }
    ));

    handle.request_engine_move().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        SessionNotification::PositionChanged { .. }
    ));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.view.move_count, 2);
    assert_eq!(snapshot.view.active_color, Color::White);

    // engine games never touch the store
    let stored = fixture
        .game_repository
        .get_game_session(snapshot.session_id.as_str())
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn test_remote_replay_of_same_position_is_idempotent() {
    let fixture = Fixture::new();
    let (alice_handle, _alice_events, bob_handle, mut bob_events, session_id) =
        fixture.bound_pair("").await;

    let outcome = alice_handle.attempt_move("e2", "e4").await.unwrap();
    assert_eq!(outcome, MoveOutcome::Applied);
    assert!(matches!(
        next_event(&mut bob_events).await,
        SessionNotification::PositionChanged { .. }
    ));
    let first = bob_handle.snapshot().await.unwrap();

    // redeliver the exact same document state
    let position = first.view.position.clone();
    fixture
        .game_repository
        .write_position(&session_id, &position)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = bob_handle.snapshot().await.unwrap();
    assert_eq!(second.view, first.view);
    assert_eq!(second.view.move_count, 1);
}
