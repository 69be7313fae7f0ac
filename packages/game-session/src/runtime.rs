use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use shared::models::game_session::GameSession;
use shared::models::player_stats::PlayerStats;
use shared::repositories::game_repository::{GameSessionRepository, SessionWatch};
use shared::repositories::player_repository::PlayerRepository;

use crate::clock::CLOCK_TICK_INTERVAL;
use crate::errors::SessionError;
use crate::events::{MoveOutcome, SessionNotification, TerminalResult};
use crate::oracle::MoveOracle;
use crate::session::{
    LiveSession, MoveAdmission, MoveEvaluation, OpponentKind, SessionEffect, SessionSnapshot,
};
use crate::sync::ChangeClassifier;

/// Fixed wall-clock budget handed to the oracle for engine moves.
pub const ENGINE_TIME_BUDGET_MS: u64 = 3_000;

enum SessionCommand {
    AttemptMove {
        from: String,
        to: String,
        respond: oneshot::Sender<Result<MoveOutcome, SessionError>>,
    },
    ResolvePromotion {
        piece: char,
        respond: oneshot::Sender<Result<MoveOutcome, SessionError>>,
    },
    RequestEngineMove,
    Inspect {
        respond: oneshot::Sender<SessionSnapshot>,
    },
    Leave {
        respond: oneshot::Sender<()>,
    },
}

enum OracleReply {
    Move(MoveEvaluation),
    EngineMove {
        revision: u64,
        new_position: String,
        terminal: Option<TerminalResult>,
    },
    Terminal {
        revision: u64,
        terminal: Option<TerminalResult>,
    },
}

enum Step {
    Command(Option<SessionCommand>),
    Snapshot(Option<GameSession>),
    Reply(OracleReply),
    Tick,
}

/// Cheap cloneable front door to one session runtime. All calls serialize
/// through the runtime task; the handle never touches session state
/// directly.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn attempt_move(&self, from: &str, to: &str) -> Result<MoveOutcome, SessionError> {
        let (respond, receive) = oneshot::channel();
        self.commands
            .send(SessionCommand::AttemptMove {
                from: from.to_string(),
                to: to.to_string(),
                respond,
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        receive.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn resolve_promotion(&self, piece: char) -> Result<MoveOutcome, SessionError> {
        let (respond, receive) = oneshot::channel();
        self.commands
            .send(SessionCommand::ResolvePromotion { piece, respond })
            .await
            .map_err(|_| SessionError::Closed)?;
        receive.await.map_err(|_| SessionError::Closed)?
    }

    /// Asks the runtime to let the engine opponent move. A no-op for
    /// human-versus-human sessions or when it is not the engine's turn.
    pub async fn request_engine_move(&self) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::RequestEngineMove)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (respond, receive) = oneshot::channel();
        self.commands
            .send(SessionCommand::Inspect { respond })
            .await
            .map_err(|_| SessionError::Closed)?;
        receive.await.map_err(|_| SessionError::Closed)
    }

    /// Leaves the session: mid-game this settles as a loss, pre-join it
    /// cancels the open session. The runtime tears down its subscription
    /// and clocks, then exits.
    pub async fn leave(&self) -> Result<(), SessionError> {
        let (respond, receive) = oneshot::channel();
        self.commands
            .send(SessionCommand::Leave { respond })
            .await
            .map_err(|_| SessionError::Closed)?;
        receive.await.map_err(|_| SessionError::Closed)
    }
}

/// Starts the runtime for a freshly created session; the creator waits for
/// an opponent through the change subscription.
pub fn host_session(
    session: GameSession,
    player_id: &str,
    player_stats: PlayerStats,
    game_repository: Arc<dyn GameSessionRepository + Send + Sync>,
    player_repository: Arc<dyn PlayerRepository + Send + Sync>,
    oracle: Arc<dyn MoveOracle + Send + Sync>,
) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionNotification>), SessionError> {
    let mut live = LiveSession::new(player_id, player_stats, OpponentKind::Human);
    live.bind_hosted(session)?;
    Ok(spawn_runtime(live, game_repository, player_repository, oracle))
}

/// Starts the runtime for a session that already has both sides bound:
/// the join path, and local engine games.
pub fn enter_session(
    session: GameSession,
    player_id: &str,
    player_stats: PlayerStats,
    opponent: OpponentKind,
    game_repository: Arc<dyn GameSessionRepository + Send + Sync>,
    player_repository: Arc<dyn PlayerRepository + Send + Sync>,
    oracle: Arc<dyn MoveOracle + Send + Sync>,
) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionNotification>), SessionError> {
    let mut live = LiveSession::new(player_id, player_stats, opponent);
    live.bind_joined(session)?;
    Ok(spawn_runtime(live, game_repository, player_repository, oracle))
}

fn spawn_runtime(
    live: LiveSession,
    game_repository: Arc<dyn GameSessionRepository + Send + Sync>,
    player_repository: Arc<dyn PlayerRepository + Send + Sync>,
    oracle: Arc<dyn MoveOracle + Send + Sync>,
) -> (SessionHandle, mpsc::UnboundedReceiver<SessionNotification>) {
    let (command_tx, command_rx) = mpsc::channel(32);
    let (notification_tx, notification_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    let classifier = ChangeClassifier::new(live.session());
    let watch = if live.is_store_backed() {
        Some(game_repository.watch_game_session(live.session_id()))
    } else {
        None
    };

    let runtime = SessionRuntime {
        live,
        classifier,
        watch,
        commands: command_rx,
        notifications: notification_tx,
        reply_tx,
        replies: reply_rx,
        game_repository,
        player_repository,
        oracle,
        pending_attempt: None,
    };
    tokio::spawn(runtime.run());

    (
        SessionHandle {
            commands: command_tx,
        },
        notification_rx,
    )
}

struct SessionRuntime {
    live: LiveSession,
    classifier: ChangeClassifier,
    watch: Option<SessionWatch>,
    commands: mpsc::Receiver<SessionCommand>,
    notifications: mpsc::UnboundedSender<SessionNotification>,
    reply_tx: mpsc::UnboundedSender<OracleReply>,
    replies: mpsc::UnboundedReceiver<OracleReply>,
    game_repository: Arc<dyn GameSessionRepository + Send + Sync>,
    player_repository: Arc<dyn PlayerRepository + Send + Sync>,
    oracle: Arc<dyn MoveOracle + Send + Sync>,
    pending_attempt: Option<oneshot::Sender<Result<MoveOutcome, SessionError>>>,
}

async fn recv_watch(watch: &mut Option<SessionWatch>) -> Option<GameSession> {
    match watch {
        Some(watch) => watch.recv().await,
        None => std::future::pending().await,
    }
}

impl SessionRuntime {
    /// The serialization point: local commands, remote snapshots, clock
    /// ticks and oracle replies all pass through this single loop, one at
    /// a time.
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(CLOCK_TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                snapshot = recv_watch(&mut self.watch) => Step::Snapshot(snapshot),
                Some(reply) = self.replies.recv() => Step::Reply(reply),
                _ = ticker.tick() => Step::Tick,
            };

            match step {
                Step::Command(Some(command)) => {
                    if self.handle_command(command).await {
                        break;
                    }
                }
                Step::Command(None) => break,
                Step::Snapshot(Some(snapshot)) => self.handle_snapshot(snapshot).await,
                Step::Snapshot(None) => {
                    warn!(
                        "change subscription for session {} closed",
                        self.live.session_id()
                    );
                    self.watch = None;
                }
                Step::Reply(reply) => self.handle_reply(reply).await,
                Step::Tick => {
                    let effects = self.live.clock_tick();
                    self.perform(effects).await;
                }
            }
        }
        info!("session runtime for {} stopped", self.live.session_id());
    }

    /// Returns true when the runtime should stop.
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::AttemptMove { from, to, respond } => {
                if self.pending_attempt.is_some() {
                    // one evaluation in flight at a time
                    let _ = respond.send(Ok(MoveOutcome::Illegal));
                    return false;
                }
                match self.live.admit_move(&from, &to) {
                    MoveAdmission::Rejected => {
                        let _ = self.notifications.send(SessionNotification::IllegalMove);
                        let _ = respond.send(Ok(MoveOutcome::Illegal));
                    }
                    MoveAdmission::Evaluate {
                        revision,
                        from,
                        to,
                        promotion,
                    } => {
                        self.pending_attempt = Some(respond);
                        self.spawn_evaluation(revision, from, to, promotion);
                    }
                }
                false
            }
            SessionCommand::ResolvePromotion { piece, respond } => {
                if self.pending_attempt.is_some() {
                    let _ = respond.send(Ok(MoveOutcome::Illegal));
                    return false;
                }
                match self.live.admit_promotion(piece) {
                    MoveAdmission::Rejected => {
                        let _ = self.notifications.send(SessionNotification::IllegalMove);
                        let _ = respond.send(Ok(MoveOutcome::Illegal));
                    }
                    MoveAdmission::Evaluate {
                        revision,
                        from,
                        to,
                        promotion,
                    } => {
                        self.pending_attempt = Some(respond);
                        self.spawn_evaluation(revision, from, to, promotion);
                    }
                }
                false
            }
            SessionCommand::RequestEngineMove => {
                if let Some(effect) = self.live.request_engine_move() {
                    self.perform(vec![effect]).await;
                }
                false
            }
            SessionCommand::Inspect { respond } => {
                let _ = respond.send(self.live.snapshot());
                false
            }
            SessionCommand::Leave { respond } => {
                let effects = self.live.leave();
                self.perform(effects).await;
                self.watch = None;
                let _ = respond.send(());
                true
            }
        }
    }

    async fn handle_snapshot(&mut self, snapshot: GameSession) {
        if let Some(event) = self.classifier.classify(&snapshot) {
            match self.live.apply_remote_change(event) {
                Ok(effects) => self.perform(effects).await,
                Err(e) => {
                    // corrupt replicated state is surfaced, never treated
                    // as a fresh board
                    error!(
                        "dropping remote change for session {}: {}",
                        self.live.session_id(),
                        e
                    );
                }
            }
        }
    }

    async fn handle_reply(&mut self, reply: OracleReply) {
        match reply {
            OracleReply::Move(evaluation) => {
                let respond = self.pending_attempt.take();
                match self.live.apply_evaluation(evaluation) {
                    Ok((outcome, effects)) => {
                        self.perform(effects).await;
                        if let Some(respond) = respond {
                            let _ = respond.send(Ok(outcome));
                        }
                    }
                    Err(e) => {
                        error!("move evaluation could not be applied: {}", e);
                        if let Some(respond) = respond {
                            let _ = respond.send(Err(e));
                        }
                    }
                }
            }
            OracleReply::EngineMove {
                revision,
                new_position,
                terminal,
            } => match self.live.apply_engine_move(revision, new_position, terminal) {
                Ok(effects) => self.perform(effects).await,
                Err(e) => error!("engine move could not be applied: {}", e),
            },
            OracleReply::Terminal { revision, terminal } => {
                let effects = self.live.apply_terminal_probe(revision, terminal);
                self.perform(effects).await;
            }
        }
    }

    async fn perform(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::Notify(notification) => {
                    let _ = self.notifications.send(notification);
                }
                SessionEffect::PersistPosition { position } => {
                    self.classifier.note_local_position(&position);
                    if let Err(e) = self
                        .game_repository
                        .write_position(self.live.session_id(), &position)
                        .await
                    {
                        // single attempt; the write is idempotent and the
                        // next move retries the same document
                        error!(
                            "failed to persist position for session {}: {}",
                            self.live.session_id(),
                            e
                        );
                    }
                }
                SessionEffect::ProbeTerminal { revision, position } => {
                    self.spawn_terminal_probe(revision, position);
                }
                SessionEffect::RequestEngineMove {
                    revision,
                    difficulty_depth,
                } => {
                    self.spawn_engine_move(revision, difficulty_depth);
                }
                SessionEffect::WriteOwnStats { stats } => {
                    if let Err(e) = self.player_repository.set_player_stats(&stats).await {
                        error!("failed to write stats for {}: {}", stats.player_id, e);
                    }
                }
                SessionEffect::FinishSessionDocument => {
                    match self
                        .game_repository
                        .finish_game_session(self.live.session_id())
                        .await
                    {
                        Ok(true) => info!("session {} marked finished", self.live.session_id()),
                        Ok(false) => {
                            info!("session {} was already finished", self.live.session_id())
                        }
                        Err(e) => error!(
                            "failed to finish session {}: {}",
                            self.live.session_id(),
                            e
                        ),
                    }
                    // the game is over for this side either way
                    self.watch = None;
                }
            }
        }
    }

    fn spawn_evaluation(&self, revision: u64, from: String, to: String, promotion: Option<char>) {
        let oracle = Arc::clone(&self.oracle);
        let variant = self.live.variant().to_string();
        let position = self.live.position().to_string();
        let replies = self.reply_tx.clone();
        tokio::spawn(async move {
            let verdict =
                evaluate_candidate(oracle.as_ref(), &variant, &position, &from, &to, promotion)
                    .await;
            let _ = replies.send(OracleReply::Move(MoveEvaluation {
                revision,
                from,
                to,
                promotion,
                verdict,
            }));
        });
    }

    fn spawn_engine_move(&self, revision: u64, difficulty_depth: u8) {
        let oracle = Arc::clone(&self.oracle);
        let variant = self.live.variant().to_string();
        let position = self.live.position().to_string();
        let replies = self.reply_tx.clone();
        tokio::spawn(async move {
            let best = match oracle
                .best_move(&variant, &position, difficulty_depth, ENGINE_TIME_BUDGET_MS)
                .await
            {
                Ok(best) => best,
                Err(e) => {
                    warn!("engine move request failed: {}", e);
                    return;
                }
            };
            let new_position = match oracle.apply_move(&variant, &position, &[best]).await {
                Ok(new_position) => new_position,
                Err(e) => {
                    warn!("engine move could not be applied by the oracle: {}", e);
                    return;
                }
            };
            let terminal = match oracle.terminal_result(&variant, &new_position).await {
                Ok(result) => TerminalResult::from_result_string(&result),
                Err(e) => {
                    warn!("terminal probe failed after engine move: {}", e);
                    None
                }
            };
            let _ = replies.send(OracleReply::EngineMove {
                revision,
                new_position,
                terminal,
            });
        });
    }

    fn spawn_terminal_probe(&self, revision: u64, position: String) {
        let oracle = Arc::clone(&self.oracle);
        let variant = self.live.variant().to_string();
        let replies = self.reply_tx.clone();
        tokio::spawn(async move {
            match oracle.terminal_result(&variant, &position).await {
                Ok(result) => {
                    // a None answer still matters: it resolves a pending
                    // remote finish flag as a walkover
                    let terminal = TerminalResult::from_result_string(&result);
                    let _ = replies.send(OracleReply::Terminal { revision, terminal });
                }
                Err(e) => warn!("terminal probe failed: {}", e),
            }
        });
    }
}

/// Full oracle evaluation of one candidate move, run off the
/// serialization point. Any oracle failure means the legality cannot be
/// confirmed and the move is rejected.
async fn evaluate_candidate(
    oracle: &dyn MoveOracle,
    variant: &str,
    position: &str,
    from: &str,
    to: &str,
    promotion: Option<char>,
) -> crate::session::MoveVerdict {
    use crate::session::MoveVerdict;

    let mut candidate = format!("{}{}", from, to);
    if let Some(piece) = promotion {
        candidate.push(piece);
    }

    let legal = match oracle.is_legal_move(variant, position, &candidate).await {
        Ok(legal) => legal,
        Err(e) => {
            warn!("legality check failed for {}: {}", candidate, e);
            return MoveVerdict::Illegal;
        }
    };
    if !legal {
        if promotion.is_none() {
            // a move that is only legal with a promotion piece appended is
            // a pending promotion, not an illegal move
            let probe = format!("{}{}q", from, to);
            if let Ok(true) = oracle.is_legal_move(variant, position, &probe).await {
                return MoveVerdict::PromotionRequired;
            }
        }
        return MoveVerdict::Illegal;
    }

    let capture = oracle
        .is_capture(variant, position, &candidate)
        .await
        .unwrap_or(false);
    let new_position = match oracle.apply_move(variant, position, &[candidate.clone()]).await {
        Ok(new_position) => new_position,
        Err(e) => {
            warn!("oracle failed to apply {}: {}", candidate, e);
            return MoveVerdict::Illegal;
        }
    };
    let terminal = match oracle.terminal_result(variant, &new_position).await {
        Ok(result) => TerminalResult::from_result_string(&result),
        Err(e) => {
            warn!("terminal probe failed after {}: {}", candidate, e);
            None
        }
    };
    MoveVerdict::Applied {
        new_position,
        capture,
        terminal,
    }
}
