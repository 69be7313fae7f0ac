use tracing::info;

use shared::models::game_session::{Color, GameSession};
use shared::models::player_stats::PlayerStats;
use shared::services::rating_service;

use crate::clock::{ClockPair, ClockSide, ClockState, TimeControl, CLOCK_TICK_INTERVAL};
use crate::errors::SessionError;
use crate::events::{MoveOutcome, SessionNotification, TerminalResult};
use crate::sync::SessionChangeEvent;
use crate::view::{LocalGameView, PendingPromotion};

/// Lifecycle of one session as seen by one participant. A joiner enters
/// `InProgress` directly, skipping `WaitingForOpponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Searching,
    WaitingForOpponent,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpponentKind {
    Human,
    /// The opposing side is the oracle itself; its moves are requested with
    /// this search depth and applied without a legality re-check.
    Engine { difficulty_depth: u8 },
}

/// Gate decision for a candidate move, taken synchronously before any
/// oracle work is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveAdmission {
    /// Wrong phase, wrong turn, or a promotion is pending: answer
    /// `Illegal` without consulting the oracle.
    Rejected,
    Evaluate {
        revision: u64,
        from: String,
        to: String,
        promotion: Option<char>,
    },
}

/// Oracle verdict on an admitted move, delivered back into the
/// serialization point as an event.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveVerdict {
    Illegal,
    /// Legal only with a promotion piece appended; the caller must choose
    /// one first.
    PromotionRequired,
    Applied {
        new_position: String,
        capture: bool,
        terminal: Option<TerminalResult>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveEvaluation {
    /// Position revision the evaluation answered. A reply for a superseded
    /// revision is stale and must be discarded, not applied.
    pub revision: u64,
    pub from: String,
    pub to: String,
    pub promotion: Option<char>,
    pub verdict: MoveVerdict,
}

/// Side effects the runtime performs outside the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    Notify(SessionNotification),
    PersistPosition { position: String },
    ProbeTerminal { revision: u64, position: String },
    RequestEngineMove { revision: u64, difficulty_depth: u8 },
    WriteOwnStats { stats: PlayerStats },
    FinishSessionDocument,
}

/// Introspection snapshot for the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: SessionPhase,
    pub player_color: Color,
    pub view: LocalGameView,
    pub clock_states: Option<(ClockState, ClockState)>,
    pub player_stats: PlayerStats,
}

/// The single-writer core of one live session. All three event sources
/// (local commands, remote changes, clock ticks) and every oracle reply
/// are funneled through `&mut self` methods by one owner, so no partial
/// update is ever observable.
pub struct LiveSession {
    phase: SessionPhase,
    session: GameSession,
    view: LocalGameView,
    clock: Option<ClockPair>,
    player_id: String,
    player_color: Color,
    player_stats: PlayerStats,
    opponent_stats: PlayerStats,
    opponent: OpponentKind,
    settled: bool,
    revision: u64,
    /// Cause of a remote finish flag whose meaning is still being
    /// determined: if the current position turns out to be terminal the
    /// result decides the outcome, otherwise the opponent walked away and
    /// this side wins.
    remote_finish_pending: Option<String>,
}

impl LiveSession {
    pub fn new(player_id: &str, player_stats: PlayerStats, opponent: OpponentKind) -> Self {
        LiveSession {
            phase: SessionPhase::Searching,
            session: GameSession::new("", "", player_id, player_stats.rating),
            view: LocalGameView::empty(),
            clock: None,
            player_id: player_id.to_string(),
            player_color: Color::White,
            player_stats,
            opponent_stats: PlayerStats::new(""),
            opponent,
            settled: false,
            revision: 0,
            remote_finish_pending: None,
        }
    }

    /// Binds a freshly created session; the opponent seat is still empty.
    pub fn bind_hosted(&mut self, session: GameSession) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Searching {
            return Err(SessionError::InvalidPhase(
                "can only bind a session while searching".to_string(),
            ));
        }
        self.player_color = session
            .color_of(&self.player_id)
            .ok_or_else(|| SessionError::NotAParticipant(self.player_id.clone()))?;
        self.session = session;
        self.phase = SessionPhase::WaitingForOpponent;
        Ok(())
    }

    /// Binds a session that already has both sides, entering `InProgress`
    /// directly (the join path, and engine games).
    pub fn bind_joined(&mut self, session: GameSession) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Searching {
            return Err(SessionError::InvalidPhase(
                "can only bind a session while searching".to_string(),
            ));
        }
        self.enter_in_progress(session)
    }

    fn enter_in_progress(&mut self, session: GameSession) -> Result<(), SessionError> {
        self.player_color = session
            .color_of(&self.player_id)
            .ok_or_else(|| SessionError::NotAParticipant(self.player_id.clone()))?;
        let opponent_id = session
            .opponent_of(&self.player_id)
            .ok_or_else(|| SessionError::NotAParticipant(self.player_id.clone()))?
            .to_string();
        let opponent_rating = session.rating_of(&opponent_id).unwrap_or(0.0);
        self.opponent_stats = PlayerStats::with_rating(&opponent_id, opponent_rating);
        self.view = LocalGameView::from_position(&session.current_position)?;
        self.clock = match TimeControl::from_time_mode(&session.time_mode) {
            Some(control) => Some(ClockPair::new(control, self.player_color)),
            None => {
                // untimed game: a deliberate branch for unrecognized presets
                info!("session {} runs untimed ({})", session.session_id, session.time_mode);
                None
            }
        };
        if let Some(clock) = self.clock.as_mut() {
            clock.switch_active(self.view.active_color);
        }
        self.session = session;
        self.phase = SessionPhase::InProgress;
        Ok(())
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub(crate) fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn variant(&self) -> &str {
        &self.session.variant_name
    }

    pub fn position(&self) -> &str {
        &self.view.position
    }

    pub fn player_color(&self) -> Color {
        self.player_color
    }

    pub(crate) fn is_store_backed(&self) -> bool {
        self.opponent == OpponentKind::Human
    }

    /// Synchronous gate for `attempt_move`: only in progress, only on the
    /// local player's turn, and never with a promotion still pending.
    pub fn admit_move(&self, from: &str, to: &str) -> MoveAdmission {
        if self.phase != SessionPhase::InProgress
            || self.view.active_color != self.player_color
            || self.view.pending_promotion.is_some()
        {
            return MoveAdmission::Rejected;
        }
        MoveAdmission::Evaluate {
            revision: self.revision,
            from: from.to_string(),
            to: to.to_string(),
            promotion: None,
        }
    }

    /// Gate for `resolve_promotion`: only valid while a promotion is
    /// pending.
    pub fn admit_promotion(&self, piece: char) -> MoveAdmission {
        if self.phase != SessionPhase::InProgress {
            return MoveAdmission::Rejected;
        }
        match &self.view.pending_promotion {
            Some(pending) => MoveAdmission::Evaluate {
                revision: self.revision,
                from: pending.from.clone(),
                to: pending.to.clone(),
                promotion: Some(piece),
            },
            None => MoveAdmission::Rejected,
        }
    }

    /// Applies the oracle's verdict on an admitted move. Stale replies
    /// (the position moved on while the oracle was thinking) answer
    /// `Illegal` and change nothing.
    pub fn apply_evaluation(
        &mut self,
        evaluation: MoveEvaluation,
    ) -> Result<(MoveOutcome, Vec<SessionEffect>), SessionError> {
        if self.phase != SessionPhase::InProgress || evaluation.revision != self.revision {
            return Ok((MoveOutcome::Illegal, Vec::new()));
        }

        match evaluation.verdict {
            MoveVerdict::Illegal => Ok((
                MoveOutcome::Illegal,
                vec![SessionEffect::Notify(SessionNotification::IllegalMove)],
            )),
            MoveVerdict::PromotionRequired => {
                self.view.pending_promotion = Some(PendingPromotion {
                    from: evaluation.from,
                    to: evaluation.to.clone(),
                });
                Ok((
                    MoveOutcome::PromotionPending,
                    vec![SessionEffect::Notify(SessionNotification::PromotionRequired {
                        square: evaluation.to,
                    })],
                ))
            }
            MoveVerdict::Applied {
                new_position,
                capture,
                terminal,
            } => {
                if capture {
                    info!(
                        "move {}{} captured a piece",
                        evaluation.from, evaluation.to
                    );
                }
                let mut effects = self.apply_local_position(new_position)?;
                if let Some(terminal) = terminal {
                    effects.extend(self.finish_from_terminal(terminal));
                }
                Ok((MoveOutcome::Applied, effects))
            }
        }
    }

    /// Asks for an engine move when the opposing side is the oracle and it
    /// is the engine's turn.
    pub fn request_engine_move(&self) -> Option<SessionEffect> {
        let difficulty_depth = match self.opponent {
            OpponentKind::Engine { difficulty_depth } => difficulty_depth,
            OpponentKind::Human => return None,
        };
        if self.phase != SessionPhase::InProgress
            || self.view.active_color == self.player_color
        {
            return None;
        }
        Some(SessionEffect::RequestEngineMove {
            revision: self.revision,
            difficulty_depth,
        })
    }

    /// Applies an engine move: same path as a player move, minus the
    /// legality gate (oracle output is trusted).
    pub fn apply_engine_move(
        &mut self,
        revision: u64,
        new_position: String,
        terminal: Option<TerminalResult>,
    ) -> Result<Vec<SessionEffect>, SessionError> {
        if self.phase != SessionPhase::InProgress || revision != self.revision {
            return Ok(Vec::new());
        }
        let mut effects = self.apply_local_position(new_position)?;
        if let Some(terminal) = terminal {
            effects.extend(self.finish_from_terminal(terminal));
        }
        Ok(effects)
    }

    fn apply_local_position(
        &mut self,
        new_position: String,
    ) -> Result<Vec<SessionEffect>, SessionError> {
        self.view.rebuild(&new_position)?;
        self.revision += 1;
        self.session.current_position = new_position.clone();
        if let Some(clock) = self.clock.as_mut() {
            clock.switch_active(self.view.active_color);
        }
        let mut effects = Vec::new();
        if self.is_store_backed() {
            effects.push(SessionEffect::PersistPosition {
                position: new_position.clone(),
            });
        }
        effects.push(SessionEffect::Notify(SessionNotification::PositionChanged {
            position: new_position,
        }));
        Ok(effects)
    }

    /// Feeds one classified remote change into the state machine.
    pub fn apply_remote_change(
        &mut self,
        event: SessionChangeEvent,
    ) -> Result<Vec<SessionEffect>, SessionError> {
        match event {
            SessionChangeEvent::SecondPlayerJoined { session } => {
                if self.phase != SessionPhase::WaitingForOpponent {
                    return Ok(Vec::new());
                }
                let opponent_id = session
                    .opponent_of(&self.player_id)
                    .unwrap_or_default()
                    .to_string();
                self.enter_in_progress(session)?;
                Ok(vec![SessionEffect::Notify(
                    SessionNotification::SecondPlayerJoined { opponent_id },
                )])
            }
            SessionChangeEvent::PositionChanged { position } => {
                if self.phase != SessionPhase::InProgress {
                    return Ok(Vec::new());
                }
                // re-delivery of the state we already hold is a no-op
                if position == self.view.position {
                    return Ok(Vec::new());
                }
                self.view.rebuild(&position)?;
                self.revision += 1;
                self.session.current_position = position.clone();
                if let Some(clock) = self.clock.as_mut() {
                    clock.switch_active(self.view.active_color);
                }
                Ok(vec![
                    SessionEffect::Notify(SessionNotification::PositionChanged {
                        position: position.clone(),
                    }),
                    SessionEffect::ProbeTerminal {
                        revision: self.revision,
                        position,
                    },
                ])
            }
            SessionChangeEvent::SessionFinished { cause } => match self.phase {
                SessionPhase::InProgress => {
                    // the flag alone does not say why the game ended: if
                    // the replicated position is terminal its result wins,
                    // otherwise the opponent walked away and this side
                    // takes the game
                    self.remote_finish_pending = Some(cause);
                    Ok(vec![SessionEffect::ProbeTerminal {
                        revision: self.revision,
                        position: self.view.position.clone(),
                    }])
                }
                _ => Ok(Vec::new()),
            },
        }
    }

    /// Applies a terminal-result probe answered for `revision`. `None`
    /// means the probed position was not terminal, which resolves a
    /// pending remote finish flag as a walkover win.
    pub fn apply_terminal_probe(
        &mut self,
        revision: u64,
        terminal: Option<TerminalResult>,
    ) -> Vec<SessionEffect> {
        if self.phase != SessionPhase::InProgress || revision != self.revision {
            return Vec::new();
        }
        match terminal {
            Some(terminal) => self.finish_from_terminal(terminal),
            None => match self.remote_finish_pending.take() {
                Some(cause) => self.finish(&cause, Some(true)),
                None => Vec::new(),
            },
        }
    }

    /// Advances the running clock by one runtime tick.
    pub fn clock_tick(&mut self) -> Vec<SessionEffect> {
        if self.phase != SessionPhase::InProgress {
            return Vec::new();
        }
        let Some(clock) = self.clock.as_mut() else {
            return Vec::new();
        };
        if let Some(side) = clock.tick(CLOCK_TICK_INTERVAL) {
            let mut effects = vec![SessionEffect::Notify(SessionNotification::ClockExpired {
                side,
            })];
            let (cause, player_won) = match side {
                ClockSide::Player => ("timeout. you lost.", Some(false)),
                ClockSide::Opponent => ("timeout. you won.", Some(true)),
            };
            effects.extend(self.finish(cause, player_won));
            return effects;
        }
        match clock.running_side() {
            Some(side) => vec![SessionEffect::Notify(SessionNotification::ClockTick {
                remaining_ms: clock.remaining_ms(side),
                side,
            })],
            None => Vec::new(),
        }
    }

    /// Leaves the session. Mid-game this counts as a loss; while still
    /// waiting for an opponent it just cancels the open session.
    pub fn leave(&mut self) -> Vec<SessionEffect> {
        match self.phase {
            SessionPhase::InProgress => {
                let cause = format!("{} left the game", self.player_id);
                self.finish(&cause, Some(false))
            }
            SessionPhase::WaitingForOpponent => {
                self.phase = SessionPhase::Finished;
                self.settled = true;
                vec![
                    SessionEffect::FinishSessionDocument,
                    SessionEffect::Notify(SessionNotification::GameFinished {
                        cause: "cancelled before an opponent joined".to_string(),
                        player_won: None,
                    }),
                ]
            }
            SessionPhase::Searching | SessionPhase::Finished => Vec::new(),
        }
    }

    fn finish_from_terminal(&mut self, terminal: TerminalResult) -> Vec<SessionEffect> {
        let player_won = terminal.player_won(self.player_color);
        self.finish(&terminal.cause, player_won)
    }

    /// One-shot settlement. Duplicate termination signals (remote echo and
    /// local detection both firing, or a cancel racing an expiry) run into
    /// the guard and do nothing.
    fn finish(&mut self, cause: &str, player_won: Option<bool>) -> Vec<SessionEffect> {
        if self.settled {
            return Vec::new();
        }
        self.settled = true;
        self.phase = SessionPhase::Finished;
        if let Some(clock) = self.clock.as_mut() {
            clock.cancel_both();
        }

        let mut effects = Vec::new();
        if self.is_store_backed() {
            rating_service::apply_outcome(
                &mut self.player_stats,
                &mut self.opponent_stats,
                player_won,
            );
            // each participant writes its own record; the opponent's copy
            // here only supplied the rating for the update
            effects.push(SessionEffect::WriteOwnStats {
                stats: self.player_stats.clone(),
            });
            effects.push(SessionEffect::FinishSessionDocument);
        }
        effects.push(SessionEffect::Notify(SessionNotification::GameFinished {
            cause: cause.to_string(),
            player_won,
        }));
        info!(
            "session {} finished: {} (player_won: {:?})",
            self.session.session_id, cause, player_won
        );
        effects
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session.session_id.clone(),
            phase: self.phase,
            player_color: self.player_color,
            view: self.view.clone(),
            clock_states: self
                .clock
                .as_ref()
                .map(|clock| (clock.state(ClockSide::Player), clock.state(ClockSide::Opponent))),
            player_stats: self.player_stats.clone(),
        }
    }
}
