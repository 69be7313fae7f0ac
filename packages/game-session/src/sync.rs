use shared::models::game_session::GameSession;

/// What a remote change means for the local session, decoded from a full
/// document snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChangeEvent {
    SecondPlayerJoined { session: GameSession },
    PositionChanged { position: String },
    SessionFinished { cause: String },
}

/// Turns raw store snapshots into at most one `SessionChangeEvent` each.
///
/// The subscription delivers full documents at-least-once with no ordering
/// guarantee relative to local writes: this side's own writes echo back,
/// and a notification can arrive before the write that caused it is
/// acknowledged. Classification therefore compares values - what was last
/// seen and what this side last wrote - and answers `None` for anything
/// already accounted for.
pub struct ChangeClassifier {
    seen_second_player: bool,
    seen_finished: bool,
    last_position: String,
}

impl ChangeClassifier {
    /// Seeds the classifier from the snapshot the session started from so
    /// that the watch's initial replay classifies as a no-op.
    pub fn new(game_session: &GameSession) -> Self {
        ChangeClassifier {
            seen_second_player: !game_session.player2_id.is_empty(),
            seen_finished: game_session.finished,
            last_position: game_session.current_position.clone(),
        }
    }

    /// Records a position this side wrote itself, so the echo coming back
    /// through the subscription is recognized by value and dropped.
    pub fn note_local_position(&mut self, position: &str) {
        self.last_position = position.to_string();
    }

    pub fn classify(&mut self, snapshot: &GameSession) -> Option<SessionChangeEvent> {
        if snapshot.finished {
            if self.seen_finished {
                return None;
            }
            self.seen_finished = true;
            return Some(SessionChangeEvent::SessionFinished {
                cause: "opponent left game".to_string(),
            });
        }

        if !self.seen_second_player && !snapshot.player2_id.is_empty() {
            self.seen_second_player = true;
            return Some(SessionChangeEvent::SecondPlayerJoined {
                session: snapshot.clone(),
            });
        }

        if !snapshot.current_position.is_empty()
            && snapshot.current_position != self.last_position
        {
            self.last_position = snapshot.current_position.clone();
            return Some(SessionChangeEvent::PositionChanged {
                position: snapshot.current_position.clone(),
            });
        }

        None
    }
}
