use std::time::Duration;

use shared::models::game_session::Color;

/// Granularity of clock updates driven by the session runtime.
pub const CLOCK_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Countdown duration for one of the fixed time-control presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeControl {
    pub initial: Duration,
}

impl TimeControl {
    /// Maps a time-mode label to its preset. Labels outside the table mean
    /// an untimed game - `None` here is a deliberate branch the caller
    /// handles explicitly, not a fallback.
    pub fn from_time_mode(time_mode: &str) -> Option<TimeControl> {
        let initial = match time_mode {
            "bullet (2 minutes)" => Duration::from_secs(120),
            "blitz (5 minutes)" => Duration::from_secs(300),
            "rapid (10 minutes)" => Duration::from_secs(600),
            _ => return None,
        };
        Some(TimeControl { initial })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSide {
    Player,
    Opponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Running,
    Paused,
    Expired,
}

#[derive(Debug, Clone)]
struct Countdown {
    remaining: Duration,
    state: ClockState,
}

impl Countdown {
    fn new(initial: Duration) -> Self {
        Countdown {
            remaining: initial,
            state: ClockState::Paused,
        }
    }

    /// Advances the countdown. Returns true exactly once, on the tick that
    /// drains it.
    fn tick(&mut self, delta: Duration) -> bool {
        if self.state != ClockState::Running {
            return false;
        }
        if delta >= self.remaining {
            self.remaining = Duration::ZERO;
            self.state = ClockState::Expired;
            true
        } else {
            self.remaining -= delta;
            false
        }
    }

    fn resume(&mut self) {
        if self.state == ClockState::Paused {
            self.state = ClockState::Running;
        }
    }

    fn pause(&mut self) {
        if self.state == ClockState::Running {
            self.state = ClockState::Paused;
        }
    }
}

/// The two per-player countdowns of a timed session. At most one runs at
/// any instant: the one belonging to the side whose turn it is.
#[derive(Debug, Clone)]
pub struct ClockPair {
    player: Countdown,
    opponent: Countdown,
    player_color: Color,
}

impl ClockPair {
    /// Both clocks start paused; the first `switch_active` starts the
    /// first mover's clock.
    pub fn new(control: TimeControl, player_color: Color) -> Self {
        ClockPair {
            player: Countdown::new(control.initial),
            opponent: Countdown::new(control.initial),
            player_color,
        }
    }

    /// Pauses the side that just moved and resumes the side to move.
    pub fn switch_active(&mut self, active_color: Color) {
        if active_color == self.player_color {
            self.opponent.pause();
            self.player.resume();
        } else {
            self.player.pause();
            self.opponent.resume();
        }
    }

    /// Stops both clocks for good at game end.
    pub fn cancel_both(&mut self) {
        self.player.pause();
        self.opponent.pause();
    }

    /// Advances whichever clock is running. Reports the side that expired
    /// on this tick, at most once per clock ever.
    pub fn tick(&mut self, delta: Duration) -> Option<ClockSide> {
        if self.player.tick(delta) {
            return Some(ClockSide::Player);
        }
        if self.opponent.tick(delta) {
            return Some(ClockSide::Opponent);
        }
        None
    }

    pub fn running_side(&self) -> Option<ClockSide> {
        if self.player.state == ClockState::Running {
            Some(ClockSide::Player)
        } else if self.opponent.state == ClockState::Running {
            Some(ClockSide::Opponent)
        } else {
            None
        }
    }

    pub fn state(&self, side: ClockSide) -> ClockState {
        match side {
            ClockSide::Player => self.player.state,
            ClockSide::Opponent => self.opponent.state,
        }
    }

    pub fn remaining_ms(&self, side: ClockSide) -> u64 {
        let remaining = match side {
            ClockSide::Player => self.player.remaining,
            ClockSide::Opponent => self.opponent.remaining,
        };
        remaining.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn blitz_pair() -> ClockPair {
        let control = TimeControl::from_time_mode("blitz (5 minutes)").unwrap();
        ClockPair::new(control, Color::White)
    }

    #[test_case("bullet (2 minutes)", 120)]
    #[test_case("blitz (5 minutes)", 300)]
    #[test_case("rapid (10 minutes)", 600)]
    fn test_preset_table(time_mode: &str, expected_secs: u64) {
        let control = TimeControl::from_time_mode(time_mode).unwrap();
        assert_eq!(control.initial, Duration::from_secs(expected_secs));
    }

    #[test]
    fn test_unknown_preset_means_untimed() {
        assert_eq!(TimeControl::from_time_mode("correspondence"), None);
        assert_eq!(TimeControl::from_time_mode(""), None);
        assert_eq!(TimeControl::from_time_mode("any time mode"), None);
    }

    #[test]
    fn test_at_most_one_clock_runs() {
        let mut pair = blitz_pair();
        assert_eq!(pair.running_side(), None);

        pair.switch_active(Color::White);
        assert_eq!(pair.running_side(), Some(ClockSide::Player));
        assert_eq!(pair.state(ClockSide::Opponent), ClockState::Paused);

        pair.switch_active(Color::Black);
        assert_eq!(pair.running_side(), Some(ClockSide::Opponent));
        assert_eq!(pair.state(ClockSide::Player), ClockState::Paused);
    }

    #[test]
    fn test_tick_only_drains_the_running_clock() {
        let mut pair = blitz_pair();
        pair.switch_active(Color::White);

        assert_eq!(pair.tick(Duration::from_secs(10)), None);
        assert_eq!(pair.remaining_ms(ClockSide::Player), 290_000);
        assert_eq!(pair.remaining_ms(ClockSide::Opponent), 300_000);
    }

    #[test]
    fn test_expiry_fires_exactly_once() {
        let mut pair = blitz_pair();
        pair.switch_active(Color::White);

        assert_eq!(pair.tick(Duration::from_secs(301)), Some(ClockSide::Player));
        assert_eq!(pair.state(ClockSide::Player), ClockState::Expired);
        assert_eq!(pair.tick(Duration::from_secs(1)), None);
    }

    #[test]
    fn test_cancelled_clocks_never_expire() {
        let mut pair = blitz_pair();
        pair.switch_active(Color::White);
        pair.cancel_both();

        assert_eq!(pair.tick(Duration::from_secs(1000)), None);
        assert_eq!(pair.running_side(), None);
    }

    #[test]
    fn test_switch_does_not_resurrect_an_expired_clock() {
        let mut pair = blitz_pair();
        pair.switch_active(Color::White);
        assert_eq!(pair.tick(Duration::from_secs(301)), Some(ClockSide::Player));

        pair.switch_active(Color::White);
        assert_eq!(pair.state(ClockSide::Player), ClockState::Expired);
        assert_eq!(pair.running_side(), None);
    }

    #[test]
    fn test_black_player_maps_to_player_side() {
        let control = TimeControl::from_time_mode("bullet (2 minutes)").unwrap();
        let mut pair = ClockPair::new(control, Color::Black);

        pair.switch_active(Color::Black);
        assert_eq!(pair.running_side(), Some(ClockSide::Player));

        pair.switch_active(Color::White);
        assert_eq!(pair.running_side(), Some(ClockSide::Opponent));
    }
}
