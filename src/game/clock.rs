use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::board::Color;

/// Time control presets. All accounting is in whole seconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    Unlimited,
    Classical,
    Rapid,
    Bullet,
}

impl TimerMode {
    /// (initial seconds, increment seconds) for the preset.
    pub fn limits(self) -> (u64, u64) {
        match self {
            TimerMode::Unlimited => (0, 0),
            TimerMode::Classical => (1800, 30),
            TimerMode::Rapid => (600, 10),
            TimerMode::Bullet => (120, 5),
        }
    }

    pub fn is_timed(self) -> bool {
        self != TimerMode::Unlimited
    }
}

/// A flag fall. The winner is the side whose clock did not run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    pub winner: Color,
}

/// Server-side game clock. The wall clock observed while processing a
/// request is the only authority; whatever clients display or report is
/// advisory. Elapsed time is floored to whole seconds, deducted from the
/// mover, and the increment is granted only if the mover survived the
/// deduction.
#[derive(Debug, Clone)]
pub struct ClockArbiter {
    mode: TimerMode,
    white_remaining: u64,
    black_remaining: u64,
    increment: u64,
    active: Color,
    turn_started: Instant,
}

impl ClockArbiter {
    pub fn start(mode: TimerMode, now: Instant) -> Self {
        let (initial, increment) = mode.limits();
        ClockArbiter {
            mode,
            white_remaining: initial,
            black_remaining: initial,
            increment,
            active: Color::White,
            turn_started: now,
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn increment(&self) -> u64 {
        self.increment
    }

    pub fn active(&self) -> Color {
        self.active
    }

    /// Settles the mover's clock after their move was applied. Returns the
    /// timeout instead of crediting the increment when the deduction used up
    /// the rest of their time, so a move made after the flag fell loses even
    /// if it captured a king.
    pub fn on_move_applied(&mut self, mover: Color, now: Instant) -> Option<Timeout> {
        if !self.mode.is_timed() {
            return None;
        }
        let elapsed = now.duration_since(self.turn_started).as_secs();
        let remaining = match mover {
            Color::White => &mut self.white_remaining,
            Color::Black => &mut self.black_remaining,
        };
        *remaining = remaining.saturating_sub(elapsed);
        if *remaining == 0 {
            return Some(Timeout {
                winner: mover.opponent(),
            });
        }
        *remaining += self.increment;
        self.active = mover.opponent();
        self.turn_started = now;
        None
    }

    /// Remaining whole seconds for one side as of `now`, with the active
    /// side's in-progress turn already deducted.
    pub fn remaining_for(&self, color: Color, now: Instant) -> u64 {
        let stored = match color {
            Color::White => self.white_remaining,
            Color::Black => self.black_remaining,
        };
        if color == self.active {
            stored.saturating_sub(now.duration_since(self.turn_started).as_secs())
        } else {
            stored
        }
    }

    /// Remaining seconds as last settled, without live deduction. Used for
    /// display once the game is over and the clock no longer runs.
    pub fn stored_remaining(&self, color: Color) -> u64 {
        match color {
            Color::White => self.white_remaining,
            Color::Black => self.black_remaining,
        }
    }

    /// Validates a client-reported flag fall against the server clock. The
    /// report is only a trigger; it is rejected while the reported side
    /// still has time. A confirmed flag settles that side's clock at zero.
    pub fn confirm_reported_timeout(&mut self, reported: Color, now: Instant) -> Option<Timeout> {
        if !self.mode.is_timed() {
            return None;
        }
        if self.remaining_for(reported, now) == 0 {
            match reported {
                Color::White => self.white_remaining = 0,
                Color::Black => self.black_remaining = 0,
            }
            Some(Timeout {
                winner: reported.opponent(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rapid_move_deducts_then_increments() {
        let start = Instant::now();
        let mut clock = ClockArbiter::start(TimerMode::Rapid, start);
        let after = clock.on_move_applied(Color::White, start + Duration::from_secs(5));
        assert!(after.is_none());
        assert_eq!(clock.remaining_for(Color::White, start + Duration::from_secs(5)), 605);
        assert_eq!(clock.remaining_for(Color::Black, start + Duration::from_secs(5)), 600);
        assert_eq!(clock.active(), Color::Black);
    }

    #[test]
    fn fractional_seconds_floor() {
        let start = Instant::now();
        let mut clock = ClockArbiter::start(TimerMode::Bullet, start);
        clock.on_move_applied(Color::White, start + Duration::from_millis(2999));
        // 2.999s costs 2 whole seconds, then +5 increment
        assert_eq!(clock.remaining_for(Color::White, start + Duration::from_millis(2999)), 123);
    }

    #[test]
    fn overrunning_the_flag_times_out_instead_of_incrementing() {
        let start = Instant::now();
        let mut clock = ClockArbiter::start(TimerMode::Bullet, start);
        let timeout = clock
            .on_move_applied(Color::White, start + Duration::from_secs(120))
            .unwrap();
        assert_eq!(timeout.winner, Color::Black);
        assert_eq!(clock.remaining_for(Color::White, start + Duration::from_secs(120)), 0);
    }

    #[test]
    fn active_side_reading_counts_down_live() {
        let start = Instant::now();
        let clock = ClockArbiter::start(TimerMode::Rapid, start);
        assert_eq!(clock.remaining_for(Color::White, start + Duration::from_secs(30)), 570);
        assert_eq!(clock.remaining_for(Color::Black, start + Duration::from_secs(30)), 600);
    }

    #[test]
    fn reported_timeout_needs_an_actually_empty_clock() {
        let start = Instant::now();
        let mut clock = ClockArbiter::start(TimerMode::Bullet, start);
        assert!(clock
            .confirm_reported_timeout(Color::White, start + Duration::from_secs(30))
            .is_none());
        let confirmed = clock
            .confirm_reported_timeout(Color::White, start + Duration::from_secs(121))
            .unwrap();
        assert_eq!(confirmed.winner, Color::Black);
        assert_eq!(clock.stored_remaining(Color::White), 0);
        assert_eq!(clock.stored_remaining(Color::Black), 120);
    }

    #[test]
    fn unlimited_mode_never_times_out() {
        let start = Instant::now();
        let mut clock = ClockArbiter::start(TimerMode::Unlimited, start);
        assert!(clock
            .on_move_applied(Color::White, start + Duration::from_secs(86_400))
            .is_none());
        assert!(clock
            .confirm_reported_timeout(Color::Black, start + Duration::from_secs(86_400))
            .is_none());
    }
}
