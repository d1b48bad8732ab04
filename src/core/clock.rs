//! Two-sided countdown clock driven by a single 1 Hz tick.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::game::Side;

/// Base time per side and Fischer increment, all in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeControl {
    pub white_seconds: u32,
    pub black_seconds: u32,
    pub increment_seconds: u32,
}

impl TimeControl {
    pub fn new(minutes: u32, increment_seconds: u32) -> Self {
        Self::with_odds(minutes, minutes, increment_seconds)
    }

    /// Time odds: each side gets its own base time. Saturates instead of
    /// overflowing; use [`TimeControl::checked`] for untrusted input.
    pub fn with_odds(white_minutes: u32, black_minutes: u32, increment_seconds: u32) -> Self {
        Self {
            white_seconds: white_minutes.saturating_mul(60),
            black_seconds: black_minutes.saturating_mul(60),
            increment_seconds,
        }
    }

    /// `None` when either base time does not fit in seconds.
    pub fn checked(white_minutes: u32, black_minutes: u32, increment_seconds: u32) -> Option<Self> {
        Some(Self {
            white_seconds: white_minutes.checked_mul(60)?,
            black_seconds: black_minutes.checked_mul(60)?,
            increment_seconds,
        })
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.white_seconds == self.black_seconds {
            write!(f, "{}+{}", self.white_seconds / 60, self.increment_seconds)
        } else {
            write!(
                f,
                "{}/{}+{}",
                self.white_seconds / 60,
                self.black_seconds / 60,
                self.increment_seconds
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    white_remaining: u32,
    black_remaining: u32,
    increment: u32,
    active: Side,
    running: bool,
}

impl Clock {
    /// White is active first; the clock is stopped until [`Clock::start`].
    pub fn new(tc: TimeControl) -> Self {
        Self {
            white_remaining: tc.white_seconds,
            black_remaining: tc.black_seconds,
            increment: tc.increment_seconds,
            active: Side::White,
            running: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stops ticking for good. There is no resume.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn active(&self) -> Side {
        self.active
    }

    pub fn increment(&self) -> u32 {
        self.increment
    }

    pub fn remaining(&self, side: Side) -> u32 {
        match side {
            Side::White => self.white_remaining,
            Side::Black => self.black_remaining,
        }
    }

    fn remaining_mut(&mut self, side: Side) -> &mut u32 {
        match side {
            Side::White => &mut self.white_remaining,
            Side::Black => &mut self.black_remaining,
        }
    }

    /// Advances the active counter by one second. Returns the side whose time ran out,
    /// after which the clock is stopped.
    pub fn tick(&mut self) -> Option<Side> {
        if !self.running {
            return None;
        }

        let side = self.active;
        let remaining = self.remaining_mut(side);
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.running = false;
            return Some(side);
        }
        None
    }

    /// Hands the turn to the opponent, then credits the increment to the mover.
    pub fn on_move_completed(&mut self, mover: Side) {
        self.active = mover.opponent();
        let increment = self.increment;
        let remaining = self.remaining_mut(mover);
        *remaining = remaining.saturating_add(increment);
    }
}

/// `m:ss`, the format shown next to each player.
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
