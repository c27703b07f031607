//! Countdown reconciliation from a shared anchor.
//!
//! DESIGN
//! ======
//! Remaining time is never stored. Every participant recomputes it from the
//! authority's `started_at` anchor and the board's fixed duration, so local
//! tick jitter and reconnects cannot make participants disagree on when the
//! round closes. The only mutable state is the anchor itself.

use frames::Timestamp;

/// Remaining whole seconds of a countdown, clamped to `[0, duration_secs]`.
///
/// Partial seconds round up, so the value reaches 0 exactly when the full
/// duration has elapsed.
#[must_use]
pub fn remaining_secs(started_at: Timestamp, duration_secs: u32, now: Timestamp) -> u32 {
    let remaining = remaining_ms(started_at, duration_secs, now);
    let secs = (remaining + 999) / 1000;
    u32::try_from(secs).unwrap_or(duration_secs).min(duration_secs)
}

fn remaining_ms(started_at: Timestamp, duration_secs: u32, now: Timestamp) -> i64 {
    let duration_ms = i64::from(duration_secs) * 1000;
    let elapsed = now.saturating_sub(started_at).clamp(0, duration_ms);
    duration_ms - elapsed
}

/// Countdown anchored on the authority's start timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerReconciler {
    duration_secs: u32,
    started_at: Option<Timestamp>,
}

impl TimerReconciler {
    #[must_use]
    pub fn new(duration_secs: u32) -> Self {
        Self { duration_secs, started_at: None }
    }

    /// Anchor the countdown. A later anchor replaces the earlier one.
    pub fn start(&mut self, at: Timestamp) {
        self.started_at = Some(at);
    }

    pub fn clear(&mut self) {
        self.started_at = None;
    }

    #[must_use]
    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// Remaining seconds at `now`. The full duration when not anchored.
    #[must_use]
    pub fn remaining(&self, now: Timestamp) -> u32 {
        self.started_at
            .map_or(self.duration_secs, |at| remaining_secs(at, self.duration_secs, now))
    }

    /// True once an anchored countdown has fully elapsed.
    #[must_use]
    pub fn expired(&self, now: Timestamp) -> bool {
        self.started_at
            .is_some_and(|at| remaining_ms(at, self.duration_secs, now) == 0)
    }
}

#[cfg(test)]
#[path = "timer_test.rs"]
mod tests;
