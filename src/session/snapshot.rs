//! Read-only views handed to the host UI layer.

use std::fmt;

use frames::{Estimate, Timestamp, UserId};
use serde::Serialize;

use crate::roster::Participant;
use crate::timer::remaining_secs;

/// Session lifecycle phase.
///
/// Forward-only, except `RoundClosed → AwaitingInit` when a round is skipped
/// or finalized, and re-hydration from `initialise_game`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Connecting,
    AwaitingInit,
    Active,
    TimerRunning,
    RoundClosed,
    Terminated,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::AwaitingInit => "awaiting_init",
            Self::Active => "active",
            Self::TimerRunning => "timer_running",
            Self::RoundClosed => "round_closed",
            Self::Terminated => "terminated",
        }
    }

    /// Phases in which participants may vote.
    #[must_use]
    pub fn accepts_votes(self) -> bool {
        matches!(self, Self::Active | Self::TimerRunning)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded vote with the best known name of its author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VoteView {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub estimate: Estimate,
}

/// Everything the host needs to render one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: Phase,
    pub ticket_id: Option<String>,
    pub participants: Vec<Participant>,
    pub votes: Vec<VoteView>,
    /// The local user's recorded vote, for card highlighting.
    pub self_vote: Option<Estimate>,
    pub is_coordinator: bool,
    pub duration_secs: u32,
    pub timer_started_at: Option<Timestamp>,
    /// Remaining countdown when the snapshot was taken.
    pub remaining_secs: u32,
    /// Value finalized by the coordinator for the round that just ended.
    pub final_estimate: Option<Estimate>,
}

impl SessionSnapshot {
    /// Recompute the countdown at `now` from the snapshot's anchor.
    #[must_use]
    pub fn remaining_at(&self, now: Timestamp) -> u32 {
        self.timer_started_at
            .map_or(self.duration_secs, |at| remaining_secs(at, self.duration_secs, now))
    }
}
