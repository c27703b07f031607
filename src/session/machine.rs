//! Session state machine.
//!
//! DESIGN
//! ======
//! One `SessionMachine` owns all state of one session: phase, roster, votes,
//! countdown anchor, ticket. Every mutation goes through one of three entry
//! points, each called from the session's single event loop:
//! - `handle_message` for authority broadcasts
//! - the host actions (`cast_vote`, `start_countdown`, ...)
//! - `tick` for the local display clock
//!
//! Inbound handling never produces outbound frames. Host actions return the
//! frames to send and leave transport concerns to the caller, so the machine
//! itself performs no I/O.
//!
//! PHASES
//! ======
//! `Connecting → AwaitingInit → Active ⇄ TimerRunning → RoundClosed`
//! `skip`/`estimate` broadcasts return any live phase to `AwaitingInit`.
//! `initialise_game` re-hydrates from any live phase and re-derives the
//! phase from its payload. `Terminated` is absorbing.
//!
//! The countdown deadline is checked against the clock on every host action
//! and every notification, so `TimerRunning → RoundClosed` never waits for
//! the next tick.
//!
//! OPTIMISTIC VOTES
//! ================
//! A local vote is written to the aggregator before it is sent. The
//! authority's echo goes through the same upsert, so replay never
//! double-applies.

use std::sync::{Arc, Mutex};

use frames::{ClientMessage, DecodeError, Estimate, GameInit, ServerMessage, Timestamp, UserId, VoteRecord};
use tracing::{debug, info, warn};

use super::observer::{SessionObserver, SharedObserver};
use super::snapshot::{Phase, SessionSnapshot, VoteView};
use crate::clock::Clock;
use crate::config::{Identity, SessionConfig};
use crate::error::{ErrorKind, SessionError};
use crate::roster::Roster;
use crate::timer::TimerReconciler;
use crate::votes::VoteAggregator;

pub struct SessionMachine {
    config: SessionConfig,
    self_id: UserId,
    phase: Phase,
    ticket_id: Option<String>,
    roster: Roster,
    votes: VoteAggregator,
    timer: TimerReconciler,
    final_estimate: Option<Estimate>,
    clock: Arc<dyn Clock>,
    observer: SharedObserver,
}

impl SessionMachine {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        identity: &Identity,
        clock: Arc<dyn Clock>,
        observer: Box<dyn SessionObserver>,
    ) -> Self {
        let mut roster = Roster::new();
        roster.seed_self(identity.user_id, &identity.display_name);
        Self {
            ticket_id: Some(config.ticket_id.clone()),
            timer: TimerReconciler::new(config.duration_secs),
            self_id: identity.user_id,
            phase: Phase::Connecting,
            roster,
            votes: VoteAggregator::new(),
            final_estimate: None,
            config,
            clock,
            observer: Arc::new(Mutex::new(observer)),
        }
    }

    /// Observer handle shared with whoever outlives the session loop.
    #[must_use]
    pub(crate) fn shared_observer(&self) -> SharedObserver {
        Arc::clone(&self.observer)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn votes(&self) -> &VoteAggregator {
        &self.votes
    }

    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    #[must_use]
    pub fn is_coordinator(&self) -> bool {
        self.self_id == self.config.coordinator_user_id
    }

    /// Remaining countdown seconds right now.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.timer.remaining(self.clock.now_ms())
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let now = self.clock.now_ms();
        let votes = self
            .votes
            .all()
            .iter()
            .map(|(&user_id, &estimate)| VoteView {
                user_id,
                display_name: self.roster.name_of(user_id).map(ToOwned::to_owned),
                estimate,
            })
            .collect();

        SessionSnapshot {
            session_id: self.config.session_id.clone(),
            phase: self.phase,
            ticket_id: self.ticket_id.clone(),
            participants: self.roster.participants().to_vec(),
            votes,
            self_vote: self.votes.get(self.self_id),
            is_coordinator: self.is_coordinator(),
            duration_secs: self.timer.duration_secs(),
            timer_started_at: self.timer.started_at(),
            remaining_secs: self.timer.remaining(now),
            final_estimate: self.final_estimate,
        }
    }

    // =========================================================================
    // TRANSPORT EVENTS
    // =========================================================================

    /// Transport is open. Returns the join request.
    pub fn connected(&mut self) -> Vec<ClientMessage> {
        if self.phase != Phase::Connecting {
            warn!(phase = %self.phase, "session: connected outside connecting phase");
            return Vec::new();
        }
        self.transition(Phase::AwaitingInit);
        self.emit();
        vec![ClientMessage::InitialiseGame]
    }

    /// Transport is gone. Terminates the session.
    pub fn disconnected(&mut self, reason: &str) {
        if self.phase == Phase::Terminated {
            return;
        }
        self.transition(Phase::Terminated);
        self.report(&ErrorKind::TerminalDisconnect(reason.to_owned()));
        self.emit();
    }

    /// An inbound frame failed to decode. State is untouched.
    pub fn malformed(&mut self, error: &DecodeError) {
        warn!(session_id = %self.config.session_id, error = %error, "session: dropped malformed frame");
        self.report(&ErrorKind::from(error));
    }

    // =========================================================================
    // AUTHORITY BROADCASTS
    // =========================================================================

    pub fn handle_message(&mut self, message: ServerMessage) {
        if matches!(self.phase, Phase::Connecting | Phase::Terminated) {
            debug!(phase = %self.phase, "session: ignoring frame outside live phases");
            return;
        }

        match message {
            ServerMessage::InitialiseGame(init) => self.apply_init(init),
            ServerMessage::Vote(vote) => self.apply_vote(vote),
            ServerMessage::StartTimer { timer_started_at } => self.apply_start_timer(timer_started_at),
            ServerMessage::Skip => self.end_round(None),
            ServerMessage::Estimate { estimate } => self.end_round(Some(estimate)),
            ServerMessage::Update { users } => {
                self.roster.replace(&users, self.self_id);
                self.emit();
            }
            ServerMessage::Error { message } => {
                warn!(session_id = %self.config.session_id, %message, "session: request rejected by authority");
                self.report(&ErrorKind::ServerRejected(message));
            }
        }
    }

    fn apply_init(&mut self, init: GameInit) {
        self.roster.replace(&init.users, self.self_id);
        self.votes.clear();
        for vote in init.votes {
            self.record_vote(vote);
        }
        if let Some(ticket) = init.ticket {
            self.ticket_id = Some(ticket);
        }
        self.final_estimate = None;

        let now = self.clock.now_ms();
        let next = match init.timer {
            Some(at) => {
                self.timer.start(at);
                if self.timer.expired(now) { Phase::RoundClosed } else { Phase::TimerRunning }
            }
            None => {
                self.timer.clear();
                Phase::Active
            }
        };
        self.transition(next);
        self.emit();
    }

    fn apply_vote(&mut self, vote: VoteRecord) {
        if !self.roster.contains(vote.user_id) {
            debug!(user_id = vote.user_id, "session: vote from user outside roster");
        }
        self.record_vote(vote);
        self.emit();
    }

    fn record_vote(&mut self, vote: VoteRecord) {
        if let Some(user) = &vote.user {
            self.roster.remember(user);
        }
        self.votes.upsert(vote.user_id, vote.estimate);
    }

    fn apply_start_timer(&mut self, at: Timestamp) {
        if !matches!(self.phase, Phase::Active | Phase::TimerRunning) {
            debug!(phase = %self.phase, "session: start_timer ignored");
            return;
        }
        self.timer.start(at);
        let next = if self.timer.expired(self.clock.now_ms()) { Phase::RoundClosed } else { Phase::TimerRunning };
        self.transition(next);
        self.emit();
    }

    /// `skip` (no value) or `estimate` (finalized value) ends the round.
    fn end_round(&mut self, finalized: Option<Estimate>) {
        self.votes.clear();
        self.timer.clear();
        self.final_estimate = finalized;
        self.transition(Phase::AwaitingInit);
        self.emit();
    }

    // =========================================================================
    // LOCAL CLOCK
    // =========================================================================

    /// Display tick. Refreshes the countdown and closes the round at the deadline.
    pub fn tick(&mut self) {
        if self.phase != Phase::TimerRunning {
            return;
        }
        self.emit();
    }

    /// Close the round if the shared deadline has passed. Returns whether it did.
    fn reconcile(&mut self) -> bool {
        if self.phase == Phase::TimerRunning && self.timer.expired(self.clock.now_ms()) {
            self.transition(Phase::RoundClosed);
            return true;
        }
        false
    }

    /// `reconcile`, notifying the observer when the phase moved.
    fn sync_deadline(&mut self) {
        if self.reconcile() {
            self.emit();
        }
    }

    // =========================================================================
    // HOST ACTIONS
    // =========================================================================

    /// Vote `value` for the local user.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` after termination, `Forbidden` outside the voting
    /// phases, `InvalidEstimate` for values outside the scale.
    pub fn cast_vote(&mut self, value: Estimate) -> Result<Vec<ClientMessage>, SessionError> {
        self.sync_deadline();
        self.ensure_live()?;
        if !self.phase.accepts_votes() {
            return Err(self.reject(SessionError::Forbidden { action: "vote", reason: "voting is not open" }));
        }
        if !self.config.estimation_scale.contains(value) {
            return Err(self.reject(SessionError::InvalidEstimate(value)));
        }
        if self.votes.get(self.self_id) == Some(value) {
            return Ok(Vec::new());
        }
        self.votes.upsert(self.self_id, value);
        self.emit();
        Ok(vec![ClientMessage::Vote { estimate: value }])
    }

    /// Ask the authority to anchor the countdown.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-coordinators and outside `Active`/`TimerRunning`.
    pub fn start_countdown(&mut self) -> Result<Vec<ClientMessage>, SessionError> {
        self.sync_deadline();
        self.ensure_coordinator("start_timer")?;
        if !matches!(self.phase, Phase::Active | Phase::TimerRunning) {
            return Err(self.reject(SessionError::Forbidden { action: "start_timer", reason: "round is not open" }));
        }
        Ok(vec![ClientMessage::StartTimer])
    }

    /// Ask the authority to abandon the current ticket.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-coordinators and when no round is in progress.
    pub fn skip(&mut self) -> Result<Vec<ClientMessage>, SessionError> {
        self.sync_deadline();
        self.ensure_coordinator("skip")?;
        self.ensure_round("skip")?;
        Ok(vec![ClientMessage::Skip])
    }

    /// Ask the authority to finalize the current ticket with `value`.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-coordinators and when no round is in progress,
    /// `InvalidEstimate` for values outside the scale.
    pub fn submit_final_estimate(&mut self, value: Estimate) -> Result<Vec<ClientMessage>, SessionError> {
        self.sync_deadline();
        self.ensure_coordinator("estimate")?;
        self.ensure_round("estimate")?;
        if !self.config.estimation_scale.contains(value) {
            return Err(self.reject(SessionError::InvalidEstimate(value)));
        }
        Ok(vec![ClientMessage::Estimate { estimate: value }])
    }

    /// Ask the authority for a fresh `initialise_game`.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` after termination, `Forbidden` before the transport is open.
    pub fn request_init(&mut self) -> Result<Vec<ClientMessage>, SessionError> {
        self.sync_deadline();
        self.ensure_live()?;
        if self.phase == Phase::Connecting {
            return Err(self.reject(SessionError::Forbidden {
                action: "initialise_game",
                reason: "not connected yet",
            }));
        }
        Ok(vec![ClientMessage::InitialiseGame])
    }

    /// Local close. Terminates without reporting an error.
    pub fn close(&mut self) {
        if self.phase == Phase::Terminated {
            return;
        }
        self.transition(Phase::Terminated);
        self.emit();
    }

    fn ensure_live(&mut self) -> Result<(), SessionError> {
        if self.phase == Phase::Terminated {
            return Err(self.reject(SessionError::ConnectionClosed));
        }
        Ok(())
    }

    fn ensure_coordinator(&mut self, action: &'static str) -> Result<(), SessionError> {
        self.ensure_live()?;
        if !self.is_coordinator() {
            return Err(self.reject(SessionError::Forbidden { action, reason: "coordinator only" }));
        }
        Ok(())
    }

    fn ensure_round(&mut self, action: &'static str) -> Result<(), SessionError> {
        if !matches!(self.phase, Phase::Active | Phase::TimerRunning | Phase::RoundClosed) {
            return Err(self.reject(SessionError::Forbidden { action, reason: "no round in progress" }));
        }
        Ok(())
    }

    // =========================================================================
    // NOTIFICATIONS
    // =========================================================================

    fn transition(&mut self, next: Phase) {
        if self.phase != next {
            info!(session_id = %self.config.session_id, from = %self.phase, to = %next, "session: phase");
            self.phase = next;
        }
    }

    fn emit(&mut self) {
        self.reconcile();
        let snapshot = self.snapshot();
        if let Ok(mut observer) = self.observer.lock() {
            observer.on_snapshot(&snapshot);
        }
    }

    fn report(&mut self, error: &ErrorKind) {
        if let Ok(mut observer) = self.observer.lock() {
            observer.on_error(error);
        }
    }

    fn reject(&mut self, error: SessionError) -> SessionError {
        debug!(session_id = %self.config.session_id, error = %error, "session: local action rejected");
        self.report(&error.kind());
        error
    }
}

#[cfg(test)]
#[path = "machine_test.rs"]
mod tests;
