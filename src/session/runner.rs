//! Session event loop.
//!
//! DESIGN
//! ======
//! `spawn_session` moves a [`SessionMachine`] and its [`Connection`] onto one
//! task and returns a cloneable [`SessionHandle`]. The task `select!`s over
//! three sources:
//! - host commands from the handle (each answered on a oneshot)
//! - inbound transport events
//! - the display tick
//!
//! Every state change happens on this task, so no locking is needed around
//! the machine. Handles keep a share of the observer so commands arriving
//! after the loop ended still surface `ConnectionClosed` through `on_error`.
//!
//! LIFECYCLE
//! =========
//! 1. Open transport (failure → `Terminated` with `TerminalDisconnect`)
//! 2. Send the join request returned by `connected`
//! 3. Loop until `close`, transport loss, or every handle is dropped
//! 4. Resolve the join handle with the final phase

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use frames::{ClientMessage, Estimate};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::machine::SessionMachine;
use super::observer::{SessionObserver, SharedObserver};
use super::snapshot::Phase;
use crate::clock::Clock;
use crate::config::{ClientConfig, ConfigError, Identity, SessionConfig};
use crate::connection::{Connection, ConnectionError, Inbound};
use crate::error::{ErrorKind, SessionError};

// =============================================================================
// COMMANDS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    CastVote(Estimate),
    StartCountdown,
    Skip,
    FinalEstimate(Estimate),
    RequestInit,
    Close,
}

struct Command {
    action: Action,
    reply: oneshot::Sender<Result<(), SessionError>>,
}

/// Host-side handle to a running session. Clones address the same session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    observer: SharedObserver,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle").field("closed", &self.tx.is_closed()).finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// Record and send the local participant's vote.
    ///
    /// # Errors
    ///
    /// See [`SessionMachine::cast_vote`]; `ConnectionClosed` once the session ended.
    pub async fn cast_vote(&self, estimate: Estimate) -> Result<(), SessionError> {
        self.request(Action::CastVote(estimate)).await
    }

    /// # Errors
    ///
    /// `Forbidden` for non-coordinators or outside an open round.
    pub async fn start_countdown(&self) -> Result<(), SessionError> {
        self.request(Action::StartCountdown).await
    }

    /// # Errors
    ///
    /// `Forbidden` for non-coordinators or when no round is in progress.
    pub async fn skip(&self) -> Result<(), SessionError> {
        self.request(Action::Skip).await
    }

    /// # Errors
    ///
    /// `Forbidden` for non-coordinators or when no round is in progress.
    pub async fn submit_final_estimate(&self, estimate: Estimate) -> Result<(), SessionError> {
        self.request(Action::FinalEstimate(estimate)).await
    }

    /// # Errors
    ///
    /// `ConnectionClosed` once the session ended.
    pub async fn request_init(&self) -> Result<(), SessionError> {
        self.request(Action::RequestInit).await
    }

    /// Close the session. No-op once it has ended.
    pub async fn close(&self) {
        let _ = self.request(Action::Close).await;
    }

    async fn request(&self, action: Action) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        let answer = match self.tx.send(Command { action, reply }).await {
            Ok(()) => rx.await.ok(),
            Err(_) => None,
        };
        answer.unwrap_or_else(|| {
            // The loop is gone; nothing else will tell the observer.
            if action != Action::Close {
                self.report_closed();
            }
            Err(SessionError::ConnectionClosed)
        })
    }

    fn report_closed(&self) {
        if let Ok(mut observer) = self.observer.lock() {
            observer.on_error(&ErrorKind::ConnectionClosed);
        }
    }
}

// =============================================================================
// SPAWN
// =============================================================================

/// Start one session on the current tokio runtime.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBaseUrl`] when the session URL cannot be built.
pub fn spawn_session(
    config: SessionConfig,
    identity: &Identity,
    client: &ClientConfig,
    observer: Box<dyn SessionObserver>,
    clock: Arc<dyn Clock>,
) -> Result<(SessionHandle, JoinHandle<Phase>), ConfigError> {
    let url = client.session_url(&config.session_id, &identity.token)?;
    let (tx, rx) = mpsc::channel(client.command_buffer);
    let machine = SessionMachine::new(config, identity, clock, observer);
    let handle = SessionHandle { tx, observer: machine.shared_observer() };
    let task = tokio::spawn(run_session(url, machine, rx, client.tick));
    Ok((handle, task))
}

async fn run_session(
    url: String,
    mut machine: SessionMachine,
    mut commands: mpsc::Receiver<Command>,
    tick: Duration,
) -> Phase {
    let mut conn = match Connection::open(&url).await {
        Ok(conn) => conn,
        Err(error) => {
            warn!(error = %error, "session: transport open failed");
            machine.disconnected(&error.to_string());
            return machine.phase();
        }
    };

    let join = machine.connected();
    if let Err(error) = send_all(&mut conn, &join).await {
        machine.disconnected(&error.to_string());
        conn.close().await;
        return machine.phase();
    }

    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(Command { action, reply }) = command else {
                    info!("session: all handles dropped");
                    machine.close();
                    conn.close().await;
                    break;
                };
                if action == Action::Close {
                    machine.close();
                    conn.close().await;
                    let _ = reply.send(Ok(()));
                    break;
                }
                let result = dispatch(&mut machine, &mut conn, action).await;
                let _ = reply.send(result);
                if machine.phase() == Phase::Terminated {
                    conn.close().await;
                    break;
                }
            }
            event = conn.next() => {
                match event {
                    Some(Inbound::Message(message)) => machine.handle_message(message),
                    Some(Inbound::Malformed(error)) => machine.malformed(&error),
                    Some(Inbound::Disconnected { reason }) => {
                        machine.disconnected(&reason);
                        break;
                    }
                    None => {
                        machine.disconnected("stream ended");
                        break;
                    }
                }
            }
            _ = ticker.tick() => machine.tick(),
        }
    }

    info!(phase = %machine.phase(), "session: loop finished");
    machine.phase()
}

/// Run one host action and send whatever it produced.
async fn dispatch(machine: &mut SessionMachine, conn: &mut Connection, action: Action) -> Result<(), SessionError> {
    let outbound = match action {
        Action::CastVote(estimate) => machine.cast_vote(estimate)?,
        Action::StartCountdown => machine.start_countdown()?,
        Action::Skip => machine.skip()?,
        Action::FinalEstimate(estimate) => machine.submit_final_estimate(estimate)?,
        Action::RequestInit => machine.request_init()?,
        Action::Close => Vec::new(),
    };
    if let Err(error) = send_all(conn, &outbound).await {
        let reason = error.to_string();
        machine.disconnected(&reason);
        return Err(SessionError::TerminalDisconnect(reason));
    }
    Ok(())
}

async fn send_all(conn: &mut Connection, messages: &[ClientMessage]) -> Result<(), ConnectionError> {
    for message in messages {
        conn.send(message).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
