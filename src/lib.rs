//! Planning-poker session sync engine.
//!
//! DESIGN
//! ======
//! One connected participant's view of one estimation session. The authority
//! owns the canonical state; this crate keeps a local replica consistent with
//! it and turns host actions into wire requests.
//!
//! - `frames` (workspace crate): wire codec
//! - [`connection`]: websocket transport and inbound event stream
//! - [`session`]: state machine, snapshots, observer contract, event loop
//! - [`timer`]: countdown reconciliation against the shared anchor
//! - [`votes`] / [`roster`]: per-round votes and participant list
//! - [`scale`] / [`config`]: estimation decks and session parameters

pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod roster;
pub mod scale;
pub mod session;
pub mod timer;
pub mod votes;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, ConfigError, Identity, SessionConfig};
pub use connection::{Connection, ConnectionError, Inbound};
pub use error::{ErrorKind, SessionError};
pub use roster::{Participant, Roster};
pub use scale::{DeckKind, EstimationScale};
pub use session::{
    Phase, RecordingObserver, SessionHandle, SessionMachine, SessionObserver, SessionSnapshot, VoteView, spawn_session,
};
pub use timer::{TimerReconciler, remaining_secs};
pub use votes::VoteAggregator;
