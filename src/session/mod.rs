//! Session state machine, host-facing views and the event loop that drives them.

pub mod machine;
pub mod observer;
pub mod runner;
pub mod snapshot;

pub use machine::SessionMachine;
pub use observer::{ObservedEvent, RecordingObserver, SessionObserver};
pub use runner::{SessionHandle, spawn_session};
pub use snapshot::{Phase, SessionSnapshot, VoteView};
