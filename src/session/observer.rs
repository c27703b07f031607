//! Host UI observer contract.

use std::sync::{Arc, Mutex};

use super::snapshot::SessionSnapshot;
use crate::error::ErrorKind;

/// Receives state changes from one session. Called on the session's own task.
pub trait SessionObserver: Send {
    fn on_snapshot(&mut self, snapshot: &SessionSnapshot);
    fn on_error(&mut self, error: &ErrorKind);
}

/// One observer shared by a session's loop and its handles.
pub(crate) type SharedObserver = Arc<Mutex<Box<dyn SessionObserver>>>;

/// Observer event, as captured by [`RecordingObserver`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObservedEvent {
    Snapshot(SessionSnapshot),
    Error(ErrorKind),
}

/// Observer that stores every event in a shared buffer.
///
/// Clones share the buffer, so a host can hand one clone to the session and
/// read from another.
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ObservedEvent>>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything recorded so far.
    #[must_use]
    pub fn take(&self) -> Vec<ObservedEvent> {
        self.events.lock().map(|mut events| std::mem::take(&mut *events)).unwrap_or_default()
    }

    /// Most recent snapshot, if any.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<SessionSnapshot> {
        let events = self.events.lock().ok()?;
        events.iter().rev().find_map(|event| match event {
            ObservedEvent::Snapshot(snapshot) => Some(snapshot.clone()),
            ObservedEvent::Error(_) => None,
        })
    }

    /// Every error recorded so far, oldest first.
    #[must_use]
    pub fn errors(&self) -> Vec<ErrorKind> {
        let Ok(events) = self.events.lock() else {
            return Vec::new();
        };
        events
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::Error(error) => Some(error.clone()),
                ObservedEvent::Snapshot(_) => None,
            })
            .collect()
    }

    fn push(&self, event: ObservedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl SessionObserver for RecordingObserver {
    fn on_snapshot(&mut self, snapshot: &SessionSnapshot) {
        self.push(ObservedEvent::Snapshot(snapshot.clone()));
    }

    fn on_error(&mut self, error: &ErrorKind) {
        self.push(ObservedEvent::Error(error.clone()));
    }
}
