use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::Semaphore;

use crate::session::{Session, SessionId};

/// Lifecycle notifications emitted synchronously with registry add/remove.
#[derive(Clone)]
pub enum SessionEvent {
    Connected(Session),
    Disconnected(SessionId),
}

/// The set of live sessions, capped by a semaphore.
///
/// The registry owns no task; it is shared by the accept loop (add), session
/// cleanup (remove), the liveness monitor (iteration), and the game service
/// (lookup).
pub struct ConnectionRegistry {
    sessions: RwLock<FxHashMap<SessionId, Session>>,
    slots: Arc<Semaphore>,
    events: flume::Sender<SessionEvent>,
}

impl ConnectionRegistry {
    /// `events` receives a message for every successful add and every remove.
    pub fn new(max_connections: usize, events: flume::Sender<SessionEvent>) -> Self {
        Self {
            sessions: RwLock::new(FxHashMap::default()),
            slots: Arc::new(Semaphore::new(max_connections)),
            events,
        }
    }

    /// Reserves a slot and inserts the session. Returns `false`, without
    /// inserting, when the connection cap is reached.
    pub fn try_add(&self, session: Session) -> bool {
        let Ok(permit) = self.slots.clone().try_acquire_owned() else {
            return false;
        };
        // The slot is released by `remove`, not by dropping the permit.
        permit.forget();

        self.sessions.write().insert(session.id(), session.clone());

        let _ = self.events.send(SessionEvent::Connected(session));

        true
    }

    /// Removes the session and releases its slot. A second remove of the same
    /// id is a no-op.
    pub fn remove(&self, id: SessionId) -> Option<Session> {
        let session = self.sessions.write().remove(&id)?;

        self.slots.add_permits(1);
        let _ = self.events.send(SessionEvent::Disconnected(id));

        Some(session)
    }

    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.read().get(&id).cloned()
    }

    /// A point-in-time copy of every live session.
    pub fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Disconnects every session. Used at shutdown; removal happens through
    /// each session's cleanup callback.
    pub fn disconnect_all(&self) {
        for session in self.snapshot() {
            session.disconnect();
        }
    }
}
