use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Handle to one connected session, shared across the server. `tx` feeds
/// the session's writer task; frames queued here never interleave on the
/// wire. `current_group` is which group's traffic the session sees live.
#[derive(Clone)]
pub struct SessionHandle {
    pub tx: mpsc::Sender<String>,
    current_group: Arc<Mutex<String>>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            tx,
            current_group: Arc::new(Mutex::new(charla::DEFAULT_GROUP.to_string())),
        }
    }

    pub fn group(&self) -> String {
        self.current_group
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_group(&self, group: &str) {
        *self
            .current_group
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = group.to_string();
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RenameError {
    /// The new name is already claimed by another session.
    Taken,
    /// The old name is no longer registered.
    Missing,
}

/// Who is online right now, by display name. All compound operations run
/// inside a single critical section so no reader ever observes a session
/// mid-rename (absent under both names, or present under both).
#[derive(Default)]
pub struct Presence {
    online: Mutex<HashMap<String, SessionHandle>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.online.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert-if-absent. Returns false when the name is already online.
    pub fn claim(&self, name: &str, handle: SessionHandle) -> bool {
        let mut online = self.lock();
        if online.contains_key(name) {
            return false;
        }
        online.insert(name.to_string(), handle);
        true
    }

    /// Move a session from `old` to `new` atomically. On failure nothing
    /// changes, so the caller keeps its old identity.
    pub fn rename(&self, old: &str, new: &str) -> Result<(), RenameError> {
        let mut online = self.lock();
        if online.contains_key(new) {
            return Err(RenameError::Taken);
        }
        let handle = online.remove(old).ok_or(RenameError::Missing)?;
        online.insert(new.to_string(), handle);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<SessionHandle> {
        self.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<SessionHandle> {
        self.lock().remove(name)
    }

    pub fn is_online(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn snapshot(&self) -> Vec<(String, SessionHandle)> {
        self.lock()
            .iter()
            .map(|(n, h)| (n.clone(), h.clone()))
            .collect()
    }
}
