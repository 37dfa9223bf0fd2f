use std::collections::HashMap;
use std::sync::Mutex;

/// Pending game invitations, keyed by invitee. An invitee holds at most
/// one pending invite; an inviter may have several outstanding. Entries
/// live until accepted or rejected.
#[derive(Default)]
pub struct InviteTable {
    pending: Mutex<HashMap<String, String>>,
}

impl InviteTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `inviter -> invitee`. Returns false when the invitee
    /// already has a pending invite (from anyone).
    pub fn invite(&self, inviter: &str, invitee: &str) -> bool {
        let mut pending = self.lock();
        if pending.contains_key(invitee) {
            return false;
        }
        pending.insert(invitee.to_string(), inviter.to_string());
        true
    }

    /// Consume the invitee's pending invite, returning the inviter.
    pub fn take(&self, invitee: &str) -> Option<String> {
        self.lock().remove(invitee)
    }

    pub fn pending_for(&self, invitee: &str) -> Option<String> {
        self.lock().get(invitee).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_pending_invite_per_invitee() {
        let t = InviteTable::new();
        assert!(t.invite("ana", "beto"));
        assert!(!t.invite("carla", "beto"));
        assert_eq!(t.pending_for("beto").as_deref(), Some("ana"));
    }

    #[test]
    fn inviter_may_have_several_outstanding() {
        let t = InviteTable::new();
        assert!(t.invite("ana", "beto"));
        assert!(t.invite("ana", "carla"));
    }

    #[test]
    fn take_consumes() {
        let t = InviteTable::new();
        assert!(t.invite("ana", "beto"));
        assert_eq!(t.take("beto").as_deref(), Some("ana"));
        assert_eq!(t.take("beto"), None);
        // Gone, so a new invite is accepted again.
        assert!(t.invite("carla", "beto"));
    }
}
