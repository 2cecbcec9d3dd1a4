use std::sync::Arc;

use dashmap::DashMap;

use crate::session::PtySession;

/// Process-wide, thread-safe mapping from session-id to PTY session.
///
/// Re-registering a session-id closes and replaces the prior entry —
/// callers never end up with two live subprocesses under the same key.
#[derive(Default)]
pub struct PtyRegistry {
    sessions: DashMap<String, Arc<PtySession>>,
}

impl PtyRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn register(&self, session_id: impl Into<String>, session: Arc<PtySession>) {
        let session_id = session_id.into();
        if let Some((_, previous)) = self.sessions.remove(&session_id) {
            previous.close();
        }
        self.sessions.insert(session_id, session);
    }

    pub fn unregister(&self, session_id: &str) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            session.close();
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<PtySession>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_unregister_leaves_registry_unchanged() {
        let registry = PtyRegistry::new();
        assert!(registry.is_empty());
        registry.unregister("missing");
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_lookup_returns_none() {
        let registry = PtyRegistry::new();
        assert!(registry.get("nope").is_none());
    }
}
