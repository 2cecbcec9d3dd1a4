use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Reconnect-ready in-memory registry for active chat/run streams.
///
/// Grounded on `examples/original_source/backend/services/stream_registry.py`:
/// a run/chat id is registered when its stream opens and unregistered when
/// it closes (success, error, or client disconnect), so a later reconnect
/// probe can tell a client whether the stream it lost is still live.
pub struct StreamRegistry {
    records: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, id: &str) {
        self.records
            .write()
            .expect("stream registry lock poisoned")
            .insert(id.to_string(), Utc::now());
    }

    pub fn unregister(&self, id: &str) {
        self.records
            .write()
            .expect("stream registry lock poisoned")
            .remove(id);
    }

    pub fn has_active_stream(&self, id: &str) -> bool {
        self.records
            .read()
            .expect("stream registry lock poisoned")
            .contains_key(id)
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_unregister_clears_entry() {
        let registry = StreamRegistry::new();
        registry.register("chat-1");
        assert!(registry.has_active_stream("chat-1"));
        registry.unregister("chat-1");
        assert!(!registry.has_active_stream("chat-1"));
    }

    #[test]
    fn unknown_id_is_not_active() {
        let registry = StreamRegistry::new();
        assert!(!registry.has_active_stream("missing"));
    }
}
