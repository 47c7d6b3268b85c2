//! Concurrent sid → session map.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::context::{Session, SessionInfo};
use crate::classify::ClassifiedRequest;
use crate::observability::metrics;

/// Shared registry of known sessions.
///
/// Guarded independently of the per-session locks: no session lock is taken
/// while a map shard is held.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<DashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the session a request belongs to.
    ///
    /// Without a sid (pre-handshake) a fresh, unregistered session is returned.
    /// With a sid the same instance is returned for every request; an unseen
    /// sid is inserted once.
    pub fn lookup_or_create(&self, req: &ClassifiedRequest) -> Arc<Session> {
        let Some(sid) = &req.sid else {
            return Arc::new(Session::new(req));
        };
        let (session, created) = match self.inner.entry(sid.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => (Arc::clone(entry.insert(Arc::new(Session::new(req))).value()), true),
        };
        if created {
            tracing::debug!(sid = %sid, "Session created from request sid");
            metrics::set_sessions(self.inner.len());
        } else {
            session.lock().merge(req);
        }
        session
    }

    /// Insert a session under the sid announced by its handshake.
    ///
    /// If another request already registered the sid, that instance wins and is
    /// returned so callers never hold two records for one sid.
    pub fn register(&self, sid: &str, session: Arc<Session>) -> Arc<Session> {
        let registered = Arc::clone(
            self.inner
                .entry(sid.to_string())
                .or_insert_with(|| session)
                .value(),
        );
        metrics::set_sessions(self.inner.len());
        registered
    }

    pub fn get(&self, sid: &str) -> Option<Arc<Session>> {
        self.inner.get(sid).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, sid: &str) -> Option<Arc<Session>> {
        let removed = self.inner.remove(sid).map(|(_, session)| session);
        if removed.is_some() {
            tracing::debug!(sid = %sid, "Session evicted");
            metrics::set_sessions(self.inner.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn snapshot(&self) -> Vec<(SessionInfo, Duration)> {
        let sessions: Vec<Arc<Session>> = self.inner.iter().map(|e| Arc::clone(e.value())).collect();
        sessions.iter().map(|s| (s.info(), s.idle_for())).collect()
    }

    /// Remove every session idle for longer than `max_idle`. Returns the number removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, session| session.idle_for() <= max_idle);
        let evicted = before.saturating_sub(self.inner.len());
        if evicted > 0 {
            metrics::set_sessions(self.inner.len());
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::context::tests::classified;

    #[test]
    fn same_sid_resolves_to_same_instance() {
        let registry = SessionRegistry::new();
        let first = registry.lookup_or_create(&classified(
            "/socket.io/?EIO=4&transport=polling&sid=abc123",
            &[("cookie", "a=1")],
        ));
        let second = registry.lookup_or_create(&classified(
            "/socket.io/?EIO=4&transport=websocket&sid=abc123",
            &[("user-agent", "ua")],
        ));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        let info = first.info();
        assert_eq!(info.headers.get("cookie").map(String::as_str), Some("a=1"));
        assert_eq!(info.headers.get("user-agent").map(String::as_str), Some("ua"));
    }

    #[test]
    fn unseen_sid_is_inserted_and_returned() {
        let registry = SessionRegistry::new();
        let created = registry.lookup_or_create(&classified("/socket.io/?EIO=4&transport=polling&sid=fresh", &[]));
        let stored = registry.get("fresh").unwrap();
        assert!(Arc::ptr_eq(&created, &stored));
        assert_eq!(created.sid().as_deref(), Some("fresh"));
    }

    #[test]
    fn requests_without_sid_are_not_registered() {
        let registry = SessionRegistry::new();
        let req = classified("/socket.io/?EIO=4&transport=polling", &[]);
        let a = registry.lookup_or_create(&req);
        let b = registry.lookup_or_create(&req);
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(registry.is_empty());
    }

    #[test]
    fn register_keeps_the_first_record() {
        let registry = SessionRegistry::new();
        let req = classified("/socket.io/?EIO=4&transport=polling", &[]);
        let first = Arc::new(Session::new(&req));
        let second = Arc::new(Session::new(&req));

        let kept = registry.register("abc", Arc::clone(&first));
        assert!(Arc::ptr_eq(&kept, &first));
        let kept = registry.register("abc", second);
        assert!(Arc::ptr_eq(&kept, &first));

        let looked_up = registry.lookup_or_create(&classified("/socket.io/?EIO=4&transport=polling&sid=abc", &[]));
        assert!(Arc::ptr_eq(&looked_up, &first));
    }

    #[test]
    fn evicts_only_idle_sessions() {
        let registry = SessionRegistry::new();
        registry.lookup_or_create(&classified("/socket.io/?EIO=4&transport=polling&sid=old", &[]));
        std::thread::sleep(Duration::from_millis(30));
        registry.lookup_or_create(&classified("/socket.io/?EIO=4&transport=polling&sid=new", &[]));

        assert_eq!(registry.evict_idle(Duration::from_millis(15)), 1);
        assert!(registry.get("old").is_none());
        assert!(registry.get("new").is_some());

        assert!(registry.remove("new").is_some());
        assert!(registry.remove("new").is_none());
    }
}
