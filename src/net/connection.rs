//! WebSocket relay tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track live client↔upstream relays for the admin API and shutdown drain
//! - Keep the relay gauge current

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct RelayEntry {
    sid: Option<String>,
    upstream: String,
    started: Instant,
}

/// Snapshot of one live relay.
#[derive(Debug, Clone, Serialize)]
pub struct RelaySummary {
    pub id: ConnectionId,
    pub sid: Option<String>,
    pub upstream: String,
    pub age_secs: u64,
}

/// Tracks live WebSocket relays.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    relays: Arc<DashMap<ConnectionId, RelayEntry>>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new relay. Returns a guard that removes it on drop.
    pub fn track(&self, sid: Option<String>, upstream: impl Into<String>) -> ConnectionGuard {
        let id = ConnectionId::new();
        self.relays.insert(
            id,
            RelayEntry {
                sid,
                upstream: upstream.into(),
                started: Instant::now(),
            },
        );
        metrics::set_ws_relays(self.relays.len());
        ConnectionGuard {
            relays: Arc::clone(&self.relays),
            id,
        }
    }

    /// Get current live relay count.
    pub fn active_count(&self) -> usize {
        self.relays.len()
    }

    pub fn snapshot(&self) -> Vec<RelaySummary> {
        self.relays
            .iter()
            .map(|entry| RelaySummary {
                id: *entry.key(),
                sid: entry.sid.clone(),
                upstream: entry.upstream.clone(),
                age_secs: entry.started.elapsed().as_secs(),
            })
            .collect()
    }

    /// Wait until all relays are closed or `timeout` elapses. Returns whether they drained.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active_count() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        true
    }
}

/// Guard that tracks a relay's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    relays: Arc<DashMap<ConnectionId, RelayEntry>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this relay's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.relays.remove(&self.id);
        metrics::set_ws_relays(self.relays.len());
        tracing::trace!(connection_id = %self.id, "Relay closed");
    }
}
