//! Most recent connection error per peer.
//!
//! Every connection arrives from a fresh ephemeral port, so the per-peer map
//! is bounded: once `capacity` peers are tracked, recording a new peer
//! forgets the one recorded first.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::constants::MAX_TRACKED_PEERS;
use crate::protocol::FramingError;
use crate::sink::ObservabilitySink;

/// A recorded connection failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionErrorEntry {
    /// Peer whose connection failed.
    pub peer: SocketAddr,
    /// Rendered error.
    pub error: String,
    /// When it was reported.
    pub at: DateTime<Local>,
}

#[derive(Debug, Default)]
struct StatusInner {
    by_peer: HashMap<SocketAddr, ConnectionErrorEntry>,
    /// Tracked peers, oldest first.
    order: VecDeque<SocketAddr>,
    last: Option<ConnectionErrorEntry>,
}

/// Observability surface: latest error per peer, plus the latest overall.
#[derive(Debug)]
pub struct ConnectionStatus {
    inner: Mutex<StatusInner>,
    capacity: usize,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED_PEERS)
    }
}

impl ConnectionStatus {
    /// Create an empty status surface tracking up to [`MAX_TRACKED_PEERS`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty status surface tracking at most `capacity` peers.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ConnectionStatus capacity must be > 0");
        Self {
            inner: Mutex::new(StatusInner::default()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an already rendered error.
    pub fn record(&self, peer: SocketAddr, error: String, at: DateTime<Local>) {
        log::warn!("[Conn] {peer}: {error}");
        let entry = ConnectionErrorEntry { peer, error, at };
        let mut inner = self.lock();
        if inner.by_peer.insert(peer, entry.clone()).is_none() {
            inner.order.push_back(peer);
            while inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.by_peer.remove(&oldest);
                }
            }
        }
        inner.last = Some(entry);
    }

    /// Latest error reported for `peer`.
    #[must_use]
    pub fn error_for(&self, peer: SocketAddr) -> Option<ConnectionErrorEntry> {
        self.lock().by_peer.get(&peer).cloned()
    }

    /// Latest error reported for any peer.
    #[must_use]
    pub fn last_error(&self) -> Option<ConnectionErrorEntry> {
        self.lock().last.clone()
    }

    /// Number of peers with a recorded error.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.lock().by_peer.len()
    }

    /// Maximum number of peers tracked.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget all recorded errors.
    pub fn clear(&self) {
        *self.lock() = StatusInner::default();
    }
}

impl ObservabilitySink for ConnectionStatus {
    fn report_connection_error(&self, peer: SocketAddr, error: &FramingError) {
        self.record(peer, error.to_string(), Local::now());
    }
}
