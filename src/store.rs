//! Bounded in-memory working set of parsed messages.
//!
//! When the store is full, delivering a new message evicts the oldest one.
//! Memory use is bounded at `capacity` messages no matter how many dumps
//! arrive. Statistics keep counting across evictions and are only reset by
//! [`MessageStore::clear`]. Distinct clients are counted by IP address, up to
//! [`MAX_TRACKED_PEERS`]; past that the count saturates.
//!
//! The store is internally synchronised, so it can be handed to connection
//! tasks directly as a [`MessageSink`].

use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::constants::{DEFAULT_STORE_CAPACITY, MAX_TRACKED_PEERS};
use crate::sink::{MessageSink, ParsedMessage};

/// Snapshot of store statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Messages delivered since start (or last clear), evicted ones included.
    pub message_count: u64,
    /// Body bytes delivered since start (or last clear).
    pub total_bytes: u64,
    /// Distinct peer IP addresses seen, saturating at [`MAX_TRACKED_PEERS`].
    pub client_count: usize,
    /// When counting started.
    pub started_at: DateTime<Local>,
}

#[derive(Debug)]
struct StoreInner {
    messages: VecDeque<ParsedMessage>,
    message_count: u64,
    total_bytes: u64,
    clients: HashSet<IpAddr>,
    started_at: DateTime<Local>,
}

impl StoreInner {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            message_count: 0,
            total_bytes: 0,
            clients: HashSet::new(),
            started_at: Local::now(),
        }
    }
}

/// Fixed-capacity, arrival-ordered message store.
#[derive(Debug)]
pub struct MessageStore {
    inner: Mutex<StoreInner>,
    capacity: usize,
}

impl MessageStore {
    /// Create a store holding at most `capacity` messages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "MessageStore capacity must be > 0");
        Self {
            inner: Mutex::new(StoreInner::new()),
            capacity,
        }
    }

    /// Create a store with [`DEFAULT_STORE_CAPACITY`].
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_STORE_CAPACITY)
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message, evicting the oldest if the store is full.
    pub fn push(&self, message: ParsedMessage) {
        let mut inner = self.lock();
        inner.message_count += 1;
        inner.total_bytes += message.size_bytes as u64;
        if inner.clients.len() < MAX_TRACKED_PEERS {
            inner.clients.insert(message.peer.ip());
        }

        if inner.messages.len() == self.capacity {
            if let Some(evicted) = inner.messages.pop_front() {
                log::debug!("[Store] Evicted message #{}", evicted.id);
            }
        }
        inner.messages.push_back(message);
    }

    /// All retained messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<ParsedMessage> {
        self.lock().messages.iter().cloned().collect()
    }

    /// Look up a retained message by sequence number.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<ParsedMessage> {
        self.lock().messages.iter().find(|m| m.id == id).cloned()
    }

    /// Retained messages whose raw body contains `text`, ignoring case.
    ///
    /// An empty filter matches every message.
    #[must_use]
    pub fn filter(&self, text: &str) -> Vec<ParsedMessage> {
        let needle = text.to_lowercase();
        self.lock()
            .messages
            .iter()
            .filter(|m| needle.is_empty() || m.raw_data.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let inner = self.lock();
        StoreStats {
            message_count: inner.message_count,
            total_bytes: inner.total_bytes,
            client_count: inner.clients.len(),
            started_at: inner.started_at,
        }
    }

    /// Drop all messages and reset statistics.
    pub fn clear(&self) {
        *self.lock() = StoreInner::new();
    }

    /// Number of retained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    /// True if no message is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// Configured maximum number of messages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl MessageSink for MessageStore {
    fn deliver(&self, message: ParsedMessage) {
        self.push(message);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{parse_variables, RawFrame};

    use std::net::SocketAddr;

    fn message_from(id: u64, peer: SocketAddr, body: &str) -> ParsedMessage {
        let frame = RawFrame::new(body.as_bytes(), peer);
        let variables = parse_variables(&frame.text);
        ParsedMessage::new(id, frame, variables)
    }

    fn message(id: u64, port: u16, body: &str) -> ParsedMessage {
        message_from(id, SocketAddr::from(([127, 0, 0, 1], port)), body)
    }

    #[test]
    fn test_push_keeps_arrival_order() {
        let store = MessageStore::new(10);
        store.push(message(2, 1, "b"));
        store.push(message(1, 1, "a"));
        let ids: Vec<u64> = store.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, [2, 1]);
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let store = MessageStore::new(2);
        store.push(message(1, 1, "a"));
        store.push(message(2, 1, "b"));
        store.push(message(3, 1, "c"));

        assert_eq!(store.len(), 2);
        assert!(store.get(1).is_none());
        assert!(store.get(3).is_some());
        // Stats count evicted messages too.
        assert_eq!(store.stats().message_count, 3);
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let store = MessageStore::new(10);
        store.push(message(1, 1, "Value: Hello World"));
        store.push(message(2, 1, "Value: goodbye"));

        let hits = store.filter("hello");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
        assert_eq!(store.filter("").len(), 2);
        assert!(store.filter("missing").is_empty());
    }

    #[test]
    fn test_stats_track_bytes_and_clients() {
        let store = MessageStore::new(10);
        store.push(message_from(1, "10.0.0.1:4000".parse().unwrap(), "abcd"));
        store.push(message_from(2, "10.0.0.1:4001".parse().unwrap(), "ef"));
        store.push(message_from(3, "10.0.0.2:4000".parse().unwrap(), "g"));

        let stats = store.stats();
        assert_eq!(stats.message_count, 3);
        assert_eq!(stats.total_bytes, 7);
        assert_eq!(stats.client_count, 2);
    }

    #[test]
    fn test_client_tracking_is_bounded() {
        let store = MessageStore::new(10);
        // One sender reconnecting from new ephemeral ports is one client.
        for port in 0..50u16 {
            store.push(message(u64::from(port), 40_000 + port, "x"));
        }
        assert_eq!(store.len(), 10);
        assert_eq!(store.stats().client_count, 1);

        for i in 0..(MAX_TRACKED_PEERS as u32 + 100) {
            let peer = SocketAddr::from((std::net::Ipv4Addr::from(0x0a00_0000 + i), 1));
            store.push(message_from(u64::from(i), peer, "x"));
        }
        assert_eq!(store.stats().client_count, MAX_TRACKED_PEERS);
    }

    #[test]
    fn test_default_capacity() {
        let store = MessageStore::with_default_capacity();
        assert_eq!(store.capacity(), DEFAULT_STORE_CAPACITY);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_resets_everything() {
        let store = MessageStore::new(10);
        store.push(message(1, 1, "a"));
        store.clear();

        assert!(store.is_empty());
        let stats = store.stats();
        assert_eq!(stats.message_count, 0);
        assert_eq!(stats.client_count, 0);
    }

    #[test]
    fn test_concurrent_delivery() {
        let store = std::sync::Arc::new(MessageStore::new(1000));
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.deliver(message(t * 50 + i, 1, "x"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn test_zero_capacity_panics() {
        let _ = MessageStore::new(0);
    }
}
