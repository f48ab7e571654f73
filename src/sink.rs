//! Hand-off points between the ingestion pipeline and its consumers.
//!
//! Connection tasks never touch consumer state directly. They hand each
//! parsed message to a [`MessageSink`] and each per-connection failure to an
//! [`ObservabilitySink`]. Both are called concurrently from many tasks and
//! must not block.
//!
//! [`EventSink`] implements both by forwarding [`ViewerEvent`]s over an
//! unbounded channel, the same way socket connections feed the hub loop.

use std::net::SocketAddr;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::constants::PREVIEW_CHARS;
use crate::protocol::{FramingError, RawFrame, VariableRecord};

/// A fully received and parsed dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedMessage {
    /// Process-wide sequence number, assigned when parsing succeeds.
    pub id: u64,
    /// When the body finished arriving.
    pub received_at: DateTime<Local>,
    /// Sending peer.
    pub peer: SocketAddr,
    /// Body size in bytes.
    pub size_bytes: usize,
    /// Decoded body text.
    pub raw_data: String,
    /// Variables recovered from the body, in declaration order.
    pub variables: Vec<VariableRecord>,
}

impl ParsedMessage {
    /// Combine a frame with its parsed variables under the given id.
    pub fn new(id: u64, frame: RawFrame, variables: Vec<VariableRecord>) -> Self {
        Self {
            id,
            received_at: frame.received_at,
            peer: frame.peer,
            size_bytes: frame.size_bytes,
            raw_data: frame.text,
            variables,
        }
    }

    /// Short `type: value` preview of the first variable, or `Empty`.
    pub fn preview(&self) -> String {
        let Some(first) = self.variables.first() else {
            return "Empty".to_string();
        };
        let mut value: String = first.value.chars().take(PREVIEW_CHARS).collect();
        if first.value.chars().count() > PREVIEW_CHARS {
            value.push_str("...");
        }
        format!("{}: {}", first.kind, value)
    }
}

/// Ordered consumer of parsed messages.
pub trait MessageSink: Send + Sync {
    /// Take ownership of a parsed message. Must not block.
    fn deliver(&self, message: ParsedMessage);
}

/// Receiver of per-connection failures.
pub trait ObservabilitySink: Send + Sync {
    /// Record a framing failure for `peer`. Fire-and-forget.
    fn report_connection_error(&self, peer: SocketAddr, error: &FramingError);
}

/// Event emitted by connection tasks toward the viewer loop.
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    /// A dump was received and parsed.
    Message(ParsedMessage),
    /// A connection failed before producing a message.
    ConnectionError {
        /// Peer whose connection failed.
        peer: SocketAddr,
        /// Rendered [`FramingError`].
        error: String,
        /// When the failure was observed.
        at: DateTime<Local>,
    },
}

/// Channel-backed sink forwarding [`ViewerEvent`]s.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<ViewerEvent>,
}

impl EventSink {
    /// Wrap the sending half of the viewer event channel.
    pub fn new(tx: UnboundedSender<ViewerEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: ViewerEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("[Sink] Viewer event channel closed, dropping event");
        }
    }
}

impl MessageSink for EventSink {
    fn deliver(&self, message: ParsedMessage) {
        self.send(ViewerEvent::Message(message));
    }
}

impl ObservabilitySink for EventSink {
    fn report_connection_error(&self, peer: SocketAddr, error: &FramingError) {
        self.send(ViewerEvent::ConnectionError {
            peer,
            error: error.to_string(),
            at: Local::now(),
        });
    }
}
