//! varsend-viewer - receiver for var_send debug dumps.
//!
//! A PHP process calls `var_send(...)`, which opens a TCP connection and
//! writes one length-prefixed text dump. This crate accepts those
//! connections, reassembles the frames and parses each dump into typed
//! variable records for display or storage.
//!
//! # Architecture
//!
//! - **Listener** ([`server::ViewerServer`]) - accept loop, one task per connection
//! - **Connection Handler** ([`server::ConnectionHandler`]) - frame → parse → deliver
//! - **Frame Reader** ([`protocol::FrameReader`]) - length-prefixed reassembly
//! - **Variable Parser** ([`protocol::parse_variables`]) - text body → records
//! - **Sinks** ([`sink`]) - where parsed messages and errors go
//!
//! # Modules
//!
//! - [`protocol`] - Wire codec and body parser
//! - [`server`] - TCP listener and per-connection handling
//! - [`sink`] - Message and observability hand-off
//! - [`store`] - Bounded in-memory message store
//! - [`status`] - Latest connection error per peer
//! - [`config`] - Configuration loading
//! - [`client`] - Sending dumps to a viewer

pub mod client;
pub mod config;
pub mod constants;
pub mod protocol;
pub mod server;
pub mod sink;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use protocol::{parse_variables, FramingError, VariableRecord};
pub use server::{ConnectionHandler, ConnectionMode, ViewerServer};
pub use sink::{EventSink, MessageSink, ObservabilitySink, ParsedMessage, ViewerEvent};
pub use status::{ConnectionErrorEntry, ConnectionStatus};
pub use store::MessageStore;
