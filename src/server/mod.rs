//! TCP ingestion server.
//!
//! # Architecture
//!
//! ```text
//! PHP process (var_send)               Viewer process
//! ┌──────────────────┐                ┌─────────────────────────────┐
//! │ var_send($x, $y) │── TCP frame ──►│ ViewerServer (accept loop)  │
//! └──────────────────┘                │   └─ task per connection    │
//!                                     │       ConnectionHandler     │
//!                                     │       FrameReader → parser  │
//!                                     └──────────────┬──────────────┘
//!                                                    │ ParsedMessage / error
//!                                                    ▼
//!                                        MessageSink / ObservabilitySink
//! ```

pub mod connection;
pub mod listener;

pub use connection::{ConnectionHandler, ConnectionMode, SequenceCounter};
pub use listener::ViewerServer;
