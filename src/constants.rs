//! Application-wide constants for varsend-viewer.
//!
//! Centralizes the protocol bounds and startup defaults so the framing
//! layer, configuration and CLI agree on the same numbers.
//!
//! # Categories
//!
//! - **Network**: Default bind address
//! - **Protocol**: Frame size bounds and read sizes
//! - **Timeouts**: Per-read stall protection
//! - **Store**: In-memory working set size

use std::time::Duration;

// ============================================================================
// Network
// ============================================================================

/// Default address the viewer binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port, matching the `var_send.server_port` default of the sender.
pub const DEFAULT_PORT: u16 = 9001;

// ============================================================================
// Protocol
// ============================================================================

/// Size of the big-endian length prefix that precedes every body.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Hard cap on a declared body length (10 MiB).
///
/// Guards against allocating memory for a corrupt or hostile length prefix.
pub const MAX_BODY_SIZE: u32 = 10 * 1024 * 1024;

/// Upper bound on a single underlying read while assembling a body.
///
/// Implementation convenience only; the peer may deliver any chunking.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Initial buffer reservation for a body.
///
/// The declared length is not trusted for allocation until bytes arrive.
pub const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

// ============================================================================
// Timeouts
// ============================================================================

/// Default window in which a peer must make progress on each read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Back-off after a failed `accept()` before retrying.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// Store
// ============================================================================

/// Default number of parsed messages kept in memory.
pub const DEFAULT_STORE_CAPACITY: usize = 1000;

/// Upper bound on peers tracked for statistics and per-peer error status.
pub const MAX_TRACKED_PEERS: usize = 1024;

/// Number of characters of the first variable shown in a summary preview.
pub const PREVIEW_CHARS: usize = 30;
