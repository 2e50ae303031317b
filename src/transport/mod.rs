//! Transport layer.
//!
//! A [`Connection`](crate::Connection) talks to the remote end through a
//! [`Socket`]: something that is already open, accepts one text payload per
//! `send`, and can be torn down once. Inbound traffic flows the other way,
//! into [`Connection::handle_message`](crate::Connection::handle_message)
//! and [`Connection::handle_socket_close`](crate::Connection::handle_socket_close).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Connection     │         WebSocket            │  Remote         │
//! │                 │◄────────────────────────────►│  service        │
//! │  WsSocket loop  │      text frames (JSON)      │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-process socket that records outbound payloads |
//! | `websocket` | WebSocket socket and event loop |

// ============================================================================
// Submodules
// ============================================================================

/// In-process socket.
pub mod memory;

/// WebSocket socket and event loop.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::MemorySocket;
pub use websocket::WsSocket;

// ============================================================================
// Socket
// ============================================================================

/// Outbound half of an open, message-oriented transport.
///
/// Implementations must not call back into the owning connection from
/// `send` or `close`.
pub trait Socket: Send + Sync {
    /// Sends one complete text payload.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the payload cannot be queued.
    fn send(&self, text: String) -> Result<()>;

    /// Tears the transport down.
    ///
    /// Called at most once by [`Connection`](crate::Connection); its error is
    /// logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns a transport error if teardown fails.
    fn close(&self) -> Result<()>;
}
