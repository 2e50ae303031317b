//! Connection state machine.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Connection`] | Handshake, dispatch and result demultiplexing |
//! | [`ConnectionOptions`] | Behavior switches |
//! | [`Phase`] | Lifecycle phase |
//! | [`WeakConnection`] | Non-owning handle for transport loops |
//!
//! # Control Flow
//!
//! 1. `call` builds a `method` message with a fresh id
//! 2. The id and its handler go into the pending-call table
//! 3. The message is sent
//! 4. A `result` with that id arrives through `handle_message`
//! 5. The entry is removed and its handler invoked with the outcome

// ============================================================================
// Submodules
// ============================================================================

/// Connection state machine implementation.
pub mod core;

/// Connection configuration.
pub mod options;

/// Pending-call table.
mod pending;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{Connection, Phase, WeakConnection};
pub use options::ConnectionOptions;
