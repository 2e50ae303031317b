//! Wire protocol message types.
//!
//! This module defines the JSON messages exchanged between the client and
//! the remote service, and the typed requests layered on top of `method`.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `connect` | Client → Server | Start the handshake |
//! | `connected` / `failed` | Server → Client | Finish the handshake |
//! | `method` | Client → Server | Invoke a remote method |
//! | `result` | Server → Client | Deliver the outcome, correlated by `id` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Message kinds, encoding and inbound validation |
//! | `request` | Typed method requests |

// ============================================================================
// Submodules
// ============================================================================

/// Message kinds, encoding and inbound validation.
pub mod message;

/// Typed method requests.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{Inbound, MessageKind, Outbound, ResultMessage, UNKNOWN_ERROR};
pub use request::{GetRealTimeData, MetadataAck, MethodRequest, SetMetadata};
