//! Method Channel - authenticated method calls over one persistent socket.
//!
//! This library keeps a single bidirectional message channel to a remote
//! service and exposes request/response method calls over it.
//!
//! # Architecture
//!
//! - **Connection**: handshake, method dispatch, result demultiplexing by id
//! - **Fibers**: cooperative tasks that can park until a result arrives
//! - **Transport**: any open text-message socket; WebSocket provided
//!
//! Key design principles:
//!
//! - One handshake per connection, no reconnect (`Closed` is terminal)
//! - Correlation ids are decimal strings from a per-connection counter
//! - Protocol violations close the connection; usage errors never do
//! - Callback and awaiting calls share one request path
//!
//! # Quick Start
//!
//! ```no_run
//! use method_channel::{ConnectionOptions, Result, bootstrap, fiber};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let encoded = std::env::var("CHANNEL_TOKEN").unwrap_or_default();
//!
//!     fiber::run(async {
//!         let connection = bootstrap::connect(&encoded, ConnectionOptions::default()).await?;
//!
//!         // Awaiting form: parks this fiber until the result arrives
//!         let sum = connection.call("sum", vec![json!(1), json!(2)]).await?;
//!         println!("sum = {sum}");
//!
//!         // Continuation form: returns once the request is sent
//!         connection.call_with("log", vec![json!("hello")], |outcome| {
//!             println!("logged: {outcome:?}");
//!         })?;
//!
//!         connection.close();
//!         Ok::<_, method_channel::Error>(())
//!     })
//!     .await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bootstrap`] | Connection token decoding and `connect` |
//! | [`connection`] | [`Connection`] state machine and options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`fiber`] | Cooperative tasks and the suspension bridge |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire messages and typed requests |
//! | [`transport`] | [`Socket`] trait, WebSocket and in-memory sockets |

// ============================================================================
// Modules
// ============================================================================

/// Connection token decoding and `connect`.
pub mod bootstrap;

/// Connection state machine.
///
/// - [`Connection`] - one session over one socket
/// - [`ConnectionOptions`] - behavior switches
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Cooperative tasks.
///
/// Awaiting calls must run inside a fiber started with [`fiber::spawn`] or
/// [`fiber::run`].
pub mod fiber;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire protocol message types.
pub mod protocol;

/// Transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bootstrap
pub use bootstrap::{ConnectToken, connect};

// Connection types
pub use connection::{Connection, ConnectionOptions, Phase, WeakConnection};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, FiberId};

// Protocol types
pub use protocol::{GetRealTimeData, MetadataAck, MethodRequest, SetMetadata};

// Transport types
pub use transport::{MemorySocket, Socket, WsSocket};
