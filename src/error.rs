//! Error types for the method channel.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use method_channel::{Connection, Result};
//!
//! async fn example(connection: &Connection) -> Result<()> {
//!     connection.authenticate("token").await?;
//!     let value = connection.call("ping", vec![]).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Closes connection |
//! |----------|----------|-------------------|
//! | Usage | [`Error::NotAuthenticated`], [`Error::AuthenticationNotFinished`], [`Error::AlreadyAuthenticated`], [`Error::AuthenticationInProgress`], [`Error::ConnectionClosed`], [`Error::InvalidArgument`], [`Error::NotInFiber`] | no |
//! | Protocol | [`Error::Protocol`] | always |
//! | Remote | [`Error::AuthenticationFailed`], [`Error::Remote`] | handshake only |
//! | Connection | [`Error::Closed`], [`Error::ClosedBeforeAuth`], [`Error::SocketClosed`], [`Error::Transport`] | - |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Abandoned`] | - |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// A method was called before the handshake was started.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A method was called while the handshake is still in flight.
    #[error("authentication not finished")]
    AuthenticationNotFinished,

    /// `authenticate` was called on an authenticated connection.
    #[error("already authenticated")]
    AlreadyAuthenticated,

    /// `authenticate` was called while another handshake is in flight.
    #[error("authentication already in progress")]
    AuthenticationInProgress,

    /// An operation was attempted on a closed connection.
    #[error("connection is already closed")]
    ConnectionClosed,

    /// Invalid argument supplied by the caller.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// A suspending operation was invoked outside of a fiber.
    #[error("not running inside a fiber")]
    NotInFiber,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The remote end violated the wire protocol.
    ///
    /// Always fatal: the connection is closed with this error as reason.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The server rejected the handshake.
    #[error("authentication failed{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    AuthenticationFailed {
        /// Reason text supplied by the server, if any.
        reason: Option<String>,
    },

    /// The server reported an error for a method call.
    #[error("remote error: {message}")]
    Remote {
        /// Error text supplied by the server.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The connection closed while a call was outstanding.
    #[error("connection closed: {reason}")]
    Closed {
        /// Close reason.
        reason: String,
    },

    /// The connection closed before the handshake completed.
    #[error("closed before auth completed")]
    ClosedBeforeAuth,

    /// The underlying socket reported a close.
    #[error("socket closed with code {code}: {reason}")]
    SocketClosed {
        /// Close code reported by the transport.
        code: u16,
        /// Close reason reported by the transport.
        reason: String,
    },

    /// The transport failed to deliver a payload.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// A parked fiber lost its resumer without being resumed.
    #[error("call abandoned before completion")]
    Abandoned(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an authentication failed error.
    #[inline]
    pub fn authentication_failed(reason: Option<String>) -> Self {
        Self::AuthenticationFailed { reason }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Creates a closed error.
    #[inline]
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
        }
    }

    /// Creates a socket closed error.
    #[inline]
    pub fn socket_closed(code: u16, reason: impl Into<String>) -> Self {
        Self::SocketClosed {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the caller used an operation in the wrong state
    /// or with bad arguments.
    #[inline]
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated
                | Self::AuthenticationNotFinished
                | Self::AlreadyAuthenticated
                | Self::AuthenticationInProgress
                | Self::ConnectionClosed
                | Self::InvalidArgument { .. }
                | Self::NotInFiber
        )
    }

    /// Returns `true` if this is a protocol violation.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if the error was reported by the server.
    #[inline]
    #[must_use]
    pub fn is_remote_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::Remote { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::Closed { .. }
                | Self::ClosedBeforeAuth
                | Self::SocketClosed { .. }
                | Self::Transport { .. }
                | Self::WebSocket(_)
                | Self::Abandoned(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
