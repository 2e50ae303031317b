//! Wire message vocabulary.
//!
//! Every payload is one JSON object whose `msg` field names its kind.
//!
//! | `msg` | Direction | Fields |
//! |-------|-----------|--------|
//! | `connect` | out | `token` |
//! | `connected` | in | - |
//! | `failed` | in | `error?` |
//! | `method` | out | `id`, `method`, `params` |
//! | `result` | in | `id`, `result?`, `error?` |
//!
//! Server error values are either a string or an object carrying a string
//! `error` field. Anything else is reported as [`UNKNOWN_ERROR`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CallId;

// ============================================================================
// Constants
// ============================================================================

/// Error text used when the server sends an error value we cannot read.
pub const UNKNOWN_ERROR: &str = "unknown error";

// ============================================================================
// MessageKind
// ============================================================================

/// The five message kinds exchanged over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Client → server handshake request.
    Connect,
    /// Server → client handshake acceptance.
    Connected,
    /// Server → client handshake rejection.
    Failed,
    /// Client → server method invocation.
    Method,
    /// Server → client method outcome.
    Result,
}

impl MessageKind {
    /// Returns the `msg` value for this kind.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Method => "method",
            Self::Result => "result",
        }
    }

    /// Looks up a kind by its `msg` value.
    #[must_use]
    pub fn parse(msg: &str) -> Option<Self> {
        match msg {
            "connect" => Some(Self::Connect),
            "connected" => Some(Self::Connected),
            "failed" => Some(Self::Failed),
            "method" => Some(Self::Method),
            "result" => Some(Self::Result),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// A message sent from client to server.
///
/// # Format
///
/// ```json
/// { "msg": "connect", "token": "..." }
/// { "msg": "method", "id": "1", "method": "name", "params": [1, 2] }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum Outbound<'a> {
    /// Handshake request.
    Connect {
        /// Authentication token.
        token: &'a str,
    },

    /// Method invocation.
    Method {
        /// Correlation id.
        id: CallId,
        /// Remote method name.
        method: &'a str,
        /// Ordered positional parameters.
        params: &'a [Value],
    },
}

impl<'a> Outbound<'a> {
    /// Creates a `connect` message.
    #[inline]
    #[must_use]
    pub fn connect(token: &'a str) -> Self {
        Self::Connect { token }
    }

    /// Creates a `method` message.
    #[inline]
    #[must_use]
    pub fn method(id: CallId, method: &'a str, params: &'a [Value]) -> Self {
        Self::Method { id, method, params }
    }

    /// Returns the kind of this message.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Connect { .. } => MessageKind::Connect,
            Self::Method { .. } => MessageKind::Method,
        }
    }

    /// Encodes the message as one text payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if a parameter cannot be serialized.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Loosely typed view of an inbound payload, before shape validation.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// A validated message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Handshake accepted.
    Connected,

    /// Handshake rejected.
    Failed {
        /// Reason text supplied by the server, if readable.
        reason: Option<String>,
    },

    /// Outcome of a method call.
    Result(ResultMessage),
}

/// Payload of a `result` message.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMessage {
    /// Correlation id, exactly as sent by the server.
    pub id: String,
    /// Result value (`null` when absent).
    pub result: Value,
    /// Error text when the server reported a failure.
    pub error: Option<String>,
}

impl ResultMessage {
    /// Converts the message into the outcome delivered to the caller.
    pub fn into_outcome(self) -> Result<Value> {
        match self.error {
            Some(message) => Err(Error::remote(message)),
            None => Ok(self.result),
        }
    }
}

impl Inbound {
    /// Parses and validates one inbound payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload is not a JSON object, has no
    /// `msg`, names a kind the client never receives, or is a `result`
    /// without a non-empty `id`.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawMessage = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("malformed message: {e}")))?;

        let msg = match raw.msg.as_deref() {
            Some(msg) if !msg.is_empty() => msg,
            _ => return Err(Error::protocol("message has no msg field")),
        };

        match MessageKind::parse(msg) {
            Some(MessageKind::Connected) => Ok(Self::Connected),

            Some(MessageKind::Failed) => Ok(Self::Failed {
                reason: raw.error.as_ref().and_then(error_text),
            }),

            Some(MessageKind::Result) => {
                let id = match raw.id {
                    Some(id) if !id.is_empty() => id,
                    _ => return Err(Error::protocol("result message has no id")),
                };
                let error = raw
                    .error
                    .filter(|value| !value.is_null())
                    .map(|value| error_text(&value).unwrap_or_else(|| UNKNOWN_ERROR.to_string()));

                Ok(Self::Result(ResultMessage {
                    id,
                    result: raw.result.unwrap_or(Value::Null),
                    error,
                }))
            }

            Some(kind @ (MessageKind::Connect | MessageKind::Method)) => Err(Error::protocol(
                format!("unexpected outbound message kind: {kind}"),
            )),

            None => Err(Error::protocol(format!("unknown message kind: {msg}"))),
        }
    }

    /// Returns the kind of this message.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Connected => MessageKind::Connected,
            Self::Failed { .. } => MessageKind::Failed,
            Self::Result(_) => MessageKind::Result,
        }
    }
}

/// Extracts readable error text from a server error value.
fn error_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.as_str(),
        Value::Object(fields) => fields.get("error")?.as_str()?,
        _ => return None,
    };
    (!text.is_empty()).then(|| text.to_string())
}

// ============================================================================
// Tests
// ============================================================================
