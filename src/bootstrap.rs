//! Connection bootstrap.
//!
//! A connection token bundles the service endpoint and the authentication
//! token into one opaque string: base64 (standard alphabet) over
//! `{"url": "wss://...", "token": "..."}`.
//!
//! # Example
//!
//! ```ignore
//! use method_channel::{ConnectionOptions, bootstrap, fiber};
//!
//! fiber::spawn(async move {
//!     let connection = bootstrap::connect(&encoded, ConnectionOptions::default()).await?;
//!     connection.call("ping", vec![]).await
//! });
//! ```

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::connection::{Connection, ConnectionOptions};
use crate::error::{Error, Result};
use crate::fiber;
use crate::transport::WsSocket;

// ============================================================================
// ConnectToken
// ============================================================================

/// Decoded connection token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectToken {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Authentication token sent in the `connect` message.
    #[serde(default)]
    pub token: String,
}

impl ConnectToken {
    /// Creates a token from its parts.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }

    /// Decodes and validates an encoded connection token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the string is not base64, does
    /// not hold the expected JSON object, names a non-WebSocket endpoint or
    /// carries an empty token.
    pub fn decode(encoded: &str) -> Result<Self> {
        let token = Self::decode_unchecked(encoded)?;
        if token.token.is_empty() {
            return Err(Error::invalid_argument(
                "connection token has an empty auth token",
            ));
        }
        Ok(token)
    }

    /// Like [`ConnectToken::decode`], but accepts an empty auth token.
    ///
    /// Trusted channels skip the handshake and need no token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the string is not base64, does
    /// not hold the expected JSON object, or names a non-WebSocket endpoint.
    pub fn decode_trusted(encoded: &str) -> Result<Self> {
        Self::decode_unchecked(encoded)
    }

    fn decode_unchecked(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::invalid_argument(format!("connection token is not base64: {e}")))?;

        let token: Self = serde_json::from_slice(&bytes).map_err(|e| {
            Error::invalid_argument(format!("connection token is not valid JSON: {e}"))
        })?;

        token.endpoint()?;
        Ok(token)
    }

    /// Encodes the token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Parses and checks the endpoint url.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a malformed url or a scheme
    /// other than `ws`/`wss`.
    pub fn endpoint(&self) -> Result<Url> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::invalid_argument(format!("invalid endpoint url: {e}")))?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::invalid_argument(format!(
                "unsupported endpoint scheme: {other}"
            ))),
        }
    }
}

// ============================================================================
// connect
// ============================================================================

/// Decodes `encoded`, opens the WebSocket and, unless
/// `options.auth_required` is off, completes the handshake.
///
/// Must run inside a fiber when authentication is required.
///
/// # Errors
///
/// - [`Error::NotInFiber`] if authentication is required outside a fiber
/// - [`Error::InvalidArgument`] for a bad token, including an empty auth
///   token when authentication is required
/// - [`Error::WebSocket`] if the WebSocket cannot be opened
/// - the errors of [`Connection::authenticate`]
pub async fn connect(encoded: &str, options: ConnectionOptions) -> Result<Connection> {
    if options.auth_required {
        fiber::current()?;
    }

    let token = if options.auth_required {
        ConnectToken::decode(encoded)?
    } else {
        ConnectToken::decode_trusted(encoded)?
    };
    let url = token.endpoint()?;

    debug!(%url, "Opening WebSocket");
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    info!(%url, "WebSocket connection established");

    let connection = WsSocket::open(ws_stream, options);

    if options.auth_required {
        connection.authenticate(&token.token).await?;
    }

    Ok(connection)
}

// ============================================================================
// Tests
// ============================================================================
