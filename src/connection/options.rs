//! Connection configuration.
//!
//! # Example
//!
//! ```ignore
//! use method_channel::ConnectionOptions;
//!
//! // Loopback channel that needs no handshake, and old close semantics.
//! let options = ConnectionOptions::trusted().with_notify_pending_on_close(false);
//! ```

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Behavior switches for a [`Connection`](crate::Connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Require a successful handshake before method calls.
    ///
    /// When `false` the connection starts effectively pre-authenticated:
    /// calls are accepted unless the connection is closed or a handshake is
    /// in flight.
    pub auth_required: bool,

    /// Deliver [`Error::Closed`](crate::Error::Closed) to every pending call
    /// when the connection closes.
    ///
    /// When `false`, pending continuations are dropped without being
    /// invoked; a fiber parked on such a call then observes
    /// [`Error::Abandoned`](crate::Error::Abandoned).
    pub notify_pending_on_close: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            auth_required: true,
            notify_pending_on_close: true,
        }
    }

    /// Creates options for a trusted channel that skips the handshake.
    #[inline]
    #[must_use]
    pub const fn trusted() -> Self {
        Self {
            auth_required: false,
            ..Self::new()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets whether a handshake is required.
    #[inline]
    #[must_use]
    pub const fn with_auth_required(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }

    /// Sets whether pending calls are failed on close.
    #[inline]
    #[must_use]
    pub const fn with_notify_pending_on_close(mut self, notify: bool) -> Self {
        self.notify_pending_on_close = notify;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::default();
        assert!(options.auth_required);
        assert!(options.notify_pending_on_close);
    }

    #[test]
    fn test_trusted() {
        let options = ConnectionOptions::trusted();
        assert!(!options.auth_required);
        assert!(options.notify_pending_on_close);
    }

    #[test]
    fn test_builder_chaining() {
        let options = ConnectionOptions::new()
            .with_auth_required(false)
            .with_notify_pending_on_close(false);
        assert_eq!(
            options,
            ConnectionOptions {
                auth_required: false,
                notify_pending_on_close: false,
            }
        );
    }
}
