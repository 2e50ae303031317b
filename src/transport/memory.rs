//! In-process socket.
//!
//! [`MemorySocket`] keeps every outbound payload in memory instead of
//! writing it anywhere. Pair it with
//! [`Connection::handle_message`](crate::Connection::handle_message) to play
//! the remote end in tests and benchmarks.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Error, Result};

use super::Socket;

// ============================================================================
// MemorySocket
// ============================================================================

/// Socket that records outbound payloads.
#[derive(Debug, Default)]
pub struct MemorySocket {
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    fail_sends: AtomicBool,
}

impl MemorySocket {
    /// Creates an open socket with nothing sent.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every payload sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Returns the sent payloads parsed as JSON, and forgets them.
    ///
    /// Payloads that are not valid JSON come back as [`Value::Null`].
    pub fn take_sent(&self) -> Vec<Value> {
        std::mem::take(&mut *self.sent.lock())
            .iter()
            .map(|text| serde_json::from_str(text).unwrap_or(Value::Null))
            .collect()
    }

    /// Returns the number of payloads sent so far.
    #[inline]
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Returns `true` once [`Socket::close`] has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Makes subsequent sends fail with a transport error.
    #[inline]
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Release);
    }
}

impl Socket for MemorySocket {
    fn send(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::transport("socket is closed"));
        }
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(Error::transport("send rejected"));
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::transport("socket already closed"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_records_sends() {
        let socket = MemorySocket::new();
        socket.send(r#"{"a":1}"#.to_string()).expect("send");
        socket.send("garbage".to_string()).expect("send");

        assert_eq!(socket.sent_count(), 2);
        assert_eq!(socket.take_sent(), vec![json!({"a": 1}), Value::Null]);
        assert_eq!(socket.sent_count(), 0);
    }

    #[test]
    fn test_send_after_close_fails() {
        let socket = MemorySocket::new();
        socket.close().expect("close");
        assert!(socket.is_closed());
        assert!(socket.send("x".to_string()).is_err());
        assert!(socket.close().is_err());
    }

    #[test]
    fn test_fail_sends() {
        let socket = MemorySocket::new();
        socket.set_fail_sends(true);
        assert!(matches!(
            socket.send("x".to_string()),
            Err(Error::Transport { .. })
        ));
        socket.set_fail_sends(false);
        assert!(socket.send("x".to_string()).is_ok());
    }
}
