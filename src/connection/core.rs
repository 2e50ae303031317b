//! Connection state machine.
//!
//! A [`Connection`] wraps one already-open [`Socket`] and drives the
//! handshake, method dispatch and result demultiplexing over it.
//!
//! # States
//!
//! ```text
//! Fresh ──authenticate──► Authenticating ──connected──► Authenticated
//!   │                          │                              │
//!   └──────────────────────────┴─── failed / close / error ───┴──► Closed
//! ```
//!
//! `Closed` is terminal. There is no reconnect.
//!
//! # Calling Conventions
//!
//! Every call-style operation has a continuation form (`*_with`) that
//! returns as soon as the request is on the wire, and an awaiting form that
//! suspends the calling fiber through [`fiber::suspend`]. Both share the same
//! request construction and correlation path.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::fiber::{self, Continuation};
use crate::identifiers::CallId;
use crate::protocol::{
    GetRealTimeData, Inbound, MetadataAck, MethodRequest, Outbound, ResultMessage, SetMetadata,
};
use crate::transport::Socket;

use super::options::ConnectionOptions;
use super::pending::PendingCalls;

// ============================================================================
// Constants
// ============================================================================

/// Close reason recorded when the client closes without giving one.
const CLIENT_CLOSE_REASON: &str = "closed by client";

// ============================================================================
// Phase
// ============================================================================

/// Lifecycle phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, no handshake attempted.
    Fresh,
    /// `connect` sent, waiting for `connected` or `failed`.
    Authenticating,
    /// Handshake succeeded.
    Authenticated,
    /// Terminal.
    Closed,
}

// ============================================================================
// Types
// ============================================================================

/// Mutable connection state, guarded by one lock.
///
/// Handlers are always invoked after the lock is released, so they may
/// call back into the connection.
struct State {
    phase: Phase,
    /// `None` once closed.
    socket: Option<Arc<dyn Socket>>,
    /// Completion handler of the in-flight handshake.
    auth_handler: Option<Continuation<()>>,
    pending: PendingCalls<Continuation<Value>>,
    close_reason: Option<String>,
}

impl State {
    /// Moves to `Closed` and detaches everything still owed a notification.
    ///
    /// Returns `None` if the connection was already closed.
    fn begin_close(&mut self, reason_text: &str) -> Option<Teardown> {
        if self.phase == Phase::Closed {
            return None;
        }
        self.phase = Phase::Closed;
        self.close_reason = Some(reason_text.to_string());
        Some(Teardown {
            auth_handler: self.auth_handler.take(),
            pending: self.pending.drain(),
            socket: self.socket.take(),
        })
    }
}

/// What a closing connection still has to release or notify.
struct Teardown {
    auth_handler: Option<Continuation<()>>,
    pending: Vec<(CallId, Continuation<Value>)>,
    socket: Option<Arc<dyn Socket>>,
}

struct Inner {
    options: ConnectionOptions,
    state: Mutex<State>,
}

// ============================================================================
// Connection
// ============================================================================

/// One logical session bound to one socket.
///
/// Cheap to clone; clones share the same session.
///
/// # Example
///
/// ```ignore
/// use method_channel::{Connection, ConnectionOptions, fiber};
/// use serde_json::json;
///
/// let connection = Connection::new(socket, ConnectionOptions::default());
///
/// fiber::spawn(async move {
///     connection.authenticate("token").await?;
///     let sum = connection.call("sum", vec![json!(1), json!(2)]).await?;
///     Ok::<_, method_channel::Error>(sum)
/// });
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`Connection`].
///
/// Held by transport event loops so that dropping every [`Connection`]
/// tears the socket down.
#[derive(Clone)]
pub struct WeakConnection {
    inner: Weak<Inner>,
}

impl WeakConnection {
    /// Returns the connection if it is still alive.
    #[inline]
    #[must_use]
    pub fn upgrade(&self) -> Option<Connection> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Connection")
            .field("phase", &state.phase)
            .field("pending", &state.pending.len())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructor & Accessors
// ============================================================================

impl Connection {
    /// Wraps an already-open socket.
    #[must_use]
    pub fn new(socket: Arc<dyn Socket>, options: ConnectionOptions) -> Self {
        debug!(auth_required = options.auth_required, "Connection created");

        Self {
            inner: Arc::new(Inner {
                options,
                state: Mutex::new(State {
                    phase: Phase::Fresh,
                    socket: Some(socket),
                    auth_handler: None,
                    pending: PendingCalls::default(),
                    close_reason: None,
                }),
            }),
        }
    }

    /// Returns a non-owning handle.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the options this connection was created with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> ConnectionOptions {
        self.inner.options
    }

    /// Returns the current lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Returns `true` once the connection is closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }

    /// Returns `true` while a handshake is in flight.
    #[inline]
    #[must_use]
    pub fn is_authenticating(&self) -> bool {
        self.phase() == Phase::Authenticating
    }

    /// Returns `true` after a successful handshake, until close.
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.phase() == Phase::Authenticated
    }

    /// Returns the number of calls awaiting a result.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Returns why the connection closed, or `None` while open.
    #[must_use]
    pub fn close_reason(&self) -> Option<String> {
        self.inner.state.lock().close_reason.clone()
    }
}

// ============================================================================
// Connection - Authentication
// ============================================================================

impl Connection {
    /// Starts the handshake and reports its outcome to `on_done`.
    ///
    /// `on_done` receives `Ok(())` on `connected`, or the close reason if the
    /// handshake fails or the connection closes first.
    ///
    /// # Errors
    ///
    /// Usage errors, returned without sending anything:
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::AlreadyAuthenticated`] after a successful handshake
    /// - [`Error::AuthenticationInProgress`] while a handshake is in flight
    /// - [`Error::InvalidArgument`] if `token` is empty
    pub fn authenticate_with<F>(&self, token: &str, on_done: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.begin_auth(token, Box::new(on_done))
    }

    /// Performs the handshake, suspending the calling fiber until it
    /// completes.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInFiber`] outside of a fiber
    /// - the usage errors of [`Connection::authenticate_with`]
    /// - [`Error::AuthenticationFailed`] if the server rejects the token
    /// - the close reason if the connection closes first
    pub async fn authenticate(&self, token: &str) -> Result<()> {
        fiber::suspend(|resume| self.begin_auth(token, resume)).await
    }

    fn begin_auth(&self, token: &str, handler: Continuation<()>) -> Result<()> {
        let socket = {
            let mut state = self.inner.state.lock();
            match state.phase {
                Phase::Fresh => {}
                Phase::Authenticating => return Err(Error::AuthenticationInProgress),
                Phase::Authenticated => return Err(Error::AlreadyAuthenticated),
                Phase::Closed => return Err(Error::ConnectionClosed),
            }
            if token.is_empty() {
                return Err(Error::invalid_argument("token must be a non-empty string"));
            }
            let socket = state.socket.clone().ok_or(Error::ConnectionClosed)?;
            state.phase = Phase::Authenticating;
            state.auth_handler = Some(handler);
            socket
        };

        debug!("Handshake started");

        if let Err(e) = Outbound::connect(token)
            .to_text()
            .and_then(|payload| socket.send(payload))
        {
            warn!(error = %e, "Failed to send handshake");
            self.close_with(e);
        }

        Ok(())
    }
}

// ============================================================================
// Connection - Method Calls
// ============================================================================

impl Connection {
    /// Invokes `method` and reports its outcome to `on_result`.
    ///
    /// The call is registered before this returns, so `on_result` fires
    /// exactly once when the matching `result` arrives (or, unless disabled
    /// in [`ConnectionOptions`], when the connection closes first).
    ///
    /// # Errors
    ///
    /// Usage errors, returned without sending anything:
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::AuthenticationNotFinished`] while a handshake is in flight
    /// - [`Error::NotAuthenticated`] before a handshake, when one is required
    /// - [`Error::InvalidArgument`] if `method` is empty
    ///
    /// [`Error::Closed`] if the request could not be sent. The connection is
    /// closed with the transport error and `on_result` is dropped uninvoked.
    /// If the connection was closed concurrently and `on_result` already
    /// received the close reason, the call counts as dispatched.
    pub fn call_with<F>(&self, method: &str, params: Vec<Value>, on_result: F) -> Result<CallId>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.begin_call(method, params, Box::new(on_result))
    }

    /// Invokes `method`, suspending the calling fiber until its result
    /// arrives.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInFiber`] outside of a fiber
    /// - the errors of [`Connection::call_with`]
    /// - [`Error::Remote`] if the server reports a failure
    /// - [`Error::Closed`] if the connection closes first
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        fiber::suspend(|resume| self.begin_call(method, params, resume).map(drop)).await
    }

    fn begin_call(
        &self,
        method: &str,
        params: Vec<Value>,
        handler: Continuation<Value>,
    ) -> Result<CallId> {
        let (id, socket) = {
            let mut state = self.inner.state.lock();
            self.ensure_callable(state.phase)?;
            if method.is_empty() {
                return Err(Error::invalid_argument(
                    "method name must be a non-empty string",
                ));
            }
            let socket = state.socket.clone().ok_or(Error::ConnectionClosed)?;
            (state.pending.register(handler), socket)
        };

        let sent = Outbound::method(id, method, &params)
            .to_text()
            .and_then(|payload| socket.send(payload));

        if let Err(e) = sent {
            warn!(%id, method, error = %e, "Failed to send method call");
            // Already drained by a concurrent close, which reported the outcome.
            if self.inner.state.lock().pending.take(id).is_none() {
                return Ok(id);
            }
            let reason = e.to_string();
            self.close_with(e);
            return Err(Error::closed(reason));
        }

        trace!(%id, method, params = params.len(), "Method call sent");
        Ok(id)
    }

    fn ensure_callable(&self, phase: Phase) -> Result<()> {
        match phase {
            Phase::Closed => Err(Error::ConnectionClosed),
            Phase::Authenticating => Err(Error::AuthenticationNotFinished),
            Phase::Fresh if self.inner.options.auth_required => Err(Error::NotAuthenticated),
            Phase::Fresh | Phase::Authenticated => Ok(()),
        }
    }
}

// ============================================================================
// Connection - Typed Requests
// ============================================================================

impl Connection {
    /// Validates and sends a typed request, reporting the decoded result to
    /// `on_result`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] from validation, plus the errors of
    /// [`Connection::call_with`].
    pub fn request_with<R, F>(&self, request: R, on_result: F) -> Result<CallId>
    where
        R: MethodRequest,
        F: FnOnce(Result<R::Output>) + Send + 'static,
    {
        request.validate()?;
        self.begin_call(
            R::METHOD,
            request.into_params(),
            Box::new(move |outcome| on_result(outcome.and_then(decode))),
        )
    }

    /// Validates and sends a typed request, suspending the calling fiber
    /// until the decoded result is available.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] from validation, [`Error::Json`] if the
    /// result does not decode, plus the errors of [`Connection::call`].
    pub async fn request<R: MethodRequest>(&self, request: R) -> Result<R::Output> {
        request.validate()?;
        let value = self.call(R::METHOD, request.into_params()).await?;
        decode(value)
    }

    /// Fetches live data fields.
    ///
    /// # Errors
    ///
    /// See [`Connection::request`].
    pub async fn get_real_time_data(&self, request: GetRealTimeData) -> Result<Value> {
        self.request(request).await
    }

    /// Stores session metadata.
    ///
    /// # Errors
    ///
    /// See [`Connection::request`].
    pub async fn set_metadata(&self, request: SetMetadata) -> Result<Option<MetadataAck>> {
        self.request(request).await
    }
}

/// Decodes a result value into the request's output type.
fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

// ============================================================================
// Connection - Inbound
// ============================================================================

impl Connection {
    /// Processes one inbound text payload.
    ///
    /// Never fails: a protocol violation, a handshake rejection or a
    /// panicking handler closes the connection with the error as reason.
    /// Payloads arriving after close are ignored.
    pub fn handle_message(&self, text: &str) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process_message(text)))
            .unwrap_or_else(|_| Err(Error::protocol("message handler panicked")));

        if let Err(e) = outcome {
            warn!(error = %e, "Closing connection");
            self.close_with(e);
        }
    }

    /// Processes the transport's close notification.
    pub fn handle_socket_close(&self, code: u16, reason: &str) {
        debug!(code, reason, "Socket closed");
        self.close_with(Error::socket_closed(code, reason));
    }

    fn process_message(&self, text: &str) -> Result<()> {
        if self.is_closed() {
            trace!("Ignoring message on closed connection");
            return Ok(());
        }

        match Inbound::parse(text)? {
            Inbound::Connected => self.on_connected(),
            Inbound::Failed { reason } => self.on_failed(reason),
            Inbound::Result(message) => self.on_result(message),
        }
    }

    fn on_connected(&self) -> Result<()> {
        let handler = {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Authenticating {
                return Err(Error::protocol(format!(
                    "unexpected connected message in phase {:?}",
                    state.phase
                )));
            }
            state.phase = Phase::Authenticated;
            state.auth_handler.take()
        };

        info!("Authenticated");

        if let Some(handler) = handler {
            handler(Ok(()));
        }
        Ok(())
    }

    /// Classifies `failed` and closes under the same lock, so a concurrent
    /// close cannot change which error is surfaced.
    fn on_failed(&self, reason: Option<String>) -> Result<()> {
        let (error, teardown) = {
            let mut state = self.inner.state.lock();
            let error = if state.phase == Phase::Authenticating {
                Error::authentication_failed(reason)
            } else {
                Error::protocol(match reason {
                    Some(reason) => format!("unexpected failed message: {reason}"),
                    None => "unexpected failed message".to_string(),
                })
            };
            let teardown = state.begin_close(&error.to_string());
            (error, teardown)
        };

        if let Some(teardown) = teardown {
            warn!(error = %error, "Closing connection");
            self.finish_close(teardown, Some(error));
        }
        Ok(())
    }

    fn on_result(&self, message: ResultMessage) -> Result<()> {
        let handler = CallId::from_wire(&message.id)
            .and_then(|id| self.inner.state.lock().pending.take(id))
            .ok_or_else(|| Error::protocol(format!("method call not found: {}", message.id)))?;

        trace!(id = %message.id, failed = message.error.is_some(), "Dispatching result");

        handler(message.into_outcome());
        Ok(())
    }
}

// ============================================================================
// Connection - Close
// ============================================================================

impl Connection {
    /// Closes the connection.
    ///
    /// Idempotent. A handshake still in flight receives
    /// [`Error::ClosedBeforeAuth`].
    pub fn close(&self) {
        self.shutdown(None);
    }

    /// Closes the connection with `reason`.
    ///
    /// Idempotent. A handshake still in flight receives `reason` itself.
    pub fn close_with(&self, reason: Error) {
        self.shutdown(Some(reason));
    }

    fn shutdown(&self, reason: Option<Error>) {
        let reason_text = close_reason_text(reason.as_ref());
        let teardown = self.inner.state.lock().begin_close(&reason_text);
        if let Some(teardown) = teardown {
            self.finish_close(teardown, reason);
        }
    }

    /// Releases the socket and notifies whoever is still waiting.
    ///
    /// Runs without the state lock held.
    fn finish_close(&self, teardown: Teardown, reason: Option<Error>) {
        let reason_text = close_reason_text(reason.as_ref());
        let Teardown {
            auth_handler,
            pending,
            socket,
        } = teardown;

        debug!(reason = %reason_text, pending = pending.len(), "Connection closed");

        if let Some(socket) = socket
            && let Err(e) = socket.close()
        {
            debug!(error = %e, "Socket teardown failed");
        }

        if let Some(handler) = auth_handler
            && !invoke(handler, Err(reason.unwrap_or(Error::ClosedBeforeAuth)))
        {
            warn!("Handshake handler panicked during close");
        }

        if !self.inner.options.notify_pending_on_close {
            if !pending.is_empty() {
                debug!(count = pending.len(), "Abandoning pending calls");
            }
            return;
        }

        for (id, handler) in pending {
            trace!(%id, "Failing pending call on close");
            if !invoke(handler, Err(Error::closed(reason_text.clone()))) {
                warn!(%id, "Call handler panicked during close");
            }
        }
    }
}

fn close_reason_text(reason: Option<&Error>) -> String {
    reason.map_or_else(|| CLIENT_CLOSE_REASON.to_string(), ToString::to_string)
}

/// Runs `handler`, containing any panic. Returns `false` if it panicked.
fn invoke<T>(handler: Continuation<T>, outcome: Result<T>) -> bool {
    panic::catch_unwind(AssertUnwindSafe(move || handler(outcome))).is_ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::MemorySocket;

    #[test]
    fn test_initial_phase() {
        let connection = Connection::new(Arc::new(MemorySocket::new()), ConnectionOptions::new());
        assert_eq!(connection.phase(), Phase::Fresh);
        assert!(!connection.is_authenticated());
        assert!(connection.close_reason().is_none());
    }

    #[test]
    fn test_ensure_callable() {
        let strict = Connection::new(Arc::new(MemorySocket::new()), ConnectionOptions::new());
        assert!(matches!(
            strict.ensure_callable(Phase::Fresh),
            Err(Error::NotAuthenticated)
        ));
        assert!(strict.ensure_callable(Phase::Authenticated).is_ok());

        let trusted = Connection::new(Arc::new(MemorySocket::new()), ConnectionOptions::trusted());
        assert!(trusted.ensure_callable(Phase::Fresh).is_ok());
        assert!(matches!(
            trusted.ensure_callable(Phase::Authenticating),
            Err(Error::AuthenticationNotFinished)
        ));
        assert!(matches!(
            trusted.ensure_callable(Phase::Closed),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_close_reason_for_client_close() {
        let connection = Connection::new(Arc::new(MemorySocket::new()), ConnectionOptions::new());
        connection.close();
        assert_eq!(connection.close_reason().as_deref(), Some(CLIENT_CLOSE_REASON));
    }

    #[test]
    fn test_begin_close_only_once() {
        let connection = Connection::new(Arc::new(MemorySocket::new()), ConnectionOptions::new());
        let mut state = connection.inner.state.lock();
        assert!(state.begin_close("first").is_some());
        assert!(state.begin_close("second").is_none());
        assert_eq!(state.close_reason.as_deref(), Some("first"));
        assert!(state.socket.is_none());
    }

    #[test]
    fn test_failed_after_close_keeps_reason() {
        let connection = Connection::new(Arc::new(MemorySocket::new()), ConnectionOptions::new());
        connection
            .authenticate_with("secret", |_| {})
            .expect("authenticate");
        connection.close();

        assert!(connection.on_failed(Some("late".to_string())).is_ok());
        assert_eq!(connection.close_reason().as_deref(), Some(CLIENT_CLOSE_REASON));
    }

    #[test]
    fn test_failed_during_handshake_closes_in_place() {
        let connection = Connection::new(Arc::new(MemorySocket::new()), ConnectionOptions::new());
        let (tx, rx) = std::sync::mpsc::channel();
        connection
            .authenticate_with("secret", move |outcome| {
                let _ = tx.send(outcome.map_err(|e| e.to_string()));
            })
            .expect("authenticate");

        assert!(connection.on_failed(None).is_ok());

        assert!(connection.is_closed());
        assert_eq!(
            rx.try_recv().expect("handler ran"),
            Err("authentication failed".to_string())
        );
    }

    #[test]
    fn test_invoke_contains_panic() {
        let quiet: Continuation<()> = Box::new(|_: Result<()>| {});
        let panicking: Continuation<()> = Box::new(|outcome: Result<()>| {
            if outcome.is_ok() {
                panic!("boom");
            }
        });

        assert!(invoke(quiet, Ok(())));
        assert!(!invoke(panicking, Ok(())));
    }

    #[test]
    fn test_weak_connection_upgrade() {
        let connection = Connection::new(Arc::new(MemorySocket::new()), ConnectionOptions::new());
        let weak = connection.downgrade();
        assert!(weak.upgrade().is_some());
        drop(connection);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_debug_output() {
        let connection = Connection::new(Arc::new(MemorySocket::new()), ConnectionOptions::new());
        let debug = format!("{connection:?}");
        assert!(debug.contains("Fresh"));
    }
}
