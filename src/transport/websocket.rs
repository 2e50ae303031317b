//! WebSocket socket and event loop.
//!
//! # Event Loop
//!
//! [`WsSocket::open`] spawns a tokio task that owns the WebSocket stream and
//! handles:
//!
//! - Incoming text frames, forwarded to [`Connection::handle_message`]
//! - Outgoing payloads queued by [`Socket::send`]
//! - Close frames, stream errors and end-of-stream, forwarded once to
//!   [`Connection::handle_socket_close`]
//! - Teardown requested through [`Socket::close`]
//!
//! The task holds only a [`WeakConnection`]; once every [`Connection`] clone
//! is dropped, the command channel closes and the task shuts the stream down.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::connection::{Connection, ConnectionOptions, WeakConnection};
use crate::error::{Error, Result};

use super::Socket;

// ============================================================================
// Constants
// ============================================================================

/// Close code reported when the peer's close frame carries no status.
const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the stream ends without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
#[derive(Debug)]
enum SocketCommand {
    /// Send one text frame.
    Send(String),
    /// Close the stream and stop.
    Shutdown,
}

// ============================================================================
// WsSocket
// ============================================================================

/// [`Socket`] backed by a WebSocket stream.
///
/// Sends never block: payloads are queued to the event loop.
#[derive(Debug)]
pub struct WsSocket {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl WsSocket {
    /// Wraps an open WebSocket stream in a [`Connection`].
    ///
    /// Spawns the event loop task internally, so this must be called from
    /// within a tokio runtime.
    pub fn open<S>(ws_stream: WebSocketStream<S>, options: ConnectionOptions) -> Connection
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let connection = Connection::new(Arc::new(Self { command_tx }), options);

        tokio::spawn(run_event_loop(
            ws_stream,
            command_rx,
            connection.downgrade(),
        ));

        connection
    }

    fn enqueue(&self, command: SocketCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::transport("websocket event loop has stopped"))
    }
}

impl Socket for WsSocket {
    fn send(&self, text: String) -> Result<()> {
        self.enqueue(SocketCommand::Send(text))
    }

    fn close(&self) -> Result<()> {
        self.enqueue(SocketCommand::Shutdown)
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that handles WebSocket I/O.
async fn run_event_loop<S>(
    ws_stream: WebSocketStream<S>,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    connection: WeakConnection,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();

    let closed: Option<(u16, String)> = loop {
        tokio::select! {
            // Incoming frames from the remote end
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let Some(connection) = connection.upgrade() else {
                            debug!("Connection dropped, stopping event loop");
                            let _ = ws_write.close().await;
                            break None;
                        };
                        trace!(len = text.len(), "Frame received");
                        connection.handle_message(text.as_str());
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "WebSocket closed by remote");
                        break Some(match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
                            None => (CLOSE_NO_STATUS, String::new()),
                        });
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        break Some((CLOSE_ABNORMAL, e.to_string()));
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break Some((CLOSE_ABNORMAL, "stream ended".to_string()));
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Commands from the connection
            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Send(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "Failed to send frame");
                            break Some((CLOSE_ABNORMAL, e.to_string()));
                        }
                    }

                    Some(SocketCommand::Shutdown) => {
                        debug!("Shutdown command received");
                        if let Err(e) = ws_write.close().await {
                            debug!(error = %e, "WebSocket close failed");
                        }
                        break None;
                    }

                    None => {
                        debug!("Command channel closed");
                        let _ = ws_write.close().await;
                        break None;
                    }
                }
            }
        }
    };

    if let Some((code, reason)) = closed
        && let Some(connection) = connection.upgrade()
    {
        connection.handle_socket_close(code, &reason);
    }

    debug!("Event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_loop_stopped() {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        drop(command_rx);

        let socket = WsSocket { command_tx };
        assert!(matches!(
            socket.send("x".to_string()),
            Err(Error::Transport { .. })
        ));
        assert!(socket.close().is_err());
    }

    #[test]
    fn test_commands_are_queued_in_order() {
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let socket = WsSocket { command_tx };

        socket.send("a".to_string()).expect("send");
        socket.close().expect("close");

        assert!(matches!(command_rx.try_recv(), Ok(SocketCommand::Send(text)) if text == "a"));
        assert!(matches!(command_rx.try_recv(), Ok(SocketCommand::Shutdown)));
    }
}
