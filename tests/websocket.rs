//! End-to-end behavior over a loopback WebSocket server.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use method_channel::{ConnectToken, ConnectionOptions, Error, connect, fiber};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Helpers
// ============================================================================

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Binds a loopback listener and returns it with an encoded connection token.
async fn bind(token: &str) -> Result<(TcpListener, String)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let encoded = ConnectToken::new(format!("ws://127.0.0.1:{port}"), token).encode()?;
    Ok((listener, encoded))
}

async fn accept(listener: TcpListener) -> Result<WebSocketStream<TcpStream>> {
    let (stream, _) = listener.accept().await?;
    Ok(tokio_tungstenite::accept_async(stream).await?)
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Result<Value> {
    loop {
        match ws.next().await.context("client went away")?? {
            Message::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
            Message::Close(_) => bail!("client closed"),
            _ => continue,
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) -> Result<()> {
    ws.send(Message::Text(value.to_string().into())).await?;
    Ok(())
}

/// Completes the server side of a successful handshake.
async fn accept_handshake(ws: &mut WebSocketStream<TcpStream>, token: &str) -> Result<()> {
    let connect = next_json(ws).await?;
    assert_eq!(connect, json!({"msg": "connect", "token": token}));
    send_json(ws, json!({"msg": "connected"})).await
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn connect_authenticates_and_calls() -> Result<()> {
    init_tracing();
    let (listener, encoded) = bind("secret").await?;

    let server = tokio::spawn(async move {
        let mut ws = accept(listener).await?;
        accept_handshake(&mut ws, "secret").await?;

        let call = next_json(&mut ws).await?;
        assert_eq!(call["method"], "sum");
        let sum: i64 = call["params"]
            .as_array()
            .context("params")?
            .iter()
            .filter_map(Value::as_i64)
            .sum();
        send_json(&mut ws, json!({"msg": "result", "id": call["id"], "result": sum})).await?;
        anyhow::Ok(())
    });

    let client = fiber::spawn(async move {
        let connection = connect(&encoded, ConnectionOptions::default()).await?;
        assert!(connection.is_authenticated());
        let sum = connection.call("sum", vec![json!(1), json!(2)]).await?;
        connection.close();
        Ok::<_, Error>(sum)
    });

    let sum = timeout(TEST_TIMEOUT, client).await???;
    assert_eq!(sum, json!(3));
    timeout(TEST_TIMEOUT, server).await???;
    Ok(())
}

#[tokio::test]
async fn connect_reports_rejected_token() -> Result<()> {
    init_tracing();
    let (listener, encoded) = bind("wrong").await?;

    let server = tokio::spawn(async move {
        let mut ws = accept(listener).await?;
        next_json(&mut ws).await?;
        send_json(&mut ws, json!({"msg": "failed", "error": "nope"})).await?;
        anyhow::Ok(())
    });

    let client = fiber::spawn(async move { connect(&encoded, ConnectionOptions::default()).await });

    let err = timeout(TEST_TIMEOUT, client)
        .await??
        .expect_err("handshake should be rejected");
    assert!(matches!(err, Error::AuthenticationFailed { .. }));
    assert_eq!(err.to_string(), "authentication failed: nope");

    timeout(TEST_TIMEOUT, server).await???;
    Ok(())
}

#[tokio::test]
async fn server_close_fails_pending_call() -> Result<()> {
    init_tracing();
    let (listener, encoded) = bind("secret").await?;

    let server = tokio::spawn(async move {
        let mut ws = accept(listener).await?;
        accept_handshake(&mut ws, "secret").await?;
        next_json(&mut ws).await?;
        ws.close(None).await?;
        anyhow::Ok(())
    });

    let client = fiber::spawn(async move {
        let connection = connect(&encoded, ConnectionOptions::default()).await?;
        let outcome = connection.call("never", vec![]).await;
        Ok::<_, Error>((connection, outcome))
    });

    let (connection, outcome) = timeout(TEST_TIMEOUT, client).await???;
    let err = outcome.expect_err("call should fail on close");
    assert!(matches!(err, Error::Closed { .. }));
    assert!(err.to_string().contains("socket closed with code"), "{err}");
    assert!(connection.is_closed());

    timeout(TEST_TIMEOUT, server).await???;
    Ok(())
}

#[tokio::test]
async fn trusted_connect_skips_handshake() -> Result<()> {
    init_tracing();
    let (listener, encoded) = bind("").await?;

    let server = tokio::spawn(async move {
        let mut ws = accept(listener).await?;
        let call = next_json(&mut ws).await?;
        if call["msg"] != "method" {
            bail!("expected a method call, got {call}");
        }
        send_json(&mut ws, json!({"msg": "result", "id": call["id"], "result": "pong"})).await?;
        anyhow::Ok(())
    });

    // No fiber needed: nothing here suspends.
    let connection = connect(&encoded, ConnectionOptions::trusted()).await?;
    let (tx, rx) = oneshot::channel();
    connection.call_with("ping", vec![], move |outcome| {
        let _ = tx.send(outcome);
    })?;

    let pong = timeout(TEST_TIMEOUT, rx).await???;
    assert_eq!(pong, json!("pong"));

    timeout(TEST_TIMEOUT, server).await???;
    connection.close();
    Ok(())
}
