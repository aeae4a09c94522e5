//! WebSocket gateway: exposes the bus to processes outside the bridge.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming connections and upgrading each to a WebSocket.
//! 3. Running two concurrent forwarding tasks per session:
//!    - **Bus → client**: every published message is sent as a JSON text
//!      frame `{"topic": ..., "payload": ...}`.
//!    - **Client → sensor**: every text frame the client sends is a message
//!      on the `dvl/send_command` topic and is handed to the
//!      [`CommandRelay`].  The frame is either the bare command JSON or the
//!      outbound envelope shape addressed to that topic:
//!
//!      ```text
//!      {"command":"calibrate_gyro"}
//!      {"topic":"dvl/send_command","payload":{"command":"calibrate_gyro"}}
//!      {"topic":"dvl/send_command","payload":"{\"command\":\"calibrate_gyro\"}"}
//!      ```
//! 4. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Back-pressure
//!
//! A slow client never slows the bridge down.  Its broadcast receiver falls
//! behind, and when it lags past the bus capacity the oldest messages are
//! dropped for that client alone.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{CommandRelay, RelayError};
use crate::infrastructure::bus::{ChannelBus, COMMAND_TOPIC};

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `bind_addr` and serves gateway sessions until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_gateway(
    bind_addr: SocketAddr,
    bus: Arc<ChannelBus>,
    relay: CommandRelay,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind bus gateway on {bind_addr}"))?;
    serve(listener, bus, relay, running).await;
    Ok(())
}

/// Runs the accept loop on an already bound listener.
///
/// Split from [`run_gateway`] so callers can bind port 0 and learn the
/// address first.
pub async fn serve(
    listener: TcpListener,
    bus: Arc<ChannelBus>,
    relay: CommandRelay,
    running: Arc<AtomicBool>,
) {
    match listener.local_addr() {
        Ok(addr) => info!("bus gateway listening on ws://{addr}"),
        Err(e) => warn!("bus gateway listening on an unknown address: {e}"),
    }

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping gateway accept loop");
            break;
        }

        // Short timeout so the shutdown flag is noticed even when idle.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let bus = Arc::clone(&bus);
                let relay = relay.clone();
                tokio::spawn(async move {
                    handle_session(stream, peer_addr, bus, relay).await;
                });
            }
            Ok(Err(e)) => error!("gateway accept error: {e}"),
            Err(_) => {}
        }
    }
}

// ── Inbound frames ────────────────────────────────────────────────────────────

/// What a client's text frame carries.
#[derive(Debug, PartialEq)]
enum Inbound<'a> {
    /// Command text for the relay.
    Command(Cow<'a, str>),
    /// An envelope addressed to a topic clients may not publish on.
    OtherTopic(String),
}

#[derive(Deserialize)]
struct Envelope {
    topic: String,
    payload: Value,
}

/// Unwraps a client's text frame.
///
/// Anything that is not an envelope is passed through untouched; the relay
/// decides whether it is a valid command.
fn parse_inbound(text: &str) -> Inbound<'_> {
    let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
        return Inbound::Command(Cow::Borrowed(text));
    };
    if envelope.topic != COMMAND_TOPIC {
        return Inbound::OtherTopic(envelope.topic);
    }
    match envelope.payload {
        // Already command text: forward it exactly as the client wrote it.
        Value::String(command) => Inbound::Command(Cow::Owned(command)),
        other => Inbound::Command(Cow::Owned(other.to_string())),
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    bus: Arc<ChannelBus>,
    relay: CommandRelay,
) {
    let session_id = Uuid::new_v4();
    match run_session(stream, session_id, bus, relay).await {
        Ok(()) => info!(%session_id, %peer_addr, "gateway session closed"),
        Err(e) => warn!(%session_id, %peer_addr, "gateway session closed with error: {e:#}"),
    }
}

async fn run_session(
    stream: TcpStream,
    session_id: Uuid,
    bus: Arc<ChannelBus>,
    relay: CommandRelay,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("session {session_id}: WebSocket handshake failed"))?;
    info!(%session_id, "gateway session established");

    // Subscribe before spawning so nothing published from here on is missed.
    let mut bus_rx = bus.subscribe();
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Task A: bus → client ──────────────────────────────────────────────────
    let mut outbound = tokio::spawn(async move {
        loop {
            let message = match bus_rx.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(missed)) => {
                    warn!(%session_id, missed, "gateway client is falling behind; messages dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!(%session_id, "failed to serialize {} message: {e}", message.topic());
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                debug!(%session_id, "client went away");
                break;
            }
        }
    });

    // ── Task B: client → sensor ───────────────────────────────────────────────
    let mut inbound = tokio::spawn(async move {
        loop {
            let message = match ws_rx.next().await {
                Some(Ok(message)) => message,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => break,
                Some(Err(e)) => {
                    warn!(%session_id, "gateway WebSocket error: {e}");
                    break;
                }
            };

            match message {
                WsMessage::Text(text) => {
                    let command = match parse_inbound(&text) {
                        Inbound::Command(command) => command,
                        Inbound::OtherTopic(topic) => {
                            warn!(%session_id, %topic, "clients may only publish on {COMMAND_TOPIC}; frame ignored");
                            continue;
                        }
                    };
                    debug!(%session_id, topic = COMMAND_TOPIC, "command from gateway client");
                    match relay.relay(&command).await {
                        Ok(()) => {}
                        // Already logged by the relay; one bad command doesn't end the session.
                        Err(RelayError::Invalid(_)) => {}
                        Err(RelayError::Closed) => {
                            warn!(%session_id, "sensor link has shut down; closing session");
                            break;
                        }
                    }
                }
                WsMessage::Binary(_) => {
                    warn!(%session_id, "unexpected binary frame (ignored)");
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever side finishes first ends the session; the other is aborted.
    tokio::select! {
        _ = &mut outbound => debug!(%session_id, "bus forwarder ended"),
        _ = &mut inbound => debug!(%session_id, "command reader ended"),
    }
    outbound.abort();
    inbound.abort();

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::TelemetrySink;
    use tokio_tungstenite::connect_async;

    async fn start_gateway() -> (
        SocketAddr,
        Arc<ChannelBus>,
        tokio::sync::mpsc::Receiver<String>,
        Arc<AtomicBool>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let bus = Arc::new(ChannelBus::default());
        let (relay, mailbox) = CommandRelay::channel(8);
        let running = Arc::new(AtomicBool::new(true));
        tokio::spawn(serve(listener, Arc::clone(&bus), relay, Arc::clone(&running)));
        (addr, bus, mailbox, running)
    }

    /// Waits until the gateway session has subscribed to the bus.
    async fn wait_for_subscriber(bus: &ChannelBus) {
        for _ in 0..200 {
            if bus.subscriber_count() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("gateway session never subscribed");
    }

    #[tokio::test]
    async fn test_client_receives_published_raw_frame() {
        // Arrange
        let (addr, bus, _mailbox, running) = start_gateway().await;
        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        wait_for_subscriber(&bus).await;

        // Act
        bus.publish_raw("{\"type\":\"error\",\"message\":\"x\"}");

        // Assert
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(json["topic"], "dvl/json_data");
        assert_eq!(json["payload"], "{\"type\":\"error\",\"message\":\"x\"}");
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_client_command_reaches_mailbox() {
        // Arrange
        let (addr, _bus, mut mailbox, running) = start_gateway().await;
        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        // Act
        client
            .send(WsMessage::Text(r#"{"command":"trigger_ping"}"#.to_string()))
            .await
            .unwrap();

        // Assert
        let line = timeout(Duration::from_secs(5), mailbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "{\"command\":\"trigger_ping\"}\n");
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_invalid_command_does_not_end_session() {
        // Arrange
        let (addr, _bus, mut mailbox, running) = start_gateway().await;
        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        // Act
        client
            .send(WsMessage::Text(r#"{"foo":1}"#.to_string()))
            .await
            .unwrap();
        client
            .send(WsMessage::Text(r#"{"command":"get_config"}"#.to_string()))
            .await
            .unwrap();

        // Assert: only the valid command was queued
        let line = timeout(Duration::from_secs(5), mailbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "{\"command\":\"get_config\"}\n");
        running.store(false, Ordering::Relaxed);
    }

    #[test]
    fn test_bare_command_passes_through_untouched() {
        let text = r#"{"command":"get_config"}"#;
        assert_eq!(parse_inbound(text), Inbound::Command(Cow::Borrowed(text)));
    }

    #[test]
    fn test_envelope_with_text_payload_is_unwrapped_verbatim() {
        let text = r#"{"topic":"dvl/send_command","payload":"{\"command\": \"trigger_ping\"}"}"#;
        assert_eq!(
            parse_inbound(text),
            Inbound::Command(Cow::Owned(r#"{"command": "trigger_ping"}"#.to_string()))
        );
    }

    #[test]
    fn test_envelope_for_output_topic_is_refused() {
        let text = r#"{"topic":"dvl/estimate","payload":{"x":1}}"#;
        assert_eq!(parse_inbound(text), Inbound::OtherTopic("dvl/estimate".to_string()));
    }

    #[tokio::test]
    async fn test_enveloped_command_reaches_mailbox() {
        // Arrange
        let (addr, _bus, mut mailbox, running) = start_gateway().await;
        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        // Act: one frame for a read-only topic, then a real command envelope
        for frame in [
            r#"{"topic":"dvl/data","payload":{"command":"calibrate_gyro"}}"#,
            r#"{"topic":"dvl/send_command","payload":{"command":"reset_dead_reckoning"}}"#,
        ] {
            client.send(WsMessage::Text(frame.to_string())).await.unwrap();
        }

        // Assert: only the command-topic envelope was relayed
        let line = timeout(Duration::from_secs(5), mailbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "{\"command\":\"reset_dead_reckoning\"}\n");
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        // Arrange: occupy a port
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let (relay, _mailbox) = CommandRelay::channel(1);

        // Act
        let result = run_gateway(
            addr,
            Arc::new(ChannelBus::default()),
            relay,
            Arc::new(AtomicBool::new(true)),
        )
        .await;

        // Assert
        assert!(result.is_err());
    }
}
