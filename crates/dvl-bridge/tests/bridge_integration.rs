//! Integration tests for the bridge against a fake sensor on loopback TCP.
//!
//! # Purpose
//!
//! These tests run the real [`Supervisor`] with the real [`TcpConnector`],
//! and play the sensor's side of the protocol by hand.  They verify:
//!
//! - The configuration handshake runs after every connect, and telemetry
//!   that arrives while it waits is not published.
//! - Telemetry is decoded and published on the bus.
//! - A sensor that hangs up is redialed and reconfigured.
//! - A sensor that is not up yet is dialed until it is.
//! - Commands relayed from the bus reach the sensor, including commands
//!   submitted while the bridge is reconnecting.
//!
//! # Fake sensor conversation
//!
//! ```text
//! Bridge                                   Fake sensor
//! ──────                                   ───────────
//! connect                    ───────────▶  accept
//! {"command":"set_config",…}\n ─────────▶  read_line
//!                            ◀───────────  {"type":"response","success":true}\n
//!                            ◀───────────  {"type":"position_local",…}\n
//! publish dvl/estimate
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use dvl_bridge::application::CommandRelay;
use dvl_bridge::domain::BridgeConfig;
use dvl_bridge::infrastructure::bus::BusMessage;
use dvl_bridge::infrastructure::{ChannelBus, Supervisor, TcpConnector};

/// Upper bound on any single wait in these tests.
const STEP: Duration = Duration::from_secs(5);

const APPLIED: &str = r#"{"type":"response","response_to":"set_config","success":true}"#;

// ── Fake sensor helpers ───────────────────────────────────────────────────────

type SensorConn = BufReader<TcpStream>;

async fn accept(listener: &TcpListener) -> SensorConn {
    let (stream, _) = timeout(STEP, listener.accept())
        .await
        .expect("bridge never connected")
        .unwrap();
    BufReader::new(stream)
}

async fn read_line(conn: &mut SensorConn) -> String {
    let mut line = String::new();
    timeout(STEP, conn.read_line(&mut line))
        .await
        .expect("bridge sent nothing")
        .unwrap();
    line
}

async fn send(conn: &mut SensorConn, frame: &str) {
    conn.get_mut()
        .write_all(format!("{frame}\n").as_bytes())
        .await
        .unwrap();
}

/// Reads the bridge's `set_config` command and returns it parsed.
async fn expect_set_config(conn: &mut SensorConn) -> serde_json::Value {
    let line = read_line(conn).await;
    let command: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(command["command"], "set_config", "first line must configure the sensor");
    command
}

/// Accepts a connection and completes the configuration handshake.
async fn accept_configured(listener: &TcpListener) -> SensorConn {
    let mut conn = accept(listener).await;
    expect_set_config(&mut conn).await;
    send(&mut conn, APPLIED).await;
    conn
}

fn position(x: f64) -> String {
    format!(
        r#"{{"type":"position_local","ts":1.5,"x":{x},"y":0.5,"z":0.25,"std":0.1,"roll":0.0,"pitch":0.0,"yaw":12.0,"status":0}}"#
    )
}

const VELOCITY: &str = r#"{"type":"velocity","time":3.2,"vx":0.5,"vy":0.0,"vz":-0.1,"fom":0.004,"altitude":2.5,"velocity_valid":true,"status":0,"format":"json_v3.1","transducers":[{"id":0,"velocity":0.1,"distance":2.5,"rssi":-40.0,"nsd":-95.0,"beam_valid":true},{"id":1,"velocity":0.2,"distance":2.6,"rssi":-41.0,"nsd":-95.0,"beam_valid":true},{"id":2,"velocity":0.3,"distance":2.4,"rssi":-42.0,"nsd":-95.0,"beam_valid":true},{"id":3,"velocity":0.4,"distance":2.5,"rssi":-43.0,"nsd":-95.0,"beam_valid":true}]}"#;

// ── Bridge helpers ────────────────────────────────────────────────────────────

fn test_config(port: u16) -> BridgeConfig {
    BridgeConfig {
        sensor_host: "127.0.0.1".to_string(),
        sensor_port: port,
        loop_rate_hz: 100.0,
        read_timeout: Duration::from_secs(3),
        reconnect_backoff: Duration::from_millis(50),
        handshake_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

struct Bridge {
    bus: Arc<ChannelBus>,
    rx: broadcast::Receiver<BusMessage>,
    relay: CommandRelay,
    task: JoinHandle<()>,
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn_bridge(config: BridgeConfig) -> Bridge {
    let bus = Arc::new(ChannelBus::default());
    let rx = bus.subscribe();
    let (relay, mailbox) = CommandRelay::channel(16);
    let sink = Arc::clone(&bus);
    let task = tokio::spawn(async move {
        let connector = TcpConnector::new(config.sensor_host.clone(), config.sensor_port);
        let mut supervisor = Supervisor::new(&config, connector, sink, mailbox);
        supervisor.run().await;
    });
    Bridge {
        bus,
        rx,
        relay,
        task,
    }
}

async fn next_message(rx: &mut broadcast::Receiver<BusMessage>) -> BusMessage {
    timeout(STEP, rx.recv())
        .await
        .expect("nothing published")
        .unwrap()
}

async fn next_estimate_x(rx: &mut broadcast::Receiver<BusMessage>) -> f64 {
    match next_message(rx).await {
        BusMessage::Estimate(estimate) => estimate.x,
        other => panic!("expected a position estimate, got {other:?}"),
    }
}

// ── Handshake and telemetry ───────────────────────────────────────────────────

#[tokio::test]
async fn test_handshake_sends_configured_parameters() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = test_config(listener.local_addr().unwrap().port());
    config.sensor.speed_of_sound = 1500.0;
    config.sensor.range_mode = "1<=3".to_string();
    let _bridge = spawn_bridge(config);

    // Act
    let mut conn = accept(&listener).await;
    let command = expect_set_config(&mut conn).await;

    // Assert
    let parameters = &command["parameters"];
    assert_eq!(parameters["speed_of_sound"], 1500.0);
    assert_eq!(parameters["acoustic_enabled"], true);
    assert_eq!(parameters["dark_mode_enabled"], false);
    assert_eq!(parameters["mounting_rotation_offset"], 0.0);
    assert_eq!(parameters["range_mode"], "1<=3");
    assert_eq!(parameters["periodic_cycling_enabled"], true);
}

#[tokio::test]
async fn test_velocity_is_published_with_four_beams() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut bridge = spawn_bridge(test_config(listener.local_addr().unwrap().port()));
    let mut conn = accept_configured(&listener).await;

    // Act
    send(&mut conn, VELOCITY).await;

    // Assert
    match next_message(&mut bridge.rx).await {
        BusMessage::Velocity(frame) => {
            assert_eq!(frame.header.frame_id, "dvl_link");
            assert_eq!(frame.velocity, [0.5, 0.0, -0.1]);
            assert_eq!(frame.beams.len(), 4);
            assert_eq!(frame.beams[2].distance, 2.4);
        }
        other => panic!("expected velocity, got {other:?}"),
    }
}

#[tokio::test]
async fn test_frames_during_handshake_are_not_published() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut bridge = spawn_bridge(test_config(listener.local_addr().unwrap().port()));
    let mut conn = accept(&listener).await;
    expect_set_config(&mut conn).await;

    // Act: telemetry keeps streaming before the response arrives
    for x in [90.0, 91.0, 92.0, 93.0, 94.0] {
        send(&mut conn, &position(x)).await;
    }
    send(&mut conn, APPLIED).await;
    send(&mut conn, &position(1.0)).await;

    // Assert
    assert_eq!(next_estimate_x(&mut bridge.rx).await, 1.0);
}

#[tokio::test]
async fn test_raw_logging_republishes_every_frame() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = test_config(listener.local_addr().unwrap().port());
    config.log_raw = true;
    let mut bridge = spawn_bridge(config);
    let mut conn = accept_configured(&listener).await;

    // Act
    send(&mut conn, "not json at all").await;
    send(&mut conn, &position(4.0)).await;

    // Assert
    assert_eq!(
        next_message(&mut bridge.rx).await,
        BusMessage::Raw("not json at all".to_string())
    );
    assert_eq!(next_message(&mut bridge.rx).await, BusMessage::Raw(position(4.0)));
    assert_eq!(next_estimate_x(&mut bridge.rx).await, 4.0);
}

// ── Reconnection ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bridge_reconnects_and_reconfigures_after_sensor_hangs_up() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut bridge = spawn_bridge(test_config(listener.local_addr().unwrap().port()));

    // Act: first connection delivers one frame and closes
    let mut first = accept_configured(&listener).await;
    send(&mut first, &position(1.0)).await;
    drop(first);

    // The bridge must come back and configure the sensor again
    let mut second = accept(&listener).await;
    expect_set_config(&mut second).await;
    send(&mut second, APPLIED).await;
    send(&mut second, &position(2.0)).await;

    // Assert
    assert_eq!(next_estimate_x(&mut bridge.rx).await, 1.0);
    assert_eq!(next_estimate_x(&mut bridge.rx).await, 2.0);
}

#[tokio::test]
async fn test_bridge_waits_for_sensor_to_come_up() {
    // Arrange: find a free port, then leave it closed for a while
    let port = {
        let placeholder = TcpListener::bind("127.0.0.1:0").await.unwrap();
        placeholder.local_addr().unwrap().port()
    };
    let mut bridge = spawn_bridge(test_config(port));
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Act: the sensor finally boots
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let mut conn = accept_configured(&listener).await;
    send(&mut conn, &position(3.0)).await;

    // Assert
    assert_eq!(next_estimate_x(&mut bridge.rx).await, 3.0);
}

// ── Command relay ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_relayed_command_reaches_sensor_verbatim() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bridge = spawn_bridge(test_config(listener.local_addr().unwrap().port()));
    let mut conn = accept_configured(&listener).await;

    // Act
    bridge
        .relay
        .relay(r#"{"command":"calibrate_gyro"}"#)
        .await
        .unwrap();

    // Assert
    assert_eq!(read_line(&mut conn).await, "{\"command\":\"calibrate_gyro\"}\n");
}

#[tokio::test]
async fn test_invalid_command_never_reaches_sensor() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bridge = spawn_bridge(test_config(listener.local_addr().unwrap().port()));
    let mut conn = accept_configured(&listener).await;

    // Act
    let rejected = bridge.relay.relay(r#"{"foo":1}"#).await;
    bridge
        .relay
        .relay(r#"{"command":"get_config"}"#)
        .await
        .unwrap();

    // Assert: the sensor's next line is the valid command
    assert!(rejected.is_err());
    assert_eq!(read_line(&mut conn).await, "{\"command\":\"get_config\"}\n");
}

#[tokio::test]
async fn test_commands_during_reconnect_go_to_new_connection() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bridge = spawn_bridge(test_config(listener.local_addr().unwrap().port()));
    let first = accept_configured(&listener).await;
    drop(first);

    // Act: the bridge is back but still waiting for the handshake response
    // when several commands are submitted at once.
    let mut second = accept(&listener).await;
    expect_set_config(&mut second).await;
    let submitters: Vec<_> = ["reset_dead_reckoning", "trigger_ping", "get_config"]
        .into_iter()
        .map(|name| {
            let relay = bridge.relay.clone();
            tokio::spawn(async move {
                relay
                    .relay(&format!(r#"{{"command":"{name}"}}"#))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for submitter in submitters {
        submitter.await.unwrap();
    }
    send(&mut second, APPLIED).await;

    // Assert: every command arrives exactly once, after the handshake
    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(read_line(&mut second).await);
    }
    received.sort();
    assert_eq!(
        received,
        vec![
            "{\"command\":\"get_config\"}\n".to_string(),
            "{\"command\":\"reset_dead_reckoning\"}\n".to_string(),
            "{\"command\":\"trigger_ping\"}\n".to_string(),
        ]
    );
    assert!(!bridge.task.is_finished(), "supervisor must still be running");
    assert_eq!(bridge.bus.subscriber_count(), 1);
}
