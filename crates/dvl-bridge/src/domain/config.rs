//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is assembled once at startup from defaults, an optional TOML file, and
//! CLI arguments (see `main.rs`), then handed to the supervisor and gateway.

use std::net::SocketAddr;
use std::time::Duration;

use dvl_core::domain::telemetry::DEFAULT_FRAME_ID;
use dvl_core::ConfigParameters;

/// Default sensor address (the DVL's factory static IP).
pub const DEFAULT_SENSOR_HOST: &str = "10.42.0.186";

/// Default sensor TCP port for the JSON protocol.
pub const DEFAULT_SENSOR_PORT: u16 = 16171;

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use dvl_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.sensor_port, 16171);
/// assert_eq!(cfg.loop_period().as_millis(), 100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Hostname or IP address of the sensor.
    pub sensor_host: String,

    /// TCP port of the sensor's JSON protocol.
    pub sensor_port: u16,

    /// Republish every raw frame verbatim on the raw topic and log it.
    pub log_raw: bool,

    /// Coordinate frame name stamped on every typed output.
    pub frame_id: String,

    /// Frequency of the read→dispatch loop.
    pub loop_rate_hz: f64,

    /// Socket read timeout.  A read that sees no bytes for this long is
    /// treated as a lost connection.
    pub read_timeout: Duration,

    /// Constant delay between connection attempts.
    pub reconnect_backoff: Duration,

    /// How long the configuration handshake waits for a response frame.
    pub handshake_timeout: Duration,

    /// Address the WebSocket bus gateway listens on.
    pub bus_bind_addr: SocketAddr,

    /// Parameters sent in the `set_config` command after every connect.
    pub sensor: ConfigParameters,
}

impl BridgeConfig {
    /// Returns the interval between loop iterations.
    ///
    /// Non-positive or non-finite rates fall back to 10 Hz.
    pub fn loop_period(&self) -> Duration {
        if self.loop_rate_hz.is_finite() && self.loop_rate_hz > 0.0 {
            Duration::from_secs_f64(1.0 / self.loop_rate_hz)
        } else {
            Duration::from_millis(100)
        }
    }

    /// Returns `host:port` for log messages.
    pub fn sensor_endpoint(&self) -> String {
        format!("{}:{}", self.sensor_host, self.sensor_port)
    }
}

impl Default for BridgeConfig {
    /// | Field             | Default              |
    /// |-------------------|----------------------|
    /// | sensor_host       | `10.42.0.186`        |
    /// | sensor_port       | `16171`              |
    /// | log_raw           | `false`              |
    /// | frame_id          | `dvl_link`           |
    /// | loop_rate_hz      | 10                   |
    /// | read_timeout      | 1 second             |
    /// | reconnect_backoff | 1 second             |
    /// | handshake_timeout | 2 seconds            |
    /// | bus_bind_addr     | `127.0.0.1:16180`    |
    fn default() -> Self {
        Self {
            sensor_host: DEFAULT_SENSOR_HOST.to_string(),
            sensor_port: DEFAULT_SENSOR_PORT,
            log_raw: false,
            frame_id: DEFAULT_FRAME_ID.to_string(),
            loop_rate_hz: 10.0,
            read_timeout: Duration::from_secs(1),
            reconnect_backoff: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(2),
            bus_bind_addr: SocketAddr::from(([127, 0, 0, 1], 16180)),
            sensor: ConfigParameters::default(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
