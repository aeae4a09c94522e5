//! DVL bridge entry point.
//!
//! Connects to the DVL, configures it, and runs the read→dispatch loop while
//! a WebSocket gateway exposes the bus to other processes.
//!
//! # Usage
//!
//! ```text
//! dvl-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>          TOML configuration file
//!   --sensor-host <HOST>     DVL hostname or IP [default: 10.42.0.186]
//!   --sensor-port <PORT>     DVL JSON port [default: 16171]
//!   --log-raw <BOOL>         Log and republish every raw frame [default: false]
//!   --bus-bind <ADDR>        Gateway listen address [default: 127.0.0.1:16180]
//!   ...                      see --help for timing and sensor parameters
//! ```
//!
//! # Precedence
//!
//! Command line > environment variable > config file > built-in default.
//!
//! | Variable                        | Flag                            |
//! |---------------------------------|---------------------------------|
//! | `DVL_CONFIG`                    | `--config`                      |
//! | `DVL_SENSOR_HOST`               | `--sensor-host`                 |
//! | `DVL_SENSOR_PORT`               | `--sensor-port`                 |
//! | `DVL_LOG_RAW`                   | `--log-raw`                     |
//! | `DVL_FRAME_ID`                  | `--frame-id`                    |
//! | `DVL_BUS_BIND`                  | `--bus-bind`                    |
//! | `DVL_LOOP_RATE_HZ`              | `--loop-rate-hz`                |
//! | `DVL_READ_TIMEOUT_MS`           | `--read-timeout-ms`             |
//! | `DVL_RECONNECT_BACKOFF_MS`      | `--reconnect-backoff-ms`        |
//! | `DVL_HANDSHAKE_TIMEOUT_MS`      | `--handshake-timeout-ms`        |
//! | `DVL_SPEED_OF_SOUND`            | `--speed-of-sound`              |
//! | `DVL_ACOUSTIC_ENABLED`          | `--acoustic-enabled`            |
//! | `DVL_DARK_MODE_ENABLED`         | `--dark-mode-enabled`           |
//! | `DVL_MOUNTING_ROTATION_OFFSET`  | `--mounting-rotation-offset`    |
//! | `DVL_RANGE_MODE`                | `--range-mode`                  |
//! | `DVL_PERIODIC_CYCLING_ENABLED`  | `--periodic-cycling-enabled`    |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dvl_bridge::application::{CommandRelay, COMMAND_MAILBOX_CAPACITY};
use dvl_bridge::domain::BridgeConfig;
use dvl_bridge::infrastructure::config_file::{load_config, FileConfig};
use dvl_bridge::infrastructure::{run_gateway, ChannelBus, Supervisor, TcpConnector};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Bridge between a DVL and a publish/subscribe bus.
///
/// Every option is optional: anything not given falls back to the
/// environment, then the config file, then the built-in default.
#[derive(Debug, Default, Parser)]
#[command(
    name = "dvl-bridge",
    about = "Relays DVL telemetry to a pub/sub bus and bus commands to the DVL",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "DVL_CONFIG")]
    config: Option<PathBuf>,

    /// Hostname or IP address of the DVL.
    #[arg(long, env = "DVL_SENSOR_HOST")]
    sensor_host: Option<String>,

    /// TCP port of the DVL's JSON protocol.
    #[arg(long, env = "DVL_SENSOR_PORT")]
    sensor_port: Option<u16>,

    /// Log every raw frame and republish it on `dvl/json_data`.
    #[arg(long, env = "DVL_LOG_RAW")]
    log_raw: Option<bool>,

    /// Coordinate frame name stamped on published messages.
    #[arg(long, env = "DVL_FRAME_ID")]
    frame_id: Option<String>,

    /// Address the WebSocket bus gateway listens on.
    #[arg(long, env = "DVL_BUS_BIND")]
    bus_bind: Option<SocketAddr>,

    /// Read→dispatch loop frequency.
    #[arg(long, env = "DVL_LOOP_RATE_HZ")]
    loop_rate_hz: Option<f64>,

    /// Silence on the socket for this long counts as a lost connection.
    #[arg(long, env = "DVL_READ_TIMEOUT_MS")]
    read_timeout_ms: Option<u64>,

    /// Delay between connection attempts.
    #[arg(long, env = "DVL_RECONNECT_BACKOFF_MS")]
    reconnect_backoff_ms: Option<u64>,

    /// How long to wait for the configuration response after connecting.
    #[arg(long, env = "DVL_HANDSHAKE_TIMEOUT_MS")]
    handshake_timeout_ms: Option<u64>,

    /// Speed of sound in water (m/s).
    #[arg(long, env = "DVL_SPEED_OF_SOUND")]
    speed_of_sound: Option<f64>,

    #[arg(long, env = "DVL_ACOUSTIC_ENABLED")]
    acoustic_enabled: Option<bool>,

    #[arg(long, env = "DVL_DARK_MODE_ENABLED")]
    dark_mode_enabled: Option<bool>,

    /// Mounting rotation offset (degrees).
    #[arg(long, env = "DVL_MOUNTING_ROTATION_OFFSET", allow_negative_numbers = true)]
    mounting_rotation_offset: Option<f64>,

    /// `auto` or a fixed range-mode expression such as `1<=3`.
    #[arg(long, env = "DVL_RANGE_MODE")]
    range_mode: Option<String>,

    #[arg(long, env = "DVL_PERIODIC_CYCLING_ENABLED")]
    periodic_cycling_enabled: Option<bool>,
}

impl Cli {
    /// Builds the final [`BridgeConfig`]: defaults, then `file`, then the
    /// command line (which already includes environment overrides).
    fn into_bridge_config(self, file: Option<FileConfig>) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        if let Some(file) = file {
            file.apply(&mut config);
        }

        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        set(&mut config.sensor_host, self.sensor_host);
        set(&mut config.sensor_port, self.sensor_port);
        set(&mut config.log_raw, self.log_raw);
        set(&mut config.frame_id, self.frame_id);
        set(&mut config.bus_bind_addr, self.bus_bind);
        set(&mut config.loop_rate_hz, self.loop_rate_hz);
        set(&mut config.read_timeout, self.read_timeout_ms.map(Duration::from_millis));
        set(
            &mut config.reconnect_backoff,
            self.reconnect_backoff_ms.map(Duration::from_millis),
        );
        set(
            &mut config.handshake_timeout,
            self.handshake_timeout_ms.map(Duration::from_millis),
        );

        let params = &mut config.sensor;
        set(&mut params.speed_of_sound, self.speed_of_sound);
        set(&mut params.acoustic_enabled, self.acoustic_enabled);
        set(&mut params.dark_mode_enabled, self.dark_mode_enabled);
        set(&mut params.mounting_rotation_offset, self.mounting_rotation_offset);
        set(&mut params.range_mode, self.range_mode);
        set(&mut params.periodic_cycling_enabled, self.periodic_cycling_enabled);

        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` controls verbosity; default to `info`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => Some(
            load_config(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
        ),
        None => None,
    };
    let config = cli.into_bridge_config(file);

    info!(
        "DVL bridge starting: sensor={}, bus gateway=ws://{}",
        config.sensor_endpoint(),
        config.bus_bind_addr
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Bus, gateway and supervisor ────────────────────────────────────────────
    let bus = Arc::new(ChannelBus::default());
    let (relay, mailbox) = CommandRelay::channel(COMMAND_MAILBOX_CAPACITY);

    let mut gateway = tokio::spawn(run_gateway(
        config.bus_bind_addr,
        Arc::clone(&bus),
        relay,
        Arc::clone(&running),
    ));

    let connector = TcpConnector::new(config.sensor_host.clone(), config.sensor_port);
    let mut supervisor = Supervisor::new(&config, connector, bus, mailbox);

    // The supervisor loop never returns on its own; it ends when the shutdown
    // flag is cleared or the gateway fails to start.
    let outcome: anyhow::Result<()> = tokio::select! {
        _ = supervisor.run() => Ok(()),
        _ = wait_for_shutdown(&running) => Ok(()),
        joined = &mut gateway => match joined {
            Ok(result) => result,
            Err(e) => Err(e).context("bus gateway task panicked"),
        },
    };

    running.store(false, Ordering::Relaxed);
    supervisor.close().await;

    outcome?;
    info!("DVL bridge stopped");
    Ok(())
}

/// Resolves once `running` has been cleared.
async fn wait_for_shutdown(running: &AtomicBool) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
