//! TOML configuration file.
//!
//! Every key is optional; whatever the file leaves out keeps its default (or
//! the value given on the command line, which always wins).  Example:
//!
//! ```toml
//! [sensor]
//! host = "10.42.0.186"
//! port = 16171
//! log_raw = false
//! frame_id = "dvl_link"
//!
//! [timing]
//! loop_rate_hz = 10.0
//! read_timeout_ms = 1000
//! reconnect_backoff_ms = 1000
//! handshake_timeout_ms = 2000
//!
//! [bus]
//! bind = "127.0.0.1:16180"
//!
//! [dvl]
//! speed_of_sound = 1480.0
//! acoustic_enabled = true
//! dark_mode_enabled = false
//! mounting_rotation_offset = 0.0
//! range_mode = "auto"
//! periodic_cycling_enabled = true
//! ```
//!
//! Unknown keys are rejected so a typo doesn't silently fall back to a
//! default.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::BridgeConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub sensor: SensorSection,
    pub timing: TimingSection,
    pub bus: BusSection,
    pub dvl: DvlSection,
}

/// Where the sensor is and how its frames are labelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_raw: Option<bool>,
    pub frame_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingSection {
    pub loop_rate_hz: Option<f64>,
    pub read_timeout_ms: Option<u64>,
    pub reconnect_backoff_ms: Option<u64>,
    pub handshake_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusSection {
    pub bind: Option<SocketAddr>,
}

/// Parameters pushed to the sensor with `set_config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DvlSection {
    pub speed_of_sound: Option<f64>,
    pub acoustic_enabled: Option<bool>,
    pub dark_mode_enabled: Option<bool>,
    pub mounting_rotation_offset: Option<f64>,
    pub range_mode: Option<String>,
    pub periodic_cycling_enabled: Option<bool>,
}

impl FileConfig {
    /// Overwrites every field of `config` that the file sets.
    pub fn apply(self, config: &mut BridgeConfig) {
        let FileConfig {
            sensor,
            timing,
            bus,
            dvl,
        } = self;

        set(&mut config.sensor_host, sensor.host);
        set(&mut config.sensor_port, sensor.port);
        set(&mut config.log_raw, sensor.log_raw);
        set(&mut config.frame_id, sensor.frame_id);

        set(&mut config.loop_rate_hz, timing.loop_rate_hz);
        set(&mut config.read_timeout, timing.read_timeout_ms.map(Duration::from_millis));
        set(
            &mut config.reconnect_backoff,
            timing.reconnect_backoff_ms.map(Duration::from_millis),
        );
        set(
            &mut config.handshake_timeout,
            timing.handshake_timeout_ms.map(Duration::from_millis),
        );

        set(&mut config.bus_bind_addr, bus.bind);

        let params = &mut config.sensor;
        set(&mut params.speed_of_sound, dvl.speed_of_sound);
        set(&mut params.acoustic_enabled, dvl.acoustic_enabled);
        set(&mut params.dark_mode_enabled, dvl.dark_mode_enabled);
        set(&mut params.mounting_rotation_offset, dvl.mounting_rotation_offset);
        set(&mut params.range_mode, dvl.range_mode);
        set(&mut params.periodic_cycling_enabled, dvl.periodic_cycling_enabled);
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed TOML, wrong value types or
/// unknown keys.
pub fn parse_config(text: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Loads configuration from `path`.
///
/// Unlike a default location, an explicitly named file must exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if its content is invalid.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
