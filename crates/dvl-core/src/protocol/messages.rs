//! All DVL wire message types.
//!
//! Inbound frames are JSON objects tagged by a `type` field.  Outbound frames
//! are JSON objects carrying a `command` field.  Every inbound struct keeps a
//! flattened `extra` map so fields this crate does not model (covariance
//! matrices, transmission timestamps, firmware-specific additions) survive a
//! decode→encode cycle unchanged.
//!
//! Measured quantities are kept as [`Number`] rather than `f64`.  The sensor
//! writes whole numbers without a decimal point (`"x":0`, `"ts":1`), and a
//! `Number` re-encodes exactly as it was received; converting to `f64`
//! happens once, when the typed telemetry is built.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Byte that terminates every frame on the wire, in both directions.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Name of the discriminant field carried by every inbound frame.
pub const TYPE_FIELD: &str = "type";

/// Name of the field every outbound command frame must carry.
pub const COMMAND_FIELD: &str = "command";

/// Number of transducers (beams) on the sensor head.
pub const BEAM_COUNT: usize = 4;

// ── Frame kinds ───────────────────────────────────────────────────────────────

/// The `type` values this crate recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Velocity,
    PositionLocal,
    Response,
    Error,
}

impl FrameKind {
    /// Returns the wire spelling of the discriminant.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Velocity => "velocity",
            FrameKind::PositionLocal => "position_local",
            FrameKind::Response => "response",
            FrameKind::Error => "error",
        }
    }

    /// Parses a wire discriminant, returning `None` for unrecognised values.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "velocity" => Some(FrameKind::Velocity),
            "position_local" => Some(FrameKind::PositionLocal),
            "response" => Some(FrameKind::Response),
            "error" => Some(FrameKind::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Inbound frames ────────────────────────────────────────────────────────────

/// One decoded inbound frame.
///
/// # Serde representation
///
/// ```json
/// {"type":"velocity", ...}
/// {"type":"position_local", ...}
/// {"type":"response","success":true,"error_message":"", ...}
/// {"type":"error","message":"..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SensorFrame {
    /// Velocity report, emitted once per ping.
    #[serde(rename = "velocity")]
    Velocity(VelocityReport),

    /// Dead-reckoning position report.
    #[serde(rename = "position_local")]
    PositionLocal(DeadReckoningReport),

    /// Acknowledgement of a previously sent command.
    #[serde(rename = "response")]
    Response(CommandResponse),

    /// Asynchronous error notification from the sensor.
    #[serde(rename = "error")]
    Error(SensorErrorReport),
}

impl SensorFrame {
    /// Returns the discriminant of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            SensorFrame::Velocity(_) => FrameKind::Velocity,
            SensorFrame::PositionLocal(_) => FrameKind::PositionLocal,
            SensorFrame::Response(_) => FrameKind::Response,
            SensorFrame::Error(_) => FrameKind::Error,
        }
    }
}

/// Body of a `velocity` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityReport {
    /// Milliseconds since the previous velocity report.
    pub time: Number,
    /// Velocity along the sensor X axis (m/s).
    pub vx: Number,
    /// Velocity along the sensor Y axis (m/s).
    pub vy: Number,
    /// Velocity along the sensor Z axis (m/s).
    pub vz: Number,
    /// Figure of merit: the velocity uncertainty estimate (m/s).
    pub fom: Number,
    /// Distance to the reflecting surface along Z (m).
    pub altitude: Number,
    /// `true` when the velocity components are trustworthy.
    pub velocity_valid: bool,
    /// Sensor status word; 0 means normal operation.
    pub status: i64,
    /// Report format tag, for example `"json_v3.1"`.
    pub format: String,
    /// Per-beam measurements.  A well-formed report carries exactly
    /// [`BEAM_COUNT`] entries; the count is enforced when building the typed
    /// output, not here, so malformed reports still decode for diagnostics.
    pub transducers: Vec<Transducer>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One beam entry inside a `velocity` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transducer {
    /// Beam index (0–3).
    pub id: i64,
    /// Radial velocity measured along the beam (m/s).
    pub velocity: Number,
    /// Distance to the reflector along the beam (m).
    pub distance: Number,
    /// Received signal strength indicator (dBm).
    pub rssi: Number,
    /// Noise spectral density (dBm).
    pub nsd: Number,
    /// `true` when the beam produced a valid lock.
    pub beam_valid: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a `position_local` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadReckoningReport {
    /// Seconds since the dead-reckoning origin was last reset.
    pub ts: Number,
    pub x: Number,
    pub y: Number,
    pub z: Number,
    /// Position uncertainty (m).
    pub std: Number,
    pub roll: Number,
    pub pitch: Number,
    pub yaw: Number,
    /// Dead-reckoning status; 0 means healthy.
    pub status: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a `response` frame.
///
/// The protocol carries no request id: a response is matched to a command
/// purely by arrival order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Name of the command being acknowledged, when the firmware reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_to: Option<String>,
    /// Absent is treated as failure.
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandResponse {
    /// Text used when the sensor sends neither `message` nor `error_message`.
    pub const NO_MESSAGE: &'static str = "No message";

    /// Returns the most descriptive text the sensor supplied.
    ///
    /// Prefers `message`, then a non-empty `error_message`, then
    /// [`Self::NO_MESSAGE`].
    pub fn message_text(&self) -> &str {
        if let Some(message) = self.message.as_deref() {
            return message;
        }
        match self.error_message.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => Self::NO_MESSAGE,
        }
    }
}

/// Body of an `error` frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorErrorReport {
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Outbound commands ─────────────────────────────────────────────────────────

/// Commands the bridge itself originates.
///
/// The bridge only ever sends the configuration handshake.  Operator
/// commands relayed from the bus are forwarded verbatim and never pass
/// through this type; see [`crate::protocol::codec::validate_command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SensorCommand {
    /// Apply the given configuration parameters.
    SetConfig { parameters: ConfigParameters },
}

/// Parameters carried by a `set_config` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigParameters {
    /// Speed of sound in water (m/s).
    pub speed_of_sound: f64,
    /// Enables the acoustic transmitters.
    pub acoustic_enabled: bool,
    /// Disables the status LED.
    pub dark_mode_enabled: bool,
    /// Rotation of the mounting relative to the vehicle (degrees).
    pub mounting_rotation_offset: f64,
    /// `"auto"` or a fixed range-mode expression such as `"1<=3"`.
    pub range_mode: String,
    /// Keep pinging continuously rather than waiting for `trigger_ping`.
    pub periodic_cycling_enabled: bool,
}

impl Default for ConfigParameters {
    fn default() -> Self {
        Self {
            speed_of_sound: 1480.0,
            acoustic_enabled: true,
            dark_mode_enabled: false,
            mounting_rotation_offset: 0.0,
            range_mode: "auto".to_string(),
            periodic_cycling_enabled: true,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
