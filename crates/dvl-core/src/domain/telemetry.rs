//! Typed telemetry published on the bus.
//!
//! Every value here is built fresh from a single decoded report.  Nothing is
//! reused between frames, so a field missing from one report can never
//! inherit the value of the previous one.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::protocol::codec::ProtocolError;
use crate::protocol::messages::{DeadReckoningReport, Transducer, VelocityReport, BEAM_COUNT};

/// Coordinate frame name used when none is configured.
pub const DEFAULT_FRAME_ID: &str = "dvl_link";

/// Converts a wire number to `f64`.
///
/// Every JSON number has an `f64` reading (large integers lose precision);
/// NaN is only reachable if that ever stops being true.
fn real(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

/// Stamp and coordinate frame attached to every published message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Microseconds since the Unix epoch when the frame was dispatched.
    pub stamp_us: u64,
    /// Name of the coordinate frame the values are expressed in.
    pub frame_id: String,
}

impl Header {
    /// Creates a header stamped with the current wall-clock time.
    pub fn now(frame_id: &str) -> Self {
        let stamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self {
            stamp_us,
            frame_id: frame_id.to_string(),
        }
    }
}

/// Measurements from one transducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamRecord {
    pub id: i64,
    pub velocity: f64,
    pub distance: f64,
    /// Signal level (`rssi` on the wire).
    pub rssi: f64,
    /// Noise metric (`nsd` on the wire).
    pub nsd: f64,
    /// Beam validity (`beam_valid` on the wire).
    pub valid: bool,
}

impl From<&Transducer> for BeamRecord {
    fn from(t: &Transducer) -> Self {
        Self {
            id: t.id,
            velocity: real(&t.velocity),
            distance: real(&t.distance),
            rssi: real(&t.rssi),
            nsd: real(&t.nsd),
            valid: t.beam_valid,
        }
    }
}

/// One velocity measurement with its four beams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityFrame {
    pub header: Header,
    pub time: f64,
    /// Velocity vector `[vx, vy, vz]` (m/s).
    pub velocity: [f64; 3],
    pub fom: f64,
    pub altitude: f64,
    pub velocity_valid: bool,
    pub status: i64,
    /// Report format tag (`format` on the wire).
    pub form: String,
    pub beams: [BeamRecord; BEAM_COUNT],
}

impl VelocityFrame {
    /// Builds a velocity frame from a decoded report.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BeamCount`] unless the report carries exactly
    /// [`BEAM_COUNT`] transducers.
    pub fn from_report(report: &VelocityReport, header: Header) -> Result<Self, ProtocolError> {
        let beams: [BeamRecord; BEAM_COUNT] = match report.transducers.as_slice() {
            [b0, b1, b2, b3] => [b0.into(), b1.into(), b2.into(), b3.into()],
            other => {
                return Err(ProtocolError::BeamCount {
                    expected: BEAM_COUNT,
                    found: other.len(),
                })
            }
        };

        Ok(Self {
            header,
            time: real(&report.time),
            velocity: [real(&report.vx), real(&report.vy), real(&report.vz)],
            fom: real(&report.fom),
            altitude: real(&report.altitude),
            velocity_valid: report.velocity_valid,
            status: report.status,
            form: report.format.clone(),
            beams,
        })
    }
}

/// Dead-reckoning position estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub header: Header,
    /// Sensor timestamp (`ts` on the wire).
    pub ts: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Position uncertainty (`std` on the wire).
    pub std: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub status: i64,
}

impl PositionEstimate {
    /// Builds an estimate from a decoded dead-reckoning report.
    pub fn from_report(report: &DeadReckoningReport, header: Header) -> Self {
        Self {
            header,
            ts: real(&report.ts),
            x: real(&report.x),
            y: real(&report.y),
            z: real(&report.z),
            std: real(&report.std),
            roll: real(&report.roll),
            pitch: real(&report.pitch),
            yaw: real(&report.yaw),
            status: report.status,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
