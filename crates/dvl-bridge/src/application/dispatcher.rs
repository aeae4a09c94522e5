//! Dispatcher: routes each received frame to the right output by its `type`.
//!
//! The dispatcher is the data path of the bridge.  It is handed one raw text
//! frame at a time by the supervisor, decodes it, and either publishes a
//! typed message on the [`TelemetrySink`] or logs what it saw.  Nothing in
//! here can fail the caller: every fault is logged and reported back as a
//! [`DispatchOutcome`] so the loop simply moves on to the next frame.
//!
//! | `type`           | Action                                         |
//! |------------------|------------------------------------------------|
//! | `velocity`       | publish a [`VelocityFrame`] (exactly 4 beams)  |
//! | `position_local` | publish a [`PositionEstimate`]                 |
//! | `response`       | log success at info, failure at error          |
//! | `error`          | log the sensor's message at error              |
//! | anything else    | warn "unknown type", publish nothing           |
//!
//! When raw logging is enabled every frame is also logged and republished
//! verbatim, whether or not it decodes.

use std::sync::Arc;

use dvl_core::{
    decode_frame, Header, PositionEstimate, ProtocolError, SensorFrame, VelocityFrame,
};
use tracing::{debug, error, info, warn};

/// Output side of the bridge.
///
/// The infrastructure implementation fans messages out to bus subscribers;
/// tests use the generated `MockTelemetrySink`.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    /// Republishes a raw frame exactly as received.
    fn publish_raw(&self, frame: &str);

    /// Publishes a decoded velocity report.
    fn publish_velocity(&self, frame: VelocityFrame);

    /// Publishes a decoded dead-reckoning estimate.
    fn publish_estimate(&self, estimate: PositionEstimate);
}

/// What the dispatcher did with a frame.
#[derive(Debug, PartialEq)]
pub enum DispatchOutcome {
    /// A velocity message was published.
    Velocity,
    /// A position estimate was published.
    Position,
    /// A command response was logged.
    Response { success: bool },
    /// A sensor error report was logged.
    SensorError(String),
    /// The frame's `type` was absent (`None`) or not one the bridge knows.
    Unrecognized(Option<String>),
    /// The frame could not be turned into an output message.
    Discarded(ProtocolError),
}

/// Decodes frames and publishes them on a [`TelemetrySink`].
pub struct Dispatcher {
    sink: Arc<dyn TelemetrySink>,
    log_raw: bool,
    frame_id: String,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn TelemetrySink>, log_raw: bool, frame_id: impl Into<String>) -> Self {
        Self {
            sink,
            log_raw,
            frame_id: frame_id.into(),
        }
    }

    /// Handles one frame.
    ///
    /// Typed outputs are built fresh per call with the current time in the
    /// header; nothing is carried over from a previous frame.
    pub fn dispatch(&self, raw: &str) -> DispatchOutcome {
        if self.log_raw {
            info!("{raw}");
            self.sink.publish_raw(raw);
        }

        let frame = match decode_frame(raw) {
            Ok(frame) => frame,
            Err(ProtocolError::UnknownType(kind)) => {
                warn!(kind = %kind, "unknown message type received from DVL");
                return DispatchOutcome::Unrecognized(Some(kind));
            }
            Err(ProtocolError::MissingDiscriminant) => {
                warn!("DVL frame has no type field");
                return DispatchOutcome::Unrecognized(None);
            }
            Err(e) => {
                warn!(error = %e, "discarding undecodable DVL frame");
                return DispatchOutcome::Discarded(e);
            }
        };

        match frame {
            SensorFrame::Velocity(report) => {
                match VelocityFrame::from_report(&report, Header::now(&self.frame_id)) {
                    Ok(velocity) => {
                        debug!(vx = velocity.velocity[0], vy = velocity.velocity[1], vz = velocity.velocity[2], "velocity");
                        self.sink.publish_velocity(velocity);
                        DispatchOutcome::Velocity
                    }
                    Err(e) => {
                        warn!(error = %e, "discarding velocity report");
                        DispatchOutcome::Discarded(e)
                    }
                }
            }
            SensorFrame::PositionLocal(report) => {
                let estimate = PositionEstimate::from_report(&report, Header::now(&self.frame_id));
                debug!(x = estimate.x, y = estimate.y, z = estimate.z, "position estimate");
                self.sink.publish_estimate(estimate);
                DispatchOutcome::Position
            }
            SensorFrame::Response(response) => {
                let text = response.message_text();
                let command = response.response_to.as_deref().unwrap_or("unknown");
                if response.success {
                    info!(command, "DVL command succeeded: {text}");
                } else {
                    error!(command, "DVL command failed: {text}");
                }
                DispatchOutcome::Response {
                    success: response.success,
                }
            }
            SensorFrame::Error(report) => {
                error!("DVL error: {}", report.message);
                DispatchOutcome::SensorError(report.message)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
