//! In-process publish/subscribe bus.
//!
//! Every published message goes onto one `tokio::sync::broadcast` channel
//! tagged with its topic.  Subscribers (the WebSocket gateway sessions, the
//! integration tests) each get their own receiver and filter by topic as
//! they like.  Publishing never blocks: a subscriber that falls more than
//! [`BUS_CAPACITY`] messages behind loses the oldest ones and is told how
//! many it missed.
//!
//! # Topics
//!
//! | Topic              | Direction | Payload                        |
//! |--------------------|-----------|--------------------------------|
//! | `dvl/json_data`    | out       | raw frame text (raw log only)  |
//! | `dvl/data`         | out       | [`VelocityFrame`]              |
//! | `dvl/estimate`     | out       | [`PositionEstimate`]           |
//! | `dvl/send_command` | in        | command JSON text              |

use dvl_core::{PositionEstimate, VelocityFrame};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::application::TelemetrySink;

pub const RAW_TOPIC: &str = "dvl/json_data";
pub const VELOCITY_TOPIC: &str = "dvl/data";
pub const ESTIMATE_TOPIC: &str = "dvl/estimate";
pub const COMMAND_TOPIC: &str = "dvl/send_command";

/// Messages a subscriber may fall behind by before it starts losing them.
pub const BUS_CAPACITY: usize = 256;

/// One message on the bus.
///
/// Serializes as `{"topic": "...", "payload": ...}`, which is the envelope
/// the WebSocket gateway sends to its clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum BusMessage {
    #[serde(rename = "dvl/json_data")]
    Raw(String),
    #[serde(rename = "dvl/data")]
    Velocity(VelocityFrame),
    #[serde(rename = "dvl/estimate")]
    Estimate(PositionEstimate),
}

impl BusMessage {
    pub fn topic(&self) -> &'static str {
        match self {
            BusMessage::Raw(_) => RAW_TOPIC,
            BusMessage::Velocity(_) => VELOCITY_TOPIC,
            BusMessage::Estimate(_) => ESTIMATE_TOPIC,
        }
    }
}

/// Broadcast-backed bus.  Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct ChannelBus {
    tx: broadcast::Sender<BusMessage>,
}

impl ChannelBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns a receiver that sees every message published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn publish(&self, message: BusMessage) {
        let topic = message.topic();
        // Err only means nobody is listening right now.
        if self.tx.send(message).is_err() {
            trace!(topic, "no subscribers");
        }
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new(BUS_CAPACITY)
    }
}

impl TelemetrySink for ChannelBus {
    fn publish_raw(&self, frame: &str) {
        self.publish(BusMessage::Raw(frame.to_string()));
    }

    fn publish_velocity(&self, frame: VelocityFrame) {
        self.publish(BusMessage::Velocity(frame));
    }

    fn publish_estimate(&self, estimate: PositionEstimate) {
        self.publish(BusMessage::Estimate(estimate));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
