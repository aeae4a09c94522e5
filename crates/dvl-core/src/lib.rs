//! # dvl-core
//!
//! Shared library for the DVL bridge containing the line-delimited JSON wire
//! protocol, the stream framer, and the typed telemetry schemas published on
//! the message bus.
//!
//! This crate has zero dependencies on sockets, async runtimes, or the bus
//! itself.  Everything here is a pure function of its input bytes, which makes
//! the framing and decoding rules easy to test exhaustively.
//!
//! # Architecture overview
//!
//! A Doppler Velocity Log (DVL) streams newline-terminated JSON objects over a
//! raw TCP socket.  Each object carries a `type` discriminant:
//!
//! ```text
//! {"type":"velocity","time":12.3,"vx":0.1,...,"transducers":[...4 beams...]}
//! {"type":"position_local","ts":49056.2,"x":1.2,"y":0.3,"z":4.5,...}
//! {"type":"response","response_to":"set_config","success":true,...}
//! ```
//!
//! - **`protocol`** – How bytes become frames.  [`protocol::framing`] turns an
//!   arbitrarily chunked byte stream into complete lines; [`protocol::codec`]
//!   decodes each line into a [`SensorFrame`] and validates outbound commands.
//!
//! - **`domain`** – The typed outputs.  A decoded velocity report becomes a
//!   [`VelocityFrame`] with exactly four beams; a dead-reckoning report becomes
//!   a [`PositionEstimate`].

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `dvl_core::SensorFrame` instead of `dvl_core::protocol::messages::SensorFrame`.
pub use domain::telemetry::{BeamRecord, Header, PositionEstimate, VelocityFrame};
pub use protocol::codec::{decode_frame, encode_command, encode_frame, validate_command, ProtocolError};
pub use protocol::framing::{FramingError, LineFramer};
pub use protocol::messages::{ConfigParameters, SensorCommand, SensorFrame};
