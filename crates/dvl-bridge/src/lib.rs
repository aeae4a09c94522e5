//! dvl-bridge library crate.
//!
//! Connects to a Doppler Velocity Log that speaks newline-delimited JSON over
//! TCP, republishes its telemetry as typed messages on a publish/subscribe
//! bus, and forwards operator commands from the bus back to the sensor.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! DVL (JSON lines over TCP)
//!         ↕
//! [dvl-bridge]
//!   ├── domain/            Pure types: BridgeConfig, LinkState, LinkError
//!   ├── application/       Dispatcher, configuration handshake, command relay
//!   └── infrastructure/
//!         ├── link/        TCP link: framing, reconnect, writes
//!         ├── supervisor/  The one task that owns the link
//!         ├── bus/         In-process broadcast bus
//!         └── ws_gateway/  Bus exposed over WebSocket (tokio-tungstenite)
//!         ↕
//! Bus subscribers (JSON envelopes over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `dvl-core`; it talks to the
//!   outside world only through the `TelemetrySink` and `FrameChannel`
//!   traits.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.

/// Domain layer: pure configuration and connection types (no I/O).
pub mod domain;

/// Application layer: frame routing, handshake and command validation.
pub mod application;

/// Infrastructure layer: sensor link, supervisor, bus and gateway.
pub mod infrastructure;
