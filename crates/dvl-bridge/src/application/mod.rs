//! Application layer for dvl-bridge.
//!
//! The application layer knows *what* the bridge does with sensor traffic,
//! but delegates *how* bytes move to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Routing each received frame to the right bus output ([`dispatcher`])
//! - Pushing the configuration after a connect ([`handshake`])
//! - Validating operator commands and queueing them ([`command_relay`])
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - Tokio task spawning (that happens in the infrastructure layer)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod command_relay;
pub mod dispatcher;
pub mod handshake;

pub use command_relay::{CommandRelay, RelayError, COMMAND_MAILBOX_CAPACITY};
pub use dispatcher::{DispatchOutcome, Dispatcher, TelemetrySink};
pub use handshake::{configure, FrameChannel, HandshakeOutcome};
