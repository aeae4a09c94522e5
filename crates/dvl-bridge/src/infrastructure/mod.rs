//! Infrastructure layer for dvl-bridge.
//!
//! The infrastructure layer handles all I/O: the TCP link to the sensor,
//! the in-process bus, and the WebSocket gateway that exposes the bus.
//!
//! # Responsibilities
//!
//! - Dialing the sensor, reading frames, writing commands, reconnecting
//! - Owning the connection on a single supervisor task
//! - Fanning telemetry out to bus subscribers
//! - Accepting WebSocket clients and relaying their commands
//! - Loading the TOML configuration file
//!
//! # What does NOT belong here?
//!
//! - Frame routing and handshake rules (that is the application layer)
//! - Wire message types (that is `dvl-core`)

pub mod bus;
pub mod config_file;
pub mod link;
pub mod supervisor;
pub mod ws_gateway;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use bus::ChannelBus;
pub use link::{Connector, SensorLink, TcpConnector};
pub use supervisor::Supervisor;
pub use ws_gateway::run_gateway;
