//! Domain layer for dvl-bridge.
//!
//! Pure types with no I/O: runtime configuration and the connection
//! lifecycle vocabulary.  The wire and telemetry types live in `dvl-core`;
//! this layer only adds what is specific to running a bridge.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod link;

pub use config::BridgeConfig;
pub use link::{LinkError, LinkState};
