//! Connection lifecycle vocabulary shared by the application and
//! infrastructure layers.

use std::time::Duration;

use thiserror::Error;

/// Lifecycle of the sensor connection.
///
/// ```text
/// Disconnected ──connect──▶ Connecting ──ok──▶ Connected
///       ▲                       │ error (retry after backoff)
///       │                       ▼
///       └──── timeout / EOF / I/O error ◀──── Connected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Transport faults on the sensor connection.
///
/// None of these are fatal: reads recover by reconnecting, a failed write is
/// reported and dropped.
#[derive(Debug, Error)]
pub enum LinkError {
    /// There is no live connection to use.
    #[error("not connected to the sensor")]
    NotConnected,

    /// No bytes arrived within the read timeout.
    #[error("no data from the sensor for {0:?}")]
    Timeout(Duration),

    /// The sensor closed the connection (zero-length read).
    #[error("connection closed by the sensor")]
    Closed,

    /// Any other socket error.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// `true` for a read timeout, which during the configuration handshake
    /// only means "keep waiting".
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout(_))
    }
}
