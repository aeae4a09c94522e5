//! CommandRelay: forwards operator commands from the bus to the sensor.
//!
//! Commands are opaque to the bridge beyond one check: the text must be a
//! JSON object with a `command` key.  Valid text is forwarded verbatim
//! (newline appended) so new firmware commands need no bridge changes.
//! Commands the sensor currently understands:
//!
//! | `command`              | Effect                                       |
//! |------------------------|----------------------------------------------|
//! | `reset_dead_reckoning` | zero the dead-reckoning origin               |
//! | `calibrate_gyro`       | calibrate the gyro (platform must be still)  |
//! | `trigger_ping`         | single ping when periodic cycling is off     |
//! | `get_config`           | report the current configuration             |
//! | `set_config`           | apply the `parameters` object                |
//!
//! The relay never touches the socket.  It enqueues onto the supervisor's
//! mailbox, and the supervisor performs the write on its own task, so a
//! command can never interleave with a reconnect or with another write.

use dvl_core::{validate_command, ProtocolError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Number of commands that may wait for the supervisor before `relay`
/// starts applying back-pressure.
pub const COMMAND_MAILBOX_CAPACITY: usize = 32;

/// Error type for the command relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The text is not a JSON object with a `command` key.
    #[error("invalid command: {0}")]
    Invalid(#[from] ProtocolError),

    /// The supervisor has stopped and will never write the command.
    #[error("sensor link has shut down")]
    Closed,
}

/// Cloneable handle that validates commands and queues them for the sensor.
#[derive(Debug, Clone)]
pub struct CommandRelay {
    mailbox: mpsc::Sender<String>,
}

impl CommandRelay {
    pub fn new(mailbox: mpsc::Sender<String>) -> Self {
        Self { mailbox }
    }

    /// Creates a relay together with the receiving end the supervisor drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Validates `raw` and queues it for writing to the sensor.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Invalid`] if `raw` is not a JSON object with a
    ///   `command` key; nothing is queued.
    /// - [`RelayError::Closed`] if the supervisor is gone.
    pub async fn relay(&self, raw: &str) -> Result<(), RelayError> {
        let line = validate_command(raw).map_err(|e| {
            warn!(error = %e, "rejecting command from bus");
            RelayError::Invalid(e)
        })?;

        info!("queueing command for DVL: {}", line.trim_end());
        self.mailbox
            .send(line)
            .await
            .map_err(|_| RelayError::Closed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
