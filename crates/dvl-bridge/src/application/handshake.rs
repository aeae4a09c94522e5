//! Configuration handshake: push the `set_config` parameters after a connect.
//!
//! The sensor acknowledges a command with a `response` frame, but it keeps
//! streaming telemetry in the meantime, and the protocol carries no request
//! id.  The handshake therefore sends the command and then skims frames
//! until the first one whose `type` is `response`, or until the deadline
//! passes.  Velocity and position frames seen while waiting are dropped.
//!
//! The handshake only needs "send a line" and "receive the next frame"
//! from the connection, expressed as the [`FrameChannel`] trait.  The
//! infrastructure's link implements it without reconnect logic, so a
//! transport failure here surfaces as [`HandshakeOutcome::Transport`] instead
//! of recursing into another connect.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use dvl_core::{decode_frame, encode_command, ConfigParameters, SensorCommand, SensorFrame};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::LinkError;

/// Minimal connection surface the handshake needs.
#[async_trait]
pub trait FrameChannel: Send {
    /// Writes one newline-terminated line.
    async fn send_line(&mut self, line: &str) -> Result<(), LinkError>;

    /// Returns the next complete frame without reconnecting on failure.
    async fn recv_frame(&mut self) -> Result<String, LinkError>;
}

/// Result of one handshake attempt.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// The sensor answered with `success: true`.
    Applied(String),
    /// The sensor answered with `success` false or absent.
    Rejected(String),
    /// No response frame arrived before the deadline.
    TimedOut,
    /// The connection failed while sending or waiting.
    Transport(LinkError),
}

/// Sends `set_config` with `parameters` and waits up to `timeout` for the
/// sensor's response.
///
/// A read timeout from the channel is not a failure here; the handshake
/// keeps waiting until its own deadline.
pub async fn configure<C>(
    channel: &mut C,
    parameters: &ConfigParameters,
    timeout: Duration,
) -> HandshakeOutcome
where
    C: FrameChannel + ?Sized,
{
    let command = SensorCommand::SetConfig {
        parameters: parameters.clone(),
    };
    let line = match encode_command(&command) {
        Ok(line) => line,
        Err(e) => {
            return HandshakeOutcome::Transport(LinkError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                e.to_string(),
            )))
        }
    };

    info!("sending configuration to DVL: {}", line.trim_end());
    if let Err(e) = channel.send_line(&line).await {
        return HandshakeOutcome::Transport(e);
    }

    let deadline = Instant::now() + timeout;
    let mut skipped = 0usize;
    loop {
        let text = match tokio::time::timeout_at(deadline, channel.recv_frame()).await {
            Err(_) => {
                warn!(skipped, "timed out waiting for configuration response");
                return HandshakeOutcome::TimedOut;
            }
            Ok(Err(e)) if e.is_timeout() => continue,
            Ok(Err(e)) => return HandshakeOutcome::Transport(e),
            Ok(Ok(text)) => text,
        };

        match decode_frame(&text) {
            Ok(SensorFrame::Response(response)) => {
                let message = response.message_text().to_string();
                return if response.success {
                    info!("configuration applied successfully: {message}");
                    HandshakeOutcome::Applied(message)
                } else {
                    error!("configuration failed: {message}");
                    HandshakeOutcome::Rejected(message)
                };
            }
            Ok(other) => {
                skipped += 1;
                debug!(kind = %other.kind(), "skipping frame while waiting for configuration response");
            }
            Err(e) => {
                skipped += 1;
                debug!(error = %e, "ignoring undecodable frame during handshake");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Replays a fixed script of receive results and records every sent line.
    ///
    /// Once the script is exhausted `recv_frame` never resolves, like a quiet
    /// sensor.
    #[derive(Default)]
    struct ScriptedChannel {
        sent: Vec<String>,
        script: VecDeque<Result<String, LinkError>>,
        fail_send: bool,
    }

    impl ScriptedChannel {
        fn with_frames(frames: &[&str]) -> Self {
            Self {
                script: frames.iter().map(|f| Ok(f.to_string())).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl FrameChannel for ScriptedChannel {
        async fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
            if self.fail_send {
                return Err(LinkError::NotConnected);
            }
            self.sent.push(line.to_string());
            Ok(())
        }

        async fn recv_frame(&mut self) -> Result<String, LinkError> {
            match self.script.pop_front() {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    const VELOCITY: &str = r#"{"type":"velocity","vx":0.1}"#;
    const POSITION: &str = r#"{"type":"position_local","x":1.0,"y":2.0,"z":3.0}"#;

    #[tokio::test]
    async fn test_sends_set_config_with_all_parameters() {
        // Arrange
        let mut channel =
            ScriptedChannel::with_frames(&[r#"{"type":"response","response_to":"set_config","success":true}"#]);

        // Act
        configure(&mut channel, &ConfigParameters::default(), Duration::from_secs(2)).await;

        // Assert
        assert_eq!(channel.sent.len(), 1);
        let line = &channel.sent[0];
        assert!(line.ends_with('\n'));
        let sent: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(sent["command"], "set_config");
        assert_eq!(sent["parameters"]["speed_of_sound"], 1480.0);
        assert_eq!(sent["parameters"]["acoustic_enabled"], true);
        assert_eq!(sent["parameters"]["dark_mode_enabled"], false);
        assert_eq!(sent["parameters"]["mounting_rotation_offset"], 0.0);
        assert_eq!(sent["parameters"]["range_mode"], "auto");
        assert_eq!(sent["parameters"]["periodic_cycling_enabled"], true);
    }

    #[tokio::test]
    async fn test_response_after_unrelated_frames_is_applied() {
        // Arrange
        let mut channel = ScriptedChannel::with_frames(&[
            VELOCITY,
            POSITION,
            "garbage{",
            VELOCITY,
            r#"{"type":"banana"}"#,
            r#"{"type":"response","response_to":"set_config","success":true,"message":"ok"}"#,
        ]);

        // Act
        let outcome =
            configure(&mut channel, &ConfigParameters::default(), Duration::from_secs(2)).await;

        // Assert
        assert!(matches!(outcome, HandshakeOutcome::Applied(ref m) if m == "ok"));
        assert!(channel.script.is_empty());
    }

    #[tokio::test]
    async fn test_unsuccessful_response_is_rejected_with_message() {
        let mut channel = ScriptedChannel::with_frames(&[
            r#"{"type":"response","response_to":"set_config","success":false,"error_message":"bad range mode"}"#,
        ]);

        let outcome =
            configure(&mut channel, &ConfigParameters::default(), Duration::from_secs(2)).await;

        assert!(matches!(outcome, HandshakeOutcome::Rejected(ref m) if m == "bad range mode"));
    }

    #[tokio::test]
    async fn test_response_without_text_uses_default_message() {
        let mut channel = ScriptedChannel::with_frames(&[r#"{"type":"response"}"#]);

        let outcome =
            configure(&mut channel, &ConfigParameters::default(), Duration::from_secs(2)).await;

        assert!(matches!(outcome, HandshakeOutcome::Rejected(ref m) if m == "No message"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_response_times_out() {
        // Arrange
        let mut channel = ScriptedChannel::with_frames(&[VELOCITY, POSITION]);

        // Act
        let outcome =
            configure(&mut channel, &ConfigParameters::default(), Duration::from_secs(2)).await;

        // Assert
        assert!(matches!(outcome, HandshakeOutcome::TimedOut));
    }

    #[tokio::test]
    async fn test_read_timeout_keeps_waiting() {
        let mut channel = ScriptedChannel::default();
        channel.script.push_back(Err(LinkError::Timeout(Duration::from_secs(1))));
        channel
            .script
            .push_back(Ok(r#"{"type":"response","success":true}"#.to_string()));

        let outcome =
            configure(&mut channel, &ConfigParameters::default(), Duration::from_secs(2)).await;

        assert!(matches!(outcome, HandshakeOutcome::Applied(_)));
    }

    #[tokio::test]
    async fn test_connection_loss_is_transport_failure() {
        let mut channel = ScriptedChannel::default();
        channel.script.push_back(Err(LinkError::Closed));

        let outcome =
            configure(&mut channel, &ConfigParameters::default(), Duration::from_secs(2)).await;

        assert!(matches!(outcome, HandshakeOutcome::Transport(LinkError::Closed)));
    }

    #[tokio::test]
    async fn test_failed_send_is_transport_failure() {
        let mut channel = ScriptedChannel {
            fail_send: true,
            ..Default::default()
        };

        let outcome =
            configure(&mut channel, &ConfigParameters::default(), Duration::from_secs(2)).await;

        assert!(matches!(outcome, HandshakeOutcome::Transport(LinkError::NotConnected)));
    }
}
