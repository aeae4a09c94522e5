//! JSON codec for DVL protocol frames.
//!
//! Wire format:
//! ```text
//! <UTF-8 JSON object>\n
//! ```
//! One object per line.  Inbound objects carry a `type` discriminant; outbound
//! objects carry a `command` key.
//!
//! Decoding is done in two passes: the line is first parsed into a generic
//! [`serde_json::Value`] so the discriminant can be inspected on its own, and
//! only then converted into the typed [`SensorFrame`].  This lets callers tell
//! "not JSON", "no `type`", "unknown `type`", and "known `type` with bad
//! fields" apart, which matters because each is reported differently.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{
    FrameKind, SensorCommand, SensorFrame, COMMAND_FIELD, FRAME_DELIMITER, TYPE_FIELD,
};

/// Errors that can occur while decoding inbound frames or validating
/// outbound commands.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The text is not valid JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// The text is valid JSON but not an object.
    #[error("expected a JSON object")]
    NotAnObject,

    /// The object has no `type` field, or it is not a string.
    #[error("frame has no type discriminant")]
    MissingDiscriminant,

    /// The `type` field names a frame kind this bridge does not handle.
    #[error("unrecognized frame type: {0:?}")]
    UnknownType(String),

    /// The discriminant is known but the body is missing fields or has the
    /// wrong field types.
    #[error("malformed {kind} frame: {reason}")]
    MalformedFrame { kind: FrameKind, reason: String },

    /// A velocity frame did not carry exactly four transducers.
    #[error("velocity frame has {found} transducers, expected {expected}")]
    BeamCount { expected: usize, found: usize },

    /// An outbound command object lacks the `command` key.
    #[error("command JSON must contain a 'command' field")]
    MissingCommand,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one frame of text (without its trailing delimiter).
///
/// Surrounding whitespace, including a stray `\r`, is tolerated.
///
/// # Errors
///
/// Returns [`ProtocolError`] describing exactly why the frame was rejected.
///
/// # Examples
///
/// ```rust
/// use dvl_core::protocol::{decode_frame, messages::FrameKind};
///
/// let frame = decode_frame(r#"{"type":"error","message":"overheat"}"#).unwrap();
/// assert_eq!(frame.kind(), FrameKind::Error);
/// ```
pub fn decode_frame(text: &str) -> Result<SensorFrame, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;

    let kind = frame_kind(&value)?;

    serde_json::from_value(value).map_err(|e| ProtocolError::MalformedFrame {
        kind,
        reason: e.to_string(),
    })
}

/// Encodes a frame back into its single-line JSON text (no delimiter).
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedFrame`] if serialization fails.
pub fn encode_frame(frame: &SensorFrame) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(|e| ProtocolError::MalformedFrame {
        kind: frame.kind(),
        reason: e.to_string(),
    })
}

/// Encodes a command the bridge originates, including the trailing newline.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedJson`] if serialization fails.
pub fn encode_command(command: &SensorCommand) -> Result<String, ProtocolError> {
    let mut line =
        serde_json::to_string(command).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
    line.push(FRAME_DELIMITER as char);
    Ok(line)
}

/// Validates an operator command and returns the exact line to transmit.
///
/// The text must parse as a JSON object containing a `command` key.  It is
/// forwarded verbatim; only a trailing newline is appended when missing.
///
/// # Errors
///
/// - [`ProtocolError::MalformedJson`] if `raw` is not JSON.
/// - [`ProtocolError::NotAnObject`] if it is JSON but not an object.
/// - [`ProtocolError::MissingCommand`] if the `command` key is absent.
///
/// # Examples
///
/// ```rust
/// use dvl_core::protocol::{validate_command, ProtocolError};
///
/// assert_eq!(
///     validate_command(r#"{"command":"trigger_ping"}"#).unwrap(),
///     "{\"command\":\"trigger_ping\"}\n"
/// );
/// assert_eq!(validate_command(r#"{"foo":1}"#), Err(ProtocolError::MissingCommand));
/// ```
pub fn validate_command(raw: &str) -> Result<String, ProtocolError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
    let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
    if !object.contains_key(COMMAND_FIELD) {
        return Err(ProtocolError::MissingCommand);
    }

    let mut line = raw.to_string();
    if !line.ends_with(FRAME_DELIMITER as char) {
        line.push(FRAME_DELIMITER as char);
    }
    Ok(line)
}

/// Extracts the declared frame kind from an already parsed JSON value.
///
/// # Errors
///
/// Returns [`ProtocolError::NotAnObject`], [`ProtocolError::MissingDiscriminant`]
/// or [`ProtocolError::UnknownType`].
pub fn frame_kind(value: &Value) -> Result<FrameKind, ProtocolError> {
    let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
    let declared = object
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingDiscriminant)?;
    FrameKind::from_wire(declared).ok_or_else(|| ProtocolError::UnknownType(declared.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
