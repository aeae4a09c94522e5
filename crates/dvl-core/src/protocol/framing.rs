//! Newline framer for the sensor byte stream.
//!
//! TCP is a *stream* protocol: one `read()` may return half a frame, exactly
//! one frame, or several frames plus the beginning of the next.  The
//! [`LineFramer`] accepts bytes in whatever chunks the socket delivers and
//! hands back complete lines in arrival order.
//!
//! # Carry buffer
//!
//! Bytes after the last delimiter are kept as the *carry* and prepended to the
//! next chunk before it is split again.  There is exactly one carry per
//! framer and it is never cleared by anything other than a delimiter (or an
//! explicit overflow), so bytes are never lost or read twice, even across a
//! reconnect of the underlying socket.
//!
//! # Example
//!
//! ```rust
//! use dvl_core::protocol::LineFramer;
//!
//! let mut framer = LineFramer::new();
//! framer.push(b"{\"a\":1}\n{\"b\"").unwrap();
//! framer.push(b":2}\n").unwrap();
//!
//! assert_eq!(framer.pop().as_deref(), Some("{\"a\":1}"));
//! assert_eq!(framer.pop().as_deref(), Some("{\"b\":2}"));
//! assert_eq!(framer.pop(), None);
//! ```

use std::collections::VecDeque;

use thiserror::Error;
use tracing::warn;

use crate::protocol::messages::FRAME_DELIMITER;

/// Default upper bound on an unterminated frame (64 KiB).
///
/// A real velocity report is well under 2 KiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Errors reported by the framer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The carry grew past the limit without a delimiter and was discarded.
    #[error("unterminated frame exceeded {limit} bytes; discarded {discarded} bytes")]
    Oversized { limit: usize, discarded: usize },

    /// A complete frame was not valid UTF-8 and was discarded.
    #[error("discarded {len}-byte frame that is not valid UTF-8 (first bad byte at {valid_up_to})")]
    InvalidUtf8 { len: usize, valid_up_to: usize },
}

/// Splits a chunked byte stream into newline-terminated frames.
#[derive(Debug)]
pub struct LineFramer {
    /// Bytes received after the most recent delimiter.
    carry: Vec<u8>,
    /// Complete frames not yet handed to the caller, oldest first.
    ready: VecDeque<String>,
    max_frame_len: usize,
}

impl LineFramer {
    /// Creates a framer with [`DEFAULT_MAX_FRAME_LEN`].
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates a framer with a custom limit on unterminated frame length.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            carry: Vec::with_capacity(1024),
            ready: VecDeque::new(),
            max_frame_len,
        }
    }

    /// Appends bytes read from the stream and queues every frame they
    /// complete.
    ///
    /// Returns the number of frames queued by this call.  Every good frame
    /// in `bytes` is queued even when the call reports an error.
    ///
    /// # Errors
    ///
    /// - [`FramingError::Oversized`] when the unterminated tail exceeds the
    ///   configured limit.  The tail is discarded and framing resumes at the
    ///   next delimiter.
    /// - [`FramingError::InvalidUtf8`] when a complete frame is not UTF-8.
    ///   That frame alone is dropped; its bytes are never altered and
    ///   handed on.
    ///
    /// When both happen in one call, the overflow is reported.
    pub fn push(&mut self, bytes: &[u8]) -> Result<usize, FramingError> {
        let mut queued = 0;
        let mut fault = None;
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|&b| b == FRAME_DELIMITER) {
            self.carry.extend_from_slice(&rest[..pos]);
            let line = std::mem::take(&mut self.carry);
            match String::from_utf8(line) {
                Ok(frame) => {
                    self.ready.push_back(frame);
                    queued += 1;
                }
                Err(e) => {
                    let err = FramingError::InvalidUtf8 {
                        len: e.as_bytes().len(),
                        valid_up_to: e.utf8_error().valid_up_to(),
                    };
                    warn!("{err}");
                    fault.get_or_insert(err);
                }
            }
            rest = &rest[pos + 1..];
        }

        self.carry.extend_from_slice(rest);

        if self.carry.len() > self.max_frame_len {
            let discarded = self.carry.len();
            self.carry.clear();
            warn!("discarding {discarded} unterminated bytes (limit {})", self.max_frame_len);
            return Err(FramingError::Oversized {
                limit: self.max_frame_len,
                discarded,
            });
        }

        match fault {
            Some(err) => Err(err),
            None => Ok(queued),
        }
    }

    /// Removes and returns the oldest complete frame, if any.
    pub fn pop(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    /// Number of complete frames waiting to be popped.
    pub fn pending(&self) -> usize {
        self.ready.len()
    }

    /// Bytes of the current unterminated tail.
    pub fn carry(&self) -> &[u8] {
        &self.carry
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
