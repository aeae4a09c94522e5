//! Protocol module containing wire message types, the JSON codec, and the
//! newline framer.

pub mod codec;
pub mod framing;
pub mod messages;

pub use codec::{decode_frame, encode_command, encode_frame, validate_command, ProtocolError};
pub use framing::{FramingError, LineFramer};
pub use messages::*;
