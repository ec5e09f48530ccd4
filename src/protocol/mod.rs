//! YNCA wire protocol: CRLF framing and line grammar.
//!
//! Pure code, no I/O. The adapter feeds raw socket chunks through
//! [`framing::LineFramer`] and hands each line to [`message::parse_line`].

pub mod framing;
pub mod message;

pub use framing::LineFramer;
pub use message::{parse_line, ProtocolError, YncaMessage};

/// Line delimiter used by the receiver in both directions.
pub const DELIMITER: &[u8] = b"\r\n";
