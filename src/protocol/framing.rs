//! Incremental CRLF line framing.
//!
//! TCP gives no message boundaries: a read may carry half a line, several
//! lines, or a delimiter split across two reads. `LineFramer` owns the
//! backlog of unterminated bytes so the receive loop can stay stateless.

use super::DELIMITER;

/// Accumulates raw byte chunks and yields complete CRLF-terminated lines.
///
/// Bytes after the last delimiter are retained until a later chunk
/// completes them. The backlog is unbounded; a peer that never sends a
/// delimiter will grow it without limit, which matches the receiver's
/// known behavior of always terminating responses.
#[derive(Debug, Default)]
pub struct LineFramer {
    backlog: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line completed by it, in order.
    ///
    /// Lines are decoded lossily; the receiver speaks ASCII for the
    /// protocol itself but metadata values can carry arbitrary UTF-8.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.backlog.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;

        let mut i = 0;
        while i + 1 < self.backlog.len() {
            if self.backlog[i] == DELIMITER[0] && self.backlog[i + 1] == DELIMITER[1] {
                lines.push(String::from_utf8_lossy(&self.backlog[start..i]).into_owned());
                start = i + 2;
                i += 2;
            } else {
                i += 1;
            }
        }

        self.backlog.drain(..start);
        lines
    }

    /// Bytes currently held back waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.backlog.len()
    }
}
