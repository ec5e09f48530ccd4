//! YNCA line grammar.
//!
//! Every line the receiver sends has the shape
//! `@<SUBUNIT>:<FUNCTION>=<VALUE>`, e.g. `@MAIN:PWR=Standby` or
//! `@SPOTIFY:ARTIST=Daft Punk`. SUBUNIT and FUNCTION are uppercase
//! alphanumeric tokens; VALUE is free text to end of line and may be
//! empty.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

fn line_regex() -> &'static Regex {
    static LINE_REGEX: OnceLock<Regex> = OnceLock::new();
    LINE_REGEX.get_or_init(|| {
        #[allow(clippy::expect_used)] // pattern is a literal, checked by tests
        Regex::new(r"^@(?P<sub_unit>[A-Z0-9]+):(?P<function>[A-Z0-9]+)=(?P<value>.*)$")
            .expect("YNCA line regex is valid")
    })
}

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YncaMessage {
    /// Logical source module inside the receiver (MAIN, AIRPLAY, BT, ...).
    pub sub_unit: String,
    /// Named attribute being reported (PWR, PLAYBACKINFO, ARTIST, ...).
    pub function: String,
    /// Reported value, possibly empty.
    pub value: String,
    /// The line exactly as received, for raw republishing.
    pub raw: String,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("line {0:?} does not match the YNCA grammar")]
    Grammar(String),
}

/// Parse one framed line into a [`YncaMessage`].
pub fn parse_line(line: &str) -> Result<YncaMessage, ProtocolError> {
    let captures = line_regex()
        .captures(line)
        .ok_or_else(|| ProtocolError::Grammar(line.to_string()))?;

    Ok(YncaMessage {
        sub_unit: captures["sub_unit"].to_string(),
        function: captures["function"].to_string(),
        value: captures["value"].to_string(),
        raw: line.to_string(),
    })
}
