//! ynca-bridge
//!
//! Bridges a Yamaha AV receiver's YNCA line-oriented TCP control protocol
//! to external consumers.
//!
//! This library provides:
//! - A reconnecting YNCA protocol client with serialized command writes
//!   and a periodic keepalive
//! - CRLF framing and line-grammar parsing for the protocol stream
//! - A derived now-playing snapshot folded from protocol messages
//! - MQTT republishing of raw lines and state changes
//! - An HTTP API exposing the snapshot and service health

pub mod adapters;
pub mod api;
pub mod bus;
pub mod config;
pub mod protocol;
pub mod state;
