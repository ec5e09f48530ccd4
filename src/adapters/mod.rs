//! External-facing adapters: the YNCA receiver client and the MQTT
//! republisher. Both publish to / consume from the shared event bus.

pub mod mqtt;
pub mod ynca;
