//! Exchange Iridium messages with the Iridium Gateway through their Direct IP service.
//!
//! Iridium `DirectIP` is a service provided by the Iridium company. New Mobile Originated
//! messages are forwarded from the Iridium servers to a configured IP address. The Iridium
//! service attempts to initiate a TCP connection to port 32606 at the specified IP. If the
//! connection is successful, the MO message is transmitted, then the connection is closed.
//!
//! Mobile Terminated messages travel the other way: a vendor application opens a TCP connection
//! to the Iridium Gateway, writes one MT message, and reads back a confirmation message before
//! the connection is closed.
//!
//! This module provides a `Server` structure to receive incoming MO messages, and a
//! `Transmitter` structure that queues MT messages and delivers them to the gateway in order,
//! retrying with backoff when the gateway is unreachable or rejects a message.

mod server;
mod transmitter;

pub use self::{server::Server, transmitter::Transmitter};

/// The TCP port the Iridium Gateway delivers mobile originated messages to.
pub const DEFAULT_RECEIVE_PORT: u16 = 32606;
