//! The part of the Cassandra native protocol needed to bring a connection to a usable state:
//! envelope framing, body compression, the STARTUP/AUTHENTICATE handshake, OPTIONS heartbeats
//! and decoding of simple `ROWS` results used for node metadata probes.
//!
//! Query execution, prepared statements, batches and server events are not part of this crate.

pub mod authenticators;
pub mod compression;
pub mod error;
pub mod frame;
pub mod types;

pub type Error = error::Error;
pub type Result<T> = error::Result<T>;
