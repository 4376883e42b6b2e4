//! # PrintKit Communication
//!
//! Device transport and the line protocol engine for PrintKit.
//! Maintains a checksum-protected, line-numbered, `ok`-gated command stream
//! to a reprap-class firmware over a serial port or a TCP socket, with
//! priority injection, resend recovery, and event dispatch.

pub mod device;
pub mod printcore;
pub mod protocol;

pub use device::{Endpoint, Link, ReadResult, SerialLink, SocketLink};
pub use printcore::PrintCore;
pub use protocol::{checksum, classify, format_lineno_reset, format_numbered, Reply};
