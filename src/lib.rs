//! # PrintKit
//!
//! A host for reprap-class 3D printers: feeds G-code through a
//! checksum-protected, flow-controlled, line-numbered stream over serial or
//! TCP, with priority command injection, resend recovery, and an event bus
//! for subscribers.
//!
//! ## Architecture
//!
//! PrintKit is organised as a workspace:
//!
//! 1. **printkit-core** - error type, G-code line model, event dispatch
//! 2. **printkit-communication** - serial/TCP transport, protocol engine
//! 3. **printkit** - the console host binary tying them together

pub mod config;
pub mod console;

pub use printkit_core::{
    BoundingBox, DeviceError, EventDispatcher, GCode, GLine, HandlerHandle, Layer,
    PrinterEventHandler, Result,
};

pub use printkit_communication::{checksum, Endpoint, Link, PrintCore, ReadResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with console output, `RUST_LOG` environment
/// variable support, and thread names (the listener and sender threads are
/// named, which makes traces from the protocol engine legible).
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
