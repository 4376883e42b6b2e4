//! # PrintKit Core
//!
//! Core types for the PrintKit host: the shared error type, the G-code
//! line/job model, and the printer event bus. The transport and protocol
//! engine live in `printkit-communication`.

pub mod error;
pub mod event;
pub mod gcode;

pub use error::{DeviceError, Result};
pub use event::{EventDispatcher, HandlerHandle, PrinterEventHandler};
pub use gcode::{strip_comments, BoundingBox, GCode, GLine, Layer};
