//! Printer event handler interface
//!
//! Defines the skeleton of an event handler for printer events. Handlers
//! attach to the communication core and are triggered at the relevant
//! process stages; every method has an empty default body so implementors
//! override only what they care about.

use crate::gcode::{GCode, GLine};

/// Listener for printer lifecycle, traffic, and print-progress events.
///
/// Dispatch is synchronous on the thread that triggered the event; handler
/// bodies must return quickly and must not call back into the engine.
pub trait PrinterEventHandler: Send + Sync {
    /// Called when a new communication core is initialized.
    fn on_init(&self) {}

    /// Called when the device connection is established.
    fn on_connect(&self) {}

    /// Called when the device connection ends, orderly or not.
    fn on_disconnect(&self) {}

    /// Called once the firmware first responds.
    fn on_online(&self) {}

    /// Called on every command written to the device.
    ///
    /// `command` is the exact on-wire form (line number and checksum
    /// included for numbered sends); `gline` is its parsed form.
    fn on_send(&self, _command: &str, _gline: &GLine) {}

    /// Called on every line read from the device.
    fn on_recv(&self, _line: &str) {}

    /// Called on connection failures and firmware `Error:` lines.
    fn on_error(&self, _error: &str) {}

    /// Called on temperature-bearing replies (`ok T:…`, bare `T:`/`B:`).
    fn on_temp(&self, _line: &str) {}

    /// Called when printing commences or resumes.
    fn on_start(&self, _resume: bool) {}

    /// Called when a print finishes or is canceled.
    fn on_end(&self) {}

    /// Called when the print crosses into a new layer.
    fn on_layerchange(&self, _z: f64) {}

    /// Called before each main-queue line is sent.
    ///
    /// The returned line is what actually goes on the wire; returning `None`
    /// skips the line and advances the cursor. Handlers are chained in
    /// registration order, each seeing the previous handler's output.
    fn on_printpresend(&self, gline: &GLine, _index: usize, _mainqueue: &GCode) -> Option<GLine> {
        Some(gline.clone())
    }

    /// Called after each main-queue line is sent.
    fn on_printsend(&self, _gline: &GLine) {}

    /// Called on host commands (`;@pause` and friends), which are consumed
    /// by the host rather than transmitted.
    fn on_hostcommand(&self, _line: &str) {}

    /// Fallback for event kinds this trait has no dedicated method for.
    fn on_uncaught_event(&self, _name: &str, _payload: &str) {}
}
