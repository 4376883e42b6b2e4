//! Serial port link
//!
//! Direct USB/RS-232 connection to the printer via the `serialport` crate.
//! Reads and writes go through cloned port halves so the listener's blocking
//! read never delays the sender. Carries the platform workarounds the
//! reprap world needs: HUP suppression on Linux ttys (opening the port must
//! not reset the printer), the odd-parity open/reopen dance for drivers that
//! latch DTR, and an optional forced DTR level.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serialport::SerialPort;

use printkit_core::{DeviceError, Result};

use super::{
    disconnected_read_error, disconnected_write_error, LineBuffer, Link, ReadResult, READ_TIMEOUT,
};

/// Duration the DTR line is held high during a reset pulse.
const RESET_PULSE: Duration = Duration::from_millis(200);

struct ReadHalf {
    port: Option<Box<dyn SerialPort>>,
    buf: LineBuffer,
}

/// Serial connection to a printer.
pub struct SerialLink {
    port_name: String,
    reader: Mutex<ReadHalf>,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    connected: AtomicBool,
}

impl SerialLink {
    /// Open a serial port at the given baud rate.
    pub fn open(
        port_name: &str,
        baud: u32,
        force_dtr: Option<bool>,
        parity_workaround: bool,
    ) -> Result<Self> {
        disable_tty_hup(port_name);

        let open_error = |e: serialport::Error| {
            DeviceError::with_cause(format!("Could not connect to serial port '{port_name}'"), e)
        };

        if parity_workaround {
            // Open with odd parity and close again; some drivers only
            // release a latched DTR on a parity change.
            let probe = serialport::new(port_name, baud)
                .timeout(READ_TIMEOUT)
                .parity(serialport::Parity::Odd)
                .open()
                .map_err(open_error)?;
            drop(probe);
        }

        let mut port = serialport::new(port_name, baud)
            .timeout(READ_TIMEOUT)
            .parity(serialport::Parity::None)
            .open()
            .map_err(open_error)?;

        if let Some(level) = force_dtr {
            port.write_data_terminal_ready(level)
                .map_err(open_error)?;
        }

        let writer = port.try_clone().map_err(open_error)?;

        Ok(Self {
            port_name: port_name.to_string(),
            reader: Mutex::new(ReadHalf {
                port: Some(port),
                buf: LineBuffer::default(),
            }),
            writer: Mutex::new(Some(writer)),
            connected: AtomicBool::new(true),
        })
    }

    fn read_error(&self, e: std::io::Error) -> DeviceError {
        self.connected.store(false, Ordering::SeqCst);
        DeviceError::with_cause(
            format!("Unable to read from serial port '{}'", self.port_name),
            e,
        )
    }
}

impl Link for SerialLink {
    fn readline(&self) -> Result<ReadResult> {
        let mut half = self.reader.lock();
        let half = &mut *half;
        if let Some(line) = half.buf.take_line() {
            return Ok(ReadResult::Line(line));
        }
        let Some(port) = half.port.as_mut() else {
            return Err(disconnected_read_error());
        };

        let mut chunk = [0u8; 256];
        loop {
            match port.read(&mut chunk) {
                Ok(0) => {
                    // Port went away; hand back any partial tail first.
                    let tail = half.buf.drain_all();
                    if !tail.is_empty() {
                        return Ok(ReadResult::Line(tail));
                    }
                    self.connected.store(false, Ordering::SeqCst);
                    return Ok(ReadResult::Eof);
                }
                Ok(n) => {
                    half.buf.extend(&chunk[..n]);
                    if let Some(line) = half.buf.take_line() {
                        return Ok(ReadResult::Line(line));
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    return Ok(ReadResult::Empty);
                }
                Err(e) => return Err(self.read_error(e)),
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock();
        let Some(port) = guard.as_mut() else {
            return Err(disconnected_write_error());
        };
        port.write_all(data).map_err(|e| {
            self.connected.store(false, Ordering::SeqCst);
            DeviceError::with_cause(
                format!("Unable to write to serial port '{}'", self.port_name),
                e,
            )
        })
    }

    fn reset(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        let Some(port) = guard.as_mut() else {
            return Err(disconnected_write_error());
        };
        let pulse_error = |e: serialport::Error| {
            DeviceError::with_cause(
                format!("Unable to reset serial port '{}'", self.port_name),
                e,
            )
        };
        port.write_data_terminal_ready(true).map_err(pulse_error)?;
        std::thread::sleep(RESET_PULSE);
        port.write_data_terminal_ready(false).map_err(pulse_error)
    }

    fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the handles closes the descriptor.
        self.reader.lock().port.take();
        self.writer.lock().take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn has_flow_control(&self) -> bool {
        false
    }
}

/// Suppress HUP-on-close so opening the tty does not reset the printer.
#[cfg(target_os = "linux")]
fn disable_tty_hup(port_name: &str) {
    let status = std::process::Command::new("stty")
        .args(["-F", port_name, "-hup"])
        .status();
    if let Err(e) = status {
        tracing::debug!("stty -hup on {} failed: {}", port_name, e);
    }
}

#[cfg(not(target_os = "linux"))]
fn disable_tty_hup(_port_name: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_port_fails_with_device_error() {
        let err = SerialLink::open("/dev/does/not/exist", 115200, None, false)
            .err()
            .expect("open must fail");
        assert!(err.message.contains("/dev/does/not/exist"));
        assert!(err.cause.is_some());
    }
}
