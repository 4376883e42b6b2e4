//! Device transport
//!
//! A uniform byte-level channel to the printer over either a serial port or
//! a TCP socket. The connection kind is chosen by syntactic inspection of a
//! location string; both kinds expose the same line-oriented operations
//! through the [`Link`] trait so the protocol engine never cares which one
//! it is talking through.

pub mod serial;
pub mod socket;

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use printkit_core::{DeviceError, Result};

pub use serial::SerialLink;
pub use socket::SocketLink;

/// Default read timeout for both transports.
pub const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Outcome of one [`Link::readline`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// One newline-terminated byte sequence (terminator included).
    Line(Vec<u8>),
    /// The timeout expired with no complete line available.
    Empty,
    /// The peer closed the connection cleanly.
    Eof,
}

/// Connection endpoint.
///
/// A `host:port` location with a dotted-quad or DNS-valid hostname and a
/// port that parses as `u16` is a socket; anything else is treated as a
/// serial device path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Serial {
        port: String,
        baud: u32,
        /// Force the DTR line to a specific level after opening. Not all
        /// OS/driver combinations support this; `None` leaves it alone.
        force_dtr: Option<bool>,
        /// Open with odd parity first, then reopen with none, to dislodge
        /// drivers that latch DTR.
        parity_workaround: bool,
    },
    Socket {
        host: String,
        port: u16,
    },
}

fn host_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])\.){3}([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])$|^(([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]*[a-zA-Z0-9])\.)*([A-Za-z0-9]|[A-Za-z0-9][A-Za-z0-9\-]*[A-Za-z0-9])$",
        )
        .expect("host pattern compiles")
    })
}

impl Endpoint {
    /// Classify a location string.
    ///
    /// `baud` only applies when the location turns out to be serial.
    pub fn parse(location: &str, baud: u32) -> Self {
        if let Some((host, port)) = location.split_once(':') {
            // Exactly one colon; URLs with a scheme and IPv6 literals fall
            // through to serial, as does anything with a non-numeric port.
            if !port.contains(':') && host_pattern().is_match(host) {
                if let Ok(port_number) = port.parse::<u16>() {
                    return Endpoint::Socket {
                        host: host.to_string(),
                        port: port_number,
                    };
                }
            }
        }
        Endpoint::Serial {
            port: location.to_string(),
            baud,
            force_dtr: None,
            parity_workaround: false,
        }
    }

    /// The location string this endpoint was parsed from.
    pub fn location(&self) -> String {
        match self {
            Endpoint::Serial { port, .. } => port.clone(),
            Endpoint::Socket { host, port } => format!("{host}:{port}"),
        }
    }

    pub fn is_socket(&self) -> bool {
        matches!(self, Endpoint::Socket { .. })
    }
}

/// Byte-level channel to the printer.
///
/// Implementations are shared between the listener and sender threads, so
/// every operation takes `&self`; a blocking read must never delay a
/// concurrent write.
pub trait Link: Send + Sync {
    /// Read one newline-terminated line, waiting up to the read timeout.
    fn readline(&self) -> Result<ReadResult>;

    /// Write raw bytes to the peer.
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Hardware-reset the printer where the transport supports it
    /// (DTR pulse on serial; no-op on sockets).
    fn reset(&self) -> Result<()>;

    /// Close the channel. Idempotent.
    fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// True when the transport has its own backpressure (TCP), letting the
    /// engine skip the wait for the first acknowledgment.
    fn has_flow_control(&self) -> bool;
}

/// Open the right [`Link`] for an endpoint.
pub fn open(endpoint: &Endpoint) -> Result<Arc<dyn Link>> {
    match endpoint {
        Endpoint::Serial {
            port,
            baud,
            force_dtr,
            parity_workaround,
        } => Ok(Arc::new(SerialLink::open(
            port,
            *baud,
            *force_dtr,
            *parity_workaround,
        )?)),
        Endpoint::Socket { host, port } => Ok(Arc::new(SocketLink::open(host, *port)?)),
    }
}

pub(crate) fn disconnected_read_error() -> DeviceError {
    DeviceError::new("Attempted to read when disconnected")
}

pub(crate) fn disconnected_write_error() -> DeviceError {
    DeviceError::new("Attempted to write when disconnected")
}

/// Accumulates bytes across partial reads until a full line is available.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Split off everything up to and including the first newline.
    pub fn take_line(&mut self) -> Option<Vec<u8>> {
        let eol = self.buf.iter().position(|&b| b == b'\n')?;
        let rest = self.buf.split_off(eol + 1);
        Some(std::mem::replace(&mut self.buf, rest))
    }

    /// Drain whatever is buffered, terminator or not (used at EOF).
    pub fn drain_all(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_locations_classify_as_socket() {
        for location in ["192.168.0.10:80", "localhost:8080", "octopi.local:5000"] {
            assert!(
                Endpoint::parse(location, 115200).is_socket(),
                "location = {location}"
            );
        }
    }

    #[test]
    fn port_zero_still_classifies_as_socket() {
        let endpoint = Endpoint::parse("localhost:0", 115200);
        assert_eq!(
            endpoint,
            Endpoint::Socket {
                host: "localhost".to_string(),
                port: 0
            }
        );
    }

    #[test]
    fn serial_locations_classify_as_serial() {
        for location in [
            "/dev/ttyUSB0",
            "COM3",
            "/dev/does/not/exist",
            "http://example.com:8080", // scheme makes the host invalid
            "host:notaport",
            "host:99999",
            "[::1]:80",
        ] {
            assert!(
                !Endpoint::parse(location, 115200).is_socket(),
                "location = {location}"
            );
        }
    }

    #[test]
    fn serial_endpoint_keeps_baud() {
        let endpoint = Endpoint::parse("/dev/ttyACM0", 250000);
        assert_eq!(
            endpoint,
            Endpoint::Serial {
                port: "/dev/ttyACM0".to_string(),
                baud: 250000,
                force_dtr: None,
                parity_workaround: false,
            }
        );
    }

    #[test]
    fn dotted_quad_octets_are_range_checked() {
        assert!(Endpoint::parse("255.255.255.255:1", 0).is_socket());
        assert!(!Endpoint::parse("256.1.1.1:80", 0).is_socket());
    }

    #[test]
    fn line_buffer_slices_at_newline() {
        let mut buf = LineBuffer::default();
        buf.extend(b"ok T:2");
        assert_eq!(buf.take_line(), None);
        buf.extend(b"10\nok\nparti");
        assert_eq!(buf.take_line(), Some(b"ok T:210\n".to_vec()));
        assert_eq!(buf.take_line(), Some(b"ok\n".to_vec()));
        assert_eq!(buf.take_line(), None);
        assert_eq!(buf.drain_all(), b"parti".to_vec());
    }
}
