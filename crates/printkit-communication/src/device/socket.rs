//! TCP socket link
//!
//! Network connection to a printer or print-server speaking the same
//! line-oriented protocol. A short read timeout stands in for the readiness
//! selector of classic implementations: `readline` buffers partial reads
//! and slices at the first newline, returning `Empty` when the timeout
//! elapses with nothing new and `Eof` once the peer shuts down.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use printkit_core::{DeviceError, Result};

use super::{
    disconnected_read_error, disconnected_write_error, LineBuffer, Link, ReadResult, READ_TIMEOUT,
};

/// Timeout for the initial TCP connect.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

struct ReadHalf {
    stream: Option<TcpStream>,
    buf: LineBuffer,
}

/// TCP connection to a printer.
pub struct SocketLink {
    peer: String,
    reader: Mutex<ReadHalf>,
    writer: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
}

impl SocketLink {
    /// Connect to `host:port`.
    pub fn open(host: &str, port: u16) -> Result<Self> {
        let peer = format!("{host}:{port}");
        let connect_error =
            |e: std::io::Error| DeviceError::with_cause(format!("Could not connect to {peer}"), e);

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(connect_error)?
            .collect();

        let mut stream = None;
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }
        let stream = match stream {
            Some(s) => s,
            None => {
                let e = last_error.unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved")
                });
                return Err(connect_error(e));
            }
        };

        stream.set_nodelay(true).map_err(connect_error)?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(connect_error)?;
        let writer = stream.try_clone().map_err(connect_error)?;

        Ok(Self {
            peer,
            reader: Mutex::new(ReadHalf {
                stream: Some(stream),
                buf: LineBuffer::default(),
            }),
            writer: Mutex::new(Some(writer)),
            connected: AtomicBool::new(true),
        })
    }

    fn lost_error(&self, action: &str, e: std::io::Error) -> DeviceError {
        self.connected.store(false, Ordering::SeqCst);
        DeviceError::with_cause(
            format!("Unable to {action} {}. Connection lost", self.peer),
            e,
        )
    }
}

impl Link for SocketLink {
    fn readline(&self) -> Result<ReadResult> {
        let mut half = self.reader.lock();
        let half = &mut *half;
        if let Some(line) = half.buf.take_line() {
            return Ok(ReadResult::Line(line));
        }
        let Some(stream) = half.stream.as_mut() else {
            return Err(disconnected_read_error());
        };

        let mut chunk = [0u8; 256];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    // Orderly shutdown; hand back any buffered tail first.
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
                Err(e) => return Err(self.lost_error("read from", e)),
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock();
        let Some(stream) = guard.as_mut() else {
            return Err(disconnected_write_error());
        };
        stream
            .write_all(data)
            .map_err(|e| self.lost_error("write to", e))?;
        // Flush timeouts are tolerated; the data is already queued.
        match stream.flush() {
            Ok(()) => Ok(()),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(())
            }
            Err(e) => Err(self.lost_error("write to", e)),
        }
    }

    fn reset(&self) -> Result<()> {
        // No hardware reset line on a socket.
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        let stream = self.reader.lock().stream.take();
        self.writer.lock().take();
        if let Some(stream) = stream {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
                Err(e) => {
                    return Err(DeviceError::with_cause("Error on socket disconnection", e));
                }
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn has_flow_control(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::net::TcpListener;

    #[test]
    fn connect_to_closed_port_fails_with_device_error() {
        // Port 0 is never connectable.
        let err = SocketLink::open("localhost", 0).err().expect("must fail");
        assert!(err.message.contains("localhost:0"));
    }

    #[test]
    fn readline_buffers_across_partial_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().expect("accept");
            peer.write_all(b"ok T:").expect("first half");
            std::thread::sleep(Duration::from_millis(50));
            peer.write_all(b"42\nstart\n").expect("second half");
            // Keep the connection up past the third read's timeout below.
            std::thread::sleep(Duration::from_millis(600));
        });

        let link = SocketLink::open("127.0.0.1", addr.port()).expect("connect");
        assert_eq!(
            link.readline().expect("first line"),
            ReadResult::Line(b"ok T:42\n".to_vec())
        );
        assert_eq!(
            link.readline().expect("second line"),
            ReadResult::Line(b"start\n".to_vec())
        );
        assert_eq!(link.readline().expect("no more data"), ReadResult::Empty);

        server.join().expect("server thread");
    }

    #[test]
    fn eof_after_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().expect("accept");
            peer.write_all(b"tail-without-newline").expect("tail");
            // Dropping the stream closes it.
        });

        let link = SocketLink::open("127.0.0.1", addr.port()).expect("connect");
        server.join().expect("server thread");

        // The unterminated tail comes out as a final line, then EOF.
        assert_eq!(
            link.readline().expect("tail line"),
            ReadResult::Line(b"tail-without-newline".to_vec())
        );
        assert_eq!(link.readline().expect("eof"), ReadResult::Eof);
        assert!(!link.is_connected());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let link = SocketLink::open("127.0.0.1", addr.port()).expect("connect");

        link.disconnect().expect("first disconnect");
        link.disconnect().expect("second disconnect");
        assert!(!link.is_connected());
        assert!(link.readline().is_err());
        assert!(link.write(b"M105\n").is_err());
    }
}
